//! Dynamic instance identity.
//!
//! A `TraceUid` names one dynamic execution of a static memory instruction by
//! pairing its program counter with the occurrence index the instance tracker
//! assigned at dispatch. Because occurrence indices are rolled back on squash,
//! the same dynamic access receives the same identity on every run of the same
//! program, which is what lets recorded traces be replayed.

use std::fmt;
use std::str::FromStr;

/// `(pc, occurrence)` identity of a dynamic memory access.
///
/// Ordered by PC first, then occurrence, so sets of identities iterate
/// deterministically.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceUid {
    /// Program counter of the static instruction.
    pub pc: u64,
    /// Occurrence index of this dynamic instance (1-based; 0 means "none").
    pub occurrence: u64,
}

impl TraceUid {
    /// The placeholder identity written for records without a producer.
    pub const NONE: Self = Self {
        pc: 0,
        occurrence: 0,
    };

    /// Creates a new identity.
    #[inline]
    pub const fn new(pc: u64, occurrence: u64) -> Self {
        Self { pc, occurrence }
    }

    /// Returns true for the `0:0` placeholder.
    #[inline]
    pub const fn is_none(self) -> bool {
        self.pc == 0 && self.occurrence == 0
    }
}

impl fmt::Display for TraceUid {
    /// Formats as `<pc>:<occurrence>` in decimal, the trace file form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pc, self.occurrence)
    }
}

/// Reason a `<pc>:<occurrence>` field could not be parsed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum UidParseError {
    /// The field has no `:` separator.
    #[error("missing ':' in identity {0:?}")]
    MissingSeparator(String),
    /// One half is not a decimal `u64`.
    #[error("invalid number {value:?} in identity: {source}")]
    InvalidNumber {
        /// The offending text.
        value: String,
        /// Underlying integer parse error.
        source: std::num::ParseIntError,
    },
}

impl FromStr for TraceUid {
    type Err = UidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (pc, occurrence) = s
            .split_once(':')
            .ok_or_else(|| UidParseError::MissingSeparator(s.to_owned()))?;
        let number = |v: &str| {
            v.trim()
                .parse::<u64>()
                .map_err(|source| UidParseError::InvalidNumber {
                    value: v.to_owned(),
                    source,
                })
        };
        Ok(Self::new(number(pc)?, number(occurrence)?))
    }
}
