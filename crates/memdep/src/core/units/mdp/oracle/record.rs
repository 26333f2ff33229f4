//! Trace record formats.
//!
//! Mini-trace lines name a consumer and its producer as two `pc:occurrence` pairs:
//!
//! ```text
//! #Trace
//! 4096:1,8192:1
//! B4100:3,0:0
//! ```
//!
//! A leading `B` marks a barrier (wait on every older in-flight store); its producer
//! field is always `0:0`. Lines starting with `#` are comments, and every shard opens
//! with one.
//!
//! Full-trace lines are comma-separated decimal fields, one per committed memory
//! access or conditional branch:
//!
//! ```text
//! <is_load>,<has_dep>,<pc>,<occurrence>,<seq>,<eff_seq>,<addr>,<size>,<dep_pc>:<dep_occurrence>
//! ```

use std::fmt;

use crate::common::error::LineError;
use crate::common::{SeqNum, TraceUid};

/// Leading character of a barrier line.
pub const BARRIER_MARKER: char = 'B';

/// Leading character of a comment line.
pub const COMMENT_MARKER: char = '#';

/// First line of a shard written by a recording run.
pub const TRACE_HEADER: &str = "#Trace";

/// First line of a shard written by a replaying run.
pub const REFINEMENT_HEADER: &str = "#Refinement";

/// One mini-trace line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MiniRecord {
    /// `consumer` read a value last written by `producer`.
    Dependency {
        /// The load (or store) that must wait.
        consumer: TraceUid,
        /// The store it must wait for.
        producer: TraceUid,
    },
    /// The instance must wait on every older in-flight store.
    Barrier(TraceUid),
}

impl MiniRecord {
    /// Parses one line.
    ///
    /// Returns `Ok(None)` for comments and blank lines.
    pub fn parse(line: &str) -> Result<Option<Self>, LineError> {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(COMMENT_MARKER) {
            return Ok(None);
        }
        let (barrier, body) = match line.strip_prefix(BARRIER_MARKER) {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let (consumer, producer) = body.split_once(',').ok_or(LineError::MissingComma)?;
        let consumer: TraceUid = consumer.parse()?;
        let producer: TraceUid = producer.parse()?;

        Ok(Some(if barrier {
            Self::Barrier(consumer)
        } else {
            Self::Dependency { consumer, producer }
        }))
    }

    /// The instance this record constrains.
    pub const fn consumer(&self) -> TraceUid {
        match *self {
            Self::Dependency { consumer, .. } | Self::Barrier(consumer) => consumer,
        }
    }
}

impl fmt::Display for MiniRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dependency { consumer, producer } => write!(f, "{consumer},{producer}"),
            Self::Barrier(consumer) => {
                write!(f, "{BARRIER_MARKER}{consumer},{}", TraceUid::NONE)
            }
        }
    }
}

/// One full-trace line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FullRecord {
    /// Load (as opposed to store, atomic, or branch).
    pub is_load: bool,
    /// A producer was found. Always set on branch records.
    pub has_dep: bool,
    /// Identity of the committed instance.
    pub uid: TraceUid,
    /// Sequence number.
    pub seq_num: SeqNum,
    /// Global sequence number across squashes.
    pub eff_seq_num: SeqNum,
    /// Effective address.
    pub addr: u64,
    /// Access size in bytes; 0 for branches.
    pub size: u64,
    /// Producer identity, `0:0` when none. Branches store `predicted_taken:mispredicted`.
    pub dep: TraceUid,
}

impl FullRecord {
    /// A committed conditional branch, tagged with its prediction outcome.
    pub fn branch(
        uid: TraceUid,
        seq_num: SeqNum,
        eff_seq_num: SeqNum,
        addr: u64,
        pred_taken: bool,
        mispredicted: bool,
    ) -> Self {
        Self {
            is_load: false,
            has_dep: true,
            uid,
            seq_num,
            eff_seq_num,
            addr,
            size: 0,
            dep: TraceUid::new(u64::from(pred_taken), u64::from(mispredicted)),
        }
    }
}

impl fmt::Display for FullRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{},{},{}",
            u8::from(self.is_load),
            u8::from(self.has_dep),
            self.uid.pc,
            self.uid.occurrence,
            self.seq_num,
            self.eff_seq_num,
            self.addr,
            self.size,
            self.dep
        )
    }
}
