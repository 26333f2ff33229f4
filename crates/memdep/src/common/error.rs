//! Error definitions for the memory dependence unit.
//!
//! This module defines every failure the core can report. It covers:
//! 1. **Invariant Violations:** Program-order breaks in the in-flight window. These are
//!    fatal for the host: identity bookkeeping after them would be unsound.
//! 2. **Configuration Errors:** Malformed table sizes, history lengths, or JSON.
//! 3. **Trace Errors:** Shard I/O that cannot be skipped, and malformed trace lines.

use std::fmt;
use std::io;
use std::path::PathBuf;

use super::SeqNum;
use super::uid::UidParseError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MemDepError>;

/// Pipeline event that removes an instruction from the in-flight window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowEvent {
    /// The instruction was squashed.
    Squash,
    /// The instruction committed.
    Commit,
}

impl fmt::Display for WindowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Squash => write!(f, "squash"),
            Self::Commit => write!(f, "commit"),
        }
    }
}

/// Errors reported by the memory dependence unit.
#[derive(Debug, thiserror::Error)]
pub enum MemDepError {
    /// A squash or commit named an instruction other than the window head.
    ///
    /// `expected` is `None` when the window was empty.
    #[error("{event} of seq {found} does not match in-flight head {expected:?}")]
    WindowHeadMismatch {
        /// Which event was being delivered.
        event: WindowEvent,
        /// Sequence number of the current head, if any.
        expected: Option<SeqNum>,
        /// Sequence number the pipeline tried to remove.
        found: SeqNum,
    },

    /// A dispatched instruction is not younger than the window tail.
    #[error("dispatch of seq {seq_num} is not younger than in-flight tail {tail}")]
    ProgramOrder {
        /// Sequence number of the current tail.
        tail: SeqNum,
        /// Sequence number that was dispatched.
        seq_num: SeqNum,
    },

    /// An instruction from a hardware thread other than 0 was delivered.
    #[error("thread {thread_id} is not supported; occurrence tracking assumes a single thread")]
    UnsupportedThread {
        /// Offending thread id.
        thread_id: u32,
    },

    /// Configuration values that cannot be used to build the unit.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration JSON that failed to deserialize.
    #[error("configuration parse error: {0}")]
    ConfigJson(#[from] serde_json::Error),

    /// Trace I/O that could not be skipped.
    #[error("trace i/o error on {}: {source}", path.display())]
    Io {
        /// File or directory being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// A replayed trace shard contains a malformed line.
    #[error(transparent)]
    Parse(#[from] TraceParseError),
}

/// A malformed line in a mini-trace shard.
#[derive(Debug, thiserror::Error)]
#[error("{}:{line}: {reason}", path.display())]
pub struct TraceParseError {
    /// Shard being read.
    pub path: PathBuf,
    /// 1-based line number within the decompressed shard.
    pub line: usize,
    /// What was wrong with the line.
    pub reason: LineError,
}

/// Why a trace line was rejected.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum LineError {
    /// The line has no `,` between consumer and producer.
    #[error("missing ',' between consumer and producer")]
    MissingComma,
    /// One of the two identities is malformed.
    #[error("{0}")]
    Uid(#[from] UidParseError),
}

impl MemDepError {
    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for program-order invariant violations.
    ///
    /// These leave the core in a state the host must not continue from.
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::WindowHeadMismatch { .. } | Self::ProgramOrder { .. } | Self::UnsupportedThread { .. }
        )
    }
}
