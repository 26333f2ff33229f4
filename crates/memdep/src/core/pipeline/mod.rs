//! In-flight window bookkeeping.
//!
//! Dispatched memory instructions are tracked in program order until they
//! squash or commit; the tracker also detects memory-order violations.

/// In-flight memory instance tracker and violation state machine.
pub mod instance_tracker;

pub use self::instance_tracker::{
    CandidateState, ConfirmedViolation, InFlightEntry, InstanceTracker, ViolationSignature,
};
