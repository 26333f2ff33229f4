//! Common types shared by the predictor, tracker, and oracle.
//!
//! This module provides the building blocks every component speaks in:
//! 1. **Sequence Numbers:** The pipeline's program-order instruction numbering.
//! 2. **Trace Identities:** `(pc, occurrence)` pairs naming one dynamic access.
//! 3. **Instruction Descriptors:** The view of a dynamic instruction the host hands in.
//! 4. **Error Handling:** Invariant, configuration, I/O, and trace parse errors.

/// Error types for invariant violations, configuration, and trace I/O.
pub mod error;

/// Dynamic instruction descriptor supplied by the host pipeline.
pub mod inst;

/// Dynamic instance identity (`TraceUid`).
pub mod uid;

pub use error::{MemDepError, Result, TraceParseError};
pub use inst::{DynInst, InstClass, StoreRef};
pub use uid::TraceUid;

/// Program-order instruction sequence number assigned by the host pipeline.
///
/// Zero is never a valid instruction; sequence numbers start at 1.
pub type SeqNum = u64;

/// Hardware thread identifier. Only thread 0 is supported.
pub type ThreadId = u32;
