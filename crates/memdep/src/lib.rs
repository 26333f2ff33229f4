//! Memory dependence prediction library for out-of-order cores.
//!
//! This crate decides, before a load's address is known, whether it must wait on an
//! older in-flight store, and verifies at commit time whether that decision was right:
//! 1. **Store Sets:** A Chrysos/Emer store-set predictor (SSIT + LFST) with optional
//!    branch-history folding of the table index.
//! 2. **Instance Tracking:** Dense, squash-consistent dynamic identities for every
//!    in-flight memory instruction and a commit-time violation state machine.
//! 3. **Dependency Oracle:** Recording of ground-truth producer/consumer edges to
//!    compressed trace shards, and replay/refinement of those shards on later runs.
//! 4. **Statistics:** Violation, misprediction, and trace counters.
//!
//! The host pipeline drives everything through [`MemDepUnit`] at dispatch, issue,
//! squash, and commit.

/// Common types (sequence numbers, trace identities, instruction descriptors, errors).
pub mod common;
/// Configuration for the predictor, the oracle, and progress reporting.
pub mod config;
/// Predictor, instance tracker, oracle, and the unit that ties them together.
pub mod core;
/// Memory dependence statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `MemDepConfig::default()` or deserialize from JSON.
pub use crate::config::MemDepConfig;
/// Crate-wide error and result types.
pub use crate::common::error::{MemDepError, Result};
/// Event-driven façade over the predictor, tracker, and oracle.
pub use crate::core::MemDepUnit;
