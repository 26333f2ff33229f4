//! Memory dependence core.
//!
//! This module contains the in-flight instance tracker, the prediction units
//! (store sets and the dependency oracle), and the unit that routes pipeline
//! events to all of them.

/// Memory dependence unit: the event-driven entry point for the host pipeline.
pub mod mdu;

/// In-flight window bookkeeping (instance tracker, violation detection).
pub mod pipeline;

/// Prediction units (store-set predictor, dependency oracle).
pub mod units;

pub use self::mdu::{MemDepUnit, Prediction};
