//! Shared builders and harness.

/// Fluent `DynInst` builder.
pub mod builder;

/// Event-driving test harness.
pub mod harness;
