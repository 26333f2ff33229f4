//! Prediction units.
//!
//! This module contains the components that decide which older stores a
//! memory instruction should wait for.

/// Memory dependence predictors (store sets, dependency oracle).
pub mod mdp;
