//! Memory Dependence Prediction.
//!
//! Two sources of dependence predictions are available:
//! 1. **Store Sets:** A learned predictor trained by confirmed violations.
//! 2. **Dependency Oracle:** Ground truth recorded on an earlier run and replayed.

/// Dependency trace recorder and replayer.
pub mod oracle;

/// Store Set predictor (SSIT + LFST).
pub mod store_set;

pub use self::oracle::DependencyOracle;
pub use self::store_set::{StoreSetId, StoreSetPredictor};
