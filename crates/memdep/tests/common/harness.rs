use std::path::Path;

use memdep_core::common::{DynInst, SeqNum};
use memdep_core::config::{MemDepConfig, OracleConfig, OracleMode};
use memdep_core::core::Prediction;
use memdep_core::core::pipeline::ConfirmedViolation;
use memdep_core::MemDepUnit;
use tracing_subscriber::EnvFilter;

/// Installs a test-friendly tracing subscriber once per process.
///
/// Honours `RUST_LOG`; output is captured by the test runner.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Owns a `MemDepUnit` and drives events through it, panicking on errors.
pub struct TestContext {
    pub mdu: MemDepUnit,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(&MemDepConfig::default())
    }

    pub fn with_config(config: &MemDepConfig) -> Self {
        init_tracing();
        let mdu = MemDepUnit::new(config).unwrap_or_else(|e| panic!("unit construction failed: {e}"));
        Self { mdu }
    }

    /// A unit whose oracle runs in `mode` against `dir`.
    pub fn with_oracle(mode: OracleMode, dir: &Path) -> Self {
        let config = MemDepConfig {
            oracle: OracleConfig::new(mode, dir),
            ..MemDepConfig::default()
        };
        Self::with_config(&config)
    }

    pub fn dispatch(&mut self, inst: &mut DynInst) -> Prediction {
        self.mdu
            .dispatch(inst)
            .unwrap_or_else(|e| panic!("dispatch of seq {} failed: {e}", inst.seq_num))
    }

    pub fn squash(&mut self, inst: &mut DynInst) {
        self.mdu
            .squash(inst)
            .unwrap_or_else(|e| panic!("squash of seq {} failed: {e}", inst.seq_num));
    }

    pub fn commit(&mut self, inst: &mut DynInst) -> Option<ConfirmedViolation> {
        self.mdu
            .commit(inst)
            .unwrap_or_else(|e| panic!("commit of seq {} failed: {e}", inst.seq_num))
    }

    /// Dispatches, issues, and commits each instruction in order.
    pub fn run_to_commit(&mut self, insts: &mut [DynInst]) {
        for inst in insts.iter_mut() {
            let _ = self.dispatch(inst);
        }
        for inst in insts.iter() {
            self.mdu.issue(inst);
        }
        for inst in insts.iter_mut() {
            let _ = self.commit(inst);
        }
    }

    /// Sequence numbers currently in flight, oldest first.
    pub fn in_flight(&self) -> Vec<SeqNum> {
        self.mdu.tracker().in_flight().map(|e| e.seq_num).collect()
    }
}
