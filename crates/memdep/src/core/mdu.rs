//! Memory Dependence Unit.
//!
//! The single entry point the host pipeline drives. Each pipeline event is routed to
//! the components in a fixed order:
//! 1. **Dispatch:** The tracker assigns an occurrence index, then the store-set
//!    predictor and (when replaying) the oracle name the stores to wait for.
//! 2. **Issue:** Issued stores stop being pending producers in the predictor.
//! 3. **Squash:** The tracker renumbers and may arm the violation state machine; the
//!    predictor rolls its last-fetched-store table back.
//! 4. **Commit:** The tracker resolves the violation state machine, the oracle records
//!    or refines, and a confirmed violation trains the predictor.
//!
//! Everything runs synchronously inside the caller's event delivery. Errors from the
//! tracker are invariant violations; the unit must not be driven further after one.

use std::fmt;

use crate::common::error::Result;
use crate::common::{DynInst, SeqNum};
use crate::config::MemDepConfig;
use crate::core::pipeline::{ConfirmedViolation, InstanceTracker};
use crate::core::units::mdp::{DependencyOracle, StoreSetPredictor};
use crate::stats::MemDepStats;

/// Progress callback, invoked with `(retired, last_eff_seq_num)`.
pub type ProgressHook = Box<dyn FnMut(u64, SeqNum)>;

/// Producers predicted for one dispatched instruction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Prediction {
    /// Store named by the store-set predictor.
    pub store_set: Option<SeqNum>,
    /// Stores named by the replayed dependency trace, ascending.
    pub oracle: Vec<SeqNum>,
}

impl Prediction {
    /// Returns true if nothing was predicted.
    pub fn is_empty(&self) -> bool {
        self.store_set.is_none() && self.oracle.is_empty()
    }

    /// All predicted producers, ascending and without duplicates.
    pub fn producers(&self) -> Vec<SeqNum> {
        let mut out = self.oracle.clone();
        out.extend(self.store_set);
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// Memory dependence unit.
pub struct MemDepUnit {
    predictor: StoreSetPredictor,
    tracker: InstanceTracker,
    oracle: DependencyOracle,
    stats: MemDepStats,
    heartbeat_interval: Option<u64>,
    progress_hook: Option<ProgressHook>,
    last_eff_seq_num: SeqNum,
    shut_down: bool,
}

impl MemDepUnit {
    /// Builds the unit from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration, or if the oracle cannot load
    /// the shards it is asked to replay.
    pub fn new(config: &MemDepConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            predictor: StoreSetPredictor::new(&config.store_set)?,
            tracker: InstanceTracker::new(),
            oracle: DependencyOracle::new(&config.oracle)?,
            stats: MemDepStats::default(),
            heartbeat_interval: config.heartbeat_interval,
            progress_hook: None,
            last_eff_seq_num: 0,
            shut_down: false,
        })
    }

    /// Installs a callback run every `heartbeat_interval` commits.
    pub fn set_progress_hook(&mut self, hook: impl FnMut(u64, SeqNum) + 'static) {
        self.progress_hook = Some(Box::new(hook));
    }

    /// Handles a dispatched instruction and returns its predicted producers.
    ///
    /// Sets `inst.occurrence` and `inst.predicted_dependency`. Non-memory
    /// instructions get an empty prediction.
    pub fn dispatch(&mut self, inst: &mut DynInst) -> Result<Prediction> {
        self.tracker.insert_from_dispatch(inst, &mut self.stats)?;
        if !inst.is_memory() {
            return Ok(Prediction::default());
        }

        let store_set = self.predictor.check_inst(inst.pc, inst.seq_num);
        if inst.writes_memory() {
            self.predictor.insert_store(inst.pc, inst.seq_num, inst.thread_id);
        } else {
            self.predictor.insert_load(inst.pc, inst.seq_num);
        }
        let oracle = self.oracle.check_inst(inst, &self.tracker, &mut self.stats);

        if store_set.is_some() {
            self.stats.store_set_predictions += 1;
        }
        if !oracle.is_empty() {
            self.stats.oracle_predictions += 1;
        }
        if self.predictor.check_clear() {
            self.stats.predictor_clears += 1;
        }

        let prediction = Prediction { store_set, oracle };
        inst.predicted_dependency = !prediction.is_empty();
        Ok(prediction)
    }

    /// Handles an issued instruction.
    pub fn issue(&mut self, inst: &DynInst) {
        if inst.is_memory() {
            self.predictor.issued(inst.pc, inst.seq_num, inst.writes_memory());
        }
    }

    /// Feeds a resolved conditional branch into the predictor's history.
    pub fn branch_resolved(&mut self, seq_num: SeqNum, taken: bool) {
        self.predictor.record_branch(seq_num, taken);
    }

    /// Handles a squashed instruction. It must be the oldest in flight.
    pub fn squash(&mut self, inst: &mut DynInst) -> Result<()> {
        self.tracker.remove_squashed(inst, &mut self.stats)?;
        self.predictor.squash(inst.seq_num, inst.thread_id);
        Ok(())
    }

    /// Handles a committed instruction. It must be the oldest in flight.
    ///
    /// Returns the violation confirmed by this commit, if any; the predictor has
    /// already been trained with it.
    pub fn commit(&mut self, inst: &mut DynInst) -> Result<Option<ConfirmedViolation>> {
        let confirmed = self.tracker.remove_committed(inst, &mut self.stats)?;
        self.oracle.record_committed(inst, confirmed.as_ref(), &mut self.stats);

        if let Some(confirmed) = &confirmed {
            match confirmed.signature.producer {
                Some(store) => self.predictor.violation(
                    store.uid.pc,
                    store.seq_num,
                    inst.pc,
                    inst.seq_num,
                ),
                None => tracing::debug!(
                    violator = %confirmed.signature.violator,
                    "violation without a known store; predictor not trained"
                ),
            }
        }

        #[cfg(feature = "commit-log")]
        tracing::debug!(
            pc = inst.pc,
            seq_num = inst.seq_num,
            occurrence = inst.occurrence,
            class = ?inst.class,
            violator = inst.confirmed_violator,
            "commit"
        );

        self.last_eff_seq_num = inst.eff_seq_num;
        self.heartbeat();
        Ok(confirmed)
    }

    fn heartbeat(&mut self) {
        let Some(interval) = self.heartbeat_interval else {
            return;
        };
        let retired = self.tracker.retired();
        if retired % interval != 0 {
            return;
        }
        tracing::info!(
            retired,
            eff_seq_num = self.last_eff_seq_num,
            violations = self.stats.violations,
            "memdep heartbeat"
        );
        if let Some(hook) = self.progress_hook.as_mut() {
            hook(retired, self.last_eff_seq_num);
        }
    }

    /// Flushes and closes trace output. Only the first call does anything.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.stats.oracle_dropped_writes += self.oracle.close() as u64;
        tracing::info!(
            retired = self.tracker.retired(),
            violations = self.stats.violations,
            "memdep shutdown"
        );
    }

    /// Statistics collected so far.
    pub const fn stats(&self) -> &MemDepStats {
        &self.stats
    }

    /// Store-set predictor.
    pub const fn predictor(&self) -> &StoreSetPredictor {
        &self.predictor
    }

    /// In-flight instance tracker.
    pub const fn tracker(&self) -> &InstanceTracker {
        &self.tracker
    }

    /// Dependency oracle.
    pub const fn oracle(&self) -> &DependencyOracle {
        &self.oracle
    }
}

impl fmt::Debug for MemDepUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemDepUnit")
            .field("in_flight", &self.tracker.len())
            .field("retired", &self.tracker.retired())
            .field("oracle_mode", &self.oracle.mode())
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}
