//! In-flight memory instance tracker.
//!
//! Tracks every dispatched, not yet retired memory instruction in program order and
//! gives each one a dynamic identity `(pc, occurrence)`. It provides:
//! 1. **Identity Assignment:** A per-PC occurrence counter bumped at dispatch.
//! 2. **Squash Rollback:** Removing a squashed instance renumbers younger instances of
//!    the same PC downward and rolls the counter back, so identities stay dense and do
//!    not depend on how often the pipeline mis-speculated.
//! 3. **Violation Detection:** A two-state machine armed by a squash for memory-order
//!    mis-speculation and resolved by the very next commit.
//!
//! The window is strictly FIFO: squash and commit may only remove the head, and
//! dispatch must append a strictly younger sequence number. Breaking either is an
//! invariant violation reported as an error; the host must stop.
//!
//! Only hardware thread 0 is supported. A multi-threaded pipeline would need the
//! counter and the window keyed by thread.

use std::collections::{HashMap, VecDeque};

use crate::common::error::{MemDepError, Result, WindowEvent};
use crate::common::{DynInst, InstClass, SeqNum, StoreRef, TraceUid};
use crate::stats::MemDepStats;

/// A memory instruction in the in-flight window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InFlightEntry {
    /// Sequence number.
    pub seq_num: SeqNum,
    /// Program counter.
    pub pc: u64,
    /// Current occurrence index; may move down while younger than a squashed instance.
    pub occurrence: u64,
    /// Occurrence index assigned at dispatch, when predictions were made.
    pub occurrence_at_dispatch: u64,
    /// Load, store, or atomic.
    pub class: InstClass,
}

impl InFlightEntry {
    /// Current identity.
    #[inline]
    pub const fn uid(&self) -> TraceUid {
        TraceUid::new(self.pc, self.occurrence)
    }

    /// Returns true for stores and atomics.
    #[inline]
    pub const fn writes_memory(&self) -> bool {
        self.class.writes_memory()
    }
}

/// What the squash that armed the violation state machine saw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViolationSignature {
    /// Identity of the squashed instance at detection (squash) time.
    pub violator: TraceUid,
    /// Occurrence index the instance had at prediction (dispatch) time.
    ///
    /// Differs from `violator.occurrence` when an older instance of the same PC was
    /// squashed in between. Refinement edges are keyed on this value.
    pub occurrence_at_prediction: u64,
    /// Effective address of the squashed access.
    pub eff_addr: u64,
    /// Whether a dependency had been predicted for it.
    pub predicted_dependency: bool,
    /// Whether it was a load (as opposed to a store or atomic).
    pub violator_is_load: bool,
    /// The store it should have waited for, if the pipeline knew.
    pub producer: Option<StoreRef>,
    /// Sequence number of the squashed instance.
    pub squash_seq_num: SeqNum,
    /// Global sequence number of the squashed instance.
    pub squash_eff_seq_num: SeqNum,
}

impl ViolationSignature {
    /// Identity at prediction time.
    #[inline]
    pub const fn uid_at_prediction(&self) -> TraceUid {
        TraceUid::new(self.violator.pc, self.occurrence_at_prediction)
    }
}

/// Violation candidate state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CandidateState {
    /// No squash for memory ordering is pending.
    #[default]
    Idle,
    /// A squash for memory ordering is waiting for the next commit.
    Possible(ViolationSignature),
}

/// A violation confirmed at commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfirmedViolation {
    /// Signature captured at squash.
    pub signature: ViolationSignature,
    /// Sequence number of the committing (re-executed) instance.
    pub commit_seq_num: SeqNum,
    /// Global sequence distance from the squash to this commit, counting the
    /// wrong-path instructions fetched in between.
    pub squash_to_commit: u64,
}

/// In-flight memory instance tracker.
#[derive(Debug, Default)]
pub struct InstanceTracker {
    /// Per-PC count of dispatched instances since the last rollback.
    occurrences: HashMap<u64, u64>,
    /// Memory instructions in program order, oldest at the front.
    in_flight: VecDeque<InFlightEntry>,
    /// Violation candidate.
    candidate: CandidateState,
    /// Instructions (of any class) committed so far.
    retired: u64,
}

impl InstanceTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a dispatched instruction and assigns its occurrence index.
    ///
    /// Non-memory instructions are ignored.
    pub fn insert_from_dispatch(&mut self, inst: &mut DynInst, stats: &mut MemDepStats) -> Result<()> {
        if !inst.is_memory() {
            return Ok(());
        }
        if inst.thread_id != 0 {
            return Err(MemDepError::UnsupportedThread {
                thread_id: inst.thread_id,
            });
        }
        if let Some(tail) = self.in_flight.back()
            && inst.seq_num <= tail.seq_num
        {
            return Err(MemDepError::ProgramOrder {
                tail: tail.seq_num,
                seq_num: inst.seq_num,
            });
        }

        let counter = self.occurrences.entry(inst.pc).or_insert(0);
        *counter += 1;
        inst.occurrence = *counter;

        self.in_flight.push_back(InFlightEntry {
            seq_num: inst.seq_num,
            pc: inst.pc,
            occurrence: inst.occurrence,
            occurrence_at_dispatch: inst.occurrence,
            class: inst.class,
        });
        stats.mem_dispatched += 1;
        Ok(())
    }

    /// Removes a squashed instruction from the window head.
    ///
    /// Arms the violation state machine when the instruction was squashed for memory
    /// ordering, renumbers younger instances of the same PC, and rolls the PC's
    /// counter back by one. The descriptor's occurrence slot is refreshed from the
    /// window.
    pub fn remove_squashed(&mut self, inst: &mut DynInst, stats: &mut MemDepStats) -> Result<()> {
        if !inst.is_memory() {
            return Ok(());
        }
        let head = self.head_for(WindowEvent::Squash, inst.seq_num)?;
        inst.occurrence = head.occurrence;

        if inst.mem_violator {
            self.candidate = CandidateState::Possible(ViolationSignature {
                violator: head.uid(),
                occurrence_at_prediction: head.occurrence_at_dispatch,
                eff_addr: inst.eff_addr,
                predicted_dependency: inst.predicted_dependency,
                violator_is_load: inst.is_load(),
                producer: inst.violating_store,
                squash_seq_num: inst.seq_num,
                squash_eff_seq_num: inst.eff_seq_num,
            });
            tracing::debug!(
                violator = %head.uid(),
                seq_num = inst.seq_num,
                eff_addr = inst.eff_addr,
                "possible memory order violation"
            );
        }

        for entry in self.in_flight.iter_mut().skip(1) {
            if entry.pc == head.pc && entry.occurrence > head.occurrence {
                tracing::debug!(
                    pc = entry.pc,
                    occurrence = entry.occurrence,
                    seq_num = entry.seq_num,
                    "occurrence decrement"
                );
                entry.occurrence -= 1;
            }
        }
        let _ = self.in_flight.pop_front();

        if let Some(counter) = self.occurrences.get_mut(&head.pc) {
            *counter = counter.saturating_sub(1);
            if *counter == 0 {
                let _ = self.occurrences.remove(&head.pc);
            }
        }
        stats.mem_squashed += 1;
        Ok(())
    }

    /// Retires a committed instruction.
    ///
    /// Every commit, memory or not, resolves the violation state machine: if it is
    /// `Possible` and this instruction matches the captured PC, occurrence, and
    /// address, the violation is confirmed and counted. The machine returns to `Idle`
    /// either way. Memory instructions are then removed from the window head.
    pub fn remove_committed(
        &mut self,
        inst: &mut DynInst,
        stats: &mut MemDepStats,
    ) -> Result<Option<ConfirmedViolation>> {
        let head = if inst.is_memory() {
            let head = self.head_for(WindowEvent::Commit, inst.seq_num)?;
            inst.occurrence = head.occurrence;
            Some(head)
        } else {
            None
        };

        self.retired += 1;
        stats.uops_committed += 1;

        let confirmed = match std::mem::take(&mut self.candidate) {
            CandidateState::Possible(signature)
                if head.is_some_and(|h| {
                    h.uid() == signature.violator && inst.eff_addr == signature.eff_addr
                }) =>
            {
                let squash_to_commit =
                    inst.eff_seq_num.saturating_sub(signature.squash_eff_seq_num);
                Some(ConfirmedViolation {
                    signature,
                    commit_seq_num: inst.seq_num,
                    squash_to_commit,
                })
            }
            _ => None,
        };

        if let Some(confirmed) = &confirmed {
            inst.confirmed_violator = true;
            Self::count_violation(confirmed, stats);
        }

        let Some(head) = head else {
            return Ok(confirmed);
        };
        let _ = self.in_flight.pop_front();
        match head.class {
            InstClass::Load => stats.loads_committed += 1,
            InstClass::Store => stats.stores_committed += 1,
            InstClass::Atomic => stats.atomics_committed += 1,
            InstClass::CondBranch | InstClass::Other => {}
        }
        Ok(confirmed)
    }

    fn count_violation(confirmed: &ConfirmedViolation, stats: &mut MemDepStats) {
        let signature = &confirmed.signature;
        stats.violations += 1;
        if signature.violator_is_load {
            stats.violations_by_load += 1;
        } else {
            stats.violations_by_store += 1;
        }
        if signature.predicted_dependency {
            stats.mispredictions_false += 1;
        } else {
            stats.mispredictions_cold += 1;
        }
        stats.squash_to_commit.record(confirmed.squash_to_commit);
        tracing::debug!(
            violator = %signature.violator,
            at_prediction = signature.occurrence_at_prediction,
            distance = confirmed.squash_to_commit,
            "memory order violation confirmed"
        );
    }

    /// Returns the head if it has sequence number `seq_num`.
    fn head_for(&self, event: WindowEvent, seq_num: SeqNum) -> Result<InFlightEntry> {
        match self.in_flight.front() {
            Some(head) if head.seq_num == seq_num => Ok(*head),
            head => Err(MemDepError::WindowHeadMismatch {
                event,
                expected: head.map(|h| h.seq_num),
                found: seq_num,
            }),
        }
    }

    /// Logs every in-flight entry.
    pub fn dump_in_flight(&self) {
        for entry in &self.in_flight {
            tracing::debug!(
                uid = %entry.uid(),
                seq_num = entry.seq_num,
                class = ?entry.class,
                "in flight"
            );
        }
    }

    /// In-flight entries, oldest first.
    pub fn in_flight(&self) -> impl Iterator<Item = &InFlightEntry> {
        self.in_flight.iter()
    }

    /// Entry with sequence number `seq_num`, if in flight.
    pub fn find(&self, seq_num: SeqNum) -> Option<&InFlightEntry> {
        self.in_flight
            .binary_search_by_key(&seq_num, |e| e.seq_num)
            .ok()
            .and_then(|i| self.in_flight.get(i))
    }

    /// Number of in-flight memory instructions.
    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    /// Returns true if nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Current occurrence counter for `pc` (0 if never dispatched or fully rolled back).
    pub fn occurrence_count(&self, pc: u64) -> u64 {
        self.occurrences.get(&pc).copied().unwrap_or(0)
    }

    /// Current violation candidate state.
    pub const fn candidate(&self) -> &CandidateState {
        &self.candidate
    }

    /// Instructions committed so far.
    pub const fn retired(&self) -> u64 {
        self.retired
    }
}
