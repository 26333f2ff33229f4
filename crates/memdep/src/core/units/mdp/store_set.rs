//! Store Set memory dependence predictor.
//!
//! Implements the predictor from "Memory Dependence Prediction using Store Sets"
//! (Chrysos and Emer). Static loads and stores that have been caught violating
//! memory order are placed in a common store set; a load is then predicted to
//! depend on the most recently fetched, not yet issued store of its set.
//!
//! - **SSIT** (Store Set ID Table): PC-indexed table of store set IDs.
//! - **LFST** (Last Fetched Store Table): store set ID to sequence number of the
//!   youngest fetched store in that set.
//!
//! The SSIT index can optionally fold in the outcomes of the conditional branches
//! that precede the instruction, so one static load reached along different paths
//! trains different entries.
//!
//! # Performance
//!
//! - **Time Complexity:**
//!   - `check_inst()`: O(H) where H is the branch history length (O(1) without history)
//!   - `insert_store()` / `issued()`: O(log S) where S is the number of unissued stores
//!   - `squash()`: O(K log S) for K squashed stores
//! - **Space Complexity:** O(SSIT + LFST + S + B) for B recorded branches

use std::collections::{BTreeMap, BTreeSet};

use crate::common::error::Result;
use crate::common::{SeqNum, ThreadId};
use crate::config::{MAX_BRANCH_HISTORY_LENGTH, StoreSetConfig};

/// Store set identifier (an LFST index).
pub type StoreSetId = usize;

/// Instruction alignment bits dropped from the PC before indexing.
const OFFSET_BITS: u32 = 2;

/// Resolved branches kept for history folding.
pub const MAX_BRANCH_RECORDS: usize = 4096;

/// Store set predictor.
#[derive(Debug, Clone)]
pub struct StoreSetPredictor {
    /// Store Set ID Table.
    ssit: Vec<StoreSetId>,
    /// Valid bits for the SSIT.
    valid_ssit: Vec<bool>,
    /// Last Fetched Store Table.
    lfst: Vec<SeqNum>,
    /// Valid bits for the LFST.
    valid_lfst: Vec<bool>,
    /// Stores inserted but not yet issued or squashed, with their store set.
    store_list: BTreeMap<SeqNum, StoreSetId>,
    /// Resolved conditional branches: sequence number to taken.
    branch_history: BTreeMap<SeqNum, bool>,
    /// Branch outcomes folded into the SSIT index.
    branch_hist_length: u32,
    /// Predicted operations between table wipes.
    clear_period: u64,
    /// Predicted operations since the last wipe.
    mem_ops_pred: u64,
    /// Mask applied to SSIT indices.
    index_mask: u64,
    /// Number of SSIT index bits.
    index_bits: u32,
}

impl StoreSetPredictor {
    /// Creates a predictor with all entries invalid.
    pub fn new(config: &StoreSetConfig) -> Result<Self> {
        let mut predictor = Self {
            ssit: Vec::new(),
            valid_ssit: Vec::new(),
            lfst: Vec::new(),
            valid_lfst: Vec::new(),
            store_list: BTreeMap::new(),
            branch_history: BTreeMap::new(),
            branch_hist_length: 0,
            clear_period: 0,
            mem_ops_pred: 0,
            index_mask: 0,
            index_bits: 0,
        };
        predictor.init(
            config.clear_period,
            config.ssit_size,
            config.lfst_size,
            config.branch_history_length,
        )?;
        Ok(predictor)
    }

    /// (Re)allocates the tables with the given sizes; all entries become invalid.
    pub fn init(
        &mut self,
        clear_period: u64,
        ssit_size: usize,
        lfst_size: usize,
        branch_hist_length: u32,
    ) -> Result<()> {
        StoreSetConfig {
            clear_period,
            ssit_size,
            lfst_size,
            branch_history_length: branch_hist_length,
        }
        .validate()?;
        debug_assert!(branch_hist_length <= MAX_BRANCH_HISTORY_LENGTH);

        self.ssit = vec![0; ssit_size];
        self.valid_ssit = vec![false; ssit_size];
        self.lfst = vec![0; lfst_size];
        self.valid_lfst = vec![false; lfst_size];
        self.store_list.clear();
        self.branch_history.clear();
        self.branch_hist_length = branch_hist_length;
        self.clear_period = clear_period;
        self.mem_ops_pred = 0;
        self.index_mask = ssit_size as u64 - 1;
        self.index_bits = ssit_size.trailing_zeros();

        tracing::debug!(
            ssit_size,
            lfst_size,
            clear_period,
            branch_hist_length,
            "store set predictor initialized"
        );
        Ok(())
    }

    /// SSIT index from the PC alone.
    #[inline]
    pub const fn calc_index(&self, pc: u64) -> usize {
        ((pc >> OFFSET_BITS) & self.index_mask) as usize
    }

    /// SSIT index with the preceding branch history folded in.
    ///
    /// Walks back from the newest recorded branch to the first one older than
    /// `seq_num`, packs up to `branch_hist_length` outcomes (most recent in bit 0),
    /// aligns the packed word with the top of the index, and XORs it into the PC
    /// index. Histories longer than the index are folded down in index-sized chunks.
    pub fn calc_index_with_history(&self, pc: u64, seq_num: SeqNum) -> usize {
        let len = self.branch_hist_length;
        if len == 0 || self.index_bits == 0 {
            return self.calc_index(pc);
        }

        let mut history = 0u64;
        for (i, (_, &taken)) in self
            .branch_history
            .range(..seq_num)
            .rev()
            .take(len as usize)
            .enumerate()
        {
            history |= u64::from(taken) << i;
        }

        let aligned = if len < self.index_bits {
            history << (self.index_bits - len)
        } else {
            let mut folded = 0u64;
            let mut rest = history;
            while rest != 0 {
                folded ^= rest & self.index_mask;
                rest = rest.checked_shr(self.index_bits).unwrap_or(0);
            }
            folded
        };

        (((pc >> OFFSET_BITS) ^ aligned) & self.index_mask) as usize
    }

    /// Store set ID freshly derived from a PC.
    #[inline]
    pub fn calc_ssid(&self, pc: u64) -> StoreSetId {
        ((pc ^ (pc >> 10)) % self.lfst.len() as u64) as StoreSetId
    }

    /// Index used for all SSIT lookups.
    #[inline]
    fn index(&self, pc: u64, seq_num: SeqNum) -> usize {
        if self.branch_hist_length == 0 {
            self.calc_index(pc)
        } else {
            self.calc_index_with_history(pc, seq_num)
        }
    }

    /// Records a memory-order violation between an older store and a younger load.
    ///
    /// Both instructions end up in the same store set: the store's current set if it
    /// has one, otherwise a set derived from the store's PC.
    pub fn violation(
        &mut self,
        store_pc: u64,
        store_seq_num: SeqNum,
        load_pc: u64,
        load_seq_num: SeqNum,
    ) {
        let store_index = self.index(store_pc, store_seq_num);
        let load_index = self.index(load_pc, load_seq_num);

        let ssid = if self.valid_ssit[store_index] {
            self.ssit[store_index]
        } else {
            self.calc_ssid(store_pc)
        };

        self.ssit[store_index] = ssid;
        self.valid_ssit[store_index] = true;
        self.ssit[load_index] = ssid;
        self.valid_ssit[load_index] = true;

        tracing::debug!(
            store_pc,
            load_pc,
            store_index,
            load_index,
            ssid,
            "store set violation merge"
        );
    }

    /// Counts one predicted operation and wipes the tables every `clear_period`.
    ///
    /// Returns true when the tables were wiped.
    pub fn check_clear(&mut self) -> bool {
        self.mem_ops_pred += 1;
        if self.mem_ops_pred >= self.clear_period {
            tracing::debug!(
                period = self.clear_period,
                "wiping store set predictor after clear period"
            );
            self.mem_ops_pred = 0;
            self.clear();
            true
        } else {
            false
        }
    }

    /// Inserts a load. Loads do not update the tables; this exists so loads and
    /// stores take the same path through the predictor.
    pub fn insert_load(&mut self, load_pc: u64, load_seq_num: SeqNum) {
        tracing::trace!(load_pc, load_seq_num, "store set insert load");
    }

    /// Inserts a store; if its PC has a valid store set, it becomes that set's
    /// last fetched store.
    pub fn insert_store(&mut self, store_pc: u64, store_seq_num: SeqNum, tid: ThreadId) {
        let index = self.index(store_pc, store_seq_num);
        if !self.valid_ssit[index] {
            return;
        }

        let ssid = self.ssit[index];
        self.lfst[ssid] = store_seq_num;
        self.valid_lfst[ssid] = true;
        let _ = self.store_list.insert(store_seq_num, ssid);

        tracing::trace!(store_pc, store_seq_num, ssid, tid, "store set insert");
    }

    /// Returns the sequence number of the store `pc` is predicted to depend on.
    pub fn check_inst(&self, pc: u64, seq_num: SeqNum) -> Option<SeqNum> {
        let index = self.index(pc, seq_num);
        if !self.valid_ssit[index] {
            return None;
        }

        let ssid = self.ssit[index];
        if self.valid_lfst[ssid] {
            tracing::trace!(pc, seq_num, ssid, producer = self.lfst[ssid], "store set hit");
            Some(self.lfst[ssid])
        } else {
            None
        }
    }

    /// Records an instruction as issued.
    ///
    /// Only stores matter: an issued store is no longer a pending producer, so it
    /// leaves the store list and stops being its set's last fetched store.
    pub fn issued(&mut self, issued_pc: u64, issued_seq_num: SeqNum, is_store: bool) {
        if !is_store {
            return;
        }

        let Some(ssid) = self.store_list.remove(&issued_seq_num) else {
            return;
        };

        if self.valid_lfst[ssid] && self.lfst[ssid] == issued_seq_num {
            self.valid_lfst[ssid] = false;
        }
        tracing::trace!(issued_pc, issued_seq_num, ssid, "store set issued");
    }

    /// Squashes every pending store with sequence number `>= squashed_num`.
    ///
    /// Each affected LFST entry falls back to the youngest surviving pending store of
    /// its set, or becomes invalid if there is none. Branch records at or after the
    /// squash point are discarded as well.
    pub fn squash(&mut self, squashed_num: SeqNum, tid: ThreadId) {
        let squashed = self.store_list.split_off(&squashed_num);
        let _ = self.branch_history.split_off(&squashed_num);
        if squashed.is_empty() {
            return;
        }

        let sets: BTreeSet<StoreSetId> = squashed.values().copied().collect();
        for ssid in sets {
            if !self.valid_lfst[ssid] || self.lfst[ssid] < squashed_num {
                continue;
            }
            match self
                .store_list
                .iter()
                .rev()
                .find(|&(_, &set)| set == ssid)
                .map(|(&seq, _)| seq)
            {
                Some(seq) => self.lfst[ssid] = seq,
                None => self.valid_lfst[ssid] = false,
            }
        }

        tracing::trace!(
            squashed_num,
            tid,
            stores = squashed.len(),
            "store set squash"
        );
    }

    /// Records a resolved conditional branch for history folding.
    pub fn record_branch(&mut self, seq_num: SeqNum, taken: bool) {
        let _ = self.branch_history.insert(seq_num, taken);
        while self.branch_history.len() > MAX_BRANCH_RECORDS {
            let _ = self.branch_history.pop_first();
        }
    }

    /// Invalidates every table entry and forgets pending stores.
    pub fn clear(&mut self) {
        self.valid_ssit.fill(false);
        self.valid_lfst.fill(false);
        self.store_list.clear();
    }

    /// Logs the pending store list.
    pub fn dump(&self) {
        tracing::debug!(pending = self.store_list.len(), "store set store list");
        for (seq_num, ssid) in &self.store_list {
            tracing::debug!(seq_num, ssid, "pending store");
        }
    }

    /// Number of valid SSIT entries.
    pub fn valid_ssit_entries(&self) -> usize {
        self.valid_ssit.iter().filter(|v| **v).count()
    }

    /// Number of valid LFST entries.
    pub fn valid_lfst_entries(&self) -> usize {
        self.valid_lfst.iter().filter(|v| **v).count()
    }

    /// Number of pending (fetched, unissued) stores.
    pub fn pending_stores(&self) -> usize {
        self.store_list.len()
    }

    /// Predicted operations since the last wipe.
    pub const fn ops_since_clear(&self) -> u64 {
        self.mem_ops_pred
    }

    /// Number of recorded branches.
    pub fn branch_records(&self) -> usize {
        self.branch_history.len()
    }

    /// Store set currently assigned to `pc`, if any.
    pub fn store_set_of(&self, pc: u64, seq_num: SeqNum) -> Option<StoreSetId> {
        let index = self.index(pc, seq_num);
        self.valid_ssit[index].then(|| self.ssit[index])
    }
}
