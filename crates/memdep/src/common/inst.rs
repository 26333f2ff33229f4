//! Dynamic instruction descriptor.
//!
//! The host pipeline owns its own instruction objects; this is the subset of
//! fields the memory dependence unit reads, plus the slots it writes back
//! (occurrence index and confirmed-violator flag).

use super::{SeqNum, ThreadId, TraceUid};

/// Coarse classification of a dynamic instruction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InstClass {
    /// Memory read.
    Load,
    /// Memory write.
    Store,
    /// Atomic read-modify-write; tracked like a store for forwarding.
    Atomic,
    /// Conditional branch; only recorded in the full trace.
    CondBranch,
    /// Anything else; ignored except for commit counting.
    #[default]
    Other,
}

impl InstClass {
    /// Returns true for loads, stores, and atomics.
    #[inline]
    pub const fn is_memory(self) -> bool {
        matches!(self, Self::Load | Self::Store | Self::Atomic)
    }

    /// Returns true for instructions that write memory (stores and atomics).
    #[inline]
    pub const fn writes_memory(self) -> bool {
        matches!(self, Self::Store | Self::Atomic)
    }
}

/// Identity and sequence number of a store involved in a violation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct StoreRef {
    /// Dynamic identity of the store.
    pub uid: TraceUid,
    /// Sequence number of the store.
    pub seq_num: SeqNum,
}

/// A dynamic instruction as seen by the memory dependence unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DynInst {
    /// Program counter.
    pub pc: u64,
    /// Program-order sequence number.
    pub seq_num: SeqNum,
    /// Global sequence number across squashes, used only for trace output.
    pub eff_seq_num: SeqNum,
    /// Hardware thread; must be 0.
    pub thread_id: ThreadId,
    /// Instruction classification.
    pub class: InstClass,
    /// Effective address (valid once executed).
    pub eff_addr: u64,
    /// Access size in bytes.
    pub eff_size: u64,
    /// Set by the pipeline when this instruction is squashed for mis-speculated
    /// memory ordering.
    pub mem_violator: bool,
    /// The store whose value this instruction should have observed, when the
    /// pipeline knows it.
    pub violating_store: Option<StoreRef>,
    /// Whether a dependency was predicted for this instruction at dispatch.
    pub predicted_dependency: bool,
    /// Conditional branches: predicted direction.
    pub pred_taken: bool,
    /// Conditional branches: whether the prediction was wrong.
    pub mispredicted: bool,

    /// Occurrence index; written by the instance tracker.
    pub occurrence: u64,
    /// Set at commit when the violation state machine confirms this instance.
    pub confirmed_violator: bool,
}

impl DynInst {
    /// Creates a descriptor with the given PC, sequence number, and class.
    pub fn new(pc: u64, seq_num: SeqNum, class: InstClass) -> Self {
        Self {
            pc,
            seq_num,
            eff_seq_num: seq_num,
            class,
            ..Self::default()
        }
    }

    /// Creates a load descriptor.
    pub fn load(pc: u64, seq_num: SeqNum, eff_addr: u64, eff_size: u64) -> Self {
        Self::new(pc, seq_num, InstClass::Load).with_access(eff_addr, eff_size)
    }

    /// Creates a store descriptor.
    pub fn store(pc: u64, seq_num: SeqNum, eff_addr: u64, eff_size: u64) -> Self {
        Self::new(pc, seq_num, InstClass::Store).with_access(eff_addr, eff_size)
    }

    /// Sets the effective address and size.
    #[must_use]
    pub fn with_access(mut self, eff_addr: u64, eff_size: u64) -> Self {
        self.eff_addr = eff_addr;
        self.eff_size = eff_size;
        self
    }

    /// Returns the dynamic identity `(pc, occurrence)`.
    #[inline]
    pub const fn uid(&self) -> TraceUid {
        TraceUid::new(self.pc, self.occurrence)
    }

    /// Returns true for loads, stores, and atomics.
    #[inline]
    pub const fn is_memory(&self) -> bool {
        self.class.is_memory()
    }

    /// Returns true for loads.
    #[inline]
    pub const fn is_load(&self) -> bool {
        matches!(self.class, InstClass::Load)
    }

    /// Returns true for stores and atomics.
    #[inline]
    pub const fn writes_memory(&self) -> bool {
        self.class.writes_memory()
    }

    /// Byte addresses touched by this access.
    pub const fn footprint(&self) -> std::ops::Range<u64> {
        self.eff_addr..self.eff_addr.saturating_add(self.eff_size)
    }
}
