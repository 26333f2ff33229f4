use memdep_core::common::{DynInst, InstClass, SeqNum, StoreRef};

/// Fluent builder for dynamic instruction descriptors.
#[derive(Debug, Clone)]
pub struct InstBuilder {
    inst: DynInst,
}

impl InstBuilder {
    pub fn load(pc: u64, seq_num: SeqNum) -> Self {
        Self {
            inst: DynInst::new(pc, seq_num, InstClass::Load).with_access(0, 8),
        }
    }

    pub fn store(pc: u64, seq_num: SeqNum) -> Self {
        Self {
            inst: DynInst::new(pc, seq_num, InstClass::Store).with_access(0, 8),
        }
    }

    pub fn atomic(pc: u64, seq_num: SeqNum) -> Self {
        Self {
            inst: DynInst::new(pc, seq_num, InstClass::Atomic).with_access(0, 8),
        }
    }

    pub fn alu(pc: u64, seq_num: SeqNum) -> Self {
        Self {
            inst: DynInst::new(pc, seq_num, InstClass::Other),
        }
    }

    pub fn branch(pc: u64, seq_num: SeqNum, pred_taken: bool, mispredicted: bool) -> Self {
        let mut inst = DynInst::new(pc, seq_num, InstClass::CondBranch);
        inst.pred_taken = pred_taken;
        inst.mispredicted = mispredicted;
        Self { inst }
    }

    pub fn addr(mut self, eff_addr: u64) -> Self {
        self.inst.eff_addr = eff_addr;
        self
    }

    pub fn size(mut self, eff_size: u64) -> Self {
        self.inst.eff_size = eff_size;
        self
    }

    pub fn eff_seq(mut self, eff_seq_num: SeqNum) -> Self {
        self.inst.eff_seq_num = eff_seq_num;
        self
    }

    pub fn thread(mut self, thread_id: u32) -> Self {
        self.inst.thread_id = thread_id;
        self
    }

    /// Marks the instruction as squashed for memory ordering against `store`.
    pub fn violated_by(mut self, store: &DynInst) -> Self {
        self.inst.mem_violator = true;
        self.inst.violating_store = Some(StoreRef {
            uid: store.uid(),
            seq_num: store.seq_num,
        });
        self
    }

    pub fn build(self) -> DynInst {
        self.inst
    }
}
