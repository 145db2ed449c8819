//! Target-independent IR consumed by the external emission backend.
//!
//! Values are virtual ids; blocks keep symmetric successor/predecessor
//! edge lists so the never-type pass can delete edges without breaking
//! the reverse invariant.

use crate::models::ast::{BinaryOp, UnaryOp};

use super::ffi::MarshalPlan;

pub type BlockId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

/// Advisory branch prediction for the then-path of a conditional; the
/// other path is implied opposite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchHint {
    Likely,
    Unlikely,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    ConstInt {
        dst: ValueId,
        value: i128,
    },
    ConstFloat {
        dst: ValueId,
        value: f64,
    },
    ConstBool {
        dst: ValueId,
        value: bool,
    },
    /// String literals construct through the runtime's string ctor.
    ConstStr {
        dst: ValueId,
        value: String,
    },
    LoadLocal {
        dst: ValueId,
        name: String,
    },
    StoreLocal {
        name: String,
        src: ValueId,
    },
    LoadField {
        dst: ValueId,
        object: ValueId,
        field: String,
    },
    Binary {
        dst: ValueId,
        op: BinaryOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Unary {
        dst: ValueId,
        op: UnaryOp,
        operand: ValueId,
    },
    /// Load a slice's length once; iteration strides by element size.
    SliceLen {
        dst: ValueId,
        slice: ValueId,
    },
    SliceElem {
        dst: ValueId,
        slice: ValueId,
        index: ValueId,
        element_size: usize,
    },
    StoreElem {
        slice: ValueId,
        index: ValueId,
        src: ValueId,
        element_size: usize,
    },
    StoreField {
        object: ValueId,
        field: String,
        src: ValueId,
    },
    Call {
        dst: Option<ValueId>,
        callee: String,
        args: Vec<ValueId>,
    },
    /// Foreign call with its marshaling plan attached.
    FfiCall {
        dst: Option<ValueId>,
        callee: String,
        args: Vec<ValueId>,
        plan: Box<MarshalPlan>,
    },
    Jump {
        target: BlockId,
    },
    Branch {
        cond: ValueId,
        then_block: BlockId,
        else_block: BlockId,
        hint: Option<BranchHint>,
    },
    Return {
        value: Option<ValueId>,
    },
    Unreachable,
}

#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    pub id: BlockId,
    pub instrs: Vec<Instr>,
    pub successors: Vec<BlockId>,
    pub predecessors: Vec<BlockId>,
    /// Contains a call that never returns.
    pub never_terminating: bool,
    /// Downstream of a never-terminating block; elided from emission.
    pub is_unreachable: bool,
}

#[derive(Debug, Clone)]
pub struct Cfg {
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
}

impl Cfg {
    pub fn new() -> Self {
        let mut cfg = Self {
            blocks: Vec::new(),
            entry: 0,
        };
        cfg.entry = cfg.add_block();
        cfg
    }

    pub fn add_block(&mut self) -> BlockId {
        let id = self.blocks.len();
        self.blocks.push(BasicBlock {
            id,
            ..BasicBlock::default()
        });
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id]
    }

    pub fn push(&mut self, block: BlockId, instr: Instr) {
        self.blocks[block].instrs.push(instr);
    }

    /// Add a forward edge and its reverse edge.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        if !self.blocks[from].successors.contains(&to) {
            self.blocks[from].successors.push(to);
        }
        if !self.blocks[to].predecessors.contains(&from) {
            self.blocks[to].predecessors.push(from);
        }
    }

    /// Remove an edge, deleting the reverse edge from the successor's
    /// predecessor list to keep the invariant.
    pub fn remove_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from].successors.retain(|id| *id != to);
        self.blocks[to].predecessors.retain(|id| *id != from);
    }

    pub fn edges_are_symmetric(&self) -> bool {
        self.blocks.iter().all(|block| {
            block
                .successors
                .iter()
                .all(|succ| self.blocks[*succ].predecessors.contains(&block.id))
                && block
                    .predecessors
                    .iter()
                    .all(|pred| self.blocks[*pred].successors.contains(&block.id))
        })
    }

    /// Blocks that survive never-type DCE, in id order.
    pub fn live_blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter().filter(|block| !block.is_unreachable)
    }
}

impl Default for Cfg {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct IrFunction {
    pub name: String,
    pub params: Vec<String>,
    pub cfg: Cfg,
}

#[derive(Debug)]
pub struct IrModule {
    pub functions: Vec<IrFunction>,
    pub consts: Vec<super::consts::ConstLowering>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_stay_symmetric_through_add_and_remove() {
        let mut cfg = Cfg::new();
        let a = cfg.entry;
        let b = cfg.add_block();
        let c = cfg.add_block();

        cfg.add_edge(a, b);
        cfg.add_edge(b, c);
        cfg.add_edge(a, b); // idempotent
        assert!(cfg.edges_are_symmetric());
        assert_eq!(cfg.block(b).predecessors, vec![a]);

        cfg.remove_edge(a, b);
        assert!(cfg.edges_are_symmetric());
        assert!(cfg.block(b).predecessors.is_empty());
        assert!(cfg.block(a).successors.is_empty());
    }
}
