//! Never-type dead-code elimination over the emitted CFG.
//!
//! A block is never-terminating iff it calls a callee whose function
//! type returns `never`, or whose name matches the sentinel fallback
//! set. Successors of never blocks are unreachable; their edges are
//! deleted symmetrically and surviving conditional branches pick up
//! prediction hints.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;
use tracing::trace;

use super::ir::{BlockId, BranchHint, Cfg, Instr};

/// Name-based fallback for non-returning callees.
pub fn is_never_sentinel(name: &str) -> bool {
    matches!(name, "panic" | "abort" | "exit" | "unreachable")
        || name.ends_with("_never")
        || name.ends_with("_panic")
}

/// Mark blocks that contain a call to a non-returning callee.
/// `never_callees` holds the names whose declared type returns `never`.
pub fn mark_never_blocks(cfg: &mut Cfg, never_callees: &FxHashSet<String>) {
    for block in &mut cfg.blocks {
        let never = block.instrs.iter().any(|instr| match instr {
            Instr::Call { callee, .. } | Instr::FfiCall { callee, .. } => {
                never_callees.contains(callee) || is_never_sentinel(callee)
            }
            _ => false,
        });
        if never {
            block.never_terminating = true;
        }
    }
}

/// Apply the three never-type transforms: BFS-mark unreachable
/// successors, delete edges out of never blocks, and attach branch
/// hints to conditionals whose taken path reaches a never block.
pub fn apply_never_dce(cfg: &mut Cfg) {
    // 1. Everything reachable only as a successor of a never block is
    // unreachable; BFS transitively.
    let mut queue: VecDeque<BlockId> = VecDeque::new();
    for block in &cfg.blocks {
        if block.never_terminating {
            queue.extend(block.successors.iter().copied());
        }
    }
    while let Some(id) = queue.pop_front() {
        if cfg.blocks[id].is_unreachable || cfg.blocks[id].never_terminating {
            continue;
        }
        cfg.blocks[id].is_unreachable = true;
        trace!(block = id, "marked unreachable after never call");
        queue.extend(cfg.blocks[id].successors.iter().copied());
    }

    // 2. Remove successor edges from never blocks, keeping the reverse
    // lists consistent.
    let never_blocks: Vec<BlockId> = cfg
        .blocks
        .iter()
        .filter(|block| block.never_terminating)
        .map(|block| block.id)
        .collect();
    for id in never_blocks {
        let successors = cfg.blocks[id].successors.clone();
        for succ in successors {
            cfg.remove_edge(id, succ);
        }
    }

    // 3. Branch hints: a conditional whose taken path lands in a never
    // block is unlikely; the remaining path is likely.
    for index in 0..cfg.blocks.len() {
        let mut updated: Vec<Instr> = Vec::new();
        let mut changed = false;
        for instr in &cfg.blocks[index].instrs {
            if let Instr::Branch {
                cond,
                then_block,
                else_block,
                hint: None,
            } = instr
            {
                let then_never = leads_to_never(cfg, *then_block);
                let else_never = leads_to_never(cfg, *else_block);
                let hint = match (then_never, else_never) {
                    (true, false) => Some(BranchHint::Unlikely),
                    (false, true) => Some(BranchHint::Likely),
                    _ => None,
                };
                if hint.is_some() {
                    changed = true;
                    updated.push(Instr::Branch {
                        cond: *cond,
                        then_block: *then_block,
                        else_block: *else_block,
                        hint,
                    });
                    continue;
                }
            }
            updated.push(instr.clone());
        }
        if changed {
            cfg.blocks[index].instrs = updated;
        }
    }
}

/// A path "leads to never" when its entry block is never-terminating or
/// every one of its successors does.
fn leads_to_never(cfg: &Cfg, start: BlockId) -> bool {
    let mut visited: FxHashSet<BlockId> = FxHashSet::default();
    let mut current = start;
    loop {
        if !visited.insert(current) {
            return false;
        }
        let block = &cfg.blocks[current];
        if block.never_terminating {
            return true;
        }
        // Only straight-line paths are followed; diverging control flow
        // counts as escaping.
        match block.successors.as_slice() {
            [next] => current = *next,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::codegen::ir::ValueId;

    fn call(callee: &str) -> Instr {
        Instr::Call {
            dst: None,
            callee: callee.to_string(),
            args: Vec::new(),
        }
    }

    #[test]
    fn sentinel_names_cover_suffixes() {
        assert!(is_never_sentinel("panic"));
        assert!(is_never_sentinel("abort"));
        assert!(is_never_sentinel("exit"));
        assert!(is_never_sentinel("unreachable"));
        assert!(is_never_sentinel("fail_never"));
        assert!(is_never_sentinel("assert_panic"));
        assert!(!is_never_sentinel("log"));
    }

    #[test]
    fn successors_of_never_block_are_elided() {
        let mut cfg = Cfg::new();
        let entry = cfg.entry;
        let after = cfg.add_block();
        let tail = cfg.add_block();
        cfg.push(entry, call("panic"));
        cfg.push(after, call("log"));
        cfg.add_edge(entry, after);
        cfg.add_edge(after, tail);

        mark_never_blocks(&mut cfg, &FxHashSet::default());
        apply_never_dce(&mut cfg);

        assert!(cfg.block(entry).never_terminating);
        assert!(cfg.block(after).is_unreachable);
        assert!(cfg.block(tail).is_unreachable);
        assert!(cfg.block(entry).successors.is_empty());
        assert!(cfg.block(after).predecessors.is_empty());
        assert!(cfg.edges_are_symmetric());
    }

    #[test]
    fn typed_never_callees_are_detected_without_sentinel_names() {
        let mut cfg = Cfg::new();
        let entry = cfg.entry;
        cfg.push(entry, call("shutdown"));

        let mut never_callees = FxHashSet::default();
        never_callees.insert("shutdown".to_string());
        mark_never_blocks(&mut cfg, &never_callees);

        assert!(cfg.block(entry).never_terminating);
    }

    #[test]
    fn branch_into_never_path_is_hinted_unlikely() {
        let mut cfg = Cfg::new();
        let entry = cfg.entry;
        let error_path = cfg.add_block();
        let happy_path = cfg.add_block();

        cfg.push(
            entry,
            Instr::Branch {
                cond: ValueId(0),
                then_block: error_path,
                else_block: happy_path,
                hint: None,
            },
        );
        cfg.push(error_path, call("panic"));
        cfg.push(happy_path, Instr::Return { value: None });
        cfg.add_edge(entry, error_path);
        cfg.add_edge(entry, happy_path);

        mark_never_blocks(&mut cfg, &FxHashSet::default());
        apply_never_dce(&mut cfg);

        let Instr::Branch { hint, .. } = &cfg.block(entry).instrs[0] else {
            panic!("expected branch");
        };
        assert_eq!(*hint, Some(BranchHint::Unlikely));
    }

    #[test]
    fn live_blocks_exclude_unreachable_ones() {
        let mut cfg = Cfg::new();
        let entry = cfg.entry;
        let dead = cfg.add_block();
        cfg.push(entry, call("abort"));
        cfg.add_edge(entry, dead);

        mark_never_blocks(&mut cfg, &FxHashSet::default());
        apply_never_dce(&mut cfg);

        let live: Vec<BlockId> = cfg.live_blocks().map(|b| b.id).collect();
        assert_eq!(live, vec![entry]);
    }
}
