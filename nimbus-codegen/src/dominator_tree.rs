//! Dominator tree over a function's reducible CFG.
//!
//! Grounded on `cranelift-codegen::dominator_tree`: the same iterative
//! reverse-postorder fixpoint algorithm (Cooper, Harvey & Kennedy,
//! "A Simple, Fast Dominance Algorithm"), used here by dead-code
//! elimination and loop-invariant hoisting (`spec.md` §4.5 rules 2, 5)
//! to decide whether an operand's definition dominates a use.

use crate::ir::{Block, Function};
use nimbus_entity::{PackedOption, SecondaryMap};
use std::collections::HashMap;

/// Computed once per optimization run over a [`Function`]; every pass
/// that needs dominance queries shares one instance rather than
/// recomputing it.
#[derive(Debug, Default)]
pub struct DominatorTree {
    idom: SecondaryMap<Block, PackedOption<Block>>,
    rpo: Vec<Block>,
    rpo_number: HashMap<Block, u32>,
}

impl DominatorTree {
    /// Recompute the tree for `func`. `func` must have a reducible CFG
    /// (`spec.md` §3 "Method" invariant); this is the frontend's
    /// responsibility, not this pass's.
    pub fn compute(func: &Function) -> Self {
        let mut tree = DominatorTree::default();
        let Some(entry) = func.entry_block.expand() else {
            return tree;
        };
        let succ = successors_map(func);
        let preds = predecessors_map(func, &succ);
        tree.rpo = reverse_postorder(entry, &succ);
        for (i, b) in tree.rpo.iter().enumerate() {
            tree.rpo_number.insert(*b, i as u32);
        }
        tree.idom[entry] = entry.into();

        let mut changed = true;
        while changed {
            changed = false;
            // Skip the entry block (index 0): it dominates itself by definition.
            for &block in tree.rpo.iter().skip(1) {
                let mut new_idom: Option<Block> = None;
                for &pred in preds.get(&block).map(|v| v.as_slice()).unwrap_or(&[]) {
                    if tree.idom.get(pred).map(|p| p.is_some()).unwrap_or(false) || pred == entry {
                        new_idom = Some(match new_idom {
                            None => pred,
                            Some(current) => tree.intersect(current, pred),
                        });
                    }
                }
                if let Some(new_idom) = new_idom {
                    if tree.idom[block].expand() != Some(new_idom) {
                        tree.idom[block] = new_idom.into();
                        changed = true;
                    }
                }
            }
        }
        tree
    }

    fn intersect(&self, mut a: Block, mut b: Block) -> Block {
        while a != b {
            while self.rpo_number[&a] > self.rpo_number[&b] {
                a = self.idom[a].unwrap();
            }
            while self.rpo_number[&b] > self.rpo_number[&a] {
                b = self.idom[b].unwrap();
            }
        }
        a
    }

    /// The immediate dominator of `block`, or `None` for the entry block
    /// or an unreachable block.
    pub fn idom(&self, block: Block) -> Option<Block> {
        self.idom.get(block).and_then(|p| p.expand())
    }

    /// Does `a` dominate `b` (reflexively — every block dominates itself)?
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        if a == b {
            return true;
        }
        let Some(&b_num) = self.rpo_number.get(&b) else {
            return false;
        };
        let Some(&a_num) = self.rpo_number.get(&a) else {
            return false;
        };
        let mut cur = b;
        loop {
            match self.idom(cur) {
                Some(next) if next == cur => return false,
                Some(next) => {
                    if next == a {
                        return true;
                    }
                    if self.rpo_number.get(&next).copied().unwrap_or(0) < a_num {
                        return false;
                    }
                    cur = next;
                }
                None => return false,
            }
        }
    }

    /// Reverse-postorder position, used by passes that need a total
    /// order consistent with dominance (e.g. the register allocator's
    /// linearized block order, `spec.md` §4.6).
    pub fn rpo(&self) -> &[Block] {
        &self.rpo
    }

    pub fn is_reachable(&self, block: Block) -> bool {
        self.rpo_number.contains_key(&block)
    }
}

fn successors_map(func: &Function) -> HashMap<Block, Vec<Block>> {
    let mut map = HashMap::new();
    for block in func.blocks() {
        if let Some(last) = func.layout.last_value_in_block(block) {
            let succs: Vec<Block> = func
                .dfg
                .value(last)
                .opcode
                .successors(&func.dfg.value_lists)
                .into_iter()
                .map(|(b, _)| b)
                .collect();
            map.insert(block, succs);
        }
    }
    map
}

fn predecessors_map(func: &Function, succ: &HashMap<Block, Vec<Block>>) -> HashMap<Block, Vec<Block>> {
    let mut preds: HashMap<Block, Vec<Block>> = HashMap::new();
    for block in func.blocks() {
        preds.entry(block).or_default();
    }
    for (&from, tos) in succ {
        for &to in tos {
            preds.entry(to).or_default().push(from);
        }
    }
    preds
}

fn reverse_postorder(entry: Block, succ: &HashMap<Block, Vec<Block>>) -> Vec<Block> {
    let mut visited = std::collections::HashSet::new();
    let mut postorder = Vec::new();
    let mut stack = vec![(entry, 0usize)];
    visited.insert(entry);
    while let Some((block, next_idx)) = stack.pop() {
        let succs = succ.get(&block).map(|v| v.as_slice()).unwrap_or(&[]);
        if next_idx < succs.len() {
            let next = succs[next_idx];
            stack.push((block, next_idx + 1));
            if visited.insert(next) {
                stack.push((next, 0));
            }
        } else {
            postorder.push(block);
        }
    }
    postorder.reverse();
    postorder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionScope, Signature, TypeSystem};

    fn build_diamond() -> Function {
        let types = TypeSystem::new(crate::ir::DataLayout::lp64());
        let mut f = Function::new(
            "diamond",
            Signature {
                params: vec![],
                ret: types.void(),
            },
            FunctionScope::DeviceFunction,
        );
        {
            let mut b = crate::ir::FunctionBuilder::new(&mut f, &types);
            let entry = b.create_block();
            let left = b.create_block();
            let right = b.create_block();
            let join = b.create_block();
            b.switch_to_block(entry).unwrap();
            let cond = b.create_const(types.bool_(), crate::ir::ConstantValue::Bool(true)).unwrap();
            b.create_branch(cond, left, &[], right, &[]).unwrap();
            b.switch_to_block(left).unwrap();
            b.create_jump(join, &[]).unwrap();
            b.switch_to_block(right).unwrap();
            b.create_jump(join, &[]).unwrap();
            b.switch_to_block(join).unwrap();
            b.create_return(&[]).unwrap();
        }
        f
    }

    #[test]
    fn entry_dominates_everything() {
        let f = build_diamond();
        let tree = DominatorTree::compute(&f);
        let entry = f.entry_block.expand().unwrap();
        for block in f.blocks() {
            assert!(tree.dominates(entry, block));
        }
    }

    #[test]
    fn join_block_is_dominated_only_by_entry() {
        let f = build_diamond();
        let tree = DominatorTree::compute(&f);
        let blocks: Vec<_> = f.blocks().collect();
        let join = blocks[3];
        let left = blocks[1];
        assert!(!tree.dominates(left, join));
        let entry = blocks[0];
        assert_eq!(tree.idom(join), Some(entry));
    }
}
