//! Loop-invariant code motion (`spec.md` §4.5 rule 5).
//!
//! Pure values whose operands are all defined outside a natural loop are
//! moved to that loop's preheader (the nearest dominator of the loop
//! header that sits outside the loop), so they compute once instead of
//! once per iteration.

use crate::dominator_tree::DominatorTree;
use crate::ir::{Block, Function, Opcode};
use log::trace;
use std::collections::{HashMap, HashSet};

pub fn run(func: &mut Function) {
    let tree = DominatorTree::compute(func);
    for (header, body) in natural_loops(func, &tree) {
        hoist_loop(func, header, &body, &tree);
    }
}

/// Find natural loops: for every back edge `tail -> header` (a CFG edge
/// whose target dominates its source), the loop body is every block
/// that can reach `tail` by walking backward from it without leaving
/// through `header`.
fn natural_loops(func: &Function, tree: &DominatorTree) -> Vec<(Block, HashSet<Block>)> {
    let mut preds: HashMap<Block, Vec<Block>> = HashMap::new();
    let mut back_edges = Vec::new();
    for block in func.blocks() {
        let Some(term) = func.layout.last_value_in_block(block) else {
            continue;
        };
        for (succ, _) in func.dfg.value(term).opcode.successors(&func.dfg.value_lists) {
            preds.entry(succ).or_default().push(block);
            if tree.dominates(succ, block) {
                back_edges.push((block, succ));
            }
        }
    }

    let mut loops = Vec::new();
    for (tail, header) in back_edges {
        let mut body = HashSet::new();
        body.insert(header);
        let mut stack = vec![tail];
        body.insert(tail);
        while let Some(b) = stack.pop() {
            for &p in preds.get(&b).map(|v| v.as_slice()).unwrap_or(&[]) {
                if body.insert(p) {
                    stack.push(p);
                }
            }
        }
        loops.push((header, body));
    }
    loops
}

fn hoist_loop(func: &mut Function, header: Block, body: &HashSet<Block>, tree: &DominatorTree) {
    let Some(preheader) = tree.idom(header) else {
        return; // header has no dominator (is the entry block) — nothing outside to hoist into
    };
    if body.contains(&preheader) {
        return; // loop swallows its own idom (irreducible-ish edge case); leave it alone
    }
    let Some(insert_point) = func.layout.last_value_in_block(preheader) else {
        return;
    };

    loop {
        let mut hoisted_one = false;
        'blocks: for &block in body {
            let candidates: Vec<_> = func.layout.block_values(block).collect();
            for v in candidates {
                let opcode = func.dfg.value(v).opcode.clone();
                if opcode.has_side_effects() || matches!(opcode, Opcode::BlockParam) {
                    continue;
                }
                let operands = opcode.args(&func.dfg.value_lists);
                let invariant = operands.iter().all(|&o| {
                    let def_block = func.layout.value_block(o).expect("operand must be laid out");
                    !body.contains(&def_block)
                });
                if invariant && func.layout.value_block(v) != Some(preheader) {
                    trace!("licm: hoisting {v} from {block} to preheader {preheader}");
                    func.layout.remove_value(v);
                    func.layout.insert_value_before(v, insert_point);
                    func.dfg.set_value_block(v, preheader);
                    hoisted_one = true;
                    break 'blocks;
                }
            }
        }
        if !hoisted_one {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArithmeticFlags, BinaryOp, ConstantValue, FunctionBuilder, FunctionScope, Signature, TypeSystem};

    #[test]
    fn hoists_loop_invariant_add_to_the_preheader() {
        let types = TypeSystem::new(crate::ir::DataLayout::lp64());
        let i32_ty = types.int(32, true);
        let mut f = Function::new(
            "f",
            Signature {
                params: vec![],
                ret: types.void(),
            },
            FunctionScope::DeviceFunction,
        );
        let invariant_add;
        {
            let mut b = FunctionBuilder::new(&mut f, &types);
            let preheader = b.create_block();
            let header = b.create_block();
            let exit = b.create_block();
            b.switch_to_block(preheader).unwrap();
            let a = b.create_const(i32_ty, ConstantValue::Int(1)).unwrap();
            let c = b.create_const(i32_ty, ConstantValue::Int(2)).unwrap();
            b.create_jump(header, &[]).unwrap();

            b.switch_to_block(header).unwrap();
            invariant_add = b.create_binary(BinaryOp::Add, a, c, ArithmeticFlags::new()).unwrap();
            let cond = b.create_const(types.bool_(), ConstantValue::Bool(false)).unwrap();
            b.create_branch(cond, header, &[], exit, &[]).unwrap();

            b.switch_to_block(exit).unwrap();
            b.create_return(&[]).unwrap();
        }
        run(&mut f);
        let blocks: Vec<_> = f.blocks().collect();
        let preheader = blocks[0];
        assert_eq!(f.layout.value_block(invariant_add), Some(preheader));
    }
}
