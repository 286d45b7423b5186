//! CFG simplification (`spec.md` §4.5 rule 3): merge a block into its
//! unique predecessor when the predecessor ends in an unconditional jump
//! to it, and fold conditional branches whose condition is a constant.

use crate::ir::{Block, ConstantValue, Function, Opcode, Value};
use log::trace;
use std::collections::HashMap;

pub fn run(func: &mut Function) {
    loop {
        let folded = fold_constant_branches(func);
        let merged = merge_jump_only_predecessors(func);
        if !folded && !merged {
            break;
        }
    }
}

fn fold_constant_branches(func: &mut Function) -> bool {
    let mut changed = false;
    let blocks: Vec<_> = func.blocks().collect();
    for block in blocks {
        let Some(term) = func.layout.last_value_in_block(block) else {
            continue;
        };
        let Opcode::Branch {
            cond,
            then_block,
            ref then_args,
            else_block,
            ref else_args,
        } = func.dfg.value(term).opcode
        else {
            continue;
        };
        let Opcode::Const(ConstantValue::Bool(taken)) = func.dfg.value(cond).opcode else {
            continue;
        };
        let (target, args) = if taken {
            (then_block, then_args.clone())
        } else {
            (else_block, else_args.clone())
        };
        trace!("cfg-simplify: constant branch in {block} resolves to jump {target}");
        func.dfg.replace_opcode(term, Opcode::Jump { block: target, args });
        changed = true;
    }
    changed
}

/// Count, for every block, how many distinct terminators jump or branch
/// into it (a block reachable from two different arms of the same
/// `Branch` counts twice — it is not "merge-able" even though it only
/// has one predecessor *block*).
fn predecessor_edges(func: &Function) -> HashMap<Block, Vec<Value>> {
    let mut preds: HashMap<Block, Vec<Value>> = HashMap::new();
    for block in func.blocks() {
        if let Some(term) = func.layout.last_value_in_block(block) {
            for (succ, _) in func.dfg.value(term).opcode.successors(&func.dfg.value_lists) {
                preds.entry(succ).or_default().push(term);
            }
        }
    }
    preds
}

fn merge_jump_only_predecessors(func: &mut Function) -> bool {
    let mut changed = false;
    loop {
        let preds = predecessor_edges(func);
        let entry = func.entry_block.expand();
        let mut did_merge = false;
        for block in func.blocks().collect::<Vec<_>>() {
            if Some(block) == entry {
                continue; // the entry block has no predecessor to merge into
            }
            let Some(edges) = preds.get(&block) else { continue };
            if edges.len() != 1 {
                continue;
            }
            let jump_value = edges[0];
            let Some(pred_block) = func.layout.value_block(jump_value) else {
                continue;
            };
            let Opcode::Jump { args, .. } = func.dfg.value(jump_value).opcode.clone() else {
                continue; // only an unconditional Jump terminator is merge-able
            };
            if pred_block == block {
                continue; // self-loop, not a CFG simplification target
            }
            let params: Vec<Value> = func.dfg.block_params(block).to_vec();
            let arg_values = args.as_slice(&func.dfg.value_lists).to_vec();
            debug_assert_eq!(params.len(), arg_values.len());
            for (param, arg) in params.iter().zip(arg_values.iter()) {
                func.dfg.replace_all_uses(*param, *arg);
            }
            func.layout.remove_value(jump_value);
            func.dfg.remove_value(jump_value);
            func.layout.merge_block_into(pred_block, block);
            func.layout.remove_block(block);
            trace!("cfg-simplify: merged {block} into its unique predecessor {pred_block}");
            did_merge = true;
            changed = true;
            break; // predecessor map is now stale; recompute
        }
        if !did_merge {
            break;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, FunctionScope, Signature, TypeSystem};

    #[test]
    fn merges_a_jump_only_successor() {
        let types = TypeSystem::new(crate::ir::DataLayout::lp64());
        let mut f = Function::new(
            "f",
            Signature {
                params: vec![],
                ret: types.void(),
            },
            FunctionScope::DeviceFunction,
        );
        {
            let mut b = FunctionBuilder::new(&mut f, &types);
            let entry = b.create_block();
            let next = b.create_block();
            b.switch_to_block(entry).unwrap();
            b.create_jump(next, &[]).unwrap();
            b.switch_to_block(next).unwrap();
            b.create_return(&[]).unwrap();
        }
        run(&mut f);
        assert_eq!(f.blocks().count(), 1);
    }

    #[test]
    fn folds_constant_conditional_branch() {
        let types = TypeSystem::new(crate::ir::DataLayout::lp64());
        let mut f = Function::new(
            "f",
            Signature {
                params: vec![],
                ret: types.void(),
            },
            FunctionScope::DeviceFunction,
        );
        {
            let mut b = FunctionBuilder::new(&mut f, &types);
            let entry = b.create_block();
            let left = b.create_block();
            let right = b.create_block();
            b.switch_to_block(entry).unwrap();
            let cond = b.create_const(types.bool_(), ConstantValue::Bool(true)).unwrap();
            b.create_branch(cond, left, &[], right, &[]).unwrap();
            b.switch_to_block(left).unwrap();
            b.create_return(&[]).unwrap();
            b.switch_to_block(right).unwrap();
            b.create_return(&[]).unwrap();
        }
        run(&mut f);
        // entry merges straight through into `left`; `right` is now
        // unreachable from the entry block (still present in the
        // function's arena, just orphaned — DCE-of-blocks is a
        // reachability question for the inliner/driver, not this pass).
        let entry = f.entry_block.expand().unwrap();
        let term = f.layout.last_value_in_block(entry).unwrap();
        assert!(matches!(f.dfg.value(term).opcode, Opcode::Return { .. }));
    }
}
