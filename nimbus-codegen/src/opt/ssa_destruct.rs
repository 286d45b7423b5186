//! SSA destruction (`spec.md` §4.5 rule 7), run per backend only where
//! the target instruction set has no native block-parameter mechanism.
//!
//! Block parameters are replaced with ordinary values that every
//! incoming edge writes a copy into before transferring control,
//! mirroring the classic "parallel copy at the end of the predecessor"
//! lowering cranelift's regalloc2 integration performs for PTX-style
//! targets that only have flat virtual registers.
//!
//! Simplification (recorded in `DESIGN.md`): this arena cannot give a
//! single `Value` more than one definition site, so a true phi-style
//! elimination that deletes the parameter entirely is not representable
//! here. Instead this pass materializes the edge copies and records, in
//! [`Function::coalesced_groups`], that the parameter and every copy
//! feeding it must share one physical storage location; `isa::ptx::regalloc`
//! assigns them the same register. The parameter `Value` itself survives
//! unchanged (existing readers keep working) and the block's parameter
//! list is cleared only as a marker that destruction has run.

use crate::ir::{Block, Function, Opcode, Value};
use log::trace;

/// Replace every block parameter in `func` with a value defined at the
/// bottom of each jump/branch-predecessor via a [`Opcode::Copy`], then
/// drop the parameter lists. After this runs the CFG still has the same
/// shape, but no block carries parameters — exactly what `isa::ptx`
/// lowering assumes when it walks values into virtual registers.
pub fn run(func: &mut Function) {
    let blocks: Vec<_> = func.blocks().collect();
    for block in blocks {
        let params = func.dfg.block_params(block).to_vec();
        if params.is_empty() {
            continue;
        }
        insert_copies_on_incoming_edges(func, block, &params);
        retarget_jumps_to_drop_args(func, block);
        func.dfg.clear_block_params(block);
    }
}

fn insert_copies_on_incoming_edges(func: &mut Function, block: Block, params: &[Value]) {
    let preds: Vec<Value> = func
        .blocks()
        .filter_map(|b| func.layout.last_value_in_block(b))
        .filter(|&term| {
            func.dfg
                .value(term)
                .opcode
                .successors(&func.dfg.value_lists)
                .iter()
                .any(|(succ, _)| *succ == block)
        })
        .collect();

    let mut copies_per_param: Vec<Vec<Value>> = vec![Vec::new(); params.len()];
    for term in preds {
        let args = edge_args(func, term, block);
        debug_assert_eq!(args.len(), params.len());
        let pred_block = func.layout.value_block(term).expect("terminator is laid out");
        let loc = func.dfg.value(term).loc;
        for (i, (&param, &arg)) in params.iter().zip(args.iter()).enumerate() {
            let ty = func.dfg.value_type(param);
            let copy = func.dfg.make_value(pred_block, ty, Opcode::Copy { src: arg }, loc);
            func.layout.insert_value_before(copy, term);
            trace!("ssa-destruct: copy {arg} -> {copy} on edge into {block}");
            copies_per_param[i].push(copy);
        }
    }
    for (&param, copies) in params.iter().zip(copies_per_param.into_iter()) {
        func.coalesced_groups.push((block, param, copies));
    }
}

fn edge_args(func: &Function, term: Value, target: Block) -> Vec<Value> {
    match &func.dfg.value(term).opcode {
        Opcode::Jump { block, args } if *block == target => args.as_slice(&func.dfg.value_lists).to_vec(),
        Opcode::Branch {
            then_block,
            then_args,
            else_block,
            else_args,
            ..
        } => {
            if *then_block == target {
                then_args.as_slice(&func.dfg.value_lists).to_vec()
            } else if *else_block == target {
                else_args.as_slice(&func.dfg.value_lists).to_vec()
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

/// After copies are inserted the jump/branch argument lists are
/// pointless (the parameter they wired is gone) — clear them so later
/// consumers never see a stale, now-meaningless argument list.
fn retarget_jumps_to_drop_args(func: &mut Function, target: Block) {
    let blocks: Vec<_> = func.blocks().collect();
    for block in blocks {
        let Some(term) = func.layout.last_value_in_block(block) else {
            continue;
        };
        let cleared = match func.dfg.value(term).opcode.clone() {
            Opcode::Jump { block: b, args } if b == target => {
                let _ = args;
                Some(Opcode::Jump {
                    block: b,
                    args: func.dfg.make_value_list(&[]),
                })
            }
            Opcode::Branch {
                cond,
                then_block,
                then_args,
                else_block,
                else_args,
            } => {
                let empty = func.dfg.make_value_list(&[]);
                let new_then = if then_block == target { empty } else { then_args };
                let new_else = if else_block == target {
                    func.dfg.make_value_list(&[])
                } else {
                    else_args
                };
                Some(Opcode::Branch {
                    cond,
                    then_block,
                    then_args: new_then,
                    else_block,
                    else_args: new_else,
                })
            }
            _ => None,
        };
        if let Some(opcode) = cleared {
            func.dfg.replace_opcode(term, opcode);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConstantValue, FunctionBuilder, FunctionScope, Signature, TypeSystem};

    #[test]
    fn replaces_block_param_with_copies_on_every_incoming_edge() {
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
        {
            let mut b = FunctionBuilder::new(&mut f, &types);
            let entry = b.create_block();
            let left = b.create_block();
            let right = b.create_block();
            let merge = b.create_block();
            let p = b.append_block_param(merge, i32_ty);

            b.switch_to_block(entry).unwrap();
            let cond = b.create_const(types.bool_(), ConstantValue::Bool(true)).unwrap();
            b.create_branch(cond, left, &[], right, &[]).unwrap();

            b.switch_to_block(left).unwrap();
            let one = b.create_const(i32_ty, ConstantValue::Int(1)).unwrap();
            b.create_jump(merge, &[one]).unwrap();

            b.switch_to_block(right).unwrap();
            let two = b.create_const(i32_ty, ConstantValue::Int(2)).unwrap();
            b.create_jump(merge, &[two]).unwrap();

            b.switch_to_block(merge).unwrap();
            b.create_return(&[p]).unwrap();
        }
        run(&mut f);
        let merge = f.blocks().nth(3).unwrap();
        assert!(f.dfg.block_params(merge).is_empty());
        assert_eq!(f.coalesced_groups.len(), 1);
        let (group_block, group_param, copies) = &f.coalesced_groups[0];
        assert_eq!(*group_block, merge);
        assert_eq!(*group_param, p);
        assert_eq!(copies.len(), 2);
        for &copy in copies {
            assert!(matches!(f.dfg.value(copy).opcode, Opcode::Copy { .. }));
        }
    }
}
