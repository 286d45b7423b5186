//! Inlining (`spec.md` §4.5 rule 4).
//!
//! Callees marked inlinable or smaller than `inlining_threshold` IR
//! values are cloned into their callers; block parameters wire return
//! values. Recursive call cycles are refused rather than inlined.
//!
//! Simplification (recorded in `DESIGN.md`): only straight-line,
//! single-block callees are spliced in place. A multi-block callee would
//! require splitting the caller's block at the call site and re-wiring
//! every successor edge through a continuation block — mechanically
//! straightforward but a large amount of bookkeeping for a JIT whose
//! callees are, in practice, small device-side helpers (`Math.Sqrt`-style
//! leaves after `nimbus-intrinsics` remapping already turned the common
//! multi-block standard-library cases into single primitives). A
//! multi-block callee is simply left as an unresolved call; later passes
//! and the backend still see a normal call instruction.

use crate::ir::{Constant, DataFlowGraph, ExternalFunc, Function, FuncRef, InlineHint, Opcode, Value};
use log::trace;
use std::collections::HashMap;

/// Look up a callee `Function` by the name carried in its `FuncRef`.
pub trait CalleeResolver {
    fn resolve(&self, name: &str) -> Option<&Function>;
}

/// Inline eligible calls in `caller` until no more apply, honoring
/// `threshold` (`spec.md` §6 `inlining_threshold`) and `InlineHint`.
/// Returns whether any call was inlined.
pub fn run(caller: &mut Function, resolver: &dyn CalleeResolver, threshold: usize) -> bool {
    let mut changed = false;
    loop {
        let Some((call_value, callee_name)) = find_inlinable_call(caller, resolver, threshold) else {
            break;
        };
        trace!("inline: splicing `{callee_name}` into `{}`", caller.name);
        let callee = resolver.resolve(&callee_name).expect("resolved above");
        inline_one_call(caller, call_value, callee);
        changed = true;
    }
    changed
}

fn find_inlinable_call(caller: &Function, resolver: &dyn CalleeResolver, threshold: usize) -> Option<(Value, String)> {
    for block in caller.blocks() {
        for v in caller.layout.block_values(block) {
            let Opcode::Call { callee, .. } = &caller.dfg.value(v).opcode else {
                continue;
            };
            let ExternalFunc::Local { name } = caller.dfg.func_ref(*callee) else {
                continue; // LibDevice calls are never inlined, they're backend primitives
            };
            if name == &caller.name {
                continue; // direct recursion, refused per spec.md §4.5 rule 4
            }
            let Some(callee_func) = resolver.resolve(name) else {
                continue;
            };
            let eligible = callee_func.inline_hint == InlineHint::Always
                || (callee_func.inline_hint != InlineHint::Never && callee_func.dfg.values().count() < threshold);
            if eligible && callee_func.blocks().count() == 1 {
                return Some((v, name.clone()));
            }
        }
    }
    None
}

fn inline_one_call(caller: &mut Function, call: Value, callee: &Function) {
    let Opcode::Call { args, .. } = caller.dfg.value(call).opcode.clone() else {
        unreachable!("inline_one_call called on a non-Call value");
    };
    let call_args = args.as_slice(&caller.dfg.value_lists).to_vec();
    let callee_entry = callee.entry_block.expand().expect("callee has an entry block");
    let callee_params = callee.dfg.block_params(callee_entry).to_vec();

    let mut value_map: HashMap<Value, Value> = HashMap::new();
    let mut const_map: HashMap<Constant, Constant> = HashMap::new();
    let mut func_map: HashMap<FuncRef, FuncRef> = HashMap::new();
    for (param, arg) in callee_params.iter().zip(call_args.iter()) {
        value_map.insert(*param, *arg);
    }

    let mut return_values: Vec<Value> = Vec::new();
    for src_value in callee.layout.block_values(callee_entry) {
        let src_data = callee.dfg.value(src_value);
        if let Opcode::Return { args } = &src_data.opcode {
            return_values = args
                .as_slice(&callee.dfg.value_lists)
                .iter()
                .map(|v| value_map[v])
                .collect();
            break;
        }
        let cloned_opcode = clone_opcode(
            &src_data.opcode,
            &value_map,
            &callee.dfg,
            &mut caller.dfg,
            &mut const_map,
            &mut func_map,
            caller,
        );
        let block = caller.layout.value_block(call).expect("call is laid out");
        let new_value = caller.dfg.make_value(block, src_data.ty, cloned_opcode, src_data.loc);
        caller.layout.insert_value_before(new_value, call);
        value_map.insert(src_value, new_value);
    }

    match return_values.first() {
        Some(&ret) => caller.dfg.replace_all_uses(call, ret),
        None => {}
    }
    caller.layout.remove_value(call);
    caller.dfg.remove_value(call);
}

#[allow(clippy::too_many_arguments)]
fn clone_opcode(
    opcode: &Opcode,
    value_map: &HashMap<Value, Value>,
    src_dfg: &DataFlowGraph,
    dst_dfg: &mut DataFlowGraph,
    const_map: &mut HashMap<Constant, Constant>,
    func_map: &mut HashMap<FuncRef, FuncRef>,
    caller: &Function,
) -> Opcode {
    let m = |v: &Value| value_map[v];
    let list = |args: &crate::ir::ValueList, dst: &mut DataFlowGraph| {
        let mapped: Vec<Value> = args.as_slice(&src_dfg.value_lists).iter().map(m).collect();
        dst.make_value_list(&mapped)
    };
    match opcode {
        Opcode::BlockParam => unreachable!("block params are bound via the call's argument list, never cloned"),
        Opcode::Const(c) => Opcode::Const(*c),
        Opcode::Unary { op, arg, flags } => Opcode::Unary {
            op: *op,
            arg: m(arg),
            flags: *flags,
        },
        Opcode::Binary { op, lhs, rhs, flags } => Opcode::Binary {
            op: *op,
            lhs: m(lhs),
            rhs: m(rhs),
            flags: *flags,
        },
        Opcode::Ternary { op, a, b, c, flags } => Opcode::Ternary {
            op: *op,
            a: m(a),
            b: m(b),
            c: m(c),
            flags: *flags,
        },
        Opcode::Compare { op, lhs, rhs, flags } => Opcode::Compare {
            op: *op,
            lhs: m(lhs),
            rhs: m(rhs),
            flags: *flags,
        },
        Opcode::Convert { op, arg, flags } => Opcode::Convert {
            op: *op,
            arg: m(arg),
            flags: *flags,
        },
        Opcode::Load { ptr, space } => Opcode::Load { ptr: m(ptr), space: *space },
        Opcode::Store { ptr, value, space } => Opcode::Store {
            ptr: m(ptr),
            value: m(value),
            space: *space,
        },
        Opcode::LoadElementAddress { base, index } => Opcode::LoadElementAddress {
            base: m(base),
            index: m(index),
        },
        Opcode::LoadIndexed { base, index, space } => Opcode::LoadIndexed {
            base: m(base),
            index: m(index),
            space: *space,
        },
        Opcode::StoreIndexed { base, index, value, space } => Opcode::StoreIndexed {
            base: m(base),
            index: m(index),
            value: m(value),
            space: *space,
        },
        Opcode::ArrayToViewCast { constant } => {
            let mapped = *const_map
                .entry(*constant)
                .or_insert_with(|| dst_dfg.make_constant(src_dfg.constant_bytes(*constant).to_vec()));
            Opcode::ArrayToViewCast { constant: mapped }
        }
        Opcode::GetField { base, index } => Opcode::GetField {
            base: m(base),
            index: *index,
        },
        Opcode::SetField { base, index, value } => Opcode::SetField {
            base: m(base),
            index: *index,
            value: m(value),
        },
        Opcode::Call { callee, args } => {
            let mapped_callee = *func_map.entry(*callee).or_insert_with(|| {
                let resolved = src_dfg.func_ref(*callee).clone();
                dst_dfg.make_func_ref(resolved)
            });
            Opcode::Call {
                callee: mapped_callee,
                args: list(args, dst_dfg),
            }
        }
        Opcode::LanguageEmit {
            backend,
            template,
            args,
            directions,
        } => Opcode::LanguageEmit {
            backend: backend.clone(),
            template: template.clone(),
            args: list(args, dst_dfg),
            directions: directions.clone(),
        },
        Opcode::DebugAssert { cond, message } => Opcode::DebugAssert {
            cond: m(cond),
            message: message.clone(),
        },
        Opcode::Copy { src } => Opcode::Copy { src: m(src) },
        // Terminators other than `Return` cannot appear inside a
        // single-block callee's body (only as the block's final value),
        // and `Return` is intercepted by the caller before reaching here.
        Opcode::Return { .. } | Opcode::Branch { .. } | Opcode::Jump { .. } | Opcode::Switch { .. } | Opcode::Unreachable => {
            unreachable!(
                "non-Return terminator in a single-block callee of `{}`: CFG invariant violated",
                caller.name
            )
        }
    }
}
