//! Dead-code elimination (`spec.md` §4.5 rule 2).
//!
//! Grounded on `cranelift-codegen::dce`: a value is dead if it is unused
//! and has no side effect; terminators and stores are always live.
//! Iterates to a fixpoint because removing one dead value can make its
//! operands dead in turn.

use crate::ir::Function;
use log::trace;

/// Remove every transitively dead value from `func`. Idempotent
/// (`spec.md` §8): a second call finds nothing left to remove.
pub fn run(func: &mut Function) {
    loop {
        let mut removed_any = false;
        let blocks: Vec<_> = func.blocks().collect();
        for block in blocks {
            let values: Vec<_> = func.layout.block_values(block).collect();
            for v in values {
                let dead = func.dfg.is_unused(v) && !func.dfg.value(v).opcode.has_side_effects();
                if dead {
                    trace!("dce: removing dead value {v}");
                    func.layout.remove_value(v);
                    func.dfg.remove_value(v);
                    removed_any = true;
                }
            }
        }
        if !removed_any {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArithmeticFlags, BinaryOp, ConstantValue, FunctionBuilder, FunctionScope, Signature, TypeSystem};

    fn build_dead_value_fn() -> Function {
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
            b.switch_to_block(entry).unwrap();
            let a = b.create_const(i32_ty, ConstantValue::Int(2)).unwrap();
            let c = b.create_const(i32_ty, ConstantValue::Int(3)).unwrap();
            // never used anywhere
            let _dead = b.create_binary(BinaryOp::Add, a, c, ArithmeticFlags::new()).unwrap();
            b.create_return(&[]).unwrap();
        }
        f
    }

    #[test]
    fn removes_unused_pure_value_and_its_dead_operands() {
        let mut f = build_dead_value_fn();
        let entry = f.entry_block.expand().unwrap();
        assert_eq!(f.layout.block_values(entry).count(), 4); // a, c, dead, return
        run(&mut f);
        // Only the terminator (always live) should survive.
        assert_eq!(f.layout.block_values(entry).count(), 1);
    }

    #[test]
    fn is_idempotent() {
        let mut f = build_dead_value_fn();
        run(&mut f);
        let once = format!("{f}");
        run(&mut f);
        let twice = format!("{f}");
        assert_eq!(once, twice);
    }
}
