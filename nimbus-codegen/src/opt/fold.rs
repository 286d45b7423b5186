//! Constant folding & algebraic simplification (`spec.md` §4.5 rule 1).

use crate::ir::{BinaryOp, ConstantValue, Function, Opcode, UnaryOp, Value};
use log::trace;

enum FoldResult {
    /// Replace the value's opcode with a new (constant) one.
    NewOpcode(Opcode),
    /// The value is equivalent to an existing value; splice it out and
    /// point every user at `Value` directly instead.
    Alias(Value),
}

/// Run one pass of constant folding and algebraic simplification over
/// `func`, rewriting values in place. Idempotent: running this twice in
/// a row produces the same IR as running it once (`spec.md` §8) because
/// a value already folded to a `Const` or already aliased away never
/// matches a fold rule again.
pub fn run(func: &mut Function) {
    let values: Vec<_> = func.dfg.values().collect();
    for v in values {
        let folded = match &func.dfg.value(v).opcode {
            Opcode::Unary { op, arg, flags } => fold_unary(func, *op, *arg, *flags),
            Opcode::Binary { op, lhs, rhs, flags } => fold_binary(func, *op, *lhs, *rhs, *flags),
            _ => None,
        };
        match folded {
            Some(FoldResult::NewOpcode(opcode)) => {
                trace!("fold: {v} -> {opcode:?}");
                func.dfg.replace_opcode(v, opcode);
            }
            Some(FoldResult::Alias(alias)) => {
                trace!("fold: {v} aliases {alias}");
                func.dfg.replace_all_uses(v, alias);
            }
            None => {}
        }
    }
}

fn const_of(func: &Function, v: Value) -> Option<ConstantValue> {
    match func.dfg.value(v).opcode {
        Opcode::Const(c) => Some(c),
        _ => None,
    }
}

fn fold_unary(func: &Function, op: UnaryOp, arg: Value, _flags: crate::ir::ArithmeticFlags) -> Option<FoldResult> {
    let c = const_of(func, arg)?;
    let folded = match (op, c) {
        (UnaryOp::Neg, ConstantValue::Int(i)) => ConstantValue::Int(-i),
        (UnaryOp::Neg, ConstantValue::Float(f)) => ConstantValue::Float(-f),
        (UnaryOp::Abs, ConstantValue::Int(i)) => ConstantValue::Int(i.abs()),
        (UnaryOp::Abs, ConstantValue::Float(f)) => ConstantValue::Float(f.abs()),
        (UnaryOp::Sqrt, ConstantValue::Float(f)) if f >= 0.0 => ConstantValue::Float(f.sqrt()),
        (UnaryOp::Not, ConstantValue::Int(i)) => ConstantValue::Int(!i),
        (UnaryOp::Floor, ConstantValue::Float(f)) => ConstantValue::Float(f.floor()),
        (UnaryOp::Ceiling, ConstantValue::Float(f)) => ConstantValue::Float(f.ceil()),
        _ => return None,
    };
    Some(FoldResult::NewOpcode(Opcode::Const(folded)))
}

fn fold_binary(
    func: &Function,
    op: BinaryOp,
    lhs: Value,
    rhs: Value,
    flags: crate::ir::ArithmeticFlags,
) -> Option<FoldResult> {
    let l = const_of(func, lhs);
    let r = const_of(func, rhs);

    // Algebraic identities, gated by FastMath/NoNaN where the spec
    // requires it: `x*0 -> 0`, `x+0 -> x`, `x*1 -> x`, `x/x -> 1` only
    // under FastMath/NoNaN (spec.md §4.5 rule 1) because they are
    // unsound in the presence of NaN/signed-zero/infinity otherwise.
    if flags.fast_math() || flags.no_nan() {
        match (op, l, r) {
            (BinaryOp::Mul, _, Some(ConstantValue::Int(0))) | (BinaryOp::Mul, Some(ConstantValue::Int(0)), _) => {
                return Some(FoldResult::NewOpcode(Opcode::Const(ConstantValue::Int(0))));
            }
            (BinaryOp::Mul, _, Some(ConstantValue::Float(f))) if f == 0.0 => {
                return Some(FoldResult::NewOpcode(Opcode::Const(ConstantValue::Float(0.0))));
            }
            (BinaryOp::Add, _, Some(ConstantValue::Int(0))) => return Some(FoldResult::Alias(lhs)),
            (BinaryOp::Add, Some(ConstantValue::Int(0)), _) => return Some(FoldResult::Alias(rhs)),
            (BinaryOp::Add, _, Some(ConstantValue::Float(f))) if f == 0.0 => return Some(FoldResult::Alias(lhs)),
            (BinaryOp::Mul, _, Some(ConstantValue::Int(1))) => return Some(FoldResult::Alias(lhs)),
            (BinaryOp::Mul, Some(ConstantValue::Int(1)), _) => return Some(FoldResult::Alias(rhs)),
            _ => {}
        }
        if op == BinaryOp::Div && lhs == rhs {
            return Some(FoldResult::NewOpcode(Opcode::Const(ConstantValue::Int(1))));
        }
    }

    let (l, r) = (l?, r?);
    let folded = match (op, l, r) {
        (BinaryOp::Add, ConstantValue::Int(a), ConstantValue::Int(b)) => ConstantValue::Int(a + b),
        (BinaryOp::Add, ConstantValue::Float(a), ConstantValue::Float(b)) => ConstantValue::Float(a + b),
        (BinaryOp::Sub, ConstantValue::Int(a), ConstantValue::Int(b)) => ConstantValue::Int(a - b),
        (BinaryOp::Sub, ConstantValue::Float(a), ConstantValue::Float(b)) => ConstantValue::Float(a - b),
        (BinaryOp::Mul, ConstantValue::Int(a), ConstantValue::Int(b)) => ConstantValue::Int(a * b),
        (BinaryOp::Mul, ConstantValue::Float(a), ConstantValue::Float(b)) => ConstantValue::Float(a * b),
        (BinaryOp::Div, ConstantValue::Int(a), ConstantValue::Int(b)) if b != 0 => ConstantValue::Int(a / b),
        (BinaryOp::Div, ConstantValue::Float(a), ConstantValue::Float(b)) => ConstantValue::Float(a / b),
        (BinaryOp::And, ConstantValue::Int(a), ConstantValue::Int(b)) => ConstantValue::Int(a & b),
        (BinaryOp::Or, ConstantValue::Int(a), ConstantValue::Int(b)) => ConstantValue::Int(a | b),
        (BinaryOp::Xor, ConstantValue::Int(a), ConstantValue::Int(b)) => ConstantValue::Int(a ^ b),
        (BinaryOp::Min, ConstantValue::Int(a), ConstantValue::Int(b)) => ConstantValue::Int(a.min(b)),
        (BinaryOp::Max, ConstantValue::Int(a), ConstantValue::Int(b)) => ConstantValue::Int(a.max(b)),
        _ => return None,
    };
    Some(FoldResult::NewOpcode(Opcode::Const(folded)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArithmeticFlags, FunctionBuilder, FunctionScope, Signature, TypeSystem};

    #[test]
    fn folds_integer_add() {
        let types = TypeSystem::new(crate::ir::DataLayout::lp64());
        let i32_ty = types.int(32, true);
        let mut f = Function::new(
            "f",
            Signature {
                params: vec![],
                ret: i32_ty,
            },
            FunctionScope::DeviceFunction,
        );
        let sum;
        {
            let mut b = FunctionBuilder::new(&mut f, &types);
            let entry = b.create_block();
            b.switch_to_block(entry).unwrap();
            let a = b.create_const(i32_ty, ConstantValue::Int(2)).unwrap();
            let c = b.create_const(i32_ty, ConstantValue::Int(3)).unwrap();
            sum = b.create_binary(BinaryOp::Add, a, c, ArithmeticFlags::new()).unwrap();
            b.create_return(&[sum]).unwrap();
        }
        run(&mut f);
        assert_eq!(f.dfg.value(sum).opcode, Opcode::Const(ConstantValue::Int(5)));
    }

    #[test]
    fn fast_math_add_zero_aliases_the_other_operand() {
        let types = TypeSystem::new(crate::ir::DataLayout::lp64());
        let f32_ty = types.float(32);
        let mut f = Function::new(
            "f",
            Signature {
                params: vec![f32_ty],
                ret: f32_ty,
            },
            FunctionScope::DeviceFunction,
        );
        let (x, sum, ret_block);
        {
            let mut b = FunctionBuilder::new(&mut f, &types);
            let entry = b.create_block();
            ret_block = entry;
            x = b.append_block_param(entry, f32_ty);
            b.switch_to_block(entry).unwrap();
            let zero = b.create_const(f32_ty, ConstantValue::Float(0.0)).unwrap();
            let mut flags = ArithmeticFlags::new();
            flags.set_fast_math();
            sum = b.create_binary(BinaryOp::Add, x, zero, flags).unwrap();
            b.create_return(&[sum]).unwrap();
        }
        run(&mut f);
        // `sum` itself keeps its opcode (Alias rewrites *users*, not the
        // value itself) but its only user, the Return, now reads `x`.
        let _ = ret_block;
        match &f.dfg.value(f.layout.last_value_in_block(f.entry_block.expand().unwrap()).unwrap()).opcode {
            Opcode::Return { args } => {
                assert_eq!(args.as_slice(&f.dfg.value_lists), &[x]);
            }
            other => panic!("expected Return, got {other:?}"),
        }
        assert!(f.dfg.is_unused(sum));
    }

    #[test]
    fn is_idempotent() {
        let types = TypeSystem::new(crate::ir::DataLayout::lp64());
        let i32_ty = types.int(32, true);
        let mut f = Function::new(
            "f",
            Signature {
                params: vec![],
                ret: i32_ty,
            },
            FunctionScope::DeviceFunction,
        );
        {
            let mut b = FunctionBuilder::new(&mut f, &types);
            let entry = b.create_block();
            b.switch_to_block(entry).unwrap();
            let a = b.create_const(i32_ty, ConstantValue::Int(2)).unwrap();
            let c = b.create_const(i32_ty, ConstantValue::Int(3)).unwrap();
            let sum = b.create_binary(BinaryOp::Add, a, c, ArithmeticFlags::new()).unwrap();
            b.create_return(&[sum]).unwrap();
        }
        run(&mut f);
        let once = format!("{f}");
        run(&mut f);
        let twice = format!("{f}");
        assert_eq!(once, twice);
    }
}
