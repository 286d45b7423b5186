//! Property-style tests (`spec.md` §8, `SPEC_FULL.md` §10 "Test tooling"):
//! type interning round-trips for arbitrary scalar shapes, and the
//! folding/DCE passes are idempotent no matter which arithmetic op or
//! constants they're handed. Deliberately small and targeted rather than
//! an exhaustive combinatorial grid over every `Type`/`Opcode` variant.

use proptest::prelude::*;

use nimbus_codegen::ir::{
    AddressSpace, ArithmeticFlags, BinaryOp, ConstantValue, DataLayout, Function, FunctionBuilder, FunctionScope, Signature, TypeSystem,
};
use nimbus_codegen::opt::{dce, fold};

fn int_bits() -> impl Strategy<Value = u8> {
    prop_oneof![Just(8u8), Just(16), Just(32), Just(64)]
}

fn float_bits() -> impl Strategy<Value = u8> {
    prop_oneof![Just(32u8), Just(64)]
}

proptest! {
    /// Interning the same scalar shape twice always yields the same
    /// `TypeRef`, and decomposing-then-reinterning a type reproduces it,
    /// for any integer width/signedness or float width the type system
    /// supports.
    #[test]
    fn integer_interning_round_trips(bits in int_bits(), signed in any::<bool>()) {
        let ts = TypeSystem::new(DataLayout::lp64());
        let a = ts.int(bits, signed);
        let b = ts.int(bits, signed);
        prop_assert_eq!(a, b);
        let decomposed = ts.kind(a);
        let reinterned = ts.intern(decomposed);
        prop_assert_eq!(a, reinterned);
    }

    #[test]
    fn float_interning_round_trips(bits in float_bits()) {
        let ts = TypeSystem::new(DataLayout::lp64());
        let a = ts.float(bits);
        let view = ts.view_of(a, AddressSpace::Global);
        let decomposed = ts.kind(view);
        let reinterned = ts.intern(decomposed);
        prop_assert_eq!(view, reinterned);
    }

    /// A view's size never depends on which element type or address
    /// space it wraps: pointer width (from `DataLayout::lp64`) plus an
    /// i64 length, for every scalar width the type system supports.
    #[test]
    fn view_size_is_pointer_plus_length_regardless_of_element_width(bits in int_bits()) {
        let ts = TypeSystem::new(DataLayout::lp64());
        let elem = ts.int(bits, true);
        let view = ts.view_of(elem, AddressSpace::Global);
        prop_assert_eq!(ts.size(view).unwrap(), 16);
    }

    /// Folding and DCE are both idempotent for a straight-line function
    /// computing `(lhs OP rhs)` from arbitrary i32 constants, then
    /// discarding the result: running either pass a second time changes
    /// nothing further.
    #[test]
    fn fold_and_dce_are_idempotent_for_arbitrary_binary_constants(
        lhs in any::<i32>(),
        rhs in any::<i32>(),
        op_index in 0usize..4,
    ) {
        let op = [BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul, BinaryOp::Xor][op_index];
        let mut f = straight_line_binary_fn(lhs, rhs, op);

        fold::run(&mut f);
        let after_first_fold = format!("{f}");
        fold::run(&mut f);
        prop_assert_eq!(after_first_fold, format!("{f}"));

        dce::run(&mut f);
        let after_first_dce = format!("{f}");
        dce::run(&mut f);
        prop_assert_eq!(after_first_dce, format!("{f}"));
    }
}

fn straight_line_binary_fn(lhs: i32, rhs: i32, op: BinaryOp) -> Function {
    let types = TypeSystem::new(DataLayout::lp64());
    let i32_ty = types.int(32, true);
    let mut f = Function::new(
        "arbitrary_binary",
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
        let a = b.create_const(i32_ty, ConstantValue::Int(lhs as i128)).unwrap();
        let c = b.create_const(i32_ty, ConstantValue::Int(rhs as i128)).unwrap();
        let _result = b.create_binary(op, a, c, ArithmeticFlags::new()).unwrap();
        b.create_return(&[]).unwrap();
    }
    f
}
