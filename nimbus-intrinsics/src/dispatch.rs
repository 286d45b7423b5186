//! Intrinsic dispatch: rewriting a resolved `Nimbus.*` call in place into
//! the primitive opcode(s) it actually lowers to (`spec.md` §4.4
//! "IntrinsicResolver").
//!
//! Every handler receives the call's already-decoded argument `Value`s
//! and rewrites the call's own opcode via
//! [`nimbus_codegen::ir::DataFlowGraph::replace_opcode`] — the call
//! `Value`'s identity survives (so anything that already reads its
//! result keeps working), only what it computes changes. A handler that
//! needs more than one new value (`Grid.IndexX`'s three-register
//! combine) inserts them just before the call site with a
//! [`nimbus_codegen::ir::FuncCursor`] and finishes by aliasing the call
//! to the last one through [`Opcode::Copy`].

use nimbus_codegen::capability::capabilities;
use nimbus_codegen::ir::{
    ArithmeticFlags, BinaryOp, CursorPosition, Direction, FuncCursor, Function, Opcode, TernaryOp, TypeRef, TypeSystem, UnaryOp, Value,
};
use nimbus_codegen::{CapabilityContext, CodegenResult, CompileError};

/// Everything a dispatch handler needs: the call site's own value (to
/// replace), its already-materialized argument values, and enough
/// compile-wide context (types, capabilities) to decide how to lower.
pub struct IntrinsicCtx<'a> {
    pub func: &'a mut Function,
    pub types: &'a TypeSystem,
    pub capabilities: &'a CapabilityContext,
    pub call: Value,
    pub args: Vec<Value>,
}

impl<'a> IntrinsicCtx<'a> {
    fn loc(&self) -> nimbus_codegen::ir::SourceLoc {
        self.func.dfg.value(self.call).loc
    }

    /// Replace the call's own opcode, aliasing it to `real`. The common
    /// case: a handler that reduced to exactly one computed value.
    fn finish(&mut self, real: Value) {
        self.func.dfg.replace_opcode(self.call, Opcode::Copy { src: real });
    }

    /// A cursor positioned right before the call site, for handlers that
    /// need to insert supporting values ahead of the final replacement.
    fn cursor(&mut self) -> FuncCursor<'_> {
        let mut cursor = FuncCursor::new(self.func);
        cursor.set_position(CursorPosition::At(self.call));
        cursor
    }
}

pub type Handler = fn(&mut IntrinsicCtx) -> CodegenResult<()>;

fn require_capability(ctx: &IntrinsicCtx, cap: &'static str, feature: &str) -> CodegenResult<()> {
    if ctx.capabilities.supports(cap) {
        Ok(())
    } else {
        Err(CompileError::CapabilityNotSupported {
            feature: feature.into(),
            min_arch: CapabilityContext::min_arch_for(cap).into(),
        })
    }
}

// A plain function pointer can't close over an opcode argument, so each
// concrete math unary below gets its own tiny wrapper generated by this
// macro rather than a shared closure.
macro_rules! unary_handler {
    ($name:ident, $op:expr) => {
        fn $name(ctx: &mut IntrinsicCtx) -> CodegenResult<()> {
            let arg = ctx.args[0];
            let result_ty = ctx.func.dfg.value_type(ctx.call);
            let v = ctx.cursor().insert_before(result_ty, Opcode::Unary { op: $op, arg, flags: ArithmeticFlags::new() }, ctx.loc());
            ctx.finish(v);
            Ok(())
        }
    };
}

macro_rules! binary_handler {
    ($name:ident, $op:expr) => {
        fn $name(ctx: &mut IntrinsicCtx) -> CodegenResult<()> {
            let lhs = ctx.args[0];
            let rhs = ctx.args[1];
            let result_ty = ctx.func.dfg.value_type(ctx.call);
            let v = ctx
                .cursor()
                .insert_before(result_ty, Opcode::Binary { op: $op, lhs, rhs, flags: ArithmeticFlags::new() }, ctx.loc());
            ctx.finish(v);
            Ok(())
        }
    };
}

unary_handler!(math_sqrt, UnaryOp::Sqrt);
unary_handler!(math_sin, UnaryOp::Sin);
unary_handler!(math_cos, UnaryOp::Cos);
unary_handler!(math_abs, UnaryOp::Abs);
unary_handler!(math_floor, UnaryOp::Floor);
unary_handler!(math_ceiling, UnaryOp::Ceiling);
unary_handler!(math_is_nan, UnaryOp::IsNaN);
unary_handler!(math_is_infinity, UnaryOp::IsInfinity);

binary_handler!(math_pow, BinaryOp::Pow);
binary_handler!(math_atan2, BinaryOp::Atan2);
binary_handler!(math_min, BinaryOp::Min);
binary_handler!(math_max, BinaryOp::Max);

fn math_fused_multiply_add(ctx: &mut IntrinsicCtx) -> CodegenResult<()> {
    let (a, b, c) = (ctx.args[0], ctx.args[1], ctx.args[2]);
    let result_ty = ctx.func.dfg.value_type(ctx.call);
    let v = ctx
        .cursor()
        .insert_before(result_ty, Opcode::Ternary { op: TernaryOp::FusedMulAdd, a, b, c, flags: ArithmeticFlags::new() }, ctx.loc());
    ctx.finish(v);
    Ok(())
}

/// `Nimbus.Atomic::Add(ptr, value) -> old_value`. `atom.<space>.add.<ty>`
/// writes its destination in place of the first operand slot, which is
/// why that slot's direction is `Out` even though a real operand sits in
/// its position (it's ignored at render time; see
/// `nimbus_codegen::isa::ptx::select::render_template`).
fn atomic_add(ctx: &mut IntrinsicCtx) -> CodegenResult<()> {
    let (ptr, value) = (ctx.args[0], ctx.args[1]);
    let is_f64 = matches!(ctx.types.kind(ctx.func.dfg.value_type(value)), nimbus_codegen::ir::TypeKind::Float { bits: 64 });
    if is_f64 {
        require_capability(ctx, capabilities::ATOMIC_FP64_ADD, "Atomic.Add(double)")?;
    }
    let result_ty = ctx.func.dfg.value_type(ctx.call);
    let template = "atom.global.add.%2 %0, [%1], %2;".replace("%2", if is_f64 { "f64" } else { "f32" });
    let args = [ptr, ptr, value];
    let v = emit_language(ctx, result_ty, &template, &args, &[Direction::Out, Direction::In, Direction::In])?;
    ctx.finish(v);
    Ok(())
}

/// `Nimbus.Atomic::Exchange(ptr, value) -> old_value`. Unlike `Add`,
/// `atom.exch` has no floating-point form in the capability table this
/// backend gates on; it only ever needs the operand's bit width
/// (`.b32`/`.b64`), so it never calls `require_capability`.
fn atomic_exchange(ctx: &mut IntrinsicCtx) -> CodegenResult<()> {
    let (ptr, value) = (ctx.args[0], ctx.args[1]);
    let bits = match ctx.types.kind(ctx.func.dfg.value_type(value)) {
        nimbus_codegen::ir::TypeKind::Int { bits, .. } => bits,
        nimbus_codegen::ir::TypeKind::Float { bits } => bits,
        other => {
            return Err(CompileError::UnsupportedOperation {
                message: format!("Atomic.Exchange is not defined for {other:?}"),
                loc: ctx.loc(),
            })
        }
    };
    if bits == 64 {
        require_capability(ctx, capabilities::ATOMIC_64BIT, "Atomic.Exchange(64-bit)")?;
    }
    let result_ty = ctx.func.dfg.value_type(ctx.call);
    let template = format!("atom.global.exch.b{bits} %0, [%1], %2;");
    let args = [ptr, ptr, value];
    let v = emit_language(ctx, result_ty, &template, &args, &[Direction::Out, Direction::In, Direction::In])?;
    ctx.finish(v);
    Ok(())
}

/// `Nimbus.Group::Barrier()`: a pure side effect, no result worth
/// aliasing — the call keeps its own `LanguageEmit` opcode (which is
/// what gives it `has_side_effects() == true`, so DCE never removes it
/// even though nothing reads its value).
fn group_barrier(ctx: &mut IntrinsicCtx) -> CodegenResult<()> {
    require_capability(ctx, capabilities::BARRIER_SYNC, "Group.Barrier")?;
    let void = ctx.types.void();
    let template = nimbus_codegen::ir::AsmTemplate::parse("bar.sync 0;").expect("literal template");
    ctx.func.dfg.replace_opcode(
        ctx.call,
        Opcode::LanguageEmit { backend: "ptx".into(), template, args: nimbus_codegen::ir::ValueList::default(), directions: vec![] },
    );
    let _ = void;
    Ok(())
}

fn memory_fence(ctx: &mut IntrinsicCtx) -> CodegenResult<()> {
    let template = nimbus_codegen::ir::AsmTemplate::parse("membar.gl;").expect("literal template");
    ctx.func.dfg.replace_opcode(
        ctx.call,
        Opcode::LanguageEmit { backend: "ptx".into(), template, args: nimbus_codegen::ir::ValueList::default(), directions: vec![] },
    );
    Ok(())
}

/// `Nimbus.Warp::ShuffleDown(value, delta) -> T`. Requires subgroup
/// shuffle support (`spec.md` §4.6 "Warp/group primitives ... gated by
/// CapabilityContext").
fn warp_shuffle_down(ctx: &mut IntrinsicCtx) -> CodegenResult<()> {
    require_capability(ctx, capabilities::SUBGROUP_SHUFFLE, "Warp.ShuffleDown")?;
    let (value, delta) = (ctx.args[0], ctx.args[1]);
    let result_ty = ctx.func.dfg.value_type(ctx.call);
    let template = "shfl.sync.down.b32 %0, %1, %2, 31, 0xffffffff;";
    let args = [value, value, delta];
    let v = emit_language(ctx, result_ty, template, &args, &[Direction::Out, Direction::In, Direction::In])?;
    ctx.finish(v);
    Ok(())
}

/// `Nimbus.SharedMemory::Allocate(bytes, align) -> pointer`. `bytes`/
/// `align` must be compile-time constants — in practice the literal
/// immediately preceding the call, since dynamic-size shared allocation
/// has no meaning once `KernelInfo.shared_bytes` is fixed at compile
/// time (`spec.md` §4.3 "array-creation ... lowered ... at decode time").
fn shared_memory_allocate(ctx: &mut IntrinsicCtx) -> CodegenResult<()> {
    let bytes = require_const_u32(ctx, ctx.args[0])?;
    let align = if ctx.args.len() > 1 { require_const_u32(ctx, ctx.args[1])? } else { 4 };
    let align = align.max(1);
    let offset = align_up(ctx.func.shared_memory_bytes, align);
    ctx.func.shared_memory_bytes = offset + bytes;
    ctx.func.shared_memory_align = ctx.func.shared_memory_align.max(align);
    let result_ty = ctx.func.dfg.value_type(ctx.call);
    let template = format!("mov.u64 %0, __shared_base;\n\tadd.u64 %0, %0, {offset};");
    let v = emit_language(ctx, result_ty, &template, &[ctx.call], &[Direction::Out])?;
    ctx.finish(v);
    Ok(())
}

fn require_const_u32(ctx: &IntrinsicCtx, v: Value) -> CodegenResult<u32> {
    match &ctx.func.dfg.value(v).opcode {
        Opcode::Const(nimbus_codegen::ir::ConstantValue::Int(i)) => Ok(*i as u32),
        _ => Err(CompileError::UnsupportedOperation {
            message: "SharedMemory.Allocate requires a compile-time constant size".into(),
            loc: ctx.loc(),
        }),
    }
}

fn align_up(offset: u32, align: u32) -> u32 {
    (offset + align - 1) / align * align
}

/// One thread-grid special register read, combined via `mad.lo.u32`
/// (`blockIdx * blockDim + threadIdx`). Demonstrates a multi-value
/// intrinsic expansion: three single-register reads feeding one
/// arithmetic combine, all inserted ahead of the call site.
fn grid_index(dim: char) -> Handler {
    match dim {
        'x' => grid_index_x,
        'y' => grid_index_y,
        'z' => grid_index_z,
        _ => unreachable!(),
    }
}

fn grid_index_x(ctx: &mut IntrinsicCtx) -> CodegenResult<()> {
    grid_index_impl(ctx, "x")
}
fn grid_index_y(ctx: &mut IntrinsicCtx) -> CodegenResult<()> {
    grid_index_impl(ctx, "y")
}
fn grid_index_z(ctx: &mut IntrinsicCtx) -> CodegenResult<()> {
    grid_index_impl(ctx, "z")
}

fn grid_index_impl(ctx: &mut IntrinsicCtx, axis: &str) -> CodegenResult<()> {
    let u32_ty = ctx.types.int(32, false);
    let loc = ctx.loc();
    let call = ctx.call;

    let mut cursor = ctx.cursor();
    let ctaid = special_register(&mut cursor, u32_ty, &format!("%ctaid.{axis}"), loc);
    let ntid = special_register(&mut cursor, u32_ty, &format!("%ntid.{axis}"), loc);
    let tid = special_register(&mut cursor, u32_ty, &format!("%tid.{axis}"), loc);
    let mul = cursor.insert_before(u32_ty, Opcode::Binary { op: BinaryOp::Mul, lhs: ctaid, rhs: ntid, flags: ArithmeticFlags::new() }, loc);
    let add = cursor.insert_before(u32_ty, Opcode::Binary { op: BinaryOp::Add, lhs: mul, rhs: tid, flags: ArithmeticFlags::new() }, loc);
    drop(cursor);

    ctx.func.dfg.replace_opcode(call, Opcode::Copy { src: add });
    Ok(())
}

/// Insert a single-operand `LanguageEmit` that reads one PTX special
/// register into a fresh `Out` destination. `%%` escapes the literal
/// `%` the special-register name needs (`spec.md` §4.4 inline-asm
/// template grammar).
fn special_register(cursor: &mut FuncCursor, ty: TypeRef, name: &str, loc: nimbus_codegen::ir::SourceLoc) -> Value {
    let template = nimbus_codegen::ir::AsmTemplate::parse(&format!("mov.u32 %0, %%{};", &name[1..])).expect("literal template");
    let placeholder = cursor.insert_before(ty, Opcode::Const(nimbus_codegen::ir::ConstantValue::Int(0)), loc);
    cursor.insert_before(
        ty,
        Opcode::LanguageEmit {
            backend: "ptx".into(),
            template,
            args: nimbus_codegen::ir::ValueList::from_slice(&[placeholder], &mut cursor.func.dfg.value_lists),
            directions: vec![Direction::Out],
        },
        loc,
    )
}

fn emit_language(ctx: &mut IntrinsicCtx, result_ty: TypeRef, raw_template: &str, args: &[Value], directions: &[Direction]) -> CodegenResult<Value> {
    let template = nimbus_codegen::ir::AsmTemplate::parse(raw_template).map_err(|reason| CompileError::InvalidInlineAssembly { reason })?;
    let loc = ctx.loc();
    let mut cursor = ctx.cursor();
    let list = nimbus_codegen::ir::ValueList::from_slice(args, &mut cursor.func.dfg.value_lists);
    Ok(cursor.insert_before(
        result_ty,
        Opcode::LanguageEmit { backend: "ptx".into(), template, args: list, directions: directions.to_vec() },
        loc,
    ))
}

/// The fixed, deterministic registration order the dispatch table is
/// built from once at process start (`spec.md` §4.4 "built at startup in
/// a fixed order").
static TABLE: once_cell::sync::Lazy<rustc_hash::FxHashMap<super::remap::MethodKey, Handler>> = once_cell::sync::Lazy::new(|| {
    let mut m = rustc_hash::FxHashMap::default();
    m.insert(("Nimbus.Math", "Sqrt"), math_sqrt as Handler);
    m.insert(("Nimbus.Math", "Sin"), math_sin as Handler);
    m.insert(("Nimbus.Math", "Cos"), math_cos as Handler);
    m.insert(("Nimbus.Math", "Abs"), math_abs as Handler);
    m.insert(("Nimbus.Math", "Floor"), math_floor as Handler);
    m.insert(("Nimbus.Math", "Ceiling"), math_ceiling as Handler);
    m.insert(("Nimbus.Math", "IsNaN"), math_is_nan as Handler);
    m.insert(("Nimbus.Math", "IsInfinity"), math_is_infinity as Handler);
    m.insert(("Nimbus.Math", "Pow"), math_pow as Handler);
    m.insert(("Nimbus.Math", "Atan2"), math_atan2 as Handler);
    m.insert(("Nimbus.Math", "Min"), math_min as Handler);
    m.insert(("Nimbus.Math", "Max"), math_max as Handler);
    m.insert(("Nimbus.Math", "FusedMultiplyAdd"), math_fused_multiply_add as Handler);
    m.insert(("Nimbus.Atomic", "Add"), atomic_add as Handler);
    m.insert(("Nimbus.Atomic", "Exchange"), atomic_exchange as Handler);
    m.insert(("Nimbus.Group", "Barrier"), group_barrier as Handler);
    m.insert(("Nimbus.Accelerator", "MemoryFence"), memory_fence as Handler);
    m.insert(("Nimbus.Warp", "ShuffleDown"), warp_shuffle_down as Handler);
    m.insert(("Nimbus.SharedMemory", "Allocate"), shared_memory_allocate as Handler);
    m.insert(("Nimbus.Grid", "IndexX"), grid_index('x'));
    m.insert(("Nimbus.Grid", "IndexY"), grid_index('y'));
    m.insert(("Nimbus.Grid", "IndexZ"), grid_index('z'));
    m
});

pub fn lookup(key: super::remap::MethodKey) -> Option<Handler> {
    TABLE.get(&key).copied()
}
