//! End-to-end scenarios driven through the embedder-facing `nimbus-jit`
//! surface: bytecode (or, for the inline-assembly case, hand-built IR) in,
//! a `CompiledKernel` (or a refusal) out. Each test exercises one scenario
//! from `spec.md` §8 through the full decode -> optimize -> PTX pipeline,
//! rather than unit-testing a single pass in isolation the way the crates
//! under test already do in their own `#[cfg(test)]` modules.

use nimbus_codegen::ir::{AddressSpace, ConstantValue, DataLayout, Direction, FunctionBuilder, FunctionScope, Signature, TypeSystem};
use nimbus_codegen::isa::BackendKind;
use nimbus_codegen::opt::pipeline::CancellationToken;
use nimbus_codegen::{CapabilityContext, CompileError, DebugInformation, DebugSymbolProvider};
use nimbus_frontend::{Assembler, MethodRef};
use nimbus_jit::{compile, compile_function, CompileOptions, NoCallees, NullDiagnosticSink};

fn types() -> TypeSystem {
    TypeSystem::new(DataLayout::lp64())
}

/// Scenario 1: `y[i] = a * x[i] + y[i]` at the global thread index,
/// reading the index through the remapped `Grid.IndexX` intrinsic.
#[test]
fn saxpy_fuses_the_multiply_into_the_add_and_touches_no_shared_memory() {
    let ts = types();
    let f32_ty = ts.float(32);
    let u32_ty = ts.int(32, false);
    let x_view = ts.view_of(f32_ty, AddressSpace::Global);
    let y_view = ts.view_of(f32_ty, AddressSpace::Global);

    let mut asm = Assembler::new();
    asm.call(0) // Grid.IndexX() -> idx
        .st_loc(0)
        .ld_arg(1) // x
        .ld_loc(0)
        .ld_elem() // x[idx]
        .ld_arg(0) // a
        .mul() // a * x[idx]
        .ld_arg(2) // y
        .ld_loc(0)
        .ld_elem() // y[idx]
        .add() // a*x[idx] + y[idx]
        .st_loc(1)
        .ld_arg(2) // y
        .ld_loc(0)
        .ld_loc(1)
        .st_elem() // y[idx] = ...
        .ret();

    let mut method = MethodRef::new("saxpy", vec![f32_ty, x_view, y_view], ts.void(), FunctionScope::KernelEntry);
    method.locals = vec![u32_ty, f32_ty];
    method.calls = vec![nimbus_frontend::CallSite {
        declaring_type: "Nimbus.Grid".into(),
        method: "IndexX".into(),
        arg_count: 0,
        ret_ty: u32_ty,
    }];
    method.code = asm.finish();

    let caps = CapabilityContext::for_ptx_sm(70);
    let options = CompileOptions::default();
    let kernel = compile(&method, &ts, BackendKind::Ptx, &caps, &options).expect("saxpy should compile");

    let text = String::from_utf8(kernel.source).unwrap();
    assert!(
        text.contains("mad.rn.f32") || text.contains("fma.rn.f32"),
        "expected the multiply feeding the add to fuse into one instruction, got:\n{text}"
    );
    assert!(!text.contains("mul.f32"), "the fused multiply should never get its own line:\n{text}");
    assert!(!text.contains(".local"), "this kernel has no register overflow and should never spill:\n{text}");
    assert_eq!(kernel.kernel_info.shared_bytes, 0);
}

/// Scenario 2: shared-memory allocation and a group barrier, the two
/// primitives a block-wide reduction is built from.
#[test]
fn shared_memory_allocation_and_barrier_reach_the_kernel_abi() {
    let ts = types();
    let shared_ptr = ts.pointer_to(ts.float(32), AddressSpace::Shared);

    let mut asm = Assembler::new();
    asm.ldc_i4(4096)
        .ldc_i4(4)
        .call(0) // SharedMemory.Allocate(4096, 4) -- 1024 floats, natural alignment
        .pop()
        .call(1) // Group.Barrier()
        .ret();

    let mut method = MethodRef::new("reduce_block", vec![], ts.void(), FunctionScope::KernelEntry);
    method.calls = vec![
        nimbus_frontend::CallSite {
            declaring_type: "Nimbus.SharedMemory".into(),
            method: "Allocate".into(),
            arg_count: 2,
            ret_ty: shared_ptr,
        },
        nimbus_frontend::CallSite {
            declaring_type: "Nimbus.Group".into(),
            method: "Barrier".into(),
            arg_count: 0,
            ret_ty: ts.void(),
        },
    ];
    method.code = asm.finish();

    let caps = CapabilityContext::for_ptx_sm(70);
    let options = CompileOptions::default();
    let kernel = compile(&method, &ts, BackendKind::Ptx, &caps, &options).expect("shared-memory kernel should compile");

    assert_eq!(kernel.kernel_info.shared_bytes, 4096);
    let text = String::from_utf8(kernel.source).unwrap();
    assert!(text.contains(".shared .align 4 .b8 smem[4096];"), "missing shared declaration:\n{text}");
    assert!(text.contains("bar.sync 0;"), "missing barrier:\n{text}");
}

/// Scenario 3: a call written against `System.Math::Sqrt` is remapped to
/// `Nimbus.Math::Sqrt` and dispatched straight to `sqrt.rn`, with no
/// lingering host call left for the backend to choke on.
#[test]
fn remapped_math_sqrt_lowers_to_sqrt_rn() {
    let ts = types();
    let f64_ty = ts.float(64);

    let mut asm = Assembler::new();
    asm.ld_arg(0).call(0).ret();

    let mut method = MethodRef::new("sqrt_one", vec![f64_ty], f64_ty, FunctionScope::DeviceFunction);
    method.calls = vec![nimbus_frontend::CallSite {
        declaring_type: "System.Math".into(),
        method: "Sqrt".into(),
        arg_count: 1,
        ret_ty: f64_ty,
    }];
    method.code = asm.finish();

    let caps = CapabilityContext::for_ptx_sm(70);
    let options = CompileOptions::default();
    let kernel = compile(&method, &ts, BackendKind::Ptx, &caps, &options).expect("remapped sqrt should compile");

    let text = String::from_utf8(kernel.source).unwrap();
    assert!(text.contains("sqrt.rn.f64"), "expected a device sqrt, got:\n{text}");
    assert!(!text.contains("call.uni"), "the intrinsic call should have been rewritten, not left as a host call:\n{text}");
}

/// Scenario 4: the inline-PTX escape hatch, assembled directly with
/// `FunctionBuilder` since there is no bytecode opcode for raw device
/// assembly — this is `nimbus-jit`'s `NoCallees`/`compile_function` entry
/// point's motivating case.
#[test]
fn inline_ptx_escape_hatch_emits_its_literal_template() {
    let ts = types();
    let u32_ty = ts.int(32, false);
    let mut func = nimbus_codegen::ir::Function::new(
        "read_lane_id",
        Signature { params: vec![], ret: u32_ty },
        FunctionScope::DeviceFunction,
    );
    let laneid;
    {
        let mut b = FunctionBuilder::new(&mut func, &ts);
        let entry = b.create_block();
        b.switch_to_block(entry).unwrap();
        let placeholder = b.create_const(u32_ty, ConstantValue::Int(0)).unwrap();
        laneid = b
            .create_language_emit("ptx", "mov.u32 %0, %%laneid;", &[placeholder], vec![Direction::Out], u32_ty)
            .unwrap();
        b.create_return(&[laneid]).unwrap();
    }

    let caps = CapabilityContext::for_ptx_sm(70);
    let options = CompileOptions::default();
    let diagnostics = NullDiagnosticSink;
    let token = CancellationToken::new();
    let kernel = compile_function(&mut func, &ts, BackendKind::Ptx, &caps, &options, &NoCallees, &diagnostics, &token)
        .expect("inline asm kernel should compile");

    let text = String::from_utf8(kernel.source).unwrap();
    assert!(text.contains(", %laneid;"), "expected the escaped %% to render as a literal %laneid, got:\n{text}");
    assert!(text.contains("mov.u32"), "expected the literal mnemonic to survive verbatim, got:\n{text}");
}

/// Scenario 5: a capability the target doesn't support is refused before
/// any PTX is produced. Per `DESIGN.md`'s recorded decision, this gates
/// `Warp.ShuffleDown` (`SUBGROUP_SHUFFLE`, introduced at `sm_70`) at
/// `sm_60` rather than the spec text's literal FP64-atomic example, since
/// this capability table already grants FP64 atomics starting at `sm_60`.
#[test]
fn capability_refusal_produces_no_partial_kernel() {
    let ts = types();
    let f32_ty = ts.float(32);
    let i32_ty = ts.int(32, true);

    let mut asm = Assembler::new();
    asm.ld_arg(0).ld_arg(1).call(0).ret();

    let mut method = MethodRef::new("shuffle_down_one", vec![f32_ty, i32_ty], f32_ty, FunctionScope::DeviceFunction);
    method.calls = vec![nimbus_frontend::CallSite {
        declaring_type: "Nimbus.Warp".into(),
        method: "ShuffleDown".into(),
        arg_count: 2,
        ret_ty: f32_ty,
    }];
    method.code = asm.finish();

    let caps = CapabilityContext::for_ptx_sm(60);
    let options = CompileOptions::default();
    let err = compile(&method, &ts, BackendKind::Ptx, &caps, &options).unwrap_err();

    match err {
        CompileError::CapabilityNotSupported { feature, min_arch } => {
            assert_eq!(feature, "Warp.ShuffleDown");
            assert_eq!(min_arch, "sm_70");
        }
        other => panic!("expected CapabilityNotSupported, got {other:?}"),
    }
}

/// Scenario 6: a pure, unused computation never reaches the emitted PTX,
/// and compiling the same method twice produces byte-identical output.
#[test]
fn dead_code_is_eliminated_and_codegen_is_deterministic() {
    let ts = types();
    let i32_ty = ts.int(32, true);

    let mut asm = Assembler::new();
    asm.ld_arg(0)
        .ldc_i4(3)
        .add()
        .st_loc(0)
        .ld_arg(0)
        .ldc_i4(4)
        .mul() // dead: computed, then discarded from the abstract stack
        .pop()
        .ld_loc(0)
        .ret();

    let mut method = MethodRef::new("mostly_dead", vec![i32_ty], i32_ty, FunctionScope::DeviceFunction);
    method.locals = vec![i32_ty];
    method.code = asm.finish();

    let caps = CapabilityContext::for_ptx_sm(70);
    let options = CompileOptions::default();

    let first = compile(&method, &ts, BackendKind::Ptx, &caps, &options).expect("first compile");
    let second = compile(&method, &ts, BackendKind::Ptx, &caps, &options).expect("second compile");

    let text = String::from_utf8(first.source.clone()).unwrap();
    assert!(!text.contains("mul.s32"), "the dead multiply should have been eliminated:\n{text}");
    assert_eq!(first.source, second.source, "identical input should produce byte-identical PTX");
}

/// Scenario 7: `enable_debug_info` turns a loaded `DebugInformation` into
/// `.file`/`.loc` directives in the emitted PTX; leaving it unset emits
/// none even with the same symbols on hand (`spec.md` §6
/// "`enable_debug_info`: bool; if set, every IR value records a source
/// location and the backend emits debug directives").
#[test]
fn debug_info_round_trips_into_loc_directives_only_when_enabled() {
    struct FixedProvider(Vec<u8>);
    impl DebugSymbolProvider for FixedProvider {
        fn symbols_for(&self, _assembly_id: &str) -> Option<Vec<u8>> {
            Some(self.0.clone())
        }
    }

    let ts = types();
    let i32_ty = ts.int(32, true);

    let mut asm = Assembler::new();
    asm.ld_arg(0).ldc_i4(1).add().ret();

    let mut method = MethodRef::new("increment", vec![i32_ty], i32_ty, FunctionScope::DeviceFunction);
    method.code = asm.finish();

    let file = "Increment.cs";
    let mut symbols = Vec::new();
    symbols.extend_from_slice(&0u32.to_le_bytes()); // bytecode_offset
    symbols.extend_from_slice(&7u32.to_le_bytes()); // line
    symbols.extend_from_slice(&1u32.to_le_bytes()); // column
    symbols.extend_from_slice(&(file.len() as u16).to_le_bytes());
    symbols.extend_from_slice(file.as_bytes());
    let debug = DebugInformation::load("Kernels.dll", &FixedProvider(symbols)).unwrap().unwrap();

    let caps = CapabilityContext::for_ptx_sm(70);

    let mut with_debug = CompileOptions::default();
    with_debug.enable_debug_info = true;
    with_debug.debug_information = Some(debug.clone());
    let kernel = compile(&method, &ts, BackendKind::Ptx, &caps, &with_debug).expect("should compile with debug info");
    let text = String::from_utf8(kernel.source).unwrap();
    assert!(text.contains(".file 1 \"Increment.cs\""), "missing file table entry:\n{text}");
    assert!(text.contains(".loc 1 7 1"), "missing loc directive:\n{text}");

    let mut without_debug = CompileOptions::default();
    without_debug.debug_information = Some(debug);
    let kernel = compile(&method, &ts, BackendKind::Ptx, &caps, &without_debug).expect("should compile without debug info");
    let text = String::from_utf8(kernel.source).unwrap();
    assert!(!text.contains(".loc"), "a compile with enable_debug_info unset should never emit .loc:\n{text}");
}
