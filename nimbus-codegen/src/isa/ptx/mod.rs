//! The PTX backend: SSA destruction, register allocation, instruction
//! selection, kernel ABI and serialization, wired into one `compile`
//! entry point (`spec.md` §4.6).

pub mod abi;
pub mod regalloc;
pub mod select;
pub mod serialize;

use crate::debuginfo::DebugInformation;
use crate::ir::Function;
use crate::isa::{BackendKind, CompiledKernel};
use crate::opt::ssa_destruct;
use crate::result::CodegenResult;
use crate::CapabilityContext;

/// Backend-local knobs that don't belong on `CompileOptions` (the
/// embedder-facing options live in `nimbus-jit`; this one only controls
/// whether PTX-level `.loc` directives get emitted).
#[derive(Debug, Clone, Copy, Default)]
pub struct PtxOptions {
    pub enable_debug_info: bool,
}

/// Lower `func` to a complete PTX [`CompiledKernel`]. `func` must already
/// have gone through the optimization pipeline; SSA destruction runs
/// here, last, because it is backend-specific (it only makes sense once
/// a register allocator is about to consume the result).
///
/// `debug` is the caller's already-loaded [`DebugInformation`], if any;
/// it is only consulted when `options.enable_debug_info` is set, so an
/// embedder can hold debug symbols ready without paying for `.loc`
/// emission on a release compile of the same method.
pub fn compile(
    func: &mut Function,
    types: &crate::ir::TypeSystem,
    capabilities: &CapabilityContext,
    options: &PtxOptions,
    debug: Option<&DebugInformation>,
) -> CodegenResult<CompiledKernel> {
    let debug = if options.enable_debug_info { debug } else { None };
    ssa_destruct::run(func);
    let regs = regalloc::allocate(func, types, capabilities)?;
    let (lowered, files) = select::lower(func, types, &regs, capabilities, debug)?;
    let parameter_layout = abi::parameter_layout(func, types)?;
    let kernel_info = abi::kernel_info(func, capabilities);
    let source = serialize::emit(func, capabilities, &regs, &lowered, &parameter_layout, &files);
    Ok(CompiledKernel {
        backend: BackendKind::Ptx,
        entry_point: func.name.clone(),
        source,
        parameter_layout,
        kernel_info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArithmeticFlags, BinaryOp, ConstantValue, DataLayout, FunctionBuilder, FunctionScope, Signature, TypeSystem};

    #[test]
    fn compiles_a_trivial_kernel_end_to_end() {
        let types = TypeSystem::new(DataLayout::lp64());
        let i32_ty = types.int(32, true);
        let mut f = Function::new(
            "answer",
            Signature { params: vec![], ret: i32_ty },
            FunctionScope::KernelEntry,
        );
        {
            let mut b = FunctionBuilder::new(&mut f, &types);
            let entry = b.create_block();
            b.switch_to_block(entry).unwrap();
            let a = b.create_const(i32_ty, ConstantValue::Int(40)).unwrap();
            let c = b.create_const(i32_ty, ConstantValue::Int(2)).unwrap();
            let sum = b.create_binary(BinaryOp::Add, a, c, ArithmeticFlags::new()).unwrap();
            b.create_return(&[sum]).unwrap();
        }
        let caps = CapabilityContext::for_ptx_sm(70);
        let kernel = compile(&mut f, &types, &caps, &PtxOptions::default(), None).unwrap();
        let text = String::from_utf8(kernel.source.clone()).unwrap();
        assert!(text.contains("add.s32"));
        assert_eq!(kernel.entry_point, "answer");
        assert_eq!(kernel.kernel_info.shared_bytes, 0);
    }
}
