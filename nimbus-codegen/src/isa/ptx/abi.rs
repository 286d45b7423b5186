//! Kernel ABI: how a method's signature crosses the host/device boundary
//! (`spec.md` §4.6 "Kernel ABI").
//!
//! Scalars pass through a single `.param`; views pass as a `{pointer,
//! length}` pair, reported to the caller as one [`ParameterLayout`] entry
//! per source parameter (the pair is an implementation detail of the
//! PTX declaration, not something the embedder needs to know how to
//! split); by-value structures pass by copy below
//! [`STRUCT_BY_POINTER_THRESHOLD`] bytes and by pointer above it, same
//! tradeoff `nvcc` makes for large `__global__` parameters.

use crate::ir::{AddressSpace, Function, TypeKind, TypeSystem};
use crate::isa::{KernelInfo, ParamKind, ParameterLayout};
use crate::result::CodegenResult;
use crate::CapabilityContext;

/// Structures larger than this are passed by pointer instead of by
/// value; chosen to keep small vector-like structs (`float4`-sized and
/// below) in registers while avoiding multi-hundred-byte `.param` copies.
pub const STRUCT_BY_POINTER_THRESHOLD: u64 = 64;

/// Compute one [`ParameterLayout`] per source parameter, in order.
pub fn parameter_layout(func: &Function, types: &TypeSystem) -> CodegenResult<Vec<ParameterLayout>> {
    let mut layout = Vec::with_capacity(func.signature.params.len());
    for &p in &func.signature.params {
        let entry = match types.kind(p) {
            TypeKind::View { space, .. } => ParameterLayout {
                kind: ParamKind::View,
                size: types.size(p)?,
                align: types.align(p)?,
                address_space: space,
            },
            TypeKind::Pointer { space, .. } => ParameterLayout {
                kind: ParamKind::View,
                size: types.size(p)?,
                align: types.align(p)?,
                address_space: space,
            },
            TypeKind::Structure { .. } => ParameterLayout {
                kind: ParamKind::ByValueStruct,
                size: types.size(p)?,
                align: types.align(p)?,
                address_space: AddressSpace::Generic,
            },
            _ => ParameterLayout {
                kind: ParamKind::Scalar,
                size: types.size(p)?,
                align: types.align(p)?,
                address_space: AddressSpace::Generic,
            },
        };
        layout.push(entry);
    }
    Ok(layout)
}

/// Whether `entry` (a by-value struct) is passed by pointer rather than
/// by copy through its own `.param` slot.
pub fn struct_passed_by_pointer(entry: &ParameterLayout) -> bool {
    entry.kind == ParamKind::ByValueStruct && entry.size > STRUCT_BY_POINTER_THRESHOLD
}

/// Dataflow facts the runtime scheduler needs before it can launch this
/// kernel (`spec.md` §6 "kernel_info"). `local_bytes` is always zero:
/// this register allocator fails with `RegisterPressureExceeded` instead
/// of spilling, so no method it accepts ever touches `.local`.
pub fn kernel_info(func: &Function, capabilities: &CapabilityContext) -> KernelInfo {
    KernelInfo {
        shared_bytes: func.shared_memory_bytes,
        local_bytes: 0,
        min_group: capabilities.warp_size,
        max_group: capabilities.warp_size * 32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DataLayout, FunctionScope, Signature};

    #[test]
    fn view_parameter_reports_as_one_layout_entry() {
        let types = TypeSystem::new(DataLayout::lp64());
        let f32_ty = types.float(32);
        let view = types.view_of(f32_ty, AddressSpace::Global);
        let f = Function::new(
            "saxpy",
            Signature { params: vec![view, view], ret: types.void() },
            FunctionScope::KernelEntry,
        );
        let layout = parameter_layout(&f, &types).unwrap();
        assert_eq!(layout.len(), 2);
        assert_eq!(layout[0].kind, ParamKind::View);
        assert_eq!(layout[0].size, 16);
    }

    #[test]
    fn large_struct_is_passed_by_pointer() {
        let types = TypeSystem::new(DataLayout::lp64());
        let f64_ty = types.float(64);
        let fields = vec![f64_ty; 16];
        let st = types.structure_of(fields);
        let f = Function::new(
            "f",
            Signature { params: vec![st], ret: types.void() },
            FunctionScope::KernelEntry,
        );
        let layout = parameter_layout(&f, &types).unwrap();
        assert!(struct_passed_by_pointer(&layout[0]));
    }
}
