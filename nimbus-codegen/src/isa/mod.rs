//! Backend targets and the artifact they package (`spec.md` §3
//! "CompiledKernel", §4.6, §6 "CompiledKernel format").
//!
//! Only the PTX backend is implemented — the other accelerator targets
//! named in the system overview (OpenCL/SPIR-V, native CPU codegen) are
//! out of scope for this crate (`spec.md` §1 Non-goals). `BackendKind`
//! is still an open enum rather than a single hardcoded constant so
//! `CompiledKernel::backend` reads the way the teacher's own
//! `isa::lookup`-keyed artifacts do, and so a second backend can be
//! added later without reshaping this type.

pub mod ptx;

use crate::ir::AddressSpace;
use std::fmt;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Ptx,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BackendKind::Ptx => write!(f, "ptx"),
        }
    }
}

/// How one parameter of a kernel-entry method is passed across the ABI
/// boundary (`spec.md` §4.6 "Kernel ABI").
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Scalar,
    /// A {pointer, length} pair (`spec.md` §3 "View").
    View,
    ByValueStruct,
}

/// One entry of `CompiledKernel::parameter_layout` (`spec.md` §6
/// "CompiledKernel format (PTX backend)").
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterLayout {
    pub kind: ParamKind,
    pub size: u64,
    pub align: u64,
    pub address_space: AddressSpace,
}

/// Dataflow summary handed to the runtime scheduler (`spec.md` §2 "Frontend
/// ↔ Backend glue / KernelInfo", §6 "kernel_info").
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KernelInfo {
    pub shared_bytes: u32,
    pub local_bytes: u32,
    pub min_group: u32,
    pub max_group: u32,
}

/// The compiler's sole output artifact (`spec.md` §3 "CompiledKernel").
/// Immutable once produced: every field is set exactly once, by
/// `isa::ptx::compile`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledKernel {
    pub backend: BackendKind,
    pub entry_point: String,
    pub source: Vec<u8>,
    pub parameter_layout: Vec<ParameterLayout>,
    pub kernel_info: KernelInfo,
}
