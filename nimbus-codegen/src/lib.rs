//! The mid-level compiler: type system, SSA IR, optimization pipeline and
//! the PTX backend (`spec.md` §2 "System Overview", components 2-7).
//!
//! Mirrors `cranelift-codegen`'s split between an IR crate-within-a-crate
//! (`ir`), target-independent optimization passes (`opt`), and a
//! per-target backend (`isa`): a frontend builds a [`ir::Function`]
//! through [`ir::FunctionBuilder`], [`opt::pipeline::run`] rewrites it in
//! place, and [`isa::ptx::compile`] lowers the result to a
//! [`isa::CompiledKernel`]. Decoding managed bytecode into IR and
//! resolving intrinsic calls both live upstream, in `nimbus-frontend` and
//! `nimbus-intrinsics`.

pub mod capability;
pub mod debuginfo;
pub mod dominator_tree;
pub mod ir;
pub mod isa;
pub mod opt;
pub mod result;

pub use capability::{capabilities, CapabilityContext};
pub use debuginfo::{DebugInformation, DebugSymbolProvider, NoDebugSymbols, SequencePoint};
pub use dominator_tree::DominatorTree;
pub use result::{CodegenResult, CompileError};
