//! The driver crate: wires `nimbus-frontend`'s decoder, `nimbus-codegen`'s
//! optimizer and PTX backend, and `nimbus-intrinsics`' call resolution
//! (already invoked transparently by the decoder) into the single
//! `Context::compile` entry point an embedder drives (`spec.md` §5, §6).
//!
//! Corresponds to `crates/cranelift` in the teacher workspace: a thin
//! glue layer over a reusable codegen crate, specific to one source
//! language and one embedding contract.

pub mod context;
pub mod diagnostics;
pub mod options;

pub use context::{compile, compile_function, Context, NoCallees};
pub use diagnostics::{Diagnostic, DiagnosticSink, NullDiagnosticSink, Severity, TestDiagnosticSink};
pub use options::CompileOptions;

pub use nimbus_codegen::opt::inline::CalleeResolver;
pub use nimbus_codegen::opt::pipeline::{CancellationToken, OptimizationLevel};
pub use nimbus_codegen::result::{CodegenResult, CompileError};
pub use nimbus_codegen::CapabilityContext;
pub use nimbus_codegen::isa::BackendKind;
