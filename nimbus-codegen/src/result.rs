//! The compiler's single error type.
//!
//! Mirrors `cranelift-codegen::result`: one flat enum, one `CodegenResult`
//! alias, no ad-hoc `anyhow`/`Box<dyn Error>` inside the library surface.

use crate::ir::SourceLoc;
use thiserror::Error;

/// Result type returned by every fallible operation inside `nimbus-codegen`.
pub type CodegenResult<T> = Result<T, CompileError>;

/// The taxonomy from `spec.md` §7. Every variant is fatal to the current
/// compilation except [`CompileError::Cancelled`], which the embedder may
/// retry.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    /// Bytecode opcode the decoder does not implement.
    #[error("unsupported bytecode instruction {opcode:#04x} at offset {offset} ({loc})")]
    UnsupportedInstruction {
        opcode: u8,
        offset: u32,
        loc: SourceLoc,
    },

    /// A library call has no device equivalent.
    #[error("unsupported intrinsic `{method}` ({loc})")]
    UnsupportedIntrinsic { method: String, loc: SourceLoc },

    /// A reflection-style or otherwise inherently host-only operation.
    #[error("unsupported operation: {message} ({loc})")]
    UnsupportedOperation { message: String, loc: SourceLoc },

    /// Operand types disagree with the opcode's contract.
    #[error("type mismatch in {opcode}: expected {expected}, found {found} ({loc})")]
    TypeMismatch {
        opcode: String,
        expected: String,
        found: String,
        loc: SourceLoc,
    },

    /// A size/alignment/field-offset query was made against a type that
    /// doesn't support it (`Void` or `Function`).
    #[error("invalid type for this query: {reason}")]
    InvalidType { reason: String },

    /// The evaluation stack disagreed in depth or type at a CFG merge.
    #[error("unbalanced operand stack at merge into block {block} ({loc})")]
    UnbalancedStack { block: String, loc: SourceLoc },

    /// A requested lowering needs a backend feature not present.
    #[error("capability `{feature}` not supported (requires at least {min_arch})")]
    CapabilityNotSupported { feature: String, min_arch: String },

    /// Register allocation could not fit the method in the per-thread
    /// register budget.
    #[error("register pressure exceeded by {overflow} registers (limit {limit})")]
    RegisterPressureExceeded { overflow: u32, limit: u32 },

    /// An inline-assembly template has malformed placeholders or an
    /// out-of-range argument index.
    #[error("invalid inline assembly: {reason}")]
    InvalidInlineAssembly { reason: String },

    /// Internal invariant violation; should never be reachable from user
    /// input. Always carries an IR location.
    #[error("codegen invariant violated: {reason} at {loc}")]
    CodegenInvariant { reason: String, loc: SourceLoc },

    /// A structural mutation left a value referenced by a use-list entry
    /// that no longer exists. Implementer bug, never a user error.
    #[error("dangling use of {value} in block {block}")]
    DanglingUse { value: String, block: String },

    /// The compilation was cancelled between optimization passes. The
    /// embedder may retry; no partial `CompiledKernel` is ever produced.
    #[error("compilation cancelled")]
    Cancelled,
}

impl CompileError {
    /// True for [`CompileError::Cancelled`], which is the only recoverable
    /// variant per `spec.md` §7's propagation policy.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CompileError::Cancelled)
    }
}
