//! Stack-machine bytecode decoding: turning one method's linear
//! instruction stream into the SSA `nimbus_codegen::ir::Function` the
//! optimizer and PTX backend operate on (`spec.md` §4.3).
//!
//! [`decode_method`] is the only entry point most callers need; the rest
//! of the public surface (`bytecode`, `method`) exists so an embedder can
//! build a [`MethodRef`] from its own metadata without going through an
//! intermediate textual format.

mod decoder;
mod intern;

pub mod bytecode;
pub mod method;

pub use bytecode::{Assembler, DecodeError, Label, RawOpcode};
pub use decoder::decode_method;
pub use method::{ArrayLiteral, CallSite, MethodRef};
