//! The typed SSA IR (`spec.md` §3, §4.2).

mod builder;
mod cursor;
mod dfg;
mod entities;
mod function;
mod instructions;
mod layout;
mod sourceloc;
mod types;

pub use builder::FunctionBuilder;
pub use cursor::{CursorPosition, FuncCursor};
pub use dfg::{AsmTemplate, ConstantValue, DataFlowGraph, Direction, ExternalFunc, Opcode, TemplateSpan, ValueList};
pub use entities::{Block, Constant, FuncRef, Value};
pub use function::{CapabilityTag, Function, FunctionScope, InlineHint, Signature};
pub use instructions::{ArithmeticFlags, BinaryOp, CompareFlags, CompareOp, ConvertOp, TernaryOp, UnaryOp};
pub use layout::Layout;
pub use sourceloc::SourceLoc;
pub use types::{AddressSpace, DataLayout, TypeKind, TypeRef, TypeSystem};
