//! Entity handles for the pieces of an SSA method.
//!
//! Every cross-reference inside a [`crate::ir::Function`] is one of these
//! small `Copy` handles indexing into a `PrimaryMap` owned by that
//! function's arena — never a pointer — per the "Arena + indices" design
//! note in `spec.md` §9.

use nimbus_entity::entity_impl;

/// An SSA value: either the result of an instruction or a block parameter.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(u32);
entity_impl!(Value, "v");

/// A basic block.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// A reference to a callee, resolved by the frontend to either another
/// `Function` in the same compilation or an external symbol the backend
/// links against (a `LibDevice` routine).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncRef(u32);
entity_impl!(FuncRef, "fn");

/// A reference to a pooled constant blob (used for array-creation /
/// array-initialization lowering, `spec.md` §4.3).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Constant(u32);
entity_impl!(Constant, "const");
