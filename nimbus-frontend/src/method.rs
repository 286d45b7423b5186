//! The decoder's input: one method's bytecode plus the side tables its
//! `Call` and `LdStaticArray` instructions index into (`spec.md` §4.3
//! "Input").

use nimbus_codegen::ir::{FunctionScope, InlineHint, TypeRef};

/// A resolved call target: the fixed operand a `Call` instruction's
/// table index points at. `declaring_type`/`method` are matched against
/// `nimbus-intrinsics` exactly as the source language wrote them —
/// remapping, not this table, is what turns `System.Math` into
/// `Nimbus.Math`.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub declaring_type: String,
    pub method: String,
    pub arg_count: usize,
    pub ret_ty: TypeRef,
}

/// A statically known array literal, referenced by `LdStaticArray`
/// (`spec.md` §4.3: array creation/initialization "lowered into a
/// view-cast of a statically allocated constant blob").
#[derive(Debug, Clone)]
pub struct ArrayLiteral {
    pub bytes: Vec<u8>,
    pub view_ty: TypeRef,
}

/// One method ready for decoding: its bytecode, its formal signature,
/// its declared local-slot types (initialized to a zero value of each
/// slot's type on entry), and the call/array side tables its
/// instructions reference by index.
#[derive(Debug, Clone)]
pub struct MethodRef {
    pub name: String,
    pub params: Vec<TypeRef>,
    pub ret: TypeRef,
    pub locals: Vec<TypeRef>,
    pub scope: FunctionScope,
    pub inline_hint: InlineHint,
    pub required_capabilities: Vec<&'static str>,
    pub code: Vec<u8>,
    pub calls: Vec<CallSite>,
    pub arrays: Vec<ArrayLiteral>,
}

impl MethodRef {
    pub fn new(name: impl Into<String>, params: Vec<TypeRef>, ret: TypeRef, scope: FunctionScope) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
            locals: Vec::new(),
            scope,
            inline_hint: InlineHint::Default,
            required_capabilities: Vec::new(),
            code: Vec::new(),
            calls: Vec::new(),
            arrays: Vec::new(),
        }
    }
}
