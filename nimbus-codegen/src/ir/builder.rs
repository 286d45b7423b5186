//! `FunctionBuilder`: the sole interface that mutates a [`Function`]
//! (`spec.md` §4.2 "The Builder is the only interface that mutates a
//! Method").
//!
//! Modeled on `cranelift-frontend`'s `FunctionBuilder`: a thin wrapper
//! that tracks one insertion point, forbids emitting past a sealed
//! (terminated) block, and exposes one method per opcode family.

use crate::ir::dfg::{AsmTemplate, ConstantValue, Direction, ExternalFunc, Opcode};
use crate::ir::entities::{Block, Constant, FuncRef, Value};
use crate::ir::function::Function;
use crate::ir::instructions::{ArithmeticFlags, BinaryOp, CompareFlags, CompareOp, ConvertOp, TernaryOp, UnaryOp};
use crate::ir::sourceloc::SourceLoc;
use crate::ir::types::{AddressSpace, TypeKind, TypeRef, TypeSystem};
use crate::result::{CodegenResult, CompileError};
use std::collections::HashSet;

/// Mutates exactly one [`Function`] at a time. Dropping the builder
/// leaves the function exactly as far along as construction got —
/// there is no implicit "finish" step.
pub struct FunctionBuilder<'f> {
    func: &'f mut Function,
    types: &'f TypeSystem,
    insertion_block: Option<Block>,
    sealed: HashSet<Block>,
    loc: SourceLoc,
}

impl<'f> FunctionBuilder<'f> {
    pub fn new(func: &'f mut Function, types: &'f TypeSystem) -> Self {
        Self {
            func,
            types,
            insertion_block: None,
            sealed: HashSet::new(),
            loc: SourceLoc::unknown(),
        }
    }

    pub fn set_source_loc(&mut self, loc: SourceLoc) {
        self.loc = loc;
    }

    pub fn make_func_ref(&mut self, ext: ExternalFunc) -> FuncRef {
        self.func.dfg.make_func_ref(ext)
    }

    pub fn make_constant(&mut self, bytes: Vec<u8>) -> Constant {
        self.func.dfg.make_constant(bytes)
    }

    /// Direct access to the function under construction, for callers (a
    /// bytecode decoder, an intrinsic dispatch handler) that need to
    /// operate on it outside this builder's own per-opcode API — e.g.
    /// rewriting a just-built call's opcode in place once its callee is
    /// known to be an intrinsic.
    pub fn func_mut(&mut self) -> &mut Function {
        self.func
    }

    /// Read-only counterpart of [`FunctionBuilder::func_mut`], for
    /// callers that only need to inspect already-built state (a value's
    /// type, say) without taking a mutable borrow of the whole builder.
    pub fn func(&self) -> &Function {
        self.func
    }

    /// Create a new, empty block and append it to the function. Does not
    /// move the insertion point.
    pub fn create_block(&mut self) -> Block {
        let b = self.func.make_block();
        self.func.layout.append_block(b);
        if self.func.entry_block.expand().is_none() {
            self.func.entry_block = b.into();
        }
        b
    }

    /// Move the insertion point to `block`. Fails if the block already
    /// has a terminator (`spec.md` §4.2 "the current insertion point must
    /// not be past a terminator").
    pub fn switch_to_block(&mut self, block: Block) -> CodegenResult<()> {
        if self.sealed.contains(&block) {
            return Err(CompileError::CodegenInvariant {
                reason: format!("switch_to_block({block}) on an already-terminated block"),
                loc: self.loc,
            });
        }
        self.insertion_block = Some(block);
        Ok(())
    }

    pub fn append_block_param(&mut self, block: Block, ty: TypeRef) -> Value {
        let v = self.func.dfg.make_value(block, ty, Opcode::BlockParam, self.loc);
        self.func.dfg.append_block_param(block, v);
        v
    }

    fn cur(&self) -> CodegenResult<Block> {
        self.insertion_block.ok_or_else(|| CompileError::CodegenInvariant {
            reason: "no insertion point set".into(),
            loc: self.loc,
        })
    }

    fn emit(&mut self, ty: TypeRef, opcode: Opcode) -> CodegenResult<Value> {
        let block = self.cur()?;
        if self.sealed.contains(&block) {
            return Err(CompileError::CodegenInvariant {
                reason: format!("block {block} already has a terminator (TerminatorExists)"),
                loc: self.loc,
            });
        }
        let is_term = opcode.is_terminator();
        let v = self.func.dfg.make_value(block, ty, opcode, self.loc);
        self.func.layout.append_value(block, v);
        if is_term {
            self.sealed.insert(block);
        }
        Ok(v)
    }

    fn ty_of(&self, v: Value) -> TypeRef {
        self.func.dfg.value_type(v)
    }

    fn require_same(&self, a: Value, b: Value, opcode: &str) -> CodegenResult<TypeRef> {
        let ta = self.ty_of(a);
        let tb = self.ty_of(b);
        if ta != tb {
            return Err(CompileError::TypeMismatch {
                opcode: opcode.into(),
                expected: format!("{ta:?} (from lhs)"),
                found: format!("{tb:?} (from rhs)"),
                loc: self.loc,
            });
        }
        Ok(ta)
    }

    fn require_kind(&self, t: TypeRef, opcode: &str, want: &str) -> CodegenResult<TypeKind> {
        let kind = self.types.kind(t);
        let ok = match (&kind, want) {
            (TypeKind::Bool, "bool") => true,
            (TypeKind::Int { .. }, "int") => true,
            (TypeKind::Float { .. }, "float") => true,
            (TypeKind::Int { .. } | TypeKind::Float { .. }, "numeric") => true,
            (TypeKind::Pointer { .. }, "pointer") => true,
            (TypeKind::View { .. }, "view") => true,
            _ => false,
        };
        if ok {
            Ok(kind)
        } else {
            Err(CompileError::TypeMismatch {
                opcode: opcode.into(),
                expected: want.into(),
                found: format!("{kind:?}"),
                loc: self.loc,
            })
        }
    }

    pub fn create_const(&mut self, ty: TypeRef, value: ConstantValue) -> CodegenResult<Value> {
        self.emit(ty, Opcode::Const(value))
    }

    pub fn create_unary(&mut self, op: UnaryOp, arg: Value, flags: ArithmeticFlags) -> CodegenResult<Value> {
        let ty = self.ty_of(arg);
        self.require_kind(ty, "unary", "numeric")?;
        self.emit(ty, Opcode::Unary { op, arg, flags })
    }

    pub fn create_binary(
        &mut self,
        op: BinaryOp,
        lhs: Value,
        rhs: Value,
        flags: ArithmeticFlags,
    ) -> CodegenResult<Value> {
        let ty = self.require_same(lhs, rhs, "binary")?;
        self.require_kind(ty, "binary", "numeric")?;
        self.emit(ty, Opcode::Binary { op, lhs, rhs, flags })
    }

    pub fn create_ternary(
        &mut self,
        op: TernaryOp,
        a: Value,
        b: Value,
        c: Value,
        flags: ArithmeticFlags,
    ) -> CodegenResult<Value> {
        // Select's condition is Bool but its two value operands (b, c)
        // determine the result type; FusedMulAdd/Clamp are homogeneous.
        let ty = match op {
            TernaryOp::Select => self.require_same(b, c, "select")?,
            _ => {
                self.require_same(a, b, "ternary")?;
                self.require_same(b, c, "ternary")?
            }
        };
        self.emit(ty, Opcode::Ternary { op, a, b, c, flags })
    }

    pub fn create_compare(
        &mut self,
        op: CompareOp,
        lhs: Value,
        rhs: Value,
        flags: CompareFlags,
    ) -> CodegenResult<Value> {
        self.require_same(lhs, rhs, "compare")?;
        self.emit(self.types.bool_(), Opcode::Compare { op, lhs, rhs, flags })
    }

    pub fn create_convert(
        &mut self,
        op: ConvertOp,
        arg: Value,
        target: TypeRef,
        flags: ArithmeticFlags,
    ) -> CodegenResult<Value> {
        self.emit(target, Opcode::Convert { op, arg, flags })
    }

    pub fn create_load(&mut self, ptr: Value, result_ty: TypeRef, space: AddressSpace) -> CodegenResult<Value> {
        self.require_kind(self.ty_of(ptr), "load", "pointer")?;
        self.emit(result_ty, Opcode::Load { ptr, space })
    }

    pub fn create_store(&mut self, ptr: Value, value: Value, space: AddressSpace) -> CodegenResult<Value> {
        self.require_kind(self.ty_of(ptr), "store", "pointer")?;
        self.emit(self.types.void(), Opcode::Store { ptr, value, space })
    }

    pub fn create_load_element_address(
        &mut self,
        base: Value,
        index: Value,
        result_ty: TypeRef,
    ) -> CodegenResult<Value> {
        self.require_kind(self.ty_of(base), "load_element_address", "view")?;
        self.emit(result_ty, Opcode::LoadElementAddress { base, index })
    }

    pub fn create_array_to_view_cast(&mut self, constant: Constant, view_ty: TypeRef) -> CodegenResult<Value> {
        self.emit(view_ty, Opcode::ArrayToViewCast { constant })
    }

    pub fn create_get_field(&mut self, base: Value, index: u32, field_ty: TypeRef) -> CodegenResult<Value> {
        self.emit(field_ty, Opcode::GetField { base, index })
    }

    pub fn create_set_field(&mut self, base: Value, index: u32, value: Value) -> CodegenResult<Value> {
        self.emit(self.types.void(), Opcode::SetField { base, index, value })
    }

    pub fn create_call(&mut self, callee: FuncRef, args: &[Value], ret_ty: TypeRef) -> CodegenResult<Value> {
        let args = self.func.dfg.make_value_list(args);
        self.emit(ret_ty, Opcode::Call { callee, args })
    }

    pub fn create_return(&mut self, args: &[Value]) -> CodegenResult<Value> {
        let args = self.func.dfg.make_value_list(args);
        self.emit(self.types.void(), Opcode::Return { args })
    }

    pub fn create_branch(
        &mut self,
        cond: Value,
        then_block: Block,
        then_args: &[Value],
        else_block: Block,
        else_args: &[Value],
    ) -> CodegenResult<Value> {
        self.require_kind(self.ty_of(cond), "branch", "bool")?;
        let then_args = self.func.dfg.make_value_list(then_args);
        let else_args = self.func.dfg.make_value_list(else_args);
        self.emit(
            self.types.void(),
            Opcode::Branch {
                cond,
                then_block,
                then_args,
                else_block,
                else_args,
            },
        )
    }

    pub fn create_jump(&mut self, block: Block, args: &[Value]) -> CodegenResult<Value> {
        let args = self.func.dfg.make_value_list(args);
        self.emit(self.types.void(), Opcode::Jump { block, args })
    }

    pub fn create_switch(
        &mut self,
        value: Value,
        cases: Vec<(i64, Block, Vec<Value>)>,
        default: Block,
        default_args: &[Value],
    ) -> CodegenResult<Value> {
        let cases = cases
            .into_iter()
            .map(|(k, b, a)| (k, b, self.func.dfg.make_value_list(&a)))
            .collect();
        let default_args = self.func.dfg.make_value_list(default_args);
        self.emit(
            self.types.void(),
            Opcode::Switch {
                value,
                cases,
                default,
                default_args,
            },
        )
    }

    pub fn create_unreachable(&mut self) -> CodegenResult<Value> {
        self.emit(self.types.void(), Opcode::Unreachable)
    }

    /// Inline device-assembly escape hatch (`spec.md` §4.4, §4.6).
    /// `raw_template` is parsed into literal spans and positional
    /// argument references; an invalid placeholder or an argument index
    /// beyond `args.len()` fails with `InvalidInlineAssembly`.
    pub fn create_language_emit(
        &mut self,
        backend: impl Into<String>,
        raw_template: &str,
        args: &[Value],
        directions: Vec<Direction>,
        result_ty: TypeRef,
    ) -> CodegenResult<Value> {
        let template = AsmTemplate::parse(raw_template).map_err(|reason| CompileError::InvalidInlineAssembly { reason })?;
        if directions.len() != args.len() {
            return Err(CompileError::InvalidInlineAssembly {
                reason: format!(
                    "{} direction tags but {} operands",
                    directions.len(),
                    args.len()
                ),
            });
        }
        if let Some(max) = template.max_arg_index() {
            if max >= args.len() {
                return Err(CompileError::InvalidInlineAssembly {
                    reason: format!("template references %{max} but only {} operands given", args.len()),
                });
            }
        }
        let args = self.func.dfg.make_value_list(args);
        self.emit(
            result_ty,
            Opcode::LanguageEmit {
                backend: backend.into(),
                template,
                args,
                directions,
            },
        )
    }

    pub fn create_debug_assert(&mut self, cond: Value, message: impl Into<String>) -> CodegenResult<Value> {
        self.require_kind(self.ty_of(cond), "debug_assert", "bool")?;
        self.emit(
            self.types.void(),
            Opcode::DebugAssert {
                cond,
                message: message.into(),
            },
        )
    }
}
