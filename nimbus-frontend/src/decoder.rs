//! Stack-machine-to-SSA translation (`spec.md` §4.3 "Frontend / Decoder").
//!
//! Grounded on `cranelift-wasm`'s `code_translator`: a single linear pass
//! over the instruction stream, symbolically executing an abstract
//! operand stack and a local-slot array alongside the bytecode offset.
//! Where `cranelift-wasm` leans on its structured block/loop nesting to
//! know where control merges, this decoder's bytecode only has absolute
//! byte-offset branches, so block boundaries are found by pre-scanning
//! every instruction's possible targets (including a conditional branch's
//! implicit fallthrough) before translation starts. A block's entry
//! "signature" — the types live on the stack and in locals at that point
//! — is fixed the first time any predecessor reaches it; every later
//! predecessor is checked against it, and a mismatch is `UnbalancedStack`.
//! This needs no fixpoint iteration: in a single forward pass over a
//! reducible control-flow graph, a backward branch's target has always
//! already been visited (and so already has a recorded signature) by the
//! time the branch itself is decoded.

use std::collections::{BTreeMap, HashMap, HashSet};

use nimbus_codegen::ir::{
    AddressSpace, ArithmeticFlags, Block, CompareFlags, CompareOp, ConstantValue, ConvertOp, ExternalFunc, FunctionBuilder,
    Signature, SourceLoc, TypeKind, TypeRef, TypeSystem, Value,
};
use nimbus_codegen::ir::{BinaryOp, UnaryOp};
use nimbus_codegen::{CapabilityContext, CodegenResult, CompileError};
use nimbus_intrinsics::IntrinsicCtx;

use crate::bytecode::{self, RawOpcode};
use crate::intern;
use crate::method::MethodRef;

/// Decode `method`'s bytecode into a standalone SSA function.
pub fn decode_method(method: &MethodRef, types: &TypeSystem, capabilities: &CapabilityContext) -> CodegenResult<nimbus_codegen::ir::Function> {
    let signature = Signature {
        params: method.params.clone(),
        ret: method.ret,
    };
    let mut func = nimbus_codegen::ir::Function::new(method.name.clone(), signature, method.scope);
    func.inline_hint = method.inline_hint;
    func.required_capabilities = method.required_capabilities.clone();

    let instructions = bytecode::decode(&method.code).map_err(|e| CompileError::CodegenInvariant {
        reason: e.to_string(),
        loc: SourceLoc::new(e.offset),
    })?;

    let mut decoder = Decoder::new(&mut func, types, capabilities, method, &instructions)?;
    decoder.run()?;
    Ok(func)
}

/// A block's fixed entry shape: the types of the abstract operand stack,
/// followed by the types of every local slot, in that order.
type BlockSignature = (Vec<TypeRef>, Vec<TypeRef>);

struct Decoder<'f, 'm> {
    builder: FunctionBuilder<'f>,
    types: &'f TypeSystem,
    capabilities: &'f CapabilityContext,
    method: &'m MethodRef,
    instructions: &'m [(u32, RawOpcode)],
    block_of: BTreeMap<u32, Block>,
    recorded: HashMap<Block, BlockSignature>,
    params_built: HashSet<Block>,
    args: Vec<Value>,
    cur_stack: Vec<Value>,
    cur_locals: Vec<Value>,
    cur_block: Block,
    block_start_offset: u32,
    terminated: bool,
}

impl<'f, 'm> Decoder<'f, 'm> {
    fn new(
        func: &'f mut nimbus_codegen::ir::Function,
        types: &'f TypeSystem,
        capabilities: &'f CapabilityContext,
        method: &'m MethodRef,
        instructions: &'m [(u32, RawOpcode)],
    ) -> CodegenResult<Self> {
        let mut boundaries: std::collections::BTreeSet<u32> = std::collections::BTreeSet::new();
        boundaries.insert(0);
        for (i, (_, op)) in instructions.iter().enumerate() {
            let fallthrough = instructions.get(i + 1).map(|(o, _)| *o).unwrap_or(method.code.len() as u32);
            for target in op.branch_targets(fallthrough) {
                boundaries.insert(target);
            }
        }

        let mut builder = FunctionBuilder::new(func, types);

        // A dedicated prologue block, distinct from offset 0's own block,
        // so the method's entry point and its first *reachable-by-branch*
        // block never have to be the same block — offset 0 is free to be
        // a loop header targeted by a later back edge, exactly like any
        // other merge point, with no special-casing at the entry.
        let prologue = builder.create_block();
        let mut args = Vec::with_capacity(method.params.len());
        for &ty in &method.params {
            args.push(builder.append_block_param(prologue, ty));
        }
        builder.switch_to_block(prologue)?;
        let mut cur_locals = Vec::with_capacity(method.locals.len());
        for &ty in &method.locals {
            let default = default_const(&mut builder, types, ty)?;
            cur_locals.push(default);
        }

        let mut block_of = BTreeMap::new();
        for offset in &boundaries {
            let block = builder.create_block();
            block_of.insert(*offset, block);
        }
        let real_entry = block_of[&0];

        let mut decoder = Self {
            builder,
            types,
            capabilities,
            method,
            instructions,
            block_of,
            recorded: HashMap::new(),
            params_built: HashSet::new(),
            args,
            cur_stack: Vec::new(),
            cur_locals,
            cur_block: prologue,
            block_start_offset: 0,
            terminated: false,
        };
        decoder.record_or_check(real_entry)?;
        let prologue_args = decoder.edge_args();
        decoder.builder.create_jump(real_entry, &prologue_args)?;
        decoder.enter_block(real_entry, 0)?;
        Ok(decoder)
    }

    fn run(&mut self) -> CodegenResult<()> {
        for i in 0..self.instructions.len() {
            let (offset, op) = &self.instructions[i];
            let offset = *offset;
            let fallthrough = self
                .instructions
                .get(i + 1)
                .map(|(o, _)| *o)
                .unwrap_or(self.method.code.len() as u32);

            if offset != self.block_start_offset {
                match self.block_of.get(&offset).copied() {
                    Some(target) => {
                        if !self.terminated {
                            self.synthesize_fallthrough_jump(target)?;
                        }
                        self.enter_block(target, offset)?;
                    }
                    None => {
                        return Err(CompileError::CodegenInvariant {
                            reason: format!("offset {offset} reached without a recognized block boundary"),
                            loc: SourceLoc::new(offset),
                        });
                    }
                }
            }

            self.builder.set_source_loc(SourceLoc::new(offset));
            self.step(offset, op, fallthrough)?;
        }

        if !self.terminated {
            return Err(CompileError::CodegenInvariant {
                reason: "method falls off the end of its bytecode without a terminator".into(),
                loc: SourceLoc::unknown(),
            });
        }
        Ok(())
    }

    fn push(&mut self, v: Value) {
        self.cur_stack.push(v);
    }

    fn pop(&mut self, loc: SourceLoc) -> CodegenResult<Value> {
        self.cur_stack.pop().ok_or_else(|| CompileError::CodegenInvariant {
            reason: "operand stack underflow".into(),
            loc,
        })
    }

    fn value_type(&self, v: Value) -> TypeRef {
        self.builder.func().dfg.value_type(v)
    }

    fn record_or_check(&mut self, target: Block) -> CodegenResult<()> {
        let stack_tys: Vec<TypeRef> = self.cur_stack.iter().map(|&v| self.value_type(v)).collect();
        let local_tys: Vec<TypeRef> = self.cur_locals.iter().map(|&v| self.value_type(v)).collect();
        match self.recorded.get(&target) {
            None => {
                self.recorded.insert(target, (stack_tys, local_tys));
                Ok(())
            }
            Some((want_stack, want_locals)) => {
                if *want_stack == stack_tys && *want_locals == local_tys {
                    Ok(())
                } else {
                    Err(CompileError::UnbalancedStack {
                        block: format!("{target}"),
                        loc: SourceLoc::new(self.block_start_offset),
                    })
                }
            }
        }
    }

    fn edge_args(&self) -> Vec<Value> {
        self.cur_stack.iter().chain(self.cur_locals.iter()).copied().collect()
    }

    fn synthesize_fallthrough_jump(&mut self, target: Block) -> CodegenResult<()> {
        self.record_or_check(target)?;
        let args = self.edge_args();
        self.builder.create_jump(target, &args)?;
        self.terminated = true;
        Ok(())
    }

    fn enter_block(&mut self, target: Block, offset: u32) -> CodegenResult<()> {
        if !self.params_built.contains(&target) {
            let (stack_tys, local_tys) = self
                .recorded
                .get(&target)
                .cloned()
                .expect("a block's signature is always recorded before it is entered");
            let n_stack = stack_tys.len();
            let mut params = Vec::with_capacity(stack_tys.len() + local_tys.len());
            for ty in stack_tys.into_iter().chain(local_tys) {
                params.push(self.builder.append_block_param(target, ty));
            }
            self.cur_stack = params[..n_stack].to_vec();
            self.cur_locals = params[n_stack..].to_vec();
            self.params_built.insert(target);
        }
        self.builder.switch_to_block(target)?;
        self.cur_block = target;
        self.block_start_offset = offset;
        self.terminated = false;
        Ok(())
    }

    fn step(&mut self, offset: u32, op: &RawOpcode, fallthrough: u32) -> CodegenResult<()> {
        let loc = SourceLoc::new(offset);
        match op {
            RawOpcode::Nop => {}
            RawOpcode::LdcI4(v) => {
                let ty = self.types.int(32, true);
                let val = self.builder.create_const(ty, ConstantValue::Int(*v as i128))?;
                self.push(val);
            }
            RawOpcode::LdcI8(v) => {
                let ty = self.types.int(64, true);
                let val = self.builder.create_const(ty, ConstantValue::Int(*v as i128))?;
                self.push(val);
            }
            RawOpcode::LdcR4(v) => {
                let ty = self.types.float(32);
                let val = self.builder.create_const(ty, ConstantValue::Float(*v as f64))?;
                self.push(val);
            }
            RawOpcode::LdcR8(v) => {
                let ty = self.types.float(64);
                let val = self.builder.create_const(ty, ConstantValue::Float(*v))?;
                self.push(val);
            }
            RawOpcode::LdArg(i) => {
                let v = *self.args.get(*i as usize).ok_or_else(|| CompileError::CodegenInvariant {
                    reason: format!("ldarg {i} out of range ({} params)", self.args.len()),
                    loc,
                })?;
                self.push(v);
            }
            RawOpcode::LdLoc(i) => {
                let v = *self.cur_locals.get(*i as usize).ok_or_else(|| CompileError::CodegenInvariant {
                    reason: format!("ldloc {i} out of range ({} locals)", self.cur_locals.len()),
                    loc,
                })?;
                self.push(v);
            }
            RawOpcode::StLoc(i) => {
                let v = self.pop(loc)?;
                let slot = *i as usize;
                let want = *self.method.locals.get(slot).ok_or_else(|| CompileError::CodegenInvariant {
                    reason: format!("stloc {i} out of range ({} locals)", self.method.locals.len()),
                    loc,
                })?;
                let got = self.value_type(v);
                if got != want {
                    return Err(CompileError::TypeMismatch {
                        opcode: "stloc".into(),
                        expected: format!("{:?}", self.types.kind(want)),
                        found: format!("{:?}", self.types.kind(got)),
                        loc,
                    });
                }
                self.cur_locals[slot] = v;
            }
            RawOpcode::Dup => {
                let v = *self.cur_stack.last().ok_or_else(|| CompileError::CodegenInvariant {
                    reason: "dup on an empty operand stack".into(),
                    loc,
                })?;
                self.push(v);
            }
            RawOpcode::Pop => {
                self.pop(loc)?;
            }
            RawOpcode::Add => self.binary(BinaryOp::Add, ArithmeticFlags::new(), loc)?,
            RawOpcode::Sub => self.binary(BinaryOp::Sub, ArithmeticFlags::new(), loc)?,
            RawOpcode::Mul => self.binary(BinaryOp::Mul, ArithmeticFlags::new(), loc)?,
            RawOpcode::Div => self.binary(BinaryOp::Div, ArithmeticFlags::new(), loc)?,
            RawOpcode::DivUn => {
                let mut flags = ArithmeticFlags::new();
                flags.set_unsigned();
                self.binary(BinaryOp::Div, flags, loc)?;
            }
            RawOpcode::Rem => self.binary(BinaryOp::Rem, ArithmeticFlags::new(), loc)?,
            RawOpcode::RemUn => {
                let mut flags = ArithmeticFlags::new();
                flags.set_unsigned();
                self.binary(BinaryOp::Rem, flags, loc)?;
            }
            RawOpcode::And => self.binary(BinaryOp::And, ArithmeticFlags::new(), loc)?,
            RawOpcode::Or => self.binary(BinaryOp::Or, ArithmeticFlags::new(), loc)?,
            RawOpcode::Xor => self.binary(BinaryOp::Xor, ArithmeticFlags::new(), loc)?,
            RawOpcode::Shl => self.binary(BinaryOp::Shl, ArithmeticFlags::new(), loc)?,
            RawOpcode::ShrUn => self.binary(BinaryOp::ShrLogical, ArithmeticFlags::new(), loc)?,
            RawOpcode::Shr => self.binary(BinaryOp::ShrArithmetic, ArithmeticFlags::new(), loc)?,
            RawOpcode::Neg => {
                let arg = self.pop(loc)?;
                let v = self.builder.create_unary(UnaryOp::Neg, arg, ArithmeticFlags::new())?;
                self.push(v);
            }
            RawOpcode::Not => {
                let arg = self.pop(loc)?;
                let v = self.builder.create_unary(UnaryOp::Not, arg, ArithmeticFlags::new())?;
                self.push(v);
            }
            RawOpcode::ConvInt { bits, signed } => {
                let arg = self.pop(loc)?;
                let source = self.types.kind(self.value_type(arg));
                let op = match source {
                    TypeKind::Float { .. } => ConvertOp::FloatToInt,
                    _ => ConvertOp::IntToInt,
                };
                let mut flags = ArithmeticFlags::new();
                if !signed {
                    flags.set_unsigned();
                }
                let target = self.types.int(*bits, *signed);
                let v = self.builder.create_convert(op, arg, target, flags)?;
                self.push(v);
            }
            RawOpcode::ConvFloat { bits } => {
                let arg = self.pop(loc)?;
                let source = self.types.kind(self.value_type(arg));
                let op = match source {
                    TypeKind::Float { .. } => ConvertOp::FloatToFloat,
                    _ => ConvertOp::IntToFloat,
                };
                let target = self.types.float(*bits);
                let v = self.builder.create_convert(op, arg, target, ArithmeticFlags::new())?;
                self.push(v);
            }
            RawOpcode::Ceq => self.compare(CompareOp::Eq, CompareFlags::new(), loc)?,
            RawOpcode::CltI => self.compare(CompareOp::Lt, CompareFlags::new(), loc)?,
            RawOpcode::CltUn => {
                let mut flags = CompareFlags::new();
                flags.set_unsigned();
                self.compare(CompareOp::Lt, flags, loc)?;
            }
            RawOpcode::CgtI => self.compare(CompareOp::Gt, CompareFlags::new(), loc)?,
            RawOpcode::CgtUn => {
                let mut flags = CompareFlags::new();
                flags.set_unsigned();
                self.compare(CompareOp::Gt, flags, loc)?;
            }
            RawOpcode::Cle => self.compare(CompareOp::Le, CompareFlags::new(), loc)?,
            RawOpcode::Cge => self.compare(CompareOp::Ge, CompareFlags::new(), loc)?,
            RawOpcode::Br(target) => {
                let target_block = self.block_of[target];
                self.record_or_check(target_block)?;
                let args = self.edge_args();
                self.builder.create_jump(target_block, &args)?;
                self.terminated = true;
            }
            RawOpcode::BrTrue(target) | RawOpcode::BrFalse(target) => {
                let cond = self.pop(loc)?;
                let taken = self.block_of[target];
                let not_taken = self.block_of[&fallthrough];
                let (then_block, else_block) = if matches!(op, RawOpcode::BrTrue(_)) {
                    (taken, not_taken)
                } else {
                    (not_taken, taken)
                };
                self.record_or_check(then_block)?;
                self.record_or_check(else_block)?;
                let args = self.edge_args();
                self.builder.create_branch(cond, then_block, &args, else_block, &args)?;
                self.terminated = true;
            }
            RawOpcode::Switch { targets, default } => {
                let index = self.pop(loc)?;
                let default_block = self.block_of[default];
                self.record_or_check(default_block)?;
                let args = self.edge_args();
                let mut cases = Vec::with_capacity(targets.len());
                for (case, target) in targets.iter().enumerate() {
                    let block = self.block_of[target];
                    self.record_or_check(block)?;
                    cases.push((case as i64, block, args.clone()));
                }
                self.builder.create_switch(index, cases, default_block, &args)?;
                self.terminated = true;
            }
            RawOpcode::Call(idx) => self.call(*idx, loc)?,
            RawOpcode::Ret => {
                let ret_ty = self.builder.func().signature.ret;
                let args = if self.types.kind(ret_ty) == TypeKind::Void {
                    Vec::new()
                } else {
                    vec![self.pop(loc)?]
                };
                self.builder.create_return(&args)?;
                self.terminated = true;
            }
            RawOpcode::LdElem => {
                let index = self.pop(loc)?;
                let view = self.pop(loc)?;
                let (ptr, element, space) = self.view_address(view, index, loc)?;
                let v = self.builder.create_load(ptr, element, space)?;
                self.push(v);
            }
            RawOpcode::StElem => {
                let value = self.pop(loc)?;
                let index = self.pop(loc)?;
                let view = self.pop(loc)?;
                let (ptr, _, space) = self.view_address(view, index, loc)?;
                self.builder.create_store(ptr, value, space)?;
            }
            RawOpcode::LdStaticArray(idx) => {
                let lit = self.method.arrays.get(*idx as usize).ok_or_else(|| CompileError::CodegenInvariant {
                    reason: format!("ldstaticarray index {idx} out of range"),
                    loc,
                })?;
                let constant = self.builder.make_constant(lit.bytes.clone());
                let v = self.builder.create_array_to_view_cast(constant, lit.view_ty)?;
                self.push(v);
            }
            RawOpcode::LdField(idx) => {
                let base = self.pop(loc)?;
                let field_ty = self.field_type(base, *idx, loc)?;
                let v = self.builder.create_get_field(base, *idx, field_ty)?;
                self.push(v);
            }
            RawOpcode::StField(idx) => {
                let value = self.pop(loc)?;
                let base = self.pop(loc)?;
                let _ = self.field_type(base, *idx, loc)?;
                self.builder.create_set_field(base, *idx, value)?;
            }
            RawOpcode::Unreachable => {
                self.builder.create_unreachable()?;
                self.terminated = true;
            }
        }
        Ok(())
    }

    fn binary(&mut self, op: BinaryOp, flags: ArithmeticFlags, loc: SourceLoc) -> CodegenResult<()> {
        let rhs = self.pop(loc)?;
        let lhs = self.pop(loc)?;
        let v = self.builder.create_binary(op, lhs, rhs, flags)?;
        self.push(v);
        Ok(())
    }

    fn compare(&mut self, op: CompareOp, flags: CompareFlags, loc: SourceLoc) -> CodegenResult<()> {
        let rhs = self.pop(loc)?;
        let lhs = self.pop(loc)?;
        let v = self.builder.create_compare(op, lhs, rhs, flags)?;
        self.push(v);
        Ok(())
    }

    fn view_address(&mut self, view: Value, index: Value, loc: SourceLoc) -> CodegenResult<(Value, TypeRef, AddressSpace)> {
        let view_ty = self.value_type(view);
        let (element, space) = match self.types.kind(view_ty) {
            TypeKind::View { element, space } => (element, space),
            other => {
                return Err(CompileError::TypeMismatch {
                    opcode: "ldelem/stelem".into(),
                    expected: "View".into(),
                    found: format!("{other:?}"),
                    loc,
                })
            }
        };
        let ptr_ty = self.types.pointer_to(element, space);
        let ptr = self.builder.create_load_element_address(view, index, ptr_ty)?;
        Ok((ptr, element, space))
    }

    fn field_type(&self, base: Value, index: u32, loc: SourceLoc) -> CodegenResult<TypeRef> {
        let base_ty = self.value_type(base);
        match self.types.kind(base_ty) {
            TypeKind::Structure { fields } => fields.get(index as usize).copied().ok_or_else(|| CompileError::CodegenInvariant {
                reason: format!("field index {index} out of range for {base_ty:?}"),
                loc,
            }),
            other => Err(CompileError::TypeMismatch {
                opcode: "ldfield/stfield".into(),
                expected: "Structure".into(),
                found: format!("{other:?}"),
                loc,
            }),
        }
    }

    fn call(&mut self, idx: u32, loc: SourceLoc) -> CodegenResult<()> {
        let site = self.method.calls.get(idx as usize).cloned().ok_or_else(|| CompileError::CodegenInvariant {
            reason: format!("call index {idx} out of range"),
            loc,
        })?;
        let mut args = Vec::with_capacity(site.arg_count);
        for _ in 0..site.arg_count {
            args.push(self.pop(loc)?);
        }
        args.reverse();

        let ext = ExternalFunc::Local {
            name: format!("{}::{}", site.declaring_type, site.method),
        };
        let func_ref = self.builder.make_func_ref(ext);
        let call_value = self.builder.create_call(func_ref, &args, site.ret_ty)?;

        let declaring = intern::intern(&site.declaring_type);
        let method = intern::intern(&site.method);
        if let Some(handler) = nimbus_intrinsics::resolve((declaring, method)) {
            let mut ctx = IntrinsicCtx {
                func: self.builder.func_mut(),
                types: self.types,
                capabilities: self.capabilities,
                call: call_value,
                args: args.clone(),
            };
            handler(&mut ctx)?;
        }

        if self.types.kind(site.ret_ty) != TypeKind::Void {
            self.push(call_value);
        }
        Ok(())
    }
}

fn default_const(builder: &mut FunctionBuilder<'_>, types: &TypeSystem, ty: TypeRef) -> CodegenResult<Value> {
    let value = match types.kind(ty) {
        TypeKind::Bool => ConstantValue::Bool(false),
        TypeKind::Int { .. } => ConstantValue::Int(0),
        TypeKind::Float { .. } => ConstantValue::Float(0.0),
        other => {
            return Err(CompileError::CodegenInvariant {
                reason: format!("local slots must be scalar, found {other:?}"),
                loc: SourceLoc::unknown(),
            })
        }
    };
    builder.create_const(ty, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Assembler;
    use crate::method::MethodRef;
    use nimbus_codegen::ir::{DataLayout, FunctionScope};

    fn types() -> TypeSystem {
        TypeSystem::new(DataLayout::lp64())
    }

    #[test]
    fn straight_line_add_and_return() {
        let ts = types();
        let i32_ty = ts.int(32, true);
        let mut asm = Assembler::new();
        asm.ld_arg(0).ldc_i4(1).add().ret();
        let method = {
            let mut m = MethodRef::new("add_one", vec![i32_ty], i32_ty, FunctionScope::DeviceFunction);
            m.code = asm.finish();
            m
        };
        let caps = CapabilityContext::for_ptx_sm(70);
        let func = decode_method(&method, &ts, &caps).unwrap();
        // One synthetic prologue block (argument/local setup) plus the
        // single block the bytecode itself decodes to.
        assert_eq!(func.blocks().count(), 2);
    }

    #[test]
    fn loop_back_edge_reuses_the_recorded_signature() {
        let ts = types();
        let i32_ty = ts.int(32, true);
        let mut asm = Assembler::new();
        let top = asm.new_label();
        let exit = asm.new_label();
        asm.bind(top);
        asm.ld_loc(0).ldc_i4(1).sub().dup().st_loc(0);
        asm.ldc_i4(0).cgt();
        asm.br_true(top);
        asm.bind(exit);
        asm.ld_loc(0).ret();
        let method = {
            let mut m = MethodRef::new("count_down", vec![], i32_ty, FunctionScope::DeviceFunction);
            m.locals = vec![i32_ty];
            m.code = asm.finish();
            m
        };
        let caps = CapabilityContext::for_ptx_sm(70);
        let func = decode_method(&method, &ts, &caps).unwrap();
        // `top` is entered twice (the prologue's initial jump, then the
        // loop's back edge) with the same live-local shape both times, so
        // decoding succeeds with one block param carrying the slot through.
        assert_eq!(func.blocks().count(), 3);
    }

    #[test]
    fn mismatched_merge_depths_are_rejected() {
        let ts = types();
        let i32_ty = ts.int(32, true);
        let mut asm = Assembler::new();
        let merge = asm.new_label();
        // Taken arm reaches `merge` with an empty operand stack.
        asm.ld_arg(0).br_true(merge);
        // Fallthrough arm pushes a value before jumping to the same
        // block, so its edge disagrees with the already-recorded depth.
        asm.ldc_r4(0.0).br(merge);
        asm.bind(merge);
        asm.ret();
        let method = {
            let mut m = MethodRef::new("bad_merge", vec![ts.bool_()], i32_ty, FunctionScope::DeviceFunction);
            m.code = asm.finish();
            m
        };
        let caps = CapabilityContext::for_ptx_sm(70);
        let err = decode_method(&method, &ts, &caps).unwrap_err();
        assert!(matches!(err, CompileError::UnbalancedStack { .. }));
    }
}
