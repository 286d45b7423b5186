//! Final textual assembly (`spec.md` §4.6 "Serialization"): `.version`/
//! `.target`/`.address_size` header, one `.reg` declaration per register
//! class actually used, the `.param` list built from `abi::parameter_layout`,
//! and the instruction-selected body.

use super::abi::{struct_passed_by_pointer, STRUCT_BY_POINTER_THRESHOLD};
use super::regalloc::{PtxRegister, RegClass};
use crate::ir::Function;
use crate::isa::{ParamKind, ParameterLayout};
use crate::CapabilityContext;
use rustc_hash::FxHashMap;
use std::fmt::Write as _;

fn param_type(entry: &ParameterLayout) -> &'static str {
    match entry.kind {
        ParamKind::Scalar => match entry.size {
            1 => "b8",
            2 => "b16",
            4 => "b32",
            _ => "b64",
        },
        ParamKind::View => "u64",
        ParamKind::ByValueStruct if struct_passed_by_pointer(entry) => "u64",
        ParamKind::ByValueStruct => "align 8 .b8",
    }
}

/// Register-class declaration count: one more than the highest register
/// number actually assigned in that class, since PTX register
/// declarations are a contiguous `%r<0..n>` range.
fn class_counts(regs: &FxHashMap<crate::ir::Value, PtxRegister>) -> Vec<(RegClass, u32)> {
    let mut counts: FxHashMap<RegClass, u32> = FxHashMap::default();
    for reg in regs.values() {
        let entry = counts.entry(reg.class).or_insert(0);
        *entry = (*entry).max(reg.number + 1);
    }
    let mut v: Vec<_> = counts.into_iter().collect();
    v.sort_by_key(|(class, _)| *class);
    v
}

/// Assemble the final `.ptx` source for one compiled method. `files` is
/// the debug-info file table `isa::ptx::select::lower` built while
/// emitting `.loc` directives (empty when debug info is disabled or
/// absent), declared with `.file` before the body so every `.loc`
/// reference resolves.
pub fn emit(
    func: &Function,
    capabilities: &CapabilityContext,
    regs: &FxHashMap<crate::ir::Value, PtxRegister>,
    blocks: &[(String, Vec<String>)],
    params: &[ParameterLayout],
    files: &[String],
) -> Vec<u8> {
    let mut out = String::new();
    writeln!(out, ".version 8.3").unwrap();
    writeln!(out, ".target {}", capabilities.target_architecture).unwrap();
    writeln!(out, ".address_size 64").unwrap();
    for (i, file) in files.iter().enumerate() {
        writeln!(out, ".file {} \"{file}\"", i + 1).unwrap();
    }
    out.push('\n');

    let directive = if func.is_kernel_entry() { ".entry" } else { ".func" };
    write!(out, ".visible {directive} {}(", func.name).unwrap();
    for (i, p) in params.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write!(out, "\n\t.param .{} param_{i}", param_type(p)).unwrap();
    }
    if !params.is_empty() {
        out.push('\n');
    }
    writeln!(out, ")").unwrap();
    writeln!(out, "{{").unwrap();

    if func.shared_memory_bytes > 0 {
        writeln!(out, "\t.shared .align {} .b8 smem[{}];", func.shared_memory_align, func.shared_memory_bytes).unwrap();
    }
    for (class, count) in class_counts(regs) {
        writeln!(out, "\t.reg {} %{}<{}>;", class.decl_prefix(), class_name(class), count).unwrap();
    }
    out.push('\n');

    for (i, p) in params.iter().enumerate() {
        if p.kind == ParamKind::ByValueStruct && struct_passed_by_pointer(p) {
            continue;
        }
        let _ = STRUCT_BY_POINTER_THRESHOLD;
        writeln!(out, "\tld.param.{} %arg{i}, [param_{i}];", param_type(p)).unwrap();
    }

    for (label, lines) in blocks {
        writeln!(out, "{label}:").unwrap();
        for line in lines {
            writeln!(out, "\t{line}").unwrap();
        }
    }
    writeln!(out, "}}").unwrap();
    out.into_bytes()
}

fn class_name(class: RegClass) -> &'static str {
    match class {
        RegClass::Pred => "p",
        RegClass::B16 => "rs",
        RegClass::B32 => "r",
        RegClass::B64 => "rd",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArithmeticFlags, BinaryOp, ConstantValue, DataLayout, FunctionBuilder, FunctionScope, Signature, TypeSystem};
    use crate::isa::ptx::{regalloc, select};

    #[test]
    fn emits_header_and_entry_wrapper() {
        let types = TypeSystem::new(DataLayout::lp64());
        let i32_ty = types.int(32, true);
        let mut f = Function::new(
            "add_one",
            Signature { params: vec![i32_ty], ret: i32_ty },
            FunctionScope::KernelEntry,
        );
        {
            let mut b = FunctionBuilder::new(&mut f, &types);
            let entry = b.create_block();
            b.switch_to_block(entry).unwrap();
            let p = b.append_block_param(entry, i32_ty);
            let one = b.create_const(i32_ty, ConstantValue::Int(1)).unwrap();
            let sum = b.create_binary(BinaryOp::Add, p, one, ArithmeticFlags::new()).unwrap();
            b.create_return(&[sum]).unwrap();
        }
        let caps = CapabilityContext::for_ptx_sm(70);
        let regs = regalloc::allocate(&f, &types, &caps).unwrap();
        let (blocks, files) = select::lower(&f, &types, &regs, &caps, None).unwrap();
        let params = vec![ParameterLayout { kind: ParamKind::Scalar, size: 4, align: 4, address_space: crate::ir::AddressSpace::Generic }];
        let source = emit(&f, &caps, &regs, &blocks, &params, &files);
        let text = String::from_utf8(source).unwrap();
        assert!(text.starts_with(".version"));
        assert!(text.contains(".visible .entry add_one("));
        assert!(text.contains("ld.param.b32 %arg0"));
    }
}
