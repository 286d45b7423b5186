//! Linear-scan register allocation over PTX virtual register classes
//! (`spec.md` §4.6 "Register allocator").
//!
//! One free-list per type class (`.pred`, `.b16`, `.b32`, `.b64`); a
//! value's live range runs from its definition to its last use, computed
//! over a single linearization of the method's blocks in layout order.
//! Coalesced groups recorded by SSA destruction (`Function::coalesced_groups`)
//! are forced into one shared register per group instead of being
//! allocated independently.

use crate::capability::CapabilityContext;
use crate::ir::{Function, TypeKind, TypeSystem, Value};
use crate::result::{CodegenResult, CompileError};
use rustc_hash::FxHashMap;
use std::fmt;

/// A PTX virtual register type class (`spec.md` §4.6: "predicate `.pred`,
/// 16-bit `.b16`, 32-bit `.b32`/`.f32`/`.s32`/`.u32`, 64-bit
/// `.b64`/`.f64`/`.s64`/`.u64`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegClass {
    Pred,
    B16,
    B32,
    B64,
}

impl RegClass {
    /// The PTX state-space/register declaration prefix for this class
    /// (`spec.md` §4.6 serialization emits one `.reg` line per class).
    pub fn decl_prefix(self) -> &'static str {
        match self {
            RegClass::Pred => ".pred",
            RegClass::B16 => ".b16",
            RegClass::B32 => ".b32",
            RegClass::B64 => ".b64",
        }
    }

    fn name_prefix(self) -> &'static str {
        match self {
            RegClass::Pred => "p",
            RegClass::B16 => "rs",
            RegClass::B32 => "r",
            RegClass::B64 => "rd",
        }
    }

    pub fn for_type(types: &TypeSystem, ty: crate::ir::TypeRef) -> RegClass {
        match types.kind(ty) {
            TypeKind::Bool => RegClass::Pred,
            TypeKind::Int { bits, .. } | TypeKind::Float { bits } if bits <= 16 => RegClass::B16,
            TypeKind::Int { bits, .. } | TypeKind::Float { bits } if bits <= 32 => RegClass::B32,
            TypeKind::Int { .. } | TypeKind::Float { .. } => RegClass::B64,
            // Pointers, views and handles are 64-bit generic addresses on
            // the `lp64` layout this backend targets; structures are never
            // register-allocated directly (their fields are accessed
            // individually through `GetField`/`SetField`).
            _ => RegClass::B64,
        }
    }
}

/// A concrete PTX virtual register, e.g. `%r3` or `%pred7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PtxRegister {
    pub class: RegClass,
    pub number: u32,
}

impl fmt::Display for PtxRegister {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "%{}{}", self.class.name_prefix(), self.number)
    }
}

#[derive(Debug, Clone, Copy)]
struct LiveRange {
    start: u32,
    end: u32,
}

/// Order every value in `func` (block parameters first within their
/// block, then the laid-out values) and assign each a position in a
/// single linear index space, the input linear-scan operates over.
fn linear_order(func: &Function) -> Vec<Value> {
    let mut order = Vec::new();
    for block in func.blocks() {
        order.extend_from_slice(func.dfg.block_params(block));
        order.extend(func.layout.block_values(block));
    }
    order
}

fn live_ranges(func: &Function, order: &[Value]) -> FxHashMap<Value, LiveRange> {
    let index: FxHashMap<Value, u32> = order.iter().enumerate().map(|(i, &v)| (v, i as u32)).collect();
    let mut ranges = FxHashMap::default();
    for (&v, &start) in &index {
        let mut end = start;
        for &user in func.dfg.uses_of(v) {
            if let Some(&use_idx) = index.get(&user) {
                end = end.max(use_idx);
            }
        }
        ranges.insert(v, LiveRange { start, end });
    }
    ranges
}

/// Which representative value every other value's register assignment
/// is coalesced with, from `Function::coalesced_groups`.
fn coalescing_map(func: &Function) -> FxHashMap<Value, Value> {
    let mut map = FxHashMap::default();
    for (_, param, copies) in &func.coalesced_groups {
        for &copy in copies {
            map.insert(copy, *param);
        }
    }
    map
}

/// Allocate PTX virtual registers for every value in `func`, respecting
/// `capabilities.max_registers_per_thread` (`spec.md` §4.6 "Failure
/// model": overflow fails with [`CompileError::RegisterPressureExceeded`]).
pub fn allocate(
    func: &Function,
    types: &TypeSystem,
    capabilities: &CapabilityContext,
) -> CodegenResult<FxHashMap<Value, PtxRegister>> {
    let order = linear_order(func);
    let ranges = live_ranges(func, &order);
    let coalesced = coalescing_map(func);

    let mut assigned: FxHashMap<Value, PtxRegister> = FxHashMap::default();
    let mut group_reg: FxHashMap<Value, PtxRegister> = FxHashMap::default();
    let mut free: FxHashMap<RegClass, Vec<u32>> = FxHashMap::default();
    let mut next_number: FxHashMap<RegClass, u32> = FxHashMap::default();
    // (end, class, number) of registers currently live, sorted by start
    // order of assignment below.
    let mut active: Vec<(u32, RegClass, u32)> = Vec::new();

    let mut sorted: Vec<Value> = order
        .iter()
        .copied()
        .filter(|v| ranges.contains_key(v))
        .collect();
    sorted.sort_by_key(|v| ranges[v].start);

    for v in sorted {
        let range = ranges[&v];

        let expired: Vec<_> = active.iter().cloned().filter(|(end, ..)| *end < range.start).collect();
        active.retain(|(end, ..)| *end >= range.start);
        for (_, class, number) in expired {
            free.entry(class).or_default().push(number);
        }

        let canonical = coalesced.get(&v).copied().unwrap_or(v);
        let reg = if let Some(&reg) = group_reg.get(&canonical) {
            reg
        } else {
            let class = RegClass::for_type(types, func.dfg.value_type(canonical));
            let number = free.entry(class).or_default().pop().unwrap_or_else(|| {
                let n = next_number.entry(class).or_insert(0);
                let assigned_n = *n;
                *n += 1;
                assigned_n
            });
            let reg = PtxRegister { class, number };
            group_reg.insert(canonical, reg);
            reg
        };
        assigned.insert(v, reg);
        active.push((range.end, reg.class, reg.number));
    }

    let total: u32 = next_number.values().sum();
    if total > capabilities.max_registers_per_thread {
        return Err(CompileError::RegisterPressureExceeded {
            overflow: total - capabilities.max_registers_per_thread,
            limit: capabilities.max_registers_per_thread,
        });
    }

    Ok(assigned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ArithmeticFlags, BinaryOp, ConstantValue, DataLayout, FunctionBuilder, FunctionScope, Signature};

    #[test]
    fn reuses_a_register_once_its_range_expires() {
        let types = TypeSystem::new(DataLayout::lp64());
        let i32_ty = types.int(32, true);
        let mut f = Function::new(
            "f",
            Signature {
                params: vec![],
                ret: i32_ty,
            },
            FunctionScope::DeviceFunction,
        );
        {
            let mut b = FunctionBuilder::new(&mut f, &types);
            let entry = b.create_block();
            b.switch_to_block(entry).unwrap();
            let a = b.create_const(i32_ty, ConstantValue::Int(1)).unwrap();
            let c = b.create_const(i32_ty, ConstantValue::Int(2)).unwrap();
            let sum = b.create_binary(BinaryOp::Add, a, c, ArithmeticFlags::new()).unwrap();
            // `a` and `c` are both dead after this; a later value should
            // be able to reuse one of their registers.
            let d = b.create_const(i32_ty, ConstantValue::Int(3)).unwrap();
            let total = b.create_binary(BinaryOp::Add, sum, d, ArithmeticFlags::new()).unwrap();
            b.create_return(&[total]).unwrap();
        }
        let caps = CapabilityContext::for_ptx_sm(70);
        let regs = allocate(&f, &types, &caps).unwrap();
        assert_eq!(regs.len(), 5);
    }

    #[test]
    fn coalesced_values_share_one_register() {
        let types = TypeSystem::new(DataLayout::lp64());
        let i32_ty = types.int(32, true);
        let mut f = Function::new(
            "f",
            Signature {
                params: vec![],
                ret: i32_ty,
            },
            FunctionScope::DeviceFunction,
        );
        let (param, copy_a, copy_b);
        {
            let mut b = FunctionBuilder::new(&mut f, &types);
            let entry = b.create_block();
            b.switch_to_block(entry).unwrap();
            copy_a = b.create_const(i32_ty, ConstantValue::Int(1)).unwrap();
            copy_b = b.create_const(i32_ty, ConstantValue::Int(2)).unwrap();
            param = b.create_const(i32_ty, ConstantValue::Int(0)).unwrap();
            b.create_return(&[param]).unwrap();
        }
        f.coalesced_groups.push((f.entry_block.expand().unwrap(), param, vec![copy_a, copy_b]));
        let caps = CapabilityContext::for_ptx_sm(70);
        let regs = allocate(&f, &types, &caps).unwrap();
        assert_eq!(regs[&param], regs[&copy_a]);
        assert_eq!(regs[&param], regs[&copy_b]);
    }
}
