//! Address-mode lowering (`spec.md` §4.5 rule 6).
//!
//! `load_element_address(view, i)` combined with a subsequent load or
//! store folds into the backend's preferred single-instruction
//! addressing form (`Opcode::LoadIndexed`/`StoreIndexed`), eliding the
//! intermediate address value. The PTX backend's instruction selection
//! (`spec.md` §4.6) lowers these directly to `ld`/`st` with a register+
//! offset operand instead of a separate address computation.

use crate::ir::{Function, Opcode, Value};
use log::trace;

pub fn run(func: &mut Function) {
    let blocks: Vec<_> = func.blocks().collect();
    for block in blocks {
        let values: Vec<_> = func.layout.block_values(block).collect();
        for v in values {
            let rewritten = match &func.dfg.value(v).opcode {
                Opcode::Load { ptr, space } => address_of(func, *ptr).map(|(base, index)| {
                    Opcode::LoadIndexed {
                        base,
                        index,
                        space: *space,
                    }
                }),
                Opcode::Store { ptr, value, space } => address_of(func, *ptr).map(|(base, index)| {
                    Opcode::StoreIndexed {
                        base,
                        index,
                        value: *value,
                        space: *space,
                    }
                }),
                _ => None,
            };
            if let Some(new_opcode) = rewritten {
                trace!("address-mode: fusing element address into {v}");
                func.dfg.replace_opcode(v, new_opcode);
                // `ptr`'s only remaining use was this load/store; it is
                // now unused and pure, so plain DCE reclaims it. Address
                // mode runs before the final DCE pass in the pipeline.
            }
        }
    }
}

fn address_of(func: &Function, ptr: Value) -> Option<(Value, Value)> {
    let single_use = func.dfg.uses_of(ptr).len() == 1;
    if !single_use {
        return None; // shared base address: fusing would duplicate the address computation
    }
    match &func.dfg.value(ptr).opcode {
        Opcode::LoadElementAddress { base, index } => Some((*base, *index)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AddressSpace, FunctionBuilder, FunctionScope, Signature, TypeSystem};

    #[test]
    fn fuses_element_address_into_a_single_indexed_load() {
        let types = TypeSystem::new(crate::ir::DataLayout::lp64());
        let f32_ty = types.float(32);
        let view_ty = types.view_of(f32_ty, AddressSpace::Global);
        let i64_ty = types.int(64, true);
        let mut f = Function::new(
            "f",
            Signature {
                params: vec![view_ty, i64_ty],
                ret: f32_ty,
            },
            FunctionScope::KernelEntry,
        );
        let load;
        {
            let mut b = FunctionBuilder::new(&mut f, &types);
            let entry = b.create_block();
            let view = b.append_block_param(entry, view_ty);
            let i = b.append_block_param(entry, i64_ty);
            b.switch_to_block(entry).unwrap();
            let ptr_ty = types.pointer_to(f32_ty, AddressSpace::Global);
            let addr = b.create_load_element_address(view, i, ptr_ty).unwrap();
            load = b.create_load(addr, f32_ty, AddressSpace::Global).unwrap();
            b.create_return(&[load]).unwrap();
        }
        run(&mut f);
        match &f.dfg.value(load).opcode {
            Opcode::LoadIndexed { base, index, .. } => {
                assert_eq!(*base, f.dfg.block_params(f.entry_block.expand().unwrap())[0]);
                assert_eq!(*index, f.dfg.block_params(f.entry_block.expand().unwrap())[1]);
            }
            other => panic!("expected LoadIndexed, got {other:?}"),
        }
    }
}
