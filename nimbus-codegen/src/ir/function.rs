//! `Function`: the spec's "Method" (`spec.md` §3 "Method", §4 passim).
//!
//! Kept named `Function` to match the teacher's own naming (`cranelift_codegen::ir::Function`)
//! even though `spec.md` calls the same entity a "Method" — the vocabulary
//! difference is cosmetic, the arena-ownership shape is identical.

use crate::ir::dfg::DataFlowGraph;
use crate::ir::entities::{Block, Value};
use crate::ir::layout::Layout;
use crate::ir::types::TypeRef;
use nimbus_entity::{EntityRef, PackedOption, SecondaryMap};
use std::fmt;

/// Whether a function is callable from the host (a launch target) or
/// only from other device code (`spec.md` §3 "Method").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionScope {
    KernelEntry,
    DeviceFunction,
}

/// Inlining disposition carried on a method, consulted by the inlining
/// pass (`spec.md` §4.5 rule 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineHint {
    Never,
    Default,
    Always,
}

/// A capability tag a method's lowering may require (`spec.md` §4.6,
/// §6 `allowed_capabilities`). Kept as a flat string tag rather than an
/// enum so new backend features never require changing this crate's
/// public API — `CapabilityContext` (§4.6) is the side that interprets
/// tags.
pub type CapabilityTag = &'static str;

/// A method's signature: parameter types in order, plus a return type
/// (`Void` for kernel entries, which communicate results only through
/// views).
#[derive(Debug, Clone)]
pub struct Signature {
    pub params: Vec<TypeRef>,
    pub ret: TypeRef,
}

/// A complete SSA method: its signature, its IR (DFG + layout), and the
/// bookkeeping the frontend and optimizer attach to it.
///
/// Owns its `Value`s and `Block`s exclusively (`spec.md` §3 "Ownership"):
/// no other `Function` ever references one of this function's entities.
/// Optimization passes replace a `Function` wholesale (copy-on-write at
/// the method level) rather than mutate it destructively in place when a
/// pass wants an undo path; most passes in this crate mutate in place
/// instead, which is safe because a method is frozen for optimization
/// only after frontend construction completes.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub signature: Signature,
    pub scope: FunctionScope,
    pub inline_hint: InlineHint,
    pub required_capabilities: Vec<CapabilityTag>,
    pub dfg: DataFlowGraph,
    pub layout: Layout,
    pub entry_block: PackedOption<Block>,
    /// Shared-memory bytes requested by this method's frontend
    /// (`Decoder`/`SharedMemory` intrinsic), aggregated here so the
    /// backend's kernel-ABI stage (`spec.md` §4.6) doesn't have to
    /// re-walk the IR to compute `KernelInfo.shared_bytes`.
    pub shared_memory_bytes: u32,
    /// Largest alignment any single `SharedMemory.Allocate` request made
    /// against this method's shared buffer, so the backend can declare
    /// `.shared .align N` at the element's natural alignment rather than
    /// a pessimistic fixed width (`spec.md` §8 scenario 2 expects
    /// `.align 4` for an allocation of `float`s).
    pub shared_memory_align: u32,
    block_names: SecondaryMap<Block, Option<String>>,
    next_block: u32,
    /// Groups of values that must share one physical storage location,
    /// recorded by SSA destruction (`spec.md` §4.5 rule 7): each entry is
    /// a block parameter paired with the `Opcode::Copy` values inserted
    /// on its incoming edges. Empty until that pass runs; consumed by
    /// `isa::ptx::regalloc`.
    pub coalesced_groups: Vec<(Block, Value, Vec<Value>)>,
}

impl Function {
    pub fn new(name: impl Into<String>, signature: Signature, scope: FunctionScope) -> Self {
        Self {
            name: name.into(),
            signature,
            scope,
            inline_hint: InlineHint::Default,
            required_capabilities: Vec::new(),
            dfg: DataFlowGraph::new(),
            layout: Layout::new(),
            entry_block: None.into(),
            shared_memory_bytes: 0,
            shared_memory_align: 1,
            block_names: SecondaryMap::new(),
            next_block: 0,
            coalesced_groups: Vec::new(),
        }
    }

    /// Mint a fresh `Block` key. Blocks are not arena-stored like values
    /// (they carry no payload of their own — their parameter list lives
    /// in the DFG, their position in the layout) so minting one is just
    /// handing out the next dense index.
    pub fn make_block(&mut self) -> Block {
        let b = Block::new(self.next_block as usize);
        self.next_block += 1;
        b
    }

    pub fn set_block_name(&mut self, block: Block, name: impl Into<String>) {
        self.block_names[block] = Some(name.into());
    }

    pub fn block_name(&self, block: Block) -> String {
        self.block_names
            .get(block)
            .and_then(|n| n.clone())
            .unwrap_or_else(|| format!("{block}"))
    }

    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.layout.blocks()
    }

    pub fn is_kernel_entry(&self) -> bool {
        self.scope == FunctionScope::KernelEntry
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "function {} {{", self.name)?;
        for block in self.blocks() {
            let params = self.dfg.block_params(block);
            if params.is_empty() {
                writeln!(f, "{}:", self.block_name(block))?;
            } else {
                let params = params
                    .iter()
                    .map(|p| format!("{p}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                writeln!(f, "{}({}):", self.block_name(block), params)?;
            }
            for v in self.layout.block_values(block) {
                writeln!(f, "    {v} = {:?}", self.dfg.value(v).opcode)?;
            }
        }
        writeln!(f, "}}")
    }
}
