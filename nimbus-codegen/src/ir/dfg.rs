//! The data-flow graph: every SSA value in a [`crate::ir::Function`] and
//! its use-def bookkeeping (`spec.md` §3 "Value", §4.2 "Use-def
//! back-references").
//!
//! Values are stored in one arena (`PrimaryMap<Value, ValueData>`) per
//! function; cross-references between them (operands, block parameters,
//! call argument lists) are `Value` indices or pool-backed `EntityList`s,
//! never pointers, per the "Arena + indices" design note.

use crate::ir::entities::{Block, Constant, FuncRef, Value};
use crate::ir::instructions::{ArithmeticFlags, BinaryOp, CompareFlags, CompareOp, ConvertOp, TernaryOp, UnaryOp};
use crate::ir::sourceloc::SourceLoc;
use crate::ir::types::{AddressSpace, TypeRef};
use nimbus_entity::{EntityList, ListPool, PrimaryMap, SecondaryMap};

pub type ValueList = EntityList<Value>;

/// Direction of an inline-assembly operand (`spec.md` §4.4, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    InOut,
}

/// One span of a parsed inline-assembly template: either literal text or
/// a positional argument reference (`%0`, `%1`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSpan {
    Literal(String),
    Arg(usize),
}

/// A `Language` intrinsic's assembly template, parsed once at IR-build
/// time (`spec.md` §4.4).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AsmTemplate {
    pub spans: Vec<TemplateSpan>,
}

impl AsmTemplate {
    /// Parse `%N` placeholders out of a raw template string. `%%` escapes
    /// a literal percent (used for e.g. PTX's `%laneid`).
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut spans = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }
            match chars.peek() {
                Some('%') => {
                    chars.next();
                    literal.push('%');
                }
                Some(d) if d.is_ascii_digit() => {
                    if !literal.is_empty() {
                        spans.push(TemplateSpan::Literal(std::mem::take(&mut literal)));
                    }
                    let mut digits = String::new();
                    while let Some(d) = chars.peek() {
                        if d.is_ascii_digit() {
                            digits.push(*d);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let idx: usize = digits
                        .parse()
                        .map_err(|_| format!("malformed argument index in `{raw}`"))?;
                    spans.push(TemplateSpan::Arg(idx));
                }
                _ => return Err(format!("unknown escape `%{:?}` in `{raw}`", chars.peek())),
            }
        }
        if !literal.is_empty() {
            spans.push(TemplateSpan::Literal(literal));
        }
        Ok(Self { spans })
    }

    /// The highest argument index referenced by the template, if any.
    pub fn max_arg_index(&self) -> Option<usize> {
        self.spans
            .iter()
            .filter_map(|s| match s {
                TemplateSpan::Arg(i) => Some(*i),
                TemplateSpan::Literal(_) => None,
            })
            .max()
    }
}

/// A compile-time-constant scalar (`spec.md` §4.2 `create_const`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstantValue {
    Bool(bool),
    Int(i128),
    Float(f64),
}

/// Every opcode `FunctionBuilder` can emit, carrying its operands inline
/// (`spec.md` §3: a `Value`'s "opcode, ordered operand list" live on the
/// value itself — there is no separate instruction entity).
#[derive(Debug, Clone, PartialEq)]
pub enum Opcode {
    /// A block parameter; its "operands" are supplied by each
    /// predecessor's terminator rather than stored here.
    BlockParam,
    Const(ConstantValue),
    Unary {
        op: UnaryOp,
        arg: Value,
        flags: ArithmeticFlags,
    },
    Binary {
        op: BinaryOp,
        lhs: Value,
        rhs: Value,
        flags: ArithmeticFlags,
    },
    Ternary {
        op: TernaryOp,
        a: Value,
        b: Value,
        c: Value,
        flags: ArithmeticFlags,
    },
    Compare {
        op: CompareOp,
        lhs: Value,
        rhs: Value,
        flags: CompareFlags,
    },
    Convert {
        op: ConvertOp,
        arg: Value,
        flags: ArithmeticFlags,
    },
    Load {
        ptr: Value,
        space: AddressSpace,
    },
    Store {
        ptr: Value,
        value: Value,
        space: AddressSpace,
    },
    LoadElementAddress {
        base: Value,
        index: Value,
    },
    /// A `Load` fused with its `LoadElementAddress` by the address-mode
    /// lowering pass (`spec.md` §4.5 rule 6): the backend's preferred
    /// addressing form, `base[index]`, without materializing the
    /// intermediate address as its own value.
    LoadIndexed {
        base: Value,
        index: Value,
        space: AddressSpace,
    },
    /// The `Store` counterpart of [`Opcode::LoadIndexed`].
    StoreIndexed {
        base: Value,
        index: Value,
        value: Value,
        space: AddressSpace,
    },
    ArrayToViewCast {
        constant: Constant,
    },
    GetField {
        base: Value,
        index: u32,
    },
    SetField {
        base: Value,
        index: u32,
        value: Value,
    },
    Call {
        callee: FuncRef,
        args: ValueList,
    },
    Return {
        args: ValueList,
    },
    Branch {
        cond: Value,
        then_block: Block,
        then_args: ValueList,
        else_block: Block,
        else_args: ValueList,
    },
    Jump {
        block: Block,
        args: ValueList,
    },
    Switch {
        value: Value,
        cases: Vec<(i64, Block, ValueList)>,
        default: Block,
        default_args: ValueList,
    },
    Unreachable,
    LanguageEmit {
        backend: String,
        template: AsmTemplate,
        args: ValueList,
        directions: Vec<Direction>,
    },
    DebugAssert {
        cond: Value,
        message: String,
    },
    /// A register-to-register copy, introduced by SSA destruction
    /// (`spec.md` §4.5 rule 7) on each edge feeding a block parameter.
    Copy {
        src: Value,
    },
}

impl Opcode {
    /// Structural terminators per `spec.md` §3 "BasicBlock": exactly one
    /// of these ends a block's value list.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Opcode::Return { .. }
                | Opcode::Branch { .. }
                | Opcode::Jump { .. }
                | Opcode::Switch { .. }
                | Opcode::Unreachable
        )
    }

    /// Has an observable effect beyond producing a result, so DCE must
    /// never remove it even when unused (`spec.md` §4.5 rule 2).
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            Opcode::Store { .. }
                | Opcode::StoreIndexed { .. }
                | Opcode::Call { .. }
                | Opcode::LanguageEmit { .. }
                | Opcode::DebugAssert { .. }
        ) || self.is_terminator()
    }

    /// The operand values read directly by this opcode (not counting
    /// per-successor block arguments, which [`Opcode::successors`]
    /// covers separately).
    pub fn args<'a>(&'a self, pool: &'a ListPool<Value>) -> Vec<Value> {
        match self {
            Opcode::BlockParam | Opcode::Const(_) | Opcode::Unreachable => vec![],
            Opcode::Unary { arg, .. } | Opcode::Convert { arg, .. } => vec![*arg],
            Opcode::Binary { lhs, rhs, .. } | Opcode::Compare { lhs, rhs, .. } => vec![*lhs, *rhs],
            Opcode::Ternary { a, b, c, .. } => vec![*a, *b, *c],
            Opcode::Load { ptr, .. } => vec![*ptr],
            Opcode::Store { ptr, value, .. } => vec![*ptr, *value],
            Opcode::LoadElementAddress { base, index } => vec![*base, *index],
            Opcode::LoadIndexed { base, index, .. } => vec![*base, *index],
            Opcode::StoreIndexed { base, index, value, .. } => vec![*base, *index, *value],
            Opcode::ArrayToViewCast { .. } => vec![],
            Opcode::GetField { base, .. } => vec![*base],
            Opcode::SetField { base, value, .. } => vec![*base, *value],
            Opcode::Call { args, .. } => args.as_slice(pool).to_vec(),
            Opcode::Return { args } => args.as_slice(pool).to_vec(),
            Opcode::Branch {
                cond,
                then_args,
                else_args,
                ..
            } => {
                let mut v = vec![*cond];
                v.extend_from_slice(then_args.as_slice(pool));
                v.extend_from_slice(else_args.as_slice(pool));
                v
            }
            Opcode::Jump { args, .. } => args.as_slice(pool).to_vec(),
            Opcode::Switch {
                value,
                cases,
                default_args,
                ..
            } => {
                let mut v = vec![*value];
                for (_, _, args) in cases {
                    v.extend_from_slice(args.as_slice(pool));
                }
                v.extend_from_slice(default_args.as_slice(pool));
                v
            }
            Opcode::LanguageEmit { args, .. } => args.as_slice(pool).to_vec(),
            Opcode::DebugAssert { cond, .. } => vec![*cond],
            Opcode::Copy { src } => vec![*src],
        }
    }

    /// Rewrite every occurrence of `old` among this opcode's direct
    /// operands to `new`. Used to splice an alias (e.g. `x + 0 -> x`)
    /// into every remaining user without changing the user's identity.
    pub fn replace_operand(&mut self, old: Value, new: Value, pool: &mut ListPool<Value>) {
        let sub = |v: &mut Value| {
            if *v == old {
                *v = new;
            }
        };
        match self {
            Opcode::BlockParam | Opcode::Const(_) | Opcode::Unreachable | Opcode::ArrayToViewCast { .. } => {}
            Opcode::Unary { arg, .. } | Opcode::Convert { arg, .. } => sub(arg),
            Opcode::Binary { lhs, rhs, .. } | Opcode::Compare { lhs, rhs, .. } => {
                sub(lhs);
                sub(rhs);
            }
            Opcode::Ternary { a, b, c, .. } => {
                sub(a);
                sub(b);
                sub(c);
            }
            Opcode::Load { ptr, .. } => sub(ptr),
            Opcode::Store { ptr, value, .. } => {
                sub(ptr);
                sub(value);
            }
            Opcode::LoadElementAddress { base, index } => {
                sub(base);
                sub(index);
            }
            Opcode::LoadIndexed { base, index, .. } => {
                sub(base);
                sub(index);
            }
            Opcode::StoreIndexed { base, index, value, .. } => {
                sub(base);
                sub(index);
                sub(value);
            }
            Opcode::GetField { base, .. } => sub(base),
            Opcode::SetField { base, value, .. } => {
                sub(base);
                sub(value);
            }
            Opcode::Call { args, .. } | Opcode::Return { args } | Opcode::Jump { args, .. } => {
                for v in args.as_mut_slice(pool) {
                    sub(v);
                }
            }
            Opcode::Branch {
                cond,
                then_args,
                else_args,
                ..
            } => {
                sub(cond);
                for v in then_args.as_mut_slice(pool) {
                    sub(v);
                }
                for v in else_args.as_mut_slice(pool) {
                    sub(v);
                }
            }
            Opcode::Switch {
                value,
                cases,
                default_args,
                ..
            } => {
                sub(value);
                for (_, _, args) in cases {
                    for v in args.as_mut_slice(pool) {
                        sub(v);
                    }
                }
                for v in default_args.as_mut_slice(pool) {
                    sub(v);
                }
            }
            Opcode::LanguageEmit { args, .. } => {
                for v in args.as_mut_slice(pool) {
                    sub(v);
                }
            }
            Opcode::DebugAssert { cond, .. } => sub(cond),
            Opcode::Copy { src } => sub(src),
        }
    }

    /// Successor blocks with the arguments passed to each, for terminators.
    pub fn successors<'a>(&'a self, pool: &'a ListPool<Value>) -> Vec<(Block, &'a [Value])> {
        match self {
            Opcode::Jump { block, args } => vec![(*block, args.as_slice(pool))],
            Opcode::Branch {
                then_block,
                then_args,
                else_block,
                else_args,
                ..
            } => vec![
                (*then_block, then_args.as_slice(pool)),
                (*else_block, else_args.as_slice(pool)),
            ],
            Opcode::Switch {
                cases,
                default,
                default_args,
                ..
            } => {
                let mut v: Vec<(Block, &[Value])> =
                    cases.iter().map(|(_, b, a)| (*b, a.as_slice(pool))).collect();
                v.push((*default, default_args.as_slice(pool)));
                v
            }
            _ => vec![],
        }
    }
}

/// Everything known about one SSA value.
#[derive(Debug, Clone)]
pub struct ValueData {
    pub block: Block,
    pub ty: TypeRef,
    pub opcode: Opcode,
    pub loc: SourceLoc,
}

/// What a [`FuncRef`] resolves to: another function in the same
/// compilation, or an external symbol the backend links against (e.g. a
/// `LibDevice` routine for a transcendental the target lacks as an
/// instruction).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalFunc {
    Local { name: String },
    LibDevice { symbol: String },
}

/// Arena of [`Value`]s plus their use-def relation and the pools backing
/// every [`ValueList`] (operands, call arguments, block-parameter lists).
///
/// The use-list is modeled as an external side table (`uses`), not a
/// field on `ValueData`, per the "Use-def back-references" design note:
/// storing it on the value itself would require each value to hold a
/// growable collection of back-references to values the arena also owns,
/// which is exactly the shape that creates borrow hazards in an
/// ownership-strict language.
#[derive(Debug, Clone, Default)]
pub struct DataFlowGraph {
    values: PrimaryMap<Value, ValueData>,
    pub value_lists: ListPool<Value>,
    block_params: SecondaryMap<Block, ValueList>,
    uses: SecondaryMap<Value, Vec<Value>>,
    constants: PrimaryMap<Constant, Vec<u8>>,
    funcs: PrimaryMap<FuncRef, ExternalFunc>,
}

impl DataFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make_value(&mut self, block: Block, ty: TypeRef, opcode: Opcode, loc: SourceLoc) -> Value {
        let v = self.values.push(ValueData { block, ty, opcode, loc });
        self.record_uses(v);
        v
    }

    pub fn value(&self, v: Value) -> &ValueData {
        &self.values[v]
    }

    pub fn value_type(&self, v: Value) -> TypeRef {
        self.values[v].ty
    }

    pub fn value_block(&self, v: Value) -> Block {
        self.values[v].block
    }

    /// Update the block a value is recorded as belonging to. Used when a
    /// pass (LICM) moves a value to a different block in the layout —
    /// the layout is the source of truth for *position*, but this field
    /// keeps debug output and any block-membership query on `ValueData`
    /// itself consistent with it.
    pub fn set_value_block(&mut self, v: Value, block: Block) {
        self.values[v].block = block;
    }

    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.values.keys()
    }

    /// Replace `v`'s opcode in place (used by folding/rewriting passes),
    /// updating the use-list for the values it newly reads or stops
    /// reading.
    pub fn replace_opcode(&mut self, v: Value, opcode: Opcode) {
        for old_operand in self.values[v].opcode.args(&self.value_lists) {
            self.remove_use(old_operand, v);
        }
        self.values[v].opcode = opcode;
        self.record_uses(v);
    }

    fn record_uses(&mut self, v: Value) {
        let operands = self.values[v].opcode.args(&self.value_lists);
        for operand in operands {
            self.uses[operand].push(v);
        }
    }

    fn remove_use(&mut self, operand: Value, user: Value) {
        if let Some(pos) = self.uses[operand].iter().position(|&u| u == user) {
            self.uses[operand].swap_remove(pos);
        }
    }

    /// Every value that reads `v` as an operand. Per `spec.md` §3: "for
    /// every use of v, v ∈ v's use-list exactly once" once
    /// `dedup_use_list` normalizes repeated operands from one user.
    pub fn uses_of(&self, v: Value) -> &[Value] {
        self.uses.get(v).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn is_unused(&self, v: Value) -> bool {
        self.uses_of(v).is_empty()
    }

    pub fn append_block_param(&mut self, block: Block, param: Value) {
        self.block_params[block].push(param, &mut self.value_lists);
    }

    pub fn block_params(&self, block: Block) -> &[Value] {
        self.block_params[block].as_slice(&self.value_lists)
    }

    /// Drop `block`'s parameter list. Used by SSA destruction once every
    /// parameter's uses have been rewritten to read an edge copy instead;
    /// the parameter `Value`s themselves are left as orphaned arena
    /// entries (never laid out, so no later pass walks them).
    pub fn clear_block_params(&mut self, block: Block) {
        self.block_params[block] = ValueList::default();
    }

    pub fn make_value_list(&mut self, values: &[Value]) -> ValueList {
        ValueList::from_slice(values, &mut self.value_lists)
    }

    pub fn make_constant(&mut self, bytes: Vec<u8>) -> Constant {
        self.constants.push(bytes)
    }

    pub fn constant_bytes(&self, c: Constant) -> &[u8] {
        &self.constants[c]
    }

    pub fn make_func_ref(&mut self, f: ExternalFunc) -> FuncRef {
        self.funcs.push(f)
    }

    pub fn func_ref(&self, f: FuncRef) -> &ExternalFunc {
        &self.funcs[f]
    }

    /// Rewrite every remaining user of `old` to read `new` instead, then
    /// clear `old`'s use-list. Used by folding for identity rewrites
    /// (`x + 0 -> x`) where the value itself should be spliced out
    /// rather than turned into a new constant/opcode.
    pub fn replace_all_uses(&mut self, old: Value, new: Value) {
        if old == new {
            return;
        }
        let users = std::mem::take(&mut self.uses[old]);
        for &user in &users {
            self.values[user].opcode.replace_operand(old, new, &mut self.value_lists);
            self.uses[new].push(user);
        }
    }

    /// Remove `v` from the graph entirely. Callers (DCE) must ensure no
    /// use of `v` survives, or this is an implementer bug
    /// (`spec.md` §7 `DanglingUse`).
    pub fn remove_value(&mut self, v: Value) {
        debug_assert!(
            self.is_unused(v),
            "remove_value called on a value that still has uses"
        );
        for operand in self.values[v].opcode.args(&self.value_lists) {
            self.remove_use(operand, v);
        }
        // The arena slot is left in place (stable indices); bookkeeping
        // elsewhere (the layout) stops referencing it. Values never get
        // physically reclaimed within one compilation, matching
        // `cranelift-codegen`'s DFG, which also never shrinks its arena.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_literal_and_args() {
        let t = AsmTemplate::parse("mov.u32 %0, %%laneid;").unwrap();
        assert_eq!(
            t.spans,
            vec![
                TemplateSpan::Literal("mov.u32 ".into()),
                TemplateSpan::Arg(0),
                TemplateSpan::Literal(", %laneid;".into()),
            ]
        );
        assert_eq!(t.max_arg_index(), Some(0));
    }

    #[test]
    fn template_rejects_bad_escape() {
        assert!(AsmTemplate::parse("bad %q").is_err());
    }
}
