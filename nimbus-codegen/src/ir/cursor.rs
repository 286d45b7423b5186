//! A cursor over a function's layout, used by optimization passes to walk
//! and rewrite blocks (`spec.md` §4.5) without hand-rolling linked-list
//! splicing in every pass.
//!
//! Modeled on `cranelift-codegen::cursor::FuncCursor`: a pass asks for
//! `next_block`/`next_value` and gets the next position in layout order,
//! and can insert a new value immediately before the one the cursor is
//! sitting on (used by address-mode lowering to materialize a combined
//! addressing value right where the `load`/`store` used to be).

use crate::ir::dfg::Opcode;
use crate::ir::entities::{Block, Value};
use crate::ir::function::Function;
use crate::ir::sourceloc::SourceLoc;
use crate::ir::types::TypeRef;

/// Where a `FuncCursor` currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorPosition {
    Nowhere,
    Before(Block),
    At(Value),
}

pub struct FuncCursor<'f> {
    pub func: &'f mut Function,
    pos: CursorPosition,
}

impl<'f> FuncCursor<'f> {
    pub fn new(func: &'f mut Function) -> Self {
        Self {
            func,
            pos: CursorPosition::Nowhere,
        }
    }

    pub fn position(&self) -> CursorPosition {
        self.pos
    }

    /// Seek directly to `pos`. Used by callers (the intrinsic resolver)
    /// that already know exactly where they want to insert relative to,
    /// rather than walking there block-by-block.
    pub fn set_position(&mut self, pos: CursorPosition) {
        self.pos = pos;
    }

    pub fn goto_first_block(&mut self) -> bool {
        match self.func.layout.first_block() {
            Some(b) => {
                self.pos = CursorPosition::Before(b);
                true
            }
            None => {
                self.pos = CursorPosition::Nowhere;
                false
            }
        }
    }

    /// Advance to the next block in layout order, returning it.
    pub fn next_block(&mut self) -> Option<Block> {
        let current = match self.pos {
            CursorPosition::Nowhere => return None,
            CursorPosition::Before(b) => Some(b),
            CursorPosition::At(v) => self.func.layout.value_block(v),
        };
        let next = match current {
            Some(b) => self.func.layout.next_block(b),
            None => self.func.layout.first_block(),
        };
        match next {
            Some(b) => {
                self.pos = CursorPosition::Before(b);
                Some(b)
            }
            None => {
                self.pos = CursorPosition::Nowhere;
                None
            }
        }
    }

    /// Advance to the next value within the current block, returning it.
    /// Returns `None` once the block's values are exhausted (the cursor
    /// stays `Nowhere`; call `next_block` to move on).
    pub fn next_value(&mut self) -> Option<Value> {
        let block = match self.pos {
            CursorPosition::Before(b) => b,
            CursorPosition::At(v) => self.func.layout.value_block(v)?,
            CursorPosition::Nowhere => return None,
        };
        let next = match self.pos {
            CursorPosition::Before(_) => self.func.layout.block_values(block).next(),
            CursorPosition::At(v) => self.func.layout.block_values(block).skip_while(|x| *x != v).nth(1),
            CursorPosition::Nowhere => None,
        };
        match next {
            Some(v) => {
                self.pos = CursorPosition::At(v);
                Some(v)
            }
            None => None,
        }
    }

    /// Insert a new value immediately before the value the cursor
    /// currently sits `At`. Used by LICM and address-mode lowering.
    pub fn insert_before(&mut self, ty: TypeRef, opcode: Opcode, loc: SourceLoc) -> Value {
        let CursorPosition::At(before) = self.pos else {
            panic!("insert_before requires the cursor to sit at a value");
        };
        let block = self.func.layout.value_block(before).expect("value not laid out");
        let v = self.func.dfg.make_value(block, ty, opcode, loc);
        self.func.layout.insert_value_before(v, before);
        v
    }
}
