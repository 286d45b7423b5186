//! Linear order of blocks, and of values within a block.
//!
//! Mirrors `cranelift-codegen::ir::layout`: an intrusive doubly-linked
//! list over the same `Value`/`Block` entity keys the DFG already hands
//! out, kept in a side table rather than inside `ValueData` so that
//! reordering a block's instructions (CFG simplification, address-mode
//! lowering) never touches the DFG arena.

use crate::ir::entities::{Block, Value};
use nimbus_entity::{PackedOption, SecondaryMap};

#[derive(Debug, Clone, Copy, Default)]
struct BlockNode {
    prev: PackedOption<Block>,
    next: PackedOption<Block>,
    first_value: PackedOption<Value>,
    last_value: PackedOption<Value>,
}

#[derive(Debug, Clone, Copy, Default)]
struct ValueNode {
    block: PackedOption<Block>,
    prev: PackedOption<Value>,
    next: PackedOption<Value>,
}

/// The ordering of blocks within a [`crate::ir::Function`], and of values
/// within each block. Purely structural: it says nothing about a value's
/// type or opcode, only where it sits.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    blocks: SecondaryMap<Block, BlockNode>,
    values: SecondaryMap<Value, ValueNode>,
    first_block: PackedOption<Block>,
    last_block: PackedOption<Block>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fresh block to the end of the function.
    pub fn append_block(&mut self, block: Block) {
        let prev = self.last_block;
        self.blocks[block] = BlockNode {
            prev,
            next: None.into(),
            first_value: None.into(),
            last_value: None.into(),
        };
        if let Some(prev_block) = prev.expand() {
            self.blocks[prev_block].next = block.into();
        } else {
            self.first_block = block.into();
        }
        self.last_block = block.into();
    }

    /// Splice `block` out of the block chain. Used by CFG simplification
    /// after a block's values have been merged elsewhere and it no
    /// longer needs a place in the layout.
    pub fn remove_block(&mut self, block: Block) {
        let node = self.blocks[block];
        match node.prev.expand() {
            Some(p) => self.blocks[p].next = node.next,
            None => self.first_block = node.next,
        }
        match node.next.expand() {
            Some(n) => self.blocks[n].prev = node.prev,
            None => self.last_block = node.prev,
        }
        self.blocks[block] = BlockNode::default();
    }

    pub fn blocks(&self) -> BlockIter<'_> {
        BlockIter {
            layout: self,
            next: self.first_block,
        }
    }

    pub fn first_block(&self) -> Option<Block> {
        self.first_block.expand()
    }

    pub fn next_block(&self, block: Block) -> Option<Block> {
        self.blocks[block].next.expand()
    }

    /// Append `value` to the end of `block`'s value list.
    pub fn append_value(&mut self, block: Block, value: Value) {
        let prev = self.blocks[block].last_value;
        self.values[value] = ValueNode {
            block: block.into(),
            prev,
            next: None.into(),
        };
        if let Some(prev_value) = prev.expand() {
            self.values[prev_value].next = value.into();
        } else {
            self.blocks[block].first_value = value.into();
        }
        self.blocks[block].last_value = value.into();
    }

    /// Insert `value` immediately before `before`, which must already be
    /// laid out. Used by address-mode lowering and LICM to hoist a value
    /// to a new position without rebuilding the rest of the block.
    pub fn insert_value_before(&mut self, value: Value, before: Value) {
        let block = self.values[before].block.expand().expect("before is not laid out");
        let prev = self.values[before].prev;
        self.values[value] = ValueNode {
            block: block.into(),
            prev,
            next: before.into(),
        };
        self.values[before].prev = value.into();
        match prev.expand() {
            Some(prev_value) => self.values[prev_value].next = value.into(),
            None => self.blocks[block].first_value = value.into(),
        }
    }

    pub fn remove_value(&mut self, value: Value) {
        let node = self.values[value];
        let Some(block) = node.block.expand() else { return };
        match node.prev.expand() {
            Some(p) => self.values[p].next = node.next,
            None => self.blocks[block].first_value = node.next,
        }
        match node.next.expand() {
            Some(n) => self.values[n].prev = node.prev,
            None => self.blocks[block].last_value = node.prev,
        }
        self.values[value] = ValueNode::default();
    }

    pub fn block_values(&self, block: Block) -> ValueIter<'_> {
        ValueIter {
            layout: self,
            next: self.blocks.get(block).map(|b| b.first_value).unwrap_or_default(),
        }
    }

    pub fn last_value_in_block(&self, block: Block) -> Option<Value> {
        self.blocks[block].last_value.expand()
    }

    pub fn value_block(&self, value: Value) -> Option<Block> {
        self.values.get(value).and_then(|n| n.block.expand())
    }

    /// Splice `from`'s block list onto the end of `block`, leaving `from`
    /// empty. Used by CFG simplification when merging a block into its
    /// unique predecessor.
    pub fn merge_block_into(&mut self, block: Block, from: Block) {
        let values: Vec<Value> = self.block_values(from).collect();
        for v in values {
            self.remove_value(v);
            self.append_value(block, v);
        }
    }
}

pub struct BlockIter<'a> {
    layout: &'a Layout,
    next: PackedOption<Block>,
}

impl<'a> Iterator for BlockIter<'a> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let block = self.next.expand()?;
        self.next = self.layout.blocks[block].next;
        Some(block)
    }
}

pub struct ValueIter<'a> {
    layout: &'a Layout,
    next: PackedOption<Value>,
}

impl<'a> Iterator for ValueIter<'a> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let value = self.next.expand()?;
        self.next = self.layout.values[value].next;
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_entity::EntityRef;

    #[test]
    fn blocks_stay_in_append_order() {
        let mut l = Layout::new();
        let b0 = Block::new(0);
        let b1 = Block::new(1);
        l.append_block(b0);
        l.append_block(b1);
        assert_eq!(l.blocks().collect::<Vec<_>>(), vec![b0, b1]);
    }

    #[test]
    fn values_stay_in_append_order_within_a_block() {
        let mut l = Layout::new();
        let b0 = Block::new(0);
        l.append_block(b0);
        let v0 = Value::new(0);
        let v1 = Value::new(1);
        let v2 = Value::new(2);
        l.append_value(b0, v0);
        l.append_value(b0, v1);
        l.append_value(b0, v2);
        assert_eq!(l.block_values(b0).collect::<Vec<_>>(), vec![v0, v1, v2]);
    }

    #[test]
    fn remove_value_splices_the_list() {
        let mut l = Layout::new();
        let b0 = Block::new(0);
        l.append_block(b0);
        let v0 = Value::new(0);
        let v1 = Value::new(1);
        let v2 = Value::new(2);
        l.append_value(b0, v0);
        l.append_value(b0, v1);
        l.append_value(b0, v2);
        l.remove_value(v1);
        assert_eq!(l.block_values(b0).collect::<Vec<_>>(), vec![v0, v2]);
    }

    #[test]
    fn insert_before_splices_in_the_middle() {
        let mut l = Layout::new();
        let b0 = Block::new(0);
        l.append_block(b0);
        let v0 = Value::new(0);
        let v2 = Value::new(2);
        let v1 = Value::new(1);
        l.append_value(b0, v0);
        l.append_value(b0, v2);
        l.insert_value_before(v1, v2);
        assert_eq!(l.block_values(b0).collect::<Vec<_>>(), vec![v0, v1, v2]);
    }
}
