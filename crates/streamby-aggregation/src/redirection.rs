//! Block-allocated redirection storage
//!
//! Maps destination slots to the source row key currently backing them.
//! Blocks are allocated on first write, so after a release the memory held is
//! proportional to the destinations touched since, not to the table size.

use streamby_core::{Destination, RowKey, NULL_ROW_KEY};

/// Destinations per block
pub const BLOCK_SIZE: usize = 1024;

type Block = Box<[RowKey]>;

/// Number of blocks needed to address `size` destinations
pub(crate) fn blocks_for(size: usize) -> usize {
    size.div_ceil(BLOCK_SIZE)
}

/// Growable, lazily populated destination -> row key array
#[derive(Debug, Default)]
pub struct Redirections {
    blocks: Vec<Option<Block>>,
}

impl Redirections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every destination below `size` addressable
    pub fn ensure_capacity(&mut self, size: usize) {
        let needed = blocks_for(size);
        if needed > self.blocks.len() {
            self.blocks.resize_with(needed, || None);
        }
    }

    /// Number of addressable destinations
    pub fn capacity(&self) -> usize {
        self.blocks.len() * BLOCK_SIZE
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of blocks currently holding entries
    pub fn allocated_blocks(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_some()).count()
    }

    pub fn get(&self, destination: Destination) -> Option<RowKey> {
        lookup(&self.blocks, 0, destination)
    }

    pub fn set(&mut self, destination: Destination, key: RowKey) {
        self.window().set(destination, key);
    }

    /// Drop every entry; capacity is kept so later writes need no regrowth
    pub fn release(&mut self) {
        for block in &mut self.blocks {
            *block = None;
        }
    }

    /// Mutable view over every block
    pub(crate) fn window(&mut self) -> RedirectionWindow<'_> {
        RedirectionWindow {
            first_block: 0,
            blocks: &mut self.blocks,
        }
    }

    /// Disjoint mutable views of `blocks_per_window` blocks each
    pub(crate) fn windows(&mut self, blocks_per_window: usize) -> Vec<RedirectionWindow<'_>> {
        self.blocks
            .chunks_mut(blocks_per_window.max(1))
            .enumerate()
            .map(|(i, blocks)| RedirectionWindow {
                first_block: i * blocks_per_window.max(1),
                blocks,
            })
            .collect()
    }
}

fn lookup(blocks: &[Option<Block>], first_block: usize, destination: Destination) -> Option<RowKey> {
    let d = destination as usize;
    let block = (d / BLOCK_SIZE).checked_sub(first_block)?;
    let key = blocks.get(block)?.as_ref()?[d % BLOCK_SIZE];
    (key != NULL_ROW_KEY).then_some(key)
}

/// Mutable view over a contiguous range of blocks.
///
/// Destinations are addressed absolutely; the caller guarantees they fall
/// inside the window.
#[derive(Debug)]
pub(crate) struct RedirectionWindow<'a> {
    first_block: usize,
    blocks: &'a mut [Option<Block>],
}

impl RedirectionWindow<'_> {
    pub(crate) fn get(&self, destination: Destination) -> Option<RowKey> {
        lookup(self.blocks, self.first_block, destination)
    }

    pub(crate) fn set(&mut self, destination: Destination, key: RowKey) {
        let d = destination as usize;
        let block = self.blocks[d / BLOCK_SIZE - self.first_block]
            .get_or_insert_with(|| vec![NULL_ROW_KEY; BLOCK_SIZE].into_boxed_slice());
        block[d % BLOCK_SIZE] = key;
    }
}
