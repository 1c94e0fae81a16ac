//! C5 — per-inode logical -> physical mapping with inline and spilled
//! representations.

use crate::core::block::{BlockAllocator, HOLE};
use crate::core::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub logical_offset: u64,
    pub block_num: u32,
    pub num_blocks: u32,
}

/// Which on-disk shape this inode's extent list currently has: up to `K`
/// extents inline in the inode's data area, or a single spill block number
/// referencing an extent-tree block holding up to `M` extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Inline,
    Spilled { spill_block: u32 },
}

pub struct ExtentMap {
    extents: Vec<Extent>,
    representation: Representation,
    inline_cap: usize,
    spill_cap: usize,
}

impl ExtentMap {
    pub fn new(inline_cap: usize, spill_cap: usize) -> Self {
        Self {
            extents: Vec::new(),
            representation: Representation::Inline,
            inline_cap,
            spill_cap,
        }
    }

    pub fn representation(&self) -> Representation {
        self.representation
    }

    pub fn iter(&self) -> impl Iterator<Item = &Extent> {
        self.extents.iter()
    }

    pub fn map(&self, logical_offset: u64, block_size: u32) -> CoreResult<(u32, u32)> {
        for e in &self.extents {
            let span = e.num_blocks as u64 * block_size as u64;
            if logical_offset >= e.logical_offset && logical_offset < e.logical_offset + span {
                let within = logical_offset - e.logical_offset;
                let block_index = (within / block_size as u64) as u32;
                let offset_in_block = (within % block_size as u64) as u32;
                if e.block_num == HOLE {
                    return Ok((HOLE, offset_in_block));
                }
                return Ok((e.block_num + block_index, offset_in_block));
            }
        }
        Err(CoreError::NotFound)
    }

    /// Inserts a new extent, merging with adjacent contiguous extents
    /// (spec.md §4.4's merge rule) and promoting the representation from
    /// inline to spilled on the K+1-th distinct, non-mergeable extent.
    pub fn add(
        &mut self,
        logical_offset: u64,
        block_num: u32,
        num_blocks: u32,
        block_size: u32,
        allocator: &mut BlockAllocator,
    ) -> CoreResult<()> {
        let new = Extent {
            logical_offset,
            block_num,
            num_blocks,
        };

        let mut merged_into: Option<usize> = None;
        for (i, e) in self.extents.iter().enumerate() {
            if block_num == HOLE || e.block_num == HOLE {
                continue;
            }
            let e_span = e.logical_offset + e.num_blocks as u64 * block_size as u64;
            let new_span = logical_offset + num_blocks as u64 * block_size as u64;
            let right_append = e_span == logical_offset && e.block_num + e.num_blocks == block_num;
            let left_prepend = new_span == e.logical_offset && block_num + num_blocks == e.block_num;
            if right_append || left_prepend {
                merged_into = Some(i);
                break;
            }
        }

        if let Some(i) = merged_into {
            let e = &mut self.extents[i];
            if e.logical_offset <= logical_offset {
                e.num_blocks += num_blocks;
            } else {
                e.logical_offset = logical_offset;
                e.num_blocks += num_blocks;
                e.block_num = block_num;
            }
            self.extents.sort_by_key(|e| e.logical_offset);
            return Ok(());
        }

        let cap = match self.representation {
            Representation::Inline => self.inline_cap,
            Representation::Spilled { .. } => self.spill_cap,
        };
        if self.extents.len() + 1 > cap {
            if let Representation::Inline = self.representation {
                let spill_block = allocator.alloc(1)?;
                self.representation = Representation::Spilled { spill_block };
                if self.extents.len() + 1 > self.spill_cap {
                    return Err(CoreError::NoSpace);
                }
            } else {
                return Err(CoreError::NoSpace);
            }
        }

        self.extents.push(new);
        self.extents.sort_by_key(|e| e.logical_offset);
        Ok(())
    }

    pub fn truncate(&mut self, new_size: u64, block_size: u32, allocator: &mut BlockAllocator) {
        let mut kept = Vec::new();
        for e in self.extents.drain(..) {
            if e.logical_offset >= new_size {
                if e.block_num != HOLE {
                    allocator.free(e.block_num, e.num_blocks);
                }
                continue;
            }
            let span = e.num_blocks as u64 * block_size as u64;
            if e.logical_offset + span > new_size {
                let keep_blocks = ((new_size - e.logical_offset) as u64 + block_size as u64 - 1)
                    / block_size as u64;
                if e.block_num != HOLE && (keep_blocks as u32) < e.num_blocks {
                    allocator.free(e.block_num + keep_blocks as u32, e.num_blocks - keep_blocks as u32);
                }
                kept.push(Extent {
                    logical_offset: e.logical_offset,
                    block_num: e.block_num,
                    num_blocks: keep_blocks as u32,
                });
            } else {
                kept.push(e);
            }
        }
        self.extents = kept;
        if new_size == 0 {
            self.representation = Representation::Inline;
        }
    }

    /// Checks the canonical-form property of spec.md §8: sorted,
    /// non-overlapping, no two adjacent extents mergeable.
    pub fn is_canonical(&self, block_size: u32) -> bool {
        for w in self.extents.windows(2) {
            let (a, b) = (w[0], w[1]);
            if a.logical_offset >= b.logical_offset {
                return false;
            }
            let a_end = a.logical_offset + a.num_blocks as u64 * block_size as u64;
            if a_end > b.logical_offset {
                return false;
            }
            if a.block_num != HOLE && b.block_num != HOLE && a_end == b.logical_offset
                && a.block_num + a.num_blocks == b.block_num
            {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_returns_block_for_logical_offset() {
        let mut em = ExtentMap::new(4, 64);
        let mut alloc = BlockAllocator::new(4096, 1024);
        em.add(0, 10, 2, 4096, &mut alloc).unwrap();
        let (block, off) = em.map(4096, 4096).unwrap();
        assert_eq!(block, 11);
        assert_eq!(off, 0);
    }

    #[test]
    fn adjacent_extents_merge_on_add() {
        let mut em = ExtentMap::new(4, 64);
        let mut alloc = BlockAllocator::new(4096, 1024);
        em.add(0, 10, 1, 4096, &mut alloc).unwrap();
        em.add(4096, 11, 1, 4096, &mut alloc).unwrap();
        assert_eq!(em.iter().count(), 1);
        assert!(em.is_canonical(4096));
    }

    #[test]
    fn spills_on_k_plus_one_non_mergeable_extent() {
        let mut em = ExtentMap::new(2, 64);
        let mut alloc = BlockAllocator::new(4096, 1024);
        em.add(0, 0, 1, 4096, &mut alloc).unwrap();
        em.add(2 * 4096, 10, 1, 4096, &mut alloc).unwrap();
        assert_eq!(em.representation(), Representation::Inline);
        em.add(4 * 4096, 20, 1, 4096, &mut alloc).unwrap();
        assert!(matches!(em.representation(), Representation::Spilled { .. }));
    }

    #[test]
    fn truncate_to_zero_frees_all_blocks() {
        let mut em = ExtentMap::new(4, 64);
        let mut alloc = BlockAllocator::new(4096, 1024);
        em.add(0, 5, 1, 4096, &mut alloc).unwrap();
        em.truncate(0, 4096, &mut alloc);
        assert_eq!(em.iter().count(), 0);
        assert_eq!(em.representation(), Representation::Inline);
    }
}
