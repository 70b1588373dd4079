//! Binary buddy allocator over heap words.
//!
//! Blocks are powers of two in size and aligned to their size. A free set per
//! order tracks available blocks. A heap whose size is not a power of two is
//! split greedily into aligned power-of-two chunks at start-up.

use std::collections::BTreeSet;

#[derive(Debug)]
pub struct BuddyAllocator {
    /// `free[k]` holds the start word of every free block of `2^k` words.
    free: Vec<BTreeSet<usize>>,
    total_words: usize,
    coalesce: bool,
}

/// Smallest order whose block holds `words` words.
#[inline]
pub fn order_for(words: usize) -> u32 {
    words.max(1).next_power_of_two().trailing_zeros()
}

impl BuddyAllocator {
    pub fn new(total_words: usize, coalesce: bool) -> Self {
        let max_order = if total_words == 0 { 0 } else { usize::BITS - 1 - total_words.leading_zeros() };
        let mut free = vec![BTreeSet::new(); max_order as usize + 1];
        let mut start = 0;
        for order in (0..=max_order).rev() {
            let size = 1usize << order;
            if start + size <= total_words {
                free[order as usize].insert(start);
                start += size;
            }
        }
        Self { free, total_words, coalesce }
    }

    pub fn total_words(&self) -> usize {
        self.total_words
    }

    /// Allocate a block of `2^order` words, returning its start word.
    pub fn alloc(&mut self, order: u32) -> Option<usize> {
        let order = order as usize;
        let from = (order..self.free.len()).find(|&k| !self.free[k].is_empty())?;
        let start = self.free[from].pop_first()?;
        // Split down, keeping the lower half and registering the upper one.
        for k in (order..from).rev() {
            self.free[k].insert(start + (1 << k));
        }
        Some(start)
    }

    /// Return a block to the free sets, merging with its buddy when enabled.
    pub fn free(&mut self, start: usize, order: u32) {
        let mut start = start;
        let mut order = order as usize;
        if self.coalesce {
            while order + 1 < self.free.len() {
                let buddy = start ^ (1 << order);
                if !self.free[order].remove(&buddy) {
                    break;
                }
                start = start.min(buddy);
                order += 1;
            }
        }
        self.free[order].insert(start);
    }

    /// Order of the free block starting at `start`, if there is one.
    pub fn free_order_at(&self, start: usize) -> Option<u32> {
        self.free.iter().position(|set| set.contains(&start)).map(|k| k as u32)
    }

    pub fn free_words(&self) -> usize {
        self.free.iter().enumerate().map(|(k, set)| set.len() << k).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_order_for() {
        assert_eq!(order_for(1), 0);
        assert_eq!(order_for(2), 1);
        assert_eq!(order_for(3), 2);
        assert_eq!(order_for(256), 8);
    }

    #[test]
    fn test_split_registers_buddies() {
        let mut buddy = BuddyAllocator::new(16, true);
        assert_eq!(buddy.alloc(0), Some(0));
        // 16 -> 8 + 8 -> 4 + 4 -> 2 + 2 -> 1 + 1
        assert_eq!(buddy.free_order_at(1), Some(0));
        assert_eq!(buddy.free_order_at(2), Some(1));
        assert_eq!(buddy.free_order_at(4), Some(2));
        assert_eq!(buddy.free_order_at(8), Some(3));
        assert_eq!(buddy.free_words(), 15);
    }

    #[test]
    fn test_non_power_of_two_heap() {
        let mut buddy = BuddyAllocator::new(100, true);
        assert_eq!(buddy.free_order_at(0), Some(6));
        assert_eq!(buddy.free_order_at(64), Some(5));
        assert_eq!(buddy.free_order_at(96), Some(2));
        assert_eq!(buddy.alloc(7), None);
        assert_eq!(buddy.alloc(6), Some(0));
        assert_eq!(buddy.alloc(6), None);
        assert_eq!(buddy.alloc(5), Some(64));
    }

    #[test]
    fn test_exhaustion() {
        let mut buddy = BuddyAllocator::new(4, true);
        for expected in 0..4 {
            assert_eq!(buddy.alloc(0), Some(expected));
        }
        assert_eq!(buddy.alloc(0), None);
    }

    #[test]
    fn test_coalescing_restores_large_blocks() {
        let mut buddy = BuddyAllocator::new(8, true);
        let blocks: Vec<_> = (0..8).map(|_| buddy.alloc(0).unwrap()).collect();
        for b in blocks {
            buddy.free(b, 0);
        }
        assert_eq!(buddy.free_order_at(0), Some(3));
        assert_eq!(buddy.alloc(3), Some(0));
    }

    #[test]
    fn test_without_coalescing_fragments() {
        let mut buddy = BuddyAllocator::new(8, false);
        let blocks: Vec<_> = (0..8).map(|_| buddy.alloc(0).unwrap()).collect();
        for b in blocks {
            buddy.free(b, 0);
        }
        assert_eq!(buddy.free_words(), 8);
        assert_eq!(buddy.alloc(1), None);
        assert_eq!(buddy.alloc(0), Some(0));
    }
}
