//! First-fit heap allocator over a fixed byte arena
//!
//! ## Design
//!
//! The classic intrusive free list, expressed safely: payload bytes live
//! in a `Vec<u8>` arena and block headers live in a side table keyed by
//! the byte offset the header would occupy in-arena. Links between
//! blocks are offsets, never pointers, so the structure survives any
//! arena relocation.
//!
//! Each block spans `BLOCK_HEADER_SIZE + size` bytes of the arena and
//! blocks tile it exactly: adjacent blocks in the list are physically
//! adjacent in memory. After any completed call there are no two
//! consecutive free blocks.

use logger::Logger;
use std::collections::BTreeMap;
use std::fmt::Write as _;

const COMPONENT: &str = "HeapAllocator";

/// Modeled footprint of one block header inside the arena, in bytes.
pub const BLOCK_HEADER_SIZE: usize = 32;

/// Payload sizes are rounded up to this alignment.
const ALIGNMENT: usize = 8;

/// A block is split only when the tail would hold at least this much
/// payload beyond its header.
const MIN_SPLIT_PAYLOAD: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockHeader {
    size: usize,
    is_free: bool,
    next: Option<usize>,
    prev: Option<usize>,
}

/// Manages a caller-supplied fixed-size arena
///
/// "Pointers" in this API are payload offsets into the arena wrapped in
/// `Option`; `None` plays the role of null.
pub struct HeapAllocator {
    arena: Vec<u8>,
    blocks: BTreeMap<usize, BlockHeader>,
    allocated_bytes: usize,
    log: Logger,
}

impl HeapAllocator {
    /// Creates an allocator over a fresh arena of `heap_size` bytes
    ///
    /// # Panics
    ///
    /// Panics if the arena cannot hold a single header plus the minimum
    /// aligned payload.
    pub fn new(heap_size: usize, log: Logger) -> Self {
        assert!(
            heap_size >= BLOCK_HEADER_SIZE + ALIGNMENT,
            "arena of {} bytes cannot hold one block",
            heap_size
        );

        let mut blocks = BTreeMap::new();
        blocks.insert(
            0,
            BlockHeader {
                size: heap_size - BLOCK_HEADER_SIZE,
                is_free: true,
                next: None,
                prev: None,
            },
        );

        log.info(
            COMPONENT,
            &format!("Initialized heap with {} bytes", heap_size),
        );
        Self {
            arena: vec![0; heap_size],
            blocks,
            allocated_bytes: 0,
            log,
        }
    }

    /// Allocates `size` bytes, first fit from the head of the list
    ///
    /// Returns the payload offset, or `None` for a zero size or when no
    /// free block is large enough. Sizes are rounded up to a multiple
    /// of 8; oversize free blocks are split.
    pub fn allocate(&mut self, size: usize) -> Option<usize> {
        if size == 0 {
            return None;
        }
        let size = (size + ALIGNMENT - 1) & !(ALIGNMENT - 1);

        let offset = self.find_free_block(size);
        let Some(offset) = offset else {
            self.log
                .error(COMPONENT, &format!("Failed to allocate {} bytes", size));
            return None;
        };

        if self.blocks[&offset].size >= size + BLOCK_HEADER_SIZE + MIN_SPLIT_PAYLOAD {
            self.split_block(offset, size);
        }

        if let Some(block) = self.blocks.get_mut(&offset) {
            block.is_free = false;
            self.allocated_bytes += block.size;
        }
        Some(offset + BLOCK_HEADER_SIZE)
    }

    /// Releases an allocation; `None` is a no-op
    ///
    /// A double free is detected, reported, and leaves all state
    /// untouched. The freed block is coalesced with its next neighbour
    /// first, then its previous one.
    pub fn free(&mut self, ptr: Option<usize>) {
        let Some(ptr) = ptr else {
            return;
        };
        let Some(offset) = self.block_of(ptr) else {
            self.log
                .warn(COMPONENT, &format!("Free of unknown pointer {:#x}", ptr));
            return;
        };

        let block = self.blocks[&offset];
        if block.is_free {
            self.log.warn(COMPONENT, "Double free detected");
            return;
        }

        if let Some(block) = self.blocks.get_mut(&offset) {
            block.is_free = true;
        }
        self.allocated_bytes -= block.size;

        self.coalesce(offset);
    }

    /// Grows or releases an allocation
    ///
    /// `None` behaves like `allocate`; a zero `new_size` frees. A block
    /// already large enough is returned unchanged (no shrink split).
    /// Otherwise the payload moves to a new allocation and the old block
    /// is freed; on exhaustion the old block is left intact and `None`
    /// is returned.
    pub fn reallocate(&mut self, ptr: Option<usize>, new_size: usize) -> Option<usize> {
        let Some(ptr) = ptr else {
            return self.allocate(new_size);
        };
        if new_size == 0 {
            self.free(Some(ptr));
            return None;
        }

        let Some(offset) = self.block_of(ptr) else {
            self.log.warn(
                COMPONENT,
                &format!("Reallocate of unknown pointer {:#x}", ptr),
            );
            return None;
        };

        let old_size = self.blocks[&offset].size;
        if old_size >= new_size {
            return Some(ptr);
        }

        let new_ptr = self.allocate(new_size)?;
        self.arena.copy_within(ptr..ptr + old_size, new_ptr);
        self.free(Some(ptr));
        Some(new_ptr)
    }

    /// Bytes available for payloads
    pub fn free_memory(&self) -> usize {
        self.arena.len() - self.allocated_bytes - BLOCK_HEADER_SIZE
    }

    /// Bytes currently allocated
    pub fn used_memory(&self) -> usize {
        self.allocated_bytes
    }

    /// Arena size in bytes
    pub fn total_memory(&self) -> usize {
        self.arena.len()
    }

    /// Number of blocks in the list
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Borrows the payload bytes of a live allocation
    pub fn payload(&self, ptr: usize) -> Option<&[u8]> {
        let offset = self.block_of(ptr)?;
        let block = self.blocks.get(&offset)?;
        if block.is_free {
            return None;
        }
        self.arena.get(ptr..ptr + block.size)
    }

    /// Mutably borrows the payload bytes of a live allocation
    pub fn payload_mut(&mut self, ptr: usize) -> Option<&mut [u8]> {
        let offset = self.block_of(ptr)?;
        let block = *self.blocks.get(&offset)?;
        if block.is_free {
            return None;
        }
        self.arena.get_mut(ptr..ptr + block.size)
    }

    /// Human-readable status summary
    pub fn report(&self) -> String {
        let mut out = String::new();
        out.push_str("=== Heap Allocator Report ===\n");
        let _ = writeln!(out, "Total Size: {} bytes", self.arena.len());
        let _ = writeln!(out, "Used: {} bytes", self.allocated_bytes);
        let _ = writeln!(out, "Free: {} bytes", self.free_memory());
        let _ = writeln!(
            out,
            "Utilization: {:.1}%",
            100.0 * self.allocated_bytes as f64 / self.arena.len() as f64
        );
        out
    }

    fn block_of(&self, ptr: usize) -> Option<usize> {
        let offset = ptr.checked_sub(BLOCK_HEADER_SIZE)?;
        self.blocks.contains_key(&offset).then_some(offset)
    }

    fn find_free_block(&self, size: usize) -> Option<usize> {
        let mut cursor = Some(0);
        while let Some(offset) = cursor {
            let block = self.blocks.get(&offset)?;
            if block.is_free && block.size >= size {
                return Some(offset);
            }
            cursor = block.next;
        }
        None
    }

    /// Carves the tail of an oversize block into a new free block
    fn split_block(&mut self, offset: usize, size: usize) {
        let block = self.blocks[&offset];
        let tail_offset = offset + BLOCK_HEADER_SIZE + size;
        let tail = BlockHeader {
            size: block.size - size - BLOCK_HEADER_SIZE,
            is_free: true,
            next: block.next,
            prev: Some(offset),
        };

        if let Some(next_offset) = block.next {
            if let Some(next) = self.blocks.get_mut(&next_offset) {
                next.prev = Some(tail_offset);
            }
        }

        if let Some(block) = self.blocks.get_mut(&offset) {
            block.size = size;
            block.next = Some(tail_offset);
        }
        self.blocks.insert(tail_offset, tail);
    }

    /// Merges a freed block with free neighbours on either side
    fn coalesce(&mut self, offset: usize) {
        // Absorb the next block first.
        let block = self.blocks[&offset];
        if let Some(next_offset) = block.next {
            let next = self.blocks[&next_offset];
            if next.is_free {
                if let Some(merged) = self.blocks.get_mut(&offset) {
                    merged.size += BLOCK_HEADER_SIZE + next.size;
                    merged.next = next.next;
                }
                if let Some(after_offset) = next.next {
                    if let Some(after) = self.blocks.get_mut(&after_offset) {
                        after.prev = Some(offset);
                    }
                }
                self.blocks.remove(&next_offset);
            }
        }

        // Then fold into a free previous block.
        let block = self.blocks[&offset];
        if let Some(prev_offset) = block.prev {
            let prev = self.blocks[&prev_offset];
            if prev.is_free {
                if let Some(merged) = self.blocks.get_mut(&prev_offset) {
                    merged.size += BLOCK_HEADER_SIZE + block.size;
                    merged.next = block.next;
                }
                if let Some(after_offset) = block.next {
                    if let Some(after) = self.blocks.get_mut(&after_offset) {
                        after.prev = Some(prev_offset);
                    }
                }
                self.blocks.remove(&offset);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_MIB: usize = 1024 * 1024;

    fn heap(size: usize) -> HeapAllocator {
        HeapAllocator::new(size, Logger::quiet())
    }

    /// Walks the list from the head and checks every structural
    /// invariant: offset contiguity, link symmetry, full arena
    /// coverage, and the coalescing guarantee.
    fn assert_consistent(heap: &HeapAllocator) {
        let mut covered = 0;
        let mut cursor = Some(0);
        let mut prev: Option<usize> = None;
        let mut prev_was_free = false;

        while let Some(offset) = cursor {
            let block = heap.blocks[&offset];
            assert_eq!(block.prev, prev, "prev link broken at {:#x}", offset);
            assert_eq!(offset, covered, "gap before block at {:#x}", offset);
            assert!(
                !(prev_was_free && block.is_free),
                "consecutive free blocks at {:#x}",
                offset
            );
            covered += BLOCK_HEADER_SIZE + block.size;
            prev_was_free = block.is_free;
            prev = Some(offset);
            cursor = block.next;
        }

        assert_eq!(covered, heap.total_memory(), "blocks do not tile the arena");
        assert_eq!(heap.blocks.len(), {
            let mut count = 0;
            let mut cursor = Some(0);
            while let Some(offset) = cursor {
                count += 1;
                cursor = heap.blocks[&offset].next;
            }
            count
        });
    }

    #[test]
    fn test_zero_allocation_returns_none() {
        let mut heap = heap(4096);
        assert!(heap.allocate(0).is_none());
    }

    #[test]
    fn test_free_none_is_noop() {
        let mut heap = heap(4096);
        heap.free(None);
        assert_eq!(heap.used_memory(), 0);
        assert_consistent(&heap);
    }

    #[test]
    fn test_basic_allocation() {
        let mut heap = heap(4096);
        let a = heap.allocate(100);
        assert!(a.is_some());
        // 100 rounds up to 104.
        assert_eq!(heap.used_memory(), 104);
        assert_consistent(&heap);
    }

    #[test]
    fn test_coalescing_scenario() {
        let mut heap = heap(ONE_MIB);

        let a = heap.allocate(100);
        let b = heap.allocate(200);
        assert!(a.is_some() && b.is_some());

        let used = heap.used_memory();
        heap.free(a);
        assert!(heap.used_memory() < used);
        assert_consistent(&heap);

        let c = heap.allocate(50);
        assert!(c.is_some());
        assert_consistent(&heap);

        heap.free(b);
        heap.free(c);
        assert_eq!(heap.used_memory(), 0);
        assert_eq!(heap.block_count(), 1);
        assert_consistent(&heap);
    }

    #[test]
    fn test_split_produces_tail_block() {
        let mut heap = heap(4096);
        heap.allocate(64);
        assert_eq!(heap.block_count(), 2);
        assert_consistent(&heap);
    }

    #[test]
    fn test_split_at_exact_threshold() {
        let mut heap = heap(BLOCK_HEADER_SIZE + 104);
        let a = heap.allocate(64);
        assert!(a.is_some());
        // The remainder holds a header plus exactly eight payload bytes,
        // the smallest tail worth carving off.
        assert_eq!(heap.block_count(), 2);
        assert_eq!(heap.used_memory(), 64);
        assert_consistent(&heap);
    }

    #[test]
    fn test_no_split_when_remainder_too_small() {
        let mut heap = heap(BLOCK_HEADER_SIZE + 64);
        let a = heap.allocate(56);
        assert!(a.is_some());
        // The 8 spare bytes cannot hold a header, so the block keeps them.
        assert_eq!(heap.block_count(), 1);
        assert_eq!(heap.used_memory(), 64);
        assert_consistent(&heap);
    }

    #[test]
    fn test_double_free_is_detected() {
        let mut heap = heap(4096);
        let a = heap.allocate(100);
        heap.free(a);
        let used = heap.used_memory();
        let blocks = heap.block_count();

        heap.free(a);
        assert_eq!(heap.used_memory(), used);
        assert_eq!(heap.block_count(), blocks);
        assert_consistent(&heap);
    }

    #[test]
    fn test_free_unknown_pointer_is_ignored() {
        let mut heap = heap(4096);
        heap.allocate(100);
        let used = heap.used_memory();
        heap.free(Some(7));
        assert_eq!(heap.used_memory(), used);
        assert_consistent(&heap);
    }

    #[test]
    fn test_coalesce_both_sides() {
        let mut heap = heap(ONE_MIB);
        let a = heap.allocate(64);
        let b = heap.allocate(64);
        let c = heap.allocate(64);

        heap.free(a);
        heap.free(c);
        assert_consistent(&heap);

        // Freeing b merges with both neighbours.
        heap.free(b);
        assert_consistent(&heap);
        assert_eq!(heap.used_memory(), 0);
    }

    #[test]
    fn test_first_fit_reuses_earliest_hole() {
        let mut heap = heap(ONE_MIB);
        let a = heap.allocate(128);
        let _b = heap.allocate(128);
        heap.free(a);

        // The freed head block satisfies the next small request.
        let c = heap.allocate(64);
        assert_eq!(c, a.map(|_| BLOCK_HEADER_SIZE));
        assert_consistent(&heap);
    }

    #[test]
    fn test_exhaustion_returns_none() {
        let mut heap = heap(1024);
        let a = heap.allocate(900);
        assert!(a.is_some());
        assert!(heap.allocate(900).is_none());
        assert_consistent(&heap);
    }

    #[test]
    fn test_reallocate_none_allocates() {
        let mut heap = heap(4096);
        let a = heap.reallocate(None, 64);
        assert!(a.is_some());
        assert_eq!(heap.used_memory(), 64);
    }

    #[test]
    fn test_reallocate_zero_frees() {
        let mut heap = heap(4096);
        let a = heap.allocate(64);
        assert!(heap.reallocate(a, 0).is_none());
        assert_eq!(heap.used_memory(), 0);
        assert_consistent(&heap);
    }

    #[test]
    fn test_reallocate_within_capacity_keeps_block() {
        let mut heap = heap(4096);
        let a = heap.allocate(100);
        // 100 rounded to 104, so 104 still fits in place.
        assert_eq!(heap.reallocate(a, 104), a);
        assert_consistent(&heap);
    }

    #[test]
    fn test_reallocate_grow_copies_payload() {
        let mut heap = heap(ONE_MIB);
        let a = heap.allocate(32).unwrap();
        heap.payload_mut(a).unwrap()[..4].copy_from_slice(b"data");

        let b = heap.reallocate(Some(a), 256).unwrap();
        assert_ne!(a, b);
        assert_eq!(&heap.payload(b).unwrap()[..4], b"data");
        assert_consistent(&heap);
    }

    #[test]
    fn test_reallocate_failure_keeps_old_block() {
        let mut heap = heap(1024);
        let a = heap.allocate(512).unwrap();
        heap.payload_mut(a).unwrap()[..3].copy_from_slice(b"abc");

        assert!(heap.reallocate(Some(a), 4096).is_none());
        assert_eq!(&heap.payload(a).unwrap()[..3], b"abc");
        assert_eq!(heap.used_memory(), 512);
        assert_consistent(&heap);
    }

    #[test]
    fn test_churn_preserves_invariants() {
        let mut heap = heap(64 * 1024);
        let mut live = Vec::new();

        for round in 0..8 {
            for size in [24, 100, 512, 64, 8] {
                if let Some(ptr) = heap.allocate(size + round) {
                    live.push(ptr);
                }
            }
            // Free every other allocation.
            let mut index = 0;
            live.retain(|&ptr| {
                index += 1;
                if index % 2 == 0 {
                    heap.free(Some(ptr));
                    false
                } else {
                    true
                }
            });
            assert_consistent(&heap);
        }

        for ptr in live {
            heap.free(Some(ptr));
        }
        assert_eq!(heap.used_memory(), 0);
        assert_eq!(heap.block_count(), 1);
        assert_consistent(&heap);
    }

    #[test]
    fn test_memory_accounting() {
        let mut heap = heap(4096);
        assert_eq!(heap.total_memory(), 4096);
        assert_eq!(heap.used_memory(), 0);
        assert_eq!(heap.free_memory(), 4096 - BLOCK_HEADER_SIZE);

        let a = heap.allocate(128);
        assert_eq!(heap.used_memory(), 128);
        heap.free(a);
        assert_eq!(heap.free_memory(), 4096 - BLOCK_HEADER_SIZE);
    }

    #[test]
    fn test_report_contents() {
        let mut heap = heap(4096);
        heap.allocate(128);
        let report = heap.report();
        assert!(report.contains("Total Size: 4096 bytes"));
        assert!(report.contains("Used: 128 bytes"));
    }
}
