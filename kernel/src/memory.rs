//! Virtual memory manager
//!
//! Per-task page tables over a global physical frame pool. Frames are
//! handed out by an ascending first-fit scan of a fixed bitmap; the
//! point is determinism and inspectability, not throughput.
//!
//! Invariant: frame bit `i` is set exactly when one present page-table
//! entry across all tables references frame `i`. Freeing a page clears
//! the bit and removes the entry together.

use core_types::{
    FrameNumber, PageNumber, PhysicalAddress, Protection, TaskId, PAGE_SIZE, TOTAL_PHYSICAL_FRAMES,
};
use logger::Logger;
use std::collections::BTreeMap;
use std::fmt::Write as _;

const COMPONENT: &str = "MemoryManager";

const BITMAP_WORDS: usize = TOTAL_PHYSICAL_FRAMES / 64;

/// Fixed-size allocation bitmap over the physical frame pool
#[derive(Debug, Clone)]
struct FrameBitmap {
    words: [u64; BITMAP_WORDS],
}

impl FrameBitmap {
    fn new() -> Self {
        Self {
            words: [0; BITMAP_WORDS],
        }
    }

    fn is_set(&self, frame: usize) -> bool {
        self.words[frame / 64] & (1 << (frame % 64)) != 0
    }

    fn set(&mut self, frame: usize) {
        self.words[frame / 64] |= 1 << (frame % 64);
    }

    fn clear(&mut self, frame: usize) {
        self.words[frame / 64] &= !(1 << (frame % 64));
    }

    fn count(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Lowest clear bit, ascending scan
    fn first_clear(&self) -> Option<usize> {
        (0..TOTAL_PHYSICAL_FRAMES).find(|&frame| !self.is_set(frame))
    }
}

/// One mapping in a task's page table
#[derive(Debug, Clone, Copy)]
pub struct PageTableEntry {
    pub frame: FrameNumber,
    pub present: bool,
    pub dirty: bool,
    pub accessed: bool,
    pub protection: Protection,
}

/// Per-task mapping from virtual page number to entry
#[derive(Debug)]
pub struct PageTable {
    pub owner: TaskId,
    entries: BTreeMap<PageNumber, PageTableEntry>,
}

impl PageTable {
    fn new(owner: TaskId) -> Self {
        Self {
            owner,
            entries: BTreeMap::new(),
        }
    }

    /// Returns the entry for a page, if mapped
    pub fn entry(&self, page: PageNumber) -> Option<&PageTableEntry> {
        self.entries.get(&page)
    }

    /// Number of present entries
    pub fn present_count(&self) -> usize {
        self.entries.values().filter(|entry| entry.present).count()
    }
}

/// Owns every page table and the global frame pool
pub struct MemoryManager {
    frames: FrameBitmap,
    page_tables: BTreeMap<TaskId, PageTable>,
    total_allocated_pages: u64,
    page_fault_count: u64,
    log: Logger,
}

impl MemoryManager {
    /// Creates a manager with all frames free
    pub fn new(log: Logger) -> Self {
        log.info(
            COMPONENT,
            &format!(
                "Initialized with {} frames ({} KB)",
                TOTAL_PHYSICAL_FRAMES,
                TOTAL_PHYSICAL_FRAMES * PAGE_SIZE / 1024
            ),
        );
        Self {
            frames: FrameBitmap::new(),
            page_tables: BTreeMap::new(),
            total_allocated_pages: 0,
            page_fault_count: 0,
            log,
        }
    }

    /// Creates an empty page table for `task`; false if one exists
    pub fn create_address_space(&mut self, task: TaskId) -> bool {
        if self.page_tables.contains_key(&task) {
            self.log.warn(
                COMPONENT,
                &format!("Address space already exists for {}", task),
            );
            return false;
        }
        self.page_tables.insert(task, PageTable::new(task));
        self.log
            .info(COMPONENT, &format!("Created address space for {}", task));
        true
    }

    /// Releases every present frame and removes the page table
    pub fn destroy_address_space(&mut self, task: TaskId) -> bool {
        let Some(table) = self.page_tables.remove(&task) else {
            return false;
        };

        for entry in table.entries.values() {
            if entry.present {
                self.free_frame(entry.frame);
            }
        }

        self.log
            .info(COMPONENT, &format!("Destroyed address space for {}", task));
        true
    }

    /// Maps `page` to a freshly allocated frame
    ///
    /// Fails on a missing address space, an already-present entry, or
    /// frame exhaustion. Returns the simulated physical address of the
    /// mapped frame.
    pub fn allocate_page(
        &mut self,
        task: TaskId,
        page: PageNumber,
        protection: Protection,
    ) -> Option<PhysicalAddress> {
        let Some(table) = self.page_tables.get_mut(&task) else {
            self.log
                .error(COMPONENT, &format!("No address space for {}", task));
            return None;
        };

        if table.entries.get(&page).is_some_and(|entry| entry.present) {
            self.log
                .warn(COMPONENT, &format!("{} already allocated", page));
            return None;
        }

        let Some(frame_index) = self.frames.first_clear() else {
            self.log.error(COMPONENT, "Out of physical memory");
            return None;
        };
        self.frames.set(frame_index);
        let frame = FrameNumber::new(frame_index as u32);

        table.entries.insert(
            page,
            PageTableEntry {
                frame,
                present: true,
                dirty: false,
                accessed: false,
                protection,
            },
        );
        self.total_allocated_pages += 1;

        self.log.debug(
            COMPONENT,
            &format!("Allocated {} -> {} for {}", page, frame, task),
        );
        Some(PhysicalAddress::of_frame(frame.as_u32()))
    }

    /// Unmaps a present page and releases its frame
    pub fn free_page(&mut self, task: TaskId, page: PageNumber) -> bool {
        let Some(table) = self.page_tables.get_mut(&task) else {
            return false;
        };
        if !table.entries.get(&page).is_some_and(|entry| entry.present) {
            return false;
        }
        let Some(entry) = table.entries.remove(&page) else {
            return false;
        };
        self.free_frame(entry.frame);
        self.total_allocated_pages -= 1;

        self.log
            .debug(COMPONENT, &format!("Freed {} for {}", page, task));
        true
    }

    /// Looks up the frame backing a present page, marking it accessed
    pub fn translate_address(&mut self, task: TaskId, page: PageNumber) -> Option<FrameNumber> {
        let entry = self.page_tables.get_mut(&task)?.entries.get_mut(&page)?;
        if !entry.present {
            return None;
        }
        entry.accessed = true;
        Some(entry.frame)
    }

    /// Services a fault by lazily allocating the missing page
    pub fn handle_page_fault(&mut self, task: TaskId, page: PageNumber) -> bool {
        self.page_fault_count += 1;
        self.log
            .debug(COMPONENT, &format!("Page fault for {} at {}", task, page));
        self.allocate_page(task, page, Protection::READ_WRITE)
            .is_some()
    }

    /// Replaces the protection bits on an existing entry
    pub fn set_protection(&mut self, task: TaskId, page: PageNumber, protection: Protection) -> bool {
        let Some(entry) = self
            .page_tables
            .get_mut(&task)
            .and_then(|table| table.entries.get_mut(&page))
        else {
            return false;
        };
        entry.protection = protection;
        true
    }

    /// Reads the protection bits of an existing entry
    pub fn get_protection(&self, task: TaskId, page: PageNumber) -> Option<Protection> {
        Some(
            self.page_tables
                .get(&task)?
                .entries
                .get(&page)?
                .protection,
        )
    }

    /// Number of unallocated frames
    pub fn free_frame_count(&self) -> usize {
        TOTAL_PHYSICAL_FRAMES - self.frames.count()
    }

    /// Number of allocated frames
    pub fn used_frame_count(&self) -> usize {
        self.frames.count()
    }

    /// Bytes of present pages mapped for `task`
    pub fn task_memory_usage(&self, task: TaskId) -> usize {
        self.page_tables
            .get(&task)
            .map_or(0, |table| table.present_count() * PAGE_SIZE)
    }

    /// Total faults serviced
    pub fn page_fault_count(&self) -> u64 {
        self.page_fault_count
    }

    /// Borrow a task's page table (inspection only)
    pub fn page_table(&self, task: TaskId) -> Option<&PageTable> {
        self.page_tables.get(&task)
    }

    /// Human-readable status summary
    pub fn report(&self) -> String {
        let mut out = String::new();
        out.push_str("=== Memory Manager Report ===\n");
        let _ = writeln!(
            out,
            "Total Physical Memory: {} KB",
            TOTAL_PHYSICAL_FRAMES * PAGE_SIZE / 1024
        );
        let _ = writeln!(
            out,
            "Used Frames: {} / {}",
            self.used_frame_count(),
            TOTAL_PHYSICAL_FRAMES
        );
        let _ = writeln!(out, "Free Frames: {}", self.free_frame_count());
        let _ = writeln!(out, "Total Allocated Pages: {}", self.total_allocated_pages);
        let _ = writeln!(out, "Page Faults: {}", self.page_fault_count);
        let _ = writeln!(out, "Active Address Spaces: {}", self.page_tables.len());
        out
    }

    /// Formatted page-table dump for one task
    pub fn memory_map(&self, task: TaskId) -> String {
        let Some(table) = self.page_tables.get(&task) else {
            return format!("No address space for {}\n", task);
        };

        let mut out = String::new();
        let _ = writeln!(out, "=== Memory Map for {} ===", task);
        let _ = writeln!(
            out,
            "{:>10} | {:>10} | {:>8} | {:>8} | Protection",
            "VirtPage", "Frame", "Present", "Dirty"
        );
        out.push_str(&"-".repeat(55));
        out.push('\n');
        for (page, entry) in &table.entries {
            let _ = writeln!(
                out,
                "{:>10} | {:>10} | {:>8} | {:>8} | {}",
                page.as_u32(),
                entry.frame.as_u32(),
                if entry.present { "Yes" } else { "No" },
                if entry.dirty { "Yes" } else { "No" },
                entry.protection
            );
        }
        out
    }

    fn free_frame(&mut self, frame: FrameNumber) -> bool {
        let index = frame.as_u32() as usize;
        if index >= TOTAL_PHYSICAL_FRAMES {
            return false;
        }
        self.frames.clear(index);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> MemoryManager {
        MemoryManager::new(Logger::quiet())
    }

    fn t(raw: u32) -> TaskId {
        TaskId::new(raw)
    }

    fn p(raw: u32) -> PageNumber {
        PageNumber::new(raw)
    }

    #[test]
    fn test_address_space_lifecycle() {
        let mut mm = manager();
        assert!(mm.create_address_space(t(1)));
        assert!(!mm.create_address_space(t(1)));
        assert!(mm.destroy_address_space(t(1)));
        assert!(!mm.destroy_address_space(t(1)));
    }

    #[test]
    fn test_page_allocation_and_free_restore_counts() {
        let mut mm = manager();
        mm.create_address_space(t(1));

        let initial_free = mm.free_frame_count();
        assert_eq!(initial_free, TOTAL_PHYSICAL_FRAMES);

        let addr = mm.allocate_page(t(1), p(0), Protection::READ_WRITE);
        assert!(addr.is_some());
        assert_eq!(mm.free_frame_count(), initial_free - 1);
        assert_eq!(mm.used_frame_count(), 1);

        // Duplicate allocation is refused.
        assert!(mm.allocate_page(t(1), p(0), Protection::READ_WRITE).is_none());

        assert!(mm.free_page(t(1), p(0)));
        assert_eq!(mm.free_frame_count(), initial_free);
    }

    #[test]
    fn test_allocation_without_address_space_fails() {
        let mut mm = manager();
        assert!(mm.allocate_page(t(1), p(0), Protection::READ_WRITE).is_none());
        assert!(!mm.free_page(t(1), p(0)));
    }

    #[test]
    fn test_first_fit_frame_order() {
        let mut mm = manager();
        mm.create_address_space(t(1));

        mm.allocate_page(t(1), p(10), Protection::READ_WRITE);
        mm.allocate_page(t(1), p(11), Protection::READ_WRITE);
        assert_eq!(mm.translate_address(t(1), p(10)), Some(FrameNumber::new(0)));
        assert_eq!(mm.translate_address(t(1), p(11)), Some(FrameNumber::new(1)));

        // Frame 0 is reused as soon as it is free again.
        mm.free_page(t(1), p(10));
        mm.allocate_page(t(1), p(12), Protection::READ_WRITE);
        assert_eq!(mm.translate_address(t(1), p(12)), Some(FrameNumber::new(0)));
    }

    #[test]
    fn test_physical_address_of_allocated_frame() {
        let mut mm = manager();
        mm.create_address_space(t(1));
        let addr = mm.allocate_page(t(1), p(0), Protection::READ_WRITE).unwrap();
        assert_eq!(addr, PhysicalAddress::of_frame(0));
    }

    #[test]
    fn test_page_lifecycle_round_trip() {
        let mut mm = manager();
        mm.create_address_space(t(1));

        assert!(mm.translate_address(t(1), p(5)).is_none());
        let free_before = mm.free_frame_count();

        mm.allocate_page(t(1), p(5), Protection::READ_WRITE).unwrap();
        let frame = mm.translate_address(t(1), p(5)).unwrap();
        assert_eq!(frame, FrameNumber::new(0));

        assert!(mm.free_page(t(1), p(5)));
        assert!(mm.translate_address(t(1), p(5)).is_none());
        assert_eq!(mm.free_frame_count(), free_before);
    }

    #[test]
    fn test_translate_marks_accessed() {
        let mut mm = manager();
        mm.create_address_space(t(1));
        mm.allocate_page(t(1), p(3), Protection::READ_WRITE);

        assert!(!mm.page_table(t(1)).unwrap().entry(p(3)).unwrap().accessed);
        mm.translate_address(t(1), p(3));
        assert!(mm.page_table(t(1)).unwrap().entry(p(3)).unwrap().accessed);
    }

    #[test]
    fn test_protection_get_set() {
        let mut mm = manager();
        mm.create_address_space(t(1));
        mm.allocate_page(t(1), p(0), Protection::READ);

        assert_eq!(mm.get_protection(t(1), p(0)), Some(Protection::READ));
        assert!(mm.set_protection(t(1), p(0), Protection::READ_WRITE));
        assert_eq!(mm.get_protection(t(1), p(0)), Some(Protection::READ_WRITE));

        assert!(!mm.set_protection(t(1), p(9), Protection::READ));
        assert!(mm.get_protection(t(1), p(9)).is_none());
        assert!(mm.get_protection(t(2), p(0)).is_none());
    }

    #[test]
    fn test_page_fault_allocates_lazily() {
        let mut mm = manager();
        mm.create_address_space(t(1));

        assert!(mm.translate_address(t(1), p(100)).is_none());
        assert!(mm.handle_page_fault(t(1), p(100)));
        assert!(mm.translate_address(t(1), p(100)).is_some());
        assert_eq!(mm.page_fault_count(), 1);

        // Faulting on a present page counts but fails.
        assert!(!mm.handle_page_fault(t(1), p(100)));
        assert_eq!(mm.page_fault_count(), 2);
    }

    #[test]
    fn test_destroy_releases_frames() {
        let mut mm = manager();
        mm.create_address_space(t(1));
        for page in 0..8 {
            mm.allocate_page(t(1), p(page), Protection::READ_WRITE);
        }
        assert_eq!(mm.used_frame_count(), 8);

        mm.destroy_address_space(t(1));
        assert_eq!(mm.used_frame_count(), 0);
        assert_eq!(mm.free_frame_count(), TOTAL_PHYSICAL_FRAMES);
    }

    #[test]
    fn test_exhaustion_across_tasks() {
        let mut mm = manager();
        mm.create_address_space(t(1));
        mm.create_address_space(t(2));

        // Split the whole pool between two tasks.
        for page in 0..512 {
            assert!(mm.allocate_page(t(1), p(page), Protection::READ_WRITE).is_some());
        }
        for page in 0..512 {
            assert!(mm.allocate_page(t(2), p(page), Protection::READ_WRITE).is_some());
        }
        assert_eq!(mm.free_frame_count(), 0);

        // The 1025th page cannot be mapped by anyone.
        assert!(mm.allocate_page(t(1), p(512), Protection::READ_WRITE).is_none());
        assert!(mm.allocate_page(t(2), p(512), Protection::READ_WRITE).is_none());
    }

    #[test]
    fn test_task_memory_usage() {
        let mut mm = manager();
        mm.create_address_space(t(1));
        assert_eq!(mm.task_memory_usage(t(1)), 0);

        mm.allocate_page(t(1), p(0), Protection::READ_WRITE);
        mm.allocate_page(t(1), p(1), Protection::READ_WRITE);
        assert_eq!(mm.task_memory_usage(t(1)), 2 * PAGE_SIZE);
        assert_eq!(mm.task_memory_usage(t(9)), 0);
    }

    #[test]
    fn test_report_and_memory_map() {
        let mut mm = manager();
        mm.create_address_space(t(1));
        mm.allocate_page(t(1), p(0), Protection::READ_WRITE);

        let report = mm.report();
        assert!(report.contains("Used Frames: 1 / 1024"));
        assert!(report.contains("Active Address Spaces: 1"));

        let map = mm.memory_map(t(1));
        assert!(map.contains("rw-"));
        assert!(mm.memory_map(t(9)).contains("No address space"));
    }
}
