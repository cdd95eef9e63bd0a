//! # Memory Types
//!
//! Shared memory constants and the page protection bitfield.
//!
//! ## Philosophy
//!
//! - **Protection is recorded, not enforced**: the simulator tracks what
//!   a page would permit, it does not trap accesses.
//! - **Deterministic behavior preserved in simulation**: sizes and frame
//!   counts are fixed constants, not probed from the host.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of one page (and one physical frame), in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Number of physical frames in the simulated machine (4 MiB of RAM).
pub const TOTAL_PHYSICAL_FRAMES: usize = 1024;

bitflags! {
    /// Page protection bits
    ///
    /// A bitfield over read, write, and execute. `Protection::empty()`
    /// corresponds to "no access".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Protection: u8 {
        const READ = 1;
        const WRITE = 2;
        const EXECUTE = 4;

        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
        const READ_EXECUTE = Self::READ.bits() | Self::EXECUTE.bits();
        const ALL = Self::READ.bits() | Self::WRITE.bits() | Self::EXECUTE.bits();
    }
}

impl fmt::Display for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.contains(Protection::READ) { 'r' } else { '-' };
        let w = if self.contains(Protection::WRITE) { 'w' } else { '-' };
        let x = if self.contains(Protection::EXECUTE) { 'x' } else { '-' };
        write!(f, "{}{}{}", r, w, x)
    }
}

/// A simulated physical address
///
/// Computed as `frame * PAGE_SIZE` from arena base zero. Nothing in the
/// simulation dereferences these; they exist so allocation results look
/// like addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    /// Creates an address from a raw value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Computes the address of the first byte of a frame
    pub const fn of_frame(frame: u32) -> Self {
        Self(frame as u64 * PAGE_SIZE as u64)
    }

    /// Returns the raw value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protection_bits() {
        assert_eq!(Protection::READ.bits(), 1);
        assert_eq!(Protection::WRITE.bits(), 2);
        assert_eq!(Protection::EXECUTE.bits(), 4);
        assert_eq!(Protection::READ_WRITE.bits(), 3);
        assert_eq!(Protection::empty().bits(), 0);
    }

    #[test]
    fn test_protection_display() {
        assert_eq!(format!("{}", Protection::READ_WRITE), "rw-");
        assert_eq!(format!("{}", Protection::ALL), "rwx");
        assert_eq!(format!("{}", Protection::empty()), "---");
    }

    #[test]
    fn test_physical_address_of_frame() {
        assert_eq!(PhysicalAddress::of_frame(0).as_u64(), 0);
        assert_eq!(PhysicalAddress::of_frame(3).as_u64(), 3 * PAGE_SIZE as u64);
    }

    #[test]
    fn test_total_memory_is_four_mib() {
        assert_eq!(TOTAL_PHYSICAL_FRAMES * PAGE_SIZE, 4 * 1024 * 1024);
    }
}
