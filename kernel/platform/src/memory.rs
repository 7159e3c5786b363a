//! The platform's physical memory map
//!
//! Downstream consumers scan the memory region table until they see its
//! terminator entry; the table is deliberately not length-driven so it stays
//! compatible with firmware-shaped tables of the same form.

use crate::board;
use thiserror_no_std::Error;

/// How a physical range may be used
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum MemoryKind {
    /// Normal, cacheable memory usable by the memory manager
    Normal,
    /// Device-mapped memory (MMIO); never handed to the allocator
    Device,
}

/// One contiguous physical range
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct MemoryWindow {
    pub base: u64,
    pub size: u64,
    pub kind: MemoryKind,
}

impl MemoryWindow {
    pub const fn new(base: u64, size: u64, kind: MemoryKind) -> Self {
        Self { base, size, kind }
    }

    /// The first address past this window
    pub fn end(&self) -> u64 {
        self.base + self.size
    }
}

/// One slot of the platform memory table.
///
/// The terminator is an explicit variant rather than an all-bits-invalid
/// marker, but iteration still follows the terminator-scan contract.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum MemoryRegionEntry {
    Region(MemoryWindow),
    Terminator,
}

/// Errors that make the computed memory map unusable.
///
/// These are fatal: the memory manager cannot be initialized from a bad map.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum MemoryMapError {
    #[error("The installed RAM ({total} bytes) cannot hold the boot image and the reserved firmware slice ({reserved} bytes)")]
    RamTooSmall { total: u64, reserved: u64 },
}

/// The fixed three-entry table describing the platform's physical memory
/// layout: the boot/ROM image area, the general RAM area and the terminator.
#[derive(Debug, Eq, PartialEq)]
pub struct MemoryMap {
    entries: [MemoryRegionEntry; 3],
    ram: MemoryWindow,
}

impl MemoryMap {
    /// Build the memory map from the board constants
    pub fn build() -> Result<Self, MemoryMapError> {
        Self::compute(
            MemoryWindow::new(board::ROM_AREA_BASE, board::ROM_AREA_SIZE, MemoryKind::Normal),
            board::TOTAL_RAM_SIZE,
            board::FIRMWARE_RESERVED_SIZE,
        )
    }

    /// Compute the map for a given boot image window, installed RAM size and
    /// reserved top slice.
    ///
    /// The general RAM region starts right after the boot image and ends
    /// below the reserved slice, so the boot image is never counted twice and
    /// the reserved slice is excluded entirely.
    pub fn compute(
        rom: MemoryWindow,
        total_ram: u64,
        reserved_top: u64,
    ) -> Result<Self, MemoryMapError> {
        let ram_base = rom.end();
        let ram_size = total_ram
            .checked_sub(reserved_top)
            .and_then(|usable| usable.checked_sub(ram_base))
            .filter(|size| *size > 0)
            .ok_or(MemoryMapError::RamTooSmall {
                total: total_ram,
                reserved: reserved_top,
            })?;

        let ram = MemoryWindow::new(ram_base, ram_size, MemoryKind::Normal);
        Ok(Self {
            entries: [
                MemoryRegionEntry::Region(rom),
                MemoryRegionEntry::Region(ram),
                MemoryRegionEntry::Terminator,
            ],
            ram,
        })
    }

    /// Iterate the mapped regions, stopping at the terminator entry
    pub fn regions(&self) -> impl Iterator<Item = &MemoryWindow> {
        self.entries.iter().map_while(|entry| match entry {
            MemoryRegionEntry::Region(window) => Some(window),
            MemoryRegionEntry::Terminator => None,
        })
    }

    /// The raw table including its terminator, in the boundary format
    pub fn entries(&self) -> &[MemoryRegionEntry; 3] {
        &self.entries
    }

    /// The general RAM region handed to the memory manager
    pub fn general_ram(&self) -> MemoryWindow {
        self.ram
    }
}

/// The seam to the address-mapping subsystem.
///
/// Bring-up only supplies base, size and type of each range; what mapping
/// means (page tables, attributes) is entirely the implementer's concern.
pub trait AddressMapper {
    /// Make one physical window accessible to the kernel
    fn map_window(&mut self, window: MemoryWindow);

    /// Receive the final usable-RAM extent; called exactly once, at the end
    /// of bring-up
    fn init_address_space(&mut self, ram_base: u64, ram_size: u64);
}
