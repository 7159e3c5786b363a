//! Board-level layout constants
//!
//! These mirror what the boot firmware and the linker script guarantee about
//! the platform and are the single place such numbers live.

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

/// Physical address at which the firmware places the device tree blob
pub const DTB_LOAD_ADDR: usize = 0x4000_0000;

/// Start of the area the boot image occupies, backed one-to-one by physical
/// memory by the linker script
pub const ROM_AREA_BASE: u64 = 0x0;

/// Size of the boot image area
pub const ROM_AREA_SIZE: u64 = MIB;

/// Total installed RAM on this board
pub const TOTAL_RAM_SIZE: u64 = GIB + 16 * MIB;

/// Slice at the top of RAM that stays with the firmware and must never be
/// handed to the memory manager
pub const FIRMWARE_RESERVED_SIZE: u64 = MIB;

/// MMIO window of the GIC400 distributor
pub const GIC400_DISTRIBUTOR_BASE: u64 = 0x4_c004_1000;

/// MMIO window of the GIC400 CPU interface
pub const GIC400_CPU_BASE: u64 = 0x4_c004_2000;

/// Both GIC400 register banks are one small page large
pub const GIC400_WINDOW_SIZE: u64 = 4 * KIB;
