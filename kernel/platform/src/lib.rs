//! Platform specific initialization.
//!
//! This crate performs the early bring-up pass that runs once, before any
//! scheduler or second execution context exists: it derives the physical
//! memory layout, discovers the hardware topology from the firmware-provided
//! device tree blob, starts the drivers of known devices and hands the usable
//! RAM extent to the address-mapping subsystem.
#![no_std]

pub mod board;
pub mod bootstrap;
pub mod devices;
pub mod drivers;
pub mod logging;
pub mod memory;

pub use bootstrap::{platform_init, BringUpReport, PlatformError};
pub use devices::{DeviceDescriptor, DeviceDriver, DeviceTableEntry, DriverInitError};
pub use memory::{AddressMapper, MemoryKind, MemoryMap, MemoryRegionEntry, MemoryWindow};
