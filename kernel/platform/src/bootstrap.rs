//! Platform bring-up orchestration
//!
//! Runs exactly once per boot: build the physical memory map, parse the
//! firmware device tree, start the drivers of known devices and hand the
//! usable RAM extent to the address-mapping subsystem. There is no recovery
//! path; a malformed blob or inconsistent memory map means the machine is
//! unbootable and the error is propagated for the caller to halt on.

use crate::board;
use crate::devices::DriverDispatch;
use crate::memory::{AddressMapper, MemoryMap, MemoryMapError, MemoryWindow};
use devtree::fdt::tree::NodeRegistry;
use devtree::fdt::{Fdt, FdtError, FdtHeader};
use thiserror_no_std::Error;

/// Errors that abort bring-up
#[derive(Debug, Error, Eq, PartialEq)]
pub enum PlatformError {
    /// The firmware device tree blob is malformed
    #[error("Could not parse the firmware device tree: {0}")]
    DeviceTree(#[from] FdtError),
    /// The computed memory map is inconsistent
    #[error("Could not build the platform memory map: {0}")]
    MemoryMap(#[from] MemoryMapError),
}

/// The outcome of a completed bring-up pass
#[derive(Debug, Eq, PartialEq)]
pub struct BringUpReport {
    /// Number of device nodes discovered and finalized
    pub nodes: usize,
    /// Number of drivers that initialized successfully
    pub drivers_started: usize,
    /// Number of drivers that reported a failure
    pub drivers_failed: usize,
    /// The general RAM region handed to the memory manager
    pub ram: MemoryWindow,
}

impl BringUpReport {
    /// Whether the whole pass succeeded, i.e. the tree parsed (implied) and
    /// every invoked driver initialized
    pub fn all_ok(&self) -> bool {
        self.drivers_failed == 0
    }
}

/// Perform platform bring-up from a device tree blob.
///
/// The node tree is built inside `registry`, which the caller owns; a
/// secondary bring-up pass (e.g. on another core) needs its own registry.
pub fn platform_init<'buf, M, const CAPACITY: usize>(
    blob: &'buf [u8],
    registry: &mut NodeRegistry<'buf, CAPACITY>,
    mapper: &mut M,
) -> Result<BringUpReport, PlatformError>
where
    M: AddressMapper,
{
    let memory_map = MemoryMap::build()?;
    let ram = memory_map.general_ram();
    log::debug!(
        "platform memory map ready, general ram {:#x}..{:#x}",
        ram.base,
        ram.end()
    );

    let fdt = Fdt::from_buffer(blob)?;
    log::debug!(
        "parsing device tree blob ({} bytes of structure)",
        fdt.header.size_dt_struct
    );

    let mut dispatch = DriverDispatch::new(mapper);
    fdt.walk(registry, &mut dispatch).map_err(FdtError::from)?;
    let drivers_started = dispatch.drivers_started();
    let drivers_failed = dispatch.drivers_failed();

    mapper.init_address_space(ram.base, ram.size);

    let report = BringUpReport {
        nodes: registry.len(),
        drivers_started,
        drivers_failed,
        ram,
    };
    log::info!(
        "platform bring-up complete: {} nodes, {} drivers started, {} failed",
        report.nodes,
        report.drivers_started,
        report.drivers_failed
    );
    Ok(report)
}

/// Perform platform bring-up from the blob the firmware placed at
/// [`board::DTB_LOAD_ADDR`].
///
/// # Safety
/// The load address must hold a readable device tree blob whose declared
/// total size stays within readable memory, and that memory must stay valid
/// for as long as `registry` is used.
pub unsafe fn platform_init_from_ptr<M, const CAPACITY: usize>(
    registry: &mut NodeRegistry<'static, CAPACITY>,
    mapper: &mut M,
) -> Result<BringUpReport, PlatformError>
where
    M: AddressMapper,
{
    let ptr = board::DTB_LOAD_ADDR as *const u8;
    let header = FdtHeader::from_ptr(ptr).map_err(FdtError::from)?;
    let blob = core::slice::from_raw_parts::<u8>(ptr, header.total_size as usize);
    platform_init(blob, registry, mapper)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::devices::{DeviceDescriptor, DeviceTableEntry, DriverDispatch};
    use crate::drivers::gic400::GIC400_DISTRIBUTOR;
    use crate::memory::MemoryKind;
    use align_data::{include_aligned, Align64};
    use devtree::fdt::tree::NodeRegistry;
    extern crate std;
    use std::vec::Vec;

    static MINIMAL_DTB: &[u8] = include_aligned!(Align64, "../test/data/minimal.dtb");
    static BRINGUP_DTB: &[u8] = include_aligned!(Align64, "../test/data/bringup.dtb");

    struct RecordingMapper {
        windows: Vec<MemoryWindow>,
        ram: Option<(u64, u64)>,
    }

    impl RecordingMapper {
        fn new() -> Self {
            Self {
                windows: Vec::new(),
                ram: None,
            }
        }
    }

    impl AddressMapper for RecordingMapper {
        fn map_window(&mut self, window: MemoryWindow) {
            self.windows.push(window);
        }

        fn init_address_space(&mut self, ram_base: u64, ram_size: u64) {
            self.ram = Some((ram_base, ram_size));
        }
    }

    #[test]
    fn two_node_tree_starts_exactly_one_driver() {
        let mut registry: NodeRegistry = NodeRegistry::new();
        let mut mapper = RecordingMapper::new();
        let report = platform_init(MINIMAL_DTB, &mut registry, &mut mapper).unwrap();

        assert_eq!(report.nodes, 2);
        assert_eq!(report.drivers_started, 1);
        assert_eq!(report.drivers_failed, 0);
        assert!(report.all_ok());

        // the gic-dist descriptor's MMIO window was handed to the mapper
        assert_eq!(
            mapper.windows,
            [MemoryWindow::new(
                board::GIC400_DISTRIBUTOR_BASE,
                board::GIC400_WINDOW_SIZE,
                MemoryKind::Device
            )]
        );
    }

    #[test]
    fn usable_ram_extent_reaches_the_address_mapper() {
        let mut registry: NodeRegistry = NodeRegistry::new();
        let mut mapper = RecordingMapper::new();
        let report = platform_init(MINIMAL_DTB, &mut registry, &mut mapper).unwrap();

        let expected_size =
            board::TOTAL_RAM_SIZE - board::FIRMWARE_RESERVED_SIZE - board::ROM_AREA_SIZE;
        assert_eq!(mapper.ram, Some((board::ROM_AREA_SIZE, expected_size)));
        assert_eq!(report.ram.size, expected_size);
    }

    #[test]
    fn full_fixture_starts_both_gic_drivers() {
        let mut registry: NodeRegistry = NodeRegistry::new();
        let mut mapper = RecordingMapper::new();
        let report = platform_init(BRINGUP_DTB, &mut registry, &mut mapper).unwrap();

        assert_eq!(report.nodes, 4);
        assert_eq!(report.drivers_started, 2);
        assert_eq!(report.drivers_failed, 0);

        // each register bank is mapped exactly once, at its own base; nodes
        // finalize in declaration order so the distributor comes first
        assert_eq!(
            mapper.windows,
            [
                MemoryWindow::new(
                    board::GIC400_DISTRIBUTOR_BASE,
                    board::GIC400_WINDOW_SIZE,
                    MemoryKind::Device
                ),
                MemoryWindow::new(
                    board::GIC400_CPU_BASE,
                    board::GIC400_WINDOW_SIZE,
                    MemoryKind::Device
                ),
            ]
        );
    }

    #[test]
    fn a_malformed_blob_aborts_bring_up() {
        #[repr(C, align(8))]
        struct AlignedBuffer([u8; 64]);

        let mut blob = AlignedBuffer([0u8; 64]);
        blob.0.copy_from_slice(&MINIMAL_DTB[..64]);
        blob.0[0] = 0; // destroy the magic

        let mut registry: NodeRegistry = NodeRegistry::new();
        let mut mapper = RecordingMapper::new();
        let result = platform_init(&blob.0[..], &mut registry, &mut mapper);
        assert!(matches!(
            result,
            Err(PlatformError::DeviceTree(FdtError::HeaderParseError(_)))
        ));
        // nothing was mapped and no ram extent was handed over
        assert!(mapper.windows.is_empty());
        assert_eq!(mapper.ram, None);
    }

    #[test]
    fn compatible_string_matches_when_the_name_does_not() {
        // a descriptor whose name matches no node but whose compatible
        // string matches both gic nodes of the fixture
        let table = [
            DeviceTableEntry::Device(DeviceDescriptor {
                name: "interrupt-controller",
                compatible: Some("arm,gic-400"),
                mmio: MemoryWindow::new(0x1000, 0x1000, MemoryKind::Device),
                mem: None,
                driver: &GIC400_DISTRIBUTOR,
            }),
            DeviceTableEntry::End,
        ];

        let fdt = Fdt::from_buffer(BRINGUP_DTB).unwrap();
        let mut registry: NodeRegistry = NodeRegistry::new();
        let mut mapper = RecordingMapper::new();
        let mut dispatch = DriverDispatch::with_table(&table, &mut mapper);
        fdt.walk(&mut registry, &mut dispatch).unwrap();

        assert_eq!(dispatch.drivers_started(), 2);
    }
}
