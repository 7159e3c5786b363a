//! The static device descriptor table and driver dispatch
//!
//! When the tree walk finalizes a node, [`DriverDispatch`] matches the node's
//! identity against [`DEVICE_TABLE`] in first-match order. A match maps the
//! descriptor's MMIO window(s) through the [`AddressMapper`] collaborator and
//! invokes the driver's init routine. Most nodes match nothing and are
//! silently skipped; a failing driver is recorded but never blocks the rest
//! of the walk.

use crate::board;
use crate::drivers::gic400::{GIC400_CPU, GIC400_DISTRIBUTOR};
use crate::memory::{AddressMapper, MemoryKind, MemoryWindow};
use devtree::fdt::tree::{DeviceNode, NodeVisitor};
use thiserror_no_std::Error;

/// The status a driver init routine reports back to bring-up
#[derive(Debug, Error, Eq, PartialEq)]
#[error("driver initialization failed: {reason}")]
pub struct DriverInitError {
    pub reason: &'static str,
}

/// The init contract every platform driver satisfies.
///
/// `init` takes no arguments; everything a driver needs to know is fixed at
/// build time through its descriptor.
pub trait DeviceDriver: Sync {
    /// Compatibility string / display name of this driver
    fn name(&self) -> &'static str;

    /// Bring the device into an operational state
    fn init(&self) -> Result<(), DriverInitError>;
}

/// A build-time pairing of an expected device identity with the memory
/// windows its driver needs mapped and the driver itself
pub struct DeviceDescriptor {
    /// Node name (without unit address) this descriptor matches
    pub name: &'static str,
    /// Alternative match on the node's `compatible` property. A string
    /// shared by several devices cannot tell them apart under first-match
    /// lookup; such devices must match by name instead.
    pub compatible: Option<&'static str>,
    /// The MMIO window the driver needs mapped
    pub mmio: MemoryWindow,
    /// An optional secondary memory window
    pub mem: Option<MemoryWindow>,
    /// The driver to start once the windows are mapped
    pub driver: &'static dyn DeviceDriver,
}

/// One slot of the device table.
///
/// The table ends with an explicit [`DeviceTableEntry::End`] terminator and
/// is always scanned up to it, never by slice length.
pub enum DeviceTableEntry {
    Device(DeviceDescriptor),
    End,
}

/// The devices this platform knows how to bring up.
///
/// Both GIC400 register banks advertise the same `compatible` string, so
/// the entries match on the node base name only.
pub static DEVICE_TABLE: &[DeviceTableEntry] = &[
    DeviceTableEntry::Device(DeviceDescriptor {
        name: "gic-dist",
        compatible: None,
        mmio: MemoryWindow::new(
            board::GIC400_DISTRIBUTOR_BASE,
            board::GIC400_WINDOW_SIZE,
            MemoryKind::Device,
        ),
        mem: None,
        driver: &GIC400_DISTRIBUTOR,
    }),
    DeviceTableEntry::Device(DeviceDescriptor {
        name: "gic-cpu",
        compatible: None,
        mmio: MemoryWindow::new(
            board::GIC400_CPU_BASE,
            board::GIC400_WINDOW_SIZE,
            MemoryKind::Device,
        ),
        mem: None,
        driver: &GIC400_CPU,
    }),
    DeviceTableEntry::End,
];

/// Find the first descriptor in `table` matching `node`, scanning up to the
/// terminator entry
pub fn lookup<'t>(table: &'t [DeviceTableEntry], node: &DeviceNode) -> Option<&'t DeviceDescriptor> {
    for entry in table {
        match entry {
            DeviceTableEntry::End => return None,
            DeviceTableEntry::Device(descriptor) => {
                if descriptor_matches(descriptor, node) {
                    return Some(descriptor);
                }
            }
        }
    }
    None
}

fn descriptor_matches(descriptor: &DeviceDescriptor, node: &DeviceNode) -> bool {
    if node.unit_name() == descriptor.name {
        return true;
    }
    match descriptor.compatible {
        Some(compatible) => node_is_compatible(node, compatible),
        None => false,
    }
}

/// Whether the node's `compatible` stringlist contains `compatible`
fn node_is_compatible(node: &DeviceNode, compatible: &str) -> bool {
    match node.prop("compatible") {
        Some(prop) => prop
            .value
            .split(|byte| *byte == 0)
            .any(|entry| entry == compatible.as_bytes()),
        None => false,
    }
}

/// The visitor fed by the tree walk: matches every finalized node and starts
/// the drivers of matched devices
pub struct DriverDispatch<'t, 'm, M: AddressMapper> {
    table: &'t [DeviceTableEntry],
    mapper: &'m mut M,
    started: usize,
    failed: usize,
}

impl<'m, M: AddressMapper> DriverDispatch<'static, 'm, M> {
    pub fn new(mapper: &'m mut M) -> Self {
        Self::with_table(DEVICE_TABLE, mapper)
    }
}

impl<'t, 'm, M: AddressMapper> DriverDispatch<'t, 'm, M> {
    pub fn with_table(table: &'t [DeviceTableEntry], mapper: &'m mut M) -> Self {
        Self {
            table,
            mapper,
            started: 0,
            failed: 0,
        }
    }

    /// Number of drivers that initialized successfully
    pub fn drivers_started(&self) -> usize {
        self.started
    }

    /// Number of drivers that reported a failure
    pub fn drivers_failed(&self) -> usize {
        self.failed
    }
}

impl<'buf, 't, 'm, M: AddressMapper> NodeVisitor<'buf> for DriverDispatch<'t, 'm, M> {
    fn node_finalized(&mut self, node: &DeviceNode<'buf>) {
        let descriptor = match lookup(self.table, node) {
            Some(descriptor) => descriptor,
            None => return,
        };

        log::info!(
            "device node '{}' matches driver '{}'",
            node.name,
            descriptor.driver.name()
        );
        self.mapper.map_window(descriptor.mmio);
        if let Some(mem) = descriptor.mem {
            self.mapper.map_window(mem);
        }

        match descriptor.driver.init() {
            Ok(()) => self.started += 1,
            Err(error) => {
                self.failed += 1;
                log::warn!("driver '{}': {}", descriptor.driver.name(), error);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use align_data::{include_aligned, Align64};
    use devtree::fdt::tree::NodeRegistry;
    use devtree::fdt::Fdt;
    extern crate std;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use std::vec::Vec;

    static DTB: &[u8] = include_aligned!(Align64, "../test/data/bringup.dtb");

    struct CountingDriver {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingDriver {
        const fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    impl DeviceDriver for CountingDriver {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn init(&self) -> Result<(), DriverInitError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                Err(DriverInitError {
                    reason: "forced failure",
                })
            } else {
                Ok(())
            }
        }
    }

    struct RecordingMapper {
        windows: Vec<MemoryWindow>,
    }

    impl AddressMapper for RecordingMapper {
        fn map_window(&mut self, window: MemoryWindow) {
            self.windows.push(window);
        }

        fn init_address_space(&mut self, _ram_base: u64, _ram_size: u64) {}
    }

    fn descriptor(
        name: &'static str,
        driver: &'static dyn DeviceDriver,
        mmio_base: u64,
    ) -> DeviceTableEntry {
        DeviceTableEntry::Device(DeviceDescriptor {
            name,
            compatible: None,
            mmio: MemoryWindow::new(mmio_base, 0x1000, MemoryKind::Device),
            mem: None,
            driver,
        })
    }

    fn named_node(name: &'static str) -> DeviceNode<'static> {
        let mut node = DeviceNode::EMPTY;
        node.name = name;
        node
    }

    #[test]
    fn first_match_wins_even_if_a_later_entry_would_match() {
        static FIRST: CountingDriver = CountingDriver::new(false);
        static SECOND: CountingDriver = CountingDriver::new(false);
        let table = [
            descriptor("gic-dist", &FIRST, 0x1000),
            descriptor("gic-dist", &SECOND, 0x2000),
            DeviceTableEntry::End,
        ];

        let mut mapper = RecordingMapper { windows: Vec::new() };
        let mut dispatch = DriverDispatch::with_table(&table, &mut mapper);
        dispatch.node_finalized(&named_node("gic-dist@4c0041000"));

        assert_eq!(FIRST.calls.load(Ordering::Relaxed), 1);
        assert_eq!(SECOND.calls.load(Ordering::Relaxed), 0);
        assert_eq!(dispatch.drivers_started(), 1);
        assert_eq!(mapper.windows, [MemoryWindow::new(0x1000, 0x1000, MemoryKind::Device)]);
    }

    #[test]
    fn unmatched_nodes_are_silently_skipped() {
        static DRIVER: CountingDriver = CountingDriver::new(false);
        let table = [descriptor("gic-dist", &DRIVER, 0x1000), DeviceTableEntry::End];

        let mut mapper = RecordingMapper { windows: Vec::new() };
        let mut dispatch = DriverDispatch::with_table(&table, &mut mapper);
        dispatch.node_finalized(&named_node("chosen"));
        dispatch.node_finalized(&named_node("memory@0"));

        assert_eq!(DRIVER.calls.load(Ordering::Relaxed), 0);
        assert_eq!(dispatch.drivers_started(), 0);
        assert_eq!(dispatch.drivers_failed(), 0);
        assert!(mapper.windows.is_empty());
    }

    #[test]
    fn a_failing_driver_is_recorded_but_does_not_block_others() {
        static FAILING: CountingDriver = CountingDriver::new(true);
        static WORKING: CountingDriver = CountingDriver::new(false);
        let table = [
            descriptor("broken", &FAILING, 0x1000),
            descriptor("working", &WORKING, 0x2000),
            DeviceTableEntry::End,
        ];

        let mut mapper = RecordingMapper { windows: Vec::new() };
        let mut dispatch = DriverDispatch::with_table(&table, &mut mapper);
        dispatch.node_finalized(&named_node("broken"));
        dispatch.node_finalized(&named_node("working"));

        assert_eq!(dispatch.drivers_failed(), 1);
        assert_eq!(dispatch.drivers_started(), 1);
        assert_eq!(WORKING.calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn lookup_stops_at_the_terminator() {
        static HIDDEN: CountingDriver = CountingDriver::new(false);
        // an entry after the terminator must never be reached
        let table = [
            DeviceTableEntry::End,
            descriptor("gic-dist", &HIDDEN, 0x1000),
        ];
        assert!(lookup(&table, &named_node("gic-dist")).is_none());
    }

    #[test]
    fn each_gic_node_resolves_to_its_own_descriptor() {
        let fdt = Fdt::from_buffer(DTB).unwrap();
        let mut registry: NodeRegistry = NodeRegistry::new();
        let mut matches: Vec<(&str, u64)> = Vec::new();
        fdt.walk(&mut registry, &mut |node: &DeviceNode<'static>| {
            if let Some(descriptor) = lookup(DEVICE_TABLE, node) {
                matches.push((node.unit_name(), descriptor.mmio.base));
            }
        })
        .unwrap();

        // both register banks bind their own entry despite sharing the
        // "arm,gic-400" compatible string in the blob
        assert_eq!(
            matches,
            [
                ("gic-dist", board::GIC400_DISTRIBUTOR_BASE),
                ("gic-cpu", board::GIC400_CPU_BASE),
            ]
        );
    }

    #[test]
    fn builtin_table_is_terminated() {
        assert!(matches!(DEVICE_TABLE.last(), Some(DeviceTableEntry::End)));
    }
}
