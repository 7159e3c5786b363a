//! Flattened Device Tree (Device-Tree-Blob) handling
//!
//! The DTB format encodes the hardware description within a single, linear,
//! pointerless data structure: a small header (see [Spec Section 5.2](https://devicetree-specification.readthedocs.io/en/latest/chapter5-flattened-format.html#sect-fdt-structure-block)),
//! followed by the memory reservation block, the structure block and the
//! strings block, each at an offset declared by the header.
//!
//! [`Fdt`] validates the header and locates the blocks; the structure block
//! is then consumed by a [`tree::TreeWalk`] which builds the device node tree
//! inside a caller-provided [`tree::NodeRegistry`].
//!
//! # Example
//!
//! ```rust
//! # use align_data::{include_aligned, Align64};
//! # use devtree::fdt::Fdt;
//! # use devtree::fdt::tree::{DeviceNode, NodeRegistry};
//! # static DTB: &[u8] = include_aligned!(Align64, "../../test/data/bringup.dtb");
//! let fdt = Fdt::from_buffer(DTB).unwrap();
//! let mut registry: NodeRegistry = NodeRegistry::new();
//! let root = fdt.walk(&mut registry, &mut |_: &DeviceNode| {}).unwrap();
//! assert_eq!(registry.get(root).name, "");
//! ```

mod cursor;
mod header;
mod memory_reservation;
mod strings;
pub mod tree;

pub use cursor::{Cursor, CursorError, Token};
pub use header::{FdtHeader, HeaderReadError};
pub use memory_reservation::{
    MemoryReservationBlock, MemoryReservationEntry, MemoryReservationFormatError,
};
pub use strings::{Strings, StringsError};

use thiserror_no_std::Error;
use tree::{NodeHandle, NodeRegistry, NodeVisitor, StructureError};

/// The error that can occur when parsing a FDT
#[derive(Debug, Error, Eq, PartialEq)]
pub enum FdtError {
    /// The FDT header could not be parsed for a specific reason
    #[error("Could not parse the fdt header: {0}")]
    HeaderParseError(#[from] HeaderReadError),
    /// The memory reservation block could not be parsed for a specific reason
    #[error("Could not parse memory reservation block: {0}")]
    MemoryReservationError(#[from] MemoryReservationFormatError),
    /// The structure block could not be walked for a specific reason
    #[error("Could not parse structure block: {0}")]
    StructureError(#[from] StructureError),
    /// A block offset or size declared by the header points outside the blob
    #[error("A block declared by the header lies outside the provided buffer")]
    BlockOutOfBounds,
}

/// A handle to a flattened device tree whose header and block layout have
/// been validated against an underlying buffer
#[derive(Debug)]
pub struct Fdt<'buf> {
    /// Metadata information about the device tree
    pub header: FdtHeader,
    /// Areas of system memory which the firmware reserved
    pub memory_reservations: MemoryReservationBlock<'buf>,
    strings: Strings<'buf>,
    struct_buf: &'buf [u8],
}

impl<'buf> Fdt<'buf> {
    /// Try to parse a FDT from a buffer
    pub fn from_buffer(buf: &'buf [u8]) -> Result<Self, FdtError> {
        let header = FdtHeader::read_from_buffer(buf)?;

        let mem_resv_buf = buf
            .get(header.off_mem_rsvmap as usize..)
            .ok_or(FdtError::BlockOutOfBounds)?;
        let memory_reservations = MemoryReservationBlock::from_buffer(mem_resv_buf)?;

        let strings_buf = buf
            .get(
                header.off_dt_strings as usize
                    ..(header.off_dt_strings as usize + header.size_dt_strings as usize),
            )
            .ok_or(FdtError::BlockOutOfBounds)?;
        let struct_buf = buf
            .get(
                header.off_dt_struct as usize
                    ..(header.off_dt_struct as usize + header.size_dt_struct as usize),
            )
            .ok_or(FdtError::BlockOutOfBounds)?;

        Ok(Self {
            header,
            memory_reservations,
            strings: Strings::from_buffer(strings_buf),
            struct_buf,
        })
    }

    /// Try to read a FDT from a raw pointer
    ///
    /// # Safety
    /// The given pointer must be valid and the backing memory must be readable
    /// for at least 40 bytes after it as well as for the total size the header
    /// declares. The underlying memory must stay valid for as long as the
    /// resulting instance is used.
    pub unsafe fn from_ptr(ptr: *const u8) -> Result<Self, FdtError> {
        let header = FdtHeader::from_ptr(ptr)?;
        let buf = core::slice::from_raw_parts::<u8>(ptr, header.total_size as usize);
        Self::from_buffer(buf)
    }

    /// Build the device node tree inside `registry`, reporting every
    /// completed node to `visitor`, and return the root handle.
    pub fn walk<V, const CAPACITY: usize>(
        &self,
        registry: &mut NodeRegistry<'buf, CAPACITY>,
        visitor: &mut V,
    ) -> Result<NodeHandle, StructureError>
    where
        V: NodeVisitor<'buf>,
    {
        tree::TreeWalk::new(self.struct_buf, self.strings, registry).run(visitor)
    }
}

#[cfg(test)]
mod test {
    use super::tree::{DeviceNode, NodeRegistry};
    use super::*;
    use align_data::{include_aligned, Align64};
    extern crate std;
    use std::vec::Vec;

    static DTB: &[u8] = include_aligned!(Align64, "../../test/data/bringup.dtb");

    #[test]
    fn parsing_the_bringup_fixture_works() {
        let fdt = Fdt::from_buffer(DTB).unwrap();
        assert_eq!(fdt.header.version, 17);
        assert_eq!(fdt.header.last_comp_version, 16);

        let mut registry: NodeRegistry = NodeRegistry::new();
        let root = fdt.walk(&mut registry, &mut |_: &DeviceNode| {}).unwrap();

        assert_eq!(registry.get(root).name, "");
        assert_eq!(registry.len(), 4);

        // newest-first child order: the blob declares memory, gic-dist, gic-cpu
        let children: Vec<&str> = registry
            .children(root)
            .map(|handle| registry.get(handle).unit_name())
            .collect();
        assert_eq!(children, ["gic-cpu", "gic-dist", "memory"]);
    }

    #[test]
    fn fixture_nodes_carry_their_reg_windows() {
        let fdt = Fdt::from_buffer(DTB).unwrap();
        let mut registry: NodeRegistry = NodeRegistry::new();
        let root = fdt.walk(&mut registry, &mut |_: &DeviceNode| {}).unwrap();

        let dist = registry
            .children(root)
            .map(|handle| registry.get(handle))
            .find(|node| node.unit_name() == "gic-dist")
            .unwrap();
        assert_eq!(dist.base_address, 0x4_c004_1000);
        assert_eq!(dist.size, 0x1000);
        assert_eq!(dist.interrupt, 9);
        assert_eq!(dist.prop("compatible").unwrap().as_str(), Ok("arm,gic-400"));
    }

    #[test]
    fn fixture_memory_reservations_are_iterable() {
        let fdt = Fdt::from_buffer(DTB).unwrap();
        let reservations: Vec<_> = fdt.memory_reservations.clone().collect();
        assert_eq!(reservations.len(), 1);
        assert_eq!(reservations[0].address, 0x3f00_0000);
        assert_eq!(reservations[0].size, 0x0010_0000);
    }

    #[test]
    fn dispatch_happens_once_per_node() {
        let fdt = Fdt::from_buffer(DTB).unwrap();
        let mut registry: NodeRegistry = NodeRegistry::new();
        let mut finalized = 0usize;
        fdt.walk(&mut registry, &mut |_: &DeviceNode| finalized += 1)
            .unwrap();
        assert_eq!(finalized, registry.len());
    }
}
