//! Device nodes and their raw properties

use crate::fdt::cursor::{Cursor, Token};
use crate::fdt::strings::Strings;
use thiserror_no_std::Error;

/// The sentinel stored in [`DeviceNode::interrupt`] while no `interrupts`
/// property has been seen. Reserved, never a valid interrupt number.
pub const INTERRUPT_UNSET: u32 = u32::MAX;

/// A stable index into a [`NodeRegistry`](super::registry::NodeRegistry) slot.
///
/// Handles are only ever created by the registry itself, so a handle always
/// refers to an allocated slot.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct NodeHandle(pub(super) u16);

impl NodeHandle {
    /// The slot index this handle refers to
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// One node of the hardware description tree.
///
/// Nodes are allocated from a registry pool when their `FDT_BEGIN_NODE` token
/// is read and are never freed afterwards; all structural links are stored as
/// registry handles. A parent's child list is ordered newest-first because
/// children are prepended as they are discovered.
#[derive(Debug, Copy, Clone)]
pub struct DeviceNode<'buf> {
    /// The node name as stored in the blob, including the unit address suffix
    pub name: &'buf str,
    /// Back-reference to the owning parent; `None` only for the root node
    pub parent: Option<NodeHandle>,
    /// Head of the child list (the most recently opened child)
    pub first_child: Option<NodeHandle>,
    /// Tail of the child list (the first child that was discovered)
    pub last_child: Option<NodeHandle>,
    /// The next node in the parent's child list
    pub next_sibling: Option<NodeHandle>,
    /// The previous node in the parent's child list
    pub prev_sibling: Option<NodeHandle>,
    /// Base address captured from the node's `reg` property
    pub base_address: u64,
    /// Size captured from the node's `reg` property
    pub size: u64,
    /// Byte offset of the node's begin token within the structure block
    pub offset: u64,
    /// Interrupt number captured from the node's `interrupts` property,
    /// [`INTERRUPT_UNSET`] while absent
    pub interrupt: u32,

    /// The structure block this node's property records live in
    props_buf: &'buf [u8],
    props_start: usize,
    props_end: usize,
    strings: Strings<'buf>,
}

impl<'buf> DeviceNode<'buf> {
    /// An unallocated slot: all links empty, payload zeroed, interrupt at its
    /// unset sentinel.
    pub const EMPTY: DeviceNode<'buf> = DeviceNode {
        name: "",
        parent: None,
        first_child: None,
        last_child: None,
        next_sibling: None,
        prev_sibling: None,
        base_address: 0,
        size: 0,
        offset: 0,
        interrupt: INTERRUPT_UNSET,
        props_buf: &[],
        props_start: 0,
        props_end: 0,
        strings: Strings::empty(),
    };

    /// The node name with its `@unit-address` suffix stripped
    pub fn unit_name(&self) -> &'buf str {
        match self.name.split_once('@') {
            Some((base, _)) => base,
            None => self.name,
        }
    }

    /// Whether an `interrupts` property has been captured for this node
    pub fn has_interrupt(&self) -> bool {
        self.interrupt != INTERRUPT_UNSET
    }

    /// Iterate over the raw property records of this node in declaration order
    pub fn props(&self) -> PropertyIter<'buf> {
        let span = self
            .props_buf
            .get(self.props_start..self.props_end)
            .unwrap_or(&[]);
        PropertyIter {
            cursor: Cursor::new(span),
            strings: self.strings,
        }
    }

    /// Look up a property by name
    pub fn prop(&self, name: &str) -> Option<RawProperty<'buf>> {
        self.props().find(|prop| prop.name == Some(name))
    }

    /// Attach the buffers that property records of this node resolve against
    pub(super) fn set_source(&mut self, struct_buf: &'buf [u8], strings: Strings<'buf>) {
        self.props_buf = struct_buf;
        self.strings = strings;
    }

    /// Record one more property record covering `start..end` of the structure
    /// block. Records of one node are consecutive, so the span only ever grows
    /// at its end.
    pub(super) fn note_property(&mut self, start: usize, end: usize) {
        if self.props_start == self.props_end {
            self.props_start = start;
        }
        self.props_end = end;
    }
}

/// The error returned when a property value has the wrong length for a
/// requested scalar view
#[derive(Debug, Error, Eq, PartialEq)]
#[error("The raw property value has an invalid length for this conversion")]
pub struct InvalidValueLength;

/// Errors that can occur when viewing a property value as a string
#[derive(Debug, Error, Eq, PartialEq)]
pub enum StringValueError {
    #[error("The raw property value is not null-terminated")]
    NoNullTerminator,
    #[error("The raw property value is not valid UTF-8")]
    Utf8Error,
}

/// A single key/value record of a node
#[derive(Debug, Eq, PartialEq)]
pub struct RawProperty<'buf> {
    /// The property name resolved from the strings block, or `None` when the
    /// name offset could not be resolved (the value is still available as
    /// opaque bytes)
    pub name: Option<&'buf str>,
    /// The raw value bytes
    pub value: &'buf [u8],
}

impl<'buf> RawProperty<'buf> {
    /// View the value as one big-endian `u32` cell
    pub fn as_u32(&self) -> Result<u32, InvalidValueLength> {
        let bytes = self.value.try_into().map_err(|_| InvalidValueLength)?;
        Ok(u32::from_be_bytes(bytes))
    }

    /// View the value as one big-endian `u64`
    pub fn as_u64(&self) -> Result<u64, InvalidValueLength> {
        let bytes = self.value.try_into().map_err(|_| InvalidValueLength)?;
        Ok(u64::from_be_bytes(bytes))
    }

    /// View the value as a null-terminated string
    pub fn as_str(&self) -> Result<&'buf str, StringValueError> {
        match self.value.split_last() {
            Some((0, content)) => {
                core::str::from_utf8(content).map_err(|_| StringValueError::Utf8Error)
            }
            _ => Err(StringValueError::NoNullTerminator),
        }
    }
}

/// An iterator over the property records captured for one node
#[derive(Debug, Clone)]
pub struct PropertyIter<'buf> {
    cursor: Cursor<'buf>,
    strings: Strings<'buf>,
}

impl<'buf> Iterator for PropertyIter<'buf> {
    type Item = RawProperty<'buf>;

    fn next(&mut self) -> Option<Self::Item> {
        // the span contains only the node's own property records, possibly
        // interspersed with NOP tokens
        loop {
            match self.cursor.read_token().ok()? {
                Token::Prop => {
                    let len = self.cursor.read_u32().ok()? as usize;
                    let name_off = self.cursor.read_u32().ok()? as usize;
                    let value = self.cursor.read_bytes(len).ok()?;
                    return Some(RawProperty {
                        name: self.strings.get(name_off).ok(),
                        value,
                    });
                }
                Token::Nop => continue,
                _ => return None,
            }
        }
    }
}
