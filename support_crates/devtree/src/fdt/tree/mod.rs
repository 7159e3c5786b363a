//! Construction of the in-memory device node tree from the structure block
//!
//! The structure block is a flat token stream (see [Spec Section 5.4](https://devicetree-specification.readthedocs.io/en/v0.3/flattened-format.html#structure-block)).
//! [`TreeWalk`] consumes it token by token and links the nodes it allocates
//! from a [`NodeRegistry`] into a parent/child/sibling structure, reporting
//! every completed node to a [`NodeVisitor`] in post-order.

pub(crate) mod node;
pub(crate) mod registry;

pub use node::{
    DeviceNode, InvalidValueLength, NodeHandle, PropertyIter, RawProperty, StringValueError,
    INTERRUPT_UNSET,
};
pub use registry::{ChildIter, NodeRegistry, RegistryExhausted};

use crate::fdt::cursor::{Cursor, CursorError, Token};
use crate::fdt::strings::Strings;
use thiserror_no_std::Error;

/// Errors that make the structure block unusable.
///
/// Any of these aborts the walk; bring-up must not continue with a partially
/// built tree.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum StructureError {
    /// The token stream itself could not be read
    #[error("The structure block could not be read: {0}")]
    Cursor(#[from] CursorError),
    /// The node pool ran out of slots
    #[error("{0}")]
    Pool(#[from] RegistryExhausted),
    /// An FDT_END_NODE token was read while no node was open
    #[error("The end-node token at position {pos} has no matching begin-node token")]
    UnbalancedEndNode { pos: usize },
    /// The FDT_END token was read while a node was still open
    #[error("The structure block ended while nodes were still open")]
    UnclosedNode,
    /// A second top-level node was found; a device tree has exactly one root
    #[error("A second root node begins at position {pos}")]
    MultipleRootNodes { pos: usize },
    /// An FDT_PROP token was read before the first FDT_BEGIN_NODE
    #[error("The property at position {pos} does not belong to any node")]
    PropertyOutsideNode { pos: usize },
    /// A property record appeared after the node already had child nodes
    #[error("The property at position {pos} appears after child nodes of the same node")]
    PropertyAfterChildren { pos: usize },
    /// The structure block contained no node at all
    #[error("The structure block does not contain a root node")]
    EmptyStructure,
}

/// The outcome of a single [`TreeWalk::step`]
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum WalkStatus {
    /// More tokens remain
    Continue,
    /// The FDT_END token was consumed and the tree is complete
    Finished,
}

/// The seam through which completed nodes leave the tree walk.
///
/// `node_finalized` is called exactly once per node, at its end-node token,
/// after all of the node's fields have been populated. Since a node can only
/// close after all of its children have closed, the calls arrive in
/// post-order.
pub trait NodeVisitor<'buf> {
    fn node_finalized(&mut self, node: &DeviceNode<'buf>);
}

impl<'buf, F> NodeVisitor<'buf> for F
where
    F: FnMut(&DeviceNode<'buf>),
{
    fn node_finalized(&mut self, node: &DeviceNode<'buf>) {
        self(node)
    }
}

/// The token-driven state machine that builds the device node tree.
///
/// All walk state lives in this value; nothing is kept in globals, so walks
/// are independently testable and a re-entry with a fresh registry (e.g. for
/// a secondary core) is structurally possible.
pub struct TreeWalk<'buf, 'reg, const CAPACITY: usize = 256> {
    cursor: Cursor<'buf>,
    struct_buf: &'buf [u8],
    strings: Strings<'buf>,
    registry: &'reg mut NodeRegistry<'buf, CAPACITY>,
    /// The innermost node that is open but not yet finalized
    current: Option<NodeHandle>,
    root: Option<NodeHandle>,
}

impl<'buf, 'reg, const CAPACITY: usize> TreeWalk<'buf, 'reg, CAPACITY> {
    /// Start a walk over a structure block.
    ///
    /// `struct_buf` must begin at the first token of the block; `strings` is
    /// the blob's strings block used to resolve property names.
    pub fn new(
        struct_buf: &'buf [u8],
        strings: Strings<'buf>,
        registry: &'reg mut NodeRegistry<'buf, CAPACITY>,
    ) -> Self {
        Self {
            cursor: Cursor::new(struct_buf),
            struct_buf,
            strings,
            registry,
            current: None,
            root: None,
        }
    }

    /// Consume one token and apply its transition.
    pub fn step<V: NodeVisitor<'buf>>(
        &mut self,
        visitor: &mut V,
    ) -> Result<WalkStatus, StructureError> {
        let pos = self.cursor.pos();
        match self.cursor.read_token()? {
            Token::BeginNode => self.begin_node(pos),
            Token::Prop => self.property(pos),
            Token::EndNode => self.end_node(pos, visitor),
            Token::Nop => Ok(WalkStatus::Continue),
            Token::End => self.end(),
        }
    }

    /// Drive the walk to completion and return the handle of the root node.
    pub fn run<V: NodeVisitor<'buf>>(
        mut self,
        visitor: &mut V,
    ) -> Result<NodeHandle, StructureError> {
        loop {
            if self.step(visitor)? == WalkStatus::Finished {
                // end() already rejected the empty structure
                return Ok(self.root.unwrap());
            }
        }
    }

    fn begin_node(&mut self, pos: usize) -> Result<WalkStatus, StructureError> {
        if self.current.is_none() && self.root.is_some() {
            return Err(StructureError::MultipleRootNodes { pos });
        }

        let handle = self.registry.allocate()?;
        let name = self.cursor.read_name()?;

        let node = self.registry.get_mut(handle);
        node.name = name;
        node.offset = pos as u64;
        node.set_source(self.struct_buf, self.strings);

        match self.current {
            Some(parent) => self.link_child(parent, handle),
            None => self.root = Some(handle),
        }
        self.current = Some(handle);
        Ok(WalkStatus::Continue)
    }

    /// Prepend `child` to `parent`'s child list; the new child becomes the
    /// list head while keeping its own parent back-reference intact.
    fn link_child(&mut self, parent: NodeHandle, child: NodeHandle) {
        let old_head = self.registry.get(parent).first_child;

        let child_node = self.registry.get_mut(child);
        child_node.parent = Some(parent);
        child_node.next_sibling = old_head;

        if let Some(head) = old_head {
            self.registry.get_mut(head).prev_sibling = Some(child);
        }

        let parent_node = self.registry.get_mut(parent);
        parent_node.first_child = Some(child);
        if parent_node.last_child.is_none() {
            parent_node.last_child = Some(child);
        }
    }

    fn property(&mut self, pos: usize) -> Result<WalkStatus, StructureError> {
        let current = match self.current {
            Some(handle) => handle,
            None => return Err(StructureError::PropertyOutsideNode { pos }),
        };

        let value_len = self.cursor.read_u32()? as usize;
        let name_offset = self.cursor.read_u32()? as usize;
        let value = self.cursor.read_bytes(value_len)?;
        let record_end = self.cursor.pos();

        let node = self.registry.get_mut(current);
        if node.first_child.is_some() {
            return Err(StructureError::PropertyAfterChildren { pos });
        }
        node.note_property(pos, record_end);

        // a name that cannot be resolved leaves the record as opaque bytes
        if let Ok(name) = self.strings.get(name_offset) {
            capture_typed_field(node, name, value);
        }
        Ok(WalkStatus::Continue)
    }

    fn end_node<V: NodeVisitor<'buf>>(
        &mut self,
        pos: usize,
        visitor: &mut V,
    ) -> Result<WalkStatus, StructureError> {
        let current = match self.current {
            Some(handle) => handle,
            None => return Err(StructureError::UnbalancedEndNode { pos }),
        };

        visitor.node_finalized(self.registry.get(current));
        self.current = self.registry.get(current).parent;
        Ok(WalkStatus::Continue)
    }

    fn end(&mut self) -> Result<WalkStatus, StructureError> {
        if self.current.is_some() {
            return Err(StructureError::UnclosedNode);
        }
        if self.root.is_none() {
            return Err(StructureError::EmptyStructure);
        }
        Ok(WalkStatus::Finished)
    }
}

/// Map a recognized property into the node's typed fields.
///
/// `reg` is accepted in its 2-cell (u64 address, u64 size) and 1-cell forms;
/// `interrupts` in the 3-cell interrupt-controller form (the number is the
/// second cell) and the plain 1-cell form. Everything else stays raw.
fn capture_typed_field(node: &mut DeviceNode, name: &str, value: &[u8]) {
    fn be_u32(bytes: &[u8]) -> u32 {
        u32::from_be_bytes(bytes.try_into().unwrap())
    }
    fn be_u64(bytes: &[u8]) -> u64 {
        u64::from_be_bytes(bytes.try_into().unwrap())
    }

    match name {
        "reg" => match value.len() {
            16 => {
                node.base_address = be_u64(&value[0..8]);
                node.size = be_u64(&value[8..16]);
            }
            8 => {
                node.base_address = be_u32(&value[0..4]) as u64;
                node.size = be_u32(&value[4..8]) as u64;
            }
            _ => {}
        },
        "interrupts" => {
            if value.len() >= 12 {
                node.interrupt = be_u32(&value[4..8]);
            } else if value.len() >= 4 {
                node.interrupt = be_u32(&value[0..4]);
            }
        }
        _ => {}
    }
}
