//! The fixed-capacity pool that owns all device nodes
//!
//! Platform bring-up runs before any allocator exists, so nodes live in a
//! pool of preallocated slots handed out by index. Allocation is monotonic:
//! slots are never returned during the bring-up pass and the pool records its
//! high-water mark.

use crate::fdt::tree::node::{DeviceNode, NodeHandle};
use thiserror_no_std::Error;

/// The error raised when the node pool has no free slot left.
///
/// This is fatal to the tree walk; a blob with more nodes than the pool can
/// hold cannot be represented.
#[derive(Debug, Error, Eq, PartialEq)]
#[error("The device node pool is exhausted (capacity {0})")]
pub struct RegistryExhausted(pub usize);

/// A pool of [`DeviceNode`] slots addressed by stable [`NodeHandle`] indices
#[derive(Debug)]
pub struct NodeRegistry<'buf, const CAPACITY: usize = 256> {
    nodes: [DeviceNode<'buf>; CAPACITY],
    used: usize,
}

impl<'buf, const CAPACITY: usize> NodeRegistry<'buf, CAPACITY> {
    pub const fn new() -> Self {
        assert!(CAPACITY <= u16::MAX as usize + 1);
        Self {
            nodes: [DeviceNode::EMPTY; CAPACITY],
            used: 0,
        }
    }

    /// Hand out the next free slot, initialized to [`DeviceNode::EMPTY`]
    pub fn allocate(&mut self) -> Result<NodeHandle, RegistryExhausted> {
        if self.used == CAPACITY {
            return Err(RegistryExhausted(CAPACITY));
        }

        let slot = self.used;
        self.nodes[slot] = DeviceNode::EMPTY;
        self.used += 1;
        Ok(NodeHandle(slot as u16))
    }

    pub fn get(&self, handle: NodeHandle) -> &DeviceNode<'buf> {
        &self.nodes[handle.index()]
    }

    pub fn get_mut(&mut self, handle: NodeHandle) -> &mut DeviceNode<'buf> {
        &mut self.nodes[handle.index()]
    }

    /// The allocation high-water mark, i.e. the number of nodes handed out
    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Iterate over all allocated nodes in allocation order
    pub fn nodes(&self) -> impl Iterator<Item = &DeviceNode<'buf>> {
        self.nodes[..self.used].iter()
    }

    /// Iterate over the handles of `parent`'s children, newest-first
    pub fn children(&self, parent: NodeHandle) -> ChildIter<'_, 'buf, CAPACITY> {
        ChildIter {
            registry: self,
            next: self.get(parent).first_child,
        }
    }
}

/// An iterator following the sibling links of one child list
pub struct ChildIter<'reg, 'buf, const CAPACITY: usize> {
    registry: &'reg NodeRegistry<'buf, CAPACITY>,
    next: Option<NodeHandle>,
}

impl<'reg, 'buf, const CAPACITY: usize> Iterator for ChildIter<'reg, 'buf, CAPACITY> {
    type Item = NodeHandle;

    fn next(&mut self) -> Option<Self::Item> {
        let handle = self.next?;
        self.next = self.registry.get(handle).next_sibling;
        Some(handle)
    }
}
