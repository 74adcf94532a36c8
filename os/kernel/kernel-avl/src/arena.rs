use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

/// Source of arena identities; every tree gets its own.
static NEXT_OWNER: AtomicU32 = AtomicU32::new(1);

/// Handle to a node stored in an [`AvlTree`](crate::AvlTree).
///
/// The generation distinguishes successive occupants of the same slot, the
/// owner ties the handle to the tree that issued it.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    owner: u32,
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Slot index inside the arena.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Identity of the tree that issued this handle.
    #[inline]
    #[must_use]
    pub const fn owner(self) -> u32 {
        self.owner
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}@{}/t{})", self.index, self.generation, self.owner)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

/// A tree node: three links, the AVL height and the payload.
pub(crate) struct Node<V> {
    pub(crate) parent: Option<NodeId>,
    pub(crate) left: Option<NodeId>,
    pub(crate) right: Option<NodeId>,
    pub(crate) height: i32,
    pub(crate) value: V,
}

impl<V> Node<V> {
    pub(crate) const fn leaf(parent: Option<NodeId>, value: V) -> Self {
        Self {
            parent,
            left: None,
            right: None,
            height: 1,
            value,
        }
    }
}

struct Slot<V> {
    generation: u32,
    node: Option<Node<V>>,
}

/// Slab of nodes with a free-slot stack.
pub(crate) struct Arena<V> {
    owner: u32,
    slots: Vec<Slot<V>>,
    vacant: Vec<u32>,
}

impl<V> Arena<V> {
    pub(crate) fn new() -> Self {
        Self::with_capacity(0)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            owner: NEXT_OWNER.fetch_add(1, Ordering::Relaxed),
            slots: Vec::with_capacity(capacity),
            vacant: Vec::new(),
        }
    }

    /// Resolves `id` to its slot if this arena issued it and the generation
    /// still matches.
    #[inline]
    fn slot(&self, id: NodeId) -> Option<&Slot<V>> {
        if id.owner != self.owner {
            return None;
        }
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
    }

    #[inline]
    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot<V>> {
        if id.owner != self.owner {
            return None;
        }
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
    }

    pub(crate) fn insert(&mut self, node: Node<V>) -> NodeId {
        if let Some(index) = self.vacant.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.node.is_none());
            slot.node = Some(node);
            return NodeId {
                owner: self.owner,
                index,
                generation: slot.generation,
            };
        }

        let index = u32::try_from(self.slots.len()).unwrap_or_else(|_| {
            log::error!("avl: node arena exhausted");
            panic!("avl: node arena exhausted ({} slots)", self.slots.len())
        });
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            owner: self.owner,
            index,
            generation: 0,
        }
    }

    pub(crate) fn remove(&mut self, id: NodeId) -> Option<Node<V>> {
        let slot = self.slot_mut(id)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.vacant.push(id.index);
        Some(node)
    }

    #[inline]
    pub(crate) fn get(&self, id: NodeId) -> Option<&Node<V>> {
        self.slot(id)?.node.as_ref()
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node<V>> {
        self.slot_mut(id)?.node.as_mut()
    }

    pub(crate) fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                #[allow(clippy::cast_possible_truncation)]
                self.vacant.push(index as u32);
            }
        }
    }
}
