use crate::adapter::{Describe, TreeAdapter};
use crate::arena::{Arena, Node, NodeId};
use crate::error::AvlError;
use core::cmp::Ordering;
use core::iter::FusedIterator;
use log::{debug, trace};

/// How [`AvlTree::lookup`] resolves a probe that has no exact match.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LookupMode {
    /// Only a node comparing equal to the probe.
    Exact,
    /// The smallest node comparing greater than or equal to the probe.
    EqualOrAbove,
    /// The largest node comparing less than or equal to the probe.
    EqualOrBelow,
}

/// Which child slot of a parent a node hangs off.
#[derive(Copy, Clone, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Arena-backed AVL tree over values described by a [`TreeAdapter`].
pub struct AvlTree<A: TreeAdapter> {
    adapter: A,
    pub(crate) nodes: Arena<A::Value>,
    pub(crate) root: Option<NodeId>,
    len: usize,
}

impl<A: TreeAdapter> AvlTree<A> {
    #[must_use]
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            nodes: Arena::new(),
            root: None,
            len: 0,
        }
    }

    #[must_use]
    pub fn with_capacity(adapter: A, capacity: usize) -> Self {
        Self {
            adapter,
            nodes: Arena::with_capacity(capacity),
            root: None,
            len: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn adapter(&self) -> &A {
        &self.adapter
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub const fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Height of the whole tree (0 when empty).
    #[inline]
    #[must_use]
    pub fn height(&self) -> i32 {
        self.height_of(self.root)
    }

    /// Whether `id` refers to a live node of this tree.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&A::Value> {
        self.nodes.get(id).map(|n| &n.value)
    }

    /// Mutable access to a stored value.
    ///
    /// The caller may change the key only in ways that keep it ordered
    /// between its in-order neighbors (e.g. growing a range into a gap that
    /// no other node covers). Anything else breaks the search invariant.
    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut A::Value> {
        self.nodes.get_mut(id).map(|n| &mut n.value)
    }

    /// Parent link of a node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    /// Balance factor `height(right) - height(left)` of a live node.
    #[must_use]
    pub fn balance_of(&self, id: NodeId) -> Option<i32> {
        self.nodes
            .get(id)
            .map(|n| self.height_of(n.right) - self.height_of(n.left))
    }

    /// Insert a value, returning the handle of its node.
    ///
    /// # Errors
    /// [`AvlError::KeyCollision`] if a node comparing equal to the value's key
    /// is already stored; the tree is left untouched and the value dropped.
    pub fn insert(&mut self, value: A::Value) -> Result<NodeId, AvlError> {
        let mut parent = None;
        let mut side = Side::Left;
        let mut cursor = self.root;

        {
            let probe = self.adapter.key(&value);
            while let Some(current) = cursor {
                let node = self.node(current);
                match self.adapter.compare(probe, self.adapter.key(&node.value)) {
                    Ordering::Less => {
                        parent = Some(current);
                        side = Side::Left;
                        cursor = node.left;
                    }
                    Ordering::Greater => {
                        parent = Some(current);
                        side = Side::Right;
                        cursor = node.right;
                    }
                    Ordering::Equal => return Err(AvlError::KeyCollision { existing: current }),
                }
            }
        }

        let id = self.nodes.insert(Node::leaf(parent, value));
        match parent {
            None => self.root = Some(id),
            Some(p) => self.set_child(p, side, Some(id)),
        }
        self.len += 1;

        // Insertion needs at most one (single or double) rotation; the walk
        // stops once a subtree's height comes out unchanged.
        self.rebalance_from(parent);
        Ok(id)
    }

    /// Detach a node and return its value.
    ///
    /// # Errors
    /// [`AvlError::StaleHandle`] if `id` is not a live node of this tree.
    pub fn remove(&mut self, id: NodeId) -> Result<A::Value, AvlError> {
        let (parent, left, right, height) = match self.nodes.get(id) {
            Some(n) => (n.parent, n.left, n.right, n.height),
            None => return Err(AvlError::StaleHandle(id)),
        };

        let rebalance_start = match (left, right) {
            (None, None) => {
                self.replace_child(parent, id, None);
                parent
            }
            (Some(child), None) | (None, Some(child)) => {
                self.node_mut(child).parent = parent;
                self.replace_child(parent, id, Some(child));
                parent
            }
            (Some(left), Some(right)) => {
                // The in-order successor has no left child by definition.
                let successor = self.leftmost(right);
                let start = if successor == right {
                    Some(successor)
                } else {
                    let successor_parent = self.node(successor).parent;
                    let successor_right = self.node(successor).right;
                    if let Some(sp) = successor_parent {
                        self.node_mut(sp).left = successor_right;
                    }
                    if let Some(sr) = successor_right {
                        self.node_mut(sr).parent = successor_parent;
                    }
                    self.node_mut(successor).right = Some(right);
                    self.node_mut(right).parent = Some(successor);
                    successor_parent
                };

                self.node_mut(successor).left = Some(left);
                self.node_mut(left).parent = Some(successor);
                {
                    let s = self.node_mut(successor);
                    s.parent = parent;
                    s.height = height;
                }
                self.replace_child(parent, id, Some(successor));
                start
            }
        };

        let node = self
            .nodes
            .remove(id)
            .unwrap_or_else(|| Self::dangling(id));
        self.len -= 1;

        // Unlike insertion, a removal can shorten the subtree again after a
        // rotation, so the walk may continue up to the root.
        self.rebalance_from(rebalance_start);
        Ok(node.value)
    }

    /// Find a node relative to `probe`.
    #[must_use]
    pub fn lookup(&self, probe: &A::Key, mode: LookupMode) -> Option<NodeId> {
        let mut cursor = self.root;
        let mut candidate = None;

        while let Some(current) = cursor {
            let node = self.node(current);
            match self.adapter.compare(probe, self.adapter.key(&node.value)) {
                Ordering::Equal => return Some(current),
                Ordering::Less => {
                    if mode == LookupMode::EqualOrAbove {
                        candidate = Some(current);
                    }
                    cursor = node.left;
                }
                Ordering::Greater => {
                    if mode == LookupMode::EqualOrBelow {
                        candidate = Some(current);
                    }
                    cursor = node.right;
                }
            }
        }

        candidate
    }

    /// Smallest node.
    #[must_use]
    pub fn first(&self) -> Option<NodeId> {
        self.root.map(|r| self.leftmost(r))
    }

    /// Largest node.
    #[must_use]
    pub fn last(&self) -> Option<NodeId> {
        self.root.map(|r| self.rightmost(r))
    }

    /// In-order successor of a live node.
    #[must_use]
    pub fn successor(&self, id: NodeId) -> Option<NodeId> {
        let node = self.nodes.get(id)?;
        if let Some(right) = node.right {
            return Some(self.leftmost(right));
        }
        let mut child = id;
        let mut parent = node.parent;
        while let Some(p) = parent {
            let pn = self.node(p);
            if pn.left == Some(child) {
                return Some(p);
            }
            child = p;
            parent = pn.parent;
        }
        None
    }

    /// In-order predecessor of a live node.
    #[must_use]
    pub fn predecessor(&self, id: NodeId) -> Option<NodeId> {
        let node = self.nodes.get(id)?;
        if let Some(left) = node.left {
            return Some(self.rightmost(left));
        }
        let mut child = id;
        let mut parent = node.parent;
        while let Some(p) = parent {
            let pn = self.node(p);
            if pn.right == Some(child) {
                return Some(p);
            }
            child = p;
            parent = pn.parent;
        }
        None
    }

    /// In-order iterator over `(handle, value)` pairs.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, A> {
        Iter {
            tree: self,
            next: self.first(),
            remaining: self.len,
        }
    }

    /// Drop every node. Outstanding handles become stale.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
        self.len = 0;
    }

    /// Log the tree sideways (right subtree on top) at debug level.
    pub fn dump(&self) {
        debug!("avl: {} node(s), height {}", self.len, self.height());
        if let Some(root) = self.root {
            self.dump_node(root, 0);
        }
    }

    fn dump_node(&self, id: NodeId, depth: usize) {
        let node = self.node(id);
        if let Some(right) = node.right {
            self.dump_node(right, depth + 1);
        }
        debug!(
            "{:indent$}{} h={} {}",
            "",
            id,
            node.height,
            Describe {
                adapter: &self.adapter,
                value: &node.value
            },
            indent = depth * 2
        );
        if let Some(left) = node.left {
            self.dump_node(left, depth + 1);
        }
    }

    /// Walk from `start` to the root, refreshing heights and rotating where
    /// a balance factor left `{-1, 0, 1}`. Stops at the first subtree whose
    /// height did not change, since nothing above it can have changed either.
    fn rebalance_from(&mut self, start: Option<NodeId>) {
        let mut cursor = start;
        while let Some(current) = cursor {
            let before = self.node(current).height;
            self.update_height(current);

            let balance = self.balance(current);
            let subtree = if balance > 1 {
                let right = self.child(current, Side::Right);
                if self.balance(right) < 0 {
                    trace!("avl: right-left case at {current}");
                    self.rotate_right(right);
                } else {
                    trace!("avl: right-right case at {current}");
                }
                self.rotate_left(current)
            } else if balance < -1 {
                let left = self.child(current, Side::Left);
                if self.balance(left) > 0 {
                    trace!("avl: left-right case at {current}");
                    self.rotate_left(left);
                } else {
                    trace!("avl: left-left case at {current}");
                }
                self.rotate_right(current)
            } else {
                current
            };

            if self.node(subtree).height == before {
                break;
            }
            cursor = self.node(subtree).parent;
        }
    }

    /// Rotate `x` down to the left; its right child takes its place.
    ///
    /// ```text
    ///     x                y
    ///    / \              / \
    ///   a   y    ==>     x   c
    ///      / \          / \
    ///     b   c        a   b
    /// ```
    fn rotate_left(&mut self, x: NodeId) -> NodeId {
        let y = self.child(x, Side::Right);
        let b = self.node(y).left;
        let parent = self.node(x).parent;

        self.node_mut(x).right = b;
        if let Some(b) = b {
            self.node_mut(b).parent = Some(x);
        }
        self.node_mut(y).left = Some(x);
        self.node_mut(x).parent = Some(y);
        self.node_mut(y).parent = parent;
        self.replace_child(parent, x, Some(y));

        self.update_height(x);
        self.update_height(y);
        y
    }

    /// Mirror image of [`rotate_left`](Self::rotate_left).
    fn rotate_right(&mut self, x: NodeId) -> NodeId {
        let y = self.child(x, Side::Left);
        let b = self.node(y).right;
        let parent = self.node(x).parent;

        self.node_mut(x).left = b;
        if let Some(b) = b {
            self.node_mut(b).parent = Some(x);
        }
        self.node_mut(y).right = Some(x);
        self.node_mut(x).parent = Some(y);
        self.node_mut(y).parent = parent;
        self.replace_child(parent, x, Some(y));

        self.update_height(x);
        self.update_height(y);
        y
    }

    /// Point whichever link of `parent` referenced `old` at `new` (or the
    /// root, if `parent` is `None`).
    fn replace_child(&mut self, parent: Option<NodeId>, old: NodeId, new: Option<NodeId>) {
        match parent {
            None => self.root = new,
            Some(p) => {
                let side = if self.node(p).left == Some(old) {
                    Side::Left
                } else {
                    debug_assert_eq!(self.node(p).right, Some(old));
                    Side::Right
                };
                self.set_child(p, side, new);
            }
        }
    }

    fn set_child(&mut self, parent: NodeId, side: Side, child: Option<NodeId>) {
        let node = self.node_mut(parent);
        match side {
            Side::Left => node.left = child,
            Side::Right => node.right = child,
        }
    }

    /// A child that the balance arithmetic proved must exist.
    fn child(&self, id: NodeId, side: Side) -> NodeId {
        let node = self.node(id);
        let child = match side {
            Side::Left => node.left,
            Side::Right => node.right,
        };
        child.unwrap_or_else(|| {
            log::error!("avl: node {id} is unbalanced towards a missing child");
            panic!("avl: node {id} is unbalanced towards a missing child")
        })
    }

    fn leftmost(&self, mut id: NodeId) -> NodeId {
        while let Some(left) = self.node(id).left {
            id = left;
        }
        id
    }

    fn rightmost(&self, mut id: NodeId) -> NodeId {
        while let Some(right) = self.node(id).right {
            id = right;
        }
        id
    }

    #[inline]
    pub(crate) fn height_of(&self, id: Option<NodeId>) -> i32 {
        id.map_or(0, |id| self.node(id).height)
    }

    #[inline]
    fn balance(&self, id: NodeId) -> i32 {
        let node = self.node(id);
        self.height_of(node.right) - self.height_of(node.left)
    }

    #[inline]
    fn update_height(&mut self, id: NodeId) {
        let (left, right) = {
            let node = self.node(id);
            (node.left, node.right)
        };
        let height = 1 + self.height_of(left).max(self.height_of(right));
        self.node_mut(id).height = height;
    }

    /// Resolve an internal link; a dead link means the tree is corrupted.
    #[inline]
    pub(crate) fn node(&self, id: NodeId) -> &Node<A::Value> {
        self.nodes.get(id).unwrap_or_else(|| Self::dangling(id))
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> &mut Node<A::Value> {
        self.nodes.get_mut(id).unwrap_or_else(|| Self::dangling(id))
    }

    #[cold]
    fn dangling(id: NodeId) -> ! {
        log::error!("avl: dangling link to node {id}");
        panic!("avl: dangling link to node {id}")
    }
}

/// In-order iterator returned by [`AvlTree::iter`].
pub struct Iter<'a, A: TreeAdapter> {
    tree: &'a AvlTree<A>,
    next: Option<NodeId>,
    remaining: usize,
}

impl<'a, A: TreeAdapter> Iterator for Iter<'a, A> {
    type Item = (NodeId, &'a A::Value);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.tree.successor(current);
        self.remaining = self.remaining.saturating_sub(1);
        Some((current, &self.tree.node(current).value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<A: TreeAdapter> ExactSizeIterator for Iter<'_, A> {}

impl<A: TreeAdapter> FusedIterator for Iter<'_, A> {}

impl<'a, A: TreeAdapter> IntoIterator for &'a AvlTree<A> {
    type Item = (NodeId, &'a A::Value);
    type IntoIter = Iter<'a, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
