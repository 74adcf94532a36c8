use crate::adapter::TreeAdapter;
use crate::arena::NodeId;
use crate::tree::AvlTree;
use alloc::vec::Vec;
use core::cmp::Ordering;

/// A structural defect found by [`AvlTree::check_invariants`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("node {node} stores height {stored}, computed {computed}")]
    HeightMismatch {
        node: NodeId,
        stored: i32,
        computed: i32,
    },
    #[error("node {node} has balance factor {balance}")]
    Unbalanced { node: NodeId, balance: i32 },
    #[error("node {node} does not point back at its parent")]
    BrokenParentLink { node: NodeId },
    #[error("node {node} is out of order relative to {neighbor}")]
    OutOfOrder { node: NodeId, neighbor: NodeId },
    #[error("tree reports {reported} node(s) but {reachable} are reachable")]
    CountMismatch { reported: usize, reachable: usize },
    #[error("link to node {node} does not resolve")]
    Dangling { node: NodeId },
}

impl<A: TreeAdapter> AvlTree<A> {
    /// Verify heights, balance factors, parent links, in-order ordering and
    /// the node count. Runs in `O(n)` with an explicit stack.
    ///
    /// # Errors
    /// The first defect encountered.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let Some(root) = self.root else {
            return if self.len() == 0 {
                Ok(())
            } else {
                Err(InvariantViolation::CountMismatch {
                    reported: self.len(),
                    reachable: 0,
                })
            };
        };

        if self.nodes.get(root).is_none() {
            return Err(InvariantViolation::Dangling { node: root });
        }
        if self.nodes.get(root).and_then(|n| n.parent).is_some() {
            return Err(InvariantViolation::BrokenParentLink { node: root });
        }

        // Post-order walk: heights are computed bottom-up and compared against
        // the stored values.
        let mut computed: Vec<(NodeId, i32)> = Vec::new();
        let mut stack: Vec<(NodeId, bool)> = Vec::new();
        stack.push((root, false));
        let mut reachable = 0usize;

        while let Some((id, expanded)) = stack.pop() {
            let node = self
                .nodes
                .get(id)
                .ok_or(InvariantViolation::Dangling { node: id })?;

            if !expanded {
                stack.push((id, true));
                for child in [node.right, node.left].into_iter().flatten() {
                    let child_node = self
                        .nodes
                        .get(child)
                        .ok_or(InvariantViolation::Dangling { node: child })?;
                    if child_node.parent != Some(id) {
                        return Err(InvariantViolation::BrokenParentLink { node: child });
                    }
                    stack.push((child, false));
                }
                continue;
            }

            reachable += 1;
            let height_of = |child: Option<NodeId>, computed: &Vec<(NodeId, i32)>| {
                child.map_or(0, |c| {
                    computed
                        .iter()
                        .rev()
                        .find(|(id, _)| *id == c)
                        .map_or(0, |(_, h)| *h)
                })
            };
            let left = height_of(node.left, &computed);
            let right = height_of(node.right, &computed);
            let height = 1 + left.max(right);

            if node.height != height {
                return Err(InvariantViolation::HeightMismatch {
                    node: id,
                    stored: node.height,
                    computed: height,
                });
            }
            let balance = right - left;
            if !(-1..=1).contains(&balance) {
                return Err(InvariantViolation::Unbalanced { node: id, balance });
            }

            // Children are fully accounted for; keep only this subtree's entry.
            computed.retain(|(c, _)| Some(*c) != node.left && Some(*c) != node.right);
            computed.push((id, height));
        }

        if reachable != self.len() {
            return Err(InvariantViolation::CountMismatch {
                reported: self.len(),
                reachable,
            });
        }

        // Strict in-order ordering.
        let mut previous: Option<NodeId> = None;
        for (id, value) in self.iter() {
            if let Some(prev) = previous {
                let prev_key = self.adapter().key(&self.node(prev).value);
                let key = self.adapter().key(value);
                if self.adapter().compare(prev_key, key) != Ordering::Less {
                    return Err(InvariantViolation::OutOfOrder {
                        node: id,
                        neighbor: prev,
                    });
                }
            }
            previous = Some(id);
        }

        Ok(())
    }
}
