use crate::NodeId;

/// Recoverable tree errors. Structural corruption is not reported here; it
/// panics (see [`InvariantViolation`](crate::InvariantViolation)).
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AvlError {
    /// A node comparing equal to the inserted key already exists.
    #[error("key collides with existing node {existing}")]
    KeyCollision { existing: NodeId },
    /// The handle does not refer to a live node of this tree.
    #[error("node {0} does not belong to this tree")]
    StaleHandle(NodeId),
}
