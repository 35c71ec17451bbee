//! Defines the error types used throughout batchmap.
use std::fmt;

/// The primary error enum for all fallible operations in batchmap.
///
/// Batched operations return one result slot per input item. A slot carries
/// the error for that item only; a failed item never aborts the rest of the
/// batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchError {
    /// An insert found its key already present in the target node. The
    /// stored value is left unchanged.
    KeyExists,
    /// An update, delete or get did not find its key in the target node.
    NotFound,
    /// An operation ran against a node that currently holds no items.
    ///
    /// This can surface transiently while a batch keeps operating on a node
    /// it just emptied, before the traversal cursor advances past it.
    NodeEmpty,
    /// An insert hit a node that already holds its full capacity of items.
    ///
    /// Internal to insert: the list recovers by splitting the node and
    /// retrying, so callers never observe this variant in a result vector.
    NodeFull,
    /// A forward-pointer operation addressed a level outside `[0, height)`
    /// of its node. This indicates a bug in the traversal code, not a
    /// recoverable condition.
    HeightOutOfRange,
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::KeyExists => write!(f, "key already exists"),
            BatchError::NotFound => write!(f, "key not found in this node"),
            BatchError::NodeEmpty => write!(f, "node is empty"),
            BatchError::NodeFull => write!(f, "node is already full"),
            BatchError::HeightOutOfRange => {
                write!(f, "level is outside this node's height")
            }
        }
    }
}

impl std::error::Error for BatchError {}
