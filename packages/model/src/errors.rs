//! Error types for the model

use crate::node::NodeId;
use thiserror::Error;

/// How a [`ModelError`] should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid API call. Nothing was changed; the caller may retry with
    /// adjusted parameters.
    Usage,

    /// An internal invariant does not hold. The tree can no longer be
    /// trusted and must not be persisted.
    Corruption,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Node {0} is not present in its parent's children")]
    NodeNotFoundInParent(NodeId),

    #[error("Operation base version {base_version} does not match document version {version}")]
    WrongVersion { base_version: u64, version: u64 },

    #[error("Root not found: {0}")]
    RootNotFound(String),

    #[error("Root already exists: {0}")]
    DuplicateRoot(String),

    #[error("Position path {path:?} in root {root} is incorrect")]
    InvalidPosition { root: String, path: Vec<usize> },

    #[error("Offset {offset} is out of bounds (max {max})")]
    OffsetOutOfBounds { offset: usize, max: usize },

    #[error("Range is not flat")]
    RangeNotFlat,

    #[error("Range positions are in different roots")]
    RangeRootMismatch,

    #[error("Cannot move a range into itself")]
    MoveIntoItself,

    #[error("Node {0} does not belong to this tree")]
    UnknownNode(NodeId),

    #[error("Node {0} is not attached to a document root")]
    Detached(NodeId),

    #[error("Node {0} is attached to a document; change it through a writer")]
    Attached(NodeId),

    #[error("Node {0} cannot have children")]
    NotAnElement(NodeId),

    #[error("Node {0} is not text")]
    NotText(NodeId),

    #[error("Node {0} cannot become a child: it already has a parent or is a fragment")]
    InvalidChild(NodeId),

    #[error("Operation is not allowed on a root element")]
    RootNotAllowed,

    #[error("Node {node} would become its own ancestor")]
    Cycle { node: NodeId },

    #[error("Attribute {key} does not have the expected old value")]
    WrongOldValue { key: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ModelError {
    /// Whether the error is a misuse or a broken invariant.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::NodeNotFoundInParent(_) | ModelError::WrongVersion { .. } => {
                ErrorKind::Corruption
            }
            _ => ErrorKind::Usage,
        }
    }

    /// Stable identifier for host tooling.
    pub fn code(&self) -> &'static str {
        match self {
            ModelError::NodeNotFoundInParent(_) => "model-node-not-found-in-parent",
            ModelError::WrongVersion { .. } => "model-document-apply-operation-wrong-version",
            ModelError::RootNotFound(_) => "model-root-not-found",
            ModelError::DuplicateRoot(_) => "model-root-duplicated",
            ModelError::InvalidPosition { .. } => "model-position-path-incorrect",
            ModelError::OffsetOutOfBounds { .. } => "model-offset-out-of-bounds",
            ModelError::RangeNotFlat => "model-range-not-flat",
            ModelError::RangeRootMismatch => "model-range-root-mismatch",
            ModelError::MoveIntoItself => "model-move-range-into-itself",
            ModelError::UnknownNode(_) => "model-node-unknown",
            ModelError::Detached(_) => "model-writer-detached-node",
            ModelError::Attached(_) => "model-node-attached-use-writer",
            ModelError::NotAnElement(_) => "model-node-not-an-element",
            ModelError::NotText(_) => "model-node-not-text",
            ModelError::InvalidChild(_) => "model-node-invalid-child",
            ModelError::RootNotAllowed => "model-root-not-allowed",
            ModelError::Cycle { .. } => "model-node-into-itself",
            ModelError::WrongOldValue { .. } => "model-attribute-wrong-old-value",
            ModelError::Config(_) => "model-config-invalid",
        }
    }
}
