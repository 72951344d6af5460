//! # Nodes
//!
//! Every addressable unit of the tree lives in the [`Tree`] arena and is
//! referred to by a [`NodeId`]. Reading goes through [`NodeRef`], a borrowed
//! view that resolves parent-relative facts (index, offsets, siblings, path)
//! by walking the live parent chain on every call. Nothing positional is
//! cached, so a `NodeRef` can never report a stale location.
//!
//! Cost: `index` and `start_offset` are O(preceding siblings), `path` and
//! `ancestors` are O(depth) times that.

use crate::attributes::Attributes;
use crate::document::DocumentId;
use crate::errors::ModelError;
use crate::tree::Tree;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Arena index of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub fn from_raw(raw: u32) -> Self {
        NodeId(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Closed set of node variants
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Named element with children
    Element { name: String },

    /// Top of a document tree. Holds a non-owning back-reference to the
    /// document that owns it.
    RootElement {
        name: String,
        root_name: String,
        document: DocumentId,
    },

    /// Run of characters; offset size is its character count
    Text { data: String },

    /// Parentless container for detached content
    Fragment,
}

/// Stored node state. Position facts are derived, never stored.
#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub(crate) kind: NodeKind,
    pub(crate) attributes: Attributes,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl NodeData {
    pub(crate) fn new(kind: NodeKind, attributes: Attributes) -> Self {
        Self {
            kind,
            attributes,
            parent: None,
            children: Vec::new(),
        }
    }

    pub(crate) fn offset_size(&self) -> usize {
        match &self.kind {
            NodeKind::Text { data } => data.chars().count(),
            _ => 1,
        }
    }

    pub(crate) fn can_have_children(&self) -> bool {
        !matches!(self.kind, NodeKind::Text { .. })
    }
}

/// Options for [`NodeRef::ancestors`]
#[derive(Debug, Clone, Copy, Default)]
pub struct AncestorOptions {
    /// Include the node itself in the chain
    pub include_self: bool,
    /// Order from the parent up to the root instead of root down
    pub parent_first: bool,
}

/// Borrowed read view of a node
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    pub(crate) tree: &'a Tree,
    pub(crate) id: NodeId,
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &'a Tree {
        self.tree
    }

    pub(crate) fn data(&self) -> &'a NodeData {
        self.tree.data(self.id)
    }

    pub fn kind(&self) -> &'a NodeKind {
        &self.data().kind
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind(), NodeKind::Text { .. })
    }

    pub fn is_fragment(&self) -> bool {
        matches!(self.kind(), NodeKind::Fragment)
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind(), NodeKind::RootElement { .. })
    }

    /// Element or root element
    pub fn is_element(&self) -> bool {
        matches!(self.kind(), NodeKind::Element { .. } | NodeKind::RootElement { .. })
    }

    /// Element with the given name
    pub fn is_named(&self, name: &str) -> bool {
        self.name() == Some(name)
    }

    /// Element name, `None` for text and fragments
    pub fn name(&self) -> Option<&'a str> {
        match self.kind() {
            NodeKind::Element { name } | NodeKind::RootElement { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Text content, `None` for anything but text
    pub fn data_str(&self) -> Option<&'a str> {
        match self.kind() {
            NodeKind::Text { data } => Some(data),
            _ => None,
        }
    }

    // Attributes

    pub fn attributes(&self) -> &'a Attributes {
        &self.data().attributes
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes().contains(key)
    }

    pub fn get_attribute(&self, key: &str) -> Option<&'a Value> {
        self.attributes().get(key)
    }

    pub fn get_attributes(&self) -> impl Iterator<Item = (&'a str, &'a Value)> {
        self.attributes().iter()
    }

    // Parent-relative position, computed on read

    /// 1 for elements, character count for text
    pub fn offset_size(&self) -> usize {
        self.data().offset_size()
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.data().parent.map(|id| self.tree.node(id))
    }

    /// Position among the parent's children, `None` when detached.
    ///
    /// Fails with a corruption fault if the parent does not list this node.
    pub fn index(&self) -> Result<Option<usize>, ModelError> {
        self.tree.index_of(self.id)
    }

    /// Sum of the offset sizes of all preceding siblings
    pub fn start_offset(&self) -> Result<Option<usize>, ModelError> {
        let Some(parent) = self.parent() else {
            return Ok(None);
        };
        let index = self.index()?.ok_or(ModelError::NodeNotFoundInParent(self.id))?;
        Ok(Some(
            parent.data().children[..index]
                .iter()
                .map(|&child| self.tree.data(child).offset_size())
                .sum(),
        ))
    }

    pub fn end_offset(&self) -> Result<Option<usize>, ModelError> {
        Ok(self.start_offset()?.map(|start| start + self.offset_size()))
    }

    pub fn next_sibling(&self) -> Result<Option<NodeRef<'a>>, ModelError> {
        let (Some(parent), Some(index)) = (self.parent(), self.index()?) else {
            return Ok(None);
        };
        Ok(parent.child(index + 1))
    }

    pub fn previous_sibling(&self) -> Result<Option<NodeRef<'a>>, ModelError> {
        let (Some(parent), Some(index)) = (self.parent(), self.index()?) else {
            return Ok(None);
        };
        Ok(index.checked_sub(1).and_then(|i| parent.child(i)))
    }

    /// Topmost ancestor (self when detached)
    pub fn root(&self) -> NodeRef<'a> {
        let mut current = *self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Owning document, resolved by walking to the root.
    pub fn document(&self) -> Option<DocumentId> {
        match self.root().kind() {
            NodeKind::RootElement { document, .. } => Some(*document),
            _ => None,
        }
    }

    /// Whether the node belongs to a document tree (as opposed to a
    /// detached subtree or fragment).
    pub fn is_attached(&self) -> bool {
        self.document().is_some()
    }

    /// Offsets from the root down to this node's start
    pub fn path(&self) -> Result<Vec<usize>, ModelError> {
        let mut path = Vec::new();
        let mut current = *self;
        while current.parent().is_some() {
            let offset = current
                .start_offset()?
                .ok_or(ModelError::NodeNotFoundInParent(current.id))?;
            path.push(offset);
            current = current.parent().ok_or(ModelError::NodeNotFoundInParent(current.id))?;
        }
        path.reverse();
        Ok(path)
    }

    /// Ancestor chain. Root-first unless `parent_first` is set.
    pub fn ancestors(&self, options: AncestorOptions) -> Vec<NodeRef<'a>> {
        let mut chain = Vec::new();
        let mut current = if options.include_self {
            Some(*self)
        } else {
            self.parent()
        };
        while let Some(node) = current {
            chain.push(node);
            current = node.parent();
        }
        if !options.parent_first {
            chain.reverse();
        }
        chain
    }

    /// Whether `self` is a proper ancestor of `other`
    pub fn is_ancestor_of(&self, other: &NodeRef<'_>) -> bool {
        if !std::ptr::eq(self.tree, other.tree) {
            return false;
        }
        let mut current = other.data().parent;
        while let Some(id) = current {
            if id == self.id {
                return true;
            }
            current = self.tree.data(id).parent;
        }
        false
    }

    /// Lowest node present in both ancestor chains.
    ///
    /// Chains are compared from the root end. `None` for nodes in different
    /// trees, or when nothing is shared after `include_self` is applied.
    pub fn common_ancestor(&self, other: &NodeRef<'_>, include_self: bool) -> Option<NodeRef<'a>> {
        if !std::ptr::eq(self.tree, other.tree) {
            return None;
        }
        let options = AncestorOptions {
            include_self,
            parent_first: false,
        };
        let ours = self.ancestors(options);
        let theirs = other.ancestors(options);

        let shared = ours
            .iter()
            .zip(theirs.iter())
            .take_while(|(a, b)| a.id == b.id)
            .count();

        shared.checked_sub(1).map(|i| ours[i])
    }

    /// Serializable form of this node and its subtree
    pub fn to_json(&self) -> NodeSnapshot {
        self.tree.snapshot(self.id)
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("kind", self.kind())
            .finish()
    }
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

/// Identity-free description of a node, used for insert operations and as
/// the `toJSON` representation.
///
/// `attributes` is omitted when empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeSnapshot {
    Text {
        data: String,
        #[serde(default, skip_serializing_if = "Attributes::is_empty")]
        attributes: Attributes,
    },
    Element {
        name: String,
        #[serde(default, skip_serializing_if = "Attributes::is_empty")]
        attributes: Attributes,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<NodeSnapshot>,
    },
}

impl NodeSnapshot {
    pub fn text(data: impl Into<String>) -> Self {
        NodeSnapshot::Text {
            data: data.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn element(name: impl Into<String>, children: Vec<NodeSnapshot>) -> Self {
        NodeSnapshot::Element {
            name: name.into(),
            attributes: Attributes::new(),
            children,
        }
    }

    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        match &mut self {
            NodeSnapshot::Text { attributes, .. } | NodeSnapshot::Element { attributes, .. } => {
                attributes.set(key, value);
            }
        }
        self
    }

    pub fn attributes(&self) -> &Attributes {
        match self {
            NodeSnapshot::Text { attributes, .. } | NodeSnapshot::Element { attributes, .. } => {
                attributes
            }
        }
    }

    pub fn offset_size(&self) -> usize {
        match self {
            NodeSnapshot::Text { data, .. } => data.chars().count(),
            NodeSnapshot::Element { .. } => 1,
        }
    }
}
