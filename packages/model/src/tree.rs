//! # Node Arena
//!
//! The [`Tree`] owns every node of a document: the named roots, the
//! graveyard that receives removed content, and any detached subtrees.
//!
//! ## Mutation rules
//!
//! - Nodes under a document root change only through operations, which
//!   only a [`Writer`](crate::Writer) produces. The raw primitives in this
//!   module are crate-private for that reason.
//! - Detached nodes and fragments can be changed freely through
//!   [`DetachedMut`].
//! - Node ids are never reused. A node removed from the tree stays in the
//!   arena, detached.

use crate::attributes::Attributes;
use crate::document::DocumentId;
use crate::errors::ModelError;
use crate::node::{NodeData, NodeId, NodeKind, NodeRef, NodeSnapshot};
use crate::position::{Position, Range};
use crate::text::{char_to_byte, Item, TextProxy};
use serde_json::Value;
use std::collections::BTreeMap;

/// Name of the root that holds removed content
pub const GRAVEYARD: &str = "$graveyard";

const FRAGMENT_NAME: &str = "$documentFragment";

/// Arena of nodes belonging to one document
#[derive(Debug, Clone)]
pub struct Tree {
    document: DocumentId,
    nodes: Vec<NodeData>,
    roots: BTreeMap<String, NodeId>,
}

/// Position resolved against the live tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPosition {
    /// Element that contains the position
    pub parent: NodeId,
    /// Offset within `parent`
    pub offset: usize,
    /// Index of the child at or after the position
    pub index: usize,
    /// Text node the position falls strictly inside of
    pub text_node: Option<NodeId>,
}

impl Tree {
    pub(crate) fn new(document: DocumentId) -> Self {
        Self {
            document,
            nodes: Vec::new(),
            roots: BTreeMap::new(),
        }
    }

    pub fn document_id(&self) -> DocumentId {
        self.document
    }

    /// Read view of a node.
    ///
    /// # Panics
    ///
    /// If `id` was not allocated by this tree.
    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        assert!(id.index() < self.nodes.len(), "node {id} does not belong to this tree");
        NodeRef { tree: self, id }
    }

    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_>> {
        (id.index() < self.nodes.len()).then_some(NodeRef { tree: self, id })
    }

    /// Like [`Tree::get`], as an error for callers that return `Result`
    pub fn try_node(&self, id: NodeId) -> Result<NodeRef<'_>, ModelError> {
        self.get(id).ok_or(ModelError::UnknownNode(id))
    }

    /// Number of nodes ever allocated
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self, name: &str) -> Option<NodeRef<'_>> {
        self.roots.get(name).map(|&id| self.node(id))
    }

    pub fn root_id(&self, name: &str) -> Result<NodeId, ModelError> {
        self.roots
            .get(name)
            .copied()
            .ok_or_else(|| ModelError::RootNotFound(name.to_string()))
    }

    pub fn root_names(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }

    /// Root name of the document root above `id`, if attached
    pub fn root_name_of(&self, id: NodeId) -> Option<&str> {
        match self.get(id)?.root().kind() {
            NodeKind::RootElement { root_name, .. } => Some(root_name),
            _ => None,
        }
    }

    pub(crate) fn create_root(
        &mut self,
        root_name: &str,
        element_name: &str,
    ) -> Result<NodeId, ModelError> {
        if self.roots.contains_key(root_name) {
            return Err(ModelError::DuplicateRoot(root_name.to_string()));
        }
        Ok(self.add_root(root_name, element_name))
    }

    /// Register a root without the duplicate check
    pub(crate) fn add_root(&mut self, root_name: &str, element_name: &str) -> NodeId {
        let id = self.alloc(
            NodeKind::RootElement {
                name: element_name.to_string(),
                root_name: root_name.to_string(),
                document: self.document,
            },
            Attributes::new(),
        );
        self.roots.insert(root_name.to_string(), id);
        id
    }

    pub(crate) fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.index()]
    }

    fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.index()]
    }

    pub(crate) fn alloc(&mut self, kind: NodeKind, attributes: Attributes) -> NodeId {
        let id = NodeId::from_raw(self.nodes.len() as u32);
        self.nodes.push(NodeData::new(kind, attributes));
        id
    }

    // Creation of detached content

    pub fn create_element(&mut self, name: &str, attributes: Attributes) -> NodeId {
        self.alloc(
            NodeKind::Element {
                name: name.to_string(),
            },
            attributes,
        )
    }

    pub fn create_text(&mut self, data: &str, attributes: Attributes) -> NodeId {
        self.alloc(
            NodeKind::Text {
                data: data.to_string(),
            },
            attributes,
        )
    }

    pub fn create_fragment(&mut self) -> NodeId {
        self.alloc(NodeKind::Fragment, Attributes::new())
    }

    /// Build detached nodes from a snapshot
    pub fn from_snapshot(&mut self, snapshot: &NodeSnapshot) -> NodeId {
        match snapshot {
            NodeSnapshot::Text { data, attributes } => self.create_text(data, attributes.clone()),
            NodeSnapshot::Element {
                name,
                attributes,
                children,
            } => {
                let id = if name == FRAGMENT_NAME {
                    self.create_fragment()
                } else {
                    self.create_element(name, attributes.clone())
                };
                let child_ids: Vec<NodeId> =
                    children.iter().map(|child| self.from_snapshot(child)).collect();
                self.insert_children(id, 0, &child_ids);
                id
            }
        }
    }

    pub fn snapshot(&self, id: NodeId) -> NodeSnapshot {
        let data = self.data(id);
        match &data.kind {
            NodeKind::Text { data: text } => NodeSnapshot::Text {
                data: text.clone(),
                attributes: data.attributes.clone(),
            },
            kind => {
                let name = match kind {
                    NodeKind::Element { name } | NodeKind::RootElement { name, .. } => name.clone(),
                    _ => FRAGMENT_NAME.to_string(),
                };
                NodeSnapshot::Element {
                    name,
                    attributes: data.attributes.clone(),
                    children: data.children.iter().map(|&c| self.snapshot(c)).collect(),
                }
            }
        }
    }

    /// Detached copy carrying the same attributes (and, when `deep`, a copy
    /// of the whole subtree).
    pub fn clone_node(&mut self, id: NodeId, deep: bool) -> NodeId {
        if deep {
            let snapshot = self.snapshot(id);
            return self.from_snapshot(&snapshot);
        }
        let data = self.data(id);
        let attributes = data.attributes.clone();
        let kind = match &data.kind {
            NodeKind::RootElement { name, .. } => NodeKind::Element { name: name.clone() },
            kind => kind.clone(),
        };
        self.alloc(kind, attributes)
    }

    // Structure queries

    pub(crate) fn index_of(&self, id: NodeId) -> Result<Option<usize>, ModelError> {
        let Some(parent) = self.data(id).parent else {
            return Ok(None);
        };
        self.data(parent)
            .children
            .iter()
            .position(|&child| child == id)
            .map(Some)
            .ok_or(ModelError::NodeNotFoundInParent(id))
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|node| node.is_attached())
    }

    /// Handle for unrestricted changes to a detached node
    pub fn detached_mut(&mut self, id: NodeId) -> Result<DetachedMut<'_>, ModelError> {
        if self.try_node(id)?.is_attached() {
            return Err(ModelError::Attached(id));
        }
        Ok(DetachedMut { tree: self, id })
    }

    // Positions

    pub fn resolve(&self, position: &Position) -> Result<ResolvedPosition, ModelError> {
        let invalid = || ModelError::InvalidPosition {
            root: position.root.clone(),
            path: position.path.clone(),
        };
        let (&offset, parent_path) = position.path.split_last().ok_or_else(invalid)?;

        let mut parent = self.node(self.root_id(&position.root)?);
        for &step in parent_path {
            let index = parent.offset_to_index(step).map_err(|_| invalid())?;
            let child = parent.child(index).ok_or_else(invalid)?;
            if parent.index_to_offset(index) != step || !child.can_have_children() {
                return Err(invalid());
            }
            parent = child;
        }

        let max = parent.max_offset();
        if offset > max {
            return Err(ModelError::OffsetOutOfBounds { offset, max });
        }
        let index = parent.offset_to_index(offset)?;
        let text_node = parent
            .child(index)
            .filter(|child| child.is_text() && parent.index_to_offset(index) < offset)
            .map(|child| child.id());

        Ok(ResolvedPosition {
            parent: parent.id(),
            offset,
            index,
            text_node,
        })
    }

    /// Items covered by a flat range, text cut at the range boundaries
    pub fn items(&self, range: &Range) -> Result<Vec<Item<'_>>, ModelError> {
        if !range.is_flat() {
            return Err(ModelError::RangeNotFlat);
        }
        let start = self.resolve(&range.start)?;
        let end = self.resolve(&range.end)?;
        let parent = self.node(start.parent);

        let mut items = Vec::new();
        let mut offset = parent.index_to_offset(start.index);
        for child in parent.children().skip(start.index) {
            if offset >= end.offset {
                break;
            }
            let size = child.offset_size();
            let from = start.offset.max(offset);
            let to = end.offset.min(offset + size);
            if child.is_text() && (from != offset || to != offset + size) {
                items.push(Item::Text(TextProxy::new(child, from - offset, to - from)));
            } else {
                items.push(Item::Node(child));
            }
            offset += size;
        }
        Ok(items)
    }

    // Raw mutation primitives. No validation beyond what is needed to keep
    // the arena consistent; callers validate first.

    /// Make sure a child boundary exists at `offset`, splitting a text node
    /// if needed. Returns the index of the child starting at `offset`.
    pub(crate) fn split_at(&mut self, parent: NodeId, offset: usize) -> Result<usize, ModelError> {
        let (index, start, child) = {
            let node = self.node(parent);
            let index = node.offset_to_index(offset)?;
            match node.child(index) {
                Some(child) => (index, node.index_to_offset(index), child.id()),
                None => return Ok(index),
            }
        };
        if start == offset {
            return Ok(index);
        }
        let tail = self.split_text(child, offset - start)?;
        self.insert_children(parent, index + 1, &[tail]);
        Ok(index + 1)
    }

    /// Cut a text node in two. The head keeps the id; the tail is returned
    /// detached.
    fn split_text(&mut self, id: NodeId, at: usize) -> Result<NodeId, ModelError> {
        let (tail, attributes) = {
            let data = self.data(id);
            let NodeKind::Text { data: text } = &data.kind else {
                return Err(ModelError::NotText(id));
            };
            let byte = char_to_byte(text, at);
            (text[byte..].to_string(), data.attributes.clone())
        };
        if let NodeKind::Text { data: text } = &mut self.data_mut(id).kind {
            let byte = char_to_byte(text, at);
            text.truncate(byte);
        }
        Ok(self.create_text(&tail, attributes))
    }

    pub(crate) fn insert_children(&mut self, parent: NodeId, index: usize, ids: &[NodeId]) {
        for &id in ids {
            self.data_mut(id).parent = Some(parent);
        }
        let children = &mut self.data_mut(parent).children;
        let index = index.min(children.len());
        children.splice(index..index, ids.iter().copied());
    }

    pub(crate) fn remove_children(&mut self, parent: NodeId, start: usize, end: usize) -> Vec<NodeId> {
        let removed: Vec<NodeId> = self.data_mut(parent).children.drain(start..end).collect();
        for &id in &removed {
            self.data_mut(id).parent = None;
        }
        removed
    }

    /// Take a node out of its parent's children
    pub(crate) fn detach(&mut self, id: NodeId) -> Result<(), ModelError> {
        let Some(parent) = self.data(id).parent else {
            return Ok(());
        };
        let index = self.index_of(id)?.ok_or(ModelError::NodeNotFoundInParent(id))?;
        self.remove_children(parent, index, index + 1);
        Ok(())
    }

    pub(crate) fn set_node_attribute(&mut self, id: NodeId, key: &str, value: Option<Value>) {
        self.data_mut(id).attributes.assign(key, value);
    }

    /// Merge equal-attribute text neighbours across child boundaries
    /// `from..=to` (boundary `b` sits between children `b - 1` and `b`).
    pub(crate) fn normalize(&mut self, parent: NodeId, from: usize, to: usize) {
        for boundary in (from.max(1)..=to).rev() {
            self.merge_text_at(parent, boundary);
        }
    }

    fn merge_text_at(&mut self, parent: NodeId, boundary: usize) -> bool {
        let children = &self.data(parent).children;
        if boundary == 0 || boundary >= children.len() {
            return false;
        }
        let (left, right) = (children[boundary - 1], children[boundary]);
        let mergeable = {
            let (l, r) = (self.data(left), self.data(right));
            matches!(l.kind, NodeKind::Text { .. })
                && matches!(r.kind, NodeKind::Text { .. })
                && l.attributes == r.attributes
        };
        if !mergeable {
            return false;
        }
        let tail = match &self.data(right).kind {
            NodeKind::Text { data } => data.clone(),
            _ => return false,
        };
        if let NodeKind::Text { data } = &mut self.data_mut(left).kind {
            data.push_str(&tail);
        }
        self.remove_children(parent, boundary, boundary + 1);
        true
    }

    pub(crate) fn ensure_insertable(&self, parent: NodeId, child: NodeId) -> Result<(), ModelError> {
        let node = self.try_node(child)?;
        let parent_node = self.try_node(parent)?;
        if node.is_root() {
            return Err(ModelError::RootNotAllowed);
        }
        if node.is_fragment() {
            return Err(ModelError::InvalidChild(child));
        }
        if !parent_node.can_have_children() {
            return Err(ModelError::NotAnElement(parent));
        }
        if child == parent || node.is_ancestor_of(&parent_node) {
            return Err(ModelError::Cycle { node: child });
        }
        Ok(())
    }
}

/// Unrestricted mutation handle for a node outside any document root
pub struct DetachedMut<'a> {
    tree: &'a mut Tree,
    id: NodeId,
}

impl DetachedMut<'_> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn set_attribute(&mut self, key: &str, value: Value) -> &mut Self {
        self.tree.set_node_attribute(self.id, key, Some(value));
        self
    }

    pub fn remove_attribute(&mut self, key: &str) -> &mut Self {
        self.tree.set_node_attribute(self.id, key, None);
        self
    }

    pub fn clear_attributes(&mut self) -> &mut Self {
        self.tree.data_mut(self.id).attributes.clear();
        self
    }

    /// Insert a parentless node at child `index` (clamped to the end)
    pub fn insert_child(&mut self, index: usize, child: NodeId) -> Result<(), ModelError> {
        self.tree.ensure_insertable(self.id, child)?;
        if self.tree.data(child).parent.is_some() {
            return Err(ModelError::InvalidChild(child));
        }
        self.tree.insert_children(self.id, index, &[child]);
        Ok(())
    }

    pub fn append_child(&mut self, child: NodeId) -> Result<(), ModelError> {
        let count = self.tree.data(self.id).children.len();
        self.insert_child(count, child)
    }

    /// Detach the child at `index`
    pub fn remove_child(&mut self, index: usize) -> Result<NodeId, ModelError> {
        let count = self.tree.data(self.id).children.len();
        if index >= count {
            return Err(ModelError::OffsetOutOfBounds {
                offset: index,
                max: count,
            });
        }
        Ok(self.tree.remove_children(self.id, index, index + 1)[0])
    }

    /// Split this text node at character `at`. The tail becomes the next
    /// sibling when there is a parent, otherwise it is returned detached.
    pub fn split_text(&mut self, at: usize) -> Result<NodeId, ModelError> {
        let size = self.tree.data(self.id).offset_size();
        if at > size {
            return Err(ModelError::OffsetOutOfBounds { offset: at, max: size });
        }
        let tail = self.tree.split_text(self.id, at)?;
        if let Some(parent) = self.tree.data(self.id).parent {
            let index = self
                .tree
                .index_of(self.id)?
                .ok_or(ModelError::NodeNotFoundInParent(self.id))?;
            self.tree.insert_children(parent, index + 1, &[tail]);
        }
        Ok(tail)
    }

    /// Merge the next sibling into this text node when both are text with
    /// equal attributes.
    pub fn merge_text_with_next(&mut self) -> Result<bool, ModelError> {
        let Some(parent) = self.tree.data(self.id).parent else {
            return Ok(false);
        };
        let index = self
            .tree
            .index_of(self.id)?
            .ok_or(ModelError::NodeNotFoundInParent(self.id))?;
        Ok(self.tree.merge_text_at(parent, index + 1))
    }
}
