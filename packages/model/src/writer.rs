//! # Writer
//!
//! The only way to change nodes attached to a document. A `Writer` exists
//! only inside [`Document::change`](crate::Document::change) and
//! [`Document::change_block`](crate::Document::change_block), so holding
//! one is the capability to mutate.
//!
//! Every call on attached content validates, applies and records exactly
//! one operation, and listeners are notified before the call returns.
//! Exceptions:
//!
//! - Setting an attribute to its current value records nothing.
//! - Range attribute calls record one operation per run of items that
//!   share the same current value; [`Writer::clear_attributes`] records one
//!   per key.
//! - Calls on detached nodes change them directly and record nothing.

use crate::attributes::Attributes;
use crate::document::{Batch, Document};
use crate::errors::ModelError;
use crate::node::{NodeId, NodeSnapshot};
use crate::operation::{Operation, OperationKind};
use crate::position::{Position, Range};
use crate::tree::{Tree, GRAVEYARD};
use serde_json::Value;

pub struct Writer<'d> {
    document: &'d mut Document,
    operations: Vec<Operation>,
}

impl<'d> Writer<'d> {
    pub(crate) fn new(document: &'d mut Document) -> Self {
        Self {
            document,
            operations: Vec::new(),
        }
    }

    pub(crate) fn into_batch(self) -> Batch {
        Batch::new(self.operations)
    }

    pub fn document(&self) -> &Document {
        self.document
    }

    pub fn tree(&self) -> &Tree {
        self.document.tree()
    }

    /// Operations recorded so far in this block
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Nested change block. Its operations join the enclosing block.
    pub fn change<R>(
        &mut self,
        f: impl FnOnce(&mut Writer<'d>) -> Result<R, ModelError>,
    ) -> Result<R, ModelError> {
        f(self)
    }

    fn apply(&mut self, kind: OperationKind, nodes: Option<Vec<NodeId>>) -> Result<(), ModelError> {
        let operation = Operation::new(self.document.version(), kind);
        self.document.apply_with_nodes(operation.clone(), nodes)?;
        self.operations.push(operation);
        Ok(())
    }

    // Creation

    pub fn create_element(&mut self, name: &str, attributes: Attributes) -> NodeId {
        self.document.create_element(name, attributes)
    }

    pub fn create_text(&mut self, data: &str, attributes: Attributes) -> NodeId {
        self.document.create_text(data, attributes)
    }

    pub fn create_fragment(&mut self) -> NodeId {
        self.document.create_fragment()
    }

    pub fn clone_node(&mut self, node: NodeId, deep: bool) -> NodeId {
        self.document.tree_mut().clone_node(node, deep)
    }

    // Structure

    /// Insert a node at a position. Fragments insert their children; an
    /// attached node is moved instead.
    pub fn insert(&mut self, node: NodeId, position: &Position) -> Result<(), ModelError> {
        let tree = self.tree();
        let item = tree.node(node);
        if item.is_root() {
            return Err(ModelError::RootNotAllowed);
        }
        if item.is_attached() {
            let source = Range::on_node(tree, node)?;
            return self.move_range(&source, position);
        }
        tree.resolve(position)?;

        let ids: Vec<NodeId> = if item.is_fragment() {
            item.children().map(|child| child.id()).collect()
        } else {
            vec![node]
        };
        if ids.is_empty() {
            return Ok(());
        }
        let nodes = ids.iter().map(|&id| tree.snapshot(id)).collect();

        for &id in &ids {
            self.document.tree_mut().detach(id)?;
        }
        self.apply(
            OperationKind::Insert {
                position: position.clone(),
                nodes,
            },
            Some(ids),
        )
    }

    pub fn insert_snapshot(&mut self, snapshot: NodeSnapshot, position: &Position) -> Result<(), ModelError> {
        self.apply(
            OperationKind::Insert {
                position: position.clone(),
                nodes: vec![snapshot],
            },
            None,
        )
    }

    pub fn insert_text(
        &mut self,
        data: &str,
        attributes: Attributes,
        position: &Position,
    ) -> Result<(), ModelError> {
        self.insert_snapshot(
            NodeSnapshot::Text {
                data: data.to_string(),
                attributes,
            },
            position,
        )
    }

    /// Append `child` as the last child of `parent`.
    pub fn append(&mut self, child: NodeId, parent: NodeId) -> Result<(), ModelError> {
        if self.tree().is_attached(parent) {
            let position = Position::at_end(self.tree(), parent)?;
            return self.insert(child, &position);
        }
        if self.tree().is_attached(child) {
            return Err(ModelError::Attached(child));
        }

        let tree = self.document.tree_mut();
        let children: Vec<NodeId> = if tree.node(child).is_fragment() {
            tree.node(child).children().map(|c| c.id()).collect()
        } else {
            vec![child]
        };
        for &id in &children {
            tree.ensure_insertable(parent, id)?;
        }
        for id in children {
            tree.detach(id)?;
            tree.detached_mut(parent)?.append_child(id)?;
        }
        Ok(())
    }

    /// Remove a node from its parent. Attached content goes to the
    /// graveyard.
    pub fn remove(&mut self, node: NodeId) -> Result<(), ModelError> {
        let item = self.tree().node(node);
        if item.is_root() {
            return Err(ModelError::RootNotAllowed);
        }
        if item.parent().is_none() {
            return Err(ModelError::Detached(node));
        }
        if item.is_attached() {
            let range = Range::on_node(self.tree(), node)?;
            return self.remove_range(&range);
        }
        self.document.tree_mut().detach(node)
    }

    /// Move the content of a flat range to the graveyard.
    pub fn remove_range(&mut self, range: &Range) -> Result<(), ModelError> {
        if !range.is_flat() {
            return Err(ModelError::RangeNotFlat);
        }
        if range.is_collapsed() {
            return Ok(());
        }
        self.apply(
            OperationKind::Move {
                source: range.start.clone(),
                how_many: range.len(),
                target: Position::new(GRAVEYARD, vec![0]),
            },
            None,
        )
    }

    /// Move the content of a flat range to `target`.
    pub fn move_range(&mut self, range: &Range, target: &Position) -> Result<(), ModelError> {
        if !range.is_flat() {
            return Err(ModelError::RangeNotFlat);
        }
        if range.is_collapsed() {
            return Ok(());
        }
        self.apply(
            OperationKind::Move {
                source: range.start.clone(),
                how_many: range.len(),
                target: target.clone(),
            },
            None,
        )
    }

    // Attributes

    pub fn set_attribute(&mut self, key: &str, value: Value, node: NodeId) -> Result<(), ModelError> {
        self.change_node_attribute(key, Some(value), node)
    }

    pub fn remove_attribute(&mut self, key: &str, node: NodeId) -> Result<(), ModelError> {
        self.change_node_attribute(key, None, node)
    }

    pub fn clear_attributes(&mut self, node: NodeId) -> Result<(), ModelError> {
        let keys: Vec<String> = self.tree().node(node).attributes().keys().map(String::from).collect();
        for key in keys {
            self.remove_attribute(&key, node)?;
        }
        Ok(())
    }

    pub fn set_attribute_on_range(&mut self, key: &str, value: Value, range: &Range) -> Result<(), ModelError> {
        self.change_range_attribute(key, Some(value), range)
    }

    pub fn remove_attribute_on_range(&mut self, key: &str, range: &Range) -> Result<(), ModelError> {
        self.change_range_attribute(key, None, range)
    }

    fn change_node_attribute(&mut self, key: &str, value: Option<Value>, node: NodeId) -> Result<(), ModelError> {
        let item = self.tree().node(node);
        let current = item.get_attribute(key).cloned();
        if current == value {
            return Ok(());
        }
        if item.is_root() {
            return Err(ModelError::RootNotAllowed);
        }
        if !item.is_attached() {
            self.document.tree_mut().set_node_attribute(node, key, value);
            return Ok(());
        }
        let range = Range::on_node(self.tree(), node)?;
        self.apply(
            OperationKind::Attribute {
                range,
                key: key.to_string(),
                old_value: current,
                new_value: value,
            },
            None,
        )
    }

    fn change_range_attribute(&mut self, key: &str, value: Option<Value>, range: &Range) -> Result<(), ModelError> {
        if !range.is_flat() {
            return Err(ModelError::RangeNotFlat);
        }

        // Runs of items sharing the same current value: (start, end, value)
        let mut runs: Vec<(usize, usize, Option<Value>)> = Vec::new();
        let mut offset = range.start.offset();
        for item in self.tree().items(range)? {
            let size = item.offset_size();
            let current = item.get_attribute(key).cloned();
            if current != value {
                match runs.last_mut() {
                    Some((_, end, old)) if *end == offset && *old == current => *end += size,
                    _ => runs.push((offset, offset + size, current)),
                }
            }
            offset += size;
        }

        for (start, end, old_value) in runs {
            self.apply(
                OperationKind::Attribute {
                    range: Range::new(range.start.with_offset(start), range.start.with_offset(end)),
                    key: key.to_string(),
                    old_value,
                    new_value: value.clone(),
                },
                None,
            )?;
        }
        Ok(())
    }
}
