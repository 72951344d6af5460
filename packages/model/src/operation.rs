//! # Operations
//!
//! The atomic changes recorded in a document's history.
//!
//! ## Semantics
//!
//! ### Insert
//! - Inserts nodes built from snapshots at a position
//! - Text inserted inside a text node splits it first
//!
//! ### Move
//! - Moves `how_many` offsets from a flat source to a target
//! - A move into the graveyard root is a removal; a move out of it is a
//!   reinsertion. Removed content is never destroyed.
//! - Fails if the target lies inside the moved content
//!
//! ### Attribute
//! - Changes one key on every item of a flat range from `old_value` to
//!   `new_value` (`None` meaning "not set")
//! - Fails unless every item currently holds `old_value`
//!
//! Every operation validates before it mutates, so a failed apply leaves
//! the tree untouched. Adjacent text nodes with equal attributes are merged
//! after each operation.

use crate::errors::ModelError;
use crate::node::{NodeId, NodeSnapshot};
use crate::position::{move_insertion_point, Position, Range};
use crate::tree::{Tree, GRAVEYARD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One recorded change together with the document version it applies to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub base_version: u64,
    #[serde(flatten)]
    pub kind: OperationKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OperationKind {
    Insert {
        position: Position,
        nodes: Vec<NodeSnapshot>,
    },

    Move {
        source: Position,
        #[serde(rename = "howMany")]
        how_many: usize,
        target: Position,
    },

    Attribute {
        range: Range,
        key: String,
        #[serde(rename = "oldValue")]
        old_value: Option<Value>,
        #[serde(rename = "newValue")]
        new_value: Option<Value>,
    },

    /// Placeholder that only advances the version
    NoOp,
}

impl Operation {
    pub fn new(base_version: u64, kind: OperationKind) -> Self {
        Self { base_version, kind }
    }

    pub fn noop(base_version: u64) -> Self {
        Self::new(base_version, OperationKind::NoOp)
    }

    /// Insert, move, remove, reinsert, attribute or noop
    pub fn operation_type(&self) -> &'static str {
        match &self.kind {
            OperationKind::Insert { .. } => "insert",
            OperationKind::Move { .. } if self.is_removal() => "remove",
            OperationKind::Move { .. } if self.is_reinsertion() => "reinsert",
            OperationKind::Move { .. } => "move",
            OperationKind::Attribute { .. } => "attribute",
            OperationKind::NoOp => "noop",
        }
    }

    /// Move from a document root into the graveyard
    pub fn is_removal(&self) -> bool {
        match &self.kind {
            OperationKind::Move { source, target, .. } => {
                target.root == GRAVEYARD && source.root != GRAVEYARD
            }
            _ => false,
        }
    }

    /// Move from the graveyard back into a document root
    pub fn is_reinsertion(&self) -> bool {
        match &self.kind {
            OperationKind::Move { source, target, .. } => {
                source.root == GRAVEYARD && target.root != GRAVEYARD
            }
            _ => false,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.kind, OperationKind::NoOp)
    }

    /// Operation that undoes this one when applied right after it
    pub fn inverse(&self) -> Operation {
        let kind = match &self.kind {
            OperationKind::Insert { position, nodes } => OperationKind::Move {
                source: position.clone(),
                how_many: nodes.iter().map(NodeSnapshot::offset_size).sum(),
                target: Position::new(GRAVEYARD, vec![0]),
            },
            OperationKind::Move {
                source,
                how_many,
                target,
            } => {
                let landed = move_insertion_point(source, target, *how_many);
                OperationKind::Move {
                    source: landed.clone(),
                    how_many: *how_many,
                    target: source.transformed_by_insertion(&landed, *how_many),
                }
            }
            OperationKind::Attribute {
                range,
                key,
                old_value,
                new_value,
            } => OperationKind::Attribute {
                range: range.clone(),
                key: key.clone(),
                old_value: new_value.clone(),
                new_value: old_value.clone(),
            },
            OperationKind::NoOp => OperationKind::NoOp,
        };
        Operation::new(self.base_version + 1, kind)
    }

    /// Every position this operation addresses
    pub fn positions(&self) -> Vec<&Position> {
        match &self.kind {
            OperationKind::Insert { position, .. } => vec![position],
            OperationKind::Move { source, target, .. } => vec![source, target],
            OperationKind::Attribute { range, .. } => vec![&range.start, &range.end],
            OperationKind::NoOp => Vec::new(),
        }
    }

    /// Reject positions that address no location at all, before the
    /// operation is transformed or applied anywhere.
    pub fn check_paths(&self) -> Result<(), ModelError> {
        match self.positions().into_iter().find(|position| position.path.is_empty()) {
            Some(position) => Err(ModelError::InvalidPosition {
                root: position.root.clone(),
                path: Vec::new(),
            }),
            None => Ok(()),
        }
    }

    /// Check that the operation can be applied to `tree` as it is now.
    pub fn validate(&self, tree: &Tree) -> Result<(), ModelError> {
        match &self.kind {
            OperationKind::Insert { position, .. } => {
                tree.resolve(position)?;
                Ok(())
            }

            OperationKind::Move {
                source,
                how_many,
                target,
            } => {
                let resolved = tree.resolve(source)?;
                let max = tree.node(resolved.parent).max_offset();
                let end = source.offset() + how_many;
                if end > max {
                    return Err(ModelError::OffsetOutOfBounds { offset: end, max });
                }
                tree.resolve(target)?;

                if source.root == target.root {
                    let i = source.parent_path().len();
                    let nested = target.path.len() > source.path.len()
                        && target.path[..i] == *source.parent_path()
                        && (source.offset()..end).contains(&target.path[i]);
                    let inside = source.has_same_parent_as(target)
                        && source.offset() < target.offset()
                        && target.offset() < end;
                    if nested || inside {
                        return Err(ModelError::MoveIntoItself);
                    }
                }
                Ok(())
            }

            OperationKind::Attribute {
                range,
                key,
                old_value,
                ..
            } => {
                if range.start.root != range.end.root {
                    return Err(ModelError::RangeRootMismatch);
                }
                for item in tree.items(range)? {
                    if item.get_attribute(key) != old_value.as_ref() {
                        return Err(ModelError::WrongOldValue { key: key.clone() });
                    }
                }
                Ok(())
            }

            OperationKind::NoOp => Ok(()),
        }
    }

    /// Validate, then mutate. `nodes` supplies already-built nodes for an
    /// insert so their ids survive; otherwise the snapshots are built.
    pub(crate) fn execute(&self, tree: &mut Tree, nodes: Option<Vec<NodeId>>) -> Result<(), ModelError> {
        self.validate(tree)?;

        match &self.kind {
            OperationKind::Insert { position, nodes: snapshots } => {
                let ids = match nodes {
                    Some(ids) => ids,
                    None => snapshots.iter().map(|s| tree.from_snapshot(s)).collect(),
                };
                insert_at(tree, position, &ids)
            }

            OperationKind::Move {
                source,
                how_many,
                target,
            } => {
                let resolved = tree.resolve(source)?;
                let parent = resolved.parent;
                let start = tree.split_at(parent, source.offset())?;
                let end = tree.split_at(parent, source.offset() + how_many)?;
                let moved = tree.remove_children(parent, start, end);
                tree.normalize(parent, start, start);

                let landed = move_insertion_point(source, target, *how_many);
                insert_at(tree, &landed, &moved)
            }

            OperationKind::Attribute {
                range,
                key,
                old_value,
                new_value,
            } => {
                if old_value == new_value {
                    return Ok(());
                }
                let parent = tree.resolve(&range.start)?.parent;
                let start = tree.split_at(parent, range.start.offset())?;
                let end = tree.split_at(parent, range.end.offset())?;
                let children = tree.node(parent).data().children[start..end].to_vec();
                for child in children {
                    tree.set_node_attribute(child, key, new_value.clone());
                }
                tree.normalize(parent, start, end);
                Ok(())
            }

            OperationKind::NoOp => Ok(()),
        }
    }
}

fn insert_at(tree: &mut Tree, position: &Position, ids: &[NodeId]) -> Result<(), ModelError> {
    let parent = tree.resolve(position)?.parent;
    let index = tree.split_at(parent, position.offset())?;
    tree.insert_children(parent, index, ids);
    tree.normalize(parent, index, index + ids.len());
    Ok(())
}
