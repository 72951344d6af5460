//! # Positions and Ranges
//!
//! A [`Position`] is a root name plus a path of offsets. It holds no node
//! references, so an operation computed against an older tree shape can be
//! transformed to point at the equivalent place in the current one.
//!
//! ## Transformation rules
//!
//! - Operations entirely after a position leave it alone.
//! - An insertion before a position shifts it forward by the inserted
//!   size. At the exact same offset the position's [`Stickiness`] decides:
//!   `ToPrevious` stays, anything else shifts.
//! - A deletion that contains a position (strictly, or anywhere inside a
//!   deleted node) has no answer of its own; the caller picks the fallback.
//!   For removals the position collapses to the removal start.
//! - A move that carries a position takes it along to the target.

use crate::errors::ModelError;
use crate::node::NodeId;
use crate::operation::{Operation, OperationKind};
use crate::tree::{Tree, GRAVEYARD};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Offsets from a root down to a location
pub type Path = Vec<usize>;

/// Tie-break for insertions at exactly this position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stickiness {
    /// Shift with content inserted here
    #[default]
    ToNone,
    /// Stick to the content after; moves along with it
    ToNext,
    /// Stick to the content before; stays put on insertion here
    ToPrevious,
}

/// Relation of two paths, compared element by element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRelation {
    Same,
    /// The first path is a proper prefix of the second
    Prefix,
    /// The second path is a proper prefix of the first
    Extension,
    /// The paths first differ at this index
    Differ(usize),
}

pub fn compare_paths(a: &[usize], b: &[usize]) -> PathRelation {
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        if x != y {
            return PathRelation::Differ(i);
        }
    }
    match a.len().cmp(&b.len()) {
        Ordering::Equal => PathRelation::Same,
        Ordering::Less => PathRelation::Prefix,
        Ordering::Greater => PathRelation::Extension,
    }
}

/// Document order of two positions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionRelation {
    Before,
    Same,
    After,
    /// Different roots; no order
    Different,
}

/// Stable address of a location in a document root
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawPosition")]
pub struct Position {
    pub root: String,
    pub path: Path,
    pub stickiness: Stickiness,
}

/// Wire form of a [`Position`], checked before it becomes one
#[derive(Deserialize)]
struct RawPosition {
    root: String,
    path: Path,
    #[serde(default)]
    stickiness: Stickiness,
}

impl TryFrom<RawPosition> for Position {
    type Error = String;

    fn try_from(raw: RawPosition) -> Result<Self, Self::Error> {
        if raw.path.is_empty() {
            return Err(format!("position in root `{}` has an empty path", raw.root));
        }
        Ok(Self {
            root: raw.root,
            path: raw.path,
            stickiness: raw.stickiness,
        })
    }
}

impl PartialEq for Position {
    /// Stickiness does not take part in equality.
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.path == other.path
    }
}

impl Eq for Position {}

impl Hash for Position {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.root.hash(state);
        self.path.hash(state);
    }
}

impl Position {
    /// Position from a root name and a non-empty path
    pub fn new(root: impl Into<String>, path: Path) -> Self {
        debug_assert!(!path.is_empty(), "a position path needs at least one offset");
        Self {
            root: root.into(),
            path,
            stickiness: Stickiness::ToNone,
        }
    }

    /// Position at `offset` inside an attached element
    pub fn at(tree: &Tree, parent: NodeId, offset: usize) -> Result<Self, ModelError> {
        let root = tree
            .root_name_of(parent)
            .ok_or(ModelError::Detached(parent))?
            .to_string();
        let node = tree.try_node(parent)?;
        if !node.can_have_children() {
            return Err(ModelError::NotAnElement(parent));
        }
        let max = node.max_offset();
        if offset > max {
            return Err(ModelError::OffsetOutOfBounds { offset, max });
        }
        let mut path = node.path()?;
        path.push(offset);
        Ok(Self::new(root, path))
    }

    pub fn at_start(tree: &Tree, parent: NodeId) -> Result<Self, ModelError> {
        Self::at(tree, parent, 0)
    }

    pub fn at_end(tree: &Tree, parent: NodeId) -> Result<Self, ModelError> {
        Self::at(tree, parent, tree.try_node(parent)?.max_offset())
    }

    /// Position right before an attached node
    pub fn before(tree: &Tree, node: NodeId) -> Result<Self, ModelError> {
        let root = tree
            .root_name_of(node)
            .ok_or(ModelError::Detached(node))?
            .to_string();
        let node = tree.try_node(node)?;
        if node.is_root() {
            return Err(ModelError::RootNotAllowed);
        }
        Ok(Self::new(root, node.path()?))
    }

    /// Position right after an attached node
    pub fn after(tree: &Tree, node: NodeId) -> Result<Self, ModelError> {
        let size = tree.try_node(node)?.offset_size();
        Ok(Self::before(tree, node)?.shifted_by(size as isize))
    }

    pub fn with_stickiness(mut self, stickiness: Stickiness) -> Self {
        self.stickiness = stickiness;
        self
    }

    pub fn offset(&self) -> usize {
        self.path.last().copied().unwrap_or(0)
    }

    pub fn set_offset(&mut self, offset: usize) {
        if let Some(last) = self.path.last_mut() {
            *last = offset;
        }
    }

    pub fn with_offset(&self, offset: usize) -> Self {
        let mut position = self.clone();
        position.set_offset(offset);
        position
    }

    /// Same parent, offset moved by `delta` (floored at zero)
    pub fn shifted_by(&self, delta: isize) -> Self {
        let offset = (self.offset() as isize + delta).max(0) as usize;
        self.with_offset(offset)
    }

    pub fn parent_path(&self) -> &[usize] {
        &self.path[..self.path.len().saturating_sub(1)]
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn has_same_parent_as(&self, other: &Position) -> bool {
        self.root == other.root && self.parent_path() == other.parent_path()
    }

    pub fn compare(&self, other: &Position) -> PositionRelation {
        if self.root != other.root {
            return PositionRelation::Different;
        }
        match compare_paths(&self.path, &other.path) {
            PathRelation::Same => PositionRelation::Same,
            PathRelation::Prefix => PositionRelation::Before,
            PathRelation::Extension => PositionRelation::After,
            PathRelation::Differ(i) => {
                if self.path[i] < other.path[i] {
                    PositionRelation::Before
                } else {
                    PositionRelation::After
                }
            }
        }
    }

    pub fn is_before(&self, other: &Position) -> bool {
        self.compare(other) == PositionRelation::Before
    }

    pub fn is_after(&self, other: &Position) -> bool {
        self.compare(other) == PositionRelation::After
    }

    // Transformations

    /// Account for `how_many` offsets inserted at `insert`.
    pub fn transformed_by_insertion(&self, insert: &Position, how_many: usize) -> Position {
        let mut transformed = self.clone();
        if self.root != insert.root {
            return transformed;
        }
        match compare_paths(insert.parent_path(), self.parent_path()) {
            PathRelation::Same => {
                let shifts = insert.offset() < self.offset()
                    || (insert.offset() == self.offset()
                        && self.stickiness != Stickiness::ToPrevious);
                if shifts {
                    transformed.set_offset(self.offset() + how_many);
                }
            }
            PathRelation::Prefix => {
                let i = insert.parent_path().len();
                if insert.offset() <= self.path[i] {
                    transformed.path[i] += how_many;
                }
            }
            _ => {}
        }
        transformed
    }

    /// Account for `how_many` offsets deleted at `delete`. `None` when this
    /// position was inside the deleted content.
    pub fn transformed_by_deletion(&self, delete: &Position, how_many: usize) -> Option<Position> {
        let mut transformed = self.clone();
        if self.root != delete.root {
            return Some(transformed);
        }
        match compare_paths(delete.parent_path(), self.parent_path()) {
            PathRelation::Same => {
                if delete.offset() < self.offset() {
                    if delete.offset() + how_many > self.offset() {
                        return None;
                    }
                    transformed.set_offset(self.offset() - how_many);
                }
            }
            PathRelation::Prefix => {
                let i = delete.parent_path().len();
                if delete.offset() <= self.path[i] {
                    if delete.offset() + how_many > self.path[i] {
                        return None;
                    }
                    transformed.path[i] -= how_many;
                }
            }
            _ => {}
        }
        Some(transformed)
    }

    /// Account for `how_many` offsets moved from `source` to `target`
    /// (`target` given in pre-move coordinates).
    pub fn transformed_by_move(&self, source: &Position, target: &Position, how_many: usize) -> Position {
        let insert_at = move_insertion_point(source, target, how_many);
        if source == &insert_at {
            return self.clone();
        }
        let deleted = self.transformed_by_deletion(source, how_many);
        let carried = deleted.is_none()
            || (source == self && self.stickiness == Stickiness::ToNext)
            || (&source.shifted_by(how_many as isize) == self
                && self.stickiness == Stickiness::ToPrevious);

        match deleted {
            Some(position) if !carried => position.transformed_by_insertion(&insert_at, how_many),
            _ => self.combined(source, &insert_at),
        }
    }

    /// Re-anchor a position that lies in content moved from `source` to
    /// `target` (`target` in post-deletion coordinates).
    pub fn combined(&self, source: &Position, target: &Position) -> Position {
        let i = source.parent_path().len();
        let mut combined = target.clone();
        combined.stickiness = self.stickiness;
        let at = self.path.get(i).copied().unwrap_or(0);
        combined.set_offset(combined.offset() + at.saturating_sub(source.offset()));
        combined.path.extend_from_slice(self.path.get(i + 1..).unwrap_or(&[]));
        combined
    }

    /// Follow one applied operation.
    ///
    /// Positions inside content that was removed collapse to the start of
    /// the removal.
    pub fn transformed_by_operation(&self, operation: &Operation) -> Position {
        match &operation.kind {
            OperationKind::Insert { position, nodes } => {
                let how_many = nodes.iter().map(|n| n.offset_size()).sum();
                self.transformed_by_insertion(position, how_many)
            }
            OperationKind::Move {
                source,
                how_many,
                target,
            } => {
                if operation.is_removal() && self.root != GRAVEYARD {
                    self.transformed_by_deletion(source, *how_many)
                        .unwrap_or_else(|| source.clone().with_stickiness(self.stickiness))
                } else {
                    self.transformed_by_move(source, target, *how_many)
                }
            }
            OperationKind::Attribute { .. } | OperationKind::NoOp => self.clone(),
        }
    }
}

/// Where moved content lands once it has been taken out of `source`.
pub(crate) fn move_insertion_point(source: &Position, target: &Position, how_many: usize) -> Position {
    target
        .transformed_by_deletion(source, how_many)
        .unwrap_or_else(|| target.clone())
}

/// Span between two positions in one root, `start` not after `end`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    /// Range between two positions, swapped into document order if needed
    pub fn new(start: Position, end: Position) -> Self {
        if end.is_before(&start) {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    pub fn collapsed(position: Position) -> Self {
        Self {
            start: position.clone(),
            end: position,
        }
    }

    pub fn from_position_and_shift(position: &Position, shift: usize) -> Self {
        Self::new(position.clone(), position.shifted_by(shift as isize))
    }

    /// Range covering exactly one attached node
    pub fn on_node(tree: &Tree, node: NodeId) -> Result<Self, ModelError> {
        Ok(Self::new(Position::before(tree, node)?, Position::after(tree, node)?))
    }

    /// Range covering all content of an attached element
    pub fn in_element(tree: &Tree, element: NodeId) -> Result<Self, ModelError> {
        Ok(Self::new(
            Position::at_start(tree, element)?,
            Position::at_end(tree, element)?,
        ))
    }

    pub fn root(&self) -> &str {
        &self.start.root
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    /// Both ends share a parent
    pub fn is_flat(&self) -> bool {
        self.start.has_same_parent_as(&self.end)
    }

    /// Offset count of a flat range
    pub fn len(&self) -> usize {
        self.end.offset().saturating_sub(self.start.offset())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Strictly between `start` and `end`
    pub fn contains_position(&self, position: &Position) -> bool {
        position.is_after(&self.start) && position.is_before(&self.end)
    }

    pub fn contains_range(&self, other: &Range) -> bool {
        let start_ok = matches!(
            other.start.compare(&self.start),
            PositionRelation::After | PositionRelation::Same
        );
        let end_ok = matches!(
            other.end.compare(&self.end),
            PositionRelation::Before | PositionRelation::Same
        );
        start_ok && end_ok
    }

    /// Overlap of two flat ranges that share a parent
    pub fn intersection(&self, other: &Range) -> Option<Range> {
        if !self.start.has_same_parent_as(&other.start) {
            return None;
        }
        let start = self.start.offset().max(other.start.offset());
        let end = self.end.offset().min(other.end.offset());
        (start < end).then(|| Range::new(self.start.with_offset(start), self.start.with_offset(end)))
    }

    /// Parts of a flat range not covered by another flat range with the
    /// same parent, in document order.
    pub fn difference(&self, other: &Range) -> Vec<Range> {
        if !self.start.has_same_parent_as(&other.start) {
            return vec![self.clone()];
        }
        let (a, b) = (self.start.offset(), self.end.offset());
        let (c, d) = (other.start.offset(), other.end.offset());
        let mut parts = Vec::new();
        if a < c.min(b) {
            parts.push(Range::new(self.start.clone(), self.start.with_offset(c.min(b))));
        }
        if a.max(d) < b {
            parts.push(Range::new(self.start.with_offset(a.max(d)), self.end.clone()));
        }
        parts
    }

    /// Account for an insertion. Content inserted strictly inside becomes
    /// part of the range.
    pub fn transformed_by_insertion(&self, insert: &Position, how_many: usize) -> Range {
        insert_into(self, insert, how_many, false).remove(0)
    }

    /// Account for an insertion, leaving content inserted strictly inside
    /// out of the result (which then has two pieces).
    pub fn transformed_by_insertion_split(&self, insert: &Position, how_many: usize) -> Vec<Range> {
        insert_into(self, insert, how_many, true)
    }

    /// Account for a move. The result has up to three pieces: the part
    /// that stayed, cut where the moved content landed when `spread` is set
    /// or when the move took part of this range along, and the part that
    /// travelled.
    pub fn transformed_by_move(
        &self,
        source: &Position,
        target: &Position,
        how_many: usize,
        spread: bool,
    ) -> Vec<Range> {
        if self.is_collapsed() {
            let position = self.start.transformed_by_move(source, target, how_many);
            return vec![Range::collapsed(position)];
        }
        let insert_at = move_insertion_point(source, target, how_many);
        if source == &insert_at {
            return vec![self.clone()];
        }

        let (stayed, travelled) = if self.is_flat() && self.start.has_same_parent_as(source) {
            let (a, b) = (self.start.offset(), self.end.offset());
            let (c, d) = (source.offset(), source.offset() + how_many);

            let common = (a.max(c) < b.min(d)).then(|| (a.max(c), b.min(d)));
            let left = (a < b.min(c)).then(|| (a, b.min(c)));
            let right = (a.max(d) < b).then(|| (a.max(d) - how_many, b - how_many));
            let stayed = match (left, right) {
                (Some((from, _)), Some((_, to))) => Some((from, to)),
                (Some(piece), None) | (None, Some(piece)) => Some(piece),
                (None, None) => None,
            };
            (
                stayed.map(|(from, to)| {
                    Range::new(self.start.with_offset(from), self.start.with_offset(to))
                }),
                common.map(|(from, to)| {
                    Range::new(self.start.with_offset(from), self.start.with_offset(to))
                }),
            )
        } else {
            // Cut at the edges of the moved content; only the part inside it
            // travels.
            let source_end = source.shifted_by(how_many as isize);
            match (
                self.start.transformed_by_deletion(source, how_many),
                self.end.transformed_by_deletion(source, how_many),
            ) {
                (None, None) => (None, Some(self.clone())),
                (None, Some(end)) => (
                    Some(Range::new(source.clone(), end)),
                    Some(Range::new(self.start.clone(), source_end)),
                ),
                (Some(start), None) => (
                    Some(Range::new(start, source.clone())),
                    Some(Range::new(source.clone(), self.end.clone())),
                ),
                (Some(start), Some(end)) => (Some(Range::new(start, end)), None),
            }
        };
        let stayed = stayed.filter(|range| travelled.is_none() || !range.is_collapsed());

        let mut pieces = match &stayed {
            Some(range) => insert_into(range, &insert_at, how_many, spread || travelled.is_some()),
            None => Vec::new(),
        };
        if let Some(range) = travelled {
            let moved = Range::new(
                range.start.combined(source, &insert_at),
                range.end.combined(source, &insert_at),
            );
            if pieces.len() == 2 {
                pieces.insert(1, moved);
            } else {
                pieces.push(moved);
            }
        }
        pieces
    }

    /// Follow one applied operation.
    ///
    /// Parts that were removed are dropped; a range removed entirely
    /// collapses to the removal start.
    pub fn transformed_by_operation(&self, operation: &Operation) -> Vec<Range> {
        match &operation.kind {
            OperationKind::Insert { position, nodes } => {
                let how_many = nodes.iter().map(|n| n.offset_size()).sum();
                vec![self.transformed_by_insertion(position, how_many)]
            }
            OperationKind::Move {
                source,
                how_many,
                target,
            } => {
                let mut pieces = self.transformed_by_move(source, target, *how_many, false);
                if operation.is_removal() && self.root() != GRAVEYARD {
                    pieces.retain(|piece| piece.root() != GRAVEYARD);
                    if pieces.is_empty() {
                        pieces.push(Range::collapsed(source.clone()));
                    }
                }
                pieces
            }
            OperationKind::Attribute { .. } | OperationKind::NoOp => vec![self.clone()],
        }
    }
}

fn insert_into(range: &Range, insert: &Position, how_many: usize, split: bool) -> Vec<Range> {
    let inside = range.start.has_same_parent_as(insert)
        && range.is_flat()
        && range.start.offset() < insert.offset()
        && insert.offset() < range.end.offset();

    if inside {
        let end = range.end.shifted_by(how_many as isize);
        if split {
            return vec![
                Range::new(range.start.clone(), insert.with_offset(insert.offset())),
                Range::new(insert.shifted_by(how_many as isize), end),
            ];
        }
        return vec![Range::new(range.start.clone(), end)];
    }

    let (start_stickiness, end_stickiness) = if range.is_collapsed() {
        (Stickiness::ToNone, Stickiness::ToNone)
    } else {
        (Stickiness::ToNext, Stickiness::ToPrevious)
    };
    let start = range
        .start
        .clone()
        .with_stickiness(start_stickiness)
        .transformed_by_insertion(insert, how_many)
        .with_stickiness(range.start.stickiness);
    let end = range
        .end
        .clone()
        .with_stickiness(end_stickiness)
        .transformed_by_insertion(insert, how_many)
        .with_stickiness(range.end.stickiness);
    vec![Range::new(start, end)]
}
