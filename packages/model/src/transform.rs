//! # Operational Transformation
//!
//! Rebases an operation over a concurrent one so both sites converge.
//!
//! `transform(a, b, a_is_stronger)` answers: "`b` was applied first; what
//! must be applied instead of `a`?" The result can hold several operations
//! (a move cut into pieces) or a single [`OperationKind::NoOp`].
//!
//! ## Conflict rules
//!
//! - Two insertions at the same position: the stronger one ends up first.
//! - Two moves of the same content: the stronger target wins. Removal beats
//!   any other move of the same content.
//! - Two moves into each other's content (a cycle): the stronger move is
//!   applied after reverting the weaker one; the weaker becomes a no-op.
//! - A move whose target lies inside the other move's content travels
//!   with it, and the other move takes that content along. Removing a range
//!   removes whatever was moved into it.
//! - Two attribute changes of the same key on overlapping items: the
//!   stronger value is kept on the overlap.
//! - A move that puts its content back where it was is a no-op.
//!
//! Convergence holds for every non-graveyard root. The graveyard may end up
//! with removed content in a different order on each site.

use crate::operation::{Operation, OperationKind};
use crate::position::{move_insertion_point, Position, Range, Stickiness};

/// Transform `a` so it can be applied after `b`.
pub fn transform(a: &Operation, b: &Operation, a_is_stronger: bool) -> Vec<Operation> {
    let base_version = a.base_version;
    let with_kind = |kind| Operation::new(base_version, kind);

    if let OperationKind::Move { source, how_many, target } = &a.kind {
        if is_idle_move(source, target, *how_many) {
            return vec![Operation::noop(base_version)];
        }
    }

    match (&a.kind, &b.kind) {
        (OperationKind::NoOp, _) | (_, OperationKind::NoOp) => vec![a.clone()],

        (OperationKind::Insert { position, nodes }, OperationKind::Insert { position: other, nodes: other_nodes }) => {
            let stickiness = if a_is_stronger {
                Stickiness::ToPrevious
            } else {
                Stickiness::ToNone
            };
            let how_many = other_nodes.iter().map(|n| n.offset_size()).sum();
            let position = position
                .clone()
                .with_stickiness(stickiness)
                .transformed_by_insertion(other, how_many)
                .with_stickiness(Stickiness::ToNone);
            vec![with_kind(OperationKind::Insert {
                position,
                nodes: nodes.clone(),
            })]
        }

        (OperationKind::Insert { position, nodes }, OperationKind::Move { source, how_many, target }) => {
            vec![with_kind(OperationKind::Insert {
                position: position.transformed_by_move(source, target, *how_many),
                nodes: nodes.clone(),
            })]
        }

        (OperationKind::Insert { .. }, OperationKind::Attribute { .. }) => vec![a.clone()],

        (OperationKind::Move { source, how_many, target }, OperationKind::Insert { position, nodes }) => {
            let inserted = nodes.iter().map(|n| n.offset_size()).sum();
            let range = Range::from_position_and_shift(source, *how_many)
                .transformed_by_insertion(position, inserted);
            let target = if target == position {
                target.clone()
            } else {
                target.transformed_by_insertion(position, inserted)
            };
            vec![with_kind(OperationKind::Move {
                source: range.start.clone(),
                how_many: range.len(),
                target,
            })]
        }

        (OperationKind::Move { .. }, OperationKind::Move { .. }) => move_by_move(a, b, a_is_stronger),

        (OperationKind::Move { .. }, OperationKind::Attribute { .. }) => vec![a.clone()],

        (OperationKind::Attribute { range, key, old_value, new_value }, OperationKind::Insert { position, nodes }) => {
            let inserted = nodes.iter().map(|n| n.offset_size()).sum();
            range
                .transformed_by_insertion_split(position, inserted)
                .into_iter()
                .map(|range| {
                    with_kind(OperationKind::Attribute {
                        range,
                        key: key.clone(),
                        old_value: old_value.clone(),
                        new_value: new_value.clone(),
                    })
                })
                .collect()
        }

        (OperationKind::Attribute { range, key, old_value, new_value }, OperationKind::Move { source, how_many, target }) => {
            range
                .transformed_by_move(source, target, *how_many, true)
                .into_iter()
                .filter(|range| !range.is_collapsed())
                .map(|range| {
                    with_kind(OperationKind::Attribute {
                        range,
                        key: key.clone(),
                        old_value: old_value.clone(),
                        new_value: new_value.clone(),
                    })
                })
                .collect::<Vec<_>>()
                .or_noop(base_version)
        }

        (
            OperationKind::Attribute { range, key, old_value, new_value },
            OperationKind::Attribute { range: other, key: other_key, new_value: other_new, .. },
        ) => {
            if key != other_key {
                return vec![a.clone()];
            }
            let Some(common) = range.intersection(other) else {
                return vec![a.clone()];
            };

            let mut operations: Vec<Operation> = range
                .difference(other)
                .into_iter()
                .map(|range| {
                    with_kind(OperationKind::Attribute {
                        range,
                        key: key.clone(),
                        old_value: old_value.clone(),
                        new_value: new_value.clone(),
                    })
                })
                .collect();
            if a_is_stronger && other_new != new_value {
                operations.push(with_kind(OperationKind::Attribute {
                    range: common,
                    key: key.clone(),
                    old_value: other_new.clone(),
                    new_value: new_value.clone(),
                }));
            }
            if operations.is_empty() {
                tracing::debug!(key = %key, "attribute change lost to a concurrent change");
            }
            operations.or_noop(base_version)
        }
    }
}

trait OrNoop {
    fn or_noop(self, base_version: u64) -> Vec<Operation>;
}

impl OrNoop for Vec<Operation> {
    fn or_noop(self, base_version: u64) -> Vec<Operation> {
        if self.is_empty() {
            vec![Operation::noop(base_version)]
        } else {
            self
        }
    }
}

/// Whether `position` lies in the content moved from `source`: strictly
/// between the moved nodes or anywhere inside one of them.
fn is_inside(position: &Position, source: &Position, how_many: usize) -> bool {
    position.transformed_by_deletion(source, how_many).is_none()
}

/// What a move still has to take from `range` after a concurrent move of
/// `how_many` from `source` landed at `landed`, in original order.
///
/// `keep_shared` keeps the content both moves took; it is then picked up
/// where the concurrent move left it. Content that landed strictly inside
/// `range` becomes part of it.
fn split_by_move(
    range: &Range,
    source: &Position,
    how_many: usize,
    landed: &Position,
    keep_shared: bool,
) -> Vec<Range> {
    if range.start.has_same_parent_as(source) {
        let (a, b) = (range.start.offset(), range.end.offset());
        let (c, d) = (source.offset(), source.offset() + how_many);
        let at = |offset: usize| range.start.with_offset(offset);

        let left = (a < b.min(c)).then(|| Range::new(at(a), at(b.min(c))));
        let right = (a.max(d) < b).then(|| Range::new(at(a.max(d) - how_many), at(b - how_many)));

        if !keep_shared {
            // With the shared part gone both sides close up into one span.
            let stayed = match (left, right) {
                (Some(left), Some(right)) => Some(Range::new(left.start, right.end)),
                (left, right) => left.or(right),
            };
            return stayed
                .map(|range| range.transformed_by_insertion(landed, how_many))
                .into_iter()
                .collect();
        }

        let shared = (a.max(c) < b.min(d)).then(|| {
            Range::new(
                at(a.max(c)).combined(source, landed),
                at(b.min(d)).combined(source, landed),
            )
        });
        return [
            left.map(|range| range.transformed_by_insertion(landed, how_many)),
            shared,
            right.map(|range| range.transformed_by_insertion(landed, how_many)),
        ]
        .into_iter()
        .flatten()
        .collect();
    }

    if is_inside(&range.start, source, how_many) {
        return vec![Range::new(
            range.start.combined(source, landed),
            range.end.combined(source, landed),
        )];
    }

    let start = range
        .start
        .transformed_by_deletion(source, how_many)
        .unwrap_or_else(|| range.start.clone());
    let end = range
        .end
        .transformed_by_deletion(source, how_many)
        .unwrap_or_else(|| start.clone());
    vec![Range::new(start, end).transformed_by_insertion(landed, how_many)]
}

/// A move that puts its content back where it was
fn is_idle_move(source: &Position, target: &Position, how_many: usize) -> bool {
    how_many == 0 || move_insertion_point(source, target, how_many) == *source
}

fn move_by_move(a: &Operation, b: &Operation, a_is_stronger: bool) -> Vec<Operation> {
    let (
        OperationKind::Move {
            source: a_source,
            how_many: a_count,
            target: a_target,
        },
        OperationKind::Move {
            source: b_source,
            how_many: b_count,
            target: b_target,
        },
    ) = (&a.kind, &b.kind)
    else {
        return vec![a.clone()];
    };
    let (a_count, b_count) = (*a_count, *b_count);
    let base_version = a.base_version;

    if is_idle_move(b_source, b_target, b_count) {
        return vec![a.clone()];
    }
    let b_landed = move_insertion_point(b_source, b_target, b_count);

    let a_target_in_b = is_inside(a_target, b_source, b_count);
    let b_target_in_a = is_inside(b_target, a_source, a_count);

    // Each move drops its content into the other's.
    if a_target_in_b && b_target_in_a {
        tracing::debug!(a_is_stronger, "cyclic moves");
        if a_is_stronger {
            let mut undo = b.inverse();
            undo.base_version = base_version;
            return vec![undo, a.clone()];
        }
        return vec![Operation::noop(base_version)];
    }

    // Content both moves took follows the move whose target travels with
    // the other one; otherwise removal wins, then strength.
    let keep_shared = if b_target_in_a {
        false
    } else if a_target_in_b {
        true
    } else {
        !(b.is_removal() || (!a.is_removal() && !a_is_stronger))
    };
    let range = Range::from_position_and_shift(a_source, a_count);
    let mut pieces: Vec<Range> = split_by_move(&range, b_source, b_count, &b_landed, keep_shared)
        .into_iter()
        .filter(|range| !range.is_collapsed())
        .collect();

    let mut target = match a_target.transformed_by_deletion(b_source, b_count) {
        None => a_target.combined(b_source, &b_landed),
        Some(target) => {
            let stickiness = if target == b_landed && a_is_stronger {
                Stickiness::ToPrevious
            } else {
                Stickiness::ToNone
            };
            target
                .with_stickiness(stickiness)
                .transformed_by_insertion(&b_landed, b_count)
                .with_stickiness(Stickiness::ToNone)
        }
    };

    if pieces.is_empty() {
        tracing::debug!("move lost all of its content to a concurrent move");
        return vec![Operation::noop(base_version)];
    }

    // Emit in original order; each emitted move shifts what is left.
    let mut operations = Vec::with_capacity(pieces.len());
    while !pieces.is_empty() {
        let piece = pieces.remove(0);
        let source = piece.start.clone();
        let how_many = piece.len();
        for rest in pieces.iter_mut() {
            if let Some(moved) = rest.transformed_by_move(&source, &target, how_many, false).into_iter().next() {
                *rest = moved;
            }
        }
        let next_target = move_insertion_point(&source, &target, how_many).shifted_by(how_many as isize);
        operations.push(Operation::new(
            base_version,
            OperationKind::Move {
                source,
                how_many,
                target: target.clone(),
            },
        ));
        target = next_target;
    }
    operations
}

/// Transform two concurrent operation lists against each other.
///
/// Returns `(a', b')` where `a'` applies after `b` and `b'` applies after
/// `a`. Base versions are renumbered: `a'` continues from the end of `b`
/// and `b'` from the end of `a`.
pub fn transform_sets(
    a: &[Operation],
    b: &[Operation],
    a_is_stronger: bool,
) -> (Vec<Operation>, Vec<Operation>) {
    let a_end = a.first().map(|op| op.base_version + a.len() as u64);
    let b_end = b.first().map(|op| op.base_version + b.len() as u64);

    let (mut a_out, mut b_out) = transform_lists(a.to_vec(), b.to_vec(), a_is_stronger);
    if let Some(start) = b_end {
        renumber(&mut a_out, start);
    }
    if let Some(start) = a_end {
        renumber(&mut b_out, start);
    }
    (a_out, b_out)
}

fn renumber(operations: &mut [Operation], start: u64) {
    for (i, op) in operations.iter_mut().enumerate() {
        op.base_version = start + i as u64;
    }
}

fn transform_lists(
    mut a: Vec<Operation>,
    mut b: Vec<Operation>,
    a_is_stronger: bool,
) -> (Vec<Operation>, Vec<Operation>) {
    if a.is_empty() || b.is_empty() {
        return (a, b);
    }
    if a.len() == 1 && b.len() == 1 {
        let a_transformed = transform(&a[0], &b[0], a_is_stronger);
        let b_transformed = transform(&b[0], &a[0], !a_is_stronger);
        return (a_transformed, b_transformed);
    }
    if a.len() > 1 {
        let rest = a.split_off(1);
        let (mut head, b) = transform_lists(a, b, a_is_stronger);
        let (tail, b) = transform_lists(rest, b, a_is_stronger);
        head.extend(tail);
        return (head, b);
    }
    let rest = b.split_off(1);
    let (a, mut head) = transform_lists(a, b, a_is_stronger);
    let (a, tail) = transform_lists(a, rest, a_is_stronger);
    head.extend(tail);
    (a, head)
}
