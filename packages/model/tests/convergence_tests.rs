//! Two sites apply the same pair of concurrent operations in opposite
//! orders and must end up with the same main root.

use proptest::prelude::*;
use quire_model::{transform_sets, Document, NodeSnapshot, Operation, OperationKind, Position, GRAVEYARD};

const TEXTS: [&str; 3] = ["abcd", "efgh", "ijkl"];

fn main(path: &[usize]) -> Position {
    Position::new("main", path.to_vec())
}

fn graveyard() -> Position {
    Position::new(GRAVEYARD, vec![0])
}

fn paragraph(text: &str) -> NodeSnapshot {
    NodeSnapshot::element("paragraph", vec![NodeSnapshot::text(text)])
}

fn three_paragraphs() -> Document {
    let mut doc = Document::new();
    let initial = TEXTS.iter().enumerate().map(|(i, text)| {
        Operation::new(
            i as u64,
            OperationKind::Insert {
                position: main(&[i]),
                nodes: vec![paragraph(text)],
            },
        )
    });
    doc.apply_operations(initial).expect("initial paragraphs");
    doc
}

/// Element name and text of every block in the main root
fn blocks(doc: &Document) -> Vec<String> {
    doc.tree()
        .node(doc.main_root_id())
        .children()
        .map(|block| {
            let text: String = block.children().filter_map(|t| t.data_str()).collect();
            format!("{}:{}", block.name().unwrap_or("#text"), text)
        })
        .collect()
}

/// Start and length of a run within `len` offsets
fn span(len: usize) -> impl Strategy<Value = (usize, usize)> {
    (0..len).prop_flat_map(move |start| (Just(start), 1..=len - start))
}

/// A target inside the run it moves is turned into the run start.
fn outside(start: usize, count: usize, target: usize) -> usize {
    if start < target && target < start + count {
        start
    } else {
        target
    }
}

fn text_move() -> impl Strategy<Value = OperationKind> {
    (0..3usize, span(4), 0..3usize, 0..=4usize).prop_map(|(from, (start, count), to, target)| {
        let target = if from == to { outside(start, count, target) } else { target };
        OperationKind::Move {
            source: main(&[from, start]),
            how_many: count,
            target: main(&[to, target]),
        }
    })
}

fn text_removal() -> impl Strategy<Value = OperationKind> {
    (0..3usize, span(4)).prop_map(|(from, (start, count))| OperationKind::Move {
        source: main(&[from, start]),
        how_many: count,
        target: graveyard(),
    })
}

fn block_move() -> impl Strategy<Value = OperationKind> {
    (span(3), 0..=3usize).prop_map(|((start, count), target)| OperationKind::Move {
        source: main(&[start]),
        how_many: count,
        target: main(&[outside(start, count, target)]),
    })
}

fn block_removal() -> impl Strategy<Value = OperationKind> {
    span(3).prop_map(|(start, count)| OperationKind::Move {
        source: main(&[start]),
        how_many: count,
        target: graveyard(),
    })
}

fn text_insertion() -> impl Strategy<Value = OperationKind> {
    (0..3usize, 0..=4usize).prop_map(|(block, offset)| OperationKind::Insert {
        position: main(&[block, offset]),
        nodes: vec![NodeSnapshot::text("xy")],
    })
}

fn block_insertion() -> impl Strategy<Value = OperationKind> {
    (0..=3usize).prop_map(|offset| OperationKind::Insert {
        position: main(&[offset]),
        nodes: vec![paragraph("new")],
    })
}

fn concurrent_change() -> impl Strategy<Value = OperationKind> {
    prop_oneof![
        3 => text_move(),
        2 => text_removal(),
        2 => block_move(),
        1 => block_removal(),
        1 => text_insertion(),
        1 => block_insertion(),
    ]
}

/// Apply `first`, then `rest` rebased over it.
fn apply_in_order(first: &Operation, rest: &[Operation]) -> Result<Vec<String>, String> {
    let mut doc = three_paragraphs();
    doc.apply_operation(first.clone())
        .and_then(|()| doc.apply_operations(rest.to_vec()).map(|_| ()))
        .map_err(|err| format!("{} then {:?}: {}", first.operation_type(), rest, err))?;
    Ok(blocks(&doc))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2000))]

    #[test]
    fn test_concurrent_changes_converge(
        a in concurrent_change(),
        b in concurrent_change(),
        a_is_stronger in any::<bool>(),
    ) {
        let version = three_paragraphs().version();
        let a = Operation::new(version, a);
        let b = Operation::new(version, b);
        let (a_after_b, b_after_a) = transform_sets(&[a.clone()], &[b.clone()], a_is_stronger);

        let site_a = apply_in_order(&a, &b_after_a);
        let site_b = apply_in_order(&b, &a_after_b);
        prop_assert!(site_a.is_ok(), "{:?}", site_a);
        prop_assert!(site_b.is_ok(), "{:?}", site_b);
        prop_assert_eq!(site_a, site_b, "a = {:?}, b = {:?}", a, b);
    }
}

#[test]
fn test_removal_and_move_into_it_converge() {
    // One site removes "kl" while the other moves "h" between them.
    let version = three_paragraphs().version();
    let a = Operation::new(
        version,
        OperationKind::Move {
            source: main(&[2, 2]),
            how_many: 2,
            target: graveyard(),
        },
    );
    let b = Operation::new(
        version,
        OperationKind::Move {
            source: main(&[1, 3]),
            how_many: 1,
            target: main(&[2, 3]),
        },
    );
    let (a_after_b, b_after_a) = transform_sets(&[a.clone()], &[b.clone()], true);

    let site_a = apply_in_order(&a, &b_after_a).unwrap();
    let site_b = apply_in_order(&b, &a_after_b).unwrap();
    assert_eq!(site_a, site_b);
    assert_eq!(site_a, vec!["paragraph:abcd", "paragraph:efg", "paragraph:ij"]);
}

#[test]
fn test_move_into_carried_range_converges() {
    // "ijk" goes into the first paragraph while "l" is moved between "j" and "k".
    let version = three_paragraphs().version();
    let a = Operation::new(
        version,
        OperationKind::Move {
            source: main(&[2, 0]),
            how_many: 3,
            target: main(&[0, 2]),
        },
    );
    let b = Operation::new(
        version,
        OperationKind::Move {
            source: main(&[2, 3]),
            how_many: 1,
            target: main(&[2, 2]),
        },
    );
    let (a_after_b, b_after_a) = transform_sets(&[a.clone()], &[b.clone()], false);

    let site_a = apply_in_order(&a, &b_after_a).unwrap();
    let site_b = apply_in_order(&b, &a_after_b).unwrap();
    assert_eq!(site_a, site_b);
    assert_eq!(site_a, vec!["paragraph:abijlkcd", "paragraph:efgh", "paragraph:"]);
}
