//! Integration tests for the model crate

use anyhow::Result;
use quire_model::{
    transform_sets, AncestorOptions, Attributes, Document, EditSession, ModelConfig, ModelError,
    NodeId, NodeSnapshot, Operation, OperationKind, Position, Range, UndoStack,
};
use serde_json::json;
use std::cell::Cell;
use std::rc::Rc;

/// Route the crate's tracing output to the test harness
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn main(path: &[usize]) -> Position {
    Position::new("main", path.to_vec())
}

fn paragraph(text: &str) -> NodeSnapshot {
    NodeSnapshot::element("paragraph", vec![NodeSnapshot::text(text)])
}

fn main_snapshot(doc: &Document) -> NodeSnapshot {
    doc.tree().snapshot(doc.main_root_id())
}

fn paragraph_text(doc: &Document, index: usize) -> String {
    doc.tree()
        .node(doc.main_root_id())
        .child(index)
        .map(|p| p.children().filter_map(|t| t.data_str()).collect())
        .unwrap_or_default()
}

/// Orders submitted changes and rebases late ones over what it already has.
struct Server {
    document: Document,
}

impl Server {
    fn new(initial: Vec<Operation>) -> Result<Self> {
        let mut document = Document::new();
        document.apply_operations(initial)?;
        Ok(Self { document })
    }

    fn version(&self) -> u64 {
        self.document.version()
    }

    fn submit(&mut self, operations: Vec<Operation>) -> Result<Vec<Operation>> {
        let Some(first) = operations.first() else {
            return Ok(Vec::new());
        };
        let concurrent = self.document.operations_since(first.base_version).to_vec();
        let (rebased, _) = transform_sets(&operations, &concurrent, false);
        self.document.apply_operations(rebased.clone())?;
        Ok(rebased)
    }

    fn client(&self, id: &str, initial: Vec<Operation>) -> Result<EditSession> {
        let mut document = Document::new();
        document.apply_operations(initial)?;
        Ok(EditSession::new(id, document, self.version()))
    }
}

fn initial() -> Vec<Operation> {
    vec![Operation::new(
        0,
        OperationKind::Insert {
            position: main(&[0]),
            nodes: vec![paragraph("abc")],
        },
    )]
}

#[test]
fn test_document_lifecycle() -> Result<()> {
    let mut doc = Document::new();
    let root = doc.main_root_id();
    assert_eq!(doc.version(), 0);

    let text = doc.change(|writer| {
        let p = writer.create_element("paragraph", Attributes::new());
        writer.append(p, root)?;
        let text = writer.create_text("Hello", Attributes::new());
        writer.append(text, p)?;
        Ok(text)
    })?;

    assert_eq!(doc.version(), 2);
    assert_eq!(paragraph_text(&doc, 0), "Hello");
    assert!(doc.tree().is_attached(text));
    assert_eq!(doc.tree().node(text).document(), Some(doc.id()));
    Ok(())
}

#[test]
fn test_offsets_and_paths_are_consistent() -> Result<()> {
    let mut doc = Document::new();
    doc.change(|writer| {
        writer.insert_snapshot(
            NodeSnapshot::element(
                "paragraph",
                vec![
                    NodeSnapshot::text("foo"),
                    NodeSnapshot::element("image", vec![]),
                    NodeSnapshot::text("bar").with_attribute("bold", json!(true)),
                ],
            ),
            &main(&[0]),
        )?;
        writer.insert_snapshot(paragraph("second"), &main(&[1]))
    })?;

    let tree = doc.tree();
    let mut stack: Vec<NodeId> = vec![doc.main_root_id()];
    while let Some(id) = stack.pop() {
        let node = tree.node(id);
        if let Some(parent) = node.parent() {
            let index = node.index()?.unwrap_or(usize::MAX);
            assert_eq!(parent.child(index).map(|c| c.id()), Some(id));

            let preceding: usize = parent.children().take(index).map(|c| c.offset_size()).sum();
            assert_eq!(node.start_offset()?, Some(preceding));

            let before = Position::before(tree, id)?;
            assert_eq!(before.path, node.path()?);
            assert_eq!(tree.resolve(&before)?.parent, parent.id());
        }
        stack.extend(node.children().map(|c| c.id()));
    }
    Ok(())
}

#[test]
fn test_ancestors_and_common_ancestor() -> Result<()> {
    let mut doc = Document::new();
    doc.change(|writer| {
        writer.insert_snapshot(
            NodeSnapshot::element("quote", vec![paragraph("a"), paragraph("b")]),
            &main(&[0]),
        )
    })?;

    let tree = doc.tree();
    let root = tree.node(doc.main_root_id());
    let quote = root.child(0).unwrap();
    let (first, second) = (quote.child(0).unwrap(), quote.child(1).unwrap());
    let text = first.child(0).unwrap();

    let chain = text.ancestors(AncestorOptions {
        include_self: true,
        parent_first: true,
    });
    assert_eq!(chain.len(), 4);
    assert_eq!(chain[0], text);
    assert_eq!(chain[3], root);

    assert_eq!(first.common_ancestor(&second, false), Some(quote));
    assert_eq!(text.common_ancestor(&first, true), Some(first));

    // Disjoint trees share nothing
    let detached = doc.create_element("paragraph", Attributes::new());
    let tree = doc.tree();
    let quote = tree.node(doc.main_root_id()).child(0).unwrap();
    assert_eq!(quote.common_ancestor(&tree.node(detached), true), None);
    Ok(())
}

#[test]
fn test_failed_call_leaves_tree_untouched() -> Result<()> {
    let mut doc = Document::new();
    doc.change(|writer| writer.insert_snapshot(paragraph("abc"), &main(&[0])))?;
    let before = main_snapshot(&doc);
    let version = doc.version();

    let err = doc
        .change(|writer| writer.insert_text("x", Attributes::new(), &main(&[0, 9])))
        .unwrap_err();
    assert!(matches!(err, ModelError::OffsetOutOfBounds { .. }));

    let err = doc
        .change(|writer| writer.remove_range(&Range::new(main(&[0, 1]), main(&[1]))))
        .unwrap_err();
    assert_eq!(err, ModelError::RangeNotFlat);

    assert_eq!(main_snapshot(&doc), before);
    assert_eq!(doc.version(), version);
    Ok(())
}

#[test]
fn test_listeners_see_every_operation() -> Result<()> {
    let mut doc = Document::new();
    let seen = Rc::new(Cell::new(0));
    let blocks = Rc::new(Cell::new(0));

    let counter = seen.clone();
    let listener = doc.on_change(move |_| counter.set(counter.get() + 1));
    let block_counter = blocks.clone();
    doc.on_change_block(move |_, _| block_counter.set(block_counter.get() + 1));

    doc.change(|writer| {
        writer.insert_snapshot(paragraph("a"), &main(&[0]))?;
        writer.insert_snapshot(paragraph("b"), &main(&[1]))
    })?;
    assert_eq!(seen.get(), 2);
    assert_eq!(blocks.get(), 1);

    assert!(doc.off_change(listener));
    doc.change(|writer| writer.insert_snapshot(paragraph("c"), &main(&[2])))?;
    assert_eq!(seen.get(), 2);
    assert_eq!(blocks.get(), 2);
    Ok(())
}

#[test]
fn test_stale_position_is_transformed() -> Result<()> {
    let mut doc = Document::new();
    doc.change(|writer| writer.insert_snapshot(paragraph("hello world"), &main(&[0])))?;
    let version = doc.version();
    let caret = main(&[0, 6]);

    doc.change(|writer| {
        writer.insert_text(">> ", Attributes::new(), &main(&[0, 0]))?;
        writer.insert_snapshot(paragraph("title"), &main(&[0]))
    })?;

    assert_eq!(doc.transform_position(&caret, version), main(&[1, 9]));
    Ok(())
}

#[test]
fn test_sessions_converge_when_server_orders() -> Result<()> {
    init_tracing();
    let mut server = Server::new(initial())?;
    let mut alice = server.client("alice", initial())?;
    let mut bob = server.client("bob", initial())?;

    let alice_change = alice
        .apply_optimistic(|writer| writer.insert_text("X", Attributes::new(), &main(&[0, 1])))?
        .unwrap();
    let bob_change = bob
        .apply_optimistic(|writer| {
            writer.remove_range(&Range::new(main(&[0, 2]), main(&[0, 3])))?;
            writer.insert_text("Y", Attributes::new(), &main(&[0, 1]))
        })?
        .unwrap();

    // Alice reaches the server first
    let from_alice = server.submit(alice.pending_operations())?;
    assert!(alice.confirm(&alice_change));
    bob.receive_remote(from_alice)?;

    let from_bob = server.submit(bob.pending_operations())?;
    assert!(bob.confirm(&bob_change));
    alice.receive_remote(from_bob)?;

    assert_eq!(paragraph_text(&server.document, 0), "aXYb");
    assert_eq!(main_snapshot(&alice.document), main_snapshot(&server.document));
    assert_eq!(main_snapshot(&bob.document), main_snapshot(&server.document));
    assert_eq!(alice.server_version(), server.version());
    assert_eq!(bob.server_version(), server.version());
    Ok(())
}

#[test]
fn test_sessions_converge_when_server_rebases() -> Result<()> {
    init_tracing();
    let mut server = Server::new(initial())?;
    let mut alice = server.client("alice", initial())?;
    let mut bob = server.client("bob", initial())?;

    let alice_change = alice
        .apply_optimistic(|writer| {
            let p = writer.tree().node(writer.document().main_root_id()).child(0).unwrap().id();
            writer.set_attribute("alignment", json!("center"), p)?;
            writer.insert_snapshot(paragraph("new"), &main(&[1]))
        })?
        .unwrap();
    let bob_change = bob
        .apply_optimistic(|writer| writer.move_range(&Range::new(main(&[0, 0]), main(&[0, 1])), &main(&[0, 3])))?
        .unwrap();

    // Both submitted against version 1; the server rebases Bob's change
    let from_alice = server.submit(alice.pending_operations())?;
    let from_bob = server.submit(bob.pending_operations())?;

    assert!(alice.confirm(&alice_change));
    alice.receive_remote(from_bob)?;
    bob.receive_remote(from_alice)?;
    assert!(bob.confirm(&bob_change));

    assert_eq!(paragraph_text(&server.document, 0), "bca");
    assert_eq!(paragraph_text(&server.document, 1), "new");
    assert_eq!(main_snapshot(&alice.document), main_snapshot(&server.document));
    assert_eq!(main_snapshot(&bob.document), main_snapshot(&server.document));
    Ok(())
}

#[test]
fn test_undo_after_remote_change() -> Result<()> {
    let mut doc = Document::new();
    doc.apply_operations(initial())?;
    let mut stack = UndoStack::for_document(&doc);

    stack.change(&mut doc, "Type", |writer| {
        writer.insert_text("!", Attributes::new(), &main(&[0, 3]))
    })?;

    // Someone else typed in front while the local change was on the stack
    doc.apply_operation(Operation::new(
        doc.version(),
        OperationKind::Insert {
            position: main(&[0, 0]),
            nodes: vec![NodeSnapshot::text(">")],
        },
    ))?;
    assert_eq!(paragraph_text(&doc, 0), ">abc!");

    assert!(stack.undo(&mut doc)?);
    assert_eq!(paragraph_text(&doc, 0), ">abc");
    assert!(stack.redo(&mut doc)?);
    assert_eq!(paragraph_text(&doc, 0), ">abc!");
    Ok(())
}

#[test]
fn test_operation_wire_format() -> Result<()> {
    let operation = Operation::new(
        4,
        OperationKind::Move {
            source: main(&[0, 1]),
            how_many: 2,
            target: main(&[1, 0]),
        },
    );
    let value = serde_json::to_value(&operation)?;
    assert_eq!(value["type"], "move");
    assert_eq!(value["baseVersion"], 4);
    assert_eq!(value["howMany"], 2);

    let parsed: Operation = serde_json::from_value(value)?;
    assert_eq!(parsed, operation);
    Ok(())
}

#[test]
fn test_snapshot_omits_empty_attributes() -> Result<()> {
    let value = serde_json::to_value(paragraph("hi").with_attribute("listIndent", json!(0)))?;
    assert_eq!(value["attributes"], json!([["listIndent", 0]]));
    assert!(value["children"][0].get("attributes").is_none());
    Ok(())
}

#[test]
fn test_config_from_directory() -> Result<()> {
    let dir = std::env::temp_dir().join(format!("quire-model-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    std::fs::write(
        dir.join(quire_model::DEFAULT_CONFIG_NAME),
        r#"{ "defaultRootName": "body", "undoMaxLevels": 3 }"#,
    )?;

    let config = ModelConfig::load(&dir)?;
    let doc = Document::with_config(config)?;
    assert!(doc.root_id("body").is_ok());
    assert_eq!(UndoStack::for_document(&doc).undo_levels(), 0);

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
