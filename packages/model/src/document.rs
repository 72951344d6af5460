//! # Document
//!
//! Owns the node tree, the operation history and the change listeners.
//!
//! ## Lifecycle
//!
//! ```text
//! change_block ──→ Writer ──→ Operation ──→ validate ──→ execute ──→ history
//!                                                                      ↓
//!                                                     on_change listeners (per op)
//!                                                     on_change_block listeners (per block)
//! ```
//!
//! The version is the history length. An operation applies only when its
//! base version equals the current version; anything else is a corruption
//! fault, never reordered silently.
//!
//! Listeners receive shared references only, so they cannot re-enter a
//! writer while a change block is open.

use crate::attributes::Attributes;
use crate::config::ModelConfig;
use crate::errors::ModelError;
use crate::node::NodeId;
use crate::operation::Operation;
use crate::position::{Position, Range};
use crate::transform::transform_sets;
use crate::tree::{Tree, GRAVEYARD};
use crate::writer::Writer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique document identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    fn next() -> Self {
        DocumentId(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc-{}", self.0)
    }
}

/// Handle returned when registering a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Delivered to `on_change` listeners after every applied operation
pub struct ChangeEvent<'a> {
    pub operation: &'a Operation,
    /// Document version after the operation
    pub version: u64,
    pub tree: &'a Tree,
}

/// Operations produced by one change block, in application order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub operations: Vec<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Batch {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self {
            operations,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn base_version(&self) -> Option<u64> {
        self.operations.first().map(|op| op.base_version)
    }

    /// Version right after the last operation
    pub fn end_version(&self) -> Option<u64> {
        self.operations.last().map(|op| op.base_version + 1)
    }
}

type ChangeListener = Box<dyn FnMut(&ChangeEvent<'_>)>;
type BlockListener = Box<dyn FnMut(&Batch, &Tree)>;

/// Editable rich-text document
pub struct Document {
    id: DocumentId,
    config: ModelConfig,
    tree: Tree,
    main_root: NodeId,
    history: Vec<Operation>,
    next_listener: u64,
    change_listeners: BTreeMap<ListenerId, ChangeListener>,
    block_listeners: BTreeMap<ListenerId, BlockListener>,
}

impl Document {
    /// Document with the default `main` root
    pub fn new() -> Self {
        Self::build(ModelConfig::default())
    }

    pub fn with_config(config: ModelConfig) -> Result<Self, ModelError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: ModelConfig) -> Self {
        let id = DocumentId::next();
        let mut tree = Tree::new(id);
        tree.add_root(GRAVEYARD, GRAVEYARD);
        let main_root = tree.add_root(&config.default_root_name, &config.root_element_name);
        tracing::debug!(document = %id, root = %config.default_root_name, "document created");

        Self {
            id,
            config,
            tree,
            main_root,
            history: Vec::new(),
            next_listener: 0,
            change_listeners: BTreeMap::new(),
            block_listeners: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Mutable tree access. Only detached content can be changed this way;
    /// attached nodes change through [`Document::change`].
    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn main_root_id(&self) -> NodeId {
        self.main_root
    }

    pub fn root_id(&self, name: &str) -> Result<NodeId, ModelError> {
        self.tree.root_id(name)
    }

    /// Add another named root
    pub fn create_root(&mut self, root_name: &str, element_name: &str) -> Result<NodeId, ModelError> {
        let id = self.tree.create_root(root_name, element_name)?;
        tracing::debug!(document = %self.id, root = root_name, "root created");
        Ok(id)
    }

    pub fn create_element(&mut self, name: &str, attributes: Attributes) -> NodeId {
        self.tree.create_element(name, attributes)
    }

    pub fn create_text(&mut self, data: &str, attributes: Attributes) -> NodeId {
        self.tree.create_text(data, attributes)
    }

    pub fn create_fragment(&mut self) -> NodeId {
        self.tree.create_fragment()
    }

    // History

    pub fn version(&self) -> u64 {
        self.history.len() as u64
    }

    pub fn history(&self) -> &[Operation] {
        &self.history
    }

    /// Operations applied since `version` (empty when `version` is current
    /// or in the future)
    pub fn operations_since(&self, version: u64) -> &[Operation] {
        self.history.get(version as usize..).unwrap_or(&[])
    }

    // Changes

    /// Run a change block and return what the closure returned.
    pub fn change<R>(
        &mut self,
        f: impl FnOnce(&mut Writer<'_>) -> Result<R, ModelError>,
    ) -> Result<R, ModelError> {
        self.change_block(f).map(|(value, _)| value)
    }

    /// Run a change block and also return the operations it produced.
    ///
    /// Each writer call is atomic. A block that fails part way keeps the
    /// operations that were already applied; they are still reported to
    /// block listeners.
    pub fn change_block<R>(
        &mut self,
        f: impl FnOnce(&mut Writer<'_>) -> Result<R, ModelError>,
    ) -> Result<(R, Batch), ModelError> {
        let mut writer = Writer::new(self);
        let result = f(&mut writer);
        let batch = writer.into_batch();
        self.emit_block(&batch);
        result.map(|value| (value, batch))
    }

    /// Apply one operation produced elsewhere (a remote site, a transform).
    pub fn apply_operation(&mut self, operation: Operation) -> Result<(), ModelError> {
        self.apply_with_nodes(operation, None)
    }

    /// Apply a list of operations as one block.
    ///
    /// Stops at the first failure; what was applied before it stays.
    pub fn apply_operations(
        &mut self,
        operations: impl IntoIterator<Item = Operation>,
    ) -> Result<Batch, ModelError> {
        let mut batch = Batch::default();
        let mut failure = None;
        for operation in operations {
            match self.apply_operation(operation.clone()) {
                Ok(()) => batch.operations.push(operation),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        self.emit_block(&batch);
        match failure {
            Some(err) => Err(err),
            None => Ok(batch),
        }
    }

    pub(crate) fn apply_with_nodes(
        &mut self,
        operation: Operation,
        nodes: Option<Vec<NodeId>>,
    ) -> Result<(), ModelError> {
        let version = self.version();
        if operation.base_version != version {
            tracing::warn!(
                document = %self.id,
                base_version = operation.base_version,
                version,
                "operation out of sequence"
            );
            return Err(ModelError::WrongVersion {
                base_version: operation.base_version,
                version,
            });
        }

        operation.execute(&mut self.tree, nodes)?;
        tracing::trace!(
            document = %self.id,
            version,
            kind = operation.operation_type(),
            "operation applied"
        );
        self.history.push(operation);

        let event = ChangeEvent {
            operation: &self.history[self.history.len() - 1],
            version: version + 1,
            tree: &self.tree,
        };
        for listener in self.change_listeners.values_mut() {
            listener(&event);
        }
        Ok(())
    }

    fn emit_block(&mut self, batch: &Batch) {
        if batch.is_empty() {
            return;
        }
        for listener in self.block_listeners.values_mut() {
            listener(batch, &self.tree);
        }
    }

    /// Undo the effect of a batch applied earlier, taking everything applied
    /// after it into account. Returns the batch that did it.
    pub fn revert(&mut self, batch: &Batch) -> Result<Batch, ModelError> {
        let Some(end) = batch.end_version() else {
            return Ok(Batch::default());
        };
        let inverses: Vec<Operation> = batch
            .operations
            .iter()
            .rev()
            .enumerate()
            .map(|(i, op)| {
                let mut inverse = op.inverse();
                inverse.base_version = end + i as u64;
                inverse
            })
            .collect();
        let later = self.operations_since(end).to_vec();
        let (rebased, _) = transform_sets(&inverses, &later, true);
        self.apply_operations(rebased)
    }

    // Stale references

    /// Rebase a position taken at `version` onto the current tree.
    pub fn transform_position(&self, position: &Position, version: u64) -> Position {
        self.operations_since(version)
            .iter()
            .fold(position.clone(), |position, op| position.transformed_by_operation(op))
    }

    /// Rebase a range taken at `version`; it may come back in pieces.
    pub fn transform_range(&self, range: &Range, version: u64) -> Vec<Range> {
        self.operations_since(version)
            .iter()
            .fold(vec![range.clone()], |ranges, op| {
                ranges
                    .iter()
                    .flat_map(|range| range.transformed_by_operation(op))
                    .collect()
            })
    }

    // Listeners

    fn next_listener_id(&mut self) -> ListenerId {
        self.next_listener += 1;
        ListenerId(self.next_listener)
    }

    pub fn on_change(&mut self, listener: impl FnMut(&ChangeEvent<'_>) + 'static) -> ListenerId {
        let id = self.next_listener_id();
        self.change_listeners.insert(id, Box::new(listener));
        id
    }

    pub fn off_change(&mut self, id: ListenerId) -> bool {
        self.change_listeners.remove(&id).is_some()
    }

    pub fn on_change_block(&mut self, listener: impl FnMut(&Batch, &Tree) + 'static) -> ListenerId {
        let id = self.next_listener_id();
        self.block_listeners.insert(id, Box::new(listener));
        id
    }

    pub fn off_change_block(&mut self, id: ListenerId) -> bool {
        self.block_listeners.remove(&id).is_some()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("version", &self.version())
            .field("roots", &self.tree.root_names().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeSnapshot;
    use crate::operation::OperationKind;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn main(path: &[usize]) -> Position {
        Position::new("main", path.to_vec())
    }

    fn with_paragraph(text: &str) -> Document {
        let mut doc = Document::new();
        doc.change(|writer| {
            writer.insert_snapshot(
                NodeSnapshot::element("paragraph", vec![NodeSnapshot::text(text)]),
                &main(&[0]),
            )
        })
        .unwrap();
        doc
    }

    #[test]
    fn test_document_roots() {
        let mut doc = Document::new();
        assert!(doc.tree().root("main").is_some());
        assert!(doc.tree().root(GRAVEYARD).is_some());
        assert!(doc.tree().node(doc.main_root_id()).is_named("$root"));

        doc.create_root("title", "$title").unwrap();
        assert_eq!(
            doc.create_root("title", "$title"),
            Err(ModelError::DuplicateRoot("title".into()))
        );
    }

    #[test]
    fn test_custom_root_name() {
        let config = ModelConfig {
            default_root_name: "body".into(),
            ..ModelConfig::default()
        };
        let doc = Document::with_config(config).unwrap();
        assert!(doc.tree().root("body").is_some());
        assert!(doc.tree().root("main").is_none());
    }

    #[test]
    fn test_version_tracks_history() {
        let doc = with_paragraph("abc");
        assert_eq!(doc.version(), 1);
        assert_eq!(doc.history().len(), 1);
        assert_eq!(doc.history()[0].base_version, 0);
    }

    #[test]
    fn test_out_of_sequence_operation_is_a_fault() {
        let mut doc = with_paragraph("abc");
        let op = Operation::new(
            7,
            OperationKind::Insert {
                position: main(&[0, 0]),
                nodes: vec![NodeSnapshot::text("x")],
            },
        );
        let err = doc.apply_operation(op).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Corruption);
        assert_eq!(doc.version(), 1);
    }

    #[test]
    fn test_listeners_fire_per_operation_and_per_block() {
        let mut doc = Document::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let blocks = Rc::new(RefCell::new(0));

        let sink = seen.clone();
        let change_id = doc.on_change(move |event| {
            sink.borrow_mut().push((event.operation.operation_type(), event.version));
        });
        let sink = blocks.clone();
        doc.on_change_block(move |batch, _| *sink.borrow_mut() += batch.len());

        let root = doc.main_root_id();
        doc.change(|writer| {
            let p = writer.create_element("paragraph", Attributes::new());
            writer.append(p, root)?;
            writer.set_attribute("alignment", json!("center"), p)
        })
        .unwrap();

        assert_eq!(*seen.borrow(), vec![("insert", 1), ("attribute", 2)]);
        assert_eq!(*blocks.borrow(), 2);

        assert!(doc.off_change(change_id));
        assert!(!doc.off_change(change_id));
        let p = doc.tree().node(root).child(0).unwrap().id();
        doc.change(|writer| writer.remove_attribute("alignment", p)).unwrap();
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(*blocks.borrow(), 3);
    }

    #[test]
    fn test_failed_block_keeps_applied_operations() {
        let mut doc = Document::new();
        let root = doc.main_root_id();
        let result = doc.change(|writer| {
            let p = writer.create_element("paragraph", Attributes::new());
            writer.append(p, root)?;
            writer.insert_snapshot(NodeSnapshot::text("x"), &main(&[9]))
        });
        assert!(result.is_err());
        assert_eq!(doc.version(), 1);
        assert_eq!(doc.tree().node(root).child_count(), 1);
    }

    #[test]
    fn test_transform_position_through_history() {
        let mut doc = with_paragraph("abcdef");
        let version = doc.version();
        let marker = main(&[0, 4]);

        doc.change(|writer| {
            writer.insert_text("XY", Attributes::new(), &main(&[0, 1]))?;
            writer.remove_range(&Range::new(main(&[0, 0]), main(&[0, 1])))
        })
        .unwrap();

        assert_eq!(doc.transform_position(&marker, version), main(&[0, 5]));
        assert_eq!(doc.transform_position(&marker, doc.version()), marker);
    }

    #[test]
    fn test_transform_range_through_removal() {
        let mut doc = with_paragraph("abcdef");
        let version = doc.version();
        let range = Range::new(main(&[0, 2]), main(&[0, 4]));

        doc.change(|writer| writer.remove_range(&Range::new(main(&[0, 1]), main(&[0, 5]))))
            .unwrap();
        assert_eq!(doc.transform_range(&range, version), vec![Range::collapsed(main(&[0, 1]))]);
    }

    #[test]
    fn test_revert_after_later_changes() {
        let mut doc = with_paragraph("abc");
        let (_, batch) = doc
            .change_block(|writer| writer.insert_text("XX", Attributes::new(), &main(&[0, 3])))
            .unwrap();
        doc.change(|writer| writer.insert_text("__", Attributes::new(), &main(&[0, 0])))
            .unwrap();

        doc.revert(&batch).unwrap();
        let p = doc.tree().node(doc.main_root_id()).child(0).unwrap();
        assert_eq!(p.child(0).unwrap().data_str(), Some("__abc"));
    }
}
