//! # Edit Session
//!
//! One client's view of a shared document: local changes applied
//! optimistically, a queue of changes waiting for the server, and remote
//! changes rebased over that queue.
//!
//! ## Protocol
//!
//! ```text
//! client                               server
//!   apply_optimistic ── pending ──→      orders changes, transforms late ones
//!   confirm(id)      ←── ack ─────
//!   receive_remote   ←── ops ─────       (other clients' changes, server form)
//! ```
//!
//! Pending operations are kept in server form: they apply to the server
//! state at `server_version` followed by the earlier pending changes. The
//! server wins ties, so a client rebases with its own operations weaker.

use crate::document::Document;
use crate::errors::ModelError;
use crate::operation::Operation;
use crate::position::Range;
use crate::transform::transform_sets;
use crate::writer::Writer;
use std::time::{SystemTime, UNIX_EPOCH};

/// Single edit session (one client in a multi-user document)
pub struct EditSession {
    /// Unique session identifier
    pub id: String,

    /// Local copy of the document
    pub document: Document,

    /// Current selection, kept valid across local and remote changes
    pub selection: Vec<Range>,

    /// Changes waiting for server acknowledgment (oldest first)
    pub pending: Vec<PendingChange>,

    /// Number of server operations reflected in the local document
    server_version: u64,
    next_change: u64,
}

/// Change waiting for server acknowledgment
#[derive(Debug, Clone)]
pub struct PendingChange {
    pub id: String,

    /// Operations in server form
    pub operations: Vec<Operation>,

    /// When it was created (seconds since the epoch)
    pub timestamp: u64,
}

impl EditSession {
    /// Session over a document that matches the server at `server_version`
    pub fn new(id: impl Into<String>, document: Document, server_version: u64) -> Self {
        Self {
            id: id.into(),
            document,
            selection: Vec::new(),
            pending: Vec::new(),
            server_version,
            next_change: 0,
        }
    }

    pub fn server_version(&self) -> u64 {
        self.server_version
    }

    /// Apply a change block locally and queue it for the server.
    ///
    /// Returns the pending change id, or `None` when the block produced no
    /// operations.
    pub fn apply_optimistic(
        &mut self,
        f: impl FnOnce(&mut Writer<'_>) -> Result<(), ModelError>,
    ) -> Result<Option<String>, ModelError> {
        let ((), batch) = self.document.change_block(f)?;
        if batch.is_empty() {
            return Ok(None);
        }
        self.transform_selection(&batch.operations);

        let mut operations = batch.operations;
        renumber(&mut operations, self.pending_end());

        let id = format!("{}-{}", self.id, self.next_change);
        self.next_change += 1;
        self.pending.push(PendingChange {
            id: id.clone(),
            operations,
            timestamp: current_timestamp(),
        });
        Ok(Some(id))
    }

    /// The server accepted the oldest pending change.
    ///
    /// Changes are acknowledged in order; an id that is not at the head of
    /// the queue is ignored.
    pub fn confirm(&mut self, change_id: &str) -> bool {
        if self.pending.first().map(|change| change.id.as_str()) != Some(change_id) {
            tracing::warn!(session = %self.id, change = change_id, "confirmation out of order");
            return false;
        }
        let change = self.pending.remove(0);
        self.server_version += change.operations.len() as u64;
        true
    }

    /// The server refused a pending change: undo it locally and rebase the
    /// changes queued after it.
    pub fn reject(&mut self, change_id: &str) -> Result<bool, ModelError> {
        let Some(index) = self.pending.iter().position(|change| change.id == change_id) else {
            return Ok(false);
        };
        let change = self.pending.remove(index);
        let Some(first) = change.operations.first() else {
            return Ok(true);
        };
        let end = first.base_version + change.operations.len() as u64;
        let mut inverses: Vec<Operation> = change
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

        // Later changes now apply without the rejected one
        for change in &mut self.pending[index..] {
            let (rebased_inverses, rebased) = transform_sets(&inverses, &change.operations, true);
            change.operations = rebased;
            inverses = rebased_inverses;
        }

        self.apply_local(inverses);
        self.renumber_pending();
        tracing::debug!(session = %self.id, change = change_id, "change rejected");
        Ok(true)
    }

    /// Integrate operations from other clients, in server form starting at
    /// `server_version`.
    ///
    /// Operations that no longer apply after the rebase are replaced by
    /// no-ops so versions stay aligned with the server.
    pub fn receive_remote(&mut self, operations: Vec<Operation>) -> Result<(), ModelError> {
        let Some(first) = operations.first() else {
            return Ok(());
        };
        if first.base_version != self.server_version {
            return Err(ModelError::WrongVersion {
                base_version: first.base_version,
                version: self.server_version,
            });
        }
        for operation in &operations {
            operation.check_paths()?;
        }
        let count = operations.len() as u64;

        let mut remote = operations;
        for change in &mut self.pending {
            let (local, rebased) = transform_sets(&change.operations, &remote, false);
            change.operations = local;
            remote = rebased;
        }

        self.apply_local(remote);
        self.server_version += count;
        self.renumber_pending();
        Ok(())
    }

    /// Every pending operation in server form, oldest first
    pub fn pending_operations(&self) -> Vec<Operation> {
        self.pending
            .iter()
            .flat_map(|change| change.operations.iter().cloned())
            .collect()
    }

    pub fn set_selection(&mut self, selection: Vec<Range>) {
        self.selection = selection;
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn pending_end(&self) -> u64 {
        self.server_version + self.pending.iter().map(|c| c.operations.len() as u64).sum::<u64>()
    }

    fn renumber_pending(&mut self) {
        let mut version = self.server_version;
        for change in &mut self.pending {
            renumber(&mut change.operations, version);
            version += change.operations.len() as u64;
        }
    }

    fn apply_local(&mut self, operations: Vec<Operation>) {
        for mut operation in operations {
            operation.base_version = self.document.version();
            let applied = match self.document.apply_operation(operation.clone()) {
                Ok(()) => operation,
                Err(err) => {
                    tracing::warn!(
                        session = %self.id,
                        kind = operation.operation_type(),
                        error = %err,
                        "dropping operation invalid after rebase"
                    );
                    let noop = Operation::noop(self.document.version());
                    // A no-op always applies at the current version
                    if self.document.apply_operation(noop.clone()).is_err() {
                        continue;
                    }
                    noop
                }
            };
            self.transform_selection(std::slice::from_ref(&applied));
        }
    }

    fn transform_selection(&mut self, operations: &[Operation]) {
        for operation in operations {
            self.selection = self
                .selection
                .iter()
                .flat_map(|range| range.transformed_by_operation(operation))
                .collect();
        }
    }
}

fn renumber(operations: &mut [Operation], start: u64) {
    for (i, op) in operations.iter_mut().enumerate() {
        op.base_version = start + i as u64;
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::node::NodeSnapshot;
    use crate::operation::OperationKind;
    use crate::position::Position;

    fn main(path: &[usize]) -> Position {
        Position::new("main", path.to_vec())
    }

    fn paragraph_ops() -> Vec<Operation> {
        vec![Operation::new(
            0,
            OperationKind::Insert {
                position: main(&[0]),
                nodes: vec![NodeSnapshot::element("paragraph", vec![NodeSnapshot::text("abc")])],
            },
        )]
    }

    fn text_of(session: &EditSession) -> String {
        let root = session.document.main_root_id();
        let tree = session.document.tree();
        tree.node(root)
            .child(0)
            .map(|p| p.children().filter_map(|t| t.data_str()).collect())
            .unwrap_or_default()
    }

    fn session() -> EditSession {
        let mut doc = Document::new();
        doc.apply_operations(paragraph_ops()).unwrap();
        EditSession::new("client-1", doc, 1)
    }

    #[test]
    fn test_session_creation() {
        let session = EditSession::new("client-1", Document::new(), 0);
        assert_eq!(session.id, "client-1");
        assert_eq!(session.pending_count(), 0);
        assert!(session.selection.is_empty());
    }

    #[test]
    fn test_optimistic_change_is_pending_until_confirmed() {
        let mut session = session();
        let id = session
            .apply_optimistic(|writer| writer.insert_text("X", Attributes::new(), &main(&[0, 3])))
            .unwrap()
            .unwrap();
        assert_eq!(text_of(&session), "abcX");
        assert_eq!(session.pending_count(), 1);
        assert_eq!(session.pending_operations()[0].base_version, 1);

        assert!(!session.confirm("client-1-99"));
        assert!(session.confirm(&id));
        assert_eq!(session.pending_count(), 0);
        assert_eq!(session.server_version(), 2);
    }

    #[test]
    fn test_empty_change_is_not_queued() {
        let mut session = session();
        assert_eq!(session.apply_optimistic(|_| Ok(())).unwrap(), None);
        assert_eq!(session.pending_count(), 0);
    }

    #[test]
    fn test_remote_rebased_over_pending() {
        let mut session = session();
        session
            .apply_optimistic(|writer| writer.insert_text("X", Attributes::new(), &main(&[0, 0])))
            .unwrap();

        // Another client typed at the same spot; the server ordered it first
        let remote = Operation::new(
            1,
            OperationKind::Insert {
                position: main(&[0, 0]),
                nodes: vec![NodeSnapshot::text("Y")],
            },
        );
        session.receive_remote(vec![remote]).unwrap();

        assert_eq!(text_of(&session), "YXabc");
        assert_eq!(session.server_version(), 2);
        let pending = session.pending_operations();
        assert_eq!(pending[0].base_version, 2);
        match &pending[0].kind {
            OperationKind::Insert { position, .. } => assert_eq!(position, &main(&[0, 1])),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_remote_with_wrong_version() {
        let mut session = session();
        let err = session.receive_remote(vec![Operation::noop(7)]).unwrap_err();
        assert_eq!(err.code(), "model-document-apply-operation-wrong-version");
    }

    #[test]
    fn test_remote_with_empty_path_is_refused() {
        let mut session = session();
        session
            .apply_optimistic(|writer| writer.insert_text("X", Attributes::new(), &main(&[0, 0])))
            .unwrap();

        let nowhere = Position {
            root: "main".into(),
            path: Vec::new(),
            stickiness: Default::default(),
        };
        let remote = Operation::new(
            1,
            OperationKind::Move {
                source: nowhere,
                how_many: 1,
                target: main(&[0]),
            },
        );
        let err = session.receive_remote(vec![remote]).unwrap_err();
        assert_eq!(err.code(), "model-position-path-incorrect");
        assert_eq!(text_of(&session), "Xabc");
        assert_eq!(session.server_version(), 1);
        assert_eq!(session.pending_count(), 1);
    }

    #[test]
    fn test_reject_reverts_locally() {
        let mut session = session();
        let first = session
            .apply_optimistic(|writer| writer.insert_text("X", Attributes::new(), &main(&[0, 0])))
            .unwrap()
            .unwrap();
        session
            .apply_optimistic(|writer| writer.insert_text("Z", Attributes::new(), &main(&[0, 4])))
            .unwrap();
        assert_eq!(text_of(&session), "XabcZ");

        assert!(session.reject(&first).unwrap());
        assert_eq!(text_of(&session), "abcZ");
        assert_eq!(session.pending_count(), 1);
        match &session.pending_operations()[0].kind {
            OperationKind::Insert { position, .. } => assert_eq!(position, &main(&[0, 3])),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(session.pending_operations()[0].base_version, 1);
    }

    #[test]
    fn test_selection_follows_remote_changes() {
        let mut session = session();
        session.set_selection(vec![Range::collapsed(main(&[0, 2]))]);
        let remote = Operation::new(
            1,
            OperationKind::Insert {
                position: main(&[0, 0]),
                nodes: vec![NodeSnapshot::text("YY")],
            },
        );
        session.receive_remote(vec![remote]).unwrap();
        assert_eq!(session.selection, vec![Range::collapsed(main(&[0, 4]))]);
    }
}
