//! # Undo/Redo Stack
//!
//! Tracks change blocks and reverts them on request.
//!
//! ## Design
//!
//! - Each change block is recorded as one [`Batch`]
//! - Undo reverts the batch through [`Document::revert`], which rebases the
//!   inverses over everything applied after the batch
//! - Redo reverts the batch that undo produced
//! - New batches clear the redo stack
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut stack = UndoStack::new();
//! let mut doc = Document::new();
//!
//! stack.change(&mut doc, "Insert paragraph", |writer| { ... })?;
//!
//! stack.undo(&mut doc)?;
//! stack.redo(&mut doc)?;
//! ```

use crate::document::{Batch, Document};
use crate::errors::ModelError;
use crate::writer::Writer;

/// Undo/redo stack for one document
#[derive(Debug)]
pub struct UndoStack {
    /// Applied batches (most recent last)
    undo_stack: Vec<Batch>,

    /// Batches that reverted an undo (most recent last)
    redo_stack: Vec<Batch>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,
}

impl UndoStack {
    /// Create a new undo stack with default max levels (100)
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
        }
    }

    /// Stack sized from the document's configuration
    pub fn for_document(doc: &Document) -> Self {
        Self::with_max_levels(doc.config().undo_max_levels)
    }

    /// Run a change block and record it as one undo step
    pub fn change<R>(
        &mut self,
        doc: &mut Document,
        description: impl Into<String>,
        f: impl FnOnce(&mut Writer<'_>) -> Result<R, ModelError>,
    ) -> Result<R, ModelError> {
        let (value, batch) = doc.change_block(f)?;
        self.record(batch.with_description(description));
        Ok(value)
    }

    /// Record a batch that was applied elsewhere
    pub fn record(&mut self, batch: Batch) {
        if batch.is_empty() {
            return;
        }
        self.push_undo(batch);
        // New action invalidates the future
        self.redo_stack.clear();
    }

    fn push_undo(&mut self, batch: Batch) {
        self.undo_stack.push(batch);
        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }
    }

    /// Undo the most recent batch
    pub fn undo(&mut self, doc: &mut Document) -> Result<bool, ModelError> {
        let Some(batch) = self.undo_stack.pop() else {
            return Ok(false);
        };
        let mut reverted = doc.revert(&batch)?;
        reverted.description = batch.description;
        tracing::debug!(operations = reverted.len(), "undo");
        self.redo_stack.push(reverted);
        Ok(true)
    }

    /// Redo the most recently undone batch
    pub fn redo(&mut self, doc: &mut Document) -> Result<bool, ModelError> {
        let Some(batch) = self.redo_stack.pop() else {
            return Ok(false);
        };
        let mut reapplied = doc.revert(&batch)?;
        reapplied.description = batch.description;
        tracing::debug!(operations = reapplied.len(), "redo");
        self.push_undo(reapplied);
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Description of the next undo step
    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack
            .last()
            .and_then(|batch| batch.description.as_deref())
    }

    /// Description of the next redo step
    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack
            .last()
            .and_then(|batch| batch.description.as_deref())
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}
