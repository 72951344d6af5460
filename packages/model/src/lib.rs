//! # Quire Model
//!
//! Document model for the quire rich-text editor.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Tree: arena of elements, text, fragments    │
//! │  - named roots + $graveyard                 │
//! │  - offsets count characters, not nodes      │
//! └─────────────────────────────────────────────┘
//!                     ↑ execute
//! ┌─────────────────────────────────────────────┐
//! │ Operation: insert / move / attribute / noop │
//! │  - validated before any mutation            │
//! │  - invertible, transformable                │
//! └─────────────────────────────────────────────┘
//!                     ↑ produced by
//! ┌─────────────────────────────────────────────┐
//! │ Document + Writer: versioned history,       │
//! │ change blocks, listeners                    │
//! └─────────────────────────────────────────────┘
//!                     ↑
//! ┌─────────────────────────────────────────────┐
//! │ UndoStack / EditSession                     │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Operations are the only mutation**: attached content changes only
//!    through a [`Writer`], and every change is recorded
//! 2. **Atomic application**: an operation lands completely or not at all
//! 3. **Explicit rebasing**: positions and ranges taken before a change are
//!    stale until transformed through [`Document::transform_position`]
//! 4. **Server authority**: concurrent sessions break ties in the server's
//!    favour
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quire_model::{Attributes, Document, Position};
//!
//! let mut doc = Document::new();
//! let root = doc.main_root_id();
//!
//! doc.change(|writer| {
//!     let paragraph = writer.create_element("paragraph", Attributes::new());
//!     writer.append(paragraph, root)?;
//!     writer.insert_text("Hello", Attributes::new(), &Position::new("main", vec![0, 0]))
//! })?;
//! ```

mod attributes;
mod config;
mod document;
mod element;
mod errors;
mod node;
mod operation;
mod position;
mod session;
mod text;
mod transform;
mod tree;
mod undo_stack;
mod writer;

pub use attributes::Attributes;
pub use config::{ModelConfig, DEFAULT_CONFIG_NAME};
pub use document::{Batch, ChangeEvent, Document, DocumentId, ListenerId};
pub use errors::{ErrorKind, ModelError};
pub use node::{AncestorOptions, NodeId, NodeKind, NodeRef, NodeSnapshot};
pub use operation::{Operation, OperationKind};
pub use position::{compare_paths, Path, PathRelation, Position, PositionRelation, Range, Stickiness};
pub use session::{EditSession, PendingChange};
pub use text::{Item, TextProxy};
pub use transform::{transform, transform_sets};
pub use tree::{DetachedMut, ResolvedPosition, Tree, GRAVEYARD};
pub use undo_stack::UndoStack;
pub use writer::Writer;
