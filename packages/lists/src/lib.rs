//! # Quire Lists
//!
//! List support on top of `quire-model`.
//!
//! In the model a list is a run of sibling blocks tagged with list
//! attributes (see [`blocks`]). In the view it is nested `<ul>`/`<ol>` and
//! `<li>` attribute elements (see [`elements`]). This crate holds the
//! helpers that bridge the two:
//!
//! - walking list blocks: [`get_sibling_list_item`], [`list_item_blocks`]
//! - view nesting depth: [`get_indent`]
//! - view list elements and their priorities
//! - repairing broken list attributes: [`post_fix_lists`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quire_lists::{post_fix_lists, ListItemUid};
//!
//! let root = doc.main_root_id();
//! let mut uid = ListItemUid::default();
//! doc.change(|writer| Ok(post_fix_lists(writer, root, &mut uid)))??;
//! ```

pub mod blocks;
pub mod elements;
mod errors;
pub mod fixup;
pub mod markup;
pub mod view;

pub use blocks::{
    get_sibling_list_item, is_first_block_of_list_item, is_last_block_of_list_item, list_item_blocks,
    list_item_blocks_forward, list_runs, Direction, ListBlock, ListType, SiblingOptions, LIST_INDENT, LIST_ITEM_ID,
    LIST_TYPE,
};
pub use elements::{
    create_list_element, create_list_item_element, get_indent, list_element_id, list_element_name,
    list_element_priority, list_item_element_priority,
};
pub use errors::{ListError, ListResult};
pub use fixup::{fix_list_indents, fix_list_item_ids, post_fix_lists, ListItemUid};
pub use markup::{parse_view, stringify, stringify_tree};
pub use view::{AttributeElementOptions, ViewNode, ViewNodeId, ViewTree, ViewWriter};
