//! # List Blocks
//!
//! Lists live in the model as flat runs of sibling blocks carrying three
//! attributes:
//!
//! - `listItemId`: blocks with the same id form one list item
//! - `listIndent`: nesting depth, an integer from 0
//! - `listType`: `"bulleted"` or `"numbered"`
//!
//! A block is a list block when it has a string `listItemId`. Missing or
//! invalid indents read as 0 and unknown types as bulleted, so corrupted
//! content can still be walked and repaired.
//!
//! ```text
//! listIndent  listItemId
//!     0          a        • one
//!     1          b          • one.one
//!     0          a          (second block of "one")
//!     0          c        • two
//! ```

use crate::errors::{ListError, ListResult};
use quire_model::{NodeId, NodeRef, Tree};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const LIST_ITEM_ID: &str = "listItemId";
pub const LIST_INDENT: &str = "listIndent";
pub const LIST_TYPE: &str = "listType";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListType {
    #[default]
    Bulleted,
    Numbered,
}

impl fmt::Display for ListType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListType::Bulleted => write!(f, "bulleted"),
            ListType::Numbered => write!(f, "numbered"),
        }
    }
}

impl FromStr for ListType {
    type Err = ListError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bulleted" => Ok(ListType::Bulleted),
            "numbered" => Ok(ListType::Numbered),
            other => Err(ListError::UnknownListType(other.to_string())),
        }
    }
}

/// The list attributes of one block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListBlock {
    pub id: String,
    pub indent: usize,
    pub list_type: ListType,
}

impl ListBlock {
    /// `None` for blocks that are not part of a list
    pub fn read(node: &NodeRef<'_>) -> Option<ListBlock> {
        let id = node.get_attribute(LIST_ITEM_ID)?.as_str()?.to_string();
        let indent = node
            .get_attribute(LIST_INDENT)
            .and_then(|value| value.as_u64())
            .unwrap_or(0) as usize;
        let list_type = node
            .get_attribute(LIST_TYPE)
            .and_then(|value| value.as_str())
            .and_then(|value| value.parse().ok())
            .unwrap_or_default();
        Some(ListBlock { id, indent, list_type })
    }

    pub fn of(tree: &Tree, node: NodeId) -> Option<ListBlock> {
        tree.get(node).and_then(|node| Self::read(&node))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Backward,
    Forward,
}

/// What [`get_sibling_list_item`] looks for
#[derive(Debug, Clone, Copy, Default)]
pub struct SiblingOptions {
    /// Match blocks whose indent equals `list_indent`
    pub same_indent: bool,
    /// Match blocks whose indent is below `list_indent`
    pub smaller_indent: bool,
    pub list_indent: usize,
    pub direction: Direction,
}

fn step<'a>(node: &NodeRef<'a>, direction: Direction) -> ListResult<Option<NodeRef<'a>>> {
    Ok(match direction {
        Direction::Backward => node.previous_sibling()?,
        Direction::Forward => node.next_sibling()?,
    })
}

/// First list block, starting at `start` itself and walking siblings in
/// `options.direction`, that matches the options.
///
/// The walk ends at the first non-list block. When looking for the same
/// indent it also ends at a block (other than `start`) with a smaller
/// indent, since no sibling can follow it.
pub fn get_sibling_list_item(tree: &Tree, start: NodeId, options: SiblingOptions) -> ListResult<Option<NodeId>> {
    let mut current = tree.get(start);
    let mut is_start = true;

    while let Some(node) = current {
        let Some(block) = ListBlock::read(&node) else {
            break;
        };
        if options.same_indent && block.indent == options.list_indent {
            return Ok(Some(node.id()));
        }
        if options.smaller_indent && block.indent < options.list_indent {
            return Ok(Some(node.id()));
        }
        if options.same_indent && !is_start && block.indent < options.list_indent {
            break;
        }
        is_start = false;
        current = step(&node, options.direction)?;
    }
    Ok(None)
}

/// Blocks of the same list item after (or before) `block`, nearest first.
///
/// Deeper blocks are nested items and are skipped; the walk stops at a
/// shallower block or a same-indent block of another item.
fn item_blocks_from(tree: &Tree, block: NodeId, direction: Direction) -> ListResult<Vec<NodeId>> {
    let Some(node) = tree.get(block) else {
        return Ok(Vec::new());
    };
    let Some(first) = ListBlock::read(&node) else {
        return Ok(Vec::new());
    };

    let mut found = Vec::new();
    let mut current = step(&node, direction)?;
    while let Some(node) = current {
        let Some(other) = ListBlock::read(&node) else {
            break;
        };
        if other.indent < first.indent {
            break;
        }
        if other.indent == first.indent {
            if other.id != first.id {
                break;
            }
            found.push(node.id());
        }
        current = step(&node, direction)?;
    }
    Ok(found)
}

/// Every block of the list item `block` belongs to, in document order
pub fn list_item_blocks(tree: &Tree, block: NodeId) -> ListResult<Vec<NodeId>> {
    if ListBlock::of(tree, block).is_none() {
        return Ok(Vec::new());
    }
    let mut blocks = item_blocks_from(tree, block, Direction::Backward)?;
    blocks.reverse();
    blocks.push(block);
    blocks.extend(item_blocks_from(tree, block, Direction::Forward)?);
    Ok(blocks)
}

/// `block` and the blocks of its item that follow it
pub fn list_item_blocks_forward(tree: &Tree, block: NodeId) -> ListResult<Vec<NodeId>> {
    let mut blocks = vec![block];
    blocks.extend(item_blocks_from(tree, block, Direction::Forward)?);
    Ok(blocks)
}

pub fn is_first_block_of_list_item(tree: &Tree, block: NodeId) -> ListResult<bool> {
    Ok(item_blocks_from(tree, block, Direction::Backward)?.is_empty())
}

pub fn is_last_block_of_list_item(tree: &Tree, block: NodeId) -> ListResult<bool> {
    Ok(item_blocks_from(tree, block, Direction::Forward)?.is_empty())
}

/// Contiguous runs of list blocks among `parent`'s children.
///
/// Empty when `parent` is not a node of `tree`.
pub fn list_runs(tree: &Tree, parent: NodeId) -> Vec<Vec<NodeId>> {
    let mut runs = Vec::new();
    let mut run = Vec::new();
    let Some(parent) = tree.get(parent) else {
        return runs;
    };
    for child in parent.children() {
        if ListBlock::read(&child).is_some() {
            run.push(child.id());
        } else if !run.is_empty() {
            runs.push(std::mem::take(&mut run));
        }
    }
    if !run.is_empty() {
        runs.push(run);
    }
    runs
}
