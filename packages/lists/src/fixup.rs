//! # List Fixups
//!
//! Repairs list attributes after pasting, collaboration or hand-written
//! content, through the model writer so every repair is recorded.
//!
//! ## Guarantees
//!
//! - After [`fix_list_indents`] no block is more than one level deeper than
//!   the block before it, and indent-0 blocks keep their indent.
//! - After [`fix_list_item_ids`] every list item id is used by exactly one
//!   item, and all blocks of an item share one list type.
//! - Running either fixup on its own output changes nothing.

use crate::blocks::{list_item_blocks_forward, list_runs, ListBlock, LIST_INDENT, LIST_ITEM_ID};
use crate::errors::ListResult;
use quire_model::{NodeId, Tree, Writer};
use serde_json::json;
use std::collections::HashSet;

/// Deterministic list item id generator that avoids ids already in use
#[derive(Debug, Clone)]
pub struct ListItemUid {
    seed: String,
    count: u64,
    taken: HashSet<String>,
}

impl ListItemUid {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            count: 0,
            taken: HashSet::new(),
        }
    }

    /// Mark an id as used so it is never generated
    pub fn reserve(&mut self, id: impl Into<String>) {
        self.taken.insert(id.into());
    }

    /// Generate next unused ID
    pub fn next_id(&mut self) -> String {
        loop {
            self.count += 1;
            let id = format!("{}{:x}", self.seed, self.count);
            if self.taken.insert(id.clone()) {
                return id;
            }
        }
    }
}

impl Default for ListItemUid {
    fn default() -> Self {
        Self::new("e")
    }
}

/// `parent` and every element below it, in document order
fn element_subtree(tree: &Tree, parent: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![parent];
    while let Some(id) = stack.pop() {
        let Some(node) = tree.get(id) else {
            continue;
        };
        out.push(id);
        let children: Vec<NodeId> = node.children().filter(|c| c.is_element()).map(|c| c.id()).collect();
        stack.extend(children.into_iter().rev());
    }
    out
}

fn indent_of(tree: &Tree, block: NodeId) -> usize {
    ListBlock::of(tree, block).map(|b| b.indent).unwrap_or(0)
}

/// Whether the stored indent is absent or a non-negative integer
fn has_valid_indent(tree: &Tree, block: NodeId) -> bool {
    tree.get(block)
        .and_then(|node| node.get_attribute(LIST_INDENT).map(|value| value.as_u64().is_some()))
        .unwrap_or(true)
}

/// Rewrite the indents of one run of list blocks into a valid staircase.
///
/// A jump deeper than one level is shifted up, and the blocks after it
/// keep their depth relative to it until the run climbs back to a valid
/// level. An indent stored as anything but a non-negative integer is read
/// as 0 and written back as a number. Returns whether anything changed.
pub fn fix_list_indents(writer: &mut Writer<'_>, run: &[NodeId]) -> ListResult<bool> {
    let mut max_indent = 0;
    let mut prev_indent: Option<usize> = None;
    let mut fix_by: Option<usize> = None;
    let mut applied = false;

    for &block in run {
        let indent = indent_of(writer.tree(), block);
        let valid = has_valid_indent(writer.tree(), block);

        if indent > max_indent {
            let shift = match fix_by {
                None => indent - max_indent,
                Some(fix_by) => fix_by.min(indent),
            };
            fix_by = Some(shift);

            let mut new_indent = indent - shift;
            if let Some(prev) = prev_indent {
                new_indent = new_indent.max(prev).min(prev + 1);
            }
            if new_indent != indent || !valid {
                writer.set_attribute(LIST_INDENT, json!(new_indent), block)?;
                tracing::trace!(block = %block, from = indent, to = new_indent, "list indent fixed");
                applied = true;
            }
            prev_indent = Some(new_indent);
        } else {
            if !valid {
                writer.set_attribute(LIST_INDENT, json!(indent), block)?;
                tracing::trace!(block = %block, to = indent, "list indent normalized");
                applied = true;
            }
            fix_by = None;
            max_indent = indent + 1;
            prev_indent = Some(indent);
        }
    }
    Ok(applied)
}

/// Give every list item of one run its own id, and a new id to any block
/// whose list type differs from the item's first block.
///
/// `seen` carries ids across runs so an id reused by two separate lists is
/// split too. Returns whether anything changed.
pub fn fix_list_item_ids(
    writer: &mut Writer<'_>,
    run: &[NodeId],
    seen: &mut HashSet<String>,
    uid: &mut ListItemUid,
) -> ListResult<bool> {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut applied = false;

    for &node in run {
        if visited.contains(&node) {
            continue;
        }
        let Some(first) = ListBlock::of(writer.tree(), node) else {
            continue;
        };

        let mut list_type = first.list_type;
        let mut item_id = first.id;
        if seen.contains(&item_id) {
            item_id = uid.next_id();
        }
        seen.insert(item_id.clone());

        for block in list_item_blocks_forward(writer.tree(), node)? {
            visited.insert(block);
            let Some(current) = ListBlock::of(writer.tree(), block) else {
                continue;
            };

            if current.list_type != list_type {
                item_id = uid.next_id();
                seen.insert(item_id.clone());
                list_type = current.list_type;
            }
            if current.id != item_id {
                writer.set_attribute(LIST_ITEM_ID, json!(item_id), block)?;
                tracing::trace!(block = %block, from = %current.id, to = %item_id, "list item id fixed");
                applied = true;
            }
        }
    }
    Ok(applied)
}

/// Run both fixups over every list under `parent`, nested containers
/// included. Returns whether anything changed.
pub fn post_fix_lists(writer: &mut Writer<'_>, parent: NodeId, uid: &mut ListItemUid) -> ListResult<bool> {
    let containers = element_subtree(writer.tree(), parent);
    let runs: Vec<Vec<NodeId>> = containers
        .iter()
        .flat_map(|&container| list_runs(writer.tree(), container))
        .collect();
    for block in runs.iter().flatten() {
        if let Some(list_block) = ListBlock::of(writer.tree(), *block) {
            uid.reserve(list_block.id);
        }
    }

    let mut seen = HashSet::new();
    let mut applied = false;
    for run in &runs {
        applied |= fix_list_indents(writer, run)?;
        applied |= fix_list_item_ids(writer, run, &mut seen, uid)?;
    }
    if applied {
        tracing::debug!(lists = runs.len(), "lists post-fixed");
    }
    Ok(applied)
}
