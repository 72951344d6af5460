//! Child lookup for elements, root elements and fragments.

use crate::errors::ModelError;
use crate::node::{NodeKind, NodeRef};

impl<'a> NodeRef<'a> {
    pub fn child_count(&self) -> usize {
        self.data().children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data().children.is_empty()
    }

    pub fn child(&self, index: usize) -> Option<NodeRef<'a>> {
        self.data()
            .children
            .get(index)
            .map(|&id| self.tree.node(id))
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let tree = self.tree;
        self.data().children.iter().map(move |&id| tree.node(id))
    }

    /// Sum of the children's offset sizes
    pub fn max_offset(&self) -> usize {
        self.children().map(|child| child.offset_size()).sum()
    }

    /// Index of the child that contains `offset`, or `child_count()` when
    /// `offset == max_offset()`.
    pub fn offset_to_index(&self, offset: usize) -> Result<usize, ModelError> {
        let mut total = 0;
        for (index, child) in self.children().enumerate() {
            let size = child.offset_size();
            if offset < total + size {
                return Ok(index);
            }
            total += size;
        }
        if offset == total {
            Ok(self.child_count())
        } else {
            Err(ModelError::OffsetOutOfBounds { offset, max: total })
        }
    }

    /// Start offset of the child at `index`; `max_offset()` past the end.
    pub fn index_to_offset(&self, index: usize) -> usize {
        self.children().take(index).map(|child| child.offset_size()).sum()
    }

    /// Child node that spans `offset`
    pub fn child_at_offset(&self, offset: usize) -> Option<NodeRef<'a>> {
        self.offset_to_index(offset)
            .ok()
            .and_then(|index| self.child(index))
    }

    /// Follow `path` offsets down from this node to an element or text.
    ///
    /// Each step must land on a node start except the last, which may land
    /// inside a text node.
    pub fn node_at_path(&self, path: &[usize]) -> Option<NodeRef<'a>> {
        let mut current = *self;
        for &offset in path {
            current = current.child_at_offset(offset)?;
        }
        Some(current)
    }

    /// Whether this node can hold children
    pub fn can_have_children(&self) -> bool {
        !matches!(self.kind(), NodeKind::Text { .. })
    }
}
