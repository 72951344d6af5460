//! # View Tree
//!
//! The part of the rendering layer's tree that list conversion reads and
//! builds: named elements with string attributes, text, and attribute
//! elements that carry a wrapping priority and an id.
//!
//! Nodes live in an arena owned by [`ViewTree`]; [`ViewNode`] is a borrowed
//! read view and [`ViewWriter`] the only way to build or rearrange nodes.

use crate::errors::{ListError, ListResult};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewNodeId(u32);

impl ViewNodeId {
    pub fn raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ViewNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Wrapping options of an attribute element
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeElementOptions {
    /// Higher priority wraps closer to the content
    pub priority: f64,
    /// Elements with the same id are merged by the view layer
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum ViewKind {
    Element {
        name: String,
        attributes: BTreeMap<String, String>,
        wrapping: Option<AttributeElementOptions>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct ViewNodeData {
    kind: ViewKind,
    parent: Option<ViewNodeId>,
    children: Vec<ViewNodeId>,
}

/// Arena of view nodes under one root container
#[derive(Debug, Clone)]
pub struct ViewTree {
    nodes: Vec<ViewNodeData>,
}

impl ViewTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![ViewNodeData {
                kind: ViewKind::Element {
                    name: "$root".to_string(),
                    attributes: BTreeMap::new(),
                    wrapping: None,
                },
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> ViewNode<'_> {
        self.node(ViewNodeId(0))
    }

    /// # Panics
    ///
    /// Panics if `id` was not created by this tree.
    pub fn node(&self, id: ViewNodeId) -> ViewNode<'_> {
        assert!(id.index() < self.nodes.len(), "view node {} is not in this tree", id);
        ViewNode { tree: self, id }
    }

    pub fn get(&self, id: ViewNodeId) -> Option<ViewNode<'_>> {
        (id.index() < self.nodes.len()).then_some(ViewNode { tree: self, id })
    }

    /// Every node below `id` in document order (pre-order), `id` excluded
    pub fn descendants(&self, id: ViewNodeId) -> Vec<ViewNode<'_>> {
        let mut out = Vec::new();
        let Some(node) = self.get(id) else {
            return out;
        };
        let mut stack: Vec<ViewNodeId> = node.data().children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(self.node(next));
            stack.extend(self.data(next).children.iter().rev().copied());
        }
        out
    }

    /// First element below the root whose text content equals `text`
    pub fn find_by_text(&self, name: &str, text: &str) -> Option<ViewNode<'_>> {
        self.descendants(ViewNodeId(0))
            .into_iter()
            .find(|node| node.is_element(name) && node.own_text() == text)
    }

    fn data(&self, id: ViewNodeId) -> &ViewNodeData {
        &self.nodes[id.index()]
    }

    fn data_mut(&mut self, id: ViewNodeId) -> &mut ViewNodeData {
        &mut self.nodes[id.index()]
    }

    fn alloc(&mut self, kind: ViewKind) -> ViewNodeId {
        let id = ViewNodeId(self.nodes.len() as u32);
        self.nodes.push(ViewNodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }
}

impl Default for ViewTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowed read view of a view node
#[derive(Clone, Copy)]
pub struct ViewNode<'a> {
    tree: &'a ViewTree,
    id: ViewNodeId,
}

impl<'a> ViewNode<'a> {
    pub fn id(&self) -> ViewNodeId {
        self.id
    }

    fn data(&self) -> &'a ViewNodeData {
        self.tree.data(self.id)
    }

    pub fn name(&self) -> Option<&'a str> {
        match &self.data().kind {
            ViewKind::Element { name, .. } => Some(name),
            ViewKind::Text(_) => None,
        }
    }

    pub fn is_element(&self, name: &str) -> bool {
        self.name() == Some(name)
    }

    pub fn is_text(&self) -> bool {
        matches!(self.data().kind, ViewKind::Text(_))
    }

    pub fn data_str(&self) -> Option<&'a str> {
        match &self.data().kind {
            ViewKind::Text(data) => Some(data),
            ViewKind::Element { .. } => None,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&'a str> {
        match &self.data().kind {
            ViewKind::Element { attributes, .. } => attributes.get(key).map(String::as_str),
            ViewKind::Text(_) => None,
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&'a str, &'a str)> {
        let attributes = match &self.data().kind {
            ViewKind::Element { attributes, .. } => Some(attributes),
            ViewKind::Text(_) => None,
        };
        attributes
            .into_iter()
            .flat_map(|map| map.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    pub fn is_attribute_element(&self) -> bool {
        self.wrapping().is_some()
    }

    pub fn wrapping(&self) -> Option<&'a AttributeElementOptions> {
        match &self.data().kind {
            ViewKind::Element { wrapping, .. } => wrapping.as_ref(),
            ViewKind::Text(_) => None,
        }
    }

    pub fn priority(&self) -> Option<f64> {
        self.wrapping().map(|options| options.priority)
    }

    pub fn element_id(&self) -> Option<&'a str> {
        self.wrapping().and_then(|options| options.id.as_deref())
    }

    pub fn parent(&self) -> Option<ViewNode<'a>> {
        self.data().parent.map(|id| self.tree.node(id))
    }

    pub fn children(&self) -> impl Iterator<Item = ViewNode<'a>> + 'a {
        let tree = self.tree;
        self.data().children.iter().map(move |&id| tree.node(id))
    }

    pub fn child(&self, index: usize) -> Option<ViewNode<'a>> {
        self.data().children.get(index).map(|&id| self.tree.node(id))
    }

    pub fn index(&self) -> Option<usize> {
        let parent = self.data().parent?;
        self.tree.data(parent).children.iter().position(|&c| c == self.id)
    }

    pub fn previous_sibling(&self) -> Option<ViewNode<'a>> {
        let index = self.index()?;
        self.parent()?.child(index.checked_sub(1)?)
    }

    pub fn next_sibling(&self) -> Option<ViewNode<'a>> {
        let index = self.index()?;
        self.parent()?.child(index + 1)
    }

    /// Text of the direct text children
    pub fn own_text(&self) -> String {
        self.children().filter_map(|c| c.data_str()).collect()
    }
}

impl fmt::Debug for ViewNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "<{}>#{}", name, self.id),
            None => write!(f, "{:?}#{}", self.data_str().unwrap_or(""), self.id),
        }
    }
}

impl PartialEq for ViewNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

/// Builds and rearranges view nodes
pub struct ViewWriter<'a> {
    tree: &'a mut ViewTree,
}

impl<'a> ViewWriter<'a> {
    pub fn new(tree: &'a mut ViewTree) -> Self {
        Self { tree }
    }

    pub fn tree(&self) -> &ViewTree {
        self.tree
    }

    pub fn create_container_element(&mut self, name: &str, attributes: &[(&str, &str)]) -> ViewNodeId {
        self.tree.alloc(ViewKind::Element {
            name: name.to_string(),
            attributes: collect_attributes(attributes),
            wrapping: None,
        })
    }

    pub fn create_attribute_element(
        &mut self,
        name: &str,
        attributes: &[(&str, &str)],
        options: AttributeElementOptions,
    ) -> ViewNodeId {
        self.tree.alloc(ViewKind::Element {
            name: name.to_string(),
            attributes: collect_attributes(attributes),
            wrapping: Some(options),
        })
    }

    pub fn create_text(&mut self, data: &str) -> ViewNodeId {
        self.tree.alloc(ViewKind::Text(data.to_string()))
    }

    /// Append `child` to `parent`, taking it out of its current parent
    /// first.
    pub fn append(&mut self, child: ViewNodeId, parent: ViewNodeId) -> ListResult<()> {
        if self.tree.node(parent).is_text() {
            return Err(ListError::NotAnElement(parent.raw()));
        }
        let is_ancestor = std::iter::successors(Some(parent), |&id| self.tree.data(id).parent)
            .any(|id| id == child);
        if is_ancestor {
            return Err(ListError::NotAnElement(child.raw()));
        }
        self.remove(child);
        self.tree.data_mut(parent).children.push(child);
        self.tree.data_mut(child).parent = Some(parent);
        Ok(())
    }

    pub fn remove(&mut self, child: ViewNodeId) {
        if let Some(parent) = self.tree.data_mut(child).parent.take() {
            self.tree.data_mut(parent).children.retain(|&c| c != child);
        }
    }
}

fn collect_attributes(attributes: &[(&str, &str)]) -> BTreeMap<String, String> {
    attributes
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_navigate() {
        let mut tree = ViewTree::new();
        let root = tree.root().id();
        let mut writer = ViewWriter::new(&mut tree);
        let ul = writer.create_container_element("ul", &[]);
        let a = writer.create_container_element("li", &[("class", "first")]);
        let b = writer.create_container_element("li", &[]);
        let text = writer.create_text("a");
        writer.append(ul, root).unwrap();
        writer.append(a, ul).unwrap();
        writer.append(b, ul).unwrap();
        writer.append(text, a).unwrap();

        let node = tree.node(b);
        assert_eq!(node.previous_sibling().map(|n| n.id()), Some(a));
        assert_eq!(node.index(), Some(1));
        assert!(node.next_sibling().is_none());
        assert_eq!(tree.node(a).attribute("class"), Some("first"));
        assert_eq!(tree.find_by_text("li", "a").map(|n| n.id()), Some(a));
        assert_eq!(tree.descendants(root).len(), 4);
    }

    #[test]
    fn test_append_moves_node() {
        let mut tree = ViewTree::new();
        let root = tree.root().id();
        let mut writer = ViewWriter::new(&mut tree);
        let first = writer.create_container_element("div", &[]);
        let second = writer.create_container_element("div", &[]);
        let child = writer.create_text("x");
        writer.append(first, root).unwrap();
        writer.append(second, root).unwrap();
        writer.append(child, first).unwrap();
        writer.append(child, second).unwrap();

        assert!(tree.node(first).children().next().is_none());
        assert_eq!(tree.node(child).parent().map(|p| p.id()), Some(second));
    }

    #[test]
    fn test_append_rejects_text_parent_and_cycles() {
        let mut tree = ViewTree::new();
        let root = tree.root().id();
        let mut writer = ViewWriter::new(&mut tree);
        let text = writer.create_text("x");
        let div = writer.create_container_element("div", &[]);
        assert_eq!(writer.append(div, text), Err(ListError::NotAnElement(text.raw())));

        writer.append(div, root).unwrap();
        assert!(writer.append(root, div).is_err());
    }

    #[test]
    fn test_attribute_element_options() {
        let mut tree = ViewTree::new();
        let mut writer = ViewWriter::new(&mut tree);
        let span = writer.create_attribute_element(
            "span",
            &[],
            AttributeElementOptions {
                priority: 5.0,
                id: Some("marker".to_string()),
            },
        );
        let node = tree.node(span);
        assert!(node.is_attribute_element());
        assert_eq!(node.priority(), Some(5.0));
        assert_eq!(node.element_id(), Some("marker"));
    }
}
