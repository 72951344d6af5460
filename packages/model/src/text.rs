//! # Text
//!
//! Text nodes measure offsets in characters. Operations whose boundaries
//! fall inside a text node split it; normalization merges neighbours with
//! equal attributes back together, so text node identity is not stable
//! across changes. Use positions to refer to text.

use crate::attributes::Attributes;
use crate::node::NodeRef;
use serde_json::Value;

/// Byte index of the `chars`-th character of `s` (or `s.len()` past the end).
pub(crate) fn char_to_byte(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(s.len())
}

/// Read-only slice of a text node
#[derive(Debug, Clone, Copy)]
pub struct TextProxy<'a> {
    node: NodeRef<'a>,
    offset_in_text: usize,
    length: usize,
}

impl<'a> TextProxy<'a> {
    pub(crate) fn new(node: NodeRef<'a>, offset_in_text: usize, length: usize) -> Self {
        Self {
            node,
            offset_in_text,
            length,
        }
    }

    /// Text node this proxy is a slice of
    pub fn text_node(&self) -> NodeRef<'a> {
        self.node
    }

    pub fn offset_in_text(&self) -> usize {
        self.offset_in_text
    }

    pub fn offset_size(&self) -> usize {
        self.length
    }

    /// Whether the proxy covers the whole text node
    pub fn is_partial(&self) -> bool {
        self.offset_in_text != 0 || self.length != self.node.offset_size()
    }

    pub fn data(&self) -> &'a str {
        let full = self.node.data_str().unwrap_or("");
        let start = char_to_byte(full, self.offset_in_text);
        let end = char_to_byte(full, self.offset_in_text + self.length);
        &full[start..end]
    }

    pub fn attributes(&self) -> &'a Attributes {
        self.node.attributes()
    }

    pub fn get_attribute(&self, key: &str) -> Option<&'a Value> {
        self.node.get_attribute(key)
    }
}

/// One item of a flat range: a whole node or part of a text node
#[derive(Debug, Clone, Copy)]
pub enum Item<'a> {
    Node(NodeRef<'a>),
    Text(TextProxy<'a>),
}

impl<'a> Item<'a> {
    pub fn offset_size(&self) -> usize {
        match self {
            Item::Node(node) => node.offset_size(),
            Item::Text(proxy) => proxy.offset_size(),
        }
    }

    pub fn attributes(&self) -> &'a Attributes {
        match self {
            Item::Node(node) => node.attributes(),
            Item::Text(proxy) => proxy.attributes(),
        }
    }

    pub fn get_attribute(&self, key: &str) -> Option<&'a Value> {
        self.attributes().get(key)
    }
}
