//! List view elements: nesting depth of `<li>` nodes and the attribute
//! elements that wrap list content.
//!
//! ## Priorities
//!
//! Lists are nested attribute elements, so their wrapping order comes from
//! priorities. Each indent level gets two slots, list container first:
//!
//! ```text
//! indent 0:  ul -100.00   li -99.99
//! indent 1:  ul  -99.98   li -99.97
//! ...
//! ```
//!
//! The values stay negative so that other attribute elements wrap lists
//! and never the other way round.

use crate::blocks::ListType;
use crate::view::{AttributeElementOptions, ViewNodeId, ViewTree, ViewWriter};

/// Logical nesting depth of a view list item.
///
/// Every `<li>` ancestor adds a level. A list container nested directly
/// in another container (no `<li>` in between) adds a level only when it
/// follows an `<li>`, so stacks of redundant wrappers count once.
pub fn get_indent(view: &ViewTree, item: ViewNodeId) -> usize {
    let mut indent = 0;
    let mut parent = view.get(item).and_then(|node| node.parent());

    while let Some(node) = parent {
        if node.is_element("li") {
            indent += 1;
        } else if node
            .previous_sibling()
            .is_some_and(|sibling| sibling.is_element("li"))
        {
            indent += 1;
        }
        parent = node.parent();
    }
    indent
}

/// `ol` for numbered lists, `ul` otherwise
pub fn list_element_name(list_type: ListType) -> &'static str {
    match list_type {
        ListType::Numbered => "ol",
        ListType::Bulleted => "ul",
    }
}

/// Default id of the list container at `indent`
pub fn list_element_id(list_type: ListType, indent: usize) -> String {
    format!("list-{}-{}", list_type, indent)
}

pub fn list_element_priority(indent: usize) -> f64 {
    (2 * indent) as f64 / 100.0 - 100.0
}

pub fn list_item_element_priority(indent: usize) -> f64 {
    (2 * indent + 1) as f64 / 100.0 - 100.0
}

/// `<ol>`/`<ul>` attribute element for a list at `indent`
pub fn create_list_element(
    writer: &mut ViewWriter<'_>,
    indent: usize,
    list_type: ListType,
    id: Option<&str>,
) -> ViewNodeId {
    let id = id.map(String::from).unwrap_or_else(|| list_element_id(list_type, indent));
    writer.create_attribute_element(
        list_element_name(list_type),
        &[],
        AttributeElementOptions {
            priority: list_element_priority(indent),
            id: Some(id),
        },
    )
}

/// `<li>` attribute element for an item at `indent`
pub fn create_list_item_element(writer: &mut ViewWriter<'_>, indent: usize, id: &str) -> ViewNodeId {
    writer.create_attribute_element(
        "li",
        &[],
        AttributeElementOptions {
            priority: list_item_element_priority(indent),
            id: Some(id.to_string()),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::parse_view;

    fn indent_of(markup: &str, text: &str) -> usize {
        let tree = parse_view(markup).unwrap();
        let item = tree.find_by_text("li", text).unwrap().id();
        get_indent(&tree, item)
    }

    #[test]
    fn test_flat_list() {
        let markup = "<ul><li>a</li><li>b</li></ul>";
        assert_eq!(indent_of(markup, "a"), 0);
        assert_eq!(indent_of(markup, "b"), 0);
    }

    #[test]
    fn test_nested_list() {
        let markup = "<ul><li>a</li><li>b<ul><li>c</li></ul></li></ul>";
        assert_eq!(indent_of(markup, "c"), 1);
    }

    #[test]
    fn test_double_nested_list() {
        let markup = "<ul><li>a<ul><li>b<ol><li>c</li></ol></li></ul></li></ul>";
        assert_eq!(indent_of(markup, "b"), 1);
        assert_eq!(indent_of(markup, "c"), 2);
    }

    #[test]
    fn test_wrapper_between_item_and_list() {
        let markup = "<ul><li>a<div><div><ul><li>b</li></ul></div></div></li></ul>";
        assert_eq!(indent_of(markup, "b"), 1);
    }

    #[test]
    fn test_list_nested_directly_in_list() {
        // Malformed: the sublist sits next to the item instead of inside it
        let markup = "<ol><li>a</li><ol><li>b</li></ol></ol>";
        assert_eq!(indent_of(markup, "b"), 1);
    }

    #[test]
    fn test_item_of_another_view_has_no_indent() {
        let nested = parse_view("<ul><li>a<ul><li>b<ul><li>c</li></ul></li></ul></li></ul>").unwrap();
        let item = nested.find_by_text("li", "c").unwrap().id();
        let empty = ViewTree::new();
        assert_eq!(get_indent(&empty, item), 0);
        assert!(empty.descendants(item).is_empty());
    }

    #[test]
    fn test_redundant_wrappers_count_once() {
        let markup = "<ol><li>a</li><ol><ol><ol><ol><li>b</li></ol></ol></ol></ol></ol>";
        assert_eq!(indent_of(markup, "b"), 1);
    }

    #[test]
    fn test_create_list_element() {
        let mut tree = ViewTree::new();
        let mut writer = ViewWriter::new(&mut tree);
        let numbered = create_list_element(&mut writer, 0, ListType::Numbered, None);
        let bulleted = create_list_element(&mut writer, 3, ListType::Bulleted, Some("custom"));

        let node = tree.node(numbered);
        assert!(node.is_element("ol"));
        assert!(node.is_attribute_element());
        assert_eq!(node.element_id(), Some("list-numbered-0"));
        assert_eq!(node.priority(), Some(-100.0));

        let node = tree.node(bulleted);
        assert!(node.is_element("ul"));
        assert_eq!(node.element_id(), Some("custom"));
    }

    #[test]
    fn test_create_list_item_element() {
        let mut tree = ViewTree::new();
        let mut writer = ViewWriter::new(&mut tree);
        let item = create_list_item_element(&mut writer, 2, "item-a");
        let node = tree.node(item);
        assert!(node.is_element("li"));
        assert_eq!(node.element_id(), Some("item-a"));
        assert_eq!(node.priority(), Some(list_item_element_priority(2)));
    }

    #[test]
    fn test_priorities_interleave() {
        for indent in 0..20 {
            let list = list_element_priority(indent);
            let item = list_item_element_priority(indent);
            let next_list = list_element_priority(indent + 1);
            assert!(list < item, "indent {}", indent);
            assert!(item < next_list, "indent {}", indent);
            assert!(next_list < 80.0);
        }
    }
}
