//! View markup reader and writer
//!
//! Reads the small HTML-like notation used to describe view fixtures:
//!
//! ```text
//! <ul><li>a</li><li>b<ol><li>c</li></ol></li></ul>
//! ```
//!
//! Elements become container elements; `<name/>` is an empty element.
//! There are no entities or comments.

use crate::errors::{ListError, ListResult};
use crate::view::{ViewNode, ViewNodeId, ViewTree, ViewWriter};
use logos::Logos;

/// Tokens of element content
#[derive(Logos, Debug, Clone, PartialEq)]
enum ContentToken<'src> {
    #[regex(r"<[a-zA-Z][^<>]*>", |lex| lex.slice())]
    OpenTag(&'src str),

    #[regex(r"</[a-zA-Z][a-zA-Z0-9_:-]*[ \t\r\n]*>", |lex| {
        lex.slice()[2..lex.slice().len() - 1].trim_end()
    })]
    CloseTag(&'src str),

    #[regex(r"[^<>]+", |lex| lex.slice())]
    Text(&'src str),
}

/// Tokens inside an opening tag
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum TagToken<'src> {
    #[regex(r"[a-zA-Z_:][a-zA-Z0-9_:.-]*", |lex| lex.slice())]
    Name(&'src str),

    #[token("=")]
    Equals,

    #[regex(r#""[^"]*""#, |lex| {
        let s = lex.slice();
        &s[1..s.len() - 1]
    })]
    Value(&'src str),

    #[token("/")]
    Slash,
}

struct OpenTag<'src> {
    name: &'src str,
    attributes: Vec<(&'src str, &'src str)>,
    self_closing: bool,
}

/// Parse markup into a fresh tree; the parsed nodes are the root's
/// children.
pub fn parse_view(markup: &str) -> ListResult<ViewTree> {
    let mut tree = ViewTree::new();
    let root = tree.root().id();
    let mut writer = ViewWriter::new(&mut tree);
    let mut open: Vec<(&str, ViewNodeId)> = Vec::new();

    for (token, span) in ContentToken::lexer(markup).spanned() {
        let token = token.map_err(|_| ListError::LexerError { pos: span.start })?;
        let parent = open.last().map(|(_, id)| *id).unwrap_or(root);
        match token {
            ContentToken::OpenTag(source) => {
                let tag = parse_open_tag(source, span.start)?;
                let element = writer.create_container_element(tag.name, &tag.attributes);
                writer.append(element, parent)?;
                if !tag.self_closing {
                    open.push((tag.name, element));
                }
            }
            ContentToken::CloseTag(name) => match open.pop() {
                Some((expected, _)) if expected == name => {}
                Some((expected, _)) => {
                    return Err(ListError::unexpected_token(
                        span.start,
                        format!("</{}>", expected),
                        format!("</{}>", name),
                    ));
                }
                None => {
                    return Err(ListError::unexpected_token(span.start, "content", format!("</{}>", name)));
                }
            },
            ContentToken::Text(data) => {
                let text = writer.create_text(data);
                writer.append(text, parent)?;
            }
        }
    }

    if !open.is_empty() {
        return Err(ListError::UnexpectedEof { pos: markup.len() });
    }
    Ok(tree)
}

type Spanned<'src> = (Result<TagToken<'src>, ()>, std::ops::Range<usize>);

fn next_tag_token<'src>(
    tokens: &mut impl Iterator<Item = Spanned<'src>>,
    base: usize,
) -> ListResult<Option<(TagToken<'src>, usize)>> {
    match tokens.next() {
        Some((Ok(token), span)) => Ok(Some((token, base + span.start))),
        Some((Err(()), span)) => Err(ListError::LexerError { pos: base + span.start }),
        None => Ok(None),
    }
}

fn parse_open_tag(source: &str, offset: usize) -> ListResult<OpenTag<'_>> {
    // Strip `<` and `>`
    let inner = &source[1..source.len() - 1];
    let mut tokens = TagToken::lexer(inner).spanned();
    let base = offset + 1;
    let mut next = || next_tag_token(&mut tokens, base);

    let name = match next()? {
        Some((TagToken::Name(name), _)) => name,
        Some((token, pos)) => return Err(ListError::unexpected_token(pos, "element name", format!("{:?}", token))),
        None => return Err(ListError::UnexpectedEof { pos: offset + source.len() }),
    };

    let mut tag = OpenTag {
        name,
        attributes: Vec::new(),
        self_closing: false,
    };
    while let Some((token, pos)) = next()? {
        match token {
            TagToken::Name(key) => {
                match next()? {
                    Some((TagToken::Equals, _)) => {}
                    Some((token, pos)) => return Err(ListError::unexpected_token(pos, "=", format!("{:?}", token))),
                    None => return Err(ListError::UnexpectedEof { pos: offset + source.len() }),
                }
                match next()? {
                    Some((TagToken::Value(value), _)) => tag.attributes.push((key, value)),
                    Some((token, pos)) => {
                        return Err(ListError::unexpected_token(pos, "quoted value", format!("{:?}", token)))
                    }
                    None => return Err(ListError::UnexpectedEof { pos: offset + source.len() }),
                }
            }
            TagToken::Slash => {
                if let Some((token, pos)) = next()? {
                    return Err(ListError::unexpected_token(pos, ">", format!("{:?}", token)));
                }
                tag.self_closing = true;
            }
            other => return Err(ListError::unexpected_token(pos, "attribute name", format!("{:?}", other))),
        }
    }
    Ok(tag)
}

/// Write a node and its subtree back to markup. Attribute elements are
/// written like any other element.
pub fn stringify(node: ViewNode<'_>) -> String {
    let mut out = String::new();
    write_node(node, &mut out);
    out
}

/// Markup of every child of the root
pub fn stringify_tree(tree: &ViewTree) -> String {
    tree.root().children().map(stringify).collect()
}

fn write_node(node: ViewNode<'_>, out: &mut String) {
    let Some(name) = node.name() else {
        out.push_str(node.data_str().unwrap_or(""));
        return;
    };
    out.push('<');
    out.push_str(name);
    for (key, value) in node.attributes() {
        out.push_str(&format!(" {}=\"{}\"", key, value));
    }
    out.push('>');
    for child in node.children() {
        write_node(child, out);
    }
    out.push_str(&format!("</{}>", name));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_lists() {
        let tree = parse_view("<ul><li>a</li><li>b<ol><li>c</li></ol></li></ul>").unwrap();
        let ul = tree.root().child(0).unwrap();
        assert!(ul.is_element("ul"));
        assert_eq!(ul.children().count(), 2);

        let c = tree.find_by_text("li", "c").unwrap();
        assert!(c.parent().unwrap().is_element("ol"));
        assert_eq!(c.parent().unwrap().parent().unwrap().own_text(), "b");
    }

    #[test]
    fn test_attributes_and_empty_elements() {
        let tree = parse_view(r#"<p class="x" data-id="7">hi<br/></p>"#).unwrap();
        let p = tree.root().child(0).unwrap();
        assert_eq!(p.attribute("class"), Some("x"));
        assert_eq!(p.attribute("data-id"), Some("7"));
        assert!(p.child(1).unwrap().is_element("br"));
        assert_eq!(stringify_tree(&tree), r#"<p class="x" data-id="7">hi<br></br></p>"#);
    }

    #[test]
    fn test_round_trip() {
        let markup = "<ol><li>1<ul><li>1.1</li></ul></li><li>2</li></ol>";
        let tree = parse_view(markup).unwrap();
        assert_eq!(stringify_tree(&tree), markup);
    }

    #[test]
    fn test_mismatched_close_tag() {
        let err = parse_view("<ul><li>a</ul>").unwrap_err();
        assert!(matches!(err, ListError::UnexpectedToken { pos: 9, .. }));
    }

    #[test]
    fn test_unclosed_element() {
        let err = parse_view("<ul><li>a</li>").unwrap_err();
        assert_eq!(err, ListError::UnexpectedEof { pos: 14 });
    }

    #[test]
    fn test_stray_close_tag() {
        assert!(parse_view("a</li>").is_err());
        assert!(parse_view("<li foo>").is_err());
    }
}
