//! Canonical pretty-printing of HTML.
//!
//! Markup is parsed with `scraper` (html5ever, so real-world tag soup is
//! fine) and written back one node per line with one space of indentation
//! per level. The output parses back to the same tree, which makes
//! normalization idempotent.
//!
//! `<plaintext>` switches the tokenizer to text until end of input, so
//! nothing is written after its content: any closing tag there would come
//! back as more text on the next parse.

use std::ops::ControlFlow;

use scraper::{ElementRef, Html, Node};

use crate::{Error, Result};

/// Pretty-printed markup, the final artifact of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDocument {
    pub text: String,
}

const INDENT: &str = " ";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta", "param",
    "source", "track", "wbr",
];

// Children of these are kept verbatim; escaping them would change the text.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "iframe", "noembed", "noframes", "xmp", "plaintext",
];

/// Parse `input` as UTF-8 markup and re-serialize it canonically.
pub fn normalize(input: impl AsRef<[u8]>) -> Result<NormalizedDocument> {
    let bytes = input.as_ref();
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let markup = std::str::from_utf8(bytes)
        .map_err(|e| Error::ParseFailure(format!("input is not valid UTF-8: {}", e)))?;
    if markup.is_empty() {
        return Err(Error::ParseFailure("input is empty".to_string()));
    }

    let html = Html::parse_document(markup);
    let mut out = String::with_capacity(markup.len() + markup.len() / 2);

    for child in html.tree.root().children() {
        match child.value() {
            Node::Doctype(doctype) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(doctype.name());
                if !doctype.public_id().is_empty() || !doctype.system_id().is_empty() {
                    out.push_str(&format!(
                        " PUBLIC \"{}\" \"{}\"",
                        doctype.public_id(),
                        doctype.system_id()
                    ));
                }
                out.push_str(">\n");
            }
            Node::Comment(comment) => push_comment(&mut out, comment, 0),
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(child) {
                    if write_element(&mut out, element, 0).is_break() {
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    Ok(NormalizedDocument { text: out })
}

/// Write `element` and its subtree. Breaks once a `<plaintext>` element has
/// been written; callers must not write anything further.
fn write_element(out: &mut String, element: ElementRef<'_>, depth: usize) -> ControlFlow<()> {
    let el = element.value();
    let name = el.name();

    push_indent(out, depth);
    out.push('<');
    out.push_str(name);
    let mut attrs: Vec<(&str, &str)> = el.attrs().collect();
    attrs.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }

    if VOID_ELEMENTS.contains(&name) {
        out.push_str("/>\n");
        return ControlFlow::Continue(());
    }
    out.push_str(">\n");

    let raw = RAW_TEXT_ELEMENTS.contains(&name);
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = trim_html_whitespace(text);
                if trimmed.is_empty() {
                    continue;
                }
                push_indent(out, depth + 1);
                if raw {
                    out.push_str(trimmed);
                } else {
                    out.push_str(&escape_text(trimmed));
                }
                out.push('\n');
            }
            Node::Comment(comment) => push_comment(out, comment, depth + 1),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    write_element(out, child, depth + 1)?;
                }
            }
            _ => {}
        }
    }

    if name == "plaintext" {
        return ControlFlow::Break(());
    }
    push_indent(out, depth);
    out.push_str("</");
    out.push_str(name);
    out.push_str(">\n");
    ControlFlow::Continue(())
}

fn push_comment(out: &mut String, comment: &str, depth: usize) {
    push_indent(out, depth);
    out.push_str("<!--");
    out.push_str(comment);
    out.push_str("-->\n");
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

// HTML whitespace is ASCII only; U+00A0 is content.
fn trim_html_whitespace(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_ascii_whitespace())
}

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
