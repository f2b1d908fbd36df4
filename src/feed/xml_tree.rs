//! XML to object-tree conversion shared by the RSS and Atom normalizers.
//!
//! The tree uses `serde_json::Value`:
//!
//! - an element with neither attributes nor children becomes a string
//! - attributes become `@_name` keys and mixed text becomes `#text`
//! - a child element that repeats becomes an array
//!
//! A path that occurs once would collapse to a scalar under these rules, so
//! every path that *can* repeat must be listed in [`TreeOptions::array_paths`].
//! Paths are dot-joined element names from the root, e.g. `rss.channel.item`.

use std::borrow::Cow;

use quick_xml::escape::{resolve_html5_entity, unescape, unescape_with};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

use super::parser::FormatError;

pub(crate) const TEXT_KEY: &str = "#text";
const ATTRIBUTE_PREFIX: &str = "@_";

/// Structural knowledge about one dialect.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeOptions {
    /// Paths always stored as arrays, even with a single occurrence.
    pub array_paths: &'static [&'static str],
    /// Paths whose inner content is kept as raw markup under `#text` when
    /// the element carries `type="xhtml"`.
    pub markup_paths: &'static [&'static str],
}

impl TreeOptions {
    fn is_array(&self, path: &str) -> bool {
        self.array_paths.contains(&path)
    }

    fn is_markup(&self, path: &str) -> bool {
        self.markup_paths.contains(&path)
    }
}

struct Frame {
    name: String,
    path: String,
    node: Map<String, Value>,
    text: String,
}

impl Frame {
    fn child_path(&self, name: &str) -> String {
        if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.path, name)
        }
    }

    fn finish(self) -> Value {
        if self.node.is_empty() {
            return Value::String(self.text);
        }
        let mut node = self.node;
        if !self.text.is_empty() {
            node.insert(TEXT_KEY.to_string(), Value::String(self.text));
        }
        Value::Object(node)
    }
}

/// Parses `xml` into a tree rooted at a map of top-level elements.
///
/// # Errors
///
/// - [`FormatError::Xml`] for malformed markup or mismatched end tags
/// - [`FormatError::Unclosed`] when the document ends inside an element
pub(crate) fn parse_tree(xml: &str, options: &TreeOptions) -> Result<Map<String, Value>, FormatError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack = vec![Frame {
        name: String::new(),
        path: String::new(),
        node: Map::new(),
        text: String::new(),
    }];

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = element_name(&e);
                let path = current(&stack).child_path(&name);
                let attributes = read_attributes(&e)?;

                let raw_markup = options.is_markup(&path)
                    && attributes.get("@_type").and_then(Value::as_str) == Some("xhtml");
                if raw_markup {
                    let inner = reader.read_text(e.name())?;
                    let mut node = attributes;
                    node.insert(TEXT_KEY.to_string(), Value::String(inner.trim().to_string()));
                    attach(&mut stack, name, &path, Value::Object(node), options);
                } else {
                    stack.push(Frame {
                        name,
                        path,
                        node: attributes,
                        text: String::new(),
                    });
                }
            }
            Event::Empty(e) => {
                let name = element_name(&e);
                let path = current(&stack).child_path(&name);
                let attributes = read_attributes(&e)?;
                let value = if attributes.is_empty() {
                    Value::String(String::new())
                } else {
                    Value::Object(attributes)
                };
                attach(&mut stack, name, &path, value, options);
            }
            Event::Text(e) => {
                let raw = String::from_utf8_lossy(&e);
                push_text(&mut stack, &resolve_references(&raw));
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e);
                push_text(&mut stack, &text);
            }
            Event::End(_) => {
                // quick-xml has already checked that the end tag matches.
                if stack.len() > 1 {
                    if let Some(frame) = stack.pop() {
                        let name = frame.name.clone();
                        let path = frame.path.clone();
                        attach(&mut stack, name, &path, frame.finish(), options);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() > 1 {
        let open = stack.pop().map(|f| f.path).unwrap_or_default();
        return Err(FormatError::Unclosed(open));
    }

    Ok(stack.pop().map(|root| root.node).unwrap_or_default())
}

fn current(stack: &[Frame]) -> &Frame {
    // The document frame is never popped while parsing.
    &stack[stack.len() - 1]
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn read_attributes(e: &BytesStart<'_>) -> Result<Map<String, Value>, FormatError> {
    let mut attributes = Map::new();
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = format!(
            "{}{}",
            ATTRIBUTE_PREFIX,
            String::from_utf8_lossy(attr.key.as_ref())
        );
        let raw = String::from_utf8_lossy(&attr.value);
        attributes.insert(key, Value::String(resolve_references(&raw).into_owned()));
    }
    Ok(attributes)
}

/// Expands character references, the XML builtins and the HTML5 named
/// entities. Any other reference, including one a DOCTYPE declares, is
/// kept verbatim; a bare `&` is kept as-is.
fn resolve_references(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }

    let mut resolved = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        resolved.push_str(&rest[..start]);
        let tail = &rest[start..];
        let end = tail[1..]
            .find(|c: char| c == ';' || c == '&' || c == '<' || c.is_whitespace())
            .map(|offset| offset + 1)
            .filter(|&end| tail.as_bytes()[end] == b';');
        match end {
            Some(end) => {
                resolved.push_str(&resolve_reference(&tail[..=end]));
                rest = &tail[end + 1..];
            }
            None => {
                resolved.push('&');
                rest = &tail[1..];
            }
        }
    }
    resolved.push_str(rest);
    Cow::Owned(resolved)
}

fn resolve_reference(reference: &str) -> Cow<'_, str> {
    unescape(reference)
        .or_else(|_| unescape_with(reference, resolve_html5_entity))
        .unwrap_or(Cow::Borrowed(reference))
}

fn push_text(stack: &mut [Frame], text: &str) {
    // Text outside the root element is ignored.
    if stack.len() > 1 {
        if let Some(frame) = stack.last_mut() {
            frame.text.push_str(text);
        }
    }
}

fn attach(stack: &mut [Frame], name: String, path: &str, value: Value, options: &TreeOptions) {
    let Some(parent) = stack.last_mut() else {
        return;
    };
    let merged = match parent.node.remove(&name) {
        None if options.is_array(path) => Value::Array(vec![value]),
        None => value,
        Some(Value::Array(mut items)) => {
            items.push(value);
            Value::Array(items)
        }
        Some(existing) => Value::Array(vec![existing, value]),
    };
    parent.node.insert(name, merged);
}

// ============================================================================
// Tree accessors used by the normalizers
// ============================================================================

/// Finds the field kind declared for element `name` in a dialect's table.
pub(crate) fn lookup<T: Copy>(table: &[(&str, T)], name: &str) -> Option<T> {
    table
        .iter()
        .find(|(field, _)| *field == name)
        .map(|(_, kind)| *kind)
}

/// Iterates an element's children (and attributes) as `(name, value)`.
/// A text-only element has no entries.
pub(crate) fn entries(node: &Value) -> impl Iterator<Item = (&str, &Value)> {
    node.as_object()
        .into_iter()
        .flat_map(|map| map.iter().map(|(k, v)| (k.as_str(), v)))
}

/// Iterates every occurrence of a possibly-repeated value.
pub(crate) fn occurrences(node: &Value) -> impl Iterator<Item = &Value> {
    match node {
        Value::Array(items) => items.iter(),
        other => std::slice::from_ref(other).iter(),
    }
}

/// Text of an element: the string itself or its `#text`. Repeats yield the
/// first occurrence; an element without text yields `None`.
pub(crate) fn text(node: &Value) -> Option<String> {
    match node {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get(TEXT_KEY).and_then(Value::as_str).map(str::to_string),
        Value::Array(items) => items.first().and_then(text),
        _ => None,
    }
}

/// Value of attribute `name` on an element.
pub(crate) fn attribute(node: &Value, name: &str) -> Option<String> {
    node.as_object()
        .and_then(|map| map.get(&format!("{}{}", ATTRIBUTE_PREFIX, name)))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Text of child element `name`.
pub(crate) fn child_text(node: &Value, name: &str) -> Option<String> {
    node.as_object().and_then(|map| map.get(name)).and_then(text)
}
