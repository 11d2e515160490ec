//! Host-side render tree.
//!
//! Guest components render to a JSON element tree inside their sandbox;
//! this module turns that tree into [`RenderNode`]s and serializes them to
//! escaped markup.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Elements that never have children or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Style properties whose numeric values carry no unit.
const UNITLESS_PROPERTIES: &[&str] = &[
    "animation-iteration-count",
    "column-count",
    "fill-opacity",
    "flex",
    "flex-grow",
    "flex-shrink",
    "font-weight",
    "line-height",
    "opacity",
    "order",
    "orphans",
    "stroke-opacity",
    "tab-size",
    "widows",
    "z-index",
    "zoom",
];

/// A node of a rendered component tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RenderNode {
    /// Plain text content.
    Text {
        /// Unescaped text.
        value: String,
    },
    /// A host element.
    Element(Element),
    /// A list of siblings with no wrapper element.
    Fragment {
        /// Child nodes.
        children: Vec<RenderNode>,
    },
}

/// A host element with attributes and inline style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
    /// Lowercase tag name.
    pub tag: String,
    /// Attributes other than `style`.
    pub attrs: BTreeMap<String, String>,
    /// Inline style keyed by CSS property name.
    pub style: BTreeMap<String, String>,
    /// Child nodes.
    pub children: Vec<RenderNode>,
}

/// The JSON shape produced by the in-sandbox renderer.
#[derive(Debug, Deserialize)]
#[serde(tag = "t", rename_all = "lowercase")]
enum WireNode {
    Text {
        value: String,
    },
    Element {
        tag: String,
        #[serde(default)]
        attrs: BTreeMap<String, Value>,
        #[serde(default)]
        style: BTreeMap<String, Value>,
        #[serde(default)]
        children: Vec<WireNode>,
    },
    Fragment {
        #[serde(default)]
        children: Vec<WireNode>,
    },
}

impl RenderNode {
    /// Create a text node.
    pub fn text(value: impl Into<String>) -> Self {
        RenderNode::Text {
            value: value.into(),
        }
    }

    /// Create an element with no attributes.
    pub fn element(tag: impl Into<String>, children: Vec<RenderNode>) -> Self {
        RenderNode::Element(Element {
            tag: tag.into(),
            attrs: BTreeMap::new(),
            style: BTreeMap::new(),
            children,
        })
    }

    /// Parse the JSON tree emitted by the sandbox renderer.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the JSON is malformed or an
    /// element has an invalid tag name.
    pub fn from_wire(json: &str) -> Result<Self, String> {
        let wire: WireNode =
            serde_json::from_str(json).map_err(|e| format!("malformed render output: {e}"))?;
        convert(wire)
    }

    /// The root element, skipping through fragments to the first element.
    pub fn root_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            RenderNode::Element(element) => Some(element),
            RenderNode::Fragment { children } => {
                children.iter_mut().find_map(RenderNode::root_element_mut)
            }
            RenderNode::Text { .. } => None,
        }
    }

    /// Merge style properties into the root element's inline style.
    ///
    /// Existing properties not named in `style` are kept. Returns `false` if
    /// the tree has no element to style.
    pub fn apply_root_style(&mut self, style: &BTreeMap<String, String>) -> bool {
        match self.root_element_mut() {
            Some(element) => {
                for (property, value) in style {
                    element.style.insert(property.clone(), value.clone());
                }
                true
            }
            None => false,
        }
    }

    /// Serialize to escaped markup.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            RenderNode::Text { value } => out.push_str(&escape_text(value)),
            RenderNode::Fragment { children } => {
                for child in children {
                    child.write_html(out);
                }
            }
            RenderNode::Element(element) => element.write_html(out),
        }
    }
}

impl Element {
    fn write_html(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.attrs {
            let _ = write!(out, " {}=\"{}\"", name, escape_attr(value));
        }
        if !self.style.is_empty() {
            let _ = write!(out, " style=\"{}\"", escape_attr(&style_text(&self.style)));
        }
        out.push('>');

        if VOID_ELEMENTS.contains(&self.tag.as_str()) {
            return;
        }
        for child in &self.children {
            child.write_html(out);
        }
        let _ = write!(out, "</{}>", self.tag);
    }
}

fn convert(wire: WireNode) -> Result<RenderNode, String> {
    match wire {
        WireNode::Text { value } => Ok(RenderNode::Text { value }),
        WireNode::Fragment { children } => Ok(RenderNode::Fragment {
            children: children.into_iter().map(convert).collect::<Result<_, _>>()?,
        }),
        WireNode::Element {
            tag,
            attrs,
            style,
            children,
        } => {
            if !is_valid_tag(&tag) {
                return Err(format!("invalid element tag '{tag}'"));
            }
            let tag = tag.to_ascii_lowercase();
            let children = if VOID_ELEMENTS.contains(&tag.as_str()) {
                Vec::new()
            } else {
                children.into_iter().map(convert).collect::<Result<_, _>>()?
            };
            Ok(RenderNode::Element(Element {
                tag,
                attrs: convert_attrs(attrs),
                style: convert_style(style),
                children,
            }))
        }
    }
}

fn convert_attrs(attrs: BTreeMap<String, Value>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (name, value) in attrs {
        let name = match name.as_str() {
            "className" => "class".to_string(),
            "htmlFor" => "for".to_string(),
            _ => name,
        };
        // Inline handlers are never carried over.
        if !is_valid_attr(&name) || name.to_ascii_lowercase().starts_with("on") {
            continue;
        }
        let enumerated = name.starts_with("aria-") || name.starts_with("data-");
        let value = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) if enumerated => b.to_string(),
            Value::Bool(true) => name.to_ascii_lowercase(),
            _ => continue,
        };
        out.insert(name, value);
    }
    out
}

fn convert_style(style: BTreeMap<String, Value>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (key, value) in style {
        let property = css_property_name(&key);
        let value = match value {
            Value::String(s) => s,
            Value::Number(n) => {
                let is_zero = n.as_f64() == Some(0.0);
                if is_zero || UNITLESS_PROPERTIES.contains(&property.as_str()) {
                    n.to_string()
                } else {
                    format!("{n}px")
                }
            }
            _ => continue,
        };
        if value.is_empty() {
            continue;
        }
        out.insert(property, value);
    }
    out
}

/// Convert a camelCase style key to its CSS property name.
///
/// Custom properties (`--name`) are kept as-is, and vendor prefixes gain a
/// leading dash (`WebkitTransition` becomes `-webkit-transition`).
pub fn css_property_name(key: &str) -> String {
    if key.starts_with("--") {
        return key.to_string();
    }
    let mut out = String::with_capacity(key.len() + 4);
    if key.starts_with("ms") && key.chars().nth(2).is_some_and(|c| c.is_ascii_uppercase()) {
        out.push('-');
    }
    for (i, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 || key.len() > 1 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Render a style map as the value of a `style` attribute.
pub fn style_text(style: &BTreeMap<String, String>) -> String {
    style
        .iter()
        .map(|(property, value)| format!("{property}: {value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Escape text content for markup.
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape a value for use inside a double-quoted attribute.
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Break up closing tags so embedded text cannot end its element early.
pub fn neutralize(text: &str, tag: &str) -> String {
    let needle = format!("</{tag}");
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(position) = find_ignore_case(rest, &needle) {
        out.push_str(&rest[..position]);
        out.push_str("<\\/");
        out.push_str(&rest[position + 2..position + needle.len()]);
        rest = &rest[position + needle.len()..];
    }
    out.push_str(rest);
    out
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_valid_attr(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
}
