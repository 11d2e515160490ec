//! Settings-to-style bridge.
//!
//! Converts a settings snapshot into concrete inline style properties and
//! wires a settings tree's change observer back to the composition.
//!
//! | Snapshot key      | Style property     |
//! |-------------------|--------------------|
//! | `color`           | `background-color` |
//! | `width`           | `width`            |
//! | `opacity`/`opacit`| `opacity`          |
//! | `borders.size`    | `border-width`     |
//! | `borders.color`   | `border-color`     |
//! | `borders.radius`  | `border-radius`    |

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use widget_composer_core::settings::parse_color;
use widget_composer_core::{ChangeObserver, RenderNode};

/// Concrete style properties keyed by CSS property name.
pub type StyleMap = BTreeMap<String, String>;

/// A live settings edit forwarded to the composition.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleChange {
    /// Widget identifier the snapshot belongs to.
    pub identifier: String,
    /// The full snapshot after the edit.
    pub snapshot: Value,
}

/// Convert a settings snapshot into a style map.
///
/// The snapshot may be the flat settings of one widget or a single-key
/// wrapper around them; a lone top-level key whose value is a mapping is
/// unwrapped once, whatever its name. Leaves may be raw scalars or
/// objects carrying `default`, which is preferred when present.
/// Unrecognized keys are ignored and malformed input yields an empty map.
pub fn transform(settings: &Value) -> StyleMap {
    let mut style = StyleMap::new();
    let Some(map) = unwrap(settings) else {
        return style;
    };

    if let Some(rgb) = map.get("color").and_then(color) {
        style.insert("background-color".into(), rgb);
    }
    if let Some(width) = map.get("width").and_then(pixels) {
        style.insert("width".into(), width);
    }
    if let Some(opacity) = map
        .get("opacity")
        .and_then(number)
        .or_else(|| map.get("opacit").and_then(number))
    {
        style.insert("opacity".into(), opacity);
    }
    if let Some(Value::Object(borders)) = map.get("borders") {
        if let Some(size) = borders.get("size").and_then(pixels) {
            style.insert("border-width".into(), size);
        }
        if let Some(rgb) = borders.get("color").and_then(color) {
            style.insert("border-color".into(), rgb);
        }
        if let Some(radius) = borders.get("radius").and_then(pixels) {
            style.insert("border-radius".into(), radius);
        }
    }

    style
}

/// Apply a style map to a rendered instance's root element.
///
/// Properties in `style` overwrite earlier values; properties it does not
/// name are left as they were. Returns `false` if the tree has no element.
pub fn apply(node: &mut RenderNode, style: &StyleMap) -> bool {
    if style.is_empty() {
        return true;
    }
    node.apply_root_style(style)
}

/// Build a change observer that forwards every snapshot for `identifier`.
pub fn observer(identifier: &str, changes: UnboundedSender<StyleChange>) -> ChangeObserver {
    let identifier = identifier.to_string();
    Box::new(move |snapshot| {
        let change = StyleChange {
            identifier: identifier.clone(),
            snapshot,
        };
        if changes.send(change).is_err() {
            debug!(identifier = %identifier, "Style change receiver dropped");
        }
    })
}

fn unwrap(settings: &Value) -> Option<&Map<String, Value>> {
    let map = settings.as_object()?;
    if map.len() == 1 {
        if let Some((_, Value::Object(inner))) = map.iter().next() {
            return Some(inner);
        }
    }
    Some(map)
}

/// The leaf's value, preferring `default` when present.
fn leaf(value: &Value) -> &Value {
    value.get("default").unwrap_or(value)
}

fn color(value: &Value) -> Option<String> {
    let [r, g, b] = parse_color(leaf(value).as_str()?)?;
    Some(format!("rgb({r},{g},{b})"))
}

fn number(value: &Value) -> Option<String> {
    match leaf(value) {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(|n| n.to_string()),
        _ => None,
    }
}

fn pixels(value: &Value) -> Option<String> {
    number(value).map(|n| format!("{n}px"))
}
