//! Setting nodes and their value rules.

use serde::Deserialize;
use serde_json::{Map, Value};

use widget_composer_common::SettingsError;

/// Default border thickness in pixels.
const BORDER_SIZE: f64 = 1.0;

/// Default border color.
const BORDER_COLOR: &str = "0,0,0";

/// Default corner radius in pixels.
const BORDER_RADIUS: f64 = 0.0;

/// The kind of a leaf setting, which decides how values are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    /// An `"r,g,b"` color triple.
    Color,
    /// An element width in pixels.
    Width,
    /// Opacity between 0 and 1.
    Opacity,
    /// A length in pixels, used by border sets.
    Size,
}

impl LeafKind {
    /// Short name used in control panels.
    pub fn as_str(self) -> &'static str {
        match self {
            LeafKind::Color => "color",
            LeafKind::Width => "width",
            LeafKind::Opacity => "opacity",
            LeafKind::Size => "size",
        }
    }

    /// Validate and normalize a value for this kind.
    ///
    /// Colors accept `"r,g,b"` or `#rrggbb` and are stored as `"r,g,b"`.
    /// Lengths accept non-negative numbers or numeric strings. Opacity is
    /// clamped into `0..=1`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidValue`] if the value does not fit.
    pub fn normalize(self, path: &str, value: &Value) -> Result<Value, SettingsError> {
        let invalid = |reason: &str| SettingsError::InvalidValue {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        match self {
            LeafKind::Color => {
                let text = value.as_str().ok_or_else(|| invalid("expected a color string"))?;
                parse_color(text)
                    .map(|[r, g, b]| Value::String(format!("{r},{g},{b}")))
                    .ok_or_else(|| invalid("expected \"r,g,b\" or #rrggbb"))
            }
            LeafKind::Width | LeafKind::Size => {
                let number = as_number(value).ok_or_else(|| invalid("expected a number"))?;
                if number < 0.0 {
                    return Err(invalid("must not be negative"));
                }
                Ok(number_value(number))
            }
            LeafKind::Opacity => {
                let number = as_number(value).ok_or_else(|| invalid("expected a number"))?;
                Ok(number_value(number.clamp(0.0, 1.0)))
            }
        }
    }
}

/// A leaf setting holding one value.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingLeaf {
    /// Validation kind.
    pub kind: LeafKind,
    /// Display title.
    pub title: Option<String>,
    /// Value declared by the settings module, `Null` when none.
    pub default: Value,
    /// Current value, `Null` when unset.
    pub value: Value,
    /// Alternative width for narrow layouts.
    pub mobile: Option<f64>,
}

/// How a composite node was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    /// A plain setting group.
    Group,
    /// A border set with `size`, `color` and `radius` children.
    BorderSet,
}

/// A composite node holding named children in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingGroup {
    /// How the group was declared.
    pub kind: GroupKind,
    /// Display title.
    pub title: Option<String>,
    /// Whether this is the top-level group of a widget.
    pub main: bool,
    /// Whether the control panel starts collapsed.
    pub collapsed: bool,
    /// Named children.
    pub entries: Vec<(String, SettingNode)>,
}

/// A node of a settings tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingNode {
    /// A single value.
    Leaf(SettingLeaf),
    /// Named children.
    Group(SettingGroup),
}

/// Descriptor JSON emitted by the settings-type library.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub(crate) enum Descriptor {
    Group {
        title: Option<String>,
        #[serde(default)]
        main: bool,
        #[serde(default)]
        collapsed: bool,
        #[serde(default)]
        entries: Vec<(String, Descriptor)>,
    },
    Color {
        title: Option<String>,
        #[serde(default, rename = "default")]
        initial: Value,
    },
    Width {
        title: Option<String>,
        #[serde(default, rename = "default")]
        initial: Value,
        mobile: Option<f64>,
    },
    Opacity {
        title: Option<String>,
        #[serde(default, rename = "default")]
        initial: Value,
    },
    Border {
        title: Option<String>,
        #[serde(default)]
        collapsed: bool,
        size: Option<f64>,
        color: Option<String>,
        radius: Option<f64>,
    },
}

impl SettingLeaf {
    /// Create a leaf whose current value starts at `default`.
    ///
    /// A default that does not fit the kind is dropped.
    pub fn new(kind: LeafKind, title: Option<String>, default: &Value) -> Self {
        let default = if default.is_null() {
            Value::Null
        } else {
            kind.normalize("", default).unwrap_or(Value::Null)
        };
        Self {
            kind,
            title,
            value: default.clone(),
            default,
            mobile: None,
        }
    }
}

impl SettingGroup {
    /// Build a group from its descriptor.
    pub(crate) fn from_descriptor(descriptor: Descriptor) -> Option<Self> {
        match SettingNode::from_descriptor(descriptor) {
            SettingNode::Group(group) => Some(group),
            SettingNode::Leaf(_) => None,
        }
    }

    /// Look up a direct child by name.
    pub fn get(&self, name: &str) -> Option<&SettingNode> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, node)| node)
    }

    /// Look up a direct child by name, mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut SettingNode> {
        self.entries
            .iter_mut()
            .find(|(entry, _)| entry == name)
            .map(|(_, node)| node)
    }

    /// Resolve a dotted path to a leaf.
    pub fn leaf_mut(&mut self, path: &str) -> Option<&mut SettingLeaf> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut node = self.get_mut(first)?;
        for segment in segments {
            node = match node {
                SettingNode::Group(group) => group.get_mut(segment)?,
                SettingNode::Leaf(_) => return None,
            };
        }
        match node {
            SettingNode::Leaf(leaf) => Some(leaf),
            SettingNode::Group(_) => None,
        }
    }

    /// Current values keyed like the tree.
    pub fn values(&self) -> Value {
        let mut map = Map::new();
        for (name, node) in &self.entries {
            let value = match node {
                SettingNode::Leaf(leaf) => leaf.value.clone(),
                SettingNode::Group(group) => group.values(),
            };
            map.insert(name.clone(), value);
        }
        Value::Object(map)
    }

    /// Replay a snapshot into the tree.
    ///
    /// Keys that match no entry and values that do not fit are skipped.
    /// Leaves accept a raw value or an object carrying `default`. Returns
    /// the number of leaves updated.
    pub fn replay(&mut self, snapshot: &Map<String, Value>, prefix: &str) -> usize {
        let mut applied = 0;
        for (name, node) in &mut self.entries {
            let Some(incoming) = snapshot.get(name.as_str()) else {
                continue;
            };
            let path = join_path(prefix, name);
            match node {
                SettingNode::Group(group) => {
                    if let Value::Object(children) = incoming {
                        applied += group.replay(children, &path);
                    }
                }
                SettingNode::Leaf(leaf) => {
                    let raw = incoming.get("default").unwrap_or(incoming);
                    if raw.is_null() {
                        continue;
                    }
                    match leaf.kind.normalize(&path, raw) {
                        Ok(value) => {
                            leaf.value = value;
                            applied += 1;
                        }
                        Err(e) => tracing::debug!(error = %e, "Skipping snapshot value"),
                    }
                }
            }
        }
        applied
    }
}

impl SettingNode {
    pub(crate) fn from_descriptor(descriptor: Descriptor) -> Self {
        match descriptor {
            Descriptor::Group {
                title,
                main,
                collapsed,
                entries,
            } => SettingNode::Group(SettingGroup {
                kind: GroupKind::Group,
                title,
                main,
                collapsed,
                entries: entries
                    .into_iter()
                    .map(|(name, child)| (name, SettingNode::from_descriptor(child)))
                    .collect(),
            }),
            Descriptor::Color { title, initial } => {
                SettingNode::Leaf(SettingLeaf::new(LeafKind::Color, title, &initial))
            }
            Descriptor::Width {
                title,
                initial,
                mobile,
            } => {
                let mut leaf = SettingLeaf::new(LeafKind::Width, title, &initial);
                leaf.mobile = mobile.filter(|m| *m >= 0.0);
                SettingNode::Leaf(leaf)
            }
            Descriptor::Opacity { title, initial } => {
                SettingNode::Leaf(SettingLeaf::new(LeafKind::Opacity, title, &initial))
            }
            Descriptor::Border {
                title,
                collapsed,
                size,
                color,
                radius,
            } => {
                let size = number_value(size.unwrap_or(BORDER_SIZE));
                let color = Value::String(color.unwrap_or_else(|| BORDER_COLOR.to_string()));
                let radius = number_value(radius.unwrap_or(BORDER_RADIUS));
                SettingNode::Group(SettingGroup {
                    kind: GroupKind::BorderSet,
                    title,
                    main: false,
                    collapsed,
                    entries: vec![
                        (
                            "size".to_string(),
                            SettingNode::Leaf(SettingLeaf::new(
                                LeafKind::Size,
                                Some("size".into()),
                                &size,
                            )),
                        ),
                        (
                            "color".to_string(),
                            SettingNode::Leaf(SettingLeaf::new(
                                LeafKind::Color,
                                Some("color".into()),
                                &color,
                            )),
                        ),
                        (
                            "radius".to_string(),
                            SettingNode::Leaf(SettingLeaf::new(
                                LeafKind::Size,
                                Some("radius".into()),
                                &radius,
                            )),
                        ),
                    ],
                })
            }
        }
    }
}

pub(crate) fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Parse `"r,g,b"` or `#rrggbb` into a channel triple.
pub fn parse_color(text: &str) -> Option<[u8; 3]> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix('#') {
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        return Some([channel(0)?, channel(2)?, channel(4)?]);
    }

    let mut channels = [0u8; 3];
    let mut parts = text.split(',');
    for channel in &mut channels {
        *channel = parts.next()?.trim().parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(channels)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|n: &f64| n.is_finite())
}

/// Numbers without a fractional part are kept as integers.
#[allow(clippy::cast_possible_truncation)]
fn number_value(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        Value::from(number as i64)
    } else {
        Value::from(number)
    }
}
