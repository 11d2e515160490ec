//! Control surface generated from a settings tree.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;

use super::node::{SettingGroup, SettingLeaf, SettingNode, join_path, parse_color};
use crate::render::{escape_attr, escape_text};

/// A drawn settings panel reflecting current values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlPanel {
    /// Widget identifier the panel edits.
    pub identifier: String,
    /// Title of the top-level group.
    pub title: Option<String>,
    /// Controls in declaration order.
    pub controls: Vec<Control>,
}

/// One entry of a control panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Control {
    /// A nested section.
    Section {
        /// Dotted path of the section.
        path: String,
        /// Display title, falling back to the entry name.
        title: String,
        /// Whether the section starts collapsed.
        collapsed: bool,
        /// Child controls.
        controls: Vec<Control>,
    },
    /// A single input.
    Input {
        /// Dotted path used by live edits.
        path: String,
        /// Display label, falling back to the entry name.
        label: String,
        /// Leaf kind name.
        kind: &'static str,
        /// Current value.
        value: Value,
        /// Alternative width for narrow layouts, when declared.
        #[serde(skip_serializing_if = "Option::is_none")]
        mobile: Option<f64>,
    },
}

impl ControlPanel {
    pub(crate) fn draw(identifier: &str, root: &SettingGroup) -> Self {
        Self {
            identifier: identifier.to_string(),
            title: root.title.clone(),
            controls: controls(root, ""),
        }
    }

    /// Number of inputs in the panel, across all sections.
    pub fn input_count(&self) -> usize {
        fn count(controls: &[Control]) -> usize {
            controls
                .iter()
                .map(|control| match control {
                    Control::Section { controls, .. } => count(controls),
                    Control::Input { .. } => 1,
                })
                .sum()
        }
        count(&self.controls)
    }

    /// Render the panel as an HTML form.
    ///
    /// Input names are the dotted setting paths, so a submitted field maps
    /// directly onto a live edit.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "<form class=\"settings-panel\" data-widget=\"{}\">",
            escape_attr(&self.identifier)
        );
        if let Some(title) = &self.title {
            let _ = write!(out, "<h3>{}</h3>", escape_text(title));
        }
        for control in &self.controls {
            write_control(&mut out, control);
        }
        out.push_str("</form>");
        out
    }
}

fn controls(group: &SettingGroup, prefix: &str) -> Vec<Control> {
    group
        .entries
        .iter()
        .map(|(name, node)| {
            let path = join_path(prefix, name);
            match node {
                SettingNode::Group(child) => Control::Section {
                    title: child.title.clone().unwrap_or_else(|| name.clone()),
                    collapsed: child.collapsed,
                    controls: controls(child, &path),
                    path,
                },
                SettingNode::Leaf(leaf) => input(leaf, name, path),
            }
        })
        .collect()
}

fn input(leaf: &SettingLeaf, name: &str, path: String) -> Control {
    Control::Input {
        label: leaf.title.clone().unwrap_or_else(|| name.to_string()),
        kind: leaf.kind.as_str(),
        value: leaf.value.clone(),
        mobile: leaf.mobile,
        path,
    }
}

fn write_control(out: &mut String, control: &Control) {
    match control {
        Control::Section {
            title,
            collapsed,
            controls,
            ..
        } => {
            let open = if *collapsed { "" } else { " open" };
            let _ = write!(out, "<details{open}><summary>{}</summary>", escape_text(title));
            for child in controls {
                write_control(out, child);
            }
            out.push_str("</details>");
        }
        Control::Input {
            path,
            label,
            kind,
            value,
            ..
        } => {
            let name = escape_attr(path);
            let _ = write!(out, "<label>{}", escape_text(label));
            match *kind {
                "color" => {
                    let hex = value
                        .as_str()
                        .and_then(parse_color)
                        .map_or_else(|| "#000000".to_string(), |[r, g, b]| {
                            format!("#{r:02x}{g:02x}{b:02x}")
                        });
                    let _ = write!(out, "<input type=\"color\" name=\"{name}\" value=\"{hex}\">");
                }
                "opacity" => {
                    let _ = write!(
                        out,
                        "<input type=\"range\" name=\"{name}\" min=\"0\" max=\"1\" step=\"0.01\" value=\"{}\">",
                        number_text(value)
                    );
                }
                _ => {
                    let _ = write!(
                        out,
                        "<input type=\"number\" name=\"{name}\" min=\"0\" value=\"{}\">",
                        number_text(value)
                    );
                }
            }
            out.push_str("</label>");
        }
    }
}

fn number_text(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}
