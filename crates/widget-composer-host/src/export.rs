//! Static export of a composition.
//!
//! The exported document runs without the composer: each widget gets a
//! mount point, its stylesheet and a script that rebuilds a minimal
//! `require`/`module`/`exports` shim over the UI framework loaded from a
//! public distribution, then mounts the widget's default export.

use std::fmt::Write as _;

use serde::Serialize;
use tracing::info;

use crate::bridge::StyleMap;
use widget_composer_common::ExportConfig;
use widget_composer_core::render::{escape_attr, escape_text, neutralize, style_text};

/// The framework globals the exported shim resolves against.
const REQUIRE_SHIM: &str = r#"var require = function (name) {
    if (name === "react") return window.React;
    if (name === "react-dom" || name === "react-dom/client") return window.ReactDOM;
    if (name === "react/jsx-runtime") {
      var jsx = function (type, props, key) {
        var config = Object.assign({}, props);
        if (key !== undefined) config.key = key;
        return window.React.createElement(type, config);
      };
      return { jsx: jsx, jsxs: jsx, Fragment: window.React.Fragment };
    }
    throw new Error("Cannot require '" + name + "'");
  };"#;

/// One Ready instance as seen by the exporter.
#[derive(Debug, Clone, Copy)]
pub struct ExportEntry<'a> {
    /// Widget identifier.
    pub identifier: &'a str,
    /// Module text captured at load time.
    pub module_text: &'a str,
    /// Stylesheet text captured at load time.
    pub style_text: Option<&'a str>,
    /// Bridge style applied to the mount point.
    pub style: &'a StyleMap,
}

/// A compiled export document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportDocument {
    /// The complete HTML document.
    pub html: String,
    /// Identifiers included, in document order.
    pub instances: Vec<String>,
}

impl ExportDocument {
    /// Suggested file name for downloads.
    pub fn file_name(&self) -> &'static str {
        "composition.html"
    }
}

/// Compiles Ready instances into one self-contained document.
#[derive(Debug, Clone, Default)]
pub struct StaticExporter {
    config: ExportConfig,
}

impl StaticExporter {
    /// Create a new exporter.
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    /// Get the export configuration.
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Compile the given instances and document-level styles.
    ///
    /// The caller passes only instances whose module text was captured; an
    /// empty list yields a document with no mount points.
    pub fn compile(&self, entries: &[ExportEntry<'_>], document_styles: &[String]) -> ExportDocument {
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
        html.push_str("<meta charset=\"utf-8\">\n");
        html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
        let _ = writeln!(html, "<title>{}</title>", escape_text(&self.config.title));

        for style in document_styles {
            let _ = writeln!(html, "<style data-document>\n{}\n</style>", neutralize(style, "style"));
        }
        for entry in entries {
            if let Some(style) = entry.style_text {
                let _ = writeln!(
                    html,
                    "<style data-widget=\"{}\">\n{}\n</style>",
                    escape_attr(entry.identifier),
                    neutralize(style, "style")
                );
            }
        }

        let _ = writeln!(
            html,
            "<script crossorigin src=\"{}\"></script>",
            escape_attr(&self.config.react_url)
        );
        let _ = writeln!(
            html,
            "<script crossorigin src=\"{}\"></script>",
            escape_attr(&self.config.react_dom_url)
        );
        html.push_str("</head>\n<body>\n");

        for (index, entry) in entries.iter().enumerate() {
            let _ = write!(
                html,
                "<div id=\"{}\" data-widget=\"{}\"",
                mount_id(index, entry.identifier),
                escape_attr(entry.identifier)
            );
            if !entry.style.is_empty() {
                let _ = write!(html, " style=\"{}\"", escape_attr(&style_text(entry.style)));
            }
            html.push_str("></div>\n");
        }

        for (index, entry) in entries.iter().enumerate() {
            write_script(&mut html, &mount_id(index, entry.identifier), entry);
        }

        html.push_str("</body>\n</html>\n");

        let instances: Vec<String> = entries.iter().map(|e| e.identifier.to_string()).collect();
        info!(
            instances = instances.len(),
            bytes = html.len(),
            "Composition exported"
        );
        ExportDocument { html, instances }
    }
}

fn write_script(html: &mut String, mount_id: &str, entry: &ExportEntry<'_>) {
    // Serializing a &str to JSON cannot fail.
    let target = serde_json::to_string(mount_id).unwrap_or_default();
    let _ = write!(
        html,
        r#"<script data-widget="{identifier}">
(function () {{
  var module = {{ exports: {{}} }};
  var exports = module.exports;
  {shim}
  (function (require, module, exports) {{
{body}
  }})(require, module, exports);
  var Comp = module.exports["default"] || module.exports;
  window.ReactDOM.createRoot(document.getElementById({target}))
    .render(window.React.createElement(Comp));
}})();
</script>
"#,
        identifier = escape_attr(entry.identifier),
        shim = REQUIRE_SHIM,
        body = neutralize(entry.module_text, "script"),
        target = target,
    );
}

/// DOM id of an instance's mount point.
fn mount_id(index: usize, identifier: &str) -> String {
    let slug: String = identifier
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("widget-{index}-{slug}")
}
