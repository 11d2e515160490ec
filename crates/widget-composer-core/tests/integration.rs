//! Integration tests for widget-composer-core.
//!
//! These tests verify the complete evaluation pipeline:
//! - Module text execution with injected capabilities
//! - Component resolution and rendering to markup
//! - Settings module evaluation and live edits
//! - Failure attribution per widget

use serde_json::json;

use widget_composer_common::{LoadError, SandboxConfig};
use widget_composer_core::{
    ExportKind, LogLevel, ModuleEvaluator, RenderNode, SandboxEngine, SettingsTree,
};

fn evaluator() -> ModuleEvaluator {
    ModuleEvaluator::new(SandboxEngine::new(&SandboxConfig::default()).unwrap())
}

/// Output shaped like a TypeScript compiler targeting CommonJS.
const LEADERBOARD: &str = r##"
"use strict";
var __importDefault = (this && this.__importDefault) || function (mod) {
    return (mod && mod.__esModule) ? mod : { "default": mod };
};
Object.defineProperty(exports, "__esModule", { value: true });
const jsx_runtime_1 = require("react/jsx-runtime");
const react_1 = __importDefault(require("react"));
const Leaderboard = () => {
    const rootRef = (0, react_1.default.useRef)(null);
    const [inlineStyle] = react_1.default.useState({});
    react_1.default.useEffect(() => { throw new Error("effects never run"); }, []);
    const leaders = [{ name: "Giga", score: 1200 }, { name: "Eve", score: 780 }];
    return (0, jsx_runtime_1.jsxs)("div", {
        ref: rootRef,
        className: "lb-leaderboard",
        "data-styled": "background",
        style: inlineStyle,
        onClick: () => {},
        children: [
            (0, jsx_runtime_1.jsx)("h2", { children: "Leaderboard" }),
            (0, jsx_runtime_1.jsx)("ul", {
                children: leaders.map((leader, idx) => (0, jsx_runtime_1.jsxs)("li", {
                    style: { fontWeight: 700, paddingLeft: 4 },
                    children: ["#", idx + 1, " ", leader.name],
                }, leader.name)),
            }),
        ],
    });
};
exports.default = Leaderboard;
"##;

const SETTINGS: &str = r#"
"use strict";
Object.defineProperty(exports, "__esModule", { value: true });
exports.lb_oa_settings = void 0;
const builder_settings_types_1 = require("builder-settings-types");
exports.lb_oa_settings = new builder_settings_types_1.SettingGroup({
    main: true,
    title: "Leaderboard",
    settings: {
        background: new builder_settings_types_1.SettingGroup({
            title: "Background Settings",
            settings: {
                color: new builder_settings_types_1.ColorSetting({ default: "255,255,255", title: "background" }),
                width: new builder_settings_types_1.WidthSetting({ default: 860, mobile: 370, title: "width" }),
                borders: new builder_settings_types_1.BorderSettingSet({ collapsed: true }),
                opacit: new builder_settings_types_1.OpacitySetting({ default: 0.5, title: "opacity" }),
                note: "not a setting",
            },
        }),
    },
});
"#;

// ============================================================================
// Test: Rendering
// ============================================================================

#[test]
fn test_render_compiled_widget() {
    let component = evaluator().evaluate_widget("lb", LEADERBOARD).unwrap();
    assert_eq!(component.kind(), ExportKind::Function);

    let html = component.render(&json!({})).unwrap().to_html();
    assert_eq!(
        html,
        "<div class=\"lb-leaderboard\" data-styled=\"background\">\
         <h2>Leaderboard</h2><ul>\
         <li style=\"font-weight: 700; padding-left: 4px\">#1 Giga</li>\
         <li style=\"font-weight: 700; padding-left: 4px\">#2 Eve</li>\
         </ul></div>"
    );
}

#[test]
fn test_render_with_props_and_fragment() {
    let source = r#"
        const React = require("react");
        exports.default = function Greeting(props) {
            return React.createElement(React.Fragment, null,
                React.createElement("span", null, "Hello, ", props.name),
                null,
                false,
                React.createElement("br"));
        };
    "#;
    let component = evaluator().evaluate_widget("greet", source).unwrap();
    let node = component.render(&json!({"name": "<Ada>"})).unwrap();

    assert!(matches!(node, RenderNode::Fragment { .. }));
    assert_eq!(node.to_html(), "<span>Hello, &lt;Ada&gt;</span><br>");
}

#[test]
fn test_render_class_component_and_context() {
    let source = r#"
        const React = require("react");
        const Theme = React.createContext("light");
        function Label() {
            return React.createElement("em", null, React.useContext(Theme));
        }
        class Panel extends React.Component {
            render() {
                return React.createElement(Theme.Provider, { value: "dark" },
                    React.createElement("section", { id: "p" }, React.createElement(Label)));
            }
        }
        exports.default = Panel;
    "#;
    let component = evaluator().evaluate_widget("panel", source).unwrap();
    let html = component.render(&json!({})).unwrap().to_html();
    assert_eq!(html, "<section id=\"p\"><em>dark</em></section>");
}

#[test]
fn test_render_failure_is_execution_error() {
    let source = r#"exports.default = function () { throw new Error("render broke"); };"#;
    let component = evaluator().evaluate_widget("broken", source).unwrap();

    let err = component.render(&json!({})).unwrap_err();
    assert_eq!(err, LoadError::execution("broken", "render broke"));

    // The sandbox stays usable after a failed render.
    assert!(component.render(&json!({})).is_err());
}

#[test]
fn test_render_runaway_component_is_interrupted() {
    let engine = SandboxEngine::new(&SandboxConfig {
        timeout_ms: 30,
        ..Default::default()
    })
    .unwrap();
    let source = r#"exports.default = function () { while (true) {} };"#;
    let component = ModuleEvaluator::new(engine)
        .evaluate_widget("spin", source)
        .unwrap();

    let err = component.render(&json!({})).unwrap_err();
    assert!(err.to_string().contains("interrupted"));
}

// ============================================================================
// Test: Isolation
// ============================================================================

#[test]
fn test_widgets_do_not_share_globals() {
    let evaluator = evaluator();
    let writer = r#"globalThis.counter = 1; exports.default = function () { return "w"; };"#;
    let reader = r#"exports.default = function () { return typeof globalThis.counter; };"#;

    let _writer = evaluator.evaluate_widget("writer", writer).unwrap();
    let reader = evaluator.evaluate_widget("reader", reader).unwrap();

    assert_eq!(reader.render(&json!({})).unwrap().to_html(), "undefined");
}

#[test]
fn test_failure_is_attributed_to_identifier() {
    let evaluator = evaluator();
    let err = evaluator
        .evaluate_widget("bad", r#"require("react-dom");"#)
        .unwrap_err();
    assert_eq!(err.identifier(), "bad");
    assert_eq!(err.to_string(), "Cannot require 'react-dom' (widget 'bad')");

    // A sibling evaluation is unaffected.
    assert!(evaluator.evaluate_widget("lb", LEADERBOARD).is_ok());
}

#[test]
fn test_guest_console_levels() {
    let source = r#"
        console.warn("careful");
        console.error({ code: 7 });
        exports.default = function () { return null; };
    "#;
    let component = evaluator().evaluate_widget("noisy", source).unwrap();
    let logs = component.sandbox().logs();

    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].level, LogLevel::Warn);
    assert_eq!(logs[1].level, LogLevel::Error);
    assert_eq!(logs[1].message, "{\"code\":7}");
}

// ============================================================================
// Test: Settings
// ============================================================================

#[test]
fn test_settings_module_to_tree() {
    let settings = evaluator()
        .evaluate_settings("lb", SETTINGS, "lb_oa_settings")
        .unwrap();

    assert_eq!(settings.name(), "lb_oa_settings");
    assert_eq!(
        settings.get_values(),
        json!({"background": {
            "color": "255,255,255",
            "width": 860,
            "borders": {"size": 1, "color": "0,0,0", "radius": 0},
            "opacit": 0.5
        }})
    );

    let panel = settings.draw();
    assert_eq!(panel.title.as_deref(), Some("Leaderboard"));
    assert_eq!(panel.input_count(), 6);
}

#[test]
fn test_settings_live_edit_round() {
    let mut settings = evaluator()
        .evaluate_settings("lb", SETTINGS, "lb_oa_settings")
        .unwrap();

    let (tx, rx) = std::sync::mpsc::channel();
    settings.set_on_change(Box::new(move |value| {
        let _ = tx.send(value);
    }));
    settings
        .update("background.borders.color", &json!("#102030"))
        .unwrap();

    let snapshot = rx.try_recv().unwrap();
    assert_eq!(snapshot["background"]["borders"]["color"], "16,32,48");
}

#[test]
fn test_settings_module_cannot_escape_whitelist() {
    let source = r#"require("child_process");"#;
    let err = evaluator()
        .evaluate_settings("lb", source, "oa_settings")
        .unwrap_err();
    assert_eq!(err, LoadError::capability("lb", "child_process"));
}
