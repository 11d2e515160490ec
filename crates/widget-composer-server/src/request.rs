//! Request bodies accepted by the composition API.

use serde::Deserialize;
use serde_json::Value;

/// Body of `PUT /composition`.
#[derive(Debug, Clone, Deserialize)]
pub struct SetWidgetsRequest {
    /// Desired widget identifiers, in page order.
    pub widgets: Vec<String>,
}

/// Body of `PATCH /composition/:id/settings`.
#[derive(Debug, Clone, Deserialize)]
pub struct EditSettingRequest {
    /// Dotted path of the setting, e.g. `background.width`.
    pub path: String,
    /// New value for the setting.
    pub value: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_widgets() {
        let req: SetWidgetsRequest = serde_json::from_str(r#"{"widgets":["a","b"]}"#).unwrap();
        assert_eq!(req.widgets, vec!["a", "b"]);
        assert!(serde_json::from_str::<SetWidgetsRequest>(r#"{"widgets":"a"}"#).is_err());
    }

    #[test]
    fn test_parse_edit_setting() {
        let req: EditSettingRequest =
            serde_json::from_str(r##"{"path":"background.color","value":"#ff0000"}"##).unwrap();
        assert_eq!(req.path, "background.color");
        assert_eq!(req.value, Value::String("#ff0000".into()));
    }
}
