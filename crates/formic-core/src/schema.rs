use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SchemaError;

/// A declarative description of one component, possibly with nested children.
/// Unrecognized properties round-trip through `extra` so host-specific schema
/// keys survive a rebuild.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SchemaFragment {
    #[serde(rename = "type", default)]
    pub field_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<SchemaFragment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional: Option<ConditionalSpec>,

    /// When true (the default), a hidden component's value is excluded from
    /// the merged data. Set to false to keep serializing hidden values.
    #[serde(rename = "clearOnHide", default = "default_true")]
    pub clear_on_hide: bool,

    /// Force-hidden regardless of any conditional rule.
    #[serde(default)]
    pub hidden: bool,

    #[serde(rename = "defaultValue", default, skip_serializing_if = "Value::is_null")]
    pub default_value: Value,

    #[serde(default)]
    pub input: bool,

    /// Button action (`"submit"` buttons inside fetched subforms get hidden).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    // Reference-type composites: where to fetch the remote fragment from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

fn default_true() -> bool {
    true
}

impl Default for SchemaFragment {
    fn default() -> Self {
        Self {
            field_type: String::new(),
            key: None,
            label: None,
            components: Vec::new(),
            conditional: None,
            clear_on_hide: true,
            hidden: false,
            default_value: Value::Null,
            input: false,
            action: None,
            src: None,
            form: None,
            path: None,
            extra: serde_json::Map::new(),
        }
    }
}

impl SchemaFragment {
    /// Deserialize a fragment from a raw JSON value.
    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        serde_json::from_value(value).map_err(|e| SchemaError::InvalidFragment(e.to_string()))
    }

    /// The source a reference-type composite should be fetched from:
    /// an explicit `src` URL, a form identifier, or a path, in that order.
    pub fn reference_source(&self) -> Option<&str> {
        self.src
            .as_deref()
            .or(self.form.as_deref())
            .or(self.path.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Non-empty key, if any. An empty key means the component is transparent
    /// and contributes its children directly into the parent's namespace.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref().filter(|k| !k.is_empty())
    }
}

/// Visibility rule attached to a component. Either an opaque JSON-rule
/// expression for the condition evaluator, or the simple
/// `{show, when, eq}` form: visible iff (`data[when] == eq`) equals `show`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ConditionalSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<Value>,
}

impl ConditionalSpec {
    /// A spec with neither a rule nor a `when` target never hides anything.
    pub fn is_empty(&self) -> bool {
        self.json.is_none() && self.when.as_deref().unwrap_or("").is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_minimal_fragment() {
        let frag = SchemaFragment::from_value(json!({
            "type": "textfield",
            "key": "firstName",
            "input": true
        }))
        .unwrap();
        assert_eq!(frag.field_type, "textfield");
        assert_eq!(frag.key(), Some("firstName"));
        assert!(frag.clear_on_hide);
        assert!(frag.components.is_empty());
    }

    #[test]
    fn parses_nested_components_in_order() {
        let frag = SchemaFragment::from_value(json!({
            "type": "panel",
            "key": "parent",
            "components": [
                {"type": "checkbox", "key": "showChild"},
                {"type": "checkbox", "key": "forceParent"}
            ]
        }))
        .unwrap();
        let keys: Vec<_> = frag.components.iter().filter_map(|c| c.key()).collect();
        assert_eq!(keys, vec!["showChild", "forceParent"]);
    }

    #[test]
    fn parses_json_conditional() {
        let frag = SchemaFragment::from_value(json!({
            "type": "panel",
            "conditional": {"json": {"var": "data.showPanel"}}
        }))
        .unwrap();
        let cond = frag.conditional.unwrap();
        assert_eq!(cond.json, Some(json!({"var": "data.showPanel"})));
        assert!(!cond.is_empty());
    }

    #[test]
    fn parses_simple_conditional() {
        let frag = SchemaFragment::from_value(json!({
            "type": "textfield",
            "key": "other",
            "conditional": {"show": true, "when": "choice", "eq": "other"}
        }))
        .unwrap();
        let cond = frag.conditional.unwrap();
        assert_eq!(cond.show, Some(true));
        assert_eq!(cond.when.as_deref(), Some("choice"));
    }

    #[test]
    fn empty_key_is_transparent() {
        let frag = SchemaFragment::from_value(json!({"type": "panel", "key": ""})).unwrap();
        assert_eq!(frag.key(), None);
    }

    #[test]
    fn extra_properties_roundtrip() {
        let raw = json!({
            "type": "textfield",
            "key": "name",
            "placeholder": "Your name",
            "validate": {"required": true}
        });
        let frag = SchemaFragment::from_value(raw).unwrap();
        assert_eq!(frag.extra["placeholder"], json!("Your name"));
        let back = serde_json::to_value(&frag).unwrap();
        assert_eq!(back["validate"], json!({"required": true}));
    }

    #[test]
    fn reference_source_precedence() {
        let frag = SchemaFragment::from_value(json!({
            "type": "form",
            "src": "https://example.com/form/abc",
            "form": "abc"
        }))
        .unwrap();
        assert_eq!(frag.reference_source(), Some("https://example.com/form/abc"));

        let frag = SchemaFragment::from_value(json!({"type": "form", "path": "contact"})).unwrap();
        assert_eq!(frag.reference_source(), Some("contact"));
    }

    #[test]
    fn clear_on_hide_opt_out() {
        let frag =
            SchemaFragment::from_value(json!({"type": "textfield", "key": "x", "clearOnHide": false}))
                .unwrap();
        assert!(!frag.clear_on_hide);
    }

    #[test]
    fn invalid_fragment_is_an_error() {
        let err = SchemaFragment::from_value(json!({"type": "textfield", "components": "nope"}))
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidFragment(_)));
    }
}
