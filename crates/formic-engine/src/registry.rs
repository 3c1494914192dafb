use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use formic_core::data::truthy;

/// Per-type value capability: the empty default a component resets to, and
/// how an incoming raw value is coerced before storage.
pub trait FieldBehavior: Send + Sync {
    fn empty_value(&self) -> Value {
        Value::Null
    }

    fn normalize(&self, value: Value) -> Value {
        value
    }
}

/// How a component type participates in the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Leaf value holder (textfield, checkbox, ...).
    Input,
    /// Presentation-only composite; children contribute directly into the
    /// parent's namespace even when the layout node carries a key.
    Layout,
    /// Value-bearing composite; children nest under the component's key.
    Container,
    /// Composite whose children come from a separately loaded fragment.
    Reference,
}

/// A registered component type: its tree role plus its value capability.
#[derive(Clone)]
pub struct FieldType {
    pub kind: FieldKind,
    pub behavior: Arc<dyn FieldBehavior>,
}

/// Registry of component types, keyed by schema `type` tag. Open for host
/// registration; unknown tags are a hard build failure, not a silent skip.
pub struct TypeRegistry {
    types: RwLock<HashMap<String, FieldType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
        }
    }

    /// Registry pre-seeded with the built-in catalog.
    pub fn builtin() -> Self {
        let registry = Self::new();
        for tag in ["textfield", "textarea", "email", "password"] {
            registry.register(tag, FieldKind::Input, Arc::new(TextBehavior));
        }
        registry.register("number", FieldKind::Input, Arc::new(NumberBehavior));
        registry.register("checkbox", FieldKind::Input, Arc::new(CheckboxBehavior));
        for tag in ["select", "radio", "datetime", "hidden"] {
            registry.register(tag, FieldKind::Input, Arc::new(DefaultBehavior));
        }
        for tag in ["panel", "well", "fieldset", "columns", "table", "button"] {
            registry.register(tag, FieldKind::Layout, Arc::new(DefaultBehavior));
        }
        registry.register("container", FieldKind::Container, Arc::new(DefaultBehavior));
        registry.register("form", FieldKind::Reference, Arc::new(DefaultBehavior));
        registry
    }

    pub fn register(&self, tag: &str, kind: FieldKind, behavior: Arc<dyn FieldBehavior>) {
        self.types
            .write()
            .insert(tag.to_string(), FieldType { kind, behavior });
    }

    pub fn unregister(&self, tag: &str) -> bool {
        self.types.write().remove(tag).is_some()
    }

    pub fn get(&self, tag: &str) -> Option<FieldType> {
        self.types.read().get(tag).cloned()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.types.read().contains_key(tag)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.types.read().len()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Opaque value holder: stores whatever it is given, empty is `null`.
pub struct DefaultBehavior;

impl FieldBehavior for DefaultBehavior {}

/// Text fields: empty is `""`, everything stored as given.
pub struct TextBehavior;

impl FieldBehavior for TextBehavior {
    fn empty_value(&self) -> Value {
        Value::String(String::new())
    }
}

/// Checkboxes: empty is `false`, incoming values coerced to booleans.
pub struct CheckboxBehavior;

impl FieldBehavior for CheckboxBehavior {
    fn empty_value(&self) -> Value {
        Value::Bool(false)
    }

    fn normalize(&self, value: Value) -> Value {
        Value::Bool(truthy(&value))
    }
}

/// Numbers: empty is `null`, numeric strings parsed into numbers.
pub struct NumberBehavior;

impl FieldBehavior for NumberBehavior {
    fn normalize(&self, value: Value) -> Value {
        if let Value::String(s) = &value {
            if let Ok(parsed) = s.parse::<f64>() {
                if let Some(n) = serde_json::Number::from_f64(parsed) {
                    return Value::Number(n);
                }
            }
        }
        value
    }
}
