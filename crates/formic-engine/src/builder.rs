use std::sync::Arc;

use serde_json::Value;

use formic_core::errors::SchemaError;
use formic_core::schema::{ConditionalSpec, SchemaFragment};

use crate::registry::{FieldBehavior, FieldKind, TypeRegistry};

/// A fully built, detached subtree. Nodes get their IDs when the subtree is
/// grafted into a tree, so a build failure never touches existing children.
pub(crate) struct BuiltNode {
    pub field_type: String,
    pub key: Option<String>,
    pub conditional: Option<ConditionalSpec>,
    pub clear_on_hide: bool,
    pub force_hidden: bool,
    pub kind: BuiltKind,
}

pub(crate) enum BuiltKind {
    Leaf {
        value: Value,
        behavior: Arc<dyn FieldBehavior>,
    },
    Composite {
        children: Vec<BuiltNode>,
        transparent: bool,
    },
    Reference {
        children: Vec<BuiltNode>,
        source: Option<String>,
        ready: bool,
    },
}

impl std::fmt::Debug for BuiltNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltNode")
            .field("field_type", &self.field_type)
            .field("key", &self.key)
            .field("conditional", &self.conditional)
            .field("clear_on_hide", &self.clear_on_hide)
            .field("force_hidden", &self.force_hidden)
            .field("kind", &self.kind)
            .finish()
    }
}

impl std::fmt::Debug for BuiltKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuiltKind::Leaf { value, .. } => f
                .debug_struct("Leaf")
                .field("value", value)
                .finish_non_exhaustive(),
            BuiltKind::Composite {
                children,
                transparent,
            } => f
                .debug_struct("Composite")
                .field("children", children)
                .field("transparent", transparent)
                .finish(),
            BuiltKind::Reference {
                children,
                source,
                ready,
            } => f
                .debug_struct("Reference")
                .field("children", children)
                .field("source", source)
                .field("ready", ready)
                .finish(),
        }
    }
}

/// Constructs component subtrees from schema fragments by dispatching on the
/// fragment's type tag through the registry.
pub struct TreeBuilder {
    registry: Arc<TypeRegistry>,
}

impl TreeBuilder {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Build one fragment (and recursively its children). Unknown or missing
    /// type tags reject the whole subtree.
    pub(crate) fn build(&self, fragment: &SchemaFragment) -> Result<BuiltNode, SchemaError> {
        if fragment.field_type.is_empty() {
            return Err(SchemaError::MissingType);
        }
        let field_type = self
            .registry
            .get(&fragment.field_type)
            .ok_or_else(|| SchemaError::UnknownType(fragment.field_type.clone()))?;

        let kind = match field_type.kind {
            FieldKind::Input => BuiltKind::Leaf {
                value: if fragment.default_value.is_null() {
                    field_type.behavior.empty_value()
                } else {
                    field_type.behavior.normalize(fragment.default_value.clone())
                },
                behavior: field_type.behavior,
            },
            FieldKind::Layout => BuiltKind::Composite {
                children: self.build_all(&fragment.components)?,
                transparent: true,
            },
            FieldKind::Container => BuiltKind::Composite {
                children: self.build_all(&fragment.components)?,
                transparent: false,
            },
            FieldKind::Reference => {
                if fragment.components.is_empty() {
                    let source = fragment.reference_source().map(str::to_string);
                    // No inline children and nowhere to load from: nothing
                    // will ever materialize, so the gate starts settled.
                    let ready = source.is_none();
                    BuiltKind::Reference {
                        children: Vec::new(),
                        source,
                        ready,
                    }
                } else {
                    let mut inline = fragment.components.clone();
                    hide_submit_buttons(&mut inline);
                    BuiltKind::Reference {
                        children: self.build_all(&inline)?,
                        source: fragment.reference_source().map(str::to_string),
                        ready: true,
                    }
                }
            }
        };

        Ok(BuiltNode {
            field_type: fragment.field_type.clone(),
            key: fragment.key.clone(),
            conditional: fragment.conditional.clone().filter(|c| !c.is_empty()),
            clear_on_hide: fragment.clear_on_hide,
            force_hidden: fragment.hidden,
            kind,
        })
    }

    pub(crate) fn build_all(
        &self,
        fragments: &[SchemaFragment],
    ) -> Result<Vec<BuiltNode>, SchemaError> {
        fragments.iter().map(|f| self.build(f)).collect()
    }
}

/// Force-hide submit buttons in a subform fragment: the outer form owns
/// submission, nested submit buttons would double-submit.
pub(crate) fn hide_submit_buttons(fragments: &mut [SchemaFragment]) {
    for fragment in fragments {
        if fragment.field_type == "button" && fragment.action.as_deref() == Some("submit") {
            fragment.hidden = true;
        }
        hide_submit_buttons(&mut fragment.components);
    }
}
