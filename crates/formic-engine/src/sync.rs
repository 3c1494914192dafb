use serde_json::{Map, Value};

use formic_core::ids::ComponentId;

use crate::tree::{ComponentTree, NodeKind, Readiness};

/// Apply a parent-level data object to the children of composite `id`,
/// depth-first in child order. A keyed child present in `data` receives its
/// sub-value; a keyed child absent from `data` is reset to its empty default.
/// Returns whether any stored value actually changed (idempotence: applying
/// the same object twice reports no change the second time).
pub(crate) fn apply_object(tree: &mut ComponentTree, id: &ComponentId, data: &Value) -> bool {
    enum Plan {
        Leaf(Option<String>),
        Transparent,
        Nested(String),
        Reference { key: Option<String>, ready: bool },
    }

    let empty = Value::Object(Map::new());
    let mut changed = false;

    for child_id in tree.children_of(id) {
        let Some(child) = tree.get(&child_id) else { continue };
        let key = child.key().map(str::to_string);
        let plan = match &child.kind {
            NodeKind::Leaf { .. } => Plan::Leaf(key),
            NodeKind::Composite { .. } => match (child.is_transparent(), key) {
                (true, _) | (false, None) => Plan::Transparent,
                (false, Some(key)) => Plan::Nested(key),
            },
            NodeKind::Reference { gate, .. } => Plan::Reference {
                key,
                ready: *gate.borrow() == Readiness::Ready,
            },
        };

        match plan {
            // Keyless leaves cannot be addressed by the data object.
            Plan::Leaf(None) => {}
            Plan::Leaf(Some(key)) => {
                changed |= apply_leaf(tree, &child_id, data.get(&key));
            }
            Plan::Transparent => {
                changed |= apply_object(tree, &child_id, data);
            }
            Plan::Nested(key) => {
                let sub = data.get(&key).cloned().unwrap_or_else(|| empty.clone());
                changed |= apply_object(tree, &child_id, &sub);
            }
            Plan::Reference { key, ready } => {
                let sub = match &key {
                    Some(key) => data.get(key),
                    None => Some(data),
                };
                let sub = sub.cloned().unwrap_or_else(|| empty.clone());
                if ready {
                    changed |= apply_object(tree, &child_id, &sub);
                } else {
                    // Deferred, not dropped: honored once the subtree exists.
                    // An absent key queues a reset, superseding earlier writes.
                    if let Some(NodeKind::Reference { queued, .. }) =
                        tree.get_mut(&child_id).map(|n| &mut n.kind)
                    {
                        *queued = Some(sub);
                    }
                }
            }
        }
    }

    changed
}

fn apply_leaf(tree: &mut ComponentTree, id: &ComponentId, incoming: Option<&Value>) -> bool {
    let Some(node) = tree.get_mut(id) else { return false };
    let NodeKind::Leaf { value, behavior } = &mut node.kind else {
        return false;
    };
    let next = match incoming {
        Some(v) => behavior.normalize(v.clone()),
        None => behavior.empty_value(),
    };
    if *value == next {
        return false;
    }
    *value = next;
    true
}

/// Synthesize the merged value of composite `id`: visible, keyed,
/// value-bearing children only, in child order. Later children with
/// colliding keys overwrite earlier ones. Hidden children are excluded
/// unless they opt out of `clearOnHide`; their stored value is retained
/// either way (hide/show is not a lifecycle event).
pub(crate) fn synthesize(tree: &ComponentTree, id: &ComponentId) -> Value {
    let Some(node) = tree.get(id) else {
        return Value::Object(Map::new());
    };
    if let NodeKind::Leaf { value, .. } = &node.kind {
        return value.clone();
    }

    let mut merged = Map::new();
    for child_id in node.children() {
        let Some(child) = tree.get(child_id) else { continue };
        if !child.visible && child.clear_on_hide {
            continue;
        }
        if child.is_transparent() {
            if let Value::Object(sub) = synthesize(tree, child_id) {
                for (k, v) in sub {
                    merged.insert(k, v);
                }
            }
        } else if let Some(key) = child.key() {
            merged.insert(key.to_string(), synthesize(tree, child_id));
        }
        // Keyless leaves contribute nothing.
    }
    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TreeBuilder;
    use crate::registry::TypeRegistry;
    use formic_core::schema::SchemaFragment;
    use serde_json::json;
    use std::sync::Arc;

    fn build_tree(schema: serde_json::Value) -> ComponentTree {
        let builder = TreeBuilder::new(Arc::new(TypeRegistry::builtin()));
        let fragment = SchemaFragment::from_value(schema).unwrap();
        ComponentTree::from_built(builder.build(&fragment).unwrap())
    }

    #[test]
    fn applies_keyed_values_and_resets_missing_ones() {
        let mut tree = build_tree(json!({
            "type": "panel",
            "components": [
                {"type": "textfield", "key": "firstName"},
                {"type": "textfield", "key": "lastName"}
            ]
        }));
        let root = tree.root_id().clone();

        let changed = apply_object(&mut tree, &root, &json!({"firstName": "Joe"}));
        assert!(changed);
        assert_eq!(
            synthesize(&tree, &root),
            json!({"firstName": "Joe", "lastName": ""})
        );

        // lastName explicitly set, then dropped from the data object: reset
        apply_object(&mut tree, &root, &json!({"firstName": "Joe", "lastName": "Smith"}));
        let changed = apply_object(&mut tree, &root, &json!({"firstName": "Joe"}));
        assert!(changed);
        assert_eq!(
            synthesize(&tree, &root),
            json!({"firstName": "Joe", "lastName": ""})
        );
    }

    #[test]
    fn apply_is_idempotent() {
        let mut tree = build_tree(json!({
            "type": "panel",
            "components": [
                {"type": "textfield", "key": "a"},
                {"type": "checkbox", "key": "b"}
            ]
        }));
        let root = tree.root_id().clone();
        let data = json!({"a": "x", "b": true});
        assert!(apply_object(&mut tree, &root, &data));
        assert!(!apply_object(&mut tree, &root, &data));
    }

    #[test]
    fn transparent_layout_shares_the_parent_namespace() {
        let mut tree = build_tree(json!({
            "type": "panel",
            "components": [
                {"type": "checkbox", "key": "outer"},
                {"type": "panel", "key": "layout", "components": [
                    {"type": "textfield", "key": "inner"}
                ]}
            ]
        }));
        let root = tree.root_id().clone();
        apply_object(&mut tree, &root, &json!({"outer": true, "inner": "deep"}));
        assert_eq!(
            synthesize(&tree, &root),
            json!({"outer": true, "inner": "deep"})
        );
    }

    #[test]
    fn container_nests_under_its_key() {
        let mut tree = build_tree(json!({
            "type": "panel",
            "components": [
                {"type": "container", "key": "address", "components": [
                    {"type": "textfield", "key": "city"}
                ]}
            ]
        }));
        let root = tree.root_id().clone();
        apply_object(&mut tree, &root, &json!({"address": {"city": "Oslo"}}));
        assert_eq!(synthesize(&tree, &root), json!({"address": {"city": "Oslo"}}));
    }

    #[test]
    fn hidden_child_is_excluded_but_retains_its_value() {
        let mut tree = build_tree(json!({
            "type": "panel",
            "components": [{"type": "textfield", "key": "secret"}]
        }));
        let root = tree.root_id().clone();
        let secret = tree.find_by_key("secret").unwrap();

        apply_object(&mut tree, &root, &json!({"secret": "hunter2"}));
        tree.get_mut(&secret).unwrap().visible = false;
        assert_eq!(synthesize(&tree, &root), json!({}));

        tree.get_mut(&secret).unwrap().visible = true;
        assert_eq!(synthesize(&tree, &root), json!({"secret": "hunter2"}));
    }

    #[test]
    fn clear_on_hide_opt_out_keeps_hidden_values() {
        let mut tree = build_tree(json!({
            "type": "panel",
            "components": [
                {"type": "textfield", "key": "keep", "clearOnHide": false}
            ]
        }));
        let root = tree.root_id().clone();
        let keep = tree.find_by_key("keep").unwrap();
        apply_object(&mut tree, &root, &json!({"keep": "around"}));
        tree.get_mut(&keep).unwrap().visible = false;
        assert_eq!(synthesize(&tree, &root), json!({"keep": "around"}));
    }

    #[test]
    fn later_sibling_key_collision_wins() {
        let mut tree = build_tree(json!({
            "type": "panel",
            "components": [
                {"type": "textfield", "key": "dup", "defaultValue": "first"},
                {"type": "textfield", "key": "dup", "defaultValue": "second"}
            ]
        }));
        let root = tree.root_id().clone();
        assert_eq!(synthesize(&tree, &root), json!({"dup": "second"}));
        // a set reaches both siblings without corrupting either
        apply_object(&mut tree, &root, &json!({"dup": "both"}));
        assert_eq!(synthesize(&tree, &root), json!({"dup": "both"}));
    }

    #[test]
    fn pending_reference_queues_the_value() {
        let mut tree = build_tree(json!({
            "type": "panel",
            "components": [
                {"type": "form", "key": "sub", "src": "https://example.com/form/abc"}
            ]
        }));
        let root = tree.root_id().clone();
        let changed = apply_object(&mut tree, &root, &json!({"sub": {"inner": "queued"}}));
        assert!(!changed);

        let sub = tree.find_by_key("sub").unwrap();
        match &tree.get(&sub).unwrap().kind {
            NodeKind::Reference { queued, .. } => {
                assert_eq!(queued.as_ref(), Some(&json!({"inner": "queued"})));
            }
            _ => panic!("expected a reference"),
        }
    }

    #[test]
    fn absent_key_supersedes_a_queued_reference_value() {
        let mut tree = build_tree(json!({
            "type": "panel",
            "components": [
                {"type": "form", "key": "sub", "src": "https://example.com/form/abc"}
            ]
        }));
        let root = tree.root_id().clone();
        apply_object(&mut tree, &root, &json!({"sub": {"inner": "stale"}}));
        apply_object(&mut tree, &root, &json!({}));

        let sub = tree.find_by_key("sub").unwrap();
        match &tree.get(&sub).unwrap().kind {
            NodeKind::Reference { queued, .. } => {
                assert_eq!(queued.as_ref(), Some(&json!({})));
            }
            _ => panic!("expected a reference"),
        }
    }
}
