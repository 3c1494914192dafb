use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

use formic_core::ids::ComponentId;
use formic_core::schema::ConditionalSpec;

use crate::builder::{BuiltKind, BuiltNode};
use crate::error::EngineError;
use crate::registry::FieldBehavior;

/// State of a reference node's readiness gate. Settles to `Ready` or
/// `Failed`; cancellation settles it to `Failed`, never leaves it pending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Readiness {
    Pending,
    Ready,
    Failed(String),
}

/// What a node is, structurally.
pub enum NodeKind {
    /// Leaf value holder. The value is owned exclusively by the node.
    Leaf {
        value: Value,
        behavior: Arc<dyn FieldBehavior>,
    },
    /// Composite owning an ordered list of children. Transparent composites
    /// (layout types) contribute children directly into the parent namespace.
    Composite {
        children: Vec<ComponentId>,
        transparent: bool,
    },
    /// Composite whose children are materialized from a separately loaded
    /// fragment. `queued` holds a value set before readiness, honored once
    /// the subtree exists.
    Reference {
        children: Vec<ComponentId>,
        source: Option<String>,
        queued: Option<Value>,
        gate: watch::Sender<Readiness>,
    },
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf { value, .. } => f.debug_struct("Leaf").field("value", value).finish(),
            Self::Composite {
                children,
                transparent,
            } => f
                .debug_struct("Composite")
                .field("children", &children.len())
                .field("transparent", transparent)
                .finish(),
            Self::Reference {
                children, source, ..
            } => f
                .debug_struct("Reference")
                .field("children", &children.len())
                .field("source", source)
                .finish(),
        }
    }
}

/// One node of the component tree. The parent back-reference is a plain ID
/// resolved through the owning tree, so the tree retains no cycles.
#[derive(Debug)]
pub struct ComponentNode {
    pub id: ComponentId,
    pub parent: Option<ComponentId>,
    pub field_type: String,
    pub key: Option<String>,
    pub conditional: Option<ConditionalSpec>,
    pub clear_on_hide: bool,
    pub force_hidden: bool,
    /// Derived each conditional pass from this node's own rule only; an
    /// invisible ancestor does not change it.
    pub visible: bool,
    pub kind: NodeKind,
}

impl ComponentNode {
    /// Non-empty key, if any.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref().filter(|k| !k.is_empty())
    }

    pub fn children(&self) -> &[ComponentId] {
        match &self.kind {
            NodeKind::Leaf { .. } => &[],
            NodeKind::Composite { children, .. } | NodeKind::Reference { children, .. } => children,
        }
    }

    /// Leaf value, if this is a leaf.
    pub fn value(&self) -> Option<&Value> {
        match &self.kind {
            NodeKind::Leaf { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Readiness of a reference node; `None` for other kinds.
    pub fn readiness(&self) -> Option<Readiness> {
        match &self.kind {
            NodeKind::Reference { gate, .. } => Some(gate.borrow().clone()),
            _ => None,
        }
    }

    /// Whether this node merges its children directly into the parent's
    /// namespace instead of nesting them under its own key.
    pub fn is_transparent(&self) -> bool {
        match &self.kind {
            NodeKind::Leaf { .. } => false,
            NodeKind::Composite { transparent, .. } => *transparent || self.key().is_none(),
            NodeKind::Reference { .. } => self.key().is_none(),
        }
    }
}

/// Arena of components. Owns every node; relationships are IDs.
pub struct ComponentTree {
    nodes: HashMap<ComponentId, ComponentNode>,
    root: ComponentId,
}

impl ComponentTree {
    /// Materialize a detached built subtree as a new tree.
    pub(crate) fn from_built(root: BuiltNode) -> Self {
        let mut nodes = HashMap::new();
        let root_id = insert_built(&mut nodes, root, None);
        Self {
            nodes,
            root: root_id,
        }
    }

    pub fn root_id(&self) -> &ComponentId {
        &self.root
    }

    pub fn get(&self, id: &ComponentId) -> Option<&ComponentNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &ComponentId) -> Option<&mut ComponentNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &ComponentId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Children of a node, cloned so callers can recurse with `&mut self`.
    pub fn children_of(&self, id: &ComponentId) -> Vec<ComponentId> {
        self.get(id).map(|n| n.children().to_vec()).unwrap_or_default()
    }

    /// Depth-first traversal over every descendant of the root, hidden ones
    /// included, parents before children, in insertion order.
    pub fn every_component(&self, f: &mut dyn FnMut(&ComponentNode)) {
        self.walk(&self.root, f);
    }

    fn walk(&self, id: &ComponentId, f: &mut dyn FnMut(&ComponentNode)) {
        let Some(node) = self.get(id) else { return };
        f(node);
        for child in node.children() {
            self.walk(child, f);
        }
    }

    /// First component (depth-first) with the given key.
    pub fn find_by_key(&self, key: &str) -> Option<ComponentId> {
        let mut found = None;
        self.every_component(&mut |node| {
            if found.is_none() && node.key() == Some(key) {
                found = Some(node.id.clone());
            }
        });
        found
    }

    /// Graft a detached built subtree under `parent`, appending it to the
    /// parent's children. The built subtree is only attached as a whole, so a
    /// failed build never leaves partial children behind.
    pub(crate) fn graft(
        &mut self,
        parent: &ComponentId,
        built: BuiltNode,
    ) -> Result<ComponentId, EngineError> {
        match self.get(parent).map(|n| &n.kind) {
            Some(NodeKind::Composite { .. }) | Some(NodeKind::Reference { .. }) => {}
            Some(NodeKind::Leaf { .. }) => {
                return Err(EngineError::NotAComposite(parent.clone()))
            }
            None => return Err(EngineError::UnknownComponent(parent.clone())),
        }
        let child_id = insert_built(&mut self.nodes, built, Some(parent.clone()));
        match &mut self
            .nodes
            .get_mut(parent)
            .ok_or_else(|| EngineError::UnknownComponent(parent.clone()))?
            .kind
        {
            NodeKind::Composite { children, .. } | NodeKind::Reference { children, .. } => {
                children.push(child_id.clone());
            }
            NodeKind::Leaf { .. } => unreachable!("kind checked above"),
        }
        Ok(child_id)
    }

    /// Detach and release a subtree. Sibling identity and order are preserved
    /// beyond the removal point.
    pub fn remove(&mut self, id: &ComponentId) -> Result<(), EngineError> {
        if *id == self.root {
            return Err(EngineError::CannotRemoveRoot);
        }
        let parent = self
            .get(id)
            .ok_or_else(|| EngineError::UnknownComponent(id.clone()))?
            .parent
            .clone();
        if let Some(parent_id) = parent {
            if let Some(parent_node) = self.nodes.get_mut(&parent_id) {
                match &mut parent_node.kind {
                    NodeKind::Composite { children, .. }
                    | NodeKind::Reference { children, .. } => {
                        children.retain(|c| c != id);
                    }
                    NodeKind::Leaf { .. } => {}
                }
            }
        }
        self.release(id);
        Ok(())
    }

    fn release(&mut self, id: &ComponentId) {
        for child in self.children_of(id) {
            self.release(&child);
        }
        self.nodes.remove(id);
    }
}

fn insert_built(
    nodes: &mut HashMap<ComponentId, ComponentNode>,
    built: BuiltNode,
    parent: Option<ComponentId>,
) -> ComponentId {
    let id = ComponentId::new();
    let kind = match built.kind {
        BuiltKind::Leaf { value, behavior } => NodeKind::Leaf { value, behavior },
        BuiltKind::Composite {
            children,
            transparent,
        } => {
            let child_ids = children
                .into_iter()
                .map(|c| insert_built(nodes, c, Some(id.clone())))
                .collect();
            NodeKind::Composite {
                children: child_ids,
                transparent,
            }
        }
        BuiltKind::Reference {
            children,
            source,
            ready,
        } => {
            let child_ids: Vec<ComponentId> = children
                .into_iter()
                .map(|c| insert_built(nodes, c, Some(id.clone())))
                .collect();
            let initial = if ready {
                Readiness::Ready
            } else {
                Readiness::Pending
            };
            let (gate, _) = watch::channel(initial);
            NodeKind::Reference {
                children: child_ids,
                source,
                queued: None,
                gate,
            }
        }
    };
    nodes.insert(
        id.clone(),
        ComponentNode {
            id: id.clone(),
            parent,
            field_type: built.field_type,
            key: built.key,
            conditional: built.conditional,
            clear_on_hide: built.clear_on_hide,
            force_hidden: built.force_hidden,
            visible: true,
            kind,
        },
    );
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TreeBuilder;
    use crate::registry::TypeRegistry;
    use formic_core::schema::SchemaFragment;
    use serde_json::json;

    fn build_tree(schema: serde_json::Value) -> ComponentTree {
        let registry = Arc::new(TypeRegistry::builtin());
        let builder = TreeBuilder::new(registry);
        let fragment = SchemaFragment::from_value(schema).unwrap();
        ComponentTree::from_built(builder.build(&fragment).unwrap())
    }

    #[test]
    fn traversal_is_depth_first_in_schema_order() {
        let tree = build_tree(json!({
            "type": "panel",
            "key": "outer",
            "components": [
                {"type": "textfield", "key": "a"},
                {"type": "panel", "key": "inner", "components": [
                    {"type": "textfield", "key": "b"}
                ]},
                {"type": "textfield", "key": "c"}
            ]
        }));
        let mut keys = Vec::new();
        tree.every_component(&mut |node| {
            keys.push(node.key().unwrap_or("-").to_string());
        });
        assert_eq!(keys, vec!["outer", "a", "inner", "b", "c"]);
    }

    #[test]
    fn parent_links_resolve_through_the_tree() {
        let tree = build_tree(json!({
            "type": "panel",
            "components": [{"type": "textfield", "key": "a"}]
        }));
        let a = tree.find_by_key("a").unwrap();
        let parent = tree.get(&a).unwrap().parent.clone().unwrap();
        assert_eq!(&parent, tree.root_id());
        assert!(tree.get(tree.root_id()).unwrap().parent.is_none());
    }

    #[test]
    fn remove_preserves_sibling_order() {
        let mut tree = build_tree(json!({
            "type": "panel",
            "components": [
                {"type": "textfield", "key": "a"},
                {"type": "textfield", "key": "b"},
                {"type": "textfield", "key": "c"}
            ]
        }));
        let b = tree.find_by_key("b").unwrap();
        tree.remove(&b).unwrap();
        let keys: Vec<_> = tree
            .children_of(tree.root_id())
            .iter()
            .map(|id| tree.get(id).unwrap().key().unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["a", "c"]);
        assert!(!tree.contains(&b));
    }

    #[test]
    fn remove_releases_the_whole_subtree() {
        let mut tree = build_tree(json!({
            "type": "panel",
            "components": [
                {"type": "panel", "key": "inner", "components": [
                    {"type": "textfield", "key": "deep"}
                ]}
            ]
        }));
        let before = tree.len();
        let inner = tree.find_by_key("inner").unwrap();
        tree.remove(&inner).unwrap();
        assert_eq!(tree.len(), before - 2);
        assert!(tree.find_by_key("deep").is_none());
    }

    #[test]
    fn cannot_remove_root() {
        let mut tree = build_tree(json!({"type": "panel", "components": []}));
        let root = tree.root_id().clone();
        assert!(matches!(
            tree.remove(&root),
            Err(EngineError::CannotRemoveRoot)
        ));
    }

    #[test]
    fn transparency() {
        let tree = build_tree(json!({
            "type": "panel",
            "key": "layout",
            "components": [
                {"type": "container", "key": "nested", "components": []},
                {"type": "textfield", "key": "leaf"}
            ]
        }));
        // layout composites are transparent even with a key
        assert!(tree.get(tree.root_id()).unwrap().is_transparent());
        let nested = tree.find_by_key("nested").unwrap();
        assert!(!tree.get(&nested).unwrap().is_transparent());
        let leaf = tree.find_by_key("leaf").unwrap();
        assert!(!tree.get(&leaf).unwrap().is_transparent());
    }
}
