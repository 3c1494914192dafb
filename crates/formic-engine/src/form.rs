use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use formic_core::conditions::{ConditionEvaluator, JsonRuleEvaluator};
use formic_core::data::SetValueFlags;
use formic_core::events::FormEvent;
use formic_core::ids::{ComponentId, FormId};
use formic_core::schema::SchemaFragment;
use formic_telemetry::MetricsRecorder;

use crate::builder::{self, TreeBuilder};
use crate::error::EngineError;
use crate::loader::FragmentLoader;
use crate::sync;
use crate::tree::{ComponentNode, ComponentTree, NodeKind, Readiness};
use crate::visibility::{self, EvalFailure};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Collaborators a host can swap out when creating a form.
#[derive(Clone)]
pub struct FormOptions {
    pub registry: Arc<crate::registry::TypeRegistry>,
    pub evaluator: Arc<dyn ConditionEvaluator>,
    pub metrics: Option<Arc<MetricsRecorder>>,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            registry: Arc::new(crate::registry::TypeRegistry::builtin()),
            evaluator: Arc::new(JsonRuleEvaluator),
            metrics: None,
        }
    }
}

/// The root of a component tree: owns the tree, the data object, the
/// condition evaluator and the single change bus.
///
/// Every externally-triggered mutation follows the same sequence: value
/// writes are applied depth-first in child order, one full conditional pass
/// runs over the whole tree against a stable snapshot, and at most one
/// `Change` event is emitted.
pub struct Form {
    id: FormId,
    tree: ComponentTree,
    data: Value,
    builder: TreeBuilder,
    evaluator: Arc<dyn ConditionEvaluator>,
    events: broadcast::Sender<FormEvent>,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl Form {
    /// Build a form from a schema: the fragment's `components` become the
    /// root's children. Fails if any descendant fragment is invalid.
    pub fn new(schema: &SchemaFragment) -> Result<Self, EngineError> {
        Self::with_options(schema, FormOptions::default())
    }

    pub fn with_options(schema: &SchemaFragment, options: FormOptions) -> Result<Self, EngineError> {
        let builder = TreeBuilder::new(options.registry);
        let root = crate::builder::BuiltNode {
            field_type: "form".to_string(),
            key: None,
            conditional: schema.conditional.clone().filter(|c| !c.is_empty()),
            clear_on_hide: true,
            force_hidden: false,
            kind: crate::builder::BuiltKind::Composite {
                children: builder.build_all(&schema.components)?,
                transparent: false,
            },
        };
        let tree = ComponentTree::from_built(root);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let form = Self {
            id: FormId::new(),
            tree,
            data: Value::Object(Map::new()),
            builder,
            evaluator: options.evaluator,
            events,
            metrics: options.metrics,
        };
        form.record_component_count();
        Ok(form)
    }

    pub fn id(&self) -> &FormId {
        &self.id
    }

    pub fn root_id(&self) -> &ComponentId {
        self.tree.root_id()
    }

    /// Subscribe to the form's change bus.
    pub fn subscribe(&self) -> broadcast::Receiver<FormEvent> {
        self.events.subscribe()
    }

    pub fn node(&self, id: &ComponentId) -> Option<&ComponentNode> {
        self.tree.get(id)
    }

    /// A component's own visibility flag (its own rule only, independent of
    /// ancestor visibility).
    pub fn visible(&self, id: &ComponentId) -> Option<bool> {
        self.tree.get(id).map(|n| n.visible)
    }

    pub fn children_of(&self, id: &ComponentId) -> Vec<ComponentId> {
        self.tree.children_of(id)
    }

    pub fn find_by_key(&self, key: &str) -> Option<ComponentId> {
        self.tree.find_by_key(key)
    }

    /// Depth-first callback over every descendant, hidden ones included.
    pub fn every_component(&self, mut f: impl FnMut(&ComponentNode)) {
        let mut skip_root = true;
        self.tree.every_component(&mut |node| {
            if skip_root {
                skip_root = false;
                return;
            }
            f(node);
        });
    }

    /// Build a new child from a schema fragment and append it to the root.
    /// No data side effect until the component is given a value.
    pub fn add_component(&mut self, fragment: &SchemaFragment) -> Result<ComponentId, EngineError> {
        let root = self.tree.root_id().clone();
        self.add_component_to(&root, fragment)
    }

    /// Same, under an arbitrary composite. On a schema error the parent's
    /// children are left untouched (no partial insert).
    pub fn add_component_to(
        &mut self,
        parent: &ComponentId,
        fragment: &SchemaFragment,
    ) -> Result<ComponentId, EngineError> {
        let built = self.builder.build(fragment)?;
        let id = self.tree.graft(parent, built)?;
        self.record_component_count();
        self.redraw();
        Ok(id)
    }

    pub fn remove_component(&mut self, id: &ComponentId) -> Result<(), EngineError> {
        self.tree.remove(id)?;
        self.record_component_count();
        self.redraw();
        Ok(())
    }

    /// Apply a data object to the whole tree. Returns whether any stored
    /// value changed; emits exactly one `Change` when it did, followed by a
    /// `Redraw` so render hosts pick up the new state. Calling twice with
    /// the same object produces no further events on the second call.
    pub fn set_value(&mut self, value: Value, flags: SetValueFlags) -> bool {
        let incoming = match value {
            Value::Object(_) => value,
            // Non-object input resets everything to defaults.
            _ => Value::Object(Map::new()),
        };
        // One stable snapshot per pass: conditions see the incoming data,
        // not a moving target as siblings update.
        let snapshot = json!({ "data": incoming });
        let root = self.tree.root_id().clone();
        let changed = sync::apply_object(&mut self.tree, &root, &snapshot["data"]);
        self.run_condition_pass(&snapshot);
        self.data = sync::synthesize(&self.tree, &root);
        if changed {
            self.emit_change(flags);
            self.redraw();
        }
        changed
    }

    /// The merged value: visible, keyed, value-bearing children only, in
    /// child order, later keys overwriting earlier ones.
    pub fn get_value(&self) -> Value {
        sync::synthesize(&self.tree, self.tree.root_id())
    }

    /// Re-evaluate every conditional rule against the current data.
    /// Returns the root's own visibility.
    pub fn check_conditions(&mut self) -> bool {
        let snapshot = json!({ "data": self.data.clone() });
        self.run_condition_pass(&snapshot)
    }

    /// Re-evaluate against an explicit data object instead of the form's
    /// current data. Evaluation is pure: the snapshot is threaded through
    /// the recursion, never read from ambient state.
    pub fn check_conditions_with(&mut self, data: &Value) -> bool {
        let snapshot = json!({ "data": data.clone() });
        self.run_condition_pass(&snapshot)
    }

    /// Request a re-render. No data mutation.
    pub fn redraw(&self) {
        let _ = self.events.send(FormEvent::Redraw {
            form_id: self.id.clone(),
        });
    }

    /// Readiness gate of a reference component. Hosts can await `changed()`
    /// on the receiver; the gate always settles, cancellation included.
    pub fn readiness(&self, id: &ComponentId) -> Option<watch::Receiver<Readiness>> {
        match &self.tree.get(id)?.kind {
            NodeKind::Reference { gate, .. } => Some(gate.subscribe()),
            _ => None,
        }
    }

    /// Resolve every pending reference node through `loader`, concurrently.
    /// Per node: fetched children are grafted, the gate settles to `Ready`
    /// and any value queued before readiness is applied; on failure the gate
    /// settles to `Failed` and the node stays empty but consistent. One
    /// `Change` is emitted at most, after all nodes settle.
    pub async fn load_subforms(&mut self, loader: &dyn FragmentLoader, cancel: &CancellationToken) {
        let pending: Vec<(ComponentId, String)> = {
            let mut out = Vec::new();
            self.tree.every_component(&mut |node| {
                if let NodeKind::Reference { source: Some(source), gate, .. } = &node.kind {
                    if *gate.borrow() == Readiness::Pending {
                        out.push((node.id.clone(), source.clone()));
                    }
                }
            });
            out
        };
        if pending.is_empty() {
            return;
        }

        let fetches = pending.iter().map(|(_, source)| async move {
            tokio::select! {
                // Cancellation must win even against an immediately-ready load.
                biased;
                _ = cancel.cancelled() => Err(formic_core::errors::LoadError::Cancelled),
                result = loader.load(source) => result,
            }
        });
        let results = futures::future::join_all(fetches).await;

        let mut changed = false;
        for ((id, source), result) in pending.into_iter().zip(results) {
            match result {
                Ok(mut fragment) => {
                    builder::hide_submit_buttons(&mut fragment.components);
                    match self.builder.build_all(&fragment.components) {
                        Ok(children) => {
                            let mut graft_failed = false;
                            for child in children {
                                if self.tree.graft(&id, child).is_err() {
                                    graft_failed = true;
                                }
                            }
                            if graft_failed {
                                self.settle_failed(&id, "reference node vanished during load");
                                continue;
                            }
                            self.settle_ready(&id);
                            changed |= self.apply_queued(&id);
                        }
                        Err(err) => self.settle_failed(&id, &err.to_string()),
                    }
                }
                Err(err) => {
                    tracing::warn!(source = %source, error = %err, "subform load failed");
                    self.settle_failed(&id, &err.to_string());
                }
            }
        }

        self.record_component_count();
        let root = self.tree.root_id().clone();
        let snapshot = json!({ "data": sync::synthesize(&self.tree, &root) });
        self.run_condition_pass(&snapshot);
        self.data = sync::synthesize(&self.tree, &root);
        if changed {
            self.emit_change(SetValueFlags::default());
        }
        self.redraw();
    }

    fn settle_ready(&mut self, id: &ComponentId) {
        if let Some(NodeKind::Reference { gate, .. }) = self.tree.get_mut(id).map(|n| &mut n.kind) {
            gate.send_replace(Readiness::Ready);
        }
        if let Some(metrics) = &self.metrics {
            metrics.counter_inc("form.subform_loads", &[("outcome", "ok")], 1);
        }
        let _ = self.events.send(FormEvent::SubformReady {
            form_id: self.id.clone(),
            component_id: id.clone(),
        });
    }

    fn settle_failed(&mut self, id: &ComponentId, error: &str) {
        if let Some(NodeKind::Reference { gate, queued, .. }) =
            self.tree.get_mut(id).map(|n| &mut n.kind)
        {
            gate.send_replace(Readiness::Failed(error.to_string()));
            *queued = None;
        }
        if let Some(metrics) = &self.metrics {
            metrics.counter_inc("form.subform_loads", &[("outcome", "failed")], 1);
        }
        let _ = self.events.send(FormEvent::SubformFailed {
            form_id: self.id.clone(),
            component_id: id.clone(),
            error: error.to_string(),
        });
    }

    fn apply_queued(&mut self, id: &ComponentId) -> bool {
        let queued = match self.tree.get_mut(id).map(|n| &mut n.kind) {
            Some(NodeKind::Reference { queued, .. }) => queued.take(),
            _ => None,
        };
        match queued {
            Some(value) => sync::apply_object(&mut self.tree, id, &value),
            None => false,
        }
    }

    fn run_condition_pass(&mut self, snapshot: &Value) -> bool {
        let root = self.tree.root_id().clone();
        let mut failures: Vec<EvalFailure> = Vec::new();
        let visible = visibility::check_conditions(
            &mut self.tree,
            &root,
            self.evaluator.as_ref(),
            snapshot,
            &mut failures,
        );
        if let Some(metrics) = &self.metrics {
            metrics.counter_inc("form.condition_passes", &[], 1);
            if !failures.is_empty() {
                metrics.counter_inc("form.evaluation_failures", &[], failures.len() as u64);
            }
        }
        for failure in failures {
            let _ = self.events.send(FormEvent::EvaluationFailed {
                form_id: self.id.clone(),
                component_key: failure.component_key,
                error: failure.error.to_string(),
            });
        }
        visible
    }

    fn emit_change(&self, flags: SetValueFlags) {
        if flags.no_change_event {
            return;
        }
        if let Some(metrics) = &self.metrics {
            metrics.counter_inc("form.change_events", &[], 1);
        }
        let _ = self.events.send(FormEvent::Change {
            form_id: self.id.clone(),
            value: self.data.clone(),
        });
    }

    fn record_component_count(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.gauge_set("form.component_count", &[], self.tree.len() as f64 - 1.0);
        }
    }
}
