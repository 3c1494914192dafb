use serde_json::Value;

use formic_core::conditions::ConditionEvaluator;
use formic_core::data::{loose_eq, value_at_path};
use formic_core::errors::EvaluationError;
use formic_core::ids::ComponentId;
use formic_core::schema::ConditionalSpec;

use crate::tree::ComponentTree;

/// One fail-open evaluation failure, surfaced to the host after the pass.
pub(crate) struct EvalFailure {
    pub component_key: String,
    pub error: EvaluationError,
}

/// Evaluate `id`'s own rule against the whole-root snapshot, set its
/// `visible` flag, then recurse into every child with the same snapshot.
/// Returns the node's own visibility.
///
/// Children are always evaluated, even under an invisible parent: each
/// node's flag reflects only its own rule, and effective on-screen
/// visibility is the AND of the chain (applied at merge/render time).
pub(crate) fn check_conditions(
    tree: &mut ComponentTree,
    id: &ComponentId,
    evaluator: &dyn ConditionEvaluator,
    snapshot: &Value,
    failures: &mut Vec<EvalFailure>,
) -> bool {
    let own = match tree.get(id) {
        None => return true,
        Some(node) => {
            if node.force_hidden {
                false
            } else {
                match &node.conditional {
                    None => true,
                    Some(spec) => match evaluate_spec(spec, evaluator, snapshot) {
                        Ok(visible) => visible,
                        Err(error) => {
                            // Fail open: a bad rule must not hide the form.
                            let component_key = node.key().unwrap_or("").to_string();
                            tracing::warn!(
                                component_key = %component_key,
                                error = %error,
                                "conditional rule failed to evaluate, treating component as visible"
                            );
                            failures.push(EvalFailure {
                                component_key,
                                error,
                            });
                            true
                        }
                    },
                }
            }
        }
    };

    if let Some(node) = tree.get_mut(id) {
        node.visible = own;
    }

    for child in tree.children_of(id) {
        check_conditions(tree, &child, evaluator, snapshot, failures);
    }

    own
}

fn evaluate_spec(
    spec: &ConditionalSpec,
    evaluator: &dyn ConditionEvaluator,
    snapshot: &Value,
) -> Result<bool, EvaluationError> {
    if let Some(rule) = &spec.json {
        return evaluator.evaluate(rule, snapshot);
    }
    let Some(when) = spec.when.as_deref().filter(|w| !w.is_empty()) else {
        return Ok(true);
    };
    let actual = value_at_path(snapshot, &format!("data.{when}")).unwrap_or(&Value::Null);
    let expected = spec.eq.as_ref().unwrap_or(&Value::Null);
    let matches = loose_eq(actual, expected);
    Ok(matches == spec.show.unwrap_or(true))
}
