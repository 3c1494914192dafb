use serde_json::Value;

use crate::data::{loose_eq, truthy, value_at_path};
use crate::errors::EvaluationError;

/// The boundary between the tree and the rule language. Implementations must
/// be pure: no side effects, callable arbitrarily often per evaluation pass.
///
/// `data` is always the whole-root snapshot (wrapped as `{"data": ...}`), so
/// rules may reference any ancestor or sibling field, not just local values.
pub trait ConditionEvaluator: Send + Sync {
    fn evaluate(&self, rule: &Value, data: &Value) -> Result<bool, EvaluationError>;
}

/// Built-in evaluator for the JSON-rule subset conditional schemas rely on:
/// `var`, `==`, `!=`, `!`, `!!`, `and`, `or`. Anything else is an
/// `EvaluationError::UnknownOperator` (the engine fails open on those).
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonRuleEvaluator;

impl JsonRuleEvaluator {
    fn apply(&self, rule: &Value, data: &Value) -> Result<Value, EvaluationError> {
        let map = match rule {
            Value::Object(map) => map,
            literal => return Ok(literal.clone()),
        };
        let mut entries = map.iter();
        let (op, arg) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(EvaluationError::MalformedRule(format!(
                    "expected a single operator, got {} keys",
                    map.len()
                )))
            }
        };
        match op.as_str() {
            "var" => self.resolve_var(arg, data),
            "==" => self.binary(arg, data, |a, b| loose_eq(a, b)),
            "!=" => self.binary(arg, data, |a, b| !loose_eq(a, b)),
            "!" => Ok(Value::Bool(!truthy(&self.apply(unary(arg), data)?))),
            "!!" => Ok(Value::Bool(truthy(&self.apply(unary(arg), data)?))),
            "and" => {
                let mut last = Value::Bool(true);
                for operand in operands(arg) {
                    last = self.apply(operand, data)?;
                    if !truthy(&last) {
                        break;
                    }
                }
                Ok(last)
            }
            "or" => {
                let mut last = Value::Bool(false);
                for operand in operands(arg) {
                    last = self.apply(operand, data)?;
                    if truthy(&last) {
                        break;
                    }
                }
                Ok(last)
            }
            other => Err(EvaluationError::UnknownOperator(other.to_string())),
        }
    }

    fn resolve_var(&self, arg: &Value, data: &Value) -> Result<Value, EvaluationError> {
        let (path, default) = match arg {
            Value::String(path) => (path.as_str(), None),
            Value::Array(items) => {
                let path = items
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| EvaluationError::MalformedRule("var path must be a string".into()))?;
                (path, items.get(1))
            }
            _ => {
                return Err(EvaluationError::MalformedRule(
                    "var argument must be a string or array".into(),
                ))
            }
        };
        Ok(value_at_path(data, path)
            .cloned()
            .or_else(|| default.cloned())
            .unwrap_or(Value::Null))
    }

    fn binary(
        &self,
        arg: &Value,
        data: &Value,
        cmp: impl Fn(&Value, &Value) -> bool,
    ) -> Result<Value, EvaluationError> {
        let items = arg
            .as_array()
            .filter(|a| a.len() == 2)
            .ok_or_else(|| EvaluationError::MalformedRule("expected two operands".into()))?;
        let a = self.apply(&items[0], data)?;
        let b = self.apply(&items[1], data)?;
        Ok(Value::Bool(cmp(&a, &b)))
    }
}

/// Operators like `!` accept either a bare operand or a one-element array.
fn unary(arg: &Value) -> &Value {
    match arg {
        Value::Array(items) if items.len() == 1 => &items[0],
        other => other,
    }
}

fn operands(arg: &Value) -> std::slice::Iter<'_, Value> {
    match arg {
        Value::Array(items) => items.iter(),
        single => std::slice::from_ref(single).iter(),
    }
}

impl ConditionEvaluator for JsonRuleEvaluator {
    fn evaluate(&self, rule: &Value, data: &Value) -> Result<bool, EvaluationError> {
        Ok(truthy(&self.apply(rule, data)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(rule: Value, data: Value) -> Result<bool, EvaluationError> {
        JsonRuleEvaluator.evaluate(&rule, &data)
    }

    #[test]
    fn var_truthiness() {
        let data = json!({"data": {"showPanel": true, "name": "", "count": 0}});
        assert!(eval(json!({"var": "data.showPanel"}), data.clone()).unwrap());
        assert!(!eval(json!({"var": "data.name"}), data.clone()).unwrap());
        assert!(!eval(json!({"var": "data.count"}), data.clone()).unwrap());
        assert!(!eval(json!({"var": "data.missing"}), data).unwrap());
    }

    #[test]
    fn var_with_default() {
        let data = json!({"data": {}});
        assert!(eval(json!({"var": ["data.missing", true]}), data).unwrap());
    }

    #[test]
    fn equality() {
        let data = json!({"data": {"role": "admin", "age": 21}});
        assert!(eval(json!({"==": [{"var": "data.role"}, "admin"]}), data.clone()).unwrap());
        assert!(eval(json!({"==": [{"var": "data.age"}, "21"]}), data.clone()).unwrap());
        assert!(eval(json!({"!=": [{"var": "data.role"}, "guest"]}), data).unwrap());
    }

    #[test]
    fn negation_and_double_negation() {
        let data = json!({"data": {"flag": false}});
        assert!(eval(json!({"!": {"var": "data.flag"}}), data.clone()).unwrap());
        assert!(eval(json!({"!": [{"var": "data.flag"}]}), data.clone()).unwrap());
        assert!(!eval(json!({"!!": {"var": "data.flag"}}), data).unwrap());
    }

    #[test]
    fn and_or_short_circuit() {
        let data = json!({"data": {"a": true, "b": false}});
        assert!(!eval(json!({"and": [{"var": "data.a"}, {"var": "data.b"}]}), data.clone()).unwrap());
        assert!(eval(json!({"or": [{"var": "data.b"}, {"var": "data.a"}]}), data.clone()).unwrap());
        // short-circuit never reaches the unknown operator
        assert!(eval(
            json!({"or": [{"var": "data.a"}, {"bogus": []}]}),
            data
        )
        .unwrap());
    }

    #[test]
    fn literal_rules() {
        assert!(eval(json!(true), json!({})).unwrap());
        assert!(!eval(json!(""), json!({})).unwrap());
    }

    #[test]
    fn unknown_operator_is_an_error() {
        let err = eval(json!({"merge": []}), json!({})).unwrap_err();
        assert_eq!(err, EvaluationError::UnknownOperator("merge".into()));
    }

    #[test]
    fn malformed_rules() {
        assert!(matches!(
            eval(json!({"var": "a", "==": []}), json!({})),
            Err(EvaluationError::MalformedRule(_))
        ));
        assert!(matches!(
            eval(json!({"==": [1]}), json!({})),
            Err(EvaluationError::MalformedRule(_))
        ));
        assert!(matches!(
            eval(json!({"var": 42}), json!({})),
            Err(EvaluationError::MalformedRule(_))
        ));
    }
}
