use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use weft_config::{NodeDef, kinds};
use weft_validator::{VisibleVariables, check_content_refs};

use super::ids;
use crate::error::NodeError;
use crate::node::{NodeCtx, NodeKind};
use crate::progress::NodeUpdate;
use crate::status::RunStatus;

const ELSE_HANDLE: &str = "else";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum CondType {
  #[default]
  And,
  Or,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum CompareType {
  Ref,
  #[default]
  Value,
}

#[derive(Debug, Clone, Deserialize)]
struct Condition {
  refdata: String,
  operator: String,
  #[serde(default)]
  compare_type: CompareType,
  #[serde(default)]
  value: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct Branch {
  output_key: String,
  #[serde(default)]
  cond_type: CondType,
  #[serde(default)]
  conditions: Vec<Condition>,
}

fn parse_branches(value: Value) -> Result<Vec<Branch>, String> {
  serde_json::from_value(value).map_err(|e| format!("invalid {}: {}", ids::CONDITIONS, e))
}

fn is_empty(value: &Value) -> bool {
  match value {
    Value::Null => true,
    Value::String(s) => s.is_empty(),
    Value::Array(a) => a.is_empty(),
    Value::Object(o) => o.is_empty(),
    _ => false,
  }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
  match (haystack, needle) {
    (Value::String(h), Value::String(n)) => h.contains(n.as_str()),
    (Value::Array(items), _) => items.contains(needle),
    (Value::Object(map), Value::String(key)) => map.contains_key(key),
    _ => false,
  }
}

fn ordering(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
  match (left, right) {
    (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
    (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
    _ => None,
  }
}

/// Apply one operator.
fn compare(left: &Value, operator: &str, right: &Value) -> Result<bool, NodeError> {
  use std::cmp::Ordering::*;

  let ordered = |accept: &[std::cmp::Ordering]| {
    ordering(left, right)
      .map(|o| accept.contains(&o))
      .ok_or_else(|| NodeError::failed(format!("cannot compare {} {} {}", left, operator, right)))
  };

  match operator {
    "==" => Ok(ordering(left, right).map_or(left == right, |o| o == Equal)),
    "!=" => Ok(ordering(left, right).map_or(left != right, |o| o != Equal)),
    ">" => ordered(&[Greater]),
    ">=" => ordered(&[Greater, Equal]),
    "<" => ordered(&[Less]),
    "<=" => ordered(&[Less, Equal]),
    "contains" => Ok(contains(left, right)),
    "not_contains" => Ok(!contains(left, right)),
    "is_empty" => Ok(is_empty(left)),
    "is_not_empty" => Ok(!is_empty(left)),
    other => Err(NodeError::failed(format!("unknown operator '{}'", other))),
  }
}

/// Routes control to the first branch whose conditions hold.
pub struct CondBranch;

impl CondBranch {
  fn evaluate(ctx: &NodeCtx, branch: &Branch) -> Result<bool, NodeError> {
    let mut results = Vec::with_capacity(branch.conditions.len());
    for condition in &branch.conditions {
      let left = ctx.resolve(&condition.refdata)?;
      let right = match (condition.compare_type, condition.value.as_str()) {
        (CompareType::Ref, Some(reference)) => ctx.resolve(reference)?,
        _ => condition.value.clone(),
      };
      results.push(compare(&left, &condition.operator, &right)?);
    }
    Ok(match branch.cond_type {
      CondType::And => results.iter().all(|r| *r),
      CondType::Or => results.iter().any(|r| *r),
    })
  }
}

#[async_trait]
impl NodeKind for CondBranch {
  fn name(&self) -> &'static str {
    kinds::COND_BRANCH
  }

  async fn run(&self, ctx: &NodeCtx) -> Result<Vec<NodeUpdate>, NodeError> {
    let branches = parse_branches(ctx.payload_value(ids::CONDITIONS)?).map_err(NodeError::failed)?;

    let mut taken = None;
    for branch in &branches {
      if Self::evaluate(ctx, branch)? {
        taken = Some(branch.output_key.clone());
        break;
      }
    }
    if taken.is_none() && ctx.instance.def().has_output(ELSE_HANDLE) {
      taken = Some(ELSE_HANDLE.to_string());
    }
    debug!(instance_id = %ctx.instance.key(), taken = ?taken, "branch_selected");

    for handle in ctx.instance.def().output_handles() {
      let status = if taken.as_deref() == Some(handle.as_str()) {
        RunStatus::Success
      } else {
        RunStatus::Canceled
      };
      ctx.instance.set_output_status(handle, status);
    }
    Ok(Vec::new())
  }

  fn validate(&self, node: &NodeDef, visible: &VisibleVariables) -> Vec<String> {
    let mut errors = check_content_refs(node, visible);
    let Some(entry) = node.payloads.get(ids::CONDITIONS) else {
      errors.push(format!("missing payload {}", ids::CONDITIONS));
      return errors;
    };
    let branches = match parse_branches(entry.data.clone()) {
      Ok(branches) => branches,
      Err(message) => {
        errors.push(message);
        return errors;
      }
    };

    for branch in &branches {
      if !node.has_output(&branch.output_key) {
        errors.push(format!("branch output '{}' is not an output handle", branch.output_key));
      }
      for condition in &branch.conditions {
        if let Err(message) = visible.check_ref(&condition.refdata) {
          errors.push(format!("branch '{}': {}", branch.output_key, message));
        }
        let compared = match (condition.compare_type, condition.value.as_str()) {
          (CompareType::Ref, Some(reference)) => visible.check_ref(reference).err(),
          _ => None,
        };
        if let Some(message) = compared {
          errors.push(format!("branch '{}': {}", branch.output_key, message));
        }
      }
    }
    errors
  }

  fn node_config(&self) -> Value {
    json!({
      "label": "Condition",
      "operators": ["==", "!=", ">", ">=", "<", "<=", "contains", "not_contains", "is_empty", "is_not_empty"],
      "fallback_handle": ELSE_HANDLE,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_numeric_and_string_comparison() {
    assert!(compare(&json!(3), ">", &json!(2.5)).unwrap());
    assert!(compare(&json!(2), "==", &json!(2.0)).unwrap());
    assert!(compare(&json!("b"), ">=", &json!("a")).unwrap());
    assert!(compare(&json!("x"), "!=", &json!(1)).unwrap());
    assert!(compare(&json!("x"), "<", &json!(1)).is_err());
  }

  #[test]
  fn test_containment_and_emptiness() {
    assert!(compare(&json!("hello"), "contains", &json!("ell")).unwrap());
    assert!(compare(&json!([1, 2]), "not_contains", &json!(3)).unwrap());
    assert!(compare(&json!({"k": 1}), "contains", &json!("k")).unwrap());
    assert!(compare(&json!([]), "is_empty", &Value::Null).unwrap());
    assert!(compare(&json!(0), "is_not_empty", &Value::Null).unwrap());
  }

  #[test]
  fn test_unknown_operator() {
    assert!(compare(&json!(1), "~=", &json!(1)).is_err());
  }

  #[test]
  fn test_parse_branches_defaults() {
    let branches = parse_branches(json!([
      {"output_key": "yes", "conditions": [{"refdata": "a/results/x", "operator": "is_empty"}]}
    ]))
    .unwrap();
    assert_eq!(branches[0].cond_type, CondType::And);
    assert_eq!(branches[0].conditions[0].compare_type, CompareType::Value);
  }
}
