use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use weft_config::{NodeDef, kinds};
use weft_validator::{VisibleVariables, check_content_refs};

use super::ids;
use crate::error::NodeError;
use crate::node::{NodeCtx, NodeKind};
use crate::progress::NodeUpdate;
use crate::status::{JoinPolicy, RunStatus};

#[derive(Debug, Clone, Deserialize)]
struct AggregateBranch {
  /// `<node_id>/<output_handle>` of the predecessor guarding this branch.
  node: String,
  refdata: String,
}

impl AggregateBranch {
  fn source(&self) -> Option<(&str, &str)> {
    self.node.split_once('/')
  }
}

fn parse_branches(value: Value) -> Result<Vec<AggregateBranch>, String> {
  serde_json::from_value(value).map_err(|e| format!("invalid {}: {}", ids::BRANCHES, e))
}

/// Merges mutually exclusive branches: copies the value of the first branch
/// whose predecessor handle succeeded.
pub struct BranchAggregate;

#[async_trait]
impl NodeKind for BranchAggregate {
  fn name(&self) -> &'static str {
    kinds::BRANCH_AGGREGATE
  }

  fn join_policy(&self) -> JoinPolicy {
    JoinPolicy::Or
  }

  async fn run(&self, ctx: &NodeCtx) -> Result<Vec<NodeUpdate>, NodeError> {
    let branches = parse_branches(ctx.payload_value(ids::BRANCHES)?).map_err(NodeError::failed)?;
    let waits = ctx.instance.wait_edges();

    for branch in &branches {
      let Some((node_id, handle)) = branch.source() else {
        continue;
      };
      let succeeded = waits
        .iter()
        .filter(|w| w.source.template_id == node_id && w.handle == handle)
        .filter_map(|w| ctx.run.instance(&w.source))
        .any(|source| source.output_status(handle) == RunStatus::Success);
      if succeeded {
        let value = ctx.resolve(&branch.refdata)?;
        return Ok(vec![ctx.set_result(ids::OUTPUT, value)?]);
      }
    }

    Err(NodeError::failed("no aggregated branch succeeded"))
  }

  fn validate(&self, node: &NodeDef, visible: &VisibleVariables) -> Vec<String> {
    let mut errors = check_content_refs(node, visible);
    if node.results.get(ids::OUTPUT).is_none() {
      errors.push(format!("missing result {}", ids::OUTPUT));
    }
    let branches = match node.payloads.get(ids::BRANCHES).map(|e| parse_branches(e.data.clone())) {
      Some(Ok(branches)) => branches,
      Some(Err(message)) => {
        errors.push(message);
        return errors;
      }
      None => {
        errors.push(format!("missing payload {}", ids::BRANCHES));
        return errors;
      }
    };

    for branch in &branches {
      let Some((node_id, handle)) = branch.source() else {
        errors.push(format!("branch node '{}' is not <node>/<handle>", branch.node));
        continue;
      };
      match visible.upstream_of(node_id, handle) {
        None => errors.push(format!("'{}' is not wired into this node", branch.node)),
        Some(upstream) => {
          let reachable = visible
            .check_ref(&branch.refdata)
            .map(|r| upstream.vars.iter().any(|v| v.reference == r));
          match reachable {
            Ok(true) => {}
            Ok(false) => errors.push(format!(
              "'{}' is not visible through '{}'",
              branch.refdata, branch.node
            )),
            Err(message) => errors.push(message),
          }
        }
      }
    }
    errors
  }

  fn node_config(&self) -> Value {
    json!({ "label": "Branch aggregate", "join": "or", "results": [ids::OUTPUT] })
  }
}
