use weft_config::{ContentType, NodeDef};

use crate::variables::VisibleVariables;

/// Every reference string a node's contents carry, with where it was found.
///
/// Covers `{"ref": ...}` payload values, `ref` items of `VarsInput` lists and
/// `config.ref` of result entries.
pub fn collect_content_refs(node: &NodeDef) -> Vec<(String, String)> {
  let mut refs = Vec::new();

  for (content_id, entry) in node.payloads.iter() {
    if let Some(reference) = entry.data_ref() {
      refs.push((format!("payloads.{}", content_id), reference.to_string()));
    }
    if entry.content_type == ContentType::VarsInput {
      for (i, var) in entry.data.as_array().into_iter().flatten().enumerate() {
        let is_ref = var.get("type").and_then(|t| t.as_str()) == Some("ref");
        if let (true, Some(reference)) = (is_ref, var.get("value").and_then(|v| v.as_str())) {
          refs.push((format!("payloads.{}[{}]", content_id, i), reference.to_string()));
        }
      }
    }
  }

  for (content_id, entry) in node.results.iter() {
    if let Some(reference) = &entry.config.reference {
      refs.push((format!("results.{}.config.ref", content_id), reference.clone()));
    }
  }

  refs
}

/// Check every collected reference against what the node can see.
pub fn check_content_refs(node: &NodeDef, visible: &VisibleVariables) -> Vec<String> {
  collect_content_refs(node)
    .into_iter()
    .filter_map(|(location, reference)| {
      visible
        .check_ref(&reference)
        .err()
        .map(|message| format!("{}: {}", location, message))
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use weft_config::ContentEntry;

  #[test]
  fn test_collects_all_reference_sites() {
    let mut node = NodeDef::new("n", "jinja2_template");
    node.payloads.insert(
      "src",
      ContentEntry::new(ContentType::Object, json!({"ref": "a/results/x"})),
    );
    node.payloads.insert(
      "vars",
      ContentEntry::new(
        ContentType::VarsInput,
        json!([
          {"key": "x", "type": "ref", "value": "b/results/y"},
          {"key": "y", "type": "value", "value": "literal"}
        ]),
      ),
    );
    let mut result = ContentEntry::new(ContentType::Object, json!([]));
    result.config.reference = Some("c#/results/z".to_string());
    node.results.insert("out", result);

    let refs: Vec<String> = collect_content_refs(&node)
      .into_iter()
      .map(|(_, r)| r)
      .collect();
    assert_eq!(refs, vec!["a/results/x", "b/results/y", "c#/results/z"]);
  }

  #[test]
  fn test_check_reports_each_missing_reference() {
    let mut node = NodeDef::new("n", "text_input");
    node.payloads.insert(
      "a",
      ContentEntry::new(ContentType::Object, json!({"ref": "x/results/out"})),
    );
    node.payloads.insert(
      "b",
      ContentEntry::new(ContentType::Object, json!({"ref": "not a reference"})),
    );

    let errors = check_content_refs(&node, &VisibleVariables::default());
    assert_eq!(errors.len(), 2);
    assert!(errors[0].contains("x/results/out"));
    assert!(errors[1].starts_with("payloads.b"));
  }
}
