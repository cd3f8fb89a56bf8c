use std::collections::HashMap;

use weft_config::WorkflowDef;

/// Handle-level wiring of a workflow.
#[derive(Debug, Clone)]
pub struct HandleGraph {
  /// node_id -> downstream node_ids.
  adjacency: HashMap<String, Vec<String>>,
  /// (node_id, input handle) -> [(source node_id, source output handle)].
  upstream: HashMap<(String, String), Vec<(String, String)>>,
}

impl HandleGraph {
  /// Build the graph from every edge whose endpoints both exist.
  pub fn new(def: &WorkflowDef) -> Self {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut upstream: HashMap<(String, String), Vec<(String, String)>> = HashMap::new();

    for node in &def.nodes {
      adjacency.entry(node.node_id.clone()).or_default();
    }

    for edge in &def.edges {
      if !adjacency.contains_key(&edge.source) || !adjacency.contains_key(&edge.target) {
        continue;
      }
      adjacency
        .entry(edge.source.clone())
        .or_default()
        .push(edge.target.clone());
      upstream
        .entry((edge.target.clone(), edge.target_handle.clone()))
        .or_default()
        .push((edge.source.clone(), edge.source_handle.clone()));
    }

    Self {
      adjacency,
      upstream,
    }
  }

  pub fn downstream(&self, node_id: &str) -> &[String] {
    self
      .adjacency
      .get(node_id)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Sources wired into one input handle.
  pub fn upstream(&self, node_id: &str, handle: &str) -> &[(String, String)] {
    self
      .upstream
      .get(&(node_id.to_string(), handle.to_string()))
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Find an edge cycle using DFS, returning a node on the cycle.
  pub fn detect_cycle(&self) -> Option<String> {
    // 0 = unvisited, 1 = in progress, 2 = done
    let mut color: HashMap<&str, u8> = self.adjacency.keys().map(|id| (id.as_str(), 0u8)).collect();

    fn dfs<'a>(
      node: &'a str,
      adjacency: &'a HashMap<String, Vec<String>>,
      color: &mut HashMap<&'a str, u8>,
    ) -> Option<&'a str> {
      color.insert(node, 1);

      if let Some(neighbors) = adjacency.get(node) {
        for neighbor in neighbors {
          match color.get(neighbor.as_str()) {
            Some(1) => return Some(neighbor.as_str()),
            Some(0) => {
              if let Some(found) = dfs(neighbor, adjacency, color) {
                return Some(found);
              }
            }
            _ => {}
          }
        }
      }

      color.insert(node, 2);
      None
    }

    let mut roots: Vec<&str> = self.adjacency.keys().map(|id| id.as_str()).collect();
    roots.sort_unstable();
    for node_id in roots {
      if color.get(node_id) == Some(&0) {
        if let Some(found) = dfs(node_id, &self.adjacency, &mut color) {
          return Some(found.to_string());
        }
      }
    }

    None
  }
}
