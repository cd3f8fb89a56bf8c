use std::fmt;

use serde::{Deserialize, Serialize};

/// Loop indices identifying which iteration slot an instance belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NestLayout(Vec<usize>);

impl NestLayout {
  pub fn root() -> Self {
    Self(Vec::new())
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn get(&self, level: usize) -> Option<usize> {
    self.0.get(level).copied()
  }

  /// Layout one level deeper.
  pub fn child(&self, index: usize) -> Self {
    let mut indices = self.0.clone();
    indices.push(index);
    Self(indices)
  }

  /// The first `depth` indices.
  pub fn prefix(&self, depth: usize) -> Self {
    Self(self.0[..depth.min(self.0.len())].to_vec())
  }

  pub fn indices(&self) -> &[usize] {
    &self.0
  }
}

impl From<Vec<usize>> for NestLayout {
  fn from(indices: Vec<usize>) -> Self {
    Self(indices)
  }
}

/// Identity of a node instance: its template plus its nest layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey {
  pub template_id: String,
  pub layout: NestLayout,
}

impl InstanceKey {
  pub fn new(template_id: impl Into<String>, layout: NestLayout) -> Self {
    Self {
      template_id: template_id.into(),
      layout,
    }
  }

  pub fn root(template_id: impl Into<String>) -> Self {
    Self::new(template_id, NestLayout::root())
  }
}

/// Renders as `template#0#1`, the id observers see.
impl fmt::Display for InstanceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.template_id)?;
    for index in self.layout.indices() {
      write!(f, "#{}", index)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_instance_key_display() {
    assert_eq!(InstanceKey::root("a").to_string(), "a");
    let key = InstanceKey::new("body", NestLayout::root().child(2).child(0));
    assert_eq!(key.to_string(), "body#2#0");
  }

  #[test]
  fn test_prefix_is_clamped() {
    let layout = NestLayout::from(vec![3, 1]);
    assert_eq!(layout.prefix(1), NestLayout::from(vec![3]));
    assert_eq!(layout.prefix(5), layout);
    assert_eq!(layout.get(1), Some(1));
    assert_eq!(layout.get(2), None);
  }
}
