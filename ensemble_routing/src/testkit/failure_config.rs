use crate::core::NodeAddress;
use im::HashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How unreliable a simulated node is.
#[derive(Default, Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct FailureConfig {
  /// Probability that a connect or a command fails as if the node were unreachable.
  pub drop_prob: f64,
  /// Commands are answered after a random delay in this range.
  pub delay: Option<(Duration, Duration)>,
}
impl FailureConfig {
  pub fn unreachable() -> FailureConfig {
    FailureConfig {
      drop_prob: 1.0,
      delay: None,
    }
  }
}

#[derive(Clone, Default, Serialize, Deserialize, Debug)]
pub struct FailureConfigMap {
  pub cluster_wide: FailureConfig,
  pub node_wide: HashMap<NodeAddress, FailureConfig>,
}
impl FailureConfigMap {
  pub fn get(&self, address: &NodeAddress) -> &FailureConfig {
    self.node_wide.get(address).unwrap_or(&self.cluster_wide)
  }
}

#[test]
fn test_node_wide_overrides_cluster_wide() {
  let slow = FailureConfig {
    drop_prob: 0.0,
    delay: Some((Duration::from_millis(10), Duration::from_millis(20))),
  };
  let mut map = FailureConfigMap::default();
  map.cluster_wide = slow;
  map
    .node_wide
    .insert(NodeAddress::new("10.0.0.1", 6000), FailureConfig::unreachable());
  assert_eq!(map.get(&NodeAddress::new("10.0.0.1", 6000)).drop_prob, 1.0);
  assert_eq!(map.get(&NodeAddress::new("10.0.0.2", 6000)), &slow);
}
