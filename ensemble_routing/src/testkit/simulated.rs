use crate::core::{
  Command, Error, Node, NodeAddress, NodeFactory, NodeRef, Reply, Result, View,
};
use crate::testkit::{FailureConfig, FailureConfigMap};
use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Default)]
struct Registry {
  views: BTreeMap<String, View>,
  down: HashSet<NodeAddress>,
  failures: FailureConfigMap,
  connects: HashMap<String, usize>,
  disconnects: HashMap<String, usize>,
  requests: HashMap<NodeAddress, usize>,
}
impl Registry {
  fn served_at(&self, address: &NodeAddress) -> Option<&View> {
    self
      .views
      .values()
      .find(|v| v.members().iter().any(|m| m.address() == *address))
  }

  fn reachable(&self, address: &NodeAddress) -> bool {
    !self.down.contains(address) && rand::random::<f64>() >= self.failures.get(address).drop_prob
  }
}

/// Remote clusters living in memory. A node at some address answers membership requests with the
/// published view of the cluster it is a member of. Addresses that are members of no published
/// view are unreachable.
#[derive(Clone, Default)]
pub struct SimulatedEnsemble {
  registry: Arc<Mutex<Registry>>,
}
impl SimulatedEnsemble {
  pub fn new() -> SimulatedEnsemble {
    SimulatedEnsemble::default()
  }

  /// Replaces the membership of `view`'s cluster.
  pub async fn publish(&self, view: View) {
    let mut registry = self.registry.lock().await;
    registry.views.insert(view.cluster().to_string(), view);
  }

  pub async fn take_down(&self, address: &NodeAddress) {
    self.registry.lock().await.down.insert(address.clone());
  }

  pub async fn bring_up(&self, address: &NodeAddress) {
    self.registry.lock().await.down.remove(address);
  }

  pub async fn set_failures(&self, failures: FailureConfigMap) {
    self.registry.lock().await.failures = failures;
  }

  pub async fn connects(&self, name: &str) -> usize {
    let registry = self.registry.lock().await;
    registry.connects.get(name).copied().unwrap_or(0)
  }

  pub async fn disconnects(&self, name: &str) -> usize {
    let registry = self.registry.lock().await;
    registry.disconnects.get(name).copied().unwrap_or(0)
  }

  /// Membership requests that got through to the node at `address`.
  pub async fn requests(&self, address: &NodeAddress) -> usize {
    let registry = self.registry.lock().await;
    registry.requests.get(address).copied().unwrap_or(0)
  }

  /// Names of the nodes connected more often than disconnected, sorted.
  pub async fn still_connected(&self) -> Vec<String> {
    let registry = self.registry.lock().await;
    let mut names = registry
      .connects
      .iter()
      .filter(|(name, connects)| **connects > registry.disconnects.get(*name).copied().unwrap_or(0))
      .map(|(name, _)| name.clone())
      .collect::<Vec<_>>();
    names.sort();
    names
  }

  pub fn factory(&self) -> Arc<dyn NodeFactory> {
    Arc::new(SimulatedNodeFactory {
      ensemble: self.clone(),
    })
  }
}

/// A handle on one address of a [`SimulatedEnsemble`].
pub struct SimulatedNode {
  name: String,
  address: NodeAddress,
  ensemble: SimulatedEnsemble,
}
impl SimulatedNode {
  fn unreachable(&self) -> Error {
    Error::Communication {
      node: self.name.clone(),
      reason: format!("{} is unreachable", self.address),
    }
  }

  async fn failure_config(&self) -> FailureConfig {
    *self.ensemble.registry.lock().await.failures.get(&self.address)
  }
}
#[async_trait]
impl Node for SimulatedNode {
  fn name(&self) -> &str {
    self.name.as_str()
  }

  fn host(&self) -> &str {
    self.address.host.as_str()
  }

  fn port(&self) -> u16 {
    self.address.port
  }

  async fn connect(&self) -> Result<()> {
    let mut registry = self.ensemble.registry.lock().await;
    if !registry.reachable(&self.address) {
      return Err(self.unreachable());
    }
    *registry.connects.entry(self.name.clone()).or_insert(0) += 1;
    Ok(())
  }

  async fn disconnect(&self) {
    let mut registry = self.ensemble.registry.lock().await;
    *registry.disconnects.entry(self.name.clone()).or_insert(0) += 1;
  }

  async fn send(&self, command: Command) -> Result<Reply> {
    if let Some((min, max)) = self.failure_config().await.delay {
      let range = min.as_millis()..=max.as_millis();
      sleep(Duration::from_millis(
        SmallRng::from_entropy().gen_range(range) as u64,
      ))
      .await;
    }
    let mut registry = self.ensemble.registry.lock().await;
    if !registry.reachable(&self.address) {
      return Err(self.unreachable());
    }
    *registry.requests.entry(self.address.clone()).or_insert(0) += 1;
    match command {
      Command::Membership => registry
        .served_at(&self.address)
        .cloned()
        .map(Reply::View)
        .ok_or_else(|| self.unreachable()),
    }
  }
}

pub struct SimulatedNodeFactory {
  ensemble: SimulatedEnsemble,
}
impl NodeFactory for SimulatedNodeFactory {
  fn make_remote_node(&self, name: &str, host: &str, port: u16) -> NodeRef {
    NodeRef::new(SimulatedNode {
      name: name.to_string(),
      address: NodeAddress::new(host, port),
      ensemble: self.ensemble.clone(),
    })
  }
}

#[cfg(test)]
use crate::core::Member;

#[tokio::test]
async fn test_simulated_node() {
  let ensemble = SimulatedEnsemble::new();
  ensemble
    .publish(View::new("asia", vec![Member::new("a1", "10.0.0.1", 6000)]))
    .await;
  let factory = ensemble.factory();
  let a1 = factory.make_remote_node("a1", "10.0.0.1", 6000);
  let stranger = factory.make_remote_node("x", "10.0.0.9", 6000);

  a1.connect().await.unwrap();
  let Reply::View(view) = a1.send(Command::Membership).await.unwrap();
  assert_eq!(view.cluster(), "asia");
  assert!(matches!(
    stranger.send(Command::Membership).await,
    Err(Error::Communication { .. })
  ));

  ensemble.take_down(&a1.address()).await;
  assert!(a1.connect().await.is_err());
  assert!(a1.send(Command::Membership).await.is_err());
  ensemble.bring_up(&a1.address()).await;
  assert!(a1.send(Command::Membership).await.is_ok());

  assert_eq!(ensemble.connects("a1").await, 1);
  assert_eq!(ensemble.requests(&a1.address()).await, 2);
  assert_eq!(ensemble.still_connected().await, vec!["a1".to_string()]);
  a1.disconnect().await;
  assert!(ensemble.still_connected().await.is_empty());
}
