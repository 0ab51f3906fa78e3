use crate::core::{Cluster, NodeRef, Result};
use crate::router::Router;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;

/// A successful route mutation, with the name of the node concerned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteEvent {
  Added(Cluster, String),
  Removed(Cluster, String),
}

/// Wraps a [`Router`] and records every route it successfully added or removed, in order.
pub struct RecordingRouter<R: Router> {
  inner: R,
  events: Mutex<Vec<RouteEvent>>,
}
impl<R: Router> RecordingRouter<R> {
  pub fn new(inner: R) -> RecordingRouter<R> {
    RecordingRouter {
      inner: inner,
      events: Mutex::new(Vec::new()),
    }
  }

  pub fn inner(&self) -> &R {
    &self.inner
  }

  pub async fn events(&self) -> Vec<RouteEvent> {
    self.events.lock().await.clone()
  }

  /// Returns the events recorded so far and forgets them.
  pub async fn take_events(&self) -> Vec<RouteEvent> {
    std::mem::take(&mut *self.events.lock().await)
  }

  async fn record(&self, event: RouteEvent) {
    self.events.lock().await.push(event);
  }
}
#[async_trait]
impl<R: Router> Router for RecordingRouter<R> {
  async fn setup_clusters(&self, clusters: BTreeSet<Cluster>) {
    self.inner.setup_clusters(clusters).await
  }

  async fn clusters(&self) -> BTreeSet<Cluster> {
    self.inner.clusters().await
  }

  async fn add_route_to_local_node(&self, node: NodeRef) {
    self.inner.add_route_to_local_node(node).await
  }

  async fn route_to_local_node(&self) -> Result<NodeRef> {
    self.inner.route_to_local_node().await
  }

  async fn add_route_to(&self, cluster: &Cluster, node: NodeRef) -> Result<()> {
    let name = node.name().to_string();
    self.inner.add_route_to(cluster, node).await?;
    self
      .record(RouteEvent::Added(cluster.clone(), name))
      .await;
    Ok(())
  }

  async fn remove_route_to(&self, cluster: &Cluster, node: &NodeRef) -> Result<()> {
    self.inner.remove_route_to(cluster, node).await?;
    self
      .record(RouteEvent::Removed(cluster.clone(), node.name().to_string()))
      .await;
    Ok(())
  }

  async fn route_to_node_for_bucket(&self, bucket: &str) -> Result<NodeRef> {
    self.inner.route_to_node_for_bucket(bucket).await
  }

  async fn route_to_node_for_key(&self, bucket: &str, key: &str) -> Result<NodeRef> {
    self.inner.route_to_node_for_key(bucket, key).await
  }

  async fn route_to_nodes_for(
    &self,
    bucket: &str,
    keys: &[String],
  ) -> Result<BTreeMap<NodeRef, BTreeSet<String>>> {
    self.inner.route_to_nodes_for(bucket, keys).await
  }

  async fn cluster_route(&self, cluster: &Cluster) -> BTreeSet<NodeRef> {
    self.inner.cluster_route(cluster).await
  }

  async fn broadcast_route(&self) -> BTreeMap<Cluster, BTreeSet<NodeRef>> {
    self.inner.broadcast_route().await
  }

  async fn cleanup(&self) {
    self.inner.cleanup().await
  }
}
