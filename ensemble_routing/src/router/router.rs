use crate::core::{Cluster, NodeRef, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

/// Node-level routing over the whole ensemble, and the authoritative topology behind it.
///
/// Read operations only ever fail with [`Error::MissingRoute`](crate::core::Error::MissingRoute):
/// that is the uniform "data currently unreachable" signal for callers. An ensemble strategy that
/// names no configured cluster is logged at `warn` and reported the same way. Mutations fail on
/// topology defects: unknown cluster, duplicate or unknown node, partitions limit.
#[async_trait]
pub trait Router: Send + Sync {
  /// Registers clusters. Additive: clusters registered earlier are kept.
  async fn setup_clusters(&self, clusters: BTreeSet<Cluster>);

  async fn clusters(&self) -> BTreeSet<Cluster>;

  async fn add_route_to_local_node(&self, node: NodeRef);

  /// The node of this process, for commands that must run locally whatever the partitioning.
  async fn route_to_local_node(&self) -> Result<NodeRef>;

  async fn add_route_to(&self, cluster: &Cluster, node: NodeRef) -> Result<()>;

  async fn remove_route_to(&self, cluster: &Cluster, node: &NodeRef) -> Result<()>;

  async fn route_to_node_for_bucket(&self, bucket: &str) -> Result<NodeRef>;

  async fn route_to_node_for_key(&self, bucket: &str, key: &str) -> Result<NodeRef>;

  /// Resolves every key and groups the keys by the node serving them. Fails as a whole if any
  /// key has no route.
  async fn route_to_nodes_for(
    &self,
    bucket: &str,
    keys: &[String],
  ) -> Result<BTreeMap<NodeRef, BTreeSet<String>>>;

  /// Every node serving `cluster`. For the local cluster this always includes the local node.
  async fn cluster_route(&self, cluster: &Cluster) -> BTreeSet<NodeRef>;

  /// [`Router::cluster_route`] for every registered cluster.
  async fn broadcast_route(&self) -> BTreeMap<Cluster, BTreeSet<NodeRef>>;

  /// Drops every node of every cluster. Registered clusters and the local node are kept.
  async fn cleanup(&self);
}
