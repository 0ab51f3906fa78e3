use crate::core::{Cluster, Error, NodeRef, Result};
use crate::partition::{
  ClusterPartitioner, EnsemblePartitioner, HashClusterPartitioner, HashEnsemblePartitioner,
};
use crate::router::Router;
use async_trait::async_trait;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

// Batches at least this large are resolved on the rayon pool.
const PARALLEL_BATCH: usize = 256;

struct Topology {
  clusters: BTreeSet<Cluster>,
  cluster_partitioner: Box<dyn ClusterPartitioner>,
  ensemble_partitioner: Box<dyn EnsemblePartitioner>,
  local_node: Option<NodeRef>,
}
impl Topology {
  fn registered(&self, cluster: &Cluster) -> Result<&Cluster> {
    self.clusters.get(cluster).ok_or_else(|| Error::UnknownCluster {
      cluster: cluster.name().to_string(),
    })
  }

  fn node_for(&self, bucket: &str, key: Option<&str>) -> Result<NodeRef> {
    let cluster = match key {
      Some(key) => self.ensemble_partitioner.cluster_for_key(bucket, key),
      None => self.ensemble_partitioner.cluster_for_bucket(bucket),
    }
    .map_err(|e| {
      warn!(bucket = bucket, error = %e, "ensemble partitioner gave an unusable answer");
      Error::MissingRoute
    })?
    .ok_or(Error::MissingRoute)?;
    let node = match key {
      Some(key) => self.cluster_partitioner.node_for_key(&cluster, bucket, key),
      None => self.cluster_partitioner.node_for_bucket(&cluster, bucket),
    };
    node.ok_or_else(|| {
      debug!(cluster = %cluster, bucket = bucket, "no node serves bucket");
      Error::MissingRoute
    })
  }

  fn resolve_key(&self, bucket: &str, key: &String) -> Result<(NodeRef, String)> {
    self
      .node_for(bucket, Some(key.as_str()))
      .map(|node| (node, key.clone()))
  }

  fn cluster_route(&self, cluster: &Cluster) -> BTreeSet<NodeRef> {
    let local = self
      .clusters
      .get(cluster)
      .map(Cluster::is_local)
      .unwrap_or_else(|| cluster.is_local());
    let mut nodes = self.cluster_partitioner.nodes_for(cluster);
    if local {
      nodes.extend(self.local_node.iter().cloned());
    }
    nodes
  }
}

/// The [`Router`] backed by an [`EnsemblePartitioner`] and a [`ClusterPartitioner`].
///
/// The whole topology sits behind one reader-writer lock. Lookups share it; route mutations, which
/// rebuild partition tables, take it exclusively. Nothing inside the lock does I/O.
///
/// Large key batches are resolved by rayon from tokio's blocking pool,
/// holding a read guard for the whole batch. Writers wait for the batch to finish.
pub struct DefaultRouter {
  topology: Arc<RwLock<Topology>>,
}
impl DefaultRouter {
  pub fn new(
    cluster_partitioner: Box<dyn ClusterPartitioner>,
    ensemble_partitioner: Box<dyn EnsemblePartitioner>,
  ) -> DefaultRouter {
    DefaultRouter {
      topology: Arc::new(RwLock::new(Topology {
        clusters: BTreeSet::new(),
        cluster_partitioner: cluster_partitioner,
        ensemble_partitioner: ensemble_partitioner,
        local_node: None,
      })),
    }
  }

  /// Hash based partitioning at both levels.
  pub fn hashed(max_partitions: NonZeroUsize) -> DefaultRouter {
    Self::new(
      Box::new(HashClusterPartitioner::new(max_partitions)),
      Box::new(HashEnsemblePartitioner::new()),
    )
  }

  pub async fn max_partitions(&self) -> Option<usize> {
    self.topology.read().await.cluster_partitioner.max_partitions()
  }
}
#[async_trait]
impl Router for DefaultRouter {
  async fn setup_clusters(&self, clusters: BTreeSet<Cluster>) {
    let mut topology = self.topology.write().await;
    for cluster in clusters {
      if !topology.clusters.contains(&cluster) {
        debug!(cluster = %cluster, local = cluster.is_local(), "registering cluster");
        topology.clusters.insert(cluster);
      }
    }
    let Topology {
      clusters,
      ensemble_partitioner,
      ..
    } = &mut *topology;
    ensemble_partitioner.setup_clusters(clusters);
  }

  async fn clusters(&self) -> BTreeSet<Cluster> {
    self.topology.read().await.clusters.clone()
  }

  async fn add_route_to_local_node(&self, node: NodeRef) {
    debug!(node = %node, "routing local node");
    self.topology.write().await.local_node = Some(node);
  }

  async fn route_to_local_node(&self) -> Result<NodeRef> {
    self
      .topology
      .read()
      .await
      .local_node
      .clone()
      .ok_or(Error::MissingRoute)
  }

  async fn add_route_to(&self, cluster: &Cluster, node: NodeRef) -> Result<()> {
    let mut topology = self.topology.write().await;
    let cluster = topology.registered(cluster)?.clone();
    debug!(cluster = %cluster, node = %node, "adding route");
    topology.cluster_partitioner.add_node(&cluster, node)
  }

  async fn remove_route_to(&self, cluster: &Cluster, node: &NodeRef) -> Result<()> {
    let mut topology = self.topology.write().await;
    let cluster = topology.registered(cluster)?.clone();
    debug!(cluster = %cluster, node = %node, "removing route");
    topology.cluster_partitioner.remove_node(&cluster, node)
  }

  async fn route_to_node_for_bucket(&self, bucket: &str) -> Result<NodeRef> {
    self.topology.read().await.node_for(bucket, None)
  }

  async fn route_to_node_for_key(&self, bucket: &str, key: &str) -> Result<NodeRef> {
    self.topology.read().await.node_for(bucket, Some(key))
  }

  async fn route_to_nodes_for(
    &self,
    bucket: &str,
    keys: &[String],
  ) -> Result<BTreeMap<NodeRef, BTreeSet<String>>> {
    let resolved = if keys.len() >= PARALLEL_BATCH {
      let topology = self.topology.clone().read_owned().await;
      let keys = keys.to_vec();
      let batch = tokio::task::spawn_blocking({
        let bucket = bucket.to_string();
        move || {
          keys
            .par_iter()
            .map(|key| topology.resolve_key(&bucket, key))
            .collect::<Result<Vec<_>>>()
        }
      });
      match batch.await {
        Ok(resolved) => resolved?,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => {
          warn!(bucket = bucket, error = %e, "key batch was cancelled");
          return Err(Error::MissingRoute);
        }
      }
    } else {
      let topology = self.topology.read().await;
      keys
        .iter()
        .map(|key| topology.resolve_key(bucket, key))
        .collect::<Result<Vec<_>>>()?
    };
    let mut grouped = BTreeMap::new();
    for (node, key) in resolved {
      grouped
        .entry(node)
        .or_insert_with(BTreeSet::new)
        .insert(key);
    }
    Ok(grouped)
  }

  async fn cluster_route(&self, cluster: &Cluster) -> BTreeSet<NodeRef> {
    self.topology.read().await.cluster_route(cluster)
  }

  async fn broadcast_route(&self) -> BTreeMap<Cluster, BTreeSet<NodeRef>> {
    let topology = self.topology.read().await;
    topology
      .clusters
      .iter()
      .map(|cluster| (cluster.clone(), topology.cluster_route(cluster)))
      .collect()
  }

  async fn cleanup(&self) {
    debug!("dropping every route");
    self.topology.write().await.cluster_partitioner.cleanup();
  }
}
