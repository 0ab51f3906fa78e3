use crate::core::{Cluster, Error, HashFunction, NodeAddress, NodeRef, Result, WyHashFunction};
use crate::partition::PartitionTable;
use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Maps a bucket, or a bucket and key, to a node inside one cluster.
///
/// Implementations are plain data structures: the [`Router`](crate::router::Router) owning them
/// serializes writers and lets readers through concurrently.
pub trait ClusterPartitioner: Send + Sync {
  /// The most nodes a cluster may hold, `None` if unbounded.
  fn max_partitions(&self) -> Option<usize>;

  fn add_node(&mut self, cluster: &Cluster, node: NodeRef) -> Result<()>;

  fn remove_node(&mut self, cluster: &Cluster, node: &NodeRef) -> Result<()>;

  /// Empty if the cluster is unknown.
  fn nodes_for(&self, cluster: &Cluster) -> BTreeSet<NodeRef>;

  fn node_for_bucket(&self, cluster: &Cluster, bucket: &str) -> Option<NodeRef>;

  fn node_for_key(&self, cluster: &Cluster, bucket: &str, key: &str) -> Option<NodeRef>;

  /// Forgets every node of every cluster.
  fn cleanup(&mut self);
}

/// One [`PartitionTable`] per cluster, created on first use.
pub struct HashClusterPartitioner {
  max_partitions: NonZeroUsize,
  hash: Arc<dyn HashFunction>,
  tables: HashMap<Cluster, PartitionTable>,
}
impl HashClusterPartitioner {
  pub fn new(max_partitions: NonZeroUsize) -> HashClusterPartitioner {
    Self::with_hash(max_partitions, Arc::new(WyHashFunction))
  }

  pub fn with_hash(
    max_partitions: NonZeroUsize,
    hash: Arc<dyn HashFunction>,
  ) -> HashClusterPartitioner {
    HashClusterPartitioner {
      max_partitions: max_partitions,
      hash: hash,
      tables: HashMap::new(),
    }
  }

  pub fn table(&self, cluster: &Cluster) -> Option<&PartitionTable> {
    self.tables.get(cluster)
  }
}
impl ClusterPartitioner for HashClusterPartitioner {
  fn max_partitions(&self) -> Option<usize> {
    Some(self.max_partitions.get())
  }

  fn add_node(&mut self, cluster: &Cluster, node: NodeRef) -> Result<()> {
    let (max, hash) = (self.max_partitions, &self.hash);
    self
      .tables
      .entry(cluster.clone())
      .or_insert_with(|| PartitionTable::new(cluster.name(), max, hash.clone()))
      .add_node(node)
  }

  fn remove_node(&mut self, cluster: &Cluster, node: &NodeRef) -> Result<()> {
    match self.tables.get_mut(cluster) {
      Some(table) => table.remove_node(node),
      None => Err(Error::UnknownNode {
        cluster: cluster.name().to_string(),
        node: node.name().to_string(),
      }),
    }
  }

  fn nodes_for(&self, cluster: &Cluster) -> BTreeSet<NodeRef> {
    self
      .tables
      .get(cluster)
      .map(PartitionTable::nodes)
      .unwrap_or_default()
  }

  fn node_for_bucket(&self, cluster: &Cluster, bucket: &str) -> Option<NodeRef> {
    self.tables.get(cluster)?.node_for_bucket(bucket)
  }

  fn node_for_key(&self, cluster: &Cluster, bucket: &str, key: &str) -> Option<NodeRef> {
    self.tables.get(cluster)?.node_for_key(bucket, key)
  }

  fn cleanup(&mut self) {
    self.tables.values_mut().for_each(PartitionTable::cleanup);
  }
}

/// User-supplied placement: given a cluster name and a bucket (and key), returns the address of
/// the node that should serve it.
pub trait ClusterPartitionerStrategy: Send + Sync {
  fn node_for_bucket(&self, cluster: &str, bucket: &str) -> Option<NodeAddress>;

  fn node_for_key(&self, cluster: &str, bucket: &str, key: &str) -> Option<NodeAddress>;
}

/// Delegates placement to a [`ClusterPartitionerStrategy`] and resolves the returned address
/// against the nodes currently registered for that cluster.
pub struct CustomClusterPartitioner {
  strategy: Arc<dyn ClusterPartitionerStrategy>,
  registry: HashMap<(Cluster, NodeAddress), NodeRef>,
  nodes: HashMap<Cluster, BTreeSet<NodeRef>>,
}
impl CustomClusterPartitioner {
  pub fn new(strategy: Arc<dyn ClusterPartitionerStrategy>) -> CustomClusterPartitioner {
    CustomClusterPartitioner {
      strategy: strategy,
      registry: HashMap::new(),
      nodes: HashMap::new(),
    }
  }

  fn resolve(&self, cluster: &Cluster, address: Option<NodeAddress>) -> Option<NodeRef> {
    address.and_then(|a| self.registry.get(&(cluster.clone(), a)).cloned())
  }
}
impl ClusterPartitioner for CustomClusterPartitioner {
  fn max_partitions(&self) -> Option<usize> {
    None
  }

  fn add_node(&mut self, cluster: &Cluster, node: NodeRef) -> Result<()> {
    let key = (cluster.clone(), node.address());
    let nodes = self.nodes.entry(cluster.clone()).or_default();
    if nodes.contains(&node) || self.registry.contains_key(&key) {
      return Err(Error::DuplicateNode {
        cluster: cluster.name().to_string(),
        node: node.name().to_string(),
      });
    }
    nodes.insert(node.clone());
    self.registry.insert(key, node);
    Ok(())
  }

  fn remove_node(&mut self, cluster: &Cluster, node: &NodeRef) -> Result<()> {
    let removed = self
      .nodes
      .get_mut(cluster)
      .and_then(|nodes| nodes.take(node));
    match removed {
      Some(stored) => {
        self.registry.remove(&(cluster.clone(), stored.address()));
        Ok(())
      }
      None => Err(Error::UnknownNode {
        cluster: cluster.name().to_string(),
        node: node.name().to_string(),
      }),
    }
  }

  fn nodes_for(&self, cluster: &Cluster) -> BTreeSet<NodeRef> {
    self.nodes.get(cluster).cloned().unwrap_or_default()
  }

  fn node_for_bucket(&self, cluster: &Cluster, bucket: &str) -> Option<NodeRef> {
    self.resolve(cluster, self.strategy.node_for_bucket(cluster.name(), bucket))
  }

  fn node_for_key(&self, cluster: &Cluster, bucket: &str, key: &str) -> Option<NodeRef> {
    self.resolve(cluster, self.strategy.node_for_key(cluster.name(), bucket, key))
  }

  fn cleanup(&mut self) {
    self.registry.clear();
    self.nodes.values_mut().for_each(BTreeSet::clear);
  }
}

#[cfg(test)]
use crate::testkit::{static_node, static_node_at};

#[cfg(test)]
struct ByBucketPrefix;
#[cfg(test)]
impl ClusterPartitionerStrategy for ByBucketPrefix {
  fn node_for_bucket(&self, _: &str, bucket: &str) -> Option<NodeAddress> {
    if bucket.starts_with("hot") {
      Some(NodeAddress::new("hot-host", 6000))
    } else if bucket.starts_with("cold") {
      Some(NodeAddress::new("cold-host", 6000))
    } else {
      None
    }
  }

  fn node_for_key(&self, cluster: &str, bucket: &str, _: &str) -> Option<NodeAddress> {
    self.node_for_bucket(cluster, bucket)
  }
}

#[test]
fn test_hash_partitioner_per_cluster() {
  let mut partitioner = HashClusterPartitioner::new(NonZeroUsize::new(8).unwrap());
  let europe = Cluster::remote("europe");
  let america = Cluster::remote("america");
  partitioner.add_node(&europe, static_node("node1")).unwrap();
  partitioner.add_node(&america, static_node("node1")).unwrap();
  partitioner.add_node(&america, static_node("node2")).unwrap();
  assert_eq!(partitioner.nodes_for(&europe).len(), 1);
  assert_eq!(partitioner.nodes_for(&america).len(), 2);
  assert!(partitioner.nodes_for(&Cluster::remote("asia")).is_empty());
  assert_eq!(partitioner.node_for_bucket(&Cluster::remote("asia"), "bucket"), None);
  assert_eq!(
    partitioner.node_for_key(&europe, "bucket", "key"),
    Some(static_node("node1"))
  );
  assert_eq!(partitioner.max_partitions(), Some(8));
  assert!(matches!(
    partitioner.remove_node(&Cluster::remote("asia"), &static_node("node1")),
    Err(Error::UnknownNode { .. })
  ));
  partitioner.cleanup();
  assert!(partitioner.nodes_for(&america).is_empty());
  assert_eq!(partitioner.node_for_bucket(&america, "bucket"), None);
}

#[test]
fn test_custom_partitioner() {
  let mut partitioner = CustomClusterPartitioner::new(Arc::new(ByBucketPrefix));
  let europe = Cluster::remote("europe");
  let hot = static_node_at("hot", "hot-host", 6000);
  partitioner.add_node(&europe, hot.clone()).unwrap();
  assert_eq!(partitioner.max_partitions(), None);
  assert_eq!(partitioner.node_for_bucket(&europe, "hot-items"), Some(hot.clone()));
  assert_eq!(partitioner.node_for_key(&europe, "hot-items", "k"), Some(hot.clone()));
  assert_eq!(partitioner.node_for_bucket(&europe, "cold-items"), None);
  assert_eq!(partitioner.node_for_bucket(&europe, "other"), None);
  assert_eq!(partitioner.node_for_bucket(&Cluster::remote("asia"), "hot-items"), None);
  assert!(matches!(
    partitioner.add_node(&europe, hot.clone()),
    Err(Error::DuplicateNode { .. })
  ));
  partitioner.remove_node(&europe, &hot).unwrap();
  assert_eq!(partitioner.node_for_bucket(&europe, "hot-items"), None);
  assert!(matches!(
    partitioner.remove_node(&europe, &hot),
    Err(Error::UnknownNode { .. })
  ));
}
