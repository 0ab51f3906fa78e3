use crate::core::{Cluster, Error, HashFunction, Result, WyHashFunction};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Maps a bucket, or a bucket and key, to one of the clusters of the ensemble.
pub trait EnsemblePartitioner: Send + Sync {
  /// Replaces the set of clusters to choose from.
  fn setup_clusters(&mut self, clusters: &BTreeSet<Cluster>);

  /// `Ok(None)` when no cluster has been set up.
  fn cluster_for_bucket(&self, bucket: &str) -> Result<Option<Cluster>>;

  fn cluster_for_key(&self, bucket: &str, key: &str) -> Result<Option<Cluster>>;
}

/// Hashes into the name-sorted array of clusters.
pub struct HashEnsemblePartitioner {
  clusters: Vec<Cluster>,
  hash: Arc<dyn HashFunction>,
}
impl HashEnsemblePartitioner {
  pub fn new() -> HashEnsemblePartitioner {
    Self::with_hash(Arc::new(WyHashFunction))
  }

  pub fn with_hash(hash: Arc<dyn HashFunction>) -> HashEnsemblePartitioner {
    HashEnsemblePartitioner {
      clusters: Vec::new(),
      hash: hash,
    }
  }

  fn lookup(&self, to_hash: &str) -> Option<Cluster> {
    if self.clusters.is_empty() {
      return None;
    }
    let index = self.hash.hash(to_hash, self.clusters.len());
    self.clusters.get(index).cloned()
  }
}
impl Default for HashEnsemblePartitioner {
  fn default() -> Self {
    Self::new()
  }
}
impl EnsemblePartitioner for HashEnsemblePartitioner {
  fn setup_clusters(&mut self, clusters: &BTreeSet<Cluster>) {
    self.clusters = clusters.iter().cloned().collect();
  }

  fn cluster_for_bucket(&self, bucket: &str) -> Result<Option<Cluster>> {
    Ok(self.lookup(bucket))
  }

  fn cluster_for_key(&self, bucket: &str, key: &str) -> Result<Option<Cluster>> {
    Ok(self.lookup(format!("{}{}", bucket, key).as_str()))
  }
}

/// User-supplied placement of buckets (and keys) onto cluster names.
pub trait EnsemblePartitionerStrategy: Send + Sync {
  fn cluster_for_bucket(&self, bucket: &str) -> Option<String>;

  fn cluster_for_key(&self, bucket: &str, key: &str) -> Option<String>;
}

/// Delegates to an [`EnsemblePartitionerStrategy`]. A strategy answer naming no configured
/// cluster is an [`Error::InvalidPartition`].
pub struct CustomEnsemblePartitioner {
  strategy: Arc<dyn EnsemblePartitionerStrategy>,
  clusters: BTreeMap<String, Cluster>,
}
impl CustomEnsemblePartitioner {
  pub fn new(strategy: Arc<dyn EnsemblePartitionerStrategy>) -> CustomEnsemblePartitioner {
    CustomEnsemblePartitioner {
      strategy: strategy,
      clusters: BTreeMap::new(),
    }
  }

  fn resolve(&self, bucket: &str, partition: Option<String>) -> Result<Option<Cluster>> {
    match partition.as_ref().and_then(|name| self.clusters.get(name)) {
      Some(cluster) => Ok(Some(cluster.clone())),
      None => Err(Error::InvalidPartition {
        bucket: bucket.to_string(),
        partition: partition,
      }),
    }
  }
}
impl EnsemblePartitioner for CustomEnsemblePartitioner {
  fn setup_clusters(&mut self, clusters: &BTreeSet<Cluster>) {
    self.clusters = clusters
      .iter()
      .map(|c| (c.name().to_string(), c.clone()))
      .collect();
  }

  fn cluster_for_bucket(&self, bucket: &str) -> Result<Option<Cluster>> {
    self.resolve(bucket, self.strategy.cluster_for_bucket(bucket))
  }

  fn cluster_for_key(&self, bucket: &str, key: &str) -> Result<Option<Cluster>> {
    self.resolve(bucket, self.strategy.cluster_for_key(bucket, key))
  }
}

#[cfg(test)]
use crate::testkit::ScriptedHash;
#[cfg(test)]
use maplit::btreeset;

#[test]
fn test_hash_ensemble_partitioner() {
  let hash = ScriptedHash::new(vec![
    ("b0".to_string(), 0),
    ("b1".to_string(), 1),
    ("b2".to_string(), 2),
    ("b1k".to_string(), 0),
  ]);
  let mut partitioner = HashEnsemblePartitioner::with_hash(Arc::new(hash));
  assert_eq!(partitioner.cluster_for_bucket("b0").unwrap(), None);
  partitioner.setup_clusters(&btreeset! {
    Cluster::remote("europe"),
    Cluster::local("america"),
    Cluster::remote("asia"),
  });
  let cluster = |b: &str| partitioner.cluster_for_bucket(b).unwrap().unwrap();
  assert_eq!(cluster("b0"), Cluster::local("america"));
  assert!(cluster("b0").is_local());
  assert_eq!(cluster("b1"), Cluster::remote("asia"));
  assert_eq!(cluster("b2"), Cluster::remote("europe"));
  assert_eq!(
    partitioner.cluster_for_key("b1", "k").unwrap(),
    Some(Cluster::local("america"))
  );
}

#[cfg(test)]
struct Pinned;
#[cfg(test)]
impl EnsemblePartitionerStrategy for Pinned {
  fn cluster_for_bucket(&self, bucket: &str) -> Option<String> {
    match bucket {
      "orders" => Some("europe".to_string()),
      "ghost" => Some("mars".to_string()),
      _ => None,
    }
  }

  fn cluster_for_key(&self, bucket: &str, _: &str) -> Option<String> {
    self.cluster_for_bucket(bucket)
  }
}

#[test]
fn test_custom_ensemble_partitioner() {
  let mut partitioner = CustomEnsemblePartitioner::new(Arc::new(Pinned));
  partitioner.setup_clusters(&btreeset! { Cluster::remote("europe"), Cluster::local("asia") });
  assert_eq!(
    partitioner.cluster_for_key("orders", "1").unwrap(),
    Some(Cluster::remote("europe"))
  );
  match partitioner.cluster_for_bucket("ghost") {
    Err(Error::InvalidPartition { bucket, partition }) => {
      assert_eq!(bucket, "ghost");
      assert_eq!(partition, Some("mars".to_string()));
    }
    other => panic!("unexpected {:?}", other),
  }
  assert!(matches!(
    partitioner.cluster_for_bucket("unplaced"),
    Err(Error::InvalidPartition { partition: None, .. })
  ));
}
