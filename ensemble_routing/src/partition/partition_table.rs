use crate::core::{Error, HashFunction, NodeRef, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::ops::Range;
use std::sync::Arc;

/// Fixed-size ring of partitions for the nodes of one cluster.
///
/// Every topology change rebuilds the whole ring: nodes are visited in name order and each takes
/// `max_partitions / nodes` contiguous slots, the last one also taking the remainder. Two
/// processes holding the same node names therefore compute the same ring, whatever order the nodes
/// were added in. The price is that a single join or leave moves more partitions than a
/// minimal-disruption ring would.
pub struct PartitionTable {
  cluster: String,
  max_partitions: usize,
  hash: Arc<dyn HashFunction>,
  pub(in crate::partition) ring: Vec<Option<NodeRef>>,
  nodes: BTreeSet<NodeRef>,
  partitions: BTreeMap<NodeRef, Range<usize>>,
}
impl PartitionTable {
  pub fn new<S: Into<String>>(
    cluster: S,
    max_partitions: NonZeroUsize,
    hash: Arc<dyn HashFunction>,
  ) -> PartitionTable {
    PartitionTable {
      cluster: cluster.into(),
      max_partitions: max_partitions.get(),
      hash: hash,
      ring: vec![None; max_partitions.get()],
      nodes: BTreeSet::new(),
      partitions: BTreeMap::new(),
    }
  }

  pub fn max_partitions(&self) -> usize {
    self.max_partitions
  }

  pub fn add_node(&mut self, node: NodeRef) -> Result<()> {
    if self.nodes.len() == self.max_partitions {
      return Err(Error::PartitionsLimitReached {
        max_partitions: self.max_partitions,
      });
    }
    if self.nodes.contains(&node) {
      return Err(Error::DuplicateNode {
        cluster: self.cluster.clone(),
        node: node.name().to_string(),
      });
    }
    self.nodes.insert(node);
    self.rebuild();
    Ok(())
  }

  pub fn remove_node(&mut self, node: &NodeRef) -> Result<()> {
    if !self.nodes.remove(node) {
      return Err(Error::UnknownNode {
        cluster: self.cluster.clone(),
        node: node.name().to_string(),
      });
    }
    self.rebuild();
    Ok(())
  }

  pub fn node_for_bucket(&self, bucket: &str) -> Option<NodeRef> {
    self.lookup(bucket)
  }

  pub fn node_for_key(&self, bucket: &str, key: &str) -> Option<NodeRef> {
    self.lookup(format!("{}{}", bucket, key).as_str())
  }

  pub fn nodes(&self) -> BTreeSet<NodeRef> {
    self.nodes.clone()
  }

  pub fn contains(&self, node: &NodeRef) -> bool {
    self.nodes.contains(node)
  }

  /// The ring slots owned by `node`, empty if it is not part of this table.
  pub fn partitions_of(&self, node: &NodeRef) -> Vec<usize> {
    self
      .partitions
      .get(node)
      .map(|range| range.clone().collect())
      .unwrap_or_default()
  }

  pub fn cleanup(&mut self) {
    self.nodes.clear();
    self.rebuild();
  }

  fn lookup(&self, to_hash: &str) -> Option<NodeRef> {
    let partition = self.hash.hash(to_hash, self.max_partitions);
    self.ring.get(partition).cloned().flatten()
  }

  fn rebuild(&mut self) {
    self.ring.iter_mut().for_each(|slot| *slot = None);
    self.partitions.clear();
    let count = self.nodes.len();
    if count == 0 {
      return;
    }
    let optimal_size = self.max_partitions / count;
    let mut start = 0;
    for (i, node) in self.nodes.iter().enumerate() {
      let end = if i == count - 1 {
        self.max_partitions
      } else {
        start + optimal_size
      };
      for slot in &mut self.ring[start..end] {
        *slot = Some(node.clone());
      }
      self.partitions.insert(node.clone(), start..end);
      start = end;
    }
  }
}

#[cfg(test)]
use crate::core::WyHashFunction;
#[cfg(test)]
use crate::testkit::{static_node, ScriptedHash};

#[cfg(test)]
fn partitions(count: usize) -> NonZeroUsize {
  NonZeroUsize::new(count).unwrap()
}

#[cfg(test)]
fn bucket_hash() -> Arc<dyn HashFunction> {
  Arc::new(ScriptedHash::new(
    (1..=5).map(|i| (format!("bucket{}", i), i - 1)),
  ))
}

#[test]
fn test_single_node_routing() {
  let mut table = PartitionTable::new("cluster", partitions(5), bucket_hash());
  let node1 = static_node("node1");
  table.add_node(node1.clone()).unwrap();
  for i in 1..=5 {
    assert_eq!(table.node_for_bucket(&format!("bucket{}", i)), Some(node1.clone()));
  }
  assert_eq!(table.partitions_of(&node1), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_single_partition() {
  let mut table = PartitionTable::new("cluster", partitions(1), bucket_hash());
  let node1 = static_node("node1");
  table.add_node(node1.clone()).unwrap();
  assert_eq!(table.partitions_of(&node1), vec![0]);
  for i in 1..=5 {
    assert_eq!(table.node_for_bucket(&format!("bucket{}", i)), Some(node1.clone()));
  }
  assert!(matches!(
    table.add_node(static_node("node2")),
    Err(Error::PartitionsLimitReached { max_partitions: 1 })
  ));
}

#[test]
fn test_two_node_split() {
  let mut table = PartitionTable::new("cluster", partitions(5), bucket_hash());
  let node1 = static_node("node1");
  let node2 = static_node("node2");
  table.add_node(node2.clone()).unwrap();
  table.add_node(node1.clone()).unwrap();
  assert_eq!(table.partitions_of(&node1), vec![0, 1]);
  assert_eq!(table.partitions_of(&node2), vec![2, 3, 4]);
  assert_eq!(table.node_for_bucket("bucket1"), Some(node1.clone()));
  assert_eq!(table.node_for_bucket("bucket2"), Some(node1));
  for i in 3..=5 {
    assert_eq!(table.node_for_bucket(&format!("bucket{}", i)), Some(node2.clone()));
  }
}

#[test]
fn test_limits() {
  let mut table = PartitionTable::new("cluster", partitions(5), Arc::new(WyHashFunction));
  for i in 1..=5 {
    table.add_node(static_node(&format!("node{}", i))).unwrap();
  }
  assert!(matches!(
    table.add_node(static_node("node6")),
    Err(Error::PartitionsLimitReached { max_partitions: 5 })
  ));
  table.remove_node(&static_node("node5")).unwrap();
  assert!(matches!(
    table.add_node(static_node("node1")),
    Err(Error::DuplicateNode { .. })
  ));
  assert!(matches!(
    table.remove_node(&static_node("node5")),
    Err(Error::UnknownNode { .. })
  ));
}

#[test]
fn test_deterministic_rebuild() {
  let names = ["delta", "alpha", "echo", "charlie", "bravo"];
  let mut forward = PartitionTable::new("cluster", partitions(64), Arc::new(WyHashFunction));
  let mut backward = PartitionTable::new("cluster", partitions(64), Arc::new(WyHashFunction));
  for name in names.iter() {
    forward.add_node(static_node(name)).unwrap();
  }
  for name in names.iter().rev() {
    backward.add_node(static_node(name)).unwrap();
  }
  for name in names.iter() {
    let node = static_node(name);
    assert_eq!(forward.partitions_of(&node), backward.partitions_of(&node));
  }
  for i in 0..100 {
    let bucket = format!("bucket{}", i);
    assert_eq!(forward.node_for_bucket(&bucket), backward.node_for_bucket(&bucket));
  }
}

#[test]
fn test_coverage_after_churn() {
  let max = 17;
  let mut table = PartitionTable::new("cluster", partitions(max), Arc::new(WyHashFunction));
  for i in 0..9 {
    table.add_node(static_node(&format!("node{}", i))).unwrap();
  }
  for i in (0..9).step_by(3) {
    table.remove_node(&static_node(&format!("node{}", i))).unwrap();
  }
  let nodes = table.nodes();
  assert_eq!(nodes.len(), 6);
  assert!(table.ring.iter().all(|slot| slot.is_some()));
  let optimal = max / nodes.len();
  let last = nodes.iter().last().unwrap().clone();
  for node in nodes.iter() {
    let owned = table.partitions_of(node).len();
    if *node == last {
      assert_eq!(owned, optimal + max % nodes.len());
    } else {
      assert_eq!(owned, optimal);
    }
  }
  let total: usize = nodes.iter().map(|n| table.partitions_of(n).len()).sum();
  assert_eq!(total, max);
}

#[test]
fn test_cleanup() {
  let mut table = PartitionTable::new("cluster", partitions(5), bucket_hash());
  table.add_node(static_node("node1")).unwrap();
  table.cleanup();
  assert!(table.nodes().is_empty());
  assert!(table.ring.iter().all(|slot| slot.is_none()));
  assert_eq!(table.node_for_bucket("bucket1"), None);
}
