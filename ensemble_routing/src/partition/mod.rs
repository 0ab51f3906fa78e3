//! Deterministic placement of buckets and keys, one level at a time.
//!
//! An [`EnsemblePartitioner`] picks the cluster, a [`ClusterPartitioner`] picks the node inside
//! it. Both come in two flavours selected when the [`Router`](crate::router::Router) is built:
//! hash based ([`HashEnsemblePartitioner`], [`HashClusterPartitioner`]) or delegating to a
//! user-supplied strategy ([`CustomEnsemblePartitioner`], [`CustomClusterPartitioner`]).
//!
//! The hash based cluster partitioner keeps one [`PartitionTable`] per cluster. See
//! [`PartitionTable`] for how the ring is laid out.

mod cluster_partitioner;
mod ensemble_partitioner;
mod partition_table;

#[rustfmt::skip]
pub use {
  cluster_partitioner::ClusterPartitioner,
  cluster_partitioner::ClusterPartitionerStrategy,
  cluster_partitioner::CustomClusterPartitioner,
  cluster_partitioner::HashClusterPartitioner,
  ensemble_partitioner::CustomEnsemblePartitioner,
  ensemble_partitioner::EnsemblePartitioner,
  ensemble_partitioner::EnsemblePartitionerStrategy,
  ensemble_partitioner::HashEnsemblePartitioner,
  partition_table::PartitionTable,
};
