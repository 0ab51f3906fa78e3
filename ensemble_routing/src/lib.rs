//! Routing and membership core for a partitioned document store deployed as an _ensemble_: a
//! federation of independently operated clusters that together serve the whole key space.
//!
//! For any bucket, or bucket and key, the [`Router`](crate::router::Router) resolves the single
//! node that should serve the request. Resolution happens in two steps: an
//! [`EnsemblePartitioner`](crate::partition::EnsemblePartitioner) picks the cluster, then a
//! [`ClusterPartitioner`](crate::partition::ClusterPartitioner) picks the node inside it. Both
//! steps are deterministic, so every process that knows the same clusters and nodes computes the
//! same answer without coordinating.
//!
//! Remote cluster membership is kept up to date by
//! [`EnsembleDiscovery`](crate::ensemble::EnsembleDiscovery), which periodically asks one node of
//! each remote cluster for its [`View`](crate::core::View), diffs it against the previous one and
//! adds or removes routes accordingly. How often that happens is decided by a
//! [`DiscoveryScheduler`](crate::ensemble::DiscoveryScheduler): either a fixed interval, or an
//! adaptive one that stretches while membership is stable and shrinks under churn.
//!
//! Transport, storage and the HTTP surface are not part of this crate. They plug in through the
//! [`Node`](crate::core::Node) and [`NodeFactory`](crate::core::NodeFactory) traits.

pub mod core;
pub mod ensemble;
pub mod partition;
pub mod router;
pub mod testkit;
