//! Node-level routing across the ensemble.
//!
//! [`DefaultRouter`] composes an [`EnsemblePartitioner`](crate::partition::EnsemblePartitioner)
//! and a [`ClusterPartitioner`](crate::partition::ClusterPartitioner) without knowing which
//! flavour of either it was given. It owns the topology: the registered clusters, their nodes
//! and the local node. Membership discovery mutates it through the [`Router`] trait; the router
//! itself knows nothing about discovery.

mod default_router;
mod router;

#[rustfmt::skip]
pub use {
  default_router::DefaultRouter,
  router::Router,
};
