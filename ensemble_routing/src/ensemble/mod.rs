//! Cross-cluster membership.
//!
//! Clusters do not gossip node by node. Instead, for every remote cluster,
//! [`EnsembleDiscovery`] periodically pulls the cluster-level [`View`](crate::core::View) from one
//! of its nodes and turns the difference with the previous view into route changes on the
//! [`Router`](crate::router::Router). Discovery depends on the router, never the other way round.
//!
//! ### Scheduling
//! Rounds of the same cluster never overlap: a [`Scheduler`] runs one task per cluster that
//! sleeps between rounds and re-arms itself once a round has completed. The sleep is decided by
//! an [`IntervalPolicy`]. [`FixedInterval`] always waits
//! [`EnsembleConfig::discovery_interval_ms`]; [`AdaptiveInterval`] asks the [`IntervalEstimator`]
//! after each round, so the interval stretches while membership is stable and shrinks under churn.

mod config;
mod discovery;
mod interval_estimator;
mod scheduler;

#[rustfmt::skip]
pub use {
  config::DiscoveryMode,
  config::EnsembleConfig,
  config::SchedulerConfig,
  discovery::EnsembleDiscovery,
  interval_estimator::IntervalEstimator,
  scheduler::scheduler_for,
  scheduler::AdaptiveInterval,
  scheduler::AdaptiveScheduler,
  scheduler::DiscoveryScheduler,
  scheduler::FixedInterval,
  scheduler::FixedScheduler,
  scheduler::IntervalPolicy,
  scheduler::MembershipUpdater,
  scheduler::Scheduler,
  scheduler::MIN_INTERVAL,
};
