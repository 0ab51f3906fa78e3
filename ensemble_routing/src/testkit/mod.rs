//! Test doubles for code built on this crate: an in-memory ensemble of remote clusters with
//! failure injection, a router decorator that records route changes, inert nodes and a scriptable
//! hash function.

mod failure_config;
mod recording_router;
mod scripted_hash;
mod simulated;
mod static_node;

#[rustfmt::skip]
pub use {
  failure_config::FailureConfig,
  failure_config::FailureConfigMap,
  recording_router::RecordingRouter,
  recording_router::RouteEvent,
  scripted_hash::ScriptedHash,
  simulated::SimulatedEnsemble,
  simulated::SimulatedNode,
  simulated::SimulatedNodeFactory,
  static_node::static_node,
  static_node::static_node_at,
  static_node::StaticNode,
};
