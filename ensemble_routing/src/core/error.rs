use thiserror::Error;
use validator::ValidationErrors;

/// Everything that can go wrong inside the routing and membership core.
///
/// Only [`Error::MissingRoute`] is expected on the read and write paths of a healthy deployment:
/// it means the data is currently unreachable. Topology errors (duplicate or unknown nodes and
/// clusters, the partitions limit) signal a defect in the caller's ordering of events.
#[derive(Error, Debug)]
pub enum Error {
  /// No cluster or no node could be resolved, or every discovery candidate was unreachable.
  #[error("data currently unavailable: some clusters may be down or unreachable")]
  MissingRoute,

  #[error("partitions limit reached: a cluster holds at most {max_partitions} nodes")]
  PartitionsLimitReached { max_partitions: usize },

  #[error("duplicate node {node} in cluster {cluster}")]
  DuplicateNode { cluster: String, node: String },

  #[error("unknown node {node} in cluster {cluster}")]
  UnknownNode { cluster: String, node: String },

  #[error("unknown cluster {cluster}")]
  UnknownCluster { cluster: String },

  /// A custom ensemble strategy returned no cluster, or one that is not configured.
  #[error("null or invalid partition for bucket {bucket}: {partition:?}")]
  InvalidPartition {
    bucket: String,
    partition: Option<String>,
  },

  #[error("cluster {cluster} is local and cannot be joined")]
  LocalClusterJoin { cluster: String },

  #[error("invalid seed {seed}: expected host:port")]
  InvalidSeed { seed: String },

  /// The node could not be reached. Discovery fails over to the next candidate on this.
  #[error("communication with node {node} failed: {reason}")]
  Communication { node: String, reason: String },

  /// The node was reached but could not process the command.
  #[error("node {node} failed to process command: {reason}")]
  Processing { node: String, reason: String },

  #[error("invalid configuration: {0}")]
  Configuration(#[from] ValidationErrors),

  #[error("ensemble discovery has been shut down")]
  ShutDown,
}
impl Error {
  /// Whether the condition is transient: the same call may succeed once the topology heals.
  pub fn is_recoverable(&self) -> bool {
    matches!(self, Error::MissingRoute | Error::Communication { .. })
  }
}

pub type Result<T> = std::result::Result<T, Error>;

#[test]
fn test_recoverable_errors() {
  assert!(Error::MissingRoute.is_recoverable());
  assert!(Error::Communication {
    node: "node1".to_string(),
    reason: "connection refused".to_string()
  }
  .is_recoverable());
  assert!(!Error::DuplicateNode {
    cluster: "cluster1".to_string(),
    node: "node1".to_string()
  }
  .is_recoverable());
  assert!(!Error::PartitionsLimitReached { max_partitions: 5 }.is_recoverable());
}
