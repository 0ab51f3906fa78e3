use crate::core::{Cluster, NodeAddress, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Configures the ensemble this process takes part in. Validated once at startup with
/// [`EnsembleConfig::check`]; an invalid configuration aborts startup before any discovery round.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize, Validate)]
#[validate(schema(function = "validate_ensemble_config"))]
pub struct EnsembleConfig {
  /// The name of the cluster this process belongs to.
  #[validate(length(min = 1))]
  pub local_cluster: String,
  /// How long to wait between two discovery rounds of the same cluster, in milliseconds. The
  /// first interval of the adaptive scheduler.
  ///
  /// default: `10000`
  #[validate(range(min = 1))]
  pub discovery_interval_ms: u64,
  /// Every cluster of the ensemble, the local one included.
  pub clusters: Vec<String>,
  /// A `host:port` contact for every remote cluster. Never for the local cluster.
  #[serde(default)]
  pub seeds: BTreeMap<String, String>,
  /// Which scheduler drives discovery rounds.
  ///
  /// default: [`DiscoveryMode::Fixed`]
  #[serde(default)]
  pub discovery: DiscoveryMode,
}
impl EnsembleConfig {
  /// An ensemble of one: the local cluster and no remote ones.
  pub fn single_cluster<S: Into<String>>(local_cluster: S) -> EnsembleConfig {
    let local_cluster = local_cluster.into();
    EnsembleConfig {
      clusters: vec![local_cluster.clone()],
      local_cluster: local_cluster,
      discovery_interval_ms: 10000,
      seeds: BTreeMap::new(),
      discovery: DiscoveryMode::default(),
    }
  }

  pub fn check(&self) -> Result<()> {
    self.validate()?;
    Ok(())
  }

  pub fn discovery_interval(&self) -> Duration {
    Duration::from_millis(self.discovery_interval_ms)
  }

  pub fn local(&self) -> Cluster {
    Cluster::local(self.local_cluster.clone())
  }

  /// Every configured cluster, flagged local or remote.
  pub fn cluster_set(&self) -> BTreeSet<Cluster> {
    self
      .clusters
      .iter()
      .map(|name| Cluster::new(name.clone(), *name == self.local_cluster))
      .collect()
  }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DiscoveryMode {
  /// Rounds at the constant [`EnsembleConfig::discovery_interval_ms`].
  Fixed,
  /// Rounds re-armed with an interval estimated from the churn of the last round.
  Adaptive(SchedulerConfig),
}
impl Default for DiscoveryMode {
  fn default() -> Self {
    DiscoveryMode::Fixed
  }
}

/// Feeds the [`IntervalEstimator`](crate::ensemble::IntervalEstimator) of the adaptive scheduler.
/// Every value is in milliseconds, but the estimator only works with whole seconds.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize, Validate)]
pub struct SchedulerConfig {
  /// The expected interval under normal churn. Churn and interval thresholds derive from it.
  ///
  /// default: `60000`
  pub baseline_ms: u64,
  /// How much a round without membership changes stretches the next interval.
  ///
  /// default: `10000`
  pub moving_boundary_ms: u64,
  /// No interval is ever estimated above this. At least a second.
  ///
  /// default: `300000`
  #[validate(range(min = 1000))]
  pub upper_limit_ms: u64,
}
impl Default for SchedulerConfig {
  fn default() -> Self {
    SchedulerConfig {
      baseline_ms: 60000,
      moving_boundary_ms: 10000,
      upper_limit_ms: 300000,
    }
  }
}
impl SchedulerConfig {
  pub fn check(&self) -> Result<()> {
    self.validate()?;
    Ok(())
  }
}

fn validate_ensemble_config(config: &EnsembleConfig) -> std::result::Result<(), ValidationError> {
  let local = &config.local_cluster;
  if !config.clusters.contains(local) {
    return Err(invalid(
      "local_cluster_not_configured",
      format!("local cluster {} is not among the configured clusters", local),
    ));
  }
  if config.seeds.contains_key(local) {
    return Err(invalid(
      "seed_for_local_cluster",
      format!("local cluster {} must not have a seed", local),
    ));
  }
  if let Some(cluster) = config
    .clusters
    .iter()
    .find(|c| *c != local && !config.seeds.contains_key(*c))
  {
    return Err(invalid(
      "missing_seed",
      format!("remote cluster {} has no seed", cluster),
    ));
  }
  for (cluster, seed) in config.seeds.iter() {
    if !config.clusters.contains(cluster) {
      return Err(invalid(
        "seed_for_unknown_cluster",
        format!("seed {} belongs to unknown cluster {}", seed, cluster),
      ));
    }
    if seed.parse::<NodeAddress>().is_err() {
      return Err(invalid(
        "invalid_seed",
        format!("seed {} of cluster {} is not host:port", seed, cluster),
      ));
    }
  }
  if let DiscoveryMode::Adaptive(scheduler) = &config.discovery {
    if scheduler.validate().is_err() {
      return Err(invalid(
        "invalid_scheduler",
        format!(
          "adaptive upper limit {}ms is below one second",
          scheduler.upper_limit_ms
        ),
      ));
    }
  }
  Ok(())
}

fn invalid(code: &'static str, message: String) -> ValidationError {
  let mut error = ValidationError::new(code);
  error.message = Some(Cow::from(message));
  error
}

#[cfg(test)]
use crate::core::Error;
#[cfg(test)]
use maplit::btreemap;

#[cfg(test)]
fn ensemble() -> EnsembleConfig {
  EnsembleConfig {
    local_cluster: "europe".to_string(),
    discovery_interval_ms: 5000,
    clusters: vec!["europe".to_string(), "america".to_string(), "asia".to_string()],
    seeds: btreemap! {
      "america".to_string() => "us-east.example.com:6000".to_string(),
      "asia".to_string() => "10.0.0.7:6000".to_string(),
    },
    discovery: DiscoveryMode::Fixed,
  }
}

#[cfg(test)]
fn schema_code(config: &EnsembleConfig) -> Option<String> {
  match config.check() {
    Ok(()) => None,
    Err(Error::Configuration(errors)) => errors
      .field_errors()
      .values()
      .flat_map(|errs| errs.iter())
      .map(|e| e.code.to_string())
      .next(),
    Err(other) => panic!("unexpected {:?}", other),
  }
}

#[test]
fn test_valid_configs() {
  assert_eq!(schema_code(&ensemble()), None);
  assert_eq!(schema_code(&EnsembleConfig::single_cluster("europe")), None);
  let mut adaptive = ensemble();
  adaptive.discovery = DiscoveryMode::Adaptive(SchedulerConfig::default());
  assert_eq!(schema_code(&adaptive), None);
}

#[test]
fn test_invalid_configs() {
  let mut c = ensemble();
  c.seeds.remove("asia");
  assert_eq!(schema_code(&c).as_deref(), Some("missing_seed"));

  let mut c = ensemble();
  c.seeds.insert("europe".to_string(), "localhost:6000".to_string());
  assert_eq!(schema_code(&c).as_deref(), Some("seed_for_local_cluster"));

  let mut c = ensemble();
  c.seeds.insert("asia".to_string(), "10.0.0.7".to_string());
  assert_eq!(schema_code(&c).as_deref(), Some("invalid_seed"));

  let mut c = ensemble();
  c.local_cluster = "africa".to_string();
  assert_eq!(schema_code(&c).as_deref(), Some("local_cluster_not_configured"));

  let mut c = ensemble();
  c.seeds.insert("oceania".to_string(), "localhost:6000".to_string());
  assert_eq!(schema_code(&c).as_deref(), Some("seed_for_unknown_cluster"));

  let mut c = ensemble();
  c.discovery = DiscoveryMode::Adaptive(SchedulerConfig {
    upper_limit_ms: 10,
    ..SchedulerConfig::default()
  });
  assert_eq!(schema_code(&c).as_deref(), Some("invalid_scheduler"));

  let mut c = ensemble();
  c.discovery_interval_ms = 0;
  assert_eq!(schema_code(&c).as_deref(), Some("range"));
}

#[test]
fn test_cluster_set() {
  let clusters = ensemble().cluster_set();
  assert_eq!(clusters.len(), 3);
  assert_eq!(clusters.iter().filter(|c| c.is_local()).count(), 1);
  assert!(clusters.get(&Cluster::remote("europe")).unwrap().is_local());
}

#[test]
fn test_deserialize() {
  let config: EnsembleConfig = serde_json::from_str(
    r#"{
      "local_cluster": "europe",
      "discovery_interval_ms": 5000,
      "clusters": ["europe", "asia"],
      "seeds": { "asia": "10.0.0.7:6000" },
      "discovery": { "type": "adaptive", "baseline_ms": 30000, "moving_boundary_ms": 5000, "upper_limit_ms": 120000 }
    }"#,
  )
  .unwrap();
  config.check().unwrap();
  assert_eq!(
    config.discovery,
    DiscoveryMode::Adaptive(SchedulerConfig {
      baseline_ms: 30000,
      moving_boundary_ms: 5000,
      upper_limit_ms: 120000,
    })
  );
}
