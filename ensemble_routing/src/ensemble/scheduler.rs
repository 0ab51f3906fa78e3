use crate::core::{Cluster, Result, ViewChanges};
use crate::ensemble::{DiscoveryMode, EnsembleConfig, IntervalEstimator, SchedulerConfig};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Rounds are never closer together than this, whatever the policy says.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Runs one discovery round for a cluster. Implemented by
/// [`EnsembleDiscovery`](crate::ensemble::EnsembleDiscovery).
#[async_trait]
pub trait MembershipUpdater: Send + Sync {
  async fn update(&self, cluster: &Cluster) -> Result<ViewChanges>;
}

/// Drives discovery rounds. A cluster never has two rounds in flight: the next one is armed only
/// once the previous one has completed.
#[async_trait]
pub trait DiscoveryScheduler: Send + Sync {
  /// Starts rounds for `cluster`, the first one immediately. Rounds stop once `updater` is
  /// dropped or the scheduler shuts down.
  async fn schedule(
    &self,
    cluster: Cluster,
    updater: Weak<dyn MembershipUpdater>,
    config: &EnsembleConfig,
  );

  /// Cancels every scheduled round and waits for the cancellation to land.
  async fn shutdown(&self);
}

/// Decides how long to wait before the next round.
pub trait IntervalPolicy: Send + Sync + 'static {
  fn initial(&self, config: &EnsembleConfig) -> Duration;

  fn next(&self, round: &Result<ViewChanges>, previous: Duration) -> Duration;
}

/// The same interval, forever.
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedInterval;
impl IntervalPolicy for FixedInterval {
  fn initial(&self, config: &EnsembleConfig) -> Duration {
    config.discovery_interval()
  }

  fn next(&self, _: &Result<ViewChanges>, previous: Duration) -> Duration {
    previous
  }
}

/// Re-estimates the interval after every successful round. A failed round says nothing about
/// churn, so the previous interval is kept.
#[derive(Clone, Copy, Debug)]
pub struct AdaptiveInterval {
  estimator: IntervalEstimator,
}
impl AdaptiveInterval {
  pub fn new(config: SchedulerConfig) -> AdaptiveInterval {
    AdaptiveInterval {
      estimator: IntervalEstimator::new(config),
    }
  }
}
impl IntervalPolicy for AdaptiveInterval {
  fn initial(&self, config: &EnsembleConfig) -> Duration {
    config.discovery_interval()
  }

  fn next(&self, round: &Result<ViewChanges>, previous: Duration) -> Duration {
    match round {
      Ok(changes) => self
        .estimator
        .estimate_next_period_length(changes.change_count(), previous),
      Err(_) => previous,
    }
  }
}

/// One tokio task per cluster, re-arming itself after every round with the interval its
/// [`IntervalPolicy`] picks.
pub struct Scheduler<P: IntervalPolicy> {
  policy: Arc<P>,
  tasks: Mutex<HashMap<Cluster, JoinHandle<()>>>,
  shut_down: AtomicBool,
}
pub type FixedScheduler = Scheduler<FixedInterval>;
pub type AdaptiveScheduler = Scheduler<AdaptiveInterval>;

impl<P: IntervalPolicy> Scheduler<P> {
  pub fn new(policy: P) -> Scheduler<P> {
    Scheduler {
      policy: Arc::new(policy),
      tasks: Mutex::new(HashMap::new()),
      shut_down: AtomicBool::new(false),
    }
  }

  pub async fn scheduled(&self) -> Vec<Cluster> {
    self.tasks.lock().await.keys().cloned().collect()
  }
}
impl Scheduler<FixedInterval> {
  pub fn fixed() -> FixedScheduler {
    Scheduler::new(FixedInterval)
  }
}
impl Scheduler<AdaptiveInterval> {
  pub fn adaptive(config: SchedulerConfig) -> Result<AdaptiveScheduler> {
    config.check()?;
    Ok(Scheduler::new(AdaptiveInterval::new(config)))
  }
}

/// The scheduler selected by [`EnsembleConfig::discovery`].
pub fn scheduler_for(config: &EnsembleConfig) -> Result<Box<dyn DiscoveryScheduler>> {
  let scheduler: Box<dyn DiscoveryScheduler> = match &config.discovery {
    DiscoveryMode::Fixed => Box::new(Scheduler::fixed()),
    DiscoveryMode::Adaptive(scheduler) => Box::new(Scheduler::adaptive(*scheduler)?),
  };
  Ok(scheduler)
}

#[async_trait]
impl<P: IntervalPolicy> DiscoveryScheduler for Scheduler<P> {
  async fn schedule(
    &self,
    cluster: Cluster,
    updater: Weak<dyn MembershipUpdater>,
    config: &EnsembleConfig,
  ) {
    let mut tasks = self.tasks.lock().await;
    if self.shut_down.load(Ordering::SeqCst) {
      return;
    }
    let policy = self.policy.clone();
    let interval = policy.initial(config).max(MIN_INTERVAL);
    let task = tokio::spawn(run_rounds(cluster.clone(), updater, policy, interval));
    if let Some(previous) = tasks.insert(cluster, task) {
      previous.abort();
    }
  }

  async fn shutdown(&self) {
    let mut tasks = self.tasks.lock().await;
    self.shut_down.store(true, Ordering::SeqCst);
    for (cluster, task) in tasks.drain() {
      debug!(cluster = %cluster, "cancelling discovery");
      task.abort();
      // Err(cancelled) is the expected outcome
      let _ = task.await;
    }
  }
}

async fn run_rounds<P: IntervalPolicy>(
  cluster: Cluster,
  updater: Weak<dyn MembershipUpdater>,
  policy: Arc<P>,
  mut interval: Duration,
) {
  loop {
    let round = match updater.upgrade() {
      Some(updater) => updater.update(&cluster).await,
      None => break,
    };
    interval = policy.next(&round, interval).max(MIN_INTERVAL);
    trace!(cluster = %cluster, next_ms = interval.as_millis() as u64, "next discovery round armed");
    tokio::time::sleep(interval).await;
  }
  debug!(cluster = %cluster, "discovery stopped");
}

#[cfg(test)]
use crate::core::{Error, Member};

#[cfg(test)]
fn churn(joining: usize) -> ViewChanges {
  ViewChanges {
    leaving: Vec::new(),
    joining: (0..joining)
      .map(|i| Member::new(format!("node{}", i), "localhost", 6000))
      .collect(),
  }
}

#[test]
fn test_fixed_interval() {
  let config = EnsembleConfig::single_cluster("europe");
  assert_eq!(FixedInterval.initial(&config), Duration::from_secs(10));
  let previous = Duration::from_secs(10);
  assert_eq!(FixedInterval.next(&Ok(churn(7)), previous), previous);
  assert_eq!(FixedInterval.next(&Err(Error::MissingRoute), previous), previous);
}

#[test]
fn test_adaptive_interval() {
  let policy = AdaptiveInterval::new(SchedulerConfig::default());
  let previous = Duration::from_secs(20);
  assert_eq!(policy.next(&Ok(churn(0)), previous), Duration::from_secs(30));
  // very high churn after a very frequent round: one unit of (30 + 90) / 12 seconds
  assert_eq!(policy.next(&Ok(churn(6)), previous), Duration::from_secs(10));
  assert_eq!(policy.next(&Err(Error::MissingRoute), previous), previous);
}

#[test]
fn test_scheduler_for_config() {
  let mut config = EnsembleConfig::single_cluster("europe");
  assert!(scheduler_for(&config).is_ok());
  config.discovery = DiscoveryMode::Adaptive(SchedulerConfig {
    upper_limit_ms: 999,
    ..SchedulerConfig::default()
  });
  assert!(matches!(scheduler_for(&config), Err(Error::Configuration(_))));
}
