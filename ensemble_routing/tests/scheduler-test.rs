use async_trait::async_trait;
use ensemble_routing::core::{Cluster, Error, Member, Result, ViewChanges};
use ensemble_routing::ensemble::{
  DiscoveryMode, DiscoveryScheduler, EnsembleConfig, MembershipUpdater, Scheduler,
  SchedulerConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Answers every round with the same outcome and records when it was asked, in whole seconds
/// since creation.
struct Scripted {
  start: Instant,
  fail: bool,
  changes: usize,
  rounds: Mutex<Vec<u64>>,
}
impl Scripted {
  fn new(fail: bool, changes: usize) -> Arc<Scripted> {
    Arc::new(Scripted {
      start: Instant::now(),
      fail: fail,
      changes: changes,
      rounds: Mutex::new(Vec::new()),
    })
  }

  async fn rounds(&self) -> Vec<u64> {
    self.rounds.lock().await.clone()
  }
}
#[async_trait]
impl MembershipUpdater for Scripted {
  async fn update(&self, _: &Cluster) -> Result<ViewChanges> {
    self.rounds.lock().await.push(self.start.elapsed().as_secs());
    if self.fail {
      return Err(Error::MissingRoute);
    }
    Ok(ViewChanges {
      leaving: Vec::new(),
      joining: (0..self.changes)
        .map(|i| Member::new(format!("node{}", i), "localhost", 6000))
        .collect(),
    })
  }
}

fn asia() -> Cluster {
  Cluster::remote("asia")
}

fn adaptive_config(initial_ms: u64, scheduler: SchedulerConfig) -> EnsembleConfig {
  EnsembleConfig {
    discovery_interval_ms: initial_ms,
    discovery: DiscoveryMode::Adaptive(scheduler),
    ..EnsembleConfig::single_cluster("europe")
  }
}

async fn schedule<S: DiscoveryScheduler>(
  scheduler: &S,
  updater: &Arc<Scripted>,
  config: &EnsembleConfig,
) {
  let updater: Arc<dyn MembershipUpdater> = updater.clone();
  scheduler
    .schedule(asia(), Arc::downgrade(&updater), config)
    .await;
}

#[tokio::test(start_paused = true)]
async fn fixed_interval() {
  let scheduler = Scheduler::fixed();
  let updater = Scripted::new(false, 3);
  schedule(&scheduler, &updater, &EnsembleConfig::single_cluster("europe")).await;
  sleep(Duration::from_secs(35)).await;
  assert_eq!(updater.rounds().await, vec![0, 10, 20, 30]);

  scheduler.shutdown().await;
  assert!(scheduler.scheduled().await.is_empty());
  sleep(Duration::from_secs(100)).await;
  assert_eq!(updater.rounds().await.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn failed_rounds_do_not_stop_the_timer() {
  let scheduler = Scheduler::fixed();
  let updater = Scripted::new(true, 0);
  schedule(&scheduler, &updater, &EnsembleConfig::single_cluster("europe")).await;
  sleep(Duration::from_secs(25)).await;
  assert_eq!(updater.rounds().await, vec![0, 10, 20]);
  scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn adaptive_interval_stretches_while_stable() {
  let config = SchedulerConfig {
    baseline_ms: 60000,
    moving_boundary_ms: 10000,
    upper_limit_ms: 300000,
  };
  let scheduler = Scheduler::adaptive(config).unwrap();
  let updater = Scripted::new(false, 0);
  schedule(&scheduler, &updater, &adaptive_config(20000, config)).await;
  sleep(Duration::from_secs(125)).await;
  assert_eq!(updater.rounds().await, vec![0, 30, 70, 120]);
  scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn adaptive_interval_shrinks_under_churn() {
  let config = SchedulerConfig::default();
  let scheduler = Scheduler::adaptive(config).unwrap();
  // 6 changes after a 20s interval: one unit of (30 + 90) / 12 seconds
  let updater = Scripted::new(false, 6);
  schedule(&scheduler, &updater, &adaptive_config(20000, config)).await;
  sleep(Duration::from_secs(35)).await;
  assert_eq!(updater.rounds().await, vec![0, 10, 20, 30]);
  scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_adaptive_round_keeps_interval() {
  let config = SchedulerConfig::default();
  let scheduler = Scheduler::adaptive(config).unwrap();
  let updater = Scripted::new(true, 0);
  schedule(&scheduler, &updater, &adaptive_config(20000, config)).await;
  sleep(Duration::from_secs(45)).await;
  assert_eq!(updater.rounds().await, vec![0, 20, 40]);
  scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn rounds_are_at_least_a_second_apart() {
  let config = SchedulerConfig {
    baseline_ms: 0,
    moving_boundary_ms: 0,
    upper_limit_ms: 1000,
  };
  let scheduler = Scheduler::adaptive(config).unwrap();
  let updater = Scripted::new(false, 1);
  schedule(&scheduler, &updater, &adaptive_config(1, config)).await;
  sleep(Duration::from_millis(5500)).await;
  assert_eq!(updater.rounds().await, vec![0, 1, 2, 3, 4, 5]);
  scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn rounds_stop_when_updater_is_dropped() {
  let scheduler = Scheduler::fixed();
  let updater = Scripted::new(false, 0);
  schedule(&scheduler, &updater, &EnsembleConfig::single_cluster("europe")).await;
  sleep(Duration::from_secs(5)).await;
  assert_eq!(updater.rounds().await, vec![0]);
  let weak = Arc::downgrade(&updater);
  drop(updater);
  sleep(Duration::from_secs(60)).await;
  assert!(weak.upgrade().is_none());
  scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn nothing_is_scheduled_after_shutdown() {
  let scheduler = Scheduler::fixed();
  scheduler.shutdown().await;
  let updater = Scripted::new(false, 0);
  schedule(&scheduler, &updater, &EnsembleConfig::single_cluster("europe")).await;
  sleep(Duration::from_secs(30)).await;
  assert!(updater.rounds().await.is_empty());
  assert!(scheduler.scheduled().await.is_empty());
}

#[test]
fn adaptive_scheduler_rejects_subsecond_limit() {
  let config = SchedulerConfig {
    upper_limit_ms: 500,
    ..SchedulerConfig::default()
  };
  assert!(matches!(
    Scheduler::adaptive(config),
    Err(Error::Configuration(_))
  ));
}
