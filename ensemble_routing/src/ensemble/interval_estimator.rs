use crate::ensemble::SchedulerConfig;
use std::cmp::min;
use std::time::Duration;

const LOW_CHANGES: usize = 2;
const HIGH_CHANGES: usize = 4;
const VERY_HIGH_CHANGES: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Churn {
  VeryLow,
  Low,
  High,
  VeryHigh,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Period {
  VeryFrequent,
  Frequent,
  LessFrequent,
}

/// Picks the next discovery interval from the churn observed in the last round and the interval
/// that preceded it.
///
/// Thresholds derive from the baseline `b` (in seconds): a previous interval is very frequent
/// below `b/2`, frequent below `3b/2`, less frequent otherwise. A round with no changes stretches
/// the previous interval by the moving boundary. Any change picks a multiple of
/// `unit = (b/2 + 3b/2) / 12` from a fixed table, from 1 (heavy churn after a very frequent round)
/// up to 12 (light churn after a less frequent round). Results never exceed the upper limit.
#[derive(Clone, Copy, Debug)]
pub struct IntervalEstimator {
  config: SchedulerConfig,
}
impl IntervalEstimator {
  pub fn new(config: SchedulerConfig) -> IntervalEstimator {
    IntervalEstimator { config: config }
  }

  pub fn config(&self) -> &SchedulerConfig {
    &self.config
  }

  pub fn estimate_next_period_length(&self, change_count: usize, previous: Duration) -> Duration {
    let baseline = ms2secs(self.config.baseline_ms);
    let increment = ms2secs(self.config.moving_boundary_ms);
    let limit = ms2secs(self.config.upper_limit_ms);
    let previous = previous.as_secs();
    let p1 = baseline / 2;
    let p2 = baseline + p1;
    let next = if change_count == 0 {
      min(limit, previous.saturating_add(increment))
    } else {
      let unit = (p1 + p2) / 12;
      let cell = multiplier(churn(change_count), period(previous, p1, p2));
      min(limit, cell * unit)
    };
    Duration::from_secs(next)
  }
}

fn churn(change_count: usize) -> Churn {
  if change_count < LOW_CHANGES {
    Churn::VeryLow
  } else if change_count < HIGH_CHANGES {
    Churn::Low
  } else if change_count < VERY_HIGH_CHANGES {
    Churn::High
  } else {
    Churn::VeryHigh
  }
}

fn period(previous: u64, p1: u64, p2: u64) -> Period {
  if previous < p1 {
    Period::VeryFrequent
  } else if previous < p2 {
    Period::Frequent
  } else {
    Period::LessFrequent
  }
}

fn multiplier(churn: Churn, period: Period) -> u64 {
  use Churn::*;
  use Period::*;
  match (churn, period) {
    (VeryHigh, VeryFrequent) => 1,
    (VeryHigh, Frequent) => 2,
    (VeryHigh, LessFrequent) => 3,
    (High, VeryFrequent) => 4,
    (High, Frequent) => 5,
    (High, LessFrequent) => 6,
    (Low, VeryFrequent) => 7,
    (Low, Frequent) => 8,
    (Low, LessFrequent) => 9,
    (VeryLow, VeryFrequent) => 10,
    (VeryLow, Frequent) => 11,
    (VeryLow, LessFrequent) => 12,
  }
}

fn ms2secs(ms: u64) -> u64 {
  ms / 1000
}

#[cfg(test)]
fn estimator() -> IntervalEstimator {
  // p1 = 30s, p2 = 90s, unit = 10s
  IntervalEstimator::new(SchedulerConfig {
    baseline_ms: 60000,
    moving_boundary_ms: 10000,
    upper_limit_ms: 100000,
  })
}

#[test]
fn test_stability_stretches_interval() {
  let e = estimator();
  assert_eq!(
    e.estimate_next_period_length(0, Duration::from_secs(20)),
    Duration::from_secs(30)
  );
  assert_eq!(
    e.estimate_next_period_length(0, Duration::from_secs(95)),
    Duration::from_secs(100)
  );
  // sub-second remainders are dropped
  assert_eq!(
    e.estimate_next_period_length(0, Duration::from_millis(20999)),
    Duration::from_secs(30)
  );
}

#[test]
fn test_heavy_churn_shortens_interval() {
  let e = estimator();
  for changes in 6..20 {
    assert_eq!(
      e.estimate_next_period_length(changes, Duration::from_secs(10)),
      Duration::from_secs(10)
    );
  }
}

#[test]
fn test_multiplier_table() {
  let e = estimator();
  let previous = [10u64, 60, 120];
  let rows = [(7usize, [1u64, 2, 3]), (5, [4, 5, 6]), (3, [7, 8, 9]), (1, [10, 10, 10])];
  for (changes, expected) in rows.iter() {
    for (prev, cells) in previous.iter().zip(expected.iter()) {
      let next = e.estimate_next_period_length(*changes, Duration::from_secs(*prev));
      // 11 and 12 units are capped by the 100s limit
      assert_eq!(next, Duration::from_secs(*cells * 10), "changes {} prev {}", changes, prev);
    }
  }
}

#[test]
fn test_bucket_boundaries() {
  assert_eq!(churn(1), Churn::VeryLow);
  assert_eq!(churn(2), Churn::Low);
  assert_eq!(churn(4), Churn::High);
  assert_eq!(churn(6), Churn::VeryHigh);
  assert_eq!(period(29, 30, 90), Period::VeryFrequent);
  assert_eq!(period(30, 30, 90), Period::Frequent);
  assert_eq!(period(90, 30, 90), Period::LessFrequent);
  assert_eq!(multiplier(Churn::High, Period::LessFrequent), 6);
  assert_eq!(multiplier(Churn::VeryLow, Period::LessFrequent), 12);
}
