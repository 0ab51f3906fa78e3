use async_trait::async_trait;
use ensemble_routing::core::{Cluster, Error, Member, NodeAddress, View};
use ensemble_routing::ensemble::{
  DiscoveryScheduler, EnsembleConfig, EnsembleDiscovery, MembershipUpdater,
};
use ensemble_routing::router::{DefaultRouter, Router};
use ensemble_routing::testkit::{RecordingRouter, RouteEvent, SimulatedEnsemble};
use maplit::btreemap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_test::block_on;

const SEED: &str = "10.0.1.1:6000";

/// Never runs a round on its own: tests drive rounds through `MembershipUpdater::update`.
#[derive(Default)]
struct ManualScheduler {
  scheduled: Arc<Mutex<Vec<Cluster>>>,
}
#[async_trait]
impl DiscoveryScheduler for ManualScheduler {
  async fn schedule(
    &self,
    cluster: Cluster,
    _: Weak<dyn MembershipUpdater>,
    _: &EnsembleConfig,
  ) {
    self.scheduled.lock().await.push(cluster);
  }

  async fn shutdown(&self) {}
}

struct Fixture {
  ensemble: SimulatedEnsemble,
  router: Arc<RecordingRouter<DefaultRouter>>,
  discovery: Arc<EnsembleDiscovery>,
  scheduled: Arc<Mutex<Vec<Cluster>>>,
}
impl Fixture {
  async fn new(config: EnsembleConfig) -> Fixture {
    let ensemble = SimulatedEnsemble::new();
    ensemble
      .publish(View::new("asia", vec![member("a"), member("b"), member("c")]))
      .await;
    let router = Arc::new(RecordingRouter::new(hashed()));
    let scheduler = ManualScheduler::default();
    let scheduled = scheduler.scheduled.clone();
    let discovery = EnsembleDiscovery::with_scheduler(
      config,
      router.clone(),
      ensemble.factory(),
      Box::new(scheduler),
    )
    .unwrap();
    discovery.start().await.unwrap();
    Fixture {
      ensemble: ensemble,
      router: router,
      discovery: discovery,
      scheduled: scheduled,
    }
  }

  async fn names(&self, cluster: &Cluster) -> Vec<String> {
    let mut names = self
      .discovery
      .nodes_of(cluster)
      .await
      .iter()
      .map(|n| n.name().to_string())
      .collect::<Vec<_>>();
    names.sort();
    names
  }
}

fn config() -> EnsembleConfig {
  EnsembleConfig {
    clusters: vec!["europe".to_string(), "asia".to_string()],
    seeds: btreemap! { "asia".to_string() => SEED.to_string() },
    ..EnsembleConfig::single_cluster("europe")
  }
}

/// Members of asia live at 10.0.1.x, one address per letter.
fn member(name: &str) -> Member {
  let octet = name.as_bytes()[0] - b'a' + 1;
  Member::new(name, format!("10.0.1.{}", octet), 6000)
}

fn asia() -> Cluster {
  Cluster::remote("asia")
}

fn added(name: &str) -> RouteEvent {
  RouteEvent::Added(asia(), name.to_string())
}

fn removed(name: &str) -> RouteEvent {
  RouteEvent::Removed(asia(), name.to_string())
}

fn hashed() -> DefaultRouter {
  DefaultRouter::hashed(NonZeroUsize::new(16).unwrap())
}

fn seed() -> NodeAddress {
  SEED.parse().unwrap()
}

#[test]
fn start_registers_clusters_and_joins_seeds() {
  block_on(async {
    let f = Fixture::new(config()).await;
    let clusters = f.router.clusters().await;
    assert_eq!(clusters.len(), 2);
    assert!(clusters.get(&Cluster::remote("europe")).unwrap().is_local());
    assert!(!clusters.get(&asia()).unwrap().is_local());
    assert_eq!(*f.scheduled.lock().await, vec![asia()]);
    assert!(f.discovery.view_of(&asia()).await.is_none());
    assert!(f.discovery.nodes_of(&asia()).await.is_empty());

    // joining again only replaces the bootstrap node
    f.discovery.join(&asia(), "10.0.1.2:6000").await.unwrap();
    assert_eq!(f.scheduled.lock().await.len(), 1);
  });
}

#[test]
fn join_rejections() {
  block_on(async {
    let f = Fixture::new(config()).await;
    assert!(matches!(
      f.discovery.join(&Cluster::local("europe"), SEED).await,
      Err(Error::LocalClusterJoin { .. })
    ));
    assert!(matches!(
      f.discovery.join(&Cluster::remote("europe"), SEED).await,
      Err(Error::LocalClusterJoin { .. })
    ));
    assert!(matches!(
      f.discovery.join(&Cluster::remote("america"), "10.0.2.1").await,
      Err(Error::InvalidSeed { .. })
    ));
  });
}

#[test]
fn invalid_config_is_rejected() {
  let mut bad = config();
  bad.seeds.clear();
  let result = EnsembleDiscovery::new(
    bad,
    Arc::new(hashed()),
    SimulatedEnsemble::new().factory(),
  );
  assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn bootstrap_round_routes_every_member() {
  block_on(async {
    let f = Fixture::new(config()).await;
    let changes = f.discovery.update(&asia()).await.unwrap();
    assert_eq!(changes.joining, vec![member("a"), member("b"), member("c")]);
    assert!(changes.leaving.is_empty());
    assert_eq!(f.router.events().await, vec![added("a"), added("b"), added("c")]);
    assert_eq!(f.names(&asia()).await, vec!["a", "b", "c"]);
    assert_eq!(f.router.cluster_route(&asia()).await.len(), 3);
    assert_eq!(
      f.discovery.view_of(&asia()).await,
      Some(View::new("asia", vec![member("a"), member("b"), member("c")]))
    );
    // the bootstrap node was used once and never routed
    assert_eq!(f.ensemble.connects(SEED).await, 1);
    assert_eq!(f.ensemble.disconnects(SEED).await, 1);
    assert_eq!(f.ensemble.connects("a").await, 1);
  });
}

#[test]
fn view_diff_drives_routes() {
  block_on(async {
    let f = Fixture::new(config()).await;
    f.discovery.update(&asia()).await.unwrap();
    f.router.take_events().await;

    f.ensemble
      .publish(View::new("asia", vec![member("b"), member("c"), member("d")]))
      .await;
    let changes = f.discovery.update(&asia()).await.unwrap();
    assert_eq!(changes.leaving, vec![member("a")]);
    assert_eq!(changes.joining, vec![member("d")]);
    assert_eq!(changes.change_count(), 2);
    assert_eq!(f.router.take_events().await, vec![removed("a"), added("d")]);
    assert_eq!(f.names(&asia()).await, vec!["b", "c", "d"]);
    assert_eq!(f.ensemble.disconnects("a").await, 1);

    // no change, no route mutation
    let changes = f.discovery.update(&asia()).await.unwrap();
    assert!(changes.is_empty());
    assert!(f.router.events().await.is_empty());
  });
}

#[test]
fn failover_to_next_candidate() {
  block_on(async {
    let f = Fixture::new(config()).await;
    f.discovery.update(&asia()).await.unwrap();
    f.router.take_events().await;

    f.ensemble.take_down(&member("a").address()).await;
    let changes = f.discovery.update(&asia()).await.unwrap();
    assert!(changes.is_empty());
    assert_eq!(f.router.take_events().await, vec![removed("a")]);
    assert_eq!(f.names(&asia()).await, vec!["b", "c"]);
    assert_eq!(f.ensemble.requests(&member("b").address()).await, 1);
    assert_eq!(f.ensemble.requests(&member("c").address()).await, 0);
  });
}

#[test]
fn failover_after_routes_were_dropped() {
  block_on(async {
    let f = Fixture::new(config()).await;
    f.discovery.update(&asia()).await.unwrap();
    f.router.take_events().await;
    f.router.cleanup().await;

    // a leaves the cluster and stops answering; its route is already gone
    f.ensemble
      .publish(View::new("asia", vec![member("b"), member("c")]))
      .await;
    let changes = f.discovery.update(&asia()).await.unwrap();
    assert_eq!(changes.joining, vec![member("b"), member("c")]);
    assert_eq!(f.ensemble.requests(&member("b").address()).await, 1);
    assert_eq!(f.ensemble.disconnects("a").await, 1);
    assert_eq!(f.router.take_events().await, vec![added("b"), added("c")]);
    assert_eq!(f.names(&asia()).await, vec!["b", "c"]);
    assert_eq!(f.router.cluster_route(&asia()).await.len(), 2);
  });
}

#[test]
fn dropped_routes_are_rebuilt() {
  block_on(async {
    let f = Fixture::new(config()).await;
    f.discovery.update(&asia()).await.unwrap();
    f.router.take_events().await;
    f.router.cleanup().await;
    assert!(f.router.cluster_route(&asia()).await.is_empty());

    let changes = f.discovery.update(&asia()).await.unwrap();
    assert_eq!(changes.joining.len(), 3);
    assert_eq!(f.router.take_events().await, vec![added("a"), added("b"), added("c")]);
    assert_eq!(f.names(&asia()).await, vec!["a", "b", "c"]);
    assert_eq!(f.router.cluster_route(&asia()).await.len(), 3);
    assert!(f.discovery.view_of(&asia()).await.is_some());

    let changes = f.discovery.update(&asia()).await.unwrap();
    assert!(changes.is_empty());
    assert!(f.router.events().await.is_empty());
  });
}

#[test]
fn exhausted_candidates_rebootstrap() {
  block_on(async {
    let f = Fixture::new(config()).await;
    f.discovery.update(&asia()).await.unwrap();
    f.router.take_events().await;

    for name in ["a", "b", "c"].iter() {
      f.ensemble.take_down(&member(name).address()).await;
    }
    assert!(matches!(
      f.discovery.update(&asia()).await,
      Err(Error::MissingRoute)
    ));
    assert_eq!(
      f.router.take_events().await,
      vec![removed("a"), removed("b"), removed("c")]
    );
    assert!(f.discovery.nodes_of(&asia()).await.is_empty());
    assert!(f.discovery.view_of(&asia()).await.is_none());
    assert!(f.router.cluster_route(&asia()).await.is_empty());

    // the seed is a's address, still down
    assert!(matches!(
      f.discovery.update(&asia()).await,
      Err(Error::MissingRoute)
    ));
    for name in ["a", "b", "c"].iter() {
      f.ensemble.bring_up(&member(name).address()).await;
    }
    let changes = f.discovery.update(&asia()).await.unwrap();
    assert_eq!(changes.joining.len(), 3);
    assert_eq!(f.router.take_events().await, vec![added("a"), added("b"), added("c")]);
    assert_eq!(f.ensemble.connects(SEED).await, 2);
  });
}

#[test]
fn view_of_another_cluster_fails_round() {
  block_on(async {
    let f = Fixture::new(config()).await;
    f.discovery.update(&asia()).await.unwrap();
    f.router.take_events().await;

    // a now answers for america
    f.ensemble
      .publish(View::new("america", vec![Member::new("x", "10.0.1.1", 6000)]))
      .await;
    assert!(matches!(
      f.discovery.update(&asia()).await,
      Err(Error::Processing { .. })
    ));
    assert!(f.discovery.view_of(&asia()).await.is_none());
    // a was reached, so it is not dropped
    assert!(f.router.events().await.is_empty());
    assert_eq!(f.names(&asia()).await, vec!["a", "b", "c"]);
  });
}

#[test]
fn failed_reconciliation_rederives_membership() {
  block_on(async {
    let f = Fixture::new(config()).await;
    f.discovery.update(&asia()).await.unwrap();
    f.router.take_events().await;

    let d = member("d");
    f.ensemble.take_down(&d.address()).await;
    f.ensemble
      .publish(View::new(
        "asia",
        vec![member("a"), member("b"), member("c"), d.clone()],
      ))
      .await;
    assert!(matches!(
      f.discovery.update(&asia()).await,
      Err(Error::Communication { .. })
    ));
    assert!(f.discovery.view_of(&asia()).await.is_none());
    assert_eq!(f.router.take_events().await, vec![added("d")]);
    assert_eq!(f.names(&asia()).await, vec!["a", "b", "c", "d"]);

    f.ensemble.bring_up(&d.address()).await;
    f.ensemble
      .publish(View::new("asia", vec![member("a"), member("c"), d]))
      .await;
    let changes = f.discovery.update(&asia()).await.unwrap();
    assert_eq!(changes.joining.len(), 3);
    assert_eq!(
      f.router.take_events().await,
      vec![
        removed("b"),
        removed("a"),
        added("a"),
        removed("c"),
        added("c"),
        removed("d"),
        added("d"),
      ]
    );
    assert_eq!(f.names(&asia()).await, vec!["a", "c", "d"]);
    assert_eq!(f.router.cluster_route(&asia()).await.len(), 3);
  });
}

#[test]
fn shutdown_disconnects_everything() {
  block_on(async {
    let f = Fixture::new(config()).await;
    f.discovery.update(&asia()).await.unwrap();
    f.router.take_events().await;

    f.discovery.shutdown().await;
    f.discovery.shutdown().await;
    assert!(f.ensemble.still_connected().await.is_empty());
    assert!(f.discovery.nodes_of(&asia()).await.is_empty());
    assert!(matches!(
      f.discovery.join(&Cluster::remote("america"), "10.0.2.1:6000").await,
      Err(Error::ShutDown)
    ));
    f.ensemble
      .publish(View::new("asia", vec![member("b")]))
      .await;
    assert!(matches!(
      f.discovery.update(&asia()).await,
      Err(Error::ShutDown)
    ));
    assert!(f.router.events().await.is_empty());
  });
}

#[tokio::test(start_paused = true)]
async fn scheduled_rounds_follow_membership() {
  let ensemble = SimulatedEnsemble::new();
  ensemble
    .publish(View::new("asia", vec![member("a"), member("b")]))
    .await;
  let router = Arc::new(hashed());
  let discovery = EnsembleDiscovery::new(config(), router.clone(), ensemble.factory()).unwrap();
  discovery.start().await.unwrap();

  // the first round runs right away
  tokio::time::sleep(Duration::from_millis(500)).await;
  assert_eq!(router.cluster_route(&asia()).await.len(), 2);
  assert_eq!(ensemble.requests(&seed()).await, 1);

  ensemble
    .publish(View::new("asia", vec![member("a"), member("b"), member("c")]))
    .await;
  tokio::time::sleep(Duration::from_secs(10)).await;
  assert_eq!(router.cluster_route(&asia()).await.len(), 3);
  assert_eq!(
    discovery.view_of(&asia()).await.map(|v| v.members().len()),
    Some(3)
  );

  discovery.shutdown().await;
  ensemble.publish(View::new("asia", vec![member("a")])).await;
  tokio::time::sleep(Duration::from_secs(60)).await;
  assert_eq!(router.cluster_route(&asia()).await.len(), 3);
  assert!(ensemble.still_connected().await.is_empty());
}
