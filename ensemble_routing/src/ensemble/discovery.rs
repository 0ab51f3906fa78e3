use crate::core::{
  Cluster, Command, Error, NodeAddress, NodeFactory, NodeRef, Reply, Result, View, ViewChanges,
};
use crate::ensemble::{scheduler_for, DiscoveryScheduler, EnsembleConfig, MembershipUpdater};
use crate::router::Router;
use async_trait::async_trait;
use itertools::Itertools;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct ClusterState {
  bootstrap: NodeRef,
  nodes: Vec<NodeRef>,
  view: Option<View>,
}

/// Keeps the router's picture of every remote cluster up to date.
///
/// Each joined cluster gets its own discovery rounds, driven by a [`DiscoveryScheduler`]. A round
/// asks one known node of the cluster for its [`View`], falling over to the next known node when
/// one is unreachable, and reconciles the answer against the previous view: routes to members that
/// left are removed and their nodes disconnected, members that joined get a node, a route and a
/// connection. Until a cluster has live nodes, rounds go through its bootstrap node, built from
/// the seed given to [`EnsembleDiscovery::join`]. The bootstrap node is never routed.
///
/// A failed round discards the previous view, so the next successful round re-derives the whole
/// membership instead of diffing against a baseline that may no longer match the routes. The same
/// happens when a live node has lost its route, for instance after [`Router::cleanup`].
pub struct EnsembleDiscovery {
  config: EnsembleConfig,
  router: Arc<dyn Router>,
  factory: Arc<dyn NodeFactory>,
  scheduler: Box<dyn DiscoveryScheduler>,
  states: Mutex<HashMap<Cluster, ClusterState>>,
  shut_down: AtomicBool,
}
impl EnsembleDiscovery {
  /// Validates `config` and picks the scheduler it names.
  pub fn new(
    config: EnsembleConfig,
    router: Arc<dyn Router>,
    factory: Arc<dyn NodeFactory>,
  ) -> Result<Arc<EnsembleDiscovery>> {
    config.check()?;
    let scheduler = scheduler_for(&config)?;
    Self::with_scheduler(config, router, factory, scheduler)
  }

  pub fn with_scheduler(
    config: EnsembleConfig,
    router: Arc<dyn Router>,
    factory: Arc<dyn NodeFactory>,
    scheduler: Box<dyn DiscoveryScheduler>,
  ) -> Result<Arc<EnsembleDiscovery>> {
    config.check()?;
    Ok(Arc::new(EnsembleDiscovery {
      config: config,
      router: router,
      factory: factory,
      scheduler: scheduler,
      states: Mutex::new(HashMap::new()),
      shut_down: AtomicBool::new(false),
    }))
  }

  pub fn config(&self) -> &EnsembleConfig {
    &self.config
  }

  /// Registers every configured cluster with the router and joins every seeded one.
  pub async fn start(self: &Arc<Self>) -> Result<()> {
    self.router.setup_clusters(self.config.cluster_set()).await;
    for (cluster, seed) in self.config.seeds.iter() {
      self.join(&Cluster::remote(cluster.clone()), seed).await?;
    }
    Ok(())
  }

  /// Starts discovering `cluster` through the node at `seed`. The first round runs right away.
  /// Joining a cluster again only replaces its bootstrap node.
  pub async fn join(self: &Arc<Self>, cluster: &Cluster, seed: &str) -> Result<()> {
    if self.shut_down.load(Ordering::SeqCst) {
      return Err(Error::ShutDown);
    }
    if cluster.is_local() || cluster.name() == self.config.local_cluster {
      return Err(Error::LocalClusterJoin {
        cluster: cluster.name().to_string(),
      });
    }
    let address = seed.parse::<NodeAddress>()?;
    let bootstrap = self
      .factory
      .make_remote_node(seed, &address.host, address.port);
    let remote = Cluster::remote(cluster.name());
    self
      .router
      .setup_clusters(std::iter::once(remote.clone()).collect())
      .await;

    let fresh = match self.states.lock().await.entry(remote.clone()) {
      Entry::Occupied(mut entry) => {
        debug!(cluster = %remote, seed = seed, "replacing bootstrap node");
        entry.get_mut().bootstrap = bootstrap;
        false
      }
      Entry::Vacant(entry) => {
        entry.insert(ClusterState {
          bootstrap: bootstrap,
          nodes: Vec::new(),
          view: None,
        });
        true
      }
    };
    if fresh {
      info!(cluster = %remote, seed = seed, "joining cluster");
      let updater: Arc<dyn MembershipUpdater> = self.clone();
      self
        .scheduler
        .schedule(remote, Arc::downgrade(&updater), &self.config)
        .await;
    }
    Ok(())
  }

  /// The last view successfully reconciled for `cluster`.
  pub async fn view_of(&self, cluster: &Cluster) -> Option<View> {
    let states = self.states.lock().await;
    states.get(cluster).and_then(|s| s.view.clone())
  }

  /// The live nodes of `cluster`, in the order rounds try them.
  pub async fn nodes_of(&self, cluster: &Cluster) -> Vec<NodeRef> {
    let states = self.states.lock().await;
    states
      .get(cluster)
      .map(|s| s.nodes.clone())
      .unwrap_or_default()
  }

  pub async fn joined(&self) -> BTreeSet<Cluster> {
    self.states.lock().await.keys().cloned().collect()
  }

  /// Cancels every round, then disconnects every live node. Idempotent.
  pub async fn shutdown(&self) {
    if self.shut_down.swap(true, Ordering::SeqCst) {
      return;
    }
    self.scheduler.shutdown().await;
    let states = std::mem::take(&mut *self.states.lock().await);
    for (cluster, state) in states {
      debug!(cluster = %cluster, nodes = state.nodes.len(), "disconnecting cluster");
      for node in state.nodes {
        node.disconnect().await;
      }
    }
    info!("ensemble discovery shut down");
  }

  async fn round(&self, cluster: &Cluster) -> Result<ViewChanges> {
    let (bootstrap, candidates, previous) = {
      let states = self.states.lock().await;
      let state = states.get(cluster).ok_or_else(|| Error::UnknownCluster {
        cluster: cluster.name().to_string(),
      })?;
      (state.bootstrap.clone(), state.nodes.clone(), state.view.clone())
    };
    // live nodes without a route mean the router was reset underneath us
    let routed = self.router.cluster_route(cluster).await;
    let previous = match previous {
      Some(_) if candidates.iter().any(|n| !routed.contains(n)) => {
        debug!(cluster = %cluster, "live nodes lost their routes, re-deriving membership");
        None
      }
      previous => previous,
    };
    let view = if candidates.is_empty() {
      self.request_bootstrap(cluster, &bootstrap).await?
    } else {
      self.request_with_failover(cluster, candidates).await?
    };
    let changes = self.calculate_view(cluster, previous.as_ref(), &view).await?;
    self.store_view(cluster, Some(view)).await;
    Ok(changes)
  }

  async fn request_bootstrap(&self, cluster: &Cluster, bootstrap: &NodeRef) -> Result<View> {
    debug!(cluster = %cluster, node = %bootstrap, "bootstrapping");
    if let Err(e) = bootstrap.connect().await {
      debug!(cluster = %cluster, node = %bootstrap, error = %e, "bootstrap node unreachable");
      return Err(Error::MissingRoute);
    }
    let view = self.request_membership(cluster, bootstrap).await;
    bootstrap.disconnect().await;
    match view {
      Err(e @ Error::Communication { .. }) => {
        debug!(cluster = %cluster, node = %bootstrap, error = %e, "bootstrap node unreachable");
        Err(Error::MissingRoute)
      }
      other => other,
    }
  }

  async fn request_with_failover(&self, cluster: &Cluster, candidates: Vec<NodeRef>) -> Result<View> {
    for node in candidates {
      match self.request_membership(cluster, &node).await {
        Ok(view) => return Ok(view),
        Err(e @ Error::Communication { .. }) => {
          debug!(cluster = %cluster, node = %node, error = %e, "failing over");
          self.retire(cluster, &node).await;
        }
        Err(e) => return Err(e),
      }
    }
    Err(Error::MissingRoute)
  }

  async fn request_membership(&self, cluster: &Cluster, node: &NodeRef) -> Result<View> {
    let processing = |reason: String| Error::Processing {
      node: node.name().to_string(),
      reason: reason,
    };
    match node.send(Command::Membership).await? {
      Reply::View(view) if view.cluster() == cluster.name() => Ok(view),
      Reply::View(view) => Err(processing(format!(
        "answered with a view of cluster {} instead of {}",
        view.cluster(),
        cluster
      ))),
    }
  }

  async fn calculate_view(
    &self,
    cluster: &Cluster,
    previous: Option<&View>,
    updated: &View,
  ) -> Result<ViewChanges> {
    let changes = updated.changes_since(previous);
    for member in changes.leaving.iter() {
      if let Some(node) = self.tracked(cluster, &member.name).await {
        self.retire(cluster, &node).await;
      }
    }
    if previous.is_none() {
      let named: HashSet<&str> = updated.members().iter().map(|m| m.name.as_str()).collect();
      for node in self.nodes_of(cluster).await {
        if !named.contains(node.name()) {
          debug!(cluster = %cluster, node = %node, "retiring node missing from view");
          self.retire(cluster, &node).await;
        }
      }
    }
    for member in changes.joining.iter() {
      if let Some(stale) = self.tracked(cluster, &member.name).await {
        debug!(cluster = %cluster, node = %stale, "replacing node");
        self.retire(cluster, &stale).await;
      }
      let node = self
        .factory
        .make_remote_node(&member.name, &member.host, member.port);
      self.router.add_route_to(cluster, node.clone()).await?;
      self.track(cluster, node.clone()).await;
      node.connect().await?;
    }
    if !changes.is_empty() {
      info!(
        cluster = %cluster,
        joining = %changes.joining.iter().join(", "),
        leaving = %changes.leaving.iter().join(", "),
        "view changed"
      );
    }
    Ok(changes)
  }

  /// Unroutes, disconnects and forgets `node`. A route that is already gone is not an error.
  async fn retire(&self, cluster: &Cluster, node: &NodeRef) {
    match self.router.remove_route_to(cluster, node).await {
      Ok(()) => {}
      Err(e @ Error::UnknownNode { .. }) => {
        debug!(cluster = %cluster, node = %node, error = %e, "node was not routed");
      }
      Err(e) => warn!(cluster = %cluster, node = %node, error = %e, "could not remove route"),
    }
    node.disconnect().await;
    self.untrack(cluster, node).await;
  }

  async fn tracked(&self, cluster: &Cluster, name: &str) -> Option<NodeRef> {
    let states = self.states.lock().await;
    states
      .get(cluster)
      .and_then(|s| s.nodes.iter().find(|n| n.name() == name).cloned())
  }

  async fn track(&self, cluster: &Cluster, node: NodeRef) {
    if let Some(state) = self.states.lock().await.get_mut(cluster) {
      state.nodes.push(node);
    }
  }

  async fn untrack(&self, cluster: &Cluster, node: &NodeRef) {
    if let Some(state) = self.states.lock().await.get_mut(cluster) {
      state.nodes.retain(|n| n != node);
    }
  }

  async fn store_view(&self, cluster: &Cluster, view: Option<View>) {
    if let Some(state) = self.states.lock().await.get_mut(cluster) {
      state.view = view;
    }
  }
}
#[async_trait]
impl MembershipUpdater for EnsembleDiscovery {
  async fn update(&self, cluster: &Cluster) -> Result<ViewChanges> {
    if self.shut_down.load(Ordering::SeqCst) {
      return Err(Error::ShutDown);
    }
    let round = self.round(cluster).await;
    if let Err(e) = &round {
      warn!(cluster = %cluster, error = %e, "discovery round failed");
      self.store_view(cluster, None).await;
    }
    round
  }
}
