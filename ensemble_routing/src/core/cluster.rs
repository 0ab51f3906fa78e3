use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// One independently managed group of nodes. Equality, hashing and ordering only look at the
/// name: the local flag is a property of the cluster, not part of its identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cluster {
  name: String,
  local: bool,
}
impl Cluster {
  pub fn new<S: Into<String>>(name: S, local: bool) -> Cluster {
    Cluster {
      name: name.into(),
      local: local,
    }
  }

  /// The cluster this process belongs to.
  pub fn local<S: Into<String>>(name: S) -> Cluster {
    Cluster::new(name, true)
  }

  pub fn remote<S: Into<String>>(name: S) -> Cluster {
    Cluster::new(name, false)
  }

  pub fn name(&self) -> &str {
    self.name.as_str()
  }

  pub fn is_local(&self) -> bool {
    self.local
  }
}
impl PartialEq for Cluster {
  fn eq(&self, other: &Self) -> bool {
    self.name == other.name
  }
}
impl Eq for Cluster {}
impl Hash for Cluster {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.name.hash(state);
  }
}
impl PartialOrd for Cluster {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}
impl Ord for Cluster {
  fn cmp(&self, other: &Self) -> Ordering {
    self.name.cmp(&other.name)
  }
}
impl fmt::Display for Cluster {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name)
  }
}

#[test]
fn test_cluster_identity_is_name() {
  assert_eq!(Cluster::local("europe"), Cluster::remote("europe"));
  assert!(Cluster::remote("america") < Cluster::remote("europe"));
  assert!(Cluster::local("europe").is_local());
  assert!(!Cluster::remote("europe").is_local());
}
