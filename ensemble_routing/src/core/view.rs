use crate::core::NodeAddress;
use im::OrdSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One node advertised by a remote cluster's [`View`]. Not to be confused with the live
/// [`Node`](crate::core::Node) discovery creates for it.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Member {
  pub name: String,
  pub host: String,
  pub port: u16,
}
impl Member {
  pub fn new<N: Into<String>, H: Into<String>>(name: N, host: H, port: u16) -> Member {
    Member {
      name: name.into(),
      host: host.into(),
      port: port,
    }
  }

  pub fn address(&self) -> NodeAddress {
    NodeAddress::new(self.host.clone(), self.port)
  }
}
impl fmt::Display for Member {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{}:{}", self.name, self.host, self.port)
  }
}

/// Membership snapshot of one cluster, as reported by one of its nodes. Never mutated: the next
/// discovery round produces a new one.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct View {
  cluster: String,
  members: OrdSet<Member>,
}
impl View {
  pub fn new<S, I>(cluster: S, members: I) -> View
  where
    S: Into<String>,
    I: IntoIterator<Item = Member>,
  {
    View {
      cluster: cluster.into(),
      members: members.into_iter().collect(),
    }
  }

  pub fn cluster(&self) -> &str {
    self.cluster.as_str()
  }

  pub fn members(&self) -> &OrdSet<Member> {
    &self.members
  }

  /// Diffs this view against the one observed before it. Without a previous view every member is
  /// joining.
  pub fn changes_since(&self, previous: Option<&View>) -> ViewChanges {
    match previous {
      None => ViewChanges {
        leaving: Vec::new(),
        joining: self.members.iter().cloned().collect(),
      },
      Some(previous) => ViewChanges {
        leaving: difference(&previous.members, &self.members),
        joining: difference(&self.members, &previous.members),
      },
    }
  }
}

/// Members of `left` that are not in `right`, in order.
pub fn difference<T: Ord + Clone>(left: &OrdSet<T>, right: &OrdSet<T>) -> Vec<T> {
  left
    .clone()
    .relative_complement(right.clone())
    .into_iter()
    .collect()
}

/// The outcome of diffing two [`View`]s.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewChanges {
  pub leaving: Vec<Member>,
  pub joining: Vec<Member>,
}
impl ViewChanges {
  pub fn change_count(&self) -> usize {
    self.leaving.len() + self.joining.len()
  }

  pub fn is_empty(&self) -> bool {
    self.change_count() == 0
  }
}

#[cfg(test)]
fn member(name: &str) -> Member {
  Member::new(name, "localhost", 6000)
}

#[test]
fn test_view_changes() {
  let previous = View::new("europe", vec![member("a"), member("b"), member("c")]);
  let updated = View::new("europe", vec![member("b"), member("c"), member("d")]);
  let changes = updated.changes_since(Some(&previous));
  assert_eq!(changes.leaving, vec![member("a")]);
  assert_eq!(changes.joining, vec![member("d")]);
  assert_eq!(changes.change_count(), 2);
}

#[test]
fn test_view_changes_without_previous() {
  let updated = View::new("europe", vec![member("b"), member("a")]);
  let changes = updated.changes_since(None);
  assert!(changes.leaving.is_empty());
  assert_eq!(changes.joining, vec![member("a"), member("b")]);
}

#[test]
fn test_member_address_change_is_leave_and_join() {
  let previous = View::new("europe", vec![member("a")]);
  let moved = Member::new("a", "localhost", 6001);
  let updated = View::new("europe", vec![moved.clone()]);
  let changes = updated.changes_since(Some(&previous));
  assert_eq!(changes.leaving, vec![member("a")]);
  assert_eq!(changes.joining, vec![moved]);
  assert!(updated.changes_since(Some(&updated)).is_empty());
}
