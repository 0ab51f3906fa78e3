use crate::core::{Error, Result, View};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;

/// Commands the core sends to a [`Node`]. Everything else a node can be asked to do belongs to the
/// embedding store.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Command {
  /// Asks for the current membership [`View`] of the node's own cluster. Carries no payload.
  Membership,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
  View(View),
}

/// A single addressable server process. Connection management and the transport behind
/// [`Node::send`] are provided by the embedding store.
///
/// `send` must be bounded by a transport timeout, otherwise a hung node stalls a discovery round.
/// An unreachable node fails with [`Error::Communication`], a node that was reached but could not
/// execute the command fails with [`Error::Processing`].
#[async_trait]
pub trait Node: Send + Sync + 'static {
  fn name(&self) -> &str;

  fn host(&self) -> &str;

  fn port(&self) -> u16;

  async fn connect(&self) -> Result<()>;

  /// Best effort, never fails.
  async fn disconnect(&self);

  async fn send(&self, command: Command) -> Result<Reply>;
}

/// Builds the [`Node`] instances discovery needs for seeds and newly joined members.
pub trait NodeFactory: Send + Sync {
  fn make_remote_node(&self, name: &str, host: &str, port: u16) -> NodeRef;
}

/// Shared handle to a [`Node`]. Compared, hashed and ordered by node name only.
#[derive(Clone)]
pub struct NodeRef(Arc<dyn Node>);
impl NodeRef {
  pub fn new<N: Node>(node: N) -> NodeRef {
    NodeRef(Arc::new(node))
  }

  pub fn address(&self) -> NodeAddress {
    NodeAddress::new(self.0.host(), self.0.port())
  }
}
impl From<Arc<dyn Node>> for NodeRef {
  fn from(node: Arc<dyn Node>) -> Self {
    NodeRef(node)
  }
}
impl Deref for NodeRef {
  type Target = dyn Node;

  fn deref(&self) -> &Self::Target {
    &*self.0
  }
}
impl PartialEq for NodeRef {
  fn eq(&self, other: &Self) -> bool {
    self.name() == other.name()
  }
}
impl Eq for NodeRef {}
impl Hash for NodeRef {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.name().hash(state);
  }
}
impl PartialOrd for NodeRef {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}
impl Ord for NodeRef {
  fn cmp(&self, other: &Self) -> Ordering {
    self.name().cmp(other.name())
  }
}
impl fmt::Debug for NodeRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("NodeRef")
      .field("name", &self.name())
      .field("host", &self.host())
      .field("port", &self.port())
      .finish()
  }
}
impl fmt::Display for NodeRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name())
  }
}

/// A `host:port` pair, as found in seeds and reported by views.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize)]
pub struct NodeAddress {
  pub host: String,
  pub port: u16,
}
impl NodeAddress {
  pub fn new<S: Into<String>>(host: S, port: u16) -> NodeAddress {
    NodeAddress {
      host: host.into(),
      port: port,
    }
  }
}
impl FromStr for NodeAddress {
  type Err = Error;

  /// Parses `host:port`. The host is everything before the last colon and may not be empty; the
  /// port must be all digits and fit in 16 bits.
  fn from_str(s: &str) -> Result<Self> {
    let invalid = || Error::InvalidSeed {
      seed: s.to_string(),
    };
    let colon = s.rfind(':').ok_or_else(invalid)?;
    let (host, port) = (&s[..colon], &s[colon + 1..]);
    if host.is_empty() || port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
      return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok(NodeAddress::new(host, port))
  }
}
impl fmt::Display for NodeAddress {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.host, self.port)
  }
}

#[test]
fn test_node_address_parse() {
  assert_eq!(
    "localhost:6000".parse::<NodeAddress>().unwrap(),
    NodeAddress::new("localhost", 6000)
  );
  assert_eq!(
    "::1:6000".parse::<NodeAddress>().unwrap(),
    NodeAddress::new("::1", 6000)
  );
  for bad in ["localhost", ":6000", "localhost:", "localhost:60a0", "localhost:70000"].iter() {
    match bad.parse::<NodeAddress>() {
      Err(Error::InvalidSeed { seed }) => assert_eq!(&seed.as_str(), bad),
      other => panic!("{} parsed as {:?}", bad, other.map(|a| a.to_string())),
    }
  }
}
