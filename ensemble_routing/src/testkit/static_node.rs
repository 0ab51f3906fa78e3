use crate::core::{Command, Error, Node, NodeRef, Reply, Result};
use async_trait::async_trait;

/// A node that connects and disconnects without effect and cannot process any command. Enough
/// wherever only the identity of a node matters, such as partition tables and routes.
#[derive(Clone, Debug)]
pub struct StaticNode {
  name: String,
  host: String,
  port: u16,
}
impl StaticNode {
  pub fn new<N: Into<String>, H: Into<String>>(name: N, host: H, port: u16) -> StaticNode {
    StaticNode {
      name: name.into(),
      host: host.into(),
      port: port,
    }
  }
}
#[async_trait]
impl Node for StaticNode {
  fn name(&self) -> &str {
    self.name.as_str()
  }

  fn host(&self) -> &str {
    self.host.as_str()
  }

  fn port(&self) -> u16 {
    self.port
  }

  async fn connect(&self) -> Result<()> {
    Ok(())
  }

  async fn disconnect(&self) {}

  async fn send(&self, command: Command) -> Result<Reply> {
    Err(Error::Processing {
      node: self.name.clone(),
      reason: format!("static node cannot process {:?}", command),
    })
  }
}

pub fn static_node(name: &str) -> NodeRef {
  static_node_at(name, "localhost", 0)
}

pub fn static_node_at(name: &str, host: &str, port: u16) -> NodeRef {
  NodeRef::new(StaticNode::new(name, host, port))
}
