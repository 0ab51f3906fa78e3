//! Value types and collaborator seams shared by every other module: clusters, nodes, views, the
//! hash function and the crate-wide [`Error`].
//!
//! ### Nodes
//! A [`Node`] is an external collaborator: something that can be connected, disconnected and sent
//! a [`Command`]. The core only ever sends [`Command::Membership`]. Nodes are shared as
//! [`NodeRef`], whose equality, hashing and ordering all go by node name. This is what makes
//! partition assignment deterministic: every process sorts the same names the same way.
//!
//! ### Views
//! A [`View`] is an immutable membership snapshot of one cluster, as reported by one of its nodes.
//! Two views are diffed with [`View::changes_since`], giving the members that left and joined.

mod cluster;
mod error;
mod hash;
mod node;
mod view;

#[rustfmt::skip]
pub use {
  cluster::Cluster,
  error::Error,
  error::Result,
  hash::HashFunction,
  hash::WyHashFunction,
  node::Command,
  node::Node,
  node::NodeAddress,
  node::NodeFactory,
  node::NodeRef,
  node::Reply,
  view::difference,
  view::Member,
  view::View,
  view::ViewChanges,
};
