//! Domain model for network crawls.
//!
//! A [`Crawl`] is one topology snapshot of the peer network: the set of nodes
//! that answered (or were reported) during the scan, and the directed
//! connections observed between them. A [`RawCrawl`] is the unprocessed scan
//! result as produced by the crawler, stored verbatim for reprocessing.
//!
//! All values here are plain data owned by the caller. The diff engine in
//! [`crate::diff`] and the key codec in [`crate::keys`] only borrow them.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public key identifying one node in the peer network.
///
/// Node ids are used as row key components, so they must never contain the
/// `+` key separator. Crawlers produce base58 public keys, which satisfy this
/// by construction.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// The string form of this node id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl FromStr for NodeId {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.into())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One node as observed during a single crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// The `ip:port` the node was reached at, if it was reachable.
    #[serde(default)]
    pub ipp: Option<String>,
    /// Reported software version.
    #[serde(default)]
    pub version: Option<String>,
    /// Reported uptime in seconds.
    #[serde(default)]
    pub uptime: u64,
    /// Number of inbound connections reported for the node.
    #[serde(default)]
    pub in_degree: u32,
    /// Number of outbound connections reported for the node.
    #[serde(default)]
    pub out_degree: u32,
    /// How long the probe of this node took, in milliseconds.
    #[serde(default)]
    pub request_time: Option<u64>,
    /// Diagnostics collected while probing the node.
    #[serde(default)]
    pub errors: Option<String>,
}

impl Node {
    /// Whether this node's identity-relevant fields match `other`.
    ///
    /// Two observations of the same public key count as the same identity iff
    /// both the `ip:port` and the version are unchanged.
    pub fn same_identity(&self, other: &Node) -> bool {
        self.ipp == other.ipp && self.version == other.version
    }
}

/// A directed edge observed within one crawl.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    /// The node that initiated the connection.
    pub from: NodeId,
    /// The node that was connected to.
    pub to: NodeId,
}

impl Connection {
    /// Create an edge from `from` to `to`.
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// A processed crawl: one snapshot of the network topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crawl {
    /// Externally assigned crawl key. By convention the crawler uses the
    /// string form of the raw crawl key ([`crate::keys::RawCrawlKey`]).
    pub id: crate::keys::CrawlId,
    /// When the scan started.
    pub start: DateTime<Utc>,
    /// When the scan finished.
    pub end: DateTime<Utc>,
    /// `ip:port` of the seed node the scan was started from.
    #[serde(default)]
    pub entry: Option<String>,
    /// All nodes observed during the scan, by public key.
    pub nodes: BTreeMap<NodeId, Node>,
    /// Directed connections observed during the scan. Duplicates are
    /// tolerated and ignored downstream.
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// Opaque diagnostics payload for the whole scan.
    #[serde(default)]
    pub errors: serde_json::Value,
}

/// An unprocessed crawl result, stored verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCrawl {
    /// When the scan started.
    pub start: DateTime<Utc>,
    /// When the scan finished.
    pub end: DateTime<Utc>,
    /// `ip:port` of the seed node the scan was started from.
    pub entry: String,
    /// The raw scan payload.
    pub data: serde_json::Value,
    /// Opaque diagnostics payload for the whole scan.
    #[serde(default)]
    pub errors: serde_json::Value,
}
