//! Row keys for the crawl tables.
//!
//! Every stored record is addressed by a flat string key whose lexicographic
//! order is the scan order of its table. Keys are composed of components
//! joined by `+`; component order differs per table so that each table's
//! dominant access pattern is a single contiguous range scan:
//!
//! - `nodes` is keyed pubkey-major (`<pubkey>+<crawl>`), so the full history
//!   of one node is one prefix scan.
//! - `crawl_node_stats` is keyed crawl-major (`<crawl>+<pubkey>`), so all
//!   stats of one crawl are one prefix scan.
//! - `connections` is keyed `<crawl>+<from>+<to>`, so a node's outbound
//!   edges within a crawl are one prefix scan.
//!
//! Prefix scan bounds are derived from the separator itself: `,` is the
//! character immediately after `+`, so `[<prefix>+, <prefix>,)` covers
//! exactly the keys starting with `<prefix>+`. Key components must therefore
//! never contain `+`.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};

use crate::{
    crawl::NodeId,
    util::{datetime_from_millis, format_millis, truncate_to_millis},
};

/// Separator between key components.
const SEPARATOR: char = '+';

/// The character immediately following [`SEPARATOR`], used as the exclusive
/// upper bound of prefix scans.
const SEPARATOR_SUCCESSOR: char = ',';

/// Errors produced when decoding a row key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// The key does not split into the expected number of components.
    #[error("key `{key}` has {found} components, expected {expected}")]
    MissingComponent {
        /// The offending key.
        key: String,
        /// How many components this key kind requires.
        expected: usize,
        /// How many components were found.
        found: usize,
    },
    /// A timestamp component is not valid epoch milliseconds.
    #[error("invalid timestamp component `{0}`")]
    InvalidTimestamp(String),
    /// A component is empty or contains the reserved `+` separator.
    #[error("invalid key component `{0}`")]
    InvalidComponent(String),
}

pub(crate) fn checked_component(s: &str) -> Result<&str, KeyError> {
    if s.is_empty() || s.contains(SEPARATOR) {
        return Err(KeyError::InvalidComponent(s.to_string()));
    }
    Ok(s)
}

/// Compute `[start, stop)` bounds covering every key that begins with
/// `prefix` followed by the component separator.
pub(crate) fn prefix_scan_bounds(prefix: &str) -> (String, String) {
    let start = format!("{prefix}{SEPARATOR}");
    let stop = format!("{prefix}{SEPARATOR_SUCCESSOR}");
    (start, stop)
}

/// Primary key of a raw crawl: the scan's time window.
///
/// Encodes as `<start_millis>_<end_millis>`. Epoch milliseconds are 13
/// digits wide for all realistic scan times, so the string order of these
/// keys matches their chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawCrawlKey {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl RawCrawlKey {
    /// Key for a scan that ran from `start` to `end`.
    ///
    /// Both instants are truncated to millisecond precision, the resolution
    /// the encoded key carries.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: truncate_to_millis(start),
            end: truncate_to_millis(end),
        }
    }

    /// When the scan started.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// When the scan finished.
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// The scan's time window as `(start, end)`.
    pub fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.start, self.end)
    }

    /// The scan's time window formatted as RFC 3339 with millisecond
    /// precision.
    pub fn window_rfc3339(&self) -> (String, String) {
        (format_millis(self.start), format_millis(self.end))
    }
}

impl fmt::Display for RawCrawlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}",
            self.start.timestamp_millis(),
            self.end.timestamp_millis()
        )
    }
}

impl FromStr for RawCrawlKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('_').collect();
        let &[start, end] = parts.as_slice() else {
            return Err(KeyError::MissingComponent {
                key: s.to_string(),
                expected: 2,
                found: parts.len(),
            });
        };
        let parse = |part: &str| {
            part.parse::<i64>()
                .ok()
                .and_then(datetime_from_millis)
                .ok_or_else(|| KeyError::InvalidTimestamp(part.to_string()))
        };
        Ok(Self {
            start: parse(start)?,
            end: parse(end)?,
        })
    }
}

/// Key of a processed crawl, assigned by the crawler.
///
/// Opaque to the store and ordered lexicographically. Crawlers that want
/// their crawls to scan in time order must use ids of uniform width; the
/// conventional choice is the string form of the [`RawCrawlKey`].
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(into = "String", try_from = "String")]
pub struct CrawlId(String);

impl CrawlId {
    /// Create a crawl id, rejecting empty ids and ids containing `+`.
    pub fn new(id: impl Into<String>) -> Result<Self, KeyError> {
        let id = id.into();
        checked_component(&id)?;
        Ok(Self(id))
    }

    /// The string form of this crawl id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CrawlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CrawlId {
    type Err = KeyError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CrawlId {
    type Error = KeyError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CrawlId> for String {
    fn from(value: CrawlId) -> Self {
        value.0
    }
}

impl From<RawCrawlKey> for CrawlId {
    fn from(value: RawCrawlKey) -> Self {
        // "<millis>_<millis>" contains neither `+` nor is it empty
        Self(value.to_string())
    }
}

/// Key in the `nodes` table: `<pubkey>+<crawl>`, pubkey-major.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey {
    node: NodeId,
    crawl: CrawlId,
}

impl NodeKey {
    /// Key for `node` as recorded by `crawl`.
    pub fn new(node: NodeId, crawl: CrawlId) -> Self {
        Self { node, crawl }
    }

    /// The node component.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// The crawl component.
    pub fn crawl(&self) -> &CrawlId {
        &self.crawl
    }

    /// Scan bounds covering every crawl's record of `node`.
    pub(crate) fn history_bounds(node: &NodeId) -> (String, String) {
        prefix_scan_bounds(node.as_str())
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.node, self.crawl)
    }
}

impl FromStr for NodeKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(SEPARATOR).collect();
        let &[node, crawl] = parts.as_slice() else {
            return Err(KeyError::MissingComponent {
                key: s.to_string(),
                expected: 2,
                found: parts.len(),
            });
        };
        Ok(Self {
            node: checked_component(node)?.into(),
            crawl: CrawlId::new(crawl)?,
        })
    }
}

/// Key in the `crawl_node_stats` table: `<crawl>+<pubkey>`, crawl-major.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeStatKey {
    crawl: CrawlId,
    node: NodeId,
}

impl NodeStatKey {
    /// Key for the stats of `node` within `crawl`.
    pub fn new(crawl: CrawlId, node: NodeId) -> Self {
        Self { crawl, node }
    }

    /// The crawl component.
    pub fn crawl(&self) -> &CrawlId {
        &self.crawl
    }

    /// The node component.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Scan bounds covering the stats of every node within `crawl`.
    pub(crate) fn crawl_bounds(crawl: &CrawlId) -> (String, String) {
        prefix_scan_bounds(crawl.as_str())
    }
}

impl fmt::Display for NodeStatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.crawl, self.node)
    }
}

impl FromStr for NodeStatKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(SEPARATOR).collect();
        let &[crawl, node] = parts.as_slice() else {
            return Err(KeyError::MissingComponent {
                key: s.to_string(),
                expected: 2,
                found: parts.len(),
            });
        };
        Ok(Self {
            crawl: CrawlId::new(crawl)?,
            node: checked_component(node)?.into(),
        })
    }
}

/// Key in the `connections` table: `<crawl>+<from>+<to>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionKey {
    crawl: CrawlId,
    from: NodeId,
    to: NodeId,
}

impl ConnectionKey {
    /// Key for the edge `from -> to` within `crawl`.
    pub fn new(crawl: CrawlId, from: NodeId, to: NodeId) -> Self {
        Self { crawl, from, to }
    }

    /// The crawl component.
    pub fn crawl(&self) -> &CrawlId {
        &self.crawl
    }

    /// The source node of the edge.
    pub fn from(&self) -> &NodeId {
        &self.from
    }

    /// The target node of the edge.
    pub fn to(&self) -> &NodeId {
        &self.to
    }

    /// Scan bounds covering every edge within `crawl`.
    pub(crate) fn crawl_bounds(crawl: &CrawlId) -> (String, String) {
        prefix_scan_bounds(crawl.as_str())
    }

    /// Scan bounds covering every edge leaving `from` within `crawl`.
    pub(crate) fn outbound_bounds(crawl: &CrawlId, from: &NodeId) -> (String, String) {
        prefix_scan_bounds(&format!("{crawl}{SEPARATOR}{from}"))
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.crawl, self.from, self.to
        )
    }
}

impl FromStr for ConnectionKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(SEPARATOR).collect();
        let &[crawl, from, to] = parts.as_slice() else {
            return Err(KeyError::MissingComponent {
                key: s.to_string(),
                expected: 3,
                found: parts.len(),
            });
        };
        Ok(Self {
            crawl: CrawlId::new(crawl)?,
            from: checked_component(from)?.into(),
            to: checked_component(to)?.into(),
        })
    }
}
