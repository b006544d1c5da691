//! Persistent store for crawl snapshots and their derived records.
//!
//! [`CrawlStore`] owns an embedded [`redb`] database with five tables: raw
//! crawl results, processed crawl info, changed nodes, per-crawl node stats,
//! and connections. Processing a crawl derives the changed-node and stats
//! records by diffing against the previous crawl ([`crate::diff`]) and
//! writes all four derived tables; the row keys ([`crate::keys`]) are laid
//! out so every query below is a single contiguous range scan.

use std::{collections::BTreeMap, ops::Bound, path::Path, sync::Arc};

use chrono::{DateTime, Utc};
use iroh_metrics::inc;
use redb::{backends::InMemoryBackend, Database};
use tracing::{debug, info};

use crate::{
    crawl::{Connection, Crawl, Node, NodeId, RawCrawl},
    diff::{self, NodeStats},
    keys::{self, ConnectionKey, CrawlId, KeyError, NodeKey, NodeStatKey, RawCrawlKey},
    metrics::Metrics,
};

mod tables;

pub use self::tables::{
    ConnectionRecord, CrawlRecord, NodeRecord, NodeStatRecord, RawCrawlRecord,
};
use self::tables::ScanOptions;

/// Column value stored when a changed node has no `ip:port` or version.
const NOT_PRESENT: &str = "not_present";

/// Errors returned by the crawl store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No row satisfies a by-key or by-latest query.
    #[error("no row found for the requested key")]
    NotFound,
    /// A key failed to decode into its expected components.
    #[error("malformed row key")]
    MalformedKey(#[from] KeyError),
    /// A row value failed to encode or decode.
    #[error("malformed row data")]
    Encoding(#[from] serde_json::Error),
    /// Filesystem failure while opening the database.
    #[error("failed to access the database file")]
    Io(#[from] std::io::Error),
    /// The underlying database failed.
    #[error("store failure")]
    Store(#[from] redb::Error),
}

impl From<redb::DatabaseError> for StoreError {
    fn from(value: redb::DatabaseError) -> Self {
        Self::Store(value.into())
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(value: redb::TransactionError) -> Self {
        Self::Store(value.into())
    }
}

impl From<redb::TableError> for StoreError {
    fn from(value: redb::TableError) -> Self {
        Self::Store(value.into())
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(value: redb::StorageError) -> Self {
        Self::Store(value.into())
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(value: redb::CommitError) -> Self {
        Self::Store(value.into())
    }
}

/// Which side of a node's connections to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Edges pointing at the node.
    In,
    /// Edges leaving the node.
    Out,
}

/// The latest known identity of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeState {
    /// The node's public key.
    pub pubkey: NodeId,
    /// The node's `ip:port`, or the literal `not_present`.
    pub ipp: String,
    /// The node's version, or the literal `not_present`.
    pub version: String,
    /// End of the crawl window that last updated the node, when the crawl
    /// id encodes one.
    pub last_updated: Option<DateTime<Utc>>,
}

/// A store for crawl snapshots.
///
/// Cheap to clone; all clones share the same database handle. Every method
/// takes `&self` and the underlying database serializes writes, so a store
/// may be used from any number of tasks without coordination.
#[derive(Debug, Clone)]
pub struct CrawlStore {
    db: Arc<Database>,
}

impl CrawlStore {
    /// Open or create a persistent store at `path`.
    pub fn persistent(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!("opening crawl database at {}", path.to_string_lossy());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::builder().create(path)?;
        Self::open(db)
    }

    /// Create an in-memory store.
    pub fn in_memory() -> Result<Self, StoreError> {
        info!("using in-memory crawl database");
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::open(db)
    }

    fn open(db: Database) -> Result<Self, StoreError> {
        tables::create_tables(&db)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Store an unprocessed crawl result, keyed by its time window.
    ///
    /// Returns the key the crawl was stored under.
    pub async fn store_raw_crawl(&self, crawl: &RawCrawl) -> Result<RawCrawlKey, StoreError> {
        let key = RawCrawlKey::new(crawl.start, crawl.end);
        let record = RawCrawlRecord {
            entry_ipp: crawl.entry.clone(),
            data: serde_json::to_string(&crawl.data)?,
            exceptions: serde_json::to_string(&crawl.errors)?,
        };
        tables::put_row(&self.db, tables::RAW_CRAWLS_TABLE, &key.to_string(), &record)?;
        inc!(Metrics, raw_crawls_stored);
        debug!("stored raw crawl {key}");
        Ok(key)
    }

    /// Raw crawls with keys in `[start, stop]`, in key order.
    pub async fn raw_crawls(
        &self,
        start: &RawCrawlKey,
        stop: &RawCrawlKey,
        limit: Option<usize>,
        descending: bool,
    ) -> Result<Vec<(RawCrawlKey, RawCrawlRecord)>, StoreError> {
        let mut opts = ScanOptions::range(start.to_string(), stop.to_string());
        opts.limit = limit;
        opts.descending = descending;
        self.scan_raw(opts)
    }

    /// The most recent raw crawl.
    pub async fn latest_raw_crawl(&self) -> Result<(RawCrawlKey, RawCrawlRecord), StoreError> {
        let rows = self.scan_raw(ScanOptions::full().reversed().with_limit(1))?;
        rows.into_iter().next().ok_or_else(not_found)
    }

    /// The raw crawl stored under exactly `key`.
    pub async fn get_raw_crawl(&self, key: &RawCrawlKey) -> Result<RawCrawlRecord, StoreError> {
        let rows = self.scan_raw(ScanOptions::exact(key.to_string()))?;
        rows.into_iter()
            .next()
            .map(|(_, record)| record)
            .ok_or_else(not_found)
    }

    fn scan_raw(
        &self,
        opts: ScanOptions,
    ) -> Result<Vec<(RawCrawlKey, RawCrawlRecord)>, StoreError> {
        inc!(Metrics, store_scans);
        let rows =
            tables::scan_rows::<RawCrawlRecord>(&self.db, tables::RAW_CRAWLS_TABLE, &opts)?;
        rows.into_iter()
            .map(|(key, record)| Ok((key.parse()?, record)))
            .collect()
    }

    /// Store a processed crawl together with the records derived from
    /// diffing it against `old`.
    ///
    /// The crawl info, changed nodes, node stats and connections are written
    /// concurrently. The first failure is returned; the remaining writes may
    /// or may not have completed by then.
    pub async fn store_processed_crawl(
        &self,
        new: &Crawl,
        old: Option<&Crawl>,
    ) -> Result<CrawlId, StoreError> {
        // node ids become key components; reject ids that would corrupt
        // the key space before anything is written
        for id in new
            .nodes
            .keys()
            .chain(new.connections.iter().flat_map(|conn| [&conn.from, &conn.to]))
        {
            keys::checked_component(id.as_str())?;
        }

        let changed = diff::changed_nodes(&new.nodes, old.map(|crawl| &crawl.nodes));
        let stats = diff::node_stats(new, old);
        debug!(
            crawl = %new.id,
            nodes = new.nodes.len(),
            changed = changed.len(),
            "storing processed crawl"
        );

        let (r1, r2, r3, r4) = tokio::join!(
            self.put_crawl_info(new),
            self.put_changed_nodes(&new.id, &changed),
            self.put_node_stats(&new.id, &stats),
            self.put_connections(&new.id, &new.connections),
        );
        r1?;
        r2?;
        r3?;
        r4?;
        inc!(Metrics, crawls_stored);
        Ok(new.id.clone())
    }

    async fn put_crawl_info(&self, crawl: &Crawl) -> Result<(), StoreError> {
        let record = CrawlRecord {
            entry: crawl.entry.clone().unwrap_or_default(),
        };
        tables::put_row(&self.db, tables::CRAWLS_TABLE, crawl.id.as_str(), &record)
    }

    async fn put_changed_nodes(
        &self,
        crawl: &CrawlId,
        nodes: &BTreeMap<NodeId, Node>,
    ) -> Result<(), StoreError> {
        let rows: BTreeMap<String, NodeRecord> = nodes
            .iter()
            .map(|(pubkey, node)| {
                let key = NodeKey::new(pubkey.clone(), crawl.clone());
                let record = NodeRecord {
                    ipp: node.ipp.clone().unwrap_or_else(|| NOT_PRESENT.to_string()),
                    version: node
                        .version
                        .clone()
                        .unwrap_or_else(|| NOT_PRESENT.to_string()),
                };
                (key.to_string(), record)
            })
            .collect();
        tables::put_rows(&self.db, tables::NODES_TABLE, &rows)
    }

    async fn put_node_stats(
        &self,
        crawl: &CrawlId,
        stats: &BTreeMap<NodeId, NodeStats>,
    ) -> Result<(), StoreError> {
        let rows: BTreeMap<String, NodeStatRecord> = stats
            .iter()
            .map(|(pubkey, stats)| {
                let key = NodeStatKey::new(crawl.clone(), pubkey.clone());
                let record = NodeStatRecord {
                    ipp: stats.ipp.clone().unwrap_or_default(),
                    version: stats.version.clone().unwrap_or_default(),
                    uptime: stats.uptime,
                    request_time: stats.request_time,
                    exceptions: stats.errors.clone().unwrap_or_default(),
                    in_count: stats.in_count,
                    out_count: stats.out_count,
                    in_add_count: stats.in_add_count,
                    in_drop_count: stats.in_drop_count,
                    out_add_count: stats.out_add_count,
                    out_drop_count: stats.out_drop_count,
                    pubkey: pubkey.to_string(),
                };
                (key.to_string(), record)
            })
            .collect();
        tables::put_rows(&self.db, tables::CRAWL_NODE_STATS_TABLE, &rows)
    }

    async fn put_connections(
        &self,
        crawl: &CrawlId,
        connections: &[Connection],
    ) -> Result<(), StoreError> {
        // keying by the full edge deduplicates repeated observations
        let rows: BTreeMap<String, ConnectionRecord> = connections
            .iter()
            .map(|conn| {
                let key =
                    ConnectionKey::new(crawl.clone(), conn.from.clone(), conn.to.clone());
                let record = ConnectionRecord {
                    to: conn.to.to_string(),
                };
                (key.to_string(), record)
            })
            .collect();
        tables::put_rows(&self.db, tables::CONNECTIONS_TABLE, &rows)
    }

    /// Info of the crawl stored under `id`, falling back to the nearest
    /// earlier crawl, or the latest crawl when no id is given.
    pub async fn get_crawl_info(
        &self,
        id: Option<&CrawlId>,
    ) -> Result<(CrawlId, CrawlRecord), StoreError> {
        let opts = ScanOptions {
            start: Bound::Unbounded,
            stop: match id {
                Some(id) => Bound::Included(id.to_string()),
                None => Bound::Unbounded,
            },
            limit: Some(1),
            descending: true,
        };
        inc!(Metrics, store_scans);
        let rows = tables::scan_rows::<CrawlRecord>(&self.db, tables::CRAWLS_TABLE, &opts)?;
        let (key, record) = rows.into_iter().next().ok_or_else(not_found)?;
        Ok((key.parse()?, record))
    }

    /// Every stored identity change of `node`, earliest crawl first.
    ///
    /// Only crawls in which the node appeared for the first time or changed
    /// identity have a row, so consecutive rows describe distinct states.
    pub async fn node_history(
        &self,
        node: &NodeId,
    ) -> Result<Vec<(NodeKey, NodeRecord)>, StoreError> {
        let opts = ScanOptions::prefix(NodeKey::history_bounds(node));
        inc!(Metrics, store_scans);
        let rows = tables::scan_rows::<NodeRecord>(&self.db, tables::NODES_TABLE, &opts)?;
        rows.into_iter()
            .map(|(key, record)| Ok((key.parse()?, record)))
            .collect()
    }

    /// The latest known identity of `node`.
    pub async fn node_state(&self, node: &NodeId) -> Result<NodeState, StoreError> {
        let opts = ScanOptions::prefix(NodeKey::history_bounds(node))
            .reversed()
            .with_limit(1);
        inc!(Metrics, store_scans);
        let rows = tables::scan_rows::<NodeRecord>(&self.db, tables::NODES_TABLE, &opts)?;
        let (key, record) = rows.into_iter().next().ok_or_else(not_found)?;
        let key: NodeKey = key.parse()?;
        // crawl ids conventionally carry the crawl window; surface its end
        // as the update time when this one does
        let last_updated = key
            .crawl()
            .as_str()
            .parse::<RawCrawlKey>()
            .ok()
            .map(|raw| raw.end());
        Ok(NodeState {
            pubkey: node.clone(),
            ipp: record.ipp,
            version: record.version,
            last_updated,
        })
    }

    /// Stats of every node recorded by `crawl`, in pubkey order.
    pub async fn crawl_node_stats(
        &self,
        crawl: &CrawlId,
    ) -> Result<Vec<(NodeStatKey, NodeStatRecord)>, StoreError> {
        let opts = ScanOptions::prefix(NodeStatKey::crawl_bounds(crawl));
        inc!(Metrics, store_scans);
        let rows =
            tables::scan_rows::<NodeStatRecord>(&self.db, tables::CRAWL_NODE_STATS_TABLE, &opts)?;
        rows.into_iter()
            .map(|(key, record)| Ok((key.parse()?, record)))
            .collect()
    }

    /// Connections of `node` within `crawl`.
    ///
    /// Outbound edges are isolated by their key prefix. Inbound edges cannot
    /// be, so the crawl's full connection range is scanned and filtered on
    /// the decoded target column.
    pub async fn connections(
        &self,
        crawl: &CrawlId,
        node: &NodeId,
        direction: Direction,
    ) -> Result<Vec<(ConnectionKey, ConnectionRecord)>, StoreError> {
        match direction {
            Direction::Out => {
                self.scan_connections(ScanOptions::prefix(ConnectionKey::outbound_bounds(
                    crawl, node,
                )))
            }
            Direction::In => {
                let mut rows =
                    self.scan_connections(ScanOptions::prefix(ConnectionKey::crawl_bounds(
                        crawl,
                    )))?;
                rows.retain(|(_, record)| record.to == node.as_str());
                Ok(rows)
            }
        }
    }

    /// Every connection observed by `crawl`, in key order.
    pub async fn all_connections(
        &self,
        crawl: &CrawlId,
    ) -> Result<Vec<(ConnectionKey, ConnectionRecord)>, StoreError> {
        self.scan_connections(ScanOptions::prefix(ConnectionKey::crawl_bounds(crawl)))
    }

    fn scan_connections(
        &self,
        opts: ScanOptions,
    ) -> Result<Vec<(ConnectionKey, ConnectionRecord)>, StoreError> {
        inc!(Metrics, store_scans);
        let rows =
            tables::scan_rows::<ConnectionRecord>(&self.db, tables::CONNECTIONS_TABLE, &opts)?;
        rows.into_iter()
            .map(|(key, record)| Ok((key.parse()?, record)))
            .collect()
    }
}

fn not_found() -> StoreError {
    inc!(Metrics, store_misses);
    StoreError::NotFound
}
