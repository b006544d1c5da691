use std::{collections::BTreeMap, ops::Bound};

use redb::{Database, ReadableTable, TableDefinition};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::StoreError;

// Table definitions

// Raw crawls
// Key: "<start_millis>_<end_millis>" (RawCrawlKey)
// Value: JSON RawCrawlRecord
pub(crate) const RAW_CRAWLS_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("raw_crawls");

// Processed crawl info
// Key: crawl id (CrawlId)
// Value: JSON CrawlRecord
pub(crate) const CRAWLS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("crawls");

// Changed nodes
// Key: "<pubkey>+<crawl>" (NodeKey, pubkey-major)
// Value: JSON NodeRecord
pub(crate) const NODES_TABLE: TableDefinition<&str, &str> = TableDefinition::new("nodes");

// Per-crawl node statistics
// Key: "<crawl>+<pubkey>" (NodeStatKey, crawl-major)
// Value: JSON NodeStatRecord
pub(crate) const CRAWL_NODE_STATS_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("crawl_node_stats");

// Connections
// Key: "<crawl>+<from>+<to>" (ConnectionKey)
// Value: JSON ConnectionRecord
pub(crate) const CONNECTIONS_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("connections");

/// Stored row of the `raw_crawls` table.
///
/// `data` and `exceptions` hold the crawler's payloads as JSON text; the
/// store never interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCrawlRecord {
    /// `ip:port` of the seed node the scan was started from.
    pub entry_ipp: String,
    /// The raw scan payload, JSON-encoded.
    pub data: String,
    /// Scan diagnostics, JSON-encoded.
    pub exceptions: String,
}

/// Stored row of the `crawls` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRecord {
    /// `ip:port` of the seed node, or empty if unknown.
    pub entry: String,
}

/// Stored row of the `nodes` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// The node's `ip:port`, or the literal `not_present`.
    pub ipp: String,
    /// The node's version, or the literal `not_present`.
    pub version: String,
}

/// Stored row of the `crawl_node_stats` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatRecord {
    /// The node's `ip:port`, or empty if unreachable.
    pub ipp: String,
    /// Reported software version, or empty.
    pub version: String,
    /// Reported uptime in seconds.
    pub uptime: u64,
    /// How long the probe of this node took, in milliseconds.
    pub request_time: Option<u64>,
    /// Diagnostics collected while probing the node.
    pub exceptions: String,
    /// Number of inbound connections reported for the node.
    pub in_count: u32,
    /// Number of outbound connections reported for the node.
    pub out_count: u32,
    /// Inbound peers gained since the previous crawl.
    pub in_add_count: u32,
    /// Inbound peers lost since the previous crawl.
    pub in_drop_count: u32,
    /// Outbound peers gained since the previous crawl.
    pub out_add_count: u32,
    /// Outbound peers lost since the previous crawl.
    pub out_drop_count: u32,
    /// The node's public key, duplicated into the row for filtered scans.
    pub pubkey: String,
}

/// Stored row of the `connections` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Target public key of the edge, duplicated into the row so inbound
    /// queries can filter on it.
    pub to: String,
}

/// Bounds and ordering of a row scan.
#[derive(Debug, Clone)]
pub(crate) struct ScanOptions {
    pub start: Bound<String>,
    pub stop: Bound<String>,
    pub limit: Option<usize>,
    pub descending: bool,
}

impl ScanOptions {
    /// Scan the whole table.
    pub fn full() -> Self {
        Self {
            start: Bound::Unbounded,
            stop: Bound::Unbounded,
            limit: None,
            descending: false,
        }
    }

    /// Scan `[start, stop]`, both inclusive.
    pub fn range(start: String, stop: String) -> Self {
        Self {
            start: Bound::Included(start),
            stop: Bound::Included(stop),
            ..Self::full()
        }
    }

    /// Scan `[start, stop)` as produced by the prefix bound helpers in
    /// [`crate::keys`].
    pub fn prefix((start, stop): (String, String)) -> Self {
        Self {
            start: Bound::Included(start),
            stop: Bound::Excluded(stop),
            ..Self::full()
        }
    }

    /// Scan exactly one key.
    pub fn exact(key: String) -> Self {
        Self::range(key.clone(), key)
    }

    /// Stop after `limit` rows.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Return rows in descending key order.
    pub fn reversed(mut self) -> Self {
        self.descending = true;
        self
    }
}

/// Create all tables so that later reads never race table creation.
pub(crate) fn create_tables(db: &Database) -> Result<(), StoreError> {
    let tx = db.begin_write()?;
    {
        let _ = tx.open_table(RAW_CRAWLS_TABLE)?;
        let _ = tx.open_table(CRAWLS_TABLE)?;
        let _ = tx.open_table(NODES_TABLE)?;
        let _ = tx.open_table(CRAWL_NODE_STATS_TABLE)?;
        let _ = tx.open_table(CONNECTIONS_TABLE)?;
    }
    tx.commit()?;
    Ok(())
}

/// Write a single row, JSON-encoding the record.
pub(crate) fn put_row<R: Serialize>(
    db: &Database,
    table: TableDefinition<&str, &str>,
    key: &str,
    row: &R,
) -> Result<(), StoreError> {
    let value = serde_json::to_string(row)?;
    let tx = db.begin_write()?;
    {
        let mut table = tx.open_table(table)?;
        table.insert(key, value.as_str())?;
    }
    tx.commit()?;
    Ok(())
}

/// Write a batch of rows in one transaction.
///
/// Single-transaction batching is an implementation convenience; callers
/// must not rely on cross-row atomicity.
pub(crate) fn put_rows<R: Serialize>(
    db: &Database,
    table: TableDefinition<&str, &str>,
    rows: &BTreeMap<String, R>,
) -> Result<(), StoreError> {
    let tx = db.begin_write()?;
    {
        let mut table = tx.open_table(table)?;
        for (key, row) in rows {
            let value = serde_json::to_string(row)?;
            table.insert(key.as_str(), value.as_str())?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Ranged scan returning decoded rows in key order.
///
/// Both bounds follow [`ScanOptions`]; an empty range yields an empty vec.
/// Rows that fail to decode abort the scan with an error rather than being
/// skipped.
pub(crate) fn scan_rows<R: DeserializeOwned>(
    db: &Database,
    table: TableDefinition<&str, &str>,
    opts: &ScanOptions,
) -> Result<Vec<(String, R)>, StoreError> {
    let tx = db.begin_read()?;
    let table = tx.open_table(table)?;
    let bounds = (as_str_bound(&opts.start), as_str_bound(&opts.stop));
    let range = table.range(bounds)?;
    let limit = opts.limit.unwrap_or(usize::MAX);

    let mut rows = Vec::new();
    if opts.descending {
        for item in range.rev().take(limit) {
            let (key, value) = item?;
            let row = serde_json::from_str(value.value())?;
            rows.push((key.value().to_string(), row));
        }
    } else {
        for item in range.take(limit) {
            let (key, value) = item?;
            let row = serde_json::from_str(value.value())?;
            rows.push((key.value().to_string(), row));
        }
    }
    Ok(rows)
}

fn as_str_bound(bound: &Bound<String>) -> Bound<&str> {
    match bound {
        Bound::Included(key) => Bound::Included(key.as_str()),
        Bound::Excluded(key) => Bound::Excluded(key.as_str()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

#[cfg(test)]
mod tests {
    use redb::backends::InMemoryBackend;

    use super::*;

    fn test_db() -> Database {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .unwrap();
        create_tables(&db).unwrap();
        db
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Row {
        n: u32,
    }

    fn fill(db: &Database) {
        let rows: BTreeMap<String, Row> = (0..5)
            .map(|n| (format!("key-{n}"), Row { n }))
            .collect();
        put_rows(db, CRAWLS_TABLE, &rows).unwrap();
    }

    #[test]
    fn scans_are_ordered_and_bounded() {
        let db = test_db();
        fill(&db);

        let all: Vec<(String, Row)> =
            scan_rows(&db, CRAWLS_TABLE, &ScanOptions::full()).unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.windows(2).all(|w| w[0].0 < w[1].0));

        let some: Vec<(String, Row)> = scan_rows(
            &db,
            CRAWLS_TABLE,
            &ScanOptions::range("key-1".to_string(), "key-3".to_string()),
        )
        .unwrap();
        assert_eq!(
            some.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            vec!["key-1", "key-2", "key-3"]
        );
    }

    #[test]
    fn descending_limit_returns_the_latest() {
        let db = test_db();
        fill(&db);

        let latest: Vec<(String, Row)> = scan_rows(
            &db,
            CRAWLS_TABLE,
            &ScanOptions::full().reversed().with_limit(1),
        )
        .unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].0, "key-4");
    }

    #[test]
    fn empty_range_yields_no_rows() {
        let db = test_db();
        fill(&db);

        let rows: Vec<(String, Row)> = scan_rows(
            &db,
            CRAWLS_TABLE,
            &ScanOptions::range("zz".to_string(), "zzz".to_string()),
        )
        .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn overwrites_keep_the_last_value() {
        let db = test_db();
        put_row(&db, CRAWLS_TABLE, "key", &Row { n: 1 }).unwrap();
        put_row(&db, CRAWLS_TABLE, "key", &Row { n: 2 }).unwrap();

        let rows: Vec<(String, Row)> = scan_rows(
            &db,
            CRAWLS_TABLE,
            &ScanOptions::exact("key".to_string()),
        )
        .unwrap();
        assert_eq!(rows, vec![("key".to_string(), Row { n: 2 })]);
    }

    #[test]
    fn undecodable_rows_fail_the_scan() {
        let db = test_db();
        put_row(&db, CRAWLS_TABLE, "key", &"not an object").unwrap();

        let res: Result<Vec<(String, Row)>, _> =
            scan_rows(&db, CRAWLS_TABLE, &ScanOptions::full());
        assert!(matches!(res, Err(StoreError::Encoding(_))));
    }
}
