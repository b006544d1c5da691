//! Storage and snapshot diffing for peer-to-peer network topology crawls.
//!
//! A crawler periodically walks the peer network and produces a snapshot of
//! its topology: the nodes it saw and the directed connections between them.
//! This crate persists those snapshots into an embedded sorted key-value
//! store and derives, for each new snapshot, which nodes appeared or changed
//! identity and how every node's peer sets evolved since the previous
//! snapshot.
//!
//! The interesting parts are the row key layout ([`keys`]), which encodes
//! time and network identity into flat sortable strings so that every query
//! is one contiguous range scan, and the diff engine ([`diff`]), which turns
//! two snapshots into changed-node and per-node statistics records. The
//! [`CrawlStore`] ties both to the database.

#![deny(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod crawl;
pub mod diff;
pub mod graph;
pub mod keys;
pub mod metrics;
pub mod store;
mod util;

pub use store::CrawlStore;
