//! Snapshot diffing between consecutive crawls.
//!
//! Given the latest crawl and (optionally) the one before it, this module
//! computes the records derived from their difference: the nodes whose
//! identity changed, and per-node statistics counting how each node's peer
//! sets evolved. Added peers are peers present in the new crawl but not the
//! old one; dropped peers the reverse. Both computations are pure and never
//! fail: a missing previous crawl simply means every node is new and no peer
//! existed before.

use std::collections::BTreeMap;

use crate::{
    crawl::{Crawl, Node, NodeId},
    graph::PeerGraph,
};

/// Per-node statistics derived from one crawl and its predecessor.
///
/// Combines the node's own metadata with counters describing how its peer
/// sets changed since the previous crawl. Built once per diff computation
/// and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStats {
    /// The node's public key.
    pub pubkey: NodeId,
    /// The `ip:port` the node was reached at, if any.
    pub ipp: Option<String>,
    /// Reported software version.
    pub version: Option<String>,
    /// Reported uptime in seconds.
    pub uptime: u64,
    /// How long the probe of this node took, in milliseconds.
    pub request_time: Option<u64>,
    /// Diagnostics collected while probing the node.
    pub errors: Option<String>,
    /// Number of inbound connections reported for the node.
    pub in_count: u32,
    /// Number of outbound connections reported for the node.
    pub out_count: u32,
    /// Inbound peers present now but absent in the previous crawl.
    pub in_add_count: u32,
    /// Inbound peers present in the previous crawl but absent now.
    pub in_drop_count: u32,
    /// Outbound peers present now but absent in the previous crawl.
    pub out_add_count: u32,
    /// Outbound peers present in the previous crawl but absent now.
    pub out_drop_count: u32,
}

/// The nodes of `new_nodes` that are new or whose identity changed.
///
/// A node is included iff it has no entry in `old_nodes`, or its `ip:port`
/// or version differ from that entry. Nodes that disappeared between the two
/// crawls are not reported; they have no row in the new crawl to attach a
/// change to, and the per-crawl stats table records their absence instead.
pub fn changed_nodes(
    new_nodes: &BTreeMap<NodeId, Node>,
    old_nodes: Option<&BTreeMap<NodeId, Node>>,
) -> BTreeMap<NodeId, Node> {
    new_nodes
        .iter()
        .filter(|(pubkey, node)| match old_nodes.and_then(|m| m.get(*pubkey)) {
            Some(old) => !old.same_identity(node),
            None => true,
        })
        .map(|(pubkey, node)| (pubkey.clone(), node.clone()))
        .collect()
}

/// Per-node stats for every node of `new`, diffed against `old`.
///
/// With no previous crawl every current peer counts as added and nothing as
/// dropped. An empty node set yields an empty result.
pub fn node_stats(new: &Crawl, old: Option<&Crawl>) -> BTreeMap<NodeId, NodeStats> {
    let new_peers = PeerGraph::from_connections(&new.connections);
    let old_peers = old
        .map(|crawl| PeerGraph::from_connections(&crawl.connections))
        .unwrap_or_default();

    new.nodes
        .iter()
        .map(|(pubkey, node)| {
            let stats = NodeStats {
                pubkey: pubkey.clone(),
                ipp: node.ipp.clone(),
                version: node.version.clone(),
                uptime: node.uptime,
                request_time: node.request_time,
                errors: node.errors.clone(),
                in_count: node.in_degree,
                out_count: node.out_degree,
                in_add_count: peers_missing_from(
                    new_peers.ingoing(pubkey),
                    old_peers.ingoing(pubkey),
                ),
                in_drop_count: peers_missing_from(
                    old_peers.ingoing(pubkey),
                    new_peers.ingoing(pubkey),
                ),
                out_add_count: peers_missing_from(
                    new_peers.outgoing(pubkey),
                    old_peers.outgoing(pubkey),
                ),
                out_drop_count: peers_missing_from(
                    old_peers.outgoing(pubkey),
                    new_peers.outgoing(pubkey),
                ),
            };
            (pubkey.clone(), stats)
        })
        .collect()
}

/// Count the peers of `list` that do not appear in `other`.
fn peers_missing_from(list: &[NodeId], other: &[NodeId]) -> u32 {
    list.iter().filter(|peer| !other.contains(peer)).count() as u32
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::{crawl::Connection, keys::CrawlId};

    fn node(ipp: &str, version: &str) -> Node {
        Node {
            ipp: Some(ipp.to_string()),
            version: Some(version.to_string()),
            ..Default::default()
        }
    }

    fn nodes(entries: &[(&str, Node)]) -> BTreeMap<NodeId, Node> {
        entries
            .iter()
            .map(|(pubkey, node)| (NodeId::from(*pubkey), node.clone()))
            .collect()
    }

    fn crawl(id: &str, nodes: BTreeMap<NodeId, Node>, connections: Vec<Connection>) -> Crawl {
        let start = DateTime::<Utc>::from_timestamp_millis(1_000).unwrap();
        let end = DateTime::<Utc>::from_timestamp_millis(2_000).unwrap();
        Crawl {
            id: CrawlId::new(id).unwrap(),
            start,
            end,
            entry: None,
            nodes,
            connections,
            errors: serde_json::Value::Null,
        }
    }

    #[test]
    fn everything_changes_against_an_empty_baseline() {
        let new = nodes(&[("nodeA", node("1.1.1.1:51235", "0.30.1"))]);
        assert_eq!(changed_nodes(&new, None), new);
        assert_eq!(changed_nodes(&new, Some(&BTreeMap::new())), new);
    }

    #[test]
    fn identical_snapshots_yield_no_changes() {
        let set = nodes(&[
            ("nodeA", node("1.1.1.1:51235", "0.30.1")),
            ("nodeB", node("2.2.2.2:51235", "0.30.0")),
        ]);
        assert!(changed_nodes(&set, Some(&set)).is_empty());
    }

    #[test]
    fn ipp_or_version_changes_are_reported() {
        let old = nodes(&[
            ("nodeA", node("1.1.1.1:51235", "0.30.1")),
            ("nodeB", node("2.2.2.2:51235", "0.30.0")),
            ("nodeC", node("3.3.3.3:51235", "0.30.0")),
        ]);
        let new = nodes(&[
            // moved
            ("nodeA", node("9.9.9.9:51235", "0.30.1")),
            // upgraded
            ("nodeB", node("2.2.2.2:51235", "0.30.1")),
            // unchanged
            ("nodeC", node("3.3.3.3:51235", "0.30.0")),
            // new
            ("nodeD", node("4.4.4.4:51235", "0.30.1")),
        ]);
        let changed = changed_nodes(&new, Some(&old));
        assert_eq!(
            changed.keys().map(|k| k.as_str()).collect::<Vec<_>>(),
            vec!["nodeA", "nodeB", "nodeD"]
        );
    }

    #[test]
    fn vanished_nodes_are_not_reported() {
        let old = nodes(&[("nodeA", node("1.1.1.1:51235", "0.30.1"))]);
        let new = nodes(&[]);
        assert!(changed_nodes(&new, Some(&old)).is_empty());
    }

    #[test]
    fn first_crawl_counts_all_peers_as_added() {
        let mut node_b = node("2.2.2.2:51235", "0.30.1");
        node_b.in_degree = 1;
        let new = crawl(
            "1000_2000",
            nodes(&[("nodeA", node("1.1.1.1:51235", "0.30.1")), ("nodeB", node_b)]),
            vec![Connection::new("nodeA", "nodeB")],
        );

        let stats = node_stats(&new, None);
        let b = &stats[&NodeId::from("nodeB")];
        assert_eq!(b.in_count, 1);
        assert_eq!(b.in_add_count, 1);
        assert_eq!(b.in_drop_count, 0);
        assert_eq!(b.out_add_count, 0);
        assert_eq!(b.out_drop_count, 0);

        let a = &stats[&NodeId::from("nodeA")];
        assert_eq!(a.out_add_count, 1);
        assert_eq!(a.in_add_count, 0);
    }

    #[test]
    fn retained_and_dropped_peers_are_counted() {
        let old = crawl(
            "1000_2000",
            nodes(&[
                ("nodeA", node("1.1.1.1:51235", "0.30.1")),
                ("nodeB", node("2.2.2.2:51235", "0.30.1")),
                ("nodeC", node("3.3.3.3:51235", "0.30.1")),
            ]),
            vec![
                Connection::new("nodeA", "nodeB"),
                Connection::new("nodeC", "nodeB"),
            ],
        );
        let new = crawl(
            "3000_4000",
            old.nodes.clone(),
            vec![
                // nodeA -> nodeB retained, nodeC -> nodeB dropped, nodeB -> nodeC added
                Connection::new("nodeA", "nodeB"),
                Connection::new("nodeB", "nodeC"),
            ],
        );

        let stats = node_stats(&new, Some(&old));
        let b = &stats[&NodeId::from("nodeB")];
        // the retained inbound peer nodeA is neither added nor dropped
        assert_eq!(b.in_add_count, 0);
        assert_eq!(b.in_drop_count, 1);
        assert_eq!(b.out_add_count, 1);
        assert_eq!(b.out_drop_count, 0);

        let c = &stats[&NodeId::from("nodeC")];
        assert_eq!(c.in_add_count, 1);
        assert_eq!(c.out_drop_count, 1);
    }

    #[test]
    fn empty_node_set_yields_empty_stats() {
        let new = crawl("1000_2000", BTreeMap::new(), Vec::new());
        assert!(node_stats(&new, None).is_empty());
    }

    #[test]
    fn nodes_without_connections_have_zero_diff_counts() {
        let new = crawl(
            "1000_2000",
            nodes(&[("nodeA", node("1.1.1.1:51235", "0.30.1"))]),
            Vec::new(),
        );
        let stats = node_stats(&new, None);
        let a = &stats[&NodeId::from("nodeA")];
        assert_eq!(
            (a.in_add_count, a.in_drop_count, a.out_add_count, a.out_drop_count),
            (0, 0, 0, 0)
        );
    }
}
