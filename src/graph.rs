//! Adjacency views over a crawl's connection set.

use std::collections::{BTreeMap, HashSet};

use crate::crawl::{Connection, NodeId};

/// Inbound and outbound peer lists for every node seen in a connection set.
///
/// Peer lists keep the order in which edges were encountered; duplicate
/// edges are ignored. A node that never appears simply has empty peer lists,
/// and an empty connection set yields an empty graph. Self-loops are kept
/// as both an inbound and an outbound peer.
#[derive(Debug, Clone, Default)]
pub struct PeerGraph {
    outgoing: BTreeMap<NodeId, Vec<NodeId>>,
    ingoing: BTreeMap<NodeId, Vec<NodeId>>,
}

impl PeerGraph {
    /// Build the adjacency views for a set of directed edges.
    pub fn from_connections<'a>(
        connections: impl IntoIterator<Item = &'a Connection>,
    ) -> Self {
        let mut graph = PeerGraph::default();
        let mut seen = HashSet::new();
        for conn in connections {
            if !seen.insert((&conn.from, &conn.to)) {
                continue;
            }
            graph
                .outgoing
                .entry(conn.from.clone())
                .or_default()
                .push(conn.to.clone());
            graph
                .ingoing
                .entry(conn.to.clone())
                .or_default()
                .push(conn.from.clone());
        }
        graph
    }

    /// Peers that `node` connects out to, in encounter order.
    pub fn outgoing(&self, node: &NodeId) -> &[NodeId] {
        self.outgoing.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Peers that connect in to `node`, in encounter order.
    pub fn ingoing(&self, node: &NodeId) -> &[NodeId] {
        self.ingoing.get(node).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_connections_yield_empty_graph() {
        let connections: Vec<Connection> = Vec::new();
        let graph = PeerGraph::from_connections(&connections);
        assert!(graph.outgoing(&"nodeA".into()).is_empty());
        assert!(graph.ingoing(&"nodeA".into()).is_empty());
    }

    #[test]
    fn adjacency_follows_edge_direction() {
        let connections = vec![
            Connection::new("nodeA", "nodeB"),
            Connection::new("nodeA", "nodeC"),
        ];
        let graph = PeerGraph::from_connections(&connections);
        assert_eq!(
            graph.outgoing(&"nodeA".into()),
            ["nodeB".into(), "nodeC".into()].as_slice()
        );
        assert_eq!(graph.ingoing(&"nodeB".into()), ["nodeA".into()].as_slice());
        assert_eq!(graph.ingoing(&"nodeC".into()), ["nodeA".into()].as_slice());
        assert!(graph.ingoing(&"nodeA".into()).is_empty());
        assert!(graph.outgoing(&"nodeB".into()).is_empty());
    }

    #[test]
    fn duplicate_edges_are_ignored() {
        let connections = vec![
            Connection::new("nodeA", "nodeB"),
            Connection::new("nodeA", "nodeB"),
        ];
        let graph = PeerGraph::from_connections(&connections);
        assert_eq!(graph.outgoing(&"nodeA".into()).len(), 1);
        assert_eq!(graph.ingoing(&"nodeB".into()).len(), 1);
    }

    #[test]
    fn self_loops_are_tolerated() {
        let connections = vec![Connection::new("nodeA", "nodeA")];
        let graph = PeerGraph::from_connections(&connections);
        assert_eq!(graph.outgoing(&"nodeA".into()), ["nodeA".into()].as_slice());
        assert_eq!(graph.ingoing(&"nodeA".into()), ["nodeA".into()].as_slice());
    }
}
