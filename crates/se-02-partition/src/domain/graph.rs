//! Undirected transaction multigraph
//!
//! A vertex is an account; every observed transaction between two distinct
//! accounts adds one edge. Parallel edges are kept, so multiplicity acts as
//! weight. Ordered maps keep every traversal deterministic.

use serde::{Deserialize, Serialize};
use shared_types::{digest, encode, Address, CodecResult, Hash};
use std::collections::BTreeMap;

/// An account plus optional locality metadata.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Vertex {
    pub addr: Address,
    pub location: Option<String>,
}

impl Vertex {
    pub fn new(addr: impl Into<Address>) -> Self {
        Self {
            addr: addr.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    vertices: BTreeMap<Address, Vertex>,
    edges: BTreeMap<Address, Vec<Address>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `v`. Returns `false` if the address was already present.
    pub fn add_vertex(&mut self, v: Vertex) -> bool {
        if self.vertices.contains_key(&v.addr) {
            return false;
        }
        self.vertices.insert(v.addr.clone(), v);
        true
    }

    /// Add one undirected edge, inserting missing endpoints.
    ///
    /// Self loops are ignored and reported as `false`.
    pub fn add_edge(&mut self, u: &str, v: &str) -> bool {
        if u == v {
            return false;
        }
        for addr in [u, v] {
            if !self.vertices.contains_key(addr) {
                self.add_vertex(Vertex::new(addr));
            }
        }
        self.edges.entry(u.to_string()).or_default().push(v.to_string());
        self.edges.entry(v.to_string()).or_default().push(u.to_string());
        true
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.vertices.contains_key(addr)
    }

    pub fn vertex(&self, addr: &str) -> Option<&Vertex> {
        self.vertices.get(addr)
    }

    /// Neighbours of `addr`, one entry per parallel edge.
    pub fn neighbors(&self, addr: &str) -> &[Address] {
        self.edges.get(addr).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn degree(&self, addr: &str) -> usize {
        self.neighbors(addr).len()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum::<usize>() / 2
    }

    /// Vertex addresses in ascending order.
    pub fn addrs(&self) -> impl Iterator<Item = &Address> {
        self.vertices.keys()
    }

    /// Adjacency lists in ascending vertex order.
    pub fn adjacency(&self) -> impl Iterator<Item = (&Address, &Vec<Address>)> {
        self.edges.iter()
    }

    /// Drop every edge. Vertices stay known.
    pub fn erase_edges(&mut self) {
        self.edges.clear();
    }

    /// SHA-256 over the canonical encoding of the graph.
    pub fn digest(&self) -> CodecResult<Hash> {
        Ok(digest(&encode(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_edge_is_undirected_multigraph() {
        let mut g = Graph::new();
        assert!(g.add_edge("a", "b"));
        assert!(g.add_edge("b", "a"));
        assert_eq!(g.vertex_count(), 2);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.neighbors("a"), &["b".to_string(), "b".to_string()]);
        assert_eq!(g.degree("b"), 2);
    }

    #[test]
    fn test_self_loop_ignored() {
        let mut g = Graph::new();
        assert!(!g.add_edge("a", "a"));
        assert_eq!(g.edge_count(), 0);
        assert!(!g.contains("a"));
    }

    #[test]
    fn test_erase_keeps_vertices() {
        let mut g = Graph::new();
        g.add_vertex(Vertex::new("x").with_location("eu"));
        g.add_edge("a", "b");
        g.erase_edges();
        assert_eq!(g.edge_count(), 0);
        assert_eq!(g.vertex_count(), 3);
        assert_eq!(g.vertex("x").and_then(|v| v.location.as_deref()), Some("eu"));
        assert!(g.neighbors("a").is_empty());
    }

    #[test]
    fn test_digest_tracks_content() {
        let mut g = Graph::new();
        let empty = g.digest().unwrap();
        g.add_edge("a", "b");
        assert_ne!(empty, g.digest().unwrap());
    }
}
