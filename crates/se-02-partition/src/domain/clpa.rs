//! # Constrained Label Propagation
//!
//! Every vertex carries a shard label. A pass visits the vertices in
//! address order and moves each one to the neighbouring shard with the
//! best score
//!
//! ```text
//! score(v, k) = edges(v, k) / deg(v) * (1 - β * W[k] / max(min W, 1))
//! ```
//!
//! where `W[k]` is the edge weight associated with shard `k`. The penalty
//! term keeps already heavy shards from absorbing everything.
//!
//! ## Invariants
//!
//! - A move never empties a shard while `shard_num <= |V|`. With more
//!   shards than vertices some shard is empty anyway, so the guard is off
//!   and a move may empty a shard.
//! - A vertex is relabelled at most `retry_cap` times per run.
//! - `W`, `min W` and the cross-shard edge count are maintained
//!   incrementally in `O(deg(v))` after each move.

use crate::domain::graph::{Graph, Vertex};
use crate::error::{PartitionError, PartitionResult};
use serde::Serialize;
use shared_types::{default_shard, digest, encode, Address, ClpaParams, Hash, ShardId};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Result of one partition run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionOutcome {
    /// Only the vertices whose label changed, with their new shard.
    pub modified: BTreeMap<Address, ShardId>,
    pub cross_shard_edges: usize,
    pub passes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClpaState {
    graph: Graph,
    partition_map: BTreeMap<Address, ShardId>,
    edges_to_shard: Vec<i64>,
    vertices_in_shard: Vec<usize>,
    min_edges_to_shard: i64,
    cross_shard_edges: i64,
    weight_penalty: f64,
    max_iterations: usize,
    retry_cap: u32,
    shard_num: u64,
}

impl ClpaState {
    pub fn new(params: &ClpaParams, shard_num: u64) -> PartitionResult<Self> {
        if shard_num == 0 {
            return Err(PartitionError::NoShards);
        }
        if !(0.0..=1.0).contains(&params.weight_penalty) {
            return Err(PartitionError::InvalidWeightPenalty(params.weight_penalty));
        }
        let n = shard_num as usize;
        Ok(Self {
            graph: Graph::new(),
            partition_map: BTreeMap::new(),
            edges_to_shard: vec![0; n],
            vertices_in_shard: vec![0; n],
            min_edges_to_shard: 0,
            cross_shard_edges: 0,
            weight_penalty: params.weight_penalty,
            max_iterations: params.max_iterations,
            retry_cap: params.retry_cap,
            shard_num,
        })
    }

    /// Add a vertex, labelling it with its previous or default shard.
    pub fn add_vertex(&mut self, v: Vertex) {
        let addr = v.addr.clone();
        if !self.graph.add_vertex(v) {
            return;
        }
        let shard_num = self.shard_num;
        let shard = *self
            .partition_map
            .entry(addr)
            .or_insert_with_key(|a| default_shard(a, shard_num));
        self.vertices_in_shard[shard as usize] += 1;
    }

    /// Record one transaction between `u` and `v`.
    pub fn add_edge(&mut self, u: &str, v: &str) {
        if u == v {
            return;
        }
        for addr in [u, v] {
            if !self.graph.contains(addr) {
                self.add_vertex(Vertex::new(addr));
            }
        }
        self.graph.add_edge(u, v);
    }

    /// Current label of `addr`, falling back to the default shard.
    pub fn shard_of(&self, addr: &str) -> ShardId {
        self.partition_map
            .get(addr)
            .copied()
            .unwrap_or_else(|| default_shard(addr, self.shard_num))
    }

    /// Label every vertex with its default shard.
    ///
    /// May leave a shard empty when addresses cluster.
    pub fn init_partition(&mut self) {
        self.vertices_in_shard = vec![0; self.shard_num as usize];
        self.partition_map.clear();
        let addrs: Vec<Address> = self.graph.addrs().cloned().collect();
        for addr in addrs {
            let shard = default_shard(&addr, self.shard_num);
            self.vertices_in_shard[shard as usize] += 1;
            self.partition_map.insert(addr, shard);
        }
        self.compute_edges_to_shard();
    }

    /// Round-robin labelling that leaves no shard empty.
    pub fn stable_init_partition(&mut self) -> PartitionResult<()> {
        let vertices = self.graph.vertex_count();
        if self.shard_num as usize > vertices {
            return Err(PartitionError::TooManyShards {
                shards: self.shard_num,
                vertices,
            });
        }
        self.vertices_in_shard = vec![0; self.shard_num as usize];
        self.partition_map.clear();
        let addrs: Vec<Address> = self.graph.addrs().cloned().collect();
        for (i, addr) in addrs.into_iter().enumerate() {
            let shard = i as u64 % self.shard_num;
            self.vertices_in_shard[shard as usize] += 1;
            self.partition_map.insert(addr, shard);
        }
        self.compute_edges_to_shard();
        Ok(())
    }

    /// Recompute `W`, `min W` and the cross-shard edge count from scratch.
    pub fn compute_edges_to_shard(&mut self) {
        let n = self.shard_num as usize;
        let mut to_shard = vec![0i64; n];
        let mut internal = vec![0i64; n];
        for (v, neighbors) in self.graph.adjacency() {
            let v_shard = self.shard_of(v) as usize;
            for u in neighbors {
                let u_shard = self.shard_of(u) as usize;
                if v_shard != u_shard {
                    to_shard[u_shard] += 1;
                } else {
                    internal[u_shard] += 1;
                }
            }
        }
        self.cross_shard_edges = to_shard.iter().sum::<i64>() / 2;
        for (w, inner) in to_shard.iter_mut().zip(&internal) {
            *w += inner / 2;
        }
        self.min_edges_to_shard = to_shard.iter().copied().min().unwrap_or(0);
        self.edges_to_shard = to_shard;
    }

    fn score(&self, v: &str, shard: ShardId) -> f64 {
        let neighbors = self.graph.neighbors(v);
        let toward = neighbors
            .iter()
            .filter(|u| self.shard_of(u) == shard)
            .count();
        let penalty = self.weight_penalty * self.edges_to_shard[shard as usize] as f64
            / self.min_edges_to_shard.max(1) as f64;
        toward as f64 / neighbors.len() as f64 * (1.0 - penalty)
    }

    fn recompute_after_move(&mut self, v: &str, old: ShardId) {
        let new = self.shard_of(v) as usize;
        let old = old as usize;
        for u in self.graph.neighbors(v) {
            let neighbor = self.shard_of(u) as usize;
            if neighbor != new && neighbor != old {
                self.edges_to_shard[new] += 1;
                self.edges_to_shard[old] -= 1;
            } else if neighbor == new {
                self.edges_to_shard[old] -= 1;
                self.cross_shard_edges -= 1;
            } else {
                self.edges_to_shard[new] += 1;
                self.cross_shard_edges += 1;
            }
        }
        self.min_edges_to_shard = self.edges_to_shard.iter().copied().min().unwrap_or(0);
    }

    /// Run label propagation over the current graph.
    pub fn partition(&mut self) -> PartitionOutcome {
        self.compute_edges_to_shard();
        let before = self.cross_shard_edges;
        let addrs: Vec<Address> = self.graph.addrs().cloned().collect();
        let guard_empty = self.shard_num as usize <= addrs.len();
        let mut moves: BTreeMap<Address, u32> = BTreeMap::new();
        let mut modified = BTreeMap::new();
        let mut passes = 0;

        for _ in 0..self.max_iterations {
            passes += 1;
            let mut moved_this_pass = 0usize;
            for v in &addrs {
                if moves.get(v).copied().unwrap_or(0) >= self.retry_cap {
                    continue;
                }
                let now = self.shard_of(v);
                let mut best_shard = now;
                let mut best_score = f64::MIN;
                let mut seen: Vec<ShardId> = Vec::new();
                for u in self.graph.neighbors(v) {
                    let k = self.shard_of(u);
                    if seen.contains(&k) {
                        continue;
                    }
                    seen.push(k);
                    let s = self.score(v, k);
                    if s > best_score {
                        best_score = s;
                        best_shard = k;
                    }
                }
                let may_leave = self.vertices_in_shard[now as usize] > 1 || !guard_empty;
                if best_shard != now && may_leave {
                    self.partition_map.insert(v.clone(), best_shard);
                    modified.insert(v.clone(), best_shard);
                    *moves.entry(v.clone()).or_default() += 1;
                    self.vertices_in_shard[now as usize] -= 1;
                    self.vertices_in_shard[best_shard as usize] += 1;
                    self.recompute_after_move(v, now);
                    moved_this_pass += 1;
                }
            }
            debug!(pass = passes, moved = moved_this_pass, "[se-02] CLPA pass");
            if moved_this_pass == 0 {
                break;
            }
        }

        self.compute_edges_to_shard();
        info!(
            vertices = addrs.len(),
            modified = modified.len(),
            cross_before = before,
            cross_after = self.cross_shard_edges,
            passes,
            "[se-02] CLPA partition finished"
        );
        PartitionOutcome {
            modified,
            cross_shard_edges: self.cross_shard_edges.max(0) as usize,
            passes,
        }
    }

    /// Forget the accumulated transactions; labels and vertices stay.
    pub fn erase_edges(&mut self) {
        self.graph.erase_edges();
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn partition_map(&self) -> &BTreeMap<Address, ShardId> {
        &self.partition_map
    }

    pub fn vertices_in_shard(&self) -> &[usize] {
        &self.vertices_in_shard
    }

    pub fn edges_to_shard(&self) -> &[i64] {
        &self.edges_to_shard
    }

    pub fn cross_shard_edge_num(&self) -> usize {
        self.cross_shard_edges.max(0) as usize
    }

    pub fn shard_num(&self) -> u64 {
        self.shard_num
    }

    /// SHA-256 over graph, labels and counters.
    pub fn digest(&self) -> PartitionResult<Hash> {
        Ok(digest(&encode(self)?))
    }
}
