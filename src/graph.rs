//! Directed per-asset graph of channels (component B, §4.2): a plain
//! adjacency-map built from `chain.addresses_by_asset`, with k-shortest-paths
//! search for route candidates.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::primitives::Address;

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum GraphError {
    #[error("no path from {source} to {target}")]
    NoPath { source: Address, target: Address },
}

/// Directed graph with node set = addresses, edge set = known channels for
/// one asset. Directed because available balance is asymmetric per
/// direction even though channel topology is symmetric (§4.2).
#[derive(Clone, Debug, Default)]
pub struct ChannelGraph {
    edges: HashMap<Address, BTreeSet<Address>>,
}

impl ChannelGraph {
    pub fn new() -> Self {
        Self { edges: HashMap::new() }
    }

    /// Builds a graph from the chain adapter's `addresses_by_asset` pairs
    /// (§6), adding both directions for each reported channel endpoint.
    pub fn from_edges(pairs: impl IntoIterator<Item = (Address, Address)>) -> Self {
        let mut graph = Self::new();
        for (a, b) in pairs {
            graph.add_edge(a, b);
            graph.add_edge(b, a);
        }
        graph
    }

    pub fn add_edge(&mut self, u: Address, v: Address) {
        self.edges.entry(u).or_default().insert(v);
        self.edges.entry(v).or_default();
    }

    pub fn remove_edge(&mut self, u: Address, v: Address) {
        if let Some(neighbors) = self.edges.get_mut(&u) {
            neighbors.remove(&v);
        }
    }

    fn neighbors(&self, node: Address) -> impl Iterator<Item = Address> + '_ {
        self.edges.get(&node).into_iter().flatten().copied()
    }

    pub fn has_path(&self, source: Address, target: Address) -> bool {
        if source == target {
            return true;
        }
        let mut visited = BTreeSet::new();
        let mut frontier = vec![source];
        visited.insert(source);
        while let Some(node) = frontier.pop() {
            for next in self.neighbors(node) {
                if next == target {
                    return true;
                }
                if visited.insert(next) {
                    frontier.push(next);
                }
            }
        }
        false
    }

    /// All simple paths from `source` with exactly `n + 1` nodes, in
    /// lexicographic order over the node-address sequence (§4.2).
    pub fn paths_of_length(&self, source: Address, n: usize) -> Vec<Vec<Address>> {
        let mut paths = Vec::new();
        let mut current = vec![source];
        let mut visited = BTreeSet::new();
        visited.insert(source);
        self.extend_path(&mut current, &mut visited, n, &mut paths);
        paths.sort();
        paths
    }

    fn extend_path(
        &self,
        current: &mut Vec<Address>,
        visited: &mut BTreeSet<Address>,
        remaining_hops: usize,
        out: &mut Vec<Vec<Address>>,
    ) {
        if remaining_hops == 0 {
            out.push(current.clone());
            return;
        }
        let last = *current.last().expect("path always has a start node");
        for next in self.neighbors(last) {
            if visited.insert(next) {
                current.push(next);
                self.extend_path(current, visited, remaining_hops - 1, out);
                current.pop();
                visited.remove(&next);
            }
        }
    }

    /// Simple paths `source -> target` enumerated by increasing length, at
    /// most `k` paths total, lexicographically tie-broken within a length
    /// (§4.2). Computed eagerly rather than as a true lazy sequence, which
    /// is sufficient for this crate's in-memory, single-query call sites.
    pub fn shortest_paths(&self, source: Address, target: Address, k: usize) -> Vec<Vec<Address>> {
        let mut found = Vec::new();
        if k == 0 || source == target {
            return found;
        }
        let max_hops = self.edges.len().saturating_sub(1).max(1);
        for hops in 1..=max_hops {
            if found.len() >= k {
                break;
            }
            let mut candidates: Vec<Vec<Address>> = self
                .paths_of_length(source, hops)
                .into_iter()
                .filter(|path| path.last() == Some(&target))
                .collect();
            candidates.sort();
            for path in candidates {
                if found.len() >= k {
                    break;
                }
                found.push(path);
            }
        }
        found
    }

    /// Convenience wrapper over `shortest_paths` for call sites that want a
    /// single best path or an explicit `NoPath` error (e.g. a direct-channel
    /// shortcut check) rather than an empty k-path list.
    pub fn best_path(&self, source: Address, target: Address) -> Result<Vec<Address>, GraphError> {
        self.shortest_paths(source, target, 1)
            .into_iter()
            .next()
            .ok_or(GraphError::NoPath { source, target })
    }
}
