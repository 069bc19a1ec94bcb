//! Minimum-spanning-tree engines over the distance matrix.
//!
//! Three engines cover the size regimes of the search: an O(V²) array scan
//! for the complete graph, a heap-driven Jarník–Prim for small populations,
//! and a Borůvka variant with logarithmic candidate sets for large ones.
//! All of them work in the dense index space of the current
//! [`DistanceMatrix`] and return undirected edges; [`orient`] then roots the
//! tree in the vertex arena.

pub mod boruvka;
pub mod jarnik;
pub mod prim_complete;
pub mod union_find;

#[cfg(test)]
mod tests;
#[cfg(test)]
mod property;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use rand::rngs::SmallRng;
use thiserror::Error;
use tracing::debug;

use crate::arena::Arena;
use crate::config::SearchConfig;
use crate::matrix::DistanceMatrix;
use crate::mutation::MutationCounter;
use crate::pool::Pool;

/// Undirected weighted edge in dense index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Edge {
    /// Edge cost; the primary ordering key.
    pub cost: u16,
    /// First endpoint.
    pub u: u32,
    /// Second endpoint.
    pub v: u32,
}

impl Edge {
    /// Creates an edge; endpoint order is preserved as given.
    #[must_use]
    pub const fn new(u: u32, v: u32, cost: u16) -> Self {
        Self { cost, u, v }
    }

    /// The endpoint opposite `from`, or `None` when `from` is not incident.
    #[must_use]
    pub const fn opposite(&self, from: u32) -> Option<u32> {
        if self.u == from {
            Some(self.v)
        } else if self.v == from {
            Some(self.u)
        } else {
            None
        }
    }
}

/// Buffer pools shared by the heap-driven engine.
#[derive(Debug, Default)]
pub struct EdgePools {
    /// Scratch edge vectors.
    pub edges: Pool<Vec<Edge>>,
    /// Scratch binary heaps.
    pub heaps: Pool<BinaryHeap<Reverse<Edge>>>,
}

impl EdgePools {
    /// Creates empty pools.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Errors raised by the spanning-tree engines.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum MstError {
    /// The matrix covered no vertices.
    #[error("cannot build a spanning tree over an empty graph")]
    EmptyGraph,
    /// The edge supply ran out before the graph was connected.
    #[error("graph fell apart into {components} components")]
    Disconnected {
        /// Number of components left unjoined.
        components: usize,
    },
    /// A buffer pool lock was poisoned.
    #[error("edge buffer pool lock poisoned")]
    PoolPoisoned,
}

/// Stable identifiers for [`MstError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum MstErrorCode {
    /// See [`MstError::EmptyGraph`].
    EmptyGraph,
    /// See [`MstError::Disconnected`].
    Disconnected,
    /// See [`MstError::PoolPoisoned`].
    PoolPoisoned,
}

impl MstErrorCode {
    /// Returns the snake_case identifier used in logs and tooling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmptyGraph => "empty_graph",
            Self::Disconnected => "disconnected",
            Self::PoolPoisoned => "pool_poisoned",
        }
    }
}

impl MstError {
    /// Maps the error to its stable code.
    #[must_use]
    pub const fn code(&self) -> MstErrorCode {
        match self {
            Self::EmptyGraph => MstErrorCode::EmptyGraph,
            Self::Disconnected { .. } => MstErrorCode::Disconnected,
            Self::PoolPoisoned => MstErrorCode::PoolPoisoned,
        }
    }
}

/// Engine choice for one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// O(V²) array Prim for the complete graph.
    PrimComplete,
    /// Heap-driven Jarník–Prim.
    Jarnik,
    /// Borůvka with logarithmic candidate sets.
    Boruvka,
}

/// Picks the engine for a population of `n` vertices.
#[must_use]
pub fn select(config: &SearchConfig, n: usize) -> Engine {
    if config.use_prim_complete {
        Engine::PrimComplete
    } else if n > config.mst_implementation_threshold {
        Engine::Boruvka
    } else {
        Engine::Jarnik
    }
}

/// Whether a damaged tree should be repaired in place instead of rebuilt.
///
/// Repair pays off only above a population threshold and only when few
/// vertices were deleted; it is never combined with the complete-graph
/// engine, whose full rebuild is already linear in the edge scan.
#[must_use]
pub fn should_repair(config: &SearchConfig, vertex_count: usize, deleted_count: usize) -> bool {
    if config.use_prim_complete || vertex_count == 0 {
        return false;
    }
    let deleted_part = deleted_count as f64 / vertex_count as f64;
    vertex_count > config.repair_threshold_vertex_count
        && deleted_part < config.repair_threshold_deleted_part
}

/// Builds a spanning tree with the engine selected for the population size.
///
/// # Errors
/// Returns [`MstError::EmptyGraph`] for an empty matrix and propagates
/// engine failures.
pub fn build(
    matrix: &DistanceMatrix,
    config: &SearchConfig,
    pools: &EdgePools,
    rng: &mut SmallRng,
) -> Result<Vec<Edge>, MstError> {
    let n = matrix.len();
    let engine = select(config, n);
    debug!(vertices = n, ?engine, "building spanning tree");
    match engine {
        Engine::PrimComplete => prim_complete::build(matrix, rng),
        Engine::Jarnik => jarnik::build(matrix, pools),
        Engine::Boruvka => boruvka::build(matrix),
    }
}

/// Roots an undirected edge set at `root` and wires the arena links.
///
/// `slots` maps dense indices to arena slots, aligned with the matrix the
/// edges were built over. Every edge gets its mutation set from the counter
/// as it is oriented.
///
/// # Errors
/// Propagates arena link violations.
pub fn orient(
    arena: &mut Arena,
    slots: &[usize],
    edges: &[Edge],
    root: usize,
    counter: &MutationCounter,
) -> crate::error::Result<()> {
    let n = slots.len();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    for e in edges {
        let (u, v) = (e.u as usize, e.v as usize);
        if let Some(row) = adjacency.get_mut(u) {
            row.push(v);
        }
        if let Some(row) = adjacency.get_mut(v) {
            row.push(u);
        }
    }
    let mut visited = vec![false; n];
    let mut queue = VecDeque::from([root]);
    if let Some(flag) = visited.get_mut(root) {
        *flag = true;
    }
    while let Some(parent) = queue.pop_front() {
        let neighbours = adjacency.get(parent).cloned().unwrap_or_default();
        for child in neighbours {
            if visited.get(child).copied().unwrap_or(true) {
                continue;
            }
            if let Some(flag) = visited.get_mut(child) {
                *flag = true;
            }
            let (parent_slot, child_slot) = (
                slots.get(parent).copied().unwrap_or(usize::MAX),
                slots.get(child).copied().unwrap_or(usize::MAX),
            );
            let mutations = {
                let from = &arena.get(parent_slot)?.seq;
                let to = &arena.get(child_slot)?.seq;
                counter.mutations(from, to)
            };
            arena.attach(parent_slot, child_slot, mutations)?;
            queue.push_back(child);
        }
    }
    Ok(())
}
