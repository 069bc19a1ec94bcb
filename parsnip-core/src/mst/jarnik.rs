//! Heap-driven Jarník–Prim for small populations.
//!
//! Materialises every pair into a pooled edge vector, bulk-loads a binary
//! heap and pops in cost order, discarding edges whose endpoints are already
//! joined. The scratch buffers go back to their pools on every exit path.

use std::cmp::Reverse;

use super::union_find::UnionFind;
use super::{Edge, EdgePools, MstError};
use crate::error::SearchError;
use crate::matrix::DistanceMatrix;

/// Builds the spanning tree by sorting all C(V,2) edges through a heap.
///
/// # Errors
/// Returns [`MstError::EmptyGraph`] for an empty matrix and
/// [`MstError::PoolPoisoned`] when the scratch pools are unusable.
pub fn build(matrix: &DistanceMatrix, pools: &EdgePools) -> Result<Vec<Edge>, MstError> {
    let n = matrix.len();
    if n == 0 {
        return Err(MstError::EmptyGraph);
    }
    let mut scratch = pools.edges.acquire().map_err(as_pool_error)?;
    for i in 1..n {
        for j in 0..i {
            scratch.push(Edge::new(
                u32::try_from(j).unwrap_or(u32::MAX),
                u32::try_from(i).unwrap_or(u32::MAX),
                matrix.at(i, j),
            ));
        }
    }
    let mut heap = match pools.heaps.acquire() {
        Ok(heap) => heap,
        Err(err) => {
            pools.edges.release(scratch);
            return Err(as_pool_error(err));
        }
    };
    heap.extend(scratch.drain(..).map(Reverse));

    let mut joined = UnionFind::new(n);
    let mut edges = Vec::with_capacity(n.saturating_sub(1));
    while edges.len() + 1 < n {
        let Some(Reverse(edge)) = heap.pop() else {
            pools.edges.release(scratch);
            pools.heaps.release(heap);
            return Err(MstError::Disconnected {
                components: n - edges.len(),
            });
        };
        if joined.union(edge.u, edge.v) {
            edges.push(edge);
        }
    }
    pools.edges.release(scratch);
    pools.heaps.release(heap);
    Ok(edges)
}

fn as_pool_error(_: SearchError) -> MstError {
    MstError::PoolPoisoned
}
