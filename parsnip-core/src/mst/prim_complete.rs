//! Array Prim specialised to the complete graph.
//!
//! Every vertex pair has a distance, so the classic O(V²) scan needs no
//! priority queue: one pass per added vertex relaxes the frontier arrays.
//! Cost ties are broken by a random byte drawn per vertex, which keeps the
//! tree shape from depending on input order while staying deterministic for
//! a seeded generator.

use rand::Rng;
use rand::rngs::SmallRng;

use super::{Edge, MstError};
use crate::matrix::DistanceMatrix;

/// Composite comparison key: cost in the high bits, tie-break byte low.
const fn key(cost: u16, tiebreak: u8) -> u32 {
    ((cost as u32) << 8) | tiebreak as u32
}

/// Builds the spanning tree of the complete graph described by the matrix.
///
/// # Errors
/// Returns [`MstError::EmptyGraph`] when the matrix covers no vertices.
pub fn build(matrix: &DistanceMatrix, rng: &mut SmallRng) -> Result<Vec<Edge>, MstError> {
    let n = matrix.len();
    if n == 0 {
        return Err(MstError::EmptyGraph);
    }
    let mut tiebreak = vec![0u8; n];
    rng.fill(tiebreak.as_mut_slice());

    let mut in_tree = vec![false; n];
    let mut best_cost = vec![u16::MAX; n];
    let mut best_from = vec![0u32; n];
    let mut edges = Vec::with_capacity(n.saturating_sub(1));

    let mut current = 0usize;
    if let Some(flag) = in_tree.get_mut(0) {
        *flag = true;
    }
    for _ in 1..n {
        // Relax the frontier against the vertex just added.
        for v in 0..n {
            if in_tree.get(v).copied().unwrap_or(true) {
                continue;
            }
            let cost = matrix.at(current, v);
            if cost < best_cost.get(v).copied().unwrap_or(u16::MAX) {
                if let Some(slot) = best_cost.get_mut(v) {
                    *slot = cost;
                }
                if let Some(slot) = best_from.get_mut(v) {
                    *slot = u32::try_from(current).unwrap_or(u32::MAX);
                }
            }
        }
        // Pick the cheapest frontier vertex, random byte deciding ties.
        let mut chosen: Option<(usize, u32)> = None;
        for v in 0..n {
            if in_tree.get(v).copied().unwrap_or(true) {
                continue;
            }
            let cost = best_cost.get(v).copied().unwrap_or(u16::MAX);
            let k = key(cost, tiebreak.get(v).copied().unwrap_or(0));
            if chosen.is_none_or(|(_, best)| k < best) {
                chosen = Some((v, k));
            }
        }
        let Some((v, _)) = chosen else {
            return Err(MstError::Disconnected { components: 2 });
        };
        if let Some(flag) = in_tree.get_mut(v) {
            *flag = true;
        }
        edges.push(Edge::new(
            best_from.get(v).copied().unwrap_or(0),
            u32::try_from(v).unwrap_or(u32::MAX),
            best_cost.get(v).copied().unwrap_or(0),
        ));
        current = v;
    }
    Ok(edges)
}
