//! Borůvka-style engine with logarithmic candidate sets.
//!
//! Each vertex keeps the ⌊log₂V⌋+1 cheapest edges leaving its component in a
//! sorted set of immutable edge values. Components repeatedly pull their
//! cheapest outgoing edge and absorb the component on the other side,
//! smaller into larger. A drained candidate set refills by rescanning the
//! non-member vertices, which keeps the sets small without bookkeeping on
//! every merge. The same merge loop reconnects the fragments of a damaged
//! tree during repair.

use std::collections::{BTreeSet, HashSet};

use super::{Edge, MstError};
use crate::matrix::DistanceMatrix;

#[derive(Debug)]
struct Record {
    vertex: u32,
    candidates: BTreeSet<Edge>,
    exhausted: bool,
}

#[derive(Debug)]
struct Component {
    members: HashSet<u32>,
    records: Vec<Record>,
}

fn candidate_set(
    vertex: u32,
    members: &HashSet<u32>,
    matrix: &DistanceMatrix,
    keep: usize,
) -> BTreeSet<Edge> {
    let n = matrix.len();
    let mut incident: Vec<Edge> = (0..n)
        .filter_map(|other| {
            let other = u32::try_from(other).ok()?;
            if other == vertex || members.contains(&other) {
                return None;
            }
            Some(Edge::new(
                vertex,
                other,
                matrix.at(vertex as usize, other as usize),
            ))
        })
        .collect();
    incident.sort_unstable();
    incident.truncate(keep);
    incident.into_iter().collect()
}

impl Component {
    fn from_members(members: Vec<u32>, matrix: &DistanceMatrix, keep: usize) -> Self {
        let member_set: HashSet<u32> = members.iter().copied().collect();
        let records = members
            .iter()
            .map(|&vertex| Record {
                vertex,
                candidates: candidate_set(vertex, &member_set, matrix, keep),
                exhausted: false,
            })
            .collect();
        Self {
            members: member_set,
            records,
        }
    }

    /// Cheapest edge leaving the component, or `None` when it already spans
    /// every vertex the matrix knows about.
    fn cheapest_external(&mut self, matrix: &DistanceMatrix, keep: usize) -> Option<Edge> {
        loop {
            let members = &self.members;
            let mut best: Option<(usize, Edge)> = None;
            for (i, rec) in self.records.iter_mut().enumerate() {
                if rec.candidates.is_empty() && !rec.exhausted {
                    rec.candidates = candidate_set(rec.vertex, members, matrix, keep);
                    if rec.candidates.is_empty() {
                        rec.exhausted = true;
                    }
                }
                if let Some(&head) = rec.candidates.first() {
                    if best.is_none_or(|(_, b)| head < b) {
                        best = Some((i, head));
                    }
                }
            }
            let (i, edge) = best?;
            if let Some(rec) = self.records.get_mut(i) {
                rec.candidates.remove(&edge);
            }
            let other = if self.members.contains(&edge.u) { edge.v } else { edge.u };
            if !self.members.contains(&other) {
                return Some(edge);
            }
            // Stale candidate from before a merge; drop it and keep looking.
        }
    }

    fn absorb(&mut self, mut other: Self) {
        self.members.extend(other.members.drain());
        self.records.append(&mut other.records);
    }
}

/// Joins the given vertex groups into one tree, returning only the edges
/// added between groups. Groups must partition `0..matrix.len()`.
///
/// # Errors
/// Returns [`MstError::EmptyGraph`] for an empty partition and
/// [`MstError::Disconnected`] when a component runs out of outgoing edges.
pub fn merge_components(
    parts: Vec<Vec<u32>>,
    matrix: &DistanceMatrix,
) -> Result<Vec<Edge>, MstError> {
    let n = matrix.len();
    if n == 0 || parts.is_empty() {
        return Err(MstError::EmptyGraph);
    }
    let keep = n.ilog2() as usize + 1;

    let mut comp_of = vec![0usize; n];
    let mut components: Vec<Option<Component>> = Vec::with_capacity(parts.len());
    for (idx, members) in parts.into_iter().enumerate() {
        for &v in &members {
            if let Some(slot) = comp_of.get_mut(v as usize) {
                *slot = idx;
            }
        }
        components.push(Some(Component::from_members(members, matrix, keep)));
    }

    let mut alive = components.iter().filter(|c| c.is_some()).count();
    let mut edges = Vec::with_capacity(alive.saturating_sub(1));
    while alive > 1 {
        let Some(source_idx) = components.iter().position(Option::is_some) else {
            return Err(MstError::Disconnected { components: alive });
        };
        let edge = {
            let Some(component) = components.get_mut(source_idx).and_then(Option::as_mut) else {
                return Err(MstError::Disconnected { components: alive });
            };
            let Some(edge) = component.cheapest_external(matrix, keep) else {
                return Err(MstError::Disconnected { components: alive });
            };
            edge
        };
        let other = {
            let inside = components
                .get(source_idx)
                .and_then(Option::as_ref)
                .is_some_and(|c| c.members.contains(&edge.u));
            if inside { edge.v } else { edge.u }
        };
        let target_idx = comp_of.get(other as usize).copied().unwrap_or(source_idx);
        if target_idx == source_idx {
            return Err(MstError::Disconnected { components: alive });
        }

        // Smaller component folds into the larger one.
        let source_len = components
            .get(source_idx)
            .and_then(Option::as_ref)
            .map_or(0, |c| c.members.len());
        let target_len = components
            .get(target_idx)
            .and_then(Option::as_ref)
            .map_or(0, |c| c.members.len());
        let (keep_idx, fold_idx) = if source_len >= target_len {
            (source_idx, target_idx)
        } else {
            (target_idx, source_idx)
        };
        let Some(folded) = components.get_mut(fold_idx).and_then(Option::take) else {
            return Err(MstError::Disconnected { components: alive });
        };
        for &v in &folded.members {
            if let Some(slot) = comp_of.get_mut(v as usize) {
                *slot = keep_idx;
            }
        }
        if let Some(keeper) = components.get_mut(keep_idx).and_then(Option::as_mut) {
            keeper.absorb(folded);
        }
        edges.push(edge);
        alive -= 1;
    }
    Ok(edges)
}

/// Builds the spanning tree of the complete graph described by the matrix.
///
/// # Errors
/// Returns [`MstError::EmptyGraph`] when the matrix covers no vertices.
pub fn build(matrix: &DistanceMatrix) -> Result<Vec<Edge>, MstError> {
    let n = matrix.len();
    if n == 0 {
        return Err(MstError::EmptyGraph);
    }
    let parts = (0..n)
        .map(|v| vec![u32::try_from(v).unwrap_or(u32::MAX)])
        .collect();
    merge_components(parts, matrix)
}
