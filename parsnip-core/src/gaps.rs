//! Temporary gap cancellation on inferred internal vertices.
//!
//! Gaps in inferred sequences are placement artefacts rather than evidence,
//! so before the refinement phases each gap column on an inferred internal
//! vertex is overwritten with the majority character among its tree
//! neighbours. Every edit is recorded and the distance matrix is adjusted in
//! step, so the whole thing can be undone exactly before a tree is reported.

use std::collections::HashMap;

use tracing::debug;

use crate::arena::Arena;
use crate::error::Result;
use crate::matrix::DistanceMatrix;
use crate::seq::{SeqPolicy, Sequence};
use crate::tree::Tree;

/// One reversible gap edit. The vertex id pins the edit to the vertex that
/// was edited; a slot recycled for a different vertex is left alone.
#[derive(Debug, Clone, Copy)]
struct GapEdit {
    slot: usize,
    id: u32,
    column: usize,
    replacement: u8,
}

/// Record of a gap-cancellation pass, consumed by [`restore_gaps`].
#[derive(Debug, Default)]
pub struct GapSubstitutions {
    items: Vec<GapEdit>,
}

impl GapSubstitutions {
    /// Number of recorded edits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the pass changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn majority_neighbour_char(
    arena: &Arena,
    slot: usize,
    column: usize,
    policy: &SeqPolicy,
) -> Result<Option<u8>> {
    let vertex = arena.get(slot)?;
    let mut neighbours: Vec<usize> = vertex.children().to_vec();
    if let Some(parent) = vertex.parent() {
        neighbours.push(parent);
    }
    let mut counts: HashMap<u8, usize> = HashMap::new();
    for n in neighbours {
        if let Some(ch) = arena.get(n)?.seq.at(column) {
            if ch != policy.gap && ch != policy.mask {
                *counts.entry(ch).or_insert(0) += 1;
            }
        }
    }
    // Ties break towards the smaller byte so a rerun edits identically.
    Ok(counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(ch, _)| ch))
}

/// Applies the column edits for one vertex and mirrors the change into the
/// matrix: each pairwise distance moves by the per-column difference between
/// the old and new substitution verdicts.
fn apply_edits(
    arena: &mut Arena,
    matrix: &mut DistanceMatrix,
    policy: &SeqPolicy,
    slot: usize,
    edits: &[(usize, u8)],
) -> Result<()> {
    let id = arena.get(slot)?.id.get();
    if matrix.contains(id) {
        let others: Vec<(u32, usize)> = arena
            .iter()
            .filter(|&(s, v)| s != slot && matrix.contains(v.id.get()))
            .map(|(s, v)| (v.id.get(), s))
            .collect();
        for (other_id, other_slot) in others {
            let mut delta = 0i32;
            for &(column, replacement) in edits {
                let Some(theirs) = arena.get(other_slot)?.seq.at(column) else {
                    continue;
                };
                let Some(current) = arena.get(slot)?.seq.at(column) else {
                    continue;
                };
                let before = policy.counts_as_change(current, theirs);
                let after = policy.counts_as_change(replacement, theirs);
                delta += i32::from(after) - i32::from(before);
            }
            if delta != 0 {
                matrix.adjust(id, other_id, delta)?;
            }
        }
    }

    let mut bytes = arena.get(slot)?.seq.bytes().to_vec();
    for &(column, replacement) in edits {
        if let Some(b) = bytes.get_mut(column) {
            *b = replacement;
        }
    }
    arena.get_mut(slot)?.seq = Sequence::new(bytes);
    Ok(())
}

/// Replaces gaps on inferred internal vertices with the majority neighbour
/// character, column by column, keeping the matrix consistent. Returns the
/// edit record needed to undo the pass.
///
/// # Errors
/// Propagates arena and matrix access failures.
pub fn cancel_gaps_in_internals(
    arena: &mut Arena,
    tree: Tree,
    policy: &SeqPolicy,
    matrix: &mut DistanceMatrix,
) -> Result<GapSubstitutions> {
    let mut record = GapSubstitutions::default();
    for slot in tree.collect_slots(arena)? {
        let is_target = {
            let v = arena.get(slot)?;
            !v.original && !v.children().is_empty()
        };
        if !is_target {
            continue;
        }
        let gap_columns: Vec<usize> = {
            let v = arena.get(slot)?;
            (0..v.seq.len())
                .filter(|&c| v.seq.at(c) == Some(policy.gap))
                .collect()
        };
        let id = arena.get(slot)?.id.get();
        let mut edits = Vec::new();
        for column in gap_columns {
            if let Some(replacement) = majority_neighbour_char(arena, slot, column, policy)? {
                edits.push((column, replacement));
                record.items.push(GapEdit {
                    slot,
                    id,
                    column,
                    replacement,
                });
            }
        }
        if !edits.is_empty() {
            apply_edits(arena, matrix, policy, slot, &edits)?;
        }
    }
    debug!(edits = record.len(), "cancelled gaps on internal vertices");
    Ok(record)
}

/// Undoes a gap-cancellation pass: restores the gap characters and walks the
/// matrix adjustments back.
///
/// # Errors
/// Propagates arena and matrix access failures.
pub fn restore_gaps(
    arena: &mut Arena,
    policy: &SeqPolicy,
    matrix: &mut DistanceMatrix,
    record: GapSubstitutions,
) -> Result<()> {
    let mut by_slot: HashMap<(usize, u32), Vec<(usize, u8)>> = HashMap::new();
    for edit in record.items {
        by_slot
            .entry((edit.slot, edit.id))
            .or_default()
            .push((edit.column, policy.gap));
    }
    // Undo in the opposite direction: each edited column goes back to a gap,
    // so the pairwise delta is the gap verdict minus the current one.
    for ((slot, id), edits) in by_slot {
        let still_there = arena.get(slot).is_ok_and(|v| v.id.get() == id);
        if !still_there {
            // The vertex was pruned meanwhile; nothing left to restore.
            continue;
        }
        apply_edits(arena, matrix, policy, slot, &edits)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::arena::{Vertex, VertexId};
    use crate::matrix::MatrixEntry;
    use crate::mutation::MutationCounter;

    fn star() -> (Arena, Tree, DistanceMatrix) {
        let policy = SeqPolicy::default();
        let counter = MutationCounter::new(policy, false);
        let mut arena = Arena::new();
        let centre = arena.insert(Vertex::inferred(
            VertexId::new(0),
            Sequence::new(b"A-GT".to_vec()),
            0,
        ));
        let leaves = [
            (1u32, b"ACGT"),
            (2u32, b"ACGA"),
            (3u32, b"AAGT"),
        ];
        for (id, seq) in leaves {
            let slot = arena.insert(Vertex::observed(
                format!("t{id}"),
                VertexId::new(id),
                Sequence::new(seq.to_vec()),
            ));
            let mutations = {
                let from = arena.get(centre).expect("live").seq.clone();
                let to = &arena.get(slot).expect("live").seq;
                counter.mutations(&from, to)
            };
            arena.attach(centre, slot, mutations).expect("fresh");
        }
        let seqs: Vec<(u32, Vec<u8>)> = arena
            .iter()
            .map(|(_, v)| (v.id.get(), v.seq.bytes().to_vec()))
            .collect();
        let entries: Vec<MatrixEntry<'_>> = seqs
            .iter()
            .map(|(id, seq)| MatrixEntry { id: *id, seq })
            .collect();
        let matrix = DistanceMatrix::compute(&entries, &policy);
        (arena, Tree { root: centre }, matrix)
    }

    fn recomputed(arena: &Arena, policy: &SeqPolicy) -> DistanceMatrix {
        let seqs: Vec<(u32, Vec<u8>)> = arena
            .iter()
            .map(|(_, v)| (v.id.get(), v.seq.bytes().to_vec()))
            .collect();
        let entries: Vec<MatrixEntry<'_>> = seqs
            .iter()
            .map(|(id, seq)| MatrixEntry { id: *id, seq })
            .collect();
        DistanceMatrix::compute(&entries, policy)
    }

    #[test]
    fn gaps_take_the_majority_neighbour_character() {
        let policy = SeqPolicy::default();
        let (mut arena, tree, mut matrix) = star();
        let record =
            cancel_gaps_in_internals(&mut arena, tree, &policy, &mut matrix).expect("sound tree");
        assert_eq!(record.len(), 1);
        // Children hold C, C, A at the gap column.
        assert_eq!(arena.get(tree.root).expect("live").seq.bytes(), b"ACGT");
    }

    #[test]
    fn matrix_adjustments_match_a_full_recompute() {
        let policy = SeqPolicy::default();
        let (mut arena, tree, mut matrix) = star();
        let _ =
            cancel_gaps_in_internals(&mut arena, tree, &policy, &mut matrix).expect("sound tree");
        let fresh = recomputed(&arena, &policy);
        for &a in matrix.ids() {
            for &b in matrix.ids() {
                if a < b {
                    assert_eq!(
                        matrix.distance(a, b).expect("member"),
                        fresh.distance(a, b).expect("member"),
                        "pair ({a},{b}) diverged after adjustment"
                    );
                }
            }
        }
    }

    #[test]
    fn restore_is_an_exact_inverse() {
        let policy = SeqPolicy::default();
        let (mut arena, tree, mut matrix) = star();
        let original_seq = arena.get(tree.root).expect("live").seq.bytes().to_vec();
        let original_matrix = recomputed(&arena, &policy);

        let record =
            cancel_gaps_in_internals(&mut arena, tree, &policy, &mut matrix).expect("sound tree");
        restore_gaps(&mut arena, &policy, &mut matrix, record).expect("sound tree");

        assert_eq!(arena.get(tree.root).expect("live").seq.bytes(), original_seq);
        for &a in matrix.ids() {
            for &b in matrix.ids() {
                if a < b {
                    assert_eq!(
                        matrix.distance(a, b).expect("member"),
                        original_matrix.distance(a, b).expect("member")
                    );
                }
            }
        }
    }

    #[test]
    fn observed_vertices_are_never_edited() {
        let policy = SeqPolicy::default();
        let counter = MutationCounter::new(policy, false);
        let mut arena = Arena::new();
        let root = arena.insert(Vertex::observed(
            "t0".into(),
            VertexId::new(0),
            Sequence::new(b"A-GT".to_vec()),
        ));
        let leaf = arena.insert(Vertex::observed(
            "t1".into(),
            VertexId::new(1),
            Sequence::new(b"ACGT".to_vec()),
        ));
        let mutations = {
            let from = arena.get(root).expect("live").seq.clone();
            let to = &arena.get(leaf).expect("live").seq;
            counter.mutations(&from, to)
        };
        arena.attach(root, leaf, mutations).expect("fresh");
        let mut matrix = recomputed(&arena, &policy);
        let record = cancel_gaps_in_internals(&mut arena, Tree { root }, &policy, &mut matrix)
            .expect("sound tree");
        assert!(record.is_empty());
        assert_eq!(arena.get(root).expect("live").seq.bytes(), b"A-GT");
    }
}
