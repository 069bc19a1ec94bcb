//! Tree view over the arena plus the cleanup passes between iterations.
//!
//! The tree itself is just a root slot; structure lives in the arena links.
//! Cleanup keeps the population honest between spanning-tree rebuilds:
//! duplicate sequences collapse onto one vertex, inferred vertices that
//! stopped pulling their weight are spliced or pruned, and observed taxa
//! end up as leaves before a tree is reported.

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

use std::collections::{HashMap, HashSet};

use crate::arena::{Arena, IdAllocator, Status, Vertex};
use crate::error::{Result, SearchError};
use crate::mutation::{MutationCounter, MutationSet};
use crate::seq::SeqPolicy;

/// A rooted tree living in an arena.
#[derive(Debug, Clone, Copy)]
pub struct Tree {
    /// Root slot.
    pub root: usize,
}

impl Tree {
    /// Slots reachable from the root, preorder.
    ///
    /// # Errors
    /// Propagates arena access failures on dangling links.
    pub fn collect_slots(&self, arena: &Arena) -> Result<Vec<usize>> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(slot) = stack.pop() {
            out.push(slot);
            stack.extend(arena.get(slot)?.children().iter().copied());
        }
        Ok(out)
    }

    /// Parsimony cost: substitutions summed over every edge.
    ///
    /// # Errors
    /// Propagates arena access failures on dangling links.
    pub fn cost(&self, arena: &Arena) -> Result<u64> {
        let mut total = 0u64;
        for slot in self.collect_slots(arena)? {
            if let Some(m) = arena.get(slot)?.mutations() {
                total += m.len() as u64;
            }
        }
        Ok(total)
    }

    /// Cost with the masked columns counted back in, so a tree built on
    /// masked sequences compares fairly against an unmasked one. Stashed
    /// originals supply the characters under the mask.
    ///
    /// # Errors
    /// Propagates arena access failures on dangling links.
    pub fn cost_ignoring_masking(
        &self,
        arena: &Arena,
        masked_columns: &[usize],
        policy: &SeqPolicy,
    ) -> Result<u64> {
        let mut total = self.cost(arena)?;
        for slot in self.collect_slots(arena)? {
            let vertex = arena.get(slot)?;
            let Some(parent) = vertex.parent() else {
                continue;
            };
            let parent_vertex = arena.get(parent)?;
            let (a, b) = (parent_vertex.comparison_seq(), vertex.comparison_seq());
            for &c in masked_columns {
                if let (Some(x), Some(y)) = (a.at(c), b.at(c)) {
                    if policy.counts_as_change(x, y) {
                        total += 1;
                    }
                }
            }
        }
        Ok(total)
    }

    /// Slots of observed taxa in the tree.
    ///
    /// # Errors
    /// Propagates arena access failures on dangling links.
    pub fn originals(&self, arena: &Arena) -> Result<Vec<usize>> {
        Ok(self
            .collect_slots(arena)?
            .into_iter()
            .filter(|&s| arena.get(s).is_ok_and(|v| v.original))
            .collect())
    }

    /// Slots of inferred vertices in the tree.
    ///
    /// # Errors
    /// Propagates arena access failures on dangling links.
    pub fn intermediates(&self, arena: &Arena) -> Result<Vec<usize>> {
        Ok(self
            .collect_slots(arena)?
            .into_iter()
            .filter(|&s| arena.get(s).is_ok_and(|v| !v.original))
            .collect())
    }

    /// Slots of inferred vertices whose sequences are genuinely novel.
    ///
    /// # Errors
    /// Propagates arena access failures on dangling links.
    pub fn novel_intermediates(&self, arena: &Arena) -> Result<Vec<usize>> {
        Ok(self
            .collect_slots(arena)?
            .into_iter()
            .filter(|&s| {
                arena
                    .get(s)
                    .is_ok_and(|v| !v.original && v.status == Status::Inferred)
            })
            .collect())
    }
}

/// What to do with the later members of a duplicate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Remove every duplicate and hand it to the store.
    StoreAll,
    /// Drop inferred duplicates; an observed duplicate is an error.
    DropInferred,
    /// Drop inferred duplicates; observed ones stay in the arena.
    DropNonOriginal,
    /// Store observed duplicates, drop inferred ones.
    StoreOriginals,
}

/// Collapses sequence-identical vertices onto one keeper per group.
///
/// Groups form under the policy's equality; within a group observed taxa
/// outrank inferred ones for the keeper role. The arena must hold no links
/// when this runs; duplicates leave the population entirely.
///
/// # Errors
/// Returns [`SearchError::ObservedCollapsed`] under
/// [`DuplicatePolicy::DropInferred`] when two observed taxa collide.
pub fn remove_duplicates(
    arena: &mut Arena,
    policy: &SeqPolicy,
    mode: DuplicatePolicy,
    store: &mut Vec<Vertex>,
) -> Result<usize> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    {
        let mut by_key: HashMap<crate::seq::SeqKey<'_>, usize> = HashMap::new();
        for (slot, vertex) in arena.iter() {
            let key = vertex.comparison_seq().key(policy);
            match by_key.get(&key) {
                Some(&group) => {
                    if let Some(g) = groups.get_mut(group) {
                        g.push(slot);
                    }
                }
                None => {
                    by_key.insert(key, groups.len());
                    groups.push(vec![slot]);
                }
            }
        }
    }

    let mut removed = 0usize;
    for mut group in groups {
        if group.len() < 2 {
            continue;
        }
        // Observed taxa first so an input sequence is never the one dropped.
        group.sort_by_key(|&s| arena.get(s).map(|v| !v.original).unwrap_or(true));
        let keeper = group.first().copied().unwrap_or_default();
        for &slot in group.iter().skip(1) {
            let is_original = arena.get(slot)?.original;
            match mode {
                DuplicatePolicy::StoreAll => {
                    store.push(arena.remove(slot)?);
                    removed += 1;
                }
                DuplicatePolicy::DropInferred => {
                    if is_original {
                        let name = arena.get(slot)?.name.clone();
                        let other = arena.get(keeper)?.name.clone();
                        return Err(SearchError::ObservedCollapsed { name, other });
                    }
                    let _ = arena.remove(slot)?;
                    removed += 1;
                }
                DuplicatePolicy::DropNonOriginal => {
                    if !is_original {
                        let _ = arena.remove(slot)?;
                        removed += 1;
                    }
                }
                DuplicatePolicy::StoreOriginals => {
                    if is_original {
                        store.push(arena.remove(slot)?);
                    } else {
                        let _ = arena.remove(slot)?;
                    }
                    removed += 1;
                }
            }
        }
    }
    Ok(removed)
}

/// Reclassifies inferred vertices: one whose sequence matches an observed
/// taxon (or an already-known duplicate) becomes [`Status::InferredDuplicate`],
/// the rest stay [`Status::Inferred`].
///
/// # Errors
/// Propagates arena access failures.
pub fn set_status(arena: &mut Arena, policy: &SeqPolicy) -> Result<()> {
    let mut updates: Vec<(usize, Status)> = Vec::new();
    {
        let mut known: HashSet<crate::seq::SeqKey<'_>> = HashSet::new();
        for (_, vertex) in arena.iter() {
            if vertex.original || vertex.status == Status::InferredDuplicate {
                known.insert(vertex.comparison_seq().key(policy));
            }
        }
        for (slot, vertex) in arena.iter() {
            if vertex.original {
                continue;
            }
            let status = if known.contains(&vertex.comparison_seq().key(policy)) {
                Status::InferredDuplicate
            } else {
                Status::Inferred
            };
            if vertex.status != status {
                updates.push((slot, status));
            }
        }
    }
    for (slot, status) in updates {
        arena.get_mut(slot)?.status = status;
    }
    Ok(())
}

/// Splices out inferred pass-through vertices: one parent, one child, no
/// taxon. The parent adopts the child with a freshly counted mutation set.
/// Runs to a fixed point so chains collapse fully.
///
/// # Errors
/// Propagates arena link failures.
pub fn splice_degree2(
    arena: &mut Arena,
    tree: Tree,
    counter: &MutationCounter,
) -> Result<Vec<Vertex>> {
    let mut removed = Vec::new();
    loop {
        let victim = arena.iter().find_map(|(slot, v)| {
            (slot != tree.root
                && !v.original
                && v.status == Status::Inferred
                && v.parent().is_some()
                && v.children().len() == 1)
                .then_some(slot)
        });
        let Some(slot) = victim else {
            return Ok(removed);
        };
        let vertex = arena.get(slot)?;
        let parent = vertex.parent().ok_or(SearchError::VacantSlot { slot })?;
        let child = vertex
            .children()
            .first()
            .copied()
            .ok_or(SearchError::VacantSlot { slot })?;
        arena.detach(parent, slot)?;
        arena.detach(slot, child)?;
        let mutations = {
            let from = &arena.get(parent)?.seq;
            let to = &arena.get(child)?.seq;
            counter.mutations(from, to)
        };
        arena.attach(parent, child, mutations)?;
        removed.push(arena.remove(slot)?);
    }
}

/// Repeatedly prunes inferred leaves, optionally duplicates too, until the
/// fringe holds only observed taxa.
///
/// # Errors
/// Propagates arena link failures.
pub fn prune_inferred_leaves(
    arena: &mut Arena,
    tree: Tree,
    include_duplicates: bool,
) -> Result<Vec<Vertex>> {
    let mut removed = Vec::new();
    loop {
        let victim = arena.iter().find_map(|(slot, v)| {
            let status_matches = v.status == Status::Inferred
                || (include_duplicates && v.status == Status::InferredDuplicate);
            (slot != tree.root && !v.original && status_matches && v.children().is_empty())
                .then_some(slot)
        });
        let Some(slot) = victim else {
            return Ok(removed);
        };
        if let Some(parent) = arena.get(slot)?.parent() {
            arena.detach(parent, slot)?;
        }
        removed.push(arena.remove(slot)?);
    }
}

/// Gives every internal observed taxon a leaf twin carrying the taxon, and
/// downgrades the internal vertex to an inferred one. Reported trees keep
/// all input sequences at the fringe this way.
///
/// # Errors
/// Propagates arena access failures.
pub fn move_originals_to_leaves(arena: &mut Arena, ids: &IdAllocator) -> Result<()> {
    let internal_originals: Vec<usize> = arena
        .iter()
        .filter_map(|(slot, v)| (v.original && !v.children().is_empty()).then_some(slot))
        .collect();
    for slot in internal_originals {
        let (name, seq) = {
            let v = arena.get(slot)?;
            (v.name.clone(), v.seq.clone())
        };
        let leaf = Vertex::observed(name, ids.allocate(), seq);
        let leaf_slot = arena.insert(leaf);
        arena.attach(slot, leaf_slot, MutationSet::default())?;
        let v = arena.get_mut(slot)?;
        v.original = false;
        v.status = Status::Inferred;
        v.name = format!("i{}", v.id.get());
    }
    Ok(())
}

/// Outcome of a random deletion pass.
#[derive(Debug)]
pub struct DeletionOutcome {
    /// Vertices removed from the arena.
    pub removed: usize,
    /// Root plus the surviving children of removed vertices; each one roots
    /// a fragment for repair.
    pub representatives: Vec<usize>,
}

/// Deletes `⌊coef · intermediates⌋` randomly chosen inferred vertices,
/// dissolving their links. Used both by alternative-tree exploration and as
/// the damage source the repair path recovers from.
///
/// # Errors
/// Propagates arena link failures.
pub fn delete_random_intermediates(
    arena: &mut Arena,
    tree: Tree,
    coef: f64,
    rng: &mut SmallRng,
) -> Result<DeletionOutcome> {
    let mut candidates: Vec<usize> = arena
        .iter()
        .filter_map(|(slot, v)| (slot != tree.root && !v.original).then_some(slot))
        .collect();
    let count = (candidates.len() as f64 * coef) as usize;
    candidates.shuffle(rng);
    candidates.truncate(count);
    let doomed: HashSet<usize> = candidates.iter().copied().collect();

    let mut orphaned: Vec<usize> = Vec::new();
    for &slot in &candidates {
        let (parent, children) = {
            let v = arena.get(slot)?;
            (v.parent(), v.children().to_vec())
        };
        if let Some(parent) = parent {
            arena.detach(parent, slot)?;
        }
        for child in children {
            arena.detach(slot, child)?;
            orphaned.push(child);
        }
        let _ = arena.remove(slot)?;
    }

    let mut representatives = vec![tree.root];
    representatives.extend(orphaned.into_iter().filter(|s| !doomed.contains(s)));
    representatives.dedup();
    Ok(DeletionOutcome {
        removed: candidates.len(),
        representatives,
    })
}

/// Collects the fragment rooted at each representative, as slot lists.
///
/// # Errors
/// Propagates arena access failures.
pub fn collect_components(arena: &Arena, representatives: &[usize]) -> Result<Vec<Vec<usize>>> {
    let mut components = Vec::with_capacity(representatives.len());
    for &rep in representatives {
        components.push(Tree { root: rep }.collect_slots(arena)?);
    }
    Ok(components)
}

/// Reattaches stored duplicate taxa as leaf children of their surviving
/// twins; a duplicate whose twin vanished hangs off the root instead.
///
/// # Errors
/// Propagates arena link failures.
pub fn reattach_duplicates(
    arena: &mut Arena,
    tree: Tree,
    policy: &SeqPolicy,
    counter: &MutationCounter,
    store: Vec<Vertex>,
) -> Result<()> {
    for mut vertex in store {
        let twin = {
            let key = vertex.comparison_seq().key(policy);
            arena
                .iter()
                .find_map(|(slot, v)| (v.comparison_seq().key(policy) == key).then_some(slot))
        };
        let anchor = twin.unwrap_or(tree.root);
        vertex.sec = None;
        let mutations = {
            let from = &arena.get(anchor)?.seq.clone();
            counter.mutations(from, &vertex.seq)
        };
        let slot = arena.insert(vertex);
        arena.attach(anchor, slot, mutations)?;
    }
    Ok(())
}

/// Masks the given columns in every live vertex, stashing the originals.
///
/// # Errors
/// Propagates arena access failures.
pub fn mask_all(arena: &mut Arena, columns: &[usize], policy: &SeqPolicy) -> Result<()> {
    let slots: Vec<usize> = arena.live_slots().collect();
    for slot in slots {
        let v = arena.get_mut(slot)?;
        let masked = v.seq.masked(columns, policy);
        let original = std::mem::replace(&mut v.seq, masked);
        v.sec = Some(original);
    }
    Ok(())
}

/// Restores every stashed original sequence and clears the stash.
///
/// # Errors
/// Propagates arena access failures.
pub fn unmask_all(arena: &mut Arena) -> Result<()> {
    let slots: Vec<usize> = arena.live_slots().collect();
    for slot in slots {
        let v = arena.get_mut(slot)?;
        if let Some(original) = v.sec.take() {
            v.seq = original;
        }
    }
    Ok(())
}
