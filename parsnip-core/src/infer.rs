//! Inference of intermediate (ancestral) sequences.
//!
//! Every internal vertex looks at the mutation sets on its incident edges:
//! a set shared by two edges describes a sequence that existed between the
//! vertex and both neighbours, so applying the shared set to the vertex
//! yields a candidate intermediate. Strategies then decide which candidates
//! are worth materialising, and two throttles keep rounds from flooding the
//! tree: selection degrades to keep-everything once it stops filtering, and
//! a local-topology screen rebuilds a miniature tree around each node and
//! drops candidates that a duplicate-and-degree cleanup would discard.

use std::collections::{HashMap, HashSet};

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::arena::{Arena, VertexId};
use crate::config::{InferenceStrategy, SearchConfig};
use crate::error::Result;
use crate::matrix::{DistanceMatrix, MatrixEntry};
use crate::mst::{EdgePools, jarnik};
use crate::mutation::{Mutation, MutationSet};
use crate::seq::Sequence;

/// Mutable inference state carried across the rounds of one dataset.
#[derive(Debug)]
pub struct InferenceState {
    strategy: InferenceStrategy,
    filter_enabled: bool,
}

impl InferenceState {
    /// Initial state for a dataset under the given configuration.
    #[must_use]
    pub const fn new(config: &SearchConfig) -> Self {
        Self {
            strategy: config.int_strategy,
            filter_enabled: config.int_filter_local_topology,
        }
    }

    /// Strategy currently in force.
    #[must_use]
    pub const fn strategy(&self) -> InferenceStrategy {
        self.strategy
    }

    /// Whether the local-topology filter still runs.
    #[must_use]
    pub const fn filter_enabled(&self) -> bool {
        self.filter_enabled
    }
}

/// Result of one inference round.
#[derive(Debug)]
pub struct InferenceOutcome {
    /// Deduplicated new intermediate sequences, ready to insert.
    pub sequences: Vec<Sequence>,
    /// Candidates produced before any selection.
    pub inferred: usize,
    /// Candidates surviving selection and capping.
    pub chosen: usize,
}

#[derive(Debug)]
struct Candidate {
    node: usize,
    set: MutationSet,
    contributors: HashSet<VertexId>,
}

impl Candidate {
    fn content(&self) -> Vec<Mutation> {
        self.set.items().to_vec()
    }
}

/// Runs one inference round over the oriented tree.
///
/// # Errors
/// Propagates arena access failures; a healthy tree never raises them.
pub fn infer(
    arena: &Arena,
    config: &SearchConfig,
    state: &mut InferenceState,
    pools: &EdgePools,
    rng: &mut SmallRng,
) -> Result<InferenceOutcome> {
    let mut per_node: Vec<(usize, Vec<Candidate>)> = Vec::new();
    let mut inferred = 0usize;

    for (slot, vertex) in arena.iter() {
        if vertex.degree() < 2 {
            continue;
        }
        // Edge sets incident to this vertex, tagged with the neighbour that
        // contributed them. The incoming edge participates inverted: its
        // mutations read towards the vertex, the children's read away.
        let mut sets: Vec<(MutationSet, VertexId)> = Vec::new();
        for &child in vertex.children() {
            let child_vertex = arena.get(child)?;
            if let Some(m) = child_vertex.mutations() {
                if !m.is_empty() {
                    sets.push((m.clone(), child_vertex.id));
                }
            }
        }
        if let (Some(parent), Some(m)) = (vertex.parent(), vertex.mutations()) {
            if !m.is_empty() {
                sets.push((m.inverse(), arena.get(parent)?.id));
            }
        }
        if sets.len() < 2 {
            continue;
        }

        let mut node_candidates: HashMap<Vec<Mutation>, Candidate> = HashMap::new();
        for i in 0..sets.len() {
            for j in (i + 1)..sets.len() {
                let Some(shared) = sets[i].0.intersection(&sets[j].0) else {
                    continue;
                };
                let entry = node_candidates
                    .entry(shared.items().to_vec())
                    .or_insert_with(|| Candidate {
                        node: slot,
                        set: shared,
                        contributors: HashSet::new(),
                    });
                entry.contributors.insert(sets[i].1);
                entry.contributors.insert(sets[j].1);
            }
        }
        if node_candidates.is_empty() {
            continue;
        }
        let mut candidates: Vec<Candidate> = node_candidates.into_values().collect();
        for c in &mut candidates {
            let occurrence = u32::try_from(c.contributors.len().max(2)).unwrap_or(u32::MAX);
            c.set.set_occurrence(occurrence);
        }
        inferred += candidates.len();
        per_node.push((slot, candidates));
    }

    // The cost-driven strategy counts occurrences globally: the same set
    // appearing at several nodes is worth more than any of its local counts.
    if state.strategy == InferenceStrategy::BiggestCostDecrease {
        let mut global: HashMap<Vec<Mutation>, HashSet<VertexId>> = HashMap::new();
        for (_, candidates) in &per_node {
            for c in candidates {
                global
                    .entry(c.content())
                    .or_default()
                    .extend(c.contributors.iter().copied());
            }
        }
        for (_, candidates) in &mut per_node {
            for c in candidates {
                if let Some(ids) = global.get(&c.content()) {
                    let occurrence = u32::try_from(ids.len().max(2)).unwrap_or(u32::MAX);
                    c.set.set_occurrence(occurrence);
                }
            }
        }
    }

    let mut chosen: Vec<Candidate> = Vec::new();
    for (slot, mut candidates) in per_node {
        let degree = arena.get(slot)?.degree();
        let avail = candidates.len();
        let by_degree = (degree as f64 * config.int_strategy_coefficient) as usize;
        let keep = config
            .int_strategy_min_at_node
            .min(avail)
            .max(by_degree.min(avail));
        match state.strategy {
            InferenceStrategy::None => chosen.append(&mut candidates),
            InferenceStrategy::Random => {
                candidates.shuffle(rng);
                chosen.extend(candidates.drain(..keep));
            }
            InferenceStrategy::BigSets => {
                candidates.sort_unstable_by(|a, b| b.set.len().cmp(&a.set.len()));
                chosen.extend(candidates.drain(..keep));
            }
            InferenceStrategy::BiggestCostDecrease => {
                candidates.sort_unstable_by(|a, b| MutationSet::by_cost_decrease(&a.set, &b.set));
                chosen.extend(candidates.drain(..keep));
            }
        }
    }

    if state.strategy == InferenceStrategy::BiggestCostDecrease {
        chosen.sort_unstable_by(|a, b| MutationSet::by_cost_decrease(&a.set, &b.set));
    }
    chosen.truncate(config.int_max_process);

    // Throttle: once selection keeps nearly everything it no longer earns
    // its sorting cost, so it degrades to keep-everything for the dataset.
    if state.strategy != InferenceStrategy::None
        && inferred > 0
        && chosen.len() as f64 / inferred as f64 >= config.int_strategy_threshold
    {
        debug!(
            chosen = chosen.len(),
            inferred, "selection stopped filtering; degrading strategy"
        );
        state.strategy = InferenceStrategy::None;
    }

    let chosen_count = chosen.len();
    let mut sequences: Vec<Sequence> = Vec::with_capacity(chosen.len());
    let mut kept_nodes: Vec<usize> = Vec::with_capacity(chosen.len());
    for c in &chosen {
        let node = arena.get(c.node)?;
        sequences.push(node.seq.apply(&c.set));
        kept_nodes.push(c.node);
    }

    let survivors = if state.filter_enabled {
        screen_round(arena, state, &sequences, &kept_nodes, &chosen, config, pools)?
    } else {
        vec![true; sequences.len()]
    };

    // Deduplicate survivors against the existing population and each other.
    let policy = config.policy();
    let mut existing: HashSet<crate::seq::SeqKey<'_>> = HashSet::new();
    for (_, vertex) in arena.iter() {
        existing.insert(vertex.seq.key(&policy));
    }
    let mut keep_flags = vec![false; sequences.len()];
    {
        let mut seen_new: HashSet<crate::seq::SeqKey<'_>> = HashSet::new();
        for (i, seq) in sequences.iter().enumerate() {
            if !survivors.get(i).copied().unwrap_or(false) {
                continue;
            }
            let key = seq.key(&policy);
            if existing.contains(&key) || !seen_new.insert(key) {
                continue;
            }
            if let Some(flag) = keep_flags.get_mut(i) {
                *flag = true;
            }
        }
    }
    let sequences: Vec<Sequence> = sequences
        .into_iter()
        .zip(keep_flags)
        .filter_map(|(seq, keep)| keep.then_some(seq))
        .collect();

    debug!(
        inferred,
        chosen = chosen_count,
        materialised = sequences.len(),
        "inference round finished"
    );
    Ok(InferenceOutcome {
        sequences,
        inferred,
        chosen: chosen_count,
    })
}

/// Runs the local-topology screen for one round and then re-evaluates
/// whether the filter should stay on: a round that feeds it fewer
/// candidates than the configured fraction of the tree size disables it
/// for the rest of the dataset, after that round's screening.
fn screen_round(
    arena: &Arena,
    state: &mut InferenceState,
    sequences: &[Sequence],
    kept_nodes: &[usize],
    chosen: &[Candidate],
    config: &SearchConfig,
    pools: &EdgePools,
) -> Result<Vec<bool>> {
    let entered = sequences.len();
    let survivors = local_topology_screen(arena, sequences, kept_nodes, chosen, config, pools)?;
    let tree_size = arena.len();
    if entered > 0
        && (entered as f64) < tree_size as f64 * config.int_filter_local_topology_threshold
    {
        debug!(entered, tree_size, "local-topology filter disabled itself");
        state.filter_enabled = false;
    }
    Ok(survivors)
}

/// Screens candidates by rebuilding the local topology around their node on
/// the mutation-relevant columns only. Candidates duplicating a neighbour
/// or an earlier candidate fall out first; the rest go through a mini MST
/// whose degree-1 and degree-2 candidates are removed and the tree rebuilt,
/// to a fixpoint. Only candidates still present at the end are kept.
fn local_topology_screen(
    arena: &Arena,
    sequences: &[Sequence],
    kept_nodes: &[usize],
    chosen: &[Candidate],
    config: &SearchConfig,
    pools: &EdgePools,
) -> Result<Vec<bool>> {
    let policy = config.policy();
    let mut survivors = vec![true; sequences.len()];

    // Group candidate indices by their node.
    let mut by_node: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, &node) in kept_nodes.iter().enumerate() {
        by_node.entry(node).or_default().push(i);
    }

    for (node, indices) in by_node {
        let vertex = arena.get(node)?;
        // Columns any incident or candidate set touches, zero-based.
        let mut columns: HashSet<usize> = HashSet::new();
        for &i in &indices {
            if let Some(c) = chosen.get(i) {
                columns.extend(c.set.items().iter().map(|m| usize::from(m.pos) - 1));
            }
        }
        for &child in vertex.children() {
            if let Some(m) = arena.get(child)?.mutations() {
                columns.extend(m.items().iter().map(|m| usize::from(m.pos) - 1));
            }
        }
        if let Some(m) = vertex.mutations() {
            columns.extend(m.items().iter().map(|m| usize::from(m.pos) - 1));
        }
        let mut columns: Vec<usize> = columns.into_iter().collect();
        columns.sort_unstable();
        if columns.is_empty() {
            continue;
        }

        // Mini population: the node, its neighbours, then the candidates.
        // Neighbours are never culled; candidates are.
        let mut mini: Vec<Sequence> = vec![vertex.seq.project(&columns)];
        for &child in vertex.children() {
            mini.push(arena.get(child)?.seq.project(&columns));
        }
        if let Some(parent) = vertex.parent() {
            mini.push(arena.get(parent)?.seq.project(&columns));
        }
        let neighbour_count = mini.len();
        for &i in &indices {
            if let Some(seq) = sequences.get(i) {
                mini.push(seq.project(&columns));
            }
        }

        let mut alive = vec![true; mini.len()];
        {
            // Candidates matching a neighbour or an earlier candidate on
            // the projected columns add nothing to the mini tree.
            let mut seen: HashSet<crate::seq::SeqKey<'_>> = HashSet::new();
            for (k, seq) in mini.iter().enumerate() {
                if !seen.insert(seq.key(&policy)) && k >= neighbour_count {
                    if let Some(flag) = alive.get_mut(k) {
                        *flag = false;
                    }
                }
            }
        }

        loop {
            let members: Vec<usize> = alive
                .iter()
                .enumerate()
                .filter_map(|(k, &live)| live.then_some(k))
                .collect();
            if members.len() < 2 {
                break;
            }
            let entries: Vec<MatrixEntry<'_>> = members
                .iter()
                .enumerate()
                .filter_map(|(dense, &k)| {
                    mini.get(k).map(|seq| MatrixEntry {
                        id: u32::try_from(dense).unwrap_or(u32::MAX),
                        seq: seq.bytes(),
                    })
                })
                .collect();
            let matrix = DistanceMatrix::compute(&entries, &policy);
            let Ok(edges) = jarnik::build(&matrix, pools) else {
                break;
            };

            let mut degree = vec![0usize; members.len()];
            for e in &edges {
                if let Some(d) = degree.get_mut(e.u as usize) {
                    *d += 1;
                }
                if let Some(d) = degree.get_mut(e.v as usize) {
                    *d += 1;
                }
            }
            let mut removed = false;
            for (dense, &k) in members.iter().enumerate() {
                if k >= neighbour_count && degree.get(dense).copied().unwrap_or(0) <= 2 {
                    if let Some(flag) = alive.get_mut(k) {
                        *flag = false;
                    }
                    removed = true;
                }
            }
            if !removed {
                break;
            }
        }

        for (offset, &i) in indices.iter().enumerate() {
            if !alive.get(neighbour_count + offset).copied().unwrap_or(false) {
                if let Some(flag) = survivors.get_mut(i) {
                    *flag = false;
                }
            }
        }
    }
    Ok(survivors)
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;

    use crate::arena::{Vertex, VertexId};
    use crate::mutation::MutationCounter;

    /// Star tree: centre `ACGTACGT` with three leaves, two of which share
    /// the substitutions G3C and G7T. The shared pair must come back as one
    /// candidate intermediate.
    fn shared_pair_arena() -> (Arena, MutationCounter) {
        let policy = crate::seq::SeqPolicy::default();
        let counter = MutationCounter::new(policy, false);
        let mut arena = Arena::new();
        let centre = arena.insert(Vertex::observed(
            "c".into(),
            VertexId::new(0),
            Sequence::new(b"ACGTACGT".to_vec()),
        ));
        let leaves: [&[u8]; 3] = [b"ACCTGCTT", b"ACCTACTG", b"ACGAACGT"];
        for (i, &seq) in leaves.iter().enumerate() {
            let slot = arena.insert(Vertex::observed(
                format!("l{i}"),
                VertexId::new(u32::try_from(i).expect("fits") + 1),
                Sequence::new(seq.to_vec()),
            ));
            let mutations = {
                let from = &arena.get(centre).expect("live").seq;
                let to = &arena.get(slot).expect("live").seq;
                counter.mutations(from, to)
            };
            arena.attach(centre, slot, mutations).expect("fresh link");
        }
        (arena, counter)
    }

    fn config_with(strategy: InferenceStrategy, filter: bool) -> SearchConfig {
        SearchConfig::builder()
            .with_inference(strategy, 4.0, 0.99, 1)
            .with_local_topology_filter(filter, 0.1)
            .build()
            .expect("valid")
    }

    #[test]
    fn shared_mutations_produce_one_intermediate() {
        let (arena, _) = shared_pair_arena();
        let config = config_with(InferenceStrategy::None, false);
        let mut state = InferenceState::new(&config);
        let mut rng = SmallRng::seed_from_u64(1);
        let outcome =
            infer(&arena, &config, &mut state, &EdgePools::new(), &mut rng).expect("tree is sound");
        assert_eq!(outcome.sequences.len(), 1);
        // Centre with A3C and G7T applied.
        assert_eq!(outcome.sequences[0].bytes(), b"ACCTACTT");
    }

    #[test]
    fn existing_sequences_are_not_reinvented() {
        let (mut arena, _) = shared_pair_arena();
        // Insert the would-be intermediate as an existing vertex.
        arena.insert(Vertex::observed(
            "dup".into(),
            VertexId::new(9),
            Sequence::new(b"ACCTACTT".to_vec()),
        ));
        let config = config_with(InferenceStrategy::None, false);
        let mut state = InferenceState::new(&config);
        let mut rng = SmallRng::seed_from_u64(1);
        let outcome =
            infer(&arena, &config, &mut state, &EdgePools::new(), &mut rng).expect("tree is sound");
        assert!(outcome.sequences.is_empty());
        assert_eq!(outcome.inferred, 1);
    }

    #[test]
    fn strategy_degrades_when_selection_stops_filtering() {
        let (arena, _) = shared_pair_arena();
        let config = SearchConfig::builder()
            .with_inference(InferenceStrategy::BigSets, 4.0, 0.5, 1)
            .with_local_topology_filter(false, 0.1)
            .build()
            .expect("valid");
        let mut state = InferenceState::new(&config);
        let mut rng = SmallRng::seed_from_u64(1);
        let _ = infer(&arena, &config, &mut state, &EdgePools::new(), &mut rng)
            .expect("tree is sound");
        // One of one candidates chosen: ratio 1.0 >= 0.5.
        assert_eq!(state.strategy(), InferenceStrategy::None);
    }

    #[test]
    fn filter_disables_itself_on_thin_rounds() {
        let (arena, _) = shared_pair_arena();
        // Threshold of 1.0: a single candidate against four vertices is thin.
        let config = SearchConfig::builder()
            .with_inference(InferenceStrategy::None, 4.0, 0.99, 1)
            .with_local_topology_filter(true, 1.0)
            .build()
            .expect("valid");
        let mut state = InferenceState::new(&config);
        let mut rng = SmallRng::seed_from_u64(1);
        let outcome =
            infer(&arena, &config, &mut state, &EdgePools::new(), &mut rng).expect("tree is sound");
        assert!(!state.filter_enabled());
        assert_eq!(outcome.sequences.len(), 1);
    }

    /// Chain `p → x → c` over four columns. Crafted candidates at `x`
    /// exercise the screen's cleanup pass directly.
    fn chain_arena() -> (Arena, usize, MutationCounter) {
        let policy = crate::seq::SeqPolicy::default();
        let counter = MutationCounter::new(policy, false);
        let mut arena = Arena::new();
        let p = arena.insert(Vertex::observed(
            "p".into(),
            VertexId::new(0),
            Sequence::new(b"AAAA".to_vec()),
        ));
        let x = arena.insert(Vertex::observed(
            "x".into(),
            VertexId::new(1),
            Sequence::new(b"AACC".to_vec()),
        ));
        let c = arena.insert(Vertex::observed(
            "c".into(),
            VertexId::new(2),
            Sequence::new(b"CCCC".to_vec()),
        ));
        let m_px = {
            let from = &arena.get(p).expect("live").seq;
            let to = &arena.get(x).expect("live").seq;
            counter.mutations(from, to)
        };
        arena.attach(p, x, m_px).expect("fresh link");
        let m_xc = {
            let from = &arena.get(x).expect("live").seq;
            let to = &arena.get(c).expect("live").seq;
            counter.mutations(from, to)
        };
        arena.attach(x, c, m_xc).expect("fresh link");
        (arena, x, counter)
    }

    fn crafted_candidate(
        arena: &Arena,
        node: usize,
        counter: &MutationCounter,
        seq: &[u8],
    ) -> (Vec<Sequence>, Vec<usize>, Vec<Candidate>) {
        let cand = Sequence::new(seq.to_vec());
        let set = counter.mutations(&arena.get(node).expect("live").seq, &cand);
        (
            vec![cand],
            vec![node],
            vec![Candidate {
                node,
                set,
                contributors: HashSet::new(),
            }],
        )
    }

    #[test]
    fn degree_two_mini_tree_candidates_are_spliced_out() {
        let (arena, x, counter) = chain_arena();
        // Mini tree is a path p–x–cand–c: the candidate sits on the tree
        // with degree two and the cleanup pass must remove it. The thin
        // round also turns the filter off, after the screening.
        let config = SearchConfig::builder()
            .with_inference(InferenceStrategy::None, 4.0, 0.99, 1)
            .with_local_topology_filter(true, 1.0)
            .build()
            .expect("valid");
        let mut state = InferenceState::new(&config);
        let (sequences, kept_nodes, chosen) = crafted_candidate(&arena, x, &counter, b"ACCC");
        let survivors = screen_round(
            &arena,
            &mut state,
            &sequences,
            &kept_nodes,
            &chosen,
            &config,
            &EdgePools::new(),
        )
        .expect("mini tree builds");
        assert_eq!(survivors, vec![false]);
        assert!(!state.filter_enabled());
    }

    #[test]
    fn junction_candidates_survive_the_screen() {
        let policy = crate::seq::SeqPolicy::default();
        let counter = MutationCounter::new(policy, false);
        let mut arena = Arena::new();
        let centre = arena.insert(Vertex::observed(
            "c".into(),
            VertexId::new(0),
            Sequence::new(b"AAAA".to_vec()),
        ));
        for (i, seq) in [b"CCGA", b"CCTA", b"CCAG"].iter().enumerate() {
            let slot = arena.insert(Vertex::observed(
                format!("l{i}"),
                VertexId::new(u32::try_from(i).expect("fits") + 1),
                Sequence::new(seq.to_vec()),
            ));
            let m = {
                let from = &arena.get(centre).expect("live").seq;
                let to = &arena.get(slot).expect("live").seq;
                counter.mutations(from, to)
            };
            arena.attach(centre, slot, m).expect("fresh link");
        }
        // `CCAA` joins every leaf one step closer than the centre does, so
        // every minimum tree keeps it as a junction of degree three or more.
        let config = config_with(InferenceStrategy::None, true);
        let (sequences, kept_nodes, chosen) = crafted_candidate(&arena, centre, &counter, b"CCAA");
        let survivors = local_topology_screen(
            &arena,
            &sequences,
            &kept_nodes,
            &chosen,
            &config,
            &EdgePools::new(),
        )
        .expect("mini tree builds");
        assert_eq!(survivors, vec![true]);
    }

    #[test]
    fn candidates_duplicating_a_neighbour_are_dropped() {
        let (arena, x, counter) = chain_arena();
        // The candidate equals the parent on the projected columns.
        let config = config_with(InferenceStrategy::None, true);
        let (sequences, kept_nodes, chosen) = crafted_candidate(&arena, x, &counter, b"AAAA");
        let survivors = local_topology_screen(
            &arena,
            &sequences,
            &kept_nodes,
            &chosen,
            &config,
            &EdgePools::new(),
        )
        .expect("mini tree builds");
        assert_eq!(survivors, vec![false]);
    }

    #[test]
    fn global_cap_limits_materialised_candidates() {
        let (arena, _) = shared_pair_arena();
        let config = SearchConfig::builder()
            .with_inference(InferenceStrategy::None, 4.0, 0.99, 1)
            .with_local_topology_filter(false, 0.1)
            .with_max_intermediates(0)
            .build()
            .expect("valid");
        let mut state = InferenceState::new(&config);
        let mut rng = SmallRng::seed_from_u64(1);
        let outcome =
            infer(&arena, &config, &mut state, &EdgePools::new(), &mut rng).expect("tree is sound");
        assert!(outcome.sequences.is_empty());
        assert_eq!(outcome.chosen, 0);
    }
}
