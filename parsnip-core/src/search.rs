//! Per-dataset search orchestration.
//!
//! One dataset runs through four phases: an initial spanning tree over the
//! observed sequences (seeded externally when a [`TreeSeeder`] is wired in),
//! inference rounds that grow intermediate vertices until the population
//! stops changing, an exploration loop that deletes random intermediates and
//! lets the acceptance controller judge the rebuilt candidates, and a
//! sampling phase that masks recurrent columns to shake the tree out of
//! local minima, optionally combining the masked tree's intermediates with
//! the current ones. Datasets are independent, so [`Search::run`] fans them
//! out over scoped worker threads.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::{debug, info, instrument, warn};

use crate::accept::AcceptanceController;
use crate::arena::{Arena, IdAllocator, Vertex};
use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::fitch::{AncestralCostOracle, FitchOracle};
use crate::gaps;
use crate::infer::{self, InferenceState};
use crate::matrix::{DistanceMatrix, MatrixEntry};
use crate::mst::union_find::UnionFind;
use crate::mst::{self, Edge, EdgePools, MstError, boruvka};
use crate::mutation::MutationCounter;
use crate::sampling::SamplingManager;
use crate::seq::{SeqPolicy, Sequence};
use crate::tree::{self, DuplicatePolicy, Tree};

/// Inference rounds allowed per stabilisation before the loop cuts out.
const MAX_INFERENCE_ROUNDS: usize = 50;

/// One named input alignment.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Dataset identifier used in logs and errors.
    pub name: String,
    /// Taxon names with their aligned sequences.
    pub taxa: Vec<(String, Vec<u8>)>,
}

/// Exported tree vertex: name, incoming edge length, children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportNode {
    /// Taxon or generated intermediate name.
    pub name: String,
    /// Substitutions on the incoming edge; zero at the root.
    pub length: u64,
    /// Child subtrees.
    pub children: Vec<ExportNode>,
}

impl ExportNode {
    /// Names of the leaf vertices, preorder.
    #[must_use]
    pub fn leaf_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.children.is_empty() {
                out.push(node.name.as_str());
            }
            stack.extend(node.children.iter());
        }
        out
    }
}

/// Result of one dataset run.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Dataset identifier.
    pub dataset: String,
    /// Parsimony cost of the reported tree.
    pub cost: u64,
    /// Fitch lower bound for the reported topology, when requested.
    pub ancestral_cost: Option<u64>,
    /// Vertices in the reported tree.
    pub vertex_count: usize,
    /// The reported tree.
    pub tree: ExportNode,
}

/// External supplier of an initial topology, typically neighbour joining.
///
/// The seeder receives the deduplicated taxa in matrix order and returns
/// undirected edges over their indices. Anything that is not a spanning
/// tree is discarded with a warning and the search falls back to its own
/// initial tree.
pub trait TreeSeeder: Sync {
    /// Proposes a spanning tree over the dataset's taxa, by index.
    fn seed(&self, dataset: &Dataset) -> Option<Vec<(usize, usize)>>;
}

/// Multi-dataset driver.
pub struct Search<'a> {
    config: SearchConfig,
    seeder: Option<&'a dyn TreeSeeder>,
}

impl<'a> Search<'a> {
    /// Creates a driver for the given configuration.
    #[must_use]
    pub const fn new(config: SearchConfig) -> Self {
        Self {
            config,
            seeder: None,
        }
    }

    /// Wires in an initial-tree seeder.
    #[must_use]
    pub const fn with_seeder(mut self, seeder: &'a dyn TreeSeeder) -> Self {
        self.seeder = Some(seeder);
        self
    }

    /// Runs every dataset, batched over the configured worker count.
    /// Results come back in input order; a failed dataset does not stop
    /// the others.
    pub fn run(&self, datasets: Vec<Dataset>) -> Vec<Result<SearchOutcome>> {
        let workers = self.config.thread_count.get();
        let mut results = Vec::with_capacity(datasets.len());
        let mut pending = datasets.into_iter();
        loop {
            let batch: Vec<Dataset> = pending.by_ref().take(workers).collect();
            if batch.is_empty() {
                return results;
            }
            std::thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .into_iter()
                    .map(|dataset| {
                        let name = dataset.name.clone();
                        let handle = scope.spawn(move || self.run_dataset(&dataset));
                        (name, handle)
                    })
                    .collect();
                for (name, handle) in handles {
                    let outcome = handle
                        .join()
                        .unwrap_or_else(|_| Err(SearchError::WorkerPanicked { name }));
                    results.push(outcome);
                }
            });
        }
    }

    /// Runs a single dataset to completion.
    ///
    /// # Errors
    /// Returns validation errors for empty or ragged datasets and
    /// propagates failures from the search itself.
    #[instrument(skip_all, fields(dataset = %dataset.name))]
    pub fn run_dataset(&self, dataset: &Dataset) -> Result<SearchOutcome> {
        validate(dataset)?;
        Runner::new(&self.config, self.seeder, dataset)?.solve()
    }
}

fn validate(dataset: &Dataset) -> Result<()> {
    let Some(first) = dataset.taxa.first() else {
        return Err(SearchError::EmptyDataset {
            name: dataset.name.clone(),
        });
    };
    let expected = first.1.len();
    for (taxon, seq) in &dataset.taxa {
        if seq.len() != expected {
            return Err(SearchError::LengthMismatch {
                name: dataset.name.clone(),
                taxon: taxon.clone(),
                got: seq.len(),
                expected,
            });
        }
    }
    Ok(())
}

fn dataset_seed(seed: u64, name: &str) -> u64 {
    let mut h = 0xcbf2_9ce4_8422_2325u64;
    for &b in name.as_bytes() {
        h ^= u64::from(b);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    seed ^ h
}

/// Saved state for rollback after a rejected candidate.
struct Snapshot {
    arena: Arena,
    matrix: DistanceMatrix,
    root: usize,
    cost: u64,
}

/// Mutable state of one dataset run.
struct Runner<'a> {
    name: String,
    config: &'a SearchConfig,
    seeder: Option<&'a dyn TreeSeeder>,
    policy: SeqPolicy,
    counter: MutationCounter,
    pools: EdgePools,
    ids: IdAllocator,
    rng: SmallRng,
    state: InferenceState,
    controller: AcceptanceController,
    arena: Arena,
    matrix: DistanceMatrix,
    duplicates: Vec<Vertex>,
    root: usize,
    round: u32,
    cost: u64,
    best_cost: u64,
    since_improvement: u32,
}

impl<'a> Runner<'a> {
    fn new(
        config: &'a SearchConfig,
        seeder: Option<&'a dyn TreeSeeder>,
        dataset: &Dataset,
    ) -> Result<Self> {
        let policy = config.policy();
        let ids = IdAllocator::new(0);
        let mut arena = Arena::new();
        for (name, bytes) in &dataset.taxa {
            arena.insert(Vertex::observed(
                name.clone(),
                ids.allocate(),
                Sequence::new(bytes.clone()),
            ));
        }
        let mut duplicates = Vec::new();
        let removed =
            tree::remove_duplicates(&mut arena, &policy, DuplicatePolicy::StoreAll, &mut duplicates)?;
        if removed > 0 {
            debug!(removed, "stored duplicate taxa for later reattachment");
        }
        let mut runner = Self {
            name: dataset.name.clone(),
            config,
            seeder,
            policy,
            counter: MutationCounter::new(policy, config.memoise_counts),
            pools: EdgePools::new(),
            ids,
            rng: SmallRng::seed_from_u64(dataset_seed(config.seed, &dataset.name)),
            state: InferenceState::new(config),
            controller: AcceptanceController::new(config),
            arena,
            matrix: DistanceMatrix::default(),
            duplicates,
            root: 0,
            round: 0,
            cost: 0,
            best_cost: u64::MAX,
            since_improvement: 0,
        };
        runner.recompute_matrix_full();
        Ok(runner)
    }

    fn solve(mut self) -> Result<SearchOutcome> {
        if !self.seed_initial_tree()? {
            self.build_tree()?;
        }
        self.inference_until_stable()?;
        self.cost = self.tree().cost(&self.arena)?;
        self.best_cost = self.cost;
        self.controller.record_best(self.cost);
        info!(cost = self.cost, vertices = self.arena.len(), "initial tree built");

        let tree = self.tree();
        let gap_record =
            gaps::cancel_gaps_in_internals(&mut self.arena, tree, &self.policy, &mut self.matrix)?;
        self.refine_loop(
            self.config.init_tree_burn_in,
            self.config.init_tree_additional_max_iter,
        )?;
        gaps::restore_gaps(&mut self.arena, &self.policy, &mut self.matrix, gap_record)?;
        self.build_tree()?;
        self.cost = self.tree().cost(&self.arena)?;
        info!(cost = self.cost, "exploration finished");

        self.sampling_phase()?;
        self.finalize()
    }

    const fn tree(&self) -> Tree {
        Tree { root: self.root }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            arena: self.arena.clone(),
            matrix: self.matrix.clone(),
            root: self.root,
            cost: self.cost,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.arena = snapshot.arena;
        self.matrix = snapshot.matrix;
        self.root = snapshot.root;
        self.cost = snapshot.cost;
    }

    /// Rebuilds the matrix from scratch over the live population, rows in
    /// ascending id order so later row removals stay ordered.
    fn recompute_matrix_full(&mut self) {
        let mut refs: Vec<(u32, &[u8])> = self
            .arena
            .iter()
            .map(|(_, v)| (v.id.get(), v.seq.bytes()))
            .collect();
        refs.sort_unstable_by_key(|e| e.0);
        let entries: Vec<MatrixEntry<'_>> = refs
            .iter()
            .map(|&(id, seq)| MatrixEntry { id, seq })
            .collect();
        self.matrix = DistanceMatrix::compute(&entries, &self.policy);
    }

    /// Recomputes the matrix for the masked population, reusing unmasked
    /// distances where the previous matrix knows the pair.
    fn recompute_matrix_masked(&mut self, columns: &[usize]) {
        let mut refs: Vec<(u32, &[u8], &[u8])> = self
            .arena
            .iter()
            .map(|(_, v)| (v.id.get(), v.seq.bytes(), v.comparison_seq().bytes()))
            .collect();
        refs.sort_unstable_by_key(|e| e.0);
        let masked: Vec<MatrixEntry<'_>> = refs
            .iter()
            .map(|&(id, seq, _)| MatrixEntry { id, seq })
            .collect();
        let originals: Vec<MatrixEntry<'_>> = refs
            .iter()
            .map(|&(id, _, seq)| MatrixEntry { id, seq })
            .collect();
        let prev = std::mem::take(&mut self.matrix);
        self.matrix =
            DistanceMatrix::compute_reusing(&masked, &originals, columns, &self.policy, &prev);
    }

    /// Drops matrix rows whose vertices are gone.
    fn sync_matrix_removals(&mut self) -> Result<()> {
        let live: HashSet<u32> = self.arena.iter().map(|(_, v)| v.id.get()).collect();
        let kept: Vec<u32> = self
            .matrix
            .ids()
            .iter()
            .copied()
            .filter(|id| live.contains(id))
            .collect();
        if kept.len() != self.matrix.len() {
            self.matrix.restore(&kept)?;
        }
        Ok(())
    }

    /// Appends matrix rows for vertices the matrix has not seen yet.
    fn append_matrix_rows(&mut self) -> Result<()> {
        let known: HashSet<u32> = self.matrix.ids().iter().copied().collect();
        let mut order: Vec<u32> = self.matrix.ids().to_vec();
        let mut fresh: Vec<u32> = self
            .arena
            .iter()
            .map(|(_, v)| v.id.get())
            .filter(|id| !known.contains(id))
            .collect();
        fresh.sort_unstable();
        order.extend(fresh);
        let by_id: HashMap<u32, &[u8]> = self
            .arena
            .iter()
            .map(|(_, v)| (v.id.get(), v.seq.bytes()))
            .collect();
        let entries: Vec<MatrixEntry<'_>> = order
            .iter()
            .filter_map(|id| by_id.get(id).map(|&seq| MatrixEntry { id: *id, seq }))
            .collect();
        self.matrix.append(&entries, &self.policy)
    }

    /// Arena slots in dense matrix order.
    fn dense_slots(&self) -> Result<Vec<usize>> {
        let slot_of: HashMap<u32, usize> = self
            .arena
            .iter()
            .map(|(slot, v)| (v.id.get(), slot))
            .collect();
        self.matrix
            .ids()
            .iter()
            .map(|id| {
                slot_of
                    .get(id)
                    .copied()
                    .ok_or(SearchError::UnknownVertex { id: *id })
            })
            .collect()
    }

    /// Builds a fresh spanning tree over the matrix population and roots it
    /// at the lowest id.
    fn build_tree(&mut self) -> Result<()> {
        let slots = self.dense_slots()?;
        let edges = mst::build(&self.matrix, self.config, &self.pools, &mut self.rng)?;
        self.arena.deforest_all();
        mst::orient(&mut self.arena, &slots, &edges, 0, &self.counter)?;
        self.root = slots
            .first()
            .copied()
            .ok_or(SearchError::Mst(MstError::EmptyGraph))?;
        Ok(())
    }

    /// Reconnects tree fragments through their cheapest crossing edges
    /// instead of rebuilding the whole spanning tree.
    fn repair(&mut self, representatives: &[usize]) -> Result<()> {
        let parts_slots = tree::collect_components(&self.arena, representatives)?;
        let dense_of: HashMap<u32, u32> = self
            .matrix
            .ids()
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i as u32))
            .collect();
        let mut parts = Vec::with_capacity(parts_slots.len());
        for component in parts_slots {
            let mut dense = Vec::with_capacity(component.len());
            for slot in component {
                let id = self.arena.get(slot)?.id.get();
                dense.push(
                    dense_of
                        .get(&id)
                        .copied()
                        .ok_or(SearchError::UnknownVertex { id })?,
                );
            }
            parts.push(dense);
        }
        let mut edges = boruvka::merge_components(parts, &self.matrix)?;
        for (slot, v) in self.arena.iter() {
            let Some(parent) = v.parent() else {
                continue;
            };
            let parent_id = self.arena.get(parent)?.id.get();
            let child_id = self.arena.get(slot)?.id.get();
            let (Some(&u), Some(&w)) = (dense_of.get(&parent_id), dense_of.get(&child_id)) else {
                return Err(SearchError::UnknownVertex { id: child_id });
            };
            edges.push(Edge::new(u, w, self.matrix.at(u as usize, w as usize)));
        }
        let slots = self.dense_slots()?;
        self.arena.deforest_all();
        mst::orient(&mut self.arena, &slots, &edges, 0, &self.counter)?;
        self.root = slots
            .first()
            .copied()
            .ok_or(SearchError::Mst(MstError::EmptyGraph))?;
        Ok(())
    }

    /// Order-independent fingerprint of the live sequence population, used
    /// to detect when inference has started cycling.
    fn population_fingerprint(&self) -> u64 {
        let mut keys: Vec<(u32, usize)> = self
            .arena
            .iter()
            .map(|(_, v)| (v.seq.checksum(), v.seq.len()))
            .collect();
        keys.sort_unstable();
        let mut h = DefaultHasher::new();
        keys.hash(&mut h);
        h.finish()
    }

    /// Runs inference rounds, growing the tree, until the population stops
    /// changing or the round cap is hit.
    fn inference_until_stable(&mut self) -> Result<()> {
        self.round += 1;
        let mut seen = HashSet::from([self.population_fingerprint()]);
        for _ in 0..MAX_INFERENCE_ROUNDS {
            let outcome = infer::infer(
                &self.arena,
                self.config,
                &mut self.state,
                &self.pools,
                &mut self.rng,
            )?;
            if outcome.sequences.is_empty() {
                break;
            }
            debug!(
                inferred = outcome.inferred,
                chosen = outcome.chosen,
                materialised = outcome.sequences.len(),
                "inference round"
            );
            for seq in outcome.sequences {
                let vertex = Vertex::inferred(self.ids.allocate(), seq, self.round);
                self.arena.insert(vertex);
            }
            self.append_matrix_rows()?;
            self.build_tree()?;
            tree::set_status(&mut self.arena, &self.policy)?;
            let tree = self.tree();
            let _ = tree::prune_inferred_leaves(&mut self.arena, tree, true)?;
            self.sync_matrix_removals()?;
            if !seen.insert(self.population_fingerprint()) {
                break;
            }
        }
        Ok(())
    }

    /// One exploration iteration: damage, rebuild or repair, infer, judge.
    /// Returns whether the accepted candidate improved on the previous cost.
    fn explore_step(&mut self) -> Result<bool> {
        let before = self.cost;
        let snapshot = self.snapshot();
        let population = self.arena.len();
        let tree = self.tree();
        let deleted = tree::delete_random_intermediates(
            &mut self.arena,
            tree,
            self.config.delete_int_coef,
            &mut self.rng,
        )?;
        self.sync_matrix_removals()?;
        if mst::should_repair(self.config, population, deleted.removed) {
            self.repair(&deleted.representatives)?;
        } else {
            self.build_tree()?;
        }
        self.inference_until_stable()?;
        let candidate = self.tree().cost(&self.arena)?;
        let accepted =
            self.controller
                .evaluate(candidate, self.cost, self.since_improvement, &mut self.rng);
        if accepted {
            self.cost = candidate;
            self.note_cost(candidate);
            Ok(candidate < before)
        } else {
            self.restore(snapshot);
            self.since_improvement = self.since_improvement.saturating_add(1);
            Ok(false)
        }
    }

    /// Folds a settled candidate cost into the best-known bookkeeping.
    fn note_cost(&mut self, cost: u64) {
        if cost < self.best_cost {
            self.best_cost = cost;
            self.controller.record_best(cost);
            self.since_improvement = 0;
        } else {
            self.since_improvement = self.since_improvement.saturating_add(1);
        }
    }

    /// Exploration budget loop: `budget` iterations, with at least `window`
    /// more granted after every improvement.
    fn refine_loop(&mut self, budget: u32, window: u32) -> Result<bool> {
        let mut left = budget;
        let mut improved_any = false;
        while left > 0 {
            if self.explore_step()? {
                improved_any = true;
                left = left.saturating_sub(1).max(window);
            } else {
                left -= 1;
            }
        }
        Ok(improved_any)
    }

    /// The masked sampling phase: draw columns, build a masked tree,
    /// optionally combine its intermediates with the current ones, and
    /// adopt the result only when the unmasked cost improves.
    fn sampling_phase(&mut self) -> Result<()> {
        let sampler = {
            let observed: Vec<&Sequence> = self
                .arena
                .iter()
                .filter(|(_, v)| v.original)
                .map(|(_, v)| v.comparison_seq())
                .collect();
            SamplingManager::new(&observed, &self.policy)
        };
        if sampler.candidates().is_empty() {
            debug!("no maskable columns, skipping sampling phase");
            return Ok(());
        }
        let mut stale = 0u32;
        let mut seed_temp = self.config.temp_tree_first_as_nj && self.seeder.is_some();
        while stale < self.config.sampling_iter_count {
            let columns = sampler.draw(
                self.config.masking_sites_min,
                self.config.masking_sites_max,
                &mut self.rng,
            );
            if columns.is_empty() {
                break;
            }
            let snapshot = self.snapshot();
            let candidate = self.masked_round(&snapshot, &columns, seed_temp)?;
            seed_temp = false;
            if candidate < snapshot.cost {
                self.cost = candidate;
                self.note_cost(candidate);
                stale = 0;
                info!(cost = candidate, masked = columns.len(), "masked round improved the tree");
            } else {
                self.restore(snapshot);
                self.since_improvement = self.since_improvement.saturating_add(1);
                stale += 1;
            }
        }
        Ok(())
    }

    /// One masked round. Leaves the runner on an unmasked, rebuilt tree and
    /// returns its cost; the caller decides adoption against its snapshot.
    /// With `seed_temp` set the masked topology is offered to the seeder
    /// first, the way the initial tree is.
    fn masked_round(
        &mut self,
        snapshot: &Snapshot,
        columns: &[usize],
        seed_temp: bool,
    ) -> Result<u64> {
        tree::mask_all(&mut self.arena, columns, &self.policy)?;
        self.recompute_matrix_masked(columns);
        if !(seed_temp && self.try_seed_tree()?) {
            self.build_tree()?;
        }
        self.inference_until_stable()?;
        self.cost = self.tree().cost(&self.arena)?;
        self.refine_loop(self.config.temp_tree_max_iter, self.config.temp_tree_iter)?;
        debug!(
            masked_cost = self.cost,
            unmasked_cost = self
                .tree()
                .cost_ignoring_masking(&self.arena, columns, &self.policy)?,
            "masked tree settled"
        );

        if self.config.compute_combined_tree {
            self.import_intermediates(snapshot, columns)?;
            if !self.config.combined_tree_with_masking {
                tree::unmask_all(&mut self.arena)?;
            }
            self.dedup_population()?;
            self.recompute_matrix_full();
            self.build_tree()?;
            self.inference_until_stable()?;
            self.cost = self.tree().cost(&self.arena)?;
            self.refine_loop(
                self.config.combined_tree_max_iter,
                self.config.combined_tree_iter,
            )?;
        }

        tree::unmask_all(&mut self.arena)?;
        self.recompute_matrix_full();
        self.build_tree()?;
        self.inference_until_stable()?;
        self.tree().cost(&self.arena)
    }

    /// Copies the snapshot's intermediates that the current population does
    /// not already hold, so the combined tree can pick from both.
    fn import_intermediates(&mut self, snapshot: &Snapshot, columns: &[usize]) -> Result<()> {
        let masked = self.config.combined_tree_with_masking;
        let fresh: Vec<Sequence> = {
            let present: HashSet<_> = self
                .arena
                .iter()
                .map(|(_, v)| v.comparison_seq().key(&self.policy))
                .collect();
            snapshot
                .arena
                .iter()
                .filter(|(_, v)| !v.original)
                .filter(|(_, v)| !present.contains(&v.comparison_seq().key(&self.policy)))
                .map(|(_, v)| v.comparison_seq().clone())
                .collect()
        };
        for seq in fresh {
            let mut vertex = Vertex::inferred(self.ids.allocate(), seq, self.round);
            if masked {
                let original = vertex.seq.clone();
                vertex.seq = original.masked(columns, &self.policy);
                vertex.sec = Some(original);
            }
            self.arena.insert(vertex);
        }
        Ok(())
    }

    /// Collapses sequence-identical vertices before a combined build.
    fn dedup_population(&mut self) -> Result<()> {
        self.arena.deforest_all();
        let mut discard = Vec::new();
        let _ = tree::remove_duplicates(
            &mut self.arena,
            &self.policy,
            DuplicatePolicy::DropNonOriginal,
            &mut discard,
        )?;
        self.sync_matrix_removals()
    }

    /// Final cleanup and export.
    fn finalize(mut self) -> Result<SearchOutcome> {
        tree::unmask_all(&mut self.arena)?;
        tree::set_status(&mut self.arena, &self.policy)?;
        let tree = self.tree();
        let _ = tree::splice_degree2(&mut self.arena, tree, &self.counter)?;
        let _ = tree::prune_inferred_leaves(&mut self.arena, tree, true)?;
        tree::move_originals_to_leaves(&mut self.arena, &self.ids)?;
        let store = std::mem::take(&mut self.duplicates);
        tree::reattach_duplicates(&mut self.arena, tree, &self.policy, &self.counter, store)?;

        let cost = tree.cost(&self.arena)?;
        let ancestral_cost = if self.config.compute_final_ancestral_cost {
            Some(FitchOracle.cost(&self.arena, tree)?)
        } else {
            None
        };
        info!(
            cost,
            ancestral_cost,
            vertices = self.arena.len(),
            "dataset finished"
        );
        Ok(SearchOutcome {
            dataset: self.name,
            cost,
            ancestral_cost,
            vertex_count: self.arena.len(),
            tree: export(&self.arena, tree.root)?,
        })
    }

    /// Asks the seeder for an initial topology and installs it when it is a
    /// valid spanning tree over the deduplicated taxa.
    fn seed_initial_tree(&mut self) -> Result<bool> {
        if !self.config.init_tree_as_nj {
            return Ok(false);
        }
        self.try_seed_tree()
    }

    /// Offers the current population to the seeder and installs the
    /// returned topology when it is a valid spanning tree.
    fn try_seed_tree(&mut self) -> Result<bool> {
        let Some(seeder) = self.seeder else {
            return Ok(false);
        };
        let slots = self.dense_slots()?;
        let mut taxa = Vec::with_capacity(slots.len());
        for &slot in &slots {
            let v = self.arena.get(slot)?;
            taxa.push((v.name.clone(), v.seq.bytes().to_vec()));
        }
        let view = Dataset {
            name: self.name.clone(),
            taxa,
        };
        let Some(pairs) = seeder.seed(&view) else {
            return Ok(false);
        };
        let n = slots.len();
        let mut uf = UnionFind::new(n);
        let spanning = pairs.len() == n.saturating_sub(1)
            && pairs.iter().all(|&(u, v)| {
                u < n
                    && v < n
                    && u32::try_from(u)
                        .ok()
                        .zip(u32::try_from(v).ok())
                        .is_some_and(|(u, v)| uf.union(u, v))
            });
        if !spanning {
            warn!(edges = pairs.len(), taxa = n, "seeded topology is not a spanning tree, ignoring");
            return Ok(false);
        }
        let edges: Vec<Edge> = pairs
            .iter()
            .map(|&(u, v)| Edge::new(u as u32, v as u32, self.matrix.at(u, v)))
            .collect();
        self.arena.deforest_all();
        mst::orient(&mut self.arena, &slots, &edges, 0, &self.counter)?;
        self.root = slots
            .first()
            .copied()
            .ok_or(SearchError::Mst(MstError::EmptyGraph))?;
        debug!(vertices = n, "installed seeded topology");
        Ok(true)
    }
}

fn export(arena: &Arena, slot: usize) -> Result<ExportNode> {
    let vertex = arena.get(slot)?;
    let mut children = Vec::with_capacity(vertex.children().len());
    for &child in vertex.children() {
        children.push(export(arena, child)?);
    }
    Ok(ExportNode {
        name: vertex.name.clone(),
        length: vertex.mutations().map_or(0, |m| m.len() as u64),
        children,
    })
}
