use std::num::NonZeroUsize;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rstest::rstest;

use super::union_find::UnionFind;
use super::*;
use crate::arena::{Arena, Vertex, VertexId};
use crate::config::SearchConfig;
use crate::matrix::{DistanceMatrix, MatrixEntry};
use crate::mutation::MutationCounter;
use crate::seq::{SeqPolicy, Sequence};

fn matrix_from(seqs: &[&[u8]]) -> DistanceMatrix {
    let entries: Vec<MatrixEntry<'_>> = seqs
        .iter()
        .enumerate()
        .map(|(i, &seq)| MatrixEntry {
            id: u32::try_from(i).expect("test population fits u32"),
            seq,
        })
        .collect();
    DistanceMatrix::compute(&entries, &SeqPolicy::default())
}

fn total_weight(edges: &[Edge]) -> u64 {
    edges.iter().map(|e| u64::from(e.cost)).sum()
}

fn check_tree_invariants(edges: &[Edge], n: usize) {
    assert_eq!(edges.len(), n - 1, "spanning tree must have n-1 edges");
    let mut uf = UnionFind::new(n);
    for e in edges {
        assert!(uf.union(e.u, e.v), "edge ({}, {}) closes a cycle", e.u, e.v);
    }
    let root = uf.find(0);
    for v in 1..n {
        assert_eq!(
            uf.find(u32::try_from(v).expect("fits")),
            root,
            "vertex {v} is disconnected"
        );
    }
}

const SEQS: [&[u8]; 6] = [
    b"ACGTACGT",
    b"ACGTACGA",
    b"ACCTACGA",
    b"TCCTACGA",
    b"TCCTGCGA",
    b"TCCTGCGG",
];

#[derive(Debug, Clone, Copy)]
enum EngineUnderTest {
    PrimComplete,
    Jarnik,
    Boruvka,
}

fn run_engine(engine: EngineUnderTest, matrix: &DistanceMatrix) -> Result<Vec<Edge>, MstError> {
    match engine {
        EngineUnderTest::PrimComplete => {
            let mut rng = SmallRng::seed_from_u64(7);
            prim_complete::build(matrix, &mut rng)
        }
        EngineUnderTest::Jarnik => jarnik::build(matrix, &EdgePools::new()),
        EngineUnderTest::Boruvka => boruvka::build(matrix),
    }
}

#[rstest]
#[case::prim_complete(EngineUnderTest::PrimComplete)]
#[case::jarnik(EngineUnderTest::Jarnik)]
#[case::boruvka(EngineUnderTest::Boruvka)]
fn engines_build_valid_trees(#[case] engine: EngineUnderTest) {
    let matrix = matrix_from(&SEQS);
    let edges = run_engine(engine, &matrix).expect("population is non-empty");
    check_tree_invariants(&edges, SEQS.len());
    // The chain above has a unique MST of weight 5: one substitution per hop.
    assert_eq!(total_weight(&edges), 5);
}

#[rstest]
#[case::prim_complete(EngineUnderTest::PrimComplete)]
#[case::jarnik(EngineUnderTest::Jarnik)]
#[case::boruvka(EngineUnderTest::Boruvka)]
fn engines_reject_empty_graphs(#[case] engine: EngineUnderTest) {
    let matrix = DistanceMatrix::default();
    let err = run_engine(engine, &matrix).expect_err("empty graph");
    assert_eq!(err.code(), MstErrorCode::EmptyGraph);
}

#[rstest]
#[case::prim_complete(EngineUnderTest::PrimComplete)]
#[case::jarnik(EngineUnderTest::Jarnik)]
#[case::boruvka(EngineUnderTest::Boruvka)]
fn single_vertex_yields_no_edges(#[case] engine: EngineUnderTest) {
    let matrix = matrix_from(&[b"ACGT"]);
    let edges = run_engine(engine, &matrix).expect("single vertex is fine");
    assert!(edges.is_empty());
}

#[test]
fn prim_complete_is_deterministic_per_seed() {
    let matrix = matrix_from(&SEQS);
    let mut a = SmallRng::seed_from_u64(11);
    let mut b = SmallRng::seed_from_u64(11);
    assert_eq!(
        prim_complete::build(&matrix, &mut a).expect("non-empty"),
        prim_complete::build(&matrix, &mut b).expect("non-empty"),
    );
}

#[rstest]
#[case::complete_engine_small(true, 10, Engine::PrimComplete)]
#[case::complete_engine_large(true, 100, Engine::PrimComplete)]
#[case::below_threshold(false, 50, Engine::Jarnik)]
#[case::above_threshold(false, 51, Engine::Boruvka)]
fn engine_selection_follows_thresholds(
    #[case] use_prim: bool,
    #[case] n: usize,
    #[case] expected: Engine,
) {
    let config = SearchConfig::builder()
        .with_mst_engines(use_prim, 50)
        .build()
        .expect("valid");
    assert_eq!(select(&config, n), expected);
}

#[rstest]
// Complete-graph engine always rebuilds.
#[case::prim_complete(true, 100, 0, false)]
// Small populations rebuild.
#[case::small_population(false, 30, 0, false)]
// Too much damage rebuilds.
#[case::heavy_deletion(false, 1000, 100, false)]
#[case::repairable(false, 1000, 5, true)]
fn repair_gating(
    #[case] use_prim: bool,
    #[case] vertices: usize,
    #[case] deleted: usize,
    #[case] expected: bool,
) {
    let config = SearchConfig::builder()
        .with_mst_engines(use_prim, 50)
        .with_repair_thresholds(30, 0.01)
        .build()
        .expect("valid");
    assert_eq!(should_repair(&config, vertices, deleted), expected);
}

#[test]
fn build_dispatches_by_configuration() {
    let matrix = matrix_from(&SEQS);
    let pools = EdgePools::new();
    let mut rng = SmallRng::seed_from_u64(3);
    let config = SearchConfig::builder()
        .with_threads(NonZeroUsize::MIN)
        .with_mst_engines(false, 2)
        .build()
        .expect("valid");
    let edges = build(&matrix, &config, &pools, &mut rng).expect("non-empty");
    check_tree_invariants(&edges, SEQS.len());
    assert_eq!(total_weight(&edges), 5);
}

#[test]
fn orient_roots_the_tree_and_attaches_mutations() {
    let policy = SeqPolicy::default();
    let counter = MutationCounter::new(policy, false);
    let matrix = matrix_from(&SEQS);
    let edges = boruvka::build(&matrix).expect("non-empty");

    let mut arena = Arena::new();
    let slots: Vec<usize> = SEQS
        .iter()
        .enumerate()
        .map(|(i, &seq)| {
            arena.insert(Vertex::observed(
                format!("t{i}"),
                VertexId::new(u32::try_from(i).expect("fits")),
                Sequence::new(seq.to_vec()),
            ))
        })
        .collect();

    orient(&mut arena, &slots, &edges, 0, &counter).expect("edges form a tree");

    let root = slots[0];
    assert!(arena.get(root).expect("live").parent().is_none());
    let mut linked = 0;
    for &slot in &slots[1..] {
        let v = arena.get(slot).expect("live");
        assert!(v.parent().is_some(), "{} must have a parent", v.name);
        let mutations = v.mutations().expect("oriented edge carries mutations");
        let parent = arena.get(v.parent().expect("checked")).expect("live");
        assert_eq!(mutations.len(), usize::from(counter.count(&parent.seq, &v.seq)));
        linked += 1;
    }
    assert_eq!(linked, SEQS.len() - 1);
}

#[test]
fn merge_components_reconnects_a_partition() {
    let matrix = matrix_from(&SEQS);
    let parts = vec![vec![0, 1, 2], vec![3, 4], vec![5]];
    let added = boruvka::merge_components(parts, &matrix).expect("partition covers the matrix");
    assert_eq!(added.len(), 2);

    // Intra-component chains plus the added edges must span everything.
    let mut edges = vec![
        Edge::new(0, 1, matrix.at(0, 1)),
        Edge::new(1, 2, matrix.at(1, 2)),
        Edge::new(3, 4, matrix.at(3, 4)),
    ];
    edges.extend(added);
    check_tree_invariants(&edges, SEQS.len());
    assert_eq!(total_weight(&edges), 5);
}

#[test]
fn error_codes_are_stable() {
    assert_eq!(MstError::EmptyGraph.code().as_str(), "empty_graph");
    assert_eq!(
        MstError::Disconnected { components: 2 }.code().as_str(),
        "disconnected"
    );
    assert_eq!(MstError::PoolPoisoned.code().as_str(), "pool_poisoned");
}
