use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::SmallRng;

use super::union_find::UnionFind;
use super::{Edge, EdgePools, boruvka, jarnik, prim_complete};
use crate::matrix::{DistanceMatrix, MatrixEntry};
use crate::seq::SeqPolicy;

fn matrix_from(seqs: &[Vec<u8>]) -> DistanceMatrix {
    let entries: Vec<MatrixEntry<'_>> = seqs
        .iter()
        .enumerate()
        .map(|(i, seq)| MatrixEntry {
            id: u32::try_from(i).expect("population fits u32"),
            seq,
        })
        .collect();
    DistanceMatrix::compute(&entries, &SeqPolicy::default())
}

fn total_weight(edges: &[Edge]) -> u64 {
    edges.iter().map(|e| u64::from(e.cost)).sum()
}

fn is_spanning_tree(edges: &[Edge], n: usize) -> bool {
    if edges.len() != n - 1 {
        return false;
    }
    let mut uf = UnionFind::new(n);
    edges.iter().all(|e| uf.union(e.u, e.v))
}

fn sequences() -> impl Strategy<Value = Vec<Vec<u8>>> {
    let nucleotide = prop::sample::select(vec![b'A', b'C', b'G', b'T']);
    (2usize..10, 4usize..16).prop_flat_map(move |(n, len)| {
        prop::collection::vec(prop::collection::vec(nucleotide.clone(), len), n)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// All engines agree with the array-Prim oracle on total weight and
    /// produce valid spanning trees, whatever the tie structure.
    #[test]
    fn engines_agree_on_minimum_weight(seqs in sequences(), seed in any::<u64>()) {
        let matrix = matrix_from(&seqs);
        let n = seqs.len();

        let mut rng = SmallRng::seed_from_u64(seed);
        let oracle = prim_complete::build(&matrix, &mut rng).expect("non-empty");
        prop_assert!(is_spanning_tree(&oracle, n));
        let oracle_weight = total_weight(&oracle);

        let heap_tree = jarnik::build(&matrix, &EdgePools::new()).expect("non-empty");
        prop_assert!(is_spanning_tree(&heap_tree, n));
        prop_assert_eq!(total_weight(&heap_tree), oracle_weight);

        let candidate_tree = boruvka::build(&matrix).expect("non-empty");
        prop_assert!(is_spanning_tree(&candidate_tree, n));
        prop_assert_eq!(total_weight(&candidate_tree), oracle_weight);
    }

    /// A random bipartition of the population is always reconnected by the
    /// component merge used for tree repair.
    #[test]
    fn merge_reconnects_random_partitions(seqs in sequences(), split in any::<u64>()) {
        let n = seqs.len();
        let matrix = matrix_from(&seqs);

        let mut left = Vec::new();
        let mut right = Vec::new();
        for v in 0..n {
            let v32 = u32::try_from(v).expect("fits");
            if v == 0 || (split >> (v % 64)) & 1 == 0 {
                left.push(v32);
            } else {
                right.push(v32);
            }
        }
        let parts: Vec<Vec<u32>> = [left, right]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();
        let part_count = parts.len();

        let added = boruvka::merge_components(parts, &matrix).expect("partition is valid");
        prop_assert_eq!(added.len(), part_count - 1);
    }
}
