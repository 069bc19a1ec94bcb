//! Independent parsimony scoring of a finished topology.
//!
//! The search accumulates cost edge by edge as the tree mutates, which
//! leaves room for bookkeeping drift. The Fitch oracle rescores the final
//! topology from the observed leaves alone, column by column, giving the
//! minimum substitution count the shape admits. Reported next to the edge
//! sum it shows how far the reconstructed ancestors sit from that bound.

use std::collections::HashMap;

use tracing::debug;

use crate::arena::Arena;
use crate::error::Result;
use crate::tree::Tree;

/// Scores a rooted topology against its leaf sequences.
pub trait AncestralCostOracle {
    /// Minimum substitution count the topology admits for its leaf data.
    ///
    /// # Errors
    /// Propagates arena access failures on dangling links.
    fn cost(&self, arena: &Arena, tree: Tree) -> Result<u64>;
}

/// Column-wise Fitch scoring, generalised to multifurcating vertices: a
/// vertex keeps the characters most frequent among its children's state
/// sets and pays one substitution per child outside that majority.
#[derive(Debug, Default, Clone, Copy)]
pub struct FitchOracle;

impl FitchOracle {
    fn column_cost(&self, arena: &Arena, postorder: &[usize], column: usize) -> Result<u64> {
        let mut states: HashMap<usize, Vec<u8>> = HashMap::new();
        let mut cost = 0u64;
        for &slot in postorder {
            let vertex = arena.get(slot)?;
            if vertex.children().is_empty() {
                let state = vertex
                    .comparison_seq()
                    .at(column)
                    .map_or_else(Vec::new, |ch| vec![ch]);
                states.insert(slot, state);
                continue;
            }
            let mut counts: HashMap<u8, usize> = HashMap::new();
            let mut child_sets = 0usize;
            for &child in vertex.children() {
                let Some(set) = states.remove(&child) else {
                    continue;
                };
                if set.is_empty() {
                    continue;
                }
                child_sets += 1;
                for ch in set {
                    *counts.entry(ch).or_insert(0) += 1;
                }
            }
            let majority = counts.values().copied().max().unwrap_or(0);
            if child_sets > majority {
                cost += (child_sets - majority) as u64;
            }
            let state: Vec<u8> = counts
                .into_iter()
                .filter_map(|(ch, n)| (n == majority).then_some(ch))
                .collect();
            states.insert(slot, state);
        }
        Ok(cost)
    }
}

impl AncestralCostOracle for FitchOracle {
    fn cost(&self, arena: &Arena, tree: Tree) -> Result<u64> {
        let preorder = tree.collect_slots(arena)?;
        let postorder: Vec<usize> = preorder.iter().rev().copied().collect();
        let width = postorder
            .iter()
            .filter_map(|&s| arena.get(s).ok())
            .filter(|v| v.children().is_empty())
            .map(|v| v.comparison_seq().len())
            .max()
            .unwrap_or(0);
        let mut total = 0u64;
        for column in 0..width {
            total += self.column_cost(arena, &postorder, column)?;
        }
        debug!(cost = total, "rescored topology from leaves");
        Ok(total)
    }
}
