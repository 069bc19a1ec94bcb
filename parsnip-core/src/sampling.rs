//! Column sampling for the masked search phases.
//!
//! A column qualifies for masking when at least two distinct non-gap
//! characters each appear at least twice across the dataset; masking
//! anything rarer would erase the only evidence a substitution happened.
//! Draws come from the run's seeded generator, so a run is reproducible
//! column for column.

use std::collections::HashMap;

use rand::Rng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;

use crate::seq::{SeqPolicy, Sequence};

/// Picks maskable columns for the sampling phases of one dataset.
#[derive(Debug)]
pub struct SamplingManager {
    candidates: Vec<usize>,
}

impl SamplingManager {
    /// Scans the dataset for maskable columns.
    #[must_use]
    pub fn new(sequences: &[&Sequence], policy: &SeqPolicy) -> Self {
        let width = sequences.iter().map(|s| s.len()).max().unwrap_or(0);
        let mut candidates = Vec::new();
        let mut counts: HashMap<u8, usize> = HashMap::new();
        for column in 0..width {
            counts.clear();
            for seq in sequences {
                if let Some(ch) = seq.at(column) {
                    if ch != policy.gap && ch != policy.mask {
                        *counts.entry(ch).or_insert(0) += 1;
                    }
                }
            }
            let recurrent = counts.values().filter(|&&c| c >= 2).count();
            if recurrent >= 2 {
                candidates.push(column);
            }
        }
        Self { candidates }
    }

    /// Columns eligible for masking, ascending.
    #[must_use]
    pub fn candidates(&self) -> &[usize] {
        &self.candidates
    }

    /// Draws a sorted set of distinct columns. The requested range clamps
    /// to the candidate pool; an empty pool yields an empty draw.
    #[must_use]
    pub fn draw(&self, min: usize, max: usize, rng: &mut SmallRng) -> Vec<usize> {
        if self.candidates.is_empty() {
            return Vec::new();
        }
        let upper = max.min(self.candidates.len());
        let lower = min.min(upper);
        let count = if lower == upper {
            upper
        } else {
            rng.gen_range(lower..=upper)
        };
        let mut drawn: Vec<usize> = self
            .candidates
            .choose_multiple(rng, count)
            .copied()
            .collect();
        drawn.sort_unstable();
        drawn
    }
}
