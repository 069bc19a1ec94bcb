//! Point mutations and position-sorted mutation sets.
//!
//! A [`MutationSet`] records the substitutions along one tree edge, sorted by
//! position so intersections run as two-pointer merges. Sets also carry an
//! occurrence counter used by the inference strategies: a set seen at `k`
//! places saves `(k − 1) · len` substitutions when its target sequence is
//! materialised as an intermediate vertex.

use std::collections::HashMap;
use std::fmt;

use crate::seq::{SeqPolicy, Sequence};

/// One substitution: `from` at one-based `pos` becomes `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mutation {
    /// Character before the substitution.
    pub from: u8,
    /// Position counted from 1.
    pub pos: u16,
    /// Character after the substitution.
    pub to: u8,
}

impl Mutation {
    /// Creates a mutation at a one-based position.
    #[must_use]
    pub const fn new(from: u8, pos: u16, to: u8) -> Self {
        Self { from, pos, to }
    }

    /// The mutation that undoes this one.
    #[must_use]
    pub const fn inverse(self) -> Self {
        Self {
            from: self.to,
            pos: self.pos,
            to: self.from,
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.from as char, self.pos, self.to as char)
    }
}

/// Position-sorted set of substitutions along one edge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationSet {
    items: Vec<Mutation>,
    occurrence: u32,
}

/// Default occurrence for a freshly built set: it was observed on the two
/// edges whose intersection produced it.
const DEFAULT_OCCURRENCE: u32 = 2;

impl MutationSet {
    /// Builds a set from a vector already sorted by position.
    #[must_use]
    pub const fn from_sorted(items: Vec<Mutation>) -> Self {
        Self {
            items,
            occurrence: DEFAULT_OCCURRENCE,
        }
    }

    /// Scans two equal-length sequences and records every substitution under
    /// the policy. Columns beyond the shorter sequence carry no positional
    /// record; they contribute to distances through the length difference.
    #[must_use]
    pub fn from_pair(from: &Sequence, to: &Sequence, policy: &SeqPolicy) -> Self {
        let mut items = Vec::new();
        for (i, (&a, &b)) in from.bytes().iter().zip(to.bytes().iter()).enumerate() {
            if policy.counts_as_change(a, b) {
                let pos = u16::try_from(i + 1).unwrap_or(u16::MAX);
                items.push(Mutation::new(a, pos, b));
            }
        }
        Self::from_sorted(items)
    }

    /// Substitutions in position order.
    #[must_use]
    pub fn items(&self) -> &[Mutation] {
        &self.items
    }

    /// Number of substitutions in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the set holds no substitutions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// How many places this set has been observed at.
    #[must_use]
    pub const fn occurrence(&self) -> u32 {
        self.occurrence
    }

    /// Overwrites the occurrence counter.
    pub const fn set_occurrence(&mut self, occurrence: u32) {
        self.occurrence = occurrence;
    }

    /// Substitutions saved by materialising this set once:
    /// `(occurrence − 1) · len`.
    #[must_use]
    pub fn cost_decrease(&self) -> u64 {
        u64::from(self.occurrence.saturating_sub(1)) * self.items.len() as u64
    }

    /// Two-pointer merge intersection; `None` when nothing is shared.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let mut out = Vec::new();
        let mut i = 0;
        let mut j = 0;
        while i < self.items.len() && j < other.items.len() {
            let a = self.items[i];
            let b = other.items[j];
            if a.pos < b.pos {
                i += 1;
            } else if b.pos < a.pos {
                j += 1;
            } else {
                if a == b {
                    out.push(a);
                }
                i += 1;
                j += 1;
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(Self::from_sorted(out))
        }
    }

    /// The set of inverse mutations, position order preserved.
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self::from_sorted(self.items.iter().map(|m| m.inverse()).collect())
    }

    /// Whether every substitution here also appears in `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        let mut j = 0;
        for m in &self.items {
            loop {
                match other.items.get(j) {
                    Some(o) if o.pos < m.pos => j += 1,
                    Some(o) if o == m => break,
                    _ => return false,
                }
            }
        }
        true
    }

    /// Position-weighted content hash, stable across runs. Used to detect
    /// when an inference round reproduces an earlier candidate set.
    #[must_use]
    pub fn content_hash(&self) -> u64 {
        let mut h = 0u64;
        for (i, m) in self.items.iter().enumerate() {
            let part = (u64::from(m.from) << 24)
                ^ (u64::from(m.pos) << 8)
                ^ u64::from(m.to);
            h = h.wrapping_add((i as u64 + 1).wrapping_mul(part.wrapping_mul(0x9e37_79b9_7f4a_7c15)));
        }
        h
    }

    /// Ordering used by the cost-driven strategy: larger cost decrease first,
    /// longer set first on ties.
    #[must_use]
    pub fn by_cost_decrease(a: &Self, b: &Self) -> std::cmp::Ordering {
        b.cost_decrease()
            .cmp(&a.cost_decrease())
            .then_with(|| b.len().cmp(&a.len()))
    }
}

/// Counts substitutions between sequences, optionally memoising per vertex
/// pair. The memo key packs both vertex ids into one `u64`.
#[derive(Debug)]
pub struct MutationCounter {
    policy: SeqPolicy,
    memo: Option<HashMap<u64, u16>>,
}

const fn pair_code(from: u32, to: u32) -> u64 {
    ((from as u64) << 32) | to as u64
}

impl MutationCounter {
    /// Creates a counter; `memoise` keeps a per-pair cache alive until
    /// [`Self::clear`].
    #[must_use]
    pub fn new(policy: SeqPolicy, memoise: bool) -> Self {
        Self {
            policy,
            memo: memoise.then(HashMap::new),
        }
    }

    /// Policy the counter applies.
    #[must_use]
    pub const fn policy(&self) -> &SeqPolicy {
        &self.policy
    }

    /// Hamming distance under the policy plus the length difference.
    #[must_use]
    pub fn count(&self, a: &Sequence, b: &Sequence) -> u16 {
        count_between(a.bytes(), b.bytes(), &self.policy)
    }

    /// Memoised count for a known vertex pair.
    pub fn count_pair(&mut self, from_id: u32, to_id: u32, a: &Sequence, b: &Sequence) -> u16 {
        let Some(memo) = self.memo.as_mut() else {
            return count_between(a.bytes(), b.bytes(), &self.policy);
        };
        *memo
            .entry(pair_code(from_id, to_id))
            .or_insert_with(|| count_between(a.bytes(), b.bytes(), &self.policy))
    }

    /// Full mutation set along an edge.
    #[must_use]
    pub fn mutations(&self, from: &Sequence, to: &Sequence) -> MutationSet {
        MutationSet::from_pair(from, to, &self.policy)
    }

    /// Drops any memoised counts.
    pub fn clear(&mut self) {
        if let Some(memo) = self.memo.as_mut() {
            memo.clear();
        }
    }
}

/// Substitution count between two byte strings under a policy.
#[must_use]
pub fn count_between(a: &[u8], b: &[u8], policy: &SeqPolicy) -> u16 {
    let mut count = a.len().abs_diff(b.len());
    for (&x, &y) in a.iter().zip(b.iter()) {
        if policy.counts_as_change(x, y) {
            count += 1;
        }
    }
    u16::try_from(count).unwrap_or(u16::MAX)
}
