//! Nucleotide sequences with gap-aware equality.
//!
//! A [`Sequence`] stores raw bytes plus a cached checksum used to group
//! duplicates quickly. Whether a gap character matches anything or counts as
//! a distinct symbol is decided by the [`SeqPolicy`] in force for the current
//! phase; the policy travels as a value, so different phases of the search
//! can hold different views of the same data without global state.

use std::hash::{Hash, Hasher};

use crate::mutation::MutationSet;

/// Character-handling policy for one search phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqPolicy {
    /// Gap character, `-` by default.
    pub gap: u8,
    /// Mask character written over sampled columns, `*` by default.
    pub mask: u8,
    /// When false, a gap position matches any character.
    pub gap_is_change: bool,
}

impl Default for SeqPolicy {
    fn default() -> Self {
        Self {
            gap: b'-',
            mask: b'*',
            gap_is_change: true,
        }
    }
}

impl SeqPolicy {
    /// Whether the pair of characters counts as a substitution.
    #[must_use]
    pub const fn counts_as_change(&self, a: u8, b: u8) -> bool {
        if a == b {
            return false;
        }
        if self.gap_is_change {
            return true;
        }
        a != self.gap && b != self.gap
    }

    /// Copy of the policy with the gap-as-change flag replaced.
    #[must_use]
    pub const fn with_gap_is_change(self, gap_is_change: bool) -> Self {
        Self {
            gap_is_change,
            ..self
        }
    }
}

/// An immutable nucleotide sequence with a cached checksum.
#[derive(Debug, Clone)]
pub struct Sequence {
    bytes: Vec<u8>,
    checksum: u32,
}

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

fn fold_checksum(bytes: &[u8]) -> u32 {
    let mut h = FNV_OFFSET;
    for &b in bytes {
        h ^= u32::from(b);
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

impl Sequence {
    /// Builds a sequence from raw bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        let checksum = fold_checksum(&bytes);
        Self { bytes, checksum }
    }

    /// Raw bytes of the sequence.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Sequence length in characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when the sequence holds no characters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Cached checksum over the raw bytes.
    #[must_use]
    pub const fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Character at the zero-based column, if in range.
    #[must_use]
    pub fn at(&self, column: usize) -> Option<u8> {
        self.bytes.get(column).copied()
    }

    /// Returns a copy with the mutations applied.
    ///
    /// Mutation positions are counted from 1; positions past the end are
    /// ignored, matching the tolerant behaviour expected during inference.
    #[must_use]
    pub fn apply(&self, mutations: &MutationSet) -> Self {
        let mut bytes = self.bytes.clone();
        for m in mutations.items() {
            let idx = usize::from(m.pos).saturating_sub(1);
            if let Some(slot) = bytes.get_mut(idx) {
                *slot = m.to;
            }
        }
        Self::new(bytes)
    }

    /// Returns a copy with the given zero-based columns overwritten by the
    /// policy's mask character.
    #[must_use]
    pub fn masked(&self, columns: &[usize], policy: &SeqPolicy) -> Self {
        let mut bytes = self.bytes.clone();
        for &c in columns {
            if let Some(slot) = bytes.get_mut(c) {
                *slot = policy.mask;
            }
        }
        Self::new(bytes)
    }

    /// Returns a copy restricted to the given zero-based columns, in order.
    #[must_use]
    pub fn project(&self, columns: &[usize]) -> Self {
        let bytes = columns
            .iter()
            .filter_map(|&c| self.bytes.get(c).copied())
            .collect();
        Self::new(bytes)
    }

    /// Hashable identity of the sequence under the policy.
    #[must_use]
    pub const fn key<'a>(&'a self, policy: &SeqPolicy) -> SeqKey<'a> {
        SeqKey {
            bytes: self.bytes.as_slice(),
            checksum: self.checksum,
            gap: policy.gap,
            gap_is_change: policy.gap_is_change,
        }
    }
}

/// Identity view over a sequence under one [`SeqPolicy`].
///
/// When gaps count as changes this is plain byte equality backed by the
/// cached checksum. When gaps match anything the checksum degenerates to a
/// constant so hash-based grouping stays consistent with the weakened
/// equality.
///
/// Gap-wild equality is not transitive: `A-` matches both `AA` and `AC`
/// while `AA` and `AC` differ, and the hash weakens to length-only so all
/// three may land in one bucket. Hash-set deduplication under
/// `gap_is_change = false` therefore collapses gap-bearing near-matches
/// depending on insertion order; which member of such a group is kept is
/// unspecified.
#[derive(Debug, Clone, Copy)]
pub struct SeqKey<'a> {
    bytes: &'a [u8],
    checksum: u32,
    gap: u8,
    gap_is_change: bool,
}

impl PartialEq for SeqKey<'_> {
    fn eq(&self, other: &Self) -> bool {
        if self.bytes.len() != other.bytes.len() {
            return false;
        }
        if self.gap_is_change {
            return self.checksum == other.checksum && self.bytes == other.bytes;
        }
        self.bytes
            .iter()
            .zip(other.bytes.iter())
            .all(|(&a, &b)| a == b || a == self.gap || b == self.gap)
    }
}

impl Eq for SeqKey<'_> {}

impl Hash for SeqKey<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.len().hash(state);
        if self.gap_is_change {
            self.checksum.hash(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{Mutation, MutationSet};

    use rstest::rstest;
    use std::collections::HashSet;

    #[test]
    fn checksum_tracks_content() {
        let a = Sequence::new(b"ACGT".to_vec());
        let b = Sequence::new(b"ACGT".to_vec());
        let c = Sequence::new(b"ACGA".to_vec());
        assert_eq!(a.checksum(), b.checksum());
        assert_ne!(a.checksum(), c.checksum());
    }

    #[test]
    fn apply_rewrites_one_based_positions() {
        let seq = Sequence::new(b"ACGT".to_vec());
        let set = MutationSet::from_sorted(vec![
            Mutation::new(b'A', 1, b'G'),
            Mutation::new(b'T', 4, b'C'),
        ]);
        assert_eq!(seq.apply(&set).bytes(), b"GCGC");
    }

    #[test]
    fn masking_is_reversible_through_projection() {
        let policy = SeqPolicy::default();
        let seq = Sequence::new(b"ACGTACGT".to_vec());
        let masked = seq.masked(&[1, 5], &policy);
        assert_eq!(masked.bytes(), b"A*GTA*GT");
        assert_eq!(seq.project(&[1, 5]).bytes(), b"CC");
    }

    #[rstest]
    #[case(true, false)]
    #[case(false, true)]
    fn gap_policy_controls_equality(#[case] gap_is_change: bool, #[case] expect_equal: bool) {
        let policy = SeqPolicy::default().with_gap_is_change(gap_is_change);
        let a = Sequence::new(b"AC-T".to_vec());
        let b = Sequence::new(b"ACGT".to_vec());
        assert_eq!(a.key(&policy) == b.key(&policy), expect_equal);
    }

    #[test]
    fn gap_wild_keys_group_in_hash_sets() {
        let policy = SeqPolicy::default().with_gap_is_change(false);
        let a = Sequence::new(b"AC-T".to_vec());
        let b = Sequence::new(b"ACGT".to_vec());
        let mut set = HashSet::new();
        set.insert(a.key(&policy));
        assert!(set.contains(&b.key(&policy)));
    }

    #[test]
    fn different_lengths_never_equal() {
        let policy = SeqPolicy::default().with_gap_is_change(false);
        let a = Sequence::new(b"AC-".to_vec());
        let b = Sequence::new(b"ACGT".to_vec());
        assert_ne!(a.key(&policy), b.key(&policy));
    }
}
