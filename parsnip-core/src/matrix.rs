//! Triangular distance matrix over the current vertex population.
//!
//! Row `i` stores the distances to every vertex with a smaller dense index,
//! so the full matrix costs half the memory and every lookup is
//! `rows[max][min]`. The matrix grows by appending rows for freshly inferred
//! vertices and shrinks by compacting surviving rows in place, which keeps
//! the per-iteration cost proportional to what actually changed.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::error::{Result, SearchError};
use crate::mutation::count_between;
use crate::seq::SeqPolicy;

/// Distance returned by the corrected metrics when the estimate diverges.
pub const DIVERGED_DISTANCE: f64 = 10.0;

/// One row owner: a vertex id plus its sequence bytes.
#[derive(Debug, Clone, Copy)]
pub struct MatrixEntry<'a> {
    /// Vertex identifier.
    pub id: u32,
    /// Sequence bytes backing the row.
    pub seq: &'a [u8],
}

/// Lower-triangular matrix of substitution counts.
#[derive(Debug, Clone, Default)]
pub struct DistanceMatrix {
    rows: Vec<Vec<u16>>,
    ids: Vec<u32>,
    index: HashMap<u32, usize>,
}

impl DistanceMatrix {
    /// Computes the full matrix for the given entries. Rows are filled in
    /// parallel; the scan itself is a pure function of the sequences.
    #[must_use]
    pub fn compute(entries: &[MatrixEntry<'_>], policy: &SeqPolicy) -> Self {
        let rows: Vec<Vec<u16>> = entries
            .par_iter()
            .enumerate()
            .map(|(i, e)| {
                entries[..i]
                    .iter()
                    .map(|o| count_between(e.seq, o.seq, policy))
                    .collect()
            })
            .collect();
        Self::assemble(entries, rows)
    }

    /// Computes the matrix for masked sequences, reusing unmasked distances
    /// from an earlier matrix where both vertices are known to it. For a
    /// reused pair the masked distance is the stored distance minus the
    /// substitutions at the masked columns of the original sequences.
    #[must_use]
    pub fn compute_reusing(
        masked: &[MatrixEntry<'_>],
        originals: &[MatrixEntry<'_>],
        masked_columns: &[usize],
        policy: &SeqPolicy,
        prev: &Self,
    ) -> Self {
        let rows: Vec<Vec<u16>> = masked
            .par_iter()
            .enumerate()
            .map(|(i, e)| {
                (0..i)
                    .map(|j| {
                        let o = masked[j];
                        match prev.distance(e.id, o.id) {
                            Ok(full) => {
                                let at_masked = originals
                                    .get(i)
                                    .zip(originals.get(j))
                                    .map_or(0, |(a, b)| {
                                        masked_change_count(a.seq, b.seq, masked_columns, policy)
                                    });
                                full.saturating_sub(at_masked)
                            }
                            Err(_) => count_between(e.seq, o.seq, policy),
                        }
                    })
                    .collect()
            })
            .collect();
        Self::assemble(masked, rows)
    }

    fn assemble(entries: &[MatrixEntry<'_>], rows: Vec<Vec<u16>>) -> Self {
        let ids: Vec<u32> = entries.iter().map(|e| e.id).collect();
        let index = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let mut matrix = Self { rows, ids, index };
        matrix.rows.reserve(matrix.ids.len());
        matrix
    }

    /// Number of vertices the matrix currently covers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when the matrix covers no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether the matrix has a row for the vertex.
    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        self.index.contains_key(&id)
    }

    /// Vertex ids in dense row order.
    #[must_use]
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Symmetric lookup; zero on the diagonal.
    ///
    /// # Errors
    /// Returns [`SearchError::UnknownVertex`] when either id has no row.
    pub fn distance(&self, a: u32, b: u32) -> Result<u16> {
        let i = self.row_of(a)?;
        let j = self.row_of(b)?;
        Ok(self.at(i, j))
    }

    /// Lookup by dense row index; callers that already walk dense indices
    /// avoid the id map entirely.
    #[must_use]
    pub fn at(&self, i: usize, j: usize) -> u16 {
        if i == j {
            return 0;
        }
        let (hi, lo) = if i > j { (i, j) } else { (j, i) };
        self.rows
            .get(hi)
            .and_then(|row| row.get(lo))
            .copied()
            .unwrap_or(0)
    }

    fn row_of(&self, id: u32) -> Result<usize> {
        self.index
            .get(&id)
            .copied()
            .ok_or(SearchError::UnknownVertex { id })
    }

    /// Appends rows for new vertices. `all` must start with the current
    /// population in row order, followed by the additions; only the new rows
    /// are computed.
    ///
    /// # Errors
    /// Returns [`SearchError::UnknownVertex`] when the prefix of `all` does
    /// not match the current row order.
    pub fn append(&mut self, all: &[MatrixEntry<'_>], policy: &SeqPolicy) -> Result<()> {
        for (i, e) in all.iter().take(self.ids.len()).enumerate() {
            if self.ids.get(i).copied() != Some(e.id) {
                return Err(SearchError::UnknownVertex { id: e.id });
            }
        }
        let old_len = self.ids.len();
        let new_rows: Vec<Vec<u16>> = all
            .par_iter()
            .enumerate()
            .skip(old_len)
            .map(|(i, e)| {
                all[..i]
                    .iter()
                    .map(|o| count_between(e.seq, o.seq, policy))
                    .collect()
            })
            .collect();
        for (e, row) in all.iter().skip(old_len).zip(new_rows) {
            self.index.insert(e.id, self.ids.len());
            self.ids.push(e.id);
            self.rows.push(row);
        }
        Ok(())
    }

    /// Compacts the matrix to the surviving ids, which must be a subsequence
    /// of the current row order. Row storage is reused in place.
    ///
    /// # Errors
    /// Returns [`SearchError::UnknownVertex`] when a kept id has no row or
    /// the kept ids are out of order.
    pub fn restore(&mut self, kept: &[u32]) -> Result<()> {
        let mut old_indices = Vec::with_capacity(kept.len());
        let mut prev = None;
        for &id in kept {
            let idx = self.row_of(id)?;
            if prev.is_some_and(|p| p >= idx) {
                return Err(SearchError::UnknownVertex { id });
            }
            prev = Some(idx);
            old_indices.push(idx);
        }
        for (new_i, &old_i) in old_indices.iter().enumerate() {
            if new_i != old_i {
                self.rows.swap(new_i, old_i);
            }
            let row = &mut self.rows[new_i];
            for (new_j, &old_j) in old_indices.iter().take(new_i).enumerate() {
                row[new_j] = row[old_j];
            }
            row.truncate(new_i);
        }
        self.rows.truncate(kept.len());
        self.ids = kept.to_vec();
        self.index = self
            .ids
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();
        Ok(())
    }

    /// Saturating point adjustment of one pair; positive `delta` increases
    /// the stored distance.
    ///
    /// # Errors
    /// Returns [`SearchError::UnknownVertex`] when either id has no row.
    pub fn adjust(&mut self, a: u32, b: u32, delta: i32) -> Result<()> {
        let i = self.row_of(a)?;
        let j = self.row_of(b)?;
        if i == j {
            return Ok(());
        }
        let (hi, lo) = if i > j { (i, j) } else { (j, i) };
        if let Some(cell) = self.rows.get_mut(hi).and_then(|row| row.get_mut(lo)) {
            let next = i64::from(*cell) + i64::from(delta);
            *cell = u16::try_from(next.clamp(0, i64::from(u16::MAX))).unwrap_or(0);
        }
        Ok(())
    }

    /// Recomputes one vertex's row and column after its sequence changed.
    ///
    /// # Errors
    /// Returns [`SearchError::UnknownVertex`] when the id has no row or an
    /// entry id is unknown.
    pub fn recompute_row(
        &mut self,
        id: u32,
        entries: &[MatrixEntry<'_>],
        policy: &SeqPolicy,
    ) -> Result<()> {
        let i = self.row_of(id)?;
        let changed = entries
            .iter()
            .find(|e| e.id == id)
            .ok_or(SearchError::UnknownVertex { id })?;
        for e in entries {
            if e.id == id {
                continue;
            }
            let j = self.row_of(e.id)?;
            let d = count_between(changed.seq, e.seq, policy);
            let (hi, lo) = if i > j { (i, j) } else { (j, i) };
            if let Some(cell) = self.rows.get_mut(hi).and_then(|row| row.get_mut(lo)) {
                *cell = d;
            }
        }
        Ok(())
    }
}

fn masked_change_count(a: &[u8], b: &[u8], columns: &[usize], policy: &SeqPolicy) -> u16 {
    let mut count = 0u16;
    for &c in columns {
        if let (Some(&x), Some(&y)) = (a.get(c), b.get(c)) {
            if policy.counts_as_change(x, y) {
                count = count.saturating_add(1);
            }
        }
    }
    count
}

/// Jukes–Cantor correction of a raw substitution count over `len` columns.
///
/// Saturates at [`DIVERGED_DISTANCE`] when the observed proportion reaches
/// the model ceiling of 0.75; estimates below `1e-5` collapse to zero.
#[must_use]
pub fn jukes_cantor(distance: u16, len: usize) -> f64 {
    if len == 0 {
        return DIVERGED_DISTANCE;
    }
    let p = f64::from(distance) / len as f64;
    if p >= 0.75 {
        return DIVERGED_DISTANCE;
    }
    let d = -0.75 * (1.0 - 4.0 * p / 3.0).ln();
    if d.abs() < 1e-5 { 0.0 } else { d }
}

const fn is_transition(a: u8, b: u8) -> bool {
    matches!(
        (a, b),
        (b'A', b'G') | (b'G', b'A') | (b'C', b'T') | (b'T', b'C')
    )
}

/// Kimura two-parameter distance. Columns holding a gap in either sequence
/// shrink the usable length; a vanishing log argument (or no usable columns)
/// yields [`DIVERGED_DISTANCE`].
#[must_use]
pub fn kimura(a: &[u8], b: &[u8], policy: &SeqPolicy) -> f64 {
    let mut usable = 0u64;
    let mut transitions = 0u64;
    let mut transversions = 0u64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        if x == policy.gap || y == policy.gap {
            continue;
        }
        usable += 1;
        if x == y {
            continue;
        }
        if is_transition(x, y) {
            transitions += 1;
        } else {
            transversions += 1;
        }
    }
    if usable == 0 {
        return DIVERGED_DISTANCE;
    }
    let p = transitions as f64 / usable as f64;
    let q = transversions as f64 / usable as f64;
    let inner = (1.0 - 2.0 * p - q) * (1.0 - 2.0 * q).sqrt();
    if inner <= 0.0 || (1.0 - 2.0 * q) <= 0.0 {
        return DIVERGED_DISTANCE;
    }
    let d = -0.5 * inner.ln();
    if d.abs() < 1e-5 { 0.0 } else { d }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    fn entries<'a>(seqs: &'a [(u32, &'a [u8])]) -> Vec<MatrixEntry<'a>> {
        seqs.iter().map(|&(id, seq)| MatrixEntry { id, seq }).collect()
    }

    #[test]
    fn lookup_is_symmetric_with_zero_diagonal() {
        let policy = SeqPolicy::default();
        let data: Vec<(u32, &[u8])> = vec![(10, b"ACGT"), (20, b"ACCT"), (30, b"TCCT")];
        let m = DistanceMatrix::compute(&entries(&data), &policy);
        assert_eq!(m.distance(10, 20).expect("known pair"), 1);
        assert_eq!(m.distance(20, 10).expect("known pair"), 1);
        assert_eq!(m.distance(10, 30).expect("known pair"), 2);
        assert_eq!(m.distance(20, 20).expect("known pair"), 0);
    }

    #[test]
    fn unknown_vertex_is_an_error() {
        let policy = SeqPolicy::default();
        let data: Vec<(u32, &[u8])> = vec![(1, b"ACGT")];
        let m = DistanceMatrix::compute(&entries(&data), &policy);
        assert!(m.distance(1, 99).is_err());
    }

    #[test]
    fn append_then_restore_is_identity_on_survivors() {
        let policy = SeqPolicy::default();
        let base: Vec<(u32, &[u8])> = vec![(1, b"ACGT"), (2, b"ACCT")];
        let mut m = DistanceMatrix::compute(&entries(&base), &policy);

        let grown: Vec<(u32, &[u8])> = vec![(1, b"ACGT"), (2, b"ACCT"), (3, b"GCCT"), (4, b"GGCT")];
        m.append(&entries(&grown), &policy).expect("prefix matches");
        assert_eq!(m.len(), 4);
        assert_eq!(m.distance(3, 4).expect("known pair"), 1);

        let full = DistanceMatrix::compute(&entries(&grown), &policy);
        for &(a, _) in &grown {
            for &(b, _) in &grown {
                assert_eq!(
                    m.distance(a, b).expect("known"),
                    full.distance(a, b).expect("known")
                );
            }
        }

        m.restore(&[1, 3]).expect("subsequence of row order");
        assert_eq!(m.len(), 2);
        assert_eq!(m.distance(1, 3).expect("survivor pair"), 1);
        assert!(m.distance(1, 2).is_err());
    }

    #[test]
    fn restore_rejects_reordered_ids() {
        let policy = SeqPolicy::default();
        let data: Vec<(u32, &[u8])> = vec![(1, b"ACGT"), (2, b"ACCT"), (3, b"GCCT")];
        let mut m = DistanceMatrix::compute(&entries(&data), &policy);
        assert!(m.restore(&[3, 1]).is_err());
    }

    #[test]
    fn adjust_saturates_at_zero() {
        let policy = SeqPolicy::default();
        let data: Vec<(u32, &[u8])> = vec![(1, b"ACGT"), (2, b"ACCT")];
        let mut m = DistanceMatrix::compute(&entries(&data), &policy);
        m.adjust(1, 2, -5).expect("known pair");
        assert_eq!(m.distance(1, 2).expect("known pair"), 0);
        m.adjust(1, 2, 3).expect("known pair");
        assert_eq!(m.distance(1, 2).expect("known pair"), 3);
    }

    #[test]
    fn masked_reuse_matches_direct_computation() {
        let policy = SeqPolicy::default();
        let full: Vec<(u32, &[u8])> = vec![(1, b"ACGTAC"), (2, b"ACCTAG"), (3, b"GGGTAC")];
        let prev = DistanceMatrix::compute(&entries(&full), &policy);

        let columns = vec![2, 5];
        let masked_bytes: Vec<Vec<u8>> = full
            .iter()
            .map(|(_, s)| {
                let mut v = s.to_vec();
                for &c in &columns {
                    v[c] = b'*';
                }
                v
            })
            .collect();
        let masked: Vec<(u32, &[u8])> = full
            .iter()
            .zip(masked_bytes.iter())
            .map(|(&(id, _), b)| (id, b.as_slice()))
            .collect();

        let reused = DistanceMatrix::compute_reusing(
            &entries(&masked),
            &entries(&full),
            &columns,
            &policy,
            &prev,
        );
        let direct = DistanceMatrix::compute(&entries(&masked), &policy);
        for &(a, _) in &full {
            for &(b, _) in &full {
                assert_eq!(
                    reused.distance(a, b).expect("known"),
                    direct.distance(a, b).expect("known")
                );
            }
        }
    }

    #[rstest]
    #[case(0, 100, 0.0)]
    #[case(75, 100, DIVERGED_DISTANCE)]
    #[case(90, 100, DIVERGED_DISTANCE)]
    fn jukes_cantor_edges(#[case] d: u16, #[case] len: usize, #[case] expected: f64) {
        let got = jukes_cantor(d, len);
        assert!((got - expected).abs() < 1e-9, "got {got}");
    }

    #[test]
    fn jukes_cantor_is_monotone_below_ceiling() {
        let a = jukes_cantor(10, 100);
        let b = jukes_cantor(30, 100);
        assert!(b > a && a > 0.0);
    }

    #[test]
    fn kimura_skips_gap_columns() {
        let policy = SeqPolicy::default();
        // One transition over three usable columns; the gap column is out.
        let d = kimura(b"A-CT", b"G-CT", &policy);
        assert!(d > 0.0 && d < DIVERGED_DISTANCE);
        assert!((kimura(b"----", b"AAAA", &policy) - DIVERGED_DISTANCE).abs() < 1e-9);
    }
}
