//! Sequential union-find with path halving and union by rank.

/// Disjoint-set forest over dense vertex indices.
#[derive(Debug)]
pub struct UnionFind {
    parent: Vec<u32>,
    rank: Vec<u8>,
}

impl UnionFind {
    /// Creates `n` singleton sets.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).map(|i| u32::try_from(i).unwrap_or(u32::MAX)).collect(),
            rank: vec![0; n],
        }
    }

    /// Representative of the set containing `x`, halving the path walked.
    pub fn find(&mut self, x: u32) -> u32 {
        let mut cur = x;
        loop {
            let Some(&p) = self.parent.get(cur as usize) else {
                return cur;
            };
            if p == cur {
                return cur;
            }
            let grand = self.parent.get(p as usize).copied().unwrap_or(p);
            if let Some(slot) = self.parent.get_mut(cur as usize) {
                *slot = grand;
            }
            cur = grand;
        }
    }

    /// Merges the sets containing `a` and `b`; false when already joined.
    pub fn union(&mut self, a: u32, b: u32) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        let (ra_rank, rb_rank) = (
            self.rank.get(ra as usize).copied().unwrap_or(0),
            self.rank.get(rb as usize).copied().unwrap_or(0),
        );
        let (root, child) = if ra_rank >= rb_rank { (ra, rb) } else { (rb, ra) };
        if let Some(slot) = self.parent.get_mut(child as usize) {
            *slot = root;
        }
        if ra_rank == rb_rank {
            if let Some(r) = self.rank.get_mut(root as usize) {
                *r = r.saturating_add(1);
            }
        }
        true
    }

    /// Whether both indices sit in the same set.
    pub fn joined(&mut self, a: u32, b: u32) -> bool {
        self.find(a) == self.find(b)
    }
}
