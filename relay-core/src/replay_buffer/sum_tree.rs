//! Sum tree for prioritized sampling.
//!
//! The tree is stored in a flat array of `2 * size - 1` nodes. Node `i` has
//! children `2i + 1` and `2i + 2`; the leaves start at offset `size - 1`, so
//! the priority of logical index `ix` lives at `size - 1 + ix`.
use crate::error::RelayError;

/// Returns `true` if `n` is a nonzero power of two.
#[inline]
pub fn is_power_of_two(n: usize) -> bool {
    n > 0 && (n & (n - 1)) == 0
}

/// A fixed-capacity binary sum tree over nonnegative priorities.
///
/// Every internal node holds the sum of its two children, so the root holds the
/// total priority mass. Point updates and proportional sampling are `O(log size)`.
#[derive(Debug)]
pub struct SumTree {
    size: usize,
    offset: usize,
    // Sums are accumulated in f64 so that repeated delta propagation does not drift.
    tree: Vec<f64>,
    rng: fastrand::Rng,
}

impl SumTree {
    /// Creates a sum tree with `size` leaves, all of priority zero.
    ///
    /// Fails with [`RelayError::InvalidCapacity`] if `size` is not a power of two.
    pub fn new(size: usize, seed: u64) -> Result<Self, RelayError> {
        if !is_power_of_two(size) {
            return Err(RelayError::InvalidCapacity(size));
        }

        Ok(Self {
            size,
            offset: size - 1,
            tree: vec![0f64; 2 * size - 1],
            rng: fastrand::Rng::with_seed(seed),
        })
    }

    /// The number of leaves.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Total priority mass, the value at the root.
    pub fn total(&self) -> f64 {
        self.tree[0]
    }

    /// Priority of the leaf at logical index `ix`.
    pub fn priority(&self, ix: usize) -> f32 {
        debug_assert!(ix < self.size);
        self.tree[self.offset + ix] as f32
    }

    /// Sets the priority of leaf `ix` and propagates the change up to the root.
    pub fn update(&mut self, ix: usize, priority: f32) -> Result<(), RelayError> {
        if ix >= self.size {
            return Err(RelayError::invalid(format!(
                "leaf index {} out of range for a sum tree of {} leaves",
                ix, self.size
            )));
        }
        if !(priority >= 0.0) || !priority.is_finite() {
            return Err(RelayError::InvalidPriority(priority));
        }

        let mut node = self.offset + ix;
        let delta = priority as f64 - self.tree[node];
        self.tree[node] = priority as f64;

        while node != 0 {
            node = (node - 1) / 2;
            self.tree[node] += delta;
        }

        Ok(())
    }

    /// Sets the priority of leaf `ix` to zero, so that it is never sampled.
    pub fn clear(&mut self, ix: usize) -> Result<(), RelayError> {
        self.update(ix, 0.0)
    }

    /// Returns the leaf reached by walking down from the root with priority mass `mass`.
    ///
    /// At each internal node the walk descends left when `mass <= left`, and
    /// otherwise subtracts the left sum and descends right. Subtrees without any
    /// mass are never entered, so a zero-priority leaf is never returned while
    /// the total mass is positive.
    pub fn retrieve(&self, mass: f64) -> usize {
        let mut node = 0;
        let mut mass = mass;

        while node < self.offset {
            let left = 2 * node + 1;
            let right = left + 1;
            let left_sum = self.tree[left];

            if (mass <= left_sum && left_sum > 0.0) || self.tree[right] <= 0.0 {
                node = left;
            } else {
                mass -= left_sum;
                node = right;
            }
        }

        node - self.offset
    }

    /// Draws one leaf index with probability proportional to its priority.
    ///
    /// Fails with [`RelayError::EmptyDistribution`] when the total priority is zero.
    pub fn sample(&self) -> Result<usize, RelayError> {
        let total = self.total();
        if !(total > 0.0) {
            return Err(RelayError::EmptyDistribution);
        }
        Ok(self.retrieve(self.rng.f64() * total))
    }

    /// Draws `n` independent samples. The tree is not modified, so repeated
    /// indices are possible.
    pub fn sample_batch(&self, n: usize) -> Result<Vec<usize>, RelayError> {
        (0..n).map(|_| self.sample()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_sum(tree: &SumTree) -> f64 {
        (0..tree.len()).map(|ix| tree.priority(ix) as f64).sum()
    }

    #[test]
    fn test_power_of_two_check() {
        assert!(is_power_of_two(1));
        assert!(is_power_of_two(2));
        assert!(is_power_of_two(1 << 20));
        assert!(!is_power_of_two(0));
        assert!(!is_power_of_two(3));
        assert!(!is_power_of_two(12));
    }

    #[test]
    fn test_new_rejects_non_power_of_two() {
        assert_eq!(SumTree::new(3, 0).unwrap_err(), RelayError::InvalidCapacity(3));
        assert_eq!(SumTree::new(0, 0).unwrap_err(), RelayError::InvalidCapacity(0));
        assert!(SumTree::new(16, 0).is_ok());
    }

    #[test]
    fn test_root_tracks_leaf_sum() {
        let mut tree = SumTree::new(16, 7).unwrap();
        let rng = fastrand::Rng::with_seed(11);

        for _ in 0..2000 {
            let ix = rng.usize(..16);
            let p = rng.f32() * 10.0;
            tree.update(ix, p).unwrap();
            assert!((tree.total() - leaf_sum(&tree)).abs() < 1e-6);
        }

        for ix in 0..16 {
            tree.clear(ix).unwrap();
        }
        assert!(tree.total().abs() < 1e-9);
    }

    #[test]
    fn test_update_rejects_bad_input() {
        let mut tree = SumTree::new(4, 0).unwrap();
        assert_eq!(tree.update(0, -1.0).unwrap_err(), RelayError::InvalidPriority(-1.0));
        assert!(matches!(
            tree.update(0, f32::NAN).unwrap_err(),
            RelayError::InvalidPriority(_)
        ));
        assert!(matches!(
            tree.update(4, 1.0).unwrap_err(),
            RelayError::InvalidArgument(_)
        ));
        assert_eq!(tree.total(), 0.0);
    }

    #[test]
    fn test_retrieve_boundaries() {
        let data = [0.5f32, 0.2, 0.8, 0.3, 1.1, 2.5, 3.9];
        let mut tree = SumTree::new(8, 0).unwrap();
        for (ix, &p) in data.iter().enumerate() {
            tree.update(ix, p).unwrap();
        }

        assert_eq!(tree.retrieve(0.0), 0);
        assert_eq!(tree.retrieve(0.4), 0);
        // Ties with the left sum resolve to the left branch.
        assert_eq!(tree.retrieve(0.5), 0);
        assert_eq!(tree.retrieve(0.6), 1);
        assert_eq!(tree.retrieve(1.2), 2);
        assert_eq!(tree.retrieve(1.6), 3);
        assert_eq!(tree.retrieve(2.0), 4);
        assert_eq!(tree.retrieve(2.8), 4);
        // The empty eighth leaf is never reached, even at the total mass.
        assert_eq!(tree.retrieve(tree.total()), 6);
    }

    #[test]
    fn test_zero_priority_leaves_are_skipped() {
        let mut tree = SumTree::new(4, 3).unwrap();
        tree.update(2, 1.0).unwrap();
        assert_eq!(tree.retrieve(0.0), 2);
        assert!(tree.sample_batch(500).unwrap().iter().all(|&ix| ix == 2));
    }

    #[test]
    fn test_sample_empty_distribution() {
        let tree = SumTree::new(4, 0).unwrap();
        assert_eq!(tree.sample().unwrap_err(), RelayError::EmptyDistribution);
        assert_eq!(tree.sample_batch(3).unwrap_err(), RelayError::EmptyDistribution);
        assert!(tree.sample_batch(0).unwrap().is_empty());
    }

    #[test]
    fn test_single_leaf_tree() {
        let mut tree = SumTree::new(1, 0).unwrap();
        tree.update(0, 2.0).unwrap();
        assert_eq!(tree.total(), 2.0);
        assert_eq!(tree.sample().unwrap(), 0);
    }

    #[test]
    fn test_sampling_is_proportional() {
        let mut tree = SumTree::new(4, 42).unwrap();
        for (ix, p) in [1f32, 2., 3., 4.].iter().enumerate() {
            tree.update(ix, *p).unwrap();
        }

        let n = 10_000;
        let mut counts = [0usize; 4];
        for ix in tree.sample_batch(n).unwrap() {
            counts[ix] += 1;
        }

        let expected = [0.1, 0.2, 0.3, 0.4];
        let mut chi2 = 0.0;
        for (c, p) in counts.iter().zip(expected.iter()) {
            let freq = *c as f64 / n as f64;
            assert!((freq - p).abs() < 0.03, "{:?}", counts);
            let e = p * n as f64;
            chi2 += (*c as f64 - e).powi(2) / e;
        }
        // 99.9% quantile of chi-squared with 3 degrees of freedom.
        assert!(chi2 < 16.27, "chi2 = {}", chi2);
    }

    #[test]
    fn test_sampling_does_not_mutate() {
        let mut tree = SumTree::new(8, 5).unwrap();
        for ix in 0..8 {
            tree.update(ix, (ix + 1) as f32).unwrap();
        }
        let before: Vec<f32> = (0..8).map(|ix| tree.priority(ix)).collect();
        let _ = tree.sample_batch(1000).unwrap();
        let after: Vec<f32> = (0..8).map(|ix| tree.priority(ix)).collect();
        assert_eq!(before, after);
        assert_eq!(tree.total(), 36.0);
    }
}
