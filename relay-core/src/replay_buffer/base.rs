//! Thread-safe transition buffer shared by producers and optimizers.
//!
//! The buffer runs in one of two modes:
//! - FIFO: an unbounded (or bounded, evicting the oldest entry) queue that is
//!   drained with [`pop_batch`](ReplayBufferBase::pop_batch).
//! - Prioritized: a ring of `capacity` slots index-aligned with a [`SumTree`].
//!   Entries are drawn with [`sample_batch`](ReplayBufferBase::sample_batch)
//!   and stay in the buffer until they are overwritten or popped.
use super::{
    batch::Columns, IwScheduler, PerConfig, PriorityInit, SharedBufferConfig, SumTree, Transition,
    TransitionBatch, WeightNormalizer,
};
use crate::{error::RelayError, ExperienceBufferBase, ReplayBufferBase};
use segment_tree::{
    ops::{MaxIgnoreNaN, MinIgnoreNaN},
    SegmentPoint,
};
use std::sync::{Mutex, MutexGuard};

/// State for prioritized sampling.
///
/// Leaf `i` of every tree describes ring slot `i`. Slots without a live entry
/// have priority zero in the sum tree, zero in the max tree and `f32::MAX` in
/// the min tree.
struct PerState {
    config: PerConfig,
    sum_tree: SumTree,
    min_tree: SegmentPoint<f32, MinIgnoreNaN>,
    max_tree: SegmentPoint<f32, MaxIgnoreNaN>,
    iw_scheduler: IwScheduler,
}

impl PerState {
    fn new(capacity: usize, seed: u64, config: &PerConfig) -> Result<Self, RelayError> {
        Ok(Self {
            config: config.clone(),
            sum_tree: SumTree::new(capacity, seed)?,
            min_tree: SegmentPoint::build(vec![f32::MAX; capacity], MinIgnoreNaN),
            max_tree: SegmentPoint::build(vec![0f32; capacity], MaxIgnoreNaN),
            iw_scheduler: IwScheduler::from_config(config),
        })
    }

    fn set(&mut self, ix: usize, p: f32) -> Result<(), RelayError> {
        self.sum_tree.update(ix, p)?;
        self.min_tree.modify(ix, p);
        self.max_tree.modify(ix, p);
        Ok(())
    }

    fn clear(&mut self, ix: usize) -> Result<(), RelayError> {
        self.sum_tree.clear(ix)?;
        self.min_tree.modify(ix, f32::MAX);
        self.max_tree.modify(ix, 0.0);
        Ok(())
    }

    fn initial_priority(&self) -> f32 {
        let default = self.config.default_priority;
        match self.config.init {
            PriorityInit::Default => default,
            PriorityInit::Max => {
                let max = self.max_tree.query(0, self.max_tree.len());
                if max > default {
                    max
                } else {
                    default
                }
            }
        }
    }

    /// Importance sampling weights `(n * P(i))^-beta` of the sampled slots.
    fn weights(&self, ixs: &[usize], n_live: usize) -> Vec<f32> {
        let beta = self.iw_scheduler.beta() as f64;
        let scale = n_live as f64 / self.sum_tree.total();
        let ws = ixs
            .iter()
            .map(|&ix| (scale * self.sum_tree.priority(ix) as f64).powf(-beta))
            .collect::<Vec<_>>();

        let w_max_batch = ws.iter().cloned().fold(f64::MIN, f64::max);
        let w_max = match self.config.normalize {
            WeightNormalizer::All => {
                let p_min = self.min_tree.query(0, self.min_tree.len()) as f64;
                let w = (scale * p_min).powf(-beta);
                // A live zero priority would make every weight vanish.
                if w.is_finite() {
                    w
                } else {
                    w_max_batch
                }
            }
            WeightNormalizer::Batch => w_max_batch,
        };

        ws.iter().map(|w| (w / w_max) as f32).collect()
    }
}

struct Inner<O, S> {
    columns: Columns<O, S>,
    capacity: Option<usize>,
    // Ring bookkeeping, used with prioritized sampling only.
    head: usize,
    len: usize,
    per_state: Option<PerState>,
}

impl<O: Clone, S: Clone> Inner<O, S> {
    fn len(&self) -> usize {
        match self.per_state {
            Some(_) => self.len,
            None => self.columns.len(),
        }
    }

    fn is_live(&self, ix: usize, capacity: usize) -> bool {
        ix < capacity && (ix + capacity - self.head) % capacity < self.len
    }

    fn push_fifo(&mut self, tr: Transition<O, S>) {
        if let Some(capacity) = self.capacity {
            if self.columns.len() >= capacity {
                log::trace!("Buffer full, evict the oldest transition");
                self.columns.pop_front();
            }
        }
        self.columns.push_back(tr);
    }

    fn push_ring(&mut self, tr: Transition<O, S>, capacity: usize) {
        let slot = (self.head + self.len) % capacity;
        if slot == self.columns.len() {
            self.columns.push_back(tr);
        } else {
            self.columns.set(slot, tr);
        }

        if self.len == capacity {
            log::trace!("Buffer full, overwrite slot {}", slot);
            self.head = (self.head + 1) % capacity;
        } else {
            self.len += 1;
        }

        if let Some(per_state) = self.per_state.as_mut() {
            let p = per_state.initial_priority();
            if let Err(e) = per_state.set(slot, p) {
                log::error!("Failed to seed the priority of slot {}: {}", slot, e);
            }
        }
    }

    fn pop_fifo(&mut self, count: usize) -> TransitionBatch<O, S> {
        self.columns.drain_front(count)
    }

    fn pop_ring(&mut self, count: usize, capacity: usize) -> Result<TransitionBatch<O, S>, RelayError> {
        let n = count.min(self.len);
        let ixs = (0..n)
            .map(|i| (self.head + i) % capacity)
            .collect::<Vec<_>>();
        let batch = self.columns.gather(&ixs);

        if let Some(per_state) = self.per_state.as_mut() {
            for &ix in ixs.iter() {
                per_state.clear(ix)?;
            }
        }
        self.head = (self.head + n) % capacity;
        self.len -= n;

        Ok(batch)
    }
}

/// A buffer of transitions shared by all producers and optimizers.
///
/// All fields of the pushed transitions are stored in parallel sequences behind
/// a single lock, so every operation observes them with identical lengths.
/// With prioritized sampling the sum tree is guarded by the same lock, which
/// makes a slot write and its priority update one atomic step.
pub struct SharedBuffer<O, S> {
    inner: Mutex<Inner<O, S>>,
}

impl<O: Clone, S: Clone> SharedBuffer<O, S> {
    fn lock(&self) -> MutexGuard<'_, Inner<O, S>> {
        self.inner.lock().unwrap()
    }

    /// Maximum number of transitions, `None` if unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.lock().capacity
    }

    /// Returns `true` if the buffer was configured for prioritized sampling.
    pub fn is_prioritized(&self) -> bool {
        self.lock().per_state.is_some()
    }

    /// Returns `true` if all parallel sequences have the same length.
    pub fn is_consistent(&self) -> bool {
        let inner = self.lock();
        let lengths = inner.columns.lengths();
        lengths.iter().all(|&l| l == lengths[0]) && inner.len() <= inner.columns.len()
    }

    /// Current exponent of the importance sampling weights.
    pub fn beta(&self) -> Option<f32> {
        self.lock()
            .per_state
            .as_ref()
            .map(|per_state| per_state.iw_scheduler.beta())
    }

    /// Priority of the transition in `slot`, zero if the slot holds no live entry.
    pub fn priority(&self, slot: usize) -> Option<f32> {
        let inner = self.lock();
        let capacity = inner.capacity?;
        if !inner.is_live(slot, capacity) {
            return inner.per_state.as_ref().map(|_| 0.0);
        }
        inner
            .per_state
            .as_ref()
            .map(|per_state| per_state.sum_tree.priority(slot))
    }
}

impl<O: Clone, S: Clone> ExperienceBufferBase for SharedBuffer<O, S> {
    type Item = Transition<O, S>;

    fn push(&self, tr: Self::Item) {
        let mut inner = self.lock();
        match (inner.per_state.is_some(), inner.capacity) {
            (true, Some(capacity)) => inner.push_ring(tr, capacity),
            _ => inner.push_fifo(tr),
        }
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

impl<O: Clone, S: Clone> ReplayBufferBase for SharedBuffer<O, S> {
    type Config = SharedBufferConfig;
    type Batch = TransitionBatch<O, S>;

    fn build(config: &Self::Config) -> Result<Self, RelayError> {
        config.validate()?;

        let per_state = match (&config.per_config, config.capacity) {
            (Some(per_config), Some(capacity)) => {
                Some(PerState::new(capacity, config.seed, per_config)?)
            }
            _ => None,
        };
        let columns = Columns::new(config.capacity.unwrap_or(0));

        Ok(Self {
            inner: Mutex::new(Inner {
                columns,
                capacity: config.capacity,
                head: 0,
                len: 0,
                per_state,
            }),
        })
    }

    /// Removes up to `count` of the oldest transitions.
    ///
    /// Returns fewer transitions, possibly none, if the buffer holds fewer.
    fn pop_batch(&self, count: usize) -> Result<Self::Batch, RelayError> {
        if count == 0 {
            return Err(RelayError::invalid("pop_batch requires count > 0"));
        }

        let mut inner = self.lock();
        match (inner.per_state.is_some(), inner.capacity) {
            (true, Some(capacity)) => inner.pop_ring(count, capacity),
            _ => Ok(inner.pop_fifo(count)),
        }
    }

    /// Draws `count` transitions with probability proportional to their
    /// priorities. The batch carries the sampled slots and importance
    /// sampling weights.
    fn sample_batch(&self, count: usize) -> Result<Self::Batch, RelayError> {
        if count == 0 {
            return Err(RelayError::invalid("sample_batch requires count > 0"));
        }

        let inner = self.lock();
        let per_state = inner.per_state.as_ref().ok_or_else(|| {
            RelayError::invalid("sample_batch requires a buffer with prioritized sampling")
        })?;

        let ixs = per_state.sum_tree.sample_batch(count)?;
        let weight = per_state.weights(&ixs, inner.len);
        let mut batch = inner.columns.gather(&ixs);
        batch.ix_sample = Some(ixs);
        batch.weight = Some(weight);

        Ok(batch)
    }

    /// Sets the priorities of the sampled slots to `(|error| + bias)^exponent`.
    ///
    /// Slots whose entries were popped since sampling are skipped.
    fn update_priority(&self, ixs: &[usize], errors: &[f32]) -> Result<(), RelayError> {
        if ixs.len() != errors.len() {
            return Err(RelayError::invalid(format!(
                "{} indices but {} errors",
                ixs.len(),
                errors.len()
            )));
        }

        let mut inner = self.lock();
        let capacity = inner.capacity.unwrap_or(0);
        let live = ixs
            .iter()
            .map(|&ix| inner.is_live(ix, capacity))
            .collect::<Vec<_>>();
        let per_state = inner.per_state.as_mut().ok_or_else(|| {
            RelayError::invalid("update_priority requires a buffer with prioritized sampling")
        })?;

        for ((&ix, &err), live) in ixs.iter().zip(errors.iter()).zip(live) {
            if !live {
                log::trace!("Skip priority update of stale slot {}", ix);
                continue;
            }
            let p = per_state.config.priority(err)?;
            per_state.set(ix, p)?;
        }
        per_state.iw_scheduler.add_n_opts();

        Ok(())
    }
}
