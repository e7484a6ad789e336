//! Transitions and column-wise transition batches.
use crate::BatchBase;
use std::collections::VecDeque;

/// A sealed transition, the unit moved from a producer's
/// [`TrajectoryWindow`](super::TrajectoryWindow) into the
/// [`SharedBuffer`](super::SharedBuffer).
///
/// `O` is the observation type and `S` the recurrent state of the brain.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<O, S> {
    /// Observation the action was taken from.
    pub from_observation: O,

    /// Recurrent state paired with `from_observation`.
    pub from_recurrent_state: S,

    /// Newest observation of the segment.
    pub to_observation: O,

    /// Recurrent state paired with `to_observation`.
    pub to_recurrent_state: S,

    /// Predicted policy at `from_observation`. Empty for value-only brains.
    pub predicted_policy: Vec<f32>,

    /// Predicted value at `from_observation`.
    pub predicted_value: f32,

    /// One-hot encoded action.
    pub action: Vec<f32>,

    /// Discounted sum of the rewards in the segment.
    pub n_step_return: f32,

    /// Generalized advantage estimate of the segment.
    pub gae_advantage: f32,

    /// The episode ended at this transition.
    pub terminal: bool,

    /// `to_observation` is a terminal state, so no value may be bootstrapped from it.
    pub ends_in_terminal: bool,

    /// Number of environment steps folded into `n_step_return` and `gae_advantage`.
    pub segment_length: usize,
}

impl<O, S> Transition<O, S> {
    /// Index of the hot entry of [`Transition::action`].
    pub fn action_index(&self) -> usize {
        self.action
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |(im, vm), (i, &v)| if v > vm { (i, v) } else { (im, vm) })
            .0
    }
}

/// Returns a one-hot vector of length `n` with `ix` set.
pub fn one_hot(ix: usize, n: usize) -> Vec<f32> {
    let mut v = vec![0f32; n];
    v[ix] = 1.0;
    v
}

/// A batch of transitions stored column-wise, one vector per field.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionBatch<O, S> {
    /// Observations the actions were taken from.
    pub from_observation: Vec<O>,

    /// Recurrent states paired with `from_observation`.
    pub from_recurrent_state: Vec<S>,

    /// Newest observations of the segments.
    pub to_observation: Vec<O>,

    /// Recurrent states paired with `to_observation`.
    pub to_recurrent_state: Vec<S>,

    /// Predicted policies.
    pub predicted_policy: Vec<Vec<f32>>,

    /// Predicted values.
    pub predicted_value: Vec<f32>,

    /// One-hot actions.
    pub action: Vec<Vec<f32>>,

    /// N-step returns.
    pub n_step_return: Vec<f32>,

    /// GAE advantages.
    pub gae_advantage: Vec<f32>,

    /// Terminal flags.
    pub terminal: Vec<bool>,

    /// Flags for segments ending in a terminal state.
    pub ends_in_terminal: Vec<bool>,

    /// Segment lengths.
    pub segment_length: Vec<usize>,

    /// Buffer slots of the samples, set for prioritized batches.
    pub ix_sample: Option<Vec<usize>>,

    /// Importance sampling weights, set for prioritized batches.
    pub weight: Option<Vec<f32>>,
}

impl<O, S> TransitionBatch<O, S> {
    /// A batch without any transitions.
    pub fn empty() -> Self {
        Self::with_capacity(0)
    }

    fn with_capacity(n: usize) -> Self {
        Self {
            from_observation: Vec::with_capacity(n),
            from_recurrent_state: Vec::with_capacity(n),
            to_observation: Vec::with_capacity(n),
            to_recurrent_state: Vec::with_capacity(n),
            predicted_policy: Vec::with_capacity(n),
            predicted_value: Vec::with_capacity(n),
            action: Vec::with_capacity(n),
            n_step_return: Vec::with_capacity(n),
            gae_advantage: Vec::with_capacity(n),
            terminal: Vec::with_capacity(n),
            ends_in_terminal: Vec::with_capacity(n),
            segment_length: Vec::with_capacity(n),
            ix_sample: None,
            weight: None,
        }
    }

    fn push(&mut self, tr: Transition<O, S>) {
        self.from_observation.push(tr.from_observation);
        self.from_recurrent_state.push(tr.from_recurrent_state);
        self.to_observation.push(tr.to_observation);
        self.to_recurrent_state.push(tr.to_recurrent_state);
        self.predicted_policy.push(tr.predicted_policy);
        self.predicted_value.push(tr.predicted_value);
        self.action.push(tr.action);
        self.n_step_return.push(tr.n_step_return);
        self.gae_advantage.push(tr.gae_advantage);
        self.terminal.push(tr.terminal);
        self.ends_in_terminal.push(tr.ends_in_terminal);
        self.segment_length.push(tr.segment_length);
    }

    /// Splits the batch back into row-wise transitions, in batch order.
    pub fn into_transitions(self) -> Vec<Transition<O, S>> {
        let mut out = Vec::with_capacity(self.n_step_return.len());
        let mut from_recurrent_state = self.from_recurrent_state.into_iter();
        let mut to_observation = self.to_observation.into_iter();
        let mut to_recurrent_state = self.to_recurrent_state.into_iter();
        let mut predicted_policy = self.predicted_policy.into_iter();
        let mut action = self.action.into_iter();

        for (i, from_observation) in self.from_observation.into_iter().enumerate() {
            // All columns have the same length by construction.
            let (Some(fs), Some(to), Some(ts), Some(pp), Some(a)) = (
                from_recurrent_state.next(),
                to_observation.next(),
                to_recurrent_state.next(),
                predicted_policy.next(),
                action.next(),
            ) else {
                break;
            };
            out.push(Transition {
                from_observation,
                from_recurrent_state: fs,
                to_observation: to,
                to_recurrent_state: ts,
                predicted_policy: pp,
                predicted_value: self.predicted_value[i],
                action: a,
                n_step_return: self.n_step_return[i],
                gae_advantage: self.gae_advantage[i],
                terminal: self.terminal[i],
                ends_in_terminal: self.ends_in_terminal[i],
                segment_length: self.segment_length[i],
            });
        }
        out
    }
}

impl<O, S> std::iter::FromIterator<Transition<O, S>> for TransitionBatch<O, S> {
    fn from_iter<I: IntoIterator<Item = Transition<O, S>>>(iter: I) -> Self {
        let mut batch = Self::empty();
        for tr in iter {
            batch.push(tr);
        }
        batch
    }
}

impl<O, S> BatchBase for TransitionBatch<O, S> {
    fn len(&self) -> usize {
        self.n_step_return.len()
    }

    fn ix_sample(&self) -> Option<&[usize]> {
        self.ix_sample.as_deref()
    }
}

/// Parallel per-field sequences backing the shared buffer.
///
/// Only [`SharedBuffer`](super::SharedBuffer) touches this type, always while
/// holding its lock, and every method writes or removes exactly one entry in
/// each column so that all columns keep the same length.
#[derive(Debug)]
pub(crate) struct Columns<O, S> {
    from_observation: VecDeque<O>,
    from_recurrent_state: VecDeque<S>,
    to_observation: VecDeque<O>,
    to_recurrent_state: VecDeque<S>,
    predicted_policy: VecDeque<Vec<f32>>,
    predicted_value: VecDeque<f32>,
    action: VecDeque<Vec<f32>>,
    n_step_return: VecDeque<f32>,
    gae_advantage: VecDeque<f32>,
    terminal: VecDeque<bool>,
    ends_in_terminal: VecDeque<bool>,
    segment_length: VecDeque<usize>,
}

impl<O: Clone, S: Clone> Columns<O, S> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            from_observation: VecDeque::with_capacity(capacity),
            from_recurrent_state: VecDeque::with_capacity(capacity),
            to_observation: VecDeque::with_capacity(capacity),
            to_recurrent_state: VecDeque::with_capacity(capacity),
            predicted_policy: VecDeque::with_capacity(capacity),
            predicted_value: VecDeque::with_capacity(capacity),
            action: VecDeque::with_capacity(capacity),
            n_step_return: VecDeque::with_capacity(capacity),
            gae_advantage: VecDeque::with_capacity(capacity),
            terminal: VecDeque::with_capacity(capacity),
            ends_in_terminal: VecDeque::with_capacity(capacity),
            segment_length: VecDeque::with_capacity(capacity),
        }
    }

    /// Number of physically stored entries.
    pub(crate) fn len(&self) -> usize {
        self.n_step_return.len()
    }

    /// Lengths of all columns, used to check alignment.
    pub(crate) fn lengths(&self) -> [usize; 12] {
        [
            self.from_observation.len(),
            self.from_recurrent_state.len(),
            self.to_observation.len(),
            self.to_recurrent_state.len(),
            self.predicted_policy.len(),
            self.predicted_value.len(),
            self.action.len(),
            self.n_step_return.len(),
            self.gae_advantage.len(),
            self.terminal.len(),
            self.ends_in_terminal.len(),
            self.segment_length.len(),
        ]
    }

    pub(crate) fn push_back(&mut self, tr: Transition<O, S>) {
        self.from_observation.push_back(tr.from_observation);
        self.from_recurrent_state.push_back(tr.from_recurrent_state);
        self.to_observation.push_back(tr.to_observation);
        self.to_recurrent_state.push_back(tr.to_recurrent_state);
        self.predicted_policy.push_back(tr.predicted_policy);
        self.predicted_value.push_back(tr.predicted_value);
        self.action.push_back(tr.action);
        self.n_step_return.push_back(tr.n_step_return);
        self.gae_advantage.push_back(tr.gae_advantage);
        self.terminal.push_back(tr.terminal);
        self.ends_in_terminal.push_back(tr.ends_in_terminal);
        self.segment_length.push_back(tr.segment_length);
    }

    /// Overwrites the entry at physical slot `ix`.
    pub(crate) fn set(&mut self, ix: usize, tr: Transition<O, S>) {
        self.from_observation[ix] = tr.from_observation;
        self.from_recurrent_state[ix] = tr.from_recurrent_state;
        self.to_observation[ix] = tr.to_observation;
        self.to_recurrent_state[ix] = tr.to_recurrent_state;
        self.predicted_policy[ix] = tr.predicted_policy;
        self.predicted_value[ix] = tr.predicted_value;
        self.action[ix] = tr.action;
        self.n_step_return[ix] = tr.n_step_return;
        self.gae_advantage[ix] = tr.gae_advantage;
        self.terminal[ix] = tr.terminal;
        self.ends_in_terminal[ix] = tr.ends_in_terminal;
        self.segment_length[ix] = tr.segment_length;
    }

    /// Drops the oldest entry.
    pub(crate) fn pop_front(&mut self) {
        self.from_observation.pop_front();
        self.from_recurrent_state.pop_front();
        self.to_observation.pop_front();
        self.to_recurrent_state.pop_front();
        self.predicted_policy.pop_front();
        self.predicted_value.pop_front();
        self.action.pop_front();
        self.n_step_return.pop_front();
        self.gae_advantage.pop_front();
        self.terminal.pop_front();
        self.ends_in_terminal.pop_front();
        self.segment_length.pop_front();
    }

    /// Removes the first `n` entries (or all, if fewer) and returns them as a batch.
    pub(crate) fn drain_front(&mut self, n: usize) -> TransitionBatch<O, S> {
        let n = n.min(self.len());
        TransitionBatch {
            from_observation: self.from_observation.drain(..n).collect(),
            from_recurrent_state: self.from_recurrent_state.drain(..n).collect(),
            to_observation: self.to_observation.drain(..n).collect(),
            to_recurrent_state: self.to_recurrent_state.drain(..n).collect(),
            predicted_policy: self.predicted_policy.drain(..n).collect(),
            predicted_value: self.predicted_value.drain(..n).collect(),
            action: self.action.drain(..n).collect(),
            n_step_return: self.n_step_return.drain(..n).collect(),
            gae_advantage: self.gae_advantage.drain(..n).collect(),
            terminal: self.terminal.drain(..n).collect(),
            ends_in_terminal: self.ends_in_terminal.drain(..n).collect(),
            segment_length: self.segment_length.drain(..n).collect(),
            ix_sample: None,
            weight: None,
        }
    }

    /// Copies the entries at the given physical slots into a batch.
    pub(crate) fn gather(&self, ixs: &[usize]) -> TransitionBatch<O, S> {
        let mut batch = TransitionBatch::with_capacity(ixs.len());
        for &ix in ixs {
            batch.push(self.get(ix));
        }
        batch
    }

    fn get(&self, ix: usize) -> Transition<O, S> {
        Transition {
            from_observation: self.from_observation[ix].clone(),
            from_recurrent_state: self.from_recurrent_state[ix].clone(),
            to_observation: self.to_observation[ix].clone(),
            to_recurrent_state: self.to_recurrent_state[ix].clone(),
            predicted_policy: self.predicted_policy[ix].clone(),
            predicted_value: self.predicted_value[ix],
            action: self.action[ix].clone(),
            n_step_return: self.n_step_return[ix],
            gae_advantage: self.gae_advantage[ix],
            terminal: self.terminal[ix],
            ends_in_terminal: self.ends_in_terminal[ix],
            segment_length: self.segment_length[ix],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tr(i: usize) -> Transition<usize, ()> {
        Transition {
            from_observation: i,
            from_recurrent_state: (),
            to_observation: i + 1,
            to_recurrent_state: (),
            predicted_policy: vec![],
            predicted_value: i as f32,
            action: one_hot(i % 3, 3),
            n_step_return: 0.5 * i as f32,
            gae_advantage: -(i as f32),
            terminal: false,
            ends_in_terminal: false,
            segment_length: 1,
        }
    }

    #[test]
    fn test_one_hot_and_action_index() {
        assert_eq!(one_hot(2, 4), vec![0., 0., 1., 0.]);
        assert_eq!(tr(4).action_index(), 1);
    }

    #[test]
    fn test_columns_drain_and_gather() {
        let mut cols = Columns::new(4);
        for i in 0..5 {
            cols.push_back(tr(i));
        }
        assert!(cols.lengths().iter().all(|&l| l == 5));

        let gathered = cols.gather(&[4, 0, 4]).into_transitions();
        assert_eq!(gathered, vec![tr(4), tr(0), tr(4)]);

        cols.set(1, tr(9));
        let drained = cols.drain_front(3);
        assert_eq!(drained.len(), 3);
        assert_eq!(drained.into_transitions(), vec![tr(0), tr(9), tr(2)]);
        assert_eq!(cols.len(), 2);

        cols.pop_front();
        assert!(cols.lengths().iter().all(|&l| l == 1));
        assert_eq!(cols.drain_front(10).into_transitions(), vec![tr(4)]);
        assert!(cols.drain_front(1).is_empty());
    }
}
