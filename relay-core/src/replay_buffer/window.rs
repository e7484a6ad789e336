//! Per-producer rolling window computing n-step returns and GAE advantages.
use super::{Transition, WindowConfig};
use crate::{error::RelayError, Prediction};
use std::collections::VecDeque;

/// Phase of a [`TrajectoryWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// No episode in progress. [`TrajectoryWindow::reset`] starts one.
    Empty,

    /// Steps are being recorded; one transition is emitted whenever the window
    /// holds `n_steps` actions.
    Accumulating,

    /// The episode ended (`terminal`) or was cut off; the remaining actions are
    /// emitted one by one until the window is empty.
    Draining {
        /// The episode ended in a terminal state.
        terminal: bool,
    },
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Rolling window over the last `n_steps` actions of one producer's episode.
///
/// The window is owned by a single producer and never shared.
///
/// ```mermaid
/// stateDiagram-v2
///     [*] --> Empty
///     Empty --> Accumulating: reset
///     Accumulating --> Accumulating: record_step / emit_oldest when full
///     Accumulating --> Draining: emit_oldest(terminal) or partial window
///     Draining --> Draining: emit_oldest
///     Draining --> Empty: last action emitted
/// ```
///
/// The n-step return is kept in a folded accumulator `R`. With `k` pending
/// rewards `r_0..r_{k-1}` and `G_k = sum_j r_j * gamma^j`, the accumulator
/// satisfies `R = gamma^(N - k) * G_k` while accumulating, so that `R = G_N` is
/// the return as soon as the window is full. Each step folds the new reward in
/// as `R = (R + r * gamma^N) / gamma`. After an emission the oldest reward is
/// unfolded with `R = R - r_0`. A drain first rescales `R` to `G_k` if the
/// window is not full and then divides by `gamma` after every emission, which
/// keeps `R = G_k` exact for any number of pending actions.
#[derive(Debug)]
pub struct TrajectoryWindow<O, S> {
    n_steps: usize,
    gamma: f32,
    lambda: f32,
    reward_scale: f32,
    gamma_n: f64,
    state: WindowState,
    acc: f64,
    // k + 1 entries for k pending actions.
    observations: VecDeque<O>,
    recurrent_states: VecDeque<S>,
    // k entries each.
    values: VecDeque<f32>,
    policies: VecDeque<Vec<f32>>,
    actions: VecDeque<Vec<f32>>,
    rewards: VecDeque<f32>,
}

impl<O: Clone, S: Clone> TrajectoryWindow<O, S> {
    /// Creates an empty window.
    pub fn build(config: &WindowConfig) -> Result<Self, RelayError> {
        config.validate()?;
        let n = config.n_steps;

        Ok(Self {
            n_steps: n,
            gamma: config.gamma,
            lambda: config.lambda,
            reward_scale: config.reward_scale,
            gamma_n: (config.gamma as f64).powi(n as i32),
            state: WindowState::Empty,
            acc: 0.0,
            observations: VecDeque::with_capacity(n + 1),
            recurrent_states: VecDeque::with_capacity(n + 1),
            values: VecDeque::with_capacity(n),
            policies: VecDeque::with_capacity(n),
            actions: VecDeque::with_capacity(n),
            rewards: VecDeque::with_capacity(n),
        })
    }

    /// Current phase.
    pub fn state(&self) -> WindowState {
        self.state
    }

    /// Number of actions not emitted yet.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` if no action is pending.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns `true` if the window holds `n_steps` actions and must emit
    /// before the next step is recorded.
    pub fn is_full(&self) -> bool {
        self.actions.len() == self.n_steps
    }

    /// Starts a new episode from its first observation, discarding anything
    /// left over from an aborted one.
    pub fn reset(&mut self, observation: O, recurrent_state: S) {
        self.clear();
        self.observations.push_back(observation);
        self.recurrent_states.push_back(recurrent_state);
        self.state = WindowState::Accumulating;
    }

    /// Records one environment step.
    ///
    /// `prediction` is the brain's output for the newest observation in the
    /// window; its `next_state` is paired with `next_observation`. `action` is
    /// one-hot encoded. The reward is multiplied by the configured reward scale.
    pub fn record_step(
        &mut self,
        prediction: Prediction<S>,
        action: Vec<f32>,
        reward: f32,
        next_observation: O,
    ) -> Result<(), RelayError> {
        match self.state {
            WindowState::Accumulating => {}
            WindowState::Empty => {
                return Err(RelayError::invalid(
                    "record_step on an empty window, call reset first",
                ))
            }
            WindowState::Draining { .. } => {
                return Err(RelayError::invalid("record_step on a draining window"))
            }
        }
        if self.actions.len() >= self.n_steps {
            return Err(RelayError::CapacityExceeded {
                n_steps: self.n_steps,
            });
        }

        let reward = reward * self.reward_scale;
        self.acc = (self.acc + reward as f64 * self.gamma_n) / self.gamma as f64;

        self.values.push_back(prediction.value);
        self.policies.push_back(prediction.policy.unwrap_or_default());
        self.actions.push_back(action);
        self.rewards.push_back(reward);
        self.observations.push_back(next_observation);
        self.recurrent_states.push_back(prediction.next_state);

        Ok(())
    }

    /// Emits the transition starting at the oldest pending action.
    ///
    /// Called when the window is full, or with the episode finished. A call
    /// with `terminal = true`, or on a window holding fewer than `n_steps`
    /// actions, starts a drain; the drain must then be continued with the same
    /// flag until the window is empty.
    pub fn emit_oldest(&mut self, terminal: bool) -> Result<Transition<O, S>, RelayError> {
        let k = self.actions.len();
        if k == 0 {
            return Err(RelayError::Underflow);
        }

        match self.state {
            WindowState::Empty => return Err(RelayError::Underflow),
            WindowState::Accumulating => {
                if terminal || k < self.n_steps {
                    let missing = (self.n_steps - k) as i32;
                    self.acc /= (self.gamma as f64).powi(missing);
                    self.state = WindowState::Draining { terminal };
                    log::trace!("Drain {} actions, terminal = {}", k, terminal);
                }
            }
            WindowState::Draining { terminal: t } => {
                if t != terminal {
                    return Err(RelayError::invalid(format!(
                        "drain started with terminal = {}, continued with terminal = {}",
                        t, terminal
                    )));
                }
            }
        }
        let draining = matches!(self.state, WindowState::Draining { .. });
        let ends_in_terminal = draining && terminal;

        let n_step_return = self.acc as f32;
        let gae_advantage = self.gae(ends_in_terminal);
        let segment_length = k;

        let (Some(from_observation), Some(from_recurrent_state)) = (
            self.observations.pop_front(),
            self.recurrent_states.pop_front(),
        ) else {
            return Err(RelayError::Underflow);
        };
        let (Some(predicted_value), Some(predicted_policy), Some(action), Some(reward)) = (
            self.values.pop_front(),
            self.policies.pop_front(),
            self.actions.pop_front(),
            self.rewards.pop_front(),
        ) else {
            return Err(RelayError::Underflow);
        };
        let (Some(to_observation), Some(to_recurrent_state)) =
            (self.observations.back(), self.recurrent_states.back())
        else {
            return Err(RelayError::Underflow);
        };

        let tr = Transition {
            from_observation,
            from_recurrent_state,
            to_observation: to_observation.clone(),
            to_recurrent_state: to_recurrent_state.clone(),
            predicted_policy,
            predicted_value,
            action,
            n_step_return,
            gae_advantage,
            terminal: ends_in_terminal && k == 1,
            ends_in_terminal,
            segment_length,
        };

        self.acc -= reward as f64;
        if draining {
            self.acc /= self.gamma as f64;
            if self.actions.is_empty() {
                self.clear();
            }
        }

        Ok(tr)
    }

    /// Emits all pending actions, oldest first, and leaves the window empty.
    pub fn drain(&mut self, terminal: bool) -> Result<Vec<Transition<O, S>>, RelayError> {
        let mut out = Vec::with_capacity(self.len());
        while !self.is_empty() {
            out.push(self.emit_oldest(terminal)?);
        }
        self.clear();
        Ok(out)
    }

    /// Exponentially weighted sum of the one-step TD residuals over the window.
    fn gae(&self, terminal: bool) -> f32 {
        let k = self.values.len();
        let last = self.values[k - 1];
        let bootstrap = if terminal { 0.0 } else { last };
        let gl = self.gamma * self.lambda;

        let mut adv = 0.0;
        let mut w = 1.0;
        for i in 0..k {
            let next = if i + 1 < k { self.values[i + 1] } else { bootstrap };
            let delta = self.rewards[i] + self.gamma * next - self.values[i];
            adv += w * delta;
            w *= gl;
        }
        adv
    }

    fn clear(&mut self) {
        self.observations.clear();
        self.recurrent_states.clear();
        self.values.clear();
        self.policies.clear();
        self.actions.clear();
        self.rewards.clear();
        self.acc = 0.0;
        self.state = WindowState::Empty;
    }
}
