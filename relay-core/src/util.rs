//! Utilities for interaction of brains and environments.
use crate::{
    record::{Record, RecordValue, Recorder},
    Brain, Env,
};
use anyhow::Result;

/// Index of the largest entry, 0 for an empty slice.
pub fn argmax(xs: &[f32]) -> usize {
    xs.iter()
        .enumerate()
        .fold((0, f32::MIN), |(im, vm), (i, &v)| if v > vm { (i, v) } else { (im, vm) })
        .0
}

/// Runs episodes acting greedily on the brain's policy and writes one record
/// per step. Returns the total reward of every episode.
///
/// Brains without a policy always take action 0.
pub fn eval_with_recorder<E, B, R>(
    env: &mut E,
    brain: &B,
    n_episodes: usize,
    recorder: &mut R,
) -> Result<Vec<f32>>
where
    E: Env,
    B: Brain<E::Obs> + ?Sized,
    R: Recorder,
{
    let mut rs = Vec::new();

    for episode in 0..n_episodes {
        let mut obs = env.reset()?;
        let mut state = brain.initial_state();
        let mut r_total = 0.0;
        let mut count_step = 0;

        loop {
            let prediction = brain.predict(&obs, &state)?;
            let act = prediction.policy.as_deref().map_or(0, argmax);
            let step = env.step(act)?;
            r_total += step.reward;

            let mut record = Record::from_scalar("reward", step.reward);
            record.insert("value", RecordValue::Scalar(prediction.value));
            record.insert("episode", RecordValue::Scalar(episode as _));
            record.insert("step", RecordValue::Scalar(count_step as _));
            recorder.write(record);

            if step.is_done() {
                break;
            }
            obs = step.obs;
            state = prediction.next_state;
            count_step += 1;
        }
        log::info!("Episode {}, {} steps, reward = {}", episode, count_step + 1, r_total);
        rs.push(r_total);
    }

    Ok(rs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dummy::{ConstantBrain, CorridorConfig, CorridorEnv},
        record::BufferedRecorder,
    };

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[0.5, 0.5]), 0);
        assert_eq!(argmax(&[]), 0);
    }

    #[test]
    fn test_eval_with_recorder() -> Result<()> {
        let config = CorridorConfig {
            max_steps: 6,
            ..Default::default()
        };
        let mut env = CorridorEnv::build(&config, 0)?;
        // A uniform policy breaks the tie toward action 0, which never
        // reaches the goal, so every episode is truncated.
        let brain = ConstantBrain::new(2, 0.5);
        let mut recorder = BufferedRecorder::new();

        let rs = eval_with_recorder(&mut env, &brain, 2, &mut recorder)?;
        assert_eq!(rs, vec![0.0, 0.0]);
        assert_eq!(recorder.len(), 12);
        let last = recorder.iter().last().unwrap();
        assert_eq!(last.get_scalar("step")?, 5.0);
        assert_eq!(last.get_scalar("value")?, 0.5);
        Ok(())
    }
}
