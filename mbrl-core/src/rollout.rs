//! Model rollouts.
mod config;
use crate::{
    record::{Record, RecordValue::Scalar},
    Agent, DynamicsPredictor, MbrlError, TransitionBatch, TransitionPool,
};
use anyhow::Result;
pub use config::RolloutConfig;
use log::{info, trace};
use ndarray::Axis;

/// Synthesizes short trajectories with a learned dynamics model.
///
/// A rollout starts `rollout_batch_size` trajectories from states sampled from the
/// real pool and extends them for at most `rollout_length` steps:
///
/// 1. The agent selects actions for the active states in a single batch.
/// 2. The predictor returns next states, rewards and termination flags.
/// 3. Every predicted transition is pushed into the model pool.
/// 4. Terminated trajectories are dropped from the batch. The rollout ends early
///    when no trajectory is left.
///
/// Active trajectories are tracked by compacting the state matrix to its
/// non-terminated rows, so a trajectory terminated at step `t` never yields a
/// transition after `t`.
pub struct RolloutGenerator {
    config: RolloutConfig,
}

impl RolloutGenerator {
    /// Constructs a rollout generator.
    pub fn build(config: &RolloutConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RolloutConfig {
        &self.config
    }

    /// Runs a rollout and returns statistics of the generated transitions.
    ///
    /// The model pool grows by at most `rollout_batch_size * rollout_length`
    /// transitions. The real pool must not be empty.
    pub fn rollout<P: DynamicsPredictor + ?Sized>(
        &self,
        agent: &mut dyn Agent,
        predictor: &mut P,
        real_pool: &mut TransitionPool,
        model_pool: &mut TransitionPool,
    ) -> Result<Record> {
        if self.config.rollout_length == 0 {
            return Err(
                MbrlError::Configuration("rollout requested with zero rollout_length".into()).into(),
            );
        }

        let mut obs = real_pool.sample_obs(self.config.rollout_batch_size)?;
        let mut n_transitions = 0;
        let mut sum_reward = 0f32;
        let mut n_steps = 0;

        for t in 0..self.config.rollout_length {
            if obs.nrows() == 0 {
                break;
            }
            let n = obs.nrows();
            let act = agent.select_action(&obs)?;
            let pred = predictor.predict(&obs, &act)?;
            if pred.next_obs.nrows() != n || pred.reward.len() != n || pred.is_done.len() != n {
                return Err(MbrlError::ShapeMismatch {
                    what: "rows of the dynamics prediction".into(),
                    expected: n,
                    actual: pred.reward.len(),
                }
                .into());
            }

            // Rows still running after this step
            let active: Vec<usize> = (0..n).filter(|&i| !pred.is_done[i]).collect();
            trace!("Rollout step {}: {} trajectories, {} terminated", t, n, n - active.len());

            sum_reward += pred.reward.iter().sum::<f32>();
            let batch = TransitionBatch {
                obs,
                act,
                next_obs: pred.next_obs,
                reward: pred.reward,
                is_done: pred.is_done.iter().map(|&d| d as i8).collect(),
            };
            model_pool.push_batch(&batch)?;
            n_transitions += n;
            n_steps += 1;

            obs = batch.next_obs.select(Axis(0), &active);
        }

        info!(
            "Rollout of {} steps added {} transitions, model pool size {}",
            n_steps,
            n_transitions,
            model_pool.len()
        );

        Ok(Record::from_slice(&[
            ("rollout_transitions", Scalar(n_transitions as f32)),
            ("rollout_steps", Scalar(n_steps as f32)),
            (
                "rollout_reward_mean",
                Scalar(sum_reward / (n_transitions.max(1) as f32)),
            ),
            ("model_pool_size", Scalar(model_pool.len() as f32)),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dummy::{DummyAgent, DummyDynamics},
        Transition, TransitionPoolConfig,
    };

    fn pools(starts: &[f32], model_capacity: usize) -> (TransitionPool, TransitionPool) {
        let config = TransitionPoolConfig::default().capacity(100).dims(1, 1);
        let mut real = TransitionPool::build(&config).unwrap();
        for &s in starts {
            real.push(Transition::new(vec![s], vec![0.0], 0.0, vec![s + 1.0], false))
                .unwrap();
        }
        let config = config.name("model").capacity(model_capacity);
        (real, TransitionPool::build(&config).unwrap())
    }

    #[test]
    fn test_rollout_without_termination() -> Result<()> {
        let (mut real, mut model) = pools(&[0.0, 1.0, 2.0], 1000);
        let mut agent = DummyAgent::new(1, 1);
        let mut dynamics = DummyDynamics::new(1);
        let config = RolloutConfig::default().rollout_length(4).rollout_batch_size(10);
        let record = RolloutGenerator::build(&config).rollout(
            &mut agent,
            &mut dynamics,
            &mut real,
            &mut model,
        )?;

        assert_eq!(model.len(), 40);
        assert_eq!(record.get_scalar("rollout_transitions")?, 40.0);
        assert_eq!(real.len(), 3);
        Ok(())
    }

    #[test]
    fn test_terminated_trajectories_stop() -> Result<()> {
        // States reach the threshold 3 after 3 steps from 0 and 1 step from 2
        let (mut real, mut model) = pools(&[0.0, 2.0], 1000);
        let mut agent = DummyAgent::new(1, 1);
        let mut dynamics = DummyDynamics::new(1).done_threshold(3.0);
        let config = RolloutConfig::default().rollout_length(10).rollout_batch_size(20);
        RolloutGenerator::build(&config).rollout(&mut agent, &mut dynamics, &mut real, &mut model)?;

        assert!(model.len() <= config.max_transitions());
        assert!(model.len() >= 20);
        assert!(model.len() <= 60);
        for tr in model.iter() {
            // No transition starts from a terminal state
            assert!(tr.obs()[0] < 3.0);
            assert_eq!(tr.is_done(), tr.next_obs()[0] >= 3.0);
        }
        assert!(dynamics.counters().borrow().n_predict <= 3);
        Ok(())
    }

    #[test]
    fn test_rollout_from_empty_real_pool() {
        let (mut real, mut model) = pools(&[], 10);
        let mut agent = DummyAgent::new(1, 1);
        let mut dynamics = DummyDynamics::new(1);
        let config = RolloutConfig::default().rollout_batch_size(5);
        let err = RolloutGenerator::build(&config)
            .rollout(&mut agent, &mut dynamics, &mut real, &mut model)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MbrlError>(),
            Some(MbrlError::EmptyPool { .. })
        ));
    }

    #[test]
    fn test_zero_rollout_length() {
        let (mut real, mut model) = pools(&[0.0], 10);
        let mut agent = DummyAgent::new(1, 1);
        let mut dynamics = DummyDynamics::new(1);
        let config = RolloutConfig::default().rollout_length(0);
        let err = RolloutGenerator::build(&config)
            .rollout(&mut agent, &mut dynamics, &mut real, &mut model)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MbrlError>(),
            Some(MbrlError::Configuration(_))
        ));
        assert!(model.is_empty());
    }
}
