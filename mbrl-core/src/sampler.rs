//! Sampling transitions from a real environment.
use crate::{Agent, Env, Transition, TransitionPool};
use anyhow::Result;
use log::{debug, info};
use ndarray::Array2;

/// Steps a real environment with the actions of an agent.
///
/// The environment is reset before the first step, after a terminal transition
/// and when the episode reaches `max_path_length` steps.
pub struct EnvSampler<E: Env> {
    env: E,
    current_obs: Option<Vec<f32>>,
    path_length: usize,
    max_path_length: usize,
    sum_reward: f32,
    path_rewards: Vec<f32>,
}

impl<E: Env> EnvSampler<E> {
    /// Creates a sampler with the given episode horizon.
    pub fn new(env: E, max_path_length: usize) -> Self {
        Self {
            env,
            current_obs: None,
            path_length: 0,
            max_path_length,
            sum_reward: 0.0,
            path_rewards: vec![],
        }
    }

    /// Returns a reference to the environment.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Returns the number of steps in the current episode.
    pub fn path_length(&self) -> usize {
        self.path_length
    }

    /// Returns the total rewards of the completed episodes.
    pub fn path_rewards(&self) -> &[f32] {
        &self.path_rewards
    }

    /// Takes one step and returns the transition.
    ///
    /// If `eval` is `true` the action is selected in evaluation mode, after which
    /// the previous mode of the agent is restored.
    pub fn sample(&mut self, agent: &mut dyn Agent, eval: bool) -> Result<Transition> {
        let obs = match self.current_obs.take() {
            Some(obs) => obs,
            None => self.env.reset()?,
        };

        let was_train = agent.is_train();
        if eval {
            agent.eval();
        }
        let act = {
            let obs_ = Array2::from_shape_vec((1, obs.len()), obs.clone())?;
            agent.select_action(&obs_)?.row(0).to_vec()
        };
        if eval && was_train {
            agent.train();
        }

        let step = self.env.step(&act)?;
        self.path_length += 1;
        self.sum_reward += step.reward;

        let is_done = step.is_terminated;
        let tr = Transition::new(obs, act, step.reward, step.obs.clone(), is_done);

        if is_done || self.path_length >= self.max_path_length {
            debug!(
                "Episode finished after {} steps with reward {}",
                self.path_length, self.sum_reward
            );
            self.path_rewards.push(self.sum_reward);
            self.current_obs = None;
            self.path_length = 0;
            self.sum_reward = 0.0;
        } else {
            self.current_obs = Some(step.obs);
        }

        Ok(tr)
    }
}

/// Fills `pool` with `n_steps` transitions collected by `agent` before training starts.
pub fn exploration_before_start<E: Env>(
    sampler: &mut EnvSampler<E>,
    pool: &mut TransitionPool,
    agent: &mut dyn Agent,
    n_steps: usize,
) -> Result<()> {
    for _ in 0..n_steps {
        let tr = sampler.sample(agent, false)?;
        pool.push(tr)?;
    }
    info!(
        "Collected {} exploration steps, {} transitions in the {} pool",
        n_steps,
        pool.len(),
        pool.name()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dummy::{DummyAgent, DummyEnv, DummyEnvConfig},
        TransitionPoolConfig,
    };

    #[test]
    fn test_reset_on_horizon_and_termination() -> Result<()> {
        // Terminates after 5 steps, horizon 3
        let config = DummyEnvConfig::default().episode_len(5);
        let env = DummyEnv::build(&config, 0)?;
        let mut sampler = EnvSampler::new(env, 3);
        let mut agent = DummyAgent::new(1, 1);

        for _ in 0..7 {
            sampler.sample(&mut agent, false)?;
        }
        assert_eq!(sampler.path_rewards().len(), 2);
        assert_eq!(sampler.path_length(), 1);

        let config = DummyEnvConfig::default().episode_len(2);
        let env = DummyEnv::build(&config, 0)?;
        let mut sampler = EnvSampler::new(env, 100);
        let tr1 = sampler.sample(&mut agent, false)?;
        let tr2 = sampler.sample(&mut agent, false)?;
        assert!(!tr1.is_done());
        assert!(tr2.is_done());
        assert_eq!(sampler.path_length(), 0);
        Ok(())
    }

    #[test]
    fn test_eval_restores_mode() -> Result<()> {
        let env = DummyEnv::build(&DummyEnvConfig::default(), 0)?;
        let mut sampler = EnvSampler::new(env, 10);
        let mut agent = DummyAgent::new(1, 1);
        agent.train();
        sampler.sample(&mut agent, true)?;
        assert!(agent.is_train());
        Ok(())
    }

    #[test]
    fn test_exploration_fills_pool() -> Result<()> {
        let env = DummyEnv::build(&DummyEnvConfig::default(), 0)?;
        let mut sampler = EnvSampler::new(env, 10);
        let mut agent = DummyAgent::new(1, 1);
        let config = TransitionPoolConfig::default().capacity(100).dims(1, 1);
        let mut pool = TransitionPool::build(&config)?;
        exploration_before_start(&mut sampler, &mut pool, &mut agent, 25)?;
        assert_eq!(pool.len(), 25);
        Ok(())
    }
}
