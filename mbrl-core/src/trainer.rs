//! Train [`Agent`].
mod config;
mod phase;
use crate::{
    record::{AggregateRecorder, Record, RecordValue::Scalar},
    Agent, DynamicsModel, EvalRecord, Evaluator, MbrlError, MixedBatch, RolloutGenerator,
    TransitionPool,
};
use anyhow::{Context, Result};
pub use config::TrainerConfig;
use log::{debug, info};
pub use phase::{Phase, PhaseError};
use std::path::{Path, PathBuf};

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Manages the training loop and the objects it drives.
///
/// # Training loop
///
/// 0. Given an agent, an optional dynamics model, the real pool (already filled
///    with the offline dataset or exploration steps), an empty model pool, an
///    evaluator and a recorder.
/// 1. If minibatches include model transitions (`real_ratio < 1`) and the model
///    is not pretrained, fit the dynamics model to the real pool.
/// 2. For `epoch in 0..num_epoch`:
///     1. For `cur_step in 0..epoch_length`:
///         1. If `cur_step % model_train_freq == 0` and `real_ratio < 1`, run a
///            model rollout that appends synthetic transitions to the model pool.
///         2. If `total_step % train_every_n_steps == 0`, perform
///            `min(num_train_repeat, max_train_repeat_per_step)` agent updates,
///            each on a minibatch with `floor(batch_size * real_ratio)` real
///            transitions and model transitions for the rest. Updates in an
///            epoch never exceed `max_train_repeat_per_step * (cur_step + 1)`.
///         3. `total_step += 1`
///     2. Flush the records of the agent updates with step `epoch`.
///     3. If `(epoch + 1) % save_interval == 0`, save the agent in
///        `{model_dir}/{env}/{dataset}/{run_name}-epoch{epoch + 1}`.
///     4. If `epoch % eval_interval == 0`, evaluate the agent and log the result.
///
/// The rollout of a step always completes before the updates of the same step.
///
/// # Interaction of objects
///
/// ```mermaid
/// graph LR
///     D[Dataset]-->|Transition|R[Real pool]
///     R -->|states|G[RolloutGenerator]
///     A[Agent]-->|actions|G
///     P[DynamicsPredictor]-->|next states, rewards|G
///     G -->|Transition|M[Model pool]
///     R -->|real batch|A
///     M -->|model batch|A
///     A -->|policy|E[Evaluator]
/// ```
///
/// Every error aborts the run. It carries a [`PhaseError`] context telling the
/// phase, the epoch and the step where it happened.
pub struct Trainer {
    config: TrainerConfig,
    rollout: RolloutGenerator,

    /// `{model_dir}/{env}/{dataset}`
    checkpoint_dir: Option<PathBuf>,
    run_name: String,

    total_step: usize,
    epoch: usize,
    cur_step: usize,
    n_rollouts: usize,
    n_updates: usize,
    n_checkpoints: usize,
    evals: Vec<(usize, EvalRecord)>,
}

impl Trainer {
    /// Constructs a trainer after validating the configuration.
    pub fn build(config: TrainerConfig) -> Result<Self> {
        config.validate()?;
        let checkpoint_dir = config.model_dir.as_ref().map(PathBuf::from);

        Ok(Self {
            rollout: RolloutGenerator::build(&config.rollout),
            config,
            checkpoint_dir,
            run_name: "run".to_string(),
            total_step: 0,
            epoch: 0,
            cur_step: 0,
            n_rollouts: 0,
            n_updates: 0,
            n_checkpoints: 0,
            evals: vec![],
        })
    }

    /// Sets the names used in checkpoint paths.
    pub fn run_id(
        mut self,
        env: impl AsRef<Path>,
        dataset: impl AsRef<Path>,
        run_name: impl Into<String>,
    ) -> Self {
        self.checkpoint_dir = self
            .config
            .model_dir
            .as_ref()
            .map(|d| Path::new(d).join(env).join(dataset));
        self.run_name = run_name.into();
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Steps taken over the whole run.
    pub fn total_step(&self) -> usize {
        self.total_step
    }

    /// The current epoch.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// The current step within the epoch.
    pub fn cur_step(&self) -> usize {
        self.cur_step
    }

    /// The number of model rollouts.
    pub fn n_rollouts(&self) -> usize {
        self.n_rollouts
    }

    /// The number of agent updates.
    pub fn n_updates(&self) -> usize {
        self.n_updates
    }

    /// The number of checkpoints saved.
    pub fn n_checkpoints(&self) -> usize {
        self.n_checkpoints
    }

    /// Evaluation results with their epochs.
    pub fn evals(&self) -> &[(usize, EvalRecord)] {
        &self.evals
    }

    /// Path of the checkpoint taken after `epoch`, if checkpoints are enabled.
    pub fn checkpoint_path(&self, epoch: usize) -> Option<PathBuf> {
        self.checkpoint_dir
            .as_ref()
            .map(|d| d.join(format!("{}-epoch{}", self.run_name, epoch + 1)))
    }

    fn phase(&self, phase: Phase) -> PhaseError {
        PhaseError {
            phase,
            epoch: self.epoch,
            step: self.cur_step,
        }
    }

    fn sample_batch(
        &self,
        real_pool: &mut TransitionPool,
        model_pool: &mut TransitionPool,
    ) -> Result<MixedBatch> {
        let (n_real, n_model) = self.config.batch_split();
        let real = real_pool.sample(n_real)?;
        let model = match n_model {
            0 => None,
            n => Some(model_pool.sample(n)?),
        };

        Ok(MixedBatch {
            real,
            model,
            real_ratio: self.config.real_ratio,
        })
    }

    /// Performs the agent updates of a step and returns the number of updates.
    fn train_policy_repeats(
        &mut self,
        agent: &mut dyn Agent,
        real_pool: &mut TransitionPool,
        model_pool: &mut TransitionPool,
        recorder: &mut dyn AggregateRecorder,
        epoch_updates: usize,
    ) -> Result<usize> {
        if self.total_step % self.config.train_every_n_steps > 0 {
            return Ok(0);
        }
        let cap = self.config.max_train_repeat_per_step * (self.cur_step + 1);
        let n = self
            .config
            .updates_per_step()
            .min(cap.saturating_sub(epoch_updates));

        for _ in 0..n {
            let batch = self.sample_batch(real_pool, model_pool)?;
            let record = agent.update(batch)?;
            self.n_updates += 1;
            recorder.store(record);
        }

        Ok(n)
    }

    fn rollout_step(
        &mut self,
        agent: &mut dyn Agent,
        dynamics: Option<&mut (dyn DynamicsModel + '_)>,
        real_pool: &mut TransitionPool,
        model_pool: &mut TransitionPool,
        recorder: &mut dyn AggregateRecorder,
    ) -> Result<()> {
        if self.config.algorithm.is_model_free() {
            return Err(MbrlError::Configuration(format!(
                "rollout triggered for the model-free algorithm {}",
                self.config.algorithm
            ))
            .into());
        }
        let dynamics = dynamics.ok_or_else(|| {
            MbrlError::Configuration("model-based training requires a dynamics model".into())
        })?;

        let record = self.rollout.rollout(agent, dynamics, real_pool, model_pool)?;
        self.n_rollouts += 1;
        recorder.store(record);
        Ok(())
    }

    fn save_model(&mut self, agent: &dyn Agent) -> Result<()> {
        if let Some(path) = self.checkpoint_path(self.epoch) {
            agent.save_params(&path)?;
            self.n_checkpoints += 1;
            info!("Saved the model in {:?}", &path);
        }
        Ok(())
    }

    fn evaluate(
        &mut self,
        agent: &mut dyn Agent,
        evaluator: &mut dyn Evaluator,
        recorder: &mut dyn AggregateRecorder,
    ) -> Result<()> {
        agent.eval();
        let eval = evaluator.evaluate(agent);
        agent.train();
        let eval = eval?;

        info!("{}", eval.log_line(self.epoch));
        let mut record = eval.to_record();
        record.insert("epoch", Scalar(self.epoch as f32));
        recorder.write(record);
        self.evals.push((self.epoch, eval));
        Ok(())
    }

    /// Trains the agent.
    ///
    /// `dynamics` may be `None` only when minibatches contain real transitions alone.
    #[allow(clippy::too_many_arguments)]
    pub fn train(
        &mut self,
        agent: &mut dyn Agent,
        mut dynamics: Option<&mut dyn DynamicsModel>,
        real_pool: &mut TransitionPool,
        model_pool: &mut TransitionPool,
        evaluator: &mut dyn Evaluator,
        recorder: &mut dyn AggregateRecorder,
    ) -> Result<()> {
        let uses_model = self.config.uses_model();
        info!(
            "Start training {} for {} epochs, real pool size {}",
            self.config.algorithm,
            self.config.num_epoch,
            real_pool.len()
        );
        agent.train();

        if uses_model && !self.config.model_pretrained {
            let ctx = self.phase(Phase::Fit);
            let record = match dynamics.as_deref_mut() {
                Some(d) => d.fit(real_pool),
                None => Err(MbrlError::Configuration(
                    "model-based training requires a dynamics model".into(),
                )
                .into()),
            }
            .with_context(|| ctx)?;
            info!("Fitted the dynamics model");
            recorder.write(record);
        }

        let save_interval = self.config.save_interval();
        let eval_interval = self.config.eval_interval();

        for epoch in 0..self.config.num_epoch {
            self.epoch = epoch;
            let mut epoch_updates = 0;

            for cur_step in 0..self.config.epoch_length {
                self.cur_step = cur_step;

                if cur_step % self.config.model_train_freq == 0 && uses_model {
                    let ctx = self.phase(Phase::Rollout);
                    self.rollout_step(
                        agent,
                        dynamics.as_deref_mut(),
                        real_pool,
                        model_pool,
                        recorder,
                    )
                    .with_context(|| ctx)?;
                }

                let ctx = self.phase(Phase::Train);
                epoch_updates += self
                    .train_policy_repeats(agent, real_pool, model_pool, recorder, epoch_updates)
                    .with_context(|| ctx)?;
                self.total_step += 1;
            }
            debug!("Epoch {}: {} updates", epoch, epoch_updates);

            let mut record = Record::empty();
            record.insert("real_pool_size", Scalar(real_pool.len() as f32));
            record.insert("model_pool_size", Scalar(model_pool.len() as f32));
            recorder.store(record);
            recorder.flush(epoch as i64);

            if (epoch + 1) % save_interval == 0 {
                let ctx = self.phase(Phase::Checkpoint);
                self.save_model(agent).with_context(|| ctx)?;
            }

            if epoch % eval_interval == 0 {
                let ctx = self.phase(Phase::Evaluate);
                self.evaluate(agent, evaluator, recorder)
                    .with_context(|| ctx)?;
            }
        }

        Ok(())
    }
}
