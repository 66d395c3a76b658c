use anyhow::Result;
use clap::Parser;
use mbrl::{
    env::{FlowMerge, FlowMergeConfig, RiskyPointMass, RiskyPointMassConfig},
    ref_scores::reference_scores,
    run_name::RunName,
};
use mbrl_candle_agent::{
    build_agent,
    codac::DistPenalty,
    ensemble::{ProbEnsemble, ProbEnsembleConfig, TerminationFn},
    sac::EntCoefMode,
    util::RiskType,
    AgentConfig, Device,
};
use mbrl_core::{
    exploration_before_start,
    record::{AggregateRecorder, NullRecorder},
    Agent, Algorithm, Dataset, DefaultEvaluator, DefaultEvaluatorConfig, DynamicsModel, Env,
    EnvSampler, MbrlError, RolloutConfig, ScoreNormalizer, Trainer, TrainerConfig,
    TransitionPool, TransitionPoolConfig,
};
use mbrl_tensorboard::TensorboardRecorder;
use std::path::PathBuf;

/// Entropy coefficient when it is not tuned.
const FIXED_ENT_COEF: f64 = 0.2;

/// Train an agent on an offline dataset, optionally with model rollouts
#[derive(Clone, Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Environment, "riskymass" or "flowmerge".
    #[arg(long, default_value = "riskymass")]
    env: String,

    /// Algorithm: sac, cql, codac, mopo, combo or dsac.
    #[arg(long, default_value = "codac")]
    algo: String,

    /// Conservative penalty of the distributional critic, "uniform" or "none".
    #[arg(long, default_value = "uniform")]
    dist_penalty_type: String,

    /// Tune the entropy coefficient.
    #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
    entropy: bool,

    /// Threshold of the Lagrange multiplier of the conservative penalty.
    /// Non-positive values disable the multiplier.
    #[arg(long, default_value_t = 10.0)]
    lag: f64,

    /// Weight of the conservative penalty.
    #[arg(long, default_value_t = 10.0)]
    min_z_weight: f64,

    /// Learning rate of the actor.
    #[arg(long, default_value_t = 3e-5)]
    actor_lr: f64,

    /// Risk measure: neutral, cvar or wang.
    #[arg(long, default_value = "neutral")]
    risk_type: String,

    /// Parameter of the risk measure.
    #[arg(long, default_value_t = 0.1)]
    risk_param: f64,

    /// Probability of the penalty in the risky region of riskymass.
    #[arg(long, default_value_t = 0.8)]
    risk_prob: f32,

    /// Penalty in the risky region of riskymass.
    #[arg(long, default_value_t = 200.0)]
    risk_penalty: f32,

    /// Weight of the uncertainty penalty on model rewards.
    #[arg(long, default_value_t = 1.0)]
    penalty: f32,

    /// Model steps of a rollout.
    #[arg(long, default_value_t = 1)]
    rollout_length: usize,

    /// Random seed.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Upper bound of the real pool capacity when no dataset is given.
    /// A dataset sizes the pool to its transitions.
    #[arg(long, default_value_t = 2000000)]
    replay_size: usize,

    /// Epochs worth of rollouts kept in the model pool.
    #[arg(long, default_value_t = 5)]
    model_retain_epochs: usize,

    /// Interval of model rollouts in steps.
    #[arg(long, default_value_t = 1000)]
    model_train_freq: usize,

    /// Trajectories started in a rollout.
    #[arg(long, default_value_t = 50000)]
    rollout_batch_size: usize,

    /// Steps in an epoch. Defaults to 100 for riskymass and 1000 otherwise.
    #[arg(long)]
    epoch_length: Option<usize>,

    /// The number of epochs. Defaults to 100 for riskymass and 1000 otherwise.
    #[arg(long)]
    num_epoch: Option<usize>,

    /// Fraction of real transitions in a minibatch.
    /// Forced to 1 for sac, cql and codac.
    #[arg(long, default_value_t = 0.05)]
    real_ratio: f32,

    /// Exploration steps filling the real pool when no dataset is given.
    #[arg(long, default_value_t = 5000)]
    init_exploration_steps: usize,

    /// Interval of agent updates in steps.
    #[arg(long, default_value_t = 1)]
    train_every_n_steps: usize,

    /// Agent updates per step.
    #[arg(long, default_value_t = 1)]
    num_train_repeat: usize,

    /// Episodes of an evaluation. Defaults to 100 for riskymass and 1 otherwise.
    #[arg(long)]
    eval_n_episodes: Option<usize>,

    /// Upper bound of agent updates per step.
    #[arg(long, default_value_t = 5)]
    max_train_repeat_per_step: usize,

    /// Size of a minibatch.
    #[arg(long, default_value_t = 256)]
    policy_train_batch_size: usize,

    /// Offline dataset, a JSON or bincode file.
    #[arg(long)]
    dataset: Option<PathBuf>,

    /// Directory of a fitted dynamics ensemble. Skips fitting if given.
    #[arg(long)]
    pretrained: Option<PathBuf>,

    /// Root directory of checkpoints.
    #[arg(long)]
    model_dir: Option<String>,

    /// Root directory of TensorBoard logs.
    #[arg(long)]
    tensorboard: Option<PathBuf>,

    /// YAML file of a trainer configuration, used in place of the options above.
    #[arg(long)]
    config: Option<PathBuf>,

    /// YAML file of an agent configuration.
    #[arg(long)]
    agent_config: Option<PathBuf>,

    /// Device, "cpu" or "cuda:N".
    #[arg(long, default_value = "cpu")]
    device: String,
}

impl Args {
    fn is_risk_env(&self) -> bool {
        self.env == "riskymass"
    }

    fn algorithm(&self) -> Result<Algorithm> {
        Ok(self.algo.parse()?)
    }

    fn device(&self) -> Result<Device> {
        match self.device.as_str() {
            "cpu" => Ok(Device::Cpu),
            s => s
                .strip_prefix("cuda:")
                .and_then(|n| n.parse().ok())
                .map(Device::Cuda)
                .ok_or_else(|| MbrlError::Configuration(format!("unknown device: {}", s)).into()),
        }
    }

    fn dist_penalty(&self) -> Result<DistPenalty> {
        match self.dist_penalty_type.as_str() {
            "uniform" => Ok(DistPenalty::Uniform),
            "none" => Ok(DistPenalty::Disabled),
            s => Err(MbrlError::Configuration(format!("unknown dist_penalty_type: {}", s)).into()),
        }
    }

    fn lagrange_thresh(&self) -> Option<f64> {
        (self.lag > 0.0).then_some(self.lag)
    }

    /// Name of the dataset in checkpoint paths.
    fn dataset_name(&self) -> String {
        self.dataset
            .as_ref()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "online".to_string())
    }

    fn run_name(&self) -> Result<RunName> {
        let algorithm = self.algorithm()?;
        let dist_penalty = match algorithm {
            Algorithm::Cql => "none".to_string(),
            _ => self.dist_penalty_type.clone(),
        };
        Ok(RunName {
            env: self.env.clone(),
            algorithm,
            dist_penalty,
            risk_type: self.risk_type.clone(),
            risk_param: self.risk_param,
            min_z_weight: self.min_z_weight,
            lag: self.lag,
            entropy: self.entropy,
            risk_prob: self.risk_prob,
            risk_penalty: self.risk_penalty,
            seed: self.seed,
        })
    }

    fn normalizer(&self) -> Option<ScoreNormalizer> {
        reference_scores(&self.dataset_name()).or_else(|| reference_scores(&self.env))
    }
}

fn create_trainer_config(args: &Args) -> Result<TrainerConfig> {
    let algorithm = args.algorithm()?;
    let config = match &args.config {
        Some(path) => TrainerConfig::load(path)?.algorithm(algorithm),
        None => {
            let (epoch_length, num_epoch) = match args.is_risk_env() {
                true => (100, 100),
                false => (1000, 1000),
            };
            let rollout = RolloutConfig::default()
                .rollout_length(args.rollout_length)
                .rollout_batch_size(args.rollout_batch_size)
                .model_retain_epochs(args.model_retain_epochs);
            let config = TrainerConfig::default()
                .algorithm(algorithm)
                .num_epoch(args.num_epoch.unwrap_or(num_epoch))
                .epoch_length(args.epoch_length.unwrap_or(epoch_length))
                .model_train_freq(args.model_train_freq)
                .real_ratio(args.real_ratio)
                .train_every_n_steps(args.train_every_n_steps)
                .num_train_repeat(args.num_train_repeat)
                .max_train_repeat_per_step(args.max_train_repeat_per_step)
                .policy_train_batch_size(args.policy_train_batch_size)
                .model_pretrained(args.pretrained.is_some())
                .rollout(rollout);
            match &args.model_dir {
                Some(dir) => config.model_dir(dir.as_str()),
                None => config,
            }
        }
    };

    if algorithm.is_model_free() && config.real_ratio != 1.0 {
        log::info!("{} is model-free, real_ratio is set to 1.0", algorithm);
        return Ok(config.real_ratio(1.0));
    }
    Ok(config)
}

fn create_agent_config(args: &Args) -> Result<AgentConfig> {
    let algorithm = args.algorithm()?;
    let mut config = match &args.agent_config {
        Some(path) => return AgentConfig::load(path),
        None => AgentConfig::default_for(algorithm),
    };

    match &mut config {
        AgentConfig::Sac(_) => {}
        AgentConfig::Cql(cql) => {
            cql.min_q_weight = args.min_z_weight;
            cql.lagrange_thresh = args.lagrange_thresh();
        }
        AgentConfig::Codac(codac) => {
            codac.risk = RiskType::from_name(&args.risk_type, args.risk_param)?;
            codac.dist_penalty = args.dist_penalty()?;
            codac.min_z_weight = args.min_z_weight;
            codac.lagrange_thresh = args.lagrange_thresh();
        }
    }

    let sac = config.sac_config_mut();
    sac.actor_config.opt_config = sac.actor_config.opt_config.clone().learning_rate(args.actor_lr);
    sac.device = Some(args.device()?);
    // The target entropy is set from the action dimension when the agent is built
    sac.ent_coef_mode = match args.entropy {
        true => EntCoefMode::Auto(-1.0, 3e-4),
        false => EntCoefMode::Fix(FIXED_ENT_COEF),
    };
    Ok(config)
}

fn create_agent(args: &Args, obs_dim: usize, act_dim: usize) -> Result<Box<dyn Agent>> {
    log::info!("Create agent");
    let config = create_agent_config(args)?;
    build_agent(args.algorithm()?, config, obs_dim, act_dim)
}

fn create_ensemble(
    args: &Args,
    termination: TerminationFn,
    obs_dim: usize,
    act_dim: usize,
) -> Result<ProbEnsemble> {
    log::info!("Create dynamics ensemble");
    let config = ProbEnsembleConfig::default()
        .penalty(args.penalty)
        .seed(args.seed)
        .termination(termination)
        .device(args.device()?);
    let mut ensemble = ProbEnsemble::build(config, obs_dim, act_dim)?;
    if let Some(path) = &args.pretrained {
        ensemble.load_params(path)?;
        log::info!("Loaded the dynamics ensemble from {:?}", path);
    }
    Ok(ensemble)
}

fn create_real_pool<E: Env>(
    args: &Args,
    env_config: &E::Config,
    agent: &mut dyn Agent,
    max_path_length: usize,
    obs_dim: usize,
    act_dim: usize,
) -> Result<TransitionPool> {
    log::info!("Create real pool");
    let config = TransitionPoolConfig::default()
        .name("real")
        .dims(obs_dim, act_dim)
        .seed(args.seed);

    match &args.dataset {
        Some(path) => Dataset::load(path)?.to_pool(&config),
        None => {
            let n_steps = args.init_exploration_steps;
            let config = config.capacity(n_steps.min(args.replay_size));
            let mut pool = TransitionPool::build(&config)?;
            let env = E::build(env_config, args.seed as i64)?;
            let mut sampler = EnvSampler::new(env, max_path_length);
            exploration_before_start(&mut sampler, &mut pool, agent, n_steps)?;
            Ok(pool)
        }
    }
}

fn create_model_pool(
    args: &Args,
    config: &TrainerConfig,
    obs_dim: usize,
    act_dim: usize,
) -> Result<TransitionPool> {
    log::info!("Create model pool");
    let capacity = match config.uses_model() {
        true => config.model_pool_capacity(),
        false => 1,
    };
    let config = TransitionPoolConfig::default()
        .name("model")
        .capacity(capacity)
        .dims(obs_dim, act_dim)
        .seed(args.seed.wrapping_add(1));
    TransitionPool::build(&config)
}

fn create_evaluator<E: Env>(
    args: &Args,
    env_config: &E::Config,
    config: &TrainerConfig,
) -> Result<DefaultEvaluator<E>> {
    log::info!("Create evaluator");
    let n_episodes = args
        .eval_n_episodes
        .unwrap_or(if args.is_risk_env() { 100 } else { 1 });
    let config = DefaultEvaluatorConfig::default()
        .n_episodes(n_episodes)
        .horizon(config.epoch_length)
        .seed(args.seed)
        .normalizer(args.normalizer());
    DefaultEvaluator::new(&config, env_config)
}

fn create_recorder(args: &Args, run_name: &str) -> Box<dyn AggregateRecorder> {
    log::info!("Create recorder");
    match &args.tensorboard {
        Some(dir) => {
            let logdir = dir.join(&args.env).join(args.dataset_name()).join(run_name);
            Box::new(TensorboardRecorder::new(logdir))
        }
        None => Box::new(NullRecorder::new()),
    }
}

fn train<E: Env>(args: &Args, env_config: E::Config, termination: TerminationFn) -> Result<()> {
    let (obs_dim, act_dim) = {
        let env = E::build(&env_config, args.seed as i64)?;
        (env.observation_space().dim(), env.action_space().dim())
    };
    let run_name = args.run_name()?.format();
    log::info!("Run {}", run_name);

    let config = create_trainer_config(args)?;
    let mut agent = create_agent(args, obs_dim, act_dim)?;
    let mut ensemble = match config.uses_model() {
        true => Some(create_ensemble(args, termination, obs_dim, act_dim)?),
        false => None,
    };
    let mut real_pool = create_real_pool::<E>(
        args,
        &env_config,
        agent.as_mut(),
        config.epoch_length,
        obs_dim,
        act_dim,
    )?;
    let mut model_pool = create_model_pool(args, &config, obs_dim, act_dim)?;
    let mut evaluator = create_evaluator::<E>(args, &env_config, &config)?;
    let mut recorder = create_recorder(args, &run_name);

    let mut trainer =
        Trainer::build(config)?.run_id(&args.env, args.dataset_name(), run_name.as_str());
    trainer.train(
        agent.as_mut(),
        ensemble.as_mut().map(|e| e as &mut dyn DynamicsModel),
        &mut real_pool,
        &mut model_pool,
        &mut evaluator,
        recorder.as_mut(),
    )?;

    if let (Some(ensemble), Some(dir)) = (&ensemble, trainer.checkpoint_path(0)) {
        let path = dir.with_file_name(format!("{}-ensemble", run_name));
        ensemble.save_params(&path)?;
        log::info!("Saved the dynamics ensemble in {:?}", path);
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.env.as_str() {
        "riskymass" => {
            let config = RiskyPointMassConfig::default().risk(args.risk_prob, args.risk_penalty);
            let termination = TerminationFn::GoalRegion {
                center: config.goal.to_vec(),
                radius: config.goal_radius,
            };
            train::<RiskyPointMass>(&args, config, termination)
        }
        "flowmerge" => {
            train::<FlowMerge>(&args, FlowMergeConfig::default(), TerminationFn::Never)
        }
        s => Err(MbrlError::Configuration(format!("unknown environment: {}", s)).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbrl_core::dummy::DummyAgent;
    use tempdir::TempDir;

    fn args(extra: &[&str]) -> Args {
        Args::parse_from(["train_offline"].iter().chain(extra))
    }

    fn real_pool(args: &Args) -> Result<TransitionPool> {
        let mut agent = DummyAgent::new(2, 2);
        let env_config = RiskyPointMassConfig::default();
        create_real_pool::<RiskyPointMass>(args, &env_config, &mut agent, 100, 2, 2)
    }

    #[test]
    fn test_real_pool_sized_by_dataset() -> Result<()> {
        let dir = TempDir::new("train_offline")?;
        let path = dir.path().join("riskymass.json");
        let mut env = RiskyPointMass::build(&RiskyPointMassConfig::default(), 0)?;
        Dataset::collect(&mut env, 30, 0)?.save(&path)?;

        let path = path.to_str().unwrap_or_default();
        let args = args(&["--dataset", path, "--replay-size", "10"]);
        let pool = real_pool(&args)?;
        assert_eq!(pool.capacity(), 30);
        assert_eq!(pool.len(), 30);
        Ok(())
    }

    #[test]
    fn test_empty_dataset_is_rejected() -> Result<()> {
        let dir = TempDir::new("train_offline")?;
        let path = dir.path().join("empty.json");
        Dataset::default().save(&path)?;

        let args = args(&["--dataset", path.to_str().unwrap_or_default()]);
        let res = real_pool(&args);
        assert!(matches!(
            res.err().as_ref().and_then(|e| e.downcast_ref::<MbrlError>()),
            Some(MbrlError::Dataset(_))
        ));
        Ok(())
    }

    #[test]
    fn test_real_pool_sized_by_exploration_steps() -> Result<()> {
        let pool = real_pool(&args(&["--init-exploration-steps", "20"]))?;
        assert_eq!(pool.capacity(), 20);
        assert_eq!(pool.len(), 20);
        Ok(())
    }

    #[test]
    fn test_evaluator_horizon_is_epoch_length() -> Result<()> {
        let args = args(&["--env", "flowmerge", "--algo", "sac", "--epoch-length", "250"]);
        let config = create_trainer_config(&args)?;
        let evaluator = create_evaluator::<FlowMerge>(&args, &FlowMergeConfig::default(), &config)?;
        assert_eq!(evaluator.config().horizon, 250);

        // Riskymass runs default to epochs of 100 steps
        let args = self::args(&["--algo", "sac"]);
        let config = create_trainer_config(&args)?;
        let evaluator =
            create_evaluator::<RiskyPointMass>(&args, &RiskyPointMassConfig::default(), &config)?;
        assert_eq!(evaluator.config().horizon, 100);
        Ok(())
    }
}
