use anyhow::Result;
use mbrl_core::{
    dummy::{DummyAgent, DummyDynamics, DummyEnv, DummyEnvConfig},
    record::BufferedRecorder,
    Agent, Algorithm, DefaultEvaluator, DefaultEvaluatorConfig, DynamicsModel, MbrlError, Phase,
    PhaseError, RolloutConfig, Trainer, TrainerConfig, Transition, TransitionPool,
    TransitionPoolConfig,
};
use tempdir::TempDir;

fn real_pool(n: usize) -> TransitionPool {
    let config = TransitionPoolConfig::default().capacity(100).dims(1, 1);
    let mut pool = TransitionPool::build(&config).unwrap();
    for i in 0..n {
        let s = i as f32;
        pool.push(Transition::new(vec![s], vec![0.0], 1.0, vec![s + 1.0], false))
            .unwrap();
    }
    pool
}

fn model_pool(capacity: usize) -> TransitionPool {
    let config = TransitionPoolConfig::default()
        .name("model")
        .capacity(capacity)
        .dims(1, 1);
    TransitionPool::build(&config).unwrap()
}

fn evaluator() -> DefaultEvaluator<DummyEnv> {
    let config = DefaultEvaluatorConfig::default().n_episodes(2).horizon(5);
    DefaultEvaluator::new(&config, &DummyEnvConfig::default()).unwrap()
}

fn model_based(epoch_length: usize, num_epoch: usize) -> TrainerConfig {
    TrainerConfig::default()
        .algorithm(Algorithm::Mopo)
        .real_ratio(0.25)
        .num_epoch(num_epoch)
        .epoch_length(epoch_length)
        .model_train_freq(epoch_length)
        .policy_train_batch_size(8)
        .rollout(RolloutConfig::default().rollout_length(1).rollout_batch_size(4))
}

fn phase_of(err: &anyhow::Error) -> Option<PhaseError> {
    err.downcast_ref::<PhaseError>().copied()
}

#[test]
fn test_one_rollout_per_epoch() -> Result<()> {
    let config = model_based(1000, 3);
    let mut trainer = Trainer::build(config.clone())?;
    let mut agent = DummyAgent::new(1, 1);
    let mut dynamics = DummyDynamics::new(1);
    let (mut real, mut model) = (real_pool(10), model_pool(config.model_pool_capacity()));

    trainer.train(
        &mut agent,
        Some(&mut dynamics as &mut dyn DynamicsModel),
        &mut real,
        &mut model,
        &mut evaluator(),
        &mut BufferedRecorder::new(),
    )?;

    assert_eq!(trainer.n_rollouts(), 3);
    assert_eq!(dynamics.counters().borrow().n_predict, 3);
    assert_eq!(dynamics.counters().borrow().n_fit, 1);
    assert_eq!(trainer.total_step(), 3000);
    assert_eq!(model.len(), 12);
    Ok(())
}

#[test]
fn test_rollout_cadence_within_epoch() -> Result<()> {
    let config = model_based(10, 2).model_train_freq(4);
    let mut trainer = Trainer::build(config)?;
    let mut dynamics = DummyDynamics::new(1);
    trainer.train(
        &mut DummyAgent::new(1, 1),
        Some(&mut dynamics as &mut dyn DynamicsModel),
        &mut real_pool(10),
        &mut model_pool(1000),
        &mut evaluator(),
        &mut BufferedRecorder::new(),
    )?;

    // cur_step = 0, 4, 8 in each epoch
    assert_eq!(trainer.n_rollouts(), 6);
    Ok(())
}

#[test]
fn test_model_free_run_never_touches_model_pool() -> Result<()> {
    let config = TrainerConfig::default()
        .algorithm(Algorithm::Sac)
        .real_ratio(1.0)
        .num_epoch(3)
        .epoch_length(50)
        .model_train_freq(10)
        .policy_train_batch_size(16);
    let mut trainer = Trainer::build(config)?;
    let mut agent = DummyAgent::new(1, 1);
    let counters = agent.counters();
    let mut model = model_pool(100);

    trainer.train(
        &mut agent,
        None,
        &mut real_pool(10),
        &mut model,
        &mut evaluator(),
        &mut BufferedRecorder::new(),
    )?;

    assert_eq!(trainer.n_rollouts(), 0);
    assert!(model.is_empty());
    let counters = counters.borrow();
    assert_eq!(counters.n_updates, 150);
    assert!(counters.real_sizes.iter().all(|&n| n == 16));
    assert!(counters.model_sizes.iter().all(|&n| n == 0));
    Ok(())
}

#[test]
fn test_mixed_batch_split() -> Result<()> {
    let config = model_based(5, 1);
    let mut trainer = Trainer::build(config)?;
    let mut agent = DummyAgent::new(1, 1);
    let mut dynamics = DummyDynamics::new(1);
    trainer.train(
        &mut agent,
        Some(&mut dynamics as &mut dyn DynamicsModel),
        &mut real_pool(10),
        &mut model_pool(100),
        &mut evaluator(),
        &mut BufferedRecorder::new(),
    )?;

    let counters = agent.counters();
    let counters = counters.borrow();
    assert_eq!(counters.n_updates, 5);
    assert!(counters.real_sizes.iter().all(|&n| n == 2));
    assert!(counters.model_sizes.iter().all(|&n| n == 6));
    Ok(())
}

#[test]
fn test_update_cadence() -> Result<()> {
    let config = TrainerConfig::default()
        .algorithm(Algorithm::Cql)
        .real_ratio(1.0)
        .num_epoch(2)
        .epoch_length(10)
        .train_every_n_steps(2)
        .num_train_repeat(3)
        .max_train_repeat_per_step(2)
        .policy_train_batch_size(4);
    let mut trainer = Trainer::build(config)?;
    trainer.train(
        &mut DummyAgent::new(1, 1),
        None,
        &mut real_pool(10),
        &mut model_pool(10),
        &mut evaluator(),
        &mut BufferedRecorder::new(),
    )?;

    // 5 update steps per epoch, 2 updates each
    assert_eq!(trainer.n_updates(), 20);
    Ok(())
}

#[test]
fn test_fit_skipped_for_pretrained_model() -> Result<()> {
    let config = model_based(4, 1).model_pretrained(true);
    let mut trainer = Trainer::build(config)?;
    let mut dynamics = DummyDynamics::new(1);
    trainer.train(
        &mut DummyAgent::new(1, 1),
        Some(&mut dynamics as &mut dyn DynamicsModel),
        &mut real_pool(10),
        &mut model_pool(100),
        &mut evaluator(),
        &mut BufferedRecorder::new(),
    )?;
    assert_eq!(dynamics.counters().borrow().n_fit, 0);
    assert_eq!(dynamics.counters().borrow().n_predict, 1);
    Ok(())
}

#[test]
fn test_checkpoints_and_evaluations() -> Result<()> {
    let dir = TempDir::new("trainer")?;
    let config = TrainerConfig::default()
        .algorithm(Algorithm::Codac)
        .real_ratio(1.0)
        .num_epoch(4)
        .epoch_length(3)
        .policy_train_batch_size(4)
        .save_divisor(2)
        .eval_divisor(2)
        .model_dir(dir.path().to_string_lossy());
    let mut trainer = Trainer::build(config)?.run_id("dummy", "random", "offline-codac-0");
    let mut agent = DummyAgent::new(1, 1);
    let mut recorder = BufferedRecorder::new();
    trainer.train(
        &mut agent,
        None,
        &mut real_pool(10),
        &mut model_pool(10),
        &mut evaluator(),
        &mut recorder,
    )?;

    assert_eq!(trainer.n_checkpoints(), 2);
    for epoch in [2, 4] {
        let path = dir
            .path()
            .join("dummy")
            .join("random")
            .join(format!("offline-codac-0-epoch{}", epoch));
        assert!(path.join("dummy_agent.txt").exists());
    }

    let epochs: Vec<usize> = trainer.evals().iter().map(|(e, _)| *e).collect();
    assert_eq!(epochs, vec![0, 2]);
    assert_eq!(trainer.evals()[0].1.rewards, vec![5.0, 5.0]);
    assert!(agent.is_train());

    // 4 epoch aggregates and 2 evaluation records
    assert_eq!(recorder.len(), 6);
    let n_eval = recorder
        .iter()
        .filter(|r| r.get_scalar("eval_cvar").is_ok())
        .count();
    assert_eq!(n_eval, 2);
    let aggregate = recorder
        .iter()
        .find(|r| r.get_scalar("loss_mean").is_ok())
        .expect("aggregate of update records");
    assert!(aggregate.get_scalar("epoch").is_ok());
    Ok(())
}

#[test]
fn test_error_reports_phase() {
    let config = TrainerConfig::default()
        .algorithm(Algorithm::Sac)
        .real_ratio(1.0)
        .num_epoch(3)
        .epoch_length(3)
        .policy_train_batch_size(4);
    let mut trainer = Trainer::build(config).unwrap();
    let mut agent = DummyAgent::new(1, 1).fail_at_update(5);
    let err = trainer
        .train(
            &mut agent,
            None,
            &mut real_pool(10),
            &mut model_pool(10),
            &mut evaluator(),
            &mut BufferedRecorder::new(),
        )
        .unwrap_err();

    assert_eq!(
        phase_of(&err),
        Some(PhaseError {
            phase: Phase::Train,
            epoch: 1,
            step: 1
        })
    );
    assert_eq!(err.root_cause().to_string(), "update 5 failed");
}

#[test]
fn test_empty_real_pool_is_fatal() {
    let config = TrainerConfig::default()
        .algorithm(Algorithm::Sac)
        .real_ratio(1.0)
        .num_epoch(1)
        .epoch_length(3);
    let mut trainer = Trainer::build(config).unwrap();
    let err = trainer
        .train(
            &mut DummyAgent::new(1, 1),
            None,
            &mut real_pool(0),
            &mut model_pool(10),
            &mut evaluator(),
            &mut BufferedRecorder::new(),
        )
        .unwrap_err();

    assert_eq!(phase_of(&err).map(|p| p.phase), Some(Phase::Train));
    assert!(matches!(
        err.downcast_ref::<MbrlError>(),
        Some(MbrlError::EmptyPool { .. })
    ));
    assert_eq!(trainer.n_updates(), 0);
}

#[test]
fn test_model_based_run_requires_dynamics() {
    let mut trainer = Trainer::build(model_based(3, 1)).unwrap();
    let err = trainer
        .train(
            &mut DummyAgent::new(1, 1),
            None,
            &mut real_pool(10),
            &mut model_pool(10),
            &mut evaluator(),
            &mut BufferedRecorder::new(),
        )
        .unwrap_err();
    assert_eq!(phase_of(&err).map(|p| p.phase), Some(Phase::Fit));
    assert!(matches!(
        err.downcast_ref::<MbrlError>(),
        Some(MbrlError::Configuration(_))
    ));
}

#[test]
fn test_model_free_with_model_data_is_rejected() {
    let config = TrainerConfig::default().algorithm(Algorithm::Sac).real_ratio(0.5);
    assert!(Trainer::build(config).is_err());
}
