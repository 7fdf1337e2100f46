use rand::SeedableRng;
use rand_chacha::ChaChaRng;
use safa::config::{known_best, InstanceParameters, ParameterOverrides};
use safa::data::Instance;
use safa::graph::Schedule;
use safa::parser::parse_instance;
use safa::solver::registry::{BestSolutionRegistry, Strategy};
use safa::solver::safa::{BeaconPolicy, Config, HybridMode, Orchestrator};
use safa::solver::{calculate_cmax, firefly, local_search, verify_solution, CandidateMode};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const FT06: &str = include_str!("../instances/ft06.txt");

fn ft06() -> Instance {
  return parse_instance(FT06).unwrap();
}

fn small_config(seed: u64) -> Config {
  let overrides = ParameterOverrides {
    population: Some(8),
    start_temperature: Some(100.0),
    cooling_rate: Some(0.1),
    ..Default::default()
  };
  let params = InstanceParameters::resolve(Some("ft06"), &overrides).unwrap();
  let mut config = Config::from_parameters(&params, 3, seed);
  config.poll_interval = Duration::from_millis(5);
  return config;
}

#[test]
fn local_search_improves_a_random_ft06_start() {
  let inst = ft06();
  let mut rng = ChaChaRng::seed_from_u64(2020);
  let mut schedule = Schedule::random(&inst, &mut rng).unwrap();
  let config = local_search::Config {
    max_iterations: 10_000,
    mode: CandidateMode::Random,
  };

  let outcome = local_search::improve_schedule(&mut schedule, &config, &mut rng);

  assert!(outcome.local_optimum);
  assert!(outcome.makespan < outcome.start_makespan);
  assert!(outcome.makespan >= known_best("ft06").unwrap());
}

#[test]
fn firefly_between_identical_schedules_does_not_move() {
  let inst = ft06();
  let mut rng = ChaChaRng::seed_from_u64(7);
  let beacon = Schedule::random(&inst, &mut rng).unwrap();
  let mut schedule = beacon.clone();

  assert!(!firefly::move_towards(&mut schedule, &beacon));
}

#[test]
fn racing_publishers_keep_the_global_minimum() {
  let inst = ft06();
  let registry = Arc::new(BestSolutionRegistry::new());
  let mut rng = ChaChaRng::seed_from_u64(99);
  let mut schedules: Vec<Schedule> = (0..32).map(|_| Schedule::random(&inst, &mut rng).unwrap()).collect();
  schedules.sort_by_key(|s| std::cmp::Reverse(s.makespan()));
  let minimum = schedules.last().unwrap().makespan();

  let handles: Vec<_> = (0..4)
    .map(|t| {
      let registry = Arc::clone(&registry);
      let mine: Vec<Schedule> = schedules.iter().skip(t).step_by(4).cloned().collect();
      thread::spawn(move || {
        for schedule in &mine {
          registry.publish(schedule, Strategy::SimulatedAnnealing);
        }
      })
    })
    .collect();
  for handle in handles {
    handle.join().unwrap();
  }

  assert_eq!(registry.best().unwrap().makespan(), minimum);
}

#[test]
fn trials_produce_valid_schedules() {
  let inst = ft06();
  let orchestrator = Orchestrator::new(small_config(1)).unwrap();

  let summary = orchestrator.run(&inst, 2).unwrap();

  assert_eq!(summary.trials.len(), 2);
  for trial in &summary.trials {
    let solution = trial.best.to_solution();
    verify_solution(&inst, &solution).unwrap();
    assert_eq!(calculate_cmax(&inst, &solution), trial.makespan());
    assert!(trial.makespan() <= trial.local_search_makespan);
    assert!(trial.makespan() >= 55);
    assert!(trial.update_count(Strategy::LocalSearch) >= 1);
    assert!(trial.hybrid.is_some());
  }
  assert!(summary.best().unwrap().makespan() >= 55);
}

#[test]
fn threaded_backbone_trial_produces_a_valid_schedule() {
  let inst = ft06();
  let mut config = small_config(2);
  config.hybrid.mode = HybridMode::Threaded;
  config.hybrid.beacon = BeaconPolicy::Backbone;
  config.annealing.mode = CandidateMode::MostContended;
  let orchestrator = Orchestrator::new(config).unwrap();
  let mut rng = ChaChaRng::seed_from_u64(2);

  let trial = orchestrator.run_trial(&inst, &mut rng).unwrap();

  let solution = trial.best.to_solution();
  verify_solution(&inst, &solution).unwrap();
  assert_eq!(calculate_cmax(&inst, &solution), trial.makespan());
  assert!(trial.hybrid.is_none());
  assert_eq!(orchestrator.registry().best().unwrap().makespan(), trial.makespan());
}

#[test]
fn malformed_instances_fail_before_solving() {
  let result = parse_instance("2\t2\n0\t3\t0\t2\n0\t2\t1\t4\n");

  assert!(result.is_err());
}
