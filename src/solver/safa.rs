//! Hybrid of firefly moves and simulated annealing over a population.
//!
//! A trial runs local search over a distinct random population, publishes a
//! beacon and then lets the population chase it. Every registry update
//! restarts simulated annealing on a private copy of the new best; the
//! driving thread dispatches those restarts until all workers are idle.

use crate::config::InstanceParameters;
use crate::data::Instance;
use crate::error::{Error, Result};
use crate::graph::Schedule;
use crate::solver::firefly;
use crate::solver::local_search;
use crate::solver::pool::WorkerPool;
use crate::solver::random_feasible_flip;
use crate::solver::registry::{BestSolutionRegistry, Strategy, Update};
use crate::solver::simulated_annealing;
use crate::solver::{CandidateMode, ImprovementPolicy};
use log::{debug, info, trace, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;
use std::collections::HashSet;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Attempts per requested schedule before population generation gives up.
const POPULATION_ATTEMPTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HybridMode {
  /// Round-robin over the population on a single worker.
  Rounds,
  /// One worker per schedule, each looping to its own convergence.
  Threaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconPolicy {
  /// The population member with the smallest makespan after local search.
  BestMakespan,
  /// The member sharing the most machine edges with the others.
  Backbone,
}

#[derive(Debug, Clone, Copy)]
pub struct HybridConfig {
  pub start_temperature: f64,
  pub cooling_rate: f64,
  pub min_temperature: f64,
  pub policy: ImprovementPolicy,
  pub beacon: BeaconPolicy,
  pub mode: HybridMode,
}

impl HybridConfig {
  /// Probability of exploring with a random flip instead of a firefly move.
  pub fn exploration_probability(&self, temperature: f64) -> f64 {
    return temperature / self.start_temperature;
  }
}

#[derive(Debug, Clone)]
pub struct Config {
  pub population: usize,
  pub workers: usize,
  pub seed: u64,
  pub local_search: local_search::Config,
  pub annealing: simulated_annealing::Config,
  pub hybrid: HybridConfig,
  /// Interval of the dispatcher's idle checks and the shutdown barrier.
  pub poll_interval: Duration,
}

impl Config {
  pub fn from_parameters(params: &InstanceParameters, workers: usize, seed: u64) -> Config {
    Config {
      population: params.population,
      workers: workers,
      seed: seed,
      local_search: local_search::Config {
        max_iterations: params.local_search_iterations,
        mode: CandidateMode::Random,
      },
      annealing: simulated_annealing::Config {
        start_temperature: params.start_temperature,
        cooling_rate: params.cooling_rate,
        min_temperature: 1.0,
        policy: ImprovementPolicy::StopOnImprovement,
        mode: CandidateMode::Random,
      },
      hybrid: HybridConfig {
        start_temperature: params.start_temperature,
        cooling_rate: params.cooling_rate,
        min_temperature: 1.0,
        policy: ImprovementPolicy::StopOnImprovement,
        beacon: BeaconPolicy::BestMakespan,
        mode: HybridMode::Rounds,
      },
      poll_interval: Duration::from_millis(50),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RoundOutcome {
  pub rounds: usize,
  pub firefly_moves: usize,
  pub random_moves: usize,
  /// Schedules dropped because they could not get closer to the beacon.
  pub converged: usize,
  pub published: usize,
  pub temperature: f64,
}

/// Runs hybrid rounds over `population` against the registry's best.
///
/// Each round draws, per schedule, between a random feasible flip (with the
/// temperature ratio as probability) and a firefly move towards the beacon.
/// Schedules that cannot approach the beacon any further are dropped, as are
/// schedules that publish a new best under
/// [`ImprovementPolicy::StopOnImprovement`]. Ends at the temperature floor,
/// after a round without moves or once the population is empty.
pub fn hybrid_round<R: Rng>(
  population: &mut Vec<Schedule>,
  registry: &BestSolutionRegistry,
  config: &HybridConfig,
  rng: &mut R,
) -> RoundOutcome {
  let mut outcome = RoundOutcome {
    temperature: config.start_temperature,
    ..Default::default()
  };
  let mut beacon = match registry.best() {
    Some(beacon) => beacon,
    None => return outcome,
  };
  population.retain(|schedule| *schedule != *beacon);

  let mut temperature = config.start_temperature;
  while temperature > config.min_temperature && !population.is_empty() {
    let probability = config.exploration_probability(temperature);
    if let Some(current) = registry.best() {
      beacon = current;
    }

    let mut moves = 0;
    let mut i = 0;
    while i < population.len() {
      let explore = probability > rng.gen::<f64>();
      let moved = if explore {
        random_feasible_flip(&mut population[i], rng).is_some()
      } else {
        firefly::move_towards(&mut population[i], &beacon)
      };

      if !moved {
        if !explore {
          trace!("Schedule {} cannot approach the beacon", i);
          outcome.converged += 1;
          population.remove(i);
          continue;
        }
        i += 1;
        continue;
      }

      moves += 1;
      if explore {
        outcome.random_moves += 1;
      } else {
        outcome.firefly_moves += 1;
      }

      let makespan = population[i].makespan();
      if registry.beats(makespan) && registry.publish(&population[i], Strategy::Firefly) {
        outcome.published += 1;
        if let Some(current) = registry.best() {
          beacon = current;
        }
        if config.policy == ImprovementPolicy::StopOnImprovement {
          population.remove(i);
          continue;
        }
      }
      i += 1;
    }

    outcome.rounds += 1;
    temperature *= 1.0 - config.cooling_rate;
    debug!(
      "Hybrid round {}: {} moves, {} schedules left, temperature {:.3}",
      outcome.rounds,
      moves,
      population.len(),
      temperature
    );
    if moves == 0 {
      break;
    }
  }

  outcome.temperature = temperature;
  return outcome;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChaseOutcome {
  pub moves: usize,
  pub published: usize,
  pub makespan: u32,
}

/// Moves a single schedule towards the registry's best until it converges,
/// cools down or (depending on the policy) publishes a new best.
pub fn chase_beacon<R: Rng>(
  schedule: &mut Schedule,
  registry: &BestSolutionRegistry,
  config: &HybridConfig,
  rng: &mut R,
) -> ChaseOutcome {
  let mut outcome = ChaseOutcome::default();
  let mut temperature = config.start_temperature;

  while temperature > config.min_temperature {
    let beacon = match registry.best() {
      Some(beacon) => beacon,
      None => break,
    };

    let explore = config.exploration_probability(temperature) > rng.gen::<f64>();
    if explore {
      if random_feasible_flip(schedule, rng).is_none() {
        break;
      }
    } else if !firefly::move_towards(schedule, &beacon) {
      break;
    }
    outcome.moves += 1;

    if registry.beats(schedule.makespan()) && registry.publish(schedule, Strategy::Firefly) {
      outcome.published += 1;
      if config.policy == ImprovementPolicy::StopOnImprovement {
        break;
      }
    }
    temperature *= 1.0 - config.cooling_rate;
  }

  outcome.makespan = schedule.makespan();
  return outcome;
}

/// Builds up to `size` structurally distinct random schedules.
pub fn generate_population<R: Rng>(inst: &Instance, size: usize, rng: &mut R) -> Result<Vec<Schedule>> {
  if size == 0 {
    return Err(Error::MissingParameters("population must not be empty".to_string()));
  }

  let mut seen = HashSet::with_capacity(size);
  let mut population = Vec::with_capacity(size);
  let mut attempts = 0;
  while population.len() < size && attempts < size * POPULATION_ATTEMPTS {
    attempts += 1;
    let candidate = Schedule::random(inst, rng)?;
    if seen.insert(candidate.clone()) {
      population.push(candidate);
    }
  }

  if population.len() < size {
    warn!(
      "Only found {} distinct schedules out of {} requested after {} attempts",
      population.len(),
      size,
      attempts
    );
  }

  return Ok(population);
}

#[derive(Debug, Clone)]
pub struct TrialOutcome {
  pub best: Arc<Schedule>,
  pub local_search_makespan: u32,
  pub updates: Vec<(Strategy, u64)>,
  pub hybrid: Option<RoundOutcome>,
  pub elapsed: Duration,
}

impl TrialOutcome {
  pub fn makespan(&self) -> u32 {
    return self.best.makespan();
  }

  pub fn update_count(&self, strategy: Strategy) -> u64 {
    return self
      .updates
      .iter()
      .find(|(s, _)| *s == strategy)
      .map(|&(_, count)| count)
      .unwrap_or(0);
  }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
  pub trials: Vec<TrialOutcome>,
}

impl RunSummary {
  pub fn best(&self) -> Option<&TrialOutcome> {
    return self.trials.iter().min_by_key(|trial| trial.makespan());
  }

  pub fn average_updates(&self, strategy: Strategy) -> f64 {
    if self.trials.is_empty() {
      return 0.0;
    }
    let total: u64 = self.trials.iter().map(|t| t.update_count(strategy)).sum();
    return total as f64 / self.trials.len() as f64;
  }

  pub fn average_elapsed(&self) -> Duration {
    if self.trials.is_empty() {
      return Duration::from_secs(0);
    }
    let total: Duration = self.trials.iter().map(|t| t.elapsed).sum();
    return total / self.trials.len() as u32;
  }
}

pub struct Orchestrator {
  registry: Arc<BestSolutionRegistry>,
  pool: Arc<WorkerPool>,
  config: Config,
}

impl Orchestrator {
  pub fn new(config: Config) -> Result<Orchestrator> {
    let pool = WorkerPool::new(config.workers)?;
    Ok(Orchestrator {
      registry: Arc::new(BestSolutionRegistry::new()),
      pool: Arc::new(pool),
      config: config,
    })
  }

  pub fn registry(&self) -> &Arc<BestSolutionRegistry> {
    return &self.registry;
  }

  pub fn config(&self) -> &Config {
    return &self.config;
  }

  /// Runs `trials` independent trials from the configured seed.
  pub fn run(&self, inst: &Instance, trials: usize) -> Result<RunSummary> {
    let mut rng = ChaChaRng::seed_from_u64(self.config.seed);
    let mut summary = RunSummary::default();

    for trial in 0..trials {
      let outcome = self.run_trial(inst, &mut rng)?;
      info!(
        "Trial {}: makespan {} (local search {}) in {:.2?}",
        trial,
        outcome.makespan(),
        outcome.local_search_makespan,
        outcome.elapsed
      );
      summary.trials.push(outcome);
    }

    return Ok(summary);
  }

  pub fn run_trial<R: Rng>(&self, inst: &Instance, rng: &mut R) -> Result<TrialOutcome> {
    let started = Instant::now();

    let mut population = generate_population(inst, self.config.population, rng)?;
    local_search::run_population(&self.pool, &mut population, &self.config.local_search, rng);
    let best_idx = local_search::best_schedule(&population)
      .ok_or_else(|| Error::MissingParameters("population must not be empty".to_string()))?;
    let local_search_makespan = population[best_idx].makespan();

    let epoch = self.registry.reset();
    let updates = self.registry.subscribe();
    let beacon_idx = match self.config.hybrid.beacon {
      BeaconPolicy::BestMakespan => best_idx,
      BeaconPolicy::Backbone => firefly::select_backbone_beacon(&population).unwrap_or(best_idx),
    };
    self.registry.publish(&population[beacon_idx], Strategy::LocalSearch);
    debug!(
      "Trial epoch {}: local search best {}, beacon {}",
      epoch,
      local_search_makespan,
      population[beacon_idx].makespan()
    );

    let (report_tx, report_rx) = channel();
    match self.config.hybrid.mode {
      HybridMode::Rounds => {
        let registry = Arc::clone(&self.registry);
        let config = self.config.hybrid;
        let seed = rng.gen();
        self.pool.submit(move || {
          let mut population = population;
          let mut rng = ChaChaRng::seed_from_u64(seed);
          let outcome = hybrid_round(&mut population, &registry, &config, &mut rng);
          // The trial may already be over.
          let _ = report_tx.send(outcome);
        });
      }
      HybridMode::Threaded => {
        let beacon = population[beacon_idx].clone();
        for mut schedule in population.into_iter().filter(|s| *s != beacon) {
          let registry = Arc::clone(&self.registry);
          let config = self.config.hybrid;
          let seed = rng.gen();
          self.pool.submit(move || {
            let mut rng = ChaChaRng::seed_from_u64(seed);
            let outcome = chase_beacon(&mut schedule, &registry, &config, &mut rng);
            trace!("Beacon chase finished: {:?}", outcome);
          });
        }
      }
    }

    self.dispatch_updates(&updates, epoch, rng);
    self.pool.shutdown(self.config.poll_interval);
    self.pool.restart();

    let best = self
      .registry
      .best()
      .ok_or_else(|| Error::MissingParameters("population must not be empty".to_string()))?;
    let updates = Strategy::ALL
      .iter()
      .map(|&strategy| (strategy, self.registry.update_count(strategy)))
      .collect();

    return Ok(TrialOutcome {
      best: best,
      local_search_makespan: local_search_makespan,
      updates: updates,
      hybrid: report_rx.try_recv().ok(),
      elapsed: started.elapsed(),
    });
  }

  /// Consumes registry updates on the driving thread until no worker is
  /// running and no update is pending.
  fn dispatch_updates<R: Rng>(&self, updates: &Receiver<Update>, epoch: u64, rng: &mut R) {
    loop {
      match updates.recv_timeout(self.config.poll_interval) {
        Ok(update) => self.dispatch(update, epoch, rng),
        Err(RecvTimeoutError::Timeout) => {
          let outstanding = self.pool.outstanding();
          if outstanding > 0 {
            debug!("Waiting for {} workers", outstanding);
            continue;
          }
          // Workers publish before they finish, so nothing can arrive later.
          match updates.try_recv() {
            Ok(update) => self.dispatch(update, epoch, rng),
            Err(_) => break,
          }
        }
        Err(RecvTimeoutError::Disconnected) => break,
      }
    }
  }

  fn dispatch<R: Rng>(&self, update: Update, epoch: u64, rng: &mut R) {
    if update.epoch != epoch {
      trace!("Ignoring update from epoch {}", update.epoch);
      return;
    }
    debug!(
      "Update from {}: {} -> {}",
      update.source,
      update.previous.as_ref().map(|p| p.makespan()).unwrap_or(0),
      update.current.makespan()
    );

    if self.pool.has_capacity() {
      let mut schedule = (*update.current).clone();
      let registry = Arc::clone(&self.registry);
      let config = self.config.annealing;
      let seed = rng.gen();
      self.pool.submit(move || {
        let mut rng = ChaChaRng::seed_from_u64(seed);
        simulated_annealing::anneal(&mut schedule, &registry, &config, &mut rng);
      });
    }

    if self.config.hybrid.mode == HybridMode::Threaded && self.pool.has_capacity() {
      if let Some(previous) = update.previous {
        let mut schedule = (*previous).clone();
        let registry = Arc::clone(&self.registry);
        let config = self.config.hybrid;
        let seed = rng.gen();
        self.pool.submit(move || {
          let mut rng = ChaChaRng::seed_from_u64(seed);
          chase_beacon(&mut schedule, &registry, &config, &mut rng);
        });
      }
    }
  }
}
