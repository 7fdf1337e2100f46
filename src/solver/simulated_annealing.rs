use crate::graph::{feasibility, paths, Schedule};
use crate::solver::registry::{BestSolutionRegistry, Strategy};
use crate::solver::{candidate_edges, take_candidate, CandidateMode, ImprovementPolicy};
use log::{debug, trace};
use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct Config {
  pub start_temperature: f64,
  /// Fraction of the temperature lost per feasible move, in (0, 1).
  pub cooling_rate: f64,
  pub min_temperature: f64,
  pub policy: ImprovementPolicy,
  pub mode: CandidateMode,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
  /// Feasible moves evaluated.
  pub iterations: usize,
  pub start_makespan: u32,
  pub makespan: u32,
  /// Schedules installed in the registry by this run.
  pub published: usize,
  pub temperature: f64,
}

/// Probability of keeping a move from `before` to `after` at `temperature`.
///
/// Improvements are always kept; anything else with the ratio of the current
/// to the start temperature.
pub fn acceptance_probability(before: u32, after: u32, temperature: f64, start_temperature: f64) -> f64 {
  if after < before {
    return 1.0;
  }
  return temperature / start_temperature;
}

/// Random walk over feasible flips with geometric cooling.
///
/// Infeasible flips are reverted without cooling. Every makespan that beats
/// the registry is published right away; under
/// [`ImprovementPolicy::StopOnImprovement`] that also ends the run.
pub fn anneal<R: Rng>(
  schedule: &mut Schedule,
  registry: &BestSolutionRegistry,
  config: &Config,
  rng: &mut R,
) -> Outcome {
  let start_makespan = schedule.makespan();
  let mut temperature = config.start_temperature;
  let mut iterations = 0;
  let mut published = 0;

  let mut pool = candidate_edges(schedule, config.mode);
  // Feasible flips found since the pool was last refilled.
  let mut feasible_in_pool = true;

  while temperature > config.min_temperature {
    let edge = match take_candidate(schedule, &mut pool, config.mode, rng) {
      Some(edge) => edge,
      None => {
        if !feasible_in_pool {
          debug!("No feasible flip left at temperature {:.3}", temperature);
          break;
        }
        pool = candidate_edges(schedule, config.mode);
        feasible_in_pool = false;
        continue;
      }
    };

    let before = schedule.makespan();
    if !feasibility::flip_if_feasible(schedule, edge) {
      continue;
    }
    feasible_in_pool = true;
    iterations += 1;

    let after = paths::calculate_makespan(schedule);
    let probability = acceptance_probability(before, after, temperature, config.start_temperature);

    if registry.beats(after) {
      paths::calculate_critical_paths(schedule);
      if registry.publish(schedule, Strategy::SimulatedAnnealing) {
        published += 1;
        if config.policy == ImprovementPolicy::StopOnImprovement {
          break;
        }
      }
      pool = candidate_edges(schedule, config.mode);
    } else if probability > rng.gen::<f64>() {
      paths::calculate_critical_paths(schedule);
      trace!("Accepted {} -> {} at temperature {:.3}", before, after, temperature);
      pool = candidate_edges(schedule, config.mode);
    } else {
      schedule.flip(edge);
      paths::calculate_makespan(schedule);
    }

    temperature *= 1.0 - config.cooling_rate;
  }

  debug!(
    "Annealing {} -> {} after {} moves, {} published, temperature {:.3}",
    start_makespan,
    schedule.makespan(),
    iterations,
    published,
    temperature
  );

  return Outcome {
    iterations: iterations,
    start_makespan: start_makespan,
    makespan: schedule.makespan(),
    published: published,
    temperature: temperature,
  };
}
