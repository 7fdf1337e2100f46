use crate::graph::{feasibility, paths, Schedule};
use crate::solver::pool::WorkerPool;
use crate::solver::{candidate_edges, take_candidate, CandidateMode};
use log::{debug, trace};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;
use rayon::prelude::*;

#[derive(Debug, Clone, Copy)]
pub struct Config {
  pub max_iterations: usize,
  pub mode: CandidateMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
  pub iterations: usize,
  pub start_makespan: u32,
  pub makespan: u32,
  /// True if the last round found no improving feasible flip.
  pub local_optimum: bool,
}

/// First-improvement hill climbing over single flips.
///
/// Every round draws candidates until one feasible flip shortens the
/// makespan; a round without such a flip is a local optimum.
pub fn improve_schedule<R: Rng>(schedule: &mut Schedule, config: &Config, rng: &mut R) -> Outcome {
  let start_makespan = schedule.makespan();
  let mut iterations = 0;
  let mut local_optimum = false;

  while iterations < config.max_iterations {
    iterations += 1;
    let mut pool = candidate_edges(schedule, config.mode);
    let mut improved = false;

    while let Some(edge) = take_candidate(schedule, &mut pool, config.mode, rng) {
      let before = schedule.makespan();
      if !feasibility::flip_if_feasible(schedule, edge) {
        continue;
      }

      let after = paths::calculate_makespan(schedule);
      if after < before {
        paths::calculate_critical_paths(schedule);
        trace!("Improved {} -> {} by flipping {} (iteration {})", before, after, edge, iterations);
        improved = true;
        break;
      }

      schedule.flip(edge);
      paths::calculate_makespan(schedule);
    }

    if !improved {
      local_optimum = true;
      break;
    }
  }

  return Outcome {
    iterations: iterations,
    start_makespan: start_makespan,
    makespan: schedule.makespan(),
    local_optimum: local_optimum,
  };
}

/// Improves every schedule of the population in parallel on `pool`.
///
/// Each schedule gets its own generator seeded from `rng`, so results do not
/// depend on thread timing.
pub fn run_population<R: Rng>(
  pool: &WorkerPool,
  population: &mut [Schedule],
  config: &Config,
  rng: &mut R,
) -> Vec<Outcome> {
  let seeds: Vec<u64> = (0..population.len()).map(|_| rng.gen()).collect();

  let outcomes: Vec<Outcome> = pool.install(|| {
    population
      .par_iter_mut()
      .zip(seeds.par_iter())
      .map(|(schedule, &seed)| {
        let mut rng = ChaChaRng::seed_from_u64(seed);
        return improve_schedule(schedule, config, &mut rng);
      })
      .collect()
  });

  for (i, outcome) in outcomes.iter().enumerate() {
    debug!(
      "Local search {}: {} -> {} after {} iterations{}",
      i,
      outcome.start_makespan,
      outcome.makespan,
      outcome.iterations,
      if outcome.local_optimum { " (local optimum)" } else { "" }
    );
  }

  return outcomes;
}

/// Index of the schedule with the smallest makespan.
pub fn best_schedule(population: &[Schedule]) -> Option<usize> {
  return population
    .iter()
    .enumerate()
    .min_by_key(|(_, schedule)| schedule.makespan())
    .map(|(i, _)| i);
}
