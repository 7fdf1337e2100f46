pub mod firefly;
pub mod local_search;
pub mod pool;
pub mod registry;
pub mod safa;
pub mod simulated_annealing;

use crate::data::{Instance, OpId, Solution};
use crate::graph::{feasibility, paths, tabu, EdgeId, Schedule};
use itertools::Itertools;
use log::trace;
use rand::Rng;
use std::cmp;
use std::error::Error;

/// Where flip candidates are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateMode {
  /// Uniformly from all machine edges.
  Random,
  /// Most frequent critical-path machine edge first, filtered by the tabu
  /// memory of the schedule.
  MostContended,
}

/// What a search loop does after publishing a new best schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImprovementPolicy {
  StopOnImprovement,
  ContinueToFloor,
}

/// Fresh candidate pool for one round of moves.
pub fn candidate_edges(schedule: &Schedule, mode: CandidateMode) -> Vec<EdgeId> {
  return match mode {
    CandidateMode::Random => schedule.machine_edges().to_vec(),
    CandidateMode::MostContended => schedule.critical_machine_edges().to_vec(),
  };
}

/// Removes the next candidate from `pool`, `None` once it is exhausted.
pub fn take_candidate<R: Rng>(
  schedule: &mut Schedule,
  pool: &mut Vec<EdgeId>,
  mode: CandidateMode,
  rng: &mut R,
) -> Option<EdgeId> {
  return match mode {
    CandidateMode::Random => {
      if pool.is_empty() {
        None
      } else {
        let idx = rng.gen_range(0, pool.len());
        Some(pool.swap_remove(idx))
      }
    }
    CandidateMode::MostContended => {
      tabu::select_most_contended_edge(Some(schedule.tabu_mut()), pool, rng)
    }
  };
}

/// Applies one uniformly chosen feasible flip and refreshes the caches.
/// Returns the flipped edge, or `None` if no machine edge can be flipped.
pub fn random_feasible_flip<R: Rng>(schedule: &mut Schedule, rng: &mut R) -> Option<EdgeId> {
  let mut pool = schedule.machine_edges().to_vec();

  while !pool.is_empty() {
    let edge = pool.swap_remove(rng.gen_range(0, pool.len()));
    if feasibility::flip_if_feasible(schedule, edge) {
      paths::refresh(schedule);
      trace!("Random flip of {} to {}", edge, schedule.makespan());
      return Some(edge);
    }
  }

  return None;
}

pub fn verify_solution(inst: &Instance, solution: &Solution) -> Result<(), Box<dyn Error>> {
  // Check:
  // 1. For every job: order and no overlap
  // 2. For every machine: no overlap

  if solution.start_times.len() != inst.n_ops() {
    Err(format!(
      "Expected {} start times, found {}",
      inst.n_ops(),
      solution.start_times.len()
    ))?;
  }

  let end = |op: OpId| solution.start_times[op] + inst.durations[op];

  for job in 0..inst.n_jobs {
    let route = (0..inst.n_machines).map(|o| inst.op_to_id([job, o]));
    for (a, b) in route.tuple_windows() {
      if end(a) > solution.start_times[b] {
        Err(format!(
          "Precedence violation in job {}: {:?} ends at {} but {:?} starts at {}",
          job,
          inst.op_from_id(a),
          end(a),
          inst.op_from_id(b),
          solution.start_times[b]
        ))?;
      }
    }
  }

  for machine in 0..inst.n_machines {
    let on_machine = inst
      .op_ids()
      .into_iter()
      .filter(|&op| inst.machines[op] == machine)
      .sorted_by_key(|&op| (solution.start_times[op], end(op)));
    for (a, b) in on_machine.tuple_windows() {
      if end(a) > solution.start_times[b] {
        Err(format!(
          "Machine overlap on {}: {:?}:[{}, {}] and {:?}:[{}, {}]",
          machine,
          inst.op_from_id(a),
          solution.start_times[a],
          end(a),
          inst.op_from_id(b),
          solution.start_times[b],
          end(b)
        ))?;
      }
    }
  }

  Ok(())
}

pub fn print_solution(inst: &Instance, solution: &Solution) {
  for job in 0..inst.n_jobs {
    let line = (0..inst.n_machines)
      .map(|op| solution.start_times[inst.op_to_id([job, op])])
      .join(" ");
    println!("{}", line);
  }
}

pub fn calculate_cmax(inst: &Instance, solution: &Solution) -> u32 {
  let mut cmax = 0;

  for op in 0..inst.n_ops() {
    let duration = inst.durations[op];
    let start = solution.start_times[op];
    let end = start + duration;

    cmax = cmp::max(cmax, end);
  }

  return cmax;
}
