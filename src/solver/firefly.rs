//! Beacon-following moves: pull a schedule one machine swap closer to another.

use crate::data::OpId;
use crate::graph::{feasibility, paths, EdgeId, Schedule};
use itertools::Itertools;
use log::trace;
use std::collections::HashMap;

/// Flips the first machine edge whose order disagrees with `beacon`,
/// critical-path edges first, skipping flips that would close a cycle.
///
/// Returns false if no disagreeing edge can be flipped, i.e. the schedule
/// already matches the beacon or cannot get any closer to it.
pub fn move_towards(schedule: &mut Schedule, beacon: &Schedule) -> bool {
  let critical: Vec<EdgeId> = schedule.critical_machine_edges().iter().copied().unique().collect();
  let non_critical: Vec<EdgeId> = schedule.non_critical_machine_edges().iter().copied().collect();

  for edge in critical.into_iter().chain(non_critical) {
    let from = schedule.edge(edge).from;
    let to = schedule.edge(edge).to;
    if !beacon.is_in_order(to, from) {
      continue;
    }

    if feasibility::flip_if_feasible(schedule, edge) {
      paths::refresh(schedule);
      trace!("Moved {} -> {} towards beacon, makespan {}", from, to, schedule.makespan());
      return true;
    }
  }

  return false;
}

/// Number of same-machine operation pairs ordered differently in the two
/// schedules.
pub fn disagreements(schedule: &Schedule, beacon: &Schedule) -> usize {
  let mut count = 0;
  for machine in 0..schedule.n_machines() {
    let order = schedule.machine_order(machine);
    for (i, &a) in order.iter().enumerate() {
      count += order[i + 1..].iter().filter(|&&b| beacon.is_in_order(b, a)).count();
    }
  }
  return count;
}

fn machine_pairs(schedule: &Schedule) -> impl Iterator<Item = (OpId, OpId)> + '_ {
  return schedule.machine_edges().iter().map(move |&e| {
    let edge = schedule.edge(e);
    (edge.from, edge.to)
  });
}

/// Picks the schedule sharing the most machine edges with the rest of the
/// population, preferring the smaller makespan on ties.
pub fn select_backbone_beacon(population: &[Schedule]) -> Option<usize> {
  let mut frequency: HashMap<(OpId, OpId), usize> = HashMap::new();
  for schedule in population {
    for pair in machine_pairs(schedule) {
      *frequency.entry(pair).or_insert(0) += 1;
    }
  }

  let mut best: Option<(usize, usize)> = None;
  for (i, schedule) in population.iter().enumerate() {
    let score: usize = machine_pairs(schedule).map(|pair| frequency[&pair] - 1).sum();
    let better = match best {
      None => true,
      Some((j, best_score)) => {
        score > best_score || (score == best_score && schedule.makespan() < population[j].makespan())
      }
    };
    if better {
      best = Some((i, score));
    }
  }

  return best.map(|(i, _)| i);
}
