//! Cycle checks for single machine edge flips.

use crate::data::OpId;
use crate::graph::{EdgeId, Schedule};
use log::trace;
use ndarray::Array1;
use std::collections::{HashSet, VecDeque};

/// Decides whether the flip that produced the active edge `from -> to` kept
/// the graph acyclic.
///
/// A cycle through the new edge needs a path from `to` back to `from`, which
/// must leave `to` through its job successor and enter `from` through its job
/// route. So the check intersects the job ancestors of `from` (inclusive) with
/// everything reachable from the job successor of `to`.
pub fn is_feasible(schedule: &Schedule, from: OpId, to: OpId) -> bool {
  let post_job_to = match schedule.successors(to)[0] {
    Some(op) if op != schedule.sink => op,
    // Nothing follows `to` on its job route, so no path can lead back.
    _ => return true,
  };

  let ancestors = job_ancestors(schedule, from);
  trace!("Job ancestors of {}: {:?}", from, ancestors);

  let mut visited = Array1::<bool>::from_elem(schedule.operations.len(), false);
  let mut open = VecDeque::new();
  visited[post_job_to] = true;
  open.push_back(post_job_to);

  while let Some(op) = open.pop_front() {
    if ancestors.contains(&op) {
      trace!("Flip {} -> {} closes a cycle through {}", from, to, op);
      return false;
    }
    for next in schedule.successors(op).iter().filter_map(|&s| s) {
      if next != schedule.sink && !visited[next] {
        visited[next] = true;
        open.push_back(next);
      }
    }
  }

  return true;
}

fn job_ancestors(schedule: &Schedule, op: OpId) -> HashSet<OpId> {
  let mut ancestors = HashSet::new();
  let mut current = op;
  ancestors.insert(current);
  while let Some(parent) = schedule.operations[current].conjunctive_parent {
    current = schedule.edges[parent].from;
    ancestors.insert(current);
  }
  return ancestors;
}

/// Flips `edge` and keeps the flip only if the graph stays acyclic.
///
/// Caches are not touched: the caller recalculates the makespan when this
/// returns true.
pub fn flip_if_feasible(schedule: &mut Schedule, edge: EdgeId) -> bool {
  schedule.flip(edge);

  let from = schedule.edges[edge].from;
  let to = schedule.edges[edge].to;
  if is_feasible(schedule, from, to) {
    return true;
  }

  schedule.flip(edge);
  return false;
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
  Unvisited,
  OnStack,
  Done,
}

/// Full depth first cycle search over all active edges.
///
/// Much slower than [`is_feasible`]; only meant for verifying it.
pub fn has_cycle(schedule: &Schedule) -> bool {
  let n = schedule.operations.len();
  let mut marks = Array1::from_elem(n, Mark::Unvisited);
  let mut stack: Vec<(OpId, usize)> = Vec::new();

  for root in 0..n {
    if marks[root] != Mark::Unvisited {
      continue;
    }
    marks[root] = Mark::OnStack;
    stack.push((root, 0));

    while let Some((op, child)) = stack.pop() {
      let successors = schedule.successors(op);
      if child == successors.len() {
        marks[op] = Mark::Done;
        continue;
      }
      stack.push((op, child + 1));

      if let Some(next) = successors[child] {
        match marks[next] {
          Mark::OnStack => return true,
          Mark::Unvisited => {
            marks[next] = Mark::OnStack;
            stack.push((next, 0));
          }
          Mark::Done => {}
        }
      }
    }
  }

  return false;
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fixtures;
  use crate::graph::paths;
  use rand::seq::SliceRandom;
  use rand::SeedableRng;
  use rand_chacha::ChaChaRng;

  #[test]
  fn built_schedules_are_acyclic() {
    for seed in 0..10 {
      assert!(!has_cycle(&fixtures::random_schedule(seed)));
    }
  }

  #[test]
  fn agrees_with_cycle_search_on_every_flip() {
    for seed in 0..5 {
      let mut schedule = fixtures::random_schedule(seed);
      let edges = schedule.machine_edges().to_vec();
      let mut infeasible = 0;

      for edge in edges {
        schedule.flip(edge);
        let from = schedule.edge(edge).from;
        let to = schedule.edge(edge).to;
        let feasible = is_feasible(&schedule, from, to);
        assert_eq!(feasible, !has_cycle(&schedule), "edge {} seed {}", edge, seed);
        if !feasible {
          infeasible += 1;
        }
        schedule.flip(edge);
      }
      assert!(infeasible < schedule.machine_edges().len());
    }
  }

  #[test]
  fn agrees_with_cycle_search_along_a_random_walk() {
    let mut rng = ChaChaRng::seed_from_u64(42);
    let mut schedule = fixtures::random_schedule(42);

    for _ in 0..200 {
      let edge = *schedule.machine_edges().choose(&mut rng).unwrap();
      schedule.flip(edge);
      let from = schedule.edge(edge).from;
      let to = schedule.edge(edge).to;
      let feasible = is_feasible(&schedule, from, to);
      assert_eq!(feasible, !has_cycle(&schedule));
      if !feasible {
        schedule.flip(edge);
      }
    }
    assert!(!has_cycle(&schedule));
  }

  #[test]
  fn repeated_checks_give_the_same_answer() {
    let mut schedule = fixtures::random_schedule(9);

    for edge in schedule.machine_edges().to_vec() {
      schedule.flip(edge);
      let from = schedule.edge(edge).from;
      let to = schedule.edge(edge).to;
      let first = is_feasible(&schedule, from, to);
      assert_eq!(is_feasible(&schedule, from, to), first);
      assert_eq!(is_feasible(&schedule, from, to), first);
      schedule.flip(edge);
    }
  }

  #[test]
  fn flip_if_feasible_leaves_dag_and_single_neighbours() {
    let mut rng = ChaChaRng::seed_from_u64(3);
    let mut schedule = fixtures::random_schedule(3);

    for _ in 0..300 {
      let edge = *schedule.machine_edges().choose(&mut rng).unwrap();
      if flip_if_feasible(&mut schedule, edge) {
        paths::refresh(&mut schedule);
      }
    }

    assert!(!has_cycle(&schedule));
    let mut in_degree = vec![0; schedule.n_ops()];
    let mut out_degree = vec![0; schedule.n_ops()];
    for &edge in schedule.machine_edges() {
      out_degree[schedule.edge(edge).from] += 1;
      in_degree[schedule.edge(edge).to] += 1;
    }
    assert!(in_degree.iter().all(|&d| d <= 1));
    assert!(out_degree.iter().all(|&d| d <= 1));
  }

  #[test]
  fn detects_a_forced_cycle() {
    let mut schedule = fixtures::random_schedule(12);
    assert!(!has_cycle(&schedule));

    // Close a loop by pointing the last operation of job 0 back to its first.
    let first = schedule.first_op(0);
    let last = *schedule.job_sequence(0).last().unwrap();
    let tail = schedule.operations[last].conjunctive.unwrap();
    schedule.edges[tail].to = first;

    assert!(has_cycle(&schedule));
  }
}
