//! Longest paths through the active graph: topological order, makespan and
//! critical paths.

use crate::data::OpId;
use crate::graph::{EdgeId, EdgeKind, Schedule};
use log::{log_enabled, trace, Level};
use ndarray::Array1;
use std::collections::{BTreeSet, VecDeque};

/// Upper bound on the number of critical paths collected per schedule.
pub const MAX_CRITICAL_PATHS: usize = 32;

/// Depth first postorder over all active edges, every finished vertex pushed
/// to the front. The graph must be acyclic.
pub fn topological_sort(schedule: &Schedule) -> VecDeque<OpId> {
  let n = schedule.operations.len();
  let mut order = VecDeque::with_capacity(n);
  let mut visited = Array1::<bool>::from_elem(n, false);
  let mut stack: Vec<(OpId, usize)> = Vec::new();

  for root in 0..n {
    if visited[root] {
      continue;
    }
    visited[root] = true;
    stack.push((root, 0));

    while let Some((op, child)) = stack.pop() {
      let successors = schedule.successors(op);
      if child == successors.len() {
        order.push_front(op);
        continue;
      }
      stack.push((op, child + 1));

      if let Some(next) = successors[child] {
        if !visited[next] {
          visited[next] = true;
          stack.push((next, 0));
        }
      }
    }
  }

  return order;
}

/// Recalculates start times, per-edge path lengths and the makespan.
///
/// Longest paths are found as shortest paths over negated weights in one pass
/// over the topological order.
pub fn calculate_makespan(schedule: &mut Schedule) -> u32 {
  let order = topological_sort(schedule);
  let mut dist = Array1::<i64>::zeros(schedule.operations.len());

  for &op in &order {
    for edge in schedule.operations[op].active_edges().iter().filter_map(|&e| e) {
      let to = schedule.edges[edge].to;
      let candidate = dist[op] - schedule.edges[edge].weight as i64;
      if candidate < dist[to] {
        dist[to] = candidate;
      }
    }
  }

  schedule.heads = dist.mapv(|d| (-d) as u32);
  for edge in schedule.edges.iter_mut() {
    edge.max_distance = Some(schedule.heads[edge.from] + edge.weight);
  }
  schedule.makespan = schedule.heads[schedule.sink];

  return schedule.makespan;
}

/// Collects the critical paths by walking back from the sink along edges that
/// realise the head of their target, branching on ties.
///
/// Expects up to date path lengths from [`calculate_makespan`].
pub fn calculate_critical_paths(schedule: &mut Schedule) {
  let mut paths: Vec<Vec<EdgeId>> = Vec::new();
  let mut stack: Vec<(OpId, Vec<EdgeId>)> = vec![(schedule.sink, Vec::new())];

  while let Some((op, path)) = stack.pop() {
    if paths.len() >= MAX_CRITICAL_PATHS {
      break;
    }

    let head = schedule.heads[op];
    let tight: Vec<EdgeId> = schedule
      .parent_edges(op)
      .into_iter()
      .filter(|&e| schedule.edges[e].max_distance == Some(head))
      .collect();

    if tight.is_empty() {
      let mut path = path;
      path.reverse();
      paths.push(path);
      continue;
    }

    for edge in tight {
      let mut extended = path.clone();
      extended.push(edge);
      stack.push((schedule.edges[edge].from, extended));
    }
  }

  let critical_machine_edges: Vec<EdgeId> = paths
    .iter()
    .flatten()
    .copied()
    .filter(|&e| schedule.edges[e].kind == EdgeKind::Disjunctive)
    .collect();
  let critical: BTreeSet<EdgeId> = critical_machine_edges.iter().copied().collect();
  let non_critical: BTreeSet<EdgeId> = schedule
    .machine_edges
    .iter()
    .copied()
    .filter(|e| !critical.contains(e))
    .collect();

  if log_enabled!(Level::Trace) {
    trace!(
      "{} critical paths, {} critical machine edges, {} non-critical",
      paths.len(),
      critical.len(),
      non_critical.len()
    );
  }

  schedule.critical_paths = paths;
  schedule.critical_machine_edges = critical_machine_edges;
  schedule.non_critical_machine_edges = non_critical;
}

/// Recomputes every cache derived from the active edges.
pub fn refresh(schedule: &mut Schedule) -> u32 {
  let makespan = calculate_makespan(schedule);
  calculate_critical_paths(schedule);
  return makespan;
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fixtures;
  use crate::graph::feasibility;
  use crate::parser::parse_instance;
  use rand::seq::SliceRandom;
  use rand::SeedableRng;
  use rand_chacha::ChaChaRng;

  fn tiny() -> Schedule {
    let inst = parse_instance(fixtures::TINY).unwrap();
    // Job 0 goes first on both machines.
    return Schedule::from_recorded(&inst, &[0]).unwrap();
  }

  #[test]
  fn topological_order_respects_active_edges() {
    let schedule = fixtures::random_schedule(4);
    let order = topological_sort(&schedule);

    assert_eq!(order.len(), schedule.n_ops() + 1);
    let mut position = vec![0; order.len()];
    for (i, &op) in order.iter().enumerate() {
      position[op] = i;
    }
    for edge in &schedule.edges {
      assert!(position[edge.from] < position[edge.to]);
    }
    assert_eq!(*order.back().unwrap(), schedule.sink());
  }

  #[test]
  fn hand_checked_makespan_and_paths() {
    let schedule = tiny();

    assert_eq!(schedule.makespan(), 9);
    assert_eq!(schedule.to_solution().start_times.to_vec(), vec![0, 3, 3, 5]);
    assert_eq!(schedule.critical_paths().len(), 2);
    for path in schedule.critical_paths() {
      let length: u32 = path.iter().map(|&e| schedule.edge(e).weight).sum();
      assert_eq!(length, 9);
      assert_eq!(schedule.edge(path[0]).from, 0);
      assert_eq!(schedule.edge(*path.last().unwrap()).to, schedule.sink());
    }

    let mut critical = schedule.critical_machine_edges().to_vec();
    critical.sort();
    let mut machine_edges = schedule.machine_edges().to_vec();
    machine_edges.sort();
    assert_eq!(critical, machine_edges);
    assert!(schedule.non_critical_machine_edges().is_empty());
  }

  #[test]
  fn heads_are_longest_paths() {
    let schedule = fixtures::random_schedule(6);

    for edge in &schedule.edges {
      assert!(schedule.heads[edge.to] >= schedule.heads[edge.from] + edge.weight);
    }
    for op in 0..=schedule.n_ops() {
      let parents = schedule.parent_edges(op);
      if parents.is_empty() {
        assert_eq!(schedule.heads[op], 0);
      } else {
        assert!(parents
          .iter()
          .any(|&e| schedule.edge(e).max_distance == Some(schedule.heads[op])));
      }
    }
  }

  #[test]
  fn makespan_depends_only_on_structure() {
    let mut rng = ChaChaRng::seed_from_u64(17);
    let mut schedule = fixtures::random_schedule(17);
    for _ in 0..50 {
      let edge = *schedule.machine_edges().choose(&mut rng).unwrap();
      if feasibility::flip_if_feasible(&mut schedule, edge) {
        refresh(&mut schedule);
      }
    }

    let mut copy = schedule.clone();
    assert_eq!(refresh(&mut copy), schedule.makespan());
    assert_eq!(copy, schedule);
  }

  #[test]
  fn critical_and_non_critical_edges_partition_machine_edges() {
    let schedule = fixtures::random_schedule(21);

    assert!(!schedule.critical_paths().is_empty());
    for path in schedule.critical_paths() {
      let length: u32 = path.iter().map(|&e| schedule.edge(e).weight).sum();
      assert_eq!(length, schedule.makespan());
    }

    let critical: BTreeSet<EdgeId> = schedule.critical_machine_edges().iter().copied().collect();
    for edge in schedule.non_critical_machine_edges() {
      assert!(!critical.contains(edge));
    }
    assert_eq!(
      critical.len() + schedule.non_critical_machine_edges().len(),
      schedule.machine_edges().len()
    );
  }
}
