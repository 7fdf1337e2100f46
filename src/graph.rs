//! Disjunctive graph of a job shop schedule.
//!
//! Operations and edges live in two arenas owned by the [`Schedule`] and refer
//! to each other by index. Every operation has one conjunctive edge (its job
//! successor, or the sink for the last operation of a job) and at most one
//! active disjunctive edge in each direction (its machine neighbours). Search
//! moves only ever flip a disjunctive edge, which is a constant number of index
//! updates, and cloning a schedule is a plain copy of the arenas.

pub mod feasibility;
pub mod paths;
pub mod tabu;

use crate::data::{Instance, Machine, OpId, Solution};
use crate::error::{Error, Result};
use crate::graph::tabu::TabuCache;
use log::trace;
use ndarray::Array1;
use rand::Rng;
use std::cmp;
use std::collections::{BTreeSet, HashSet};
use std::hash::{Hash, Hasher};

pub type EdgeId = usize;

/// Job and machine index carried by the sink.
pub const SINK: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
  /// Fixed job order.
  Conjunctive,
  /// Mutable machine order.
  Disjunctive,
}

#[derive(Debug, Clone)]
pub struct Edge {
  pub kind: EdgeKind,
  pub from: OpId,
  pub to: OpId,
  /// Processing time of `from`.
  pub weight: u32,
  /// Length of the longest path reaching `to` through this edge, as of the
  /// last makespan calculation.
  pub max_distance: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Operation {
  pub id: OpId,
  pub job: usize,
  pub machine: Machine,

  pub(crate) conjunctive: Option<EdgeId>,
  pub(crate) conjunctive_parent: Option<EdgeId>,
  pub(crate) disjunctive: Option<EdgeId>,
  pub(crate) disjunctive_parent: Option<EdgeId>,
  /// Every other operation on the same machine.
  pub(crate) candidates: Vec<OpId>,
}

impl Operation {
  fn new(id: OpId, job: usize, machine: Machine) -> Self {
    Self {
      id: id,
      job: job,
      machine: machine,
      conjunctive: None,
      conjunctive_parent: None,
      disjunctive: None,
      disjunctive_parent: None,
      candidates: Vec::new(),
    }
  }

  pub fn is_sink(&self) -> bool {
    return self.job == SINK;
  }

  pub fn conjunctive(&self) -> Option<EdgeId> {
    return self.conjunctive;
  }

  pub fn conjunctive_parent(&self) -> Option<EdgeId> {
    return self.conjunctive_parent;
  }

  pub fn disjunctive(&self) -> Option<EdgeId> {
    return self.disjunctive;
  }

  pub fn disjunctive_parent(&self) -> Option<EdgeId> {
    return self.disjunctive_parent;
  }

  pub fn candidates(&self) -> &[OpId] {
    return &self.candidates;
  }

  /// Active outgoing edges, conjunctive first.
  pub fn active_edges(&self) -> [Option<EdgeId>; 2] {
    return [self.conjunctive, self.disjunctive];
  }

  /// Active incoming edges of a non-sink operation, conjunctive first.
  pub fn parent_edges(&self) -> [Option<EdgeId>; 2] {
    return [self.conjunctive_parent, self.disjunctive_parent];
  }
}

#[derive(Debug, Clone)]
pub struct Schedule {
  pub(crate) n_jobs: usize,
  pub(crate) n_machines: usize,

  pub(crate) operations: Vec<Operation>,
  pub(crate) edges: Vec<Edge>,
  /// Job -> first operation of the job.
  pub(crate) first_ops: Vec<OpId>,
  pub(crate) sink: OpId,
  /// Job -> conjunctive edge of the job's last operation.
  pub(crate) sink_parents: Vec<EdgeId>,
  /// All disjunctive edges. The set is fixed after construction, flips only
  /// retarget their endpoints.
  pub(crate) machine_edges: Vec<EdgeId>,

  // Derived from the current orientation
  pub(crate) makespan: u32,
  pub(crate) heads: Array1<u32>,
  pub(crate) critical_paths: Vec<Vec<EdgeId>>,
  pub(crate) critical_machine_edges: Vec<EdgeId>,
  pub(crate) non_critical_machine_edges: BTreeSet<EdgeId>,
  pub(crate) tabu: TabuCache,
}

impl Schedule {
  /// Builds the graph skeleton: conjunctive job chains into the sink and the
  /// same-machine candidate lists. No machine order is active yet.
  pub fn template(inst: &Instance) -> Result<Schedule> {
    inst.validate()?;

    let n_ops = inst.n_ops();
    let mut schedule = Schedule {
      n_jobs: inst.n_jobs,
      n_machines: inst.n_machines,
      operations: Vec::with_capacity(n_ops + 1),
      edges: Vec::with_capacity(n_ops + inst.n_machines * inst.n_jobs.saturating_sub(1)),
      first_ops: Vec::with_capacity(inst.n_jobs),
      sink: n_ops,
      sink_parents: Vec::with_capacity(inst.n_jobs),
      machine_edges: Vec::new(),
      makespan: 0,
      heads: Array1::<u32>::zeros(n_ops + 1),
      critical_paths: Vec::new(),
      critical_machine_edges: Vec::new(),
      non_critical_machine_edges: BTreeSet::new(),
      tabu: TabuCache::new(cmp::max(inst.n_jobs, inst.n_machines)),
    };

    for id in inst.op_ids() {
      let [j, _o] = inst.op_from_id(id);
      schedule.operations.push(Operation::new(id, j, inst.machines[id]));
    }
    schedule.operations.push(Operation::new(n_ops, SINK, SINK));

    for id in inst.op_ids() {
      schedule.add_operation(id, inst.durations[id]);
    }

    return Ok(schedule);
  }

  /// Builds a schedule whose machine orders are assigned by repeatedly asking
  /// `draw(n)` for an index in `0..n` into the jobs that still have
  /// unscheduled operations.
  pub fn build<F: FnMut(usize) -> usize>(inst: &Instance, mut draw: F) -> Result<Schedule> {
    let mut schedule = Schedule::template(inst)?;

    let mut next_op = Array1::<usize>::from_elem(inst.n_jobs, 0);
    let mut last_on_machine = Array1::<Option<usize>>::from_elem(inst.n_machines, None);
    let mut remaining: Vec<usize> = (0..inst.n_jobs).collect();

    while !remaining.is_empty() {
      let idx = draw(remaining.len()) % remaining.len();
      let j = remaining[idx];
      let m = inst.machines[inst.op_to_id([j, next_op[j]])];

      schedule.set_active_edge(j, last_on_machine[m], m)?;
      last_on_machine[m] = Some(j);

      next_op[j] += 1;
      if next_op[j] == inst.n_machines {
        remaining.swap_remove(idx);
      }
    }

    paths::refresh(&mut schedule);

    return Ok(schedule);
  }

  pub fn random<R: Rng>(inst: &Instance, rng: &mut R) -> Result<Schedule> {
    return Schedule::build(inst, |n| rng.gen_range(0, n));
  }

  /// Builds a schedule from a recorded draw sequence, cycling through it.
  pub fn from_recorded(inst: &Instance, draws: &[usize]) -> Result<Schedule> {
    if draws.is_empty() {
      return Schedule::build(inst, |_| 0);
    }

    let mut cursor = 0;
    return Schedule::build(inst, |_| {
      let value = draws[cursor % draws.len()];
      cursor += 1;
      value
    });
  }

  fn add_operation(&mut self, id: OpId, duration: u32) {
    let job = self.operations[id].job;
    let edge = self.push_edge(EdgeKind::Conjunctive, id, self.sink, duration);

    if job < self.first_ops.len() {
      // Retarget the job's current tail from the sink to the new operation.
      let tail_edge = self.sink_parents[job];
      let tail = self.edges[tail_edge].from;
      self.edges[tail_edge].to = id;
      self.operations[id].conjunctive_parent = Some(tail_edge);
      self.sink_parents[job] = edge;
      trace!("Appended {} to job {} after {}", id, job, tail);
    } else {
      self.first_ops.push(id);
      self.sink_parents.push(edge);
    }
    self.operations[id].conjunctive = Some(edge);

    self.link_candidates(id);
  }

  /// Links `id` to every same-machine operation of the jobs added before it by
  /// walking the candidate lists depth first, one job at a time.
  fn link_candidates(&mut self, id: OpId) {
    let job = self.operations[id].job;
    let machine = self.operations[id].machine;

    let mut unchecked: BTreeSet<usize> = (0..self.first_ops.len()).filter(|&j| j != job).collect();
    loop {
      let other_job = match unchecked.iter().next() {
        Some(&j) => j,
        None => break,
      };
      let start = match self.find_on_job(other_job, machine) {
        Some(op) => op,
        None => {
          unchecked.remove(&other_job);
          continue;
        }
      };

      let mut visited_jobs = HashSet::new();
      let mut stack = vec![start];
      while let Some(other) = stack.pop() {
        if !visited_jobs.insert(self.operations[other].job) {
          continue;
        }
        for &next in &self.operations[other].candidates {
          if next != id && !visited_jobs.contains(&self.operations[next].job) {
            stack.push(next);
          }
        }
        self.operations[other].candidates.push(id);
        self.operations[id].candidates.push(other);
      }

      for j in visited_jobs {
        unchecked.remove(&j);
      }
    }
  }

  fn push_edge(&mut self, kind: EdgeKind, from: OpId, to: OpId, weight: u32) -> EdgeId {
    self.edges.push(Edge {
      kind: kind,
      from: from,
      to: to,
      weight: weight,
      max_distance: None,
    });
    return self.edges.len() - 1;
  }

  /// Follows the job route from its first operation looking for `machine`.
  fn find_on_job(&self, job: usize, machine: Machine) -> Option<OpId> {
    let mut current = *self.first_ops.get(job)?;
    loop {
      if self.operations[current].machine == machine {
        return Some(current);
      }
      let next = self.edges[self.operations[current].conjunctive?].to;
      if next == self.sink {
        return None;
      }
      current = next;
    }
  }

  /// Locates the operation of `job` on `machine`.
  pub fn locate(&self, job: usize, machine: Machine) -> Result<OpId> {
    return self.find_on_job(job, machine).ok_or_else(|| {
      Error::MalformedInstance(format!("job {} never uses machine {}", job, machine))
    });
  }

  /// Activates the machine edge from the operation of `last_job` on `machine`
  /// to the operation of `job` on `machine`.
  fn set_active_edge(&mut self, job: usize, last_job: Option<usize>, machine: Machine) -> Result<()> {
    let to = self.locate(job, machine)?;
    let last_job = match last_job {
      Some(j) => j,
      None => return Ok(()),
    };
    let from = self.locate(last_job, machine)?;
    if !self.operations[from].candidates.contains(&to) {
      return Err(Error::MalformedInstance(format!(
        "operations {} and {} do not share machine {}",
        from, to, machine
      )));
    }

    let weight = self.processing_time(from);
    let edge = self.push_edge(EdgeKind::Disjunctive, from, to, weight);
    self.operations[from].disjunctive = Some(edge);
    self.operations[to].disjunctive_parent = Some(edge);
    self.machine_edges.push(edge);

    return Ok(());
  }

  /// Reverses the active machine edge `edge` between two adjacent operations.
  ///
  /// `p -> f -> t -> x` becomes `p -> t -> f -> x`. The caller is responsible
  /// for checking feasibility afterwards and for recalculating the makespan.
  pub fn flip(&mut self, edge: EdgeId) {
    debug_assert_eq!(self.edges[edge].kind, EdgeKind::Disjunctive);

    let f = self.edges[edge].from;
    let t = self.edges[edge].to;
    let forward = self.operations[t].disjunctive;
    let backward = self.operations[f].disjunctive_parent;
    trace!(
      "Flipping {} ({} -> {}), forward {:?}, backward {:?}",
      edge,
      f,
      t,
      forward,
      backward
    );

    match backward {
      Some(b) => {
        self.edges[b].to = t;
        self.operations[t].disjunctive_parent = Some(b);
      }
      None => self.operations[t].disjunctive_parent = None,
    }

    match forward {
      Some(fw) => {
        self.edges[fw].from = f;
        self.edges[fw].weight = self.processing_time(f);
        let x = self.edges[fw].to;
        self.operations[x].disjunctive_parent = Some(fw);
        self.operations[f].disjunctive = Some(fw);
      }
      None => self.operations[f].disjunctive = None,
    }

    self.edges[edge].from = t;
    self.edges[edge].to = f;
    self.edges[edge].weight = self.processing_time(t);
    self.operations[t].disjunctive = Some(edge);
    self.operations[f].disjunctive_parent = Some(edge);
  }

  pub fn n_jobs(&self) -> usize {
    return self.n_jobs;
  }

  pub fn n_machines(&self) -> usize {
    return self.n_machines;
  }

  /// Number of real operations (the sink excluded).
  pub fn n_ops(&self) -> usize {
    return self.sink;
  }

  pub fn sink(&self) -> OpId {
    return self.sink;
  }

  pub fn operation(&self, id: OpId) -> &Operation {
    return &self.operations[id];
  }

  pub fn operations(&self) -> &[Operation] {
    return &self.operations;
  }

  pub fn edge(&self, id: EdgeId) -> &Edge {
    return &self.edges[id];
  }

  pub fn first_op(&self, job: usize) -> OpId {
    return self.first_ops[job];
  }

  pub fn processing_time(&self, op: OpId) -> u32 {
    return self.operations[op]
      .conjunctive
      .map(|e| self.edges[e].weight)
      .unwrap_or(0);
  }

  pub fn makespan(&self) -> u32 {
    return self.makespan;
  }

  pub fn machine_edges(&self) -> &[EdgeId] {
    return &self.machine_edges;
  }

  pub fn critical_paths(&self) -> &[Vec<EdgeId>] {
    return &self.critical_paths;
  }

  /// Machine edges on the critical paths, repeated once per path using them.
  pub fn critical_machine_edges(&self) -> &[EdgeId] {
    return &self.critical_machine_edges;
  }

  pub fn non_critical_machine_edges(&self) -> &BTreeSet<EdgeId> {
    return &self.non_critical_machine_edges;
  }

  pub fn tabu(&self) -> &TabuCache {
    return &self.tabu;
  }

  pub fn tabu_mut(&mut self) -> &mut TabuCache {
    return &mut self.tabu;
  }

  /// Successor operations over active edges, conjunctive first.
  pub fn successors(&self, op: OpId) -> [Option<OpId>; 2] {
    let [conjunctive, disjunctive] = self.operations[op].active_edges();
    return [
      conjunctive.map(|e| self.edges[e].to),
      disjunctive.map(|e| self.edges[e].to),
    ];
  }

  /// Active incoming edges of any vertex, the sink included.
  pub fn parent_edges(&self, op: OpId) -> Vec<EdgeId> {
    if op == self.sink {
      return self.sink_parents.clone();
    }
    return self.operations[op]
      .parent_edges()
      .iter()
      .filter_map(|&e| e)
      .collect();
  }

  /// Operations of `job` in route order.
  pub fn job_sequence(&self, job: usize) -> Vec<OpId> {
    let mut ops = Vec::new();
    let mut current = self.first_ops[job];
    while current != self.sink {
      ops.push(current);
      current = match self.operations[current].conjunctive {
        Some(e) => self.edges[e].to,
        None => break,
      };
    }
    return ops;
  }

  /// Operations on `machine` in the currently active order.
  pub fn machine_order(&self, machine: Machine) -> Vec<OpId> {
    let head = self.operations[..self.sink]
      .iter()
      .find(|op| op.machine == machine && op.disjunctive_parent.is_none());

    let mut ops = Vec::new();
    let mut current = head.map(|op| op.id);
    while let Some(op) = current {
      ops.push(op);
      current = self.operations[op].disjunctive.map(|e| self.edges[e].to);
    }
    return ops;
  }

  /// True if `b` comes after `a` in the active order of their machine.
  pub fn is_in_order(&self, a: OpId, b: OpId) -> bool {
    let mut current = a;
    while let Some(e) = self.operations[current].disjunctive {
      current = self.edges[e].to;
      if current == b {
        return true;
      }
    }
    return false;
  }

  /// Start time of every operation, as of the last makespan calculation.
  pub fn to_solution(&self) -> Solution {
    return Solution {
      start_times: self.heads.slice(ndarray::s![..self.sink]).to_owned(),
    };
  }

  fn machine_successors(&self) -> impl Iterator<Item = Option<OpId>> + '_ {
    return self.operations[..self.sink]
      .iter()
      .map(move |op| op.disjunctive.map(|e| self.edges[e].to));
  }
}

impl PartialEq for Schedule {
  fn eq(&self, other: &Self) -> bool {
    return self.makespan == other.makespan
      && self.first_ops == other.first_ops
      && self.n_ops() == other.n_ops()
      && self.machine_successors().eq(other.machine_successors());
  }
}

impl Eq for Schedule {}

impl Hash for Schedule {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.first_ops.hash(state);
    self.makespan.hash(state);
    for successor in self.machine_successors() {
      successor.hash(state);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fixtures;
  use std::collections::hash_map::DefaultHasher;

  fn hash_of(schedule: &Schedule) -> u64 {
    let mut hasher = DefaultHasher::new();
    schedule.hash(&mut hasher);
    return hasher.finish();
  }

  #[test]
  fn template_chains_jobs_into_sink() {
    let inst = fixtures::ft06();
    let schedule = Schedule::template(&inst).unwrap();

    assert_eq!(schedule.n_ops(), 36);
    for j in 0..inst.n_jobs {
      let sequence = schedule.job_sequence(j);
      let expected: Vec<OpId> = (0..inst.n_machines).map(|o| inst.op_to_id([j, o])).collect();
      assert_eq!(sequence, expected);

      let last = *sequence.last().unwrap();
      let tail = schedule.operation(last).conjunctive().unwrap();
      assert_eq!(schedule.edge(tail).to, schedule.sink());
    }
    assert_eq!(schedule.parent_edges(schedule.sink()).len(), inst.n_jobs);
    assert!(schedule.machine_edges().is_empty());
  }

  #[test]
  fn candidates_form_machine_cliques() {
    let inst = fixtures::ft06();
    let schedule = Schedule::template(&inst).unwrap();

    for op in &schedule.operations()[..schedule.n_ops()] {
      let mut candidates = op.candidates().to_vec();
      candidates.sort();
      let expected: Vec<OpId> = inst
        .op_ids()
        .into_iter()
        .filter(|&other| other != op.id && inst.machines[other] == op.machine)
        .collect();
      assert_eq!(candidates, expected, "candidates of {}", op.id);
    }
  }

  #[test]
  fn build_activates_one_chain_per_machine() {
    let schedule = fixtures::random_schedule(3);

    assert_eq!(schedule.machine_edges().len(), 6 * 5);
    for m in 0..6 {
      assert_eq!(schedule.machine_order(m).len(), 6);
    }
    for op in &schedule.operations()[..schedule.n_ops()] {
      let incoming = schedule
        .machine_edges()
        .iter()
        .filter(|&&e| schedule.edge(e).to == op.id)
        .count();
      assert!(incoming <= 1);
    }
  }

  #[test]
  fn recorded_draws_are_deterministic() {
    let inst = fixtures::ft06();
    let draws = [4, 1, 5, 9, 2, 6, 5, 3, 5];
    let a = Schedule::from_recorded(&inst, &draws).unwrap();
    let b = Schedule::from_recorded(&inst, &draws).unwrap();

    assert_eq!(a, b);
    assert_eq!(hash_of(&a), hash_of(&b));
    assert_eq!(a.makespan(), b.makespan());
  }

  #[test]
  fn flip_swaps_adjacent_operations() {
    let mut schedule = fixtures::random_schedule(11);
    let edge = schedule.machine_edges()[2];
    let Edge { from, to, .. } = schedule.edge(edge).clone();
    let machine = schedule.operation(from).machine;

    let before = schedule.machine_order(machine);
    schedule.flip(edge);
    let after = schedule.machine_order(machine);

    let i = before.iter().position(|&op| op == from).unwrap();
    let mut expected = before.clone();
    expected.swap(i, i + 1);
    assert_eq!(after, expected);
    assert_eq!(schedule.edge(edge).from, to);
    assert_eq!(schedule.edge(edge).to, from);
    assert_eq!(schedule.edge(edge).weight, schedule.processing_time(to));
  }

  #[test]
  fn double_flip_restores_structure() {
    let mut schedule = fixtures::random_schedule(5);
    let original = schedule.clone();
    let original_hash = hash_of(&schedule);

    for &edge in original.machine_edges() {
      schedule.flip(edge);
      schedule.flip(edge);
      assert_eq!(schedule, original);
      assert_eq!(hash_of(&schedule), original_hash);
    }
  }

  #[test]
  fn is_in_order_follows_machine_chain() {
    let schedule = fixtures::random_schedule(8);
    let edge = schedule.edge(schedule.machine_edges()[0]).clone();

    assert!(schedule.is_in_order(edge.from, edge.to));
    assert!(!schedule.is_in_order(edge.to, edge.from));
  }

  #[test]
  fn locate_fails_for_unused_machine() {
    let schedule = fixtures::random_schedule(1);

    assert!(schedule.locate(0, 2).is_ok());
    assert!(matches!(schedule.locate(0, 17), Err(Error::MalformedInstance(_))));
  }
}
