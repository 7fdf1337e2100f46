use crate::error::{Error, Result};
use ndarray::Array1;

pub type Machine = usize;
pub type Duration = u32;
pub type Time = u32;

/// `[job, position]` of an operation within its job route.
pub type Op = [usize; 2];

pub type OpId = usize;

#[derive(Debug, Clone)]
pub struct Instance {
  pub n_machines: usize,
  pub n_jobs: usize,

  pub durations: Array1<Duration>,
  pub machines: Array1<Machine>,
}

#[derive(Debug, Clone)]
pub struct Solution {
  pub start_times: Array1<Time>,
}

impl Instance {
  pub fn ops(&self) -> Vec<Op> {
    let mut nodes = Vec::new();

    for j in 0..self.n_jobs {
      for o in 0..self.n_machines {
        nodes.push([j, o]);
      }
    }

    return nodes;
  }

  pub fn op_ids(&self) -> Vec<OpId> {
    return self.ops().into_iter().map(|op| self.op_to_id(op)).collect();
  }

  pub fn op_to_id(&self, op: Op) -> OpId {
    let [j, o] = op;
    return j * self.n_machines + o;
  }

  pub fn op_from_id(&self, id: OpId) -> Op {
    let j = id / self.n_machines;
    let o = id % self.n_machines;
    return [j, o];
  }

  pub fn shape(&self) -> (usize, usize) {
    return (self.n_jobs, self.n_machines);
  }

  pub fn n_ops(&self) -> usize {
    return self.n_jobs * self.n_machines;
  }

  /// Checks that every job visits every machine exactly once.
  pub fn validate(&self) -> Result<()> {
    if self.n_jobs == 0 || self.n_machines == 0 {
      return Err(Error::MalformedInstance(format!(
        "instance has {} jobs and {} machines",
        self.n_jobs, self.n_machines
      )));
    }

    if self.durations.len() != self.n_ops() || self.machines.len() != self.n_ops() {
      return Err(Error::MalformedInstance(format!(
        "expected {} operations, found {} durations and {} machines",
        self.n_ops(),
        self.durations.len(),
        self.machines.len()
      )));
    }

    for j in 0..self.n_jobs {
      let mut visited = Array1::<bool>::from_elem(self.n_machines, false);
      for o in 0..self.n_machines {
        let m = self.machines[self.op_to_id([j, o])];
        if m >= self.n_machines {
          return Err(Error::MalformedInstance(format!(
            "job {} uses machine {} but there are only {} machines",
            j, m, self.n_machines
          )));
        }
        if visited[m] {
          return Err(Error::MalformedInstance(format!(
            "job {} visits machine {} twice",
            j, m
          )));
        }
        visited[m] = true;
      }
    }

    Ok(())
  }
}
