use crate::data::Instance;
use crate::error::{Error, Result};
use ndarray::Array1;
use std::fs;
use std::path::Path;

pub fn parse_instance(instance: &str) -> Result<Instance> {
  let mut lines = instance.lines().filter(|l| !l.trim().is_empty());

  let prelude = lines
    .next()
    .ok_or_else(|| Error::MalformedInstance("prelude missing".to_string()))?;
  let prelude_items: Vec<&str> = prelude.split_whitespace().collect();
  let n_jobs: usize = prelude_items
    .get(0)
    .ok_or_else(|| Error::MalformedInstance("n_jobs missing".to_string()))?
    .parse()?;
  let n_machines: usize = prelude_items
    .get(1)
    .ok_or_else(|| Error::MalformedInstance("n_machines missing".to_string()))?
    .parse()?;

  let mut instance = Instance {
    n_jobs: n_jobs,
    n_machines: n_machines,
    durations: Array1::<u32>::from_elem(n_jobs * n_machines, 0),
    machines: Array1::<usize>::from_elem(n_jobs * n_machines, 0),
  };

  let mut n_lines = 0;
  for (job, line) in lines.enumerate() {
    if job >= n_jobs {
      return Err(Error::MalformedInstance(format!(
        "found more than {} job lines",
        n_jobs
      )));
    }

    let items: Vec<&str> = line.split_whitespace().collect();
    if items.len() != 2 * n_machines {
      return Err(Error::MalformedInstance(format!(
        "job {} lists {} values, expected {} machine/time pairs",
        job,
        items.len(),
        n_machines
      )));
    }

    for i in (0..items.len()).step_by(2) {
      let machine: usize = items[i].parse()?;
      let duration: u32 = items[i + 1].parse()?;

      let o = i / 2;
      let op = instance.op_to_id([job, o]);
      instance.durations[op] = duration;
      instance.machines[op] = machine;
    }
    n_lines += 1;
  }

  if n_lines != n_jobs {
    return Err(Error::MalformedInstance(format!(
      "expected {} job lines, found {}",
      n_jobs, n_lines
    )));
  }

  instance.validate()?;

  Ok(instance)
}

pub fn read_instance<P: AsRef<Path>>(path: P) -> Result<Instance> {
  let contents = fs::read_to_string(path)?;
  return parse_instance(&contents);
}
