//! Per-benchmark tuning parameters.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceParameters {
  /// Number of schedules in the starting population.
  pub population: usize,
  pub local_search_iterations: usize,
  pub start_temperature: f64,
  pub cooling_rate: f64,
}

/// Explicit values that take precedence over the built-in table.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterOverrides {
  pub population: Option<usize>,
  pub local_search_iterations: Option<usize>,
  pub start_temperature: Option<f64>,
  pub cooling_rate: Option<f64>,
}

// (name, population, local search iterations, start temperature, cooling rate)
const TABLE: &[(&str, usize, usize, f64, f64)] = &[
  ("ft06", 80, 30, 1000.0, 0.03),
  ("ft10", 150, 60, 1000.0, 0.015),
  ("ft20", 150, 60, 1000.0, 0.02),
  ("la01", 150, 30, 1000.0, 0.025),
  ("la10", 150, 50, 1000.0, 0.02),
  ("la11", 150, 60, 1000.0, 0.02),
  ("la23", 150, 80, 1000.0, 0.012),
  ("la34", 120, 100, 1000.0, 0.002),
  ("la35", 120, 100, 1000.0, 0.002),
  ("la36", 120, 100, 1000.0, 0.002),
  ("la37", 120, 100, 1000.0, 0.002),
  ("swv11", 100, 150, 1000000.0, 0.001),
  ("swv13", 100, 150, 10000.0, 0.001),
  ("swv17", 100, 150, 10000.0, 0.001),
  ("swv18", 100, 150, 10000.0, 0.001),
  ("ta69", 80, 200, 1000000.0, 0.001),
  ("ta71", 80, 200, 1000000.0, 0.001),
  ("ta76", 80, 200, 1000000.0, 0.001),
  ("yn2", 120, 100, 1000.0, 0.0025),
  ("yn3", 120, 100, 1000.0, 0.0025),
];

// Best known makespans (optimum or best upper bound).
const KNOWN_BEST: &[(&str, u32)] = &[
  ("ft06", 55),
  ("ft10", 930),
  ("ft20", 1165),
  ("la01", 666),
  ("la10", 958),
  ("la11", 1222),
  ("la23", 1032),
  ("la34", 1721),
  ("la35", 1888),
  ("la36", 1268),
  ("la37", 1397),
  ("swv11", 2983),
  ("swv13", 3104),
  ("swv17", 2794),
  ("swv18", 2852),
  ("ta69", 3071),
  ("ta71", 5464),
  ("ta76", 5342),
  ("yn2", 904),
  ("yn3", 892),
];

impl InstanceParameters {
  /// Table entry for a benchmark name such as `ft06`.
  pub fn lookup(name: &str) -> Option<InstanceParameters> {
    return TABLE
      .iter()
      .find(|entry| entry.0 == name)
      .map(|&(_, population, iterations, temperature, rate)| InstanceParameters {
        population: population,
        local_search_iterations: iterations,
        start_temperature: temperature,
        cooling_rate: rate,
      });
  }

  /// Combines the table entry for `name` (if any) with `overrides`, which
  /// win field by field.
  pub fn resolve(name: Option<&str>, overrides: &ParameterOverrides) -> Result<InstanceParameters> {
    let base = name.and_then(InstanceParameters::lookup);
    let label = name.unwrap_or("<unnamed>");

    let missing = |field: &str| {
      Error::MissingParameters(format!(
        "no {} for instance {}; pass it explicitly",
        field, label
      ))
    };

    let params = InstanceParameters {
      population: overrides
        .population
        .or(base.map(|b| b.population))
        .ok_or_else(|| missing("population size"))?,
      local_search_iterations: overrides
        .local_search_iterations
        .or(base.map(|b| b.local_search_iterations))
        .ok_or_else(|| missing("local search iteration count"))?,
      start_temperature: overrides
        .start_temperature
        .or(base.map(|b| b.start_temperature))
        .ok_or_else(|| missing("start temperature"))?,
      cooling_rate: overrides
        .cooling_rate
        .or(base.map(|b| b.cooling_rate))
        .ok_or_else(|| missing("cooling rate"))?,
    };

    if params.population == 0 {
      return Err(Error::MissingParameters("population must not be empty".to_string()));
    }
    if !(params.cooling_rate > 0.0 && params.cooling_rate < 1.0) {
      return Err(Error::MissingParameters(format!(
        "cooling rate {} is outside (0, 1)",
        params.cooling_rate
      )));
    }

    return Ok(params);
  }
}

pub fn known_best(name: &str) -> Option<u32> {
  return KNOWN_BEST
    .iter()
    .find(|entry| entry.0 == name)
    .map(|entry| entry.1);
}
