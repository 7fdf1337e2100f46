//! Acceptance memory for recently flipped edges and the most-contended edge
//! selection built on top of it.

use crate::graph::EdgeId;
use itertools::Itertools;
use log::trace;
use rand::Rng;
use std::cmp::Reverse;
use std::collections::{HashMap, VecDeque};

/// Acceptance probability of an edge the first time it is flipped.
pub const INITIAL_ACCEPTANCE: f64 = 0.9;
/// Factor applied to the acceptance probability on every further flip.
pub const DECAY: f64 = 0.9;

/// Fixed-capacity memory of flipped edges, least recently used first.
#[derive(Debug, Clone)]
pub struct TabuCache {
  capacity: usize,
  entries: VecDeque<(EdgeId, f64)>,
}

impl TabuCache {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity: capacity,
      entries: VecDeque::with_capacity(capacity + 1),
    }
  }

  pub fn capacity(&self) -> usize {
    return self.capacity;
  }

  pub fn len(&self) -> usize {
    return self.entries.len();
  }

  pub fn is_empty(&self) -> bool {
    return self.entries.is_empty();
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }

  fn touch(&mut self, edge: EdgeId) -> Option<f64> {
    let idx = self.entries.iter().position(|&(e, _)| e == edge)?;
    let entry = self.entries.remove(idx)?;
    self.entries.push_back(entry);
    return Some(entry.1);
  }

  /// Current acceptance probability of `edge`, if it was flipped recently.
  /// Looking an edge up counts as using it.
  pub fn acceptance_probability(&mut self, edge: EdgeId) -> Option<f64> {
    return self.touch(edge);
  }

  /// Remembers a flip of `edge`, decaying its probability if it is already
  /// known and evicting the least recently used entry when full.
  pub fn record(&mut self, edge: EdgeId) {
    if self.touch(edge).is_some() {
      if let Some(entry) = self.entries.back_mut() {
        entry.1 *= DECAY;
      }
      return;
    }

    self.entries.push_back((edge, INITIAL_ACCEPTANCE));
    while self.entries.len() > self.capacity {
      if let Some((evicted, _)) = self.entries.pop_front() {
        trace!("Evicted edge {} from tabu memory", evicted);
      }
    }
  }
}

/// Picks the edge occurring most often in `candidates`.
///
/// With a tabu cache, an edge flipped before is only taken if a uniform draw
/// falls below its acceptance probability; otherwise it is dropped and the next
/// most frequent edge is tried. The chosen and the dropped edges are removed
/// from `candidates`, and the chosen edge is recorded in the cache.
pub fn select_most_contended_edge<R: Rng>(
  mut tabu: Option<&mut TabuCache>,
  candidates: &mut Vec<EdgeId>,
  rng: &mut R,
) -> Option<EdgeId> {
  let mut counts: HashMap<EdgeId, usize> = HashMap::new();
  for &edge in candidates.iter() {
    *counts.entry(edge).or_insert(0) += 1;
  }

  let ranked: Vec<EdgeId> = counts
    .into_iter()
    .sorted_by_key(|&(edge, count)| (Reverse(count), edge))
    .map(|(edge, _)| edge)
    .collect();

  for edge in ranked {
    candidates.retain(|&e| e != edge);

    if let Some(cache) = tabu.as_mut() {
      if let Some(probability) = cache.acceptance_probability(edge) {
        if rng.gen::<f64>() >= probability {
          trace!("Tabu rejected edge {} (p = {:.3})", edge, probability);
          continue;
        }
      }
      cache.record(edge);
    }

    return Some(edge);
  }

  return None;
}
