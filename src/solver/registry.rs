//! Shared best schedule with publish/subscribe notification.

use crate::graph::Schedule;
use log::{debug, trace};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

/// Search strategy that produced a published schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
  LocalSearch,
  SimulatedAnnealing,
  Firefly,
}

impl Strategy {
  pub const ALL: [Strategy; 3] = [
    Strategy::LocalSearch,
    Strategy::SimulatedAnnealing,
    Strategy::Firefly,
  ];

  fn index(self) -> usize {
    return match self {
      Strategy::LocalSearch => 0,
      Strategy::SimulatedAnnealing => 1,
      Strategy::Firefly => 2,
    };
  }
}

impl fmt::Display for Strategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Strategy::LocalSearch => "local search",
      Strategy::SimulatedAnnealing => "simulated annealing",
      Strategy::Firefly => "firefly",
    };
    return write!(f, "{}", name);
  }
}

/// Notification sent to every subscriber when a new best is installed.
#[derive(Debug, Clone)]
pub struct Update {
  pub epoch: u64,
  pub source: Strategy,
  pub previous: Option<Arc<Schedule>>,
  pub current: Arc<Schedule>,
}

#[derive(Debug)]
struct State {
  best: Option<Arc<Schedule>>,
  counts: [u64; 3],
  subscribers: Vec<Sender<Update>>,
}

#[derive(Debug)]
pub struct BestSolutionRegistry {
  /// Makespan of the installed best, `u32::MAX` while empty. Lets workers
  /// test for an improvement without taking the lock.
  upper_bound: AtomicU32,
  epoch: AtomicU64,
  state: Mutex<State>,
}

impl Default for BestSolutionRegistry {
  fn default() -> Self {
    return Self::new();
  }
}

impl BestSolutionRegistry {
  pub fn new() -> Self {
    Self {
      upper_bound: AtomicU32::new(u32::MAX),
      epoch: AtomicU64::new(0),
      state: Mutex::new(State {
        best: None,
        counts: [0; 3],
        subscribers: Vec::new(),
      }),
    }
  }

  fn lock(&self) -> MutexGuard<'_, State> {
    // A panicking worker must not take the registry down with it.
    return self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
  }

  /// Makespan of the current best, `u32::MAX` if none is installed.
  pub fn upper_bound(&self) -> u32 {
    return self.upper_bound.load(Ordering::Acquire);
  }

  /// True if a schedule with `makespan` would replace the current best.
  pub fn beats(&self, makespan: u32) -> bool {
    return makespan < self.upper_bound();
  }

  pub fn best(&self) -> Option<Arc<Schedule>> {
    return self.lock().best.clone();
  }

  pub fn epoch(&self) -> u64 {
    return self.epoch.load(Ordering::Acquire);
  }

  pub fn update_count(&self, strategy: Strategy) -> u64 {
    return self.lock().counts[strategy.index()];
  }

  /// Registers a new subscriber. Dropping the receiver unsubscribes it.
  pub fn subscribe(&self) -> Receiver<Update> {
    let (sender, receiver) = channel();
    self.lock().subscribers.push(sender);
    return receiver;
  }

  /// Installs a copy of `schedule` if it is strictly better than the current
  /// best. Swapping, counting and notifying happen under one lock, so every
  /// subscriber sees updates in installation order.
  pub fn publish(&self, schedule: &Schedule, source: Strategy) -> bool {
    let makespan = schedule.makespan();
    if !self.beats(makespan) {
      return false;
    }

    let mut state = self.lock();
    // Another publisher may have won the race for the lock.
    if let Some(best) = &state.best {
      if makespan >= best.makespan() {
        trace!("Rejected {} from {}, best is {}", makespan, source, best.makespan());
        return false;
      }
    }

    let current = Arc::new(schedule.clone());
    let previous = state.best.replace(current.clone());
    state.counts[source.index()] += 1;
    self.upper_bound.store(makespan, Ordering::Release);

    let update = Update {
      epoch: self.epoch(),
      source: source,
      previous: previous,
      current: current,
    };
    state
      .subscribers
      .retain(|subscriber| subscriber.send(update.clone()).is_ok());

    debug!("New best {} from {}", makespan, source);
    return true;
  }

  /// Clears the best schedule, counters and subscribers and starts a new
  /// epoch, which is returned.
  pub fn reset(&self) -> u64 {
    let mut state = self.lock();
    state.best = None;
    state.counts = [0; 3];
    state.subscribers.clear();
    self.upper_bound.store(u32::MAX, Ordering::Release);
    return self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fixtures;
  use std::thread;

  fn schedules_by_makespan(count: u64) -> Vec<Schedule> {
    let mut schedules: Vec<Schedule> = (0..count).map(fixtures::random_schedule).collect();
    schedules.sort_by_key(|s| std::cmp::Reverse(s.makespan()));
    return schedules;
  }

  #[test]
  fn only_strict_improvements_are_installed() {
    let registry = BestSolutionRegistry::new();
    let schedule = fixtures::random_schedule(0);

    assert!(registry.publish(&schedule, Strategy::LocalSearch));
    assert!(!registry.publish(&schedule, Strategy::Firefly));
    assert_eq!(registry.upper_bound(), schedule.makespan());
    assert_eq!(registry.update_count(Strategy::LocalSearch), 1);
    assert_eq!(registry.update_count(Strategy::Firefly), 0);
  }

  #[test]
  fn subscribers_receive_previous_and_current() {
    let registry = BestSolutionRegistry::new();
    let receiver = registry.subscribe();
    let schedules = schedules_by_makespan(12);
    let worst = &schedules[0];
    let best = schedules.last().unwrap();
    assert!(best.makespan() < worst.makespan());

    registry.publish(worst, Strategy::LocalSearch);
    registry.publish(best, Strategy::SimulatedAnnealing);

    let first = receiver.recv().unwrap();
    assert!(first.previous.is_none());
    assert_eq!(first.current.makespan(), worst.makespan());

    let second = receiver.recv().unwrap();
    assert_eq!(second.source, Strategy::SimulatedAnnealing);
    assert_eq!(second.previous.unwrap().makespan(), worst.makespan());
    assert_eq!(*second.current, *best);
  }

  #[test]
  fn dropped_subscribers_are_forgotten() {
    let registry = BestSolutionRegistry::new();
    drop(registry.subscribe());

    assert!(registry.publish(&fixtures::random_schedule(1), Strategy::Firefly));
    assert!(registry.lock().subscribers.is_empty());
  }

  #[test]
  fn reset_starts_a_new_epoch() {
    let registry = BestSolutionRegistry::new();
    registry.publish(&fixtures::random_schedule(2), Strategy::LocalSearch);

    assert_eq!(registry.reset(), 1);
    assert!(registry.best().is_none());
    assert_eq!(registry.upper_bound(), u32::MAX);
    assert_eq!(registry.update_count(Strategy::LocalSearch), 0);
    assert_eq!(registry.epoch(), 1);
  }

  #[test]
  fn racing_publishers_leave_the_minimum() {
    let registry = Arc::new(BestSolutionRegistry::new());
    let receiver = registry.subscribe();
    let schedules = schedules_by_makespan(40);
    let minimum = schedules.iter().map(|s| s.makespan()).min().unwrap();

    let handles: Vec<_> = schedules
      .chunks(10)
      .map(|chunk| {
        let registry = Arc::clone(&registry);
        let chunk = chunk.to_vec();
        thread::spawn(move || {
          for schedule in &chunk {
            registry.publish(schedule, Strategy::SimulatedAnnealing);
          }
        })
      })
      .collect();
    for handle in handles {
      handle.join().unwrap();
    }

    assert_eq!(registry.best().unwrap().makespan(), minimum);
    let published: Vec<u32> = receiver.try_iter().map(|u| u.current.makespan()).collect();
    assert!(published.windows(2).all(|w| w[1] < w[0]));
    assert_eq!(*published.last().unwrap(), minimum);
  }
}
