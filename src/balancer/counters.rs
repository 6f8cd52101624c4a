use parking_lot::RwLock;
use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
  },
};

/// In-flight request counters, one per host.
///
/// Counters are created on the first `inc` and never dropped, so a host that leaves the pool
/// keeps a (usually zero) entry. Updates are atomic; the map lock is only taken for writing
/// when a host is seen for the first time.
#[derive(Debug, Default)]
pub struct LoadCounters {
  counters: RwLock<HashMap<String, Arc<AtomicI64>>>,
}

impl LoadCounters {
  pub fn new() -> LoadCounters {
    LoadCounters::default()
  }

  pub fn inc(&self, host: &str) {
    self.counter(host).fetch_add(1, Ordering::SeqCst);
  }

  pub fn done(&self, host: &str) {
    // a `done` without matching `inc` must not drive the count below zero
    if let Some(counter) = self.counters.read().get(host) {
      let _ = counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
        if count > 0 {
          Some(count - 1)
        } else {
          None
        }
      });
    }
  }

  pub fn load(&self, host: &str) -> i64 {
    self
      .counters
      .read()
      .get(host)
      .map(|counter| counter.load(Ordering::SeqCst))
      .unwrap_or(0)
  }

  fn counter(&self, host: &str) -> Arc<AtomicI64> {
    if let Some(counter) = self.counters.read().get(host) {
      return counter.clone();
    }
    self
      .counters
      .write()
      .entry(host.to_string())
      .or_insert_with(|| Arc::new(AtomicI64::new(0)))
      .clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::thread;

  #[test]
  fn unknown_host_has_zero_load() {
    let counters = LoadCounters::new();

    assert_eq!(counters.load("a:80"), 0);
    counters.done("a:80");
    assert_eq!(counters.load("a:80"), 0);
  }

  #[test]
  fn done_never_goes_negative() {
    let counters = LoadCounters::new();
    counters.inc("a:80");
    counters.done("a:80");
    counters.done("a:80");

    assert_eq!(counters.load("a:80"), 0);
  }

  #[test]
  fn balanced_pairs_from_many_threads_converge() {
    let counters = Arc::new(LoadCounters::new());
    counters.inc("a:80");

    let handles: Vec<_> = (0..8)
      .map(|_| {
        let counters = counters.clone();
        thread::spawn(move || {
          for _ in 0..1000 {
            counters.inc("a:80");
            counters.done("a:80");
          }
        })
      })
      .collect();
    for handle in handles {
      handle.join().unwrap();
    }

    assert_eq!(counters.load("a:80"), 1);
  }
}
