use std::{collections::HashMap, sync::OnceLock};
use thiserror::Error;

pub mod bounded;
pub mod consistent_hash;
pub mod counters;
pub mod ip_hash;
pub mod least_load;
pub mod p2c;
pub mod pool;
pub mod random;
pub mod ring;
pub mod round_robin;

pub const ROUND_ROBIN: &str = "round-robin";
pub const RANDOM: &str = "random";
pub const IP_HASH: &str = "ip-hash";
pub const CONSISTENT_HASH: &str = "consistent-hash";
pub const P2C: &str = "p2c";
pub const LEAST_LOAD: &str = "least-load";
pub const BOUNDED: &str = "bounded";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalancerError {
  #[error("no host")]
  NoHost,
  #[error("algorithm not supported: {0}")]
  AlgorithmNotSupported(String),
}

/// A load balancing strategy over a mutable set of hosts.
///
/// All methods take `&self` so one instance can be shared between request handlers and the
/// health monitor. `add` and `remove` are idempotent, `balance` fails only with
/// [`BalancerError::NoHost`] when the pool is empty.
pub trait Balancer: Send + Sync + std::fmt::Debug {
  fn add(&self, host: &str);

  fn remove(&self, host: &str);

  /// Selects a host for the given key. Key-independent strategies ignore it, so it may be empty.
  fn balance(&self, key: &str) -> Result<String, BalancerError>;

  /// A request started on `host`.
  fn inc(&self, _host: &str) {}

  /// A request on `host` finished.
  fn done(&self, _host: &str) {}
}

pub type Factory = fn(Vec<String>) -> Box<dyn Balancer>;

/// Maps algorithm names to the constructors of their strategies.
#[derive(Debug, Default)]
pub struct Registry {
  factories: HashMap<&'static str, Factory>,
}

impl Registry {
  pub fn new() -> Registry {
    Registry::default()
  }

  /// A registry holding every built-in strategy.
  pub fn with_builtin() -> Registry {
    let mut registry = Registry::new();
    round_robin::register(&mut registry);
    random::register(&mut registry);
    ip_hash::register(&mut registry);
    consistent_hash::register(&mut registry);
    p2c::register(&mut registry);
    least_load::register(&mut registry);
    bounded::register(&mut registry);
    registry
  }

  pub fn register(&mut self, name: &'static str, factory: Factory) {
    self.factories.insert(name, factory);
  }

  pub fn supports(&self, name: &str) -> bool {
    self.factories.contains_key(name)
  }

  pub fn names(&self) -> Vec<&'static str> {
    let mut names: Vec<_> = self.factories.keys().copied().collect();
    names.sort_unstable();
    names
  }

  pub fn build(&self, name: &str, hosts: Vec<String>) -> Result<Box<dyn Balancer>, BalancerError> {
    let factory = self
      .factories
      .get(name)
      .ok_or_else(|| BalancerError::AlgorithmNotSupported(name.to_string()))?;
    Ok(factory(hosts))
  }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry. It is populated once, on first access, and never changes afterwards.
pub fn registry() -> &'static Registry {
  REGISTRY.get_or_init(Registry::with_builtin)
}

pub fn build(name: &str, hosts: Vec<String>) -> Result<Box<dyn Balancer>, BalancerError> {
  registry().build(name, hosts)
}

#[cfg(test)]
mod tests {
  use super::*;

  const ALL: [&str; 7] = [ROUND_ROBIN, RANDOM, IP_HASH, CONSISTENT_HASH, P2C, LEAST_LOAD, BOUNDED];

  fn hosts() -> Vec<String> {
    vec!["127.0.0.1:1".into(), "127.0.0.1:2".into(), "127.0.0.1:3".into()]
  }

  #[test]
  fn registry_knows_every_builtin_name() {
    assert_eq!(
      registry().names(),
      vec![BOUNDED, CONSISTENT_HASH, IP_HASH, LEAST_LOAD, P2C, RANDOM, ROUND_ROBIN]
    );
  }

  #[test]
  fn build_unknown_algorithm_fails() {
    let error = build("weighted", hosts()).unwrap_err();

    assert_eq!(error, BalancerError::AlgorithmNotSupported("weighted".into()));
  }

  #[test]
  fn custom_strategies_can_be_registered() {
    let mut registry = Registry::new();
    registry.register("first", round_robin::RoundRobin::factory);

    assert!(registry.supports("first"));
    assert_eq!(registry.build("first", hosts()).unwrap().balance("").unwrap(), "127.0.0.1:1");
  }

  #[test]
  fn every_strategy_selects_a_pooled_host() {
    for name in ALL {
      let balancer = build(name, hosts()).unwrap();
      for key in ["", "10.0.0.1", "192.168.1.20", "client"] {
        let host = balancer.balance(key).unwrap();
        assert!(hosts().contains(&host), "{} returned {}", name, host);
      }
    }
  }

  #[test]
  fn every_strategy_fails_on_an_empty_pool() {
    for name in ALL {
      let balancer = build(name, vec![]).unwrap();
      assert_eq!(balancer.balance("10.0.0.1"), Err(BalancerError::NoHost), "{}", name);

      balancer.add("127.0.0.1:1");
      balancer.remove("127.0.0.1:1");
      assert_eq!(balancer.balance("10.0.0.1"), Err(BalancerError::NoHost), "{}", name);
    }
  }

  #[test]
  fn removed_hosts_are_never_selected() {
    for name in ALL {
      let balancer = build(name, hosts()).unwrap();
      balancer.remove("127.0.0.1:2");
      for i in 0..50 {
        let host = balancer.balance(&format!("10.0.0.{}", i)).unwrap();
        assert_ne!(host, "127.0.0.1:2", "{}", name);
      }

      balancer.add("127.0.0.1:4");
      let selected: Vec<_> = (0..50)
        .map(|i| balancer.balance(&format!("10.0.1.{}", i)).unwrap())
        .collect();
      assert!(selected.iter().all(|h| h != "127.0.0.1:2"), "{}", name);
    }
  }

  #[test]
  fn concurrent_mutation_and_selection() {
    use std::{sync::Arc, thread};

    for name in ALL {
      let balancer: Arc<dyn Balancer> = Arc::from(build(name, hosts()).unwrap());
      let mutator = {
        let balancer = balancer.clone();
        thread::spawn(move || {
          for _ in 0..200 {
            balancer.remove("127.0.0.1:3");
            balancer.add("127.0.0.1:3");
          }
        })
      };
      let selectors: Vec<_> = (0..4)
        .map(|t| {
          let balancer = balancer.clone();
          thread::spawn(move || {
            for i in 0..200 {
              let host = balancer.balance(&format!("10.{}.0.{}", t, i)).unwrap();
              balancer.inc(&host);
              assert!(hosts().contains(&host));
              balancer.done(&host);
            }
          })
        })
        .collect();

      mutator.join().unwrap();
      for selector in selectors {
        selector.join().unwrap();
      }
    }
  }
}
