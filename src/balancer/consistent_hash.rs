use super::{
  ring::{Ring, DEFAULT_REPLICAS},
  Balancer, BalancerError, Registry, CONSISTENT_HASH,
};
use parking_lot::RwLock;

pub fn register(registry: &mut Registry) {
  registry.register(CONSISTENT_HASH, ConsistentHash::factory);
}

#[derive(Debug)]
pub struct ConsistentHash {
  ring: RwLock<Ring>,
}

impl ConsistentHash {
  pub fn new(hosts: Vec<String>) -> ConsistentHash {
    ConsistentHash::with_replicas(hosts, DEFAULT_REPLICAS)
  }

  pub fn with_replicas(hosts: Vec<String>, replicas: usize) -> ConsistentHash {
    ConsistentHash {
      ring: RwLock::new(Ring::new(hosts, replicas)),
    }
  }

  pub fn factory(hosts: Vec<String>) -> Box<dyn Balancer> {
    Box::new(ConsistentHash::new(hosts))
  }
}

impl Balancer for ConsistentHash {
  fn add(&self, host: &str) {
    self.ring.write().add(host);
  }

  fn remove(&self, host: &str) {
    self.ring.write().remove(host);
  }

  fn balance(&self, key: &str) -> Result<String, BalancerError> {
    self
      .ring
      .read()
      .locate(key)
      .map(str::to_string)
      .ok_or(BalancerError::NoHost)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::balancer::ip_hash::IPHash;

  fn hosts() -> Vec<String> {
    (1..=5).map(|i| format!("10.0.0.{}:8080", i)).collect()
  }

  fn keys() -> Vec<String> {
    (0..1000).map(|i| format!("192.168.{}.{}", i / 256, i % 256)).collect()
  }

  fn remapped_after_removal(balancer: &dyn Balancer) -> usize {
    let keys = keys();
    let before: Vec<String> = keys.iter().map(|k| balancer.balance(k).unwrap()).collect();
    balancer.remove("10.0.0.5:8080");
    keys
      .iter()
      .zip(before)
      .filter(|(key, previous)| balancer.balance(key).unwrap() != *previous)
      .count()
  }

  #[test]
  fn same_key_same_host() {
    let strategy = ConsistentHash::new(hosts());

    let host = strategy.balance("10.1.1.1").unwrap();
    for _ in 0..10 {
      assert_eq!(strategy.balance("10.1.1.1").unwrap(), host);
    }
  }

  #[test]
  fn removal_remaps_far_fewer_keys_than_ip_hash() {
    let consistent = remapped_after_removal(&ConsistentHash::new(hosts()));
    let ip_hash = remapped_after_removal(&IPHash::new(hosts()));

    assert!(consistent < 500, "consistent-hash remapped {} keys", consistent);
    assert!(ip_hash > 500, "ip-hash remapped {} keys", ip_hash);
    assert!(consistent < ip_hash);
  }

  #[test]
  fn readding_a_host_restores_the_mapping() {
    let strategy = ConsistentHash::new(hosts());
    let before: Vec<String> = keys().iter().map(|k| strategy.balance(k).unwrap()).collect();

    strategy.remove("10.0.0.2:8080");
    strategy.add("10.0.0.2:8080");

    let after: Vec<String> = keys().iter().map(|k| strategy.balance(k).unwrap()).collect();
    assert_eq!(before, after);
  }
}
