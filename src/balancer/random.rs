use super::{pool::HostPool, Balancer, BalancerError, Registry, RANDOM};
use parking_lot::RwLock;
use rand::{thread_rng, Rng};

pub fn register(registry: &mut Registry) {
  registry.register(RANDOM, Random::factory);
}

#[derive(Debug)]
pub struct Random {
  pool: RwLock<HostPool>,
}

impl Random {
  pub fn new(hosts: Vec<String>) -> Random {
    Random {
      pool: RwLock::new(HostPool::new(hosts)),
    }
  }

  pub fn factory(hosts: Vec<String>) -> Box<dyn Balancer> {
    Box::new(Random::new(hosts))
  }
}

impl Balancer for Random {
  fn add(&self, host: &str) {
    self.pool.write().add(host);
  }

  fn remove(&self, host: &str) {
    self.pool.write().remove(host);
  }

  fn balance(&self, _key: &str) -> Result<String, BalancerError> {
    let pool = self.pool.read();
    if pool.is_empty() {
      return Err(BalancerError::NoHost);
    }
    let index = thread_rng().gen_range(0..pool.len());
    Ok(pool.hosts()[index].clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  #[test]
  fn random_eventually_reaches_every_host() {
    let strategy = Random::new(vec!["127.0.0.1:1".into(), "127.0.0.1:2".into(), "127.0.0.1:3".into()]);

    let seen: HashSet<_> = (0..300).map(|_| strategy.balance("").unwrap()).collect();

    assert_eq!(seen.len(), 3);
  }
}
