use super::{pool::HostPool, Balancer, BalancerError, Registry, ROUND_ROBIN};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn register(registry: &mut Registry) {
  registry.register(ROUND_ROBIN, RoundRobin::factory);
}

#[derive(Debug)]
pub struct RoundRobin {
  pool: RwLock<HostPool>,
  cursor: AtomicUsize,
}

impl RoundRobin {
  pub fn new(hosts: Vec<String>) -> RoundRobin {
    RoundRobin {
      pool: RwLock::new(HostPool::new(hosts)),
      cursor: AtomicUsize::new(0),
    }
  }

  pub fn factory(hosts: Vec<String>) -> Box<dyn Balancer> {
    Box::new(RoundRobin::new(hosts))
  }
}

impl Balancer for RoundRobin {
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
    // fetch_add wraps on overflow, the modulo keeps the index in range
    let index = self.cursor.fetch_add(1, Ordering::Relaxed) % pool.len();
    Ok(pool.hosts()[index].clone())
  }
}
