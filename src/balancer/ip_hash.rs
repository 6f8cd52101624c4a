use super::{pool::HostPool, Balancer, BalancerError, Registry, IP_HASH};
use parking_lot::RwLock;

pub fn register(registry: &mut Registry) {
  registry.register(IP_HASH, IPHash::factory);
}

/// Maps a key onto `crc32(key) % len(pool)`.
///
/// Stable for a fixed pool; changing the pool size remaps most keys.
#[derive(Debug)]
pub struct IPHash {
  pool: RwLock<HostPool>,
}

impl IPHash {
  pub fn new(hosts: Vec<String>) -> IPHash {
    IPHash {
      pool: RwLock::new(HostPool::new(hosts)),
    }
  }

  pub fn factory(hosts: Vec<String>) -> Box<dyn Balancer> {
    Box::new(IPHash::new(hosts))
  }
}

impl Balancer for IPHash {
  fn add(&self, host: &str) {
    self.pool.write().add(host);
  }

  fn remove(&self, host: &str) {
    self.pool.write().remove(host);
  }

  fn balance(&self, key: &str) -> Result<String, BalancerError> {
    let pool = self.pool.read();
    if pool.is_empty() {
      return Err(BalancerError::NoHost);
    }
    let index = crc32fast::hash(key.as_bytes()) as usize % pool.len();
    Ok(pool.hosts()[index].clone())
  }
}
