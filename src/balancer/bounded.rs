use super::{
  counters::LoadCounters,
  ring::{Ring, DEFAULT_REPLICAS},
  Balancer, BalancerError, Registry, BOUNDED,
};
use log::debug;
use parking_lot::RwLock;

pub const DEFAULT_BOUND_FACTOR: f64 = 1.25;

pub fn register(registry: &mut Registry) {
  registry.register(BOUNDED, Bounded::factory);
}

/// Consistent hashing with bounded loads.
///
/// Walks the ring clockwise from the key and picks the first host whose in-flight count is
/// below `ceil(total / hosts * factor)`. When every host is at its cap the plain
/// consistent-hash owner is returned instead of failing the request.
#[derive(Debug)]
pub struct Bounded {
  ring: RwLock<Ring>,
  loads: LoadCounters,
  factor: f64,
}

impl Bounded {
  pub fn new(hosts: Vec<String>) -> Bounded {
    Bounded::with_factor(hosts, DEFAULT_BOUND_FACTOR)
  }

  pub fn with_factor(hosts: Vec<String>, factor: f64) -> Bounded {
    Bounded {
      ring: RwLock::new(Ring::new(hosts, DEFAULT_REPLICAS)),
      loads: LoadCounters::new(),
      factor,
    }
  }

  pub fn factory(hosts: Vec<String>) -> Box<dyn Balancer> {
    Box::new(Bounded::new(hosts))
  }

  fn ceiling(&self, ring: &Ring) -> i64 {
    let hosts = ring.pool().hosts();
    let total: i64 = hosts.iter().map(|host| self.loads.load(host)).sum();
    (total as f64 / hosts.len() as f64 * self.factor).ceil() as i64
  }
}

impl Balancer for Bounded {
  fn add(&self, host: &str) {
    self.ring.write().add(host);
  }

  fn remove(&self, host: &str) {
    self.ring.write().remove(host);
  }

  fn balance(&self, key: &str) -> Result<String, BalancerError> {
    let ring = self.ring.read();
    let owner = ring.locate(key).ok_or(BalancerError::NoHost)?;
    let ceiling = self.ceiling(&ring);
    if ceiling == 0 {
      return Ok(owner.to_string());
    }

    let found = ring.candidates(key).find(|host| self.loads.load(host) < ceiling);
    match found {
      Some(host) => Ok(host.to_string()),
      None => {
        debug!("every host is at its load ceiling of {}, using {}", ceiling, owner);
        Ok(owner.to_string())
      }
    }
  }

  fn inc(&self, host: &str) {
    self.loads.inc(host);
  }

  fn done(&self, host: &str) {
    self.loads.done(host);
  }
}
