use super::{counters::LoadCounters, pool::HostPool, Balancer, BalancerError, Registry, P2C};
use parking_lot::RwLock;
use rand::{seq::index::sample, thread_rng};

pub fn register(registry: &mut Registry) {
  registry.register(P2C, PowerOfTwoChoices::factory);
}

/// Power of two choices: samples two distinct hosts and takes the less loaded one.
#[derive(Debug)]
pub struct PowerOfTwoChoices {
  pool: RwLock<HostPool>,
  loads: LoadCounters,
}

impl PowerOfTwoChoices {
  pub fn new(hosts: Vec<String>) -> PowerOfTwoChoices {
    PowerOfTwoChoices {
      pool: RwLock::new(HostPool::new(hosts)),
      loads: LoadCounters::new(),
    }
  }

  pub fn factory(hosts: Vec<String>) -> Box<dyn Balancer> {
    Box::new(PowerOfTwoChoices::new(hosts))
  }
}

impl Balancer for PowerOfTwoChoices {
  fn add(&self, host: &str) {
    self.pool.write().add(host);
  }

  fn remove(&self, host: &str) {
    self.pool.write().remove(host);
  }

  fn balance(&self, _key: &str) -> Result<String, BalancerError> {
    let pool = self.pool.read();
    let hosts = pool.hosts();
    match hosts.len() {
      0 => Err(BalancerError::NoHost),
      1 => Ok(hosts[0].clone()),
      len => {
        let picks = sample(&mut thread_rng(), len, 2);
        let (first, second) = (&hosts[picks.index(0)], &hosts[picks.index(1)]);
        // ties go to the first pick
        if self.loads.load(second) < self.loads.load(first) {
          Ok(second.clone())
        } else {
          Ok(first.clone())
        }
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
