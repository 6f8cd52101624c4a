/// The ordered set of backend hosts a strategy selects from.
///
/// Insertion order is kept (round-robin depends on it) and every host appears at most once.
/// A `HostPool` carries no lock of its own: each strategy wraps it in whatever lock its
/// access pattern needs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HostPool {
  hosts: Vec<String>,
}

impl HostPool {
  pub fn new(hosts: Vec<String>) -> HostPool {
    let mut pool = HostPool::default();
    for host in hosts {
      pool.add(&host);
    }
    pool
  }

  /// Returns true if the host was not present before.
  pub fn add(&mut self, host: &str) -> bool {
    if self.contains(host) {
      return false;
    }
    self.hosts.push(host.to_string());
    true
  }

  /// Returns true if the host was present.
  pub fn remove(&mut self, host: &str) -> bool {
    match self.position(host) {
      Some(index) => {
        self.hosts.remove(index);
        true
      }
      None => false,
    }
  }

  pub fn contains(&self, host: &str) -> bool {
    self.position(host).is_some()
  }

  fn position(&self, host: &str) -> Option<usize> {
    self.hosts.iter().position(|h| h == host)
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.hosts.get(index).map(String::as_str)
  }

  pub fn hosts(&self) -> &[String] {
    &self.hosts
  }

  pub fn len(&self) -> usize {
    self.hosts.len()
  }

  pub fn is_empty(&self) -> bool {
    self.hosts.is_empty()
  }
}
