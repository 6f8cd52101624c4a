//! Consistent hashing ring.
//!
//! Every host is placed on a 32-bit ring `replicas` times, at `crc32(host + replica_index)`.
//! A key is served by the first point clockwise from `crc32(key)`, wrapping around at the end.
//! The ring is rebuilt from scratch whenever the pool changes; pool changes are rare compared to
//! lookups.

use super::pool::HostPool;
use std::collections::HashSet;

pub const DEFAULT_REPLICAS: usize = 100;

#[derive(Debug, Clone)]
pub struct Ring {
  pool: HostPool,
  replicas: usize,
  points: Vec<(u32, usize)>,
}

impl Ring {
  pub fn new(hosts: Vec<String>, replicas: usize) -> Ring {
    let mut ring = Ring {
      pool: HostPool::new(hosts),
      replicas: replicas.max(1),
      points: Vec::new(),
    };
    ring.rebuild();
    ring
  }

  pub fn add(&mut self, host: &str) {
    if self.pool.add(host) {
      self.rebuild();
    }
  }

  pub fn remove(&mut self, host: &str) {
    if self.pool.remove(host) {
      self.rebuild();
    }
  }

  pub fn pool(&self) -> &HostPool {
    &self.pool
  }

  /// The host owning the first point clockwise from the key's hash.
  pub fn locate(&self, key: &str) -> Option<&str> {
    self.walk(key).next()
  }

  /// All ring points clockwise from the key's hash, once around the ring, as host addresses.
  pub fn walk<'r>(&'r self, key: &str) -> impl Iterator<Item = &'r str> + 'r {
    let start = self.start_index(hash(key));
    let len = self.points.len();
    (0..len).map(move |offset| {
      let (_, host_index) = self.points[(start + offset) % len];
      self.pool.hosts()[host_index].as_str()
    })
  }

  /// Each host once, in the order its first point appears clockwise from the key's hash.
  pub fn candidates<'r>(&'r self, key: &str) -> impl Iterator<Item = &'r str> + 'r {
    let mut seen = HashSet::with_capacity(self.pool.len());
    self.walk(key).filter(move |host| seen.insert(*host)).take(self.pool.len())
  }

  fn start_index(&self, hash: u32) -> usize {
    let index = self.points.partition_point(|(point, _)| *point < hash);
    if index == self.points.len() {
      0
    } else {
      index
    }
  }

  fn rebuild(&mut self) {
    let hosts = self.pool.hosts();
    let mut points = Vec::with_capacity(hosts.len() * self.replicas);
    for (host_index, host) in hosts.iter().enumerate() {
      for replica in 0..self.replicas {
        points.push((hash(&format!("{}{}", host, replica)), host_index));
      }
    }
    // colliding points are ordered by host address so the owner does not depend on pool order
    points.sort_unstable_by(|(a, a_index), (b, b_index)| {
      a.cmp(b).then_with(|| hosts[*a_index].cmp(&hosts[*b_index]))
    });
    self.points = points;
  }
}

pub fn hash(key: &str) -> u32 {
  crc32fast::hash(key.as_bytes())
}
