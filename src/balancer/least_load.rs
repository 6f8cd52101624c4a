use super::{pool::HostPool, Balancer, BalancerError, Registry, LEAST_LOAD};
use parking_lot::Mutex;
use std::{cmp::Ordering, collections::HashMap};

pub fn register(registry: &mut Registry) {
  registry.register(LEAST_LOAD, LeastLoad::factory);
}

/// Picks the host with the fewest in-flight requests.
///
/// Hosts live in an indexed binary min-heap ordered by `(load, pool index)`, so the minimum is
/// at the root and `inc`/`done` move a single entry in O(log n). Ties go to the host added
/// first. Everything sits behind one mutex because repositioning mutates the heap.
#[derive(Debug)]
pub struct LeastLoad {
  state: Mutex<LoadHeap>,
}

impl LeastLoad {
  pub fn new(hosts: Vec<String>) -> LeastLoad {
    LeastLoad {
      state: Mutex::new(LoadHeap::new(HostPool::new(hosts))),
    }
  }

  pub fn factory(hosts: Vec<String>) -> Box<dyn Balancer> {
    Box::new(LeastLoad::new(hosts))
  }
}

impl Balancer for LeastLoad {
  fn add(&self, host: &str) {
    let mut state = self.state.lock();
    if state.pool.add(host) {
      state.rebuild();
    }
  }

  fn remove(&self, host: &str) {
    let mut state = self.state.lock();
    if state.pool.remove(host) {
      state.rebuild();
    }
  }

  fn balance(&self, _key: &str) -> Result<String, BalancerError> {
    let state = self.state.lock();
    state
      .min()
      .and_then(|index| state.pool.get(index))
      .map(str::to_string)
      .ok_or(BalancerError::NoHost)
  }

  fn inc(&self, host: &str) {
    self.state.lock().adjust(host, 1);
  }

  fn done(&self, host: &str) {
    self.state.lock().adjust(host, -1);
  }
}

#[derive(Debug)]
struct LoadHeap {
  pool: HostPool,
  /// Outlive pool membership, so a host that comes back keeps its count.
  loads: HashMap<String, i64>,
  /// Pool indices in heap order.
  heap: Vec<usize>,
  /// Pool index to position in `heap`.
  positions: Vec<usize>,
  /// Host to pool index.
  indices: HashMap<String, usize>,
}

impl LoadHeap {
  fn new(pool: HostPool) -> LoadHeap {
    let mut heap = LoadHeap {
      pool,
      loads: HashMap::new(),
      heap: Vec::new(),
      positions: Vec::new(),
      indices: HashMap::new(),
    };
    heap.rebuild();
    heap
  }

  fn min(&self) -> Option<usize> {
    self.heap.first().copied()
  }

  fn adjust(&mut self, host: &str, delta: i64) {
    let load = self.loads.entry(host.to_string()).or_insert(0);
    *load = (*load + delta).max(0);

    if let Some(&index) = self.indices.get(host) {
      let position = self.positions[index];
      if delta > 0 {
        self.sift_down(position);
      } else {
        self.sift_up(position);
      }
    }
  }

  fn rebuild(&mut self) {
    let len = self.pool.len();
    self.heap = (0..len).collect();
    self.positions = (0..len).collect();
    self.indices = self
      .pool
      .hosts()
      .iter()
      .enumerate()
      .map(|(index, host)| (host.clone(), index))
      .collect();
    for position in (0..len / 2).rev() {
      self.sift_down(position);
    }
  }

  fn load(&self, index: usize) -> i64 {
    self
      .pool
      .get(index)
      .and_then(|host| self.loads.get(host))
      .copied()
      .unwrap_or(0)
  }

  fn compare(&self, a: usize, b: usize) -> Ordering {
    let (a, b) = (self.heap[a], self.heap[b]);
    self.load(a).cmp(&self.load(b)).then(a.cmp(&b))
  }

  fn swap(&mut self, a: usize, b: usize) {
    self.heap.swap(a, b);
    self.positions[self.heap[a]] = a;
    self.positions[self.heap[b]] = b;
  }

  fn sift_up(&mut self, mut position: usize) {
    while position > 0 {
      let parent = (position - 1) / 2;
      if self.compare(position, parent) != Ordering::Less {
        break;
      }
      self.swap(position, parent);
      position = parent;
    }
  }

  fn sift_down(&mut self, mut position: usize) {
    loop {
      let (left, right) = (2 * position + 1, 2 * position + 2);
      let mut smallest = position;
      if left < self.heap.len() && self.compare(left, smallest) == Ordering::Less {
        smallest = left;
      }
      if right < self.heap.len() && self.compare(right, smallest) == Ordering::Less {
        smallest = right;
      }
      if smallest == position {
        break;
      }
      self.swap(position, smallest);
      position = smallest;
    }
  }
}
