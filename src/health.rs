use crate::balancer::Balancer;
use async_trait::async_trait;
use log::{debug, info};
use std::{
  collections::HashMap,
  fmt,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  time::Duration,
};
use tokio::{net::TcpStream, task::JoinHandle, time};

// Connection timeout of a single probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Up/down state of every backend of one route.
///
/// The set of hosts is fixed at construction, only the flags change.
#[derive(Debug)]
pub struct Liveness {
  hosts: HashMap<String, AtomicBool>,
}

impl Liveness {
  /// All hosts start out alive, matching a balancer built with the full host list.
  pub fn new<I: IntoIterator<Item = String>>(hosts: I) -> Liveness {
    Liveness {
      hosts: hosts.into_iter().map(|host| (host, AtomicBool::new(true))).collect(),
    }
  }

  pub fn is_alive(&self, host: &str) -> bool {
    self
      .hosts
      .get(host)
      .map(|alive| alive.load(Ordering::SeqCst))
      .unwrap_or(false)
  }

  /// Stores the new state and returns the previous one. Unknown hosts are ignored.
  fn set_alive(&self, host: &str, alive: bool) -> Option<bool> {
    self.hosts.get(host).map(|flag| flag.swap(alive, Ordering::SeqCst))
  }

  pub fn hosts(&self) -> impl Iterator<Item = &str> {
    self.hosts.keys().map(String::as_str)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
  Up,
  Down,
}

impl fmt::Display for Transition {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Transition::Up => write!(f, "alive"),
      Transition::Down => write!(f, "dead"),
    }
  }
}

#[async_trait]
pub trait Prober: Send + Sync + fmt::Debug {
  /// Any failure to reach the host counts as dead.
  async fn is_alive(&self, host: &str) -> bool;
}

/// Considers a host alive when a TCP connection can be opened within the timeout.
#[derive(Debug, Clone)]
pub struct TcpProber {
  timeout: Duration,
}

impl TcpProber {
  pub fn new(timeout: Duration) -> TcpProber {
    TcpProber { timeout }
  }
}

impl Default for TcpProber {
  fn default() -> Self {
    TcpProber::new(DEFAULT_PROBE_TIMEOUT)
  }
}

#[async_trait]
impl Prober for TcpProber {
  async fn is_alive(&self, host: &str) -> bool {
    match time::timeout(self.timeout, TcpStream::connect(host)).await {
      Ok(Ok(_stream)) => true,
      Ok(Err(e)) => {
        debug!("probe of {} failed: {}", host, e);
        false
      }
      Err(_) => {
        debug!("probe of {} timed out after {:?}", host, self.timeout);
        false
      }
    }
  }
}

/// Probes every host of a route and keeps its balancer in sync with the results.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
  balancer: Arc<dyn Balancer>,
  liveness: Arc<Liveness>,
  prober: Arc<dyn Prober>,
  interval: Duration,
}

impl HealthMonitor {
  pub fn new(
    balancer: Arc<dyn Balancer>,
    liveness: Arc<Liveness>,
    prober: Arc<dyn Prober>,
    interval: Duration,
  ) -> HealthMonitor {
    HealthMonitor {
      balancer,
      liveness,
      prober,
      interval,
    }
  }

  /// Starts one independent probe loop per host. The loops run until the runtime shuts down.
  pub fn spawn(&self) -> Vec<JoinHandle<()>> {
    self
      .liveness
      .hosts()
      .map(|host| {
        let monitor = self.clone();
        let host = host.to_string();
        tokio::spawn(async move { monitor.watch_host(host).await })
      })
      .collect()
  }

  async fn watch_host(self, host: String) {
    let mut interval_timer = time::interval(self.interval);
    // the first tick completes immediately, hosts are assumed alive at startup
    interval_timer.tick().await;
    loop {
      interval_timer.tick().await;
      self.check_once(&host).await;
    }
  }

  /// Probes the host once and applies the resulting transition, if any.
  pub async fn check_once(&self, host: &str) -> Option<Transition> {
    let was_alive = self.liveness.is_alive(host);
    let is_alive = self.prober.is_alive(host).await;

    let transition = match (was_alive, is_alive) {
      (true, false) => Transition::Down,
      (false, true) => Transition::Up,
      _ => return None,
    };

    self.liveness.set_alive(host, is_alive)?;
    match transition {
      Transition::Up => self.balancer.add(host),
      Transition::Down => self.balancer.remove(host),
    }
    info!("backend {} is {}", host, transition);
    Some(transition)
  }
}
