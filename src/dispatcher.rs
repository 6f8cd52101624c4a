use crate::{
  address::{AddressError, Backend},
  balancer::{self, Balancer, BalancerError},
  error_response::{bad_gateway, handle_bad_gateway},
  health::{HealthMonitor, Liveness, Prober},
};
use async_stream::stream;
use futures::StreamExt;
use hyper::{
  client::HttpConnector,
  header::HeaderValue,
  http, Body, Client, Request, Response, Uri,
};
use log::{debug, warn};
use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};
use thiserror::Error;

pub const PROXY_NAME: &str = "Balancer-Reverse-Proxy";

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";
const X_PROXY: &str = "x-proxy";

#[derive(Debug, Error)]
pub enum RouteError {
  #[error(transparent)]
  Address(#[from] AddressError),
  #[error(transparent)]
  Balancer(#[from] BalancerError),
}

/// Reverse proxy for one route: picks a backend per request and forwards to it.
#[derive(Debug)]
pub struct Dispatcher {
  backends: HashMap<String, Backend>,
  balancer: Arc<dyn Balancer>,
  liveness: Arc<Liveness>,
  client: Client<HttpConnector, Body>,
}

impl Dispatcher {
  pub fn new(addresses: &[String], algorithm: &str) -> Result<Dispatcher, RouteError> {
    let backends = addresses
      .iter()
      .map(|address| Backend::parse(address))
      .collect::<Result<Vec<_>, _>>()?;
    let hosts = backends.iter().map(|backend| backend.host.clone()).collect();
    let balancer = balancer::build(algorithm, hosts)?;
    Ok(Dispatcher::with_balancer(backends, Arc::from(balancer)))
  }

  pub fn with_balancer(backends: Vec<Backend>, balancer: Arc<dyn Balancer>) -> Dispatcher {
    let liveness = Arc::new(Liveness::new(backends.iter().map(|backend| backend.host.clone())));
    Dispatcher {
      backends: backends
        .into_iter()
        .map(|backend| (backend.host.clone(), backend))
        .collect(),
      balancer,
      liveness,
      client: Client::new(),
    }
  }

  pub fn health_monitor(&self, prober: Arc<dyn Prober>, interval: Duration) -> HealthMonitor {
    HealthMonitor::new(self.balancer.clone(), self.liveness.clone(), prober, interval)
  }

  pub async fn dispatch(&self, request: Request<Body>, client_address: SocketAddr) -> Response<Body> {
    let key = client_ip(&request, &client_address);
    let host = match self.balancer.balance(&key) {
      Ok(host) => host,
      Err(e) => {
        warn!("no backend for {} {}: {}", request.method(), request.uri(), e);
        return bad_gateway(format!("balance error: {}", e));
      }
    };
    debug!("{} {} from {} -> {}", request.method(), request.uri(), key, host);

    let backend = match self.backends.get(&host) {
      Some(backend) => backend,
      None => return bad_gateway(format!("balance error: unknown host {}", host)),
    };

    let guard = LoadGuard::acquire(self.balancer.clone(), host);
    let backend_request = match backend_request(request, backend, &key, &client_address) {
      Ok(backend_request) => backend_request,
      Err(e) => return handle_bad_gateway(e),
    };

    match self.client.request(backend_request).await {
      Ok(response) => {
        let (parts, body) = response.into_parts();
        Response::from_parts(parts, guarded_body(body, guard))
      }
      Err(e) => handle_bad_gateway(e),
    }
  }
}

/// Marks a request as in flight on a host until dropped.
struct LoadGuard {
  balancer: Arc<dyn Balancer>,
  host: String,
}

impl LoadGuard {
  fn acquire(balancer: Arc<dyn Balancer>, host: String) -> LoadGuard {
    balancer.inc(&host);
    LoadGuard { balancer, host }
  }
}

impl Drop for LoadGuard {
  fn drop(&mut self) {
    self.balancer.done(&self.host);
  }
}

/// Keeps the guard alive until the response body is finished or dropped.
fn guarded_body(mut body: Body, guard: LoadGuard) -> Body {
  Body::wrap_stream(stream! {
    let _guard = guard;
    while let Some(chunk) = body.next().await {
      yield chunk;
    }
  })
}

/// The balancing key: first `X-Forwarded-For` entry, else `X-Real-IP`, else the peer address.
pub fn client_ip<B>(request: &Request<B>, client_address: &SocketAddr) -> String {
  let header = |name: &'static str| request.headers().get(name).and_then(|value| value.to_str().ok());

  header(X_FORWARDED_FOR)
    .and_then(|forwarded| forwarded.split(',').next())
    .or_else(|| header(X_REAL_IP))
    .map(str::trim)
    .filter(|ip| !ip.is_empty())
    .map(str::to_string)
    .unwrap_or_else(|| client_address.ip().to_string())
}

fn backend_request(
  request: Request<Body>,
  backend: &Backend,
  key: &str,
  client_address: &SocketAddr,
) -> Result<Request<Body>, http::Error> {
  let path_and_query = request
    .uri()
    .path_and_query()
    .map(|path_and_query| path_and_query.as_str())
    .unwrap_or("/");
  let uri = Uri::builder()
    .scheme(backend.scheme.as_str())
    .authority(backend.host.as_str())
    .path_and_query(path_and_query)
    .build()?;

  let forwarded_for = match request.headers().get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
    Some(previous) => format!("{}, {}", previous, client_address.ip()),
    None => client_address.ip().to_string(),
  };

  let (parts, body) = request.into_parts();
  let mut backend_request = Request::builder().method(parts.method).uri(uri).body(body)?;
  let headers = backend_request.headers_mut();
  *headers = parts.headers;
  headers.insert(X_FORWARDED_FOR, HeaderValue::from_str(&forwarded_for)?);
  headers.insert(X_REAL_IP, HeaderValue::from_str(key)?);
  headers.insert(X_PROXY, HeaderValue::from_static(PROXY_NAME));
  Ok(backend_request)
}
