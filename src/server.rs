use crate::{
  configuration::Config,
  dispatcher::{Dispatcher, RouteError},
  error_response::{not_found, service_unavailable},
  listeners::RemoteAddress,
};
use futures::{Future, TryFutureExt};
use hyper::{
  server::accept::Accept,
  service::{make_service_fn, Service},
  Body, Request, Response, Server,
};
use log::debug;
use std::{
  collections::HashMap,
  error::Error,
  io,
  net::SocketAddr,
  pin::Pin,
  sync::Arc,
  task::{Context, Poll},
};
use tokio::{
  io::{AsyncRead, AsyncWrite},
  sync::Semaphore,
};

pub async fn create<I, IE, IO>(acceptor: I, shared_data: Arc<SharedData>) -> Result<(), io::Error>
where
  I: Accept<Conn = IO, Error = IE>,
  IE: Into<Box<dyn Error + Send + Sync>>,
  IO: AsyncRead + AsyncWrite + Unpin + Send + RemoteAddress + 'static,
{
  let service = make_service_fn(move |stream: &IO| {
    let client_address = stream.remote_addr();
    let shared_data = shared_data.clone();

    async move {
      Ok::<_, io::Error>(MainService {
        client_address: client_address?,
        shared_data,
      })
    }
  });
  Server::builder(acceptor)
    .serve(service)
    .map_err(|e| {
      let msg = format!("Failed to listen server: {}", e);
      io::Error::new(io::ErrorKind::Other, msg)
    })
    .await
}

/// Routes and the admission gate shared by all connections.
#[derive(Debug)]
pub struct SharedData {
  pub routes: HashMap<String, Arc<Dispatcher>>,
  pub gate: Arc<Semaphore>,
}

impl SharedData {
  pub fn new(routes: HashMap<String, Arc<Dispatcher>>, max_allowed: usize) -> SharedData {
    SharedData {
      routes,
      gate: Arc::new(Semaphore::new(max_allowed)),
    }
  }

  pub fn from_config(config: &Config) -> Result<SharedData, RouteError> {
    let routes = config
      .location
      .iter()
      .map(|location| {
        let dispatcher = Dispatcher::new(&location.proxy_pass, &location.balance_mode)?;
        Ok((location.pattern.clone(), Arc::new(dispatcher)))
      })
      .collect::<Result<HashMap<_, _>, RouteError>>()?;
    Ok(SharedData::new(routes, config.max_allowed))
  }
}

pub struct MainService {
  client_address: SocketAddr,
  shared_data: Arc<SharedData>,
}

impl Service<Request<Body>> for MainService {
  type Response = Response<Body>;
  type Error = hyper::Error;

  // let's allow this complex type. A refactor would make it more complicated due to the used trait types
  #[allow(clippy::type_complexity)]
  type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

  fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
    Poll::Ready(Ok(()))
  }

  fn call(&mut self, request: Request<Body>) -> Self::Future {
    debug!("{:#?} {} {}", request.version(), request.method(), request.uri());

    match route_by_path(&self.shared_data, &request) {
      Some(dispatcher) => {
        let gate = self.shared_data.gate.clone();
        let client_address = self.client_address;

        Box::pin(async move {
          // held until the dispatcher has produced a response
          let _permit = match gate.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return Ok(service_unavailable()),
          };
          Ok(dispatcher.dispatch(request, client_address).await)
        })
      }
      None => Box::pin(async { Ok(not_found()) }),
    }
  }
}

fn route_by_path(shared_data: &SharedData, request: &Request<Body>) -> Option<Arc<Dispatcher>> {
  shared_data.routes.get(request.uri().path()).cloned()
}
