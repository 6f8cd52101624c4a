use hyper::{Body, Response, StatusCode};
use log::error;
use std::error::Error;

fn with_status<B: Into<Body>>(status: StatusCode, body: B) -> Response<Body> {
  let mut response = Response::new(body.into());
  *response.status_mut() = status;
  response
}

pub fn not_found() -> Response<Body> {
  with_status(StatusCode::NOT_FOUND, "404 - page not found")
}

pub fn handle_bad_gateway<E: Error>(error: E) -> Response<Body> {
  error!("{}", error);
  bad_gateway(Body::empty())
}

pub fn bad_gateway<B: Into<Body>>(message: B) -> Response<Body> {
  with_status(StatusCode::BAD_GATEWAY, message)
}

pub fn service_unavailable() -> Response<Body> {
  with_status(StatusCode::SERVICE_UNAVAILABLE, Body::empty())
}
