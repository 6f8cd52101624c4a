use async_stream::stream;
use async_trait::async_trait;
use futures::Stream;
use log::error;
use std::{
  io,
  net::SocketAddr,
  pin::Pin,
  task::{Context, Poll},
};
use tokio::net::{TcpListener, TcpStream};

pub struct HyperAcceptor<'a> {
  acceptor: Pin<Box<dyn Stream<Item = Result<TcpStream, io::Error>> + Send + 'a>>,
}

impl hyper::server::accept::Accept for HyperAcceptor<'_> {
  type Conn = TcpStream;
  type Error = io::Error;

  fn poll_accept(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Result<Self::Conn, Self::Error>>> {
    Pin::new(&mut self.acceptor).poll_next(cx)
  }
}

#[async_trait]
pub trait AcceptorProducer {
  async fn produce_acceptor(self, address: SocketAddr) -> Result<HyperAcceptor<'async_trait>, io::Error>;
}

pub struct Http;

#[async_trait]
impl AcceptorProducer for Http {
  async fn produce_acceptor(self, address: SocketAddr) -> Result<HyperAcceptor<'async_trait>, io::Error> {
    let listener = TcpListener::bind(address).await?;

    let incoming_stream = stream! {
      loop {
        match listener.accept().await {
          Ok((socket, _)) => yield Ok(socket),
          Err(e) => error!("Failed to accept TCP socket: {}", e),
        }
      }
    };

    Ok(HyperAcceptor {
      acceptor: Box::pin(incoming_stream),
    })
  }
}

pub trait RemoteAddress {
  fn remote_addr(&self) -> io::Result<SocketAddr>;
}

impl RemoteAddress for TcpStream {
  fn remote_addr(&self) -> io::Result<SocketAddr> {
    self.peer_addr()
  }
}
