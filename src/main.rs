use clap::{Arg, Command};
use configuration::Config;
use health::TcpProber;
use listeners::{AcceptorProducer, Http};
use log::{error, info};
use server::SharedData;
use std::{
  error::Error,
  net::{Ipv4Addr, SocketAddr},
  sync::Arc,
};

mod address;
mod balancer;
mod configuration;
mod dispatcher;
mod error_response;
mod health;
mod listeners;
mod logging;
mod server;

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn Error>> {
  let matches = Command::new("route-balancer")
    .version(env!("CARGO_PKG_VERSION"))
    .about("Reverse proxy balancing each route over a pool of health-checked backends")
    .arg(
      Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .help("Path to the TOML configuration file")
        .takes_value(true)
        .default_value("config.toml"),
    )
    .get_matches();
  let config_path = matches.value_of("config").unwrap_or("config.toml");

  // logging is not set up yet
  let config = match Config::load(config_path) {
    Ok(config) => config,
    Err(e) => {
      eprintln!("Failed to load configuration {}: {}", config_path, e);
      return Err(e.into());
    }
  };
  logging::initialize(config.log_level.as_deref())?;
  info!("Successfully parsed configuration {}", config_path);
  config.print_summary();

  let shared_data = match SharedData::from_config(&config) {
    Ok(shared_data) => Arc::new(shared_data),
    Err(e) => {
      error!("Failed to build routes: {}", e);
      return Err(e.into());
    }
  };

  if config.tcp_health_check {
    let prober = Arc::new(TcpProber::new(config.health_check_timeout()));
    for (pattern, dispatcher) in &shared_data.routes {
      let handles = dispatcher
        .health_monitor(prober.clone(), config.health_check_interval())
        .spawn();
      info!("Watching {} backends of {}", handles.len(), pattern);
    }
  }

  let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
  let acceptor = match Http.produce_acceptor(address).await {
    Ok(acceptor) => acceptor,
    Err(e) => {
      error!("Failed to bind {}: {}", address, e);
      return Err(e.into());
    }
  };
  info!("Listening on {}", address);

  if let Err(e) = server::create(acceptor, shared_data).await {
    error!("{}", e);
    return Err(e.into());
  }
  Ok(())
}
