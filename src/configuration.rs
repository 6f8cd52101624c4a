use crate::{address::AddressError, address::Backend, balancer};
use log::{info, warn};
use serde::Deserialize;
use std::{collections::HashSet, fs, io, path::Path, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("could not read configuration file {0}: {1}")]
  Io(String, #[source] io::Error),
  #[error("could not parse configuration file: {0}")]
  Parse(#[from] toml::de::Error),
  #[error("{0}")]
  Invalid(String),
  #[error(transparent)]
  Address(#[from] AddressError),
}

fn default_schema() -> String {
  "http".into()
}

fn default_health_check_timeout() -> u64 {
  3
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct Config {
  #[serde(default = "default_schema")]
  pub schema: String,
  pub port: u16,
  #[serde(default)]
  pub log_level: Option<String>,
  #[serde(default)]
  pub tcp_health_check: bool,
  pub health_check_interval: u64,
  #[serde(default = "default_health_check_timeout")]
  pub health_check_timeout: u64,
  pub max_allowed: usize,
  #[serde(default)]
  pub location: Vec<Location>,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct Location {
  pub pattern: String,
  pub proxy_pass: Vec<String>,
  pub balance_mode: String,
}

impl Config {
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let toml_str = fs::read_to_string(path).map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
    Config::parse(&toml_str)
  }

  pub fn parse(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(toml_str)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.schema != "http" {
      return Err(invalid(format!(
        "the schema \"{}\" is not supported, only \"http\" is",
        self.schema
      )));
    }
    if self.port == 0 {
      return Err(invalid("port must be greater than 0"));
    }
    if self.location.is_empty() {
      return Err(invalid("at least one location is required"));
    }
    if self.health_check_interval < 1 {
      return Err(invalid("health_check_interval must be greater than 0"));
    }
    if self.max_allowed < 1 {
      return Err(invalid("max_allowed must be greater than 0"));
    }

    let mut patterns = HashSet::new();
    for location in &self.location {
      if !patterns.insert(location.pattern.as_str()) {
        return Err(invalid(format!("duplicate location pattern {}", location.pattern)));
      }
      if location.proxy_pass.is_empty() {
        return Err(invalid(format!("location {} has no proxy_pass addresses", location.pattern)));
      }
      if !balancer::registry().supports(&location.balance_mode) {
        return Err(invalid(format!(
          "location {} uses unknown balance_mode \"{}\", expected one of {}",
          location.pattern,
          location.balance_mode,
          balancer::registry().names().join(", ")
        )));
      }
      for address in &location.proxy_pass {
        let backend = Backend::parse(address)?;
        if backend.scheme != "http" {
          return Err(invalid(format!(
            "backend {} of location {} uses {}, only http backends can be forwarded to",
            backend, location.pattern, backend.scheme
          )));
        }
      }
    }
    Ok(())
  }

  pub fn health_check_interval(&self) -> Duration {
    Duration::from_secs(self.health_check_interval)
  }

  pub fn health_check_timeout(&self) -> Duration {
    Duration::from_secs(self.health_check_timeout)
  }

  pub fn print_summary(&self) {
    info!(
      "schema: {}, port: {}, tcp_health_check: {}, health_check_interval: {}s, max_allowed: {}",
      self.schema, self.port, self.tcp_health_check, self.health_check_interval, self.max_allowed
    );
    for location in &self.location {
      info!(
        "pattern: {}, balance_mode: {}, proxy_pass: {}",
        location.pattern,
        location.balance_mode,
        location.proxy_pass.join(", ")
      );
    }
    self.print_warnings();
  }

  fn print_warnings(&self) {
    if !self.tcp_health_check {
      warn!("tcp_health_check is disabled, unreachable backends stay in their pools");
    }
  }
}

fn invalid<S: Into<String>>(message: S) -> ConfigError {
  ConfigError::Invalid(message.into())
}

#[cfg(test)]
mod tests {
  use super::*;

  const VALID: &str = r#"
    port = 8089
    tcp_health_check = true
    health_check_interval = 5
    max_allowed = 100

    [[location]]
    pattern = "/"
    proxy_pass = ["http://127.0.0.1:1331", "http://127.0.0.1:1332"]
    balance_mode = "round-robin"

    [[location]]
    pattern = "/api"
    proxy_pass = ["http://127.0.0.1:1333"]
    balance_mode = "bounded"
  "#;

  fn error_message(toml_str: &str) -> String {
    Config::parse(toml_str).unwrap_err().to_string()
  }

  #[test]
  fn parses_a_full_configuration() {
    let config = Config::parse(VALID).unwrap();

    assert_eq!(config.schema, "http");
    assert_eq!(config.port, 8089);
    assert!(config.tcp_health_check);
    assert_eq!(config.health_check_interval(), Duration::from_secs(5));
    assert_eq!(config.health_check_timeout(), Duration::from_secs(3));
    assert_eq!(config.max_allowed, 100);
    assert_eq!(
      config.location[0],
      Location {
        pattern: "/".into(),
        proxy_pass: vec!["http://127.0.0.1:1331".into(), "http://127.0.0.1:1332".into()],
        balance_mode: "round-robin".into(),
      }
    );
    assert_eq!(config.location[1].balance_mode, "bounded");
  }

  #[test]
  fn rejects_unknown_balance_modes() {
    let toml_str = VALID.replace("\"bounded\"", "\"weighted\"");

    assert!(error_message(&toml_str).contains("unknown balance_mode \"weighted\""));
  }

  #[test]
  fn rejects_https_schema() {
    let toml_str = format!("schema = \"https\"\n{}", VALID);

    assert!(error_message(&toml_str).contains("not supported"));
  }

  #[test]
  fn rejects_https_backends() {
    let toml_str = VALID.replace("http://127.0.0.1:1333", "https://127.0.0.1:1333");

    assert!(error_message(&toml_str).contains("backend https://127.0.0.1:1333 of location /api uses https"));
  }

  #[test]
  fn rejects_zero_interval_and_capacity() {
    let zero_interval = VALID.replace("health_check_interval = 5", "health_check_interval = 0");
    let zero_capacity = VALID.replace("max_allowed = 100", "max_allowed = 0");

    assert!(error_message(&zero_interval).contains("health_check_interval"));
    assert!(error_message(&zero_capacity).contains("max_allowed"));
  }

  #[test]
  fn rejects_missing_locations_and_duplicates() {
    let no_locations = "port = 80\nhealth_check_interval = 1\nmax_allowed = 1\n";
    let duplicate = VALID.replace("pattern = \"/api\"", "pattern = \"/\"");

    assert!(error_message(no_locations).contains("at least one location"));
    assert!(error_message(&duplicate).contains("duplicate location pattern /"));
  }

  #[test]
  fn rejects_malformed_backend_addresses() {
    let toml_str = VALID.replace("http://127.0.0.1:1333", "127.0.0.1:1333");

    assert!(matches!(Config::parse(&toml_str), Err(ConfigError::Address(_))));
  }

  #[test]
  fn reports_parse_errors() {
    assert!(matches!(Config::parse("port = \"eighty\""), Err(ConfigError::Parse(_))));
  }

  #[test]
  fn loads_a_configuration_file() {
    let path = std::env::temp_dir().join(format!("route-balancer-{}.toml", std::process::id()));
    fs::write(&path, VALID).unwrap();

    let config = Config::load(&path);
    fs::remove_file(&path).unwrap();

    assert_eq!(config.unwrap(), Config::parse(VALID).unwrap());
  }

  #[test]
  fn reports_missing_files() {
    assert!(matches!(
      Config::load("/nonexistent/route-balancer.toml"),
      Err(ConfigError::Io(_, _))
    ));
  }
}
