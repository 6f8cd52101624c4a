use std::fmt;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum AddressError {
  #[error("invalid backend address {0}: {1}")]
  Invalid(String, url::ParseError),
  #[error("backend address {0} uses unsupported scheme {1}, expected http or https")]
  UnsupportedScheme(String, String),
  #[error("backend address {0} has no host")]
  MissingHost(String),
}

/// A backend as configured: where to connect (`host:port`) and which scheme to speak.
///
/// The `host:port` form is the identity used by balancers and health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
  pub scheme: String,
  pub host: String,
}

impl Backend {
  /// Parses `scheme://host[:port][/path]`. Missing ports default to 80 for http and 443 for https.
  pub fn parse(address: &str) -> Result<Backend, AddressError> {
    let url = Url::parse(address).map_err(|e| AddressError::Invalid(address.to_string(), e))?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
      return Err(AddressError::UnsupportedScheme(address.to_string(), scheme.to_string()));
    }
    let host = url
      .host_str()
      .filter(|host| !host.is_empty())
      .ok_or_else(|| AddressError::MissingHost(address.to_string()))?;
    // both schemes are special, so the url crate always knows a default port
    let port = url
      .port_or_known_default()
      .ok_or_else(|| AddressError::MissingHost(address.to_string()))?;

    Ok(Backend {
      scheme: scheme.to_string(),
      host: format!("{}:{}", host, port),
    })
  }
}

impl fmt::Display for Backend {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}://{}", self.scheme, self.host)
  }
}
