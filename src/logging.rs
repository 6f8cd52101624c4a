use log::{info, LevelFilter};
use log4rs::{
  append::console::ConsoleAppender,
  config::{Appender, Root},
  encode::pattern::PatternEncoder,
  Config,
};
use std::error::Error;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Sets up console logging. `LOG_LEVEL` in the environment wins over the configured level.
pub fn initialize(configured_level: Option<&str>) -> Result<log4rs::Handle, Box<dyn Error>> {
  let log_level = std::env::var("LOG_LEVEL")
    .ok()
    .or_else(|| configured_level.map(str::to_string))
    .unwrap_or_else(|| DEFAULT_LOG_LEVEL.into());
  let level_filter = parse_level_filter(&log_level).ok_or_else(|| format!("Invalid log level: {}", &log_level))?;

  let stdout = ConsoleAppender::builder()
    .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S)} {h({l})} {t} - {m}{n}")))
    .build();
  let config = Config::builder()
    .appender(Appender::builder().build("stdout", Box::new(stdout)))
    .build(Root::builder().appender("stdout").build(level_filter))?;

  let handle = log4rs::init_config(config)?;
  info!("Logging Level: {}", &level_filter);
  Ok(handle)
}

fn parse_level_filter(str: &str) -> Option<LevelFilter> {
  match str.to_lowercase().as_str() {
    "off" => Some(LevelFilter::Off),
    "error" => Some(LevelFilter::Error),
    "warn" => Some(LevelFilter::Warn),
    "info" => Some(LevelFilter::Info),
    "debug" => Some(LevelFilter::Debug),
    "trace" => Some(LevelFilter::Trace),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn level_names_are_case_insensitive() {
    assert_eq!(parse_level_filter("DEBUG"), Some(LevelFilter::Debug));
    assert_eq!(parse_level_filter("warn"), Some(LevelFilter::Warn));
    assert_eq!(parse_level_filter("verbose"), None);
  }
}
