use std::time::Duration;
use thiserror::Error;

/// Failures of a single polling cycle. None of these are fatal; the poller
/// logs them and skips the cycle.
#[derive(Debug, Error)]
pub enum MeterError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("timeout during receive data (no answer within {0:?})")]
    Timeout(Duration),
    #[error("unable to decode meter data: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("meter {name:?} doesn't exist")]
    MeterMissing { name: String },
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("data file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("data file {path} is not valid yaml: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config file {path} is not valid yaml: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
