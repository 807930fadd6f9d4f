//! Wallbox Runtime Monitor Library
//!
//! Polls a meter gateway, derives the power drawn by a wallbox from four sub-meters,
//! classifies it as charging or idle and accumulates the charging runtime across restarts.

pub mod config;
pub mod error;
pub mod logging;
pub mod measurement;
pub mod meter_aggregator;
pub mod meter_client;
pub mod meter_poller;
pub mod persistence;
pub mod runtime_accumulator;
pub mod service_coordinator;
pub mod snapshot;
pub mod webservice;

// Re-export commonly used types for easier access
pub use config::{Cli, Config};
pub use error::{ConfigError, MeterError, PersistenceError};
pub use measurement::{Measurement, State};
pub use meter_client::MeterClient;
pub use meter_poller::MeterPoller;
pub use runtime_accumulator::RuntimeAccumulator;
pub use service_coordinator::ServiceCoordinator;
pub use snapshot::Snapshot;
