use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

/// Power level (W) above which the wallbox counts as charging.
pub const THRESHOLD_WALLBOX: f64 = 11000.0;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    On,
    #[default]
    Off,
}

/// The latest derived measurement of the wallbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "Power")]
    pub power: f64,
    /// Reserved, always zero.
    #[serde(rename = "Energy")]
    pub energy: f64,
    #[serde(rename = "State")]
    pub state: State,
    /// Accumulated "on" time in hours.
    #[serde(rename = "Runtime")]
    pub runtime: f64,
}

impl Measurement {
    /// Starting point restored from the data file: the device is assumed off
    /// until the first successful poll says otherwise.
    pub fn restored(timestamp: DateTime<Utc>, runtime: f64) -> Self {
        Self {
            timestamp,
            power: 0.0,
            energy: 0.0,
            state: State::Off,
            runtime,
        }
    }
}

pub fn classify(power: f64) -> State {
    if power > THRESHOLD_WALLBOX {
        State::On
    } else {
        State::Off
    }
}

/// Classifies a derived power value and returns the state together with the
/// power figure that gets published. An idle wallbox always reports 0 W.
pub fn classified_power(power: f64) -> (State, f64) {
    match classify(power) {
        State::On => (State::On, power),
        State::Off => (State::Off, 0.0),
    }
}
