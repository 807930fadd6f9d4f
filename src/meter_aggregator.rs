use crate::error::MeterError;
use chrono::{DateTime, FixedOffset};
use serde_derive::Deserialize;
use std::collections::HashMap;

pub const PRIMARY_METER: &str = "primary";
pub const HEATPUMP_METER: &str = "heatpump";
pub const BOILER_METER: &str = "boiler";
pub const INVERTER_METER: &str = "inverter";

/// Key of the active power value inside a meter's measurands.
const POWER_MEASURAND: &str = "p";

/// Body returned by the meter gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct MeterPayload {
    #[serde(rename = "Time", default)]
    pub time: Option<DateTime<FixedOffset>>,
    #[serde(rename = "Measurand", default)]
    pub measurand: HashMap<String, serde_json::Value>,
}

/// Active power (W) per meter name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterReading {
    powers: HashMap<String, f64>,
}

impl MeterReading {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_power(mut self, meter: &str, power: f64) -> Self {
        self.powers.insert(meter.to_string(), power);
        self
    }

    pub fn power(&self, meter: &str) -> Result<f64, MeterError> {
        self.powers
            .get(meter)
            .copied()
            .ok_or_else(|| MeterError::MeterMissing {
                name: meter.to_string(),
            })
    }
}

impl From<MeterPayload> for MeterReading {
    /// Keeps every meter that carries a numeric "p" value. Entries of any
    /// other shape are ignored, they only matter if a required meter is
    /// affected.
    fn from(payload: MeterPayload) -> Self {
        let powers = payload
            .measurand
            .into_iter()
            .filter_map(|(meter, values)| {
                values
                    .get(POWER_MEASURAND)
                    .and_then(serde_json::Value::as_f64)
                    .map(|p| (meter, p))
            })
            .collect();
        Self { powers }
    }
}

/// Power drawn by the wallbox: whatever the grid connection delivers, minus
/// the other large loads, plus what the inverter feeds in.
///
/// All four meters are looked up; the first missing one (in the order
/// primary, heatpump, boiler, inverter) is reported.
pub fn aggregate(reading: &MeterReading) -> Result<f64, MeterError> {
    let primary = reading.power(PRIMARY_METER);
    let heatpump = reading.power(HEATPUMP_METER);
    let boiler = reading.power(BOILER_METER);
    let inverter = reading.power(INVERTER_METER);

    Ok(primary? - heatpump? - boiler? + inverter?)
}
