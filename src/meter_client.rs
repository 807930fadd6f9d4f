use crate::error::MeterError;
use crate::meter_aggregator::{MeterPayload, MeterReading};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Hard limit for one request to the meter gateway.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Reads the meter gateway with a bounded wait.
#[derive(Debug, Clone)]
pub struct MeterClient {
    meter_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl MeterClient {
    pub fn new(meter_url: impl Into<String>) -> Self {
        Self::with_timeout(meter_url, HTTP_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(meter_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            meter_url: meter_url.into(),
            timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn meter_url(&self) -> &str {
        &self.meter_url
    }

    /// Fetches and decodes one payload. If the deadline fires first the
    /// request is dropped and [`MeterError::Timeout`] is returned; a late
    /// answer can never be reported as success.
    pub async fn fetch(&self) -> Result<MeterReading, MeterError> {
        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.request()).await;
        debug!(
            "runtime to request meter data: {:.3}s",
            start.elapsed().as_secs_f64()
        );

        match result {
            Ok(payload) => Ok(MeterReading::from(payload?)),
            Err(_) => Err(MeterError::Timeout(self.timeout)),
        }
    }

    async fn request(&self) -> Result<MeterPayload, MeterError> {
        trace!("performing http get: {}", self.meter_url);
        let body = self
            .client
            .get(&self.meter_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
