use crate::error::MeterError;
use crate::measurement::{classified_power, Measurement};
use crate::meter_aggregator::aggregate;
use crate::meter_client::MeterClient;
use crate::runtime_accumulator::RuntimeAccumulator;
use crate::snapshot::Snapshot;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Periodically reads the meters and publishes the derived wallbox
/// measurement into the shared snapshot. The poller is the only writer.
pub struct MeterPoller {
    client: MeterClient,
    poll_interval: Duration,
    snapshot: Snapshot,
    accumulator: RuntimeAccumulator,
}

impl MeterPoller {
    pub fn new(
        client: MeterClient,
        poll_interval: Duration,
        snapshot: Snapshot,
        accumulator: RuntimeAccumulator,
    ) -> Self {
        Self {
            client,
            poll_interval,
            snapshot,
            accumulator,
        }
    }

    /// Spawns the poller on its own task. It runs until the task is aborted.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        info!(
            "Starting meter poller for {} every {:?}",
            self.client.meter_url(),
            self.poll_interval
        );

        let mut poll_interval = interval(self.poll_interval);
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            poll_interval.tick().await;

            if let Err(e) = self.poll_once().await {
                error!("get wallbox data: {e}");
            }
        }
    }

    /// One full cycle. On error nothing is published and the runtime
    /// bookkeeping is left as it was.
    pub async fn poll_once(&mut self) -> Result<Measurement, MeterError> {
        debug!("get data");
        let reading = self.client.fetch().await?;
        let power = aggregate(&reading)?;
        Ok(self.record(power, Utc::now(), Instant::now()))
    }

    /// Classifies `power`, accrues runtime and publishes the result.
    /// `timestamp` is only published, runtime is measured on `now`.
    pub fn record(
        &mut self,
        power: f64,
        timestamp: DateTime<Utc>,
        now: Instant,
    ) -> Measurement {
        let (state, power) = classified_power(power);
        let delta = self.accumulator.accrue(state, now);
        debug!("calc runtime: state {state:?}, power {power}W, +{delta:.6}h");

        self.snapshot.update(|prev| Measurement {
            timestamp,
            power,
            energy: prev.energy,
            state,
            runtime: prev.runtime + delta,
        })
    }

    pub fn accumulator(&self) -> &RuntimeAccumulator {
        &self.accumulator
    }
}
