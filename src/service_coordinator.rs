use crate::config::Config;
use crate::meter_client::MeterClient;
use crate::meter_poller::MeterPoller;
use crate::persistence::DataFile;
use crate::runtime_accumulator::RuntimeAccumulator;
use crate::snapshot::Snapshot;
use crate::webservice;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Runs the three concurrent units that share the snapshot: the meter
/// poller, the periodic backup and the webserver.
pub struct ServiceCoordinator {
    snapshot: Snapshot,
    data_file: DataFile,
    tasks: Vec<JoinHandle<()>>,
}

impl ServiceCoordinator {
    /// Starts all tasks. Must be called from within a tokio runtime.
    /// `data_file` should be the handle the snapshot was restored from.
    pub fn start(config: &Config, snapshot: Snapshot, data_file: DataFile) -> Self {
        info!("Initializing service coordinator");

        let poller = MeterPoller::new(
            MeterClient::new(config.meter_url.clone()),
            config.data_collection_interval,
            snapshot.clone(),
            RuntimeAccumulator::default(),
        );

        let mut tasks = vec![
            poller.spawn(),
            data_file.spawn_backup(snapshot.clone(), config.backup_interval),
        ];

        match webservice::router(snapshot.clone(), &config.webserver.webservices) {
            Some(router) => {
                let addr = SocketAddr::from(([0, 0, 0, 0], config.webserver.port));
                tasks.push(tokio::spawn(async move {
                    match TcpListener::bind(addr).await {
                        Ok(listener) => webservice::serve(listener, router).await,
                        Err(e) => error!("unable to start webserver on {addr}: {e}"),
                    }
                }));
            }
            None => info!("No webservices enabled, webserver not started"),
        }

        info!("All tasks started successfully");
        Self {
            snapshot,
            data_file,
            tasks,
        }
    }

    /// Stops all tasks and writes the snapshot one last time. A failing
    /// final save is logged only.
    pub async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks {
            let _ = task.await;
        }

        if let Err(e) = self.data_file.save(&self.snapshot.read()).await {
            error!("final save of measurements failed: {e}");
        }
        info!("Service coordinator stopped");
    }
}
