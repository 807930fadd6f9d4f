use anyhow::Context;
use clap::Parser;
use tracing::info;
use wallbox_monitor::persistence::DataFile;
use wallbox_monitor::{logging, Cli, Config, Measurement, ServiceCoordinator, Snapshot};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli)?;
    logging::init(config.debug.level, &config.debug.target)
        .context("unable to open debug file")?;

    info!("Starting wallbox monitor");
    let data_file = DataFile::new(config.data_file.clone());
    let persisted = data_file.load_or_create().context("can't open data file")?;
    info!(
        "restored runtime {:.3}h from {}",
        persisted.runtime,
        config.data_file.display()
    );

    let snapshot = Snapshot::new(Measurement::restored(persisted.timestamp, persisted.runtime));
    let coordinator = ServiceCoordinator::start(&config, snapshot, data_file);

    let signal = shutdown_signal().await;
    info!("Got {signal} signal. Aborting...");
    coordinator.shutdown().await;

    Ok(())
}

/// Waits for Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("unable to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("unable to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "interrupt",
        _ = terminate => "terminate",
    }
}
