//! flicast binary: wire the pieces together and run the bridge

use std::process;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use flicast::controller::ControlEvent;
use flicast::streaming::StreamingService;
use flicast::{
    Bridge, BridgeConfig, CastController, CastError, DeviceDirectory, FlicClient, MdnsDiscovery,
    SpotifyClient,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            1
        }
    };
    process::exit(code);
}

async fn run() -> Result<i32, CastError> {
    let config = BridgeConfig::from_env()?;
    info!("Setting up...");

    let (events_tx, events_rx) = mpsc::channel(64);

    let directory = Arc::new(DeviceDirectory::new(
        Arc::new(MdnsDiscovery::new()),
        events_tx.clone(),
        &config,
    ));
    directory.scan().await?;

    let streaming: Option<Arc<dyn StreamingService>> = config
        .spotify
        .clone()
        .map(|credentials| Arc::new(SpotifyClient::new(credentials)) as Arc<dyn StreamingService>);

    let controller = CastController::new(
        Arc::clone(&directory),
        streaming,
        events_tx.clone(),
        &config,
    );

    info!("Connecting to flicd at {}", config.flicd_address);
    let flic = FlicClient::connect(&config.flicd_address).await?;
    let (flic_shutdown_tx, flic_shutdown_rx) = watch::channel(false);
    let flic_task = tokio::spawn(flic.run(events_tx.clone(), flic_shutdown_rx));

    spawn_signal_listener(events_tx);

    info!("Setup completed");
    let bridge = Bridge::new(
        controller,
        directory,
        &config,
        flic_shutdown_tx,
        Some(flic_task),
    );
    Ok(bridge.run(events_rx).await)
}

fn spawn_signal_listener(events: mpsc::Sender<ControlEvent>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut term = match signal(SignalKind::terminate()) {
                Ok(term) => term,
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {e}");
                    if tokio::signal::ctrl_c().await.is_ok() {
                        let _ = events.send(ControlEvent::Shutdown { signal: "SIGINT" }).await;
                    }
                    return;
                }
            };

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    let _ = events.send(ControlEvent::Shutdown { signal: "SIGINT" }).await;
                }
                _ = term.recv() => {
                    let _ = events.send(ControlEvent::Shutdown { signal: "SIGTERM" }).await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = events.send(ControlEvent::Shutdown { signal: "SIGINT" }).await;
            }
        }
    });
}
