//! The control loop tying buttons, directory and controller together

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::controller::{CastController, ControlEvent};
use crate::directory::DeviceDirectory;
use crate::error::CastError;
use crate::types::{BridgeConfig, MediaDescriptor};

/// How long shutdown waits for the button client to close its channels.
const BUTTON_CLIENT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Single consumer of the control channel
///
/// Every trigger in the process (button clicks, status polls, the rescan
/// timer, fatal errors, signals) arrives here as a [`ControlEvent`] and is
/// handled one at a time, so the controller and directory are never
/// mutated concurrently.
pub struct Bridge {
    controller: CastController,
    directory: Arc<DeviceDirectory>,
    button_media: HashMap<String, MediaDescriptor>,
    stale_click_threshold: Duration,
    flic_shutdown: watch::Sender<bool>,
    flic_task: Option<JoinHandle<Result<(), CastError>>>,
}

impl Bridge {
    /// Assemble the bridge
    #[must_use]
    pub fn new(
        controller: CastController,
        directory: Arc<DeviceDirectory>,
        config: &BridgeConfig,
        flic_shutdown: watch::Sender<bool>,
        flic_task: Option<JoinHandle<Result<(), CastError>>>,
    ) -> Self {
        Self {
            controller,
            directory,
            button_media: config.button_media.clone(),
            stale_click_threshold: config.stale_click_threshold,
            flic_shutdown,
            flic_task,
        }
    }

    /// Run until a shutdown signal or fatal error, then release everything
    ///
    /// Returns the process exit code: 0 for a signalled shutdown, 1 when a
    /// fatal error forced the exit. The fatal path skips device commands
    /// during session release; the rest of the shutdown sequence is the
    /// same either way.
    pub async fn run(mut self, mut events: mpsc::Receiver<ControlEvent>) -> i32 {
        info!("Ready - waiting for button clicks...");

        let (code, force) = loop {
            let Some(event) = events.recv().await else {
                // Every sender is gone; nothing can ever wake us again.
                error!("Control channel closed unexpectedly");
                break (1, true);
            };

            match event {
                ControlEvent::ButtonClicked {
                    address,
                    was_queued,
                    age,
                } => {
                    if age > self.stale_click_threshold {
                        info!(
                            "Discarding click from \"{address}\" that is {age:?} old \
                             (queued: {was_queued})"
                        );
                        continue;
                    }
                    if let Err(e) = self.handle_button(&address).await {
                        error!("Fatal error while handling click: {e}");
                        break (1, true);
                    }
                }

                ControlEvent::PlayerStatus(state) => {
                    self.controller.on_player_state(state).await;
                }

                ControlEvent::RescanDue => {
                    if let Err(e) = self.directory.scan().await {
                        error!("Periodic device scan failed: {e}");
                        break (1, true);
                    }
                }

                ControlEvent::FatalError { message } => {
                    error!("Fatal error: {message}");
                    break (1, true);
                }

                ControlEvent::Shutdown { signal } => {
                    info!("Received {signal}");
                    break (0, false);
                }
            }
        };

        self.shutdown(code, force).await
    }

    async fn handle_button(&mut self, address: &str) -> Result<(), CastError> {
        let Some(media) = self.button_media.get(address).cloned() else {
            debug!("No media configured for button \"{address}\" - ignoring");
            return Ok(());
        };

        info!("Button \"{address}\" clicked");
        if let Err(e) = self.controller.toggle(&media).await {
            if !e.is_gesture_scoped() {
                return Err(e);
            }
            // A failed gesture never brings the process down.
            error!("Failed to handle click from \"{address}\": {e}");
        }
        Ok(())
    }

    async fn shutdown(mut self, code: i32, force: bool) -> i32 {
        info!("Stopping subprocesses...");

        let _ = self.flic_shutdown.send(true);
        if let Some(task) = self.flic_task.take() {
            match tokio::time::timeout(BUTTON_CLIENT_SHUTDOWN_TIMEOUT, task).await {
                Ok(Ok(Ok(()))) => debug!("Button client closed"),
                Ok(Ok(Err(e))) => warn!("Button client closed with error: {e}"),
                Ok(Err(e)) => warn!("Button client task failed: {e}"),
                Err(_) => warn!("Button client did not close in time"),
            }
        }

        self.directory.cancel_scanner();

        if force {
            info!("Releasing session without device commands");
        }
        self.controller.shutdown(force).await;

        info!("Exiting with code {code}");
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Discovery;
    use crate::testing::{FakeDiscovery, test_host};

    const TARGET: &str = "Kitchen speaker";
    const BUTTON: &str = "80:e4:da:70:32:3b";

    fn config() -> BridgeConfig {
        BridgeConfig::builder()
            .target_device(TARGET)
            .button(BUTTON, MediaDescriptor::new("https://sr.example/132.mp3"))
            .build()
    }

    async fn setup() -> (
        Bridge,
        Arc<FakeDiscovery>,
        mpsc::Sender<ControlEvent>,
        mpsc::Receiver<ControlEvent>,
    ) {
        let config = config();
        let discovery = Arc::new(FakeDiscovery::with_hosts(vec![test_host(TARGET)]));
        let (tx, rx) = mpsc::channel(16);
        let directory = Arc::new(DeviceDirectory::new(
            Arc::clone(&discovery) as Arc<dyn Discovery>,
            tx.clone(),
            &config,
        ));
        directory.scan().await.unwrap();
        let controller = CastController::new(Arc::clone(&directory), None, tx.clone(), &config);
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        let bridge = Bridge::new(controller, directory, &config, shutdown_tx, None);
        (bridge, discovery, tx, rx)
    }

    #[tokio::test]
    async fn test_click_then_shutdown_stops_playback() {
        let (bridge, discovery, tx, rx) = setup().await;

        tx.send(ControlEvent::ButtonClicked {
            address: BUTTON.to_string(),
            was_queued: false,
            age: Duration::ZERO,
        })
        .await
        .unwrap();
        tx.send(ControlEvent::Shutdown { signal: "SIGTERM" })
            .await
            .unwrap();

        let code = bridge.run(rx).await;

        assert_eq!(code, 0);
        let connection = discovery.connection_for(TARGET);
        assert_eq!(connection.play_calls(), 1);
        assert_eq!(connection.stop_calls(), 1);
        assert_eq!(connection.quit_calls(), 1);
    }

    #[tokio::test]
    async fn test_two_clicks_toggle() {
        let (bridge, discovery, tx, rx) = setup().await;

        for _ in 0..2 {
            tx.send(ControlEvent::ButtonClicked {
                address: BUTTON.to_string(),
                was_queued: false,
                age: Duration::ZERO,
            })
            .await
            .unwrap();
        }
        tx.send(ControlEvent::Shutdown { signal: "SIGINT" })
            .await
            .unwrap();

        bridge.run(rx).await;

        let connection = discovery.connection_for(TARGET);
        assert_eq!(connection.play_calls(), 1);
        assert_eq!(connection.stop_calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_click_is_discarded() {
        let (bridge, discovery, tx, rx) = setup().await;

        tx.send(ControlEvent::ButtonClicked {
            address: BUTTON.to_string(),
            was_queued: true,
            age: Duration::from_secs(30),
        })
        .await
        .unwrap();
        tx.send(ControlEvent::Shutdown { signal: "SIGINT" })
            .await
            .unwrap();

        bridge.run(rx).await;

        assert_eq!(discovery.connection_for(TARGET).play_calls(), 0);
    }

    #[tokio::test]
    async fn test_unmapped_button_is_ignored() {
        let (bridge, discovery, tx, rx) = setup().await;

        tx.send(ControlEvent::ButtonClicked {
            address: "00:00:00:00:00:01".to_string(),
            was_queued: false,
            age: Duration::ZERO,
        })
        .await
        .unwrap();
        tx.send(ControlEvent::Shutdown { signal: "SIGINT" })
            .await
            .unwrap();

        bridge.run(rx).await;

        assert_eq!(discovery.connection_for(TARGET).play_calls(), 0);
    }

    #[tokio::test]
    async fn test_fatal_error_exits_one_without_device_commands() {
        let (bridge, discovery, tx, rx) = setup().await;

        tx.send(ControlEvent::ButtonClicked {
            address: BUTTON.to_string(),
            was_queued: false,
            age: Duration::ZERO,
        })
        .await
        .unwrap();
        tx.send(ControlEvent::FatalError {
            message: "bluetooth controller detached".to_string(),
        })
        .await
        .unwrap();

        let code = bridge.run(rx).await;

        assert_eq!(code, 1);
        let connection = discovery.connection_for(TARGET);
        assert_eq!(connection.play_calls(), 1);
        // The forced path never sends stop or quit to a presumed-dead link.
        assert_eq!(connection.stop_calls(), 0);
        assert_eq!(connection.quit_calls(), 0);
    }

    #[tokio::test]
    async fn test_terminal_status_releases_session() {
        let (bridge, discovery, tx, rx) = setup().await;

        tx.send(ControlEvent::ButtonClicked {
            address: BUTTON.to_string(),
            was_queued: false,
            age: Duration::ZERO,
        })
        .await
        .unwrap();
        tx.send(ControlEvent::PlayerStatus(crate::types::PlayerState::Idle))
            .await
            .unwrap();
        tx.send(ControlEvent::Shutdown { signal: "SIGINT" })
            .await
            .unwrap();

        bridge.run(rx).await;

        let connection = discovery.connection_for(TARGET);
        // Released once by the status report; shutdown finds nothing left.
        assert_eq!(connection.stop_calls(), 1);
        assert_eq!(connection.quit_calls(), 1);
    }

    #[tokio::test]
    async fn test_rescan_due_refreshes_directory() {
        let (bridge, discovery, tx, rx) = setup().await;
        let scans_before = discovery.discover_calls();

        tx.send(ControlEvent::RescanDue).await.unwrap();
        tx.send(ControlEvent::Shutdown { signal: "SIGINT" })
            .await
            .unwrap();

        bridge.run(rx).await;

        assert_eq!(discovery.discover_calls(), scans_before + 1);
    }
}
