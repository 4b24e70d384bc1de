use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::*;
use crate::directory::DeviceDirectory;
use crate::driver::Discovery;
use crate::streaming::{StreamingDevice, StreamingService};
use crate::testing::{FakeDiscovery, test_host};
use crate::types::{StreamType, VolumePreset};

const TARGET: &str = "Kitchen speaker";

fn config() -> BridgeConfig {
    BridgeConfig::builder().target_device(TARGET).build()
}

fn media(url: &str) -> MediaDescriptor {
    MediaDescriptor::new(url)
}

fn live_media(url: &str) -> MediaDescriptor {
    let mut media = MediaDescriptor::new(url);
    media.args.stream_type = StreamType::Live;
    media
}

async fn setup(
    config: BridgeConfig,
    hosts: &[&str],
) -> (
    CastController,
    Arc<FakeDiscovery>,
    mpsc::Receiver<ControlEvent>,
) {
    let discovery = Arc::new(FakeDiscovery::with_hosts(
        hosts.iter().map(|name| test_host(name)).collect(),
    ));
    let (tx, rx) = mpsc::channel(16);
    let directory = Arc::new(DeviceDirectory::new(
        Arc::clone(&discovery) as Arc<dyn Discovery>,
        tx.clone(),
        &config,
    ));
    directory.scan().await.unwrap();
    let controller = CastController::new(directory, None, tx, &config);
    (controller, discovery, rx)
}

#[derive(Default)]
struct FakeStreaming {
    devices: Vec<StreamingDevice>,
    started: Mutex<Vec<(String, String)>>,
    paused: Mutex<Vec<String>>,
}

#[async_trait]
impl StreamingService for FakeStreaming {
    async fn list_devices(&self) -> Result<Vec<StreamingDevice>, CastError> {
        Ok(self.devices.clone())
    }

    async fn start_playback(&self, device_id: &str, uri: &str) -> Result<(), CastError> {
        self.started
            .lock()
            .unwrap()
            .push((device_id.to_string(), uri.to_string()));
        Ok(())
    }

    async fn pause_playback(&self, device_id: &str) -> Result<(), CastError> {
        self.paused.lock().unwrap().push(device_id.to_string());
        Ok(())
    }

    async fn current_playback(&self) -> Result<Option<PlayerState>, CastError> {
        Ok(None)
    }
}

#[tokio::test]
async fn test_toggle_starts_session() {
    let (mut controller, discovery, _rx) = setup(config(), &[TARGET]).await;

    controller.toggle(&media("https://sr.example/132.mp3")).await.unwrap();

    assert_eq!(controller.state(), SessionState::Active);
    assert!(controller.is_active());
    assert!(controller.has_status_watcher());

    let connection = discovery.connection_for(TARGET);
    assert_eq!(connection.play_calls(), 1);
    assert_eq!(connection.played()[0].url, "https://sr.example/132.mp3");
}

#[tokio::test]
async fn test_toggle_while_active_tears_down() {
    let (mut controller, discovery, _rx) = setup(config(), &[TARGET]).await;
    let media = media("https://sr.example/132.mp3");

    controller.toggle(&media).await.unwrap();
    controller.toggle(&media).await.unwrap();

    assert_eq!(controller.state(), SessionState::Idle);
    assert!(!controller.is_active());

    let connection = discovery.connection_for(TARGET);
    assert_eq!(connection.play_calls(), 1);
    assert_eq!(connection.stop_calls(), 1);
    assert_eq!(connection.quit_calls(), 1);
    assert_eq!(connection.disconnect_calls(), 1);
}

#[tokio::test]
async fn test_media_volume_applied_before_play() {
    let (mut controller, discovery, _rx) = setup(config(), &[TARGET]).await;
    let mut media = media("https://sr.example/132.mp3");
    media.volume = Some(0.4);

    controller.toggle(&media).await.unwrap();

    let connection = discovery.connection_for(TARGET);
    assert_eq!(connection.volumes(), vec![0.4]);
    assert_eq!(connection.play_calls(), 1);
}

#[tokio::test]
async fn test_terminal_state_ends_session() {
    let (mut controller, discovery, _rx) = setup(config(), &[TARGET]).await;
    controller.toggle(&media("https://sr.example/132.mp3")).await.unwrap();

    controller.on_player_state(PlayerState::Playing).await;
    assert!(controller.is_active());

    controller.on_player_state(PlayerState::Idle).await;
    assert!(!controller.is_active());
    assert_eq!(discovery.connection_for(TARGET).stop_calls(), 1);
}

#[tokio::test]
async fn test_duplicate_status_is_suppressed() {
    let (mut controller, discovery, _rx) = setup(config(), &[TARGET]).await;
    controller.toggle(&media("https://sr.example/132.mp3")).await.unwrap();

    controller.on_player_state(PlayerState::Playing).await;
    controller.on_player_state(PlayerState::Playing).await;

    assert!(controller.is_active());
    assert_eq!(discovery.connection_for(TARGET).stop_calls(), 0);
}

#[tokio::test]
async fn test_status_after_clear_is_noop() {
    let (mut controller, discovery, _rx) = setup(config(), &[TARGET]).await;
    controller.toggle(&media("https://sr.example/132.mp3")).await.unwrap();

    controller.on_player_state(PlayerState::Idle).await;
    let stops = discovery.connection_for(TARGET).stop_calls();

    // A late status report after the session is gone must change nothing.
    controller.on_player_state(PlayerState::Idle).await;
    assert_eq!(discovery.connection_for(TARGET).stop_calls(), stops);
    assert_eq!(controller.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_paused_is_terminal_only_for_live() {
    let (mut controller, _discovery, _rx) = setup(config(), &[TARGET]).await;

    controller.toggle(&media("https://sr.example/132.mp3")).await.unwrap();
    controller.on_player_state(PlayerState::Paused).await;
    assert!(controller.is_active(), "PAUSED must not end a buffered session");
    controller.teardown().await;

    controller.toggle(&live_media("https://sr.example/direkt.mp3")).await.unwrap();
    controller.on_player_state(PlayerState::Paused).await;
    assert!(!controller.is_active(), "PAUSED must end a live session");
}

#[tokio::test]
async fn test_force_reset_sends_no_device_commands() {
    let (mut controller, discovery, _rx) = setup(config(), &[TARGET]).await;
    controller.toggle(&media("https://sr.example/132.mp3")).await.unwrap();

    controller.force_reset();

    assert_eq!(controller.state(), SessionState::Idle);
    let connection = discovery.connection_for(TARGET);
    assert_eq!(connection.stop_calls(), 0);
    assert_eq!(connection.quit_calls(), 0);
    assert_eq!(connection.disconnect_calls(), 0);
}

#[tokio::test]
async fn test_stop_failure_does_not_block_teardown() {
    let (mut controller, discovery, _rx) = setup(config(), &[TARGET]).await;
    let media = media("https://sr.example/132.mp3");

    controller.toggle(&media).await.unwrap();
    discovery.connection_for(TARGET).fail_next_stop();
    controller.toggle(&media).await.unwrap();

    let connection = discovery.connection_for(TARGET);
    assert_eq!(connection.quit_calls(), 1);
    assert_eq!(connection.disconnect_calls(), 1);
    assert_eq!(controller.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_volume_presets_applied_then_disconnected() {
    let mut config = config();
    config.volume_presets = vec![VolumePreset {
        device_name: "Bedroom speaker".to_string(),
        level: 0.25,
    }];
    let (mut controller, discovery, _rx) = setup(config, &[TARGET, "Bedroom speaker"]).await;

    controller.toggle(&media("https://sr.example/132.mp3")).await.unwrap();

    let aux = discovery.connection_for("Bedroom speaker");
    assert_eq!(aux.volumes(), vec![0.25]);
    assert_eq!(aux.disconnect_calls(), 1);
    assert_eq!(aux.play_calls(), 0);
    assert_eq!(discovery.connection_for(TARGET).play_calls(), 1);
}

#[tokio::test]
async fn test_missing_preset_device_does_not_block_start() {
    let mut config = config();
    config.volume_presets = vec![VolumePreset {
        device_name: "Gone speaker".to_string(),
        level: 0.25,
    }];
    let (mut controller, discovery, _rx) = setup(config, &[TARGET]).await;

    controller.toggle(&media("https://sr.example/132.mp3")).await.unwrap();

    assert!(controller.is_active());
    assert_eq!(discovery.connection_for(TARGET).play_calls(), 1);
}

#[tokio::test]
async fn test_unresolvable_media_type_fails_before_connecting() {
    let (mut controller, discovery, _rx) = setup(config(), &[TARGET]).await;

    let result = controller.toggle(&media("https://sr.example/direkt")).await;

    assert!(matches!(result, Err(CastError::UnknownMediaType { .. })));
    assert_eq!(discovery.connect_calls(), 0);
    assert_eq!(controller.state(), SessionState::Idle);
    assert!(!controller.is_active());
}

#[tokio::test]
async fn test_start_failure_resets_to_idle() {
    let (mut controller, discovery, _rx) = setup(config(), &[TARGET]).await;
    discovery.refuse_connections();

    let result = controller.toggle(&media("https://sr.example/132.mp3")).await;

    assert!(matches!(result, Err(CastError::ConnectionFailed { .. })));
    assert_eq!(controller.state(), SessionState::Idle);
    assert!(!controller.is_active());
}

#[tokio::test(start_paused = true)]
async fn test_status_watcher_reports_player_state() {
    let (mut controller, _discovery, mut rx) = setup(config(), &[TARGET]).await;
    controller.toggle(&media("https://sr.example/132.mp3")).await.unwrap();

    // The poll interval (5s) elapses long before the rescan timer (900s).
    let event = rx.recv().await.unwrap();
    assert_eq!(event, ControlEvent::PlayerStatus(PlayerState::Playing));
}

#[tokio::test]
async fn test_streaming_media_uses_streaming_service() {
    let config = config();
    let discovery = Arc::new(FakeDiscovery::with_hosts(vec![test_host(TARGET)]));
    let (tx, _rx) = mpsc::channel(16);
    let directory = Arc::new(DeviceDirectory::new(
        Arc::clone(&discovery) as Arc<dyn Discovery>,
        tx.clone(),
        &config,
    ));
    let streaming = Arc::new(FakeStreaming {
        devices: vec![StreamingDevice {
            id: "abc123".to_string(),
            name: TARGET.to_string(),
        }],
        ..FakeStreaming::default()
    });
    let mut controller = CastController::new(
        directory,
        Some(Arc::clone(&streaming) as Arc<dyn StreamingService>),
        tx,
        &config,
    );
    let media = media("spotify:playlist:37i9dQZF1DXcBWIGoYBM5M");

    controller.toggle(&media).await.unwrap();
    assert_eq!(controller.state(), SessionState::Active);
    assert!(!controller.has_status_watcher());
    assert_eq!(
        streaming.started.lock().unwrap().as_slice(),
        &[(
            "abc123".to_string(),
            "spotify:playlist:37i9dQZF1DXcBWIGoYBM5M".to_string()
        )]
    );
    // No local device was ever touched for a streaming URI.
    assert_eq!(discovery.connect_calls(), 0);

    controller.toggle(&media).await.unwrap();
    assert_eq!(
        streaming.paused.lock().unwrap().as_slice(),
        &["abc123".to_string()]
    );
}

#[tokio::test]
async fn test_streaming_media_without_service_is_an_error() {
    let (mut controller, _discovery, _rx) = setup(config(), &[TARGET]).await;

    let result = controller.toggle(&media("spotify:playlist:xyz")).await;

    assert!(matches!(result, Err(CastError::StreamingService { .. })));
    assert_eq!(controller.state(), SessionState::Idle);
}
