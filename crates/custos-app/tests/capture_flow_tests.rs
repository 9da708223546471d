//! Integration tests for the capture lifecycle of the evidence screen.

mod common;

use std::time::Duration;

use common::{CONTRACT, Harness, config};
use custos_app::{AppError, EvidenceScreen, ScreenUpdate};
use custos_capture::{CaptureError, CaptureState, SyntheticCaptureDevice};
use custos_core::{COVER_CRIME_ENTRYPOINT, MediaKind};
use custos_ui::{PHOTO_PROMPT, RECORDING_PROMPT, ScreenMode};
use tokio::time::Instant;

async fn armed_screen(harness: &Harness) -> EvidenceScreen {
    let mut screen = EvidenceScreen::mount(&config(&[]), harness.services())
        .await
        .expect("screen should mount");
    screen
        .request_permissions()
        .await
        .expect("all permissions granted");
    screen
}

#[tokio::test(start_paused = true)]
async fn capture_flow_tests_rejects_capture_before_permissions() {
    let harness = Harness::new();
    let mut screen = EvidenceScreen::mount(&config(&[]), harness.services())
        .await
        .expect("screen should mount");

    let error = screen.start_recording().expect_err("idle screen cannot record");
    assert!(matches!(
        error,
        AppError::Capture(CaptureError::InvalidTransition {
            from: CaptureState::Idle,
            ..
        })
    ));
    assert!(screen.take_picture().is_err());
    assert!(screen.stop_recording().await.is_err());
    assert!(screen.cancel_capture().await.is_err());
    assert_eq!(screen.state(), CaptureState::Idle);
    assert_eq!(screen.view().mode, ScreenMode::Landing);
}

#[tokio::test(start_paused = true)]
async fn capture_flow_tests_ten_second_recording_is_anchored_once() {
    let harness = Harness::new();
    let mut screen = armed_screen(&harness).await;
    assert_eq!(screen.view().mode, ScreenMode::Camera);

    screen.start_recording().expect("armed screen records");
    assert!(screen.start_recording().is_err());
    assert!(screen.take_picture().is_err());

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    assert_eq!(screen.recording_seconds(), 10);
    let view = screen.view();
    assert_eq!(view.prompt, RECORDING_PROMPT);
    assert!(view.stop_visible);
    assert_eq!(view.duration_label, "10 sec");

    screen.stop_recording().await.expect("stop succeeds");
    let update = screen.next_update().await.expect("capture event");
    let ScreenUpdate::MediaReady(media) = update else {
        panic!("expected media, got {update:?}");
    };
    assert_eq!(media.kind, MediaKind::Video);
    assert_eq!(media.duration_seconds, Some(10));
    assert_eq!(media.quality_hint, "720p");
    assert_eq!(screen.state(), CaptureState::Naming);
    assert!(screen.view().naming_visible);

    screen.set_title("Incident A");
    let report = screen.submit().await.expect("submission succeeds");
    assert_eq!(report.call.entrypoint, COVER_CRIME_ENTRYPOINT);
    assert_eq!(report.call.contract_address, CONTRACT);
    assert_eq!(report.call.calldata, vec![media.uri.clone()]);
    assert_eq!(screen.state(), CaptureState::Confirmed);
    assert!(screen.view().success_visible);
    assert!(screen.media().is_none());

    let batches = harness.executor.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].1.len(), 1);
    assert!(batches[0].2.is_default());
    assert_eq!(
        harness.executor.relays(),
        vec!["https://sepolia.api.avnu.fi/".to_string()]
    );

    let registered = harness.registry.records.lock().expect("registry lock").clone();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].title, "Incident A");
    assert_eq!(registered[0].media_uri, media.uri);

    let confirmed_at = Instant::now();
    tokio::time::sleep(Duration::from_millis(1_900)).await;
    assert!(screen.drain_updates().is_empty());
    assert_eq!(screen.state(), CaptureState::Confirmed);

    assert_eq!(screen.next_update().await, Some(ScreenUpdate::ReturnedToLanding));
    assert_eq!(confirmed_at.elapsed(), Duration::from_secs(2));
    assert_eq!(screen.state(), CaptureState::Idle);
    assert_eq!(screen.title(), "");
    assert_eq!(screen.view().mode, ScreenMode::Landing);
}

#[tokio::test(start_paused = true)]
async fn capture_flow_tests_recording_stops_at_max_duration() {
    let harness = Harness::new();
    let mut screen = armed_screen(&harness).await;
    screen.start_recording().expect("armed screen records");

    let started = Instant::now();
    let update = screen.next_update().await.expect("capture event");
    assert_eq!(started.elapsed(), Duration::from_secs(60));
    let ScreenUpdate::MediaReady(media) = update else {
        panic!("expected media, got {update:?}");
    };
    assert_eq!(media.kind, MediaKind::Video);
    assert_eq!(screen.state(), CaptureState::Naming);
    assert_eq!(harness.camera.stop_calls(), 0);

    let options = harness
        .camera
        .last_recording_options()
        .expect("recording options captured");
    assert_eq!(options.max_duration_seconds, 60);
    assert_eq!(options.video_bitrate_bps, 5_000_000);
    assert!(!options.mute);
}

#[tokio::test(start_paused = true)]
async fn capture_flow_tests_stop_right_after_start_ends_clip() {
    let harness = Harness::new();
    let mut screen = armed_screen(&harness).await;

    let started = Instant::now();
    screen.start_recording().expect("armed screen records");
    screen.stop_recording().await.expect("stop succeeds");
    assert_eq!(screen.state(), CaptureState::Stopping);

    let update = screen.next_update().await.expect("capture event");
    assert_eq!(started.elapsed(), Duration::ZERO);
    let ScreenUpdate::MediaReady(media) = update else {
        panic!("expected media, got {update:?}");
    };
    assert_eq!(media.duration_seconds, Some(0));
    assert_eq!(harness.camera.stop_calls(), 1);
    assert_eq!(screen.state(), CaptureState::Naming);
}

#[tokio::test(start_paused = true)]
async fn capture_flow_tests_counter_freezes_on_stop_and_cancel() {
    let harness = Harness::new();
    let mut screen = armed_screen(&harness).await;

    screen.start_recording().expect("armed screen records");
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    let stopped = screen.duration_reader().expect("counter is running");
    screen.stop_recording().await.expect("stop succeeds");
    assert!(screen.duration_reader().is_none());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(stopped.seconds(), 3);
    assert_eq!(screen.recording_seconds(), 3);
    let update = screen.next_update().await.expect("capture event");
    let ScreenUpdate::MediaReady(media) = update else {
        panic!("expected media, got {update:?}");
    };
    assert_eq!(media.duration_seconds, Some(3));

    screen.cancel_naming().expect("naming can be cancelled");
    screen.start_recording().expect("armed screen records");
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    let cancelled = screen.duration_reader().expect("counter is running");
    screen.cancel_capture().await.expect("recording can be cancelled");

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(cancelled.seconds(), 2);
    assert_eq!(screen.state(), CaptureState::Armed);
}

#[tokio::test(start_paused = true)]
async fn capture_flow_tests_photo_then_cancel_naming_rearms() {
    let harness = Harness::new();
    let mut screen = armed_screen(&harness).await;

    screen.take_picture().expect("armed screen takes photos");
    assert_eq!(screen.view().prompt, PHOTO_PROMPT);
    let update = screen.next_update().await.expect("capture event");
    let ScreenUpdate::MediaReady(media) = update else {
        panic!("expected media, got {update:?}");
    };
    assert_eq!(media.kind, MediaKind::Photo);
    assert_eq!(media.duration_seconds, None);
    assert_eq!(media.quality_hint, "0.8");

    screen.set_title("draft");
    screen.cancel_naming().expect("naming can be cancelled");
    assert_eq!(screen.state(), CaptureState::Armed);
    assert!(screen.media().is_none());
    assert_eq!(screen.title(), "");
    assert!(harness.executor.batches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn capture_flow_tests_back_during_recording_stops_and_returns_to_landing() {
    let harness = Harness::new();
    let mut screen = armed_screen(&harness).await;
    screen.start_recording().expect("armed screen records");
    tokio::time::sleep(Duration::from_millis(3_500)).await;

    screen.back().await;
    assert_eq!(harness.camera.stop_calls(), 1);
    assert_eq!(screen.state(), CaptureState::Idle);
    assert_eq!(screen.recording_seconds(), 0);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let updates = screen.drain_updates();
    assert!(updates.iter().all(|update| *update == ScreenUpdate::Stale));
    assert_eq!(screen.state(), CaptureState::Idle);
    assert!(screen.media().is_none());
}

#[tokio::test(start_paused = true)]
async fn capture_flow_tests_cancel_capture_discards_running_recording() {
    let harness = Harness::new();
    let mut screen = armed_screen(&harness).await;
    screen.start_recording().expect("armed screen records");
    tokio::time::sleep(Duration::from_millis(4_500)).await;

    screen.cancel_capture().await.expect("recording can be cancelled");
    assert_eq!(screen.state(), CaptureState::Armed);
    assert_eq!(screen.recording_seconds(), 0);
    assert_eq!(harness.camera.stop_calls(), 1);
    assert!(screen.stop_recording().await.is_err());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(
        screen
            .drain_updates()
            .iter()
            .all(|update| *update == ScreenUpdate::Stale)
    );
    assert!(screen.media().is_none());

    screen.take_picture().expect("camera is armed again");
    let update = screen.next_update().await.expect("capture event");
    assert!(matches!(update, ScreenUpdate::MediaReady(_)));
}

#[tokio::test(start_paused = true)]
async fn capture_flow_tests_dropping_screen_freezes_duration_counter() {
    let harness = Harness::new();
    let mut screen = armed_screen(&harness).await;
    screen.start_recording().expect("armed screen records");
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    let reader = screen.duration_reader().expect("counter is running");
    assert_eq!(reader.seconds(), 2);
    drop(screen);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(reader.seconds(), 2);
}

#[tokio::test(start_paused = true)]
async fn capture_flow_tests_device_failure_rearms_camera() {
    let mut harness = Harness::new();
    harness.camera = std::sync::Arc::new(SyntheticCaptureDevice::failing("camera busy"));
    let mut screen = armed_screen(&harness).await;

    screen.take_picture().expect("armed screen takes photos");
    let update = screen.next_update().await.expect("capture event");
    assert_eq!(
        update,
        ScreenUpdate::CaptureFailed("capture device failure: camera busy".to_string())
    );
    assert_eq!(screen.state(), CaptureState::Armed);
    assert!(screen.view().capture_controls_visible);
}
