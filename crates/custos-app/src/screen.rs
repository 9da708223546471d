//! Evidence capture screen controller.
//!
//! One [`EvidenceScreen`] per mounted screen. Every operation takes
//! `&mut self`, so at most one capture and one submission can be in flight.
//! Device work and the confirmation timer run as tokio tasks that report back
//! through an epoch-tagged channel; events from an earlier epoch are dropped.

use std::sync::Arc;
use std::time::Duration;

use custos_capture::{
    CaptureDevice, CaptureError, CaptureMachine, CaptureState, DurationCounter, DurationReader,
    MediaHandle, PhotoOptions, RecordingOptions, media_from_handle,
};
use custos_core::{CapturedMedia, EvidenceRecord, MediaKind, SubmissionParameters, WalletAccount};
use custos_permissions::{GrantedSet, PermissionGateway, PermissionProvider};
use custos_submission::{
    AccountProvider, ContractRegistry, FeeTokenPolicy, GasPricing, GaslessExecutor, MediaLibrary,
    RecordingRegistry, SubmissionError, SubmissionPipeline, SubmissionReport, refresh_pricing,
};
use custos_ui::{ScreenView, ViewInput};
use time::OffsetDateTime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::{AppConfig, AppError};

/// Collaborators injected into the screen.
#[derive(Clone)]
pub struct ScreenServices {
    /// Platform permission API.
    pub permissions: Arc<dyn PermissionProvider>,
    /// Camera.
    pub camera: Arc<dyn CaptureDevice>,
    /// Device media library.
    pub library: Arc<dyn MediaLibrary>,
    /// Off-chain recording registry.
    pub registry: Arc<dyn RecordingRegistry>,
    /// Gasless executor.
    pub executor: Arc<dyn GaslessExecutor>,
    /// Fee token price feed.
    pub pricing: Arc<dyn GasPricing>,
    /// Wallet account store.
    pub accounts: Arc<dyn AccountProvider>,
}

/// Effect of one processed background event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenUpdate {
    /// Capture finished; the naming step is open.
    MediaReady(CapturedMedia),
    /// Capture failed; the camera is armed again.
    CaptureFailed(String),
    /// Confirmation window elapsed; the landing surface is shown.
    ReturnedToLanding,
    /// Event belonged to a cancelled capture or an abandoned screen state.
    Stale,
}

#[derive(Debug)]
struct ScreenEvent {
    epoch: u64,
    kind: EventKind,
}

#[derive(Debug)]
enum EventKind {
    Captured {
        kind: MediaKind,
        result: Result<MediaHandle, CaptureError>,
    },
    ConfirmationElapsed,
}

/// Evidence capture and submission controller.
pub struct EvidenceScreen {
    machine: CaptureMachine,
    gateway: PermissionGateway,
    camera: Arc<dyn CaptureDevice>,
    pipeline: SubmissionPipeline,
    pricing: Arc<dyn GasPricing>,
    accounts: Arc<dyn AccountProvider>,
    fee_policy: FeeTokenPolicy,
    recording_options: RecordingOptions,
    photo_options: PhotoOptions,
    confirmation_display: Duration,
    capture_enabled: bool,
    granted: Option<GrantedSet>,
    counter: Option<DurationCounter>,
    recording_seconds: u32,
    capture_task: Option<JoinHandle<()>>,
    capture_issued: Option<oneshot::Receiver<()>>,
    confirmation_task: Option<JoinHandle<()>>,
    events_tx: UnboundedSender<ScreenEvent>,
    events_rx: UnboundedReceiver<ScreenEvent>,
    epoch: u64,
    title: String,
    pending_record: Option<EvidenceRecord>,
    error_message: Option<String>,
    account: Option<WalletAccount>,
    parameters: SubmissionParameters,
}

impl EvidenceScreen {
    /// Creates a screen in `Idle` without reading the account store.
    ///
    /// # Errors
    /// Returns [`AppError::Submission`] when the configured contract address
    /// is malformed.
    pub fn new(config: &AppConfig, services: ScreenServices) -> Result<Self, AppError> {
        let contracts = ContractRegistry::new(config.evidence_contract.clone())?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            machine: CaptureMachine::new(),
            gateway: PermissionGateway::new(services.permissions, config.gate_policy),
            camera: services.camera,
            pipeline: SubmissionPipeline::new(
                services.library,
                services.registry,
                services.executor,
                contracts,
                config.relay.clone(),
            ),
            pricing: services.pricing,
            accounts: services.accounts,
            fee_policy: config.fee_policy.clone(),
            recording_options: config.recording.clone(),
            photo_options: config.photo.clone(),
            confirmation_display: config.confirmation_display,
            capture_enabled: config.capture_enabled,
            granted: None,
            counter: None,
            recording_seconds: 0,
            capture_task: None,
            capture_issued: None,
            confirmation_task: None,
            events_tx,
            events_rx,
            epoch: 0,
            title: String::new(),
            pending_record: None,
            error_message: None,
            account: None,
            parameters: SubmissionParameters::default(),
        })
    }

    /// Creates a screen and reads the active account, as on mount.
    ///
    /// # Errors
    /// Propagates [`EvidenceScreen::new`] and account store errors.
    pub async fn mount(config: &AppConfig, services: ScreenServices) -> Result<Self, AppError> {
        let mut screen = Self::new(config, services)?;
        screen.refresh_account().await?;
        Ok(screen)
    }

    /// Returns the capture state.
    pub fn state(&self) -> CaptureState {
        self.machine.state()
    }

    /// Returns the media waiting in the naming step.
    pub fn media(&self) -> Option<&CapturedMedia> {
        self.machine.media()
    }

    /// Returns the displayed recording seconds.
    pub fn recording_seconds(&self) -> u32 {
        self.counter
            .as_ref()
            .map(DurationCounter::seconds)
            .unwrap_or(self.recording_seconds)
    }

    /// Returns a reader for the running duration counter.
    pub fn duration_reader(&self) -> Option<DurationReader> {
        self.counter.as_ref().map(DurationCounter::reader)
    }

    /// Returns the pending operator-facing error.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Returns the evidence title typed so far.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the active wallet account.
    pub fn account(&self) -> Option<&WalletAccount> {
        self.account.as_ref()
    }

    /// Returns the fee parameters used for the next submission.
    pub fn submission_parameters(&self) -> &SubmissionParameters {
        &self.parameters
    }

    /// Returns the last permission round, if any.
    pub fn granted(&self) -> Option<GrantedSet> {
        self.granted
    }

    /// Projects the screen into a view model.
    pub fn view(&self) -> ScreenView {
        ScreenView::project(&ViewInput {
            state: self.machine.state(),
            last_kind: self.machine.last_kind(),
            recording_seconds: self.recording_seconds(),
            error_message: self.error_message.as_deref(),
            account_address: self.account.as_ref().map(|account| account.address.as_str()),
            has_permission: self.granted.map(|granted| granted.all_granted()),
        })
    }

    /// Re-reads the active account and, when it changed, refreshes pricing
    /// and recomputes submission parameters.
    ///
    /// # Returns
    /// `true` when the active account changed.
    ///
    /// # Errors
    /// Returns [`AppError::Submission`] when the account store fails.
    pub async fn refresh_account(&mut self) -> Result<bool, AppError> {
        let active = self.accounts.active_account()?;
        let unchanged = active.as_ref().map(|account| account.address.as_str())
            == self.account.as_ref().map(|account| account.address.as_str());
        if unchanged {
            return Ok(false);
        }

        self.parameters = match &active {
            Some(account) => {
                let snapshot = refresh_pricing(
                    self.pricing.as_ref(),
                    &account.address,
                    self.pipeline.relay(),
                )
                .await;
                self.fee_policy.resolve(&snapshot)
            }
            None => SubmissionParameters::default(),
        };
        tracing::info!(
            stage = "account",
            action = "changed",
            address = active.as_ref().map(|account| account.address.as_str()).unwrap_or("<none>"),
            fee_token = self.parameters.fee_token_address.as_deref().unwrap_or("<default>"),
            "active account updated"
        );
        self.account = active;
        Ok(true)
    }

    /// Requests permissions and enters capture mode when the gate passes.
    ///
    /// # Errors
    /// Returns [`AppError::CaptureDisabled`] when the kill switch is engaged,
    /// [`AppError::Permission`] when the gate blocks, and
    /// [`AppError::Capture`] outside `Idle`.
    pub async fn request_permissions(&mut self) -> Result<GrantedSet, AppError> {
        if self.machine.state() != CaptureState::Idle {
            return Err(CaptureError::InvalidTransition {
                from: self.machine.state(),
                action: "enter capture mode",
            }
            .into());
        }
        if !self.capture_enabled {
            tracing::info!(stage = "capture", action = "blocked", "kill switch engaged");
            return Err(AppError::CaptureDisabled);
        }

        let granted = self.gateway.request_permissions().await;
        self.granted = Some(granted);
        self.gateway.check_capture(&granted)?;
        self.machine.arm()?;
        Ok(granted)
    }

    /// Starts a video recording from `Armed`.
    ///
    /// The clip arrives later as [`ScreenUpdate::MediaReady`].
    ///
    /// # Errors
    /// Returns [`AppError::Capture`] unless the camera is armed.
    pub fn start_recording(&mut self) -> Result<(), AppError> {
        self.machine.begin_recording()?;
        self.recording_seconds = 0;
        self.counter = Some(DurationCounter::start());

        let camera = Arc::clone(&self.camera);
        let options = self.recording_options.clone();
        self.spawn_capture(MediaKind::Video, async move {
            camera.record_video(&options).await
        });
        tracing::info!(stage = "capture", action = "record_start", "recording started");
        Ok(())
    }

    /// Stops the running recording; the clip arrives as an update.
    ///
    /// The stop is sent only after the record call reached the device, so a
    /// stop right after [`EvidenceScreen::start_recording`] still ends the
    /// clip. A device failure is logged and the camera returns to `Armed`.
    ///
    /// # Errors
    /// Returns [`AppError::Capture`] outside `Recording` or on device failure.
    pub async fn stop_recording(&mut self) -> Result<(), AppError> {
        self.machine.request_stop()?;
        self.finish_counter();
        self.wait_for_device_call().await;

        if let Err(error) = self.camera.stop_recording().await {
            tracing::error!(stage = "capture", action = "record_stop", %error, "stop failed");
            self.abandon_capture_task();
            self.machine.abort_capture()?;
            return Err(error.into());
        }
        Ok(())
    }

    /// Takes a still picture from `Armed`; the photo arrives as an update.
    ///
    /// # Errors
    /// Returns [`AppError::Capture`] unless the camera is armed.
    pub fn take_picture(&mut self) -> Result<(), AppError> {
        self.machine.begin_photo()?;

        let camera = Arc::clone(&self.camera);
        let options = self.photo_options.clone();
        self.spawn_capture(MediaKind::Photo, async move {
            camera.take_picture(&options).await
        });
        tracing::info!(stage = "capture", action = "photo_start", "picture requested");
        Ok(())
    }

    /// Abandons the running capture and re-arms the camera.
    ///
    /// # Errors
    /// Returns [`AppError::Capture`] when nothing is being captured.
    pub async fn cancel_capture(&mut self) -> Result<(), AppError> {
        let was_recording = matches!(
            self.machine.state(),
            CaptureState::Recording | CaptureState::Stopping
        );
        self.machine.abort_capture()?;
        self.finish_counter();
        if was_recording {
            self.wait_for_device_call().await;
        }
        if was_recording && let Err(error) = self.camera.stop_recording().await {
            tracing::warn!(stage = "capture", action = "cancel", %error, "device stop failed");
        }
        self.abandon_capture_task();
        self.recording_seconds = 0;
        Ok(())
    }

    /// Updates the evidence title.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Closes the naming step and discards the captured media.
    ///
    /// # Errors
    /// Returns [`AppError::Capture`] outside `Naming`.
    pub fn cancel_naming(&mut self) -> Result<(), AppError> {
        self.machine.cancel_naming()?;
        self.title.clear();
        self.pending_record = None;
        self.error_message = None;
        self.recording_seconds = 0;
        Ok(())
    }

    /// Submits the named media.
    ///
    /// On success the confirmation is shown and the landing surface returns
    /// after the configured display window. On failure the naming step stays
    /// open with an error message; calling `submit` again retries the same
    /// record unless the title was edited.
    ///
    /// # Errors
    /// Returns [`AppError::Capture`] outside `Naming` and
    /// [`AppError::Submission`] for missing accounts, invalid titles, or
    /// execution failures.
    pub async fn submit(&mut self) -> Result<SubmissionReport, AppError> {
        let state = self.machine.state();
        let Some(media) = self.machine.media().cloned().filter(|_| state == CaptureState::Naming)
        else {
            return Err(CaptureError::InvalidTransition {
                from: state,
                action: "submit evidence",
            }
            .into());
        };

        let Some(account) = self.account.clone() else {
            return Err(self.reject(SubmissionError::NoAccount));
        };

        let kept = self
            .pending_record
            .as_ref()
            .filter(|record| record.title == self.title.trim())
            .cloned();
        let record = match kept {
            Some(record) => record,
            None => match EvidenceRecord::new(&self.title, &media, OffsetDateTime::now_utc()) {
                Ok(record) => record,
                Err(error) => return Err(self.reject(error.into())),
            },
        };

        self.machine.begin_submit()?;
        self.error_message = None;

        let outcome = self
            .pipeline
            .submit(&record, &account, &self.parameters)
            .await;
        match outcome {
            Ok(report) => {
                self.machine.confirm()?;
                self.title.clear();
                self.pending_record = None;
                self.schedule_return();
                Ok(report)
            }
            Err(error) => {
                self.machine.submit_failed()?;
                self.pending_record = Some(record);
                Err(self.reject(error))
            }
        }
    }

    /// Leaves capture mode from any state.
    ///
    /// A running recording is stopped first; timers, media, and title are
    /// cleared.
    pub async fn back(&mut self) {
        if self.machine.is_recording()
            && let Err(error) = self.stop_recording().await
        {
            tracing::warn!(stage = "capture", action = "back", %error, "stop before leaving failed");
        }
        self.reset_to_landing();
    }

    /// Waits for the next background event and applies it.
    ///
    /// Returns `None` only if the event channel is closed.
    pub async fn next_update(&mut self) -> Option<ScreenUpdate> {
        let event = self.events_rx.recv().await?;
        Some(self.apply(event))
    }

    /// Applies every event that is already queued.
    pub fn drain_updates(&mut self) -> Vec<ScreenUpdate> {
        let mut updates = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            updates.push(self.apply(event));
        }
        updates
    }

    fn apply(&mut self, event: ScreenEvent) -> ScreenUpdate {
        if event.epoch != self.epoch {
            tracing::debug!(stage = "screen", action = "drop_stale", ?event, "stale event");
            return ScreenUpdate::Stale;
        }

        match event.kind {
            EventKind::Captured { kind, result } => {
                self.capture_task = None;
                self.capture_issued = None;
                let seconds = self.finish_counter();
                self.accept_capture(kind, seconds, result)
            }
            EventKind::ConfirmationElapsed => {
                self.confirmation_task = None;
                self.reset_to_landing();
                ScreenUpdate::ReturnedToLanding
            }
        }
    }

    fn accept_capture(
        &mut self,
        kind: MediaKind,
        seconds: u32,
        result: Result<MediaHandle, CaptureError>,
    ) -> ScreenUpdate {
        let quality = match kind {
            MediaKind::Video => self.recording_options.quality.clone(),
            MediaKind::Photo => self.photo_options.quality_hint(),
        };

        let accepted = result
            .and_then(|handle| media_from_handle(handle, kind, seconds, &quality))
            .and_then(|media| {
                self.machine.media_ready(media.clone())?;
                Ok(media)
            });

        match accepted {
            Ok(media) => {
                tracing::info!(
                    stage = "capture",
                    action = "media_ready",
                    kind = ?media.kind,
                    duration_seconds = media.duration_seconds,
                    "naming step opened"
                );
                ScreenUpdate::MediaReady(media)
            }
            Err(error) => {
                tracing::error!(stage = "capture", action = "capture_failed", %error, "capture failed");
                if self.machine.state().is_capturing() {
                    let _ = self.machine.abort_capture();
                }
                ScreenUpdate::CaptureFailed(error.to_string())
            }
        }
    }

    fn spawn_capture<F>(&mut self, kind: MediaKind, operation: F)
    where
        F: Future<Output = Result<MediaHandle, CaptureError>> + Send + 'static,
    {
        let events = self.events_tx.clone();
        let epoch = self.epoch;
        let (issued_tx, issued_rx) = oneshot::channel();
        self.capture_issued = Some(issued_rx);
        self.capture_task = Some(tokio::spawn(async move {
            // First poll of the device call follows in the same task poll.
            let _ = issued_tx.send(());
            let result = operation.await;
            let _ = events.send(ScreenEvent {
                epoch,
                kind: EventKind::Captured { kind, result },
            });
        }));
    }

    fn schedule_return(&mut self) {
        let events = self.events_tx.clone();
        let epoch = self.epoch;
        let display = self.confirmation_display;
        self.confirmation_task = Some(tokio::spawn(async move {
            tokio::time::sleep(display).await;
            let _ = events.send(ScreenEvent {
                epoch,
                kind: EventKind::ConfirmationElapsed,
            });
        }));
    }

    fn reject(&mut self, error: SubmissionError) -> AppError {
        self.error_message = Some(error.user_message());
        error.into()
    }

    fn finish_counter(&mut self) -> u32 {
        if let Some(counter) = self.counter.take() {
            self.recording_seconds = counter.stop();
        }
        self.recording_seconds
    }

    async fn wait_for_device_call(&mut self) {
        if let Some(issued) = self.capture_issued.take() {
            let _ = issued.await;
        }
    }

    fn abandon_capture_task(&mut self) {
        if let Some(task) = self.capture_task.take() {
            task.abort();
        }
        self.capture_issued = None;
        self.epoch = self.epoch.wrapping_add(1);
    }

    fn reset_to_landing(&mut self) {
        self.abandon_capture_task();
        if let Some(task) = self.confirmation_task.take() {
            task.abort();
        }
        self.counter = None;
        self.machine.reset();
        self.recording_seconds = 0;
        self.title.clear();
        self.pending_record = None;
        self.error_message = None;
    }
}

impl Drop for EvidenceScreen {
    fn drop(&mut self) {
        if let Some(task) = self.capture_task.take() {
            task.abort();
        }
        if let Some(task) = self.confirmation_task.take() {
            task.abort();
        }
    }
}
