//! Recording session state machine.
//!
//! One live session drives the Idle -> Recording -> Stopping ->
//! Transcribing -> Idle cycle; every transition is broadcast so other
//! windows can mirror it. A completed session produces exactly one history
//! entry, success or failure; a cancelled session produces none and
//! discards its audio. Cancellation is a flag as well as a transition: a
//! cancel that lands while stop is finalizing wins the race, and the
//! artifact is dropped instead of dispatched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{BusEvent, EventBus};
use crate::capture::CaptureManager;
use crate::domain::{
    analyze_wav, AtomicRecordingState, AudioArtifact, DomainError, FeedbackCue, ModelPurpose,
    RecordingState, TranscribeConfig, TranscriptionModel, TranscriptionRecord,
    TranscriptionSettings, ERROR_RESET_DELAY,
};
use crate::models::ModelRegistry;
use crate::ports::{StateStore, TextOutput};
use crate::router::ProviderRouter;

/// Prefix of the history text recorded for a failed session.
const FAILURE_TEXT: &str = "Transcription failed";

pub struct RecordingSession {
    state: Arc<AtomicRecordingState>,
    cancelled: AtomicBool,
    capture: Arc<CaptureManager>,
    router: Arc<ProviderRouter>,
    registry: Arc<ModelRegistry>,
    store: Arc<dyn StateStore>,
    output: Arc<dyn TextOutput>,
    settings: TranscriptionSettings,
    bus: EventBus,
    error_reset: Mutex<Option<JoinHandle<()>>>,
}

impl RecordingSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        capture: Arc<CaptureManager>,
        router: Arc<ProviderRouter>,
        registry: Arc<ModelRegistry>,
        store: Arc<dyn StateStore>,
        output: Arc<dyn TextOutput>,
        settings: TranscriptionSettings,
        bus: EventBus,
    ) -> Self {
        Self {
            state: Arc::new(AtomicRecordingState::default()),
            cancelled: AtomicBool::new(false),
            capture,
            router,
            registry,
            store,
            output,
            settings,
            bus,
            error_reset: Mutex::new(None),
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state.load()
    }

    /// Start a recording session. Rejected while another session is live
    /// or an error is still displayed.
    pub async fn start(&self) -> Result<(), DomainError> {
        let current = self.state.load();
        if !current.can_start() {
            return Err(DomainError::SessionBusy { state: current });
        }

        self.cancelled.store(false, Ordering::SeqCst);
        if let Err(err) = self.capture.acquire().await {
            // The overlay opens before acquisition; a failed acquire
            // must still dismiss it.
            self.bus.publish(BusEvent::HideCaptureSurface);
            return Err(err);
        }
        self.transition(RecordingState::Recording);
        info!("recording session started");
        Ok(())
    }

    /// Stop the session and run the captured audio through transcription.
    ///
    /// Always ends with exactly one history entry (the transcript, or a
    /// failure entry), unless a concurrent cancel won the race, in which
    /// case the audio is dropped and None is returned.
    pub async fn stop(&self) -> Result<Option<TranscriptionRecord>, DomainError> {
        let current = self.state.load();
        if !current.can_stop() {
            return Err(DomainError::SessionBusy { state: current });
        }
        self.transition(RecordingState::Stopping);
        self.bus.publish(BusEvent::Feedback {
            cue: FeedbackCue::Processing,
        });

        let artifact = match self.capture.finalize().await {
            Ok(artifact) => artifact,
            Err(err) => {
                error!(%err, "capture finalization failed");
                return Ok(Some(self.finish_failure(
                    now_ms(),
                    None,
                    None,
                    &err.to_string(),
                )?));
            }
        };

        if self.take_cancelled() {
            debug!("cancel won the race against finalization, dropping audio");
            self.finish_cancelled();
            return Ok(None);
        }

        self.transition(RecordingState::Transcribing);
        self.log_silence_diagnostic(&artifact);

        let model = match self.registry.selected(ModelPurpose::SpeechToText) {
            Ok(model) => model,
            Err(err) => {
                warn!(%err, "failed to load model selection");
                None
            }
        };
        let Some(model) = model else {
            warn!("no transcription model selected");
            return Ok(Some(self.finish_failure(
                artifact.started_at_ms(),
                Some(artifact.duration_secs()),
                None,
                "no transcription model selected",
            )?));
        };

        if self.take_cancelled() {
            debug!("cancel won the race against dispatch, dropping audio");
            self.finish_cancelled();
            return Ok(None);
        }

        let started_at_ms = artifact.started_at_ms();
        let duration = artifact.duration_secs();
        let config = self.transcribe_config(&model);
        match self.router.transcribe(artifact, &config).await {
            Ok(result) => Ok(Some(
                self.finish_success(started_at_ms, duration, &model, result.text)
                    .await?,
            )),
            Err(err) => {
                error!(%err, provider = %model.provider, "transcription failed");
                Ok(Some(self.finish_failure(
                    started_at_ms,
                    Some(duration),
                    Some(&model),
                    &err.to_string(),
                )?))
            }
        }
    }

    /// Cancel the session. While recording this stops the stream and
    /// discards the audio immediately; while stopping or transcribing it
    /// raises the flag so the in-flight stop drops the artifact before
    /// dispatch. No history entry is written on this path.
    pub async fn cancel(&self) -> Result<(), DomainError> {
        let current = self.state.load();
        if !current.can_cancel() {
            return Err(DomainError::SessionBusy { state: current });
        }

        match current {
            RecordingState::Recording => {
                self.capture.abort().await;
                self.finish_cancelled();
            }
            RecordingState::Error => {
                // Skip the remaining error display and reset now.
                self.abort_error_reset();
                self.transition(RecordingState::Idle);
            }
            _ => {
                self.cancelled.store(true, Ordering::SeqCst);
                info!("cancellation flagged for in-flight stop");
            }
        }
        Ok(())
    }

    fn transition(&self, to: RecordingState) {
        self.state.store(to);
        self.bus.publish(BusEvent::RecordingState { state: to });
    }

    fn take_cancelled(&self) -> bool {
        self.cancelled.swap(false, Ordering::SeqCst)
    }

    fn finish_cancelled(&self) {
        self.bus.publish(BusEvent::Feedback {
            cue: FeedbackCue::Cancelled,
        });
        self.bus.publish(BusEvent::HideCaptureSurface);
        self.transition(RecordingState::Idle);
        info!("recording session cancelled");
    }

    async fn finish_success(
        &self,
        started_at_ms: i64,
        duration: f64,
        model: &TranscriptionModel,
        text: String,
    ) -> Result<TranscriptionRecord, DomainError> {
        let record = TranscriptionRecord::new(
            text,
            started_at_ms,
            Some(duration),
            model.id.clone(),
            model.provider.clone(),
            false,
        );
        if let Err(err) = self.store.append_transcription(&record) {
            // The session must still reach a terminal state, or every
            // later start would be rejected as busy.
            error!(%err, "failed to persist transcript");
            self.bus.publish(BusEvent::Feedback {
                cue: FeedbackCue::Error,
            });
            self.bus.publish(BusEvent::HideCaptureSurface);
            self.enter_error();
            return Err(err);
        }
        self.bus.publish(BusEvent::TranscriptionsChanged);

        if self.settings.auto_insert && !record.text.is_empty() {
            // Delivery failure does not fail the session; the transcript
            // is already in the history.
            if let Err(err) = self.output.copy_and_insert(&record.text).await {
                warn!(%err, "failed to insert transcript");
            }
        }

        self.bus.publish(BusEvent::Feedback {
            cue: FeedbackCue::Completed,
        });
        self.bus.publish(BusEvent::HideCaptureSurface);
        self.transition(RecordingState::Idle);
        info!(words = record.word_count, "transcription recorded");
        Ok(record)
    }

    fn finish_failure(
        &self,
        started_at_ms: i64,
        duration: Option<f64>,
        model: Option<&TranscriptionModel>,
        reason: &str,
    ) -> Result<TranscriptionRecord, DomainError> {
        let record = TranscriptionRecord::new(
            format!("{}: {}", FAILURE_TEXT, reason),
            started_at_ms,
            duration,
            model.map(|m| m.id.clone()).unwrap_or_default(),
            model.map(|m| m.provider.clone()).unwrap_or_default(),
            true,
        );
        // Enter the error state whether or not the entry could be
        // written; the reset timer is what brings the session back.
        let persisted = self.store.append_transcription(&record);
        match &persisted {
            Ok(()) => self.bus.publish(BusEvent::TranscriptionsChanged),
            Err(err) => error!(%err, "failed to persist failure entry"),
        }
        self.bus.publish(BusEvent::Feedback {
            cue: FeedbackCue::Error,
        });
        self.bus.publish(BusEvent::HideCaptureSurface);
        self.enter_error();
        persisted?;
        Ok(record)
    }

    /// Error is a displayed state, not a terminal one. After the reset
    /// delay the session drops back to Idle on its own.
    fn enter_error(&self) {
        self.transition(RecordingState::Error);
        self.abort_error_reset();

        let state = self.state.clone();
        let bus = self.bus.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(ERROR_RESET_DELAY).await;
            if state.compare_exchange(RecordingState::Error, RecordingState::Idle) {
                bus.publish(BusEvent::RecordingState {
                    state: RecordingState::Idle,
                });
            }
        });
        *self.error_reset.lock() = Some(handle);
    }

    fn abort_error_reset(&self) {
        if let Some(handle) = self.error_reset.lock().take() {
            handle.abort();
        }
    }

    fn log_silence_diagnostic(&self, artifact: &AudioArtifact) {
        match analyze_wav(artifact.wav_bytes()) {
            Ok(analysis) if analysis.is_silent() => {
                warn!(
                    rms = analysis.rms,
                    peak = analysis.peak,
                    "recording appears silent, transcribing anyway"
                );
            }
            Ok(analysis) => {
                debug!(rms = analysis.rms, peak = analysis.peak, "audio level analysis");
            }
            Err(err) => {
                warn!(%err, "could not analyze recorded audio");
            }
        }
    }

    fn transcribe_config(&self, model: &TranscriptionModel) -> TranscribeConfig {
        let mut config = TranscribeConfig::new(model.provider.clone(), model.api_model());
        config.api_key = model.api_key.clone();
        config.language = self.settings.language_hint();
        config.temperature = self.settings.temperature;
        config
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.abort_error_reset();
    }
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
