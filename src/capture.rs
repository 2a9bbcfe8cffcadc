//! Audio capture and resource manager.
//!
//! Owns the single allowed capture stream and enforces exactly-once
//! release: every acquired stream is finalized or aborted exactly once,
//! on success, failure and cancellation alike. The permission check is
//! advisory only; some platforms report stale denials, so a denied check
//! logs a warning and the stream open is attempted anyway (the OS makes
//! the real decision at open time).

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::{AudioArtifact, DomainError};
use crate::ports::{AudioInput, CaptureStream, PermissionStatus, Permissions};

struct ActiveCapture {
    stream: Box<dyn CaptureStream>,
    started: Instant,
    started_at_ms: i64,
}

pub struct CaptureManager {
    input: Arc<dyn AudioInput>,
    permissions: Arc<dyn Permissions>,
    active: Mutex<Option<ActiveCapture>>,
}

impl CaptureManager {
    pub fn new(input: Arc<dyn AudioInput>, permissions: Arc<dyn Permissions>) -> Self {
        Self {
            input,
            permissions,
            active: Mutex::new(None),
        }
    }

    /// Open the microphone and start capturing.
    ///
    /// Fails if a capture is already active. A denied permission check is
    /// logged but does not short-circuit the attempt.
    pub async fn acquire(&self) -> Result<(), DomainError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(DomainError::Capture(
                "capture already in progress".into(),
            ));
        }

        match self.permissions.check_microphone().await {
            PermissionStatus::Granted => {}
            status => {
                // The check can be stale; let the stream open decide.
                warn!(?status, "microphone permission not granted, attempting capture anyway");
            }
        }

        let stream = self.input.open().await?;
        let started_at_ms = unix_millis();
        *active = Some(ActiveCapture {
            stream,
            started: Instant::now(),
            started_at_ms,
        });
        debug!(started_at_ms, "capture acquired");
        Ok(())
    }

    /// Stop the stream and return the finalized artifact.
    ///
    /// The stream is released even when finalization fails.
    pub async fn finalize(&self) -> Result<AudioArtifact, DomainError> {
        let capture = self
            .active
            .lock()
            .await
            .take()
            .ok_or_else(|| DomainError::Capture("no capture in progress".into()))?;

        let duration_secs = capture.started.elapsed().as_secs_f64();
        let wav_bytes = capture.stream.finalize().await?;
        debug!(duration_secs, bytes = wav_bytes.len(), "capture finalized");
        Ok(AudioArtifact::new(
            wav_bytes,
            capture.started_at_ms,
            duration_secs,
        ))
    }

    /// Stop the stream and discard the audio. Idempotent; aborting with
    /// nothing active is a no-op.
    pub async fn abort(&self) {
        if let Some(capture) = self.active.lock().await.take() {
            capture.stream.abort().await;
            debug!("capture aborted");
        }
    }

    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
