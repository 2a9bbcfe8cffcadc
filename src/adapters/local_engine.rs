//! Router-facing wrapper around the on-device engine.
//!
//! Makes the local engine look like any other transcription backend, so
//! the router stays unaware of where inference runs. Availability means a
//! model is loaded and Ready, not merely selected.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{AudioArtifact, DomainError, TranscribeConfig, TranscriptionResult};
use crate::models::LifecycleManager;
use crate::ports::TranscriptionProvider;

pub struct LocalWhisperProvider {
    lifecycle: Arc<LifecycleManager>,
}

impl LocalWhisperProvider {
    pub fn new(lifecycle: Arc<LifecycleManager>) -> Self {
        Self { lifecycle }
    }
}

#[async_trait]
impl TranscriptionProvider for LocalWhisperProvider {
    async fn transcribe(
        &self,
        artifact: &AudioArtifact,
        config: &TranscribeConfig,
    ) -> Result<TranscriptionResult, DomainError> {
        self.lifecycle
            .transcribe(artifact.wav_bytes(), config.language.as_deref())
            .await
    }

    async fn is_available(&self, _config: &TranscribeConfig) -> bool {
        self.lifecycle.is_ready().await
    }
}
