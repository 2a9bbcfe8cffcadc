use async_trait::async_trait;

use crate::domain::{AudioArtifact, DomainError, TranscribeConfig, TranscriptionResult};

/// Capability contract shared by every transcription backend.
///
/// Providers differ in transport (multipart upload, polling job API, local
/// engine call) but the router treats them uniformly. Retry and polling
/// bounds are each provider's own concern; the router never retries.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Transcribe the artifact. Fields the backend cannot produce
    /// (segments, confidence) are omitted, never fabricated.
    async fn transcribe(
        &self,
        artifact: &AudioArtifact,
        config: &TranscribeConfig,
    ) -> Result<TranscriptionResult, DomainError>;

    /// Whether the provider can currently serve a call (credential present,
    /// endpoint reachable, model loaded). Defaults to always available.
    async fn is_available(&self, config: &TranscribeConfig) -> bool {
        let _ = config;
        true
    }
}
