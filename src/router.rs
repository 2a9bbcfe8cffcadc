//! Transcription provider router.
//!
//! Holds the registry of configured backends and dispatches each request
//! to exactly the provider named in the request. There is no fallback
//! chain: a request for an unknown or unavailable provider fails with an
//! error naming what was asked for and what exists.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::domain::{AudioArtifact, DomainError, TranscribeConfig, TranscriptionResult};
use crate::ports::TranscriptionProvider;

pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn TranscriptionProvider>>,
}

impl Default for ProviderRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a backend under its provider id. Re-registering an id
    /// replaces the previous backend.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        provider: Arc<dyn TranscriptionProvider>,
    ) {
        self.providers.insert(id.into(), provider);
    }

    /// Registered provider ids, sorted for stable display.
    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Dispatch the artifact to the provider named in `config`.
    ///
    /// The artifact is consumed; its buffer is wiped on drop whether the
    /// call succeeds or fails.
    pub async fn transcribe(
        &self,
        artifact: AudioArtifact,
        config: &TranscribeConfig,
    ) -> Result<TranscriptionResult, DomainError> {
        let provider = self.providers.get(&config.provider).ok_or_else(|| {
            DomainError::UnknownProvider {
                requested: config.provider.clone(),
                registered: self.provider_ids(),
            }
        })?;

        if !provider.is_available(config).await {
            warn!(provider = %config.provider, "provider not available");
            return Err(DomainError::ProviderUnavailable {
                provider: config.provider.clone(),
                reason: "provider reported itself unavailable".into(),
            });
        }

        let started = Instant::now();
        let mut result = provider.transcribe(&artifact, config).await?;
        result.text = result.text.trim().to_string();

        info!(
            provider = %config.provider,
            model = %config.model,
            audio_secs = artifact.duration_secs(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "transcription complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProvider {
        reply: String,
        available: bool,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.into(),
                available: true,
                calls: AtomicUsize::new(0),
            })
        }

        fn unavailable() -> Arc<Self> {
            Arc::new(Self {
                reply: String::new(),
                available: false,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TranscriptionProvider for FakeProvider {
        async fn transcribe(
            &self,
            _artifact: &AudioArtifact,
            _config: &TranscribeConfig,
        ) -> Result<TranscriptionResult, DomainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TranscriptionResult::from_text(self.reply.clone()))
        }

        async fn is_available(&self, _config: &TranscribeConfig) -> bool {
            self.available
        }
    }

    fn artifact() -> AudioArtifact {
        AudioArtifact::new(vec![0u8; 64], 0, 1.0)
    }

    #[tokio::test]
    async fn routes_to_the_named_provider_only() {
        let mut router = ProviderRouter::new();
        let openai = FakeProvider::new("from openai");
        let assembly = FakeProvider::new("from assemblyai");
        router.register("openai", openai.clone());
        router.register("assemblyai", assembly.clone());

        let result = router
            .transcribe(artifact(), &TranscribeConfig::new("openai", "whisper-1"))
            .await
            .unwrap();

        assert_eq!(result.text, "from openai");
        assert_eq!(openai.calls.load(Ordering::SeqCst), 1);
        assert_eq!(assembly.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_provider_fails_without_fallback() {
        let mut router = ProviderRouter::new();
        let openai = FakeProvider::new("text");
        router.register("openai", openai.clone());
        router.register("local-whisper", FakeProvider::new("local"));

        let err = router
            .transcribe(artifact(), &TranscribeConfig::new("azure", "x"))
            .await
            .unwrap_err();

        match err {
            DomainError::UnknownProvider {
                requested,
                registered,
            } => {
                assert_eq!(requested, "azure");
                assert_eq!(registered, vec!["local-whisper", "openai"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(openai.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unavailable_provider_is_not_called() {
        let mut router = ProviderRouter::new();
        let provider = FakeProvider::unavailable();
        router.register("openai", provider.clone());

        let err = router
            .transcribe(artifact(), &TranscribeConfig::new("openai", "whisper-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::ProviderUnavailable { .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn result_text_is_trimmed() {
        let mut router = ProviderRouter::new();
        router.register("openai", FakeProvider::new("  hello world \n"));

        let result = router
            .transcribe(artifact(), &TranscribeConfig::new("openai", "whisper-1"))
            .await
            .unwrap();
        assert_eq!(result.text, "hello world");
    }

    #[tokio::test]
    async fn reregistering_replaces_the_backend() {
        let mut router = ProviderRouter::new();
        router.register("openai", FakeProvider::new("old"));
        router.register("openai", FakeProvider::new("new"));

        let result = router
            .transcribe(artifact(), &TranscribeConfig::new("openai", "whisper-1"))
            .await
            .unwrap();
        assert_eq!(result.text, "new");
        assert_eq!(router.provider_ids(), vec!["openai"]);
    }
}
