//! OpenAI speech-to-text backend.
//!
//! Single multipart upload to the audio transcriptions endpoint, using
//! verbose JSON so language and segment timing come back when the API has
//! them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use crate::domain::{
    AudioArtifact, DomainError, Segment, TranscribeConfig, TranscriptionResult,
};
use crate::ports::TranscriptionProvider;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct ApiResponse {
    text: String,
    language: Option<String>,
    segments: Option<Vec<ApiSegment>>,
}

#[derive(Debug, Deserialize)]
struct ApiSegment {
    start: f64,
    end: f64,
    text: String,
}

pub struct OpenAiProvider {
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new() -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TranscriptionProvider for OpenAiProvider {
    async fn transcribe(
        &self,
        artifact: &AudioArtifact,
        config: &TranscribeConfig,
    ) -> Result<TranscriptionResult, DomainError> {
        let api_key = config.api_key.as_deref().ok_or_else(|| {
            DomainError::ProviderUnavailable {
                provider: "openai".into(),
                reason: "no API key configured".into(),
            }
        })?;
        let base = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let url = format!("{}/audio/transcriptions", base.trim_end_matches('/'));

        let file = Part::bytes(artifact.wav_bytes().to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| DomainError::Provider {
                provider: "openai".into(),
                message: format!("failed to build upload part: {}", e),
            })?;
        let mut form = Form::new()
            .part("file", file)
            .text("model", config.model.clone())
            .text("response_format", "verbose_json");
        if let Some(language) = &config.language {
            form = form.text("language", language.clone());
        }
        if let Some(temperature) = config.temperature {
            form = form.text("temperature", temperature.to_string());
        }

        debug!(model = %config.model, bytes = artifact.wav_bytes().len(), "uploading to openai");
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::Provider {
                provider: "openai".into(),
                message: format!("HTTP {}: {}", status, body),
            });
        }

        let parsed: ApiResponse = response.json().await?;
        let segments = parsed.segments.map(|segments| {
            segments
                .into_iter()
                .map(|s| Segment {
                    start: s.start,
                    end: s.end,
                    text: s.text.trim().to_string(),
                })
                .collect()
        });

        Ok(TranscriptionResult {
            text: parsed.text,
            language: parsed.language,
            confidence: None,
            segments,
        })
    }

    async fn is_available(&self, config: &TranscribeConfig) -> bool {
        config.api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unavailable_without_api_key() {
        let provider = OpenAiProvider::new().unwrap();
        let config = TranscribeConfig::new("openai", "whisper-1");
        assert!(!provider.is_available(&config).await);

        let mut with_key = TranscribeConfig::new("openai", "whisper-1");
        with_key.api_key = Some("sk-test".into());
        assert!(provider.is_available(&with_key).await);
    }

    #[tokio::test]
    async fn transcribe_without_key_fails_fast() {
        let provider = OpenAiProvider::new().unwrap();
        let artifact = AudioArtifact::new(vec![0u8; 16], 0, 0.5);
        let err = provider
            .transcribe(&artifact, &TranscribeConfig::new("openai", "whisper-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ProviderUnavailable { .. }));
    }

    #[test]
    fn response_parsing_handles_minimal_payload() {
        let parsed: ApiResponse = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
        assert_eq!(parsed.text, "hello");
        assert!(parsed.segments.is_none());
    }

    #[test]
    fn response_parsing_handles_verbose_payload() {
        let parsed: ApiResponse = serde_json::from_str(
            r#"{"text":"hello world","language":"english",
                "segments":[{"start":0.0,"end":1.2,"text":" hello world"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.language.as_deref(), Some("english"));
        assert_eq!(parsed.segments.unwrap().len(), 1);
    }
}
