//! AssemblyAI speech-to-text backend.
//!
//! Three-step flow: upload the audio, create a transcript job, then poll
//! until the job settles. Polling is bounded; a job that neither completes
//! nor errors within the budget surfaces as a timeout rather than hanging
//! the session.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::domain::{
    AudioArtifact, DomainError, Segment, TranscribeConfig, TranscriptionResult,
};
use crate::ports::TranscriptionProvider;

const DEFAULT_BASE_URL: &str = "https://api.assemblyai.com/v2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const MAX_POLL_ATTEMPTS: u32 = 60;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    id: String,
    status: String,
    text: Option<String>,
    error: Option<String>,
    language_code: Option<String>,
    confidence: Option<f32>,
    words: Option<Vec<Word>>,
}

#[derive(Debug, Deserialize)]
struct Word {
    /// Millisecond offsets.
    start: i64,
    end: i64,
    text: String,
}

pub struct AssemblyAiProvider {
    client: reqwest::Client,
}

impl AssemblyAiProvider {
    pub fn new() -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    async fn upload(
        &self,
        base: &str,
        api_key: &str,
        wav_bytes: &[u8],
    ) -> Result<String, DomainError> {
        let response = self
            .client
            .post(format!("{}/upload", base))
            .header("authorization", api_key)
            .body(wav_bytes.to_vec())
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::Provider {
                provider: "assemblyai".into(),
                message: format!("upload failed: HTTP {}: {}", status, body),
            });
        }
        let parsed: UploadResponse = response.json().await?;
        Ok(parsed.upload_url)
    }

    async fn submit(
        &self,
        base: &str,
        api_key: &str,
        audio_url: &str,
        config: &TranscribeConfig,
    ) -> Result<String, DomainError> {
        let mut body = json!({ "audio_url": audio_url });
        match &config.language {
            Some(language) => body["language_code"] = json!(language),
            None => body["language_detection"] = json!(true),
        }

        let response = self
            .client
            .post(format!("{}/transcript", base))
            .header("authorization", api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::Provider {
                provider: "assemblyai".into(),
                message: format!("submit failed: HTTP {}: {}", status, body),
            });
        }
        let parsed: TranscriptResponse = response.json().await?;
        Ok(parsed.id)
    }

    async fn poll(
        &self,
        base: &str,
        api_key: &str,
        job_id: &str,
    ) -> Result<TranscriptResponse, DomainError> {
        for attempt in 1..=MAX_POLL_ATTEMPTS {
            let response = self
                .client
                .get(format!("{}/transcript/{}", base, job_id))
                .header("authorization", api_key)
                .send()
                .await?;
            let parsed: TranscriptResponse = response.json().await?;

            match parsed.status.as_str() {
                "completed" => return Ok(parsed),
                "error" => {
                    return Err(DomainError::Provider {
                        provider: "assemblyai".into(),
                        message: parsed
                            .error
                            .unwrap_or_else(|| "transcript job failed".to_string()),
                    });
                }
                status => {
                    debug!(job_id, attempt, status, "transcript job still pending");
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Err(DomainError::ProviderTimeout {
            provider: "assemblyai".into(),
            attempts: MAX_POLL_ATTEMPTS,
        })
    }
}

#[async_trait]
impl TranscriptionProvider for AssemblyAiProvider {
    async fn transcribe(
        &self,
        artifact: &AudioArtifact,
        config: &TranscribeConfig,
    ) -> Result<TranscriptionResult, DomainError> {
        let api_key = config.api_key.as_deref().ok_or_else(|| {
            DomainError::ProviderUnavailable {
                provider: "assemblyai".into(),
                reason: "no API key configured".into(),
            }
        })?;
        let base = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let base = base.trim_end_matches('/');

        let audio_url = self.upload(base, api_key, artifact.wav_bytes()).await?;
        let job_id = self.submit(base, api_key, &audio_url, config).await?;
        debug!(job_id, "transcript job submitted");
        let transcript = self.poll(base, api_key, &job_id).await?;

        Ok(result_from_transcript(transcript))
    }

    async fn is_available(&self, config: &TranscribeConfig) -> bool {
        config.api_key.is_some()
    }
}

fn result_from_transcript(transcript: TranscriptResponse) -> TranscriptionResult {
    let segments = transcript.words.map(|words| {
        words
            .into_iter()
            .map(|w| Segment {
                start: w.start as f64 / 1000.0,
                end: w.end as f64 / 1000.0,
                text: w.text,
            })
            .collect()
    });
    TranscriptionResult {
        text: transcript.text.unwrap_or_default(),
        language: transcript.language_code,
        confidence: transcript.confidence,
        segments,
    }
}
