use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Ephemeral per-call provider configuration. Built fresh for every
/// transcription call and never persisted; the API key is zeroed on drop
/// and redacted from debug output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TranscribeConfig {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub language: Option<String>,
    #[zeroize(skip)]
    pub temperature: Option<f32>,
}

impl TranscribeConfig {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            api_key: None,
            base_url: None,
            language: None,
            temperature: None,
        }
    }
}

impl fmt::Debug for TranscribeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscribeConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("language", &self.language)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// A timed slice of the transcript. Providers that cannot produce
/// word/segment timing omit segments entirely rather than fabricating them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start offset in seconds.
    pub start: f64,
    /// End offset in seconds.
    pub end: f64,
    pub text: String,
}

/// Result of one provider invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<Segment>>,
}

impl TranscriptionResult {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Persisted history entry. The only part of the pipeline that crosses
/// into durable storage; failed transcriptions are recorded too, carrying
/// the failure text and the `failed` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionRecord {
    /// Start timestamp doubles as the identifier.
    pub id: String,
    pub text: String,
    pub timestamp: i64,
    pub duration: Option<f64>,
    pub word_count: usize,
    pub model_id: String,
    pub provider: String,
    #[serde(default)]
    pub failed: bool,
}

impl TranscriptionRecord {
    pub fn new(
        text: impl Into<String>,
        timestamp: i64,
        duration: Option<f64>,
        model_id: impl Into<String>,
        provider: impl Into<String>,
        failed: bool,
    ) -> Self {
        let text = text.into();
        let word_count = text.split_whitespace().count();
        Self {
            id: timestamp.to_string(),
            text,
            timestamp,
            duration,
            word_count,
            model_id: model_id.into(),
            provider: provider.into(),
            failed,
        }
    }
}
