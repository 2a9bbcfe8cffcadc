use serde::{Deserialize, Serialize};

use crate::domain::audio::CaptureConfig;

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Enable file logging with rotation.
    pub file_logging: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: true,
        }
    }
}

/// Defaults applied to every transcription call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    /// ISO 639-1 language code, or "auto" for detection.
    pub language: String,
    /// Sampling temperature for providers that support it.
    pub temperature: Option<f32>,
    /// Insert the transcript at the cursor after a successful call.
    pub auto_insert: bool,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            language: "auto".to_string(),
            temperature: None,
            auto_insert: true,
        }
    }
}

impl TranscriptionSettings {
    /// Language to send to a provider; "auto" means let it detect.
    pub fn language_hint(&self) -> Option<String> {
        if self.language == "auto" || self.language.is_empty() {
            None
        } else {
            Some(self.language.clone())
        }
    }
}

/// Output/text injection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Delay in ms before simulating paste (for clipboard sync).
    pub paste_delay_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { paste_delay_ms: 100 }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub transcription: TranscriptionSettings,
    pub capture: CaptureConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }
}
