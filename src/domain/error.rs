use crate::domain::recording::RecordingState;
use serde::Serialize;
use thiserror::Error;

/// Classification of local model start failures.
///
/// Each class maps to a distinct user-facing recovery suggestion. The class
/// is derived by inspecting the engine's failure message, since engines
/// report errors as free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelStartFailure {
    OutOfMemory,
    FileNotFound,
    AlreadyRunning,
    Unknown,
}

impl ModelStartFailure {
    /// Classify an engine failure message.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("memory") || lower.contains("allocation") {
            ModelStartFailure::OutOfMemory
        } else if lower.contains("not found") || lower.contains("no such file") {
            ModelStartFailure::FileNotFound
        } else if lower.contains("already loaded") || lower.contains("in use") {
            ModelStartFailure::AlreadyRunning
        } else {
            ModelStartFailure::Unknown
        }
    }

    /// Recovery suggestion shown alongside the failure.
    pub fn suggestion(&self) -> &'static str {
        match self {
            ModelStartFailure::OutOfMemory => {
                "Try a smaller model (tiny or base) or restart the app to free up memory."
            }
            ModelStartFailure::FileNotFound => {
                "The model file may be corrupted. Stop the model, remove it, then download again."
            }
            ModelStartFailure::AlreadyRunning => {
                "Stop the model first, then try starting it again."
            }
            ModelStartFailure::Unknown => {
                "Refresh the status, stop and restart the model, or remove and re-download it."
            }
        }
    }
}

/// Domain-level errors for Parla.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Audio capture error: {0}")]
    Capture(String),

    #[error("A recording session is already in progress (state: {state:?})")]
    SessionBusy { state: RecordingState },

    #[error("Provider \"{requested}\" not found. Available providers: {}", registered.join(", "))]
    UnknownProvider {
        requested: String,
        registered: Vec<String>,
    },

    #[error("Provider \"{provider}\" is not available: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("Provider \"{provider}\" timed out after {attempts} polling attempts")]
    ProviderTimeout { provider: String, attempts: u32 },

    #[error("Provider \"{provider}\" failed: {message}")]
    Provider { provider: String, message: String },

    #[error("Failed to start model: {message}. {}", cause.suggestion())]
    ModelStart {
        cause: ModelStartFailure,
        message: String,
    },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Cannot select model \"{model_id}\": {reason}")]
    SelectionRejected { model_id: String, reason: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Text output error: {0}")]
    Output(String),
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for DomainError {
    fn from(err: toml::de::Error) -> Self {
        DomainError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DomainError {
    fn from(err: toml::ser::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for DomainError {
    fn from(err: reqwest::Error) -> Self {
        DomainError::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_out_of_memory() {
        assert_eq!(
            ModelStartFailure::classify("ggml allocation failed"),
            ModelStartFailure::OutOfMemory
        );
        assert_eq!(
            ModelStartFailure::classify("Not enough MEMORY available"),
            ModelStartFailure::OutOfMemory
        );
    }

    #[test]
    fn test_classify_file_not_found() {
        assert_eq!(
            ModelStartFailure::classify("model file not found"),
            ModelStartFailure::FileNotFound
        );
        assert_eq!(
            ModelStartFailure::classify("No such file or directory"),
            ModelStartFailure::FileNotFound
        );
    }

    #[test]
    fn test_classify_already_running() {
        assert_eq!(
            ModelStartFailure::classify("model already loaded"),
            ModelStartFailure::AlreadyRunning
        );
        assert_eq!(
            ModelStartFailure::classify("resource in use"),
            ModelStartFailure::AlreadyRunning
        );
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(
            ModelStartFailure::classify("segfault in backend"),
            ModelStartFailure::Unknown
        );
    }

    #[test]
    fn test_suggestions_are_distinct() {
        let suggestions = [
            ModelStartFailure::OutOfMemory.suggestion(),
            ModelStartFailure::FileNotFound.suggestion(),
            ModelStartFailure::AlreadyRunning.suggestion(),
            ModelStartFailure::Unknown.suggestion(),
        ];
        for (i, a) in suggestions.iter().enumerate() {
            for b in suggestions.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_unknown_provider_message_lists_registered() {
        let err = DomainError::UnknownProvider {
            requested: "nope".to_string(),
            registered: vec!["openai".to_string(), "local-whisper".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("nope"));
        assert!(msg.contains("openai"));
        assert!(msg.contains("local-whisper"));
    }
}
