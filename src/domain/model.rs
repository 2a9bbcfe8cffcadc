use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// How a transcription backend runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    /// Hosted API reached over the network.
    Cloud,
    /// On-device model loaded into a local engine process.
    Local,
    /// System speech service (macOS).
    Apple,
}

/// The role a selected model serves. Selection is scoped per purpose:
/// picking a post-processing model never disturbs the speech-to-text slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelPurpose {
    SpeechToText,
    PostProcessing,
}

/// Runtime status of an on-device model.
///
/// Owned by the lifecycle manager; a deselected model may be optimistically
/// marked Stopped by the selection path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Stopped,
    Loading,
    Ready,
    Error,
}

impl Default for ModelStatus {
    fn default() -> Self {
        ModelStatus::Stopped
    }
}

/// A transcription backend entry in the model registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionModel {
    /// Unique identifier (e.g., "whisper-base", "openai-whisper-1").
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Provider name resolved by the router.
    pub provider: String,
    #[serde(rename = "type")]
    pub model_type: ModelType,
    pub purpose: ModelPurpose,
    pub requires_api_key: bool,
    /// Presence flag only; the key itself lives in `api_key`.
    #[serde(default)]
    pub has_api_key: bool,
    /// User-supplied credential for cloud backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub is_selected: bool,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    /// Local models only.
    #[serde(default)]
    pub is_downloaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub status: ModelStatus,
}

fn default_enabled() -> bool {
    true
}

impl TranscriptionModel {
    /// Validate that this model may be selected.
    ///
    /// A cloud model that requires a key cannot be selected without one; a
    /// local model cannot be selected before its file is downloaded.
    pub fn validate_selectable(&self) -> Result<(), DomainError> {
        if self.model_type == ModelType::Cloud && self.requires_api_key && !self.has_api_key {
            return Err(DomainError::SelectionRejected {
                model_id: self.id.clone(),
                reason: "an API key is required but none is configured".to_string(),
            });
        }
        if self.model_type == ModelType::Local && !self.is_downloaded {
            return Err(DomainError::SelectionRejected {
                model_id: self.id.clone(),
                reason: "the model file has not been downloaded".to_string(),
            });
        }
        Ok(())
    }

    /// Whether this is the active model for its purpose.
    pub fn is_active(&self) -> bool {
        self.is_selected && self.is_enabled
    }

    /// Model name as the backend API expects it. Catalog ids are prefixed
    /// with the provider ("openai-whisper-1"); the prefix is local only.
    pub fn api_model(&self) -> &str {
        let prefix = format!("{}-", self.provider);
        match self.id.strip_prefix(prefix.as_str()) {
            Some(rest) if !rest.is_empty() => rest,
            _ => &self.id,
        }
    }
}

/// Default model catalog synced into the store on startup. User-set fields
/// (selection, enabled flag, API key presence) survive the resync.
pub fn default_catalog() -> Vec<TranscriptionModel> {
    vec![
        TranscriptionModel {
            id: "openai-whisper-1".to_string(),
            name: "OpenAI Whisper".to_string(),
            provider: "openai".to_string(),
            model_type: ModelType::Cloud,
            purpose: ModelPurpose::SpeechToText,
            requires_api_key: true,
            has_api_key: false,
            api_key: None,
            is_selected: false,
            is_enabled: true,
            is_downloaded: false,
            path: None,
            status: ModelStatus::Stopped,
        },
        TranscriptionModel {
            id: "assemblyai-best".to_string(),
            name: "AssemblyAI".to_string(),
            provider: "assemblyai".to_string(),
            model_type: ModelType::Cloud,
            purpose: ModelPurpose::SpeechToText,
            requires_api_key: true,
            has_api_key: false,
            api_key: None,
            is_selected: false,
            is_enabled: true,
            is_downloaded: false,
            path: None,
            status: ModelStatus::Stopped,
        },
        TranscriptionModel {
            id: "whisper-tiny".to_string(),
            name: "Whisper Tiny (local)".to_string(),
            provider: "local-whisper".to_string(),
            model_type: ModelType::Local,
            purpose: ModelPurpose::SpeechToText,
            requires_api_key: false,
            has_api_key: false,
            api_key: None,
            is_selected: false,
            is_enabled: true,
            is_downloaded: false,
            path: None,
            status: ModelStatus::Stopped,
        },
        TranscriptionModel {
            id: "whisper-base".to_string(),
            name: "Whisper Base (local)".to_string(),
            provider: "local-whisper".to_string(),
            model_type: ModelType::Local,
            purpose: ModelPurpose::SpeechToText,
            requires_api_key: false,
            has_api_key: false,
            api_key: None,
            is_selected: false,
            is_enabled: true,
            is_downloaded: false,
            path: None,
            status: ModelStatus::Stopped,
        },
        TranscriptionModel {
            id: "anthropic-claude".to_string(),
            name: "Claude (post-processing)".to_string(),
            provider: "anthropic".to_string(),
            model_type: ModelType::Cloud,
            purpose: ModelPurpose::PostProcessing,
            requires_api_key: true,
            has_api_key: false,
            api_key: None,
            is_selected: false,
            is_enabled: true,
            is_downloaded: false,
            path: None,
            status: ModelStatus::Stopped,
        },
    ]
}
