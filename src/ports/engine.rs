use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::domain::{DomainError, ModelStatus, TranscriptionResult};

/// Status report from the on-device engine process, keyed by model id.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusUpdate {
    pub model_id: String,
    pub status: ModelStatus,
}

/// Port to the on-device model engine process.
///
/// What happens inside the engine (inference backend, memory layout) is
/// deliberately opaque; the lifecycle manager only issues commands and
/// observes status. A load command returning Ok does not guarantee the
/// engine has reached Ready.
#[async_trait]
pub trait ModelEngine: Send + Sync {
    /// Issue a load command for the given model file.
    async fn load(
        &self,
        model_id: &str,
        model_name: &str,
        model_path: &Path,
    ) -> Result<(), DomainError>;

    /// Issue an unload command for whatever model is active.
    async fn unload(&self) -> Result<(), DomainError>;

    /// Re-query the engine for the active model and its status.
    /// None means no model is loaded or loading.
    async fn status(&self) -> Option<EngineStatusUpdate>;

    /// Engine-originated status changes (crash, out-of-memory after load).
    /// These fire independently of any command issued by this process.
    fn subscribe(&self) -> broadcast::Receiver<EngineStatusUpdate>;

    /// Run inference with the loaded model.
    async fn transcribe(
        &self,
        wav_bytes: &[u8],
        language: Option<&str>,
    ) -> Result<TranscriptionResult, DomainError>;
}
