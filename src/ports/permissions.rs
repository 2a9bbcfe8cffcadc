use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Result of a microphone permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// Not yet determined; the OS will prompt on first capture.
    Prompt,
}

/// Port for the microphone permission subsystem.
///
/// The check is advisory: on some platforms the real grant decision happens
/// when the stream opens, so a Denied answer here may be stale.
#[async_trait]
pub trait Permissions: Send + Sync {
    async fn check_microphone(&self) -> PermissionStatus;

    /// Ask the user for microphone access. Returns whether it was granted.
    async fn request_microphone(&self) -> Result<bool, DomainError>;
}
