use async_trait::async_trait;
use tracing::debug;

use crate::domain::DomainError;
use crate::ports::{PermissionStatus, Permissions};

/// Permission checker for platforms where the OS prompts at stream-open
/// time rather than exposing a queryable grant state.
///
/// Always answers Prompt; the capture manager treats that as "try and see"
/// and the first stream open triggers the real system dialog.
pub struct SystemPermissions;

#[async_trait]
impl Permissions for SystemPermissions {
    async fn check_microphone(&self) -> PermissionStatus {
        debug!("microphone permission state not queryable, deferring to stream open");
        PermissionStatus::Prompt
    }

    async fn request_microphone(&self) -> Result<bool, DomainError> {
        // The prompt appears when the first stream opens; nothing to do
        // ahead of time.
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defers_to_stream_open() {
        let permissions = SystemPermissions;
        assert_eq!(
            permissions.check_microphone().await,
            PermissionStatus::Prompt
        );
        assert!(permissions.request_microphone().await.unwrap());
    }
}
