use async_trait::async_trait;

use crate::domain::DomainError;

/// Port for delivering the transcript to the user's focused application.
#[async_trait]
pub trait TextOutput: Send + Sync {
    /// Copy the text to the clipboard and insert it at the cursor.
    async fn copy_and_insert(&self, text: &str) -> Result<(), DomainError>;
}
