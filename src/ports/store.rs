use crate::domain::{DomainError, TranscriptionModel, TranscriptionRecord};

/// Port for the persistent state store (models and transcription history).
///
/// The store is the single source of truth that every window replica
/// reloads from after a `models-changed` or `transcriptions-changed`
/// event; replicas never patch themselves from event payloads.
pub trait StateStore: Send + Sync {
    fn load_models(&self) -> Result<Vec<TranscriptionModel>, DomainError>;

    fn save_models(&self, models: &[TranscriptionModel]) -> Result<(), DomainError>;

    /// History entries, newest first.
    fn load_transcriptions(&self) -> Result<Vec<TranscriptionRecord>, DomainError>;

    fn append_transcription(&self, record: &TranscriptionRecord) -> Result<(), DomainError>;
}
