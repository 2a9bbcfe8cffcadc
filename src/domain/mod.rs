pub mod audio;
pub mod config;
pub mod error;
pub mod model;
pub mod recording;
pub mod transcription;

pub use audio::{analyze_wav, encode_wav, AudioAnalysis, AudioArtifact, CaptureConfig};
pub use config::{AppConfig, LoggingConfig, OutputConfig, TranscriptionSettings};
pub use error::{DomainError, ModelStartFailure};
pub use model::{default_catalog, ModelPurpose, ModelStatus, ModelType, TranscriptionModel};
pub use recording::{
    AtomicRecordingState, FeedbackCue, RecordingState, ERROR_RESET_DELAY,
};
pub use transcription::{Segment, TranscribeConfig, TranscriptionRecord, TranscriptionResult};
