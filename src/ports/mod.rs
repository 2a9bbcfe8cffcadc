pub mod audio;
pub mod config;
pub mod engine;
pub mod output;
pub mod permissions;
pub mod provider;
pub mod store;

pub use audio::{AudioInput, CaptureStream};
pub use config::ConfigStore;
pub use engine::{EngineStatusUpdate, ModelEngine};
pub use output::TextOutput;
pub use permissions::{PermissionStatus, Permissions};
pub use provider::TranscriptionProvider;
pub use store::StateStore;
