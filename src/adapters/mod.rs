pub mod assemblyai;
pub mod audio_cpal;
pub mod clipboard;
pub mod config_store;
pub mod json_store;
pub mod local_engine;
pub mod openai;
pub mod permissions;

pub use assemblyai::AssemblyAiProvider;
pub use audio_cpal::CpalAudioInput;
pub use clipboard::ClipboardOutput;
pub use config_store::TomlConfigStore;
pub use json_store::JsonStateStore;
pub use local_engine::LocalWhisperProvider;
pub use openai::OpenAiProvider;
pub use permissions::SystemPermissions;
