#![forbid(unsafe_code)]

//! Voice capture and transcription orchestrator.
//!
//! Coordinates the microphone, a registry of transcription backends
//! (cloud APIs and an on-device engine), the persisted model and history
//! state, and the event bus that keeps every window in sync. Hexagonal
//! layout: `domain` holds the types and state machines, `ports` the
//! trait seams, `adapters` the platform and network implementations,
//! `app` the wiring and the session orchestration.

pub mod adapters;
pub mod app;
pub mod bus;
pub mod capture;
pub mod domain;
pub mod infrastructure;
pub mod models;
pub mod ports;
pub mod router;
pub mod waveform;

pub use app::{AppComponents, AppController};
pub use bus::{BusEvent, EventBus};
pub use capture::CaptureManager;
pub use domain::{DomainError, RecordingState};
pub use models::{LifecycleManager, ModelRegistry};
pub use router::ProviderRouter;
pub use waveform::{Waveform, WaveformMode};
