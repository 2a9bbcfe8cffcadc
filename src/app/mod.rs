pub mod controller;
pub mod recording;

pub use controller::{AppComponents, AppController};
pub use recording::RecordingSession;
