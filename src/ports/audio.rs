use async_trait::async_trait;

use crate::domain::DomainError;

/// Port for opening microphone capture.
///
/// Implementations own the platform audio stack. One open stream exists per
/// recording session; the stream is exclusively owned by the session that
/// opened it.
#[async_trait]
pub trait AudioInput: Send + Sync {
    /// Open the microphone and start capturing.
    ///
    /// Returns an error if a stream is already open or no device is
    /// available.
    async fn open(&self) -> Result<Box<dyn CaptureStream>, DomainError>;
}

/// An active capture stream. Must be finalized or aborted exactly once;
/// both paths stop the underlying stream and release the device.
#[async_trait]
pub trait CaptureStream: Send {
    /// Stop capturing and return the recorded audio as WAV bytes
    /// (16-bit PCM mono).
    async fn finalize(self: Box<Self>) -> Result<Vec<u8>, DomainError>;

    /// Stop capturing and discard everything recorded so far.
    async fn abort(self: Box<Self>);
}
