use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

/// Recording session state machine.
///
/// State transitions:
/// - Idle -> Recording (start)
/// - Recording -> Stopping -> Transcribing -> Idle (stop, artifact produced)
/// - Recording/Stopping/Transcribing -> Idle (cancel, no artifact persisted)
/// - any -> Error -> Idle (failure, then automatic reset after a timeout)
///
/// Exactly one session state is live per capture session; other surfaces
/// see read-only mirrors pushed over the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum RecordingState {
    Idle = 0,
    Recording = 1,
    Stopping = 2,
    Transcribing = 3,
    Error = 4,
}

impl RecordingState {
    /// Check whether a new session may start from this state.
    #[must_use]
    pub fn can_start(&self) -> bool {
        matches!(self, RecordingState::Idle)
    }

    /// Check whether stop is meaningful in this state.
    #[must_use]
    pub fn can_stop(&self) -> bool {
        matches!(self, RecordingState::Recording)
    }

    /// Cancel is legal from every state except Idle.
    #[must_use]
    pub fn can_cancel(&self) -> bool {
        !matches!(self, RecordingState::Idle)
    }
}

impl From<u8> for RecordingState {
    fn from(value: u8) -> Self {
        match value {
            0 => RecordingState::Idle,
            1 => RecordingState::Recording,
            2 => RecordingState::Stopping,
            3 => RecordingState::Transcribing,
            _ => RecordingState::Error,
        }
    }
}

impl From<RecordingState> for u8 {
    fn from(state: RecordingState) -> Self {
        state as u8
    }
}

/// Atomic wrapper for RecordingState for lock-free reads across tasks.
#[derive(Debug)]
pub struct AtomicRecordingState(AtomicU8);

impl AtomicRecordingState {
    pub fn new(state: RecordingState) -> Self {
        Self(AtomicU8::new(state.into()))
    }

    pub fn load(&self) -> RecordingState {
        self.0.load(Ordering::Acquire).into()
    }

    pub fn store(&self, state: RecordingState) {
        self.0.store(state.into(), Ordering::Release);
    }

    /// Compare and swap, returns true if successful.
    pub fn compare_exchange(&self, current: RecordingState, new: RecordingState) -> bool {
        self.0
            .compare_exchange(current.into(), new.into(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for AtomicRecordingState {
    fn default() -> Self {
        Self::new(RecordingState::Idle)
    }
}

/// Transient feedback cues surfaced on the capture overlay.
///
/// Cancellation and error always show feedback; clean completion flashes
/// briefly and is then cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackCue {
    Processing,
    Completed,
    Cancelled,
    Error,
}

impl FeedbackCue {
    /// How long the cue stays visible before it is cleared.
    pub fn duration(&self) -> Duration {
        match self {
            FeedbackCue::Processing => Duration::ZERO, // cleared by the next cue
            FeedbackCue::Completed => Duration::from_millis(500),
            FeedbackCue::Cancelled => Duration::from_millis(750),
            FeedbackCue::Error => Duration::from_millis(500),
        }
    }
}

/// Delay before an Error state resets back to Idle.
pub const ERROR_RESET_DELAY: Duration = Duration::from_millis(1000);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_start_only_from_idle() {
        assert!(RecordingState::Idle.can_start());
        assert!(!RecordingState::Recording.can_start());
        assert!(!RecordingState::Stopping.can_start());
        assert!(!RecordingState::Transcribing.can_start());
        assert!(!RecordingState::Error.can_start());
    }

    #[test]
    fn test_can_stop_only_while_recording() {
        assert!(!RecordingState::Idle.can_stop());
        assert!(RecordingState::Recording.can_stop());
        assert!(!RecordingState::Stopping.can_stop());
        assert!(!RecordingState::Transcribing.can_stop());
    }

    #[test]
    fn test_cancel_from_any_non_idle_state() {
        assert!(!RecordingState::Idle.can_cancel());
        assert!(RecordingState::Recording.can_cancel());
        assert!(RecordingState::Stopping.can_cancel());
        assert!(RecordingState::Transcribing.can_cancel());
        assert!(RecordingState::Error.can_cancel());
    }

    #[test]
    fn test_state_roundtrip() {
        for state in [
            RecordingState::Idle,
            RecordingState::Recording,
            RecordingState::Stopping,
            RecordingState::Transcribing,
            RecordingState::Error,
        ] {
            let value: u8 = state.into();
            assert_eq!(RecordingState::from(value), state);
        }
    }

    #[test]
    fn test_atomic_state_cas() {
        let atomic = AtomicRecordingState::default();
        assert_eq!(atomic.load(), RecordingState::Idle);

        assert!(atomic.compare_exchange(RecordingState::Idle, RecordingState::Recording));
        assert_eq!(atomic.load(), RecordingState::Recording);

        // Failed CAS leaves the state untouched
        assert!(!atomic.compare_exchange(RecordingState::Idle, RecordingState::Error));
        assert_eq!(atomic.load(), RecordingState::Recording);
    }

    #[test]
    fn test_cancelled_feedback_lingers_longest() {
        assert!(FeedbackCue::Cancelled.duration() > FeedbackCue::Completed.duration());
        assert_eq!(FeedbackCue::Processing.duration(), Duration::ZERO);
    }
}
