//! Cross-window event bus.
//!
//! A single broadcast channel fans events out to every subscriber (each UI
//! window holds one receiver). Change events are notifications only: the
//! payload never carries the changed state, subscribers reload it from the
//! store. Lagging subscribers lose the oldest events, which is safe because
//! every event is either transient feedback or a cue to reload.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::{
    DomainError, FeedbackCue, ModelStatus, RecordingState, TranscriptionModel,
};
use crate::ports::StateStore;

const BUS_CAPACITY: usize = 256;

/// Event published on the bus. Names are stable identifiers that window
/// frontends subscribe to by string.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum BusEvent {
    /// Recording state machine moved to a new state.
    RecordingState { state: RecordingState },
    /// Smoothed microphone level, 0 to 100.
    AudioLevel { level: f32 },
    /// An on-device model changed status.
    ModelStatusChanged { model_id: String, status: ModelStatus },
    /// The model list changed; subscribers reload it from the store.
    ModelsChanged,
    /// The transcription history changed; subscribers reload it.
    TranscriptionsChanged,
    /// The capture overlay should hide itself.
    HideCaptureSurface,
    /// Audible or haptic feedback cue.
    Feedback { cue: FeedbackCue },
}

impl BusEvent {
    /// Stable event name, matching what frontends listen for.
    pub fn name(&self) -> &'static str {
        match self {
            BusEvent::RecordingState { .. } => "recording-state",
            BusEvent::AudioLevel { .. } => "audio-level",
            BusEvent::ModelStatusChanged { .. } => "model-status-changed",
            BusEvent::ModelsChanged => "models-changed",
            BusEvent::TranscriptionsChanged => "transcriptions-changed",
            BusEvent::HideCaptureSurface => "hide-capture-surface",
            BusEvent::Feedback { .. } => "feedback",
        }
    }
}

/// Broadcast bus shared by every subsystem.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    /// Publish an event to all current subscribers. Publishing with no
    /// subscribers is not an error.
    pub fn publish(&self, event: BusEvent) {
        debug!(event = event.name(), "bus publish");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Per-window replica of the model list.
///
/// Holds a local copy and reloads it from the store whenever a
/// `models-changed` event arrives. It never applies event payloads
/// directly, so a replica that missed events still converges after the
/// next reload.
pub struct ModelReplica {
    store: Arc<dyn StateStore>,
    models: Vec<TranscriptionModel>,
}

impl ModelReplica {
    pub fn new(store: Arc<dyn StateStore>) -> Result<Self, DomainError> {
        let models = store.load_models()?;
        Ok(Self { store, models })
    }

    pub fn models(&self) -> &[TranscriptionModel] {
        &self.models
    }

    /// Apply one bus event. Only `models-changed` triggers a reload.
    pub fn on_event(&mut self, event: &BusEvent) -> Result<(), DomainError> {
        if matches!(event, BusEvent::ModelsChanged) {
            self.models = self.store.load_models()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::default_catalog;
    use parking_lot::Mutex;

    struct MemStore {
        models: Mutex<Vec<TranscriptionModel>>,
    }

    impl MemStore {
        fn new(models: Vec<TranscriptionModel>) -> Self {
            Self {
                models: Mutex::new(models),
            }
        }
    }

    impl StateStore for MemStore {
        fn load_models(&self) -> Result<Vec<TranscriptionModel>, DomainError> {
            Ok(self.models.lock().clone())
        }

        fn save_models(&self, models: &[TranscriptionModel]) -> Result<(), DomainError> {
            *self.models.lock() = models.to_vec();
            Ok(())
        }

        fn load_transcriptions(
            &self,
        ) -> Result<Vec<crate::domain::TranscriptionRecord>, DomainError> {
            Ok(Vec::new())
        }

        fn append_transcription(
            &self,
            _record: &crate::domain::TranscriptionRecord,
        ) -> Result<(), DomainError> {
            Ok(())
        }
    }

    #[test]
    fn event_names_are_stable() {
        assert_eq!(
            BusEvent::ModelStatusChanged {
                model_id: "whisper-tiny".into(),
                status: ModelStatus::Ready,
            }
            .name(),
            "model-status-changed"
        );
        assert_eq!(BusEvent::ModelsChanged.name(), "models-changed");
        assert_eq!(
            BusEvent::TranscriptionsChanged.name(),
            "transcriptions-changed"
        );
        assert_eq!(
            BusEvent::HideCaptureSurface.name(),
            "hide-capture-surface"
        );
    }

    #[tokio::test]
    async fn all_subscribers_receive_each_event() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(BusEvent::ModelsChanged);

        assert!(matches!(a.recv().await, Ok(BusEvent::ModelsChanged)));
        assert!(matches!(b.recv().await, Ok(BusEvent::ModelsChanged)));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = EventBus::new();
        bus.publish(BusEvent::TranscriptionsChanged);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::new();
        bus.publish(BusEvent::ModelsChanged);

        let mut late = bus.subscribe();
        bus.publish(BusEvent::TranscriptionsChanged);

        assert!(matches!(
            late.recv().await,
            Ok(BusEvent::TranscriptionsChanged)
        ));
    }

    #[test]
    fn replica_reloads_from_store_on_models_changed() {
        let store = Arc::new(MemStore::new(Vec::new()));
        let mut replica = ModelReplica::new(store.clone()).unwrap();
        assert!(replica.models().is_empty());

        store.save_models(&default_catalog()).unwrap();

        // Unrelated events leave the replica untouched.
        replica
            .on_event(&BusEvent::HideCaptureSurface)
            .unwrap();
        assert!(replica.models().is_empty());

        replica.on_event(&BusEvent::ModelsChanged).unwrap();
        assert_eq!(replica.models().len(), default_catalog().len());
    }

    #[test]
    fn event_payload_serializes_tagged() {
        let json = serde_json::to_value(BusEvent::AudioLevel { level: 42.5 }).unwrap();
        assert_eq!(json["event"], "audio-level");
        assert_eq!(json["payload"]["level"], 42.5);
    }
}
