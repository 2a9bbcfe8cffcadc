//! Model registry.
//!
//! Owns the persisted model list and the selection invariants: at most one
//! selected model per purpose, and at most one on-device model running at
//! a time. Every mutation goes through the store and is announced with a
//! `models-changed` event; subscribers reload rather than patch.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::bus::{BusEvent, EventBus};
use crate::domain::{
    default_catalog, DomainError, ModelPurpose, ModelStatus, ModelType, TranscriptionModel,
};
use crate::models::lifecycle::LifecycleManager;
use crate::ports::StateStore;

pub struct ModelRegistry {
    store: Arc<dyn StateStore>,
    lifecycle: Arc<LifecycleManager>,
    bus: EventBus,
    // Serializes mutations; the store itself is not transactional.
    write_lock: Mutex<()>,
}

impl ModelRegistry {
    pub fn new(
        store: Arc<dyn StateStore>,
        lifecycle: Arc<LifecycleManager>,
        bus: EventBus,
    ) -> Self {
        Self {
            store,
            lifecycle,
            bus,
            write_lock: Mutex::new(()),
        }
    }

    pub fn list(&self) -> Result<Vec<TranscriptionModel>, DomainError> {
        self.store.load_models()
    }

    /// The active model for a purpose, if any.
    pub fn selected(
        &self,
        purpose: ModelPurpose,
    ) -> Result<Option<TranscriptionModel>, DomainError> {
        Ok(self
            .store
            .load_models()?
            .into_iter()
            .find(|m| m.purpose == purpose && m.is_active()))
    }

    /// Merge the built-in catalog into the store. Catalog entries gain any
    /// user state (selection, enabled flag, credentials, download state)
    /// already persisted under the same id; entries no longer in the
    /// catalog are dropped.
    pub async fn sync_catalog(&self) -> Result<(), DomainError> {
        let _guard = self.write_lock.lock().await;
        let stored = self.store.load_models()?;
        let merged: Vec<TranscriptionModel> = default_catalog()
            .into_iter()
            .map(|mut entry| {
                if let Some(existing) = stored.iter().find(|m| m.id == entry.id) {
                    entry.is_selected = existing.is_selected;
                    entry.is_enabled = existing.is_enabled;
                    entry.api_key = existing.api_key.clone();
                    entry.has_api_key = existing.has_api_key;
                    entry.is_downloaded = existing.is_downloaded;
                    entry.path = existing.path.clone();
                    entry.status = existing.status;
                }
                entry
            })
            .collect();
        self.store.save_models(&merged)?;
        self.bus.publish(BusEvent::ModelsChanged);
        Ok(())
    }

    /// Select a model for its purpose.
    ///
    /// Deselects the previous model of the same purpose; if that model was
    /// a running on-device model it is stopped first. A selected on-device
    /// model that is downloaded is started immediately; the start failure,
    /// if any, is returned after the selection has been persisted.
    pub async fn select(&self, model_id: &str) -> Result<(), DomainError> {
        let _guard = self.write_lock.lock().await;
        let mut models = self.store.load_models()?;

        let target = models
            .iter()
            .find(|m| m.id == model_id)
            .ok_or_else(|| DomainError::ModelNotFound(model_id.to_string()))?
            .clone();
        target.validate_selectable()?;

        // Stop the on-device model being displaced. Its status goes to
        // Stopped optimistically; engine events correct it if the unload
        // lags.
        let displaced: Option<String> = models
            .iter()
            .find(|m| {
                m.purpose == target.purpose
                    && m.is_selected
                    && m.id != target.id
                    && m.model_type == ModelType::Local
            })
            .map(|m| m.id.clone());
        if let Some(prev_id) = &displaced {
            self.lifecycle.stop(prev_id).await;
        }

        for model in models.iter_mut() {
            if model.purpose == target.purpose {
                model.is_selected = model.id == target.id;
            }
            if Some(&model.id) == displaced.as_ref() {
                model.status = ModelStatus::Stopped;
            }
        }
        self.store.save_models(&models)?;
        self.bus.publish(BusEvent::ModelsChanged);
        info!(model_id, "model selected");

        if target.model_type == ModelType::Local && target.is_downloaded {
            let start = self.lifecycle.start(&target).await;
            let status = match &start {
                Ok(status) => *status,
                Err(_) => ModelStatus::Error,
            };
            self.persist_status(&mut models, model_id, status)?;
            start?;
        }
        Ok(())
    }

    /// Store a credential for a cloud model.
    pub async fn set_api_key(&self, model_id: &str, key: String) -> Result<(), DomainError> {
        let _guard = self.write_lock.lock().await;
        let mut models = self.store.load_models()?;
        let model = models
            .iter_mut()
            .find(|m| m.id == model_id)
            .ok_or_else(|| DomainError::ModelNotFound(model_id.to_string()))?;
        model.api_key = Some(key);
        model.has_api_key = true;
        self.store.save_models(&models)?;
        self.bus.publish(BusEvent::ModelsChanged);
        Ok(())
    }

    /// Remove a stored credential. A selected model that becomes invalid
    /// without its key is deselected.
    pub async fn remove_api_key(&self, model_id: &str) -> Result<(), DomainError> {
        let _guard = self.write_lock.lock().await;
        let mut models = self.store.load_models()?;
        let model = models
            .iter_mut()
            .find(|m| m.id == model_id)
            .ok_or_else(|| DomainError::ModelNotFound(model_id.to_string()))?;
        model.api_key = None;
        model.has_api_key = false;
        if model.is_selected && model.validate_selectable().is_err() {
            warn!(model_id, "deselecting model after its API key was removed");
            model.is_selected = false;
        }
        self.store.save_models(&models)?;
        self.bus.publish(BusEvent::ModelsChanged);
        Ok(())
    }

    /// Record that a model file arrived on (or left) disk.
    pub async fn set_downloaded(
        &self,
        model_id: &str,
        downloaded: bool,
        path: Option<String>,
    ) -> Result<(), DomainError> {
        let _guard = self.write_lock.lock().await;
        let mut models = self.store.load_models()?;
        let model = models
            .iter_mut()
            .find(|m| m.id == model_id)
            .ok_or_else(|| DomainError::ModelNotFound(model_id.to_string()))?;
        model.is_downloaded = downloaded;
        model.path = path;
        if !downloaded {
            model.status = ModelStatus::Stopped;
            if model.is_selected {
                model.is_selected = false;
            }
        }
        self.store.save_models(&models)?;
        self.bus.publish(BusEvent::ModelsChanged);
        Ok(())
    }

    /// Persist a status change reported by the lifecycle manager.
    pub async fn record_status(
        &self,
        model_id: &str,
        status: ModelStatus,
    ) -> Result<(), DomainError> {
        let _guard = self.write_lock.lock().await;
        let mut models = self.store.load_models()?;
        self.persist_status(&mut models, model_id, status)
    }

    /// On startup, bring a previously selected on-device model back up.
    pub async fn autostart_selected(&self) -> Result<(), DomainError> {
        let selected = self
            .selected(ModelPurpose::SpeechToText)?
            .filter(|m| m.model_type == ModelType::Local && m.is_downloaded);
        let Some(model) = selected else {
            return Ok(());
        };

        info!(model_id = %model.id, "auto-starting previously selected on-device model");
        let status = match self.lifecycle.start(&model).await {
            Ok(status) => status,
            Err(err) => {
                warn!(model_id = %model.id, %err, "auto-start failed");
                ModelStatus::Error
            }
        };
        let _guard = self.write_lock.lock().await;
        let mut models = self.store.load_models()?;
        self.persist_status(&mut models, &model.id, status)
    }

    fn persist_status(
        &self,
        models: &mut [TranscriptionModel],
        model_id: &str,
        status: ModelStatus,
    ) -> Result<(), DomainError> {
        let Some(model) = models.iter_mut().find(|m| m.id == model_id) else {
            return Ok(());
        };
        if model.status == status {
            return Ok(());
        }
        model.status = status;
        self.store.save_models(models)?;
        self.bus.publish(BusEvent::ModelsChanged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TranscriptionResult;
    use crate::ports::{EngineStatusUpdate, ModelEngine, StateStore};
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::broadcast;

    struct MemStore {
        models: SyncMutex<Vec<TranscriptionModel>>,
    }

    impl MemStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                models: SyncMutex::new(Vec::new()),
            })
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

    struct OrderedEngine {
        // Interleaved load/unload order, to assert stop-before-start.
        ops: SyncMutex<Vec<String>>,
        loads: AtomicUsize,
        unloads: AtomicUsize,
        events: broadcast::Sender<EngineStatusUpdate>,
    }

    impl OrderedEngine {
        fn new() -> Arc<Self> {
            let (events, _) = broadcast::channel(16);
            Arc::new(Self {
                ops: SyncMutex::new(Vec::new()),
                loads: AtomicUsize::new(0),
                unloads: AtomicUsize::new(0),
                events,
            })
        }
    }

    #[async_trait]
    impl ModelEngine for OrderedEngine {
        async fn load(
            &self,
            model_id: &str,
            _model_name: &str,
            _model_path: &Path,
        ) -> Result<(), DomainError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.ops.lock().push(format!("load:{model_id}"));
            Ok(())
        }

        async fn unload(&self) -> Result<(), DomainError> {
            self.unloads.fetch_add(1, Ordering::SeqCst);
            self.ops.lock().push("unload".to_string());
            Ok(())
        }

        async fn status(&self) -> Option<EngineStatusUpdate> {
            self.ops.lock().last().and_then(|op| {
                op.strip_prefix("load:").map(|id| EngineStatusUpdate {
                    model_id: id.to_string(),
                    status: ModelStatus::Ready,
                })
            })
        }

        fn subscribe(&self) -> broadcast::Receiver<EngineStatusUpdate> {
            self.events.subscribe()
        }

        async fn transcribe(
            &self,
            _wav_bytes: &[u8],
            _language: Option<&str>,
        ) -> Result<TranscriptionResult, DomainError> {
            Ok(TranscriptionResult::from_text("ok"))
        }
    }

    async fn registry() -> (ModelRegistry, Arc<MemStore>, Arc<OrderedEngine>) {
        let store = MemStore::new();
        let engine = OrderedEngine::new();
        let bus = EventBus::new();
        let lifecycle = Arc::new(LifecycleManager::new(engine.clone(), bus.clone()));
        let registry = ModelRegistry::new(store.clone(), lifecycle, bus);
        registry.sync_catalog().await.unwrap();
        (registry, store, engine)
    }

    fn mark_downloaded(store: &MemStore, id: &str) {
        let mut models = store.models.lock();
        let model = models.iter_mut().find(|m| m.id == id).unwrap();
        model.is_downloaded = true;
        model.path = Some(format!("/models/{id}.bin"));
    }

    fn find<'a>(models: &'a [TranscriptionModel], id: &str) -> &'a TranscriptionModel {
        models.iter().find(|m| m.id == id).unwrap()
    }

    #[tokio::test]
    async fn sync_catalog_seeds_the_store() {
        let (registry, _store, _engine) = registry().await;
        let models = registry.list().unwrap();
        assert_eq!(models.len(), default_catalog().len());
    }

    #[tokio::test]
    async fn sync_catalog_preserves_user_state() {
        let (registry, store, _engine) = registry().await;
        registry
            .set_api_key("openai-whisper-1", "sk-test".into())
            .await
            .unwrap();
        registry.select("openai-whisper-1").await.unwrap();
        mark_downloaded(&store, "whisper-tiny");

        registry.sync_catalog().await.unwrap();

        let models = registry.list().unwrap();
        let openai = find(&models, "openai-whisper-1");
        assert!(openai.is_selected);
        assert!(openai.has_api_key);
        assert_eq!(openai.api_key.as_deref(), Some("sk-test"));
        assert!(find(&models, "whisper-tiny").is_downloaded);
    }

    #[tokio::test]
    async fn cloud_model_without_key_cannot_be_selected() {
        let (registry, _store, _engine) = registry().await;
        let err = registry.select("openai-whisper-1").await.unwrap_err();
        assert!(matches!(err, DomainError::SelectionRejected { .. }));
        assert!(registry
            .selected(ModelPurpose::SpeechToText)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn selecting_unknown_model_fails() {
        let (registry, _store, _engine) = registry().await;
        assert!(matches!(
            registry.select("no-such-model").await,
            Err(DomainError::ModelNotFound(_))
        ));
    }

    #[tokio::test]
    async fn selecting_local_model_starts_it() {
        let (registry, store, engine) = registry().await;
        mark_downloaded(&store, "whisper-tiny");

        registry.select("whisper-tiny").await.unwrap();

        let models = registry.list().unwrap();
        let tiny = find(&models, "whisper-tiny");
        assert!(tiny.is_selected);
        assert_eq!(tiny.status, ModelStatus::Ready);
        assert_eq!(engine.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn switching_local_models_stops_the_old_one_first() {
        let (registry, store, engine) = registry().await;
        mark_downloaded(&store, "whisper-tiny");
        mark_downloaded(&store, "whisper-base");

        registry.select("whisper-tiny").await.unwrap();
        registry.select("whisper-base").await.unwrap();

        let ops = engine.ops.lock().clone();
        assert_eq!(ops, vec!["load:whisper-tiny", "unload", "load:whisper-base"]);

        let models = registry.list().unwrap();
        assert!(!find(&models, "whisper-tiny").is_selected);
        assert_eq!(find(&models, "whisper-tiny").status, ModelStatus::Stopped);
        assert!(find(&models, "whisper-base").is_selected);
        assert_eq!(find(&models, "whisper-base").status, ModelStatus::Ready);
    }

    #[tokio::test]
    async fn selection_is_scoped_per_purpose() {
        let (registry, store, _engine) = registry().await;
        mark_downloaded(&store, "whisper-tiny");
        registry.select("whisper-tiny").await.unwrap();

        registry
            .set_api_key("anthropic-claude", "sk-ant".into())
            .await
            .unwrap();
        registry.select("anthropic-claude").await.unwrap();

        let models = registry.list().unwrap();
        assert!(find(&models, "whisper-tiny").is_selected);
        assert!(find(&models, "anthropic-claude").is_selected);
    }

    #[tokio::test]
    async fn removing_key_deselects_an_invalid_model() {
        let (registry, _store, _engine) = registry().await;
        registry
            .set_api_key("openai-whisper-1", "sk-test".into())
            .await
            .unwrap();
        registry.select("openai-whisper-1").await.unwrap();

        registry.remove_api_key("openai-whisper-1").await.unwrap();

        let models = registry.list().unwrap();
        let openai = find(&models, "openai-whisper-1");
        assert!(!openai.is_selected);
        assert!(!openai.has_api_key);
        assert!(openai.api_key.is_none());
    }

    #[tokio::test]
    async fn removing_download_deselects_and_stops() {
        let (registry, store, _engine) = registry().await;
        mark_downloaded(&store, "whisper-tiny");
        registry.select("whisper-tiny").await.unwrap();

        registry
            .set_downloaded("whisper-tiny", false, None)
            .await
            .unwrap();

        let models = registry.list().unwrap();
        let tiny = find(&models, "whisper-tiny");
        assert!(!tiny.is_selected);
        assert!(!tiny.is_downloaded);
        assert_eq!(tiny.status, ModelStatus::Stopped);
    }

    #[tokio::test]
    async fn autostart_brings_the_selected_local_model_up() {
        let (registry, store, engine) = registry().await;
        mark_downloaded(&store, "whisper-tiny");
        registry.select("whisper-tiny").await.unwrap();
        engine.ops.lock().clear();
        engine.loads.store(0, Ordering::SeqCst);

        registry.autostart_selected().await.unwrap();
        assert_eq!(engine.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn autostart_without_a_local_selection_is_a_no_op() {
        let (registry, _store, engine) = registry().await;
        registry
            .set_api_key("openai-whisper-1", "sk-test".into())
            .await
            .unwrap();
        registry.select("openai-whisper-1").await.unwrap();

        registry.autostart_selected().await.unwrap();
        assert_eq!(engine.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn mutations_publish_models_changed() {
        let (registry, _store, _engine) = registry().await;
        let mut events = registry.bus.subscribe();
        registry
            .set_api_key("openai-whisper-1", "sk-test".into())
            .await
            .unwrap();
        assert!(matches!(events.recv().await, Ok(BusEvent::ModelsChanged)));
    }
}
