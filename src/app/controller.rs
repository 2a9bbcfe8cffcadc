//! Application controller.
//!
//! Owns the wired object graph (bus, capture, router, registry, session)
//! and exposes the operations the window layer calls. Construction is
//! split so tests and alternate frontends can inject their own port
//! implementations while `init` wires the production adapters.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

use crate::adapters::{
    AssemblyAiProvider, ClipboardOutput, CpalAudioInput, JsonStateStore, LocalWhisperProvider,
    OpenAiProvider, SystemPermissions, TomlConfigStore,
};
use crate::app::recording::RecordingSession;
use crate::bus::{BusEvent, EventBus};
use crate::capture::CaptureManager;
use crate::domain::{
    AppConfig, DomainError, ModelStatus, RecordingState, TranscriptionModel, TranscriptionRecord,
};
use crate::infrastructure::init_logging;
use crate::models::{LifecycleManager, ModelRegistry};
use crate::ports::{
    AudioInput, ConfigStore, ModelEngine, Permissions, StateStore, TextOutput,
};
use crate::router::ProviderRouter;

/// Port implementations the controller is wired from.
pub struct AppComponents {
    pub store: Arc<dyn StateStore>,
    pub audio: Arc<dyn AudioInput>,
    pub permissions: Arc<dyn Permissions>,
    pub engine: Arc<dyn ModelEngine>,
    pub output: Arc<dyn TextOutput>,
}

pub struct AppController {
    config: AppConfig,
    bus: EventBus,
    session: RecordingSession,
    registry: Arc<ModelRegistry>,
    lifecycle: Arc<LifecycleManager>,
    router: Arc<ProviderRouter>,
    store: Arc<dyn StateStore>,
    _engine_pump: JoinHandle<()>,
    _log_guard: Option<WorkerGuard>,
}

impl AppController {
    /// Wire the production adapters and start the controller. The engine
    /// is injected; everything else is built here.
    pub fn init(engine: Arc<dyn ModelEngine>) -> Result<Self, DomainError> {
        let config_store = TomlConfigStore::new()?;
        let config = config_store.load()?;
        let log_guard = init_logging(
            &config_store.logs_dir(),
            &config.logging.level,
            config.logging.file_logging,
        )?;
        info!("parla starting up");

        let bus = EventBus::new();
        let components = AppComponents {
            store: Arc::new(JsonStateStore::new(config_store.data_dir())?),
            audio: Arc::new(CpalAudioInput::new(config.capture.clone(), bus.clone())?),
            permissions: Arc::new(SystemPermissions),
            engine,
            output: Arc::new(ClipboardOutput::new(config.output.clone())?),
        };
        Self::with_components(components, config, bus, log_guard)
    }

    pub fn with_components(
        components: AppComponents,
        config: AppConfig,
        bus: EventBus,
        log_guard: Option<WorkerGuard>,
    ) -> Result<Self, DomainError> {
        let lifecycle = Arc::new(LifecycleManager::new(components.engine, bus.clone()));
        let engine_pump = lifecycle.spawn_event_pump();
        let registry = Arc::new(ModelRegistry::new(
            components.store.clone(),
            lifecycle.clone(),
            bus.clone(),
        ));

        let mut router = ProviderRouter::new();
        router.register("openai", Arc::new(OpenAiProvider::new()?));
        router.register("assemblyai", Arc::new(AssemblyAiProvider::new()?));
        router.register(
            "local-whisper",
            Arc::new(LocalWhisperProvider::new(lifecycle.clone())),
        );

        let router = Arc::new(router);
        let capture = Arc::new(CaptureManager::new(
            components.audio,
            components.permissions,
        ));
        let session = RecordingSession::new(
            capture,
            router.clone(),
            registry.clone(),
            components.store.clone(),
            components.output,
            config.transcription.clone(),
            bus.clone(),
        );

        Ok(Self {
            config,
            bus,
            session,
            registry,
            lifecycle,
            router,
            store: components.store,
            _engine_pump: engine_pump,
            _log_guard: log_guard,
        })
    }

    /// Seed the model catalog and bring a previously selected on-device
    /// model back up. Run once after construction.
    pub async fn startup(&self) -> Result<(), DomainError> {
        self.registry.sync_catalog().await?;
        self.registry.autostart_selected().await
    }

    // Recording

    pub async fn start_recording(&self) -> Result<(), DomainError> {
        self.session.start().await
    }

    pub async fn stop_recording(&self) -> Result<Option<TranscriptionRecord>, DomainError> {
        self.session.stop().await
    }

    pub async fn cancel_recording(&self) -> Result<(), DomainError> {
        self.session.cancel().await
    }

    pub fn recording_state(&self) -> RecordingState {
        self.session.state()
    }

    // Providers

    /// Registered transcription backend ids, sorted for display.
    pub fn providers(&self) -> Vec<String> {
        self.router.provider_ids()
    }

    // Models

    pub fn models(&self) -> Result<Vec<TranscriptionModel>, DomainError> {
        self.registry.list()
    }

    pub async fn select_model(&self, model_id: &str) -> Result<(), DomainError> {
        self.registry.select(model_id).await
    }

    pub async fn set_api_key(&self, model_id: &str, key: String) -> Result<(), DomainError> {
        self.registry.set_api_key(model_id, key).await
    }

    pub async fn remove_api_key(&self, model_id: &str) -> Result<(), DomainError> {
        self.registry.remove_api_key(model_id).await
    }

    pub async fn set_model_downloaded(
        &self,
        model_id: &str,
        downloaded: bool,
        path: Option<String>,
    ) -> Result<(), DomainError> {
        self.registry.set_downloaded(model_id, downloaded, path).await
    }

    pub async fn start_model(&self, model_id: &str) -> Result<ModelStatus, DomainError> {
        let model = self
            .models()?
            .into_iter()
            .find(|m| m.id == model_id)
            .ok_or_else(|| DomainError::ModelNotFound(model_id.to_string()))?;
        let start = self.lifecycle.start(&model).await;
        let status = match &start {
            Ok(status) => *status,
            Err(_) => ModelStatus::Error,
        };
        self.registry.record_status(model_id, status).await?;
        start
    }

    pub async fn stop_model(&self, model_id: &str) -> Result<ModelStatus, DomainError> {
        let status = self.lifecycle.stop(model_id).await;
        self.registry.record_status(model_id, status).await?;
        Ok(status)
    }

    pub async fn refresh_model_status(&self, model_id: &str) -> Result<ModelStatus, DomainError> {
        let status = self.lifecycle.refresh_status(model_id).await;
        self.registry.record_status(model_id, status).await?;
        Ok(status)
    }

    // History and events

    pub fn transcriptions(&self) -> Result<Vec<TranscriptionRecord>, DomainError> {
        self.store.load_transcriptions()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.bus.subscribe()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{encode_wav, TranscriptionResult};
    use crate::ports::{CaptureStream, EngineStatusUpdate, PermissionStatus};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::path::Path;

    struct FakeInput;

    struct FakeStream;

    #[async_trait]
    impl AudioInput for FakeInput {
        async fn open(&self) -> Result<Box<dyn CaptureStream>, DomainError> {
            Ok(Box::new(FakeStream))
        }
    }

    #[async_trait]
    impl CaptureStream for FakeStream {
        async fn finalize(self: Box<Self>) -> Result<Vec<u8>, DomainError> {
            encode_wav(&vec![5000i16; 8000], 16_000)
        }

        async fn abort(self: Box<Self>) {}
    }

    struct Granted;

    #[async_trait]
    impl Permissions for Granted {
        async fn check_microphone(&self) -> PermissionStatus {
            PermissionStatus::Granted
        }

        async fn request_microphone(&self) -> Result<bool, DomainError> {
            Ok(true)
        }
    }

    struct MemStore {
        models: Mutex<Vec<TranscriptionModel>>,
        transcriptions: Mutex<Vec<TranscriptionRecord>>,
    }

    impl StateStore for MemStore {
        fn load_models(&self) -> Result<Vec<TranscriptionModel>, DomainError> {
            Ok(self.models.lock().clone())
        }

        fn save_models(&self, models: &[TranscriptionModel]) -> Result<(), DomainError> {
            *self.models.lock() = models.to_vec();
            Ok(())
        }

        fn load_transcriptions(&self) -> Result<Vec<TranscriptionRecord>, DomainError> {
            Ok(self.transcriptions.lock().clone())
        }

        fn append_transcription(&self, record: &TranscriptionRecord) -> Result<(), DomainError> {
            self.transcriptions.lock().insert(0, record.clone());
            Ok(())
        }
    }

    struct EchoEngine {
        loaded: Mutex<Option<String>>,
        events: broadcast::Sender<EngineStatusUpdate>,
    }

    impl EchoEngine {
        fn new() -> Arc<Self> {
            let (events, _) = broadcast::channel(16);
            Arc::new(Self {
                loaded: Mutex::new(None),
                events,
            })
        }
    }

    #[async_trait]
    impl ModelEngine for EchoEngine {
        async fn load(
            &self,
            model_id: &str,
            _model_name: &str,
            _model_path: &Path,
        ) -> Result<(), DomainError> {
            *self.loaded.lock() = Some(model_id.to_string());
            Ok(())
        }

        async fn unload(&self) -> Result<(), DomainError> {
            *self.loaded.lock() = None;
            Ok(())
        }

        async fn status(&self) -> Option<EngineStatusUpdate> {
            self.loaded.lock().as_ref().map(|id| EngineStatusUpdate {
                model_id: id.clone(),
                status: ModelStatus::Ready,
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
            Ok(TranscriptionResult::from_text("dictated on device"))
        }
    }

    struct NullOutput;

    #[async_trait]
    impl TextOutput for NullOutput {
        async fn copy_and_insert(&self, _text: &str) -> Result<(), DomainError> {
            Ok(())
        }
    }

    fn controller() -> AppController {
        let components = AppComponents {
            store: Arc::new(MemStore {
                models: Mutex::new(Vec::new()),
                transcriptions: Mutex::new(Vec::new()),
            }),
            audio: Arc::new(FakeInput),
            permissions: Arc::new(Granted),
            engine: EchoEngine::new(),
            output: Arc::new(NullOutput),
        };
        AppController::with_components(components, AppConfig::new(), EventBus::new(), None)
            .unwrap()
    }

    #[tokio::test]
    async fn startup_seeds_the_catalog() {
        let app = controller();
        app.startup().await.unwrap();
        assert!(!app.models().unwrap().is_empty());
    }

    #[tokio::test]
    async fn lists_registered_providers() {
        let app = controller();
        assert_eq!(
            app.providers(),
            vec!["assemblyai", "local-whisper", "openai"]
        );
    }

    #[tokio::test]
    async fn full_on_device_dictation_flow() {
        let app = controller();
        app.startup().await.unwrap();

        app.set_model_downloaded("whisper-tiny", true, Some("/models/tiny.bin".into()))
            .await
            .unwrap();
        app.select_model("whisper-tiny").await.unwrap();

        app.start_recording().await.unwrap();
        assert_eq!(app.recording_state(), RecordingState::Recording);

        let record = app.stop_recording().await.unwrap().unwrap();
        assert_eq!(record.text, "dictated on device");
        assert!(!record.failed);
        assert_eq!(record.provider, "local-whisper");

        let history = app.transcriptions().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(app.recording_state(), RecordingState::Idle);
    }

    #[tokio::test]
    async fn manual_model_start_stop_cycle() {
        let app = controller();
        app.startup().await.unwrap();
        app.set_model_downloaded("whisper-base", true, Some("/models/base.bin".into()))
            .await
            .unwrap();

        let status = app.start_model("whisper-base").await.unwrap();
        assert_eq!(status, ModelStatus::Ready);

        let models = app.models().unwrap();
        let base = models.iter().find(|m| m.id == "whisper-base").unwrap();
        assert_eq!(base.status, ModelStatus::Ready);

        let status = app.stop_model("whisper-base").await.unwrap();
        assert_eq!(status, ModelStatus::Stopped);
    }

    #[tokio::test]
    async fn refresh_answers_stopped_for_unloaded_models() {
        let app = controller();
        app.startup().await.unwrap();
        let status = app.refresh_model_status("whisper-tiny").await.unwrap();
        assert_eq!(status, ModelStatus::Stopped);
    }
}
