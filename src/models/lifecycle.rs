//! On-device model lifecycle.
//!
//! Issues load/unload commands to the engine and tracks which model is
//! active and in what status. Start reports whatever the engine reports;
//! a load command that returns Ok may still leave the model Loading, so a
//! delayed verification re-queries the engine shortly after and promotes
//! or demotes the recorded status. Stop is best-effort and always ends in
//! Stopped.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::bus::{BusEvent, EventBus};
use crate::domain::{
    DomainError, ModelStartFailure, ModelStatus, ModelType, TranscriptionModel,
    TranscriptionResult,
};
use crate::ports::ModelEngine;

/// How long after a successful load command the engine is re-queried.
const VERIFY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
struct CurrentModel {
    id: String,
    status: ModelStatus,
}

pub struct LifecycleManager {
    engine: Arc<dyn ModelEngine>,
    bus: EventBus,
    current: Arc<Mutex<Option<CurrentModel>>>,
    verification: SyncMutex<Option<JoinHandle<()>>>,
}

impl LifecycleManager {
    pub fn new(engine: Arc<dyn ModelEngine>, bus: EventBus) -> Self {
        Self {
            engine,
            bus,
            current: Arc::new(Mutex::new(None)),
            verification: SyncMutex::new(None),
        }
    }

    /// Start an on-device model.
    ///
    /// Returns the engine-reported status, which may still be Loading.
    /// Failures are classified from the engine's message so the error
    /// carries a recovery suggestion.
    pub async fn start(&self, model: &TranscriptionModel) -> Result<ModelStatus, DomainError> {
        if model.model_type != ModelType::Local {
            return Err(DomainError::ModelStart {
                cause: ModelStartFailure::Unknown,
                message: format!("\"{}\" is not an on-device model", model.id),
            });
        }
        let path = model.path.as_deref().ok_or_else(|| DomainError::ModelStart {
            cause: ModelStartFailure::FileNotFound,
            message: format!("no file path recorded for \"{}\"", model.id),
        })?;

        self.abort_verification();

        info!(model_id = %model.id, path, "starting on-device model");
        if let Err(err) = self
            .engine
            .load(&model.id, &model.name, std::path::Path::new(path))
            .await
        {
            let message = err.to_string();
            let cause = ModelStartFailure::classify(&message);
            error!(model_id = %model.id, %message, ?cause, "model start failed");
            self.record_status(&model.id, ModelStatus::Error).await;
            return Err(DomainError::ModelStart { cause, message });
        }

        let status = match self.engine.status().await {
            Some(update) if update.model_id == model.id => update.status,
            _ => ModelStatus::Loading,
        };
        self.record_status(&model.id, status).await;
        self.schedule_verification(model.id.clone());
        Ok(status)
    }

    /// Stop the active model. Best-effort: an unload failure is logged and
    /// the model is still recorded as Stopped.
    pub async fn stop(&self, model_id: &str) -> ModelStatus {
        self.abort_verification();

        if let Err(err) = self.engine.unload().await {
            warn!(model_id, %err, "engine unload failed, recording model as stopped");
        }
        *self.current.lock().await = None;
        self.bus.publish(BusEvent::ModelStatusChanged {
            model_id: model_id.to_string(),
            status: ModelStatus::Stopped,
        });
        info!(model_id, "on-device model stopped");
        ModelStatus::Stopped
    }

    /// Re-query the engine for the model's status and publish the answer.
    /// Refreshing a model that is not the active one answers Stopped
    /// without touching the active model's record.
    pub async fn refresh_status(&self, model_id: &str) -> ModelStatus {
        let status = match self.engine.status().await {
            Some(update) if update.model_id == model_id => update.status,
            _ => ModelStatus::Stopped,
        };
        let mut cur = self.current.lock().await;
        match cur.as_mut() {
            Some(c) if c.id == model_id => c.status = status,
            Some(_) => {}
            None if status != ModelStatus::Stopped => {
                *cur = Some(CurrentModel {
                    id: model_id.to_string(),
                    status,
                });
            }
            None => {}
        }
        drop(cur);
        self.bus.publish(BusEvent::ModelStatusChanged {
            model_id: model_id.to_string(),
            status,
        });
        status
    }

    /// Status of the given model as last observed. Stopped if it is not
    /// the active model.
    pub async fn status(&self, model_id: &str) -> ModelStatus {
        match self.current.lock().await.as_ref() {
            Some(current) if current.id == model_id => current.status,
            _ => ModelStatus::Stopped,
        }
    }

    /// Run inference with the active model.
    pub async fn transcribe(
        &self,
        wav_bytes: &[u8],
        language: Option<&str>,
    ) -> Result<TranscriptionResult, DomainError> {
        let ready = matches!(
            self.current.lock().await.as_ref(),
            Some(current) if current.status == ModelStatus::Ready
        );
        if !ready {
            return Err(DomainError::ProviderUnavailable {
                provider: "local-whisper".into(),
                reason: "no on-device model is ready".into(),
            });
        }
        self.engine.transcribe(wav_bytes, language).await
    }

    /// Whether the active model is ready to serve inference.
    pub async fn is_ready(&self) -> bool {
        matches!(
            self.current.lock().await.as_ref(),
            Some(current) if current.status == ModelStatus::Ready
        )
    }

    /// Forward engine-originated status events (crashes, late failures)
    /// onto the bus, keeping the recorded status in sync.
    pub fn spawn_event_pump(&self) -> JoinHandle<()> {
        let mut events = self.engine.subscribe();
        let current = self.current.clone();
        let bus = self.bus.clone();
        tokio::spawn(async move {
            while let Ok(update) = events.recv().await {
                let mut cur = current.lock().await;
                let relevant = matches!(cur.as_ref(), Some(c) if c.id == update.model_id);
                if relevant {
                    if let Some(c) = cur.as_mut() {
                        c.status = update.status;
                    }
                }
                drop(cur);
                bus.publish(BusEvent::ModelStatusChanged {
                    model_id: update.model_id,
                    status: update.status,
                });
            }
        })
    }

    async fn record_status(&self, model_id: &str, status: ModelStatus) {
        *self.current.lock().await = Some(CurrentModel {
            id: model_id.to_string(),
            status,
        });
        self.bus.publish(BusEvent::ModelStatusChanged {
            model_id: model_id.to_string(),
            status,
        });
    }

    /// After a load command succeeds the engine is re-queried once, a
    /// little later. Ready promotes a recorded Loading; an engine that no
    /// longer knows the model demotes it to Error; a model still Loading
    /// is left alone (engine events will settle it).
    fn schedule_verification(&self, model_id: String) {
        self.abort_verification();
        let engine = self.engine.clone();
        let current = self.current.clone();
        let bus = self.bus.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(VERIFY_DELAY).await;
            let reported = engine.status().await;
            let mut cur = current.lock().await;
            let Some(c) = cur.as_mut() else { return };
            if c.id != model_id {
                return;
            }
            let new_status = match reported {
                Some(update) if update.model_id == model_id => update.status,
                _ => ModelStatus::Error,
            };
            if new_status != c.status && new_status != ModelStatus::Loading {
                warn!(
                    %model_id,
                    from = ?c.status,
                    to = ?new_status,
                    "verification adjusted model status"
                );
                c.status = new_status;
                drop(cur);
                bus.publish(BusEvent::ModelStatusChanged {
                    model_id,
                    status: new_status,
                });
            }
        });
        *self.verification.lock() = Some(handle);
    }

    fn abort_verification(&self) {
        if let Some(handle) = self.verification.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        self.abort_verification();
    }
}
