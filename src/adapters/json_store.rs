//! JSON state store.
//!
//! Models and transcription history live in two JSON files under the
//! application data directory. Writes replace the whole file; the store
//! serializes access with a lock, and every consumer reloads after a
//! change event instead of holding long-lived copies.

use std::fs;
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::domain::{DomainError, TranscriptionModel, TranscriptionRecord};
use crate::ports::StateStore;

const MODELS_FILE: &str = "models.json";
const TRANSCRIPTIONS_FILE: &str = "transcriptions.json";
/// History is capped; the oldest entries fall off.
const MAX_HISTORY: usize = 500;

pub struct JsonStateStore {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStateStore {
    pub fn new(data_dir: PathBuf) -> Result<Self, DomainError> {
        fs::create_dir_all(&data_dir)?;
        info!(data_dir = ?data_dir, "state store initialized");
        Ok(Self {
            data_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn models_path(&self) -> PathBuf {
        self.data_dir.join(MODELS_FILE)
    }

    fn transcriptions_path(&self) -> PathBuf {
        self.data_dir.join(TRANSCRIPTIONS_FILE)
    }

    fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &PathBuf,
    ) -> Result<Vec<T>, DomainError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_json<T: serde::Serialize>(
        &self,
        path: &PathBuf,
        value: &[T],
    ) -> Result<(), DomainError> {
        let content = serde_json::to_string_pretty(value)?;
        fs::write(path, content)?;
        debug!(path = ?path, entries = value.len(), "state file written");
        Ok(())
    }
}

impl StateStore for JsonStateStore {
    fn load_models(&self) -> Result<Vec<TranscriptionModel>, DomainError> {
        self.read_json(&self.models_path())
    }

    fn save_models(&self, models: &[TranscriptionModel]) -> Result<(), DomainError> {
        let _guard = self.write_lock.lock();
        self.write_json(&self.models_path(), models)
    }

    fn load_transcriptions(&self) -> Result<Vec<TranscriptionRecord>, DomainError> {
        self.read_json(&self.transcriptions_path())
    }

    fn append_transcription(&self, record: &TranscriptionRecord) -> Result<(), DomainError> {
        let _guard = self.write_lock.lock();
        let mut records = self.read_json::<TranscriptionRecord>(&self.transcriptions_path())?;
        records.insert(0, record.clone());
        records.truncate(MAX_HISTORY);
        self.write_json(&self.transcriptions_path(), &records)
    }
}
