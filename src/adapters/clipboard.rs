use std::time::Duration;

use arboard::Clipboard;
use async_trait::async_trait;
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::domain::config::OutputConfig;
use crate::domain::DomainError;
use crate::ports::TextOutput;

/// Clipboard + simulated paste delivery.
///
/// Note: this replaces the user's clipboard content with the transcript.
/// The previous content is NOT restored, to avoid races where the user
/// pastes before restoration completes.
pub struct ClipboardOutput {
    config: OutputConfig,
    clipboard: Mutex<Clipboard>,
}

impl ClipboardOutput {
    pub fn new(config: OutputConfig) -> Result<Self, DomainError> {
        let clipboard = Clipboard::new()
            .map_err(|e| DomainError::Output(format!("failed to initialize clipboard: {}", e)))?;
        Ok(Self {
            config,
            clipboard: Mutex::new(clipboard),
        })
    }

    fn set_clipboard_text(&self, text: &str) -> Result<(), DomainError> {
        self.clipboard
            .lock()
            .set_text(text)
            .map_err(|e| DomainError::Output(format!("failed to set clipboard text: {}", e)))?;
        debug!(chars = text.len(), "clipboard updated");
        Ok(())
    }

    /// Cmd+V on macOS, Ctrl+V elsewhere.
    fn simulate_paste(&self) -> Result<(), DomainError> {
        let mut enigo = Enigo::new(&Settings::default())
            .map_err(|e| DomainError::Output(format!("failed to create input simulator: {}", e)))?;

        #[cfg(target_os = "macos")]
        let modifier = Key::Meta;
        #[cfg(not(target_os = "macos"))]
        let modifier = Key::Control;

        enigo
            .key(modifier, Direction::Press)
            .map_err(|e| DomainError::Output(format!("failed to press modifier: {}", e)))?;
        enigo
            .key(Key::Unicode('v'), Direction::Click)
            .map_err(|e| DomainError::Output(format!("failed to press V: {}", e)))?;
        enigo
            .key(modifier, Direction::Release)
            .map_err(|e| DomainError::Output(format!("failed to release modifier: {}", e)))?;

        debug!("simulated paste");
        Ok(())
    }
}

#[async_trait]
impl TextOutput for ClipboardOutput {
    async fn copy_and_insert(&self, text: &str) -> Result<(), DomainError> {
        if text.is_empty() {
            debug!("empty transcript, nothing to insert");
            return Ok(());
        }

        self.set_clipboard_text(text)?;

        // Let the clipboard sync before the paste keystroke lands.
        tokio::time::sleep(Duration::from_millis(self.config.paste_delay_ms)).await;

        self.simulate_paste()?;
        info!(chars = text.len(), "transcript delivered");
        Ok(())
    }
}
