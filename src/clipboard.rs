//! Clipboard access for copying generated documents.

use arboard::Clipboard;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("clipboard unavailable: {0}")]
pub struct ClipboardError(pub String);

/// Writes text to some clipboard.
pub trait ClipboardWriter {
    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError>;
}

/// System clipboard through arboard.
///
/// The underlying handle is opened on first write so that a headless session
/// without a display only fails when a copy is actually requested.
#[derive(Default)]
pub struct ArboardClipboard {
    clipboard: Option<Clipboard>,
}

impl ArboardClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClipboardWriter for ArboardClipboard {
    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        if self.clipboard.is_none() {
            let clipboard = Clipboard::new().map_err(|e| ClipboardError(e.to_string()))?;
            self.clipboard = Some(clipboard);
        }
        match self.clipboard.as_mut() {
            Some(clipboard) => clipboard
                .set_text(text)
                .map_err(|e| ClipboardError(e.to_string())),
            None => Err(ClipboardError("no clipboard handle".to_string())),
        }
    }
}

/// Clipboard that keeps every write in memory.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct RecordingClipboard {
    pub writes: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
}

#[cfg(test)]
impl RecordingClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<String> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
impl ClipboardWriter for RecordingClipboard {
    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        self.writes
            .lock()
            .map_err(|e| ClipboardError(e.to_string()))?
            .push(text.to_string());
        Ok(())
    }
}
