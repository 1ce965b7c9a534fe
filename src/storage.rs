use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

const APP_DIR: &str = "prompt-library";
const DATA_FILE: &str = "data.json";

/// Whether a save should also refresh dependent views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Persist only (migrations, snippet edits, settings typing)
    Silent,
    /// Persist and notify views
    Notify,
}

/// Where the settings document lives. No schema is enforced here: reads
/// return whatever JSON is on disk.
pub trait SettingsStore: Send + Sync {
    /// `None` on first run. Unparsable content is reported as `None` too, so
    /// the reconciler falls back to defaults.
    fn read_persisted(&self) -> Result<Option<Value>>;

    /// Overwrite the whole document.
    fn write_persisted(&self, document: &Value) -> Result<()>;
}

/// Default location for the data file.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("No platform data directory")?;
    Ok(base.join(APP_DIR))
}

// ── JSON file ──────────────────────────────────────────────────────────────

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `data.json` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(DATA_FILE))
    }

    pub fn open_default() -> Result<Self> {
        Ok(Self::in_dir(default_data_dir()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileStore {
    fn read_persisted(&self) -> Result<Option<Value>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No settings file yet");
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        match serde_json::from_str(&content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Settings file is not valid JSON, ignoring it");
                Ok(None)
            }
        }
    }

    fn write_persisted(&self, document: &Value) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(document)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

// ── In memory ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    document: Mutex<Option<Value>>,
    writes: Mutex<usize>,
}

impl MemoryStore {
    pub fn new(initial: Option<Value>) -> Self {
        Self {
            document: Mutex::new(initial),
            writes: Mutex::new(0),
        }
    }

    pub fn snapshot(&self) -> Option<Value> {
        self.document.lock().expect("memory store mutex").clone()
    }

    /// Number of writes so far.
    pub fn write_count(&self) -> usize {
        *self.writes.lock().expect("memory store mutex")
    }
}

impl SettingsStore for MemoryStore {
    fn read_persisted(&self) -> Result<Option<Value>> {
        Ok(self.snapshot())
    }

    fn write_persisted(&self, document: &Value) -> Result<()> {
        *self.document.lock().expect("memory store mutex") = Some(document.clone());
        *self.writes.lock().expect("memory store mutex") += 1;
        Ok(())
    }
}
