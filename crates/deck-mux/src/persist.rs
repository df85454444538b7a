//! Saved servo position

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PersistError;

/// Storage for the last commanded angle
pub trait PositionStore: Send {
    /// Saved angle, `None` if nothing has been saved yet
    fn load_position(&mut self) -> impl Future<Output = Result<Option<f32>, PersistError>> + Send;

    /// Replace the saved angle
    fn save_position(&mut self, angle: f32) -> impl Future<Output = Result<(), PersistError>> + Send;
}

#[derive(Debug, Serialize, Deserialize)]
struct PositionRecord {
    last_position: f32,
    #[serde(default)]
    saved_at: u64,
}

/// Position kept in a small JSON file
///
/// Writes go to a sibling temporary file first and are renamed into place so
/// a power cut never leaves a truncated record.
#[derive(Debug, Clone)]
pub struct JsonPositionStore {
    path: PathBuf,
}

impl JsonPositionStore {
    /// Store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File location
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl PositionStore for JsonPositionStore {
    async fn load_position(&mut self) -> Result<Option<f32>, PersistError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: PositionRecord = serde_json::from_str(&text)?;
        if !record.last_position.is_finite() {
            return Err(PersistError::NonFinite(record.last_position));
        }
        debug!(
            "Loaded position {:.1} saved at {}",
            record.last_position, record.saved_at
        );
        Ok(Some(record.last_position))
    }

    async fn save_position(&mut self, angle: f32) -> Result<(), PersistError> {
        if !angle.is_finite() {
            return Err(PersistError::NonFinite(angle));
        }
        let record = PositionRecord {
            last_position: angle,
            saved_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };
        let json = serde_json::to_string_pretty(&record)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let temp = self.temp_path();
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        debug!("Saved position {:.1} to {}", angle, self.path.display());
        Ok(())
    }
}

/// In-memory store, cloneable so tests can inspect what was saved
#[derive(Debug, Clone, Default)]
pub struct MemoryPositionStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    angle: Option<f32>,
    saves: usize,
    fail_saves: bool,
}

impl MemoryPositionStore {
    /// Store pre-loaded with `angle`
    pub fn with_position(angle: f32) -> Self {
        let store = Self::default();
        store.lock().angle = Some(angle);
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Currently stored angle
    pub fn position(&self) -> Option<f32> {
        self.lock().angle
    }

    /// Number of successful saves
    pub fn saves(&self) -> usize {
        self.lock().saves
    }

    /// Make every following save fail
    pub fn set_fail_saves(&self, fail: bool) {
        self.lock().fail_saves = fail;
    }
}

impl PositionStore for MemoryPositionStore {
    async fn load_position(&mut self) -> Result<Option<f32>, PersistError> {
        Ok(self.lock().angle)
    }

    async fn save_position(&mut self, angle: f32) -> Result<(), PersistError> {
        let mut inner = self.lock();
        if inner.fail_saves {
            return Err(PersistError::Io(std::io::Error::other("save disabled")));
        }
        inner.angle = Some(angle);
        inner.saves += 1;
        Ok(())
    }
}
