//! Customizable alarm persistence
//!
//! Only customizable alarms are stored, keyed by web id. The dedup cache
//! and actions never reach storage; actions are re-bound by type label
//! when the store loads.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::PersistenceError;
use crate::types::{Alarm, DayMask};

/// Version tag written into every document
pub const DOCUMENT_VERSION: &str = "1.0";

/// Persisted form of one customizable alarm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRecord {
    /// Web id, must be > 0
    #[serde(default = "missing_id")]
    pub id: i32,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Legacy single-day code: 0 = every day, 1..=7 = Sunday..Saturday
    #[serde(default)]
    pub day: u8,

    /// Full weekday mask; wins over `day` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_mask: Option<u8>,

    #[serde(default)]
    pub hour: u8,

    #[serde(default)]
    pub minute: u8,

    /// Type label, used to re-bind the action on load
    #[serde(default = "default_action")]
    pub action: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub parameter: u16,
}

fn missing_id() -> i32 {
    -1
}

fn default_action() -> String {
    crate::types::SYSTEM_LABEL.to_string()
}

fn default_enabled() -> bool {
    true
}

impl AlarmRecord {
    pub fn from_alarm<C>(alarm: &Alarm<C>) -> Self {
        Self {
            id: alarm.web_id(),
            name: alarm.meta().name.clone(),
            description: alarm.meta().description.clone(),
            day: alarm.day_mask().legacy_day(),
            day_mask: Some(alarm.day_mask().bits()),
            hour: alarm.hour().raw(),
            minute: alarm.minute().raw(),
            action: alarm.meta().type_label.clone(),
            enabled: alarm.enabled(),
            parameter: alarm.parameter(),
        }
    }

    /// Effective weekday mask, `None` for an unknown legacy day code
    pub fn resolved_day_mask(&self) -> Option<DayMask> {
        match self.day_mask {
            Some(bits) => Some(DayMask::from_bits(bits).normalized()),
            None => DayMask::from_legacy_day(self.day),
        }
    }

    /// Check a loaded record; the error names the first failed rule
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("empty name".to_string());
        }
        if self.hour > 23 {
            return Err(format!("hour {} out of range", self.hour));
        }
        if self.minute > 59 {
            return Err(format!("minute {} out of range", self.minute));
        }
        if self.id <= 0 {
            return Err(format!("web id {} not positive", self.id));
        }
        if self.resolved_day_mask().is_none() {
            return Err(format!("day {} out of range", self.day));
        }
        Ok(())
    }
}

/// On-disk document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmDocument {
    pub version: String,
    /// Milliseconds since the Unix epoch at save time
    pub timestamp: i64,
    pub total: usize,
    pub alarms: Vec<AlarmRecord>,
}

impl AlarmDocument {
    pub fn new(alarms: Vec<AlarmRecord>) -> Self {
        Self {
            version: DOCUMENT_VERSION.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            total: alarms.len(),
            alarms,
        }
    }
}

/// Loose view used on load so one malformed entry cannot sink the rest
#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    alarms: Vec<Value>,
}

/// Decode a document, dropping entries that do not fit [`AlarmRecord`]
pub fn decode_document(content: &str) -> Result<Vec<AlarmRecord>, PersistenceError> {
    let raw: RawDocument = serde_json::from_str(content)?;
    let mut records = Vec::with_capacity(raw.alarms.len());
    for (pos, value) in raw.alarms.into_iter().enumerate() {
        match serde_json::from_value::<AlarmRecord>(value) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping malformed alarm record #{}: {}", pos, e),
        }
    }
    Ok(records)
}

/// Storage collaborator for customizable alarms
pub trait AlarmPersistence: Send {
    /// Replace the stored set with `alarms`
    fn save(&self, alarms: &[AlarmRecord]) -> Result<(), PersistenceError>;

    /// Read the stored set; a missing store yields an empty list
    fn load(&self) -> Result<Vec<AlarmRecord>, PersistenceError>;
}

// ============================================================================
// JSON file
// ============================================================================

/// JSON document on the local file system
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl AlarmPersistence for JsonFilePersistence {
    fn save(&self, alarms: &[AlarmRecord]) -> Result<(), PersistenceError> {
        let document = AlarmDocument::new(alarms.to_vec());
        let content = serde_json::to_string_pretty(&document)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write to a .tmp sibling, then rename over the target
        let tmp = self.temp_path();
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;

        debug!("Saved {} alarms to {}", alarms.len(), self.path.display());
        Ok(())
    }

    fn load(&self) -> Result<Vec<AlarmRecord>, PersistenceError> {
        if !self.path.exists() {
            debug!("No alarm file at {}", self.path.display());
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        decode_document(&content)
    }
}

// ============================================================================
// In-memory and no-op
// ============================================================================

/// Shared in-memory store; clones see the same records
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    records: Arc<Mutex<Vec<AlarmRecord>>>,
    saves: Arc<AtomicUsize>,
    fail_saves: Arc<AtomicBool>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<AlarmRecord>) -> Self {
        let persistence = Self::default();
        *persistence.lock() = records;
        persistence
    }

    pub fn records(&self) -> Vec<AlarmRecord> {
        self.lock().clone()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every following save fail with an I/O error
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AlarmRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AlarmPersistence for MemoryPersistence {
    fn save(&self, alarms: &[AlarmRecord]) -> Result<(), PersistenceError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PersistenceError::Io(std::io::Error::other(
                "simulated storage failure",
            )));
        }
        *self.lock() = alarms.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self) -> Result<Vec<AlarmRecord>, PersistenceError> {
        Ok(self.records())
    }
}

/// Discards saves and loads nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPersistence;

impl AlarmPersistence for NullPersistence {
    fn save(&self, _alarms: &[AlarmRecord]) -> Result<(), PersistenceError> {
        Ok(())
    }

    fn load(&self) -> Result<Vec<AlarmRecord>, PersistenceError> {
        Ok(Vec::new())
    }
}
