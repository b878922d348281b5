//! Publication state: which content items have already been posted.

use anyhow::Context;
use chrono::Utc;
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::APP_DIR;
use crate::error::{AutoPostError, Result};

const STATE_VERSION: &str = "1.0";

/// Per-item state. `auto_publish: Some(false)` is the manual override that
/// keeps the automatic trigger from posting the item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub posted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_publish: Option<bool>,
}

impl PublicationRecord {
    /// Items without an explicit override may be posted automatically.
    pub fn auto_publish_allowed(&self) -> bool {
        self.auto_publish.unwrap_or(true)
    }
}

/// Exclusive hold on one item across processes, released on drop.
pub struct ItemLock {
    _file: Option<File>,
}

impl ItemLock {
    /// Holds nothing. Enough for stores only reachable from one process.
    pub fn none() -> Self {
        Self { _file: None }
    }
}

/// Storage for [`PublicationRecord`]s, owned by the host.
///
/// Implementors provide `load` and `save`. Stores shared between processes
/// also override `update` and `lock_item` so that a check-then-post sequence
/// and every read-modify-write stay exclusive.
pub trait StateStore: Send + Sync {
    /// The record for `id`, or the default record if none was saved.
    fn load(&self, id: &str) -> Result<PublicationRecord>;

    fn save(&self, id: &str, record: &PublicationRecord) -> Result<()>;

    /// Applies `change` to the record for `id` as one read-modify-write.
    fn update(&self, id: &str, change: &mut dyn FnMut(&mut PublicationRecord)) -> Result<()> {
        let mut record = self.load(id)?;
        change(&mut record);
        self.save(id, &record)
    }

    /// Blocks until no other holder is publishing `id`.
    fn lock_item(&self, _id: &str) -> Result<ItemLock> {
        Ok(ItemLock::none())
    }

    fn is_posted(&self, id: &str) -> Result<bool> {
        Ok(self.load(id)?.posted)
    }

    fn mark_posted(&self, id: &str, uri: &str) -> Result<()> {
        let posted_at = Utc::now().to_rfc3339();
        self.update(id, &mut |record: &mut PublicationRecord| {
            record.posted = true;
            record.post_uri = Some(uri.to_string());
            record.posted_at = Some(posted_at.clone());
        })
    }

    fn clear_posted(&self, id: &str) -> Result<()> {
        self.update(id, &mut |record: &mut PublicationRecord| record.posted = false)
    }

    fn set_auto_publish(&self, id: &str, allowed: bool) -> Result<()> {
        self.update(id, &mut |record: &mut PublicationRecord| {
            record.auto_publish = Some(allowed)
        })
    }
}

#[derive(Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<String, PublicationRecord>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, id: &str) -> Result<PublicationRecord> {
        let records = self.records.lock().map_err(AutoPostError::state)?;
        Ok(records.get(id).cloned().unwrap_or_default())
    }

    fn save(&self, id: &str, record: &PublicationRecord) -> Result<()> {
        let mut records = self.records.lock().map_err(AutoPostError::state)?;
        records.insert(id.to_string(), record.clone());
        Ok(())
    }

    fn update(&self, id: &str, change: &mut dyn FnMut(&mut PublicationRecord)) -> Result<()> {
        let mut records = self.records.lock().map_err(AutoPostError::state)?;
        change(records.entry(id.to_string()).or_default());
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    version: String,
    #[serde(default)]
    records: HashMap<String, PublicationRecord>,
}

/// JSON document on disk holding every record.
///
/// Writers take an advisory lock on `<file>.lock` around each
/// read-modify-write, and [`lock_item`](StateStore::lock_item) locks
/// `<stem>.locks/<id>.lock`, so separate processes sharing one path
/// coordinate through the OS.
pub struct JsonFileStateStore {
    path: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<local data dir>/bsky-autopost/state.json`.
    pub fn open_default() -> anyhow::Result<Self> {
        Ok(Self::new(default_state_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> anyhow::Result<StateFile> {
        if !self.path.exists() {
            return Ok(StateFile {
                version: STATE_VERSION.to_string(),
                records: HashMap::new(),
            });
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file: {}", self.path.display()))?;

        let state: StateFile = serde_json::from_str(&content).with_context(|| {
            format!(
                "Failed to parse state JSON from {}. The file may be corrupted.",
                self.path.display()
            )
        })?;

        if state.version != STATE_VERSION {
            anyhow::bail!(
                "Unsupported state file version: {}. Expected {}.",
                state.version,
                STATE_VERSION
            );
        }

        Ok(state)
    }

    fn write(&self, state: &StateFile) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create state directory")?;
        }

        let json = serde_json::to_string_pretty(state).context("Failed to serialize state")?;

        // Replace atomically.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).context("Failed to write state file")?;
        fs::rename(&tmp, &self.path).context("Failed to replace state file")?;

        Ok(())
    }

    fn item_lock_path(&self, id: &str) -> PathBuf {
        let name: String = id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.path.with_extension("locks").join(format!("{}.lock", name))
    }
}

impl StateStore for JsonFileStateStore {
    fn load(&self, id: &str) -> Result<PublicationRecord> {
        let state = self.read().map_err(state_error)?;
        Ok(state.records.get(id).cloned().unwrap_or_default())
    }

    fn save(&self, id: &str, record: &PublicationRecord) -> Result<()> {
        self.update(id, &mut |stored: &mut PublicationRecord| *stored = record.clone())
    }

    fn update(&self, id: &str, change: &mut dyn FnMut(&mut PublicationRecord)) -> Result<()> {
        let _lock = lock_exclusive(&self.path.with_extension("json.lock")).map_err(state_error)?;

        let mut state = self.read().map_err(state_error)?;
        change(state.records.entry(id.to_string()).or_default());
        self.write(&state).map_err(state_error)
    }

    fn lock_item(&self, id: &str) -> Result<ItemLock> {
        let file = lock_exclusive(&self.item_lock_path(id)).map_err(state_error)?;
        Ok(ItemLock { _file: Some(file) })
    }
}

/// Opens (creating if needed) `path` and blocks until it is exclusively locked.
fn lock_exclusive(path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create lock directory")?;
    }

    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open lock file: {}", path.display()))?;
    file.lock_exclusive()
        .with_context(|| format!("Failed to lock {}", path.display()))?;

    Ok(file)
}

fn state_error(err: anyhow::Error) -> AutoPostError {
    AutoPostError::State(format!("{:#}", err))
}

pub fn default_state_path() -> anyhow::Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .context("Could not determine local data directory")?
        .join(APP_DIR);

    Ok(data_dir.join("state.json"))
}
