//! JSON file of previously connected devices.
//!
//! The file is a plain array:
//!
//! ```json
//! [
//!   { "device_name": "Living Room TV", "ip": "192.168.1.20",
//!     "last_connected": "2026-10-15T18:04:11Z", "favorite": true }
//! ]
//! ```
//!
//! There is at most one entry per address.  A missing or unreadable file is
//! treated as an empty history; the next write replaces it.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("I/O error accessing history at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize history: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub device_name: String,
    pub ip: String,
    pub last_connected: DateTime<Utc>,
    #[serde(default)]
    pub favorite: bool,
}

pub struct HistoryStore {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Favorites first, then most recently connected.
    pub fn get_history(&self) -> Vec<HistoryEntry> {
        let mut entries = self.read();
        entries.sort_by(|a, b| {
            b.favorite
                .cmp(&a.favorite)
                .then_with(|| b.last_connected.cmp(&a.last_connected))
        });
        entries
    }

    pub fn get_favorites(&self) -> Vec<HistoryEntry> {
        self.get_history().into_iter().filter(|e| e.favorite).collect()
    }

    /// Records a connection now.  See [`Self::update_history_at`].
    ///
    /// # Errors
    ///
    /// [`HistoryError`] if the file cannot be written.
    pub fn update_history(&self, device_name: &str, ip: &str, favorite: bool) -> Result<HistoryEntry, HistoryError> {
        self.update_history_at(device_name, ip, favorite, Utc::now())
    }

    /// Replaces any entry for `ip` with a new one at the head of the list.
    ///
    /// # Errors
    ///
    /// [`HistoryError`] if the file cannot be written.
    pub fn update_history_at(
        &self,
        device_name: &str,
        ip: &str,
        favorite: bool,
        at: DateTime<Utc>,
    ) -> Result<HistoryEntry, HistoryError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut entries = self.read();
        entries.retain(|e| e.ip != ip);

        let entry = HistoryEntry {
            device_name: device_name.to_string(),
            ip: ip.to_string(),
            last_connected: at,
            favorite,
        };
        entries.insert(0, entry.clone());
        self.write(&entries)?;
        debug!("history updated for {ip}");
        Ok(entry)
    }

    /// Sets the favorite flag in place.  Returns `false` if `ip` is unknown.
    ///
    /// # Errors
    ///
    /// [`HistoryError`] if the file cannot be written.
    pub fn set_favorite(&self, ip: &str, favorite: bool) -> Result<bool, HistoryError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut entries = self.read();
        let Some(entry) = entries.iter_mut().find(|e| e.ip == ip) else {
            return Ok(false);
        };
        entry.favorite = favorite;
        self.write(&entries)?;
        Ok(true)
    }

    fn read(&self) -> Vec<HistoryEntry> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("history at {} unreadable: {e}", self.path.display());
                return Vec::new();
            }
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("history at {} is corrupt, starting empty: {e}", self.path.display());
            Vec::new()
        })
    }

    fn write(&self, entries: &[HistoryEntry]) -> Result<(), HistoryError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| HistoryError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json).map_err(|source| HistoryError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
