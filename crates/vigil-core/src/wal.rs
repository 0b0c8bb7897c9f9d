//! Append-only session WAL — survives crashes, never overwritten.
//!
//! One JSON object per line. The watchdog records restart actions here and
//! other agents append arbitrary state transitions via `vigil wal`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// One WAL entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEvent {
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub payload: serde_json::Value,
}

/// Append-only event log backed by a JSONL file.
pub struct WalLog {
    path: PathBuf,
}

impl WalLog {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Append one event. The write is flushed before returning.
    pub fn append(&self, event: &str, payload: serde_json::Value) -> Result<()> {
        let entry = WalEvent {
            timestamp: Utc::now(),
            event: event.to_string(),
            payload,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(&entry)
            .map_err(|e| crate::error::VigilError::Store(format!("WAL serialize: {e}")))?;
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }
}
