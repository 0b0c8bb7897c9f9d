//! Append-only risk sample log — the audit trail, not a cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use vigil_core::error::{Result, VigilError};

/// Classification of one risk sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskStatus {
    Safe,
    Caution,
    Critical,
}

/// One observation. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSample {
    pub timestamp: DateTime<Utc>,
    pub score: u8,
    pub sessions: usize,
    pub status: RiskStatus,
}

/// JSONL-backed, append-only sample log.
pub struct RiskLog {
    path: PathBuf,
}

impl RiskLog {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Append one sample.
    pub fn append(&self, sample: &RiskSample) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(sample)
            .map_err(|e| VigilError::Store(format!("Risk log serialize: {e}")))?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Most recent sample, if the log has any.
    pub fn last(&self) -> Option<RiskSample> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        content
            .lines()
            .rev()
            .find_map(|line| serde_json::from_str(line).ok())
    }
}
