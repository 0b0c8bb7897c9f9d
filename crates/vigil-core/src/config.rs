//! Vigil configuration system.
//!
//! All intervals and thresholds carried by the three monitors live here so
//! nothing is a module-level constant. Defaults match the values the gateway
//! host has run with in production.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, VigilError};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VigilConfig {
    /// Telegram chat that receives restart and risk alerts. Empty = no alerts.
    #[serde(default)]
    pub alert_chat_id: String,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub courier: CourierConfig,
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            alert_chat_id: String::new(),
            watchdog: WatchdogConfig::default(),
            oracle: OracleConfig::default(),
            courier: CourierConfig::default(),
        }
    }
}

impl VigilConfig {
    /// Load config from the default path (~/.vigil/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VigilError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| VigilError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| VigilError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Vigil home directory (~/.vigil).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vigil")
    }

    /// Chat id for alerts, if one is configured.
    pub fn alert_chat(&self) -> Option<&str> {
        if self.alert_chat_id.is_empty() {
            None
        } else {
            Some(&self.alert_chat_id)
        }
    }
}

/// Watchdog (process health supervisor) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Seconds between supervisory cycles.
    #[serde(default = "default_watchdog_interval")]
    pub check_interval_secs: u64,
    /// systemd user unit restarted when the gateway is unhealthy.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Substring matched against process command lines to locate the gateway.
    #[serde(default = "default_process_needle")]
    pub process_needle: String,
    /// Health endpoint probed with a bounded GET.
    #[serde(default = "default_health_url")]
    pub health_url: String,
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,
    /// Resident-memory ceiling for the gateway process.
    #[serde(default = "default_max_process_memory")]
    pub max_process_memory_mb: f64,
    /// Total system CPU load that counts as critical.
    #[serde(default = "default_max_system_cpu")]
    pub max_system_cpu_percent: f32,
    /// Emergency free-RAM floor.
    #[serde(default = "default_min_free_ram")]
    pub min_free_ram_mb: f64,
    /// Minimum seconds between restart actions.
    #[serde(default = "default_restart_throttle")]
    pub restart_throttle_secs: u64,
    /// Executable names that should never run indefinitely in the background.
    #[serde(default = "default_rogue_names")]
    pub rogue_names: Vec<String>,
    /// Runtime ceiling for watch-listed processes.
    #[serde(default = "default_rogue_runtime")]
    pub rogue_max_runtime_secs: u64,
    /// CPU usage a watch-listed process must exceed to be reaped.
    #[serde(default = "default_rogue_cpu_floor")]
    pub rogue_cpu_floor: f32,
    /// Stale lock marker removed after a restart.
    #[serde(default = "default_lock_file")]
    pub lock_file: String,
    /// Append-only WAL that records restart actions.
    #[serde(default = "default_wal_path")]
    pub wal_path: String,
}

fn default_watchdog_interval() -> u64 {
    60
}
fn default_service_name() -> String {
    "gateway.service".into()
}
fn default_process_needle() -> String {
    "gateway".into()
}
fn default_health_url() -> String {
    "http://127.0.0.1:18789/status".into()
}
fn default_health_timeout() -> u64 {
    10
}
fn default_max_process_memory() -> f64 {
    1536.0
}
fn default_max_system_cpu() -> f32 {
    95.0
}
fn default_min_free_ram() -> f64 {
    100.0
}
fn default_restart_throttle() -> u64 {
    300
}
fn default_rogue_names() -> Vec<String> {
    ["grep", "find", "python3", "node"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_rogue_runtime() -> u64 {
    3600
}
fn default_rogue_cpu_floor() -> f32 {
    50.0
}
fn default_lock_file() -> String {
    "~/.vigil/gateway.lock".into()
}

fn default_wal_path() -> String {
    "~/.vigil/session_wal.jsonl".into()
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_watchdog_interval(),
            service_name: default_service_name(),
            process_needle: default_process_needle(),
            health_url: default_health_url(),
            health_timeout_secs: default_health_timeout(),
            max_process_memory_mb: default_max_process_memory(),
            max_system_cpu_percent: default_max_system_cpu(),
            min_free_ram_mb: default_min_free_ram(),
            restart_throttle_secs: default_restart_throttle(),
            rogue_names: default_rogue_names(),
            rogue_max_runtime_secs: default_rogue_runtime(),
            rogue_cpu_floor: default_rogue_cpu_floor(),
            lock_file: default_lock_file(),
            wal_path: default_wal_path(),
        }
    }
}

/// Oracle (risk predictor) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_oracle_interval")]
    pub check_interval_secs: u64,
    /// Shorter sleep after an unexpected mid-cycle error.
    #[serde(default = "default_recovery_sleep")]
    pub recovery_sleep_secs: u64,
    /// Command whose non-empty output lines are counted as active sessions.
    #[serde(default = "default_session_cmd")]
    pub session_cmd: Vec<String>,
    /// Session count above which pressure starts accruing.
    #[serde(default = "default_warn_threshold")]
    pub warn_threshold: usize,
    #[serde(default = "default_warn_increment")]
    pub warn_increment: u8,
    /// Added on top when the count exceeds twice the warn threshold.
    #[serde(default = "default_critical_increment")]
    pub critical_increment: u8,
    /// Append-only risk sample log.
    #[serde(default = "default_risk_log")]
    pub risk_log: String,
}

fn default_oracle_interval() -> u64 {
    300
}
fn default_recovery_sleep() -> u64 {
    60
}
fn default_session_cmd() -> Vec<String> {
    vec!["openclaw".into(), "sessions".into(), "list".into()]
}
fn default_warn_threshold() -> usize {
    100
}
fn default_warn_increment() -> u8 {
    30
}
fn default_critical_increment() -> u8 {
    40
}
fn default_risk_log() -> String {
    "~/.vigil/risk_log.jsonl".into()
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_oracle_interval(),
            recovery_sleep_secs: default_recovery_sleep(),
            session_cmd: default_session_cmd(),
            warn_threshold: default_warn_threshold(),
            warn_increment: default_warn_increment(),
            critical_increment: default_critical_increment(),
            risk_log: default_risk_log(),
        }
    }
}

/// Courier (durable delivery queue) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierConfig {
    #[serde(default = "default_courier_interval")]
    pub check_interval_secs: u64,
    /// Delivery attempts before a message is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Chunk size — Telegram's hard limit is 4096, keep a safety margin.
    #[serde(default = "default_max_chunk_len")]
    pub max_chunk_len: usize,
    /// Anti-flood delay between chunk sends.
    #[serde(default = "default_inter_chunk_delay")]
    pub inter_chunk_delay_ms: u64,
    /// Gateway config re-read every cycle for the freshest bot token.
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,
    /// Fallback bot token when the gateway config has none.
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_outbox_db")]
    pub db_path: String,
}

fn default_courier_interval() -> u64 {
    5
}
fn default_max_attempts() -> u32 {
    10
}
fn default_max_chunk_len() -> usize {
    4000
}
fn default_inter_chunk_delay() -> u64 {
    500
}
fn default_credentials_path() -> String {
    "~/.openclaw/openclaw.json".into()
}
fn default_outbox_db() -> String {
    "~/.vigil/outbox.db".into()
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_courier_interval(),
            max_attempts: default_max_attempts(),
            max_chunk_len: default_max_chunk_len(),
            inter_chunk_delay_ms: default_inter_chunk_delay(),
            credentials_path: default_credentials_path(),
            bot_token: String::new(),
            db_path: default_outbox_db(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VigilConfig::default();
        assert_eq!(config.watchdog.check_interval_secs, 60);
        assert_eq!(config.watchdog.restart_throttle_secs, 300);
        assert_eq!(config.watchdog.wal_path, "~/.vigil/session_wal.jsonl");
        assert_eq!(config.oracle.warn_threshold, 100);
        assert_eq!(config.courier.max_attempts, 10);
        assert_eq!(config.courier.max_chunk_len, 4000);
        assert!(config.alert_chat().is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: VigilConfig = toml::from_str(
            r#"
            alert_chat_id = "42"

            [watchdog]
            max_process_memory_mb = 2048.0
            "#,
        )
        .unwrap();
        assert_eq!(config.alert_chat(), Some("42"));
        assert_eq!(config.watchdog.max_process_memory_mb, 2048.0);
        // untouched sections keep their defaults
        assert_eq!(config.watchdog.check_interval_secs, 60);
        assert_eq!(config.courier.check_interval_secs, 5);
    }
}
