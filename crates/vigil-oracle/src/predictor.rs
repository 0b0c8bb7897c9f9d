//! Risk scoring and the oracle loop.
//!
//! Purely observational: every cycle appends a sample to the audit log;
//! CRITICAL additionally raises an alert. No remediation is triggered here.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use vigil_core::config::OracleConfig;
use vigil_core::error::Result;
use vigil_courier::Outbox;

use crate::risk_log::{RiskLog, RiskSample, RiskStatus};
use crate::session::SessionSource;

/// Bounded, monotone pressure score from the session count.
pub fn risk_score(sessions: usize, config: &OracleConfig) -> u8 {
    let mut risk: u32 = 0;
    if sessions > config.warn_threshold {
        risk += config.warn_increment as u32;
    }
    if sessions > config.warn_threshold * 2 {
        risk += config.critical_increment as u32;
    }
    risk.min(100) as u8
}

/// Score bands: ≥70 CRITICAL, ≥30 CAUTION, else SAFE.
pub fn classify(score: u8) -> RiskStatus {
    if score >= 70 {
        RiskStatus::Critical
    } else if score >= 30 {
        RiskStatus::Caution
    } else {
        RiskStatus::Safe
    }
}

/// The risk predictor loop.
pub struct Oracle {
    config: OracleConfig,
    source: Box<dyn SessionSource>,
    log: RiskLog,
    outbox: Option<Arc<Outbox>>,
    alert_chat: Option<String>,
}

impl Oracle {
    pub fn new(config: OracleConfig, source: Box<dyn SessionSource>) -> Self {
        let log = RiskLog::new(&vigil_core::expand_path(&config.risk_log));
        Self {
            config,
            source,
            log,
            outbox: None,
            alert_chat: None,
        }
    }

    /// Route CRITICAL alerts into the durable outbox.
    pub fn with_alerts(mut self, outbox: Arc<Outbox>, chat_id: String) -> Self {
        self.outbox = Some(outbox);
        self.alert_chat = Some(chat_id);
        self
    }

    /// Override the sample log location (tests).
    pub fn with_log(mut self, log: RiskLog) -> Self {
        self.log = log;
        self
    }

    /// One observation cycle: sample, score, append, alert on CRITICAL.
    pub async fn run_cycle(&self) -> Result<RiskSample> {
        let sessions = self.source.session_count().await;
        let score = risk_score(sessions, &self.config);
        let status = classify(score);

        let sample = RiskSample {
            timestamp: Utc::now(),
            score,
            sessions,
            status,
        };
        // the unconditional append is the audit trail
        self.log.append(&sample)?;

        if status == RiskStatus::Critical {
            tracing::error!(
                "🚨 ALERT: Risk score {score}! Sessions: {sessions}. Pruning recommended."
            );
            self.alert(score, sessions);
        }
        Ok(sample)
    }

    fn alert(&self, score: u8, sessions: usize) {
        if let (Some(outbox), Some(chat)) = (&self.outbox, &self.alert_chat) {
            let text = format!(
                "🚨 Risk CRITICAL\nScore: {score}/100\nActive sessions: {sessions}\nSession pruning recommended."
            );
            if let Err(e) = outbox.enqueue(chat, &text) {
                tracing::warn!("Failed to enqueue risk alert: {e}");
            }
        }
    }

    /// Run the oracle loop forever. An unexpected cycle error shortens the
    /// next sleep to the recovery interval; the loop itself never stops.
    pub async fn run(self) {
        tracing::info!(
            "Oracle watching (check every {}s)",
            self.config.check_interval_secs
        );

        loop {
            let sleep = match self.run_cycle().await {
                Ok(sample) => {
                    tracing::debug!(
                        "Risk sample: score {} ({:?}), {} sessions",
                        sample.score,
                        sample.status,
                        sample.sessions
                    );
                    Duration::from_secs(self.config.check_interval_secs)
                }
                Err(e) => {
                    tracing::error!("Oracle cycle error: {e}");
                    Duration::from_secs(self.config.recovery_sleep_secs)
                }
            };
            tokio::time::sleep(sleep).await;
        }
    }
}
