//! The watchdog supervisor — one cycle every `check_interval`:
//! system resources, process presence, process memory, HTTP liveness, then a
//! rogue sweep. Restarts go through a single throttle gate so stacked
//! failure reasons never compound into a restart storm.

use std::sync::Arc;
use std::time::{Duration, Instant};

use vigil_core::config::WatchdogConfig;
use vigil_core::wal::WalLog;
use vigil_courier::Outbox;

use crate::process::ProcessController;

/// Throttle gate guarding the restart action. The single chokepoint: no two
/// restarts are ever permitted within `min_interval`, whatever triggered them.
pub struct RestartGate {
    last: Option<Instant>,
    min_interval: Duration,
}

impl RestartGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last: None,
            min_interval,
        }
    }

    /// Ask permission to restart at `now`. Granting records the timestamp;
    /// denial returns the seconds elapsed since the last restart.
    pub fn check(&mut self, now: Instant) -> Result<(), u64> {
        if let Some(last) = self.last {
            let elapsed = now.duration_since(last);
            if elapsed < self.min_interval {
                return Err(elapsed.as_secs());
            }
        }
        self.last = Some(now);
        Ok(())
    }
}

/// Result of one supervisory cycle.
#[derive(Debug, Default)]
pub struct CycleOutcome {
    /// A restart command was actually issued (not throttled).
    pub restarted: bool,
    /// Host itself is under pressure — caller backs off for 2× the interval.
    pub system_critical: bool,
    /// Why a restart was requested, when one was.
    pub reason: Option<String>,
}

/// Keeps the gateway process alive and within bounds.
pub struct Supervisor<C: ProcessController> {
    config: WatchdogConfig,
    controller: C,
    gate: RestartGate,
    http: reqwest::Client,
    wal: WalLog,
    /// Alerts are enqueued, not sent: delivery is the courier's problem.
    outbox: Option<Arc<Outbox>>,
    alert_chat: Option<String>,
}

impl<C: ProcessController> Supervisor<C> {
    pub fn new(config: WatchdogConfig, controller: C) -> Self {
        let gate = RestartGate::new(Duration::from_secs(config.restart_throttle_secs));
        let wal = WalLog::new(&vigil_core::expand_path(&config.wal_path));
        Self {
            config,
            controller,
            gate,
            http: reqwest::Client::new(),
            wal,
            outbox: None,
            alert_chat: None,
        }
    }

    /// Route restart alerts into the durable outbox.
    pub fn with_alerts(mut self, outbox: Arc<Outbox>, chat_id: String) -> Self {
        self.outbox = Some(outbox);
        self.alert_chat = Some(chat_id);
        self
    }

    /// One supervisory cycle. Never returns an error: every external failure
    /// degrades to a negative verdict and a log line.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();

        // 1. System level — on failure back off and skip the rest
        if let Some(reason) = self.check_system_resources() {
            outcome.system_critical = true;
            outcome.restarted = self.restart(&reason).await;
            outcome.reason = Some(reason);
            return outcome;
        }

        // 2. Gateway presence
        match self.controller.find_process(&self.config.process_needle) {
            None => {
                tracing::error!("Gateway process not found");
                outcome.restarted = self.restart("Process missing").await;
                outcome.reason = Some("Process missing".into());
            }
            Some(pid) => {
                // 3. Gateway memory — a vanished pid is a presence failure
                match self.controller.process_memory_mb(pid) {
                    None => {
                        tracing::error!("Gateway vanished during check");
                        outcome.restarted = self.restart("Process vanished").await;
                        outcome.reason = Some("Process vanished".into());
                    }
                    Some(mem) if mem > self.config.max_process_memory_mb => {
                        let reason = format!("Memory threshold exceeded: {mem:.2} MB");
                        outcome.restarted = self.restart(&reason).await;
                        outcome.reason = Some(reason);
                    }
                    Some(_) => {
                        // 4. HTTP liveness
                        if !self.check_http_health().await {
                            outcome.restarted = self.restart("API unresponsive").await;
                            outcome.reason = Some("API unresponsive".into());
                        }
                    }
                }
            }
        }

        // 5. Clean up background ghosts — every cycle, whatever happened above
        self.sweep();
        outcome
    }

    /// System-level verdict. Some(reason) when the host is critical.
    fn check_system_resources(&mut self) -> Option<String> {
        let cpu = self.controller.cpu_load_percent();
        if cpu > self.config.max_system_cpu_percent {
            tracing::error!("SYSTEM CPU CRITICAL: {cpu:.1}%");
            return Some(format!("System CPU overload: {cpu:.1}%"));
        }

        let ram = self.controller.available_ram_mb();
        if ram < self.config.min_free_ram_mb {
            tracing::error!("SYSTEM RAM CRITICAL: {ram:.0} MB free");
            return Some(format!("System out-of-memory risk: {ram:.0} MB free"));
        }
        None
    }

    /// Liveness probe with a bounded timeout. Any non-200 or network error is
    /// a failure.
    async fn check_http_health(&self) -> bool {
        match self
            .http
            .get(&self.config.health_url)
            .timeout(Duration::from_secs(self.config.health_timeout_secs))
            .send()
            .await
        {
            Ok(response) => response.status().as_u16() == 200,
            Err(e) => {
                tracing::warn!("HTTP health check failed: {e}");
                false
            }
        }
    }

    fn sweep(&mut self) {
        self.controller.sweep_rogues(
            &self.config.rogue_names,
            self.config.rogue_max_runtime_secs,
            self.config.rogue_cpu_floor,
        );
    }

    /// Throttled restart action. Returns true when a restart was issued.
    async fn restart(&mut self, reason: &str) -> bool {
        if let Err(elapsed) = self.gate.check(Instant::now()) {
            tracing::warn!(
                "RESTART THROTTLED ({elapsed}s < {}s): {reason}",
                self.config.restart_throttle_secs
            );
            return false;
        }

        tracing::error!("RESTARTING GATEWAY: {reason}");
        // clear contending processes before the service comes back
        self.sweep();
        self.controller.restart_service(&self.config.service_name);
        let lock = vigil_core::expand_path(&self.config.lock_file);
        self.controller.remove_lock(&lock);

        if let Err(e) = self
            .wal
            .append("gateway_restart", serde_json::json!({ "reason": reason }))
        {
            tracing::warn!("Failed to record restart in WAL: {e}");
        }
        self.alert(reason);
        true
    }

    fn alert(&self, reason: &str) {
        if let (Some(outbox), Some(chat)) = (&self.outbox, &self.alert_chat) {
            let text = format!("⚠️ Watchdog restarted the gateway\nReason: {reason}");
            if let Err(e) = outbox.enqueue(chat, &text) {
                tracing::warn!("Failed to enqueue restart alert: {e}");
            }
        }
    }

    /// Run the supervisory loop forever. Only an external signal ends it.
    pub async fn run(mut self) {
        tracing::info!(
            "Watchdog active (check every {}s, throttle {}s)",
            self.config.check_interval_secs,
            self.config.restart_throttle_secs
        );
        let interval = Duration::from_secs(self.config.check_interval_secs);

        loop {
            let outcome = self.run_cycle().await;
            // back off while the host itself is under pressure
            let sleep = if outcome.system_critical {
                interval * 2
            } else {
                interval
            };
            tokio::time::sleep(sleep).await;
        }
    }
}
