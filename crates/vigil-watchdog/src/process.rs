//! Host/process observation and control.
//!
//! The supervisor only talks to the [`ProcessController`] trait, so its policy
//! is testable against a fake; [`SystemController`] is the real
//! implementation over `sysinfo` and `systemctl --user`.

use std::path::Path;
use std::time::Duration;

/// Capability surface the supervisor needs from the host.
pub trait ProcessController: Send {
    /// Locate the supervised process by a substring of its command line.
    fn find_process(&mut self, needle: &str) -> Option<u32>;
    /// Resident memory of a process in MB. None when it vanished.
    fn process_memory_mb(&mut self, pid: u32) -> Option<f64>;
    /// Total system CPU load, sampled over a blocking ~1s window.
    fn cpu_load_percent(&mut self) -> f32;
    /// Available system RAM in MB.
    fn available_ram_mb(&mut self) -> f64;
    /// Kill watch-listed processes over the runtime ceiling that are still
    /// eating CPU. Returns the number killed.
    fn sweep_rogues(&mut self, names: &[String], max_runtime_secs: u64, cpu_floor: f32) -> usize;
    /// Restart the supervised service. Fire-and-forget.
    fn restart_service(&mut self, name: &str);
    /// Remove a stale lock marker if present.
    fn remove_lock(&mut self, path: &Path);
}

/// Watch-list predicate: a long-running utility still burning CPU is presumed
/// stuck. Age alone is not enough — an idle shell is left alone.
pub fn is_rogue(
    name: &str,
    runtime_secs: u64,
    cpu_percent: f32,
    watchlist: &[String],
    max_runtime_secs: u64,
    cpu_floor: f32,
) -> bool {
    watchlist.iter().any(|w| w == name) && runtime_secs > max_runtime_secs && cpu_percent > cpu_floor
}

/// Real controller backed by `sysinfo`.
pub struct SystemController {
    sys: sysinfo::System,
    /// Sampling window for CPU load.
    cpu_window: Duration,
}

impl SystemController {
    pub fn new() -> Self {
        Self {
            sys: sysinfo::System::new(),
            cpu_window: Duration::from_secs(1),
        }
    }
}

impl Default for SystemController {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessController for SystemController {
    fn find_process(&mut self, needle: &str) -> Option<u32> {
        self.sys.refresh_processes();
        let own_pid = sysinfo::get_current_pid().ok();
        for (pid, process) in self.sys.processes() {
            if Some(*pid) == own_pid {
                continue;
            }
            let cmdline = process.cmd().join(" ");
            if cmdline.contains(needle) {
                return Some(pid.as_u32());
            }
        }
        None
    }

    fn process_memory_mb(&mut self, pid: u32) -> Option<f64> {
        let pid = sysinfo::Pid::from_u32(pid);
        if !self.sys.refresh_process(pid) {
            return None;
        }
        self.sys
            .process(pid)
            .map(|p| p.memory() as f64 / (1024.0 * 1024.0))
    }

    fn cpu_load_percent(&mut self) -> f32 {
        // two refreshes bracket the sampling window
        self.sys.refresh_cpu_usage();
        std::thread::sleep(self.cpu_window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL));
        self.sys.refresh_cpu_usage();
        self.sys.global_cpu_info().cpu_usage()
    }

    fn available_ram_mb(&mut self) -> f64 {
        self.sys.refresh_memory();
        self.sys.available_memory() as f64 / (1024.0 * 1024.0)
    }

    fn sweep_rogues(&mut self, names: &[String], max_runtime_secs: u64, cpu_floor: f32) -> usize {
        // cpu_usage() needs a prior sample to be meaningful
        self.sys.refresh_processes();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        self.sys.refresh_processes();

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut killed = 0;
        for (pid, process) in self.sys.processes() {
            let runtime = now.saturating_sub(process.start_time());
            if is_rogue(
                process.name(),
                runtime,
                process.cpu_usage(),
                names,
                max_runtime_secs,
                cpu_floor,
            ) {
                tracing::warn!(
                    "Killing rogue process: {} (PID {pid}) runtime {runtime}s, cpu {:.0}%",
                    process.name(),
                    process.cpu_usage()
                );
                process.kill();
                killed += 1;
            }
        }
        killed
    }

    fn restart_service(&mut self, name: &str) {
        match std::process::Command::new("systemctl")
            .args(["--user", "restart", name])
            .status()
        {
            Ok(status) if status.success() => {}
            Ok(status) => tracing::error!("systemctl restart exited with {status}"),
            Err(e) => tracing::error!("Failed to invoke systemctl: {e}"),
        }
    }

    fn remove_lock(&mut self, path: &Path) {
        if path.exists()
            && let Err(e) = std::fs::remove_file(path)
        {
            tracing::warn!("Failed to remove lock marker {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watchlist() -> Vec<String> {
        ["grep", "find", "python3", "node"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_old_hot_watchlisted_process_is_rogue() {
        assert!(is_rogue("grep", 4000, 80.0, &watchlist(), 3600, 50.0));
    }

    #[test]
    fn test_old_idle_process_is_spared() {
        assert!(!is_rogue("grep", 4000, 10.0, &watchlist(), 3600, 50.0));
    }

    #[test]
    fn test_young_process_is_spared() {
        assert!(!is_rogue("python3", 120, 99.0, &watchlist(), 3600, 50.0));
    }

    #[test]
    fn test_unlisted_process_is_spared() {
        assert!(!is_rogue("postgres", 86400, 95.0, &watchlist(), 3600, 50.0));
    }
}
