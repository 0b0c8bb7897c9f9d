//! Session-count source — the oracle's single input signal.

use async_trait::async_trait;

/// Where the active-session count comes from. Any failure yields 0; the
/// signal is advisory and must never take the loop down.
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn session_count(&self) -> usize;
}

/// Counts non-empty output lines of a configured listing command
/// (e.g. `openclaw sessions list` — one line per session record).
pub struct CommandSessionSource {
    cmd: Vec<String>,
}

impl CommandSessionSource {
    pub fn new(cmd: Vec<String>) -> Self {
        Self { cmd }
    }
}

#[async_trait]
impl SessionSource for CommandSessionSource {
    async fn session_count(&self) -> usize {
        let Some((program, args)) = self.cmd.split_first() else {
            return 0;
        };
        match tokio::process::Command::new(program)
            .args(args)
            .output()
            .await
        {
            Ok(output) => String::from_utf8_lossy(&output.stdout)
                .lines()
                .filter(|l| !l.trim().is_empty())
                .count(),
            Err(e) => {
                tracing::warn!("Session listing failed: {e}");
                0
            }
        }
    }
}
