//! Courier — the delivery loop draining the outbox.
//!
//! At-least-once semantics: a message deferred mid-way resends from its first
//! chunk next cycle (no chunk-level progress is persisted), so receivers may
//! see duplicates of already-delivered chunks after a partial failure.

use std::sync::Arc;
use std::time::Duration;

use vigil_core::config::CourierConfig;
use vigil_core::error::Result;

use crate::chunk::split_message;
use crate::outbox::{MessageStatus, Outbox, OutboxMessage};
use crate::telegram::{MessageSender, SendOutcome, TelegramSender};

/// The delivery queue processor.
pub struct Courier {
    config: CourierConfig,
    outbox: Arc<Outbox>,
}

impl Courier {
    pub fn new(config: CourierConfig, outbox: Arc<Outbox>) -> Self {
        Self { config, outbox }
    }

    /// Freshest bot token: gateway config first, own config as fallback.
    /// Read every cycle so rotation takes effect without a restart.
    fn resolve_token(&self) -> Option<String> {
        let path = vigil_core::expand_path(&self.config.credentials_path);
        if let Ok(raw) = std::fs::read_to_string(&path)
            && let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw)
        {
            for key in ["bot_token", "botToken"] {
                if let Some(token) = value
                    .pointer(&format!("/channels/telegram/{key}"))
                    .and_then(|t| t.as_str())
                    && !token.is_empty()
                {
                    return Some(token.to_string());
                }
            }
        }
        if self.config.bot_token.is_empty() {
            None
        } else {
            Some(self.config.bot_token.clone())
        }
    }

    /// One processing cycle over all eligible messages, FIFO by enqueue time.
    /// Only a rate limit defers the rest of the cycle; a plain send failure
    /// defers that message alone and later messages still get their turn.
    pub async fn process_cycle(&self, sender: &dyn MessageSender) -> Result<()> {
        let messages = self.outbox.pending(self.config.max_attempts)?;

        for message in messages {
            let halt = self.deliver(&message, sender).await?;
            if halt {
                break;
            }
        }
        Ok(())
    }

    /// Deliver one message chunk by chunk. Returns true when the whole cycle
    /// should halt (the server asked us to back off).
    async fn deliver(&self, message: &OutboxMessage, sender: &dyn MessageSender) -> Result<bool> {
        let chunks = split_message(&message.text, self.config.max_chunk_len);
        let mut all_sent = true;
        let mut halt_cycle = false;

        for (i, chunk) in chunks.iter().enumerate() {
            match sender.send(&message.chat_id, chunk).await {
                SendOutcome::Sent => {}
                SendOutcome::RateLimited(retry_after) => {
                    tracing::warn!("Rate limited, backing off {retry_after}s");
                    tokio::time::sleep(Duration::from_secs(retry_after)).await;
                    all_sent = false;
                    halt_cycle = true;
                    break;
                }
                SendOutcome::Failed(reason) => {
                    // scoped to this message: remaining chunks wait for the
                    // next cycle, later messages are still attempted
                    tracing::warn!(
                        "Failed to send chunk {i} of message {}: {reason}",
                        message.id
                    );
                    all_sent = false;
                    break;
                }
            }
            // anti-flood delay between chunks
            tokio::time::sleep(Duration::from_millis(self.config.inter_chunk_delay_ms)).await;
        }

        if all_sent {
            self.outbox.delete(message.id)?;
            tracing::info!("Message {} (full) sent successfully", message.id);
        } else {
            let status = self
                .outbox
                .record_attempt(message.id, self.config.max_attempts)?;
            if status == MessageStatus::Failed {
                tracing::error!(
                    "Message {} dead-lettered after {} attempts",
                    message.id,
                    self.config.max_attempts
                );
            }
        }
        Ok(halt_cycle)
    }

    /// Run the courier loop forever. Skips the cycle entirely (no store
    /// mutation) while no bot token is available.
    pub async fn run(self) {
        tracing::info!(
            "Courier started (check every {}s, {} attempt budget)",
            self.config.check_interval_secs,
            self.config.max_attempts
        );
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.check_interval_secs));

        loop {
            interval.tick().await;

            let Some(token) = self.resolve_token() else {
                tracing::debug!("No bot token available, skipping cycle");
                continue;
            };

            let sender = TelegramSender::new(token);
            if let Err(e) = self.process_cycle(&sender).await {
                tracing::error!("Courier cycle error: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted sender: pops outcomes from a queue, records every send.
    struct FakeSender {
        script: Mutex<Vec<SendOutcome>>,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl FakeSender {
        fn new(script: Vec<SendOutcome>) -> Self {
            Self {
                script: Mutex::new(script),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn always_ok() -> Self {
            Self::new(Vec::new())
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageSender for FakeSender {
        async fn send(&self, chat_id: &str, text: &str) -> SendOutcome {
            self.sent
                .lock()
                .unwrap()
                .push((chat_id.to_string(), text.to_string()));
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                SendOutcome::Sent
            } else {
                script.remove(0)
            }
        }
    }

    fn courier() -> (Courier, Arc<Outbox>) {
        let outbox = Arc::new(Outbox::open_in_memory().unwrap());
        let config = CourierConfig {
            inter_chunk_delay_ms: 0,
            max_attempts: 3,
            ..CourierConfig::default()
        };
        (Courier::new(config, outbox.clone()), outbox)
    }

    #[tokio::test]
    async fn test_oversized_message_chunked_and_delivered() {
        let (courier, outbox) = courier();
        outbox.enqueue("42", &"A".repeat(5000)).unwrap();

        let sender = FakeSender::always_ok();
        courier.process_cycle(&sender).await.unwrap();

        let sent = sender.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1.len(), 4000);
        assert_eq!(sent[1].1.len(), 1000);
        // full delivery removes the row
        assert!(outbox.pending(10).unwrap().is_empty());
        assert_eq!(outbox.counts().unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn test_failed_message_does_not_block_later_messages() {
        let (courier, outbox) = courier();
        outbox.enqueue("42", "poisoned").unwrap();
        outbox.enqueue("42", "healthy").unwrap();

        // first send fails permanently (e.g. bad chat id), second succeeds
        let sender = FakeSender::new(vec![SendOutcome::Failed("HTTP 400".into())]);
        courier.process_cycle(&sender).await.unwrap();

        // both messages were attempted this cycle
        assert_eq!(sender.sent().len(), 2);
        // the healthy one is delivered and gone; the poisoned one accrues
        // an attempt and stays pending
        let pending = outbox.pending(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].text, "poisoned");
        assert_eq!(pending[0].attempts, 1);
        assert!(pending[0].last_attempt.is_some());
    }

    #[tokio::test]
    async fn test_rate_limit_halts_whole_cycle() {
        let (courier, outbox) = courier();
        outbox.enqueue("42", "first").unwrap();
        outbox.enqueue("42", "second").unwrap();

        let sender = FakeSender::new(vec![SendOutcome::RateLimited(0)]);
        courier.process_cycle(&sender).await.unwrap();

        // a 429 suspends the cycle: the second message is never attempted
        assert_eq!(sender.sent().len(), 1);
        let pending = outbox.pending(10).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[1].attempts, 0);
    }

    #[tokio::test]
    async fn test_dead_letter_after_budget() {
        let (courier, outbox) = courier();
        outbox.enqueue("42", "doomed").unwrap();

        for _ in 0..3 {
            let sender = FakeSender::new(vec![SendOutcome::Failed("down".into())]);
            courier.process_cycle(&sender).await.unwrap();
        }

        assert_eq!(outbox.counts().unwrap(), (0, 1));

        // a further cycle never touches the dead-lettered row
        let sender = FakeSender::always_ok();
        courier.process_cycle(&sender).await.unwrap();
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_fifo_order_within_cycle() {
        let (courier, outbox) = courier();
        outbox.enqueue("1", "alpha").unwrap();
        outbox.enqueue("2", "beta").unwrap();
        outbox.enqueue("3", "gamma").unwrap();

        let sender = FakeSender::always_ok();
        courier.process_cycle(&sender).await.unwrap();

        let texts: Vec<String> = sender.sent().into_iter().map(|(_, t)| t).collect();
        assert_eq!(texts, vec!["alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn test_partial_chunk_failure_resends_from_zero() {
        let (courier, outbox) = courier();
        // two chunks; first send succeeds, second fails
        outbox.enqueue("42", &"A".repeat(5000)).unwrap();

        let sender = FakeSender::new(vec![
            SendOutcome::Sent,
            SendOutcome::Failed("flaky".into()),
        ]);
        courier.process_cycle(&sender).await.unwrap();
        assert_eq!(outbox.pending(10).unwrap()[0].attempts, 1);

        // next cycle starts over from chunk zero — no partial-resume state
        let sender = FakeSender::always_ok();
        courier.process_cycle(&sender).await.unwrap();
        assert_eq!(sender.sent().len(), 2);
        assert_eq!(sender.sent()[0].1.len(), 4000);
        assert!(outbox.pending(10).unwrap().is_empty());
    }

    #[test]
    fn test_token_fallback_from_config() {
        let outbox = Arc::new(Outbox::open_in_memory().unwrap());
        let config = CourierConfig {
            credentials_path: "/nonexistent/creds.json".into(),
            bot_token: "123:abc".into(),
            ..CourierConfig::default()
        };
        let courier = Courier::new(config, outbox.clone());
        assert_eq!(courier.resolve_token().as_deref(), Some("123:abc"));

        let no_token = Courier::new(
            CourierConfig {
                credentials_path: "/nonexistent/creds.json".into(),
                ..CourierConfig::default()
            },
            outbox,
        );
        assert!(no_token.resolve_token().is_none());
    }

    #[test]
    fn test_token_from_gateway_config() {
        let dir = std::env::temp_dir().join("vigil-courier-token-test");
        std::fs::create_dir_all(&dir).ok();
        let creds = dir.join("openclaw.json");
        std::fs::write(
            &creds,
            r#"{"channels": {"telegram": {"botToken": "999:rotated"}}}"#,
        )
        .unwrap();

        let courier = Courier::new(
            CourierConfig {
                credentials_path: creds.to_string_lossy().into_owned(),
                bot_token: "123:stale".into(),
                ..CourierConfig::default()
            },
            Arc::new(Outbox::open_in_memory().unwrap()),
        );
        assert_eq!(courier.resolve_token().as_deref(), Some("999:rotated"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
