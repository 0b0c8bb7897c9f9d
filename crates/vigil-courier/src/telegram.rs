//! Telegram Bot API sender — `sendMessage` with rate-limit awareness.

use async_trait::async_trait;
use serde::Deserialize;

/// Result of one chunk send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Server asked us to back off for this many seconds.
    RateLimited(u64),
    Failed(String),
}

/// Delivery channel seam — the courier cycle only knows this trait, so tests
/// run against a scripted fake instead of the network.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, chat_id: &str, text: &str) -> SendOutcome;
}

/// Real sender over the Telegram Bot API. Built fresh each cycle with the
/// current token so credential rotation needs no restart.
pub struct TelegramSender {
    client: reqwest::Client,
    token: String,
}

impl TelegramSender {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.token, method)
    }
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    #[serde(default)]
    parameters: RateLimitParams,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitParams {
    retry_after: Option<u64>,
}

#[async_trait]
impl MessageSender for TelegramSender {
    async fn send(&self, chat_id: &str, text: &str) -> SendOutcome {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });

        let response = match self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .timeout(std::time::Duration::from_secs(20))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return SendOutcome::Failed(format!("sendMessage failed: {e}")),
        };

        match response.status().as_u16() {
            200 => SendOutcome::Sent,
            429 => {
                let retry_after = response
                    .json::<RateLimitBody>()
                    .await
                    .ok()
                    .and_then(|b| b.parameters.retry_after)
                    .unwrap_or(5);
                SendOutcome::RateLimited(retry_after)
            }
            code => {
                let text = response.text().await.unwrap_or_default();
                SendOutcome::Failed(format!("HTTP {code}: {text}"))
            }
        }
    }
}
