use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;
use serde::Serialize;

use super::{truncate_with_marker, Notifier, TRUNCATION_MARKER};
use crate::error::DeliveryError;

/// Discord rejects message content longer than this.
pub const DISCORD_MAX_CHARS: usize = 2000;

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    fn backoff(attempt: u8) -> Duration {
        Duration::from_millis(500u64 << (attempt - 1))
    }
}

#[derive(Serialize)]
struct DiscordWebhookPayload<'a> {
    content: &'a str,
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn deliver(&self, text: &str) -> Result<(), DeliveryError> {
        let original_chars = text.chars().count();
        let content = truncate_with_marker(text, DISCORD_MAX_CHARS, TRUNCATION_MARKER);
        if original_chars > DISCORD_MAX_CHARS {
            tracing::warn!(
                original_chars,
                limit = DISCORD_MAX_CHARS,
                "message exceeds Discord limit, truncated"
            );
            counter!("notify_truncated_total").increment(1);
        }
        let payload = DiscordWebhookPayload { content: &content };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => {
                        counter!("notify_delivered_total", "channel" => "discord").increment(1);
                        tracing::info!(attempt, chars = content.chars().count(), "message sent to Discord");
                        return Ok(());
                    }
                    Err(_) => DeliveryError::Status(rsp.status().as_u16()),
                },
                // Webhook urls embed a token; keep it out of logs.
                Err(e) => DeliveryError::Request(e.without_url().to_string()),
            };

            if attempt < self.max_retries {
                tracing::debug!(attempt, error = %err, "Discord delivery failed, retrying");
                tokio::time::sleep(Self::backoff(attempt)).await;
                continue;
            }
            counter!("notify_failures_total", "channel" => "discord").increment(1);
            return Err(err);
        }
    }

    fn channel(&self) -> &'static str {
        "discord"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        assert_eq!(DiscordNotifier::backoff(1), Duration::from_millis(500));
        assert_eq!(DiscordNotifier::backoff(3), Duration::from_millis(2000));
    }
}
