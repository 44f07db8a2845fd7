// src/notify/mod.rs
//! Outbound delivery of the final analysis text.

pub mod discord;

use async_trait::async_trait;

use crate::error::DeliveryError;

pub use discord::{DiscordNotifier, DISCORD_MAX_CHARS};

pub const TRUNCATION_MARKER: &str = "\n…[truncated]";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, text: &str) -> Result<(), DeliveryError>;
    fn channel(&self) -> &'static str;
}

/// Cut `text` to at most `limit` chars, ending in `marker` when anything was dropped.
/// Counts chars, not bytes, so multi-byte text never splits mid-codepoint.
pub fn truncate_with_marker(text: &str, limit: usize, marker: &str) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let keep = limit.saturating_sub(marker.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(marker);
    out
}

/// Prints to stdout. Used when no webhook is configured and after a failed webhook delivery.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn deliver(&self, text: &str) -> Result<(), DeliveryError> {
        println!("\n===== Analysis Result =====\n{text}\n");
        Ok(())
    }

    fn channel(&self) -> &'static str {
        "console"
    }
}
