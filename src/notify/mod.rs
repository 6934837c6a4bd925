//! Notification transport.
//!
//! Delivers the finalized alert list to a Discord webhook. The engine
//! has already decided everything; this module only renders and posts.
//! Delivery failure is the caller's to log — it never blocks the
//! snapshot commit.

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{debug, info};

use crate::types::{format_gold, SnipeAlert};

/// Discord caps message content at 2000 characters; chunk below that
/// to leave headroom for the header line.
const MAX_CONTENT_CHARS: usize = 1_900;

const HEADER: &str = "**Cheap Auction Alert!**";

/// Discord webhook notifier.
pub struct DiscordNotifier {
    http: Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("SNIPEWATCH/0.1.0 (auction-snipe-agent)")
            .build()
            .context("Failed to build HTTP client for Discord webhook")?;

        Ok(Self { http, webhook_url })
    }

    /// Deliver alerts, chunked under the content limit.
    /// Returns the number of messages posted.
    pub async fn send(&self, alerts: &[SnipeAlert]) -> Result<usize> {
        if alerts.is_empty() {
            return Ok(0);
        }

        let messages = render_messages(alerts);
        for content in &messages {
            let payload = serde_json::json!({ "content": content });
            let resp = self
                .http
                .post(&self.webhook_url)
                .json(&payload)
                .send()
                .await
                .context("Discord webhook request failed")?;

            // Discord replies 204 No Content on success.
            if resp.status().as_u16() != 204 && !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("Discord webhook error {status}: {body}");
            }
            debug!(chars = content.len(), "Webhook message delivered");
        }

        info!(alerts = alerts.len(), messages = messages.len(), "Alerts dispatched");
        Ok(messages.len())
    }
}

/// Render one line per alert and pack lines into messages under the
/// content limit, each message prefixed with the header.
fn render_messages(alerts: &[SnipeAlert]) -> Vec<String> {
    let mut messages = Vec::new();
    let mut current = String::from(HEADER);

    for alert in alerts {
        let line = format!("\n- {}", render_line(alert));
        if current.len() + line.len() > MAX_CONTENT_CHARS && current.len() > HEADER.len() {
            messages.push(std::mem::replace(&mut current, String::from(HEADER)));
        }
        current.push_str(&line);
    }

    if current.len() > HEADER.len() {
        messages.push(current);
    }
    messages
}

fn render_line(alert: &SnipeAlert) -> String {
    let qty = if alert.quantity > 1 {
        format!(" x{}", alert.quantity)
    } else {
        String::new()
    };
    format!(
        "**{}**{} @ {} — {} each ({:.0}% of {} avg, auction `{}`)",
        alert.item_name,
        qty,
        alert.realm_name,
        format_gold(alert.unit_price),
        alert.ratio * 100.0,
        format_gold(alert.baseline_avg),
        alert.auction_id,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(auction_id: u64, name: &str) -> SnipeAlert {
        SnipeAlert {
            auction_id,
            realm_id: 1080,
            realm_name: "Khadgar".into(),
            item_id: 100,
            item_name: name.into(),
            icon_url: None,
            quantity: 1,
            unit_price: 150_000.0,
            baseline_avg: 1_000_000.0,
            threshold: 0.2,
            ratio: 0.15,
        }
    }

    #[test]
    fn test_render_line() {
        let line = render_line(&alert(42, "Thunderfury"));
        assert!(line.contains("Thunderfury"));
        assert!(line.contains("Khadgar"));
        assert!(line.contains("15g 00s 00c"));
        assert!(line.contains("100g 00s 00c"));
        assert!(line.contains("15%"));
        assert!(line.contains("`42`"));
    }

    #[test]
    fn test_render_line_stack_quantity() {
        let mut a = alert(1, "Linen Cloth");
        a.quantity = 200;
        assert!(render_line(&a).contains("x200"));
    }

    #[test]
    fn test_single_message_for_few_alerts() {
        let alerts = vec![alert(1, "A"), alert(2, "B")];
        let messages = render_messages(&alerts);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with(HEADER));
        assert_eq!(messages[0].matches("\n- ").count(), 2);
    }

    #[test]
    fn test_chunking_under_content_limit() {
        let alerts: Vec<SnipeAlert> = (0..200)
            .map(|i| alert(i, "Some Reasonably Long Item Name Here"))
            .collect();
        let messages = render_messages(&alerts);
        assert!(messages.len() > 1);
        for m in &messages {
            assert!(m.len() <= MAX_CONTENT_CHARS + 200, "message too long: {}", m.len());
            assert!(m.starts_with(HEADER));
        }
        let total_lines: usize = messages.iter().map(|m| m.matches("\n- ").count()).sum();
        assert_eq!(total_lines, 200);
    }

    #[test]
    fn test_no_messages_for_no_alerts() {
        assert!(render_messages(&[]).is_empty());
    }
}
