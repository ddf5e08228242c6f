use async_trait::async_trait;
use flow_dashboard::market_score;
use sentiment_delta::{ComparisonWindow, Sentiment, TickerSentiment};
use std::time::Duration;

/// Discord caps message content at 2000 characters; chunk below that to
/// leave room for the header line.
const CONTENT_CHUNK_LIMIT: usize = 1800;
const MAX_RETRIES: u32 = 3;
const TOP_MOVERS: usize = 5;

/// Errors from the notification system.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Discord webhook error: {0}")]
    Discord(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A ready-to-post webhook payload: plain content, embeds, or both.
#[derive(Debug, Clone)]
pub struct WebhookMessage {
    pub content: Option<String>,
    pub embeds: Vec<serde_json::Value>,
}

impl WebhookMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embeds: Vec::new(),
        }
    }

    pub fn embed(embed: serde_json::Value) -> Self {
        Self {
            content: None,
            embeds: vec![embed],
        }
    }
}

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, message: &WebhookMessage) -> Result<(), NotificationError>;
    fn name(&self) -> &str;
}

/// Discord webhook notifier with bounded retry on rate limiting.
pub struct DiscordWebhookNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl DiscordWebhookNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationChannel for DiscordWebhookNotifier {
    async fn send(&self, message: &WebhookMessage) -> Result<(), NotificationError> {
        let mut payload = serde_json::Map::new();
        if let Some(content) = &message.content {
            payload.insert("content".to_string(), serde_json::json!(content));
        }
        if !message.embeds.is_empty() {
            payload.insert("embeds".to_string(), serde_json::json!(message.embeds));
        }

        for attempt in 0..MAX_RETRIES {
            let response = self
                .client
                .post(&self.webhook_url)
                .json(&payload)
                .timeout(Duration::from_secs(10))
                .send()
                .await
                .map_err(|e| NotificationError::Discord(e.to_string()))?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }
            if status.as_u16() == 429 && attempt + 1 < MAX_RETRIES {
                let wait = Duration::from_secs(2u64.pow(attempt));
                tracing::warn!(
                    "Discord rate limited, retry {}/{} after {:?}",
                    attempt + 1,
                    MAX_RETRIES,
                    wait
                );
                tokio::time::sleep(wait).await;
                continue;
            }
            return Err(NotificationError::Discord(format!("HTTP {status}")));
        }
        Err(NotificationError::Discord("retries exhausted".to_string()))
    }

    fn name(&self) -> &str {
        "discord-webhook"
    }
}

/// Webhook URLs per outbound stream, read from the environment.
#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    pub tradingview_webhook: Option<String>,
    pub overnight_webhook: Option<String>,
    pub daily_webhook: Option<String>,
}

impl NotificationConfig {
    pub fn from_env() -> Self {
        Self {
            tradingview_webhook: std::env::var("DISCORD_TRADINGVIEW_WEBHOOK").ok(),
            overnight_webhook: std::env::var("DISCORD_OVERNIGHT_WEBHOOK").ok(),
            daily_webhook: std::env::var("DISCORD_DAILY_WEBHOOK").ok(),
        }
    }
}

/// Dispatches analysis artifacts to their configured Discord streams. An
/// unconfigured stream is skipped with a log line, never an error.
pub struct NotificationService {
    tradingview: Option<DiscordWebhookNotifier>,
    overnight: Option<DiscordWebhookNotifier>,
    daily: Option<DiscordWebhookNotifier>,
}

impl NotificationService {
    pub fn new(config: &NotificationConfig) -> Self {
        let channel = |url: &Option<String>, stream: &str| {
            let notifier = url.as_ref().map(|u| DiscordWebhookNotifier::new(u.clone()));
            if notifier.is_some() {
                tracing::info!("Discord {} notifications enabled", stream);
            }
            notifier
        };
        Self {
            tradingview: channel(&config.tradingview_webhook, "tradingview"),
            overnight: channel(&config.overnight_webhook, "overnight"),
            daily: channel(&config.daily_webhook, "daily"),
        }
    }

    /// Post the joined gamma feed, split into Discord-sized chunks.
    pub async fn send_gamma_feed(&self, records: &[String]) {
        let Some(channel) = &self.tradingview else {
            tracing::info!("No TradingView webhook configured, skipping gamma feed");
            return;
        };
        if records.is_empty() {
            tracing::info!("No gamma records to send");
            return;
        }

        let chunks = chunk_records(records, CONTENT_CHUNK_LIMIT);
        let total = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            let header = if total > 1 {
                format!("TradingView Data (Part {}/{}):\n", i + 1, total)
            } else {
                "TradingView Gamma Flip Data:\n".to_string()
            };
            if let Err(e) = channel.send(&WebhookMessage::text(header + &chunk)).await {
                tracing::warn!("Failed to send gamma feed via {}: {}", channel.name(), e);
            }
        }
    }

    /// Post a sentiment summary embed to the window's stream.
    pub async fn send_sentiment(&self, window: ComparisonWindow, summary: &[TickerSentiment]) {
        let channel = match window {
            ComparisonWindow::Overnight => &self.overnight,
            ComparisonWindow::Daily => &self.daily,
        };
        let Some(channel) = channel else {
            tracing::info!("No {} webhook configured, skipping sentiment", window.as_str());
            return;
        };
        if summary.is_empty() {
            tracing::info!("No {} sentiment data to send", window.as_str());
            return;
        }

        let message = WebhookMessage::embed(sentiment_embed(window, summary));
        if let Err(e) = channel.send(&message).await {
            tracing::warn!("Failed to send sentiment via {}: {}", channel.name(), e);
        }
    }
}

/// Pack records into `;`-joined chunks of at most `limit` characters.
pub fn chunk_records(records: &[String], limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for record in records {
        if !current.is_empty() && current.len() + record.len() + 1 > limit {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(';');
        }
        current.push_str(record);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Sentiment embed: overall market line plus top-mover code blocks.
fn sentiment_embed(window: ComparisonWindow, summary: &[TickerSentiment]) -> serde_json::Value {
    let title = match window {
        ComparisonWindow::Overnight => "Overnight Sentiment Analysis",
        ComparisonWindow::Daily => "Daily Sentiment Analysis",
    };

    let (description, color) = match market_score(summary) {
        Some(score) => {
            let direction = if score > 0.0 { "BULLISH" } else { "BEARISH" };
            (
                format!("**Overall Market: {direction}** ({score:.2})"),
                if score > 0.0 { 0x00ff00 } else { 0xff0000 },
            )
        }
        None => ("**Overall Market: n/a**".to_string(), 0x0099ff),
    };

    let mut fields = Vec::new();
    let bullish = mover_block(
        summary
            .iter()
            .filter(|t| t.sentiment == Some(Sentiment::Bullish))
            .take(TOP_MOVERS),
    );
    if let Some(block) = bullish {
        fields.push(serde_json::json!({
            "name": "Top Bullish",
            "value": block,
            "inline": true
        }));
    }
    let bearish = mover_block(
        summary
            .iter()
            .filter(|t| t.sentiment == Some(Sentiment::Bearish))
            .rev()
            .take(TOP_MOVERS),
    );
    if let Some(block) = bearish {
        fields.push(serde_json::json!({
            "name": "Top Bearish",
            "value": block,
            "inline": true
        }));
    }

    serde_json::json!({
        "title": title,
        "description": description,
        "color": color,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "fields": fields,
    })
}

fn mover_block<'a>(movers: impl Iterator<Item = &'a TickerSentiment>) -> Option<String> {
    let lines: Vec<String> = movers
        .map(|t| format!("{}: {:.2}", t.symbol, t.normalized_score.unwrap_or(0.0)))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(format!("```\n{}\n```", lines.join("\n")))
    }
}
