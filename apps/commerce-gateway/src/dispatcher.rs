use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ccg_core::{DeliveryResult, ListSection, OutboundReply, ReplyButton};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::config::ReplyConfig;
use crate::transport::{ChannelTransport, TransportError, TransportEvent, TransportMonitor};

/// Interactive button messages accept at most three replies.
pub const MAX_BUTTONS: usize = 3;

/// Strips formatting from a destination number and prefixes the default
/// country code on local numbers.
pub fn normalize_recipient(raw: &str, cfg: &ReplyConfig) -> Result<String, TransportError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(TransportError::InvalidRecipient(raw.to_string()));
    }
    if digits.len() <= cfg.local_number_len {
        return Ok(format!("{}{digits}", cfg.default_country_code));
    }
    Ok(digits)
}

/// Builds the channel payload for `reply`.
pub fn encode_reply(to: &str, reply: &OutboundReply, footer: &str) -> Value {
    let mut payload = json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
    });

    match reply {
        OutboundReply::Text { text } => {
            payload["type"] = json!("text");
            payload["text"] = json!({ "preview_url": false, "body": text });
        }
        OutboundReply::Buttons { text, buttons } => {
            payload["type"] = json!("interactive");
            payload["interactive"] = json!({
                "type": "button",
                "body": { "text": text },
                "footer": { "text": footer },
                "action": { "buttons": encode_buttons(buttons) },
            });
        }
        OutboundReply::List {
            text,
            button,
            sections,
        } => {
            payload["type"] = json!("interactive");
            payload["interactive"] = json!({
                "type": "list",
                "body": { "text": text },
                "footer": { "text": footer },
                "action": { "button": button, "sections": encode_sections(sections) },
            });
        }
    }
    payload
}

fn encode_buttons(buttons: &[ReplyButton]) -> Vec<Value> {
    if buttons.len() > MAX_BUTTONS {
        warn!(
            provided = buttons.len(),
            kept = MAX_BUTTONS,
            "reply buttons truncated at channel limit"
        );
    }
    buttons
        .iter()
        .take(MAX_BUTTONS)
        .map(|b| json!({ "type": "reply", "reply": { "id": b.id, "title": b.label } }))
        .collect()
}

fn encode_sections(sections: &[ListSection]) -> Vec<Value> {
    sections
        .iter()
        .map(|section| {
            let rows: Vec<Value> = section
                .rows
                .iter()
                .map(|row| {
                    let mut value = json!({ "id": row.id, "title": row.title });
                    if let Some(description) = &row.description {
                        value["description"] = json!(description);
                    }
                    value
                })
                .collect();
            json!({ "title": section.title, "rows": rows })
        })
        .collect()
}

/// Formats replies and hands them to the channel transport.
pub struct Dispatcher {
    transport: Arc<dyn ChannelTransport>,
    monitor: TransportMonitor,
    reply: ReplyConfig,
    timeout: std::time::Duration,
    failures: AtomicU64,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        monitor: TransportMonitor,
        reply: ReplyConfig,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            transport,
            monitor,
            reply,
            timeout,
            failures: AtomicU64::new(0),
        }
    }

    /// Delivers `reply` to `user_id`. Never fails outright: problems are
    /// reported through the returned [`DeliveryResult`].
    pub async fn deliver(&self, user_id: &str, reply: &OutboundReply) -> DeliveryResult {
        match self.try_deliver(user_id, reply).await {
            Ok(message_id) => {
                metrics::counter!("ccg_delivery_total", "outcome" => "delivered").increment(1);
                info!(shape = reply.shape(), message_id = ?message_id, "reply delivered");
                DeliveryResult::delivered(message_id)
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("ccg_delivery_total", "outcome" => "failed").increment(1);
                warn!(shape = reply.shape(), error = %err, "reply delivery failed");
                DeliveryResult::failed(err.to_string())
            }
        }
    }

    async fn try_deliver(
        &self,
        user_id: &str,
        reply: &OutboundReply,
    ) -> Result<Option<String>, TransportError> {
        let state = self.monitor.state();
        if !self.monitor.is_ready() {
            return Err(TransportError::NotReady(state));
        }

        let to = normalize_recipient(user_id, &self.reply)?;
        let payload = encode_reply(&to, reply, &self.reply.footer);

        let result = match tokio::time::timeout(self.timeout, self.transport.send(&payload)).await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        };
        if let Err(err) = &result {
            if err.is_connectivity() {
                self.monitor
                    .report(TransportEvent::Lost(err.to_string()))
                    .await;
            }
        }
        result
    }

    /// Number of failed deliveries since start.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
