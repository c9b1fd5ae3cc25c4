use serde_json::Value;

use crate::types::{CanonicalMessage, MessageKind, RawMessage};

/// Body used for message types the gateway cannot represent.
pub const UNSUPPORTED_BODY: &str = "[Unsupported message]";

/// Converts a raw inbound message into its canonical form.
///
/// Total over every input: unknown provider types map to
/// [`MessageKind::Unsupported`] with [`UNSUPPORTED_BODY`].
///
/// ```
/// use ccg_core::{normalize, MessageKind, RawMessage};
///
/// let raw = RawMessage {
///     from: "50688887777".into(),
///     kind: "audio".into(),
///     ..Default::default()
/// };
/// let msg = normalize(&raw);
/// assert_eq!(msg.kind, MessageKind::Audio);
/// assert_eq!(msg.body, "[Audio]");
/// ```
pub fn normalize(raw: &RawMessage) -> CanonicalMessage {
    let kind = MessageKind::from_provider(&raw.kind);
    let body = match kind {
        MessageKind::Text => raw.body.clone().unwrap_or_default(),
        MessageKind::Image => placeholder("Image", raw.caption.as_deref()),
        MessageKind::Video => placeholder("Video", raw.caption.as_deref()),
        MessageKind::Audio => "[Audio]".to_string(),
        MessageKind::Document => placeholder(
            "Document",
            non_empty(raw.caption.as_deref()).or(raw.filename.as_deref()),
        ),
        MessageKind::Location => match (raw.latitude, raw.longitude) {
            (Some(lat), Some(lon)) => format!("[Location: {lat}, {lon}]"),
            _ => "[Location]".to_string(),
        },
        MessageKind::Unsupported => UNSUPPORTED_BODY.to_string(),
    };
    CanonicalMessage { kind, body }
}

fn placeholder(label: &str, detail: Option<&str>) -> String {
    match non_empty(detail) {
        Some(detail) => format!("[{label}: {detail}]"),
        None => format!("[{label}]"),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl RawMessage {
    /// Flattens one entry of a WhatsApp Cloud `messages` array.
    ///
    /// Returns `None` when the sender is missing; every other field is optional.
    /// Interactive replies (button taps, list selections) are surfaced as text
    /// carrying the chosen title.
    pub fn from_webhook(message: &Value) -> Option<RawMessage> {
        let from = message.get("from")?.as_str()?.to_string();
        let id = str_at(message, &["id"]);
        let provider_type = str_at(message, &["type"]).unwrap_or_default();

        let mut raw = RawMessage {
            from,
            id,
            kind: provider_type.clone(),
            ..Default::default()
        };

        match provider_type.as_str() {
            "text" => raw.body = str_at(message, &["text", "body"]),
            "image" | "video" | "document" => {
                raw.caption = str_at(message, &[provider_type.as_str(), "caption"]);
                raw.filename = str_at(message, &[provider_type.as_str(), "filename"]);
            }
            "location" => {
                raw.latitude = f64_at(message, &["location", "latitude"]);
                raw.longitude = f64_at(message, &["location", "longitude"]);
            }
            "interactive" => {
                let title = str_at(message, &["interactive", "button_reply", "title"])
                    .or_else(|| str_at(message, &["interactive", "list_reply", "title"]));
                if let Some(title) = title {
                    raw.kind = "text".into();
                    raw.body = Some(title);
                }
            }
            "button" => {
                if let Some(text) = str_at(message, &["button", "text"]) {
                    raw.kind = "text".into();
                    raw.body = Some(text);
                }
            }
            _ => {}
        }
        Some(raw)
    }
}

/// Extracts every message carried by a webhook delivery, in delivery order.
pub fn extract_messages(payload: &Value) -> Vec<RawMessage> {
    let mut out = Vec::new();
    let Some(entries) = payload.get("entry").and_then(Value::as_array) else {
        return out;
    };

    for entry in entries {
        let Some(changes) = entry.get("changes").and_then(Value::as_array) else {
            continue;
        };
        for change in changes {
            let Some(messages) = change
                .get("value")
                .and_then(|v| v.get("messages"))
                .and_then(Value::as_array)
            else {
                continue;
            };
            for message in messages {
                match RawMessage::from_webhook(message) {
                    Some(raw) => out.push(raw),
                    None => tracing::debug!("skipping webhook message without sender"),
                }
            }
        }
    }
    out
}

fn str_at(value: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(value, |v, key| v.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn f64_at(value: &Value, path: &[&str]) -> Option<f64> {
    let leaf = path.iter().try_fold(value, |v, key| v.get(key))?;
    leaf.as_f64()
        .or_else(|| leaf.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(kind: &str) -> RawMessage {
        RawMessage {
            from: "50688887777".into(),
            kind: kind.into(),
            ..Default::default()
        }
    }

    #[test]
    fn text_keeps_body() {
        let mut msg = raw("text");
        msg.body = Some("Hola".into());
        assert_eq!(
            normalize(&msg),
            CanonicalMessage {
                kind: MessageKind::Text,
                body: "Hola".into()
            }
        );
    }

    #[test]
    fn media_placeholders_include_caption_when_present() {
        let mut image = raw("image");
        assert_eq!(normalize(&image).body, "[Image]");
        image.caption = Some("red car".into());
        assert_eq!(normalize(&image).body, "[Image: red car]");

        let mut video = raw("video");
        video.caption = Some("   ".into());
        assert_eq!(normalize(&video).body, "[Video]");

        let mut doc = raw("document");
        doc.filename = Some("invoice.pdf".into());
        assert_eq!(normalize(&doc).body, "[Document: invoice.pdf]");
        doc.caption = Some("my invoice".into());
        assert_eq!(normalize(&doc).body, "[Document: my invoice]");
    }

    #[test]
    fn location_formats_coordinates() {
        let mut loc = raw("location");
        assert_eq!(normalize(&loc).body, "[Location]");
        loc.latitude = Some(9.9281);
        loc.longitude = Some(-84.0907);
        let msg = normalize(&loc);
        assert_eq!(msg.kind, MessageKind::Location);
        assert_eq!(msg.body, "[Location: 9.9281, -84.0907]");
    }

    #[test]
    fn unknown_types_degrade_to_unsupported() {
        for kind in ["sticker", "reaction", "", "contacts"] {
            let msg = normalize(&raw(kind));
            assert_eq!(msg.kind, MessageKind::Unsupported);
            assert_eq!(msg.body, UNSUPPORTED_BODY);
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        let mut msg = raw("image");
        msg.caption = Some("shoes".into());
        assert_eq!(normalize(&msg), normalize(&msg));
    }

    #[test]
    fn extract_messages_flattens_cloud_payload() {
        let payload = json!({
            "entry": [
                {"changes": [
                    {"value": {
                        "contacts": [],
                        "messages": [
                            {"from": "50688887777", "id": "wamid.1", "type": "text", "text": {"body": "Hola"}},
                            {"from": "50688887777", "id": "wamid.2", "type": "audio", "audio": {"id": "media-1"}},
                            {"id": "wamid.3", "type": "text", "text": {"body": "no sender"}}
                        ]
                    }},
                    {"value": {"statuses": []}}
                ]}
            ]
        });
        let messages = extract_messages(&payload);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].body.as_deref(), Some("Hola"));
        assert_eq!(messages[0].id.as_deref(), Some("wamid.1"));
        assert_eq!(normalize(&messages[1]).body, "[Audio]");
    }

    #[test]
    fn interactive_replies_become_text() {
        let message = json!({
            "from": "50688887777",
            "type": "interactive",
            "interactive": {"type": "list_reply", "list_reply": {"id": "toys", "title": "Juguetes"}}
        });
        let raw = RawMessage::from_webhook(&message).unwrap();
        let msg = normalize(&raw);
        assert_eq!(msg.kind, MessageKind::Text);
        assert_eq!(msg.body, "Juguetes");
    }

    #[test]
    fn location_accepts_string_coordinates() {
        let message = json!({
            "from": "1",
            "type": "location",
            "location": {"latitude": "9.5", "longitude": -84}
        });
        let raw = RawMessage::from_webhook(&message).unwrap();
        assert_eq!(raw.latitude, Some(9.5));
        assert_eq!(raw.longitude, Some(-84.0));
    }

    #[test]
    fn missing_entry_yields_nothing() {
        assert!(extract_messages(&json!({"object": "whatsapp_business_account"})).is_empty());
    }
}
