use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque conversational state produced by the reasoning engine.
///
/// The gateway never looks inside; it only stores the latest object and sends
/// it back on the next turn.
pub type SessionContext = Map<String, Value>;

/// Closed set of inbound message kinds understood by the gateway.
///
/// ```
/// use ccg_core::MessageKind;
///
/// assert_eq!(MessageKind::from_provider("voice"), MessageKind::Audio);
/// assert_eq!(MessageKind::from_provider("sticker"), MessageKind::Unsupported);
/// assert_eq!(MessageKind::Document.as_str(), "document");
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Location,
    Unsupported,
}

impl MessageKind {
    /// Maps a provider `type` field onto a kind. Unknown types degrade to
    /// [`MessageKind::Unsupported`].
    pub fn from_provider(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "chat" => MessageKind::Text,
            "image" => MessageKind::Image,
            "video" => MessageKind::Video,
            "audio" | "voice" | "ptt" => MessageKind::Audio,
            "document" => MessageKind::Document,
            "location" => MessageKind::Location,
            _ => MessageKind::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Video => "video",
            MessageKind::Audio => "audio",
            MessageKind::Document => "document",
            MessageKind::Location => "location",
            MessageKind::Unsupported => "unsupported",
        }
    }
}

/// Provider-agnostic inbound message handed to the reasoning engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalMessage {
    pub kind: MessageKind,
    pub body: String,
}

/// Inbound message as delivered by a channel, before normalization.
///
/// Webhook deliveries are flattened into this shape by
/// [`RawMessage::from_webhook`]; the direct delivery channel deserializes it
/// as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawMessage {
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// Selectable reply button.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyButton {
    pub id: String,
    pub label: String,
}

/// Row inside a list section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Titled group of rows in a selection menu.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListSection {
    pub title: String,
    #[serde(default)]
    pub rows: Vec<ListRow>,
}

/// Reply produced for a turn, tagged by shape.
///
/// ```
/// use ccg_core::{OutboundReply, ReplyButton};
///
/// let reply = OutboundReply::Buttons {
///     text: "Choose one".into(),
///     buttons: vec![ReplyButton { id: "yes".into(), label: "Yes".into() }],
/// };
/// assert_eq!(reply.shape(), "buttons");
/// assert_eq!(reply.text(), "Choose one");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum OutboundReply {
    Text {
        text: String,
    },
    Buttons {
        text: String,
        #[serde(default)]
        buttons: Vec<ReplyButton>,
    },
    List {
        text: String,
        #[serde(default = "default_list_button")]
        button: String,
        #[serde(default)]
        sections: Vec<ListSection>,
    },
}

fn default_list_button() -> String {
    "Options".to_string()
}

impl OutboundReply {
    pub fn text(&self) -> &str {
        match self {
            OutboundReply::Text { text }
            | OutboundReply::Buttons { text, .. }
            | OutboundReply::List { text, .. } => text,
        }
    }

    pub fn shape(&self) -> &'static str {
        match self {
            OutboundReply::Text { .. } => "text",
            OutboundReply::Buttons { .. } => "buttons",
            OutboundReply::List { .. } => "list",
        }
    }
}

impl From<String> for OutboundReply {
    fn from(text: String) -> Self {
        OutboundReply::Text { text }
    }
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryResult {
    pub fn delivered(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}
