//! Inbound webhook message and the transcript seed payload derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One message received from the messaging platform via the webhook.
///
/// `content` is empty for media messages until the normalizer has produced
/// text for it; `message_id` is required when `media_type` is set (it keys
/// the media download).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    #[serde(default)]
    pub content: String,
    /// Opaque routing key for the reply destination (e.g. "123@s.whatsapp.net").
    pub chat_jid: String,
    pub is_from_me: bool,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

/// The `{sender, chat_jid, content}` triple serialized into the transcript's
/// seed entry. The model sees the routing key inside its input so it can echo
/// it back in tool arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPayload {
    pub sender: String,
    pub chat_jid: String,
    pub content: String,
}

impl QueryPayload {
    pub fn from_message(message: &InboundMessage) -> Self {
        Self {
            sender: message.sender.clone(),
            chat_jid: message.chat_jid.clone(),
            content: message.content.clone(),
        }
    }

    /// Serialize for the seed entry. A struct of three strings cannot fail to
    /// serialize; the fallback keeps the signature infallible.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
