use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix marking a message id as client-generated and not yet confirmed by the server.
pub const PROVISIONAL_ID_PREFIX: &str = "temp-";

/// A conversation as returned by the chat list endpoint.
///
/// `jid` is the only identity; every other field is replaced wholesale on each fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub jid: String,
    pub name: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_time: Option<String>,
    #[serde(default)]
    pub last_is_from_me: bool,
    #[serde(default)]
    pub media_type: Option<String>,
}

impl Chat {
    /// Group JIDs end with `@g.us`. The server flag wins when present.
    pub fn is_group_chat(&self) -> bool {
        self.is_group || is_group_jid(&self.jid)
    }
}

pub fn is_group_jid(jid: &str) -> bool {
    jid.ends_with("@g.us")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_jid: String,
    pub sender: String,
    #[serde(default)]
    pub content: Option<String>,
    pub timestamp: String,
    #[serde(default)]
    pub is_from_me: bool,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

impl Message {
    /// Builds the locally synthesized copy of an outgoing message shown before the server confirms it.
    pub fn provisional(id: String, chat_jid: &str, text: &str, now: DateTime<Utc>) -> Self {
        Self {
            id,
            chat_jid: chat_jid.to_string(),
            sender: "You".to_string(),
            content: Some(text.to_string()),
            timestamp: now.to_rfc3339(),
            is_from_me: true,
            media_type: None,
            filename: None,
        }
    }

    pub fn is_provisional(&self) -> bool {
        self.id.starts_with(PROVISIONAL_ID_PREFIX)
    }
}

/// Builds a provisional id from the send time and a per-session sequence number,
/// so two sends within the same millisecond never collide.
pub fn provisional_id(now: DateTime<Utc>, seq: u64) -> String {
    format!("{}{}-{}", PROVISIONAL_ID_PREFIX, now.timestamp_millis(), seq)
}

/// Delivery acknowledgment for a sent message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SendAck {
    pub message: Option<String>,
}
