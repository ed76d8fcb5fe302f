use crate::api::schemas::UserRef;
use crate::domain::message::{Message, Reaction};
use crate::domain::thread::ThreadSummary;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTextRequest {
    pub receivers: Vec<Uuid>,
    pub content: Option<String>,
    /// Base64 ciphertext of the encrypted variant; replaces `content`.
    pub ciphertext: Option<String>,
    /// Per-recipient wrapped keys (base64), opaque to the server.
    #[serde(default)]
    pub wrapped_keys: HashMap<Uuid, String>,
}

#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub emoji: String,
}

/// Raw query parameters; values arrive as strings (possibly empty) and are
/// parsed leniently, unknown values falling back to defaults.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedQuery {
    pub unread_only: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ReceivedQuery {
    #[must_use]
    pub fn unread_only(&self) -> bool {
        self.unread_only.as_deref() == Some("true")
    }

    #[must_use]
    pub fn page(&self) -> Option<i64> {
        self.page.as_deref().and_then(|raw| raw.parse().ok())
    }

    #[must_use]
    pub fn limit(&self) -> Option<i64> {
        self.limit.as_deref().and_then(|raw| raw.parse().ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionView {
    pub user_id: Uuid,
    pub username: String,
    pub emoji: String,
}

impl From<&Reaction> for ReactionView {
    fn from(reaction: &Reaction) -> Self {
        Self { user_id: reaction.user_id, username: reaction.username.clone(), emoji: reaction.emoji.clone() }
    }
}

/// Entry of the received-messages listing, annotated with the viewer's own
/// read state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedMessage {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub sender: Option<UserRef>,
    pub message_type: String,
    pub text_content: Option<String>,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub duration: Option<i32>,
    pub mime_type: Option<String>,
    pub attached_image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
    pub reactions: Vec<ReactionView>,
}

impl ReceivedMessage {
    #[must_use]
    pub fn build(message: &Message, viewer: Uuid, profiles: &HashMap<Uuid, crate::storage::Profile>) -> Self {
        let receipt = message.read_receipt(viewer);
        Self {
            id: message.id,
            sender: profiles.get(&message.sender_id).cloned().map(Into::into),
            message_type: message.payload.kind.as_str().to_string(),
            text_content: message.payload.text_content.clone(),
            file_path: message.payload.file_path.clone(),
            file_size: message.payload.file_size,
            duration: message.payload.duration_secs,
            mime_type: message.payload.mime_type.clone(),
            attached_image: message.payload.attached_image.clone(),
            sent_at: message.sent_at,
            is_read: receipt.is_some_and(|r| r.is_read),
            read_at: receipt.and_then(|r| r.read_at),
            reactions: message.reactions.iter().map(Into::into).collect(),
        }
    }
}

/// Entry of a conversation view. Own sent messages carry the counterpart's
/// read state; received ones carry the viewer's.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMessage {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub message_type: String,
    pub text_content: Option<String>,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub duration: Option<i32>,
    pub mime_type: Option<String>,
    pub attached_image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
    pub is_mine: bool,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
    pub reactions: Vec<ReactionView>,
}

impl ThreadMessage {
    #[must_use]
    pub fn build(message: &Message, viewer: Uuid, partner: Uuid) -> Self {
        let is_mine = message.sender_id == viewer;
        let receipt = if is_mine { message.read_receipt(partner) } else { message.read_receipt(viewer) };
        Self {
            id: message.id,
            message_type: message.payload.kind.as_str().to_string(),
            text_content: message.payload.text_content.clone(),
            file_path: message.payload.file_path.clone(),
            file_size: message.payload.file_size,
            duration: message.payload.duration_secs,
            mime_type: message.payload.mime_type.clone(),
            attached_image: message.payload.attached_image.clone(),
            sent_at: message.sent_at,
            is_mine,
            is_read: receipt.is_some_and(|r| r.is_read),
            read_at: receipt.and_then(|r| r.read_at),
            reactions: message.reactions.iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessageView {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub message_type: String,
    pub preview: String,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
    pub is_mine: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadView {
    pub partner: Option<UserRef>,
    pub partner_id: Uuid,
    pub last_message: LastMessageView,
    pub unread_count: i64,
    pub total_count: i64,
}

impl ThreadView {
    #[must_use]
    pub fn build(summary: &ThreadSummary, profiles: &HashMap<Uuid, crate::storage::Profile>) -> Self {
        Self {
            partner: profiles.get(&summary.partner_id).cloned().map(Into::into),
            partner_id: summary.partner_id,
            last_message: LastMessageView {
                id: summary.last_message.message_id,
                message_type: summary.last_message.kind.as_str().to_string(),
                preview: summary.last_message.preview.clone(),
                sent_at: summary.last_message.sent_at,
                is_mine: summary.last_message.is_mine,
            },
            unread_count: summary.unread_count,
            total_count: summary.total_count,
        }
    }
}

/// `data` object of the send-text response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub sender: Uuid,
    pub receivers: Vec<Uuid>,
    pub message_type: String,
    pub text_content: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
}

impl From<&Message> for SentMessage {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            sender: message.sender_id,
            receivers: message.receiver_ids().collect(),
            message_type: message.payload.kind.as_str().to_string(),
            text_content: message.payload.text_content.clone(),
            sent_at: message.sent_at,
        }
    }
}
