use crate::domain::message::MessageKind;
use time::OffsetDateTime;
use uuid::Uuid;

/// Summary of the most recent message in a conversation.
#[derive(Debug, Clone)]
pub struct LastMessage {
    pub message_id: Uuid,
    pub kind: MessageKind,
    pub preview: String,
    pub sent_at: OffsetDateTime,
    pub is_mine: bool,
}

/// Derived per-viewer conversation view, keyed by the counterpart user.
/// Never persisted; recomputed from the message collection on each request.
#[derive(Debug, Clone)]
pub struct ThreadSummary {
    pub partner_id: Uuid,
    pub last_message: LastMessage,
    pub unread_count: i64,
    pub total_count: i64,
}
