use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Voice,
    Text,
}

impl MessageKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Text => "text",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "voice" => Some(Self::Voice),
            "text" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Message body. Text carries plaintext (or, for the encrypted variant, an
/// opaque ciphertext blob instead); voice carries a stored file reference.
#[derive(Debug, Clone)]
pub struct MessagePayload {
    pub kind: MessageKind,
    pub text_content: Option<String>,
    pub ciphertext: Option<Vec<u8>>,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub duration_secs: Option<i32>,
    pub mime_type: Option<String>,
    pub attached_image: Option<String>,
}

impl MessagePayload {
    #[must_use]
    pub const fn text(content: String) -> Self {
        Self {
            kind: MessageKind::Text,
            text_content: Some(content),
            ciphertext: None,
            file_path: None,
            file_size: None,
            duration_secs: None,
            mime_type: None,
            attached_image: None,
        }
    }

    #[must_use]
    pub const fn encrypted(ciphertext: Vec<u8>) -> Self {
        Self {
            kind: MessageKind::Text,
            text_content: None,
            ciphertext: Some(ciphertext),
            file_path: None,
            file_size: None,
            duration_secs: None,
            mime_type: None,
            attached_image: None,
        }
    }

    #[must_use]
    pub const fn voice(
        file_path: String,
        file_size: i64,
        duration_secs: Option<i32>,
        mime_type: String,
        attached_image: Option<String>,
    ) -> Self {
        Self {
            kind: MessageKind::Voice,
            text_content: None,
            ciphertext: None,
            file_path: Some(file_path),
            file_size: Some(file_size),
            duration_secs,
            mime_type: Some(mime_type),
            attached_image,
        }
    }

    /// A payload with no file, no non-empty text and no ciphertext is invalid.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.file_path.is_none()
            && self.ciphertext.is_none()
            && self.text_content.as_ref().is_none_or(|t| t.trim().is_empty())
    }
}

/// Per-recipient read state, one entry per addressed recipient.
#[derive(Debug, Clone)]
pub struct ReadReceipt {
    pub user_id: Uuid,
    pub is_read: bool,
    pub read_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub user_id: Uuid,
    pub username: String,
    pub emoji: String,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub group_id: Option<Uuid>,
    pub payload: MessagePayload,
    pub sent_at: OffsetDateTime,
    /// Ordered as addressed by the sender.
    pub recipients: Vec<ReadReceipt>,
    pub reactions: Vec<Reaction>,
    pub deleted_by: Vec<Uuid>,
}

impl Message {
    pub fn receiver_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.recipients.iter().map(|r| r.user_id)
    }

    /// Sender and recipients; the set whose deletions govern the lifecycle.
    #[must_use]
    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.sender_id == user_id || self.recipients.iter().any(|r| r.user_id == user_id)
    }

    #[must_use]
    pub fn visible_to(&self, user_id: Uuid) -> bool {
        !self.deleted_by.contains(&user_id)
    }

    #[must_use]
    pub fn read_receipt(&self, user_id: Uuid) -> Option<&ReadReceipt> {
        self.recipients.iter().find(|r| r.user_id == user_id)
    }

    /// Thread partner for a direct message: the sender when the viewer
    /// received it, otherwise the first non-viewer recipient. Multi-recipient
    /// sends collapse to that first counterpart.
    #[must_use]
    pub fn counterpart(&self, viewer_id: Uuid) -> Option<Uuid> {
        if self.sender_id == viewer_id {
            self.receiver_ids().find(|id| *id != viewer_id)
        } else {
            Some(self.sender_id)
        }
    }

    /// Short preview used in thread summaries and push notifications.
    #[must_use]
    pub fn preview(&self) -> String {
        match self.payload.kind {
            MessageKind::Voice => "\u{1f3a4} Voice message".to_string(),
            MessageKind::Text => self
                .payload
                .text_content
                .as_deref()
                .map_or_else(|| "Encrypted message".to_string(), |t| t.chars().take(50).collect()),
        }
    }
}

/// Outcome of a per-party deletion, reported from the authoritative store
/// state at decision time.
#[derive(Debug, Clone)]
pub struct DeletionResult {
    pub physically_deleted: bool,
    pub sender_id: Uuid,
    pub receiver_ids: Vec<Uuid>,
    /// Stored files to unlink; populated only on physical deletion.
    pub unlink_paths: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(user_id: Uuid) -> ReadReceipt {
        ReadReceipt { user_id, is_read: false, read_at: None }
    }

    #[test]
    fn empty_payload_detection() {
        assert!(MessagePayload::text("   ".to_string()).is_empty());
        assert!(!MessagePayload::text("hello".to_string()).is_empty());
        assert!(!MessagePayload::encrypted(vec![1, 2, 3]).is_empty());
        assert!(!MessagePayload::voice("uploads/a.m4a".into(), 10, None, "audio/mp4".into(), None).is_empty());
    }

    #[test]
    fn counterpart_picks_first_non_viewer_recipient() {
        let viewer = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let msg = Message {
            id: Uuid::new_v4(),
            sender_id: viewer,
            group_id: None,
            payload: MessagePayload::text("hi".into()),
            sent_at: OffsetDateTime::now_utc(),
            recipients: vec![receipt(first), receipt(second)],
            reactions: vec![],
            deleted_by: vec![],
        };

        assert_eq!(msg.counterpart(viewer), Some(first));
        assert_eq!(msg.counterpart(first), Some(viewer));
    }
}
