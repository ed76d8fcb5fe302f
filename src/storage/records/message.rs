use crate::domain::message::{Message, MessageKind, MessagePayload, Reaction, ReadReceipt};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct MessageRow {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub group_id: Option<Uuid>,
    pub message_type: String,
    pub text_content: Option<String>,
    pub ciphertext: Option<Vec<u8>>,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub duration_secs: Option<i32>,
    pub mime_type: Option<String>,
    pub attached_image: Option<String>,
    pub sent_at: OffsetDateTime,
    pub deleted_by: Vec<Uuid>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RecipientRow {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub is_read: bool,
    pub read_at: Option<OffsetDateTime>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ReactionRow {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub emoji: String,
}

impl MessageRow {
    pub(crate) fn into_message(self, recipients: Vec<ReadReceipt>, reactions: Vec<Reaction>) -> Message {
        // The CHECK constraint keeps message_type within the known set.
        let kind = MessageKind::parse(&self.message_type).unwrap_or(MessageKind::Text);
        Message {
            id: self.id,
            sender_id: self.sender_id,
            group_id: self.group_id,
            payload: MessagePayload {
                kind,
                text_content: self.text_content,
                ciphertext: self.ciphertext,
                file_path: self.file_path,
                file_size: self.file_size,
                duration_secs: self.duration_secs,
                mime_type: self.mime_type,
                attached_image: self.attached_image,
            },
            sent_at: self.sent_at,
            recipients,
            reactions,
            deleted_by: self.deleted_by,
        }
    }
}

/// Stitches recipient and reaction rows back onto their messages, keeping
/// the message row order.
pub(crate) fn assemble(
    rows: Vec<MessageRow>,
    recipient_rows: Vec<RecipientRow>,
    reaction_rows: Vec<ReactionRow>,
) -> Vec<Message> {
    let mut recipients: std::collections::HashMap<Uuid, Vec<ReadReceipt>> = std::collections::HashMap::new();
    for row in recipient_rows {
        recipients.entry(row.message_id).or_default().push(ReadReceipt {
            user_id: row.user_id,
            is_read: row.is_read,
            read_at: row.read_at,
        });
    }

    let mut reactions: std::collections::HashMap<Uuid, Vec<Reaction>> = std::collections::HashMap::new();
    for row in reaction_rows {
        reactions.entry(row.message_id).or_default().push(Reaction {
            user_id: row.user_id,
            username: row.username,
            emoji: row.emoji,
        });
    }

    rows.into_iter()
        .map(|row| {
            let id = row.id;
            row.into_message(recipients.remove(&id).unwrap_or_default(), reactions.remove(&id).unwrap_or_default())
        })
        .collect()
}
