use crate::domain::message::{DeletionResult, Message, Reaction, ReadReceipt};
use crate::error::{AppError, Result};
use crate::storage::records::message::{MessageRow, ReactionRow, RecipientRow, assemble};
use crate::storage::{DbPool, MarkReadOutcome, MessageStore, NewMessage, Page};
use async_trait::async_trait;
use uuid::Uuid;

const MESSAGE_COLUMNS: &str = "id, sender_id, group_id, message_type, text_content, ciphertext, file_path, \
     file_size, duration_secs, mime_type, attached_image, sent_at, deleted_by";

#[derive(Debug, Clone)]
pub struct PgMessageStore {
    pool: DbPool,
}

impl PgMessageStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_children(&self, ids: &[Uuid]) -> Result<(Vec<RecipientRow>, Vec<ReactionRow>)> {
        if ids.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let recipients = sqlx::query_as::<_, RecipientRow>(
            r"
            SELECT message_id, user_id, is_read, read_at
            FROM message_recipients
            WHERE message_id = ANY($1)
            ORDER BY message_id, position
            ",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let reactions = sqlx::query_as::<_, ReactionRow>(
            r"
            SELECT message_id, user_id, username, emoji
            FROM message_reactions
            WHERE message_id = ANY($1)
            ORDER BY message_id, reacted_at
            ",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok((recipients, reactions))
    }

    async fn hydrate(&self, rows: Vec<MessageRow>) -> Result<Vec<Message>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let (recipients, reactions) = self.load_children(&ids).await?;
        Ok(assemble(rows, recipients, reactions))
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn insert(&self, new: NewMessage) -> Result<Message> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r"
            INSERT INTO messages (sender_id, group_id, message_type, text_content, ciphertext,
                                  file_path, file_size, duration_secs, mime_type, attached_image)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {MESSAGE_COLUMNS}
            "
        ))
        .bind(new.sender_id)
        .bind(new.group_id)
        .bind(new.payload.kind.as_str())
        .bind(&new.payload.text_content)
        .bind(&new.payload.ciphertext)
        .bind(&new.payload.file_path)
        .bind(new.payload.file_size)
        .bind(new.payload.duration_secs)
        .bind(&new.payload.mime_type)
        .bind(&new.payload.attached_image)
        .fetch_one(&mut *tx)
        .await?;

        for (position, receiver_id) in new.receiver_ids.iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO message_recipients (message_id, user_id, position, wrapped_key)
                VALUES ($1, $2, $3, $4)
                ",
            )
            .bind(row.id)
            .bind(receiver_id)
            .bind(position as i32)
            .bind(new.wrapped_keys.get(receiver_id))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let recipients = new
            .receiver_ids
            .into_iter()
            .map(|user_id| ReadReceipt { user_id, is_read: false, read_at: None })
            .collect();
        Ok(row.into_message(recipients, Vec::new()))
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else { return Ok(None) };
        Ok(self.hydrate(vec![row]).await?.pop())
    }

    async fn mark_read(&self, message_id: Uuid, user_id: Uuid) -> Result<MarkReadOutcome> {
        // Conditional update: a concurrent or repeated call can never move
        // read_at once the entry is read.
        let result = sqlx::query(
            r"
            UPDATE message_recipients
            SET is_read = TRUE, read_at = now()
            WHERE message_id = $1 AND user_id = $2 AND is_read = FALSE
            ",
        )
        .bind(message_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 { Ok(MarkReadOutcome::Updated) } else { Ok(MarkReadOutcome::AlreadyRead) }
    }

    async fn delete_for_user(&self, message_id: Uuid, user_id: Uuid) -> Result<DeletionResult> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent last-party deletions; the coverage
        // decision below always sees the committed deleted_by set.
        let row: Option<(Uuid, Vec<Uuid>, Option<String>, Option<String>)> = sqlx::query_as(
            r"
            SELECT sender_id, deleted_by, file_path, attached_image
            FROM messages
            WHERE id = $1
            FOR UPDATE
            ",
        )
        .bind(message_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((sender_id, mut deleted_by, file_path, attached_image)) = row else {
            return Err(AppError::NotFound);
        };

        let receiver_ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT user_id FROM message_recipients WHERE message_id = $1 ORDER BY position")
                .bind(message_id)
                .fetch_all(&mut *tx)
                .await?;

        if sender_id != user_id && !receiver_ids.contains(&user_id) {
            return Err(AppError::Forbidden("Not a party to this message".to_string()));
        }

        if !deleted_by.contains(&user_id) {
            deleted_by.push(user_id);
        }

        let covered =
            deleted_by.contains(&sender_id) && receiver_ids.iter().all(|receiver| deleted_by.contains(receiver));

        if covered {
            sqlx::query("DELETE FROM messages WHERE id = $1").bind(message_id).execute(&mut *tx).await?;
        } else {
            sqlx::query("UPDATE messages SET deleted_by = $2 WHERE id = $1")
                .bind(message_id)
                .bind(&deleted_by)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        let unlink_paths =
            if covered { file_path.into_iter().chain(attached_image).collect() } else { Vec::new() };

        Ok(DeletionResult { physically_deleted: covered, sender_id, receiver_ids, unlink_paths })
    }

    async fn add_reaction(&self, message_id: Uuid, reaction: Reaction) -> Result<()> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM messages WHERE id = $1)")
            .bind(message_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(AppError::NotFound);
        }

        let result = sqlx::query(
            r"
            INSERT INTO message_reactions (message_id, user_id, username, emoji)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(message_id)
        .bind(reaction.user_id)
        .bind(&reaction.username)
        .bind(&reaction.emoji)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Duplicate("Reaction already exists".to_string()));
        }
        Ok(())
    }

    async fn remove_reaction(&self, message_id: Uuid, user_id: Uuid, emoji: &str) -> Result<()> {
        sqlx::query("DELETE FROM message_reactions WHERE message_id = $1 AND user_id = $2 AND emoji = $3")
            .bind(message_id)
            .bind(user_id)
            .bind(emoji)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_received(&self, viewer: Uuid, unread_only: bool, page: Page) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r"
            SELECT m.{}
            FROM messages m
            JOIN message_recipients r ON r.message_id = m.id AND r.user_id = $1
            WHERE m.group_id IS NULL
              AND NOT (m.deleted_by @> ARRAY[$1])
              AND (NOT $2 OR r.is_read = FALSE)
            ORDER BY m.sent_at DESC
            LIMIT $3 OFFSET $4
            ",
            MESSAGE_COLUMNS.replace(", ", ", m.")
        ))
        .bind(viewer)
        .bind(unread_only)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn list_direct_involving(&self, viewer: Uuid) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r"
            SELECT {MESSAGE_COLUMNS}
            FROM messages m
            WHERE m.group_id IS NULL
              AND NOT (m.deleted_by @> ARRAY[$1])
              AND (m.sender_id = $1
                   OR EXISTS (SELECT 1 FROM message_recipients r
                              WHERE r.message_id = m.id AND r.user_id = $1))
            ORDER BY m.sent_at DESC
            "
        ))
        .bind(viewer)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn list_thread(&self, viewer: Uuid, partner: Uuid) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r"
            SELECT {MESSAGE_COLUMNS}
            FROM messages m
            WHERE m.group_id IS NULL
              AND NOT (m.deleted_by @> ARRAY[$1])
              AND ((m.sender_id = $1 AND EXISTS (SELECT 1 FROM message_recipients r
                                                 WHERE r.message_id = m.id AND r.user_id = $2))
                OR (m.sender_id = $2 AND EXISTS (SELECT 1 FROM message_recipients r
                                                 WHERE r.message_id = m.id AND r.user_id = $1)))
            ORDER BY m.sent_at ASC
            "
        ))
        .bind(viewer)
        .bind(partner)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn list_group(&self, group_id: Uuid, viewer: Uuid, page: Page) -> Result<(Vec<Message>, i64)> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r"
            SELECT {MESSAGE_COLUMNS}
            FROM messages m
            WHERE m.group_id = $1 AND NOT (m.deleted_by @> ARRAY[$2])
            ORDER BY m.sent_at DESC
            LIMIT $3 OFFSET $4
            "
        ))
        .bind(group_id)
        .bind(viewer)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE group_id = $1 AND NOT (deleted_by @> ARRAY[$2])")
                .bind(group_id)
                .bind(viewer)
                .fetch_one(&self.pool)
                .await?;

        Ok((self.hydrate(rows).await?, total))
    }

    async fn latest_group_message(&self, group_id: Uuid) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE group_id = $1 ORDER BY sent_at DESC LIMIT 1"
        ))
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        Ok(self.hydrate(vec![row]).await?.pop())
    }

    async fn unread_group_count(&self, group_id: Uuid, viewer: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*)
            FROM message_recipients r
            JOIN messages m ON m.id = r.message_id
            WHERE m.group_id = $1 AND r.user_id = $2 AND r.is_read = FALSE
              AND NOT (m.deleted_by @> ARRAY[$2])
            ",
        )
        .bind(group_id)
        .bind(viewer)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn purge_group(&self, group_id: Uuid) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        let rows: Vec<(Option<String>, Option<String>)> = sqlx::query_as(
            r"
            SELECT file_path, attached_image
            FROM messages
            WHERE group_id = $1 AND (file_path IS NOT NULL OR attached_image IS NOT NULL)
            ",
        )
        .bind(group_id)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM messages WHERE group_id = $1").bind(group_id).execute(&mut *tx).await?;

        tx.commit().await?;

        Ok(rows.into_iter().flat_map(|(file, image)| file.into_iter().chain(image)).collect())
    }
}
