use crate::cache::CacheFacade;
use crate::domain::message::{DeletionResult, Message, MessagePayload, Reaction};
use crate::domain::notification::{PushData, PushNote};
use crate::error::{AppError, Result};
use crate::services::files::FileStore;
use crate::services::push::{self, NotificationSink};
use crate::storage::{Directory, FollowGate, MessageStore, NewMessage, Page};
use opentelemetry::{
    KeyValue, global,
    metrics::Counter,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    sent_total: Counter<u64>,
    deleted_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("voxa-server");
        Self {
            sent_total: meter
                .u64_counter("voxa_messages_sent_total")
                .with_description("Total messages accepted for delivery")
                .build(),
            deleted_total: meter
                .u64_counter("voxa_messages_deleted_total")
                .with_description("Total per-party message deletions")
                .build(),
        }
    }
}

/// Message lifecycle: sends, read receipts, reactions and the two-tier
/// deletion protocol.
#[derive(Clone, Debug)]
pub struct MessageService {
    store: Arc<dyn MessageStore>,
    follows: Arc<dyn FollowGate>,
    directory: Arc<dyn Directory>,
    files: Arc<dyn FileStore>,
    sink: Arc<dyn NotificationSink>,
    cache: CacheFacade,
    metrics: Metrics,
}

impl MessageService {
    #[must_use]
    pub fn new(
        store: Arc<dyn MessageStore>,
        follows: Arc<dyn FollowGate>,
        directory: Arc<dyn Directory>,
        files: Arc<dyn FileStore>,
        sink: Arc<dyn NotificationSink>,
        cache: CacheFacade,
    ) -> Self {
        Self { store, follows, directory, files, sink, cache, metrics: Metrics::new() }
    }

    /// Sends a direct message to one or more receivers.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` for an empty receiver list or payload.
    /// Returns `AppError::Forbidden` when a receiver is not in an established
    /// follow relation with the sender.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, payload, wrapped_keys),
        fields(sender_id = %sender_id, receivers = receiver_ids.len())
    )]
    pub async fn send_direct(
        &self,
        sender_id: Uuid,
        receiver_ids: Vec<Uuid>,
        payload: MessagePayload,
        wrapped_keys: HashMap<Uuid, Vec<u8>>,
    ) -> Result<Message> {
        if receiver_ids.is_empty() {
            return Err(AppError::BadRequest("Select at least one receiver".to_string()));
        }
        if payload.is_empty() {
            return Err(AppError::BadRequest("Message payload is empty".to_string()));
        }

        for receiver_id in &receiver_ids {
            if !self.follows.is_following(sender_id, *receiver_id).await? {
                return Err(AppError::Forbidden("Messages can only be sent to users you follow".to_string()));
            }
        }

        let message = self
            .store
            .insert(NewMessage { sender_id, group_id: None, receiver_ids: receiver_ids.clone(), payload, wrapped_keys })
            .await?;

        tracing::debug!(message_id = %message.id, "Message stored for delivery");
        self.metrics.sent_total.add(1, &[KeyValue::new("kind", message.payload.kind.as_str())]);

        let sender_name = self
            .directory
            .profile(sender_id)
            .await?
            .map_or_else(|| "Someone".to_string(), |profile| profile.username);
        let note = PushNote { title: sender_name, body: message.preview() };
        let data = PushData::from([
            ("type".to_string(), "direct_message".to_string()),
            ("messageId".to_string(), message.id.to_string()),
        ]);
        push::dispatch(Arc::clone(&self.sink), Arc::clone(&self.directory), receiver_ids.clone(), note, data);

        self.cache.invalidate_message_views(sender_id, &receiver_ids).await;

        Ok(message)
    }

    /// Marks a message read for one recipient. Idempotent.
    ///
    /// # Errors
    /// `NotFound` for unknown ids, `Forbidden` when the caller holds no read
    /// entry on the message.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(message_id = %message_id, user_id = %user_id))]
    pub async fn mark_read(&self, message_id: Uuid, user_id: Uuid) -> Result<()> {
        let message = self.store.fetch(message_id).await?.ok_or(AppError::NotFound)?;
        if message.read_receipt(user_id).is_none() {
            return Err(AppError::Forbidden("No access to this message".to_string()));
        }

        self.store.mark_read(message_id, user_id).await?;
        self.cache.invalidate_message_views(message.sender_id, &[user_id]).await;
        Ok(())
    }

    /// Deletes the caller's view of a message; removes the record and its
    /// files once every party has deleted theirs.
    ///
    /// # Errors
    /// `NotFound` for unknown ids, `Forbidden` when the caller is not a party.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(message_id = %message_id, user_id = %user_id))]
    pub async fn delete_for_user(&self, message_id: Uuid, user_id: Uuid) -> Result<DeletionResult> {
        let result = self.store.delete_for_user(message_id, user_id).await?;
        self.metrics
            .deleted_total
            .add(1, &[KeyValue::new("physical", result.physically_deleted)]);

        for path in &result.unlink_paths {
            if let Err(e) = self.files.unlink(path).await {
                // Orphaned files beat unremovable records.
                tracing::warn!(path = %path, error = %e, "Failed to unlink stored file");
            }
        }

        self.cache.invalidate_message_views(result.sender_id, &result.receiver_ids).await;
        Ok(result)
    }

    /// # Errors
    /// `Duplicate` when the (user, emoji) pair already reacted.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(message_id = %message_id, user_id = %user_id))]
    pub async fn add_reaction(&self, message_id: Uuid, user_id: Uuid, emoji: String) -> Result<()> {
        if emoji.trim().is_empty() {
            return Err(AppError::BadRequest("Emoji is required".to_string()));
        }

        let message = self.store.fetch(message_id).await?.ok_or(AppError::NotFound)?;
        let username =
            self.directory.profile(user_id).await?.map(|profile| profile.username).unwrap_or_default();

        self.store.add_reaction(message_id, Reaction { user_id, username, emoji }).await?;

        let receiver_ids: Vec<Uuid> = message.receiver_ids().collect();
        self.cache.invalidate_message_views(message.sender_id, &receiver_ids).await;
        Ok(())
    }

    /// No-op when the reaction is absent.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(message_id = %message_id, user_id = %user_id))]
    pub async fn remove_reaction(&self, message_id: Uuid, user_id: Uuid, emoji: &str) -> Result<()> {
        let message = self.store.fetch(message_id).await?.ok_or(AppError::NotFound)?;
        self.store.remove_reaction(message_id, user_id, emoji).await?;

        let receiver_ids: Vec<Uuid> = message.receiver_ids().collect();
        self.cache.invalidate_message_views(message.sender_id, &receiver_ids).await;
        Ok(())
    }

    /// Non-deleted messages addressing the viewer, newest first.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    pub async fn list_received(&self, viewer: Uuid, unread_only: bool, page: Page) -> Result<Vec<Message>> {
        self.store.list_received(viewer, unread_only, page).await
    }
}
