use crate::domain::group::{Group, GroupUpdate};
use crate::domain::message::{DeletionResult, Message, MessagePayload, Reaction};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::collections::HashMap;
use uuid::Uuid;

pub mod memory;
pub mod postgres;
pub mod records;

pub type DbPool = Pool<Postgres>;

/// Initializes the database connection pool.
///
/// # Errors
/// Returns `sqlx::Error` if the connection fails.
pub async fn init_pool(database_url: &str) -> std::result::Result<DbPool, sqlx::Error> {
    PgPoolOptions::new().max_connections(20).connect(database_url).await
}

/// A message about to be persisted. Direct messages carry receivers and no
/// group; group messages carry the member fan-out plus the group id.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub group_id: Option<Uuid>,
    /// Ordered; recipient positions are assigned from this order.
    pub receiver_ids: Vec<Uuid>,
    pub payload: MessagePayload,
    /// Per-recipient wrapped keys of the encrypted variant; opaque here.
    pub wrapped_keys: HashMap<Uuid, Vec<u8>>,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    /// Clamps the raw query parameters: page >= 1, 1 <= limit <= max.
    #[must_use]
    pub fn clamped(page: Option<i64>, limit: Option<i64>, default_limit: i64, max_limit: i64) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, max_limit),
        }
    }

    #[must_use]
    pub const fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkReadOutcome {
    Updated,
    AlreadyRead,
}

/// Persistence seam for the message lifecycle. Mutating operations that
/// read-then-write one record (read state, deletions, reactions) must be
/// atomic inside the implementation; callers never compose them from
/// separate reads and writes.
#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug + 'static {
    async fn insert(&self, new: NewMessage) -> Result<Message>;

    /// Fetches a message with recipients and reactions, regardless of
    /// per-party deletion state. `None` when physically absent.
    async fn fetch(&self, id: Uuid) -> Result<Option<Message>>;

    /// Conditionally flips one recipient entry to read. Idempotent: an
    /// already-read entry is left untouched and `read_at` keeps its original
    /// value.
    async fn mark_read(&self, message_id: Uuid, user_id: Uuid) -> Result<MarkReadOutcome>;

    /// Adds `user_id` to the deleted-by set and evaluates coverage of the
    /// full party set under a single transaction. On full coverage the
    /// record is removed and its stored file paths are reported back for
    /// unlinking.
    ///
    /// # Errors
    /// `NotFound` for unknown ids, `Forbidden` when `user_id` is not a party.
    async fn delete_for_user(&self, message_id: Uuid, user_id: Uuid) -> Result<DeletionResult>;

    /// # Errors
    /// `Duplicate` when the (user, emoji) pair already exists.
    async fn add_reaction(&self, message_id: Uuid, reaction: Reaction) -> Result<()>;

    /// No-op when the pair is absent.
    async fn remove_reaction(&self, message_id: Uuid, user_id: Uuid, emoji: &str) -> Result<()>;

    /// Non-deleted direct messages addressing `viewer`, newest first.
    async fn list_received(&self, viewer: Uuid, unread_only: bool, page: Page) -> Result<Vec<Message>>;

    /// Every non-deleted direct message the viewer sent or received; the
    /// thread aggregator derives conversation views from this flat list.
    async fn list_direct_involving(&self, viewer: Uuid) -> Result<Vec<Message>>;

    /// Both directions of one conversation, ascending by send time.
    async fn list_thread(&self, viewer: Uuid, partner: Uuid) -> Result<Vec<Message>>;

    /// One page of a group's messages, newest first, plus the total count.
    async fn list_group(&self, group_id: Uuid, viewer: Uuid, page: Page) -> Result<(Vec<Message>, i64)>;

    /// Latest non-deleted message of a group, if any.
    async fn latest_group_message(&self, group_id: Uuid) -> Result<Option<Message>>;

    /// Unread message count for `viewer` within a group.
    async fn unread_group_count(&self, group_id: Uuid, viewer: Uuid) -> Result<i64>;

    /// Removes every message of a group, returning stored file paths for
    /// unlinking. Used when the admin deletes the group.
    async fn purge_group(&self, group_id: Uuid) -> Result<Vec<String>>;
}

#[async_trait]
pub trait GroupStore: Send + Sync + std::fmt::Debug + 'static {
    async fn create(&self, group: NewGroup) -> Result<Group>;
    async fn fetch(&self, id: Uuid) -> Result<Option<Group>>;
    async fn update(&self, id: Uuid, update: GroupUpdate) -> Result<Group>;
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// # Errors
    /// `Duplicate` when the user is already a member.
    async fn add_member(&self, group_id: Uuid, user_id: Uuid) -> Result<()>;
    async fn remove_member(&self, group_id: Uuid, user_id: Uuid) -> Result<()>;

    /// Groups the user belongs to, most recently updated first.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Group>>;
}

#[derive(Debug, Clone)]
pub struct NewGroup {
    pub name: String,
    pub description: String,
    pub icon_image: Option<String>,
    pub admin_id: Uuid,
    /// May or may not include the admin; the store deduplicates and always
    /// seats the admin first.
    pub member_ids: Vec<Uuid>,
}

/// Read-only projection of the external account system.
#[derive(Debug, Clone)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub profile_image: Option<String>,
}

#[async_trait]
pub trait Directory: Send + Sync + std::fmt::Debug + 'static {
    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>>;
    async fn profiles(&self, user_ids: &[Uuid]) -> Result<HashMap<Uuid, Profile>>;
    async fn exists(&self, user_id: Uuid) -> Result<bool>;

    /// Device push tokens across the given users, for notification fan-out.
    async fn push_tokens(&self, user_ids: &[Uuid]) -> Result<Vec<String>>;
}

/// External follow-relationship check gating direct sends.
#[async_trait]
pub trait FollowGate: Send + Sync + std::fmt::Debug + 'static {
    /// Whether `follower` has an established follow edge to `followee`.
    async fn is_following(&self, follower: Uuid, followee: Uuid) -> Result<bool>;
}
