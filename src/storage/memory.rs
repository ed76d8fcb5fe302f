//! Mutex-guarded in-memory backend implementing every storage seam.
//!
//! Substituted for Postgres in the test suite; each mutation holds the single
//! lock for its full read-check-write sequence, giving the same atomicity the
//! SQL implementations get from conditional updates and row locks.

use crate::domain::group::{Group, GroupUpdate};
use crate::domain::message::{DeletionResult, Message, Reaction, ReadReceipt};
use crate::error::{AppError, Result};
use crate::storage::{Directory, FollowGate, GroupStore, MarkReadOutcome, MessageStore, NewGroup, NewMessage, Page, Profile};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<Uuid, (Profile, Vec<String>)>,
    /// (follower, followee) edges.
    follows: HashSet<(Uuid, Uuid)>,
    messages: HashMap<Uuid, Message>,
    groups: HashMap<Uuid, Group>,
    last_sent_at: Option<OffsetDateTime>,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }

    /// Registers a user projection; returns its id.
    pub fn add_user(&self, username: &str, push_tokens: Vec<String>) -> Uuid {
        let id = Uuid::new_v4();
        let profile = Profile { id, username: username.to_string(), profile_image: None };
        self.lock().users.insert(id, (profile, push_tokens));
        id
    }

    pub fn add_follow(&self, follower: Uuid, followee: Uuid) {
        self.lock().follows.insert((follower, followee));
    }

    /// Strictly increasing send times keep listing order deterministic even
    /// when inserts land within one clock tick.
    fn next_sent_at(inner: &mut Inner) -> OffsetDateTime {
        let mut now = OffsetDateTime::now_utc();
        if let Some(last) = inner.last_sent_at {
            if now <= last {
                now = last + time::Duration::microseconds(1);
            }
        }
        inner.last_sent_at = Some(now);
        now
    }

    fn paginate(mut messages: Vec<Message>, page: Page) -> Vec<Message> {
        let offset = usize::try_from(page.offset()).unwrap_or(0);
        let limit = usize::try_from(page.limit).unwrap_or(usize::MAX);
        if offset >= messages.len() {
            return Vec::new();
        }
        messages.drain(..offset);
        messages.truncate(limit);
        messages
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert(&self, new: NewMessage) -> Result<Message> {
        let mut inner = self.lock();
        let sent_at = Self::next_sent_at(&mut inner);
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: new.sender_id,
            group_id: new.group_id,
            payload: new.payload,
            sent_at,
            recipients: new
                .receiver_ids
                .into_iter()
                .map(|user_id| ReadReceipt { user_id, is_read: false, read_at: None })
                .collect(),
            reactions: Vec::new(),
            deleted_by: Vec::new(),
        };
        inner.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Message>> {
        Ok(self.lock().messages.get(&id).cloned())
    }

    async fn mark_read(&self, message_id: Uuid, user_id: Uuid) -> Result<MarkReadOutcome> {
        let mut inner = self.lock();
        let Some(message) = inner.messages.get_mut(&message_id) else {
            return Ok(MarkReadOutcome::AlreadyRead);
        };
        match message.recipients.iter_mut().find(|r| r.user_id == user_id) {
            Some(receipt) if !receipt.is_read => {
                receipt.is_read = true;
                receipt.read_at = Some(OffsetDateTime::now_utc());
                Ok(MarkReadOutcome::Updated)
            }
            _ => Ok(MarkReadOutcome::AlreadyRead),
        }
    }

    async fn delete_for_user(&self, message_id: Uuid, user_id: Uuid) -> Result<DeletionResult> {
        let mut inner = self.lock();
        let Some(message) = inner.messages.get_mut(&message_id) else {
            return Err(AppError::NotFound);
        };

        if !message.is_party(user_id) {
            return Err(AppError::Forbidden("Not a party to this message".to_string()));
        }

        if !message.deleted_by.contains(&user_id) {
            message.deleted_by.push(user_id);
        }

        let sender_id = message.sender_id;
        let receiver_ids: Vec<Uuid> = message.receiver_ids().collect();
        let covered = message.deleted_by.contains(&sender_id)
            && receiver_ids.iter().all(|receiver| message.deleted_by.contains(receiver));

        let unlink_paths = if covered {
            let removed = inner.messages.remove(&message_id).expect("present under lock");
            removed.payload.file_path.into_iter().chain(removed.payload.attached_image).collect()
        } else {
            Vec::new()
        };

        Ok(DeletionResult { physically_deleted: covered, sender_id, receiver_ids, unlink_paths })
    }

    async fn add_reaction(&self, message_id: Uuid, reaction: Reaction) -> Result<()> {
        let mut inner = self.lock();
        let Some(message) = inner.messages.get_mut(&message_id) else {
            return Err(AppError::NotFound);
        };
        if message.reactions.iter().any(|r| r.user_id == reaction.user_id && r.emoji == reaction.emoji) {
            return Err(AppError::Duplicate("Reaction already exists".to_string()));
        }
        message.reactions.push(reaction);
        Ok(())
    }

    async fn remove_reaction(&self, message_id: Uuid, user_id: Uuid, emoji: &str) -> Result<()> {
        let mut inner = self.lock();
        if let Some(message) = inner.messages.get_mut(&message_id) {
            message.reactions.retain(|r| !(r.user_id == user_id && r.emoji == emoji));
        }
        Ok(())
    }

    async fn list_received(&self, viewer: Uuid, unread_only: bool, page: Page) -> Result<Vec<Message>> {
        let inner = self.lock();
        let mut messages: Vec<Message> = inner
            .messages
            .values()
            .filter(|m| m.group_id.is_none() && m.visible_to(viewer))
            .filter(|m| {
                m.read_receipt(viewer).is_some_and(|receipt| !unread_only || !receipt.is_read)
            })
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(Self::paginate(messages, page))
    }

    async fn list_direct_involving(&self, viewer: Uuid) -> Result<Vec<Message>> {
        let inner = self.lock();
        let mut messages: Vec<Message> = inner
            .messages
            .values()
            .filter(|m| m.group_id.is_none() && m.visible_to(viewer))
            .filter(|m| m.sender_id == viewer || m.read_receipt(viewer).is_some())
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(messages)
    }

    async fn list_thread(&self, viewer: Uuid, partner: Uuid) -> Result<Vec<Message>> {
        let inner = self.lock();
        let mut messages: Vec<Message> = inner
            .messages
            .values()
            .filter(|m| m.group_id.is_none() && m.visible_to(viewer))
            .filter(|m| {
                (m.sender_id == viewer && m.read_receipt(partner).is_some())
                    || (m.sender_id == partner && m.read_receipt(viewer).is_some())
            })
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.sent_at.cmp(&b.sent_at));
        Ok(messages)
    }

    async fn list_group(&self, group_id: Uuid, viewer: Uuid, page: Page) -> Result<(Vec<Message>, i64)> {
        let inner = self.lock();
        let mut messages: Vec<Message> = inner
            .messages
            .values()
            .filter(|m| m.group_id == Some(group_id) && m.visible_to(viewer))
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        let total = messages.len() as i64;
        Ok((Self::paginate(messages, page), total))
    }

    async fn latest_group_message(&self, group_id: Uuid) -> Result<Option<Message>> {
        let inner = self.lock();
        Ok(inner
            .messages
            .values()
            .filter(|m| m.group_id == Some(group_id))
            .max_by_key(|m| m.sent_at)
            .cloned())
    }

    async fn unread_group_count(&self, group_id: Uuid, viewer: Uuid) -> Result<i64> {
        let inner = self.lock();
        let count = inner
            .messages
            .values()
            .filter(|m| m.group_id == Some(group_id) && m.visible_to(viewer))
            .filter(|m| m.read_receipt(viewer).is_some_and(|receipt| !receipt.is_read))
            .count();
        Ok(count as i64)
    }

    async fn purge_group(&self, group_id: Uuid) -> Result<Vec<String>> {
        let mut inner = self.lock();
        let ids: Vec<Uuid> =
            inner.messages.values().filter(|m| m.group_id == Some(group_id)).map(|m| m.id).collect();
        let mut paths = Vec::new();
        for id in ids {
            if let Some(removed) = inner.messages.remove(&id) {
                paths.extend(removed.payload.file_path);
                paths.extend(removed.payload.attached_image);
            }
        }
        Ok(paths)
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn create(&self, group: NewGroup) -> Result<Group> {
        let mut inner = self.lock();
        let mut members = vec![group.admin_id];
        for id in group.member_ids {
            if !members.contains(&id) {
                members.push(id);
            }
        }
        let now = OffsetDateTime::now_utc();
        let created = Group {
            id: Uuid::new_v4(),
            name: group.name,
            description: group.description,
            icon_image: group.icon_image,
            admin_id: group.admin_id,
            members,
            created_at: now,
            updated_at: now,
        };
        inner.groups.insert(created.id, created.clone());
        Ok(created)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<Group>> {
        Ok(self.lock().groups.get(&id).cloned())
    }

    async fn update(&self, id: Uuid, update: GroupUpdate) -> Result<Group> {
        let mut inner = self.lock();
        let group = inner.groups.get_mut(&id).ok_or(AppError::NotFound)?;
        if let Some(name) = update.name {
            group.name = name;
        }
        if let Some(description) = update.description {
            group.description = description;
        }
        if let Some(icon) = update.icon_image {
            group.icon_image = Some(icon);
        }
        group.updated_at = OffsetDateTime::now_utc();
        Ok(group.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.lock().groups.remove(&id);
        Ok(())
    }

    async fn add_member(&self, group_id: Uuid, user_id: Uuid) -> Result<()> {
        let mut inner = self.lock();
        let group = inner.groups.get_mut(&group_id).ok_or(AppError::NotFound)?;
        if group.members.contains(&user_id) {
            return Err(AppError::Duplicate("Already a member of this group".to_string()));
        }
        group.members.push(user_id);
        Ok(())
    }

    async fn remove_member(&self, group_id: Uuid, user_id: Uuid) -> Result<()> {
        let mut inner = self.lock();
        if let Some(group) = inner.groups.get_mut(&group_id) {
            group.members.retain(|m| *m != user_id);
        }
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Group>> {
        let inner = self.lock();
        let mut groups: Vec<Group> =
            inner.groups.values().filter(|g| g.is_member(user_id)).cloned().collect();
        groups.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(groups)
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        Ok(self.lock().users.get(&user_id).map(|(profile, _)| profile.clone()))
    }

    async fn profiles(&self, user_ids: &[Uuid]) -> Result<HashMap<Uuid, Profile>> {
        let inner = self.lock();
        Ok(user_ids
            .iter()
            .filter_map(|id| inner.users.get(id).map(|(profile, _)| (*id, profile.clone())))
            .collect())
    }

    async fn exists(&self, user_id: Uuid) -> Result<bool> {
        Ok(self.lock().users.contains_key(&user_id))
    }

    async fn push_tokens(&self, user_ids: &[Uuid]) -> Result<Vec<String>> {
        let inner = self.lock();
        Ok(user_ids
            .iter()
            .filter_map(|id| inner.users.get(id))
            .flat_map(|(_, tokens)| tokens.iter().cloned())
            .collect())
    }
}

#[async_trait]
impl FollowGate for MemoryStore {
    async fn is_following(&self, follower: Uuid, followee: Uuid) -> Result<bool> {
        Ok(self.lock().follows.contains(&(follower, followee)))
    }
}
