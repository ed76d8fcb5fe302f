use crate::domain::group::{Group, GroupUpdate};
use crate::domain::message::{Message, MessagePayload};
use crate::domain::notification::{PushData, PushNote};
use crate::error::{AppError, Result};
use crate::services::files::FileStore;
use crate::services::push::{self, NotificationSink};
use crate::storage::{Directory, GroupStore, MessageStore, NewGroup, NewMessage, Page};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Group membership plus message fan-out across the member set.
#[derive(Clone, Debug)]
pub struct GroupService {
    groups: Arc<dyn GroupStore>,
    messages: Arc<dyn MessageStore>,
    directory: Arc<dyn Directory>,
    files: Arc<dyn FileStore>,
    sink: Arc<dyn NotificationSink>,
}

/// A group joined with its latest message and the viewer's unread count.
#[derive(Debug)]
pub struct GroupOverview {
    pub group: Group,
    pub last_message: Option<Message>,
    pub unread_count: i64,
}

impl GroupService {
    #[must_use]
    pub fn new(
        groups: Arc<dyn GroupStore>,
        messages: Arc<dyn MessageStore>,
        directory: Arc<dyn Directory>,
        files: Arc<dyn FileStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self { groups, messages, directory, files, sink }
    }

    async fn fetch_group(&self, group_id: Uuid) -> Result<Group> {
        self.groups.fetch(group_id).await?.ok_or(AppError::NotFound)
    }

    fn require_member(group: &Group, user_id: Uuid) -> Result<()> {
        if group.is_member(user_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden("Not a member of this group".to_string()))
        }
    }

    fn require_admin(group: &Group, user_id: Uuid) -> Result<()> {
        if group.is_admin(user_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden("Only the group admin may do this".to_string()))
        }
    }

    /// # Errors
    /// Returns `AppError::BadRequest` for a blank group name.
    #[tracing::instrument(err(level = "warn"), skip(self, description, member_ids, icon_image), fields(admin_id = %admin_id))]
    pub async fn create(
        &self,
        admin_id: Uuid,
        name: String,
        description: String,
        member_ids: Vec<Uuid>,
        icon_image: Option<String>,
    ) -> Result<Group> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::BadRequest("Group name is required".to_string()));
        }

        self.groups
            .create(NewGroup { name, description: description.trim().to_string(), icon_image, admin_id, member_ids })
            .await
    }

    /// Groups the viewer belongs to, each with last-message and unread
    /// metadata, most recently updated first.
    ///
    /// # Errors
    /// Returns `AppError::Database` if a query fails.
    pub async fn my_groups(&self, viewer: Uuid) -> Result<Vec<GroupOverview>> {
        let groups = self.groups.list_for_user(viewer).await?;

        let mut overviews = Vec::with_capacity(groups.len());
        for group in groups {
            let last_message = self.messages.latest_group_message(group.id).await?;
            let unread_count = self.messages.unread_group_count(group.id, viewer).await?;
            overviews.push(GroupOverview { group, last_message, unread_count });
        }
        Ok(overviews)
    }

    /// # Errors
    /// `NotFound` for unknown groups, `Forbidden` for non-members.
    pub async fn get(&self, viewer: Uuid, group_id: Uuid) -> Result<Group> {
        let group = self.fetch_group(group_id).await?;
        Self::require_member(&group, viewer)?;
        Ok(group)
    }

    /// # Errors
    /// `Forbidden` unless the caller is the group admin.
    #[tracing::instrument(err(level = "warn"), skip(self, update), fields(group_id = %group_id, user_id = %user_id))]
    pub async fn update(&self, user_id: Uuid, group_id: Uuid, update: GroupUpdate) -> Result<Group> {
        let group = self.fetch_group(group_id).await?;
        Self::require_admin(&group, user_id)?;

        // A replaced icon leaves no orphan behind.
        if update.icon_image.is_some() {
            if let Some(old_icon) = &group.icon_image {
                if let Err(e) = self.files.unlink(old_icon).await {
                    tracing::warn!(path = %old_icon, error = %e, "Failed to unlink replaced group icon");
                }
            }
        }

        self.groups.update(group_id, update).await
    }

    /// Deletes the group together with its messages and stored files.
    ///
    /// # Errors
    /// `Forbidden` unless the caller is the group admin.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(group_id = %group_id, user_id = %user_id))]
    pub async fn delete(&self, user_id: Uuid, group_id: Uuid) -> Result<()> {
        let group = self.fetch_group(group_id).await?;
        Self::require_admin(&group, user_id)?;

        let mut paths = self.messages.purge_group(group_id).await?;
        paths.extend(group.icon_image.clone());
        for path in &paths {
            if let Err(e) = self.files.unlink(path).await {
                tracing::warn!(path = %path, error = %e, "Failed to unlink stored file");
            }
        }

        self.groups.delete(group_id).await
    }

    /// # Errors
    /// `Duplicate` when the user already belongs to the group, `NotFound`
    /// when the user does not resolve.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(group_id = %group_id, admin_id = %admin_id, user_id = %user_id))]
    pub async fn add_member(&self, admin_id: Uuid, group_id: Uuid, user_id: Uuid) -> Result<()> {
        let group = self.fetch_group(group_id).await?;
        Self::require_admin(&group, admin_id)?;

        if !self.directory.exists(user_id).await? {
            return Err(AppError::NotFound);
        }
        self.groups.add_member(group_id, user_id).await
    }

    /// The admin may remove anyone; a member may remove themself. The admin
    /// cannot leave before transferring ownership.
    ///
    /// # Errors
    /// `Forbidden` or `BadRequest` per the rules above.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(group_id = %group_id, requester_id = %requester_id, user_id = %user_id))]
    pub async fn remove_member(&self, requester_id: Uuid, group_id: Uuid, user_id: Uuid) -> Result<()> {
        let group = self.fetch_group(group_id).await?;

        let is_admin = group.is_admin(requester_id);
        let is_self = requester_id == user_id;
        if !is_admin && !is_self {
            return Err(AppError::Forbidden("Only the group admin may remove other members".to_string()));
        }
        if is_self && group.is_admin(user_id) {
            return Err(AppError::BadRequest(
                "The admin cannot leave the group before transferring ownership".to_string(),
            ));
        }

        self.groups.remove_member(group_id, user_id).await
    }

    /// Fans a message out to every member except the sender.
    ///
    /// # Errors
    /// `Forbidden` for non-members, `BadRequest` for an empty payload.
    #[tracing::instrument(err(level = "warn"), skip(self, payload), fields(group_id = %group_id, sender_id = %sender_id))]
    pub async fn send_message(&self, sender_id: Uuid, group_id: Uuid, payload: MessagePayload) -> Result<Message> {
        let group = self.fetch_group(group_id).await?;
        Self::require_member(&group, sender_id)?;

        if payload.is_empty() {
            return Err(AppError::BadRequest("Message payload is empty".to_string()));
        }

        let receiver_ids = group.receivers_for(sender_id);
        let message = self
            .messages
            .insert(NewMessage {
                sender_id,
                group_id: Some(group_id),
                receiver_ids: receiver_ids.clone(),
                payload,
                wrapped_keys: HashMap::new(),
            })
            .await?;

        // Group pushes are titled with the group name, not the sender.
        let sender_name = self
            .directory
            .profile(sender_id)
            .await?
            .map_or_else(|| "Someone".to_string(), |profile| profile.username);
        let note = PushNote { title: group.name.clone(), body: format!("{sender_name}: {}", message.preview()) };
        let data = PushData::from([
            ("type".to_string(), "group_message".to_string()),
            ("groupId".to_string(), group_id.to_string()),
        ]);
        push::dispatch(Arc::clone(&self.sink), Arc::clone(&self.directory), receiver_ids, note, data);

        Ok(message)
    }

    /// One page of the group conversation in chat-display (ascending) order,
    /// plus the total message count.
    ///
    /// # Errors
    /// `Forbidden` for non-members.
    pub async fn list_messages(&self, viewer: Uuid, group_id: Uuid, page: Page) -> Result<(Vec<Message>, i64)> {
        let group = self.fetch_group(group_id).await?;
        Self::require_member(&group, viewer)?;

        let (mut messages, total) = self.messages.list_group(group_id, viewer, page).await?;
        messages.reverse();
        Ok((messages, total))
    }

    /// Same semantics as the direct-message read mark, scoped to the group.
    ///
    /// # Errors
    /// `NotFound` when the message does not belong to the group, `Forbidden`
    /// when the viewer holds no read entry.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(group_id = %group_id, message_id = %message_id, viewer = %viewer))]
    pub async fn mark_read(&self, viewer: Uuid, group_id: Uuid, message_id: Uuid) -> Result<()> {
        let message = self.messages.fetch(message_id).await?.ok_or(AppError::NotFound)?;
        if message.group_id != Some(group_id) {
            return Err(AppError::NotFound);
        }
        if message.read_receipt(viewer).is_none() {
            return Err(AppError::Forbidden("No read entry for this message".to_string()));
        }

        self.messages.mark_read(message_id, viewer).await?;
        Ok(())
    }
}
