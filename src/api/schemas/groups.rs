use crate::api::schemas::UserRef;
use crate::domain::group::Group;
use crate::domain::message::Message;
use crate::services::group_service::GroupOverview;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupTextRequest {
    pub text_content: String,
}

/// Raw paging parameters, parsed leniently like the message listings.
#[derive(Debug, Deserialize)]
pub struct GroupMessagesQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl GroupMessagesQuery {
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
pub struct GroupView {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub icon_image: Option<String>,
    pub admin: Option<UserRef>,
    pub members: Vec<UserRef>,
    pub members_count: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl GroupView {
    #[must_use]
    pub fn build(group: &Group, profiles: &HashMap<Uuid, crate::storage::Profile>) -> Self {
        Self {
            id: group.id,
            name: group.name.clone(),
            description: group.description.clone(),
            icon_image: group.icon_image.clone(),
            admin: profiles.get(&group.admin_id).cloned().map(Into::into),
            members: group.members.iter().filter_map(|id| profiles.get(id).cloned().map(Into::into)).collect(),
            members_count: group.members.len(),
            created_at: group.created_at,
            updated_at: group.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupLastMessage {
    pub message_type: String,
    pub text_content: Option<String>,
    pub sender_username: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
}

/// Entry of the my-groups listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummaryView {
    #[serde(flatten)]
    pub group: GroupView,
    pub last_message: Option<GroupLastMessage>,
    pub unread_count: i64,
}

impl GroupSummaryView {
    #[must_use]
    pub fn build(overview: &GroupOverview, profiles: &HashMap<Uuid, crate::storage::Profile>) -> Self {
        Self {
            group: GroupView::build(&overview.group, profiles),
            last_message: overview.last_message.as_ref().map(|message| GroupLastMessage {
                message_type: message.payload.kind.as_str().to_string(),
                text_content: message.payload.text_content.clone(),
                sender_username: profiles.get(&message.sender_id).map(|p| p.username.clone()),
                sent_at: message.sent_at,
            }),
            unread_count: overview.unread_count,
        }
    }
}

/// Entry of the group conversation listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessageView {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub sender: Option<UserRef>,
    pub message_type: String,
    pub text_content: Option<String>,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub duration: Option<i32>,
    pub mime_type: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
    pub is_mine: bool,
    pub is_read: bool,
}

impl GroupMessageView {
    #[must_use]
    pub fn build(message: &Message, viewer: Uuid, profiles: &HashMap<Uuid, crate::storage::Profile>) -> Self {
        Self {
            id: message.id,
            sender: profiles.get(&message.sender_id).cloned().map(Into::into),
            message_type: message.payload.kind.as_str().to_string(),
            text_content: message.payload.text_content.clone(),
            file_path: message.payload.file_path.clone(),
            file_size: message.payload.file_size,
            duration: message.payload.duration_secs,
            mime_type: message.payload.mime_type.clone(),
            sent_at: message.sent_at,
            is_mine: message.sender_id == viewer,
            is_read: message.read_receipt(viewer).is_some_and(|r| r.is_read),
        }
    }
}
