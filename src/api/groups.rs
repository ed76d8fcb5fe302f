use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::api::schemas::Pagination;
use crate::api::schemas::groups::{
    AddMemberRequest, CreateGroupRequest, GroupMessageView, GroupMessagesQuery, GroupSummaryView, GroupTextRequest,
    GroupView, UpdateGroupRequest,
};
use crate::api::messages::{read_voice_form, store_voice_payload};
use crate::domain::group::{Group, GroupUpdate};
use crate::domain::message::MessagePayload;
use crate::error::{AppError, Result};
use crate::storage::{Page, Profile};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

async fn member_profiles(state: &AppState, group: &Group) -> Result<HashMap<Uuid, Profile>> {
    state.directory.profiles(&group.members).await
}

/// Lists the caller's groups with last-message and unread metadata.
pub async fn my_groups(auth_user: AuthUser, State(state): State<AppState>) -> Result<impl IntoResponse> {
    let overviews = state.group_service.my_groups(auth_user.user_id).await?;

    let mut ids: Vec<Uuid> = Vec::new();
    for overview in &overviews {
        ids.extend(&overview.group.members);
        if let Some(message) = &overview.last_message {
            ids.push(message.sender_id);
        }
    }
    let profiles = state.directory.profiles(&ids).await?;

    let views: Vec<GroupSummaryView> =
        overviews.iter().map(|overview| GroupSummaryView::build(overview, &profiles)).collect();
    Ok(Json(json!({ "groups": views })))
}

/// Creates a group; the caller becomes its admin.
pub async fn create_group(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse> {
    let group = state
        .group_service
        .create(auth_user.user_id, request.name, request.description.unwrap_or_default(), request.member_ids, None)
        .await?;

    let profiles = member_profiles(&state, &group).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Group created", "group": GroupView::build(&group, &profiles) })),
    ))
}

/// Group detail; members only.
pub async fn get_group(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let group = state.group_service.get(auth_user.user_id, group_id).await?;
    let profiles = member_profiles(&state, &group).await?;
    Ok(Json(json!({ "group": GroupView::build(&group, &profiles) })))
}

/// Renames or re-describes a group; admin only.
pub async fn update_group(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Json(request): Json<UpdateGroupRequest>,
) -> Result<impl IntoResponse> {
    let update = GroupUpdate {
        name: request.name.map(|name| name.trim().to_string()),
        description: request.description.map(|description| description.trim().to_string()),
        icon_image: None,
    };
    if let Some(name) = &update.name {
        if name.is_empty() {
            return Err(AppError::BadRequest("Group name is required".to_string()));
        }
    }

    let group = state.group_service.update(auth_user.user_id, group_id, update).await?;
    let profiles = member_profiles(&state, &group).await?;
    Ok(Json(json!({ "message": "Group updated", "group": GroupView::build(&group, &profiles) })))
}

/// Deletes a group with its messages and files; admin only.
pub async fn delete_group(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.group_service.delete(auth_user.user_id, group_id).await?;
    Ok(Json(json!({ "message": "Group deleted" })))
}

/// Adds a member; admin only.
pub async fn add_member(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Json(request): Json<AddMemberRequest>,
) -> Result<impl IntoResponse> {
    state.group_service.add_member(auth_user.user_id, group_id, request.user_id).await?;
    Ok(Json(json!({ "message": "Member added" })))
}

/// Removes a member (admin) or leaves the group (self).
pub async fn remove_member(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    state.group_service.remove_member(auth_user.user_id, group_id, user_id).await?;
    Ok(Json(json!({ "message": "Member removed" })))
}

/// One page of the group conversation, in chat-display order.
pub async fn list_messages(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Query(query): Query<GroupMessagesQuery>,
) -> Result<impl IntoResponse> {
    let viewer = auth_user.user_id;
    let page = Page::clamped(
        query.page(),
        query.limit(),
        state.config.messaging.default_page_size,
        state.config.messaging.max_page_size,
    );

    let (messages, total) = state.group_service.list_messages(viewer, group_id, page).await?;

    let sender_ids: Vec<Uuid> = messages.iter().map(|m| m.sender_id).collect();
    let profiles = state.directory.profiles(&sender_ids).await?;
    let views: Vec<GroupMessageView> =
        messages.iter().map(|m| GroupMessageView::build(m, viewer, &profiles)).collect();

    Ok(Json(json!({
        "messages": views,
        "pagination": Pagination::new(total, page.page, page.limit),
    })))
}

/// Sends a text message into the group.
pub async fn send_text(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Json(request): Json<GroupTextRequest>,
) -> Result<impl IntoResponse> {
    let payload = MessagePayload::text(request.text_content.trim().to_string());
    let message = state.group_service.send_message(auth_user.user_id, group_id, payload).await?;

    Ok((StatusCode::CREATED, Json(json!({ "message": "Message sent", "messageId": message.id }))))
}

/// Sends a voice message into the group.
pub async fn send_voice(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let form = read_voice_form(multipart).await?;
    let payload = store_voice_payload(&state, form).await?;
    let message = state.group_service.send_message(auth_user.user_id, group_id, payload).await?;

    Ok((StatusCode::CREATED, Json(json!({ "message": "Voice message sent", "messageId": message.id }))))
}

/// Marks a group message read for the caller.
pub async fn mark_read(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((group_id, message_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    state.group_service.mark_read(auth_user.user_id, group_id, message_id).await?;
    Ok(Json(json!({ "success": true })))
}
