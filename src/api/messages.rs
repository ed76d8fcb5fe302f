use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::api::schemas::messages::{
    ReactionRequest, ReceivedMessage, ReceivedQuery, SendTextRequest, SentMessage, ThreadMessage, ThreadView,
};
use crate::cache::keys;
use crate::domain::message::MessagePayload;
use crate::error::{AppError, Result};
use crate::storage::Page;
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::Engine;
use bytes::Bytes;
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

const ALLOWED_AUDIO_TYPES: &[&str] =
    &["audio/mpeg", "audio/mp4", "audio/x-m4a", "audio/wav", "audio/webm", "audio/ogg"];

#[derive(Debug, Default)]
pub(crate) struct VoiceForm {
    pub voice: Option<(String, String, Bytes)>,
    pub thumbnail: Option<(String, Bytes)>,
    pub receivers_json: Option<String>,
    pub duration: Option<i32>,
}

pub(crate) async fn read_voice_form(mut multipart: Multipart) -> Result<VoiceForm> {
    let mut form = VoiceForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "voice" => {
                let filename = field.file_name().unwrap_or("voice").to_string();
                let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
                let bytes =
                    field.bytes().await.map_err(|e| AppError::BadRequest(format!("Malformed upload: {e}")))?;
                form.voice = Some((filename, content_type, bytes));
            }
            "thumbnail" => {
                let filename = field.file_name().unwrap_or("thumbnail").to_string();
                let bytes =
                    field.bytes().await.map_err(|e| AppError::BadRequest(format!("Malformed upload: {e}")))?;
                form.thumbnail = Some((filename, bytes));
            }
            "receivers" => {
                form.receivers_json = Some(
                    field.text().await.map_err(|e| AppError::BadRequest(format!("Malformed field: {e}")))?,
                );
            }
            "duration" => {
                let text =
                    field.text().await.map_err(|e| AppError::BadRequest(format!("Malformed field: {e}")))?;
                form.duration = text.trim().parse().ok();
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Persists the uploaded clip (and optional thumbnail) and assembles the
/// voice payload, enforcing the audio allowlist and size cap.
pub(crate) async fn store_voice_payload(state: &AppState, form: VoiceForm) -> Result<MessagePayload> {
    let (filename, content_type, bytes) =
        form.voice.ok_or_else(|| AppError::BadRequest("Upload a voice file".to_string()))?;

    if !ALLOWED_AUDIO_TYPES.contains(&content_type.as_str()) {
        return Err(AppError::BadRequest("Only audio uploads are allowed".to_string()));
    }
    if bytes.len() > state.config.uploads.max_voice_bytes {
        return Err(AppError::BadRequest("Voice clip is too large".to_string()));
    }

    let file_size = bytes.len() as i64;
    let file_path = state.files.save(&filename, bytes).await?;

    let attached_image = match form.thumbnail {
        Some((thumb_name, thumb_bytes)) => Some(state.files.save(&thumb_name, thumb_bytes).await?),
        None => None,
    };

    Ok(MessagePayload::voice(file_path, file_size, form.duration, content_type, attached_image))
}

fn parse_receivers(raw: Option<String>) -> Result<Vec<Uuid>> {
    let raw = raw.ok_or_else(|| AppError::BadRequest("Specify at least one receiver".to_string()))?;
    serde_json::from_str(&raw).map_err(|_| AppError::BadRequest("Receiver list is malformed".to_string()))
}

fn cached_json(bytes: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], bytes).into_response()
}

/// Sends a voice message to the selected receivers.
///
/// # Errors
/// Returns `AppError::BadRequest` for missing or non-audio uploads.
/// Returns `AppError::Forbidden` for receivers outside the follow relation.
pub async fn send_voice(
    auth_user: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut form = read_voice_form(multipart).await?;
    let receivers = parse_receivers(form.receivers_json.take())?;
    let payload = store_voice_payload(&state, form).await?;

    let message =
        state.message_service.send_direct(auth_user.user_id, receivers, payload, HashMap::new()).await?;

    Ok((StatusCode::CREATED, Json(json!({ "message": "Message sent", "messageId": message.id }))))
}

/// Sends a text (or opaque encrypted) message.
///
/// # Errors
/// Returns `AppError::BadRequest` when both content and ciphertext are
/// missing or malformed.
pub async fn send_text(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<SendTextRequest>,
) -> Result<impl IntoResponse> {
    let payload = match (&request.ciphertext, &request.content) {
        (Some(ciphertext), _) => {
            let blob = base64::engine::general_purpose::STANDARD
                .decode(ciphertext)
                .map_err(|_| AppError::BadRequest("Ciphertext is not valid base64".to_string()))?;
            MessagePayload::encrypted(blob)
        }
        (None, Some(content)) => MessagePayload::text(content.trim().to_string()),
        (None, None) => return Err(AppError::BadRequest("Message content is required".to_string())),
    };

    let mut wrapped_keys = HashMap::new();
    for (user_id, encoded) in &request.wrapped_keys {
        let key = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| AppError::BadRequest("Wrapped key is not valid base64".to_string()))?;
        wrapped_keys.insert(*user_id, key);
    }

    let message =
        state.message_service.send_direct(auth_user.user_id, request.receivers, payload, wrapped_keys).await?;

    Ok((StatusCode::CREATED, Json(json!({ "success": true, "data": SentMessage::from(&message) }))))
}

/// Lists messages addressed to the caller, newest first.
pub async fn received(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ReceivedQuery>,
) -> Result<Response> {
    let viewer = auth_user.user_id;
    let unread_only = query.unread_only();
    let page = Page::clamped(
        query.page(),
        query.limit(),
        state.config.messaging.default_page_size,
        state.config.messaging.max_page_size,
    );

    let cache_key = keys::received(viewer, page.page, page.limit, unread_only);
    if let Some(bytes) = state.cache.get(&cache_key).await {
        return Ok(cached_json(bytes));
    }

    let messages = state.message_service.list_received(viewer, unread_only, page).await?;

    let sender_ids: Vec<Uuid> = messages.iter().map(|m| m.sender_id).collect();
    let profiles = state.directory.profiles(&sender_ids).await?;
    let views: Vec<ReceivedMessage> =
        messages.iter().map(|m| ReceivedMessage::build(m, viewer, &profiles)).collect();

    let body = json!({ "messages": views });
    if let Ok(bytes) = serde_json::to_vec(&body) {
        state.cache.set(&cache_key, &bytes, state.cache.threads_ttl_secs).await;
    }
    Ok(Json(body).into_response())
}

/// Lists the caller's conversation threads, most recent first.
pub async fn threads(auth_user: AuthUser, State(state): State<AppState>) -> Result<Response> {
    let viewer = auth_user.user_id;

    let cache_key = keys::threads(viewer);
    if let Some(bytes) = state.cache.get(&cache_key).await {
        return Ok(cached_json(bytes));
    }

    let summaries = state.thread_service.list_threads(viewer).await?;

    let partner_ids: Vec<Uuid> = summaries.iter().map(|t| t.partner_id).collect();
    let profiles = state.directory.profiles(&partner_ids).await?;
    let views: Vec<ThreadView> = summaries.iter().map(|t| ThreadView::build(t, &profiles)).collect();

    let body = json!({ "threads": views });
    if let Ok(bytes) = serde_json::to_vec(&body) {
        state.cache.set(&cache_key, &bytes, state.cache.threads_ttl_secs).await;
    }
    Ok(Json(body).into_response())
}

/// One conversation in chat order. Unknown partners yield an empty list.
pub async fn thread_detail(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(partner_id): Path<Uuid>,
) -> Result<Response> {
    let viewer = auth_user.user_id;

    let cache_key = keys::thread(viewer, partner_id);
    if let Some(bytes) = state.cache.get(&cache_key).await {
        return Ok(cached_json(bytes));
    }

    let messages = state.thread_service.thread_messages(viewer, partner_id).await?;
    let views: Vec<ThreadMessage> =
        messages.iter().map(|m| ThreadMessage::build(m, viewer, partner_id)).collect();

    let body = json!({ "messages": views });
    if let Ok(bytes) = serde_json::to_vec(&body) {
        state.cache.set(&cache_key, &bytes, state.cache.thread_ttl_secs).await;
    }
    Ok(Json(body).into_response())
}

/// Marks a message read for the caller. Idempotent.
pub async fn mark_read(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.message_service.mark_read(message_id, auth_user.user_id).await?;
    Ok(Json(json!({ "success": true })))
}

/// Deletes the caller's view of a message.
pub async fn delete_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let result = state.message_service.delete_for_user(message_id, auth_user.user_id).await?;
    Ok(Json(json!({ "success": true, "physicallyDeleted": result.physically_deleted })))
}

/// Adds an emoji reaction.
pub async fn add_reaction(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Json(request): Json<ReactionRequest>,
) -> Result<impl IntoResponse> {
    state.message_service.add_reaction(message_id, auth_user.user_id, request.emoji).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true }))))
}

/// Removes the caller's reaction; succeeds even when absent.
pub async fn remove_reaction(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((message_id, emoji)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse> {
    state.message_service.remove_reaction(message_id, auth_user.user_id, &emoji).await?;
    Ok(Json(json!({ "success": true })))
}
