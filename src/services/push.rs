use crate::domain::notification::{PushData, PushNote};
use crate::storage::Directory;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Delivery sink for push notifications. Callers treat every send as
/// fire-and-forget; a failing sink never propagates into a request path.
#[async_trait]
pub trait NotificationSink: Send + Sync + std::fmt::Debug + 'static {
    async fn push_to_many(&self, tokens: &[String], note: &PushNote, data: &PushData) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct FcmSink;

#[async_trait]
impl NotificationSink for FcmSink {
    async fn push_to_many(&self, tokens: &[String], note: &PushNote, _data: &PushData) -> anyhow::Result<()> {
        tracing::info!(tokens = tokens.len(), title = %note.title, "STUB: dispatching FCM push notification");
        Ok(())
    }
}

/// Spawns a background task that resolves the receivers' device tokens and
/// hands them to the sink. Never awaited by the caller; failures are logged.
pub(crate) fn dispatch(
    sink: Arc<dyn NotificationSink>,
    directory: Arc<dyn Directory>,
    receiver_ids: Vec<Uuid>,
    note: PushNote,
    data: PushData,
) {
    tokio::spawn(async move {
        let tokens = match directory.push_tokens(&receiver_ids).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::error!(error = %e, "Failed to resolve push tokens");
                return;
            }
        };
        if tokens.is_empty() {
            return;
        }
        if let Err(e) = sink.push_to_many(&tokens, &note, &data).await {
            tracing::error!(error = %e, "Push dispatch failed");
        }
    });
}
