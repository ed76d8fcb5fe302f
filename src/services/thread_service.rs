use crate::domain::message::Message;
use crate::domain::thread::{LastMessage, ThreadSummary};
use crate::error::Result;
use crate::storage::MessageStore;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Derives per-viewer conversation views from the flat message collection.
#[derive(Clone, Debug)]
pub struct ThreadService {
    store: Arc<dyn MessageStore>,
}

struct ThreadAgg {
    last: LastMessage,
    unread: i64,
    total: i64,
}

impl ThreadService {
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// One summary per conversation partner, ordered by last-message time
    /// descending.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the scan fails.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(viewer = %viewer))]
    pub async fn list_threads(&self, viewer: Uuid) -> Result<Vec<ThreadSummary>> {
        // Newest first, so the first message seen per partner is the thread's
        // last message and first-occurrence order is the final sort order.
        let messages = self.store.list_direct_involving(viewer).await?;

        let mut order: Vec<Uuid> = Vec::new();
        let mut threads: HashMap<Uuid, ThreadAgg> = HashMap::new();

        for message in &messages {
            let Some(partner) = message.counterpart(viewer) else { continue };

            let agg = threads.entry(partner).or_insert_with(|| {
                order.push(partner);
                ThreadAgg {
                    last: LastMessage {
                        message_id: message.id,
                        kind: message.payload.kind,
                        preview: message.preview(),
                        sent_at: message.sent_at,
                        is_mine: message.sender_id == viewer,
                    },
                    unread: 0,
                    total: 0,
                }
            });

            agg.total += 1;
            if message.sender_id != viewer
                && message.read_receipt(viewer).is_some_and(|receipt| !receipt.is_read)
            {
                agg.unread += 1;
            }
        }

        Ok(order
            .into_iter()
            .filter_map(|partner_id| {
                threads.remove(&partner_id).map(|agg| ThreadSummary {
                    partner_id,
                    last_message: agg.last,
                    unread_count: agg.unread,
                    total_count: agg.total,
                })
            })
            .collect())
    }

    /// Both directions of one conversation, ascending by send time. An
    /// unknown partner yields an empty list, never an error.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(viewer = %viewer, partner = %partner))]
    pub async fn thread_messages(&self, viewer: Uuid, partner: Uuid) -> Result<Vec<Message>> {
        self.store.list_thread(viewer, partner).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::MessagePayload;
    use crate::storage::memory::MemoryStore;
    use crate::storage::NewMessage;
    use std::collections::HashMap as Map;

    async fn send(store: &MemoryStore, from: Uuid, to: Uuid, text: &str) {
        store
            .insert(NewMessage {
                sender_id: from,
                group_id: None,
                receiver_ids: vec![to],
                payload: MessagePayload::text(text.to_string()),
                wrapped_keys: Map::new(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn threads_group_by_partner_and_count_unread() {
        let store = MemoryStore::new();
        let viewer = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        send(&store, alice, viewer, "one").await;
        send(&store, alice, viewer, "two").await;
        send(&store, viewer, bob, "hey").await;

        let service = ThreadService::new(Arc::new(store));
        let threads = service.list_threads(viewer).await.unwrap();

        assert_eq!(threads.len(), 2);
        // Bob's thread is newer.
        assert_eq!(threads[0].partner_id, bob);
        assert_eq!(threads[0].unread_count, 0);
        assert_eq!(threads[0].total_count, 1);
        assert!(threads[0].last_message.is_mine);

        assert_eq!(threads[1].partner_id, alice);
        assert_eq!(threads[1].unread_count, 2);
        assert_eq!(threads[1].total_count, 2);
        assert_eq!(threads[1].last_message.preview, "two");
    }
}
