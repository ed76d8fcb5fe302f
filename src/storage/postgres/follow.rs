use crate::error::Result;
use crate::storage::{DbPool, FollowGate};
use async_trait::async_trait;
use uuid::Uuid;

/// Reads the follow-edge table owned by the social service.
#[derive(Debug, Clone)]
pub struct PgFollowGate {
    pool: DbPool,
}

impl PgFollowGate {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FollowGate for PgFollowGate {
    async fn is_following(&self, follower: Uuid, followee: Uuid) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM follows WHERE followee_id = $1 AND follower_id = $2)")
                .bind(followee)
                .bind(follower)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}
