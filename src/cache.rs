use crate::config::CacheConfig;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use uuid::Uuid;

/// Cache key layout:
///
///   threads:{userId}                     - thread list
///   thread:{userId}:{partnerId}          - one conversation
///   received:{userId}:p{page}:l{limit}:u{unread} - received list
///
/// Thread views mutate on every send, so they carry short TTLs; profile
/// adjacent views are comparatively stable and may be cached longer.
pub mod keys {
    use uuid::Uuid;

    #[must_use]
    pub fn threads(viewer: Uuid) -> String {
        format!("threads:{viewer}")
    }

    #[must_use]
    pub fn thread(viewer: Uuid, partner: Uuid) -> String {
        format!("thread:{viewer}:{partner}")
    }

    #[must_use]
    pub fn received(viewer: Uuid, page: i64, limit: i64, unread_only: bool) -> String {
        format!("received:{viewer}:p{page}:l{limit}:u{unread_only}")
    }

    #[must_use]
    pub fn received_pattern(viewer: Uuid) -> String {
        format!("received:{viewer}:*")
    }
}

/// Read-through/invalidate wrapper over an optional Redis backend.
///
/// Every operation tolerates a missing or failing backend: `get` falls back
/// to `None` so callers hit the authoritative store, mutations silently
/// no-op. Nothing here surfaces an error to the request path, and every
/// command runs under a small timeout so a degraded cache cannot stall it.
#[derive(Debug, Clone)]
pub struct CacheFacade {
    conn: Option<ConnectionManager>,
    prefix: String,
    command_timeout: Duration,
    pub threads_ttl_secs: u64,
    pub thread_ttl_secs: u64,
}

impl CacheFacade {
    /// Connects to Redis when a URL is configured; otherwise (or on
    /// connection failure) returns a disabled facade.
    pub async fn connect(config: &CacheConfig) -> Self {
        let conn = match &config.redis_url {
            None => {
                tracing::info!("No Redis URL configured; response caching disabled");
                None
            }
            Some(url) => match Self::open(url).await {
                Ok(conn) => {
                    tracing::info!("Connected to Redis cache");
                    Some(conn)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Redis unavailable; response caching disabled");
                    None
                }
            },
        };

        Self {
            conn,
            prefix: config.key_prefix.clone(),
            command_timeout: Duration::from_millis(config.command_timeout_ms),
            threads_ttl_secs: config.threads_ttl_secs,
            thread_ttl_secs: config.thread_ttl_secs,
        }
    }

    /// A facade with no backend; used by tests and cache-less deployments.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            conn: None,
            prefix: "voxa:".to_string(),
            command_timeout: Duration::from_millis(250),
            threads_ttl_secs: 60,
            thread_ttl_secs: 30,
        }
    }

    async fn open(url: &str) -> anyhow::Result<ConnectionManager> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(conn)
    }

    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.conn.is_some()
    }

    /// Retrieves a cached value, or `None` when absent, unavailable or slow.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut conn = self.conn.clone()?;
        let full_key = format!("{}{key}", self.prefix);

        let op = async move {
            let value: Option<Vec<u8>> = conn.get(full_key).await.ok()?;
            value
        };
        match tokio::time::timeout(self.command_timeout, op).await {
            Ok(value) => value,
            Err(_) => {
                tracing::debug!(key, "Cache get timed out");
                None
            }
        }
    }

    /// Stores a value under the given TTL. Failures are swallowed.
    pub async fn set(&self, key: &str, value: &[u8], ttl_secs: u64) {
        let Some(mut conn) = self.conn.clone() else { return };
        let full_key = format!("{}{key}", self.prefix);
        let value = value.to_vec();

        let op = async move {
            let result: redis::RedisResult<()> = conn.set_ex(full_key, value, ttl_secs).await;
            result
        };
        match tokio::time::timeout(self.command_timeout, op).await {
            Ok(Err(e)) => tracing::debug!(key, error = %e, "Cache set failed"),
            Err(_) => tracing::debug!(key, "Cache set timed out"),
            Ok(Ok(())) => {}
        }
    }

    /// Deletes the given keys. Failures are swallowed.
    pub async fn del<I>(&self, keys: I)
    where
        I: IntoIterator<Item = String>,
    {
        let Some(mut conn) = self.conn.clone() else { return };
        let full_keys: Vec<String> = keys.into_iter().map(|k| format!("{}{k}", self.prefix)).collect();
        if full_keys.is_empty() {
            return;
        }

        let op = async move {
            let result: redis::RedisResult<()> = conn.del(full_keys).await;
            result
        };
        match tokio::time::timeout(self.command_timeout, op).await {
            Ok(Err(e)) => tracing::debug!(error = %e, "Cache del failed"),
            Err(_) => tracing::debug!("Cache del timed out"),
            Ok(Ok(())) => {}
        }
    }

    /// Deletes every key matching the pattern, using cursored SCAN so the
    /// server is never blocked.
    pub async fn del_pattern(&self, pattern: &str) {
        let Some(mut conn) = self.conn.clone() else { return };
        let full_pattern = format!("{}{pattern}", self.prefix);

        let op = async move {
            let mut cursor: u64 = 0;
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&full_pattern)
                    .arg("COUNT")
                    .arg(100)
                    .query_async(&mut conn)
                    .await?;
                if !batch.is_empty() {
                    let _: () = conn.del(batch).await?;
                }
                cursor = next;
                if cursor == 0 {
                    break;
                }
            }
            Ok::<(), redis::RedisError>(())
        };
        match tokio::time::timeout(self.command_timeout, op).await {
            Ok(Err(e)) => tracing::debug!(pattern, error = %e, "Cache pattern delete failed"),
            Err(_) => tracing::debug!(pattern, "Cache pattern delete timed out"),
            Ok(Ok(())) => {}
        }
    }

    /// Drops every thread/received view touched by a message mutation
    /// between `sender` and `receivers`. Runs synchronously on the mutation
    /// path, before the response is sent.
    pub async fn invalidate_message_views(&self, sender: Uuid, receivers: &[Uuid]) {
        if self.conn.is_none() {
            return;
        }

        let mut del_keys = vec![keys::threads(sender)];
        for rid in receivers {
            del_keys.push(keys::threads(*rid));
            del_keys.push(keys::thread(sender, *rid));
            del_keys.push(keys::thread(*rid, sender));
        }
        self.del(del_keys).await;

        self.del_pattern(&keys::received_pattern(sender)).await;
        for rid in receivers {
            self.del_pattern(&keys::received_pattern(*rid)).await;
        }
    }
}
