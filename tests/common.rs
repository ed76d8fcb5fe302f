#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use voxa_server::api::{self, AppState};
use voxa_server::cache::CacheFacade;
use voxa_server::config::{CacheConfig, Config, LogFormat, MessagingConfig, ServerConfig, TelemetryConfig, UploadConfig};
use voxa_server::domain::auth::Claims;
use voxa_server::domain::notification::{PushData, PushNote};
use voxa_server::services::files::{FileStore, LocalFileStore};
use voxa_server::services::push::NotificationSink;
use voxa_server::services::{GroupService, MessageService, ThreadService};
use voxa_server::storage::memory::MemoryStore;
use voxa_server::storage::{Directory, FollowGate, GroupStore, MessageStore};

const TEST_JWT_SECRET: &str = "test_secret";

/// Captures every push dispatch for assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub sent: Mutex<Vec<(Vec<String>, String, String)>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn push_to_many(&self, tokens: &[String], note: &PushNote, _data: &PushData) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push((tokens.to_vec(), note.title.clone(), note.body.clone()));
        Ok(())
    }
}

pub struct TestUser {
    pub user_id: Uuid,
    pub token: String,
}

/// Boots the full router on an OS-assigned port against the in-memory
/// storage backend and a temp-dir file store.
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub store: MemoryStore,
    pub sink: Arc<RecordingSink>,
    pub upload_dir: tempfile::TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let upload_dir = tempfile::tempdir().expect("temp upload dir");

        let config = Config {
            database_url: "postgres://unused-in-tests".to_string(),
            jwt_secret: TEST_JWT_SECRET.to_string(),
            server: ServerConfig { host: "127.0.0.1".to_string(), port: 0 },
            cache: CacheConfig {
                redis_url: None,
                key_prefix: "voxa-test:".to_string(),
                command_timeout_ms: 250,
                threads_ttl_secs: 60,
                thread_ttl_secs: 30,
            },
            messaging: MessagingConfig { default_page_size: 30, max_page_size: 100 },
            uploads: UploadConfig {
                dir: upload_dir.path().to_string_lossy().into_owned(),
                max_voice_bytes: 10_485_760,
            },
            telemetry: TelemetryConfig { log_format: LogFormat::Text },
        };

        let store = MemoryStore::new();
        let cache = CacheFacade::disabled();
        let message_store: Arc<dyn MessageStore> = Arc::new(store.clone());
        let group_store: Arc<dyn GroupStore> = Arc::new(store.clone());
        let directory: Arc<dyn Directory> = Arc::new(store.clone());
        let follows: Arc<dyn FollowGate> = Arc::new(store.clone());
        let files: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(upload_dir.path()));
        let sink = Arc::new(RecordingSink::default());
        let sink_dyn: Arc<dyn NotificationSink> = Arc::clone(&sink) as Arc<dyn NotificationSink>;

        let message_service = MessageService::new(
            Arc::clone(&message_store),
            follows,
            Arc::clone(&directory),
            Arc::clone(&files),
            Arc::clone(&sink_dyn),
            cache.clone(),
        );
        let thread_service = ThreadService::new(Arc::clone(&message_store));
        let group_service =
            GroupService::new(group_store, message_store, Arc::clone(&directory), Arc::clone(&files), sink_dyn);

        let state = AppState {
            config,
            cache,
            directory,
            files,
            message_service,
            thread_service,
            group_service,
        };
        let app = api::app_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await.expect("test server");
        });

        Self {
            address: format!("http://{addr}"),
            client: reqwest::Client::new(),
            store,
            sink,
            upload_dir,
        }
    }

    pub fn register_user(&self, username: &str) -> TestUser {
        let user_id = self.store.add_user(username, vec![format!("fcm-token-{username}")]);
        let token = Claims::new(user_id, 3600).encode(TEST_JWT_SECRET).expect("sign test token");
        TestUser { user_id, token }
    }

    /// Establishes `follower` -> `followee`, allowing the follower to send.
    pub fn follow(&self, follower: &TestUser, followee: &TestUser) {
        self.store.add_follow(follower.user_id, followee.user_id);
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.address)
    }

    pub async fn get(&self, user: &TestUser, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).bearer_auth(&user.token).send().await.expect("request")
    }

    pub async fn post_json(&self, user: &TestUser, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client.post(self.url(path)).bearer_auth(&user.token).json(body).send().await.expect("request")
    }

    pub async fn put(&self, user: &TestUser, path: &str) -> reqwest::Response {
        self.client.put(self.url(path)).bearer_auth(&user.token).send().await.expect("request")
    }

    pub async fn put_json(&self, user: &TestUser, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client.put(self.url(path)).bearer_auth(&user.token).json(body).send().await.expect("request")
    }

    pub async fn delete(&self, user: &TestUser, path: &str) -> reqwest::Response {
        self.client.delete(self.url(path)).bearer_auth(&user.token).send().await.expect("request")
    }

    pub async fn send_text(&self, from: &TestUser, to: &TestUser, content: &str) -> Uuid {
        let response = self
            .post_json(
                from,
                "/messages/send-text",
                &serde_json::json!({ "receivers": [to.user_id], "content": content }),
            )
            .await;
        assert_eq!(response.status(), 201, "send-text failed");
        let body: serde_json::Value = response.json().await.expect("json body");
        body["data"]["_id"].as_str().expect("message id").parse().expect("uuid")
    }
}
