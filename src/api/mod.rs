use crate::cache::CacheFacade;
use crate::config::Config;
use crate::services::files::FileStore;
use crate::services::{GroupService, MessageService, ThreadService};
use crate::storage::Directory;
use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::request_id::PropagateRequestIdLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub mod groups;
pub mod messages;
pub mod middleware;
pub mod schemas;

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Config,
    pub cache: CacheFacade,
    pub directory: Arc<dyn Directory>,
    pub files: Arc<dyn FileStore>,
    pub message_service: MessageService,
    pub thread_service: ThreadService,
    pub group_service: GroupService,
}

/// Configures and returns the application router.
#[must_use]
pub fn app_router(state: AppState) -> Router {
    // Multipart slack on top of the clip cap itself.
    let body_limit = state.config.uploads.max_voice_bytes + 1_048_576;

    let message_routes = Router::new()
        .route("/messages/send", post(messages::send_voice))
        .route("/messages/send-text", post(messages::send_text))
        .route("/messages/received", get(messages::received))
        .route("/messages/threads", get(messages::threads))
        .route("/messages/thread/{partnerId}", get(messages::thread_detail))
        .route("/messages/{id}/read", put(messages::mark_read))
        .route("/messages/{id}", delete(messages::delete_message))
        .route("/messages/{id}/reactions", post(messages::add_reaction))
        .route("/messages/{id}/reactions/{emoji}", delete(messages::remove_reaction));

    let group_routes = Router::new()
        .route("/groups", get(groups::my_groups).post(groups::create_group))
        .route(
            "/groups/{id}",
            get(groups::get_group).put(groups::update_group).delete(groups::delete_group),
        )
        .route("/groups/{id}/members", post(groups::add_member))
        .route("/groups/{id}/members/{userId}", delete(groups::remove_member))
        .route("/groups/{id}/messages", get(groups::list_messages))
        .route("/groups/{id}/messages/text", post(groups::send_text))
        .route("/groups/{id}/messages/voice", post(groups::send_voice))
        .route("/groups/{id}/messages/{messageId}/read", put(groups::mark_read));

    Router::new()
        .merge(message_routes)
        .merge(group_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(PropagateRequestIdLayer::new(axum::http::HeaderName::from_static("x-request-id")))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
