#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

use std::net::SocketAddr;
use std::sync::Arc;
use voxa_server::api::{self, AppState};
use voxa_server::cache::CacheFacade;
use voxa_server::config::Config;
use voxa_server::services::files::{FileStore, LocalFileStore};
use voxa_server::services::push::{FcmSink, NotificationSink};
use voxa_server::services::{GroupService, MessageService, ThreadService};
use voxa_server::storage::postgres::{PgDirectory, PgFollowGate, PgGroupStore, PgMessageStore};
use voxa_server::storage::{Directory, FollowGate, GroupStore, MessageStore};
use voxa_server::{storage, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    telemetry::init_telemetry(&config.telemetry);

    // Infrastructure
    let pool = storage::init_pool(&config.database_url).await?;
    sqlx::migrate!().run(&pool).await?;
    let cache = CacheFacade::connect(&config.cache).await;

    // Component wiring
    let message_store: Arc<dyn MessageStore> = Arc::new(PgMessageStore::new(pool.clone()));
    let group_store: Arc<dyn GroupStore> = Arc::new(PgGroupStore::new(pool.clone()));
    let directory: Arc<dyn Directory> = Arc::new(PgDirectory::new(pool.clone()));
    let follows: Arc<dyn FollowGate> = Arc::new(PgFollowGate::new(pool));
    let files: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(&config.uploads.dir));
    let sink: Arc<dyn NotificationSink> = Arc::new(FcmSink);

    let message_service = MessageService::new(
        Arc::clone(&message_store),
        follows,
        Arc::clone(&directory),
        Arc::clone(&files),
        Arc::clone(&sink),
        cache.clone(),
    );
    let thread_service = ThreadService::new(Arc::clone(&message_store));
    let group_service = GroupService::new(
        group_store,
        message_store,
        Arc::clone(&directory),
        Arc::clone(&files),
        sink,
    );

    let state = AppState {
        config: config.clone(),
        cache,
        directory,
        files,
        message_service,
        thread_service,
        group_service,
    };
    let app = api::app_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!(address = %addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
