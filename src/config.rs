use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Database connection URL
    #[arg(long, env = "VOXA_DATABASE_URL")]
    pub database_url: String,

    /// Secret used to verify access tokens issued by the auth service
    #[arg(long, env = "VOXA_JWT_SECRET")]
    pub jwt_secret: String,

    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub cache: CacheConfig,

    #[command(flatten)]
    pub messaging: MessagingConfig,

    #[command(flatten)]
    pub uploads: UploadConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "VOXA_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "VOXA_PORT", default_value_t = 3000)]
    pub port: u16,
}

#[derive(Clone, Debug, Args)]
pub struct CacheConfig {
    /// Redis URL for the read-through cache; omit to run without caching
    #[arg(long, env = "VOXA_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Namespace prefix for cache keys
    #[arg(long, env = "VOXA_CACHE_PREFIX", default_value = "voxa:")]
    pub key_prefix: String,

    /// Upper bound on any single cache command
    #[arg(long, env = "VOXA_CACHE_TIMEOUT_MS", default_value_t = 250)]
    pub command_timeout_ms: u64,

    /// TTL for thread-list and received-list views
    #[arg(long, env = "VOXA_CACHE_THREADS_TTL_SECS", default_value_t = 60)]
    pub threads_ttl_secs: u64,

    /// TTL for a single conversation view
    #[arg(long, env = "VOXA_CACHE_THREAD_TTL_SECS", default_value_t = 30)]
    pub thread_ttl_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct MessagingConfig {
    /// Default page size for message listings
    #[arg(long, env = "VOXA_PAGE_SIZE", default_value_t = 30)]
    pub default_page_size: i64,

    /// Hard cap on a single listing page
    #[arg(long, env = "VOXA_MAX_PAGE_SIZE", default_value_t = 100)]
    pub max_page_size: i64,
}

#[derive(Clone, Debug, Args)]
pub struct UploadConfig {
    /// Directory voice clips and images are stored under
    #[arg(long, env = "VOXA_UPLOAD_DIR", default_value = "uploads")]
    pub dir: String,

    /// Max voice clip size in bytes (default 10MB)
    #[arg(long, env = "VOXA_MAX_VOICE_BYTES", default_value_t = 10_485_760)]
    pub max_voice_bytes: usize,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "VOXA_LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

impl Config {
    pub fn load() -> Self {
        Self::parse()
    }
}
