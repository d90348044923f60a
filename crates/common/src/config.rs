use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (access-token cache)
    pub redis_url: String,

    /// Feishu open-API base URL
    pub feishu_base_url: String,

    /// Worker poll interval in milliseconds (default: 1000)
    pub worker_poll_interval_ms: u64,

    /// Maximum number of due jobs claimed per poll cycle (default: 16)
    pub worker_batch_size: u32,

    /// Lease duration for a claimed job in seconds (default: 120).
    /// A worker that dies mid-run releases the job when the lease expires.
    pub worker_lease_secs: u64,

    /// Maximum infrastructure-level retries of a single wake-up (default: 3)
    pub max_infra_attempts: u32,

    /// Transport-level retry count for Feishu API calls (default: 3)
    pub request_retry_times: u32,

    /// Base delay between transport retries in milliseconds (default: 1000)
    pub request_retry_delay_ms: u64,

    /// Default escalation attempt budget for new chains (default: 3)
    pub default_max_attempts: u32,

    /// Default base delay for new chains in seconds (default: 60)
    pub default_initial_delay_secs: u64,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            feishu_base_url: std::env::var("FEISHU_BASE_URL")
                .unwrap_or_else(|_| "https://open.feishu.cn".to_string()),
            worker_poll_interval_ms: std::env::var("WORKER_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WORKER_POLL_INTERVAL_MS must be a valid u64"))?,
            worker_batch_size: std::env::var("WORKER_BATCH_SIZE")
                .unwrap_or_else(|_| "16".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WORKER_BATCH_SIZE must be a valid u32"))?,
            worker_lease_secs: std::env::var("WORKER_LEASE_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WORKER_LEASE_SECS must be a valid u64"))?,
            max_infra_attempts: std::env::var("MAX_INFRA_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("MAX_INFRA_ATTEMPTS must be a valid u32"))?,
            request_retry_times: std::env::var("REQUEST_RETRY_TIMES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("REQUEST_RETRY_TIMES must be a valid u32"))?,
            request_retry_delay_ms: std::env::var("REQUEST_RETRY_DELAY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("REQUEST_RETRY_DELAY_MS must be a valid u64"))?,
            default_max_attempts: std::env::var("DEFAULT_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DEFAULT_MAX_ATTEMPTS must be a valid u32"))?,
            default_initial_delay_secs: std::env::var("DEFAULT_INITIAL_DELAY_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DEFAULT_INITIAL_DELAY_SECS must be a valid u64"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
        })
    }
}
