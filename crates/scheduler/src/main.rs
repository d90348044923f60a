use lark_client::FeishuClient;
use lark_client::retry::RetryPolicy;
use lark_client::token::RedisTokenStore;
use lark_common::config::AppConfig;
use lark_common::db;
use lark_common::redis_pool;
use lark_scheduler::queue::EscalationQueue;
use lark_scheduler::worker::EscalationWorker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lark_scheduler=info,lark_engine=info,lark_client=info".into()),
        )
        .json()
        .init();

    tracing::info!("LarkUrgent escalation worker starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Token cache (written by the external credential refresher)
    let redis = redis_pool::create_redis_pool(&config.redis_url).await?;
    let tokens = RedisTokenStore::new(redis);

    let client = FeishuClient::new(
        &config.feishu_base_url,
        tokens,
        RetryPolicy::from_config(&config),
    );
    let queue = EscalationQueue::new(pool);

    // One FeishuClient serves both driver ports.
    let worker = EscalationWorker::new(queue, client.clone(), client, &config);

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        result = worker.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Escalation worker exited with error");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("LarkUrgent escalation worker stopped.");
    Ok(())
}
