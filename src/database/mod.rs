use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;

pub type DatabasePool = Arc<PgPool>;

const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

pub async fn create_pool(config: &Config) -> anyhow::Result<PgPool> {
    // TLS is negotiated by the driver when DATABASE_URL carries sslmode=require.
    let options = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(config.transfer_timeout());

    let mut attempts_left = config.database_connect_attempts.max(1);
    let pool = loop {
        match options.clone().connect(&config.database_url).await {
            Ok(pool) => break pool,
            Err(e) if attempts_left > 1 => {
                attempts_left -= 1;
                tracing::info!(
                    "Postgres is trying to connect, attempts left: {} ({})",
                    attempts_left,
                    e
                );
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
            Err(e) => return Err(e.into()),
        }
    };

    if !config.database_url.contains("sslmode=")
        && !config.database_url.contains("localhost")
        && !config.database_url.contains("127.0.0.1")
    {
        tracing::warn!("Connecting to remote database without explicit sslmode. Consider adding sslmode=require");
    }

    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

pub async fn new_pool(config: &Config) -> anyhow::Result<DatabasePool> {
    let pool = create_pool(config).await?;
    run_migrations(&pool).await?;
    Ok(Arc::new(pool))
}
