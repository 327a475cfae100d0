use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wallet_ledger_api::{
    accounts::{MemoryUserStore, PgUserStore, UserStore},
    build_router, database,
    ledger::{LedgerStore, MemoryLedgerStore, PgLedgerStore},
    AppState, Config, StorageKind,
};

#[derive(Parser, Debug)]
#[command(name = "wallet-ledger-api", about = "Wallet ledger and transfer engine")]
struct Args {
    /// Port to listen on (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Storage backend (overrides STORAGE)
    #[arg(long, value_enum)]
    storage: Option<StorageKind>,

    /// Postgres connection string (overrides DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let mut config = Config::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(storage) = args.storage {
        config.storage = storage;
    }
    if let Some(url) = args.database_url {
        config.database_url = url;
    }
    info!("Starting wallet ledger API ({:?} storage)...", config.storage);

    let (ledger, users): (Arc<dyn LedgerStore>, Arc<dyn UserStore>) = match config.storage {
        StorageKind::Postgres => {
            let pool = database::new_pool(&config).await?;
            info!("Database connection pool created");
            (
                Arc::new(PgLedgerStore::new(pool.clone(), config.transfer_timeout())),
                Arc::new(PgUserStore::new(pool)),
            )
        }
        StorageKind::Memory => {
            info!("Using in-memory storage, nothing will be persisted");
            (Arc::new(MemoryLedgerStore::new()), Arc::new(MemoryUserStore::new()))
        }
    };

    let app = build_router(AppState::new(&config, ledger, users));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }
    info!("Server stopped");

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wallet_ledger_api=debug,tower_http=debug".into());

    if std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutting down gracefully...");
}
