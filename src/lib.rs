//! Wallet ledger service: wallets with a seed balance, atomic transfers
//! between them, per-wallet history, and a small JWT-guarded HTTP surface.

pub mod accounts;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use config::{Config, StorageKind};
pub use error::{ApiError, AuthError, LedgerError};

use accounts::UserStore;
use ledger::LedgerStore;
use services::{AuthService, TransferCoordinator, WalletService};

#[derive(Clone)]
pub struct AppState {
    pub wallets: Arc<WalletService>,
    pub transfers: Arc<TransferCoordinator>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(config: &Config, ledger: Arc<dyn LedgerStore>, users: Arc<dyn UserStore>) -> Self {
        let auth = AuthService::new(users, config.jwt_secret.clone(), config.jwt_expiration);
        Self::with_auth(config, ledger, auth)
    }

    /// Same as `new` but with a caller-built `AuthService` (e.g. a cheaper bcrypt cost).
    pub fn with_auth(config: &Config, ledger: Arc<dyn LedgerStore>, auth: AuthService) -> Self {
        Self {
            wallets: Arc::new(WalletService::new(ledger.clone(), config.wallet_seed_balance)),
            transfers: Arc::new(TransferCoordinator::new(ledger, config)),
            auth: Arc::new(auth),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/v1/wallet", post(handlers::create_wallet))
        .route("/api/v1/wallet/", post(handlers::create_wallet))
        .route("/api/v1/wallet/:walletId", get(handlers::get_state))
        .route("/api/v1/wallet/:walletId/send", post(handlers::send))
        .route("/api/v1/wallet/:walletId/history", get(handlers::get_history))
        .route_layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/sign-up", post(handlers::sign_up))
        .route("/auth/sign-in", post(handlers::sign_in))
        .merge(api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
