pub mod auth;
pub mod wallets;

use axum::http::StatusCode;

pub use auth::{sign_in, sign_up, CredentialsRequest};
pub use wallets::{create_wallet, get_history, get_state, send, SendRequest};

pub async fn health() -> StatusCode {
    StatusCode::OK
}
