use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::auth::AuthUser;
use crate::models::{parse_uuid, Transaction, TransferRequest, Wallet, WalletId};
use crate::AppState;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Serialize)]
pub struct CreateWalletResponse {
    pub uuid: Uuid,
}

#[derive(Deserialize)]
pub struct SendRequest {
    pub to: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub array: Vec<Transaction>,
}

#[derive(Serialize)]
pub struct StateResponse {
    pub state: Wallet,
}

fn wallet_param(raw: &str) -> Result<WalletId, ApiError> {
    parse_uuid(raw, "walletId").map_err(|e| ApiError::bad_request(format!("invalid request params: {}", e)))
}

pub async fn create_wallet(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<CreateWalletResponse>, ApiError> {
    let wallet = state.wallets.create_wallet().await?;
    tracing::debug!("User {} created wallet {}", auth_user.user_id, wallet.id);
    Ok(Json(CreateWalletResponse { uuid: wallet.id }))
}

pub async fn send(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let sender = wallet_param(&wallet_id)?;
    let Json(payload) = payload.map_err(|_| ApiError::bad_request("invalid request body"))?;
    let receiver = parse_uuid(&payload.to, "to").map_err(ApiError::bad_request)?;

    let mut request = TransferRequest::new(sender, receiver, payload.amount);
    if let Some(key) = headers.get(IDEMPOTENCY_KEY_HEADER) {
        let key = key
            .to_str()
            .map_err(|_| ApiError::bad_request("invalid Idempotency-Key header"))?;
        request = request.with_idempotency_key(key.trim());
    }

    state.transfers.transfer(request).await?;
    Ok(StatusCode::OK)
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let wallet_id = wallet_param(&wallet_id)?;
    let array = state.wallets.history(wallet_id).await?;
    Ok(Json(HistoryResponse { array }))
}

pub async fn get_state(
    State(state): State<AppState>,
    Path(wallet_id): Path<String>,
) -> Result<Json<StateResponse>, ApiError> {
    let wallet_id = wallet_param(&wallet_id)?;
    let wallet = state.wallets.get_state(wallet_id).await?;
    Ok(Json(StateResponse { state: wallet }))
}
