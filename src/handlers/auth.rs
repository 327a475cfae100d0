use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct SignUpResponse {
    pub uuid: Uuid,
}

#[derive(Serialize)]
pub struct SignInResponse {
    pub token: String,
}

pub async fn sign_up(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<SignUpResponse>, ApiError> {
    let Json(payload) = payload.map_err(|_| ApiError::bad_request("invalid request body"))?;
    let uuid = state.auth.sign_up(&payload.username, &payload.password).await?;
    Ok(Json(SignUpResponse { uuid }))
}

pub async fn sign_in(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<SignInResponse>, ApiError> {
    let Json(payload) = payload.map_err(|_| ApiError::bad_request("invalid request body"))?;
    let token = state.auth.sign_in(&payload.username, &payload.password).await?;
    Ok(Json(SignInResponse { token }))
}
