use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub username: String,
    pub exp: usize,
}

/// Caller identity attached to every authenticated request.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub username: String,
}

/// Rejects requests without a valid `Authorization: Bearer <jwt>` header.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = match req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    {
        Some(token) => token.trim().to_string(),
        None => return ApiError::unauthorized("empty auth header").into_response(),
    };

    let claims = match state.auth.parse_token(&token) {
        Ok(claims) => claims,
        Err(err) => return ApiError::from(err).into_response(),
    };

    let user_id = match Uuid::parse_str(&claims.user_id) {
        Ok(id) => id,
        Err(_) => return ApiError::unauthorized("cannot parse token").into_response(),
    };

    req.extensions_mut().insert(AuthUser {
        user_id,
        username: claims.username,
    });

    next.run(req).await
}
