use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::models::WalletId;

// Postgres SQLSTATE codes the ledger cares about.
const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const LOCK_NOT_AVAILABLE: &str = "55P03";
const QUERY_CANCELED: &str = "57014";

const IDEMPOTENCY_CONSTRAINT: &str = "transactions_idempotency_key_key";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("cannot get wallet {0}")]
    WalletNotFound(WalletId),

    #[error("not enough money on wallet {wallet}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        wallet: WalletId,
        balance: Decimal,
        requested: Decimal,
    },

    #[error("wallet {0} already exists")]
    DuplicateWallet(WalletId),

    #[error("transaction already exists")]
    DuplicateTransaction,

    #[error("amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error("sender and receiver must be different wallets")]
    SelfTransfer,

    #[error("invalid idempotency key: {0}")]
    InvalidIdempotencyKey(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("balance of wallet {0} would overflow")]
    BalanceOverflow(WalletId),

    /// A deterministic store failure. Retrying will not help.
    #[error("ledger store error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Transient failures may succeed when the same operation is attempted again.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::StoreUnavailable(_) | LedgerError::Timeout(_))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code();
                match code.as_deref() {
                    Some(UNIQUE_VIOLATION) if db_err.constraint() == Some(IDEMPOTENCY_CONSTRAINT) => {
                        LedgerError::DuplicateTransaction
                    }
                    Some(SERIALIZATION_FAILURE)
                    | Some(DEADLOCK_DETECTED)
                    | Some(LOCK_NOT_AVAILABLE)
                    | Some(QUERY_CANCELED) => {
                        LedgerError::StoreUnavailable(format!("contention: {}", db_err.message()))
                    }
                    _ => {
                        tracing::error!("Unexpected database error: {:?}", err);
                        LedgerError::Internal(db_err.message().to_string())
                    }
                }
            }
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => {
                tracing::warn!("Database unavailable: {}", err);
                LedgerError::StoreUnavailable(err.to_string())
            }
            _ => {
                tracing::error!("Database access failed: {:?}", err);
                LedgerError::Internal(err.to_string())
            }
        }
    }
}

/// Whether a database error is a unique violation, e.g. a wallet id collision.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION))
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user already exist")]
    UserAlreadyExists,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("{0}")]
    InvalidInput(String),

    #[error("cannot parse token")]
    TokenInvalid,

    #[error("user store failed: {0}")]
    Store(String),

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("cannot sign token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("password task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            return AuthError::UserAlreadyExists;
        }
        tracing::error!("User store error: {:?}", err);
        AuthError::Store(err.to_string())
    }
}

/// Error returned by HTTP handlers. Renders as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::WalletNotFound(_) => ApiError::not_found(err.to_string()),
            LedgerError::StoreUnavailable(_) | LedgerError::Timeout(_) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "service temporarily unavailable, retry later",
            ),
            LedgerError::InsufficientFunds { .. }
            | LedgerError::DuplicateWallet(_)
            | LedgerError::DuplicateTransaction
            | LedgerError::InvalidAmount(_)
            | LedgerError::SelfTransfer
            | LedgerError::InvalidIdempotencyKey(_)
            | LedgerError::BalanceOverflow(_) => ApiError::bad_request(err.to_string()),
            LedgerError::Internal(_) => ApiError::internal(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::UserAlreadyExists
            | AuthError::InvalidCredentials
            | AuthError::InvalidInput(_) => ApiError::bad_request(err.to_string()),
            AuthError::TokenInvalid => ApiError::unauthorized(err.to_string()),
            AuthError::Store(_) | AuthError::Hash(_) | AuthError::Token(_) | AuthError::Task(_) => {
                tracing::error!("Auth failure: {}", err);
                ApiError::internal()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use uuid::Uuid;

    #[test]
    fn transient_classification() {
        assert!(LedgerError::StoreUnavailable("down".into()).is_transient());
        assert!(LedgerError::Timeout(5000).is_transient());
        assert!(!LedgerError::WalletNotFound(Uuid::new_v4()).is_transient());
        assert!(!LedgerError::DuplicateTransaction.is_transient());
        assert!(!LedgerError::InvalidAmount(Decimal::ZERO).is_transient());
    }

    #[test]
    fn ledger_errors_map_to_statuses() {
        let cases = [
            (LedgerError::WalletNotFound(Uuid::new_v4()), StatusCode::NOT_FOUND),
            (
                LedgerError::InsufficientFunds {
                    wallet: Uuid::new_v4(),
                    balance: Decimal::from(70),
                    requested: Decimal::from(200),
                },
                StatusCode::BAD_REQUEST,
            ),
            (LedgerError::DuplicateTransaction, StatusCode::BAD_REQUEST),
            (LedgerError::SelfTransfer, StatusCode::BAD_REQUEST),
            (LedgerError::InvalidAmount(Decimal::ZERO), StatusCode::BAD_REQUEST),
            (LedgerError::Timeout(10), StatusCode::SERVICE_UNAVAILABLE),
            (
                LedgerError::StoreUnavailable("pool timed out".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (LedgerError::BalanceOverflow(Uuid::new_v4()), StatusCode::BAD_REQUEST),
            (LedgerError::Internal("bad column".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn pool_timeout_is_transient() {
        let err = LedgerError::from(sqlx::Error::PoolTimedOut);
        assert!(err.is_transient());
        assert!(LedgerError::from(sqlx::Error::PoolClosed).is_transient());
    }

    #[test]
    fn deterministic_sqlx_errors_are_not_transient() {
        let row = LedgerError::from(sqlx::Error::RowNotFound);
        assert!(matches!(row, LedgerError::Internal(_)));
        assert!(!row.is_transient());

        let column = LedgerError::from(sqlx::Error::ColumnNotFound("balance".to_string()));
        assert!(!column.is_transient());
        assert_eq!(ApiError::from(column).status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }
}
