//! Postgres-backed ledger store.
//!
//! A transfer is one database transaction: both wallet rows are locked with
//! `SELECT ... ORDER BY id FOR UPDATE`, each balance changes through the
//! conditional update in [`apply_delta_in`], and the ledger row is inserted
//! before commit. Dropping the transaction on any error rolls everything back.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgConnection;

use super::{validate_transfer, LedgerStore};
use crate::database::DatabasePool;
use crate::error::{is_unique_violation, LedgerError};
use crate::models::{Transaction, TransferRequest, Wallet, WalletId};

#[derive(Clone)]
pub struct PgLedgerStore {
    pool: DatabasePool,
    lock_timeout: Duration,
}

impl PgLedgerStore {
    pub fn new(pool: DatabasePool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

/// Bound how long this transaction waits for row locks. Expiry surfaces as
/// SQLSTATE 55P03, which maps to a transient `StoreUnavailable`.
async fn set_lock_timeout(conn: &mut PgConnection, timeout: Duration) -> Result<(), LedgerError> {
    sqlx::query("SELECT set_config('lock_timeout', $1, true)")
        .bind(format!("{}ms", timeout.as_millis()))
        .execute(conn)
        .await?;
    Ok(())
}

/// Lock the given wallets in ascending id order and return what exists.
async fn lock_wallets(conn: &mut PgConnection, ids: &[WalletId]) -> Result<Vec<Wallet>, LedgerError> {
    let wallets = sqlx::query_as::<_, Wallet>(
        r#"
        SELECT id, balance
        FROM wallets
        WHERE id = ANY($1)
        ORDER BY id
        FOR UPDATE
        "#,
    )
    .bind(ids)
    .fetch_all(conn)
    .await?;
    Ok(wallets)
}

/// Add `delta` to a balance only if the result stays non-negative.
async fn apply_delta_in(
    conn: &mut PgConnection,
    id: WalletId,
    delta: Decimal,
) -> Result<Decimal, LedgerError> {
    let updated = sqlx::query_scalar::<_, Decimal>(
        r#"
        UPDATE wallets
        SET balance = balance + $2
        WHERE id = $1 AND balance + $2 >= 0
        RETURNING balance
        "#,
    )
    .bind(id)
    .bind(delta)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(balance) = updated {
        return Ok(balance);
    }

    let current = sqlx::query_scalar::<_, Decimal>("SELECT balance FROM wallets WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match current {
        Some(balance) => Err(LedgerError::InsufficientFunds {
            wallet: id,
            balance,
            requested: -delta,
        }),
        None => Err(LedgerError::WalletNotFound(id)),
    }
}

async fn idempotency_key_exists(conn: &mut PgConnection, key: &str) -> Result<bool, LedgerError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM transactions WHERE idempotency_key = $1)",
    )
    .bind(key)
    .fetch_one(conn)
    .await?;
    Ok(exists)
}

async fn append_in(conn: &mut PgConnection, request: &TransferRequest) -> Result<Transaction, LedgerError> {
    let entry = sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (sender, receiver, amount, idempotency_key)
        VALUES ($1, $2, $3, $4)
        RETURNING sender, receiver, created_at, amount, idempotency_key
        "#,
    )
    .bind(request.sender)
    .bind(request.receiver)
    .bind(request.amount)
    .bind(request.idempotency_key.as_deref())
    .fetch_one(conn)
    .await?;
    Ok(entry)
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn insert_wallet(&self, wallet: &Wallet) -> Result<(), LedgerError> {
        sqlx::query("INSERT INTO wallets (id, balance) VALUES ($1, $2)")
            .bind(wallet.id)
            .bind(wallet.balance)
            .execute(&*self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    LedgerError::DuplicateWallet(wallet.id)
                } else {
                    LedgerError::from(e)
                }
            })?;
        Ok(())
    }

    async fn get_wallet(&self, id: WalletId) -> Result<Wallet, LedgerError> {
        sqlx::query_as::<_, Wallet>("SELECT id, balance FROM wallets WHERE id = $1")
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?
            .ok_or(LedgerError::WalletNotFound(id))
    }

    async fn apply_delta(&self, id: WalletId, delta: Decimal) -> Result<Decimal, LedgerError> {
        let mut tx = self.pool.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout).await?;
        let balance = apply_delta_in(&mut tx, id, delta).await?;
        tx.commit().await?;
        Ok(balance)
    }

    async fn transfer(&self, request: &TransferRequest) -> Result<Transaction, LedgerError> {
        validate_transfer(request)?;

        let mut tx = self.pool.begin().await?;
        set_lock_timeout(&mut tx, self.lock_timeout).await?;

        let locked = lock_wallets(&mut tx, &request.lock_order()).await?;
        let sender = locked
            .iter()
            .find(|w| w.id == request.sender)
            .ok_or(LedgerError::WalletNotFound(request.sender))?;
        if !locked.iter().any(|w| w.id == request.receiver) {
            return Err(LedgerError::WalletNotFound(request.receiver));
        }

        if let Some(key) = &request.idempotency_key {
            if idempotency_key_exists(&mut tx, key).await? {
                return Err(LedgerError::DuplicateTransaction);
            }
        }

        if !sender.can_cover(request.amount) {
            return Err(LedgerError::InsufficientFunds {
                wallet: sender.id,
                balance: sender.balance,
                requested: request.amount,
            });
        }

        apply_delta_in(&mut tx, request.sender, request.delta_for(request.sender)).await?;
        apply_delta_in(&mut tx, request.receiver, request.delta_for(request.receiver)).await?;
        let entry = append_in(&mut tx, request).await?;

        tx.commit().await?;
        Ok(entry)
    }

    async fn history(&self, id: WalletId) -> Result<Vec<Transaction>, LedgerError> {
        let entries = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT sender, receiver, created_at, amount, idempotency_key
            FROM transactions
            WHERE sender = $1 OR receiver = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(id)
        .fetch_all(&*self.pool)
        .await?;
        Ok(entries)
    }

    async fn find_transaction(&self, idempotency_key: &str) -> Result<Option<Transaction>, LedgerError> {
        let entry = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT sender, receiver, created_at, amount, idempotency_key
            FROM transactions
            WHERE idempotency_key = $1
            "#,
        )
        .bind(idempotency_key)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(entry)
    }
}
