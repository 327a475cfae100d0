//! Wallet store and transaction ledger.
//!
//! A [`LedgerStore`] owns both wallet balances and the append-only ledger so
//! that a transfer can debit, credit and record in one atomic unit. Callers
//! never get a raw read-then-write on a balance: the only mutations are
//! [`LedgerStore::apply_delta`] and [`LedgerStore::transfer`], both of which
//! refuse to take a balance below zero.
//!
//! Every implementation locks wallets in ascending id order
//! ([`TransferRequest::lock_order`]) so that concurrent opposite-direction
//! transfers between the same pair cannot deadlock.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::LedgerError;
use crate::models::{Transaction, TransferRequest, Wallet, WalletId};

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// Longest idempotency key a caller may supply.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Persist a new wallet. Fails with `DuplicateWallet` if the id is taken.
    async fn insert_wallet(&self, wallet: &Wallet) -> Result<(), LedgerError>;

    /// Point read of a wallet.
    async fn get_wallet(&self, id: WalletId) -> Result<Wallet, LedgerError>;

    /// Atomically add `delta` to a balance if the result stays `>= 0`.
    /// Returns the new balance.
    async fn apply_delta(&self, id: WalletId, delta: Decimal) -> Result<Decimal, LedgerError>;

    /// Debit sender, credit receiver and append the ledger entry as one
    /// atomic unit. Either everything is visible afterwards or nothing is.
    async fn transfer(&self, request: &TransferRequest) -> Result<Transaction, LedgerError>;

    /// Every entry where the wallet is sender or receiver, oldest first.
    async fn history(&self, id: WalletId) -> Result<Vec<Transaction>, LedgerError>;

    /// Look up the entry recorded under an idempotency key.
    async fn find_transaction(&self, idempotency_key: &str) -> Result<Option<Transaction>, LedgerError>;
}

/// Checks a transfer request before any store is touched.
pub fn validate_transfer(request: &TransferRequest) -> Result<(), LedgerError> {
    if request.amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(request.amount));
    }
    if request.sender == request.receiver {
        return Err(LedgerError::SelfTransfer);
    }
    if let Some(key) = &request.idempotency_key {
        if key.trim().is_empty() {
            return Err(LedgerError::InvalidIdempotencyKey("must not be empty".to_string()));
        }
        if key.chars().count() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(LedgerError::InvalidIdempotencyKey(format!(
                "must be at most {} characters",
                MAX_IDEMPOTENCY_KEY_LEN
            )));
        }
    }
    Ok(())
}

/// Balance after applying `delta`, or `InsufficientFunds` if it would go negative.
pub(crate) fn checked_balance(
    wallet: WalletId,
    balance: Decimal,
    delta: Decimal,
) -> Result<Decimal, LedgerError> {
    let next = balance
        .checked_add(delta)
        .ok_or(LedgerError::BalanceOverflow(wallet))?;
    if next < Decimal::ZERO {
        return Err(LedgerError::InsufficientFunds {
            wallet,
            balance,
            requested: -delta,
        });
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn rejects_non_positive_amounts() {
        let request = TransferRequest::new(Uuid::new_v4(), Uuid::new_v4(), Decimal::ZERO);
        assert_eq!(
            validate_transfer(&request),
            Err(LedgerError::InvalidAmount(Decimal::ZERO))
        );

        let request = TransferRequest::new(Uuid::new_v4(), Uuid::new_v4(), Decimal::from(-5));
        assert!(matches!(
            validate_transfer(&request),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn rejects_self_transfer() {
        let id = Uuid::new_v4();
        let request = TransferRequest::new(id, id, Decimal::ONE);
        assert_eq!(validate_transfer(&request), Err(LedgerError::SelfTransfer));
    }

    #[test]
    fn rejects_blank_or_oversized_keys() {
        let base = TransferRequest::new(Uuid::new_v4(), Uuid::new_v4(), Decimal::ONE);
        assert!(validate_transfer(&base.clone().with_idempotency_key("  ")).is_err());
        let long = "k".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1);
        assert!(validate_transfer(&base.clone().with_idempotency_key(long)).is_err());
        assert!(validate_transfer(&base.with_idempotency_key("order-42")).is_ok());
    }

    #[test]
    fn checked_balance_never_goes_negative() {
        let id = Uuid::new_v4();
        assert_eq!(
            checked_balance(id, Decimal::from(70), Decimal::from(-70)),
            Ok(Decimal::ZERO)
        );
        assert_eq!(
            checked_balance(id, Decimal::from(70), Decimal::from(-200)),
            Err(LedgerError::InsufficientFunds {
                wallet: id,
                balance: Decimal::from(70),
                requested: Decimal::from(200),
            })
        );
    }

    #[test]
    fn checked_balance_reports_overflow() {
        let id = Uuid::new_v4();
        assert_eq!(
            checked_balance(id, Decimal::MAX, Decimal::ONE),
            Err(LedgerError::BalanceOverflow(id))
        );
    }
}
