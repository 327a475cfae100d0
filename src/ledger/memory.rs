//! In-process ledger store.
//!
//! Each wallet balance sits behind its own mutex. A transfer takes the two
//! wallet mutexes in ascending id order, then the ledger mutex, and only
//! mutates once every lock is held. The ledger mutex is never held while
//! waiting on a wallet mutex.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};

use super::{checked_balance, validate_transfer, LedgerStore};
use crate::error::LedgerError;
use crate::models::{Transaction, TransferRequest, Wallet, WalletId};

type BalanceCell = Arc<Mutex<Decimal>>;

#[derive(Default)]
struct LedgerLog {
    entries: Vec<Transaction>,
    keys: HashSet<String>,
}

impl LedgerLog {
    fn ensure_key_unused(&self, key: Option<&str>) -> Result<(), LedgerError> {
        match key {
            Some(key) if self.keys.contains(key) => Err(LedgerError::DuplicateTransaction),
            _ => Ok(()),
        }
    }

    /// Record an entry. Entries are immutable once appended.
    fn append(&mut self, entry: Transaction) -> Result<(), LedgerError> {
        self.ensure_key_unused(entry.idempotency_key.as_deref())?;
        if let Some(key) = &entry.idempotency_key {
            self.keys.insert(key.clone());
        }
        self.entries.push(entry);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLedgerStore {
    wallets: RwLock<HashMap<WalletId, BalanceCell>>,
    ledger: Mutex<LedgerLog>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn cell(&self, id: WalletId) -> Result<BalanceCell, LedgerError> {
        self.wallets
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(LedgerError::WalletNotFound(id))
    }

    /// Sum of all balances. Only meaningful while no transfer is in flight.
    pub async fn total_balance(&self) -> Decimal {
        let cells: Vec<BalanceCell> = self.wallets.read().await.values().cloned().collect();
        let mut total = Decimal::ZERO;
        for cell in cells {
            total += *cell.lock().await;
        }
        total
    }

    pub async fn ledger_len(&self) -> usize {
        self.ledger.lock().await.entries.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn insert_wallet(&self, wallet: &Wallet) -> Result<(), LedgerError> {
        if wallet.balance < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(wallet.balance));
        }
        let mut wallets = self.wallets.write().await;
        if wallets.contains_key(&wallet.id) {
            return Err(LedgerError::DuplicateWallet(wallet.id));
        }
        wallets.insert(wallet.id, Arc::new(Mutex::new(wallet.balance)));
        Ok(())
    }

    async fn get_wallet(&self, id: WalletId) -> Result<Wallet, LedgerError> {
        let cell = self.cell(id).await?;
        let balance = *cell.lock().await;
        Ok(Wallet::new(id, balance))
    }

    async fn apply_delta(&self, id: WalletId, delta: Decimal) -> Result<Decimal, LedgerError> {
        let cell = self.cell(id).await?;
        let mut balance = cell.lock().await;
        let next = checked_balance(id, *balance, delta)?;
        *balance = next;
        Ok(next)
    }

    async fn transfer(&self, request: &TransferRequest) -> Result<Transaction, LedgerError> {
        validate_transfer(request)?;

        let sender_cell = self.cell(request.sender).await?;
        let receiver_cell = self.cell(request.receiver).await?;

        let [first, _] = request.lock_order();
        let (first_cell, second_cell) = if first == request.sender {
            (&sender_cell, &receiver_cell)
        } else {
            (&receiver_cell, &sender_cell)
        };
        let mut first_guard = first_cell.lock().await;
        let mut second_guard = second_cell.lock().await;
        let mut ledger = self.ledger.lock().await;

        ledger.ensure_key_unused(request.idempotency_key.as_deref())?;

        let (sender_balance, receiver_balance) = if first == request.sender {
            (&mut *first_guard, &mut *second_guard)
        } else {
            (&mut *second_guard, &mut *first_guard)
        };

        // No awaits from here on: a cancelled attempt never leaves half a transfer.
        let debited = checked_balance(request.sender, *sender_balance, request.delta_for(request.sender))?;
        let credited = checked_balance(request.receiver, *receiver_balance, request.delta_for(request.receiver))?;
        let entry = Transaction {
            sender: request.sender,
            receiver: request.receiver,
            created_at: Utc::now(),
            amount: request.amount,
            idempotency_key: request.idempotency_key.clone(),
        };
        ledger.append(entry.clone())?;
        *sender_balance = debited;
        *receiver_balance = credited;

        Ok(entry)
    }

    async fn history(&self, id: WalletId) -> Result<Vec<Transaction>, LedgerError> {
        let ledger = self.ledger.lock().await;
        let mut entries: Vec<Transaction> = ledger
            .entries
            .iter()
            .filter(|entry| entry.involves(id))
            .cloned()
            .collect();
        // Stable: equal timestamps keep append order.
        entries.sort_by_key(|entry| entry.created_at);
        Ok(entries)
    }

    async fn find_transaction(&self, idempotency_key: &str) -> Result<Option<Transaction>, LedgerError> {
        let ledger = self.ledger.lock().await;
        Ok(ledger
            .entries
            .iter()
            .find(|entry| entry.idempotency_key.as_deref() == Some(idempotency_key))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};
    use uuid::Uuid;

    async fn store_with(balances: &[i64]) -> (MemoryLedgerStore, Vec<WalletId>) {
        let store = MemoryLedgerStore::new();
        let mut ids = Vec::new();
        for balance in balances {
            let id = Uuid::new_v4();
            assert_ok!(store.insert_wallet(&Wallet::new(id, Decimal::from(*balance))).await);
            ids.push(id);
        }
        (store, ids)
    }

    #[tokio::test]
    async fn duplicate_wallet_is_rejected() {
        let (store, ids) = store_with(&[100]).await;
        let err = store
            .insert_wallet(&Wallet::new(ids[0], Decimal::from(5)))
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::DuplicateWallet(ids[0]));
        assert_eq!(store.get_wallet(ids[0]).await.unwrap().balance, Decimal::from(100));
    }

    #[tokio::test]
    async fn apply_delta_refuses_overdraft() {
        let (store, ids) = store_with(&[10]).await;
        assert_eq!(store.apply_delta(ids[0], Decimal::from(-4)).await, Ok(Decimal::from(6)));
        assert_err!(store.apply_delta(ids[0], Decimal::from(-7)).await);
        assert_eq!(store.get_wallet(ids[0]).await.unwrap().balance, Decimal::from(6));
    }

    #[tokio::test]
    async fn apply_delta_on_missing_wallet() {
        let store = MemoryLedgerStore::new();
        let id = Uuid::new_v4();
        assert_eq!(
            store.apply_delta(id, Decimal::ONE).await,
            Err(LedgerError::WalletNotFound(id))
        );
    }

    #[tokio::test]
    async fn transfer_moves_funds_and_records() {
        let (store, ids) = store_with(&[100, 100]).await;
        let entry = store
            .transfer(&TransferRequest::new(ids[0], ids[1], Decimal::from(30)))
            .await
            .unwrap();
        assert_eq!(entry.sender, ids[0]);
        assert_eq!(entry.receiver, ids[1]);
        assert_eq!(entry.amount, Decimal::from(30));
        assert_eq!(store.get_wallet(ids[0]).await.unwrap().balance, Decimal::from(70));
        assert_eq!(store.get_wallet(ids[1]).await.unwrap().balance, Decimal::from(130));
        assert_eq!(store.history(ids[0]).await.unwrap(), vec![entry.clone()]);
        assert_eq!(store.history(ids[1]).await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn failed_transfer_changes_nothing() {
        let (store, ids) = store_with(&[70, 130]).await;
        let err = store
            .transfer(&TransferRequest::new(ids[0], ids[1], Decimal::from(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(store.get_wallet(ids[0]).await.unwrap().balance, Decimal::from(70));
        assert_eq!(store.get_wallet(ids[1]).await.unwrap().balance, Decimal::from(130));
        assert_eq!(store.ledger_len().await, 0);
    }

    #[tokio::test]
    async fn repeated_key_is_rejected_before_mutation() {
        let (store, ids) = store_with(&[100, 100]).await;
        let request = TransferRequest::new(ids[0], ids[1], Decimal::from(10)).with_idempotency_key("pay-1");
        assert_ok!(store.transfer(&request).await);
        assert_eq!(store.transfer(&request).await, Err(LedgerError::DuplicateTransaction));
        assert_eq!(store.get_wallet(ids[0]).await.unwrap().balance, Decimal::from(90));
        assert_eq!(store.ledger_len().await, 1);

        let found = store.find_transaction("pay-1").await.unwrap().unwrap();
        assert_eq!(found.amount, Decimal::from(10));
        assert!(store.find_transaction("pay-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn history_excludes_unrelated_wallets() {
        let (store, ids) = store_with(&[100, 100, 100]).await;
        assert_ok!(store.transfer(&TransferRequest::new(ids[0], ids[1], Decimal::from(1))).await);
        assert_ok!(store.transfer(&TransferRequest::new(ids[1], ids[2], Decimal::from(2))).await);
        assert_eq!(store.history(ids[0]).await.unwrap().len(), 1);
        assert_eq!(store.history(ids[1]).await.unwrap().len(), 2);
        assert_eq!(store.history(ids[2]).await.unwrap().len(), 1);
        assert_eq!(store.total_balance().await, Decimal::from(300));
    }

    #[tokio::test]
    async fn credit_overflow_changes_nothing() {
        let (store, ids) = store_with(&[100]).await;
        let rich = Uuid::new_v4();
        assert_ok!(store.insert_wallet(&Wallet::new(rich, Decimal::MAX)).await);

        let err = store
            .transfer(&TransferRequest::new(ids[0], rich, Decimal::ONE))
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::BalanceOverflow(rich));
        assert_eq!(store.get_wallet(ids[0]).await.unwrap().balance, Decimal::from(100));
        assert_eq!(store.get_wallet(rich).await.unwrap().balance, Decimal::MAX);
        assert_eq!(store.ledger_len().await, 0);
    }
}
