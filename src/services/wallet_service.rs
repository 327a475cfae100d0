use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::ledger::LedgerStore;
use crate::models::{Transaction, Wallet, WalletId};

/// How many fresh identifiers to try before giving up on a wallet insert.
pub const MAX_ID_ATTEMPTS: usize = 5;

pub struct WalletService {
    store: Arc<dyn LedgerStore>,
    seed_balance: Decimal,
}

impl WalletService {
    pub fn new(store: Arc<dyn LedgerStore>, seed_balance: Decimal) -> Self {
        Self { store, seed_balance }
    }

    /// Create a wallet holding the seed balance under a random v4 id.
    pub async fn create_wallet(&self) -> Result<Wallet, LedgerError> {
        self.create_wallet_with(Uuid::new_v4).await
    }

    /// Create a wallet, drawing ids from `next_id` until one is free.
    pub async fn create_wallet_with<F>(&self, mut next_id: F) -> Result<Wallet, LedgerError>
    where
        F: FnMut() -> WalletId + Send,
    {
        let mut last_err = None;
        for _ in 0..MAX_ID_ATTEMPTS {
            let wallet = Wallet::new(next_id(), self.seed_balance);
            match self.store.insert_wallet(&wallet).await {
                Ok(()) => {
                    info!("Wallet {} created with balance {}", wallet.id, wallet.balance);
                    return Ok(wallet);
                }
                Err(LedgerError::DuplicateWallet(id)) => {
                    warn!("Wallet id {} already taken, regenerating", id);
                    last_err = Some(LedgerError::DuplicateWallet(id));
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| LedgerError::StoreUnavailable("no wallet id attempts made".to_string())))
    }

    pub async fn get_state(&self, id: WalletId) -> Result<Wallet, LedgerError> {
        self.store.get_wallet(id).await
    }

    /// Ledger entries touching the wallet, oldest first. Unknown wallets are
    /// an error rather than an empty history.
    pub async fn history(&self, id: WalletId) -> Result<Vec<Transaction>, LedgerError> {
        self.store.get_wallet(id).await?;
        self.store.history(id).await
    }
}
