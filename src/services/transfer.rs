//! Transfer coordination: validation, timeouts and bounded retries around
//! the store's atomic transfer.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use uuid::Uuid;

use super::backoff::Backoff;
use crate::config::Config;
use crate::error::LedgerError;
use crate::ledger::{validate_transfer, LedgerStore};
use crate::models::{Transaction, TransferRequest};

const GENERATED_KEY_PREFIX: &str = "auto-";

pub struct TransferCoordinator {
    store: Arc<dyn LedgerStore>,
    max_attempts: u32,
    attempt_timeout: Duration,
    backoff: Backoff,
}

impl TransferCoordinator {
    pub fn new(store: Arc<dyn LedgerStore>, config: &Config) -> Self {
        Self {
            store,
            max_attempts: config.transfer_max_attempts.max(1),
            attempt_timeout: config.transfer_timeout(),
            backoff: Backoff::transfer_default(),
        }
    }

    pub fn with_backoff_schedule(mut self, schedule: Vec<Duration>) -> Self {
        self.backoff = Backoff::new(schedule);
        self
    }

    /// Move `request.amount` from sender to receiver.
    ///
    /// Deterministic failures (bad amount, self-transfer, unknown wallet,
    /// insufficient funds, reused idempotency key) are returned at once.
    /// `StoreUnavailable` and `Timeout` are retried up to the configured number
    /// of attempts.
    ///
    /// Requests without an idempotency key get a generated one, so a retry
    /// after an attempt whose commit outcome was lost cannot apply twice.
    pub async fn transfer(&self, request: TransferRequest) -> Result<Transaction, LedgerError> {
        validate_transfer(&request)?;

        let request = if request.idempotency_key.is_some() {
            request
        } else {
            request.with_idempotency_key(format!("{}{}", GENERATED_KEY_PREFIX, Uuid::new_v4()))
        };

        let mut backoff = self.backoff.clone();
        let mut attempt = 1;
        loop {
            match self.attempt(&request).await {
                Ok(entry) => {
                    info!(
                        "Transfer committed: {} -> {} amount {} (attempt {})",
                        entry.sender, entry.receiver, entry.amount, attempt
                    );
                    return Ok(entry);
                }
                Err(LedgerError::DuplicateTransaction) if attempt > 1 => {
                    if let Some(entry) = self.recover_committed(&request).await? {
                        info!(
                            "Transfer {} -> {} already committed by an earlier attempt",
                            entry.sender, entry.receiver
                        );
                        return Ok(entry);
                    }
                    warn!("Transfer rejected: idempotency key already used");
                    return Err(LedgerError::DuplicateTransaction);
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = backoff.on_failure();
                    warn!(
                        "Transfer {} -> {} attempt {}/{} failed: {}; retrying in {:?}",
                        request.sender, request.receiver, attempt, self.max_attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    error!(
                        "Transfer {} -> {} failed after {} attempts: {}",
                        request.sender, request.receiver, attempt, err
                    );
                    return Err(err);
                }
                Err(err) => {
                    warn!("Transfer {} -> {} rejected: {}", request.sender, request.receiver, err);
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(&self, request: &TransferRequest) -> Result<Transaction, LedgerError> {
        match tokio::time::timeout(self.attempt_timeout, self.store.transfer(request)).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout(self.attempt_timeout.as_millis() as u64)),
        }
    }

    /// The entry an earlier attempt of this same request committed, if any.
    async fn recover_committed(&self, request: &TransferRequest) -> Result<Option<Transaction>, LedgerError> {
        let Some(key) = request.idempotency_key.as_deref() else {
            return Ok(None);
        };
        let found = self.store.find_transaction(key).await?;
        Ok(found.filter(|entry| {
            entry.sender == request.sender
                && entry.receiver == request.receiver
                && entry.amount == request.amount
        }))
    }
}
