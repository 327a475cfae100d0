//! Ledger entries and the request that produces them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::WalletId;

/// A completed transfer. Written once by the store that applied it, never updated.
///
/// Serialized with the wire names the HTTP history endpoint has always used:
/// `from`, `to`, `time`, `amount`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    #[serde(rename = "from")]
    pub sender: WalletId,
    #[serde(rename = "to")]
    pub receiver: WalletId,
    #[serde(rename = "time")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(skip)]
    pub idempotency_key: Option<String>,
}

impl Transaction {
    pub fn involves(&self, wallet_id: WalletId) -> bool {
        self.sender == wallet_id || self.receiver == wallet_id
    }
}

/// A validated request to move `amount` from `sender` to `receiver`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferRequest {
    pub sender: WalletId,
    pub receiver: WalletId,
    pub amount: Decimal,
    pub idempotency_key: Option<String>,
}

impl TransferRequest {
    pub fn new(sender: WalletId, receiver: WalletId, amount: Decimal) -> Self {
        Self {
            sender,
            receiver,
            amount,
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Both wallet ids in ascending order. Every store locks in this order so
    /// that opposite-direction transfers between the same pair cannot deadlock.
    pub fn lock_order(&self) -> [WalletId; 2] {
        if self.sender <= self.receiver {
            [self.sender, self.receiver]
        } else {
            [self.receiver, self.sender]
        }
    }

    /// Signed balance change this transfer applies to `wallet_id`.
    pub fn delta_for(&self, wallet_id: WalletId) -> Decimal {
        if wallet_id == self.sender {
            -self.amount
        } else if wallet_id == self.receiver {
            self.amount
        } else {
            Decimal::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn lock_order_ignores_direction() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let forward = TransferRequest::new(a, b, Decimal::ONE);
        let backward = TransferRequest::new(b, a, Decimal::ONE);
        assert_eq!(forward.lock_order(), backward.lock_order());
        let [first, second] = forward.lock_order();
        assert!(first < second);
    }

    #[test]
    fn deltas_balance_out() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let request = TransferRequest::new(a, b, Decimal::from(30));
        assert_eq!(request.delta_for(a), Decimal::from(-30));
        assert_eq!(request.delta_for(b), Decimal::from(30));
        assert_eq!(request.delta_for(a) + request.delta_for(b), Decimal::ZERO);
        assert_eq!(request.delta_for(Uuid::new_v4()), Decimal::ZERO);
    }

    #[test]
    fn history_entry_uses_wire_names() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let tx = Transaction {
            sender: a,
            receiver: b,
            created_at: Utc::now(),
            amount: Decimal::from(30),
            idempotency_key: Some("k-1".to_string()),
        };
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["from"], a.to_string());
        assert_eq!(json["to"], b.to_string());
        assert_eq!(json["amount"], 30.0);
        assert!(json.get("time").is_some());
        assert!(json.get("idempotency_key").is_none());
    }
}
