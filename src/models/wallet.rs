use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::WalletId;

/// A wallet and its current balance. The balance never drops below zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Wallet {
    pub id: WalletId,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
}

impl Wallet {
    pub fn new(id: WalletId, balance: Decimal) -> Self {
        Self { id, balance }
    }

    /// Whether `amount` can leave this wallet without overdrawing it.
    pub fn can_cover(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }
}
