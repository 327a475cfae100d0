//! Shared types: wallets, ledger entries, users and ID aliases.

pub mod ids;
pub mod transaction;
pub mod user;
pub mod wallet;

pub use ids::{parse_uuid, UserId, WalletId};
pub use transaction::{Transaction, TransferRequest};
pub use user::User;
pub use wallet::Wallet;
