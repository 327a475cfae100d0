//! Business logic. Handlers stay thin and delegate here.

pub mod auth_service;
pub mod backoff;
pub mod transfer;
pub mod wallet_service;

pub use auth_service::AuthService;
pub use backoff::Backoff;
pub use transfer::TransferCoordinator;
pub use wallet_service::WalletService;
