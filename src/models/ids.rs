//! Type aliases for entity IDs. Wallets and users are UUIDs; validation happens at parse boundaries.

use uuid::Uuid;

pub type UserId = Uuid;
pub type WalletId = Uuid;

/// Parse a string into a UUID or return an error message. Use at API boundaries.
pub fn parse_uuid(id: &str, name: &str) -> Result<Uuid, String> {
    Uuid::parse_str(id.trim()).map_err(|e| format!("Invalid {}: {}", name, e))
}
