//! Deterministic listing identity
//!
//! A listing id is derived purely from the normalized address, so the
//! same place always maps to the same id regardless of which source
//! record or run produced it.

use crate::address::NormalizedAddress;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zipintel_common::{IngestError, Result};

/// Hex length of a listing id (first 16 bytes of SHA-256)
pub const LISTING_ID_LEN: usize = 32;

/// Stable identifier derived from a normalized address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(String);

impl ListingId {
    /// Derive the id for a normalized address
    ///
    /// Pure function of its input: identical normalized addresses yield
    /// identical ids across time and call sites. Fails with
    /// `InvalidAddress` when street or postal code is empty; callers
    /// must not proceed to storage on that error.
    pub fn derive(address: &NormalizedAddress) -> Result<Self> {
        if address.street.is_empty() {
            return Err(IngestError::invalid_address(
                "cannot derive id without a street",
            ));
        }
        if address.postal_code.is_empty() {
            return Err(IngestError::invalid_address(
                "cannot derive id without a postal code",
            ));
        }

        // Canonical field order with an unambiguous separator; the
        // disambiguator slot is always present so adding one later never
        // collides with an address that had none.
        let canonical = format!(
            "{}|{}|{}|{}|{}",
            address.street,
            address.city,
            address.state,
            address.postal_code,
            address.disambiguator.as_deref().unwrap_or(""),
        );

        let digest = Sha256::digest(canonical.as_bytes());
        Ok(ListingId(hex::encode(&digest[..LISTING_ID_LEN / 2])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ListingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
