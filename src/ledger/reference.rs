//! Transaction reference generation.
//!
//! References are `TXN-` followed by 128 bits from the OS entropy source,
//! hex encoded (32 lowercase characters). No shared counter is involved, so
//! concurrent callers need no coordination; uniqueness is additionally
//! enforced by the store's unique constraint.

use rand::TryRngCore;
use rand::rngs::OsRng;

use super::error::LedgerError;

/// Fixed tag every reference starts with.
pub const REFERENCE_PREFIX: &str = "TXN-";

/// Generate a fresh transaction reference.
///
/// # Errors
///
/// `EntropyUnavailable` if the OS random source fails.
pub fn generate() -> Result<String, LedgerError> {
    let mut bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| LedgerError::EntropyUnavailable(e.to_string()))?;
    Ok(format!("{REFERENCE_PREFIX}{}", hex::encode(bytes)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn reference_has_prefix_and_32_hex_chars() {
        let reference = generate().unwrap();
        let body = reference.strip_prefix(REFERENCE_PREFIX).unwrap();
        assert_eq!(body.len(), 32);
        assert!(body.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn ten_thousand_references_are_distinct() {
        let references: HashSet<String> = (0..10_000).map(|_| generate().unwrap()).collect();
        assert_eq!(references.len(), 10_000);
    }
}
