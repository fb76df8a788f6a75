//! Identifier helpers and small validators

use bech32::Bech32m;
use uuid7::uuid7;

use crate::error::{BinderError, ValidationError};

pub const USER_HRP: &str = "user_";
pub const COLLECTION_HRP: &str = "coll_";
pub const WISHLIST_HRP: &str = "wish_";
pub const INTEREST_HRP: &str = "intr_";

// construct a unique record id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> crate::Result<String> {
    let hrp = bech32::Hrp::parse(hrp).map_err(|e| BinderError::Codec(e.to_string()))?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| BinderError::Codec(e.to_string()))?;
    Ok(encode)
}

/// Ids double as storage key segments, so they must be non-empty and NUL free.
pub fn require_id(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    if value.contains('\0') {
        return Err(ValidationError::ReservedCharacter(field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_prefix() {
        let id = new_uuid_to_bech32(INTEREST_HRP).unwrap();
        assert!(id.starts_with("intr_1"));
    }

    #[test]
    fn blank_and_nul_ids_are_rejected() {
        assert_eq!(
            require_id("card_id", "  "),
            Err(ValidationError::MissingField("card_id"))
        );
        assert_eq!(
            require_id("card_id", "a\0b"),
            Err(ValidationError::ReservedCharacter("card_id"))
        );
        assert!(require_id("card_id", "bolt").is_ok());
    }
}
