//! Turns "add N copies of card C" into a single atomic store operation while
//! keeping one record per (user, card).
use crate::error::{BinderError, Result, ValidationError};
use crate::store::{InventoryStore, Upserted};
use crate::types::{CardSnapshot, InventoryEntry, InventoryKind, Priority};
use crate::utils;

/// Raw client intent. Nothing here is trusted until `validate` has run.
#[derive(Debug, Clone, Default)]
pub struct AddCard {
    pub card_id: String,
    pub quantity: Option<i64>,
    pub priority: Option<String>,
    pub card_data: String, // JSON text of the card as the client saw it
}

impl AddCard {
    pub fn new(card_id: &str, card_data: &str) -> Self {
        Self {
            card_id: card_id.to_string(),
            card_data: card_data.to_string(),
            ..Default::default()
        }
    }
    pub fn quantity(mut self, quantity: i64) -> Self {
        self.quantity = Some(quantity);
        self
    }
    pub fn priority(mut self, priority: &str) -> Self {
        self.priority = Some(priority.to_string());
        self
    }

    /// Checks every field before anything is written. Collection adds ignore
    /// `priority`.
    pub fn validate(&self, kind: InventoryKind) -> std::result::Result<ValidAdd, ValidationError> {
        utils::require_id("card_id", &self.card_id)?;
        let quantity = match self.quantity {
            None => 1,
            Some(q) => positive_quantity(q)?,
        };
        let priority = match (kind, &self.priority) {
            (InventoryKind::Wishlist, Some(raw)) => Some(raw.parse::<Priority>()?),
            _ => None,
        };
        if self.card_data.trim().is_empty() {
            return Err(ValidationError::MissingField("card_data"));
        }
        let card = CardSnapshot::parse(self.card_data.as_str())?;

        Ok(ValidAdd {
            card_id: self.card_id.clone(),
            quantity,
            priority,
            card,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidAdd {
    pub card_id: String,
    pub quantity: u32,
    pub priority: Option<Priority>, // None keeps an existing priority
    pub card: CardSnapshot,
}

fn positive_quantity(raw: i64) -> std::result::Result<u32, ValidationError> {
    match u32::try_from(raw) {
        Ok(q) if q > 0 => Ok(q),
        _ => Err(ValidationError::InvalidQuantity(raw)),
    }
}

/// Additive upsert: an existing record gains `quantity`, otherwise a new one is
/// created. The increment happens inside the store, so concurrent adds on the
/// same key are linearised and none is lost.
pub fn add<S: InventoryStore + ?Sized>(
    store: &S,
    kind: InventoryKind,
    user_id: &str,
    request: &AddCard,
) -> Result<Upserted> {
    utils::require_id("user_id", user_id)?;
    let valid = request.validate(kind)?;

    let mut candidate = InventoryEntry::new(
        kind,
        user_id,
        &valid.card_id,
        valid.quantity,
        valid.priority,
        valid.card,
    )?;
    candidate.priority = valid.priority;
    store.add_or_insert(candidate)
}

/// Idempotent: `false` when nothing matched.
pub fn remove<S: InventoryStore + ?Sized>(
    store: &S,
    kind: InventoryKind,
    user_id: &str,
    card_id: &str,
) -> Result<bool> {
    utils::require_id("user_id", user_id)?;
    utils::require_id("card_id", card_id)?;
    store.remove(user_id, card_id, kind)
}

pub fn clear<S: InventoryStore + ?Sized>(
    store: &S,
    kind: InventoryKind,
    user_id: &str,
) -> Result<usize> {
    utils::require_id("user_id", user_id)?;
    store.clear(user_id, kind)
}

/// Overwrites the quantity of an existing record. Zero is allowed and keeps the
/// record; a missing record is an error since the caller expected one.
pub fn set_quantity<S: InventoryStore + ?Sized>(
    store: &S,
    kind: InventoryKind,
    user_id: &str,
    card_id: &str,
    quantity: i64,
) -> Result<InventoryEntry> {
    utils::require_id("user_id", user_id)?;
    utils::require_id("card_id", card_id)?;
    let quantity = u32::try_from(quantity).map_err(|_| ValidationError::InvalidQuantity(quantity))?;

    store
        .update_quantity(user_id, card_id, kind, quantity)?
        .ok_or_else(|| BinderError::not_found(kind.as_str(), format!("{user_id}/{card_id}")))
}
