//! Repository traits for every persisted entity, with an in-memory and a sled
//! backed implementation that share the same semantics.
//!
//! Inventory records are addressed by (user id, card id, kind). The key is the
//! uniqueness constraint, so a backend can never hold two records for one pair.
//! Read-modify-write cycles that must not lose updates (`add_or_insert`,
//! `upsert_profile`, `update_interest`) run inside the backend, serialised per key.

mod memory;
mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

use crate::error::Result;
use crate::interest::TradeInterest;
use crate::profile::TradingProfile;
use crate::types::{InventoryEntry, InventoryKind, Priority, User};

/// Result of an atomic add: the stored record and whether it was newly created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    pub entry: InventoryEntry,
    pub created: bool,
}

pub trait InventoryStore: Send + Sync {
    /// All records of `kind` owned by `user_id`, ordered by card id.
    fn list_by_user(&self, user_id: &str, kind: InventoryKind) -> Result<Vec<InventoryEntry>>;

    fn find_by_user_and_card(
        &self,
        user_id: &str,
        card_id: &str,
        kind: InventoryKind,
    ) -> Result<Option<InventoryEntry>>;

    /// Stores `entry` under its (user, card) key, replacing any record already there.
    fn insert(&self, entry: InventoryEntry) -> Result<InventoryEntry>;

    /// Overwrites the quantity. `None` when no record matches.
    fn update_quantity(
        &self,
        user_id: &str,
        card_id: &str,
        kind: InventoryKind,
        quantity: u32,
    ) -> Result<Option<InventoryEntry>>;

    /// Replaces the whole record keyed like `entry`. `None` when no record matches.
    fn replace(&self, entry: InventoryEntry) -> Result<Option<InventoryEntry>>;

    fn remove(&self, user_id: &str, card_id: &str, kind: InventoryKind) -> Result<bool>;

    /// Deletes every record of `kind` for the user and returns how many went.
    fn clear(&self, user_id: &str, kind: InventoryKind) -> Result<usize>;

    /// Atomically adds `candidate.quantity` to the existing record for the
    /// candidate's key, or stores the candidate when none exists. A `Some`
    /// priority on the candidate replaces the stored one on increment.
    fn add_or_insert(&self, candidate: InventoryEntry) -> Result<Upserted>;

    /// Every record of `kind` across all users.
    fn list_all(&self, kind: InventoryKind) -> Result<Vec<InventoryEntry>>;
}

pub trait UserStore: Send + Sync {
    /// Fails with `DuplicateUsername` when the username is already registered.
    fn create_user(&self, user: User) -> Result<User>;
    fn get_user(&self, user_id: &str) -> Result<Option<User>>;
    fn find_by_username(&self, username: &str) -> Result<Option<User>>;
    /// Ordered by user id.
    fn list_users(&self) -> Result<Vec<User>>;
}

pub trait ProfileStore: Send + Sync {
    fn get_profile(&self, user_id: &str) -> Result<Option<TradingProfile>>;

    /// Atomically replaces the profile with `apply(current)`. `apply` may run
    /// more than once under contention and must be pure.
    fn upsert_profile(
        &self,
        user_id: &str,
        apply: &dyn Fn(Option<&TradingProfile>) -> TradingProfile,
    ) -> Result<TradingProfile>;

    fn list_profiles(&self) -> Result<Vec<TradingProfile>>;
}

pub trait InterestStore: Send + Sync {
    fn insert_interest(&self, interest: TradeInterest) -> Result<TradeInterest>;
    fn get_interest(&self, interest_id: &str) -> Result<Option<TradeInterest>>;
    /// Ordered by creation time.
    fn list_interests(&self) -> Result<Vec<TradeInterest>>;

    /// Atomically replaces the interest with `apply(current)`. An error from
    /// `apply` leaves the stored record untouched. Unknown ids yield `NotFound`.
    fn update_interest(
        &self,
        interest_id: &str,
        apply: &dyn Fn(&TradeInterest) -> Result<TradeInterest>,
    ) -> Result<TradeInterest>;
}

/// Everything the binder needs from a backend.
pub trait Repository: InventoryStore + UserStore + ProfileStore + InterestStore {}

impl<T> Repository for T where T: InventoryStore + UserStore + ProfileStore + InterestStore {}

pub(crate) fn entry_key(user_id: &str, card_id: &str) -> String {
    format!("{user_id}\0{card_id}")
}

pub(crate) fn user_prefix(user_id: &str) -> String {
    format!("{user_id}\0")
}

/// Applies an increment to an existing record.
pub(crate) fn merge_increment(existing: &InventoryEntry, candidate: &InventoryEntry) -> InventoryEntry {
    let mut merged = existing.clone();
    merged.quantity = existing.quantity.saturating_add(candidate.quantity);
    if let (Some(priority), InventoryKind::Wishlist) = (candidate.priority, existing.kind) {
        merged.priority = Some(priority);
    }
    merged.updated_at = crate::types::TimeStamp::after(&existing.updated_at);
    merged
}

pub(crate) fn sort_interests(interests: &mut [TradeInterest]) {
    interests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

/// A candidate about to be stored fresh. Wishlist records always carry a priority.
pub(crate) fn fresh_entry(mut candidate: InventoryEntry) -> InventoryEntry {
    if candidate.kind == InventoryKind::Wishlist && candidate.priority.is_none() {
        candidate.priority = Some(Priority::default());
    }
    candidate
}
