//! Service layer API for the binder: inventory, matching, trade interests and profiles
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::advisor::DeckRequest;
use crate::error::{BinderError, Result};
use crate::interest::{self, NewInterest, TradeInterest};
use crate::matcher::{self, CardIndex, TradeMatch};
use crate::pricing::{self, RefreshReport, Valuation};
use crate::profile::{self, ProfilePatch, TradingProfile};
use crate::provider::CardProvider;
use crate::reconciler::{self, AddCard};
use crate::store::{InterestStore, InventoryStore, Repository, Upserted, UserStore};
use crate::types::{InventoryEntry, InventoryKind, TimeStamp, User};
use crate::utils;

pub struct Binder<S: Repository> {
    instance: Arc<S>,
    // mirrors the stored inventory; every mutation below re-syncs the touched keys
    index: RwLock<CardIndex>,
}

impl<S: Repository> Binder<S> {
    /// Wraps a backend and builds the card index from what it already holds.
    pub fn new(instance: Arc<S>) -> Result<Self> {
        let index = CardIndex::rebuild(instance.as_ref())?;
        Ok(Self {
            instance,
            index: RwLock::new(index),
        })
    }

    pub fn store(&self) -> &S {
        &self.instance
    }

    /// Drops the index and rebuilds it from storage.
    pub fn rebuild_index(&self) -> Result<()> {
        let fresh = CardIndex::rebuild(self.instance.as_ref())?;
        *self.index.write() = fresh;
        info!("card index rebuilt");
        Ok(())
    }

    // Re-reads the key under the index lock so the last writer always leaves
    // the index matching storage.
    fn sync_key(&self, kind: InventoryKind, user_id: &str, card_id: &str) -> Result<()> {
        let mut index = self.index.write();
        let current = self
            .instance
            .find_by_user_and_card(user_id, card_id, kind)?;
        index.sync(kind, user_id, card_id, current.as_ref());
        Ok(())
    }

    fn sync_user(&self, kind: InventoryKind, user_id: &str) -> Result<()> {
        let mut index = self.index.write();
        index.forget_user(kind, user_id);
        for entry in self.instance.list_by_user(user_id, kind)? {
            index.record(&entry);
        }
        Ok(())
    }

    // ----- users -----

    pub fn register_user(&self, username: &str) -> Result<User> {
        utils::require_id("username", username)?;
        let user = User {
            id: utils::new_uuid_to_bech32(utils::USER_HRP)?,
            username: username.trim().to_string(),
            created_at: TimeStamp::new(),
        };
        let user = self.instance.create_user(user)?;
        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(user)
    }

    pub fn user(&self, user_id: &str) -> Result<User> {
        utils::require_id("user_id", user_id)?;
        self.instance
            .get_user(user_id)?
            .ok_or_else(|| BinderError::not_found("user", user_id))
    }

    pub fn users(&self) -> Result<Vec<User>> {
        self.instance.list_users()
    }

    // ----- inventory -----

    fn add(&self, kind: InventoryKind, user_id: &str, request: &AddCard) -> Result<InventoryEntry> {
        let Upserted { entry, created } = reconciler::add(self.instance.as_ref(), kind, user_id, request)?;
        self.sync_key(kind, user_id, &entry.card_id)?;
        info!(
            %kind,
            user_id,
            card_id = %entry.card_id,
            quantity = entry.quantity,
            created,
            "inventory upserted"
        );
        Ok(entry)
    }

    fn remove(&self, kind: InventoryKind, user_id: &str, card_id: &str) -> Result<bool> {
        let removed = reconciler::remove(self.instance.as_ref(), kind, user_id, card_id)?;
        self.sync_key(kind, user_id, card_id)?;
        if removed {
            info!(%kind, user_id, card_id, "inventory record removed");
        } else {
            debug!(%kind, user_id, card_id, "nothing to remove");
        }
        Ok(removed)
    }

    fn clear(&self, kind: InventoryKind, user_id: &str) -> Result<usize> {
        let removed = reconciler::clear(self.instance.as_ref(), kind, user_id)?;
        self.sync_user(kind, user_id)?;
        info!(%kind, user_id, removed, "inventory cleared");
        Ok(removed)
    }

    fn list(&self, kind: InventoryKind, user_id: &str) -> Result<Vec<InventoryEntry>> {
        utils::require_id("user_id", user_id)?;
        let entries = self.instance.list_by_user(user_id, kind)?;
        debug!(%kind, user_id, count = entries.len(), "inventory listed");
        Ok(entries)
    }

    pub fn add_to_collection(&self, user_id: &str, request: &AddCard) -> Result<InventoryEntry> {
        self.add(InventoryKind::Collection, user_id, request)
    }

    pub fn remove_from_collection(&self, user_id: &str, card_id: &str) -> Result<bool> {
        self.remove(InventoryKind::Collection, user_id, card_id)
    }

    pub fn clear_collection(&self, user_id: &str) -> Result<usize> {
        self.clear(InventoryKind::Collection, user_id)
    }

    pub fn collection(&self, user_id: &str) -> Result<Vec<InventoryEntry>> {
        self.list(InventoryKind::Collection, user_id)
    }

    pub fn add_to_wishlist(&self, user_id: &str, request: &AddCard) -> Result<InventoryEntry> {
        self.add(InventoryKind::Wishlist, user_id, request)
    }

    pub fn remove_from_wishlist(&self, user_id: &str, card_id: &str) -> Result<bool> {
        self.remove(InventoryKind::Wishlist, user_id, card_id)
    }

    pub fn clear_wishlist(&self, user_id: &str) -> Result<usize> {
        self.clear(InventoryKind::Wishlist, user_id)
    }

    pub fn wishlist(&self, user_id: &str) -> Result<Vec<InventoryEntry>> {
        self.list(InventoryKind::Wishlist, user_id)
    }

    /// Overwrites the quantity of an existing record. Zero keeps the record.
    pub fn set_quantity(
        &self,
        kind: InventoryKind,
        user_id: &str,
        card_id: &str,
        quantity: i64,
    ) -> Result<InventoryEntry> {
        let entry = reconciler::set_quantity(self.instance.as_ref(), kind, user_id, card_id, quantity)?;
        self.sync_key(kind, user_id, card_id)?;
        info!(%kind, user_id, card_id, quantity = entry.quantity, "quantity set");
        Ok(entry)
    }

    // ----- profiles -----

    pub fn trading_profile(&self, user_id: &str) -> Result<Option<TradingProfile>> {
        profile::get(self.instance.as_ref(), user_id)
    }

    /// Creates the profile on first use. Fields absent from `patch` keep their values.
    pub fn update_trading_profile(&self, user_id: &str, patch: &ProfilePatch) -> Result<TradingProfile> {
        let updated = profile::create_or_update(self.instance.as_ref(), user_id, patch)?;
        info!(user_id, is_trading = updated.is_trading, "trading profile saved");
        Ok(updated)
    }

    pub fn adjust_reputation(&self, user_id: &str, delta: i64) -> Result<TradingProfile> {
        let updated = profile::adjust_reputation(self.instance.as_ref(), user_id, delta)?;
        info!(user_id, delta, reputation = updated.reputation, "reputation adjusted");
        Ok(updated)
    }

    pub fn record_completed_trade(&self, user_id: &str) -> Result<TradingProfile> {
        let updated = profile::record_completed_trade(self.instance.as_ref(), user_id)?;
        info!(user_id, completed_trades = updated.completed_trades, "completed trade recorded");
        Ok(updated)
    }

    pub fn trading_users(&self) -> Result<Vec<TradingProfile>> {
        profile::trading_users(self.instance.as_ref())
    }

    // ----- matching -----

    /// Index driven matching. Ordered by the partner's user id.
    pub fn find_trade_matches(&self, user_id: &str) -> Result<Vec<TradeMatch>> {
        utils::require_id("user_id", user_id)?;
        let index = self.index.read();
        let matches = matcher::indexed_matches(self.instance.as_ref(), &index, user_id)?;
        debug!(user_id, matches = matches.len(), "trade matches computed");
        Ok(matches)
    }

    /// Full scan over every user. Same result as [`Self::find_trade_matches`].
    pub fn scan_trade_matches(&self, user_id: &str) -> Result<Vec<TradeMatch>> {
        utils::require_id("user_id", user_id)?;
        matcher::scan_matches(self.instance.as_ref(), user_id)
    }

    // ----- trade interests -----

    pub fn create_trade_interest(&self, request: NewInterest) -> Result<TradeInterest> {
        let created = interest::create(self.instance.as_ref(), request)?;
        info!(
            interest_id = %created.id,
            from = %created.from_user_id,
            to = %created.to_user_id,
            cards = created.cards.len(),
            "trade interest created"
        );
        Ok(created)
    }

    pub fn trade_interest(&self, interest_id: &str) -> Result<TradeInterest> {
        utils::require_id("interest_id", interest_id)?;
        self.instance
            .get_interest(interest_id)?
            .ok_or_else(|| BinderError::not_found("trade interest", interest_id))
    }

    /// Interests the user sent or received, oldest first.
    pub fn trade_interests_for(&self, user_id: &str) -> Result<Vec<TradeInterest>> {
        utils::require_id("user_id", user_id)?;
        interest::list_for_user(self.instance.as_ref(), user_id)
    }

    /// Moves an interest along the lifecycle. Rejected moves leave it untouched.
    pub fn update_trade_interest_status(&self, interest_id: &str, status: &str) -> Result<TradeInterest> {
        let updated = interest::set_status(self.instance.as_ref(), interest_id, status)?;
        info!(interest_id, status = %updated.status, "trade interest status changed");
        Ok(updated)
    }

    // ----- pricing and advice -----

    /// Value of the stored snapshots. No provider is consulted.
    pub fn valuation(&self, user_id: &str, kind: InventoryKind) -> Result<Valuation> {
        let entries = self.list(kind, user_id)?;
        Ok(pricing::value_entries(&entries))
    }

    /// Pulls current prices for every record of `kind` and rewrites the
    /// snapshots whose prices moved.
    pub fn refresh_pricing<P: CardProvider + ?Sized>(
        &self,
        user_id: &str,
        kind: InventoryKind,
        provider: &P,
    ) -> Result<RefreshReport> {
        let entries = self.list(kind, user_id)?;
        pricing::refresh_entries(self.instance.as_ref(), provider, entries)
    }

    /// Deck request seeded with the names of the cards the user owns.
    pub fn deck_request(&self, user_id: &str, format: &str) -> Result<DeckRequest> {
        let owned_cards = self
            .collection(user_id)?
            .into_iter()
            .filter(|entry| entry.quantity > 0)
            .filter_map(|entry| entry.card.name())
            .collect();
        Ok(DeckRequest {
            format: format.trim().to_string(),
            owned_cards,
            ..Default::default()
        })
    }
}
