//! Trade matching by card id intersection.
//!
//! For a user U and candidate V:
//! - `have` is V's collection restricted to cards on U's wishlist
//! - `want` is V's wishlist restricted to cards in U's collection
//!
//! V is reported when either side is non-empty. Quantities, finishes and
//! priorities play no part, and zero-quantity records count as absent.
use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::error::Result;
use crate::store::{InventoryStore, UserStore};
use crate::types::{InventoryEntry, InventoryKind, User};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeMatch {
    pub user: User,
    pub have: Vec<InventoryEntry>,
    pub want: Vec<InventoryEntry>,
}

/// U's side of the comparison, loaded once per query.
struct Needs {
    wanted: HashSet<String>,
    owned: HashSet<String>,
}

impl Needs {
    fn load<S: InventoryStore + ?Sized>(store: &S, user_id: &str) -> Result<Self> {
        let cards = |kind: InventoryKind| -> Result<HashSet<String>> {
            Ok(store
                .list_by_user(user_id, kind)?
                .into_iter()
                .filter(|entry| entry.quantity > 0)
                .map(|entry| entry.card_id)
                .collect())
        };
        Ok(Self {
            wanted: cards(InventoryKind::Wishlist)?,
            owned: cards(InventoryKind::Collection)?,
        })
    }

    fn is_empty(&self) -> bool {
        self.wanted.is_empty() && self.owned.is_empty()
    }

    fn compare<S: InventoryStore + ?Sized>(&self, store: &S, candidate: User) -> Result<Option<TradeMatch>> {
        let have: Vec<InventoryEntry> = store
            .list_by_user(&candidate.id, InventoryKind::Collection)?
            .into_iter()
            .filter(|entry| entry.quantity > 0 && self.wanted.contains(&entry.card_id))
            .collect();
        let want: Vec<InventoryEntry> = store
            .list_by_user(&candidate.id, InventoryKind::Wishlist)?
            .into_iter()
            .filter(|entry| entry.quantity > 0 && self.owned.contains(&entry.card_id))
            .collect();

        if have.is_empty() && want.is_empty() {
            return Ok(None);
        }
        Ok(Some(TradeMatch {
            user: candidate,
            have,
            want,
        }))
    }
}

/// Full scan over every known user. O(users × inventory size).
pub fn scan_matches<S: InventoryStore + UserStore + ?Sized>(
    store: &S,
    user_id: &str,
) -> Result<Vec<TradeMatch>> {
    let needs = Needs::load(store, user_id)?;
    if needs.is_empty() {
        return Ok(vec![]);
    }

    let mut matches = vec![];
    for candidate in store.list_users()? {
        if candidate.id == user_id {
            continue;
        }
        if let Some(found) = needs.compare(store, candidate)? {
            matches.push(found);
        }
    }
    matches.sort_by(|a, b| a.user.id.cmp(&b.user.id));
    Ok(matches)
}

/// Same result as [`scan_matches`], but only users the index links to one of
/// U's cards are loaded.
pub fn indexed_matches<S: InventoryStore + UserStore + ?Sized>(
    store: &S,
    index: &CardIndex,
    user_id: &str,
) -> Result<Vec<TradeMatch>> {
    let needs = Needs::load(store, user_id)?;
    if needs.is_empty() {
        return Ok(vec![]);
    }

    let mut matches = vec![];
    for candidate_id in index.candidates(&needs.wanted, &needs.owned) {
        if candidate_id == user_id {
            continue;
        }
        // the index knows inventory owners, not registered users
        let Some(candidate) = store.get_user(&candidate_id)? else {
            continue;
        };
        if let Some(found) = needs.compare(store, candidate)? {
            matches.push(found);
        }
    }
    Ok(matches)
}

/// Inverted index: card id → users holding it, card id → users seeking it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CardIndex {
    holders: HashMap<String, BTreeSet<String>>,
    seekers: HashMap<String, BTreeSet<String>>,
}

impl CardIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild<S: InventoryStore + ?Sized>(store: &S) -> Result<Self> {
        let mut index = Self::new();
        for kind in [InventoryKind::Collection, InventoryKind::Wishlist] {
            for entry in store.list_all(kind)? {
                index.record(&entry);
            }
        }
        Ok(index)
    }

    fn side_mut(&mut self, kind: InventoryKind) -> &mut HashMap<String, BTreeSet<String>> {
        match kind {
            InventoryKind::Collection => &mut self.holders,
            InventoryKind::Wishlist => &mut self.seekers,
        }
    }

    /// Mirrors one stored record. Zero quantities are dropped from the index.
    pub fn record(&mut self, entry: &InventoryEntry) {
        if entry.quantity == 0 {
            self.forget(entry.kind, &entry.user_id, &entry.card_id);
            return;
        }
        self.side_mut(entry.kind)
            .entry(entry.card_id.clone())
            .or_default()
            .insert(entry.user_id.clone());
    }

    pub fn forget(&mut self, kind: InventoryKind, user_id: &str, card_id: &str) {
        let side = self.side_mut(kind);
        if let Some(users) = side.get_mut(card_id) {
            users.remove(user_id);
            if users.is_empty() {
                side.remove(card_id);
            }
        }
    }

    pub fn forget_user(&mut self, kind: InventoryKind, user_id: &str) {
        let side = self.side_mut(kind);
        side.retain(|_, users| {
            users.remove(user_id);
            !users.is_empty()
        });
    }

    /// Sets the index entry for one key to whatever the store holds now.
    pub fn sync(&mut self, kind: InventoryKind, user_id: &str, card_id: &str, current: Option<&InventoryEntry>) {
        match current {
            Some(entry) => self.record(entry),
            None => self.forget(kind, user_id, card_id),
        }
    }

    pub fn holders_of(&self, card_id: &str) -> impl Iterator<Item = &str> {
        self.holders.get(card_id).into_iter().flatten().map(String::as_str)
    }

    pub fn seekers_of(&self, card_id: &str) -> impl Iterator<Item = &str> {
        self.seekers.get(card_id).into_iter().flatten().map(String::as_str)
    }

    /// Users holding something on `wanted` or seeking something in `owned`,
    /// ordered by user id.
    pub fn candidates(&self, wanted: &HashSet<String>, owned: &HashSet<String>) -> BTreeSet<String> {
        let mut candidates = BTreeSet::new();
        for card in wanted {
            candidates.extend(self.holders_of(card).map(str::to_string));
        }
        for card in owned {
            candidates.extend(self.seekers_of(card).map(str::to_string));
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CardSnapshot;

    fn entry(kind: InventoryKind, user: &str, card: &str, quantity: u32) -> InventoryEntry {
        let snapshot = CardSnapshot::parse(format!(r#"{{"name":"{card}"}}"#)).unwrap();
        InventoryEntry::new(kind, user, card, quantity, None, snapshot).unwrap()
    }

    #[test]
    fn index_tracks_holders_and_seekers() {
        let mut index = CardIndex::new();
        index.record(&entry(InventoryKind::Collection, "v", "bolt", 2));
        index.record(&entry(InventoryKind::Wishlist, "w", "bolt", 1));

        assert_eq!(index.holders_of("bolt").collect::<Vec<_>>(), vec!["v"]);
        assert_eq!(index.seekers_of("bolt").collect::<Vec<_>>(), vec!["w"]);

        index.forget(InventoryKind::Collection, "v", "bolt");
        assert_eq!(index.holders_of("bolt").count(), 0);
    }

    #[test]
    fn zero_quantity_leaves_the_index() {
        let mut index = CardIndex::new();
        index.record(&entry(InventoryKind::Collection, "v", "bolt", 2));
        index.record(&entry(InventoryKind::Collection, "v", "bolt", 0));
        assert_eq!(index, CardIndex::new());
    }

    #[test]
    fn forget_user_drops_empty_cards() {
        let mut index = CardIndex::new();
        index.record(&entry(InventoryKind::Wishlist, "v", "bolt", 1));
        index.record(&entry(InventoryKind::Wishlist, "v", "forest", 1));
        index.record(&entry(InventoryKind::Wishlist, "w", "forest", 1));
        index.forget_user(InventoryKind::Wishlist, "v");

        assert_eq!(index.seekers_of("bolt").count(), 0);
        assert_eq!(index.seekers_of("forest").collect::<Vec<_>>(), vec!["w"]);
    }

    #[test]
    fn candidates_combine_both_directions() {
        let mut index = CardIndex::new();
        index.record(&entry(InventoryKind::Collection, "v", "bolt", 1));
        index.record(&entry(InventoryKind::Wishlist, "w", "forest", 1));
        index.record(&entry(InventoryKind::Wishlist, "x", "island", 1));

        let wanted = HashSet::from(["bolt".to_string()]);
        let owned = HashSet::from(["forest".to_string()]);
        let candidates: Vec<String> = index.candidates(&wanted, &owned).into_iter().collect();
        assert_eq!(candidates, vec!["v".to_string(), "w".to_string()]);
    }
}
