//! Durable backend on sled. One tree per entity, values encoded with minicbor.
//!
//! Atomic read-modify-write goes through `Tree::update_and_fetch`, which retries
//! a compare-and-swap until it wins, so concurrent writers on one key never lose
//! an update and writers on different keys never wait on each other.
use std::path::Path;
use std::sync::Arc;

use sled::{Batch, Db, Tree};

use super::{
    InterestStore, InventoryStore, ProfileStore, Upserted, UserStore, entry_key, fresh_entry,
    merge_increment, sort_interests, user_prefix,
};
use crate::error::{BinderError, Result};
use crate::interest::TradeInterest;
use crate::profile::TradingProfile;
use crate::types::{InventoryEntry, InventoryKind, TimeStamp, User};

pub struct SledStore {
    instance: Arc<Db>,
    collections: Tree,
    wishlists: Tree,
    users: Tree,
    usernames: Tree,
    profiles: Tree,
    interests: Tree,
}

fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>> {
    Ok(minicbor::to_vec(value)?)
}

fn decode<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> Result<T> {
    Ok(minicbor::decode(bytes)?)
}

fn decode_all<T: for<'b> minicbor::Decode<'b, ()>>(
    iter: impl Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>,
) -> Result<Vec<T>> {
    iter.map(|item| {
        let (_, value) = item?;
        decode(&value)
    })
    .collect()
}

impl SledStore {
    pub fn new(instance: Arc<Db>) -> Result<Self> {
        Ok(Self {
            collections: instance.open_tree("collections")?,
            wishlists: instance.open_tree("wishlists")?,
            users: instance.open_tree("users")?,
            usernames: instance.open_tree("usernames")?,
            profiles: instance.open_tree("profiles")?,
            interests: instance.open_tree("interests")?,
            instance,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(Arc::new(sled::open(path)?))
    }

    /// Database that lives only as long as this process.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::new(Arc::new(db))
    }

    pub fn flush(&self) -> Result<usize> {
        Ok(self.instance.flush()?)
    }

    fn tree(&self, kind: InventoryKind) -> &Tree {
        match kind {
            InventoryKind::Collection => &self.collections,
            InventoryKind::Wishlist => &self.wishlists,
        }
    }

    /// Rewrites an existing inventory record in place. Absent keys stay absent.
    fn rewrite_entry(
        &self,
        kind: InventoryKind,
        key: &str,
        change: impl Fn(InventoryEntry) -> InventoryEntry,
    ) -> Result<Option<InventoryEntry>> {
        let mut failure: Option<BinderError> = None;
        let stored = self.tree(kind).update_and_fetch(key.as_bytes(), |old| {
            failure = None;
            let bytes = old?;
            match decode::<InventoryEntry>(bytes).and_then(|entry| encode(&change(entry))) {
                Ok(next) => Some(next),
                Err(err) => {
                    failure = Some(err);
                    Some(bytes.to_vec())
                }
            }
        })?;
        if let Some(err) = failure {
            return Err(err);
        }
        stored.map(|bytes| decode(&bytes)).transpose()
    }
}

impl InventoryStore for SledStore {
    fn list_by_user(&self, user_id: &str, kind: InventoryKind) -> Result<Vec<InventoryEntry>> {
        decode_all(self.tree(kind).scan_prefix(user_prefix(user_id).as_bytes()))
    }

    fn find_by_user_and_card(
        &self,
        user_id: &str,
        card_id: &str,
        kind: InventoryKind,
    ) -> Result<Option<InventoryEntry>> {
        self.tree(kind)
            .get(entry_key(user_id, card_id).as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn insert(&self, entry: InventoryEntry) -> Result<InventoryEntry> {
        let entry = fresh_entry(entry);
        let key = entry_key(&entry.user_id, &entry.card_id);
        self.tree(entry.kind).insert(key.as_bytes(), encode(&entry)?)?;
        Ok(entry)
    }

    fn update_quantity(
        &self,
        user_id: &str,
        card_id: &str,
        kind: InventoryKind,
        quantity: u32,
    ) -> Result<Option<InventoryEntry>> {
        self.rewrite_entry(kind, &entry_key(user_id, card_id), |mut entry| {
            entry.quantity = quantity;
            entry.updated_at = TimeStamp::after(&entry.updated_at);
            entry
        })
    }

    fn replace(&self, entry: InventoryEntry) -> Result<Option<InventoryEntry>> {
        let key = entry_key(&entry.user_id, &entry.card_id);
        self.rewrite_entry(entry.kind, &key, |_| entry.clone())
    }

    fn remove(&self, user_id: &str, card_id: &str, kind: InventoryKind) -> Result<bool> {
        Ok(self
            .tree(kind)
            .remove(entry_key(user_id, card_id).as_bytes())?
            .is_some())
    }

    fn clear(&self, user_id: &str, kind: InventoryKind) -> Result<usize> {
        let tree = self.tree(kind);
        let mut batch = Batch::default();
        let mut removed = 0;
        for item in tree.scan_prefix(user_prefix(user_id).as_bytes()) {
            let (key, _) = item?;
            batch.remove(key);
            removed += 1;
        }
        tree.apply_batch(batch)?;
        Ok(removed)
    }

    fn add_or_insert(&self, candidate: InventoryEntry) -> Result<Upserted> {
        let key = entry_key(&candidate.user_id, &candidate.card_id);
        let mut failure: Option<BinderError> = None;
        let mut created = false;

        let stored = self
            .tree(candidate.kind)
            .update_and_fetch(key.as_bytes(), |old| {
                failure = None;
                match old {
                    Some(bytes) => {
                        created = false;
                        let merged = decode::<InventoryEntry>(bytes)
                            .and_then(|existing| encode(&merge_increment(&existing, &candidate)));
                        match merged {
                            Ok(next) => Some(next),
                            Err(err) => {
                                failure = Some(err);
                                Some(bytes.to_vec())
                            }
                        }
                    }
                    None => {
                        created = true;
                        match encode(&fresh_entry(candidate.clone())) {
                            Ok(next) => Some(next),
                            Err(err) => {
                                failure = Some(err);
                                None
                            }
                        }
                    }
                }
            })?;

        if let Some(err) = failure {
            return Err(err);
        }
        let bytes = stored.ok_or_else(|| BinderError::Codec("upsert produced no record".into()))?;
        Ok(Upserted {
            entry: decode(&bytes)?,
            created,
        })
    }

    fn list_all(&self, kind: InventoryKind) -> Result<Vec<InventoryEntry>> {
        decode_all(self.tree(kind).iter())
    }
}

impl UserStore for SledStore {
    fn create_user(&self, user: User) -> Result<User> {
        // reserve the username first; the swap only succeeds when it is unclaimed
        let claimed = self.usernames.compare_and_swap(
            user.username.as_bytes(),
            None::<&[u8]>,
            Some(user.id.as_bytes()),
        )?;
        if claimed.is_err() {
            return Err(BinderError::DuplicateUsername(user.username));
        }

        let stored = encode(&user).and_then(|bytes| Ok(self.users.insert(user.id.as_bytes(), bytes)?));
        if let Err(err) = stored {
            self.usernames.remove(user.username.as_bytes())?;
            return Err(err);
        }
        Ok(user)
    }

    fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        self.users
            .get(user_id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        match self.usernames.get(username.as_bytes())? {
            Some(id) => self.get_user(&String::from_utf8_lossy(&id)),
            None => Ok(None),
        }
    }

    fn list_users(&self) -> Result<Vec<User>> {
        decode_all(self.users.iter())
    }
}

impl ProfileStore for SledStore {
    fn get_profile(&self, user_id: &str) -> Result<Option<TradingProfile>> {
        self.profiles
            .get(user_id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn upsert_profile(
        &self,
        user_id: &str,
        apply: &dyn Fn(Option<&TradingProfile>) -> TradingProfile,
    ) -> Result<TradingProfile> {
        let mut failure: Option<BinderError> = None;
        let stored = self.profiles.update_and_fetch(user_id.as_bytes(), |old| {
            failure = None;
            let current = match old.map(decode::<TradingProfile>).transpose() {
                Ok(current) => current,
                Err(err) => {
                    failure = Some(err);
                    return old.map(|bytes| bytes.to_vec());
                }
            };
            match encode(&apply(current.as_ref())) {
                Ok(next) => Some(next),
                Err(err) => {
                    failure = Some(err);
                    old.map(|bytes| bytes.to_vec())
                }
            }
        })?;

        if let Some(err) = failure {
            return Err(err);
        }
        let bytes = stored.ok_or_else(|| BinderError::not_found("trading profile", user_id))?;
        decode(&bytes)
    }

    fn list_profiles(&self) -> Result<Vec<TradingProfile>> {
        decode_all(self.profiles.iter())
    }
}

impl InterestStore for SledStore {
    fn insert_interest(&self, interest: TradeInterest) -> Result<TradeInterest> {
        self.interests
            .insert(interest.id.as_bytes(), encode(&interest)?)?;
        Ok(interest)
    }

    fn get_interest(&self, interest_id: &str) -> Result<Option<TradeInterest>> {
        self.interests
            .get(interest_id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn list_interests(&self) -> Result<Vec<TradeInterest>> {
        let mut interests: Vec<TradeInterest> = decode_all(self.interests.iter())?;
        sort_interests(&mut interests);
        Ok(interests)
    }

    fn update_interest(
        &self,
        interest_id: &str,
        apply: &dyn Fn(&TradeInterest) -> Result<TradeInterest>,
    ) -> Result<TradeInterest> {
        let mut failure: Option<BinderError> = None;
        let stored = self.interests.update_and_fetch(interest_id.as_bytes(), |old| {
            failure = None;
            let Some(bytes) = old else {
                failure = Some(BinderError::not_found("trade interest", interest_id));
                return None;
            };
            let next = decode::<TradeInterest>(bytes)
                .and_then(|current| apply(&current))
                .and_then(|next| encode(&next));
            match next {
                Ok(next) => Some(next),
                Err(err) => {
                    failure = Some(err);
                    Some(bytes.to_vec())
                }
            }
        })?;

        if let Some(err) = failure {
            return Err(err);
        }
        let bytes = stored.ok_or_else(|| BinderError::not_found("trade interest", interest_id))?;
        decode(&bytes)
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
    fn prefix_scan_does_not_leak_between_users() {
        let store = SledStore::temporary().unwrap();
        store.insert(entry(InventoryKind::Collection, "u1", "bolt", 1)).unwrap();
        // "u10" shares a textual prefix with "u1" but not the NUL separated one
        store.insert(entry(InventoryKind::Collection, "u10", "bolt", 1)).unwrap();

        let owned = store.list_by_user("u1", InventoryKind::Collection).unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].user_id, "u1");
    }

    #[test]
    fn wishlist_priority_defaults_to_medium() {
        let store = SledStore::temporary().unwrap();
        let mut candidate = entry(InventoryKind::Wishlist, "u1", "bolt", 1);
        candidate.priority = None;
        let stored = store.add_or_insert(candidate).unwrap();
        assert_eq!(stored.entry.priority, Some(crate::types::Priority::Medium));
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let store = SledStore::temporary().unwrap();
        let first = User {
            id: "user_a".into(),
            username: "jace".into(),
            created_at: TimeStamp::new(),
        };
        let second = User {
            id: "user_b".into(),
            ..first.clone()
        };
        store.create_user(first).unwrap();
        let err = store.create_user(second).unwrap_err();
        assert!(matches!(err, BinderError::DuplicateUsername(name) if name == "jace"));
        assert_eq!(store.list_users().unwrap().len(), 1);
    }
}
