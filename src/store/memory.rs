//! Process-local backend. Inventory maps are sharded by (user, card) so writers
//! on different keys rarely contend; one shard lock serialises a given key.
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

use parking_lot::{Mutex, RwLock};

use super::{
    InterestStore, InventoryStore, ProfileStore, Upserted, UserStore, fresh_entry,
    merge_increment, sort_interests,
};
use crate::error::{BinderError, Result};
use crate::interest::TradeInterest;
use crate::profile::TradingProfile;
use crate::types::{InventoryEntry, InventoryKind, User};

const SHARDS: usize = 16;

type EntryKey = (String, String); // (user id, card id)

struct ShardedEntries {
    shards: Vec<Mutex<HashMap<EntryKey, InventoryEntry>>>,
}

impl ShardedEntries {
    fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, user_id: &str, card_id: &str) -> &Mutex<HashMap<EntryKey, InventoryEntry>> {
        let mut hasher = DefaultHasher::new();
        user_id.hash(&mut hasher);
        card_id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARDS]
    }

    fn collect(&self, keep: impl Fn(&InventoryEntry) -> bool) -> Vec<InventoryEntry> {
        let mut entries: Vec<InventoryEntry> = self
            .shards
            .iter()
            .flat_map(|shard| {
                shard
                    .lock()
                    .values()
                    .filter(|entry| keep(entry))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        entries.sort_by(|a, b| {
            (a.user_id.as_str(), a.card_id.as_str()).cmp(&(b.user_id.as_str(), b.card_id.as_str()))
        });
        entries
    }
}

pub struct MemoryStore {
    collections: ShardedEntries,
    wishlists: ShardedEntries,
    users: RwLock<BTreeMap<String, User>>,
    profiles: RwLock<BTreeMap<String, TradingProfile>>,
    interests: RwLock<HashMap<String, TradeInterest>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: ShardedEntries::new(),
            wishlists: ShardedEntries::new(),
            users: RwLock::new(BTreeMap::new()),
            profiles: RwLock::new(BTreeMap::new()),
            interests: RwLock::new(HashMap::new()),
        }
    }

    fn entries(&self, kind: InventoryKind) -> &ShardedEntries {
        match kind {
            InventoryKind::Collection => &self.collections,
            InventoryKind::Wishlist => &self.wishlists,
        }
    }
}

fn key(user_id: &str, card_id: &str) -> EntryKey {
    (user_id.to_string(), card_id.to_string())
}

impl InventoryStore for MemoryStore {
    fn list_by_user(&self, user_id: &str, kind: InventoryKind) -> Result<Vec<InventoryEntry>> {
        Ok(self.entries(kind).collect(|entry| entry.user_id == user_id))
    }

    fn find_by_user_and_card(
        &self,
        user_id: &str,
        card_id: &str,
        kind: InventoryKind,
    ) -> Result<Option<InventoryEntry>> {
        let shard = self.entries(kind).shard(user_id, card_id).lock();
        Ok(shard.get(&key(user_id, card_id)).cloned())
    }

    fn insert(&self, entry: InventoryEntry) -> Result<InventoryEntry> {
        let entry = fresh_entry(entry);
        let mut shard = self
            .entries(entry.kind)
            .shard(&entry.user_id, &entry.card_id)
            .lock();
        shard.insert(key(&entry.user_id, &entry.card_id), entry.clone());
        Ok(entry)
    }

    fn update_quantity(
        &self,
        user_id: &str,
        card_id: &str,
        kind: InventoryKind,
        quantity: u32,
    ) -> Result<Option<InventoryEntry>> {
        let mut shard = self.entries(kind).shard(user_id, card_id).lock();
        Ok(shard.get_mut(&key(user_id, card_id)).map(|entry| {
            entry.quantity = quantity;
            entry.updated_at = crate::types::TimeStamp::after(&entry.updated_at);
            entry.clone()
        }))
    }

    fn replace(&self, entry: InventoryEntry) -> Result<Option<InventoryEntry>> {
        let mut shard = self
            .entries(entry.kind)
            .shard(&entry.user_id, &entry.card_id)
            .lock();
        Ok(shard
            .get_mut(&key(&entry.user_id, &entry.card_id))
            .map(|stored| {
                *stored = entry;
                stored.clone()
            }))
    }

    fn remove(&self, user_id: &str, card_id: &str, kind: InventoryKind) -> Result<bool> {
        let mut shard = self.entries(kind).shard(user_id, card_id).lock();
        Ok(shard.remove(&key(user_id, card_id)).is_some())
    }

    fn clear(&self, user_id: &str, kind: InventoryKind) -> Result<usize> {
        let mut removed = 0;
        for shard in &self.entries(kind).shards {
            let mut shard = shard.lock();
            let before = shard.len();
            shard.retain(|(owner, _), _| owner != user_id);
            removed += before - shard.len();
        }
        Ok(removed)
    }

    fn add_or_insert(&self, candidate: InventoryEntry) -> Result<Upserted> {
        let mut shard = self
            .entries(candidate.kind)
            .shard(&candidate.user_id, &candidate.card_id)
            .lock();
        let key = key(&candidate.user_id, &candidate.card_id);
        match shard.get_mut(&key) {
            Some(existing) => {
                *existing = merge_increment(existing, &candidate);
                Ok(Upserted {
                    entry: existing.clone(),
                    created: false,
                })
            }
            None => {
                let entry = fresh_entry(candidate);
                shard.insert(key, entry.clone());
                Ok(Upserted {
                    entry,
                    created: true,
                })
            }
        }
    }

    fn list_all(&self, kind: InventoryKind) -> Result<Vec<InventoryEntry>> {
        Ok(self.entries(kind).collect(|_| true))
    }
}

impl UserStore for MemoryStore {
    fn create_user(&self, user: User) -> Result<User> {
        let mut users = self.users.write();
        if users.values().any(|existing| existing.username == user.username) {
            return Err(BinderError::DuplicateUsername(user.username));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.users.read().get(user_id).cloned())
    }

    fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.users.read().values().cloned().collect())
    }
}

impl ProfileStore for MemoryStore {
    fn get_profile(&self, user_id: &str) -> Result<Option<TradingProfile>> {
        Ok(self.profiles.read().get(user_id).cloned())
    }

    fn upsert_profile(
        &self,
        user_id: &str,
        apply: &dyn Fn(Option<&TradingProfile>) -> TradingProfile,
    ) -> Result<TradingProfile> {
        let mut profiles = self.profiles.write();
        let next = apply(profiles.get(user_id));
        profiles.insert(user_id.to_string(), next.clone());
        Ok(next)
    }

    fn list_profiles(&self) -> Result<Vec<TradingProfile>> {
        Ok(self.profiles.read().values().cloned().collect())
    }
}

impl InterestStore for MemoryStore {
    fn insert_interest(&self, interest: TradeInterest) -> Result<TradeInterest> {
        self.interests
            .write()
            .insert(interest.id.clone(), interest.clone());
        Ok(interest)
    }

    fn get_interest(&self, interest_id: &str) -> Result<Option<TradeInterest>> {
        Ok(self.interests.read().get(interest_id).cloned())
    }

    fn list_interests(&self) -> Result<Vec<TradeInterest>> {
        let mut interests: Vec<TradeInterest> = self.interests.read().values().cloned().collect();
        sort_interests(&mut interests);
        Ok(interests)
    }

    fn update_interest(
        &self,
        interest_id: &str,
        apply: &dyn Fn(&TradeInterest) -> Result<TradeInterest>,
    ) -> Result<TradeInterest> {
        let mut interests = self.interests.write();
        let current = interests
            .get(interest_id)
            .ok_or_else(|| BinderError::not_found("trade interest", interest_id))?;
        let next = apply(current)?;
        interests.insert(interest_id.to_string(), next.clone());
        Ok(next)
    }
}
