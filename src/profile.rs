//! Trading profile and reputation ledger
use serde::{Serialize, Serializer};
use serde_json::value::RawValue;

use crate::error::{Result, ValidationError};
use crate::store::ProfileStore;
use crate::types::TimeStamp;
use crate::utils;

/// One per user, created lazily on first write and never deleted.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradingProfile {
    #[n(0)]
    pub user_id: String,
    #[n(1)]
    pub is_trading: bool,
    #[n(2)]
    pub location: Option<String>,
    #[n(3)]
    #[serde(serialize_with = "raw_json")]
    pub preferences: String, // JSON text, opaque to the binder
    #[n(4)]
    pub reputation: i64,
    #[n(5)]
    pub completed_trades: u32,
    #[n(6)]
    pub bio: Option<String>,
    #[n(7)]
    pub created_at: TimeStamp,
    #[n(8)]
    pub updated_at: TimeStamp,
}

fn raw_json<S: Serializer>(text: &str, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    let raw: &RawValue = serde_json::from_str(text).map_err(serde::ser::Error::custom)?;
    raw.serialize(serializer)
}

impl TradingProfile {
    pub fn new(user_id: &str) -> Self {
        let now = TimeStamp::new();
        Self {
            user_id: user_id.to_string(),
            is_trading: false,
            location: None,
            preferences: "{}".to_string(),
            reputation: 0,
            completed_trades: 0,
            bio: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn preferences(&self) -> serde_json::Value {
        serde_json::from_str(&self.preferences).unwrap_or(serde_json::Value::Null)
    }

    fn touched(mut self, previous: &TimeStamp) -> Self {
        self.updated_at = TimeStamp::after(previous);
        self
    }
}

/// Partial update. `None` keeps the stored value; an empty string clears
/// `location` or `bio`.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub is_trading: Option<bool>,
    pub location: Option<String>,
    pub preferences: Option<serde_json::Value>,
    pub bio: Option<String>,
}

impl ProfilePatch {
    pub fn trading(mut self, is_trading: bool) -> Self {
        self.is_trading = Some(is_trading);
        self
    }
    pub fn location(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }
    pub fn preferences(mut self, preferences: serde_json::Value) -> Self {
        self.preferences = Some(preferences);
        self
    }
    pub fn bio(mut self, bio: &str) -> Self {
        self.bio = Some(bio.to_string());
        self
    }

    fn apply(&self, current: TradingProfile, preferences: Option<&str>) -> TradingProfile {
        let mut next = current;
        if let Some(is_trading) = self.is_trading {
            next.is_trading = is_trading;
        }
        if let Some(location) = &self.location {
            next.location = non_blank(location);
        }
        if let Some(preferences) = preferences {
            next.preferences = preferences.to_string();
        }
        if let Some(bio) = &self.bio {
            next.bio = non_blank(bio);
        }
        next
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn get<S: ProfileStore + ?Sized>(store: &S, user_id: &str) -> Result<Option<TradingProfile>> {
    utils::require_id("user_id", user_id)?;
    store.get_profile(user_id)
}

/// Creates the profile with defaults when absent, then merges `patch` into it.
pub fn create_or_update<S: ProfileStore + ?Sized>(
    store: &S,
    user_id: &str,
    patch: &ProfilePatch,
) -> Result<TradingProfile> {
    utils::require_id("user_id", user_id)?;
    let preferences = match &patch.preferences {
        Some(value) if value.is_object() => Some(value.to_string()),
        Some(_) => return Err(ValidationError::MalformedPreferences.into()),
        None => None,
    };

    store.upsert_profile(user_id, &|current| match current {
        Some(existing) => patch
            .apply(existing.clone(), preferences.as_deref())
            .touched(&existing.updated_at),
        None => patch.apply(TradingProfile::new(user_id), preferences.as_deref()),
    })
}

/// Adds `delta` to the reputation counter, creating the profile if needed.
pub fn adjust_reputation<S: ProfileStore + ?Sized>(
    store: &S,
    user_id: &str,
    delta: i64,
) -> Result<TradingProfile> {
    bump(store, user_id, &|profile| {
        profile.reputation = profile.reputation.saturating_add(delta)
    })
}

pub fn record_completed_trade<S: ProfileStore + ?Sized>(
    store: &S,
    user_id: &str,
) -> Result<TradingProfile> {
    bump(store, user_id, &|profile| {
        profile.completed_trades = profile.completed_trades.saturating_add(1)
    })
}

fn bump<S: ProfileStore + ?Sized>(
    store: &S,
    user_id: &str,
    change: &dyn Fn(&mut TradingProfile),
) -> Result<TradingProfile> {
    utils::require_id("user_id", user_id)?;
    store.upsert_profile(user_id, &|current| {
        let mut next = current
            .cloned()
            .unwrap_or_else(|| TradingProfile::new(user_id));
        let previous = next.updated_at;
        change(&mut next);
        next.touched(&previous)
    })
}

/// Profiles that opted into trading.
pub fn trading_users<S: ProfileStore + ?Sized>(store: &S) -> Result<Vec<TradingProfile>> {
    Ok(store
        .list_profiles()?
        .into_iter()
        .filter(|profile| profile.is_trading)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let profile = TradingProfile::new("user_a");
        assert!(!profile.is_trading);
        assert_eq!(profile.reputation, 0);
        assert_eq!(profile.completed_trades, 0);
        assert_eq!(profile.preferences(), serde_json::json!({}));
    }

    #[test]
    fn patch_merges_and_clears() {
        let profile = TradingProfile::new("user_a");
        let patched = ProfilePatch::default()
            .trading(true)
            .location("Lyon")
            .apply(profile, None);
        assert!(patched.is_trading);
        assert_eq!(patched.location.as_deref(), Some("Lyon"));

        let cleared = ProfilePatch::default().location("  ").apply(patched, None);
        assert!(cleared.is_trading);
        assert_eq!(cleared.location, None);
    }

    #[test]
    fn preferences_serialise_as_json() {
        let mut profile = TradingProfile::new("user_a");
        profile.preferences = r#"{"formats":["modern"]}"#.to_string();
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["preferences"]["formats"][0], "modern");
    }
}
