//! Smoke screen unit tests for the binder's building blocks
//!
//! These tests touch each public module in isolation from the `Binder`
//! facade. They are intended as a smoke screen and mostly cover the happy
//! path plus the obvious rejections.
//!

use trade_binder::store::{InventoryStore, MemoryStore, UserStore};
use trade_binder::types::{CardSnapshot, InventoryEntry, TimeStamp, User};
use trade_binder::utils::{USER_HRP, new_uuid_to_bech32};
use trade_binder::{AddCard, InventoryKind, Priority, TradeStatus, ValidationError};

// UTILS MODULE TESTS
mod utils_tests {
    use super::*;

    /// Ids carry their human readable prefix and never repeat
    #[test]
    fn generates_prefixed_unique_ids() {
        let first = new_uuid_to_bech32(USER_HRP).unwrap();
        let second = new_uuid_to_bech32(USER_HRP).unwrap();

        assert!(first.starts_with("user_1"));
        assert_ne!(first, second);
    }

    #[test]
    fn rejects_empty_hrp() {
        assert!(new_uuid_to_bech32("").is_err());
    }
}

// TYPES MODULE TESTS
mod types_tests {
    use super::*;

    #[test]
    fn timestamp_cbor_round_trip() {
        let ts = TimeStamp::new_with(2024, 3, 15, 10, 30, 0).unwrap();
        let bytes = minicbor::to_vec(ts).unwrap();
        let decoded: TimeStamp = minicbor::decode(&bytes).unwrap();
        assert_eq!(ts, decoded);
    }

    #[test]
    fn priority_parses_case_insensitively() {
        assert_eq!("High".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(" low ".parse::<Priority>().unwrap(), Priority::Low);
        assert_eq!(Priority::default(), Priority::Medium);
        assert!(matches!(
            "urgent".parse::<Priority>(),
            Err(ValidationError::InvalidPriority(_))
        ));
    }

    /// Snapshots keep the exact text they were given, whitespace included
    #[test]
    fn snapshot_keeps_raw_text() {
        let raw = r#"{"name" : "Forest",  "prices": {"usd": null}}"#;
        let snapshot = CardSnapshot::parse(raw).unwrap();
        assert_eq!(snapshot.as_str(), raw);
        assert_eq!(snapshot.name().as_deref(), Some("Forest"));
        assert_eq!(snapshot.fields().unwrap().prices.usd, None);
    }

    #[test]
    fn snapshot_requires_an_object_with_a_name() {
        for bad in ["", "[]", "42", r#"{"id":"x"}"#, r#"{"name":""}"#, r#"{"name":7}"#] {
            assert!(
                matches!(CardSnapshot::parse(bad), Err(ValidationError::MalformedCardData(_))),
                "accepted {bad}"
            );
        }
    }

    /// Serialising an entry embeds the snapshot as JSON, not as a string
    #[test]
    fn entry_serialises_snapshot_inline() {
        let snapshot = CardSnapshot::parse(r#"{"name":"Forest"}"#).unwrap();
        let entry =
            InventoryEntry::new(InventoryKind::Wishlist, "user_a", "forest", 1, None, snapshot)
                .unwrap();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["card"]["name"], "Forest");
        assert_eq!(json["priority"], "medium");
        assert_eq!(json["kind"], "wishlist");
    }
}

// RECONCILER MODULE TESTS
mod reconciler_tests {
    use super::*;
    use trade_binder::reconciler;

    const FOREST: &str = r#"{"name":"Forest"}"#;

    /// Remove and clear report what they did, and repeat calls are harmless
    #[test]
    fn remove_and_clear_are_idempotent() {
        let store = MemoryStore::new();
        for card in ["forest", "island", "swamp"] {
            reconciler::add(&store, InventoryKind::Collection, "u1", &AddCard::new(card, FOREST))
                .unwrap();
        }

        assert!(reconciler::remove(&store, InventoryKind::Collection, "u1", "forest").unwrap());
        assert!(!reconciler::remove(&store, InventoryKind::Collection, "u1", "forest").unwrap());
        assert_eq!(reconciler::clear(&store, InventoryKind::Collection, "u1").unwrap(), 2);
        assert_eq!(reconciler::clear(&store, InventoryKind::Collection, "u1").unwrap(), 0);
    }

    #[test]
    fn first_add_reports_creation() {
        let store = MemoryStore::new();
        let request = AddCard::new("forest", FOREST).quantity(2);

        let first = reconciler::add(&store, InventoryKind::Collection, "u1", &request).unwrap();
        let second = reconciler::add(&store, InventoryKind::Collection, "u1", &request).unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(second.entry.quantity, 4);
    }

    #[test]
    fn blank_user_is_rejected() {
        let store = MemoryStore::new();
        let err = reconciler::add(&store, InventoryKind::Collection, " ", &AddCard::new("forest", FOREST))
            .unwrap_err();
        assert!(matches!(
            err,
            trade_binder::BinderError::Validation(ValidationError::MissingField("user_id"))
        ));
    }
}

// INTEREST MODULE TESTS
mod interest_tests {
    use super::*;

    #[test]
    fn status_strings() {
        for status in TradeStatus::ALL {
            assert_eq!(status.to_string().parse::<TradeStatus>().unwrap(), status);
        }
        assert!(matches!(
            "cancelled".parse::<TradeStatus>(),
            Err(ValidationError::InvalidStatus(_))
        ));
    }

    #[test]
    fn status_serialises_lowercase() {
        assert_eq!(
            serde_json::to_string(&TradeStatus::Accepted).unwrap(),
            "\"accepted\""
        );
    }
}

// STORE MODULE TESTS
mod store_tests {
    use super::*;

    fn entry(user: &str, card: &str, quantity: u32) -> InventoryEntry {
        let snapshot = CardSnapshot::parse(format!(r#"{{"name":"{card}"}}"#)).unwrap();
        InventoryEntry::new(InventoryKind::Collection, user, card, quantity, None, snapshot).unwrap()
    }

    #[test]
    fn insert_replaces_the_record_for_its_key() {
        let store = MemoryStore::new();
        store.insert(entry("u1", "bolt", 1)).unwrap();
        store.insert(entry("u1", "bolt", 7)).unwrap();

        let listed = store.list_by_user("u1", InventoryKind::Collection).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].quantity, 7);
    }

    #[test]
    fn collections_and_wishlists_are_separate() {
        let store = MemoryStore::new();
        store.insert(entry("u1", "bolt", 1)).unwrap();

        assert!(store
            .find_by_user_and_card("u1", "bolt", InventoryKind::Wishlist)
            .unwrap()
            .is_none());
        assert!(!store.remove("u1", "bolt", InventoryKind::Wishlist).unwrap());
        assert!(store.remove("u1", "bolt", InventoryKind::Collection).unwrap());
    }

    #[test]
    fn update_quantity_of_missing_record_is_none() {
        let store = MemoryStore::new();
        assert!(store
            .update_quantity("u1", "bolt", InventoryKind::Collection, 3)
            .unwrap()
            .is_none());
    }

    #[test]
    fn users_are_listed_by_id() {
        let store = MemoryStore::new();
        for (id, name) in [("user_b", "bee"), ("user_a", "ay")] {
            store
                .create_user(User {
                    id: id.to_string(),
                    username: name.to_string(),
                    created_at: TimeStamp::new(),
                })
                .unwrap();
        }
        let ids: Vec<String> = store.list_users().unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(ids, vec!["user_a", "user_b"]);
        assert_eq!(store.find_by_username("bee").unwrap().unwrap().id, "user_b");
    }
}
