//! Property-based tests for the trade interest lifecycle
//!
//! Random status requests, valid and invalid, are thrown at a single interest.
//! Only moves in the transition table may land; every rejected request must
//! leave the stored interest exactly as it was.

use std::sync::Arc;

use proptest::prelude::*;
use trade_binder::{Binder, BinderError, MemoryStore, NewInterest, TradeStatus, ValidationError};

// Requested statuses, including casing noise and values outside the enum
fn status_request_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => prop::sample::select(TradeStatus::ALL.to_vec()).prop_map(|s| s.to_string()),
        1 => prop::sample::select(vec!["ACCEPTED", " Declined ", "Completed"])
            .prop_map(str::to_string),
        1 => prop::sample::select(vec!["cancelled", "", "open", "done"]).prop_map(str::to_string),
    ]
}

fn expected_next(current: TradeStatus, requested: &str) -> Option<TradeStatus> {
    let next = requested.parse::<TradeStatus>().ok()?;
    current.can_transition_to(next).then_some(next)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn only_table_moves_land(requests in prop::collection::vec(status_request_strategy(), 1..12)) {
        let binder = Binder::new(Arc::new(MemoryStore::new())).unwrap();
        let from = binder.register_user("from").unwrap();
        let to = binder.register_user("to").unwrap();
        let created = binder
            .create_trade_interest(NewInterest::new(&from.id, &to.id).with_message("trade?"))
            .unwrap();

        let mut current = created.clone();
        for requested in &requests {
            let result = binder.update_trade_interest_status(&created.id, requested);
            match expected_next(current.status, requested) {
                Some(next) => {
                    let moved = result.unwrap();
                    prop_assert_eq!(moved.status, next);
                    prop_assert!(moved.updated_at > current.updated_at);
                    prop_assert_eq!(&moved.from_user_id, &created.from_user_id);
                    prop_assert_eq!(&moved.to_user_id, &created.to_user_id);
                    prop_assert_eq!(&moved.message, &created.message);
                    prop_assert_eq!(moved.created_at, created.created_at);
                    current = moved;
                }
                None => {
                    let err = result.unwrap_err();
                    let expected_kind = matches!(
                        err,
                        BinderError::Validation(ValidationError::InvalidStatus(_))
                            | BinderError::IllegalTransition { .. }
                    );
                    prop_assert!(expected_kind, "unexpected error {err:?}");
                    prop_assert_eq!(&binder.trade_interest(&created.id).unwrap(), &current);
                }
            }
        }

        // terminal states never move again
        if current.status.is_terminal() {
            for status in TradeStatus::ALL {
                prop_assert!(binder
                    .update_trade_interest_status(&created.id, status.as_str())
                    .is_err());
            }
        }
    }

    /// The table never allows going back to pending or staying put
    #[test]
    fn no_backward_or_self_moves(
        from in prop::sample::select(TradeStatus::ALL.to_vec()),
        to in prop::sample::select(TradeStatus::ALL.to_vec()),
    ) {
        if from.can_transition_to(to) {
            prop_assert_ne!(from, to);
            prop_assert_ne!(to, TradeStatus::Pending);
            prop_assert!(!from.is_terminal());
        }
    }
}
