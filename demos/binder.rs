//! Walks through a small trading session against the configured sled store.
//!
//! `cargo run --example binder` uses a temporary database unless
//! `BINDER_DATA_DIR` is set. No network calls are made.
use std::sync::Arc;

use anyhow::Context;
use serde_json::json;
use tracing::info;
use trade_binder::config::load_config;
use trade_binder::logging::setup_logger;
use trade_binder::{AddCard, Binder, InventoryKind, NewInterest, ProfilePatch, TradeCard};

const BOLT: &str = r#"{"id":"bolt","name":"Lightning Bolt","type_line":"Instant","prices":{"usd":"1.89","usd_foil":"4.50"}}"#;
const FOREST: &str = r#"{"id":"forest","name":"Forest","type_line":"Basic Land","prices":{"usd":"0.10"}}"#;
const COUNTERSPELL: &str = r#"{"id":"counterspell","name":"Counterspell","type_line":"Instant","prices":{"usd":null}}"#;

fn main() -> anyhow::Result<()> {
    let cfg = load_config().context("invalid configuration")?;
    setup_logger(&cfg.log_filter);

    let store = cfg.open_store().context("failed to open store")?;
    let binder = Binder::new(Arc::new(store))?;

    let alice = binder.register_user("alice")?;
    let bob = binder.register_user("bob")?;
    info!(alice = %alice.id, bob = %bob.id, "users ready");

    binder.add_to_wishlist(&alice.id, &AddCard::new("bolt", BOLT).priority("high"))?;
    binder.add_to_collection(&alice.id, &AddCard::new("forest", FOREST).quantity(2))?;
    binder.add_to_collection(&alice.id, &AddCard::new("forest", FOREST).quantity(3))?;
    binder.add_to_collection(&alice.id, &AddCard::new("counterspell", COUNTERSPELL))?;

    binder.add_to_collection(&bob.id, &AddCard::new("bolt", BOLT).quantity(2))?;
    binder.add_to_wishlist(&bob.id, &AddCard::new("forest", FOREST))?;

    binder.update_trading_profile(
        &alice.id,
        &ProfilePatch::default()
            .trading(true)
            .location("Leeds")
            .preferences(json!({"formats": ["modern"]})),
    )?;

    let matches = binder.find_trade_matches(&alice.id)?;
    println!("matches for alice: {}", serde_json::to_string_pretty(&matches)?);

    let bolt = binder
        .collection(&bob.id)?
        .into_iter()
        .find(|entry| entry.card_id == "bolt")
        .context("bob should hold bolt")?;
    let proposal = binder.create_trade_interest(
        NewInterest::new(&alice.id, &bob.id)
            .with_message("trade?")
            .with_card(TradeCard {
                card_id: bolt.card_id,
                quantity: 1,
                card: bolt.card,
                offered_by: bob.id.clone(),
            }),
    )?;

    let accepted = binder.update_trade_interest_status(&proposal.id, "accepted")?;
    let completed = binder.update_trade_interest_status(&proposal.id, "completed")?;
    if let Err(err) = binder.update_trade_interest_status(&proposal.id, "pending") {
        println!("rejected as expected: {err}");
    }
    for user in [&alice.id, &bob.id] {
        binder.record_completed_trade(user)?;
        binder.adjust_reputation(user, 1)?;
    }
    println!(
        "interest: {} -> {} -> {}",
        proposal.status, accepted.status, completed.status
    );

    let valuation = binder.valuation(&alice.id, InventoryKind::Collection)?;
    println!("alice's collection: {}", serde_json::to_string_pretty(&valuation)?);
    println!(
        "alice's profile: {}",
        serde_json::to_string_pretty(&binder.trading_profile(&alice.id)?)?
    );
    Ok(())
}
