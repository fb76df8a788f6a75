//! Valuation over stored snapshots and the explicit price refresh.
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::provider::CardProvider;
use crate::store::InventoryStore;
use crate::types::InventoryEntry;

/// Provider prices are decimal strings. Missing, blank, negative or
/// unparsable values mean "no price", never zero.
pub fn parse_price(raw: Option<&str>) -> Option<Decimal> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    Decimal::from_str(raw).ok().filter(|price| !price.is_sign_negative())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Valuation {
    pub total_usd: Decimal,
    pub total_usd_foil: Decimal,
    pub copies: u64,
    pub priced_cards: u32,
    pub unpriced_cards: u32,
}

/// `total + price × quantity`, or `None` when either step leaves the
/// `Decimal` range.
fn accumulate(total: Decimal, price: Decimal, quantity: Decimal) -> Option<Decimal> {
    price
        .checked_mul(quantity)
        .and_then(|line| total.checked_add(line))
}

/// Sums quantity × price from each record's snapshot. Records whose snapshot
/// has no usd price are counted, not valued. A price too large to total is
/// treated the same way.
pub fn value_entries(entries: &[InventoryEntry]) -> Valuation {
    let mut valuation = Valuation::default();
    for entry in entries {
        valuation.copies += u64::from(entry.quantity);
        let prices = entry.card.fields().map(|f| f.prices).unwrap_or_default();
        let quantity = Decimal::from(entry.quantity);

        let usd = parse_price(prices.usd.as_deref())
            .and_then(|usd| accumulate(valuation.total_usd, usd, quantity));
        match usd {
            Some(total) => {
                valuation.total_usd = total;
                valuation.priced_cards += 1;
            }
            None => valuation.unpriced_cards += 1,
        }

        let foil = parse_price(prices.usd_foil.as_deref())
            .map(|foil| accumulate(valuation.total_usd_foil, foil, quantity));
        match foil {
            Some(Some(total)) => valuation.total_usd_foil = total,
            Some(None) => warn!(card_id = %entry.card_id, "foil price out of range, skipped"),
            None => {}
        }
    }
    valuation
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub refreshed: Vec<String>,
    pub unchanged: Vec<String>,
    pub missing: Vec<String>,
    /// Stored snapshots whose prices cannot be read. They are left as stored.
    pub invalid: Vec<String>,
}

/// Replaces the `prices` of each snapshot with the provider's current values.
/// Everything else in the snapshot is left as stored. Cards the provider no
/// longer knows are reported in `missing` and left untouched; snapshots that
/// cannot be rewritten land in `invalid` and the refresh moves on.
pub fn refresh_entries<S, P>(store: &S, provider: &P, entries: Vec<InventoryEntry>) -> Result<RefreshReport>
where
    S: InventoryStore + ?Sized,
    P: CardProvider + ?Sized,
{
    let mut report = RefreshReport::default();
    for entry in entries {
        let Some(record) = provider.card(&entry.card_id)? else {
            debug!(card_id = %entry.card_id, "provider no longer lists card");
            report.missing.push(entry.card_id);
            continue;
        };

        // both sides go through the same re-serialisation so formatting never
        // counts as a change
        let rewritten = entry.card.fields().and_then(|fields| {
            Ok((
                entry.card.with_prices(&fields.prices)?,
                entry.card.with_prices(&record.prices)?,
            ))
        });
        let (stored, card) = match rewritten {
            Ok(pair) => pair,
            Err(err) => {
                warn!(card_id = %entry.card_id, error = %err, "stored card data unreadable, skipped");
                report.invalid.push(entry.card_id);
                continue;
            }
        };
        if card.fingerprint() == stored.fingerprint() {
            report.unchanged.push(entry.card_id);
            continue;
        }

        let mut updated = entry.clone();
        updated.card = card;
        updated.updated_at = crate::types::TimeStamp::after(&entry.updated_at);
        // a concurrent removal wins; nothing to refresh then
        if store.replace(updated)?.is_some() {
            report.refreshed.push(entry.card_id);
        } else {
            report.missing.push(entry.card_id);
        }
    }
    info!(
        refreshed = report.refreshed.len(),
        unchanged = report.unchanged.len(),
        missing = report.missing.len(),
        invalid = report.invalid.len(),
        "price refresh finished"
    );
    Ok(report)
}
