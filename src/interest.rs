//! Trade interest lifecycle: a proposal from one user to another, moving through
//! a fixed transition table.
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{BinderError, Result, ValidationError};
use crate::store::InterestStore;
use crate::types::{CardSnapshot, TimeStamp};
use crate::utils;

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Accepted,
    #[n(2)]
    Declined,
    #[n(3)]
    Completed,
}

/// Every legal (from, to) move. Anything absent is rejected.
const TRANSITIONS: &[(TradeStatus, TradeStatus)] = &[
    (TradeStatus::Pending, TradeStatus::Accepted),
    (TradeStatus::Pending, TradeStatus::Declined),
    (TradeStatus::Accepted, TradeStatus::Completed),
];

impl TradeStatus {
    pub const ALL: [TradeStatus; 4] = [
        TradeStatus::Pending,
        TradeStatus::Accepted,
        TradeStatus::Declined,
        TradeStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Completed => "completed",
        }
    }
    pub fn can_transition_to(&self, next: TradeStatus) -> bool {
        TRANSITIONS.contains(&(*self, next))
    }
    pub fn is_terminal(&self) -> bool {
        !TradeStatus::ALL.iter().any(|next| self.can_transition_to(*next))
    }
}

impl FromStr for TradeStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            "completed" => Ok(Self::Completed),
            _ => Err(ValidationError::InvalidStatus(s.to_string())),
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A card offered inside a trade interest. Carried along, never reconciled
/// against either party's inventory.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeCard {
    #[n(0)]
    pub card_id: String,
    #[n(1)]
    pub quantity: u32,
    #[n(2)]
    pub card: CardSnapshot,
    #[n(3)]
    pub offered_by: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeInterest {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7
    #[n(1)]
    pub from_user_id: String,
    #[n(2)]
    pub to_user_id: String,
    #[n(3)]
    pub status: TradeStatus,
    #[n(4)]
    pub message: Option<String>,
    #[n(5)]
    pub cards: Vec<TradeCard>,
    #[n(6)]
    pub created_at: TimeStamp,
    #[n(7)]
    pub updated_at: TimeStamp,
}

/// Input for opening a new trade interest.
#[derive(Debug, Clone, Default)]
pub struct NewInterest {
    pub from_user_id: String,
    pub to_user_id: String,
    pub message: Option<String>,
    pub cards: Vec<TradeCard>,
}

impl NewInterest {
    pub fn new(from_user_id: &str, to_user_id: &str) -> Self {
        Self {
            from_user_id: from_user_id.to_string(),
            to_user_id: to_user_id.to_string(),
            ..Default::default()
        }
    }
    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }
    pub fn with_card(mut self, card: TradeCard) -> Self {
        self.cards.push(card);
        self
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        utils::require_id("from_user_id", &self.from_user_id)?;
        utils::require_id("to_user_id", &self.to_user_id)?;
        if self.from_user_id == self.to_user_id {
            return Err(ValidationError::SelfTrade);
        }
        for card in &self.cards {
            utils::require_id("card_id", &card.card_id)?;
            utils::require_id("offered_by", &card.offered_by)?;
            if card.quantity == 0 {
                return Err(ValidationError::InvalidQuantity(0));
            }
        }
        Ok(())
    }
}

impl TradeInterest {
    /// Validated, pending interest with a fresh id.
    pub fn open(request: NewInterest) -> Result<Self> {
        request.validate()?;
        let now = TimeStamp::new();
        let message = request.message.filter(|m| !m.trim().is_empty());

        Ok(Self {
            id: utils::new_uuid_to_bech32(utils::INTEREST_HRP)?,
            from_user_id: request.from_user_id,
            to_user_id: request.to_user_id,
            status: TradeStatus::Pending,
            message,
            cards: request.cards,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.from_user_id == user_id || self.to_user_id == user_id
    }

    /// Copy moved to `next`, with a strictly later `updated_at`.
    pub fn transition(&self, next: TradeStatus) -> Result<Self> {
        if !self.status.can_transition_to(next) {
            return Err(BinderError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        let mut moved = self.clone();
        moved.status = next;
        moved.updated_at = TimeStamp::after(&self.updated_at);
        Ok(moved)
    }
}

pub fn create<S: InterestStore + ?Sized>(store: &S, request: NewInterest) -> Result<TradeInterest> {
    let interest = TradeInterest::open(request)?;
    store.insert_interest(interest)
}

pub fn list_for_user<S: InterestStore + ?Sized>(
    store: &S,
    user_id: &str,
) -> Result<Vec<TradeInterest>> {
    Ok(store
        .list_interests()?
        .into_iter()
        .filter(|interest| interest.involves(user_id))
        .collect())
}

/// Parses `status` before touching storage, then applies the move atomically.
pub fn set_status<S: InterestStore + ?Sized>(
    store: &S,
    interest_id: &str,
    status: &str,
) -> Result<TradeInterest> {
    utils::require_id("interest_id", interest_id)?;
    let next: TradeStatus = status.parse()?;
    store.update_interest(interest_id, &|current| current.transition(next))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table() {
        use TradeStatus::*;
        assert!(Pending.can_transition_to(Accepted));
        assert!(Pending.can_transition_to(Declined));
        assert!(Accepted.can_transition_to(Completed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Declined.can_transition_to(Accepted));
        assert!(!Completed.can_transition_to(Pending));

        assert!(Declined.is_terminal());
        assert!(Completed.is_terminal());
        assert!(!Pending.is_terminal());
        assert!(!Accepted.is_terminal());
    }

    #[test]
    fn unknown_status_is_a_validation_error() {
        assert_eq!(
            "cancelled".parse::<TradeStatus>(),
            Err(ValidationError::InvalidStatus("cancelled".into()))
        );
    }

    #[test]
    fn open_requires_both_parties() {
        let err = TradeInterest::open(NewInterest::new("", "user_b")).unwrap_err();
        assert!(matches!(
            err,
            BinderError::Validation(ValidationError::MissingField("from_user_id"))
        ));

        let err = TradeInterest::open(NewInterest::new("user_a", "user_a")).unwrap_err();
        assert!(matches!(err, BinderError::Validation(ValidationError::SelfTrade)));
    }

    #[test]
    fn illegal_transition_keeps_original() {
        let interest = TradeInterest::open(NewInterest::new("user_a", "user_b")).unwrap();
        let err = interest.transition(TradeStatus::Completed).unwrap_err();
        assert!(matches!(err, BinderError::IllegalTransition { .. }));
        assert_eq!(interest.status, TradeStatus::Pending);
    }
}
