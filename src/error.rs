//! Error types shared across the binder
use crate::interest::TradeStatus;

/// Client-caused input problems. Raised before any storage is touched.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field `{0}` is missing or empty")]
    MissingField(&'static str),
    #[error("Quantity must be a positive integer, got {0}")]
    InvalidQuantity(i64),
    #[error("Priority `{0}` is not one of low, medium, high")]
    InvalidPriority(String),
    #[error("Status `{0}` is not one of pending, accepted, declined, completed")]
    InvalidStatus(String),
    #[error("Card data is malformed: {0}")]
    MalformedCardData(String),
    #[error("Trading preferences must be a JSON object")]
    MalformedPreferences,
    #[error("Field `{0}` contains a NUL byte")]
    ReservedCharacter(&'static str),
    #[error("A trade interest cannot target its own sender")]
    SelfTrade,
}

/// Failures talking to the card provider or the completion service.
#[derive(thiserror::Error, Debug)]
pub enum UpstreamError {
    #[error("Upstream service is unavailable: {0}")]
    Unavailable(String),
    #[error("Upstream service is rate limiting requests")]
    RateLimited,
    #[error("Upstream service answered with status {0}")]
    Status(u16),
    #[error("Upstream response could not be decoded: {0}")]
    Decode(String),
}

#[derive(thiserror::Error, Debug)]
pub enum BinderError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("No {what} found for `{id}`")]
    NotFound { what: &'static str, id: String },
    #[error("Trade interest cannot move from {from} to {to}")]
    IllegalTransition { from: TradeStatus, to: TradeStatus },
    #[error("Username `{0}` is already taken")]
    DuplicateUsername(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("Storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("Record encoding failure: {0}")]
    Codec(String),
}

impl BinderError {
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<minicbor::decode::Error> for BinderError {
    fn from(err: minicbor::decode::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for BinderError {
    fn from(err: minicbor::encode::Error<E>) -> Self {
        Self::Codec(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BinderError>;
