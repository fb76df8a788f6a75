//! Card collection and wishlist binder with trade matching, trade interests
//! and a per-user trading profile.

pub mod advisor;
pub mod config;
pub mod error;
pub mod interest;
pub mod logging;
pub mod matcher;
pub mod pricing;
pub mod profile;
pub mod provider;
pub mod reconciler;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

pub use error::{BinderError, Result, UpstreamError, ValidationError};
pub use interest::{NewInterest, TradeCard, TradeInterest, TradeStatus};
pub use matcher::TradeMatch;
pub use profile::{ProfilePatch, TradingProfile};
pub use reconciler::AddCard;
pub use service::Binder;
pub use store::{MemoryStore, SledStore};
pub use types::{CardSnapshot, InventoryEntry, InventoryKind, Priority, User};
