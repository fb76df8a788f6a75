//! Core record types shared by the stores, the reconciler and the matcher
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;

use crate::error::ValidationError;
use crate::utils;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct TimeStamp(DateTime<Utc>);

impl TimeStamp {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    /// `None` when the fields do not name a valid UTC instant.
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self)
    }
    /// Current time, nudged forward so it always sorts after `previous`.
    pub fn after(previous: &TimeStamp) -> Self {
        let now = Utc::now();
        if now > previous.0 {
            Self(now)
        } else {
            Self(previous.0 + Duration::nanoseconds(1))
        }
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp {
    fn default() -> Self {
        Self::new()
    }
}

impl From<DateTime<Utc>> for TimeStamp {
    fn from(value: DateTime<Utc>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// Which of a user's two inventories a record belongs to.
#[derive(
    minicbor::Encode,
    minicbor::Decode,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum InventoryKind {
    #[n(0)]
    Collection,
    #[n(1)]
    Wishlist,
}

impl InventoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Wishlist => "wishlist",
        }
    }
    pub(crate) fn id_prefix(&self) -> &'static str {
        match self {
            Self::Collection => utils::COLLECTION_HRP,
            Self::Wishlist => utils::WISHLIST_HRP,
        }
    }
}

impl fmt::Display for InventoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    minicbor::Encode,
    minicbor::Decode,
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[n(0)]
    Low,
    #[default]
    #[n(1)]
    Medium,
    #[n(2)]
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(ValidationError::InvalidPriority(s.to_string())),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Denormalised copy of a card's catalog data, kept as the exact JSON text it
/// was supplied with. It is never refreshed implicitly.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Hash)]
pub struct CardSnapshot {
    #[n(0)]
    raw: String,
}

/// Typed view over the fields of a snapshot the binder cares about.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CardFields {
    pub name: String,
    #[serde(default)]
    pub type_line: Option<String>,
    #[serde(default)]
    pub mana_cost: Option<String>,
    #[serde(default)]
    pub rarity: Option<String>,
    #[serde(default)]
    pub prices: CardPrices,
    #[serde(default)]
    pub image_uris: Option<serde_json::Value>,
}

/// Provider prices are decimal strings; `null` and absence both mean "no price".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPrices {
    #[serde(default)]
    pub usd: Option<String>,
    #[serde(default)]
    pub usd_foil: Option<String>,
    #[serde(default)]
    pub eur: Option<String>,
    #[serde(default)]
    pub tix: Option<String>,
}

impl CardSnapshot {
    /// Accepts a JSON object carrying at least a non-empty string `name`.
    /// The fields in [`CardFields`] must have their documented types, so
    /// prices are strings or null.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| ValidationError::MalformedCardData(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| ValidationError::MalformedCardData("expected a JSON object".into()))?;
        match object.get("name").and_then(|n| n.as_str()) {
            Some(name) if !name.trim().is_empty() => {}
            _ => {
                return Err(ValidationError::MalformedCardData(
                    "expected a non-empty string `name`".into(),
                ));
            }
        }
        serde_json::from_value::<CardFields>(value)
            .map_err(|e| ValidationError::MalformedCardData(e.to_string()))?;
        Ok(Self { raw })
    }

    #[cfg(test)]
    pub(crate) fn unchecked(raw: &str) -> Self {
        Self { raw: raw.to_string() }
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self, ValidationError> {
        Self::parse(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn fields(&self) -> Result<CardFields, ValidationError> {
        serde_json::from_str(&self.raw).map_err(|e| ValidationError::MalformedCardData(e.to_string()))
    }

    pub fn name(&self) -> Option<String> {
        self.fields().ok().map(|f| f.name)
    }

    /// Hex sha256 of the stored text, used to detect drift after a refresh.
    pub fn fingerprint(&self) -> String {
        sha256::digest(self.raw.as_bytes())
    }

    /// Copy of this snapshot with the `prices` object replaced.
    pub fn with_prices(&self, prices: &CardPrices) -> Result<Self, ValidationError> {
        let mut value: serde_json::Value = serde_json::from_str(&self.raw)
            .map_err(|e| ValidationError::MalformedCardData(e.to_string()))?;
        let prices = serde_json::to_value(prices)
            .map_err(|e| ValidationError::MalformedCardData(e.to_string()))?;
        if let Some(object) = value.as_object_mut() {
            object.insert("prices".to_string(), prices);
        }
        Self::from_value(&value)
    }
}

impl Serialize for CardSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw: &RawValue =
            serde_json::from_str(&self.raw).map_err(serde::ser::Error::custom)?;
        raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CardSnapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        Self::parse(raw.get()).map_err(serde::de::Error::custom)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7
    #[n(1)]
    pub username: String,
    #[n(2)]
    pub created_at: TimeStamp,
}

/// One collection or wishlist record. At most one exists per (user, card, kind).
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryEntry {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub kind: InventoryKind,
    #[n(2)]
    pub user_id: String,
    #[n(3)]
    pub card_id: String,
    #[n(4)]
    pub quantity: u32,
    #[n(5)]
    pub priority: Option<Priority>, // wishlist only
    #[n(6)]
    pub card: CardSnapshot,
    #[n(7)]
    pub created_at: TimeStamp,
    #[n(8)]
    pub updated_at: TimeStamp,
}

impl InventoryEntry {
    pub fn new(
        kind: InventoryKind,
        user_id: &str,
        card_id: &str,
        quantity: u32,
        priority: Option<Priority>,
        card: CardSnapshot,
    ) -> crate::Result<Self> {
        let now = TimeStamp::new();
        let priority = match kind {
            InventoryKind::Collection => None,
            InventoryKind::Wishlist => Some(priority.unwrap_or_default()),
        };
        Ok(Self {
            id: utils::new_uuid_to_bech32(kind.id_prefix())?,
            kind,
            user_id: user_id.to_string(),
            card_id: card_id.to_string(),
            quantity,
            priority,
            card,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original).unwrap();
        let decode: TimeStamp = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn after_is_strictly_later() {
        let future = TimeStamp::from(Utc::now() + Duration::hours(1));
        assert!(TimeStamp::after(&future) > future);
    }

    #[test]
    fn priority_parsing() {
        assert_eq!("HIGH".parse::<Priority>(), Ok(Priority::High));
        assert_eq!(" low ".parse::<Priority>(), Ok(Priority::Low));
        assert_eq!(
            "urgent".parse::<Priority>(),
            Err(ValidationError::InvalidPriority("urgent".into()))
        );
    }

    #[test]
    fn snapshot_keeps_original_text() {
        let raw = r#"{ "name": "Lightning Bolt",  "prices": {"usd": "1.10"} }"#;
        let snapshot = CardSnapshot::parse(raw).unwrap();
        assert_eq!(snapshot.as_str(), raw);

        let encoded = minicbor::to_vec(&snapshot).unwrap();
        let decoded: CardSnapshot = minicbor::decode(&encoded).unwrap();
        assert_eq!(decoded.as_str(), raw);

        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(json, raw);
    }

    #[test]
    fn snapshot_rejects_non_objects_and_nameless_cards() {
        assert!(CardSnapshot::parse("[1,2]").is_err());
        assert!(CardSnapshot::parse("{not json").is_err());
        assert!(CardSnapshot::parse(r#"{"type_line":"Instant"}"#).is_err());
    }

    #[test]
    fn snapshot_rejects_non_string_prices() {
        for bad in [
            r#"{"name":"B","prices":{"usd":1.5}}"#,
            r#"{"name":"B","prices":"1.50"}"#,
            r#"{"name":"B","rarity":3}"#,
        ] {
            assert!(
                matches!(CardSnapshot::parse(bad), Err(ValidationError::MalformedCardData(_))),
                "accepted {bad}"
            );
        }
        assert!(CardSnapshot::parse(r#"{"name":"B","prices":{"usd":null,"eur":"1.00"}}"#).is_ok());
    }

    #[test]
    fn new_with_refuses_impossible_dates() {
        assert!(TimeStamp::new_with(2024, 2, 30, 0, 0, 0).is_none());
        assert!(TimeStamp::new_with(2024, 1, 1, 24, 0, 0).is_none());
        let leap = TimeStamp::new_with(2024, 2, 29, 12, 0, 0).unwrap();
        assert_eq!(leap.to_datetime_utc().to_rfc3339(), "2024-02-29T12:00:00+00:00");
    }

    #[test]
    fn with_prices_replaces_only_prices() {
        let snapshot =
            CardSnapshot::parse(r#"{"name":"Forest","prices":{"usd":"0.10"}}"#).unwrap();
        let refreshed = snapshot
            .with_prices(&CardPrices {
                usd: Some("0.25".into()),
                ..Default::default()
            })
            .unwrap();
        let fields = refreshed.fields().unwrap();
        assert_eq!(fields.name, "Forest");
        assert_eq!(fields.prices.usd.as_deref(), Some("0.25"));
        assert_ne!(snapshot.fingerprint(), refreshed.fingerprint());
    }
}
