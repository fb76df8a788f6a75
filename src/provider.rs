//! Card data provider. The binder only relies on a stable `id` per printing and
//! the decimal price strings; everything else is carried through as-is.
use std::time::Duration;

use reqwest::{StatusCode, Url};
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{UpstreamError, ValidationError};
use crate::types::{CardPrices, CardSnapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub type_line: Option<String>,
    #[serde(default)]
    pub mana_cost: Option<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub rarity: Option<String>,
    #[serde(default)]
    pub set: Option<String>,
    #[serde(default)]
    pub prices: CardPrices,
    #[serde(default)]
    pub image_uris: Option<serde_json::Value>,
}

impl CardRecord {
    /// Snapshot to store alongside a collection or wishlist record.
    pub fn snapshot(&self) -> Result<CardSnapshot, ValidationError> {
        let raw = serde_json::to_string(self)
            .map_err(|e| ValidationError::MalformedCardData(e.to_string()))?;
        CardSnapshot::parse(raw)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub cards: Vec<CardRecord>,
    pub total_cards: u32,
    pub has_more: bool,
}

pub trait CardProvider: Send + Sync {
    /// Zero results is an empty page, never an error.
    fn search(&self, query: &str, page: u32) -> Result<SearchPage, UpstreamError>;
    /// `None` when the provider does not know the card.
    fn card(&self, card_id: &str) -> Result<Option<CardRecord>, UpstreamError>;
}

#[derive(Debug, Deserialize)]
struct CardList {
    #[serde(default)]
    data: Vec<CardRecord>,
    #[serde(default)]
    total_cards: u32,
    #[serde(default)]
    has_more: bool,
}

impl From<CardList> for SearchPage {
    fn from(list: CardList) -> Self {
        Self {
            cards: list.data,
            total_cards: list.total_cards,
            has_more: list.has_more,
        }
    }
}

/// HTTP client for a Scryfall compatible API.
pub struct ScryfallClient {
    http: Client,
    base_url: Url,
}

impl ScryfallClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .user_agent(concat!("trade-binder/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Unavailable(e.to_string()))?;
        let base_url = Url::parse(base_url)
            .map_err(|e| UpstreamError::Unavailable(format!("bad provider url {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(UpstreamError::Unavailable(format!(
                "provider url {base_url} cannot carry a path"
            )));
        }
        Ok(Self { http, base_url })
    }

    /// Base url with `segments` appended, each percent-encoded as a single
    /// path segment.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn get(&self, url: Url, query: &[(&str, &str)]) -> Result<Response, UpstreamError> {
        self.http
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query)
            .send()
            .map_err(|e| {
                warn!(%url, error = %e, "card provider unreachable");
                UpstreamError::Unavailable(e.to_string())
            })
    }
}

/// Maps non-success statuses. `Ok(None)` means 404.
pub(crate) fn classify(status: StatusCode) -> Result<Option<()>, UpstreamError> {
    match status {
        s if s.is_success() => Ok(Some(())),
        StatusCode::NOT_FOUND => Ok(None),
        StatusCode::TOO_MANY_REQUESTS => Err(UpstreamError::RateLimited),
        s => Err(UpstreamError::Status(s.as_u16())),
    }
}

impl CardProvider for ScryfallClient {
    fn search(&self, query: &str, page: u32) -> Result<SearchPage, UpstreamError> {
        let url = self.endpoint(&["cards", "search"]);
        let page = page.max(1).to_string();
        let response = self.get(url, &[("q", query), ("page", page.as_str())])?;

        if classify(response.status())?.is_none() {
            debug!(query, "card search returned no results");
            return Ok(SearchPage::default());
        }
        let list: CardList = response
            .json()
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;
        Ok(list.into())
    }

    fn card(&self, card_id: &str) -> Result<Option<CardRecord>, UpstreamError> {
        // dot segments would be dropped from the path and hit the listing
        if matches!(card_id, "." | "..") {
            return Ok(None);
        }
        let url = self.endpoint(&["cards", card_id]);
        let response = self.get(url, &[])?;

        if classify(response.status())?.is_none() {
            return Ok(None);
        }
        response
            .json()
            .map(Some)
            .map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(classify(StatusCode::OK), Ok(Some(()))));
        assert!(matches!(classify(StatusCode::NOT_FOUND), Ok(None)));
        assert!(matches!(
            classify(StatusCode::TOO_MANY_REQUESTS),
            Err(UpstreamError::RateLimited)
        ));
        assert!(matches!(
            classify(StatusCode::BAD_GATEWAY),
            Err(UpstreamError::Status(502))
        ));
    }

    #[test]
    fn card_ids_stay_inside_one_path_segment() {
        let client = ScryfallClient::new("https://api.example.invalid/v1/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.endpoint(&["cards", "e3285e6b"]).as_str(),
            "https://api.example.invalid/v1/cards/e3285e6b"
        );
        assert_eq!(
            client.endpoint(&["cards", "search?q=x"]).as_str(),
            "https://api.example.invalid/v1/cards/search%3Fq=x"
        );
        assert_eq!(
            client.endpoint(&["cards", "a/b"]).as_str(),
            "https://api.example.invalid/v1/cards/a%2Fb"
        );
        assert_eq!(
            client.card("..").unwrap(),
            None,
            "dot segments never reach the network"
        );
    }

    #[test]
    fn unusable_base_urls_are_refused() {
        assert!(ScryfallClient::new("not a url", Duration::from_secs(1)).is_err());
        assert!(ScryfallClient::new("mailto:cards@example.invalid", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn card_list_decodes_with_null_prices() {
        let body = r#"{
            "object": "list",
            "total_cards": 1,
            "has_more": false,
            "data": [{
                "id": "e3285e6b-3e79-4d7c-bf96-d920f973b80d",
                "name": "Lightning Bolt",
                "type_line": "Instant",
                "mana_cost": "{R}",
                "colors": ["R"],
                "rarity": "common",
                "set": "m11",
                "prices": {"usd": "1.89", "usd_foil": null, "eur": "1.20", "tix": "0.02"},
                "image_uris": {"normal": "https://example.invalid/bolt.jpg"}
            }]
        }"#;
        let page: SearchPage = serde_json::from_str::<CardList>(body).unwrap().into();
        assert_eq!(page.total_cards, 1);
        let bolt = &page.cards[0];
        assert_eq!(bolt.prices.usd.as_deref(), Some("1.89"));
        assert_eq!(bolt.prices.usd_foil, None);

        let snapshot = bolt.snapshot().unwrap();
        assert_eq!(snapshot.name().as_deref(), Some("Lightning Bolt"));
    }
}
