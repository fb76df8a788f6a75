//! Environment driven configuration. A `.env` file is honoured when present.
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::advisor::HttpCompletionClient;
use crate::provider::ScryfallClient;
use crate::store::SledStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinderConfig {
    pub store: StoreConfig,
    pub card_api: CardApiConfig,
    pub completion: CompletionConfig,
    pub log_filter: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// `None` keeps everything in a temporary database.
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardApiConfig {
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl BinderConfig {
    pub fn open_store(&self) -> Result<SledStore> {
        let store = match &self.store.data_dir {
            Some(dir) => SledStore::open(dir)?,
            None => SledStore::temporary()?,
        };
        Ok(store)
    }

    pub fn card_provider(&self) -> Result<ScryfallClient> {
        Ok(ScryfallClient::new(&self.card_api.base_url, self.card_api.timeout)?)
    }

    pub fn completion_client(&self) -> Result<HttpCompletionClient> {
        Ok(HttpCompletionClient::new(
            &self.completion.endpoint,
            self.completion.api_key.clone(),
            &self.completion.model,
            self.completion.timeout,
        )?)
    }
}

pub fn load_config() -> Result<BinderConfig> {
    dotenv::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Builds the config from any key lookup, so tests need not touch the process env.
pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<BinderConfig> {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    let string = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
    let secs = |key: &str, default: u64| {
        get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(default)
    };

    let timeout = Duration::from_secs(secs("HTTP_TIMEOUT_SECS", 10));
    let cfg = BinderConfig {
        store: StoreConfig {
            data_dir: get("BINDER_DATA_DIR").map(PathBuf::from),
        },
        card_api: CardApiConfig {
            base_url: string("CARD_API_URL", "https://api.scryfall.com"),
            timeout,
        },
        completion: CompletionConfig {
            endpoint: string("COMPLETION_API_URL", "https://api.openai.com/v1"),
            api_key: get("COMPLETION_API_KEY"),
            model: string("COMPLETION_MODEL", "gpt-4o-mini"),
            timeout: Duration::from_secs(secs("COMPLETION_TIMEOUT_SECS", 30)),
        },
        log_filter: string("BINDER_LOG", "info"),
    };

    for (name, url) in [
        ("CARD_API_URL", &cfg.card_api.base_url),
        ("COMPLETION_API_URL", &cfg.completion.endpoint),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow!("{name} must be an http(s) url, got `{url}`"));
        }
    }
    Ok(cfg)
}
