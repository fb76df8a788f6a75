//! Free-text assistance backed by a text completion service: deck building,
//! rules questions and term definitions. Replies never fail outright; upstream
//! trouble and unparsable output come back flagged.
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::error::UpstreamError;
use crate::provider::classify;

pub trait TextCompletion: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String, UpstreamError>;
}

/// Client for an OpenAI compatible `chat/completions` endpoint.
pub struct HttpCompletionClient {
    http: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpCompletionClient {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }
}

impl TextCompletion for HttpCompletionClient {
    fn complete(&self, prompt: &str) -> Result<String, UpstreamError> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.endpoint))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .map_err(|e| UpstreamError::Unavailable(e.to_string()))?;
        if classify(response.status())?.is_none() {
            return Err(UpstreamError::Status(404));
        }
        let chat: ChatResponse = response
            .json()
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;
        Ok(chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckCard {
    pub name: String,
    #[serde(default = "one")]
    pub quantity: u32,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckPlan {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub cards: Vec<DeckCard>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeckRequest {
    pub format: String,
    pub colors: Vec<String>,
    pub theme: Option<String>,
    pub owned_cards: Vec<String>,
}

/// What came back from the assistant. `error` is set when the service was
/// unreachable or structured output could not be parsed; `raw` then still
/// holds whatever text is available for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvisorReply<T> {
    pub data: Option<T>,
    pub raw: String,
    pub error: bool,
    pub message: Option<String>,
}

impl<T> AdvisorReply<T> {
    fn unavailable(err: &UpstreamError) -> Self {
        warn!(error = %err, "completion service failed");
        let message = match err {
            UpstreamError::RateLimited => "The assistant is busy, try again shortly",
            _ => "The assistant is unavailable right now",
        };
        Self {
            data: None,
            raw: String::new(),
            error: true,
            message: Some(message.to_string()),
        }
    }
}

impl AdvisorReply<String> {
    fn text(raw: String) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self {
                data: None,
                raw,
                error: false,
                message: Some("The assistant had no answer".to_string()),
            };
        }
        Self {
            data: Some(trimmed.to_string()),
            raw,
            error: false,
            message: None,
        }
    }
}

/// Slice from the first `{` to the last `}` inclusive.
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

pub fn parse_deck_plan(raw: String) -> AdvisorReply<DeckPlan> {
    let parsed = extract_json_block(&raw).map(serde_json::from_str::<DeckPlan>);
    match parsed {
        Some(Ok(plan)) => AdvisorReply {
            data: Some(plan),
            raw,
            error: false,
            message: None,
        },
        Some(Err(e)) => AdvisorReply {
            data: None,
            raw,
            error: true,
            message: Some(format!("Deck suggestion could not be parsed: {e}")),
        },
        None => AdvisorReply {
            data: None,
            raw,
            error: true,
            message: Some("Deck suggestion contained no JSON object".to_string()),
        },
    }
}

pub struct Advisor<C: TextCompletion> {
    client: C,
}

impl<C: TextCompletion> Advisor<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn build_deck(&self, request: &DeckRequest) -> AdvisorReply<DeckPlan> {
        match self.client.complete(&deck_prompt(request)) {
            Ok(raw) => parse_deck_plan(raw),
            Err(err) => AdvisorReply::unavailable(&err),
        }
    }

    pub fn ask_rules(&self, question: &str) -> AdvisorReply<String> {
        let prompt = format!(
            "You are a Magic: The Gathering rules judge. Answer concisely and cite \
             the relevant comprehensive rule numbers where possible.\n\nQuestion: {}",
            question.trim()
        );
        self.answer(&prompt)
    }

    pub fn define_term(&self, term: &str) -> AdvisorReply<String> {
        let prompt = format!(
            "Define the Magic: The Gathering term \"{}\" in two or three sentences \
             and give one short example of it in play.",
            term.trim()
        );
        self.answer(&prompt)
    }

    fn answer(&self, prompt: &str) -> AdvisorReply<String> {
        match self.client.complete(prompt) {
            Ok(raw) => AdvisorReply::text(raw),
            Err(err) => AdvisorReply::unavailable(&err),
        }
    }
}

fn deck_prompt(request: &DeckRequest) -> String {
    let mut prompt = format!(
        "Build a Magic: The Gathering deck for the {} format.",
        request.format
    );
    if !request.colors.is_empty() {
        prompt.push_str(&format!(" Colors: {}.", request.colors.join(", ")));
    }
    if let Some(theme) = &request.theme {
        prompt.push_str(&format!(" Theme: {theme}."));
    }
    if !request.owned_cards.is_empty() {
        prompt.push_str(&format!(
            " Prefer cards the player already owns: {}.",
            request.owned_cards.join(", ")
        ));
    }
    prompt.push_str(
        " Reply with a single JSON object of the form \
         {\"name\": string, \"strategy\": string, \"cards\": [{\"name\": string, \"quantity\": number}]}.",
    );
    prompt
}
