use std::pin::Pin;

use anyhow::{Context, Result};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::models::{FreeModel, Role};

// Alias for the stream of assistant content deltas.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A single chat turn as sent over the wire.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

// Trait defining the interface to the model-routing provider.
#[async_trait]
pub trait LlmApiProvider: Send + Sync {
    /// Streaming chat completion; yields content deltas.
    async fn chat_stream(
        &self,
        api_key: &str,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<DeltaStream>;

    /// One-shot (non-streaming) completion for a single prompt.
    async fn complete(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String>;

    /// The raw model catalog, unfiltered.
    async fn list_models(&self, api_key: &str) -> Result<Vec<RawModel>>;
}

// --- Wire types ---

#[derive(Serialize, Debug)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

// Streaming chunks carry partial content in `choices[0].delta`.
#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Debug, Default)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize, Debug)]
struct CompletionChoice {
    message: ChatMessage,
}

#[derive(Deserialize, Debug)]
struct ModelsResponse {
    data: Vec<RawModel>,
}

/// A catalog entry as the provider reports it.
#[derive(Deserialize, Debug, Clone)]
pub struct RawModel {
    pub id: String,
    pub name: Option<String>,
    pub context_length: Option<i64>,
    pub description: Option<String>,
    pub pricing: Option<ModelPricing>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ModelPricing {
    /// Per-prompt-token price; the catalog reports it as a string ("0") but
    /// numbers have been observed too.
    pub prompt: Option<serde_json::Value>,
}

impl RawModel {
    /// Zero prompt price or an explicit `:free` variant id.
    pub fn is_free(&self) -> bool {
        let zero_priced = self
            .pricing
            .as_ref()
            .and_then(|p| p.prompt.as_ref())
            .map(|prompt| match prompt {
                serde_json::Value::String(s) => s == "0" || s.parse::<f64>() == Ok(0.0),
                serde_json::Value::Number(n) => n.as_f64() == Some(0.0),
                _ => false,
            })
            .unwrap_or(false);
        zero_priced || self.id.contains(":free")
    }
}

/// Projects the raw catalog down to the free tier, sorted by context length
/// descending.
pub fn filter_free_models(raw: Vec<RawModel>) -> Vec<FreeModel> {
    let mut models: Vec<FreeModel> = raw
        .into_iter()
        .filter(RawModel::is_free)
        .map(|m| FreeModel {
            name: m.name.unwrap_or_else(|| m.id.clone()),
            context_length: m.context_length.unwrap_or(0),
            description: m
                .description
                .unwrap_or_else(|| "No description available".to_string()),
            id: m.id,
        })
        .collect();
    models.sort_by(|a, b| b.context_length.cmp(&a.context_length));
    models
}

/// Parses one SSE event payload from the streaming chat endpoint.
/// `Ok(None)` means "nothing to forward" ([DONE] marker, pings).
pub(crate) fn parse_stream_event(data: &str) -> Result<Option<String>> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(None);
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => Ok(chunk.choices.into_iter().next().and_then(|c| c.delta.content)),
        Err(e) => {
            // Comment-style keepalives and pings are not chunks; skip them.
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(data) {
                if value.get("type") == Some(&serde_json::Value::String("ping".to_string())) {
                    return Ok(None);
                }
            }
            Err(anyhow::Error::from(e).context(format!("Failed to parse stream chunk: {}", data)))
        }
    }
}

// --- OpenRouter implementation ---

pub struct OpenRouterProvider {
    client: Client,
    base_url: String,
}

impl OpenRouterProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl LlmApiProvider for OpenRouterProvider {
    async fn chat_stream(
        &self,
        api_key: &str,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<DeltaStream> {
        log::info!("Starting streaming chat request with model: {}", model);

        let body = ChatRequestBody {
            model,
            messages,
            stream: true,
            temperature: None,
        };

        let response = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send stream request to OpenRouter")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "<Failed to read error body>".to_string());
            log::error!("Chat stream request failed with status {}: {}", status, error_body);
            return Err(anyhow::anyhow!(
                "Chat request failed with status {}: {}",
                status,
                error_body
            ));
        }

        let delta_stream = response
            .bytes_stream()
            .eventsource()
            .map(|event_result| {
                let event = event_result.context("Error reading stream event")?;
                parse_stream_event(&event.data)
            })
            .filter_map(|result| async move {
                match result {
                    Ok(Some(content)) => Some(Ok(content)),
                    Ok(None) => None,
                    // Forward errors so the consumer can surface them instead
                    // of seeing the stream end silently.
                    Err(e) => Some(Err(e)),
                }
            });

        Ok(Box::pin(delta_stream))
    }

    async fn complete(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str,
        temperature: f32,
    ) -> Result<String> {
        let messages = [ChatMessage {
            role: Role::User,
            content: prompt.to_string(),
        }];
        let body = ChatRequestBody {
            model,
            messages: &messages,
            stream: false,
            temperature: Some(temperature),
        };

        let response = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send completion request to OpenRouter")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Completion request failed with status {}: {}",
                status,
                error_body
            ));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .context("Failed to decode completion response")?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("Completion response contained no choices")
    }

    async fn list_models(&self, api_key: &str) -> Result<Vec<RawModel>> {
        let response = self
            .client
            .get(self.endpoint("models"))
            .bearer_auth(api_key)
            .send()
            .await
            .context("Failed to fetch model catalog")?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Model catalog request failed with status {}",
                response.status()
            ));
        }

        let catalog: ModelsResponse = response
            .json()
            .await
            .context("Failed to decode model catalog")?;
        Ok(catalog.data)
    }
}
