use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::api::LlmApiProvider;
use crate::models::DEFAULT_TITLE;

const TITLE_TEMPERATURE: f32 = 0.7;
const MAX_TITLE_WORDS: usize = 7;
const MAX_TITLE_CHARS: usize = 60;
const FALLBACK_MAX_CHARS: usize = 50;

fn title_prompt(message: &str) -> String {
    format!(
        "Generate a concise, descriptive title (5-7 words maximum) for a chat \
         conversation that starts with this user message. Only respond with the \
         title, nothing else.\n\nUser message: \"{}\"\n\nTitle:",
        message
    )
}

/// Something that can name a conversation from its opening message. Never
/// fails: implementations return the sentinel when nothing usable can be
/// produced.
#[async_trait]
pub trait TitleSource: Send + Sync {
    async fn title_for(&self, message: &str) -> String;
}

/// Model-backed title generation with a deterministic local fallback.
pub struct TitleGenerator {
    provider: Arc<dyn LlmApiProvider>,
    api_key: Option<String>,
    model: String,
}

impl TitleGenerator {
    pub fn new(provider: Arc<dyn LlmApiProvider>, api_key: Option<String>, model: String) -> Self {
        Self {
            provider,
            api_key,
            model,
        }
    }

    /// Preferred path only: asks the model and post-processes the output.
    /// Errors here are what the fallback exists for.
    pub async fn try_generate(&self, message: &str) -> Result<String> {
        let message = message.trim();
        if message.is_empty() {
            return Ok(DEFAULT_TITLE.to_string());
        }

        let api_key = self
            .api_key
            .as_deref()
            .context("No API key configured for title generation")?;

        let raw = self
            .provider
            .complete(api_key, &self.model, &title_prompt(message), TITLE_TEMPERATURE)
            .await?;

        let title = post_process(&raw);
        if title.is_empty() {
            Ok(DEFAULT_TITLE.to_string())
        } else {
            Ok(title)
        }
    }
}

#[async_trait]
impl TitleSource for TitleGenerator {
    async fn title_for(&self, message: &str) -> String {
        match self.try_generate(message).await {
            Ok(title) if title != DEFAULT_TITLE => title,
            Ok(_) => fallback_title(message),
            Err(e) => {
                log::error!("Title generation failed, using fallback: {:?}", e);
                fallback_title(message)
            }
        }
    }
}

/// Cleans up raw model output: strips wrapping quotes and a leading
/// "Title:" label, caps at 7 words, caps at 60 characters including the
/// trailing ellipsis.
pub fn post_process(raw: &str) -> String {
    let mut title = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string();

    if title.to_lowercase().starts_with("title:") {
        title = title["title:".len()..].trim_start().to_string();
    }

    let words: Vec<&str> = title.split_whitespace().collect();
    let mut title = if words.len() > MAX_TITLE_WORDS {
        words[..MAX_TITLE_WORDS].join(" ")
    } else {
        words.join(" ")
    };

    if title.chars().count() > MAX_TITLE_CHARS {
        let mut cut: String = title.chars().take(MAX_TITLE_CHARS - 3).collect();
        cut.truncate(cut.trim_end().len());
        if !cut.ends_with(['.', '!', '?']) {
            cut.push_str("...");
        }
        title = cut;
    }

    title
}

/// Deterministic local fallback: the message itself, truncated to 50
/// characters at the last space when that break point sits past 60% of the
/// limit. Empty input yields the sentinel.
pub fn fallback_title(message: &str) -> String {
    let clean = message.trim();
    if clean.is_empty() {
        return DEFAULT_TITLE.to_string();
    }

    if clean.chars().count() <= FALLBACK_MAX_CHARS {
        return clean.to_string();
    }

    let truncated: String = clean.chars().take(FALLBACK_MAX_CHARS).collect();
    match truncated.rfind(' ') {
        Some(pos) if pos > FALLBACK_MAX_CHARS * 6 / 10 => format!("{}...", &truncated[..pos]),
        _ => format!("{}...", truncated),
    }
}
