use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use tokio::sync::broadcast;

use crate::models::CustomApiKeyRecord;
use crate::storage::StorageManager;

/// Default chat model when neither the request nor the stored custom key
/// names one.
pub const DEFAULT_CHAT_MODEL: &str = "deepseek/deepseek-r1:free";
/// Model used for title generation.
pub const DEFAULT_TITLE_MODEL: &str = "mistral/mistral-small-3.1:free";

const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_DB_PATH: &str = "orchat.sqlite";

// Fixed settings key for the single custom-API-key record.
const CUSTOM_API_KEY_KEY: &str = "openrouter_custom_api_key";

/// Process configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub api_url: String,
    /// Server-side OpenRouter key. Optional: requests may carry their own,
    /// but the models and title endpoints need this one.
    pub api_key: Option<String>,
    pub default_chat_model: String,
    pub title_model: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("ORCHAT_BIND_ADDR", DEFAULT_BIND_ADDR),
            db_path: PathBuf::from(env_or("ORCHAT_DB_PATH", DEFAULT_DB_PATH)),
            api_url: env_or("ORCHAT_API_URL", DEFAULT_API_URL),
            api_key: std::env::var("OPENROUTER_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            default_chat_model: env_or("ORCHAT_CHAT_MODEL", DEFAULT_CHAT_MODEL),
            title_model: env_or("ORCHAT_TITLE_MODEL", DEFAULT_TITLE_MODEL),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Emitted whenever the custom key record changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiKeyEvent {
    Updated,
    Removed,
}

/// Durable store for the user-supplied routing key: a single JSON record
/// under a fixed settings key. The key is read before each chat request to
/// decide routing and is only ever forwarded to the model provider.
#[derive(Clone)]
pub struct CustomApiKeyStore {
    storage: Arc<StorageManager>,
    events: broadcast::Sender<ApiKeyEvent>,
}

impl CustomApiKeyStore {
    pub fn new(storage: Arc<StorageManager>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self { storage, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ApiKeyEvent> {
        self.events.subscribe()
    }

    /// Saves (or overwrites) the custom key. A blank key is rejected without
    /// touching storage.
    pub async fn save(&self, api_key: &str, model_id: Option<String>) -> Result<CustomApiKeyRecord> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(anyhow!("API key cannot be empty."));
        }

        let record = CustomApiKeyRecord {
            api_key: api_key.to_string(),
            model_id: model_id.filter(|m| !m.trim().is_empty()),
            saved_at: Utc::now().timestamp_millis(),
        };

        let encoded = serde_json::to_string(&record)?;
        self.storage.set_setting(CUSTOM_API_KEY_KEY, &encoded).await?;
        let _ = self.events.send(ApiKeyEvent::Updated);
        log::info!("Custom API key saved (model override: {:?})", record.model_id);
        Ok(record)
    }

    /// Returns the stored record, or None when absent or unreadable.
    pub async fn get(&self) -> Option<CustomApiKeyRecord> {
        let raw = match self.storage.get_setting(CUSTOM_API_KEY_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                log::error!("Failed to read custom API key: {:?}", e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                log::error!("Stored custom API key is corrupted: {:?}", e);
                None
            }
        }
    }

    /// Deletes the record; absent is fine.
    pub async fn remove(&self) {
        if let Err(e) = self.storage.delete_setting(CUSTOM_API_KEY_KEY).await {
            log::error!("Failed to remove custom API key: {:?}", e);
            return;
        }
        let _ = self.events.send(ApiKeyEvent::Removed);
        log::info!("Custom API key removed");
    }
}
