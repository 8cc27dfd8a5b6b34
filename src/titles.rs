use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::models::TitleRecord;
use crate::storage::StorageManager;

// The whole cache is one JSON document under a fixed settings key.
const TITLES_KEY: &str = "chat-titles";

// Capacity only matters when a subscriber stops draining; senders never block.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Change notification emitted on every successful write, so other parts of
/// the application can react without polling.
#[derive(Clone, Debug)]
pub enum TitleEvent {
    Saved { thread_id: Uuid, title: String },
    Deleted { thread_id: Uuid },
}

/// Durable thread-id to title-record map. All operations degrade on storage
/// failure: reads return nothing, writes become logged no-ops. Nothing here
/// ever propagates an error to a caller.
#[derive(Clone)]
pub struct TitleStore {
    storage: Arc<StorageManager>,
    events: broadcast::Sender<TitleEvent>,
    // The cache is a single document, so every mutation is a full
    // read-modify-write cycle. Concurrent writers (one orchestrator task per
    // thread) must take this lock or they overwrite each other's records.
    write_lock: Arc<Mutex<()>>,
}

impl TitleStore {
    pub fn new(storage: Arc<StorageManager>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            storage,
            events,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TitleEvent> {
        self.events.subscribe()
    }

    /// Returns the cached title for a thread, if any.
    pub async fn get(&self, thread_id: Uuid) -> Option<String> {
        self.read_map().await.remove(&thread_id).map(|r| r.title)
    }

    /// Upserts a title. The original created-at survives updates; updated-at
    /// is always refreshed.
    pub async fn save(&self, thread_id: Uuid, title: &str) {
        let _guard = self.write_lock.lock().await;
        let mut titles = self.read_map().await;
        let now = Utc::now().timestamp_millis();
        let created_at = titles.get(&thread_id).map(|r| r.created_at).unwrap_or(now);

        titles.insert(
            thread_id,
            TitleRecord {
                thread_id,
                title: title.to_string(),
                created_at,
                updated_at: now,
            },
        );

        if self.write_map(&titles).await {
            let _ = self.events.send(TitleEvent::Saved {
                thread_id,
                title: title.to_string(),
            });
        }
    }

    /// Removes a thread's record. Absent records are fine.
    pub async fn delete(&self, thread_id: Uuid) {
        let _guard = self.write_lock.lock().await;
        let mut titles = self.read_map().await;
        if titles.remove(&thread_id).is_none() {
            return;
        }
        if self.write_map(&titles).await {
            let _ = self.events.send(TitleEvent::Deleted { thread_id });
        }
    }

    /// All records, most recently updated first.
    pub async fn list_all(&self) -> Vec<TitleRecord> {
        let mut records: Vec<TitleRecord> = self.read_map().await.into_values().collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        records
    }

    /// Drops the entire cache.
    pub async fn clear_all(&self) {
        let _guard = self.write_lock.lock().await;
        if let Err(e) = self.storage.delete_setting(TITLES_KEY).await {
            log::error!("Failed to clear title cache: {:?}", e);
        }
    }

    async fn read_map(&self) -> HashMap<Uuid, TitleRecord> {
        let raw = match self.storage.get_setting(TITLES_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return HashMap::new(),
            Err(e) => {
                log::error!("Failed to read title cache: {:?}", e);
                return HashMap::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(titles) => titles,
            Err(e) => {
                log::error!("Title cache is corrupted, treating as empty: {:?}", e);
                HashMap::new()
            }
        }
    }

    /// Returns true when the write actually landed.
    async fn write_map(&self, titles: &HashMap<Uuid, TitleRecord>) -> bool {
        let encoded = match serde_json::to_string(titles) {
            Ok(encoded) => encoded,
            Err(e) => {
                log::error!("Failed to encode title cache: {:?}", e);
                return false;
            }
        };
        match self.storage.set_setting(TITLES_KEY, &encoded).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to save title cache: {:?}", e);
                false
            }
        }
    }
}
