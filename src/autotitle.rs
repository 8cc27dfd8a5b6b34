use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::{Role, DEFAULT_TITLE};
use crate::storage::StorageManager;
use crate::titler::TitleSource;
use crate::titles::TitleStore;

/// Where a thread stands in the auto-title workflow. Threads with no entry
/// are idle: nothing has been attempted yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TitleState {
    /// A generation attempt is scheduled or in flight.
    Pending,
    /// A title was generated, persisted and applied. Terminal.
    Done,
    /// The retry ceiling was reached. Terminal; manual rename still works.
    GivenUp,
}

#[derive(Clone, Copy, Debug)]
pub struct AutoTitleConfig {
    /// Base wait before the first attempt, letting the triggering message
    /// land in storage. Later attempts scale this by the retry count.
    pub debounce: Duration,
    /// Upper bound on the scaled backoff.
    pub max_backoff: Duration,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
}

impl Default for AutoTitleConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            max_retries: 10,
        }
    }
}

struct ThreadEntry {
    state: TitleState,
    task: Option<JoinHandle<()>>,
}

/// Drives title generation for unnamed threads, one independent state
/// machine per thread id. Each machine runs at most once to completion:
/// repeated `observe` calls for a thread that is pending, done or given up
/// are no-ops.
pub struct AutoTitler {
    storage: Arc<StorageManager>,
    titles: TitleStore,
    source: Arc<dyn TitleSource>,
    config: AutoTitleConfig,
    threads: DashMap<Uuid, ThreadEntry>,
}

impl AutoTitler {
    pub fn new(
        storage: Arc<StorageManager>,
        titles: TitleStore,
        source: Arc<dyn TitleSource>,
        config: AutoTitleConfig,
    ) -> Self {
        Self {
            storage,
            titles,
            source,
            config,
            threads: DashMap::new(),
        }
    }

    /// Notes that an unnamed thread has new message state and schedules a
    /// debounced generation attempt, unless one already ran or is running.
    pub fn observe(self: &Arc<Self>, thread_id: Uuid) {
        match self.threads.entry(thread_id) {
            Entry::Occupied(_) => {} // already pending or terminal
            Entry::Vacant(slot) => {
                log::debug!("Scheduling auto-title for thread {}", thread_id);
                let this = Arc::clone(self);
                let task = tokio::spawn(async move { this.run(thread_id).await });
                slot.insert(ThreadEntry {
                    state: TitleState::Pending,
                    task: Some(task),
                });
            }
        }
    }

    /// Aborts any pending attempt and forgets the thread entirely. Used when
    /// the thread itself is deleted.
    pub fn cancel(&self, thread_id: Uuid) {
        if let Some((_, entry)) = self.threads.remove(&thread_id) {
            if let Some(task) = entry.task {
                task.abort();
            }
            log::debug!("Cancelled auto-title tracking for thread {}", thread_id);
        }
    }

    pub fn state(&self, thread_id: Uuid) -> Option<TitleState> {
        self.threads.get(&thread_id).map(|entry| entry.state)
    }

    async fn run(self: Arc<Self>, thread_id: Uuid) {
        let mut retries: u32 = 0;
        loop {
            tokio::time::sleep(self.backoff(retries)).await;

            // The first user message with actual text is the title seed.
            let seed = match self.storage.get_messages(thread_id).await {
                Ok(messages) => messages
                    .into_iter()
                    .find(|m| m.role == Role::User && !m.content.trim().is_empty())
                    .map(|m| m.content),
                Err(e) => {
                    log::error!("Auto-title: failed to read messages for {}: {:?}", thread_id, e);
                    None
                }
            };

            if let Some(text) = seed {
                let title = self.source.title_for(&text).await;
                if title != DEFAULT_TITLE {
                    self.titles.save(thread_id, &title).await;
                    if let Err(e) = self.storage.rename_thread(thread_id, &title).await {
                        // The thread may have been deleted mid-flight; the
                        // cache entry is still correct for its lifetime.
                        log::warn!("Auto-title: could not rename thread {}: {:?}", thread_id, e);
                    }
                    log::info!("Auto-titled thread {}: {}", thread_id, title);
                    self.settle(thread_id, TitleState::Done);
                    return;
                }
                // Sentinel result: treat as a transient failure and retry.
            }

            if retries >= self.config.max_retries {
                log::warn!(
                    "Auto-title: giving up on thread {} after {} attempts",
                    thread_id,
                    retries + 1
                );
                self.settle(thread_id, TitleState::GivenUp);
                return;
            }
            retries += 1;
        }
    }

    fn backoff(&self, retries: u32) -> Duration {
        self.config
            .debounce
            .saturating_mul(retries + 1)
            .min(self.config.max_backoff)
    }

    fn settle(&self, thread_id: Uuid, state: TitleState) {
        if let Some(mut entry) = self.threads.get_mut(&thread_id) {
            entry.state = state;
            entry.task = None;
        }
    }
}
