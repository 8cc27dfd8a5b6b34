pub mod api;
pub mod autotitle;
pub mod config;
pub mod models;
pub mod server;
pub mod storage;
pub mod titler;
pub mod titles;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::{LlmApiProvider, OpenRouterProvider};
use crate::autotitle::{AutoTitleConfig, AutoTitler};
use crate::config::{AppConfig, CustomApiKeyStore};
use crate::server::AppState;
use crate::storage::StorageManager;
use crate::titler::TitleGenerator;
use crate::titles::TitleStore;

/// Wires up storage, the provider client and the title machinery, then
/// serves HTTP until shutdown.
pub async fn run() -> Result<()> {
    let config = Arc::new(AppConfig::from_env());

    let storage = Arc::new(StorageManager::open(&config.db_path).await?);
    let titles = TitleStore::new(storage.clone());
    let api_keys = CustomApiKeyStore::new(storage.clone());

    let provider: Arc<dyn LlmApiProvider> = Arc::new(OpenRouterProvider::new(&config.api_url));
    let titler = Arc::new(TitleGenerator::new(
        provider.clone(),
        config.api_key.clone(),
        config.title_model.clone(),
    ));
    let auto_titler = Arc::new(AutoTitler::new(
        storage.clone(),
        titles.clone(),
        titler.clone(),
        AutoTitleConfig::default(),
    ));

    let state = AppState {
        storage,
        provider,
        titles,
        api_keys,
        titler,
        auto_titler,
        config: config.clone(),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    log::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, server::router(state))
        .await
        .context("Server error")?;
    Ok(())
}
