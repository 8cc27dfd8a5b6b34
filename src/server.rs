use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::{filter_free_models, ChatMessage, LlmApiProvider};
use crate::autotitle::AutoTitler;
use crate::config::{AppConfig, CustomApiKeyStore};
use crate::models::{Message, Role, DEFAULT_TITLE};
use crate::storage::StorageManager;
use crate::titler::TitleGenerator;
use crate::titles::TitleStore;

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<StorageManager>,
    pub provider: Arc<dyn LlmApiProvider>,
    pub titles: TitleStore,
    pub api_keys: CustomApiKeyStore,
    pub titler: Arc<TitleGenerator>,
    pub auto_titler: Arc<AutoTitler>,
    pub config: Arc<AppConfig>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/generate-title", post(generate_title))
        .route("/api/models", get(list_models))
        .route("/api/threads", post(create_thread).get(list_threads))
        .route("/api/threads/:id", get(get_thread).delete(delete_thread))
        .route("/api/threads/:id/title", put(rename_thread))
        .route(
            "/api/threads/:id/messages",
            get(list_messages).post(append_message),
        )
        .route("/api/titles", get(list_titles))
        .route(
            "/api/settings/api-key",
            get(get_api_key).post(save_api_key).delete(delete_api_key),
        )
        .with_state(state)
}

type ApiError = (StatusCode, Json<Value>);

fn internal_error(err: anyhow::Error) -> ApiError {
    log::error!("{:?}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": err.to_string() })),
    )
}

fn bad_request(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found(message: &str) -> ApiError {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message })))
}

async fn health() -> &'static str {
    "ok"
}

// --- Chat ---

#[derive(Deserialize)]
struct ChatRequest {
    messages: Vec<ChatMessage>,
    model: Option<String>,
    #[serde(alias = "apiKey")]
    api_key: Option<String>,
}

/// Streams assistant deltas back as SSE. Routing: a key in the request wins,
/// then the stored custom key, then the server key. The stored key's model
/// override applies when the request names no model.
async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if req.messages.is_empty() {
        return Err(bad_request("messages cannot be empty"));
    }

    let custom = state.api_keys.get().await;

    let api_key = req
        .api_key
        .filter(|k| !k.trim().is_empty())
        .or_else(|| custom.as_ref().map(|r| r.api_key.clone()))
        .or_else(|| state.config.api_key.clone())
        .ok_or_else(|| bad_request("No API key configured"))?;

    let model = req
        .model
        .filter(|m| !m.trim().is_empty())
        .or_else(|| custom.and_then(|r| r.model_id))
        .unwrap_or_else(|| state.config.default_chat_model.clone());

    let deltas = state
        .provider
        .chat_stream(&api_key, &model, &req.messages)
        .await
        .map_err(|e| {
            log::error!("Chat stream failed to start: {:?}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.to_string() })),
            )
        })?;

    let events = deltas.map(|item| {
        let event = match item {
            Ok(delta) => Event::default().data(json!({ "delta": delta }).to_string()),
            Err(e) => {
                log::error!("Error mid-stream: {:?}", e);
                Event::default()
                    .event("error")
                    .data(json!({ "error": e.to_string() }).to_string())
            }
        };
        Ok::<Event, Infallible>(event)
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// --- Titles ---

#[derive(Deserialize)]
struct GenerateTitleRequest {
    message: String,
}

/// Always answers with a usable title; internal failures are flagged with a
/// server-error status but still carry the default title.
async fn generate_title(
    State(state): State<AppState>,
    Json(req): Json<GenerateTitleRequest>,
) -> (StatusCode, Json<Value>) {
    match state.titler.try_generate(&req.message).await {
        Ok(title) => (StatusCode::OK, Json(json!({ "title": title }))),
        Err(e) => {
            log::error!("Title generation failed: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "title": DEFAULT_TITLE })),
            )
        }
    }
}

async fn list_titles(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "titles": state.titles.list_all().await }))
}

// --- Models ---

async fn list_models(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let Some(api_key) = state.config.api_key.clone() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "OPENROUTER_API_KEY not configured" })),
        );
    };

    match state.provider.list_models(&api_key).await {
        Ok(raw) => {
            let models = filter_free_models(raw);
            (StatusCode::OK, Json(json!({ "models": models })))
        }
        Err(e) => {
            log::error!("Failed to fetch models: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to fetch models" })),
            )
        }
    }
}

// --- Threads ---

#[derive(Deserialize)]
struct CreateThreadRequest {
    owner_id: String,
    title: Option<String>,
}

async fn create_thread(
    State(state): State<AppState>,
    Json(req): Json<CreateThreadRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if req.owner_id.trim().is_empty() {
        return Err(bad_request("owner_id cannot be empty"));
    }
    let thread = state
        .storage
        .create_thread(req.owner_id.trim(), req.title.as_deref())
        .await
        .map_err(internal_error)?;
    Ok((StatusCode::CREATED, Json(json!(thread))))
}

#[derive(Deserialize)]
struct ListThreadsQuery {
    owner_id: String,
}

async fn list_threads(
    State(state): State<AppState>,
    Query(query): Query<ListThreadsQuery>,
) -> Result<Json<Value>, ApiError> {
    let threads = state
        .storage
        .get_threads(&query.owner_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(json!({ "threads": threads })))
}

async fn get_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let thread = state
        .storage
        .get_thread(thread_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Thread not found"))?;
    Ok(Json(json!(thread)))
}

/// Removes the thread, its messages, its cached title and any pending
/// auto-title work.
async fn delete_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.auto_titler.cancel(thread_id);
    state.titles.delete(thread_id).await;
    state
        .storage
        .delete_thread(thread_id)
        .await
        .map_err(internal_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct RenameThreadRequest {
    title: String,
}

/// Manual rename: writes the history store and the title cache.
async fn rename_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<Uuid>,
    Json(req): Json<RenameThreadRequest>,
) -> Result<StatusCode, ApiError> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(bad_request("New title cannot be empty."));
    }

    state
        .storage
        .get_thread(thread_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Thread not found"))?;

    state
        .storage
        .rename_thread(thread_id, title)
        .await
        .map_err(internal_error)?;
    state.titles.save(thread_id, title).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state
        .storage
        .get_thread(thread_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Thread not found"))?;

    let messages = state
        .storage
        .get_messages(thread_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(json!({ "messages": messages })))
}

#[derive(Deserialize)]
struct AppendMessageRequest {
    role: Role,
    content: String,
}

/// Appends a message. The first user message landing on a still-unnamed
/// thread kicks off the auto-title workflow.
async fn append_message(
    State(state): State<AppState>,
    Path(thread_id): Path<Uuid>,
    Json(req): Json<AppendMessageRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if req.content.trim().is_empty() {
        return Err(bad_request("Message content cannot be empty."));
    }

    let thread = state
        .storage
        .get_thread(thread_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("Thread not found"))?;

    let message = Message {
        id: Uuid::new_v4(),
        thread_id,
        role: req.role,
        content: req.content,
        timestamp: Utc::now(),
    };
    state
        .storage
        .append_message(&message)
        .await
        .map_err(internal_error)?;

    if req.role == Role::User && thread.is_unnamed() {
        state.auto_titler.observe(thread_id);
    }

    Ok((StatusCode::CREATED, Json(json!(message))))
}

// --- Custom API key ---

async fn get_api_key(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "record": state.api_keys.get().await }))
}

#[derive(Deserialize)]
struct SaveApiKeyRequest {
    #[serde(alias = "apiKey")]
    api_key: String,
    #[serde(alias = "modelId")]
    model_id: Option<String>,
}

async fn save_api_key(
    State(state): State<AppState>,
    Json(req): Json<SaveApiKeyRequest>,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .api_keys
        .save(&req.api_key, req.model_id)
        .await
        .map_err(|e| bad_request(&e.to_string()))?;
    Ok(Json(json!({ "record": record })))
}

async fn delete_api_key(State(state): State<AppState>) -> StatusCode {
    state.api_keys.remove().await;
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DeltaStream, RawModel};
    use crate::autotitle::AutoTitleConfig;
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, Response};
    use http_body_util::BodyExt;
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;

    /// Scripted provider for handler tests; records the key/model used for
    /// the last chat call.
    struct MockProvider {
        completion: Option<String>,
        models: Option<Vec<RawModel>>,
        stream_error: bool,
        last_chat: Mutex<Option<(String, String)>>,
    }

    impl MockProvider {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                completion: Some("A Fine Title".to_string()),
                models: Some(vec![]),
                stream_error: false,
                last_chat: Mutex::new(None),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                completion: None,
                models: None,
                stream_error: false,
                last_chat: Mutex::new(None),
            })
        }

        fn with_models(models: Vec<RawModel>) -> Arc<Self> {
            Arc::new(Self {
                completion: Some("A Fine Title".to_string()),
                models: Some(models),
                stream_error: false,
                last_chat: Mutex::new(None),
            })
        }

        /// Starts streaming fine, then dies mid-flight.
        fn with_stream_error() -> Arc<Self> {
            Arc::new(Self {
                completion: Some("A Fine Title".to_string()),
                models: Some(vec![]),
                stream_error: true,
                last_chat: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl LlmApiProvider for MockProvider {
        async fn chat_stream(
            &self,
            api_key: &str,
            model: &str,
            _messages: &[ChatMessage],
        ) -> Result<DeltaStream> {
            *self.last_chat.lock().unwrap() = Some((api_key.to_string(), model.to_string()));
            let deltas: Vec<Result<String>> = if self.stream_error {
                vec![
                    Ok("partial".to_string()),
                    Err(anyhow::anyhow!("connection reset by upstream")),
                ]
            } else {
                vec![Ok("Hello".to_string()), Ok(" world".to_string())]
            };
            Ok(Box::pin(futures::stream::iter(deltas)))
        }

        async fn complete(
            &self,
            _api_key: &str,
            _model: &str,
            _prompt: &str,
            _temperature: f32,
        ) -> Result<String> {
            self.completion
                .clone()
                .ok_or_else(|| anyhow::anyhow!("provider unavailable"))
        }

        async fn list_models(&self, _api_key: &str) -> Result<Vec<RawModel>> {
            self.models
                .clone()
                .ok_or_else(|| anyhow::anyhow!("catalog unavailable"))
        }
    }

    async fn test_state(provider: Arc<dyn LlmApiProvider>, server_key: Option<&str>) -> AppState {
        let storage = Arc::new(
            StorageManager::connect("sqlite::memory:")
                .await
                .expect("in-memory database"),
        );
        let titles = TitleStore::new(storage.clone());
        let api_keys = CustomApiKeyStore::new(storage.clone());
        let titler = Arc::new(TitleGenerator::new(
            provider.clone(),
            server_key.map(|k| k.to_string()),
            "test/title-model:free".to_string(),
        ));
        let auto_titler = Arc::new(AutoTitler::new(
            storage.clone(),
            titles.clone(),
            titler.clone(),
            AutoTitleConfig {
                debounce: Duration::from_millis(10),
                max_backoff: Duration::from_millis(50),
                max_retries: 2,
            },
        ));
        let config = AppConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            db_path: "unused".into(),
            api_url: "http://localhost:0".to_string(),
            api_key: server_key.map(|k| k.to_string()),
            default_chat_model: "test/default-model:free".to_string(),
            title_model: "test/title-model:free".to_string(),
        };
        AppState {
            storage,
            provider,
            titles,
            api_keys,
            titler,
            auto_titler,
            config: Arc::new(config),
        }
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response<Body>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn generate_title_returns_processed_title() {
        let app = router(test_state(MockProvider::new(), Some("server-key")).await);
        let response = app
            .oneshot(post_json("/api/generate-title", json!({ "message": "explain tcp" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "title": "A Fine Title" }));
    }

    #[tokio::test]
    async fn generate_title_for_blank_message_is_the_sentinel() {
        let app = router(test_state(MockProvider::new(), Some("server-key")).await);
        let response = app
            .oneshot(post_json("/api/generate-title", json!({ "message": "   " })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "title": DEFAULT_TITLE }));
    }

    #[tokio::test]
    async fn generate_title_failure_still_returns_a_title() {
        let app = router(test_state(MockProvider::failing(), Some("server-key")).await);
        let response = app
            .oneshot(post_json("/api/generate-title", json!({ "message": "explain tcp" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await, json!({ "title": DEFAULT_TITLE }));
    }

    #[tokio::test]
    async fn models_endpoint_filters_and_sorts_free_models() {
        use crate::api::ModelPricing;
        let provider = MockProvider::with_models(vec![
            RawModel {
                id: "a/paid".to_string(),
                name: Some("Paid".to_string()),
                context_length: Some(1_000_000),
                description: None,
                pricing: Some(ModelPricing { prompt: Some(json!("0.002")) }),
            },
            RawModel {
                id: "a/small:free".to_string(),
                name: Some("Small".to_string()),
                context_length: Some(8_192),
                description: Some("tiny".to_string()),
                pricing: Some(ModelPricing { prompt: Some(json!("0")) }),
            },
            RawModel {
                id: "a/big:free".to_string(),
                name: None,
                context_length: Some(131_072),
                description: None,
                pricing: Some(ModelPricing { prompt: Some(json!("0")) }),
            },
        ]);
        let app = router(test_state(provider, Some("server-key")).await);

        let response = app.oneshot(get_req("/api/models")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let models = body["models"].as_array().unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0]["id"], "a/big:free");
        assert_eq!(models[1]["id"], "a/small:free");
        assert_eq!(models[0]["description"], "No description available");
    }

    #[tokio::test]
    async fn models_endpoint_reports_upstream_failure() {
        let app = router(test_state(MockProvider::failing(), Some("server-key")).await);
        let response = app.oneshot(get_req("/api/models")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], "Failed to fetch models");
    }

    #[tokio::test]
    async fn models_endpoint_requires_a_server_key() {
        let app = router(test_state(MockProvider::new(), None).await);
        let response = app.oneshot(get_req("/api/models")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["error"],
            "OPENROUTER_API_KEY not configured"
        );
    }

    #[tokio::test]
    async fn blank_custom_api_key_is_rejected() {
        let state = test_state(MockProvider::new(), Some("server-key")).await;
        let app = router(state.clone());

        let response = app
            .clone()
            .oneshot(post_json("/api/settings/api-key", json!({ "api_key": "  " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // No record was written.
        let response = app.oneshot(get_req("/api/settings/api-key")).await.unwrap();
        assert_eq!(body_json(response).await, json!({ "record": null }));
    }

    #[tokio::test]
    async fn chat_uses_stored_key_and_model_override() {
        let provider = MockProvider::new();
        let state = test_state(provider.clone(), None).await;
        let app = router(state);

        let saved = app
            .clone()
            .oneshot(post_json(
                "/api/settings/api-key",
                json!({ "apiKey": "sk-custom", "modelId": "qwen/qwen3:free" }),
            ))
            .await
            .unwrap();
        assert_eq!(saved.status(), StatusCode::OK);

        let response = app
            .oneshot(post_json(
                "/api/chat",
                json!({ "messages": [{ "role": "user", "content": "hi" }] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("Hello"), "SSE body was: {text}");

        let last = provider.last_chat.lock().unwrap().clone().unwrap();
        assert_eq!(last, ("sk-custom".to_string(), "qwen/qwen3:free".to_string()));
    }

    #[tokio::test]
    async fn chat_surfaces_mid_stream_errors_as_error_events() {
        let app = router(test_state(MockProvider::with_stream_error(), Some("server-key")).await);
        let response = app
            .oneshot(post_json(
                "/api/chat",
                json!({ "messages": [{ "role": "user", "content": "hi" }] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        // The delta before the failure still arrives, then the error event.
        assert!(text.contains("partial"), "SSE body was: {text}");
        assert!(text.contains("event: error"), "SSE body was: {text}");
        assert!(text.contains("connection reset by upstream"), "SSE body was: {text}");
    }

    #[tokio::test]
    async fn chat_without_any_key_is_rejected() {
        let app = router(test_state(MockProvider::new(), None).await);
        let response = app
            .oneshot(post_json(
                "/api/chat",
                json!({ "messages": [{ "role": "user", "content": "hi" }] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_with_no_messages_is_rejected() {
        let app = router(test_state(MockProvider::new(), Some("server-key")).await);
        let response = app
            .oneshot(post_json("/api/chat", json!({ "messages": [] })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn first_user_message_auto_titles_the_thread() {
        let state = test_state(MockProvider::new(), Some("server-key")).await;
        let app = router(state.clone());

        let created = app
            .clone()
            .oneshot(post_json("/api/threads", json!({ "owner_id": "user-1" })))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let thread = body_json(created).await;
        assert_eq!(thread["title"], DEFAULT_TITLE);
        let thread_id = thread["id"].as_str().unwrap().to_string();

        let appended = app
            .clone()
            .oneshot(post_json(
                &format!("/api/threads/{thread_id}/messages"),
                json!({ "role": "user", "content": "how do sockets work?" }),
            ))
            .await
            .unwrap();
        assert_eq!(appended.status(), StatusCode::CREATED);

        // Let the debounced generation run its course.
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let response = app
                .clone()
                .oneshot(get_req(&format!("/api/threads/{thread_id}")))
                .await
                .unwrap();
            let thread = body_json(response).await;
            if thread["title"] != DEFAULT_TITLE {
                assert_eq!(thread["title"], "A Fine Title");
                // The title cache agrees with the history store.
                let id = Uuid::parse_str(&thread_id).unwrap();
                assert_eq!(state.titles.get(id).await.as_deref(), Some("A Fine Title"));
                return;
            }
        }
        panic!("thread was never auto-titled");
    }

    #[tokio::test]
    async fn thread_crud_round_trip() {
        let app = router(test_state(MockProvider::new(), Some("server-key")).await);

        let created = app
            .clone()
            .oneshot(post_json(
                "/api/threads",
                json!({ "owner_id": "user-1", "title": "Named up front" }),
            ))
            .await
            .unwrap();
        let thread = body_json(created).await;
        let thread_id = thread["id"].as_str().unwrap().to_string();

        let renamed = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(format!("/api/threads/{thread_id}/title"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "title": "Renamed" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(renamed.status(), StatusCode::NO_CONTENT);

        let listed = app
            .clone()
            .oneshot(get_req("/api/threads?owner_id=user-1"))
            .await
            .unwrap();
        let body = body_json(listed).await;
        assert_eq!(body["threads"][0]["title"], "Renamed");

        let deleted = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/threads/{thread_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

        let missing = app
            .oneshot(get_req(&format!("/api/threads/{thread_id}")))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn appending_to_a_missing_thread_is_not_found() {
        let app = router(test_state(MockProvider::new(), Some("server-key")).await);
        let response = app
            .oneshot(post_json(
                &format!("/api/threads/{}/messages", Uuid::new_v4()),
                json!({ "role": "user", "content": "hello" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
