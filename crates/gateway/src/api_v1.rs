//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST /v1/turns`                 : Start a turn, get its SSE frame stream
//! - `POST /v1/chat`                  : Start a turn, get the collected result
//! - `GET  /v1/models`                : List reachable models
//! - `GET  /v1/tools`                 : List available tools
//! - `GET  /v1/threads`               : List the caller's threads
//! - `POST /v1/threads`               : Create a thread
//! - `GET  /v1/threads/{id}`          : Get one thread
//! - `POST /v1/threads/{id}`          : Rename a thread
//! - `GET  /v1/threads/{id}/messages` : Get a thread's messages in order
//! - `POST /v1/threads/{id}/disable`  : Soft-delete a thread
//! - `GET  /v1/events`                : SSE stream of domain events

use axum::{
    Extension, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderName, StatusCode, header},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tracing::{error, info};

use threadloom_agent::{CollectedTurn, GatewayError, TurnOptions};
use threadloom_core::error::StoreError;
use threadloom_core::event::DomainEvent;
use threadloom_core::identity::Identity;
use threadloom_core::provider::ToolDefinition;
use threadloom_core::thread::{StoredMessage, Thread, ThreadId};

use crate::SharedState;

/// Response header carrying the turn's thread id.
pub const THREAD_ID_HEADER: &str = "x-thread-id";

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/turns", post(turn_handler))
        .route("/chat", post(chat_handler))
        .route("/models", get(list_models_handler))
        .route("/tools", get(list_tools_handler))
        .route("/threads", get(list_threads_handler).post(create_thread_handler))
        .route("/threads/{id}", get(get_thread_handler).post(update_thread_handler))
        .route("/threads/{id}/messages", get(list_messages_handler))
        .route("/threads/{id}/disable", post(disable_thread_handler))
        .route("/events", get(event_stream_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct TurnBody {
    /// Existing thread (omit to start a new one)
    #[serde(default)]
    pub thread_id: Option<String>,
    pub content: String,
    /// Model selector, optionally prefixed with a provider name
    #[serde(default)]
    pub model: Option<String>,
    /// Offer tools to the model; `false` makes a plain chat turn
    #[serde(default = "default_tools", alias = "advanced")]
    pub tools: bool,
}

fn default_tools() -> bool {
    true
}

impl TurnBody {
    fn options(&mut self) -> TurnOptions {
        TurnOptions {
            model: self.model.take(),
            tools: self.tools,
        }
    }
}

/// Longest accepted thread title, in characters.
const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadUpdateBody {
    pub title: String,
}

#[derive(Serialize, Deserialize)]
struct ModelListResponse {
    default: String,
    models: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct ToolListResponse {
    tools: Vec<ToolDefinition>,
    count: usize,
}

#[derive(Serialize, Deserialize)]
struct ThreadListResponse {
    threads: Vec<Thread>,
}

#[derive(Serialize, Deserialize)]
struct MessageListResponse {
    thread_id: String,
    messages: Vec<StoredMessage>,
}

#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// An error rendered as `{"error": "..."}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match &e {
            StoreError::ThreadNotFound(_) => StatusCode::NOT_FOUND,
            StoreError::NotOwner { .. } => StatusCode::FORBIDDEN,
            StoreError::ThreadDisabled(_) => StatusCode::CONFLICT,
            StoreError::Storage(_) | StoreError::MigrationFailed(_) => {
                error!(error = %e, "Store failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::EmptyContent => Self::new(StatusCode::BAD_REQUEST, e.to_string()),
            GatewayError::ThreadNotFound(_) => Self::new(StatusCode::NOT_FOUND, e.to_string()),
            GatewayError::Forbidden { .. } => Self::new(StatusCode::FORBIDDEN, e.to_string()),
            GatewayError::Store(inner) => inner.into(),
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

/// `POST /v1/turns`: one SSE frame per turn event, `done` last.
///
/// The response body owns the turn: when the client disconnects, the body
/// is dropped and the turn is cancelled.
async fn turn_handler(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
    Json(mut body): Json<TurnBody>,
) -> Result<Response, ApiError> {
    info!(identity = %identity, thread_id = ?body.thread_id, tools = body.tools, "v1/turns request");

    let options = body.options();
    let handle = state
        .turns
        .start_turn_with(
            identity,
            body.thread_id.map(ThreadId::from),
            body.content,
            options,
        )
        .await?;
    let thread_id = handle.thread_id().to_string();
    let frames = handle.into_frames().map(Ok::<_, Infallible>);

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream".to_string()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
            (HeaderName::from_static(THREAD_ID_HEADER), thread_id),
        ],
        Body::from_stream(frames),
    )
        .into_response())
}

/// `POST /v1/chat`: the same turn, collected into one JSON response.
async fn chat_handler(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
    Json(mut body): Json<TurnBody>,
) -> Result<Json<CollectedTurn>, ApiError> {
    info!(identity = %identity, thread_id = ?body.thread_id, tools = body.tools, "v1/chat request");

    let options = body.options();
    let handle = state
        .turns
        .start_turn_with(
            identity,
            body.thread_id.map(ThreadId::from),
            body.content,
            options,
        )
        .await?;
    Ok(Json(handle.collect().await))
}

async fn list_models_handler(State(state): State<SharedState>) -> Json<ModelListResponse> {
    let providers = state.turns.orchestrator().providers();
    Json(ModelListResponse {
        default: providers.default_model().to_string(),
        models: providers.list_models().await,
    })
}

async fn list_tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let tools = state.turns.orchestrator().tools().list_tools();
    Json(ToolListResponse {
        count: tools.len(),
        tools,
    })
}

async fn list_threads_handler(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ThreadListResponse>, ApiError> {
    let threads = state
        .turns
        .orchestrator()
        .store()
        .list_threads(&identity.subject)
        .await?;
    Ok(Json(ThreadListResponse { threads }))
}

async fn create_thread_handler(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
) -> Result<(StatusCode, Json<Thread>), ApiError> {
    let orchestrator = state.turns.orchestrator();
    let thread = orchestrator.store().create_thread(&identity.subject).await?;
    orchestrator.events().publish(DomainEvent::ThreadCreated {
        thread_id: thread.id.to_string(),
        owner_id: thread.owner_id.clone(),
        timestamp: chrono::Utc::now(),
    });
    Ok((StatusCode::CREATED, Json(thread)))
}

/// Fetch a thread the caller owns.
async fn owned_thread(state: &SharedState, identity: &Identity, id: &str) -> Result<Thread, ApiError> {
    let thread = state
        .turns
        .orchestrator()
        .store()
        .get_thread(&ThreadId::from(id))
        .await?;
    if !thread.is_owned_by(&identity.subject) {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            format!("thread {id} does not belong to {identity}"),
        ));
    }
    Ok(thread)
}

async fn get_thread_handler(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<Thread>, ApiError> {
    Ok(Json(owned_thread(&state, &identity, &id).await?))
}

/// `POST /v1/threads/{id}`: retitle a thread the caller owns.
async fn update_thread_handler(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(body): Json<ThreadUpdateBody>,
) -> Result<Json<Thread>, ApiError> {
    let title = body.title.trim();
    if title.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "title must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("title is longer than {MAX_TITLE_CHARS} characters"),
        ));
    }

    let orchestrator = state.turns.orchestrator();
    let thread = orchestrator
        .store()
        .rename_thread(&ThreadId::from(id), &identity.subject, title)
        .await?;
    info!(thread_id = %thread.id, identity = %identity, "Thread renamed");
    orchestrator.events().publish(DomainEvent::ThreadRenamed {
        thread_id: thread.id.to_string(),
        title: thread.title.clone(),
        timestamp: chrono::Utc::now(),
    });
    Ok(Json(thread))
}

async fn list_messages_handler(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<MessageListResponse>, ApiError> {
    let thread = owned_thread(&state, &identity, &id).await?;
    let messages = state
        .turns
        .orchestrator()
        .store()
        .list_messages(&thread.id)
        .await?;
    Ok(Json(MessageListResponse {
        thread_id: thread.id.to_string(),
        messages,
    }))
}

async fn disable_thread_handler(
    State(state): State<SharedState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<Thread>, ApiError> {
    let orchestrator = state.turns.orchestrator();
    let thread = orchestrator
        .store()
        .disable_thread(&ThreadId::from(id), &identity.subject)
        .await?;
    info!(thread_id = %thread.id, identity = %identity, "Thread disabled");
    orchestrator.events().publish(DomainEvent::ThreadDisabled {
        thread_id: thread.id.to_string(),
        timestamp: chrono::Utc::now(),
    });
    Ok(Json(thread))
}

// ── SSE Event Stream ──────────────────────────────────────────────────────

/// `GET /v1/events`: SSE stream of domain events (turns, tools, threads).
async fn event_stream_handler(
    State(state): State<SharedState>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.turns.orchestrator().events().subscribe();
    let stream = tokio_stream::wrappers::BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .map(|event| {
            let data = serde_json::to_string(event.as_ref()).unwrap_or_default();
            Ok(SseEvent::default().event(event.event_type()).data(data))
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    use async_trait::async_trait;
    use threadloom_agent::{FrameDecoder, StreamEvent, TurnErrorKind, TurnGateway, TurnOrchestrator, TurnSettings};
    use threadloom_core::error::ToolError;
    use threadloom_core::event::EventBus;
    use threadloom_core::message::Role;
    use threadloom_core::tool::{Tool, ToolOutput, ToolRegistry, ToolStatus};
    use threadloom_providers::{ProviderRouter, ScriptStep, ScriptedProvider};
    use threadloom_store::InMemoryStore;

    use crate::AppState;

    struct FakeSearch;

    #[async_trait]
    impl Tool for FakeSearch {
        fn name(&self) -> &str {
            "web_search"
        }
        fn description(&self) -> &str {
            "Search the web"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            })
        }
        async fn execute(&self, _args: serde_json::Value) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::text("1. Weather: sunny, 21°C"))
        }
    }

    fn test_state(scripts: Vec<Vec<ScriptStep>>) -> SharedState {
        test_state_with_provider(scripts).0
    }

    fn test_state_with_provider(
        scripts: Vec<Vec<ScriptStep>>,
    ) -> (SharedState, Arc<ScriptedProvider>) {
        let provider = Arc::new(ScriptedProvider::new(scripts));
        let mut router = ProviderRouter::new("scripted", "scripted-1");
        router.register("scripted", provider.clone());
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(FakeSearch));
        let orchestrator = TurnOrchestrator::new(
            Arc::new(router),
            Arc::new(tools),
            Arc::new(InMemoryStore::new()),
            Arc::new(EventBus::default()),
            TurnSettings::default(),
        );
        let state = Arc::new(AppState::new(
            TurnGateway::new(Arc::new(orchestrator), 1),
            Default::default(),
        ));
        (state, provider)
    }

    fn app(state: &SharedState) -> Router {
        v1_router(state.clone()).layer(Extension(Identity::new("alice")))
    }

    fn app_as(state: &SharedState, subject: &str) -> Router {
        v1_router(state.clone()).layer(Extension(Identity::new(subject)))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    async fn decode(response: Response) -> Vec<StreamEvent> {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        FrameDecoder::new()
            .push(&body)
            .into_iter()
            .map(Result::unwrap)
            .collect()
    }

    #[tokio::test]
    async fn turn_streams_frames() {
        let state = test_state(vec![vec![ScriptStep::text("4")]]);

        let response = app(&state)
            .oneshot(post_json("/turns", serde_json::json!({"content": "What is 2+2?"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        let thread_id = response.headers()[THREAD_ID_HEADER]
            .to_str()
            .unwrap()
            .to_string();

        let events = decode(response).await;
        assert_eq!(
            events,
            vec![StreamEvent::text("4"), StreamEvent::Done { thread_id: thread_id.clone() }]
        );

        // The thread now holds the user message and the answer
        let response = app(&state)
            .oneshot(get(&format!("/threads/{thread_id}/messages")))
            .await
            .unwrap();
        let list: MessageListResponse = json(response).await;
        let roles: Vec<Role> = list.messages.iter().map(|m| m.message.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(list.messages[0].ordinal, 1);
        assert_eq!(list.messages[1].ordinal, 2);
    }

    #[tokio::test]
    async fn turn_with_search_reports_tool_frames() {
        let state = test_state(vec![
            vec![ScriptStep::tool_call(
                "call_1",
                "web_search",
                serde_json::json!({"query": "weather today"}),
            )],
            vec![ScriptStep::text("Sunny, 21°C.")],
        ]);

        let response = app(&state)
            .oneshot(post_json("/turns", serde_json::json!({"content": "Weather?"})))
            .await
            .unwrap();
        let kinds: Vec<&str> = decode(response).await.iter().map(|e| e.event_type()).collect();
        assert_eq!(kinds, vec!["tool_started", "tool_finished", "text_delta", "done"]);
    }

    #[tokio::test]
    async fn tools_can_be_switched_off_per_turn() {
        let (state, provider) = test_state_with_provider(vec![
            vec![ScriptStep::text("plain")],
            vec![ScriptStep::text("with tools")],
        ]);

        let response = app(&state)
            .oneshot(post_json("/chat", serde_json::json!({"content": "hi", "tools": false})))
            .await
            .unwrap();
        let turn: CollectedTurn = json(response).await;
        assert_eq!(turn.text, "plain");

        let response = app(&state)
            .oneshot(post_json("/chat", serde_json::json!({"content": "hi again"})))
            .await
            .unwrap();
        let turn: CollectedTurn = json(response).await;
        assert_eq!(turn.text, "with tools");

        let requests = provider.requests();
        assert!(requests[0].tools.is_empty());
        assert_eq!(requests[1].tools.len(), 1);
        assert_eq!(requests[1].tools[0].name, "web_search");
    }

    #[tokio::test]
    async fn owner_can_rename_thread() {
        let state = test_state(vec![]);
        let response = app(&state).oneshot(post_json("/threads", serde_json::json!({}))).await.unwrap();
        let thread: Thread = json(response).await;
        let uri = format!("/threads/{}", thread.id);

        let response = app_as(&state, "mallory")
            .oneshot(post_json(&uri, serde_json::json!({"title": "mine"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app(&state)
            .oneshot(post_json(&uri, serde_json::json!({"title": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app(&state)
            .oneshot(post_json(&uri, serde_json::json!({"title": "  Trip planning "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let renamed: Thread = json(response).await;
        assert_eq!(renamed.title, "Trip planning");

        let response = app(&state).oneshot(get(&uri)).await.unwrap();
        let fetched: Thread = json(response).await;
        assert_eq!(fetched.title, "Trip planning");
    }

    #[tokio::test]
    async fn renaming_missing_thread_is_not_found() {
        let state = test_state(vec![]);
        let response = app(&state)
            .oneshot(post_json("/threads/missing", serde_json::json!({"title": "x"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_content_is_bad_request() {
        let state = test_state(vec![]);
        let response = app(&state)
            .oneshot(post_json("/turns", serde_json::json!({"content": ""})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_thread_is_not_found() {
        let state = test_state(vec![]);
        let response = app(&state)
            .oneshot(post_json(
                "/turns",
                serde_json::json!({"thread_id": "missing", "content": "hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn threads_are_owner_only() {
        let state = test_state(vec![]);

        let response = app(&state).oneshot(post_json("/threads", serde_json::json!({}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let thread: Thread = json(response).await;
        assert_eq!(thread.owner_id, "alice");

        let response = app_as(&state, "mallory")
            .oneshot(get(&format!("/threads/{}", thread.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app_as(&state, "mallory")
            .oneshot(post_json(&format!("/threads/{}/disable", thread.id), serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app_as(&state, "mallory")
            .oneshot(post_json(
                "/turns",
                serde_json::json!({"thread_id": thread.id, "content": "hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app_as(&state, "mallory").oneshot(get("/threads")).await.unwrap();
        let list: ThreadListResponse = json(response).await;
        assert!(list.threads.is_empty());
    }

    #[tokio::test]
    async fn disabled_thread_ends_turn_with_error_frame() {
        let state = test_state(vec![vec![ScriptStep::text("never")]]);

        let response = app(&state).oneshot(post_json("/threads", serde_json::json!({}))).await.unwrap();
        let thread: Thread = json(response).await;

        let response = app(&state)
            .oneshot(post_json(&format!("/threads/{}/disable", thread.id), serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disabled: Thread = json(response).await;
        assert!(disabled.disabled);

        let response = app(&state)
            .oneshot(post_json(
                "/turns",
                serde_json::json!({"thread_id": thread.id, "content": "hello?"}),
            ))
            .await
            .unwrap();
        let events = decode(response).await;
        assert!(matches!(
            events[0],
            StreamEvent::Error {
                kind: TurnErrorKind::ThreadDisabled,
                ..
            }
        ));
        assert!(events[1].is_done());
    }

    #[tokio::test]
    async fn chat_collects_turn() {
        let state = test_state(vec![
            vec![ScriptStep::tool_call(
                "call_1",
                "web_search",
                serde_json::json!({"query": "weather today"}),
            )],
            vec![ScriptStep::text("Sunny, "), ScriptStep::text("21°C.")],
        ]);

        let response = app(&state)
            .oneshot(post_json("/chat", serde_json::json!({"content": "Weather?"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let turn: CollectedTurn = json(response).await;
        assert_eq!(turn.text, "Sunny, 21°C.");
        assert_eq!(turn.tools.len(), 1);
        assert_eq!(turn.tools[0].status, ToolStatus::Success);
        assert!(turn.error.is_none());
    }

    #[tokio::test]
    async fn list_tools() {
        let state = test_state(vec![]);
        let response = app(&state).oneshot(get("/tools")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let list: ToolListResponse = json(response).await;
        assert_eq!(list.count, 1);
        assert_eq!(list.tools[0].name, "web_search");
    }

    #[tokio::test]
    async fn list_models() {
        let state = test_state(vec![]);
        let response = app(&state).oneshot(get("/models")).await.unwrap();
        let list: ModelListResponse = json(response).await;
        assert_eq!(list.default, "scripted-1");
        assert!(list.models.iter().any(|m| m == "scripted/scripted-1"));
    }

    #[test]
    fn store_errors_map_to_statuses() {
        let cases = [
            (StoreError::ThreadNotFound("t".into()), StatusCode::NOT_FOUND),
            (
                StoreError::NotOwner {
                    thread_id: "t".into(),
                    requester: "bob".into(),
                },
                StatusCode::FORBIDDEN,
            ),
            (StoreError::ThreadDisabled("t".into()), StatusCode::CONFLICT),
            (StoreError::Storage("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }
}
