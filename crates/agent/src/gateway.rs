//! Turn gateway: the boundary where an authenticated request becomes a
//! running turn.
//!
//! `start_turn` resolves (or creates) the thread, spawns the orchestrator,
//! and hands back a [`TurnHandle`]. Dropping the handle's frame stream is
//! how a disconnecting client cancels its turn.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use threadloom_core::error::StoreError;
use threadloom_core::event::DomainEvent;
use threadloom_core::identity::Identity;
use threadloom_core::thread::ThreadId;
use threadloom_core::tool::{ToolErrorKind, ToolStatus};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::emitter;
use crate::encoder;
use crate::orchestrator::{TurnOrchestrator, TurnOutcome, TurnRequest};
use crate::stream_event::{StreamEvent, TurnErrorKind};

/// Why a turn could not be started.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("message content is empty")]
    EmptyContent,

    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    #[error("thread {thread_id} does not belong to {requester}")]
    Forbidden { thread_id: String, requester: String },

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ThreadNotFound(id) => GatewayError::ThreadNotFound(id),
            StoreError::NotOwner {
                thread_id,
                requester,
            } => GatewayError::Forbidden {
                thread_id,
                requester,
            },
            other => GatewayError::Store(other),
        }
    }
}

/// Per-turn choices made by the caller.
#[derive(Debug, Clone)]
pub struct TurnOptions {
    /// Model selector; `None` means the configured default
    pub model: Option<String>,
    /// Offer tools to the model
    pub tools: bool,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            model: None,
            tools: true,
        }
    }
}

pub struct TurnGateway {
    orchestrator: Arc<TurnOrchestrator>,
    stream_capacity: usize,
}

impl TurnGateway {
    pub fn new(orchestrator: Arc<TurnOrchestrator>, stream_capacity: usize) -> Self {
        Self {
            orchestrator,
            stream_capacity,
        }
    }

    pub fn orchestrator(&self) -> &Arc<TurnOrchestrator> {
        &self.orchestrator
    }

    /// Start a turn for `identity` on `thread_ref`, or on a new thread.
    pub async fn start_turn(
        &self,
        identity: Identity,
        thread_ref: Option<ThreadId>,
        content: String,
        model: Option<String>,
    ) -> Result<TurnHandle, GatewayError> {
        let options = TurnOptions {
            model,
            ..TurnOptions::default()
        };
        self.start_turn_with(identity, thread_ref, content, options).await
    }

    /// [`start_turn`](Self::start_turn) with every per-turn option.
    pub async fn start_turn_with(
        &self,
        identity: Identity,
        thread_ref: Option<ThreadId>,
        content: String,
        options: TurnOptions,
    ) -> Result<TurnHandle, GatewayError> {
        if content.trim().is_empty() {
            return Err(GatewayError::EmptyContent);
        }

        let store = self.orchestrator.store();
        let thread = match thread_ref {
            Some(id) => {
                let thread = store.get_thread(&id).await?;
                if !thread.is_owned_by(&identity.subject) {
                    return Err(GatewayError::Forbidden {
                        thread_id: id.to_string(),
                        requester: identity.subject.clone(),
                    });
                }
                thread
            }
            None => {
                let thread = store.create_thread(&identity.subject).await?;
                self.orchestrator.events().publish(DomainEvent::ThreadCreated {
                    thread_id: thread.id.to_string(),
                    owner_id: thread.owner_id.clone(),
                    timestamp: Utc::now(),
                });
                thread
            }
        };

        let thread_id = thread.id.clone();
        info!(thread_id = %thread_id, identity = %identity, tools = options.tools, "Turn accepted");

        let request = TurnRequest {
            identity,
            thread,
            content,
            model: options.model,
            tool_budget: self.orchestrator.settings().tool_budget,
            use_tools: options.tools,
        };
        let (emitter, events) = emitter::channel(self.stream_capacity);
        let cancel = CancellationToken::new();
        let orchestrator = self.orchestrator.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { orchestrator.run_turn(request, emitter, token).await });

        Ok(TurnHandle {
            thread_id,
            events,
            cancel,
            task,
        })
    }
}

/// A running turn.
pub struct TurnHandle {
    thread_id: ThreadId,
    events: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
    task: JoinHandle<TurnOutcome>,
}

impl TurnHandle {
    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    /// Stop the turn. No further frames are produced.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The next event, or `None` once the turn has ended.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Encoded wire frames. Dropping the stream before `done` cancels the turn.
    pub fn into_frames(self) -> impl Stream<Item = Bytes> + Send + 'static {
        let token = self.cancel.clone();
        let guard = self.cancel.drop_guard();
        encoder::frames(self.events, self.thread_id.to_string(), token).map(move |frame| {
            let _ = &guard;
            frame
        })
    }

    /// Drain the turn into a single result.
    pub async fn collect(mut self) -> CollectedTurn {
        let mut turn = CollectedTurn {
            thread_id: self.thread_id.to_string(),
            text: String::new(),
            tools: Vec::new(),
            error: None,
        };

        while let Some(event) = self.events.recv().await {
            match event {
                StreamEvent::TextDelta { text } => turn.text.push_str(&text),
                StreamEvent::ToolStarted { .. } => {}
                StreamEvent::ToolFinished {
                    call_id,
                    name,
                    status,
                    error_kind,
                } => turn.tools.push(ToolSummary {
                    call_id,
                    name,
                    status,
                    error_kind,
                }),
                StreamEvent::Error { kind, message } => {
                    turn.error = Some(TurnError { kind, message })
                }
                StreamEvent::Done { .. } => break,
            }
        }

        if let Ok(TurnOutcome::Cancelled) = self.task.await {
            turn.error.get_or_insert(TurnError {
                kind: TurnErrorKind::Cancelled,
                message: "turn was cancelled".into(),
            });
        }
        turn
    }
}

/// A whole turn, collected for non-streaming callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedTurn {
    pub thread_id: String,
    pub text: String,
    pub tools: Vec<ToolSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TurnError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSummary {
    pub call_id: String,
    pub name: String,
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnError {
    pub kind: TurnErrorKind,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::FrameDecoder;
    use crate::orchestrator::TurnSettings;
    use std::time::Duration;
    use threadloom_core::event::EventBus;
    use threadloom_core::message::Role;
    use threadloom_core::store::ThreadStore;
    use threadloom_core::tool::ToolRegistry;
    use threadloom_providers::{ProviderRouter, ScriptStep, ScriptedProvider};
    use threadloom_store::InMemoryStore;

    fn gateway(scripts: Vec<Vec<ScriptStep>>) -> (TurnGateway, Arc<dyn ThreadStore>) {
        let store: Arc<dyn ThreadStore> = Arc::new(InMemoryStore::new());
        let mut router = ProviderRouter::new("scripted", "scripted-1");
        router.register("scripted", Arc::new(ScriptedProvider::new(scripts)));
        let orchestrator = TurnOrchestrator::new(
            Arc::new(router),
            Arc::new(ToolRegistry::new()),
            store.clone(),
            Arc::new(EventBus::default()),
            TurnSettings::default(),
        );
        (TurnGateway::new(Arc::new(orchestrator), 1), store)
    }

    #[tokio::test]
    async fn missing_thread_ref_creates_thread() {
        let (gateway, store) = gateway(vec![vec![ScriptStep::text("4")]]);
        let mut bus = gateway.orchestrator().events().subscribe();

        let handle = gateway
            .start_turn(Identity::new("alice"), None, "What is 2+2?".into(), None)
            .await
            .unwrap();
        let thread_id = handle.thread_id().clone();
        let turn = handle.collect().await;

        assert_eq!(turn.thread_id, thread_id.to_string());
        assert_eq!(turn.text, "4");
        assert!(turn.error.is_none());

        let thread = store.get_thread(&thread_id).await.unwrap();
        assert_eq!(thread.owner_id, "alice");
        assert_eq!(bus.recv().await.unwrap().event_type(), "thread_created");
    }

    #[tokio::test]
    async fn frames_end_with_done_for_the_thread() {
        let (gateway, _) = gateway(vec![vec![ScriptStep::text("Hi "), ScriptStep::text("there")]]);
        let handle = gateway
            .start_turn(Identity::local(), None, "hello".into(), None)
            .await
            .unwrap();
        let thread_id = handle.thread_id().to_string();

        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();
        let mut frames = Box::pin(handle.into_frames());
        while let Some(frame) = frames.next().await {
            events.extend(decoder.push(&frame).into_iter().map(Result::unwrap));
        }

        assert_eq!(
            events,
            vec![
                StreamEvent::text("Hi "),
                StreamEvent::text("there"),
                StreamEvent::Done { thread_id },
            ]
        );
    }

    #[tokio::test]
    async fn foreign_thread_is_forbidden() {
        let (gateway, store) = gateway(vec![]);
        let thread = store.create_thread("alice").await.unwrap();

        let err = gateway
            .start_turn(Identity::new("mallory"), Some(thread.id), "hi".into(), None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn unknown_thread_is_not_found() {
        let (gateway, _) = gateway(vec![]);
        let err = gateway
            .start_turn(Identity::local(), Some(ThreadId::from("nope")), "hi".into(), None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::ThreadNotFound(_)));
    }

    #[tokio::test]
    async fn blank_content_is_rejected() {
        let (gateway, store) = gateway(vec![]);
        let err = gateway
            .start_turn(Identity::local(), None, "   ".into(), None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::EmptyContent));
        assert!(store.list_threads("local").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropping_frames_cancels_turn() {
        let (gateway, store) = gateway(vec![vec![
            ScriptStep::text("Hel"),
            ScriptStep::text("lo"),
            ScriptStep::Stall,
        ]]);
        let mut bus = gateway.orchestrator().events().subscribe();
        let handle = gateway
            .start_turn(Identity::local(), None, "Say hello".into(), None)
            .await
            .unwrap();
        let thread_id = handle.thread_id().clone();

        let mut frames = Box::pin(handle.into_frames());
        frames.next().await.unwrap();
        frames.next().await.unwrap();
        drop(frames);

        let failed = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let event = bus.recv().await.unwrap();
                if let DomainEvent::TurnFailed { kind, .. } = event.as_ref() {
                    break kind.clone();
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(failed, "cancelled");

        let roles: Vec<Role> = store
            .list_messages(&thread_id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.message.role)
            .collect();
        assert_eq!(roles, vec![Role::User]);
    }

    #[tokio::test]
    async fn collect_reports_fatal_error() {
        let (gateway, _) = gateway(vec![vec![ScriptStep::Fail(
            threadloom_core::error::ProviderError::Network("refused".into()),
        )]]);
        let turn = gateway
            .start_turn(Identity::local(), None, "hi".into(), None)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(turn.error.map(|e| e.kind), Some(TurnErrorKind::ModelFailure));
    }
}
