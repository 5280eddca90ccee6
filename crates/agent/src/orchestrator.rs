//! The turn orchestrator: drives one conversational turn to completion.
//!
//! A turn follows a **Call → Act → Observe** cycle:
//!
//! 1. **Persist** the user message and load the thread's transcript
//! 2. **Call** the model with the transcript and the tool descriptions,
//!    relaying text fragments as they arrive
//! 3. **If tool calls**: run them one at a time, persist each result, and
//!    loop back to step 2
//! 4. **If a final answer**: persist it and emit `done`
//!
//! The loop is bounded by the turn's tool budget and optional deadline.
//! Every await is a cancellation point: when the client goes away the turn
//! stops issuing model and tool calls, and writes nothing further.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use threadloom_config::AppConfig;
use threadloom_core::error::{ProviderError, StoreError};
use threadloom_core::event::{DomainEvent, EventBus};
use threadloom_core::identity::Identity;
use threadloom_core::message::{Message, MessageToolCall};
use threadloom_core::provider::{Provider, ProviderRequest};
use threadloom_core::store::ThreadStore;
use threadloom_core::thread::{Thread, ThreadId};
use threadloom_core::tool::{ToolCallRequest, ToolRegistry};
use threadloom_providers::ProviderRouter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::emitter::EventEmitter;
use crate::model_adapter::{ModelEvent, ModelOutput, ModelStream};
use crate::stream_event::{StreamEvent, TurnErrorKind};
use crate::thread_locks::ThreadLocks;
use crate::turn_context::TurnContext;

/// Width of the argument summary in `tool_started` frames.
const ARGS_SUMMARY_CHARS: usize = 120;

/// Per-deployment turn settings.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Default tool budget for new turns
    pub tool_budget: u32,
    /// Bound on each tool invocation
    pub tool_timeout: Duration,
    /// Bound on the whole turn
    pub deadline: Option<Duration>,
}

impl TurnSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            system_prompt: config.turn.system_prompt.clone(),
            temperature: config.default_temperature,
            max_tokens: config.default_max_tokens,
            tool_budget: config.turn.tool_budget,
            tool_timeout: Duration::from_secs(config.tools.timeout_secs),
            deadline: config.turn.deadline_secs.map(Duration::from_secs),
        }
    }
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// One inbound turn, with identity and thread already resolved.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub identity: Identity,
    pub thread: Thread,
    pub content: String,
    /// Model selector; `None` means the configured default
    pub model: Option<String>,
    pub tool_budget: u32,
    /// Offer the tool registry to the model; off means a plain chat turn
    pub use_tools: bool,
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed { text: String, tool_calls: u32 },
    Failed { kind: TurnErrorKind, message: String },
    /// The listener went away; no terminal frame was sent
    Cancelled,
}

/// Drives turns against a model, the tool registry, and the thread store.
pub struct TurnOrchestrator {
    providers: Arc<ProviderRouter>,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn ThreadStore>,
    events: Arc<EventBus>,
    locks: ThreadLocks,
    settings: TurnSettings,
}

impl TurnOrchestrator {
    pub fn new(
        providers: Arc<ProviderRouter>,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn ThreadStore>,
        events: Arc<EventBus>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            providers,
            tools,
            store,
            events,
            locks: ThreadLocks::new(),
            settings,
        }
    }

    pub fn providers(&self) -> &Arc<ProviderRouter> {
        &self.providers
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn store(&self) -> &Arc<dyn ThreadStore> {
        &self.store
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.settings
    }

    /// Run one turn, emitting its events into `emitter`.
    ///
    /// Always ends with exactly one `done` event unless the turn was
    /// cancelled, in which case nothing further is emitted.
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        emitter: EventEmitter,
        cancel: CancellationToken,
    ) -> TurnOutcome {
        let thread_id = request.thread.id.clone();
        let started = Instant::now();
        let mut run = TurnRun {
            orch: self,
            emitter,
            cancel,
            deadline: self
                .settings
                .deadline
                .map(|d| tokio::time::Instant::now() + d),
            thread_id: thread_id.clone(),
        };

        info!(
            thread_id = %thread_id,
            identity = %request.identity,
            budget = request.tool_budget,
            "Starting turn"
        );

        match run.drive(request).await {
            Ok((text, tool_calls)) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                run.terminal(StreamEvent::Done {
                    thread_id: thread_id.to_string(),
                })
                .await;
                self.events.publish(DomainEvent::TurnCompleted {
                    thread_id: thread_id.to_string(),
                    tool_calls,
                    duration_ms,
                    timestamp: Utc::now(),
                });
                info!(thread_id = %thread_id, tool_calls, duration_ms, "Turn completed");
                TurnOutcome::Completed { text, tool_calls }
            }
            Err(Halt::Fatal(kind, message)) => run.fail(kind, message).await,
            Err(Halt::Interrupted(Interrupt::Deadline)) => {
                let secs = self.settings.deadline.map(|d| d.as_secs_f64()).unwrap_or_default();
                run.fail(
                    TurnErrorKind::Timeout,
                    format!("turn exceeded its deadline of {secs}s"),
                )
                .await
            }
            Err(Halt::Interrupted(reason)) => {
                info!(thread_id = %thread_id, ?reason, "Turn cancelled");
                self.events.publish(DomainEvent::TurnFailed {
                    thread_id: thread_id.to_string(),
                    kind: TurnErrorKind::Cancelled.as_str().into(),
                    message: format!("{reason:?}"),
                    timestamp: Utc::now(),
                });
                TurnOutcome::Cancelled
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Cancelled,
    Disconnected,
    Deadline,
}

enum Halt {
    Fatal(TurnErrorKind, String),
    Interrupted(Interrupt),
}

impl From<Interrupt> for Halt {
    fn from(interrupt: Interrupt) -> Self {
        Halt::Interrupted(interrupt)
    }
}

fn model_halt(e: ProviderError) -> Halt {
    Halt::Fatal(TurnErrorKind::ModelFailure, e.to_string())
}

fn store_halt(e: StoreError) -> Halt {
    match e {
        StoreError::ThreadDisabled(_) => Halt::Fatal(TurnErrorKind::ThreadDisabled, e.to_string()),
        other => Halt::Fatal(TurnErrorKind::StoreWriteFailure, other.to_string()),
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// State of one running turn.
struct TurnRun<'a> {
    orch: &'a TurnOrchestrator,
    emitter: EventEmitter,
    cancel: CancellationToken,
    deadline: Option<tokio::time::Instant>,
    thread_id: ThreadId,
}

impl TurnRun<'_> {
    async fn drive(&mut self, request: TurnRequest) -> Result<(String, u32), Halt> {
        let orch = self.orch;
        let _lock = self.wait(orch.locks.acquire(&self.thread_id)).await?;

        // The thread may have been disabled while this turn was queued
        let thread = orch
            .store
            .get_thread(&self.thread_id)
            .await
            .map_err(store_halt)?;
        if thread.disabled {
            return Err(Halt::Fatal(
                TurnErrorKind::ThreadDisabled,
                format!("thread {} is disabled", thread.id),
            ));
        }

        let Some((provider, model)) = orch.providers.resolve(request.model.as_deref()) else {
            return Err(Halt::Fatal(
                TurnErrorKind::ModelFailure,
                "no model provider configured".into(),
            ));
        };

        let history = orch
            .store
            .list_messages(&self.thread_id)
            .await
            .map_err(store_halt)?;
        let mut ctx = TurnContext::new(&orch.settings.system_prompt, history, request.tool_budget);

        orch.events.publish(DomainEvent::TurnStarted {
            thread_id: self.thread_id.to_string(),
            model: format!("{}/{model}", provider.name()),
            timestamp: Utc::now(),
        });

        let outcome = self.converse(&mut ctx, &*provider, model, request).await;
        if let Err(halt) = &outcome {
            // Still under the thread lock, so the next turn sees every call answered
            self.close_open_calls(&ctx, halt).await;
        }
        outcome
    }

    async fn converse(
        &mut self,
        ctx: &mut TurnContext,
        provider: &dyn Provider,
        model: String,
        request: TurnRequest,
    ) -> Result<(String, u32), Halt> {
        let orch = self.orch;
        self.append(ctx, Message::user(request.content)).await?;

        let tools = if request.use_tools {
            orch.tools.list_tools()
        } else {
            Vec::new()
        };
        loop {
            if !ctx.has_budget() {
                warn!(thread_id = %self.thread_id, budget = request.tool_budget, "Tool budget exhausted");
                return Err(Halt::Fatal(
                    TurnErrorKind::BudgetExhausted,
                    format!(
                        "tool budget of {} exhausted before a final answer",
                        request.tool_budget
                    ),
                ));
            }
            self.check()?;

            let provider_request = ProviderRequest {
                model: model.clone(),
                messages: ctx.transcript().to_vec(),
                temperature: orch.settings.temperature,
                max_tokens: orch.settings.max_tokens,
                tools: tools.clone(),
                stream: true,
            };
            debug!(
                thread_id = %self.thread_id,
                messages = provider_request.messages.len(),
                tools = provider_request.tools.len(),
                budget = ctx.budget_remaining(),
                "Calling model"
            );

            let rx = self
                .wait(provider.stream(provider_request))
                .await?
                .map_err(model_halt)?;
            let mut stream = ModelStream::new(rx);

            let output = loop {
                let event = self.wait(stream.next()).await?.map_err(model_halt)?;
                match event {
                    Some(ModelEvent::Delta(text)) => self.emit(StreamEvent::text(text)).await?,
                    Some(ModelEvent::Finished(output)) => break output,
                    None => {
                        return Err(Halt::Fatal(
                            TurnErrorKind::ModelFailure,
                            "model response ended without a result".into(),
                        ));
                    }
                }
            };

            match output {
                ModelOutput::FinalAnswer { text } => {
                    // Never record an answer the listener did not see through
                    self.check()?;
                    self.append(ctx, Message::assistant(text.clone())).await?;
                    return Ok((text, ctx.tool_calls_made()));
                }
                ModelOutput::ToolCalls { text, mut calls } => {
                    ctx.consume_budget();
                    for call in &mut calls {
                        ctx.claim_call_id(call);
                    }
                    let wire = calls
                        .iter()
                        .map(|c| MessageToolCall {
                            id: c.id.clone(),
                            name: c.name.clone(),
                            arguments: c.arguments.to_string(),
                        })
                        .collect();
                    self.append(ctx, Message::assistant_tool_calls(text, wire))
                        .await?;

                    for call in &calls {
                        self.check()?;
                        self.run_tool(ctx, call).await?;
                    }
                }
            }
        }
    }

    /// Answer every call the halted turn left open with an error result.
    ///
    /// Skipped once the listener is gone: nothing is written after
    /// cancellation, and the next turn drops the open calls from its
    /// transcript instead.
    async fn close_open_calls(&self, ctx: &TurnContext, halt: &Halt) {
        let kind = match halt {
            Halt::Fatal(kind, _) => *kind,
            Halt::Interrupted(Interrupt::Deadline) => TurnErrorKind::Timeout,
            Halt::Interrupted(_) => return,
        };
        for call in ctx.open_calls() {
            let message = Message::tool_result(
                &call.id,
                &call.name,
                format!("Error ({kind}): turn ended before the tool finished"),
            );
            if let Err(e) = self.orch.store.append_message(&self.thread_id, message).await {
                warn!(thread_id = %self.thread_id, call_id = %call.id, error = %e, "Cannot close open tool call");
                return;
            }
            debug!(thread_id = %self.thread_id, call_id = %call.id, "Closed open tool call");
        }
    }

    async fn run_tool(&mut self, ctx: &mut TurnContext, call: &ToolCallRequest) -> Result<(), Halt> {
        self.emit(StreamEvent::ToolStarted {
            call_id: call.id.clone(),
            name: call.name.clone(),
            args: call.args_summary(ARGS_SUMMARY_CHARS),
        })
        .await?;

        let started = Instant::now();
        let result = self
            .wait(self.orch.tools.invoke(call, self.orch.settings.tool_timeout))
            .await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        self.orch.events.publish(DomainEvent::ToolExecuted {
            thread_id: self.thread_id.to_string(),
            tool_name: call.name.clone(),
            success: result.is_success(),
            duration_ms,
            timestamp: Utc::now(),
        });

        let content = match result.error_kind {
            Some(kind) => format!("Error ({kind}): {}", result.payload),
            None => result.payload.clone(),
        };
        self.append(ctx, Message::tool_result(&call.id, &call.name, content))
            .await?;

        self.emit(StreamEvent::ToolFinished {
            call_id: call.id.clone(),
            name: call.name.clone(),
            status: result.status,
            error_kind: result.error_kind,
        })
        .await
    }

    /// Durably record one step, then add it to the transcript.
    async fn append(&self, ctx: &mut TurnContext, message: Message) -> Result<(), Halt> {
        let stored = self
            .orch
            .store
            .append_message(&self.thread_id, message.clone())
            .await
            .map_err(|e| {
                warn!(thread_id = %self.thread_id, error = %e, "Store append failed");
                store_halt(e)
            })?;
        debug!(
            thread_id = %self.thread_id,
            ordinal = stored.ordinal,
            role = %stored.message.role,
            "Message appended"
        );
        ctx.push(message);
        Ok(())
    }

    /// Await `fut` unless the turn is cancelled or out of time first.
    async fn wait<F: Future>(&self, fut: F) -> Result<F::Output, Interrupt> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            _ = self.emitter.closed() => Err(Interrupt::Disconnected),
            _ = sleep_until(self.deadline) => Err(Interrupt::Deadline),
            out = fut => Ok(out),
        }
    }

    fn check(&self) -> Result<(), Interrupt> {
        if self.cancel.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        if self.emitter.is_disconnected() {
            return Err(Interrupt::Disconnected);
        }
        if self
            .deadline
            .is_some_and(|d| tokio::time::Instant::now() >= d)
        {
            return Err(Interrupt::Deadline);
        }
        Ok(())
    }

    /// Emit a mid-turn event, suspending until the consumer is ready.
    async fn emit(&mut self, event: StreamEvent) -> Result<(), Halt> {
        let deadline = self.deadline;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled.into()),
            _ = sleep_until(deadline) => Err(Interrupt::Deadline.into()),
            sent = self.emitter.emit(event) => sent.map_err(|_| Interrupt::Disconnected.into()),
        }
    }

    /// Emit a closing event; only cancellation can stop it.
    async fn terminal(&mut self, event: StreamEvent) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.emitter.emit(event) => sent.is_ok(),
        }
    }

    async fn fail(&mut self, kind: TurnErrorKind, message: String) -> TurnOutcome {
        warn!(thread_id = %self.thread_id, %kind, %message, "Turn failed");
        if self.terminal(StreamEvent::error(kind, message.clone())).await {
            self.terminal(StreamEvent::Done {
                thread_id: self.thread_id.to_string(),
            })
            .await;
        }
        self.orch.events.publish(DomainEvent::TurnFailed {
            thread_id: self.thread_id.to_string(),
            kind: kind.as_str().into(),
            message: message.clone(),
            timestamp: Utc::now(),
        });
        TurnOutcome::Failed { kind, message }
    }
}
