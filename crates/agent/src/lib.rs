//! Turn orchestration for threadloom.
//!
//! A turn runs a **Call → Act → Observe** cycle:
//!
//! 1. **Receive** a user message through the [`TurnGateway`]
//! 2. **Call** the model with the thread's transcript and the tool list
//! 3. **If tool calls**: run them one at a time, append results, loop back to step 2
//! 4. **If text**: persist the answer and close the stream
//!
//! Everything the client sees flows through one ordered channel of
//! [`StreamEvent`]s, encoded into self-delimited frames by [`encoder`].

pub mod emitter;
pub mod encoder;
pub mod gateway;
pub mod model_adapter;
pub mod orchestrator;
pub mod stream_event;
pub mod thread_locks;
pub mod turn_context;

pub use emitter::{Disconnected, EventEmitter};
pub use encoder::FrameDecoder;
pub use gateway::{
    CollectedTurn, GatewayError, ToolSummary, TurnError, TurnGateway, TurnHandle, TurnOptions,
};
pub use model_adapter::{ModelEvent, ModelOutput, ModelStream};
pub use orchestrator::{TurnOrchestrator, TurnOutcome, TurnRequest, TurnSettings};
pub use stream_event::{StreamEvent, TurnErrorKind};
pub use thread_locks::ThreadLocks;
pub use turn_context::TurnContext;
