//! Sealed event emitter.
//!
//! The orchestrator owns the only sending half of a turn's event channel.
//! The channel is bounded, so `emit` suspends until the consumer has taken
//! the previous event. That is the turn's backpressure point. Once `Done` has
//! been emitted the emitter is sealed and drops anything further.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::stream_event::StreamEvent;

/// The consumer dropped its receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stream consumer disconnected")]
pub struct Disconnected;

pub struct EventEmitter {
    tx: mpsc::Sender<StreamEvent>,
    sealed: bool,
}

/// Create an emitter and the receiver that feeds the encoder.
pub fn channel(capacity: usize) -> (EventEmitter, mpsc::Receiver<StreamEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        EventEmitter {
            tx,
            sealed: false,
        },
        rx,
    )
}

impl EventEmitter {
    pub async fn emit(&mut self, event: StreamEvent) -> Result<(), Disconnected> {
        if self.sealed {
            debug!(event = event.event_type(), "Dropping event emitted after done");
            return Ok(());
        }
        if event.is_done() {
            self.sealed = true;
        }
        self.tx.send(event).await.map_err(|_| Disconnected)
    }

    pub fn is_disconnected(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the consumer has gone away.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}
