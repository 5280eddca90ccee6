//! Streaming encoder: one self-delimited wire frame per [`StreamEvent`].
//!
//! Frames use the server-sent-events text format:
//!
//! ```text
//! event: text_delta
//! data: {"type":"text_delta","text":"Hel"}
//!
//! ```
//!
//! The JSON payload is always a single line, so the blank line is an
//! unambiguous delimiter and a partial read never splits one event across
//! two frames. Frames are produced strictly in receive order with no
//! coalescing, and `done` is always the last frame.

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::stream_event::{StreamEvent, TurnErrorKind};

/// Encode a single event as one frame.
pub fn encode(event: &StreamEvent) -> Bytes {
    // Infallible for these types
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".into());
    Bytes::from(format!("event: {}\ndata: {data}\n\n", event.event_type()))
}

/// Frames for the events on `rx`, ending with exactly one `done`.
///
/// If the producer goes away without emitting `done`, the stream is closed
/// with a synthesized `error` + `done` pair so the client always sees a
/// terminal frame. The error is `cancelled` when `cancel` fired and
/// `model_failure` otherwise.
pub fn frames(
    rx: mpsc::Receiver<StreamEvent>,
    thread_id: String,
    cancel: CancellationToken,
) -> impl Stream<Item = Bytes> {
    struct State {
        rx: mpsc::Receiver<StreamEvent>,
        thread_id: String,
        cancel: CancellationToken,
        tail: Vec<StreamEvent>,
        finished: bool,
    }

    let state = State {
        rx,
        thread_id,
        cancel,
        tail: Vec::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        if let Some(event) = st.tail.pop() {
            return Some((encode(&event), st));
        }
        if st.finished {
            return None;
        }

        match st.rx.recv().await {
            Some(event) => {
                if event.is_done() {
                    st.finished = true;
                    st.rx.close();
                }
                Some((encode(&event), st))
            }
            None => {
                let error = if st.cancel.is_cancelled() {
                    StreamEvent::error(TurnErrorKind::Cancelled, "turn was cancelled")
                } else {
                    StreamEvent::error(TurnErrorKind::ModelFailure, "turn ended unexpectedly")
                };
                warn!(thread_id = %st.thread_id, "Turn ended without a terminal event");
                st.finished = true;
                // Popped from the back
                st.tail = vec![
                    StreamEvent::Done {
                        thread_id: st.thread_id.clone(),
                    },
                    error,
                ];
                st.tail.pop().map(|event| (encode(&event), st))
            }
        }
    })
}

/// Incremental frame decoder for clients of the wire format.
///
/// Feed it bytes as they arrive; it yields every complete frame and keeps
/// any trailing partial frame for the next call.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
    pending_bytes: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<StreamEvent, serde_json::Error>> {
        self.pending_bytes.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending_bytes) {
            Ok(s) => s.len(),
            Err(e) => e.valid_up_to(),
        };
        let rest = self.pending_bytes.split_off(valid);
        self.buffer
            .push_str(&String::from_utf8_lossy(&self.pending_bytes));
        self.pending_bytes = rest;

        let mut events = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..end + 2).collect();
            let data: String = frame
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(str::trim_start)
                .collect::<Vec<_>>()
                .join("\n");
            if data.is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&data));
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use threadloom_core::tool::ToolStatus;

    fn done() -> StreamEvent {
        StreamEvent::Done {
            thread_id: "t-1".into(),
        }
    }

    #[test]
    fn frame_layout() {
        let frame = encode(&StreamEvent::text("line one\nline two"));
        assert_eq!(
            std::str::from_utf8(&frame).unwrap(),
            "event: text_delta\ndata: {\"type\":\"text_delta\",\"text\":\"line one\\nline two\"}\n\n"
        );
    }

    #[tokio::test]
    async fn frames_preserve_order_and_stop_at_done() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(StreamEvent::text("a")).await.unwrap();
        tx.send(StreamEvent::text("b")).await.unwrap();
        tx.send(done()).await.unwrap();

        let frames: Vec<Bytes> = frames(rx, "t-1".into(), CancellationToken::new()).collect().await;
        assert_eq!(
            frames,
            vec![encode(&StreamEvent::text("a")), encode(&StreamEvent::text("b")), encode(&done())]
        );
        // The receiver is closed after done
        assert!(tx.send(StreamEvent::text("late")).await.is_err());
    }

    #[tokio::test]
    async fn missing_done_is_synthesized() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(StreamEvent::text("partial")).await.unwrap();
        drop(tx);

        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();
        let mut stream = Box::pin(frames(rx, "t-1".into(), CancellationToken::new()));
        while let Some(frame) = stream.next().await {
            events.extend(decoder.push(&frame).into_iter().map(Result::unwrap));
        }

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], StreamEvent::text("partial"));
        assert!(matches!(
            events[1],
            StreamEvent::Error {
                kind: TurnErrorKind::ModelFailure,
                ..
            }
        ));
        assert_eq!(events[2], done());
    }

    #[tokio::test]
    async fn cancelled_producer_is_reported_as_cancelled() {
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        tx.send(StreamEvent::text("partial")).await.unwrap();
        cancel.cancel();
        drop(tx);

        let mut decoder = FrameDecoder::new();
        let mut events = Vec::new();
        let mut stream = Box::pin(frames(rx, "t-1".into(), cancel));
        while let Some(frame) = stream.next().await {
            events.extend(decoder.push(&frame).into_iter().map(Result::unwrap));
        }

        assert_eq!(kinds_of(&events), vec!["text_delta", "error", "done"]);
        assert!(matches!(
            events[1],
            StreamEvent::Error {
                kind: TurnErrorKind::Cancelled,
                ..
            }
        ));
    }

    fn kinds_of(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(StreamEvent::event_type).collect()
    }

    #[test]
    fn decoder_handles_split_frames() {
        let mut wire = Vec::new();
        let sent = vec![
            StreamEvent::text("héllo"),
            StreamEvent::ToolFinished {
                call_id: "call_1".into(),
                name: "web_search".into(),
                status: ToolStatus::Success,
                error_kind: None,
            },
            done(),
        ];
        for event in &sent {
            wire.extend_from_slice(&encode(event));
        }

        // Feed three bytes at a time, splitting inside the multi-byte 'é'
        let mut decoder = FrameDecoder::new();
        let mut received = Vec::new();
        for piece in wire.chunks(3) {
            received.extend(decoder.push(piece).into_iter().map(Result::unwrap));
        }
        assert_eq!(received, sent);
    }
}
