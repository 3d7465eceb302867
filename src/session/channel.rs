//! # Response Channel
//!
//! Unbounded FIFO queue between the producers of a session (the supervisor's
//! greeting and the inbound handler) and its single outbound delivery task.

use super::SessionError;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Event queued for delivery to the client.
///
/// ## Wire format:
/// ```json
/// {"type": "ai_response", "text": "Tell me about yourself."}
/// {"type": "transcript", "text": "I have five years"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundEvent {
    /// Interviewer utterance (greeting or generated reply)
    #[serde(rename = "ai_response")]
    Reply { text: String },

    /// Echo of a partial answer fragment so the client can show live progress
    #[serde(rename = "transcript")]
    PartialTranscript { text: String },
}

impl OutboundEvent {
    pub fn reply(text: impl Into<String>) -> Self {
        OutboundEvent::Reply { text: text.into() }
    }

    pub fn partial(text: impl Into<String>) -> Self {
        OutboundEvent::PartialTranscript { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            OutboundEvent::Reply { text } | OutboundEvent::PartialTranscript { text } => text,
        }
    }

    pub fn to_frame(&self) -> Result<String, SessionError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Create a fresh channel for one session.
pub fn response_channel() -> (ResponseSender, ResponseReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ResponseSender { tx }, ResponseReceiver { rx })
}

/// Producer half. Cloned once per producer; the channel closes when every clone is
/// dropped.
#[derive(Debug, Clone)]
pub struct ResponseSender {
    tx: mpsc::UnboundedSender<OutboundEvent>,
}

impl ResponseSender {
    /// Queue an event. Fails only once the delivery side has gone away, which
    /// means the connection is already closed.
    pub fn enqueue(&self, event: OutboundEvent) -> Result<(), SessionError> {
        self.tx
            .send(event)
            .map_err(|_| SessionError::ConnectionClosed)
    }
}

/// Consumer half, owned by the outbound delivery task.
#[derive(Debug)]
pub struct ResponseReceiver {
    rx: mpsc::UnboundedReceiver<OutboundEvent>,
}

impl ResponseReceiver {
    /// Wait for the next event. `None` once all senders are dropped and the queue
    /// is drained.
    pub async fn next(&mut self) -> Option<OutboundEvent> {
        self.rx.recv().await
    }

    /// Stop accepting new events. Already queued events can still be read.
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Number of events waiting to be delivered.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}
