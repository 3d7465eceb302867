//! # Outbound Delivery
//!
//! Drains the response channel into the client connection in strict FIFO order,
//! one event per frame, no batching. A failed write ends delivery for good: the
//! connection cannot come back without a new handshake.

use super::channel::ResponseReceiver;
use super::SessionError;
use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Write half of a client connection.
#[async_trait]
pub trait ClientSink: Send + 'static {
    /// Write one serialized frame. An error means the connection is gone.
    async fn send_text(&mut self, frame: String) -> Result<(), SessionError>;
}

/// Why delivery stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundExit {
    /// Every producer finished and the queue was emptied
    Drained,
    /// The connection rejected a write
    WriteFailed,
    /// The session was cancelled; queued events were discarded
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundOutcome {
    pub delivered: usize,
    pub discarded: usize,
    pub exit: OutboundExit,
}

pub struct OutboundDelivery {
    responses: ResponseReceiver,
    cancel: CancellationToken,
}

impl OutboundDelivery {
    pub fn new(responses: ResponseReceiver, cancel: CancellationToken) -> Self {
        Self { responses, cancel }
    }

    pub async fn run<K: ClientSink>(mut self, mut sink: K) -> OutboundOutcome {
        let mut delivered = 0;

        let exit = loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break OutboundExit::Cancelled,
                event = self.responses.next() => event,
            };

            let Some(event) = event else {
                break OutboundExit::Drained;
            };

            let frame = match event.to_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    error!(error = %err, "Dropping event that failed to serialize");
                    continue;
                }
            };

            let written = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break OutboundExit::Cancelled,
                written = sink.send_text(frame) => written,
            };

            if let Err(err) = written {
                warn!(error = %err, "Write to client failed, stopping delivery");
                break OutboundExit::WriteFailed;
            }
            delivered += 1;
        };

        // Producers see the closed channel on their next enqueue.
        self.responses.close();
        let discarded = self.responses.pending();
        if discarded > 0 {
            debug!(discarded, "Discarding events queued for a closed connection");
        }

        OutboundOutcome {
            delivered,
            discarded,
            exit,
        }
    }
}
