//! # Inbound Handler
//!
//! Consumes frames from the client, one at a time, for the whole session.
//!
//! ## Client Protocol:
//! - `{"type": "submit_answer", "text": "..."}`: the candidate finished an answer.
//!   A non-empty `text` is used as-is; otherwise the buffered fragments are joined
//!   with single spaces. Either way the buffer is cleared.
//! - `{"type": "transcript", "text": "..."}` or any text that is not a JSON object:
//!   a partial answer fragment. It is buffered and echoed back.
//! - Anything else (unknown `type`, wrong field types, binary frames) is skipped.
//!
//! ## Ordering:
//! Submits are handled strictly in sequence. The next frame is not read until the
//! generator call for the current submit has finished (or timed out), so the
//! transcript always reads user turn, then the reply it triggered.

use super::channel::{OutboundEvent, ResponseSender};
use super::transcript::Transcript;
use super::SessionError;
use crate::generator::{GenerationRequest, GeneratorError, ResponseGenerator};
use crate::interview::SessionParams;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A frame received from the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    /// Binary payload; only its size is kept since audio is not decoded here
    Binary(usize),
}

/// Interpreted client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Submit { text: Option<String> },
    Fragment(String),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ControlEvent {
    #[serde(rename = "submit_answer")]
    SubmitAnswer {
        #[serde(default)]
        text: Option<String>,
    },
    #[serde(rename = "transcript")]
    Transcript { text: String },
}

/// Classify a text frame.
///
/// JSON objects must carry a known `type`; everything that is not a JSON object is
/// treated as opaque fragment text (a bare JSON string is unwrapped).
pub fn parse_client_message(raw: &str) -> Result<ClientMessage, String> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value @ serde_json::Value::Object(_)) => {
            match serde_json::from_value::<ControlEvent>(value) {
                Ok(ControlEvent::SubmitAnswer { text }) => Ok(ClientMessage::Submit { text }),
                Ok(ControlEvent::Transcript { text }) => Ok(ClientMessage::Fragment(text)),
                Err(err) => Err(format!("unrecognized control event: {}", err)),
            }
        }
        Ok(serde_json::Value::String(text)) => Ok(ClientMessage::Fragment(text)),
        _ => Ok(ClientMessage::Fragment(raw.to_string())),
    }
}

/// Fragments accumulated between submit boundaries.
#[derive(Debug, Default)]
pub struct PendingUtterance {
    fragments: Vec<String>,
}

impl PendingUtterance {
    pub fn push(&mut self, fragment: impl Into<String>) {
        self.fragments.push(fragment.into());
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Resolve the answer for a submit and clear the buffer in the same step.
    /// Direct text wins over the buffered fragments whenever it is non-empty.
    pub fn resolve_answer(&mut self, direct_text: Option<String>) -> String {
        let buffered = std::mem::take(&mut self.fragments).join(" ");
        match direct_text {
            Some(text) if !text.is_empty() => text,
            _ => buffered,
        }
    }
}

/// Counters reported back to the supervisor when the handler exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InboundStats {
    pub turns_completed: usize,
    pub generator_failures: usize,
    pub fragments_received: usize,
    pub malformed_messages: usize,
}

/// Why the inbound loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundExit {
    /// The client closed the connection
    Disconnected,
    /// The session was cancelled (connection closed or delivery failed)
    Cancelled,
    /// The outbound side is gone, nothing can reach the client anymore
    DeliveryClosed,
}

/// What the handler hands back to the supervisor.
#[derive(Debug)]
pub struct InboundOutcome {
    pub transcript: Transcript,
    pub stats: InboundStats,
    pub exit: InboundExit,
}

pub struct InboundHandler {
    params: SessionParams,
    transcript: Transcript,
    pending: PendingUtterance,
    generator: Arc<dyn ResponseGenerator>,
    responses: ResponseSender,
    fallback_reply: String,
    generator_timeout: Duration,
    cancel: CancellationToken,
    stats: InboundStats,
}

impl InboundHandler {
    pub fn new(
        params: SessionParams,
        transcript: Transcript,
        generator: Arc<dyn ResponseGenerator>,
        responses: ResponseSender,
        fallback_reply: String,
        generator_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            params,
            transcript,
            pending: PendingUtterance::default(),
            generator,
            responses,
            fallback_reply,
            generator_timeout,
            cancel,
            stats: InboundStats::default(),
        }
    }

    /// Process frames until the client disconnects or the session is cancelled.
    pub async fn run<S>(mut self, mut inbound: S) -> InboundOutcome
    where
        S: Stream<Item = InboundFrame> + Unpin,
    {
        let exit = loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break InboundExit::Cancelled,
                frame = inbound.next() => frame,
            };

            let Some(frame) = frame else {
                info!("Client disconnected");
                break InboundExit::Disconnected;
            };

            match self.handle_frame(frame).await {
                Ok(()) => {}
                Err(SessionError::Cancelled) => break InboundExit::Cancelled,
                Err(SessionError::ConnectionClosed) => {
                    debug!("Outbound delivery closed, stopping inbound handler");
                    break InboundExit::DeliveryClosed;
                }
                Err(err) => {
                    warn!(error = %err, "Failed to handle client message");
                }
            }
        };

        InboundOutcome {
            transcript: self.transcript,
            stats: self.stats,
            exit,
        }
    }

    async fn handle_frame(&mut self, frame: InboundFrame) -> Result<(), SessionError> {
        let raw = match frame {
            InboundFrame::Text(raw) => raw,
            InboundFrame::Binary(len) => {
                self.stats.malformed_messages += 1;
                warn!(bytes = len, "Ignoring binary frame");
                return Ok(());
            }
        };

        match parse_client_message(&raw) {
            Ok(ClientMessage::Submit { text }) => self.handle_submit(text).await,
            Ok(ClientMessage::Fragment(fragment)) => self.handle_fragment(fragment),
            Err(reason) => {
                self.stats.malformed_messages += 1;
                warn!(%reason, "Skipping malformed client message");
                Ok(())
            }
        }
    }

    fn handle_fragment(&mut self, fragment: String) -> Result<(), SessionError> {
        self.pending.push(fragment.clone());
        self.stats.fragments_received += 1;
        debug!(buffered = self.pending.len(), "Buffered answer fragment");

        self.responses.enqueue(OutboundEvent::partial(fragment))
    }

    async fn handle_submit(&mut self, direct_text: Option<String>) -> Result<(), SessionError> {
        let answer = self.pending.resolve_answer(direct_text);
        self.transcript.push_user(answer);
        let turn = self.transcript.user_turns();

        info!(turn, "Answer submitted, generating reply");

        let reply = self.generate_reply(turn).await?;
        self.transcript.push_assistant(reply.clone());
        self.stats.turns_completed += 1;

        self.responses.enqueue(OutboundEvent::reply(reply))
    }

    /// Call the generator with a timeout. Failures become the fallback reply;
    /// cancellation drops the call and its result.
    async fn generate_reply(&mut self, turn: usize) -> Result<String, SessionError> {
        let result = {
            let request = GenerationRequest {
                transcript: &self.transcript,
                category: self.params.category,
                difficulty: self.params.difficulty,
                topic: self.params.topic.as_deref(),
            };
            let call = tokio::time::timeout(self.generator_timeout, self.generator.generate(request));

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = call => Some(result),
            }
        };

        let result = match result {
            None => {
                debug!(turn, "Session cancelled during generation, discarding reply");
                return Err(SessionError::Cancelled);
            }
            Some(Ok(result)) => result,
            Some(Err(_elapsed)) => Err(GeneratorError::Timeout(self.generator_timeout)),
        };

        match result {
            Ok(reply) => Ok(reply),
            Err(err) => {
                self.stats.generator_failures += 1;
                warn!(turn, error = %err, "Response generation failed, using fallback reply");
                Ok(self.fallback_reply.clone())
            }
        }
    }
}
