//! # Interview Session Core
//!
//! Per-connection orchestration of a live interview. Each session runs two tokio
//! tasks joined by an unbounded FIFO queue:
//!
//! ```text
//! client frames ─► InboundHandler ─► Transcript ─► ResponseGenerator
//!                        │                              │
//!                        └──────► ResponseChannel ◄─────┘
//!                                       │
//!                                OutboundDelivery ─► ClientSink ─► client
//! ```
//!
//! ## Components:
//! - **transcript**: append-only turn list, single writer at a time
//! - **channel**: the response queue and the outbound event wire format
//! - **inbound**: frame interpretation, answer resolution, generator calls
//! - **outbound**: strict FIFO delivery to the connection
//! - **supervisor**: lifecycle, greeting, task join and teardown
//! - **registry**: active sessions and the concurrency limit
//! - **archive**: finished transcripts kept for scoring

pub mod archive;
pub mod channel;
pub mod inbound;
pub mod outbound;
pub mod registry;
pub mod supervisor;
pub mod transcript;

pub use archive::{InMemoryArchive, TranscriptArchive};
pub use channel::{response_channel, OutboundEvent, ResponseReceiver, ResponseSender};
pub use inbound::{InboundFrame, InboundHandler};
pub use outbound::{ClientSink, OutboundDelivery};
pub use registry::{RegistryError, SessionLease, SessionPhase, SessionRegistry};
pub use supervisor::{SessionHandle, SessionSummary, SessionSupervisor};
pub use transcript::{Role, Transcript, Turn};

use crate::config::AppConfig;
use crate::generator::ResponseGenerator;
use std::sync::Arc;
use std::time::Duration;

/// Errors scoped to a single session. None of them outlive the session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("session cancelled")]
    Cancelled,

    #[error("failed to serialize outbound event: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Collaborators and settings injected into every session.
#[derive(Clone)]
pub struct SessionContext {
    pub generator: Arc<dyn ResponseGenerator>,
    pub archive: Arc<dyn TranscriptArchive>,
    pub greeting: String,
    pub fallback_reply: String,
    pub generator_timeout: Duration,
}

impl SessionContext {
    pub fn from_config(
        config: &AppConfig,
        generator: Arc<dyn ResponseGenerator>,
        archive: Arc<dyn TranscriptArchive>,
    ) -> Self {
        Self {
            generator,
            archive,
            greeting: config.session.greeting.clone(),
            fallback_reply: config.session.fallback_reply.clone(),
            generator_timeout: config.generator.timeout(),
        }
    }
}
