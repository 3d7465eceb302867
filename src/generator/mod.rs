//! # Response Generator
//!
//! Boundary to the language model that writes the interviewer's next utterance.
//! The session core only sees the [`ResponseGenerator`] trait; the production
//! implementation is [`ChatCompletionsGenerator`], and tests plug in fakes.
//!
//! ## Failure contract:
//! Every failure is a [`GeneratorError`]. The inbound handler never lets one escape:
//! it substitutes the configured fallback reply and keeps the session going.

pub mod chat;
pub mod prompt;

pub use chat::ChatCompletionsGenerator;

use crate::interview::{Difficulty, InterviewCategory};
use crate::session::transcript::Transcript;
use async_trait::async_trait;
use std::time::Duration;

/// Everything the generator needs for one reply.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    /// Full ordered transcript, ending with the user turn being answered
    pub transcript: &'a Transcript,
    pub category: InterviewCategory,
    pub difficulty: Difficulty,
    pub topic: Option<&'a str>,
}

#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("request to language model failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("language model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("language model returned an empty completion")]
    EmptyCompletion,

    #[error("language model did not answer within {0:?}")]
    Timeout(Duration),

    #[error("no API key configured for the language model")]
    MissingApiKey,
}

/// Produces the next interviewer utterance from the conversation so far.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GeneratorError>;
}

#[cfg(test)]
pub(crate) mod fakes {
    //! Generators used by session tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replies with `"reply to: <last user turn>"` and records every transcript
    /// length it was called with.
    #[derive(Default)]
    pub struct EchoGenerator {
        pub seen_lengths: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl ResponseGenerator for EchoGenerator {
        async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GeneratorError> {
            self.seen_lengths
                .lock()
                .unwrap()
                .push(request.transcript.len());
            let last = request
                .transcript
                .last()
                .map(|t| t.content.clone())
                .unwrap_or_default();
            Ok(format!("reply to: {}", last))
        }
    }

    /// Always fails.
    #[derive(Default)]
    pub struct FailingGenerator {
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl ResponseGenerator for FailingGenerator {
        async fn generate(&self, _request: GenerationRequest<'_>) -> Result<String, GeneratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(GeneratorError::EmptyCompletion)
        }
    }

    /// Never answers. Signals `started` when a call begins.
    pub struct HangingGenerator {
        pub started: tokio::sync::Notify,
    }

    impl HangingGenerator {
        pub fn new() -> Self {
            Self {
                started: tokio::sync::Notify::new(),
            }
        }
    }

    #[async_trait]
    impl ResponseGenerator for HangingGenerator {
        async fn generate(&self, _request: GenerationRequest<'_>) -> Result<String, GeneratorError> {
            self.started.notify_one();
            std::future::pending::<Result<String, GeneratorError>>().await
        }
    }
}
