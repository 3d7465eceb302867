//! # Session Supervisor
//!
//! Owns one interview session from the first frame to teardown.
//!
//! ## Lifecycle:
//! 1. **Greeting**: the greeting is appended to a fresh transcript and queued as the
//!    first outbound event, before any client frame is read
//! 2. **Active**: the inbound handler and outbound delivery run as two tokio tasks
//! 3. **Closing**: one task finished; if it was delivery, the session is cancelled
//!    so the inbound side stops too, then both are joined
//! 4. **Archived**: the final transcript goes to the archive and the registry slot
//!    is released
//!
//! ## Cancellation:
//! The connection boundary holds a [`SessionHandle`]. Closing it wakes both tasks
//! even while a generator call is in flight; that call is dropped and its result
//! never reaches the transcript.

use super::channel::{response_channel, OutboundEvent};
use super::inbound::{InboundExit, InboundFrame, InboundHandler, InboundStats};
use super::outbound::{ClientSink, OutboundDelivery, OutboundExit};
use super::registry::{SessionLease, SessionPhase};
use super::transcript::Transcript;
use super::SessionContext;
use crate::interview::SessionParams;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use serde::Serialize;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

/// Lets the connection boundary end a session from outside.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Signal that the connection is gone.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Everything known about a session once it has ended.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub params: SessionParams,
    pub transcript: Transcript,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub stats: InboundStats,
    pub events_delivered: usize,
    /// `None` when the task panicked
    pub inbound_exit: Option<InboundExit>,
    pub outbound_exit: Option<OutboundExit>,
}

impl SessionSummary {
    pub fn duration_seconds(&self) -> f64 {
        let duration = self.ended_at.signed_duration_since(self.started_at);
        duration.num_milliseconds() as f64 / 1000.0
    }
}

pub struct SessionSupervisor {
    params: SessionParams,
    ctx: SessionContext,
    lease: SessionLease,
    cancel: CancellationToken,
}

enum FirstToFinish<I, O> {
    Inbound(I),
    Outbound(O),
}

impl SessionSupervisor {
    pub fn new(params: SessionParams, ctx: SessionContext, lease: SessionLease) -> (Self, SessionHandle) {
        let cancel = CancellationToken::new();
        let handle = SessionHandle {
            cancel: cancel.clone(),
        };
        let supervisor = Self {
            params,
            ctx,
            lease,
            cancel,
        };
        (supervisor, handle)
    }

    /// Run the session until both tasks have finished.
    pub async fn run<S, K>(self, inbound: S, sink: K) -> SessionSummary
    where
        S: Stream<Item = InboundFrame> + Unpin + Send + 'static,
        K: ClientSink,
    {
        let span = info_span!(
            "session",
            session_id = %self.params.session_id,
            category = %self.params.category,
            difficulty = %self.params.difficulty,
        );
        self.supervise(inbound, sink).instrument(span).await
    }

    async fn supervise<S, K>(self, inbound: S, sink: K) -> SessionSummary
    where
        S: Stream<Item = InboundFrame> + Unpin + Send + 'static,
        K: ClientSink,
    {
        let Self {
            params,
            ctx,
            lease,
            cancel,
        } = self;
        let started_at = Utc::now();

        lease.set_phase(SessionPhase::Greeting);
        let (responses, receiver) = response_channel();
        let mut transcript = Transcript::new();
        transcript.push_assistant(ctx.greeting.clone());
        if let Err(err) = responses.enqueue(OutboundEvent::reply(ctx.greeting.clone())) {
            warn!(error = %err, "Could not queue greeting");
        }

        // The handler takes the only sender, so delivery drains and stops once the
        // handler exits.
        let handler = InboundHandler::new(
            params.clone(),
            transcript,
            ctx.generator.clone(),
            responses,
            ctx.fallback_reply.clone(),
            ctx.generator_timeout,
            cancel.clone(),
        );
        let delivery = OutboundDelivery::new(receiver, cancel.clone());

        lease.set_phase(SessionPhase::Active);
        info!("Session started");

        let span = tracing::Span::current();
        let mut inbound_task = tokio::spawn(handler.run(inbound).instrument(span.clone()));
        let mut outbound_task = tokio::spawn(delivery.run(sink).instrument(span));

        let first = tokio::select! {
            result = &mut inbound_task => FirstToFinish::Inbound(result),
            result = &mut outbound_task => FirstToFinish::Outbound(result),
        };
        lease.set_phase(SessionPhase::Closing);

        let (inbound_result, outbound_result) = match first {
            FirstToFinish::Inbound(result) => (result, outbound_task.await),
            FirstToFinish::Outbound(result) => {
                cancel.cancel();
                (inbound_task.await, result)
            }
        };
        cancel.cancel();

        let (transcript, stats, inbound_exit) = match inbound_result {
            Ok(outcome) => (outcome.transcript, outcome.stats, Some(outcome.exit)),
            Err(err) => {
                log_join_error("inbound", &err);
                (Transcript::new(), InboundStats::default(), None)
            }
        };
        let (events_delivered, outbound_exit) = match outbound_result {
            Ok(outcome) => (outcome.delivered, Some(outcome.exit)),
            Err(err) => {
                log_join_error("outbound", &err);
                (0, None)
            }
        };

        let summary = SessionSummary {
            params,
            transcript,
            started_at,
            ended_at: Utc::now(),
            stats,
            events_delivered,
            inbound_exit,
            outbound_exit,
        };

        info!(
            turns = summary.stats.turns_completed,
            generator_failures = summary.stats.generator_failures,
            events_delivered = summary.events_delivered,
            duration_seconds = summary.duration_seconds(),
            inbound_exit = ?summary.inbound_exit,
            outbound_exit = ?summary.outbound_exit,
            "Session ended"
        );

        ctx.archive.store(summary.clone()).await;
        drop(lease);

        summary
    }
}

fn log_join_error(task: &str, err: &JoinError) {
    if err.is_panic() {
        error!(task, "Session task panicked");
    } else {
        error!(task, error = %err, "Session task failed");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::generator::fakes::{EchoGenerator, FailingGenerator, HangingGenerator};
    use crate::generator::ResponseGenerator;
    use crate::session::archive::{InMemoryArchive, TranscriptArchive};
    use crate::session::outbound::fakes::ChannelSink;
    use crate::session::registry::SessionRegistry;
    use crate::session::transcript::{Role, Turn};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    const GREETING: &str = "Hello! Tell me about yourself.";

    pub(crate) fn summary_for(session_id: &str) -> SessionSummary {
        SessionSummary {
            params: SessionParams::from_query(session_id, None, None, None).unwrap(),
            transcript: Transcript::new(),
            started_at: Utc::now(),
            ended_at: Utc::now(),
            stats: InboundStats::default(),
            events_delivered: 0,
            inbound_exit: Some(InboundExit::Disconnected),
            outbound_exit: Some(OutboundExit::Drained),
        }
    }

    struct Harness {
        frames: mpsc::UnboundedSender<InboundFrame>,
        output: mpsc::UnboundedReceiver<String>,
        handle: SessionHandle,
        registry: SessionRegistry,
        archive: Arc<InMemoryArchive>,
        task: JoinHandle<SessionSummary>,
    }

    impl Harness {
        fn start(generator: Arc<dyn ResponseGenerator>) -> Self {
            let registry = SessionRegistry::new(4);
            let archive = Arc::new(InMemoryArchive::new(4));
            let ctx = SessionContext {
                generator,
                archive: archive.clone(),
                greeting: GREETING.to_string(),
                fallback_reply: "fallback".to_string(),
                generator_timeout: Duration::from_secs(5),
            };
            let params = SessionParams::from_query("s1", Some("hr"), Some("easy"), None).unwrap();
            let lease = registry.register(&params).unwrap();
            let (supervisor, handle) = SessionSupervisor::new(params, ctx, lease);

            let (frames, frames_rx) = mpsc::unbounded_channel();
            let (output_tx, output) = mpsc::unbounded_channel();
            let task = tokio::spawn(
                supervisor.run(UnboundedReceiverStream::new(frames_rx), ChannelSink(output_tx)),
            );

            Self {
                frames,
                output,
                handle,
                registry,
                archive,
                task,
            }
        }

        fn submit(&self, text: &str) {
            let frame = serde_json::json!({ "type": "submit_answer", "text": text }).to_string();
            self.frames.send(InboundFrame::Text(frame)).unwrap();
        }

        async fn next_event(&mut self) -> OutboundEvent {
            let frame = tokio::time::timeout(Duration::from_secs(1), self.output.recv())
                .await
                .expect("timed out waiting for outbound frame")
                .expect("output closed");
            serde_json::from_str(&frame).unwrap()
        }

        /// Disconnect the client and wait for the session to finish.
        async fn disconnect(self) -> (SessionSummary, Vec<String>) {
            let Harness {
                frames,
                mut output,
                task,
                ..
            } = self;
            drop(frames);
            let summary = tokio::time::timeout(Duration::from_secs(1), task)
                .await
                .expect("session did not terminate")
                .unwrap();
            let mut rest = Vec::new();
            while let Some(frame) = output.recv().await {
                rest.push(frame);
            }
            (summary, rest)
        }
    }

    #[tokio::test]
    async fn test_single_submit_scenario() {
        let mut harness = Harness::start(Arc::new(EchoGenerator::default()));
        harness.submit("Tell me about yourself");

        assert_eq!(harness.next_event().await, OutboundEvent::reply(GREETING));
        assert_eq!(
            harness.next_event().await,
            OutboundEvent::reply("reply to: Tell me about yourself")
        );

        let archive = harness.archive.clone();
        let registry = harness.registry.clone();
        let (summary, rest) = harness.disconnect().await;

        assert!(rest.is_empty(), "unexpected extra frames: {:?}", rest);
        assert_eq!(
            summary.transcript.turns(),
            &[
                Turn::assistant(GREETING),
                Turn::user("Tell me about yourself"),
                Turn::assistant("reply to: Tell me about yourself"),
            ]
        );
        assert_eq!(summary.inbound_exit, Some(InboundExit::Disconnected));
        assert_eq!(summary.outbound_exit, Some(OutboundExit::Drained));
        assert_eq!(summary.events_delivered, 2);
        assert_eq!(registry.active_count(), 0);
        assert!(archive.get("s1").await.is_some());
    }

    #[tokio::test]
    async fn test_transcript_alternates_after_greeting() {
        let harness = Harness::start(Arc::new(EchoGenerator::default()));
        for answer in ["one", "two", "three", "four"] {
            harness.submit(answer);
        }

        let (summary, frames) = harness.disconnect().await;

        assert_eq!(frames.len(), 5);
        let turns = summary.transcript.turns();
        assert_eq!(turns.len(), 9);
        assert_eq!(turns[0], Turn::assistant(GREETING));
        for pair in turns[1..].chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[1].content, format!("reply to: {}", pair[0].content));
        }
    }

    #[tokio::test]
    async fn test_failing_generator_keeps_session_alive() {
        let generator = Arc::new(FailingGenerator::default());
        let mut harness = Harness::start(generator.clone());

        assert_eq!(harness.next_event().await, OutboundEvent::reply(GREETING));
        for answer in ["one", "two", "three"] {
            harness.submit(answer);
            assert_eq!(harness.next_event().await, OutboundEvent::reply("fallback"));
        }
        assert_eq!(
            harness.registry.get("s1").unwrap().phase,
            SessionPhase::Active
        );

        let (summary, _) = harness.disconnect().await;
        assert_eq!(summary.stats.generator_failures, 3);
        assert_eq!(summary.stats.turns_completed, 3);
        assert_eq!(
            generator.calls.load(std::sync::atomic::Ordering::SeqCst),
            3
        );
    }

    #[tokio::test]
    async fn test_close_during_generation_terminates_promptly() {
        let generator = Arc::new(HangingGenerator::new());
        let mut harness = Harness::start(generator.clone());

        assert_eq!(harness.next_event().await, OutboundEvent::reply(GREETING));
        harness.submit("hello?");
        generator.started.notified().await;

        harness.handle.close();

        let summary = tokio::time::timeout(Duration::from_secs(1), harness.task)
            .await
            .expect("session did not terminate")
            .unwrap();

        assert_eq!(summary.inbound_exit, Some(InboundExit::Cancelled));
        assert_eq!(summary.outbound_exit, Some(OutboundExit::Cancelled));
        assert_eq!(summary.transcript.last(), Some(&Turn::user("hello?")));
        assert_eq!(harness.registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_ends_both_tasks() {
        let mut harness = Harness::start(Arc::new(EchoGenerator::default()));
        // The client's read side is gone; the inbound side is still open.
        harness.output.close();

        let summary = tokio::time::timeout(Duration::from_secs(1), &mut harness.task)
            .await
            .expect("session did not terminate")
            .unwrap();

        assert_eq!(summary.outbound_exit, Some(OutboundExit::WriteFailed));
        assert_eq!(summary.inbound_exit, Some(InboundExit::Cancelled));
        assert_eq!(summary.events_delivered, 0);
        assert!(harness.frames.send(InboundFrame::Text("late".into())).is_err());
    }
}
