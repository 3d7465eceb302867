//! # Application State Management
//!
//! Shared state handed to every HTTP handler and WebSocket actor through
//! `web::Data<AppState>`.
//!
//! ## What lives here:
//! - **config**: the validated configuration, read-only after startup
//! - **metrics**: request and session counters behind `Arc<RwLock<..>>`
//! - **registry**: the live interview sessions and the concurrency limit
//! - **sessions**: collaborators injected into every session (generator, archive)
//!
//! ## Thread Safety:
//! Actix runs one app instance per worker thread, so everything here is either
//! immutable, reference counted, or behind a lock. `AppState` is cheap to clone.

use crate::config::AppConfig;
use crate::generator::ResponseGenerator;
use crate::session::{SessionContext, SessionRegistry, SessionSummary, TranscriptArchive};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    /// Configuration loaded at startup
    pub config: Arc<AppConfig>,

    /// Counters updated by the middleware and by finished sessions
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Sessions currently connected
    pub registry: SessionRegistry,

    /// Generator, archive and per-session settings
    pub sessions: SessionContext,

    pub start_time: Instant,
}

/// Counters collected since the server started.
///
/// The number of active sessions is not stored here; it is read from the
/// registry so it can never drift from the real set of connections.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// HTTP requests processed, WebSocket upgrades included
    pub request_count: u64,

    /// Requests that ended with a 4xx or 5xx status
    pub error_count: u64,

    pub sessions_started: u64,
    pub sessions_completed: u64,

    /// Submits answered with a reply, fallback replies included
    pub turns_completed: u64,

    /// Generator calls that failed or timed out
    pub generator_failures: u64,

    /// Client frames skipped because they could not be interpreted
    pub malformed_messages: u64,

    /// Key: route pattern with method (e.g. "GET /api/v1/sessions/{id}/transcript")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Per-endpoint request statistics.
///
/// ## Derived values:
/// - **Average response time**: total_duration_ms / request_count
/// - **Error rate**: error_count / request_count
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    /// Build the shared state from a validated configuration and the two session
    /// collaborators.
    pub fn new(
        config: AppConfig,
        generator: Arc<dyn ResponseGenerator>,
        archive: Arc<dyn TranscriptArchive>,
    ) -> Self {
        let registry = SessionRegistry::new(config.session.max_concurrent_sessions);
        let sessions = SessionContext::from_config(&config, generator, archive);

        Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            registry,
            sessions,
            start_time: Instant::now(),
        }
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    // Counters stay usable after a poisoning panic.
    fn metrics_read(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(|e| e.into_inner())
    }

    fn metrics_write(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Called by the metrics middleware for every request.
    pub fn increment_request_count(&self) {
        self.metrics_write().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics_write().error_count += 1;
    }

    /// Record one request against its endpoint.
    ///
    /// ## Parameters:
    /// - **endpoint**: method and route pattern (e.g. "GET /health")
    /// - **duration_ms**: time spent producing the response
    /// - **is_error**: whether the response was a 4xx or 5xx
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_write();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    pub fn record_session_start(&self) {
        self.metrics_write().sessions_started += 1;
    }

    /// Fold the counters of a finished session into the global metrics.
    pub fn record_session_end(&self, summary: &SessionSummary) {
        let mut metrics = self.metrics_write();
        metrics.sessions_completed += 1;
        metrics.turns_completed += summary.stats.turns_completed as u64;
        metrics.generator_failures += summary.stats.generator_failures as u64;
        metrics.malformed_messages += summary.stats.malformed_messages as u64;
    }

    /// Number of sessions currently registered.
    pub fn active_sessions(&self) -> usize {
        self.registry.active_count()
    }

    /// Copy of the current counters, so the lock is not held while a response is
    /// being serialized.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics_read().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl AppMetrics {
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Share of answered turns that fell back to the canned reply.
    pub fn generator_failure_rate(&self) -> f64 {
        if self.turns_completed > 0 {
            self.generator_failures as f64 / self.turns_completed as f64
        } else {
            0.0
        }
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Between 0.0 (no errors) and 1.0 (every request failed).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::generator::fakes::EchoGenerator;
    use crate::session::supervisor::tests::summary_for;
    use crate::session::InMemoryArchive;

    pub(crate) fn test_state() -> AppState {
        let mut config = AppConfig::default();
        config.session.max_concurrent_sessions = 2;
        AppState::new(
            config,
            Arc::new(EchoGenerator::default()),
            Arc::new(InMemoryArchive::new(10)),
        )
    }

    #[test]
    fn test_endpoint_metrics_accumulate() {
        let state = test_state();
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
    }

    #[test]
    fn test_session_end_folds_counters() {
        let state = test_state();
        let mut summary = summary_for("a");
        summary.stats.turns_completed = 4;
        summary.stats.generator_failures = 1;
        summary.stats.malformed_messages = 2;

        state.record_session_start();
        state.record_session_end(&summary);

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.sessions_started, 1);
        assert_eq!(snapshot.sessions_completed, 1);
        assert_eq!(snapshot.turns_completed, 4);
        assert_eq!(snapshot.malformed_messages, 2);
        assert_eq!(snapshot.generator_failure_rate(), 0.25);
    }

    #[test]
    fn test_registry_uses_configured_limit() {
        let state = test_state();
        assert_eq!(state.registry.max_sessions(), 2);
        assert_eq!(state.active_sessions(), 0);
    }
}
