//! # Session Registry
//!
//! Tracks the interview sessions that are currently connected and enforces the
//! concurrent session limit. A slot is reserved before the WebSocket upgrade so an
//! over-limit or duplicate connection can be refused with a proper HTTP status.
//!
//! ## Lifecycle:
//! 1. **register**: reserve a slot, returns a [`SessionLease`]
//! 2. **set_phase**: the supervisor moves the session through its phases
//! 3. **drop the lease**: the slot is released, whatever path ended the session
//!
//! ## Thread Safety:
//! The map sits behind `Arc<RwLock<..>>` so HTTP handlers can list sessions while
//! supervisors on other worker threads update them.

use crate::interview::{Difficulty, InterviewCategory, SessionParams};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Slot reserved, waiting for the WebSocket to start
    Connecting,
    /// Greeting being seeded, no client input processed yet
    Greeting,
    /// Both tasks running
    Active,
    /// One side finished, waiting for the other
    Closing,
}

/// Public view of an active session.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveSession {
    pub session_id: String,
    pub category: InterviewCategory,
    pub difficulty: Difficulty,
    pub topic: Option<String>,
    pub phase: SessionPhase,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The concurrent session limit is reached
    Full(usize),
    /// A live session already uses this identifier
    Duplicate(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Full(max) => write!(f, "Maximum concurrent sessions ({}) reached", max),
            RegistryError::Duplicate(id) => write!(f, "Session ID '{}' is already active", id),
        }
    }
}

impl std::error::Error for RegistryError {}

#[derive(Debug, Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, ActiveSession>>>,
    max_concurrent_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_concurrent_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_concurrent_sessions,
        }
    }

    /// Reserve a slot for a new session.
    pub fn register(&self, params: &SessionParams) -> Result<SessionLease, RegistryError> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());

        if sessions.len() >= self.max_concurrent_sessions {
            return Err(RegistryError::Full(self.max_concurrent_sessions));
        }

        if sessions.contains_key(&params.session_id) {
            return Err(RegistryError::Duplicate(params.session_id.clone()));
        }

        sessions.insert(
            params.session_id.clone(),
            ActiveSession {
                session_id: params.session_id.clone(),
                category: params.category,
                difficulty: params.difficulty,
                topic: params.topic.clone(),
                phase: SessionPhase::Connecting,
                connected_at: Utc::now(),
            },
        );

        Ok(SessionLease {
            registry: self.clone(),
            session_id: params.session_id.clone(),
        })
    }

    pub fn get(&self, session_id: &str) -> Option<ActiveSession> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.get(session_id).cloned()
    }

    /// All active sessions, oldest first.
    pub fn list(&self) -> Vec<ActiveSession> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<ActiveSession> = sessions.values().cloned().collect();
        list.sort_by_key(|s| s.connected_at);
        list
    }

    pub fn active_count(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_concurrent_sessions
    }

    fn set_phase(&self, session_id: &str, phase: SessionPhase) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if let Some(session) = sessions.get_mut(session_id) {
            session.phase = phase;
        }
    }

    fn remove(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(session_id).is_some()
    }
}

/// Ownership of one registry slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct SessionLease {
    registry: SessionRegistry,
    session_id: String,
}

impl SessionLease {
    pub fn set_phase(&self, phase: SessionPhase) {
        self.registry.set_phase(&self.session_id, phase);
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.registry.remove(&self.session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(id: &str) -> SessionParams {
        SessionParams::from_query(id, None, None, None).unwrap()
    }

    #[test]
    fn test_register_and_release() {
        let registry = SessionRegistry::new(2);
        let lease = registry.register(&params("a")).unwrap();
        assert_eq!(registry.active_count(), 1);
        assert_eq!(registry.get("a").unwrap().phase, SessionPhase::Connecting);

        lease.set_phase(SessionPhase::Active);
        assert_eq!(registry.get("a").unwrap().phase, SessionPhase::Active);

        drop(lease);
        assert_eq!(registry.active_count(), 0);
        assert!(registry.get("a").is_none());
    }

    #[test]
    fn test_rejects_duplicates_and_overflow() {
        let registry = SessionRegistry::new(2);
        let _a = registry.register(&params("a")).unwrap();

        assert_eq!(
            registry.register(&params("a")).unwrap_err(),
            RegistryError::Duplicate("a".to_string())
        );

        let _b = registry.register(&params("b")).unwrap();
        assert_eq!(
            registry.register(&params("c")).unwrap_err(),
            RegistryError::Full(2)
        );
    }

    #[test]
    fn test_slot_is_reusable_after_release() {
        let registry = SessionRegistry::new(1);
        drop(registry.register(&params("a")).unwrap());
        assert!(registry.register(&params("a")).is_ok());
    }
}
