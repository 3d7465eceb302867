//! Persistence boundary for finished sessions. The scoring side reads transcripts
//! from here once a session has ended; nothing is stored while it is live.

use super::supervisor::SessionSummary;
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::RwLock;

#[async_trait]
pub trait TranscriptArchive: Send + Sync {
    async fn store(&self, summary: SessionSummary);

    /// Most recent finished session with this identifier.
    async fn get(&self, session_id: &str) -> Option<SessionSummary>;

    /// Up to `limit` finished sessions, newest first.
    async fn recent(&self, limit: usize) -> Vec<SessionSummary>;
}

/// Keeps the last `capacity` sessions in memory.
pub struct InMemoryArchive {
    capacity: usize,
    entries: RwLock<VecDeque<SessionSummary>>,
}

impl InMemoryArchive {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }
}

#[async_trait]
impl TranscriptArchive for InMemoryArchive {
    async fn store(&self, summary: SessionSummary) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.write().await;
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(summary);
    }

    async fn get(&self, session_id: &str) -> Option<SessionSummary> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .rev()
            .find(|s| s.params.session_id == session_id)
            .cloned()
    }

    async fn recent(&self, limit: usize) -> Vec<SessionSummary> {
        let entries = self.entries.read().await;
        entries.iter().rev().take(limit).cloned().collect()
    }
}
