use std::sync::Arc;

use async_trait::async_trait;
use ccg_core::SessionContext;
use dashmap::DashMap;
use time::Duration;
use tracing::debug;

use crate::{Clock, ConversationSession, SessionError, SessionStore, SystemClock};

/// Sharded in-memory store. Each user key is guarded by its shard lock only,
/// so unrelated users never contend on a global lock.
pub struct MemorySessionStore {
    sessions: DashMap<String, ConversationSession>,
    clock: Arc<dyn Clock>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_or_create(&self, user_id: &str) -> Result<ConversationSession, SessionError> {
        let mut created = false;
        let now = self.clock.now();
        let session = self
            .sessions
            .entry(user_id.to_string())
            .and_modify(|existing| existing.last_activity = now)
            .or_insert_with(|| {
                created = true;
                ConversationSession::new(user_id, now)
            })
            .value()
            .clone();
        if created {
            metrics::counter!("ccg_sessions_created_total").increment(1);
            debug!(session_id = %session.session_id, "conversation session created");
        }
        Ok(session)
    }

    async fn get(&self, user_id: &str) -> Result<Option<ConversationSession>, SessionError> {
        Ok(self
            .sessions
            .get(user_id)
            .map(|entry| entry.value().clone()))
    }

    async fn touch(&self, user_id: &str) -> Result<(), SessionError> {
        if let Some(mut entry) = self.sessions.get_mut(user_id) {
            entry.last_activity = self.clock.now();
        }
        Ok(())
    }

    async fn update_context(
        &self,
        user_id: &str,
        context: SessionContext,
    ) -> Result<(), SessionError> {
        match self.sessions.get_mut(user_id) {
            Some(mut entry) => {
                entry.context = context;
                entry.last_activity = self.clock.now();
            }
            None => debug!("session expired before context update; dropping"),
        }
        Ok(())
    }

    async fn sweep(&self, max_idle: Duration) -> Result<usize, SessionError> {
        let now = self.clock.now();
        let mut removed = 0usize;
        self.sessions.retain(|_, session| {
            let keep = !session.is_idle(now, max_idle);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    async fn count(&self) -> Result<usize, SessionError> {
        Ok(self.sessions.len())
    }
}
