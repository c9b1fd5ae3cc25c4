mod clock;
mod memory;
mod seen;
mod sweeper;

use std::sync::Arc;

use async_trait::async_trait;
use ccg_core::SessionContext;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::MemorySessionStore;
pub use seen::{DEFAULT_SEEN_TTL, SeenClaim, SeenMessages};
pub use sweeper::spawn_sweeper;

/// Shared session store handle used across services.
pub type SharedSessionStore = Arc<dyn SessionStore>;

/// Default idle threshold after which a conversation is evicted.
pub const DEFAULT_MAX_IDLE: Duration = Duration::hours(24);

/// Conversation state kept for one end user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub user_id: String,
    pub session_id: String,
    #[serde(default)]
    pub context: SessionContext,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity: OffsetDateTime,
}

impl ConversationSession {
    /// Fresh session with a newly generated identifier and empty context.
    pub fn new(user_id: impl Into<String>, now: OffsetDateTime) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: uuid::Uuid::new_v4().to_string(),
            context: SessionContext::new(),
            last_activity: now,
        }
    }

    pub fn is_idle(&self, now: OffsetDateTime, max_idle: Duration) -> bool {
        self.last_activity < now - max_idle
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// The backing store could not be reached.
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the session for `user_id`, creating it when absent. Resolving
    /// an existing session refreshes its `last_activity` in the same step.
    /// Concurrent callers for the same user observe the same record.
    async fn get_or_create(&self, user_id: &str) -> Result<ConversationSession, SessionError>;

    async fn get(&self, user_id: &str) -> Result<Option<ConversationSession>, SessionError>;

    /// Refreshes `last_activity`; unknown users are ignored.
    async fn touch(&self, user_id: &str) -> Result<(), SessionError>;

    /// Replaces the whole context. Dropped silently when the session expired.
    async fn update_context(
        &self,
        user_id: &str,
        context: SessionContext,
    ) -> Result<(), SessionError>;

    /// Evicts sessions idle for longer than `max_idle`; returns how many.
    async fn sweep(&self, max_idle: Duration) -> Result<usize, SessionError>;

    /// Number of live sessions.
    async fn count(&self) -> Result<usize, SessionError>;
}

/// Returns an in-memory session store wrapped in an [`Arc`].
pub fn shared_memory_store() -> SharedSessionStore {
    Arc::new(MemorySessionStore::new())
}
