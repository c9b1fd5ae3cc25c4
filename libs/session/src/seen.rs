use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::{Duration, OffsetDateTime};

use crate::{Clock, SystemClock};

/// Default window during which a redelivered message id is dropped.
pub const DEFAULT_SEEN_TTL: Duration = Duration::hours(24);

/// Provider message ids claimed within the last `ttl`.
///
/// A claim is released again when the turn it guards never finishes, so a
/// webhook cut short by the request timeout resumes at the first message that
/// did not complete when the provider retries it.
pub struct SeenMessages {
    seen: DashMap<String, OffsetDateTime>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SeenMessages {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            seen: DashMap::new(),
            ttl,
            clock,
        }
    }

    /// Claims `id` unless a live claim already exists. The check and the
    /// insert happen under the same shard lock.
    pub fn claim(&self, id: &str) -> Option<SeenClaim<'_>> {
        let now = self.clock.now();
        let expires = now + self.ttl;
        match self.seen.entry(id.to_string()) {
            Entry::Occupied(existing) if *existing.get() > now => return None,
            Entry::Occupied(mut stale) => {
                stale.insert(expires);
            }
            Entry::Vacant(slot) => {
                slot.insert(expires);
            }
        }
        Some(SeenClaim {
            owner: self,
            id: id.to_string(),
            expires,
            kept: false,
        })
    }

    /// Drops claims whose window has passed; returns how many.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.seen.len();
        self.seen.retain(|_, expires| *expires > now);
        before.saturating_sub(self.seen.len())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for SeenMessages {
    fn default() -> Self {
        Self::new(DEFAULT_SEEN_TTL)
    }
}

/// Outstanding claim on a message id. Dropping it without [`SeenClaim::keep`]
/// forgets the id again.
#[must_use = "an unkept claim is released on drop"]
pub struct SeenClaim<'a> {
    owner: &'a SeenMessages,
    id: String,
    expires: OffsetDateTime,
    kept: bool,
}

impl SeenClaim<'_> {
    /// Marks the id as handled for the rest of its window.
    pub fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for SeenClaim<'_> {
    fn drop(&mut self) {
        if !self.kept {
            let expires = self.expires;
            self.owner.seen.remove_if(&self.id, |_, at| *at == expires);
        }
    }
}
