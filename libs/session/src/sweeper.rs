use std::sync::Arc;
use std::time::Duration as StdDuration;

use time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::{SeenMessages, SharedSessionStore};

/// Spawns the periodic idle-session sweep, which also purges expired message
/// ids from `seen`. The first pass runs one `every` after start; abort the
/// returned handle to stop it.
pub fn spawn_sweeper(
    store: SharedSessionStore,
    seen: Arc<SeenMessages>,
    every: StdDuration,
    max_idle: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.sweep(max_idle).await {
                Ok(0) => {}
                Ok(removed) => {
                    metrics::counter!("ccg_sessions_swept_total").increment(removed as u64);
                    info!(removed, "evicted idle conversation sessions");
                }
                Err(err) => warn!(error = %err, "session sweep failed"),
            }
            let purged = seen.purge_expired();
            if purged > 0 {
                debug!(purged, "forgot expired message ids");
            }
        }
    })
}
