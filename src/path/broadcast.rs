//! "Environment changed" notification.

use crate::platform::PlatformEnvironment;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Tells running applications that the environment stores changed.
///
/// Each broadcast uses two channels: a blocking send that gives up on hung
/// receivers, then a queued post. Either one succeeding counts.
#[derive(Clone)]
pub struct EnvironmentBroadcaster {
    env: Arc<dyn PlatformEnvironment>,
}

impl EnvironmentBroadcaster {
    /// Broadcast through `env`.
    pub fn new(env: Arc<dyn PlatformEnvironment>) -> Self {
        Self { env }
    }

    /// One combined broadcast. Both channels are always attempted.
    pub fn broadcast(&self, timeout: Duration) -> bool {
        let sent = self.env.send_change_notification(timeout);
        let posted = self.env.post_change_notification();
        debug!(sent, posted, "environment change broadcast");
        sent || posted
    }

    /// Repeat [`broadcast`](Self::broadcast) until one succeeds, at most
    /// `max_attempts` times (at least once).
    pub fn broadcast_with_retry(&self, max_attempts: u32, timeout: Duration) -> bool {
        let attempts = max_attempts.max(1);
        for attempt in 1..=attempts {
            if self.broadcast(timeout) {
                return true;
            }
            warn!(attempt, attempts, "environment change broadcast not delivered");
        }
        false
    }
}
