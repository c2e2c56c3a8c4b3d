//! Upper bound on the wait for the hub's next expected message.
//!
//! There is one watchdog per run. It is armed while the hub owes us an
//! answer and suspended while we wait on something slower than the hub,
//! such as the user typing their sleep times.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

#[derive(Debug)]
pub struct Watchdog {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl Watchdog {
    /// Create a disarmed watchdog.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// Start a fresh countdown, replacing any running one.
    ///
    /// A timeout too large to represent as an instant never expires.
    pub fn arm(&mut self) {
        trace!(timeout = ?self.timeout, "Watchdog armed");
        self.deadline = Some(
            Instant::now()
                .checked_add(self.timeout)
                .unwrap_or_else(far_future),
        );
    }

    /// Stop the countdown until the next [`arm`](Self::arm).
    pub fn suspend(&mut self) {
        debug!("Watchdog suspended");
        self.deadline = None;
    }

    /// Stop the countdown for good. Consuming the handle is the disarm: no
    /// deadline outlives it.
    pub fn disarm(self) {
        trace!(armed = self.is_armed(), "Watchdog disarmed");
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Completes when the countdown runs out. Never completes while suspended.
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

// About thirty years; comfortably representable on every platform.
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}
