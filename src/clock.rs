//! Injectable time source
//!
//! The dispatcher never consults the system clock directly; everything
//! goes through the `Clock` trait so tests can drive time explicitly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

/// Convert a std duration to a chrono duration, saturating instead of
/// failing on absurd inputs.
pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(duration.as_millis().min(i64::MAX as u128) as i64)
}

/// A source of wall-clock time and awaitable delays
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the caller for the given duration
    async fn sleep(&self, duration: Duration);
}

/// Real clock: `Utc::now` plus the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Test clock advanced explicitly
///
/// `sleep` suspends until `advance` or `set` moves the clock past the
/// caller's deadline. Time never moves on its own, so tests control
/// exactly which ticks the dispatcher observes.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    advanced: Notify,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            advanced: Notify::new(),
        }
    }

    /// Move the clock forward, waking any pending sleepers
    pub fn advance(&self, duration: Duration) {
        {
            let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
            *now += to_chrono(duration);
        }
        self.advanced.notify_waiters();
    }

    /// Jump the clock to a specific instant, waking any pending sleepers
    pub fn set(&self, instant: DateTime<Utc>) {
        {
            let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
            *now = instant;
        }
        self.advanced.notify_waiters();
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        let deadline = self.now() + to_chrono(duration);
        loop {
            let notified = self.advanced.notified();
            tokio::pin!(notified);
            // Register before the deadline check so an advance between
            // the check and the await is not lost.
            notified.as_mut().enable();
            if self.now() >= deadline {
                return;
            }
            notified.await;
        }
    }
}
