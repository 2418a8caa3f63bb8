//! Minute-tick dispatch loop
//!
//! One long-running task that wakes at every minute boundary, evaluates a
//! registry snapshot, and sends the id of each firing schedule onto the
//! output channel. A slow or absent consumer cannot destroy tick cadence:
//! each send is bounded by the configured emit timeout, after which the
//! firing is dropped and counted instead.

use crate::clock::{to_chrono, Clock};
use crate::registry::ScheduleRegistry;
use crate::types::{DispatcherStats, DroppedFiring};
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};

/// Fixed tick granularity
pub const TICK_PERIOD: Duration = Duration::from_secs(60);

/// How far past a tick the clock may drift before the tick is considered
/// missed rather than merely late
const SKEW_TOLERANCE: Duration = Duration::from_secs(1);

/// Dispatcher counters, shared with the facade
#[derive(Default)]
pub(crate) struct StatsCounters {
    pub(crate) ticks: AtomicU64,
    pub(crate) firings_emitted: AtomicU64,
    pub(crate) firings_dropped: AtomicU64,
    pub(crate) ticks_skipped: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn snapshot(&self) -> DispatcherStats {
        DispatcherStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            firings_emitted: self.firings_emitted.load(Ordering::Relaxed),
            firings_dropped: self.firings_dropped.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Capacity-bounded log of recent dropped firings
pub(crate) struct DropLog {
    entries: RwLock<Vec<DroppedFiring>>,
    max_entries: usize,
}

impl DropLog {
    pub(crate) fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            max_entries,
        }
    }

    pub(crate) async fn record(&self, dropped: DroppedFiring) {
        let mut entries = self.entries.write().await;
        entries.push(dropped);

        if self.max_entries > 0 && entries.len() > self.max_entries {
            let overflow = entries.len() - self.max_entries;
            entries.drain(..overflow);
        }
    }

    /// Most recent drops first
    pub(crate) async fn recent(&self, limit: usize) -> Vec<DroppedFiring> {
        let entries = self.entries.read().await;
        entries.iter().rev().take(limit).cloned().collect()
    }
}

/// The next minute boundary strictly after `now`
pub(crate) fn next_minute_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = Utc
        .with_ymd_and_hms(now.year(), now.month(), now.day(), now.hour(), now.minute(), 0)
        .single()
        .unwrap_or(now);
    truncated + to_chrono(TICK_PERIOD)
}

/// The tick evaluation loop
pub(crate) struct Dispatcher {
    registry: Arc<ScheduleRegistry>,
    clock: Arc<dyn Clock>,
    tx: mpsc::Sender<String>,
    emit_timeout: Duration,
    stats: Arc<StatsCounters>,
    drops: Arc<DropLog>,
    shutdown: watch::Receiver<bool>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        registry: Arc<ScheduleRegistry>,
        clock: Arc<dyn Clock>,
        tx: mpsc::Sender<String>,
        emit_timeout: Duration,
        stats: Arc<StatsCounters>,
        drops: Arc<DropLog>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            clock,
            tx,
            emit_timeout,
            stats,
            drops,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut next_tick = next_minute_boundary(self.clock.now());
        tracing::debug!(next_tick = %next_tick, "Dispatcher started");

        loop {
            // Wait for the tick, or exit on shutdown.
            loop {
                if *self.shutdown.borrow() {
                    tracing::debug!("Dispatcher shutting down");
                    return;
                }
                let now = self.clock.now();
                if now >= next_tick {
                    break;
                }
                let wait = (next_tick - now).to_std().unwrap_or(Duration::ZERO);
                tokio::select! {
                    _ = self.clock.sleep(wait) => {}
                    changed = self.shutdown.changed() => {
                        if changed.is_err() {
                            // Facade dropped without stop; nothing left to serve.
                            return;
                        }
                    }
                }
            }

            // Clock skew or a pause: skip missed ticks, never replay them.
            let now = self.clock.now();
            if now - next_tick > to_chrono(SKEW_TOLERANCE) {
                let realigned = next_minute_boundary(now);
                let skipped = (realigned - next_tick).num_minutes().max(0) as u64;
                self.stats.ticks_skipped.fetch_add(skipped, Ordering::Relaxed);
                tracing::warn!(
                    from = %next_tick,
                    to = %realigned,
                    skipped,
                    "Clock moved past tick; skipping missed ticks"
                );
                next_tick = realigned;
                continue;
            }

            self.stats.ticks.fetch_add(1, Ordering::Relaxed);
            let snapshot = self.registry.snapshot().await;
            let mut fired = Vec::new();

            for (id, expression) in &snapshot {
                if !expression.fires(&next_tick) {
                    continue;
                }

                tokio::select! {
                    result = self.tx.send(id.clone()) => match result {
                        Ok(()) => {
                            self.stats.firings_emitted.fetch_add(1, Ordering::Relaxed);
                            fired.push(id.clone());
                        }
                        Err(_) => {
                            // Channel closed under us; record and move on.
                            self.record_drop(id, next_tick).await;
                        }
                    },
                    _ = self.clock.sleep(self.emit_timeout) => {
                        self.record_drop(id, next_tick).await;
                    }
                    _ = self.shutdown.changed() => {
                        tracing::debug!("Dispatcher shutting down mid-tick");
                        return;
                    }
                }
            }

            for id in &fired {
                self.registry.mark_fired(id, next_tick).await;
            }

            tracing::debug!(tick = %next_tick, fired = fired.len(), "Tick evaluated");
            next_tick += to_chrono(TICK_PERIOD);
        }
    }

    async fn record_drop(&self, id: &str, tick: DateTime<Utc>) {
        self.stats.firings_dropped.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(id = %id, tick = %tick, "Firing dropped: emit timeout exceeded");
        self.drops
            .record(DroppedFiring {
                schedule_id: id.to_string(),
                tick,
                recorded_at: self.clock.now(),
            })
            .await;
    }
}
