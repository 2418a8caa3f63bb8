//! Schedule manager facade
//!
//! Wires the parser, registry, and dispatcher together and owns the
//! output channel. Consumers receive firings through cloned
//! [`FiringReceiver`] handles obtained from [`ScheduleManager::firings`];
//! the read end is handed out by the facade rather than published as a
//! process global.

use crate::clock::{Clock, SystemClock};
use crate::dispatcher::{Dispatcher, DropLog, StatsCounters};
use crate::parser::CronExpression;
use crate::registry::ScheduleRegistry;
use crate::types::{Config, DispatcherStats, DroppedFiring, Result, Schedule, SchedulerError};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Retained dropped-firing records
const DROP_LOG_CAPACITY: usize = 1_000;

/// Facade lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Stopped,
}

/// Clonable read handle for the firing stream
///
/// Clones share one underlying receiver: each firing is delivered to
/// exactly one active reader. `recv` returns `None` once the manager has
/// stopped and the channel has drained.
#[derive(Clone)]
pub struct FiringReceiver {
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
}

impl FiringReceiver {
    fn new(rx: mpsc::Receiver<String>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Wait for the next firing
    pub async fn recv(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }

    /// Take a firing if one is immediately available
    pub async fn try_recv(&self) -> Option<String> {
        self.rx.lock().await.try_recv().ok()
    }
}

/// Process-wide cron schedule manager
///
/// Accepts crontab expressions at runtime, assigns stable ids, and emits
/// one firing per matching schedule at each minute boundary onto a
/// single shared output channel.
pub struct ScheduleManager {
    registry: Arc<ScheduleRegistry>,
    clock: Arc<dyn Clock>,
    config: Config,
    /// Held until `run` hands it to the dispatcher; dropped on `stop`
    /// so the channel closes even when `run` was never called.
    tx: Mutex<Option<mpsc::Sender<String>>>,
    firings: FiringReceiver,
    stats: Arc<StatsCounters>,
    drops: Arc<DropLog>,
    state: RwLock<Lifecycle>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ScheduleManager {
    /// Create a manager bound to the real clock
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a manager with an injected clock
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        // The runtime has no zero-capacity channels; an "unbuffered"
        // configuration gets the smallest buffer available.
        let (tx, rx) = mpsc::channel(config.channel_buffer.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            registry: Arc::new(ScheduleRegistry::new(clock.clone())),
            clock,
            config,
            tx: Mutex::new(Some(tx)),
            firings: FiringReceiver::new(rx),
            stats: Arc::new(StatsCounters::default()),
            drops: Arc::new(DropLog::new(DROP_LOG_CAPACITY)),
            state: RwLock::new(Lifecycle::Created),
            shutdown_tx,
            shutdown_rx,
            task: Mutex::new(None),
        }
    }

    /// Register a crontab expression and return its schedule id
    ///
    /// The id is eligible for emission at every minute boundary after
    /// this call returns. Fails with a parse error on malformed input
    /// (the registry is untouched) or `Closed` after `stop`.
    pub async fn add(&self, crontab: &str) -> Result<String> {
        if *self.state.read().await == Lifecycle::Stopped {
            return Err(SchedulerError::Closed);
        }

        let expression = CronExpression::parse(crontab)?;
        Ok(self.registry.insert(crontab, expression).await)
    }

    /// Unregister a schedule; returns whether it existed
    ///
    /// A removal that returns before a minute boundary guarantees no
    /// firing for this id at that boundary or later.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        if *self.state.read().await == Lifecycle::Stopped {
            return Err(SchedulerError::Closed);
        }

        Ok(self.registry.remove(id).await)
    }

    /// Start the dispatcher
    ///
    /// Idempotent: the dispatcher is spawned once; later calls are
    /// no-ops. Returns immediately; dispatching proceeds in the
    /// background.
    pub async fn run(&self) {
        let mut state = self.state.write().await;
        if *state != Lifecycle::Created {
            return;
        }

        let Some(tx) = self.tx.lock().await.take() else {
            return;
        };

        let dispatcher = Dispatcher::new(
            self.registry.clone(),
            self.clock.clone(),
            tx,
            self.config.emit_timeout,
            self.stats.clone(),
            self.drops.clone(),
            self.shutdown_rx.clone(),
        );

        *self.task.lock().await = Some(tokio::spawn(dispatcher.run()));
        *state = Lifecycle::Running;

        tracing::info!("Schedule dispatcher started");
    }

    /// Stop the dispatcher and close the output channel
    ///
    /// Signals shutdown, waits for the dispatcher task to exit, and
    /// closes the channel; pending firings are not flushed. Idempotent.
    /// After this returns, `add` and `remove` fail with `Closed` and
    /// `recv` returns `None` once the channel drains.
    pub async fn stop(&self) {
        {
            let mut state = self.state.write().await;
            if *state == Lifecycle::Stopped {
                return;
            }
            *state = Lifecycle::Stopped;
        }

        let _ = self.shutdown_tx.send(true);

        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Dispatcher task did not exit cleanly");
            }
        }

        // Close the channel when the dispatcher never took the sender.
        self.tx.lock().await.take();

        tracing::info!("Schedule manager stopped");
    }

    /// Read handle for the firing stream
    pub fn firings(&self) -> FiringReceiver {
        self.firings.clone()
    }

    /// Look up a schedule by id
    pub async fn get(&self, id: &str) -> Option<Schedule> {
        self.registry.get(id).await
    }

    /// All current schedules, ordered by id
    pub async fn list(&self) -> Vec<Schedule> {
        self.registry.list().await
    }

    /// Dispatcher counters
    pub fn stats(&self) -> DispatcherStats {
        self.stats.snapshot()
    }

    /// Most recent dropped firings, newest first
    pub async fn recent_drops(&self, limit: usize) -> Vec<DroppedFiring> {
        self.drops.recent(limit).await
    }

    /// Whether the dispatcher is running
    pub async fn is_running(&self) -> bool {
        *self.state.read().await == Lifecycle::Running
    }
}
