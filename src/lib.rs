//! # cronbeat
//!
//! Runtime cron schedule registration with minute-tick firing dispatch
//! over a shared event channel.
//!
//! A [`ScheduleManager`] accepts five-field crontab expressions at
//! runtime, assigns each a stable opaque id, and runs one background
//! dispatcher that wakes at every minute boundary and sends the id of
//! each firing schedule onto a single bounded channel. Slow consumers
//! cannot stall the tick loop: sends are bounded by an emit timeout and
//! dropped firings are counted instead of blocking forever.
//!
//! ## Quick Start
//!
//! ```ignore
//! use cronbeat::{Config, ScheduleManager};
//!
//! // Create the manager once at program init
//! let manager = ScheduleManager::new(Config::default());
//!
//! // Register schedules at any time
//! let id = manager.add("*/5 * * * *").await?;
//!
//! // Start dispatching; returns immediately
//! manager.run().await;
//!
//! // Consume firings anywhere a receiver handle was injected
//! let firings = manager.firings();
//! while let Some(fired_id) = firings.recv().await {
//!     println!("schedule {fired_id} fired");
//! }
//!
//! // Clean shutdown closes the channel
//! manager.stop().await;
//! ```
//!
//! ## Architecture
//!
//! - **CronExpression** — five-field parser with `fires`/`next_after`
//! - **ScheduleRegistry** — id → schedule map with snapshot semantics
//! - **Dispatcher** — minute-tick loop with drop-on-backpressure
//! - **ScheduleManager** — facade owning the registry, dispatcher, and
//!   output channel
//! - **Clock** — injectable time source so tests drive time explicitly

pub mod clock;
mod dispatcher;
mod parser;
mod registry;
mod scheduler;
mod types;

// Re-export core types
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::TICK_PERIOD;
pub use parser::CronExpression;
pub use registry::ScheduleRegistry;
pub use scheduler::{FiringReceiver, ScheduleManager};
pub use types::{
    Config, DispatcherStats, DroppedFiring, ParseError, Result, Schedule, SchedulerError,
};
