//! Core types for cronbeat

use crate::parser::CronExpression;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for schedule manager operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Reasons a crontab string is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Wrong number of whitespace-separated fields
    #[error("expected 5 fields, got {0}")]
    FieldCount(usize),

    /// A value falls outside the documented range for its field
    #[error("value {value} out of range ({min}-{max}) in {field} field")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// Malformed token: bad number, bad or zero step, inverted range
    #[error("malformed token '{token}' in {field} field")]
    Syntax { field: &'static str, token: String },

    /// A field or list item is empty
    #[error("empty {field} field")]
    EmptyField { field: &'static str },
}

/// Schedule manager errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Invalid cron expression; the registry is not touched
    #[error("invalid cron expression: {0}")]
    Parse(#[from] ParseError),

    /// Operation attempted after `stop`
    #[error("schedule manager is stopped")]
    Closed,
}

/// A registered schedule
///
/// Owned and mutated exclusively by the registry; the dispatcher only
/// ever sees immutable snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Unique schedule identifier (sched-<uuid>)
    pub id: String,

    /// Original crontab text as passed to `add`
    pub crontab: String,

    /// Parsed expression
    pub expression: CronExpression,

    /// Registration timestamp
    pub created_at: DateTime<Utc>,

    /// Instant of the most recent firing, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fired: Option<DateTime<Utc>>,
}

impl Schedule {
    /// Create a new schedule record with a fresh id
    pub fn new(
        crontab: impl Into<String>,
        expression: CronExpression,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("sched-{}", Uuid::new_v4()),
            crontab: crontab.into(),
            expression,
            created_at,
            last_fired: None,
        }
    }
}

/// Schedule manager configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// How long an in-flight emission may block on the output channel
    /// before the firing is dropped
    pub emit_timeout: Duration,

    /// Output channel capacity; 0 is clamped to 1, the smallest buffer
    /// the runtime supports
    pub channel_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            emit_timeout: Duration::from_secs(50),
            channel_buffer: 0,
        }
    }
}

/// Dispatcher counters snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherStats {
    /// Minute boundaries evaluated
    pub ticks: u64,

    /// Firings delivered onto the output channel
    pub firings_emitted: u64,

    /// Firings dropped after `emit_timeout`
    pub firings_dropped: u64,

    /// Minute boundaries skipped after clock skew or a pause
    pub ticks_skipped: u64,
}

/// A firing that could not be delivered within `emit_timeout`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedFiring {
    /// Schedule whose firing was dropped
    pub schedule_id: String,

    /// The tick the firing belonged to
    pub tick: DateTime<Utc>,

    /// When the drop was recorded
    pub recorded_at: DateTime<Utc>,
}
