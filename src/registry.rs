//! Schedule registry
//!
//! Owns the set of active schedules behind a single lock and hands the
//! dispatcher immutable snapshots, so mutations during an in-flight tick
//! only affect subsequent ticks.

use crate::clock::Clock;
use crate::parser::CronExpression;
use crate::types::Schedule;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Mapping from schedule id to record
pub struct ScheduleRegistry {
    schedules: RwLock<HashMap<String, Schedule>>,
    clock: Arc<dyn Clock>,
}

impl ScheduleRegistry {
    /// Create an empty registry stamping records with the given clock
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            schedules: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Register a parsed expression and return its fresh id
    ///
    /// Infallible: validation happened at parse time.
    pub async fn insert(&self, crontab: &str, expression: CronExpression) -> String {
        let schedule = Schedule::new(crontab, expression, self.clock.now());
        let id = schedule.id.clone();

        let mut schedules = self.schedules.write().await;
        schedules.insert(id.clone(), schedule);

        tracing::info!(id = %id, crontab = %crontab, "Schedule registered");
        id
    }

    /// Remove a schedule; returns whether a record existed
    ///
    /// Idempotent. A removal that completes before a tick guarantees no
    /// firing for this id at that tick or later.
    pub async fn remove(&self, id: &str) -> bool {
        let existed = self.schedules.write().await.remove(id).is_some();
        if existed {
            tracing::info!(id = %id, "Schedule removed");
        }
        existed
    }

    /// Look up a schedule by id
    pub async fn get(&self, id: &str) -> Option<Schedule> {
        self.schedules.read().await.get(id).cloned()
    }

    /// All current schedules, ordered by id
    pub async fn list(&self) -> Vec<Schedule> {
        let schedules = self.schedules.read().await;
        let mut result: Vec<Schedule> = schedules.values().cloned().collect();
        result.sort_by(|a, b| a.id.cmp(&b.id));
        result
    }

    /// Immutable view for one tick's evaluation, ordered by id
    ///
    /// The lock is held only while copying, not for the duration of
    /// emission.
    pub async fn snapshot(&self) -> Vec<(String, CronExpression)> {
        let schedules = self.schedules.read().await;
        let mut result: Vec<(String, CronExpression)> = schedules
            .values()
            .map(|s| (s.id.clone(), s.expression.clone()))
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    /// Stamp `last_fired`; no-op when the id has been removed meanwhile
    pub async fn mark_fired(&self, id: &str, instant: DateTime<Utc>) {
        let mut schedules = self.schedules.write().await;
        if let Some(schedule) = schedules.get_mut(id) {
            schedule.last_fired = Some(instant);
        }
    }

    /// Number of registered schedules
    pub async fn len(&self) -> usize {
        self.schedules.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.schedules.read().await.is_empty()
    }
}
