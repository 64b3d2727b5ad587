//! Attendance timer store and periodic status sweeper.
//!
//! DESIGN
//! ======
//! The store is the authoritative in-memory record per user: running flag,
//! check-in wall time, baseline seconds credited before the current run,
//! and the last broadcast status. Records are created on first check-in and
//! never destroyed in-process (bounded by active users per day).
//!
//! The sweeper promotes status across the half-day and full-day thresholds
//! once per minute and persists each transition to the HR backend fire-and-
//! forget. Persistence failures never touch in-memory state.
//!
//! EDGE CASES
//! ==========
//! A running record whose computed total falls outside [0, 86400] is
//! treated as clock-skew poisoned: syncs are suppressed and the sweeper
//! skips it, so clients fall back to the HR backend status query.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use uuid::Uuid;

use crate::event::{Event, now_ms};
use crate::rooms::attendance_room;
use crate::services::backend::spawn_auto_status;
use crate::state::AppState;

pub const HALF_DAY_SECS: i64 = 4 * 3600;
pub const FULL_DAY_SECS: i64 = 9 * 3600;
pub const MAX_DAY_SECS: i64 = 86_400;

// =============================================================================
// STATUS
// =============================================================================

/// Daily attendance status derived from cumulative seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayStatus {
    #[default]
    #[serde(rename = "A")]
    Absent,
    #[serde(rename = "HL")]
    HalfDay,
    #[serde(rename = "P")]
    Present,
}

impl DayStatus {
    /// Map cumulative seconds to a status.
    #[must_use]
    pub fn derive(total_seconds: i64) -> Self {
        if total_seconds >= FULL_DAY_SECS {
            Self::Present
        } else if total_seconds >= HALF_DAY_SECS {
            Self::HalfDay
        } else {
            Self::Absent
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Absent => "A",
            Self::HalfDay => "HL",
            Self::Present => "P",
        }
    }

    /// Parse the wire form ("A" / "HL" / "P").
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "A" => Some(Self::Absent),
            "HL" => Some(Self::HalfDay),
            "P" => Some(Self::Present),
            _ => None,
        }
    }
}

// =============================================================================
// TIMER RECORD
// =============================================================================

/// Authoritative per-user timer state.
#[derive(Debug, Clone)]
pub struct TimerRecord {
    pub running: bool,
    /// Absolute wall time of the current check-in (ms). Meaningful only
    /// while running.
    pub checkin_wall_ms: i64,
    /// Seconds credited before the current run.
    pub baseline_seconds: i64,
    /// Last status broadcast for this user.
    pub last_status: DayStatus,
    /// Total recorded at the last check-out. Retained so a later sync from
    /// any device returns the accumulated total, never 0.
    pub last_total_seconds: i64,
}

impl TimerRecord {
    /// Cumulative seconds as of `now_ms`.
    #[must_use]
    pub fn total_seconds(&self, now_ms: i64) -> i64 {
        if self.running {
            self.baseline_seconds + ((now_ms - self.checkin_wall_ms) / 1000).max(0)
        } else {
            self.last_total_seconds
        }
    }

    /// Whether the running state looks clock-skew poisoned.
    #[must_use]
    pub fn is_corrupt(&self, now_ms: i64) -> bool {
        if !self.running {
            return false;
        }
        let elapsed = (now_ms - self.checkin_wall_ms) / 1000;
        let total = self.baseline_seconds + elapsed;
        elapsed < 0 || total < 0 || total > MAX_DAY_SECS
    }
}

/// One sweeper status transition to fan out and persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub employee_id: String,
    pub status: DayStatus,
    pub total_seconds: i64,
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Default)]
pub struct TimerStore {
    timers: HashMap<String, TimerRecord>,
}

impl TimerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a check-in. Missing wall time defaults to now; baseline is
    /// clamped non-negative.
    pub fn check_in(
        &mut self,
        employee_id: &str,
        checkin_wall_ms: Option<i64>,
        baseline_seconds: Option<i64>,
        now_ms: i64,
    ) -> TimerRecord {
        let record = TimerRecord {
            running: true,
            checkin_wall_ms: checkin_wall_ms.unwrap_or(now_ms),
            baseline_seconds: baseline_seconds.unwrap_or(0).max(0),
            last_status: DayStatus::Absent,
            last_total_seconds: 0,
        };
        self.timers.insert(employee_id.to_string(), record.clone());
        record
    }

    /// Record a check-out with the client-computed total.
    pub fn check_out(&mut self, employee_id: &str, total_seconds: i64, status: Option<DayStatus>) -> TimerRecord {
        let total = total_seconds.max(0);
        let status = status.unwrap_or_else(|| DayStatus::derive(total));
        let entry = self
            .timers
            .entry(employee_id.to_string())
            .or_insert_with(|| TimerRecord {
                running: false,
                checkin_wall_ms: 0,
                baseline_seconds: 0,
                last_status: status,
                last_total_seconds: 0,
            });
        entry.running = false;
        entry.baseline_seconds = total;
        entry.last_total_seconds = total;
        entry.last_status = status;
        entry.clone()
    }

    /// Overwrite the last broadcast status (bridge injection path).
    pub fn apply_status(&mut self, employee_id: &str, status: DayStatus) {
        if let Some(record) = self.timers.get_mut(employee_id) {
            record.last_status = status;
        }
    }

    #[must_use]
    pub fn get(&self, employee_id: &str) -> Option<&TimerRecord> {
        self.timers.get(employee_id)
    }

    /// Build the `attendance:sync` payload for a user, or `None` when there
    /// is no record (fresh process) or the running state is corrupt.
    #[must_use]
    pub fn sync_payload(&self, employee_id: &str, now_ms: i64) -> Option<Value> {
        let record = self.timers.get(employee_id)?;
        if record.is_corrupt(now_ms) {
            debug!(employee_id, "suppressing sync for corrupt timer state");
            return None;
        }
        let total = record.total_seconds(now_ms);
        let status = if record.running { DayStatus::derive(total) } else { record.last_status };
        Some(json!({
            "employee_id": employee_id,
            "isRunning": record.running,
            "checkinTimestamp": record.checkin_wall_ms,
            "baseSeconds": record.baseline_seconds,
            "totalSeconds": total,
            "status": status,
            "serverNow": now_ms,
        }))
    }

    /// One sweeper pass: promote `last_status` for every running timer whose
    /// derived status changed and return the transitions.
    pub fn sweep(&mut self, now_ms: i64) -> Vec<StatusChange> {
        let mut changes = Vec::new();
        for (employee_id, record) in &mut self.timers {
            if !record.running || record.is_corrupt(now_ms) {
                continue;
            }
            let total = record.total_seconds(now_ms);
            let derived = DayStatus::derive(total);
            if derived != record.last_status {
                record.last_status = derived;
                changes.push(StatusChange {
                    employee_id: employee_id.clone(),
                    status: derived,
                    total_seconds: total,
                });
            }
        }
        changes
    }
}

// =============================================================================
// FAN-OUT
// =============================================================================

/// Apply a check-in and fan out `attendance:started` to the user's
/// attendance room. Expects a normalized employee id.
pub async fn handle_check_in(
    state: &AppState,
    employee_id: &str,
    checkin_wall_ms: Option<i64>,
    baseline_seconds: Option<i64>,
    now: i64,
) {
    let record = {
        let mut timers = state.timers.write().await;
        timers.check_in(employee_id, checkin_wall_ms, baseline_seconds, now)
    };
    info!(employee_id, checkin_wall_ms = record.checkin_wall_ms, "attendance check-in");

    let event = Event::new(
        "attendance:started",
        json!({
            "employee_id": employee_id,
            "checkinTimestamp": record.checkin_wall_ms,
            "baseSeconds": record.baseline_seconds,
            "serverNow": now,
        }),
    );
    let rooms = state.rooms.read().await;
    rooms.emit_to_room(&attendance_room(employee_id), &event, None);
}

/// Apply a check-out and fan out `attendance:stopped`.
pub async fn handle_check_out(
    state: &AppState,
    employee_id: &str,
    total_seconds: i64,
    status: Option<DayStatus>,
    now: i64,
) {
    let record = {
        let mut timers = state.timers.write().await;
        timers.check_out(employee_id, total_seconds, status)
    };
    info!(employee_id, total_seconds = record.last_total_seconds, "attendance check-out");

    let event = Event::new(
        "attendance:stopped",
        json!({
            "employee_id": employee_id,
            "totalSeconds": record.last_total_seconds,
            "status": record.last_status,
            "serverNow": now,
        }),
    );
    let rooms = state.rooms.read().await;
    rooms.emit_to_room(&attendance_room(employee_id), &event, None);
}

/// Reply privately to a sync request. No record or corrupt state emits
/// nothing; the client falls back to the HR backend status query.
pub async fn handle_request_sync(state: &AppState, session_id: Uuid, employee_id: &str, now: i64) {
    let payload = {
        let timers = state.timers.read().await;
        timers.sync_payload(employee_id, now)
    };
    let Some(payload) = payload else {
        debug!(employee_id, "no sync available");
        return;
    };
    let event = Event::new("attendance:sync", payload);
    let rooms = state.rooms.read().await;
    rooms.emit_to_session(session_id, &event);
}

/// One sweeper pass over the whole store: fan out `attendance:status-update`
/// per transition and persist each fire-and-forget.
pub async fn sweep_once(state: &AppState, now: i64) {
    // Mutate under the write lock, emit and persist outside it.
    let changes = {
        let mut timers = state.timers.write().await;
        timers.sweep(now)
    };
    if changes.is_empty() {
        return;
    }

    let rooms = state.rooms.read().await;
    for change in changes {
        info!(
            employee_id = %change.employee_id,
            status = change.status.as_str(),
            total_seconds = change.total_seconds,
            "sweeper status transition"
        );
        let event = Event::new(
            "attendance:status-update",
            json!({
                "employee_id": change.employee_id,
                "status": change.status,
                "totalSeconds": change.total_seconds,
                "serverNow": now,
            }),
        );
        rooms.emit_to_room(&attendance_room(&change.employee_id), &event, None);
        spawn_auto_status(
            state.backend.clone(),
            change.employee_id,
            change.status,
            change.total_seconds,
        );
    }
}

/// Spawn the periodic sweeper. Ticks coalesce: a pass that overruns the
/// period skips the missed tick instead of overlapping.
pub fn spawn_sweeper_task(state: AppState) -> JoinHandle<()> {
    let period = Duration::from_secs(state.config.sweep_interval_secs);
    info!(period_secs = state.config.sweep_interval_secs, "attendance sweeper configured");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so a fresh process
        // doesn't sweep an empty store.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_once(&state, now_ms()).await;
        }
    })
}

#[cfg(test)]
#[path = "attendance_test.rs"]
mod tests;
