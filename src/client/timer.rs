//! Client timer controller — a pure reducer over local state and inputs.
//!
//! DESIGN
//! ======
//! The browser-side timer reconciles four sources of truth, in priority
//! order: the local click (optimistic), the HR backend status query at
//! load, socket attendance events, and the local cache as offline
//! fallback. The reducer owns the reconciliation rules; every side effect
//! (ticker, cache, backend call, alert, render) is returned as a value and
//! applied by the shell, so the rules are testable in isolation.
//!
//! NO-DOWNGRADE RULES
//! ==================
//! - Remote sync/start/stop events within 5 s of a local action are dropped.
//! - Events whose `serverNow` is older than the last adopted sync are dropped.
//! - A remote stop is accepted only when its total ≥ the current local total.
//! - A remote start over a stopped timer is accepted only when its total ≥
//!   the local baseline. The baseline never moves down.
//!
//! Clock drift: every attendance event carries `serverNow`; the reducer
//! smooths an offset exponentially and computes elapsed time from
//! `local_now + offset`, so the display never drifts under suspensions.

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::services::attendance::DayStatus;

/// Remote events arriving this close to a local click are ignored.
pub const SUPPRESS_WINDOW_MS: i64 = 5_000;
/// Smoothing factor for the server clock offset.
pub const OFFSET_ALPHA: f64 = 0.2;

// =============================================================================
// CACHE BLOB
// =============================================================================

/// Per-user cache blob persisted under `timerState_{UID}`, keyed by local
/// date so yesterday's entry is never resumed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedTimer {
    pub is_running: bool,
    pub start_time: i64,
    pub date: String,
    pub mode: String,
    pub duration_seconds: i64,
}

/// Storage key for a user's cache blob.
#[must_use]
pub fn cache_key(user_id: &str) -> String {
    format!("timerState_{user_id}")
}

// =============================================================================
// INPUTS AND EFFECTS
// =============================================================================

/// Payload of an inbound socket attendance event.
#[derive(Clone, Debug, Default)]
pub struct RemoteAttendance {
    pub is_running: Option<bool>,
    pub checkin_wall_ms: Option<i64>,
    pub baseline_seconds: Option<i64>,
    pub total_seconds: Option<i64>,
    pub status: Option<DayStatus>,
    pub server_now: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteKind {
    Sync,
    Started,
    Stopped,
    StatusUpdate,
}

#[derive(Clone, Debug)]
pub enum TimerInput {
    /// Optimistic local check-in click.
    CheckInClick { now_ms: i64 },
    /// HR backend confirmed the check-in, possibly with an authoritative
    /// timestamp and a larger accumulated baseline.
    CheckInConfirmed {
        checkin_wall_ms: Option<i64>,
        baseline_seconds: Option<i64>,
        now_ms: i64,
    },
    /// HR backend rejected the check-in: roll back.
    CheckInFailed { message: String },
    /// Local check-out click.
    CheckOutClick { now_ms: i64 },
    /// HR backend confirmed the check-out, possibly with a larger total.
    CheckOutConfirmed { total_seconds: Option<i64> },
    /// HR backend rejected the check-out: the local stop stands.
    CheckOutFailed,
    /// Load-time status query result from the HR backend.
    BackendStatus {
        is_running: bool,
        checkin_wall_ms: Option<i64>,
        baseline_seconds: i64,
        now_ms: i64,
    },
    /// Socket attendance event.
    Remote {
        kind: RemoteKind,
        payload: RemoteAttendance,
        now_ms: i64,
    },
    /// 1 Hz display tick. The display is re-rendered from state, never
    /// incremented blindly.
    Tick { now_ms: i64 },
    /// One-shot local-midnight reset.
    MidnightReset { today: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum TimerEffect {
    StartTicker,
    StopTicker,
    CacheWrite(CachedTimer),
    CacheClear,
    CallBackendCheckIn { checkin_wall_ms: i64, baseline_seconds: i64 },
    CallBackendCheckOut { total_seconds: i64, status: DayStatus },
    ShowError(String),
    Render { total_seconds: i64, status: DayStatus },
    /// Update today's attendance row after a threshold crossing.
    UpdateTodayRow(DayStatus),
    ScheduleMidnightReset,
}

// =============================================================================
// CONTROLLER
// =============================================================================

#[derive(Clone, Debug)]
pub struct TimerController {
    user_id: String,
    date: String,
    running: bool,
    baseline_seconds: i64,
    checkin_wall_ms: i64,
    status: DayStatus,
    last_user_action_ms: i64,
    last_sync_server_now: i64,
    offset_ms: f64,
}

impl TimerController {
    #[must_use]
    pub fn new(user_id: &str, date: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            date: date.to_string(),
            running: false,
            baseline_seconds: 0,
            checkin_wall_ms: 0,
            status: DayStatus::Absent,
            last_user_action_ms: 0,
            last_sync_server_now: 0,
            offset_ms: 0.0,
        }
    }

    /// Offline fallback: resume from the cache blob. A blob from another
    /// date is ignored.
    #[must_use]
    pub fn restore(user_id: &str, cached: &CachedTimer, today: &str) -> Self {
        let mut controller = Self::new(user_id, today);
        if cached.date == today {
            controller.running = cached.is_running;
            controller.checkin_wall_ms = cached.start_time;
            controller.baseline_seconds = cached.duration_seconds.max(0);
        }
        controller
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn baseline_seconds(&self) -> i64 {
        self.baseline_seconds
    }

    #[must_use]
    pub fn status(&self) -> DayStatus {
        self.status
    }

    /// Drift-corrected local clock.
    #[must_use]
    fn corrected_now(&self, local_now_ms: i64) -> i64 {
        #[allow(clippy::cast_possible_truncation)]
        let offset = self.offset_ms.round() as i64;
        local_now_ms + offset
    }

    /// Cumulative seconds as of the (corrected) local clock.
    #[must_use]
    pub fn total_seconds(&self, local_now_ms: i64) -> i64 {
        if self.running {
            let elapsed = (self.corrected_now(local_now_ms) - self.checkin_wall_ms) / 1000;
            self.baseline_seconds + elapsed.max(0)
        } else {
            self.baseline_seconds
        }
    }

    fn cached(&self) -> CachedTimer {
        CachedTimer {
            is_running: self.running,
            start_time: self.checkin_wall_ms,
            date: self.date.clone(),
            mode: "work".to_string(),
            duration_seconds: self.baseline_seconds,
        }
    }

    /// Apply one input and return the side effects to perform.
    pub fn apply(&mut self, input: TimerInput) -> Vec<TimerEffect> {
        match input {
            TimerInput::CheckInClick { now_ms } => self.on_check_in_click(now_ms),
            TimerInput::CheckInConfirmed { checkin_wall_ms, baseline_seconds, now_ms: _ } => {
                self.on_check_in_confirmed(checkin_wall_ms, baseline_seconds)
            }
            TimerInput::CheckInFailed { message } => self.on_check_in_failed(message),
            TimerInput::CheckOutClick { now_ms } => self.on_check_out_click(now_ms),
            TimerInput::CheckOutConfirmed { total_seconds } => {
                if let Some(total) = total_seconds {
                    if total > self.baseline_seconds {
                        self.baseline_seconds = total;
                        return vec![TimerEffect::CacheWrite(self.cached())];
                    }
                }
                Vec::new()
            }
            TimerInput::CheckOutFailed => Vec::new(),
            TimerInput::BackendStatus { is_running, checkin_wall_ms, baseline_seconds, now_ms } => {
                self.on_backend_status(is_running, checkin_wall_ms, baseline_seconds, now_ms)
            }
            TimerInput::Remote { kind, payload, now_ms } => self.on_remote(kind, &payload, now_ms),
            TimerInput::Tick { now_ms } => self.on_tick(now_ms),
            TimerInput::MidnightReset { today } => self.on_midnight_reset(today),
        }
    }

    // -------------------------------------------------------------------------
    // LOCAL CLICKS (optimistic)
    // -------------------------------------------------------------------------

    fn on_check_in_click(&mut self, now_ms: i64) -> Vec<TimerEffect> {
        self.running = true;
        self.checkin_wall_ms = self.corrected_now(now_ms);
        self.last_user_action_ms = now_ms;
        vec![
            TimerEffect::StartTicker,
            TimerEffect::CacheWrite(self.cached()),
            TimerEffect::CallBackendCheckIn {
                checkin_wall_ms: self.checkin_wall_ms,
                baseline_seconds: self.baseline_seconds,
            },
        ]
    }

    fn on_check_in_confirmed(
        &mut self,
        checkin_wall_ms: Option<i64>,
        baseline_seconds: Option<i64>,
    ) -> Vec<TimerEffect> {
        if !self.running {
            // Rolled back or stopped while the request was in flight.
            return Vec::new();
        }
        if let Some(ts) = checkin_wall_ms {
            self.checkin_wall_ms = ts;
        }
        if let Some(baseline) = baseline_seconds {
            // Baseline only moves up.
            if baseline > self.baseline_seconds {
                self.baseline_seconds = baseline;
            }
        }
        vec![TimerEffect::CacheWrite(self.cached())]
    }

    fn on_check_in_failed(&mut self, message: String) -> Vec<TimerEffect> {
        self.running = false;
        vec![
            TimerEffect::StopTicker,
            TimerEffect::CacheWrite(self.cached()),
            TimerEffect::ShowError(message),
        ]
    }

    fn on_check_out_click(&mut self, now_ms: i64) -> Vec<TimerEffect> {
        let total = self.total_seconds(now_ms);
        self.running = false;
        self.baseline_seconds = total;
        self.last_user_action_ms = now_ms;
        let status = DayStatus::derive(total);
        self.status = status;
        vec![
            TimerEffect::StopTicker,
            TimerEffect::CacheWrite(self.cached()),
            TimerEffect::CallBackendCheckOut { total_seconds: total, status },
        ]
    }

    // -------------------------------------------------------------------------
    // BACKEND STATUS AT LOAD
    // -------------------------------------------------------------------------

    fn on_backend_status(
        &mut self,
        is_running: bool,
        checkin_wall_ms: Option<i64>,
        baseline_seconds: i64,
        now_ms: i64,
    ) -> Vec<TimerEffect> {
        // A click in the last few seconds outranks the load-time query.
        if now_ms - self.last_user_action_ms < SUPPRESS_WINDOW_MS {
            return Vec::new();
        }
        self.running = is_running;
        if let Some(ts) = checkin_wall_ms {
            self.checkin_wall_ms = ts;
        }
        if baseline_seconds > self.baseline_seconds {
            self.baseline_seconds = baseline_seconds;
        }
        let mut effects = vec![TimerEffect::CacheWrite(self.cached())];
        if is_running {
            effects.insert(0, TimerEffect::StartTicker);
        }
        effects
    }

    // -------------------------------------------------------------------------
    // REMOTE SOCKET EVENTS
    // -------------------------------------------------------------------------

    fn on_remote(&mut self, kind: RemoteKind, payload: &RemoteAttendance, now_ms: i64) -> Vec<TimerEffect> {
        // Smooth the clock offset from every event before any guard.
        #[allow(clippy::cast_precision_loss)]
        let sample = (payload.server_now - now_ms) as f64;
        self.offset_ms = (1.0 - OFFSET_ALPHA) * self.offset_ms + OFFSET_ALPHA * sample;

        if kind == RemoteKind::StatusUpdate {
            if let Some(status) = payload.status {
                self.status = status;
                return vec![TimerEffect::UpdateTodayRow(status)];
            }
            return Vec::new();
        }

        // Suppression: a recent local click outranks any remote event.
        if now_ms - self.last_user_action_ms < SUPPRESS_WINDOW_MS {
            return Vec::new();
        }
        // Stale: older than the last adopted sync.
        if payload.server_now < self.last_sync_server_now {
            return Vec::new();
        }

        let remote_running = match kind {
            RemoteKind::Started => true,
            RemoteKind::Stopped => false,
            _ => payload.is_running.unwrap_or(false),
        };
        let remote_total = payload.total_seconds.unwrap_or_else(|| {
            let checkin = payload.checkin_wall_ms.unwrap_or(payload.server_now);
            payload.baseline_seconds.unwrap_or(0) + ((payload.server_now - checkin) / 1000).max(0)
        });

        if remote_running {
            self.adopt_running(payload, remote_total, now_ms)
        } else {
            self.adopt_stopped(payload, remote_total, now_ms)
        }
    }

    fn adopt_running(&mut self, payload: &RemoteAttendance, remote_total: i64, now_ms: i64) -> Vec<TimerEffect> {
        if self.running {
            // Same run seen from another device; never lower the total.
            if remote_total < self.total_seconds(now_ms) {
                return Vec::new();
            }
        } else if remote_total < self.baseline_seconds {
            // Stopped → running only when the event is at least as far along.
            return Vec::new();
        }

        let was_running = self.running;
        self.running = true;
        if let Some(ts) = payload.checkin_wall_ms {
            self.checkin_wall_ms = ts;
        }
        if let Some(baseline) = payload.baseline_seconds {
            if baseline > self.baseline_seconds || !was_running {
                self.baseline_seconds = baseline.max(self.baseline_seconds);
            }
        }
        self.last_sync_server_now = payload.server_now;

        let mut effects = vec![TimerEffect::CacheWrite(self.cached())];
        if !was_running {
            effects.insert(0, TimerEffect::StartTicker);
        }
        effects
    }

    fn adopt_stopped(&mut self, payload: &RemoteAttendance, remote_total: i64, now_ms: i64) -> Vec<TimerEffect> {
        // A remote stop may only land at or above the local total.
        if remote_total < self.total_seconds(now_ms) {
            return Vec::new();
        }
        let was_running = self.running;
        self.running = false;
        self.baseline_seconds = remote_total;
        self.status = payload.status.unwrap_or_else(|| DayStatus::derive(remote_total));
        self.last_sync_server_now = payload.server_now;

        let mut effects = vec![TimerEffect::CacheWrite(self.cached())];
        if was_running {
            effects.insert(0, TimerEffect::StopTicker);
        }
        effects
    }

    // -------------------------------------------------------------------------
    // TICK AND MIDNIGHT
    // -------------------------------------------------------------------------

    fn on_tick(&mut self, now_ms: i64) -> Vec<TimerEffect> {
        let total = self.total_seconds(now_ms);
        let derived = DayStatus::derive(total);
        let mut effects = Vec::new();
        if self.running && derived != self.status {
            self.status = derived;
            effects.push(TimerEffect::UpdateTodayRow(derived));
        }
        effects.push(TimerEffect::Render { total_seconds: total, status: self.status });
        effects
    }

    fn on_midnight_reset(&mut self, today: String) -> Vec<TimerEffect> {
        self.date = today;
        self.running = false;
        self.baseline_seconds = 0;
        self.checkin_wall_ms = 0;
        self.status = DayStatus::Absent;
        self.last_sync_server_now = 0;
        vec![
            TimerEffect::StopTicker,
            TimerEffect::CacheClear,
            TimerEffect::ScheduleMidnightReset,
        ]
    }
}

// =============================================================================
// MIDNIGHT HELPERS
// =============================================================================

/// Local calendar date key (`YYYY-MM-DD`) for a wall-clock instant.
#[must_use]
pub fn local_date_key(now_ms: i64, offset: UtcOffset) -> String {
    let date = local_date(now_ms, offset);
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

/// Epoch ms of the next local midnight strictly after `now_ms`.
#[must_use]
pub fn next_midnight_ms(now_ms: i64, offset: UtcOffset) -> i64 {
    let today = local_date(now_ms, offset);
    let Some(tomorrow) = today.next_day() else {
        return now_ms + 86_400_000;
    };
    let midnight = PrimitiveDateTime::new(tomorrow, Time::MIDNIGHT).assume_offset(offset);
    midnight.unix_timestamp() * 1000
}

fn local_date(now_ms: i64, offset: UtcOffset) -> Date {
    OffsetDateTime::from_unix_timestamp(now_ms.div_euclid(1000))
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
        .to_offset(offset)
        .date()
}

#[cfg(test)]
#[path = "timer_test.rs"]
mod tests;
