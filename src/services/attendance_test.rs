use super::*;
use crate::rooms::attendance_room;
use crate::state::test_helpers::*;

const T0: i64 = 1_700_000_000_000;

#[test]
fn derive_boundaries() {
    assert_eq!(DayStatus::derive(0), DayStatus::Absent);
    assert_eq!(DayStatus::derive(HALF_DAY_SECS - 1), DayStatus::Absent);
    assert_eq!(DayStatus::derive(HALF_DAY_SECS), DayStatus::HalfDay);
    assert_eq!(DayStatus::derive(FULL_DAY_SECS - 1), DayStatus::HalfDay);
    assert_eq!(DayStatus::derive(FULL_DAY_SECS), DayStatus::Present);
}

#[test]
fn status_wire_form_round_trips() {
    for status in [DayStatus::Absent, DayStatus::HalfDay, DayStatus::Present] {
        assert_eq!(DayStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(DayStatus::parse("X"), None);
}

#[test]
fn check_in_defaults_and_clamps() {
    let mut store = TimerStore::new();
    let record = store.check_in("E1", None, Some(-50), T0);
    assert!(record.running);
    assert_eq!(record.checkin_wall_ms, T0);
    assert_eq!(record.baseline_seconds, 0);
    assert_eq!(record.last_status, DayStatus::Absent);
}

#[test]
fn check_out_retains_total_for_later_syncs() {
    let mut store = TimerStore::new();
    store.check_in("E1", Some(T0), Some(1_000), T0);
    store.check_out("E1", 4_600, None);

    let payload = store.sync_payload("E1", T0 + 3_600_000).unwrap();
    assert_eq!(payload["isRunning"], false);
    assert_eq!(payload["totalSeconds"], 4_600);
    // Total never reported as 0 after an accumulated day.
    assert!(payload["totalSeconds"].as_i64().unwrap() >= 1_000);
}

#[test]
fn checkin_then_checkout_total_at_least_baseline() {
    let mut store = TimerStore::new();
    let baseline = 2_500;
    store.check_in("E1", Some(T0), Some(baseline), T0);
    let record = store.check_out("E1", baseline, None);
    assert!(record.last_total_seconds >= baseline);
}

#[test]
fn sync_suppressed_for_unknown_user() {
    let store = TimerStore::new();
    assert!(store.sync_payload("GHOST", T0).is_none());
}

#[test]
fn sync_suppressed_for_negative_elapsed() {
    let mut store = TimerStore::new();
    // Check-in one hour in the future relative to "now".
    store.check_in("E1", Some(T0 + 3_600_000), None, T0 + 3_600_000);
    assert!(store.sync_payload("E1", T0).is_none());
}

#[test]
fn sync_suppressed_past_24h() {
    let mut store = TimerStore::new();
    store.check_in("E1", Some(T0), None, T0);
    let later = T0 + (MAX_DAY_SECS + 10) * 1000;
    assert!(store.sync_payload("E1", later).is_none());
}

#[test]
fn sweep_promotes_exactly_once_per_crossing() {
    let mut store = TimerStore::new();
    store.check_in("E1", Some(T0), None, T0);

    let at_half = T0 + HALF_DAY_SECS * 1000;
    let changes = store.sweep(at_half);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].status, DayStatus::HalfDay);
    assert_eq!(changes[0].total_seconds, HALF_DAY_SECS);

    // Next sweep with no new crossing emits nothing.
    assert!(store.sweep(at_half + 60_000).is_empty());

    let at_full = T0 + FULL_DAY_SECS * 1000;
    let changes = store.sweep(at_full);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].status, DayStatus::Present);
}

#[test]
fn sweep_skips_stopped_and_corrupt_timers() {
    let mut store = TimerStore::new();
    store.check_in("STOPPED", Some(T0), None, T0);
    store.check_out("STOPPED", HALF_DAY_SECS, None);
    // Baseline beyond 24h marks the running state corrupt; would otherwise
    // derive P and emit.
    store.check_in("SKEWED", Some(T0), Some(100_000), T0);

    assert!(store.sweep(T0 + HALF_DAY_SECS * 1000).is_empty());
}

#[tokio::test]
async fn cross_device_resume_syncs_running_timer() {
    let state = test_app_state();

    // Device A checks in at T0.
    let (_a, _rx_a) = connect_user(&state, "E1").await;
    handle_check_in(&state, "E1", Some(T0), Some(0), T0).await;

    // Device B connects an hour later and registers for attendance.
    let (b, mut rx_b) = connect_session(&state).await;
    state.rooms.write().await.join(b, &attendance_room("E1"));
    handle_request_sync(&state, b, "E1", T0 + 3_600_000).await;

    let events = drain(&mut rx_b);
    assert_eq!(events.len(), 1);
    let sync = &events[0];
    assert_eq!(sync.event, "attendance:sync");
    assert_eq!(sync.data["isRunning"], true);
    assert_eq!(sync.data["baseSeconds"], 0);
    assert_eq!(sync.data["checkinTimestamp"], T0);
    assert_eq!(sync.data["totalSeconds"], 3_600);
    assert_eq!(sync.data["status"], "A");
}

#[tokio::test]
async fn sweeper_fans_out_half_day_crossing() {
    let state = test_app_state();

    let (session, mut rx) = connect_session(&state).await;
    state.rooms.write().await.join(session, &attendance_room("E1"));
    handle_check_in(&state, "E1", Some(T0), Some(0), T0).await;
    drain(&mut rx); // attendance:started

    sweep_once(&state, T0 + HALF_DAY_SECS * 1000).await;

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    let update = &events[0];
    assert_eq!(update.event, "attendance:status-update");
    assert_eq!(update.data["status"], "HL");
    assert_eq!(update.data["totalSeconds"], 14_400);

    // Re-sweeping without a new crossing stays quiet.
    sweep_once(&state, T0 + HALF_DAY_SECS * 1000 + 60_000).await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn checkin_fans_out_started_to_attendance_room() {
    let state = test_app_state();
    let (session, mut rx) = connect_session(&state).await;
    state.rooms.write().await.join(session, &attendance_room("E1"));

    handle_check_in(&state, "E1", Some(T0), Some(300), T0).await;

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "attendance:started");
    assert_eq!(events[0].data["baseSeconds"], 300);
    assert_eq!(events[0].data["serverNow"], T0);
}

#[tokio::test]
async fn checkout_fans_out_stopped_with_status() {
    let state = test_app_state();
    let (session, mut rx) = connect_session(&state).await;
    state.rooms.write().await.join(session, &attendance_room("E1"));

    handle_check_out(&state, "E1", FULL_DAY_SECS, None, T0).await;

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "attendance:stopped");
    assert_eq!(events[0].data["totalSeconds"], FULL_DAY_SECS);
    assert_eq!(events[0].data["status"], "P");
}
