use super::*;
use serde_json::json;

fn session(registry: &mut RoomRegistry) -> (Uuid, mpsc::Receiver<Event>) {
    let session_id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel(16);
    registry.connect(session_id, tx);
    (session_id, rx)
}

fn drain(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn normalize_trims_and_uppercases() {
    assert_eq!(normalize_id("  emp001 "), "EMP001");
    assert_eq!(normalize_id("E1"), "E1");
    assert_eq!(normalize_id("   "), "");
}

#[test]
fn bind_joins_personal_room_and_reports_first_session() {
    let mut registry = RoomRegistry::new();
    let (a, _rx_a) = session(&mut registry);
    let (b, _rx_b) = session(&mut registry);

    assert_eq!(registry.bind(a, " e1 ", Role::Employee).now_online, Some("E1".to_string()));
    // Second device for the same user is not "first".
    assert_eq!(registry.bind(b, "E1", Role::Employee).now_online, None);

    assert!(registry.is_online("E1"));
    assert_eq!(registry.sessions_in_room("E1").len(), 2);
    assert_eq!(registry.user_of(a), Some("E1"));
}

#[test]
fn bind_is_idempotent_per_session() {
    let mut registry = RoomRegistry::new();
    let (a, _rx) = session(&mut registry);

    assert!(registry.bind(a, "E1", Role::Employee).now_online.is_some());
    assert_eq!(registry.bind(a, "E1", Role::Employee), BindOutcome::default());
    assert_eq!(registry.sessions_in_room("E1").len(), 1);
}

#[test]
fn bind_rejects_empty_user_id() {
    let mut registry = RoomRegistry::new();
    let (a, _rx) = session(&mut registry);
    assert_eq!(registry.bind(a, "   ", Role::Employee), BindOutcome::default());
    assert_eq!(registry.user_of(a), None);
}

#[test]
fn emit_to_user_reaches_every_device() {
    let mut registry = RoomRegistry::new();
    let (a, mut rx_a) = session(&mut registry);
    let (b, mut rx_b) = session(&mut registry);
    let (c, mut rx_c) = session(&mut registry);
    registry.bind(a, "E1", Role::Employee);
    registry.bind(b, "E1", Role::Employee);
    registry.bind(c, "E2", Role::Employee);

    registry.emit_to_user("E1", &Event::new("call:ring", json!({"call_id": "C"})));

    assert_eq!(drain(&mut rx_a).len(), 1);
    assert_eq!(drain(&mut rx_b).len(), 1);
    assert!(drain(&mut rx_c).is_empty());
}

#[test]
fn room_membership_is_join_minus_leave_and_disconnect() {
    let mut registry = RoomRegistry::new();
    let (a, _rx_a) = session(&mut registry);
    let (b, _rx_b) = session(&mut registry);
    let (c, _rx_c) = session(&mut registry);

    registry.join(a, "CONV1");
    registry.join(b, "CONV1");
    registry.join(c, "CONV1");
    assert_eq!(registry.sessions_in_room("CONV1").len(), 3);

    registry.leave(b, "CONV1");
    registry.disconnect(c, 1_000);
    let members = registry.sessions_in_room("CONV1");
    assert_eq!(members, vec![a]);
}

#[test]
fn emit_to_room_honors_exclude() {
    let mut registry = RoomRegistry::new();
    let (a, mut rx_a) = session(&mut registry);
    let (b, mut rx_b) = session(&mut registry);
    registry.join(a, "CONV1");
    registry.join(b, "CONV1");

    registry.emit_to_room("CONV1", &Event::new("typing", json!({})), Some(a));

    assert!(drain(&mut rx_a).is_empty());
    assert_eq!(drain(&mut rx_b).len(), 1);
}

#[test]
fn rebind_releases_the_previous_user() {
    let mut registry = RoomRegistry::new();
    let (a, _rx) = session(&mut registry);
    registry.bind(a, "E1", Role::Employee);

    let outcome = registry.bind(a, "E2", Role::Employee);
    assert_eq!(outcome.now_offline, Some("E1".to_string()));
    assert_eq!(outcome.now_online, Some("E2".to_string()));
    assert!(!registry.is_online("E1"));
    assert!(registry.sessions_in_room("E1").is_empty());
    assert_eq!(registry.user_of(a), Some("E2"));

    // Disconnect reports the current user only; nothing lingers for E1.
    assert_eq!(
        registry.disconnect(a, 500),
        Some(OfflineUser { user_id: "E2".to_string(), last_seen_ms: 500 })
    );
    assert!(!registry.is_online("E2"));
}

#[test]
fn rebind_with_a_remaining_device_keeps_the_old_user_online() {
    let mut registry = RoomRegistry::new();
    let (a, _rx_a) = session(&mut registry);
    let (b, _rx_b) = session(&mut registry);
    registry.bind(a, "E1", Role::Employee);
    registry.bind(b, "E1", Role::Employee);

    let outcome = registry.bind(a, "E2", Role::Employee);
    assert_eq!(outcome.now_offline, None);
    assert!(registry.is_online("E1"));
    assert_eq!(registry.sessions_in_room("E1").len(), 1);
}

#[test]
fn last_disconnect_reports_user_offline() {
    let mut registry = RoomRegistry::new();
    let (a, _rx_a) = session(&mut registry);
    let (b, _rx_b) = session(&mut registry);
    registry.bind(a, "E1", Role::Employee);
    registry.bind(b, "E1", Role::Employee);

    assert_eq!(registry.disconnect(a, 100), None);
    assert_eq!(
        registry.disconnect(b, 200),
        Some(OfflineUser { user_id: "E1".to_string(), last_seen_ms: 200 })
    );
    assert!(!registry.is_online("E1"));
}

#[test]
fn broadcast_reaches_all_sessions() {
    let mut registry = RoomRegistry::new();
    let (_a, mut rx_a) = session(&mut registry);
    let (_b, mut rx_b) = session(&mut registry);

    registry.broadcast(&Event::new("user_presence", json!({"user_id": "E1", "online": true})));

    assert_eq!(drain(&mut rx_a).len(), 1);
    assert_eq!(drain(&mut rx_b).len(), 1);
}
