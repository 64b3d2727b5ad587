use super::test_helpers::*;
use crate::event::Event;
use serde_json::json;

#[tokio::test]
async fn fresh_state_has_no_sessions_or_timers() {
    let state = test_app_state();
    assert!(state.rooms.read().await.sessions_in_room("E1").is_empty());
    assert!(state.timers.read().await.get("E1").is_none());
}

#[tokio::test]
async fn connect_user_joins_personal_room() {
    let state = test_app_state();
    let (_session, mut rx) = connect_user(&state, "e1").await;

    state
        .rooms
        .read()
        .await
        .emit_to_user("E1", &Event::new("call:ring", json!({"call_id": "C1"})));

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "call:ring");
}
