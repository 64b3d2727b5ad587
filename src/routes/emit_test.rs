use axum::extract::State;
use axum::http::StatusCode;
use serde_json::json;

use super::*;
use crate::rooms::attendance_room;
use crate::state::test_helpers::*;

async fn post(state: &AppState, body: Value) -> (StatusCode, Value) {
    let (status, Json(reply)) = handle_emit(State(state.clone()), Json(body)).await;
    (status, reply)
}

#[tokio::test]
async fn rejects_bodies_with_neither_shape() {
    let state = test_app_state();
    let (status, reply) = post(&state, json!({"foo": "bar"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["success"], false);
}

#[tokio::test]
async fn call_shape_creates_and_rings() {
    let state = test_app_state();
    let (_e1, mut rx_e1) = connect_user(&state, "E1").await;

    let (status, reply) = post(
        &state,
        json!({
            "admin_id": "ADMIN",
            "title": "Sync",
            "meet_url": "https://meet.example/x",
            "participants": [{"employee_id": "e1"}],
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["success"], true);
    let call_id = reply["call_id"].as_str().unwrap();
    assert!(state.calls.read().await.get(call_id).is_some());

    let events = drain(&mut rx_e1);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "call:ring");
    assert_eq!(events[0].data["call_id"], call_id);
}

#[tokio::test]
async fn call_shape_validation_answers_400() {
    let state = test_app_state();
    let (status, reply) = post(
        &state,
        json!({"admin_id": "ADMIN", "participants": [{"employee_id": "E1"}]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["success"], false);
    assert!(reply["error"].as_str().unwrap().contains("meet_url"));
}

#[tokio::test]
async fn conversation_event_fans_out_to_room_exactly_once() {
    let state = test_app_state();
    let (a, mut rx_a) = connect_session(&state).await;
    let (b, mut rx_b) = connect_session(&state).await;
    let (_outsider, mut rx_outsider) = connect_session(&state).await;
    {
        let mut rooms = state.rooms.write().await;
        rooms.join(a, "CONV1");
        rooms.join(b, "CONV1");
    }

    let (status, _) = post(
        &state,
        json!({
            "event": "new_message",
            "data": {"conversation_id": "CONV1", "message_id": "M1", "content": "hi"},
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(drain(&mut rx_a).len(), 1);
    let events = drain(&mut rx_b);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "new_message");
    assert!(drain(&mut rx_outsider).is_empty());
}

#[tokio::test]
async fn group_mutation_is_renamed_and_invalidates_cache() {
    let state = test_app_state();
    let (a, mut rx_a) = connect_session(&state).await;
    state.rooms.write().await.join(a, "CONV1");
    state
        .chat
        .write()
        .await
        .set_members("CONV1", vec!["E1".to_string()]);

    let (status, _) = post(
        &state,
        json!({
            "event": "group_add_members",
            "data": {"conversation_id": "CONV1", "added": ["E9"]},
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let events = drain(&mut rx_a);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "group_members_added");
    assert!(state.chat.read().await.cached_members("CONV1").is_none());
}

#[tokio::test]
async fn conversation_created_reaches_each_member_personally() {
    let state = test_app_state();
    let (_e1, mut rx_e1) = connect_user(&state, "E1").await;
    let (_e2, mut rx_e2) = connect_user(&state, "E2").await;
    let (_e3, mut rx_e3) = connect_user(&state, "E3").await;

    let (status, _) = post(
        &state,
        json!({
            "event": "conversation_created",
            "data": {"conversation_id": "CONV9", "members": ["e1", "E2"]},
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(drain(&mut rx_e1).len(), 1);
    let events = drain(&mut rx_e2);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "conversation_created");
    assert!(drain(&mut rx_e3).is_empty());
}

#[tokio::test]
async fn unknown_event_broadcasts_raw() {
    let state = test_app_state();
    let (_a, mut rx_a) = connect_session(&state).await;

    let (status, _) = post(
        &state,
        json!({"event": "org_announcement", "data": {"text": "all hands"}}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let events = drain(&mut rx_a);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "org_announcement");
    assert_eq!(events[0].data["text"], "all hands");
}

#[tokio::test]
async fn attendance_status_update_updates_store_and_fans_out() {
    let state = test_app_state();
    let (session, mut rx) = connect_session(&state).await;
    state
        .rooms
        .write()
        .await
        .join(session, &attendance_room("E1"));

    let (status, _) = post(
        &state,
        json!({
            "event": "attendance:status-update",
            "data": {"employee_id": " e1 ", "status": "HL", "totalSeconds": 14400},
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "attendance:status-update");
    assert_eq!(events[0].data["status"], "HL");
    assert_eq!(events[0].data["totalSeconds"], 14400);
}

#[tokio::test]
async fn attendance_status_update_rejects_bad_status() {
    let state = test_app_state();
    let (status, reply) = post(
        &state,
        json!({
            "event": "attendance:status-update",
            "data": {"employee_id": "E1", "status": "LATE"},
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["success"], false);
}

#[tokio::test]
async fn attendance_checkin_via_bridge_updates_store() {
    let state = test_app_state();

    let (status, _) = post(
        &state,
        json!({
            "event": "attendance:checkin",
            "data": {"employee_id": "E1", "baseSeconds": 60},
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let timers = state.timers.read().await;
    let record = timers.get("E1").unwrap();
    assert!(record.running);
    assert_eq!(record.baseline_seconds, 60);
}

#[tokio::test]
async fn attendance_event_without_employee_id_is_rejected() {
    let state = test_app_state();
    let (status, _) = post(
        &state,
        json!({"event": "attendance:checkin", "data": {"baseSeconds": 60}}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
