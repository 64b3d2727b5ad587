//! HTTP ingress bridge — `/emit`.
//!
//! DESIGN
//! ======
//! The HR backend injects events into the socket room topology through one
//! endpoint that accepts two shapes, discriminated on the presence of
//! `event`:
//!
//! (a) meet call creation `{admin_id, title?, meet_url, participants[]}` →
//!     Call Registry, rings every participant;
//! (b) named event `{event, data}` → rewrite to the client event name,
//!     pick the fan-out target (conversation room, per-member personal
//!     rooms, or broadcast), and deliver.
//!
//! Attendance events injected here also update the in-memory timer store so
//! later syncs from any device observe them.
//!
//! ERROR HANDLING
//! ==============
//! Validation failures answer `400 {success:false, error}` without mutating
//! state. Unknown event names are broadcast raw as a forward-compatibility
//! escape hatch.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::event::{Event, now_ms};
use crate::rooms::{attendance_room, normalize_id};
use crate::services::attendance::{self, DayStatus};
use crate::services::calls::{self, CreateCall};
use crate::services::chat::{client_event_name, mutates_membership};
use crate::state::AppState;

type BridgeResponse = (StatusCode, Json<Value>);

pub async fn handle_emit(State(state): State<AppState>, Json(body): Json<Value>) -> BridgeResponse {
    if body.get("event").is_some() {
        inject_event(&state, &body).await
    } else if body.get("meet_url").is_some()
        || body.get("participants").is_some()
        || body.get("admin_id").is_some()
    {
        inject_call(&state, body).await
    } else {
        bad_request("expected {event, data} or a meet call payload")
    }
}

// =============================================================================
// SHAPE (a): MEET CALL CREATION
// =============================================================================

async fn inject_call(state: &AppState, body: Value) -> BridgeResponse {
    let req: CreateCall = match serde_json::from_value(body) {
        Ok(req) => req,
        Err(e) => return bad_request(&format!("invalid call payload: {e}")),
    };

    match calls::create_call(state, req).await {
        Ok(call) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "call_id": call.call_id,
                "participants": call.participants,
            })),
        ),
        Err(e) => bad_request(&e.to_string()),
    }
}

// =============================================================================
// SHAPE (b): NAMED EVENT FAN-OUT
// =============================================================================

async fn inject_event(state: &AppState, body: &Value) -> BridgeResponse {
    let Some(name) = body.get("event").and_then(Value::as_str) else {
        return bad_request("event must be a string");
    };
    let data = body.get("data").cloned().unwrap_or_else(|| json!({}));

    match name {
        "attendance:checkin" | "attendance:checkout" | "attendance:status-update" => {
            inject_attendance(state, name, &data).await
        }
        _ => inject_named(state, name, data).await,
    }
}

/// Attendance injections update the timer store before fanning out, keeping
/// the store authoritative for request-sync from any device.
async fn inject_attendance(state: &AppState, name: &str, data: &Value) -> BridgeResponse {
    let Some(employee_id) = data
        .get("employee_id")
        .and_then(Value::as_str)
        .map(normalize_id)
        .filter(|id| !id.is_empty())
    else {
        return bad_request("employee_id is required");
    };

    match name {
        "attendance:checkin" => {
            attendance::handle_check_in(
                state,
                &employee_id,
                data.get("checkinTimestamp").and_then(Value::as_i64),
                data.get("baseSeconds").and_then(Value::as_i64),
                now_ms(),
            )
            .await;
        }
        "attendance:checkout" => {
            let status = data
                .get("status")
                .and_then(Value::as_str)
                .and_then(DayStatus::parse);
            attendance::handle_check_out(
                state,
                &employee_id,
                data.get("totalSeconds").and_then(Value::as_i64).unwrap_or(0),
                status,
                now_ms(),
            )
            .await;
        }
        _ => {
            let Some(status) = data
                .get("status")
                .and_then(Value::as_str)
                .and_then(DayStatus::parse)
            else {
                return bad_request("status must be one of A, HL, P");
            };
            state.timers.write().await.apply_status(&employee_id, status);
            let event = Event::new(
                "attendance:status-update",
                json!({
                    "employee_id": employee_id,
                    "status": status,
                    "totalSeconds": data.get("totalSeconds").and_then(Value::as_i64),
                    "serverNow": now_ms(),
                }),
            );
            state
                .rooms
                .read()
                .await
                .emit_to_room(&attendance_room(&employee_id), &event, None);
        }
    }
    ok()
}

async fn inject_named(state: &AppState, name: &str, data: Value) -> BridgeResponse {
    let mapped = client_event_name(name);
    let conversation_id = data
        .get("conversation_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    if mutates_membership(name) {
        if let Some(conversation_id) = &conversation_id {
            state.chat.write().await.invalidate_members(conversation_id);
        }
    }

    // conversation_created carries a members array: deliver to each
    // member's personal room, since nobody has joined the new room yet.
    if name == "conversation_created" {
        if let Some(members) = data.get("members").and_then(Value::as_array) {
            let member_ids: Vec<String> = members
                .iter()
                .filter_map(Value::as_str)
                .map(normalize_id)
                .collect();
            let event = Event::new(mapped, data);
            let rooms = state.rooms.read().await;
            for member_id in &member_ids {
                rooms.emit_to_user(member_id, &event);
            }
            info!(event = name, members = member_ids.len(), "bridge: per-member fan-out");
            return ok();
        }
    }

    let event = Event::new(mapped, data);
    let rooms = state.rooms.read().await;
    match &conversation_id {
        Some(conversation_id) => {
            info!(event = name, mapped, conversation_id, "bridge: conversation fan-out");
            rooms.emit_to_room(conversation_id, &event, None);
        }
        None => {
            if mapped == name && !is_known_event(name) {
                warn!(event = name, "bridge: unknown event broadcast raw");
            } else {
                info!(event = name, mapped, "bridge: broadcast fan-out");
            }
            rooms.broadcast(&event);
        }
    }
    ok()
}

// =============================================================================
// HELPERS
// =============================================================================

fn is_known_event(name: &str) -> bool {
    matches!(
        name,
        "new_message"
            | "message_edited"
            | "message_deleted"
            | "message_status_update"
            | "conversation_created"
            | "conversation_deleted"
            | "chat_presence"
            | "user_presence"
            | "typing"
            | "stop_typing"
    )
}

fn ok() -> BridgeResponse {
    (StatusCode::OK, Json(json!({"success": true})))
}

fn bad_request(error: &str) -> BridgeResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"success": false, "error": error})),
    )
}

#[cfg(test)]
#[path = "emit_test.rs"]
mod tests;
