//! WebSocket handler — event dispatch for the realtime hub.
//!
//! DESIGN
//! ======
//! On upgrade, generates a session id and enters a `select!` loop:
//! - Incoming client events → parse + dispatch by event name
//! - Fan-out events from the registries → forward to the client
//!
//! Handlers run to completion per session; every identifier is normalized
//! right here, at the dispatch boundary, before it reaches a service.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → session registered in the room registry
//! 2. Client sends `register` / `chat_register` → personal room joined,
//!    presence online broadcast on the user's first session
//! 3. Named events → attendance / calls / chat services
//! 4. Close → removed from all rooms; presence offline broadcast when the
//!    user's last session is gone

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::event::{Event, now_ms};
use crate::rooms::{Role, attendance_room, normalize_id};
use crate::services::attendance::DayStatus;
use crate::services::calls::ParticipantStatus;
use crate::services::{attendance, calls, chat};
use crate::state::AppState;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4();

    // Per-session channel for receiving fan-out events.
    let (tx, mut rx) = mpsc::channel::<Event>(256);
    state.rooms.write().await.connect(session_id, tx);
    info!(%session_id, "ws: session connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        process_event(&state, session_id, &text).await;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(event) = rx.recv() => {
                let Ok(json) = serde_json::to_string(&event) else { continue };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    let offline = state.rooms.write().await.disconnect(session_id, now_ms());
    if let Some(offline) = offline {
        let presence = Event::new(
            "user_presence",
            json!({
                "user_id": offline.user_id,
                "online": false,
                "lastSeen": offline.last_seen_ms,
            }),
        );
        state.rooms.read().await.broadcast(&presence);
    }
    info!(%session_id, "ws: session disconnected");
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Parse one inbound text frame and dispatch on the event name.
///
/// Kept free of socket types so tests can exercise dispatch end-to-end and
/// observe fan-out through the registry channels.
pub(crate) async fn process_event(state: &AppState, session_id: Uuid, text: &str) {
    let inbound: Event = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            warn!(%session_id, error = %e, "ws: invalid inbound event");
            return;
        }
    };

    let name = inbound.event.as_str();
    if name != "typing" && name != "stop_typing" {
        debug!(%session_id, event = name, "ws: recv event");
    }

    match name {
        "register" | "chat_register" => handle_register(state, session_id, &inbound).await,
        "attendance:register" => handle_attendance_register(state, session_id, &inbound).await,
        "attendance:request-sync" => {
            if let Some(employee_id) = normalized_field(&inbound, "employee_id") {
                attendance::handle_request_sync(state, session_id, &employee_id, now_ms()).await;
            }
        }
        "attendance:checkin" => {
            if let Some(employee_id) = normalized_field(&inbound, "employee_id") {
                attendance::handle_check_in(
                    state,
                    &employee_id,
                    inbound.i64_field("checkinTimestamp"),
                    inbound.i64_field("baseSeconds"),
                    now_ms(),
                )
                .await;
            }
        }
        "attendance:checkout" => {
            if let Some(employee_id) = normalized_field(&inbound, "employee_id") {
                let status = inbound.str_field("status").and_then(DayStatus::parse);
                attendance::handle_check_out(
                    state,
                    &employee_id,
                    inbound.i64_field("totalSeconds").unwrap_or(0),
                    status,
                    now_ms(),
                )
                .await;
            }
        }
        "call:accepted" => handle_call_answer(state, &inbound, ParticipantStatus::Accepted).await,
        "call:declined" => handle_call_answer(state, &inbound, ParticipantStatus::Declined).await,
        "call:cancel" => {
            let (Some(call_id), Some(admin_id)) =
                (inbound.str_field("call_id"), inbound.str_field("admin_id"))
            else {
                return;
            };
            calls::cancel_call(state, call_id, admin_id, "cancelled by admin").await;
        }
        "join_room" => {
            if let Some(conversation_id) = inbound.str_field("conversation_id") {
                state.rooms.write().await.join(session_id, conversation_id);
            }
        }
        "leave_room" => {
            if let Some(conversation_id) = inbound.str_field("conversation_id") {
                state.rooms.write().await.leave(session_id, conversation_id);
            }
        }
        "send_message" | "send_file" => {
            let sender_id = match sender_of(state, session_id, &inbound).await {
                Some(sender_id) => sender_id,
                None => {
                    warn!(%session_id, "ws: message from unbound session dropped");
                    return;
                }
            };
            chat::send_message(state, &sender_id, &inbound.data, name == "send_file").await;
        }
        "message_received" => {
            let (Some(message_id), Some(conversation_id), Some(user_id)) = (
                inbound.str_field("message_id"),
                inbound.str_field("conversation_id"),
                normalized_field(&inbound, "user_id"),
            ) else {
                return;
            };
            chat::message_received(state, message_id, conversation_id, &user_id).await;
        }
        "mark_read" => {
            let (Some(conversation_id), Some(user_id)) = (
                inbound.str_field("conversation_id"),
                normalized_field(&inbound, "user_id"),
            ) else {
                return;
            };
            let message_ids = inbound
                .data
                .get("message_ids")
                .and_then(Value::as_array)
                .map(|ids| {
                    ids.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            chat::mark_read(state, conversation_id, &user_id, message_ids).await;
        }
        "edit_message" | "delete_message" => {
            if let Some(conversation_id) = inbound.str_field("conversation_id") {
                let out = if name == "edit_message" { "message_edited" } else { "message_deleted" };
                chat::relay_to_conversation(state, out, conversation_id, inbound.data.clone(), None).await;
            }
        }
        "group_add_members" | "group_remove_members" | "rename_group" | "leave_conversation" => {
            if let Some(conversation_id) = inbound.str_field("conversation_id") {
                if name == "leave_conversation" {
                    state.rooms.write().await.leave(session_id, conversation_id);
                }
                chat::group_event(state, name, conversation_id, inbound.data.clone()).await;
            }
        }
        "typing" | "stop_typing" => {
            if let Some(conversation_id) = inbound.str_field("conversation_id") {
                chat::relay_to_conversation(
                    state,
                    name,
                    conversation_id,
                    inbound.data.clone(),
                    Some(session_id),
                )
                .await;
            }
        }
        "subscribe_presence" => handle_subscribe_presence(state, session_id, &inbound).await,
        other => {
            warn!(%session_id, event = other, "ws: unknown event ignored");
        }
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn handle_register(state: &AppState, session_id: Uuid, inbound: &Event) {
    let Some(raw) = inbound
        .str_field("user_id")
        .or_else(|| inbound.str_field("employee_id"))
    else {
        return;
    };
    let role = match inbound.str_field("role") {
        Some("admin") => Role::Admin,
        _ => Role::Employee,
    };

    let outcome = state.rooms.write().await.bind(session_id, raw, role);
    let rooms = state.rooms.read().await;
    if let Some(user_id) = outcome.now_offline {
        let presence = Event::new(
            "user_presence",
            json!({"user_id": user_id, "online": false, "lastSeen": now_ms()}),
        );
        rooms.broadcast(&presence);
    }
    if let Some(user_id) = outcome.now_online {
        let presence = Event::new("user_presence", json!({"user_id": user_id, "online": true}));
        rooms.broadcast(&presence);
    }
}

/// Join the attendance room for this employee and reply with the current
/// sync envelope so a fresh device resumes a running timer.
async fn handle_attendance_register(state: &AppState, session_id: Uuid, inbound: &Event) {
    let Some(employee_id) = normalized_field(inbound, "employee_id") else {
        return;
    };
    state
        .rooms
        .write()
        .await
        .join(session_id, &attendance_room(&employee_id));
    attendance::handle_request_sync(state, session_id, &employee_id, now_ms()).await;
}

async fn handle_call_answer(state: &AppState, inbound: &Event, status: ParticipantStatus) {
    let Some(call_id) = inbound.str_field("call_id") else {
        return;
    };
    let employee_id = normalized_field(inbound, "employee_id");
    let email = inbound.str_field("email").map(str::trim);
    calls::update_participant(state, call_id, employee_id.as_deref(), email, status).await;
}

/// Reply privately with the online subset of the requested user ids.
async fn handle_subscribe_presence(state: &AppState, session_id: Uuid, inbound: &Event) {
    let requested = inbound
        .data
        .get("user_ids")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(normalize_id)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let rooms = state.rooms.read().await;
    let online: Vec<&String> = requested.iter().filter(|id| rooms.is_online(id)).collect();
    let snapshot = Event::new("chat_presence", json!({ "online": online }));
    rooms.emit_to_session(session_id, &snapshot);
}

// =============================================================================
// HELPERS
// =============================================================================

fn normalized_field(event: &Event, key: &str) -> Option<String> {
    event
        .str_field(key)
        .map(normalize_id)
        .filter(|id| !id.is_empty())
}

/// Sender identity: the payload's `sender_id` when present, otherwise the
/// user the session registered as.
async fn sender_of(state: &AppState, session_id: Uuid, inbound: &Event) -> Option<String> {
    if let Some(sender) = normalized_field(inbound, "sender_id") {
        return Some(sender);
    }
    state
        .rooms
        .read()
        .await
        .user_of(session_id)
        .map(str::to_string)
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
