//! Chat relay — delivery acks, read receipts, and group event fan-out.
//!
//! DESIGN
//! ======
//! All chat persistence is delegated to the HR backend. The relay keeps
//! three transient structures: a conversation→members cache (invalidated by
//! any group mutation), a message→ack-set map used to compute "delivered"
//! once every non-sender member has acknowledged, and a message→sender map
//! so acks can exclude the sender. The two per-message maps share one
//! recency bound and are evicted together.
//!
//! The send path is the only one that awaits the backend: the persisted
//! message descriptor is the fan-out payload. Read receipts are forwarded
//! fire-and-forget.

use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::{Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::event::Event;
use crate::services::backend::spawn_mark_read;
use crate::state::AppState;

/// Recency bound for per-message bookkeeping (sender and ack maps).
const MESSAGE_CACHE_CAP: usize = 4096;

// =============================================================================
// STATE
// =============================================================================

#[derive(Default)]
pub struct ChatState {
    /// conversation_id → member ids (normalized).
    members: HashMap<String, Vec<String>>,
    /// message_id → users that have acknowledged delivery.
    deliveries: HashMap<String, HashSet<String>>,
    /// message_id → sender id.
    senders: HashMap<String, String>,
    /// Message ids in first-seen order. Both per-message maps are evicted
    /// from the front past the cap, so ack sets for messages whose sender
    /// is never learned (bridge-injected) cannot accumulate.
    recency: VecDeque<String>,
}

impl ChatState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember who sent a message. Oldest messages are evicted past the cap.
    pub fn remember_sender(&mut self, message_id: &str, sender_id: &str) {
        self.track(message_id);
        self.senders
            .insert(message_id.to_string(), sender_id.to_string());
        self.evict_past_cap();
    }

    #[must_use]
    pub fn sender_of(&self, message_id: &str) -> Option<&str> {
        self.senders.get(message_id).map(String::as_str)
    }

    /// Record a delivery ack. Returns the current ack set size.
    pub fn record_ack(&mut self, message_id: &str, user_id: &str) -> usize {
        self.track(message_id);
        let acks = self.deliveries.entry(message_id.to_string()).or_default();
        acks.insert(user_id.to_string());
        let len = acks.len();
        self.evict_past_cap();
        len
    }

    /// Enter a message into the recency order on first sight.
    fn track(&mut self, message_id: &str) {
        if !self.senders.contains_key(message_id) && !self.deliveries.contains_key(message_id) {
            self.recency.push_back(message_id.to_string());
        }
    }

    fn evict_past_cap(&mut self) {
        while self.recency.len() > MESSAGE_CACHE_CAP {
            if let Some(evicted) = self.recency.pop_front() {
                self.senders.remove(&evicted);
                self.deliveries.remove(&evicted);
            }
        }
    }

    #[must_use]
    pub fn acks(&self, message_id: &str) -> Option<&HashSet<String>> {
        self.deliveries.get(message_id)
    }

    /// Drop the ack set once delivery has been announced.
    pub fn clear_acks(&mut self, message_id: &str) {
        self.deliveries.remove(message_id);
    }

    #[must_use]
    pub fn cached_members(&self, conversation_id: &str) -> Option<&Vec<String>> {
        self.members.get(conversation_id)
    }

    pub fn set_members(&mut self, conversation_id: &str, members: Vec<String>) {
        self.members.insert(conversation_id.to_string(), members);
    }

    /// Invalidate the member cache after a group mutation.
    pub fn invalidate_members(&mut self, conversation_id: &str) {
        self.members.remove(conversation_id);
    }
}

// =============================================================================
// EVENT NAME MAPPING
// =============================================================================

/// Map an inbound (client or bridge) event name to the client event name
/// the frontend listens for. Names outside the map pass through unchanged.
#[must_use]
pub fn client_event_name(inbound: &str) -> &str {
    match inbound {
        "group_add_members" => "group_members_added",
        "group_remove_members" => "group_members_removed",
        "rename_group" => "group_renamed",
        "group_deleted" => "conversation_deleted",
        "leave_conversation" => "user_left_conversation",
        other => other,
    }
}

/// Whether an event name mutates group membership (and therefore
/// invalidates the members cache).
#[must_use]
pub fn mutates_membership(inbound: &str) -> bool {
    matches!(
        inbound,
        "group_add_members"
            | "group_remove_members"
            | "rename_group"
            | "group_deleted"
            | "leave_conversation"
            | "conversation_deleted"
    )
}

// =============================================================================
// RELAY
// =============================================================================

/// Forward a text or file message to the HR backend, remember the sender,
/// and emit `new_message` with the persisted descriptor to the conversation
/// room. On backend failure nothing is emitted; the sender's own UI
/// surfaces the error.
pub async fn send_message(state: &AppState, sender_id: &str, payload: &Value, file: bool) {
    let result = if file {
        state.backend.send_file(payload).await
    } else {
        state.backend.send_text(payload).await
    };
    let descriptor = match result {
        Ok(descriptor) => descriptor,
        Err(e) => {
            warn!(error = %e, sender_id, "message persist failed; not relayed");
            return;
        }
    };

    let message_id = descriptor_id(&descriptor);
    let conversation_id = descriptor
        .get("conversation_id")
        .or_else(|| payload.get("conversation_id"))
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(message_id) = &message_id {
        let mut chat = state.chat.write().await;
        chat.remember_sender(message_id, sender_id);
    }

    let Some(conversation_id) = conversation_id else {
        debug!(sender_id, "message descriptor has no conversation_id; not relayed");
        return;
    };
    let event = Event::new("new_message", descriptor);
    let rooms = state.rooms.read().await;
    rooms.emit_to_room(&conversation_id, &event, None);
}

/// Record a delivery ack. When every non-sender member of the conversation
/// has acknowledged, emit a `delivered` status update to the room.
pub async fn message_received(state: &AppState, message_id: &str, conversation_id: &str, user_id: &str) {
    {
        let mut chat = state.chat.write().await;
        chat.record_ack(message_id, user_id);
    }

    let members = match conversation_members(state, conversation_id).await {
        Some(members) => members,
        None => return,
    };

    let delivered = {
        let chat = state.chat.read().await;
        let sender = chat.sender_of(message_id);
        let Some(acks) = chat.acks(message_id) else {
            return;
        };
        members
            .iter()
            .filter(|m| Some(m.as_str()) != sender)
            .all(|m| acks.contains(m))
    };
    if !delivered {
        return;
    }

    {
        let mut chat = state.chat.write().await;
        chat.clear_acks(message_id);
    }
    let event = Event::new(
        "message_status_update",
        json!({
            "message_id": message_id,
            "conversation_id": conversation_id,
            "status": "delivered",
        }),
    );
    let rooms = state.rooms.read().await;
    rooms.emit_to_room(conversation_id, &event, None);
}

/// Fan out `seen` per message and forward the receipt fire-and-forget.
pub async fn mark_read(state: &AppState, conversation_id: &str, user_id: &str, message_ids: Vec<String>) {
    {
        let rooms = state.rooms.read().await;
        for message_id in &message_ids {
            let event = Event::new(
                "message_status_update",
                json!({
                    "message_id": message_id,
                    "conversation_id": conversation_id,
                    "status": "seen",
                    "user_id": user_id,
                }),
            );
            rooms.emit_to_room(conversation_id, &event, None);
        }
    }
    spawn_mark_read(
        state.backend.clone(),
        conversation_id.to_string(),
        user_id.to_string(),
        message_ids,
    );
}

/// Handle a group mutation: invalidate the members cache and rebroadcast
/// under the client event name.
pub async fn group_event(state: &AppState, inbound_name: &str, conversation_id: &str, data: Value) {
    if mutates_membership(inbound_name) {
        let mut chat = state.chat.write().await;
        chat.invalidate_members(conversation_id);
    }
    let event = Event::new(client_event_name(inbound_name), data);
    let rooms = state.rooms.read().await;
    rooms.emit_to_room(conversation_id, &event, None);
}

/// Relay an ephemeral event (typing, stop_typing) to the conversation room
/// excluding the sender's session.
pub async fn relay_to_conversation(state: &AppState, event_name: &str, conversation_id: &str, data: Value, exclude: Option<Uuid>) {
    let event = Event::new(event_name, data);
    let rooms = state.rooms.read().await;
    rooms.emit_to_room(conversation_id, &event, exclude);
}

// =============================================================================
// HELPERS
// =============================================================================

/// Cache-first member lookup; fetches from the HR backend on a miss.
async fn conversation_members(state: &AppState, conversation_id: &str) -> Option<Vec<String>> {
    {
        let chat = state.chat.read().await;
        if let Some(members) = chat.cached_members(conversation_id) {
            return Some(members.clone());
        }
    }
    match state.backend.conversation_members(conversation_id).await {
        Ok(members) => {
            let mut chat = state.chat.write().await;
            chat.set_members(conversation_id, members.clone());
            Some(members)
        }
        Err(e) => {
            warn!(error = %e, conversation_id, "member lookup failed; delivery check skipped");
            None
        }
    }
}

fn descriptor_id(descriptor: &Value) -> Option<String> {
    ["message_id", "_id", "id"]
        .iter()
        .find_map(|key| descriptor.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
