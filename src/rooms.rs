//! Room registry — sessions, rooms, and user reverse mappings.
//!
//! DESIGN
//! ======
//! Every transport session owns a bounded mpsc sender for outbound events.
//! The registry maps sessions to the rooms they have joined (personal room,
//! conversation rooms, attendance room) and users to their live sessions,
//! so a user with three devices receives three copies of a per-user emit.
//!
//! Identifier normalization (trim + uppercase) happens HERE and nowhere
//! else: downstream services assume normalized input.
//!
//! Delivery is best-effort `try_send` per receiver: a slow client drops
//! events rather than stalling fan-out for its peers.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::event::Event;

/// Canonical form of an opaque user identifier.
#[must_use]
pub fn normalize_id(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Name of the attendance fan-out room for one user's devices.
#[must_use]
pub fn attendance_room(user_id: &str) -> String {
    format!("attendance:{user_id}")
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Employee,
}

/// One live transport session.
pub struct Session {
    pub tx: mpsc::Sender<Event>,
    pub user_id: Option<String>,
    pub role: Role,
    pub rooms: HashSet<String>,
}

/// A user whose last session just disconnected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineUser {
    pub user_id: String,
    pub last_seen_ms: i64,
}

/// Presence changes produced by binding a session to a user.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BindOutcome {
    /// Normalized id when this is the user's first live session.
    pub now_online: Option<String>,
    /// User the session was previously bound to, when the rebind emptied
    /// their session set.
    pub now_offline: Option<String>,
}

#[derive(Default)]
pub struct RoomRegistry {
    sessions: HashMap<Uuid, Session>,
    rooms: HashMap<String, HashSet<Uuid>>,
    users: HashMap<String, HashSet<Uuid>>,
}

impl RoomRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new transport session.
    pub fn connect(&mut self, session_id: Uuid, tx: mpsc::Sender<Event>) {
        self.sessions.insert(
            session_id,
            Session { tx, user_id: None, role: Role::Employee, rooms: HashSet::new() },
        );
    }

    /// Bind a session to a user. Normalizes the id, joins the personal room,
    /// and records the reverse mapping. Idempotent per (session, user).
    ///
    /// Rebinding to a different user releases the old mapping first, so a
    /// reused socket never leaves its previous user looking online. The
    /// caller broadcasts presence for both sides of the outcome.
    pub fn bind(&mut self, session_id: Uuid, raw_user_id: &str, role: Role) -> BindOutcome {
        let user_id = normalize_id(raw_user_id);
        if user_id.is_empty() {
            return BindOutcome::default();
        }

        let Some(session) = self.sessions.get_mut(&session_id) else {
            return BindOutcome::default();
        };

        if session.user_id.as_deref() == Some(user_id.as_str()) {
            return BindOutcome::default();
        }

        let mut now_offline = None;
        if let Some(old) = session.user_id.take() {
            session.rooms.remove(&old);
            if let Some(members) = self.rooms.get_mut(&old) {
                members.remove(&session_id);
                if members.is_empty() {
                    self.rooms.remove(&old);
                }
            }
            if let Some(old_sessions) = self.users.get_mut(&old) {
                old_sessions.remove(&session_id);
                if old_sessions.is_empty() {
                    self.users.remove(&old);
                    info!(%session_id, user_id = %old, "rebind released last session; user offline");
                    now_offline = Some(old);
                }
            }
        }

        session.user_id = Some(user_id.clone());
        session.role = role;
        session.rooms.insert(user_id.clone());

        self.rooms.entry(user_id.clone()).or_default().insert(session_id);
        let user_sessions = self.users.entry(user_id.clone()).or_default();
        let first = user_sessions.is_empty();
        user_sessions.insert(session_id);

        info!(%session_id, %user_id, ?role, first, "session bound to user");
        BindOutcome { now_online: first.then_some(user_id), now_offline }
    }

    /// Join an arbitrary room (conversation or attendance).
    pub fn join(&mut self, session_id: Uuid, room: &str) {
        let Some(session) = self.sessions.get_mut(&session_id) else {
            return;
        };
        session.rooms.insert(room.to_string());
        self.rooms.entry(room.to_string()).or_default().insert(session_id);
        debug!(%session_id, room, "session joined room");
    }

    /// Leave a room. Empty rooms are evicted.
    pub fn leave(&mut self, session_id: Uuid, room: &str) {
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.rooms.remove(room);
        }
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(&session_id);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }

    /// Remove a session from all rooms and from the user reverse mapping.
    ///
    /// Returns the user that went offline when this was their last session.
    pub fn disconnect(&mut self, session_id: Uuid, now_ms: i64) -> Option<OfflineUser> {
        let session = self.sessions.remove(&session_id)?;

        for room in &session.rooms {
            if let Some(members) = self.rooms.get_mut(room) {
                members.remove(&session_id);
                if members.is_empty() {
                    self.rooms.remove(room);
                }
            }
        }

        let user_id = session.user_id?;
        let Some(user_sessions) = self.users.get_mut(&user_id) else {
            return None;
        };
        user_sessions.remove(&session_id);
        if user_sessions.is_empty() {
            self.users.remove(&user_id);
            info!(%session_id, %user_id, "last session gone; user offline");
            return Some(OfflineUser { user_id, last_seen_ms: now_ms });
        }
        None
    }

    /// Send to one session only.
    pub fn emit_to_session(&self, session_id: Uuid, event: &Event) {
        if let Some(session) = self.sessions.get(&session_id) {
            let _ = session.tx.try_send(event.clone());
        }
    }

    /// Send to every session of one user (expects a normalized id).
    pub fn emit_to_user(&self, user_id: &str, event: &Event) {
        let Some(session_ids) = self.users.get(user_id) else {
            return;
        };
        for session_id in session_ids {
            if let Some(session) = self.sessions.get(session_id) {
                let _ = session.tx.try_send(event.clone());
            }
        }
    }

    /// Send to every session in a room, optionally excluding one.
    pub fn emit_to_room(&self, room: &str, event: &Event, exclude: Option<Uuid>) {
        let Some(members) = self.rooms.get(room) else {
            return;
        };
        for session_id in members {
            if exclude == Some(*session_id) {
                continue;
            }
            if let Some(session) = self.sessions.get(session_id) {
                let _ = session.tx.try_send(event.clone());
            }
        }
    }

    /// Send to every live session.
    pub fn broadcast(&self, event: &Event) {
        for session in self.sessions.values() {
            let _ = session.tx.try_send(event.clone());
        }
    }

    /// The user a session is bound to, if any.
    #[must_use]
    pub fn user_of(&self, session_id: Uuid) -> Option<&str> {
        self.sessions
            .get(&session_id)
            .and_then(|s| s.user_id.as_deref())
    }

    /// Role of a session.
    #[must_use]
    pub fn role_of(&self, session_id: Uuid) -> Option<Role> {
        self.sessions.get(&session_id).map(|s| s.role)
    }

    /// Whether a user (normalized id) has at least one live session.
    #[must_use]
    pub fn is_online(&self, user_id: &str) -> bool {
        self.users.get(user_id).is_some_and(|s| !s.is_empty())
    }

    /// Session ids currently joined to a room.
    #[must_use]
    pub fn sessions_in_room(&self, room: &str) -> Vec<Uuid> {
        self.rooms
            .get(room)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "rooms_test.rs"]
mod tests;
