//! Call registry — ring/accept/decline/cancel with participant rosters.
//!
//! DESIGN
//! ======
//! Calls are created by the HTTP bridge and live in memory for the life of
//! the process (cancelled calls are purged). Each participant moves from
//! `ringing` to exactly one terminal status; terminal statuses are sticky
//! and later transitions are ignored.
//!
//! Ring fan-out targets each participant's personal room. Participants
//! identified only by email stay in the roster but cannot be rung directly
//! (personal rooms are keyed by employee id).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::event::Event;
use crate::rooms::normalize_id;
use crate::state::AppState;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("admin_id is required")]
    MissingAdmin,
    #[error("meet_url is required")]
    MissingMeetUrl,
    #[error("participants are required")]
    NoParticipants,
    #[error("call not found: {0}")]
    NotFound(String),
    #[error("only the call admin may cancel")]
    NotAdmin,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    #[default]
    Ringing,
    Accepted,
    Declined,
    Cancelled,
}

impl ParticipantStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Ringing)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Participant {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub status: ParticipantStatus,
}

/// Locate a roster entry: a whole pass over employee ids first, then a
/// pass over emails, so an exact employee-id match always wins over an
/// earlier email-only match.
fn participant_index(
    participants: &[Participant],
    employee_id: Option<&str>,
    email: Option<&str>,
) -> Option<usize> {
    if let Some(employee_id) = employee_id {
        if let Some(i) = participants
            .iter()
            .position(|p| p.employee_id.as_deref() == Some(employee_id))
        {
            return Some(i);
        }
    }
    if let Some(email) = email {
        if let Some(i) = participants
            .iter()
            .position(|p| p.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)))
        {
            return Some(i);
        }
    }
    None
}

#[derive(Clone, Debug, Serialize)]
pub struct Call {
    pub call_id: String,
    pub admin_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub meet_url: String,
    pub participants: Vec<Participant>,
}

/// Create-call request, deserialized straight from the `/emit` body.
#[derive(Clone, Debug, Deserialize)]
pub struct CreateCall {
    pub call_id: Option<String>,
    pub admin_id: Option<String>,
    pub title: Option<String>,
    pub meet_url: Option<String>,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Default)]
pub struct CallRegistry {
    calls: HashMap<String, Call>,
}

impl CallRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a new call. Ids are normalized here; a missing
    /// call id gets a fresh UUID.
    ///
    /// # Errors
    ///
    /// Returns a validation error when admin id, meet URL, or participants
    /// are missing. Nothing is stored on error.
    pub fn create(&mut self, req: CreateCall) -> Result<Call, CallError> {
        let admin_id = req
            .admin_id
            .as_deref()
            .map(normalize_id)
            .filter(|s| !s.is_empty())
            .ok_or(CallError::MissingAdmin)?;
        let meet_url = req
            .meet_url
            .filter(|s| !s.trim().is_empty())
            .ok_or(CallError::MissingMeetUrl)?;
        if req.participants.is_empty() {
            return Err(CallError::NoParticipants);
        }

        let participants = req
            .participants
            .into_iter()
            .map(|p| Participant {
                employee_id: p.employee_id.as_deref().map(normalize_id).filter(|s| !s.is_empty()),
                email: p.email.map(|e| e.trim().to_string()).filter(|s| !s.is_empty()),
                status: p.status,
            })
            .filter(|p| p.employee_id.is_some() || p.email.is_some())
            .collect::<Vec<_>>();
        if participants.is_empty() {
            return Err(CallError::NoParticipants);
        }

        let call = Call {
            call_id: req.call_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            admin_id,
            title: req.title,
            meet_url,
            participants,
        };
        self.calls.insert(call.call_id.clone(), call.clone());
        Ok(call)
    }

    /// Move a participant out of `ringing`. Matches by employee id first,
    /// then email; unknown participants are appended with the new status.
    /// Terminal statuses are never overwritten.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown call id.
    pub fn update_status(
        &mut self,
        call_id: &str,
        employee_id: Option<&str>,
        email: Option<&str>,
        new_status: ParticipantStatus,
    ) -> Result<Call, CallError> {
        let call = self
            .calls
            .get_mut(call_id)
            .ok_or_else(|| CallError::NotFound(call_id.to_string()))?;

        match participant_index(&call.participants, employee_id, email) {
            Some(i) => {
                let participant = &mut call.participants[i];
                if !participant.status.is_terminal() {
                    participant.status = new_status;
                }
            }
            None => call.participants.push(Participant {
                employee_id: employee_id.map(str::to_string),
                email: email.map(str::to_string),
                status: new_status,
            }),
        }
        Ok(call.clone())
    }

    /// Cancel a call: requires the requester to be the admin. Marks every
    /// non-terminal participant cancelled and removes the call.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown call id and `NotAdmin` when the
    /// requester does not match the stored admin id.
    pub fn cancel(&mut self, call_id: &str, requested_by: &str) -> Result<Call, CallError> {
        let call = self
            .calls
            .get_mut(call_id)
            .ok_or_else(|| CallError::NotFound(call_id.to_string()))?;
        if !call.admin_id.eq_ignore_ascii_case(requested_by.trim()) {
            return Err(CallError::NotAdmin);
        }

        for participant in &mut call.participants {
            if !participant.status.is_terminal() {
                participant.status = ParticipantStatus::Cancelled;
            }
        }
        let finished = call.clone();
        self.calls.remove(call_id);
        Ok(finished)
    }

    #[must_use]
    pub fn get(&self, call_id: &str) -> Option<&Call> {
        self.calls.get(call_id)
    }
}

// =============================================================================
// FAN-OUT
// =============================================================================

/// Create a call and ring every addressable participant's personal room.
///
/// # Errors
///
/// Propagates registry validation errors; no event is emitted on error.
pub async fn create_call(state: &AppState, req: CreateCall) -> Result<Call, CallError> {
    let call = {
        let mut calls = state.calls.write().await;
        calls.create(req)?
    };
    info!(call_id = %call.call_id, admin_id = %call.admin_id, participants = call.participants.len(), "call created");

    let rooms = state.rooms.read().await;
    for participant in &call.participants {
        let target = participant
            .employee_id
            .clone()
            .or_else(|| participant.email.clone())
            .unwrap_or_default();
        let ring = Event::new(
            "call:ring",
            json!({
                "call_id": call.call_id,
                "admin_id": call.admin_id,
                "title": call.title,
                "meet_url": call.meet_url,
                "participants": call.participants,
                "target": target,
            }),
        );
        if let Some(employee_id) = &participant.employee_id {
            rooms.emit_to_user(employee_id, &ring);
        }
    }
    Ok(call)
}

/// Apply an accept/decline and push the full roster to the admin's
/// personal room. Unknown call ids are dropped with a debug log (the call
/// may have been cancelled while the answer was in flight).
pub async fn update_participant(
    state: &AppState,
    call_id: &str,
    employee_id: Option<&str>,
    email: Option<&str>,
    new_status: ParticipantStatus,
) {
    let updated = {
        let mut calls = state.calls.write().await;
        calls.update_status(call_id, employee_id, email, new_status)
    };
    let call = match updated {
        Ok(call) => call,
        Err(e) => {
            debug!(call_id, error = %e, "participant update dropped");
            return;
        }
    };

    let event = Event::new(
        "call:participant-update",
        json!({
            "call_id": call.call_id,
            "participants": call.participants,
        }),
    );
    let rooms = state.rooms.read().await;
    rooms.emit_to_user(&call.admin_id, &event);
}

/// Cancel a call: final roster update to the admin, `call:cancelled` to the
/// admin and every participant, then purge. A requester that is not the
/// admin is rejected silently.
pub async fn cancel_call(state: &AppState, call_id: &str, requested_by: &str, reason: &str) {
    let cancelled = {
        let mut calls = state.calls.write().await;
        calls.cancel(call_id, requested_by)
    };
    let call = match cancelled {
        Ok(call) => call,
        Err(e) => {
            debug!(call_id, requested_by, error = %e, "cancel rejected");
            return;
        }
    };
    info!(call_id = %call.call_id, admin_id = %call.admin_id, "call cancelled");

    let roster = Event::new(
        "call:participant-update",
        json!({
            "call_id": call.call_id,
            "participants": call.participants,
        }),
    );
    let cancelled_event = Event::new(
        "call:cancelled",
        json!({
            "call_id": call.call_id,
            "admin_id": call.admin_id,
            "reason": reason,
        }),
    );

    let rooms = state.rooms.read().await;
    rooms.emit_to_user(&call.admin_id, &roster);
    rooms.emit_to_user(&call.admin_id, &cancelled_event);
    for participant in &call.participants {
        if let Some(employee_id) = &participant.employee_id {
            rooms.emit_to_user(employee_id, &cancelled_event);
        }
    }
}

#[cfg(test)]
#[path = "calls_test.rs"]
mod tests;
