//! Client call controller — incoming-call overlay as a pure reducer.
//!
//! DESIGN
//! ======
//! One overlay at a time. A `call:ring` for a call the local user created
//! is suppressed while they are on the Meet page (the initiator does not
//! ring themselves). Browser autoplay policy requires the ringtone element
//! to be primed by a user gesture before `play()` is allowed, so the first
//! gesture returns a `PrimeRingtone` effect and rings before that point
//! show the overlay silently.

use serde::Deserialize;
use serde_json::json;

use crate::event::Event;
use crate::rooms::normalize_id;

/// The slice of a `call:ring` payload the overlay needs.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct IncomingCall {
    pub call_id: String,
    pub admin_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub meet_url: String,
}

#[derive(Clone, Debug)]
pub enum CallInput {
    /// Route change; the initiator suppression only applies on the Meet page.
    PageChanged { on_meet_page: bool },
    /// Any first user gesture (click, key) unlocks audio playback.
    UserGesture,
    Ring(IncomingCall),
    AcceptClick,
    DeclineClick,
    /// `call:cancelled` from the hub; `None` call id cancels whatever rings.
    Cancelled { call_id: Option<String> },
}

#[derive(Clone, Debug, PartialEq)]
pub enum CallEffect {
    PrimeRingtone,
    PlayRingtone,
    StopRingtone,
    ShowOverlay(IncomingCall),
    HideOverlay,
    Emit(Event),
    OpenMeetUrl(String),
}

#[derive(Clone, Debug)]
pub struct CallController {
    user_id: String,
    on_meet_page: bool,
    ringtone_primed: bool,
    active: Option<IncomingCall>,
}

impl CallController {
    #[must_use]
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: normalize_id(user_id),
            on_meet_page: false,
            ringtone_primed: false,
            active: None,
        }
    }

    #[must_use]
    pub fn active_call(&self) -> Option<&IncomingCall> {
        self.active.as_ref()
    }

    /// Apply one input and return the side effects to perform.
    pub fn apply(&mut self, input: CallInput) -> Vec<CallEffect> {
        match input {
            CallInput::PageChanged { on_meet_page } => {
                self.on_meet_page = on_meet_page;
                Vec::new()
            }
            CallInput::UserGesture => {
                if self.ringtone_primed {
                    return Vec::new();
                }
                self.ringtone_primed = true;
                vec![CallEffect::PrimeRingtone]
            }
            CallInput::Ring(call) => self.on_ring(call),
            CallInput::AcceptClick => self.on_accept(),
            CallInput::DeclineClick => self.on_decline(),
            CallInput::Cancelled { call_id } => self.on_cancelled(call_id),
        }
    }

    fn on_ring(&mut self, call: IncomingCall) -> Vec<CallEffect> {
        // Initiator on the Meet page does not ring themselves.
        if self.on_meet_page && normalize_id(&call.admin_id) == self.user_id {
            return Vec::new();
        }
        // Single overlay: a second ring while one is showing is dropped.
        if self.active.is_some() {
            return Vec::new();
        }

        let mut effects = vec![CallEffect::ShowOverlay(call.clone())];
        if self.ringtone_primed {
            effects.push(CallEffect::PlayRingtone);
        }
        self.active = Some(call);
        effects
    }

    fn on_accept(&mut self) -> Vec<CallEffect> {
        let Some(call) = self.active.take() else {
            return Vec::new();
        };
        vec![
            CallEffect::Emit(Event::new(
                "call:accepted",
                json!({"call_id": call.call_id, "employee_id": self.user_id}),
            )),
            CallEffect::StopRingtone,
            CallEffect::HideOverlay,
            CallEffect::OpenMeetUrl(call.meet_url),
        ]
    }

    fn on_decline(&mut self) -> Vec<CallEffect> {
        let Some(call) = self.active.take() else {
            return Vec::new();
        };
        vec![
            CallEffect::Emit(Event::new(
                "call:declined",
                json!({"call_id": call.call_id, "employee_id": self.user_id}),
            )),
            CallEffect::StopRingtone,
            CallEffect::HideOverlay,
        ]
    }

    fn on_cancelled(&mut self, call_id: Option<String>) -> Vec<CallEffect> {
        let Some(active) = &self.active else {
            return Vec::new();
        };
        if let Some(call_id) = &call_id {
            if call_id != &active.call_id {
                return Vec::new();
            }
        }
        self.active = None;
        vec![CallEffect::StopRingtone, CallEffect::HideOverlay]
    }
}

#[cfg(test)]
#[path = "call_test.rs"]
mod tests;
