//! Wire envelope for the realtime hub protocol.
//!
//! DESIGN
//! ======
//! Every message on the socket and on the `/emit` bridge is a named event
//! with a JSON payload: `{"event": "attendance:sync", "data": {...}}`.
//! Payloads stay `serde_json::Value` at the envelope level; services parse
//! the fields they own. Attendance events additionally stamp `serverNow`
//! (epoch ms) so clients can correct for clock drift.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single named event on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event name, e.g. `"attendance:sync"` or `"new_message"`.
    pub event: String,
    /// Arbitrary JSON payload.
    #[serde(default)]
    pub data: Value,
}

impl Event {
    /// Build an event with the given payload.
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self { event: event.into(), data }
    }

    /// Read a string field from the payload.
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Read an integer field from the payload.
    #[must_use]
    pub fn i64_field(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(Value::as_i64)
    }
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
