//! Client-side state machines.
//!
//! These reducers are the browser-facing contracts consumed by the web
//! shell: all reconciliation rules live here as pure state transitions,
//! and DOM/storage/audio side effects are returned as values.

pub mod call;
pub mod timer;
