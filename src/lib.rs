//! Real-time attendance and call coordination hub.
//!
//! The hub fans events out to users across devices: attendance timers that
//! survive device switches, a ring/accept/decline/cancel call flow, a chat
//! relay, and an HTTP bridge the HR backend uses to inject events into the
//! socket room topology. The `client` module holds the browser-side state
//! machines as pure reducers.

pub mod client;
pub mod config;
pub mod event;
pub mod rooms;
pub mod routes;
pub mod services;
pub mod state;
