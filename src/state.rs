//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! Each registry sits behind its own `Arc<RwLock<…>>`; handlers take a
//! lock, observe a consistent snapshot of the structure they touch, and
//! release it before any outbound I/O. Contention is low because every
//! handler is short and non-blocking.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::HubConfig;
use crate::rooms::RoomRegistry;
use crate::services::attendance::TimerStore;
use crate::services::backend::BackendClient;
use crate::services::calls::CallRegistry;
use crate::services::chat::ChatState;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum — all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<HubConfig>,
    pub rooms: Arc<RwLock<RoomRegistry>>,
    pub timers: Arc<RwLock<TimerStore>>,
    pub calls: Arc<RwLock<CallRegistry>>,
    pub chat: Arc<RwLock<ChatState>>,
    pub backend: BackendClient,
}

impl AppState {
    #[must_use]
    pub fn new(config: HubConfig, backend: BackendClient) -> Self {
        Self {
            config: Arc::new(config),
            rooms: Arc::new(RwLock::new(RoomRegistry::new())),
            timers: Arc::new(RwLock::new(TimerStore::new())),
            calls: Arc::new(RwLock::new(CallRegistry::new())),
            chat: Arc::new(RwLock::new(ChatState::new())),
            backend,
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
