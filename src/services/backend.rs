//! HR backend HTTP client.
//!
//! DESIGN
//! ======
//! The hub persists nothing itself: attendance auto-status, chat messages,
//! and read receipts are delegated to the HR backend over HTTP. Calls on
//! the hot path are fire-and-forget (spawned, failures logged); only the
//! chat send path awaits the backend because the persisted message
//! descriptor is needed for the fan-out payload.
//!
//! ERROR HANDLING
//! ==============
//! Downstream unavailability never surfaces to other users. Callers log
//! failures and keep serving from in-memory state; the sweeper retries
//! implicitly on its next crossing.

use reqwest::Client;
use serde_json::{Value, json};
use tracing::warn;

use crate::config::HubConfig;
use crate::services::attendance::DayStatus;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected backend response shape: {0}")]
    Shape(&'static str),
}

/// Typed client for the small set of HR backend endpoints the hub consumes.
#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
}

impl BackendClient {
    /// Build a client with the configured request/connect timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &HubConfig) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.backend_timeout_secs))
            .connect_timeout(std::time::Duration::from_secs(config.backend_connect_timeout_secs))
            .build()?;
        Ok(Self { http, base_url: config.backend_url.clone() })
    }

    /// Persist a sweeper status transition.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects it.
    pub async fn post_auto_status(
        &self,
        employee_id: &str,
        status: DayStatus,
        total_seconds: i64,
    ) -> Result<(), BackendError> {
        self.http
            .post(format!("{}/api/attendance/auto-status", self.base_url))
            .json(&json!({
                "employeeId": employee_id,
                "status": status,
                "totalSeconds": total_seconds,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Persist a text message; returns the stored message descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects it.
    pub async fn send_text(&self, payload: &Value) -> Result<Value, BackendError> {
        let descriptor = self
            .http
            .post(format!("{}/api/chat/messages", self.base_url))
            .json(payload)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(descriptor)
    }

    /// Persist a file message; returns the stored message descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects it.
    pub async fn send_file(&self, payload: &Value) -> Result<Value, BackendError> {
        let descriptor = self
            .http
            .post(format!("{}/api/chat/messages/file", self.base_url))
            .json(payload)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(descriptor)
    }

    /// Look up the member ids of a conversation, normalized at this
    /// boundary like every other identifier ingress.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response has no
    /// `members` array.
    pub async fn conversation_members(&self, conversation_id: &str) -> Result<Vec<String>, BackendError> {
        let body = self
            .http
            .get(format!("{}/api/conversations/{conversation_id}/members", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        let members = body
            .get("members")
            .and_then(Value::as_array)
            .ok_or(BackendError::Shape("missing members array"))?;
        Ok(members
            .iter()
            .filter_map(Value::as_str)
            .map(crate::rooms::normalize_id)
            .collect())
    }

    /// Forward a read receipt.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects it.
    pub async fn mark_read(
        &self,
        conversation_id: &str,
        user_id: &str,
        message_ids: &[String],
    ) -> Result<(), BackendError> {
        self.http
            .post(format!("{}/api/chat/mark-read", self.base_url))
            .json(&json!({
                "conversationId": conversation_id,
                "userId": user_id,
                "messageIds": message_ids,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Spawn a fire-and-forget auto-status persist. Failures are logged; the
/// in-memory timer state is already updated and is never rolled back.
pub fn spawn_auto_status(backend: BackendClient, employee_id: String, status: DayStatus, total_seconds: i64) {
    tokio::spawn(async move {
        if let Err(e) = backend.post_auto_status(&employee_id, status, total_seconds).await {
            warn!(error = %e, employee_id, "auto-status persist failed");
        }
    });
}

/// Spawn a fire-and-forget read-receipt forward.
pub fn spawn_mark_read(backend: BackendClient, conversation_id: String, user_id: String, message_ids: Vec<String>) {
    tokio::spawn(async move {
        if let Err(e) = backend.mark_read(&conversation_id, &user_id, &message_ids).await {
            warn!(error = %e, conversation_id, "mark-read forward failed");
        }
    });
}
