//! Inbound "article viewed" notification.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One delivered event record.
///
/// The engine reads only `body`, which carries the raw article identifier.
/// `message_id` is the transport handle used for acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewEvent {
    #[serde(default = "generate_message_id")]
    pub message_id: String,
    pub body: String,
}

impl ViewEvent {
    /// Creates an event with a freshly generated message id.
    pub fn new(body: impl Into<String>) -> Self {
        Self::with_message_id(generate_message_id(), body)
    }

    /// Creates an event with a transport-provided message id.
    pub fn with_message_id(message_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
        }
    }
}

fn generate_message_id() -> String {
    Uuid::new_v4().to_string()
}
