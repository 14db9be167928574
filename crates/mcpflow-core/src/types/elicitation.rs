//! Elicitation types for server-initiated user input (`elicitation/create`).

use serde::{Deserialize, Serialize};

/// Parameters for `elicitation/create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElicitParams {
    /// Message shown to the user.
    pub message: String,
    /// Schema for the requested form fields (form mode).
    #[serde(rename = "requestedSchema", skip_serializing_if = "Option::is_none")]
    pub requested_schema: Option<serde_json::Value>,
    /// URL the user should visit (URL mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ElicitParams {
    /// Create a form-mode elicitation.
    #[must_use]
    pub fn form(message: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            message: message.into(),
            requested_schema: Some(schema),
            url: None,
        }
    }

    /// Create a URL-mode elicitation.
    #[must_use]
    pub fn url(message: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            requested_schema: None,
            url: Some(url.into()),
        }
    }
}

/// How the user responded to an elicitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElicitAction {
    /// The user submitted the requested input.
    Accept,
    /// The user explicitly declined.
    Decline,
    /// The user dismissed the request without answering.
    Cancel,
}

/// Result of `elicitation/create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElicitResult {
    /// The user's action.
    pub action: ElicitAction,
    /// Submitted form values (present on accept in form mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Map<String, serde_json::Value>>,
}
