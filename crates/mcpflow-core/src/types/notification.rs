//! Typed params for the built-in notifications, plus the empty result.
//!
//! The cancelled and progress params are strict: `requestId` and
//! `progressToken` are integers here even though the wire format of ids is
//! wider, because this engine only ever allocates integer ids. A peer that
//! sends anything else is surfaced through the error hook, not dispatched.

use serde::{Deserialize, Serialize};

/// Parameters for `notifications/cancelled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelledParams {
    /// Id of the request being cancelled. Integer by construction.
    #[serde(rename = "requestId")]
    pub request_id: i64,
    /// Why the request was cancelled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Parameters for `notifications/progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressParams {
    /// The progress token, equal to the id of the request it belongs to.
    #[serde(rename = "progressToken")]
    pub progress_token: i64,
    /// Progress so far.
    pub progress: f64,
    /// Total expected work, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// Human-readable progress message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A progress update delivered to a request's progress callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Progress so far.
    pub progress: f64,
    /// Total expected work, if known.
    pub total: Option<f64>,
}

/// The empty result (`{}`), returned by `ping` and other ack-only methods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyResult {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_requires_integer_request_id() {
        let ok: CancelledParams =
            serde_json::from_value(serde_json::json!({ "requestId": 7, "reason": "bored" }))
                .unwrap();
        assert_eq!(ok.request_id, 7);

        let err = serde_json::from_value::<CancelledParams>(
            serde_json::json!({ "requestId": "seven" }),
        );
        assert!(err.is_err());
    }

    #[test]
    fn progress_requires_integer_token() {
        let ok: ProgressParams = serde_json::from_value(
            serde_json::json!({ "progressToken": 3, "progress": 0.5, "total": 1.0 }),
        )
        .unwrap();
        assert_eq!(ok.progress_token, 3);

        let err = serde_json::from_value::<ProgressParams>(
            serde_json::json!({ "progressToken": "abc", "progress": 1 }),
        );
        assert!(err.is_err());
    }
}
