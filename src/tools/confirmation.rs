//! The reserved tool-confirmation flow (spec §4.3 "Confirmation", §3).
//!
//! Before `Run`, if a tool requires confirmation and the context carries no
//! prior [`super::ToolConfirmation`], the dispatcher (driven by the turn
//! loop, not [`super::dispatch`] itself, since it needs to emit an event)
//! emits a synthetic function-call of [`CONFIRMATION_REQUEST`] naming the
//! original call, and the turn suspends with `FailedPrecondition` until a
//! matching user function-response supplies the decision.

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// Reserved function name used for the synthetic confirmation-request call
/// and its matching user-supplied response.
pub const CONFIRMATION_REQUEST: &str = "adk_request_confirmation";

/// Payload carried by the synthetic confirmation-request function-call,
/// naming the tool call it is gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub original_function_call_id: String,
    pub tool_name: String,
    pub args: serde_json::Value,
}

impl ConfirmationRequest {
    pub fn new(original_function_call_id: impl Into<String>, tool_name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            original_function_call_id: original_function_call_id.into(),
            tool_name: tool_name.into(),
            args,
        }
    }

    pub fn into_args(self) -> Result<serde_json::Value> {
        serde_json::to_value(&self)
            .map_err(|e| AgentError::internal(format!("failed to encode confirmation request: {e}")))
    }
}

/// Decode a user-supplied confirmation function-response's payload into
/// `{confirmed: bool}`.
pub fn decode_confirmation(response: &serde_json::Value) -> Result<bool> {
    response
        .get("confirmed")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| AgentError::invalid_argument("confirmation response missing boolean 'confirmed' field"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_confirmation_reads_boolean_field() {
        assert!(decode_confirmation(&serde_json::json!({"confirmed": true})).unwrap());
        assert!(!decode_confirmation(&serde_json::json!({"confirmed": false})).unwrap());
    }

    #[test]
    fn decode_confirmation_rejects_missing_field() {
        let err = decode_confirmation(&serde_json::json!({})).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn confirmation_request_round_trips_through_json() {
        let request = ConfirmationRequest::new("call-1", "delete_file", serde_json::json!({"path": "/tmp/x"}));
        let encoded = request.clone().into_args().unwrap();
        let decoded: ConfirmationRequest = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded.original_function_call_id, request.original_function_call_id);
        assert_eq!(decoded.tool_name, request.tool_name);
    }
}
