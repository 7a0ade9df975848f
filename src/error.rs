//! Error taxonomy shared across every component of the runtime.
//!
//! The core never lets a component invent its own ad-hoc error type at the
//! public boundary. Every fallible operation — session lookup, tool
//! dispatch, model call, transfer validation, plugin close — returns
//! `Result<T, AgentError>` so callers can match on `AgentError::kind()`
//! regardless of which layer produced it.

use std::error::Error as StdError;
use std::fmt;

/// The error kinds a caller can match on, independent of the human-readable
/// message carried alongside each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed tool args, schema mismatch, unknown agent name in transfer.
    InvalidArgument,
    /// Session or artifact missing.
    NotFound,
    /// Transfer disallowed by policy, tool rejected by confirmation.
    PermissionDenied,
    /// Required user confirmation pending, long-running result awaited.
    FailedPrecondition,
    /// Invocation cancellation observed.
    Cancelled,
    /// Plugin-close or external-service deadline exceeded.
    DeadlineExceeded,
    /// Unexpected panic in tool, aggregator inconsistency.
    Internal,
    /// Model backend error, surfaced unchanged.
    Provider,
}

/// The single error type returned from every public fallible API in this
/// crate. Carries an [`ErrorKind`] for programmatic matching plus a message
/// for humans.
#[derive(Debug, Clone)]
pub struct AgentError {
    kind: ErrorKind,
    message: String,
    /// Set only for [`ErrorKind::Internal`] errors recovered from a caught
    /// tool panic; carries the tool name so the turn loop can attribute the
    /// failure in logs without re-parsing the message string.
    source_tool: Option<String>,
}

impl AgentError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source_tool: None,
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FailedPrecondition, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeadlineExceeded, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Provider, message)
    }

    /// Wrap a caught tool panic as an `Internal` error carrying the tool name,
    /// per the dispatch guarantee in spec §4.3: "A `Run` that panics is caught
    /// and surfaced as `InternalError` with the tool name and stack".
    pub fn tool_panic(tool_name: impl Into<String>, payload: &str) -> Self {
        let name = tool_name.into();
        Self {
            kind: ErrorKind::Internal,
            message: format!("tool '{}' panicked: {}", name, payload),
            source_tool: Some(name),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn source_tool(&self) -> Option<&str> {
        self.source_tool.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::InvalidArgument => write!(f, "invalid argument: {}", self.message),
            ErrorKind::NotFound => write!(f, "not found: {}", self.message),
            ErrorKind::PermissionDenied => write!(f, "permission denied: {}", self.message),
            ErrorKind::FailedPrecondition => write!(f, "failed precondition: {}", self.message),
            ErrorKind::Cancelled => write!(f, "cancelled: {}", self.message),
            ErrorKind::DeadlineExceeded => write!(f, "deadline exceeded: {}", self.message),
            ErrorKind::Internal => write!(f, "internal error: {}", self.message),
            ErrorKind::Provider => write!(f, "provider error: {}", self.message),
        }
    }
}

impl StdError for AgentError {}

/// Convenience alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, AgentError>;
