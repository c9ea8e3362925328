//! Stable error taxonomy shared by the policy engine, execution harness and
//! built-in connectors.
//!
//! Every caller-visible failure boils down to one of these kinds. The kind
//! drives the audit `error_code`, the transport-level HTTP status, and the
//! message surfaced back to the caller.

use thiserror::Error;

/// A stable, caller-visible error kind.
///
/// Variants carry just enough context to build a useful message; the audit
/// log only ever records [`GatewayError::code`], never the full variant.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("validation failed: {path}: {message}")]
    ValidationError { path: String, message: String },

    #[error("policy denied: {reason}")]
    PolicyDenied { reason: String },

    #[error("security error: {message}")]
    SecurityError { message: String },

    #[error("connector error: {message}")]
    ConnectorError { message: String },

    #[error("timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("result size {actual} exceeds max_bytes {limit}")]
    MaxBytesExceeded { actual: usize, limit: u64 },

    #[error("internal error: {message}")]
    InternalError { message: String },
}

impl GatewayError {
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn policy_denied(reason: impl Into<String>) -> Self {
        Self::PolicyDenied {
            reason: reason.into(),
        }
    }

    pub fn security(message: impl Into<String>) -> Self {
        Self::SecurityError {
            message: message.into(),
        }
    }

    pub fn connector(message: impl Into<String>) -> Self {
        Self::ConnectorError {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Stable machine-readable code surfaced to callers and recorded in the audit log.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ToolNotFound { .. } => "tool_not_found",
            Self::ValidationError { .. } => "validation_error",
            Self::PolicyDenied { .. } => "policy_denied",
            Self::SecurityError { .. } => "security_error",
            Self::ConnectorError { .. } => "connector_error",
            Self::Timeout { .. } => "timeout",
            Self::MaxBytesExceeded { .. } => "max_bytes_exceeded",
            Self::InternalError { .. } => "internal_error",
        }
    }

    /// Suggested HTTP status for the façade transport.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ToolNotFound { .. } => 404,
            Self::ValidationError { .. } => 400,
            Self::PolicyDenied { .. } => 403,
            Self::SecurityError { .. } => 403,
            Self::ConnectorError { .. } => 500,
            Self::Timeout { .. } => 408,
            Self::MaxBytesExceeded { .. } => 413,
            Self::InternalError { .. } => 500,
        }
    }

    /// True for the three "decision = deny" kinds; every other kind is
    /// reached only after the harness already decided to allow.
    pub fn is_deny_kind(&self) -> bool {
        matches!(
            self,
            Self::ToolNotFound { .. } | Self::ValidationError { .. } | Self::PolicyDenied { .. }
        )
    }
}

#[derive(Debug, Error)]
#[error("config error: {0}")]
pub struct ConfigError(pub String);

/// Map a stable error code (as carried by `InvokeFailure::code`) back to its
/// HTTP status, for transports that only have the code string on hand.
pub fn http_status_for_code(code: &str) -> u16 {
    match code {
        "tool_not_found" => 404,
        "validation_error" => 400,
        "policy_denied" => 403,
        "security_error" => 403,
        "connector_error" => 500,
        "timeout" => 408,
        "max_bytes_exceeded" => 413,
        _ => 500,
    }
}
