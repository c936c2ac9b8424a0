//! Error types surfaced to the tool layer.
use crate::Operation;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Upstream bodies are clipped to this many characters before they land in an error.
pub const MAX_UPSTREAM_MESSAGE: usize = 512;

/// Stable classification of a [`GatewayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    RateLimitExceeded,
    UpstreamRejected,
    UpstreamUnavailable,
    MalformedResponse,
    Timeout,
    Cancelled,
}

/// Every way an operation can fail.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// The operation name is not in the catalogue.
    #[error("unknown operation `{name}`")]
    UnknownOperation { name: String },
    /// Missing, malformed or conflicting tool arguments. Never retried.
    #[error("{operation}: invalid argument `{field}`: {reason}")]
    InvalidArgument { operation: Operation, field: String, reason: String },
    /// Upstream kept answering 429 past the local retry budget.
    #[error("{operation}: upstream rate limit persisted after {attempts} attempts")]
    RateLimitExceeded { operation: Operation, attempts: usize, retry_after: Option<Duration> },
    /// Upstream 4xx other than 429.
    #[error("{operation}: upstream rejected the request with HTTP {status}: {message}")]
    UpstreamRejected { operation: Operation, status: u16, message: String },
    /// 5xx or transport failures after the retry budget was spent.
    #[error("{operation}: upstream unavailable after {attempts} attempts; last failure: {last_failure}")]
    UpstreamUnavailable { operation: Operation, attempts: usize, last_failure: String },
    /// A 2xx body that could not be decoded.
    #[error("{operation}: malformed upstream response: {message}")]
    MalformedResponse { operation: Operation, message: String },
    /// The caller's deadline elapsed.
    #[error("{operation}: timed out after {elapsed:?} (limit: {limit:?})")]
    Timeout { operation: Operation, elapsed: Duration, limit: Duration },
    /// The caller cancelled the operation.
    #[error("{operation}: cancelled by caller after {elapsed:?}")]
    Cancelled { operation: Operation, elapsed: Duration },
}

impl GatewayError {
    pub(crate) fn invalid(
        operation: Operation,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        GatewayError::InvalidArgument { operation, field: field.into(), reason: reason.into() }
    }

    pub(crate) fn malformed(operation: Operation, message: impl Into<String>) -> Self {
        GatewayError::MalformedResponse { operation, message: message.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownOperation { .. } | Self::InvalidArgument { .. } => {
                ErrorKind::InvalidArgument
            }
            Self::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            Self::UpstreamRejected { .. } => ErrorKind::UpstreamRejected,
            Self::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// The operation the error belongs to, if the name resolved.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::UnknownOperation { .. } => None,
            Self::InvalidArgument { operation, .. }
            | Self::RateLimitExceeded { operation, .. }
            | Self::UpstreamRejected { operation, .. }
            | Self::UpstreamUnavailable { operation, .. }
            | Self::MalformedResponse { operation, .. }
            | Self::Timeout { operation, .. }
            | Self::Cancelled { operation, .. } => Some(*operation),
        }
    }

    /// Whether the same call may succeed if the caller tries again later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateLimitExceeded | ErrorKind::UpstreamUnavailable | ErrorKind::Timeout
        )
    }

    pub fn is_invalid_argument(&self) -> bool {
        self.kind() == ErrorKind::InvalidArgument
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Serializable summary for the tool layer.
    pub fn report(&self) -> ErrorReport {
        let field = match self {
            Self::InvalidArgument { field, .. } => Some(field.clone()),
            _ => None,
        };
        ErrorReport {
            kind: self.kind(),
            operation: self.operation().map(|op| op.as_str().to_string()),
            field,
            message: self.to_string(),
            retryable: self.is_transient(),
        }
    }
}

/// Wire shape of an error handed back to the calling agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
    pub retryable: bool,
}

/// Clip an upstream body so errors stay readable.
pub(crate) fn clip_message(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    match trimmed.char_indices().nth(MAX_UPSTREAM_MESSAGE) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_display_names_operation_and_field() {
        let err = GatewayError::invalid(Operation::SearchByDateRange, "startDateTo", "before start");
        let msg = err.to_string();
        assert!(msg.contains("search_by_date_range"));
        assert!(msg.contains("startDateTo"));
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn unknown_operation_classifies_as_invalid_argument() {
        let err = GatewayError::UnknownOperation { name: "nope".into() };
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.operation().is_none());
        assert!(!err.is_transient());
    }

    #[test]
    fn transient_kinds() {
        let throttled = GatewayError::RateLimitExceeded {
            operation: Operation::SearchStudies,
            attempts: 2,
            retry_after: None,
        };
        let rejected = GatewayError::UpstreamRejected {
            operation: Operation::SearchStudies,
            status: 400,
            message: "bad".into(),
        };
        assert!(throttled.is_transient());
        assert!(!rejected.is_transient());
    }

    #[test]
    fn timeout_display_includes_durations() {
        let err = GatewayError::Timeout {
            operation: Operation::GetRecruitingStudies,
            elapsed: Duration::from_millis(5100),
            limit: Duration::from_secs(5),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("timed out"));
        assert!(msg.contains("5.1"));
        assert!(err.is_timeout());
    }

    #[test]
    fn report_serializes_kind_and_field() {
        let err = GatewayError::invalid(Operation::GetStudyDetails, "nctId", "malformed");
        let json = serde_json::to_value(err.report()).unwrap();
        assert_eq!(json["kind"], "invalid_argument");
        assert_eq!(json["operation"], "get_study_details");
        assert_eq!(json["field"], "nctId");
        assert_eq!(json["retryable"], false);
    }

    #[test]
    fn clip_message_bounds_length() {
        let long = "x".repeat(MAX_UPSTREAM_MESSAGE * 2);
        let clipped = clip_message(&long);
        assert_eq!(clipped.chars().count(), MAX_UPSTREAM_MESSAGE + 1);
        assert_eq!(clip_message("   "), "<empty body>");
        assert_eq!(clip_message(" short "), "short");
    }
}
