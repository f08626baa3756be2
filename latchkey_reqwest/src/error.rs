//! Errors visible to callers of the executor

use std::{error, fmt};

use latchkey_tokens::RenewalFailed;
use reqwest::{header::InvalidHeaderValue, StatusCode};
use thiserror::Error;

/// An authenticated request did not produce a successful response
#[derive(Debug, Error)]
pub enum RequestFailed {
    /// The request could not be sent or its response could not be read,
    /// including transport timeouts
    #[error("error sending request")]
    Network(#[source] reqwest_middleware::Error),
    /// The server answered with a failure other than `401`
    #[error("{message}")]
    Business {
        /// The HTTP status
        status: StatusCode,
        /// The body's `message` or `error` field, or a generic description
        message: String,
        /// The decoded error body, if it was JSON
        data: Option<serde_json::Value>,
    },
    /// The session is no longer accepted and the user must sign in again
    #[error(transparent)]
    SessionExpired(#[from] SessionExpired),
    /// The request path could not be resolved against the base URL
    #[error("invalid request path `{path}`")]
    InvalidPath {
        /// The rejected path
        path: String,
        /// The resolution failure
        source: url::ParseError,
    },
    /// The request body could not be serialized
    #[error("error serializing request body")]
    Body(#[from] serde_json::Error),
    /// The access token contains bytes that are not allowed in a header
    #[error("access token cannot be sent as a header value")]
    InvalidToken(#[source] InvalidHeaderValue),
}

impl RequestFailed {
    /// The HTTP status associated with the failure, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Business { status, .. } => Some(*status),
            Self::SessionExpired(expired) => Some(expired.status()),
            _ => None,
        }
    }

    /// Whether the user must sign in again
    #[inline]
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired(_))
    }
}

/// Why a session was declared expired
#[derive(Clone, Debug)]
pub enum ExpiryReason {
    /// The request got a `401` and asked not to be retried
    RetryDisallowed,
    /// The request got a `401` and there was nothing to renew the session with
    NoRefreshCapability,
    /// The renewal itself failed
    RenewalFailed(RenewalFailed),
    /// The renewal succeeded but the retried request still got a `401`
    StillUnauthorized,
}

impl fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetryDisallowed => f.write_str("unauthorized and retry disallowed"),
            Self::NoRefreshCapability => f.write_str("unauthorized with no refresh capability"),
            Self::RenewalFailed(_) => f.write_str("renewal failed"),
            Self::StillUnauthorized => f.write_str("unauthorized after renewal"),
        }
    }
}

/// The session is no longer accepted and the user must sign in again
///
/// By the time a caller sees this, the session's tokens have been cleared.
#[derive(Clone, Debug)]
pub struct SessionExpired {
    reason: ExpiryReason,
}

impl SessionExpired {
    pub(crate) fn new(reason: ExpiryReason) -> Self {
        Self { reason }
    }

    /// Why the session expired
    #[inline]
    pub fn reason(&self) -> &ExpiryReason {
        &self.reason
    }

    /// Always `401 Unauthorized`
    #[inline]
    pub fn status(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }
}

impl fmt::Display for SessionExpired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Session expired. Please sign in again.")
    }
}

impl error::Error for SessionExpired {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.reason {
            ExpiryReason::RenewalFailed(cause) => Some(cause),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn session_expired_has_fixed_message_and_status() {
        let err = RequestFailed::from(SessionExpired::new(ExpiryReason::StillUnauthorized));
        assert_eq!(err.to_string(), "Session expired. Please sign in again.");
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
        assert!(err.is_session_expired());
    }

    #[test]
    fn renewal_failure_is_the_source() {
        let err = SessionExpired::new(ExpiryReason::RenewalFailed(RenewalFailed::NoCapability));
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("no refresh capability is held")
        );
    }
}
