//! Errors reported by the gateway client and the refresh coordinator

use std::sync::Arc;

use reqwest::StatusCode;
use thiserror::Error;

/// An error while calling the identity gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway answered with a non-success status
    #[error("{message}")]
    Rejected {
        /// The HTTP status returned by the gateway
        status: StatusCode,
        /// The gateway's `message` or `error` field, or a generic description
        message: String,
        /// The decoded error body, if it was JSON
        data: Option<serde_json::Value>,
    },
    /// Unable to serialize the request body
    #[error("error serializing request body for gateway")]
    RequestBody(#[source] serde_json::Error),
    /// Unable to send a request to the gateway, including transport timeouts
    #[error("error sending request to gateway")]
    RequestSend(#[source] reqwest_middleware::Error),
    /// Unable to read the response
    #[error("error reading response body")]
    BodyRead(#[source] reqwest::Error),
    /// Unable to deserialize the token body
    #[error("error deserializing token body from gateway")]
    TokenBody(#[from] serde_json::Error),
    /// The gateway reported success but did not include an access token
    #[error("gateway {operation} succeeded but no access token was returned")]
    ProtocolViolation {
        /// The gateway operation that misbehaved
        operation: &'static str,
    },
}

impl GatewayError {
    /// The HTTP status the gateway answered with, if it answered at all
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the gateway refused the presented credentials or capability
    #[inline]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}

/// A renewal attempt did not produce an access token
///
/// Every caller attached to the same renewal receives a clone of the same value.
#[derive(Clone, Debug, Error)]
pub enum RenewalFailed {
    /// There was no refresh capability to present to the gateway
    #[error("no refresh capability is held")]
    NoCapability,
    /// The gateway renewal call failed
    #[error("gateway refused to renew the session")]
    Gateway(#[source] Arc<GatewayError>),
    /// The session was signed out or replaced while the renewal was outstanding
    #[error("session changed while renewal was outstanding")]
    Superseded,
    /// The renewal ended without publishing an outcome
    #[error("renewal ended without an outcome")]
    Interrupted,
}

impl RenewalFailed {
    /// The HTTP status of the failed gateway call, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Gateway(err) => err.status(),
            _ => None,
        }
    }
}

/// An error in the client configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configured base URL could not be parsed
    #[error("invalid base URL `{url}`")]
    InvalidBaseUrl {
        /// The rejected value
        url: String,
        /// The parse failure
        source: url::ParseError,
    },
    /// The configured base URL cannot have paths appended to it
    #[error("base URL `{0}` cannot be used as a base")]
    CannotBeABase(String),
    /// A required environment variable is not set
    #[error("{0} is not set; configure it in the environment")]
    MissingVariable(&'static str),
    /// The refresh strategy name is not recognized
    #[error("unknown refresh strategy `{0}`, expected `client` or `server`")]
    UnknownStrategy(String),
}
