//! The identity gateway, consumed as a network endpoint

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;

use crate::{
    AccessToken, Email, GatewayError, Password, RefreshCapability, RefreshStrategy, RefreshToken,
};

mod client;
pub mod dto;

pub use client::HttpGateway;

/// Credentials used to register or sign in
#[derive(Clone, Debug, Serialize)]
pub struct Credentials {
    /// The account email
    pub email: Email,
    /// The account password
    pub password: Password,
}

impl Credentials {
    /// Constructs a new set of credentials
    pub fn new(email: impl Into<Email>, password: impl Into<Password>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Tokens issued by the gateway
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenPair {
    /// The new access token
    pub access_token: AccessToken,
    /// The new refresh token, absent when the gateway manages it on its side
    pub refresh_token: Option<RefreshToken>,
}

/// Result of a gateway liveness check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Health {
    /// The gateway answered with a success status
    Healthy,
    /// The gateway answered with a failure status or could not be reached
    Unhealthy {
        /// The status returned, if the gateway answered at all
        status: Option<StatusCode>,
    },
}

impl Health {
    /// Whether the gateway is healthy
    #[inline]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// The operations offered by the identity gateway
///
/// Implementations are stateless transport adapters: they neither cache nor
/// retry, and report every non-success response as a [`GatewayError`].
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Registers a new account and signs it in
    async fn register(&self, credentials: &Credentials) -> Result<TokenPair, GatewayError>;

    /// Signs in to an existing account
    async fn login(&self, credentials: &Credentials) -> Result<TokenPair, GatewayError>;

    /// Exchanges a refresh capability for a new access token
    async fn renew(&self, capability: &RefreshCapability) -> Result<TokenPair, GatewayError>;

    /// Revokes a refresh capability
    async fn logout(&self, capability: &RefreshCapability) -> Result<(), GatewayError>;

    /// Checks whether the gateway is reachable and healthy
    async fn probe(&self) -> Health;

    /// How this gateway expects the refresh capability to travel
    fn refresh_strategy(&self) -> RefreshStrategy {
        RefreshStrategy::ClientHeld
    }
}
