//! Facilities for managing an in-process session against an identity gateway
//!
//! This library keeps the short-lived access token and the longer-lived
//! refresh capability of a client application, and renews the access token
//! when the gateway stops accepting it. It is intended to sit underneath an
//! HTTP client that attaches the access token to outgoing requests, such as
//! the executor provided by `latchkey_reqwest`.
//!
//! The load-bearing guarantee is _single-flight_ renewal: however many tasks
//! ask for a renewal at the same moment, exactly one renewal call reaches the
//! gateway and every task receives its outcome. This avoids a stampede of
//! renewals in which later calls invalidate tokens that earlier calls just
//! obtained.
//!
//! # General Flow
//!
//! Configure the gateway, construct a [`SessionManager`] over it, and sign in.
//! The manager's [`RefreshCoordinator`] renews the access token on request,
//! rotating the refresh token whenever the gateway issues a new one.
//!
//! ```
//! use latchkey_tokens::{Credentials, GatewayConfig, HttpGateway, RefreshStrategy, SessionManager};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::parse("https://gateway.example.com")?
//!     .with_refresh_strategy(RefreshStrategy::ClientHeld);
//!
//! let manager = SessionManager::new(HttpGateway::new(config)?);
//!
//! manager
//!     .login(&Credentials::new("a@b.com", "password123"))
//!     .await?;
//!
//! let renewed = manager.coordinator().renew().await?;
//! tracing::info!(token = format_args!("{:#?}", renewed), "renewed access token");
//! # Ok(())
//! # }
//! ```
//!
//! # Refresh strategies
//!
//! Some gateways return the refresh token in the response body and expect the
//! client to present it again; others keep it on their side and recognize the
//! client through a secure cookie. Both are supported through
//! [`RefreshStrategy`], and the session models the difference explicitly as a
//! [`RefreshCapability`].
//!
//! # Features
//!
//! * `cookies` (default): keeps a cookie store in [`HttpGateway`] when the
//!   server-held refresh strategy is configured.
//! * `default-tls` (default) / `rustls-tls`: TLS backend used by `reqwest`.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

pub mod body;
mod braids;
mod config;
mod coordinator;
mod error;
pub mod gateway;
mod manager;
mod session;

pub use braids::*;
pub use config::{
    app_server_base_from_env, GatewayConfig, RefreshStrategy, API_BASE_VAR, APP_SERVER_BASE_VAR,
    LEGACY_GATEWAY_BASE_VAR, REFRESH_STRATEGY_VAR,
};
pub use coordinator::RefreshCoordinator;
pub use error::{ConfigError, GatewayError, RenewalFailed};
pub use gateway::{Credentials, Gateway, Health, HttpGateway, TokenPair};
pub use manager::SessionManager;
pub use session::{
    BorrowedSession, Phase, RefreshCapability, Session, SessionEpoch, SessionPublisherQuit,
    SessionWatcher,
};
