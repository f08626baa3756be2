//! Authenticated requests over `reqwest` with transparent session renewal
//!
//! An [`AuthenticatedClient`] sends requests on behalf of the user signed in
//! to a [`SessionManager`](latchkey_tokens::SessionManager), attaching the
//! session's current access token to each one. When the server answers
//! `401 Unauthorized`, the client renews the access token through the
//! session's single-flight coordinator and sends the request exactly once
//! more. Many requests failing at the same moment share a single renewal.
//!
//! If a request cannot be recovered, the session is expired, the
//! [`SessionExpiryObserver`] given at construction is notified, and the
//! caller receives [`RequestFailed::SessionExpired`].
//!
//! ```
//! use latchkey_reqwest::{AuthenticatedClient, SessionExpired};
//! use latchkey_tokens::{Credentials, GatewayConfig, HttpGateway, SessionManager};
//! use reqwest::Client;
//! use reqwest_middleware::ClientBuilder;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::parse("https://gateway.example.com")?;
//! let session = SessionManager::new(HttpGateway::new(config)?);
//!
//! let client = AuthenticatedClient::new(
//!     ClientBuilder::new(Client::default()).build(),
//!     "https://app.example.com".parse()?,
//!     session.clone(),
//!     |expired: &SessionExpired| eprintln!("{}", expired),
//! );
//!
//! session.login(&Credentials::new("a@b.com", "password123")).await?;
//!
//! let me = client.get("/me").await?;
//! println!("{:?}", me.data());
//! # Ok(())
//! # }
//! ```
//!
//! If a request already carries an `Authorization` header, that value is
//! left in place.
//!
//! The access token is only attached when a predicate accepts the request.
//! By default that is [`HttpsOrLoopback`], which also permits plain HTTP to a
//! local development server. Deployments that should never send the token
//! in the clear can require HTTPS everywhere, or supply any other
//! `predicates::Predicate<reqwest::Request>`.
//!
//! ```
//! use latchkey_reqwest::HttpsOnly;
//! # use latchkey_reqwest::{AuthenticatedClient, LogExpiry};
//! # use latchkey_tokens::{GatewayConfig, HttpGateway, SessionManager};
//! # fn build() -> Result<(), Box<dyn std::error::Error>> {
//! # let config = GatewayConfig::parse("https://gateway.example.com")?;
//! # let session = SessionManager::new(HttpGateway::new(config.clone())?);
//! # let client = AuthenticatedClient::new(reqwest::Client::default(), config.base_url().clone(), session, LogExpiry);
//!
//! let client = client.with_predicate(HttpsOnly);
//! # Ok(())
//! # }
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod attach;
mod error;
mod executor;
mod observer;
mod request;

pub use attach::{HttpsOnly, HttpsOrLoopback, LoopbackHost};
pub use error::{ExpiryReason, RequestFailed, SessionExpired};
pub use executor::AuthenticatedClient;
pub use observer::{LogExpiry, SessionExpiryObserver};
pub use request::{ApiResponse, AuthenticatedRequest};
