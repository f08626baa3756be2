use async_trait::async_trait;
use reqwest::header;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::Serialize;
use url::Url;

use super::{
    dto::{CapabilityBody, TokenResponse},
    Credentials, Gateway, Health, TokenPair,
};
use crate::{body, GatewayConfig, GatewayError, RefreshCapability, RefreshStrategy};

/// A gateway client speaking JSON over HTTP
///
/// The client is stateless apart from the cookie store used by the
/// server-held refresh strategy.
#[derive(Clone, Debug)]
pub struct HttpGateway {
    client: ClientWithMiddleware,
    config: GatewayConfig,
}

impl HttpGateway {
    /// Constructs a new gateway client from its configuration
    ///
    /// Under the server-held refresh strategy the underlying client keeps a
    /// cookie store, which is how the gateway recognizes the client on renewal.
    pub fn new(config: GatewayConfig) -> Result<Self, reqwest::Error> {
        let builder = reqwest::Client::builder()
            .user_agent(config.user_agent())
            .timeout(config.timeout());

        let client = with_cookie_store(builder, config.refresh_strategy()).build()?;
        Ok(Self::with_client(ClientBuilder::new(client).build(), config))
    }

    /// Constructs a gateway client over an existing middleware stack
    pub fn with_client(client: impl Into<ClientWithMiddleware>, config: GatewayConfig) -> Self {
        Self {
            client: client.into(),
            config,
        }
    }

    /// The configuration in use
    #[inline]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        url: Url,
        payload: &B,
    ) -> Result<Option<serde_json::Value>, GatewayError> {
        let payload = serde_json::to_vec(payload).map_err(GatewayError::RequestBody)?;

        let resp = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(GatewayError::RequestSend)?;

        tracing::debug!(
            response.status = resp.status().as_u16(),
            "received response from gateway"
        );

        let (status, data) = body::read_json(resp)
            .await
            .map_err(GatewayError::BodyRead)?;

        if !status.is_success() {
            return Err(GatewayError::Rejected {
                status,
                message: body::failure_message(status, data.as_ref()),
                data,
            });
        }

        Ok(data)
    }

    #[tracing::instrument(err, skip(self, payload), fields(gateway.url = tracing::field::Empty))]
    async fn request_tokens<B: Serialize + ?Sized>(
        &self,
        operation: &'static str,
        path: &str,
        payload: &B,
    ) -> Result<TokenPair, GatewayError> {
        let url = self.config.endpoint(path);
        tracing::Span::current().record("gateway.url", url.as_str());
        tracing::trace!("requesting tokens from gateway");

        let data = self
            .post(url, payload)
            .await?
            .ok_or(GatewayError::ProtocolViolation { operation })?;

        let pair = serde_json::from_value::<TokenResponse>(data)?.into_pair(operation)?;

        tracing::info!(
            has_refresh_token = pair.refresh_token.is_some(),
            "received new tokens"
        );

        Ok(pair)
    }
}

#[cfg(feature = "cookies")]
fn with_cookie_store(
    builder: reqwest::ClientBuilder,
    strategy: RefreshStrategy,
) -> reqwest::ClientBuilder {
    builder.cookie_store(strategy == RefreshStrategy::ServerHeld)
}

#[cfg(not(feature = "cookies"))]
fn with_cookie_store(
    builder: reqwest::ClientBuilder,
    strategy: RefreshStrategy,
) -> reqwest::ClientBuilder {
    if strategy == RefreshStrategy::ServerHeld {
        tracing::warn!("server-held refresh strategy configured without the `cookies` feature");
    }
    builder
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn register(&self, credentials: &Credentials) -> Result<TokenPair, GatewayError> {
        self.request_tokens("register", "/auth/register", credentials)
            .await
    }

    async fn login(&self, credentials: &Credentials) -> Result<TokenPair, GatewayError> {
        self.request_tokens("login", "/auth/login", credentials).await
    }

    async fn renew(&self, capability: &RefreshCapability) -> Result<TokenPair, GatewayError> {
        self.request_tokens("refresh", "/auth/refresh", &CapabilityBody(capability))
            .await
    }

    #[tracing::instrument(err, skip(self, capability))]
    async fn logout(&self, capability: &RefreshCapability) -> Result<(), GatewayError> {
        let url = self.config.endpoint("/auth/logout");
        self.post(url, &CapabilityBody(capability)).await?;
        Ok(())
    }

    async fn probe(&self) -> Health {
        let url = self.config.endpoint("/health");
        match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => Health::Healthy,
            Ok(resp) => {
                tracing::debug!(
                    response.status = resp.status().as_u16(),
                    "gateway health check failed"
                );
                Health::Unhealthy {
                    status: Some(resp.status()),
                }
            }
            Err(error) => {
                tracing::debug!(
                    error = (&error as &dyn std::error::Error),
                    "gateway unreachable"
                );
                Health::Unhealthy { status: None }
            }
        }
    }

    fn refresh_strategy(&self) -> RefreshStrategy {
        self.config.refresh_strategy()
    }
}
