//! Gateway configuration

use std::{env, fmt, str::FromStr, time::Duration};

use url::Url;

use crate::ConfigError;

/// How the refresh capability travels between the client and the gateway
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RefreshStrategy {
    /// The gateway returns the refresh token in response bodies and the client
    /// presents it explicitly when renewing or signing out
    #[default]
    ClientHeld,
    /// The gateway keeps the refresh token on its side and recognizes the client
    /// through an ambient secure channel (a cookie)
    ServerHeld,
}

impl FromStr for RefreshStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" | "client-held" | "explicit" => Ok(Self::ClientHeld),
            "server" | "server-held" | "implicit" | "cookie" => Ok(Self::ServerHeld),
            _ => Err(ConfigError::UnknownStrategy(s.to_owned())),
        }
    }
}

impl fmt::Display for RefreshStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientHeld => f.write_str("client"),
            Self::ServerHeld => f.write_str("server"),
        }
    }
}

/// Environment variable naming the gateway base URL
pub const API_BASE_VAR: &str = "API_BASE";
/// Legacy environment variable naming the gateway base URL
pub const LEGACY_GATEWAY_BASE_VAR: &str = "GATEWAY_BASE_URL";
/// Environment variable naming the refresh strategy
pub const REFRESH_STRATEGY_VAR: &str = "REFRESH_STRATEGY";
/// Environment variable naming the application server base URL
pub const APP_SERVER_BASE_VAR: &str = "APP_SERVER_BASE_URL";

/// Reads the base URL of the application server from the process environment
///
/// Business requests go to this server rather than to the identity gateway.
/// `APP_SERVER_BASE_URL` is required. The result always ends in `/`.
pub fn app_server_base_from_env() -> Result<Url, ConfigError> {
    app_server_base_from_lookup(|name| env::var(name).ok())
}

fn app_server_base_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Url, ConfigError> {
    let base = lookup(APP_SERVER_BASE_VAR)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingVariable(APP_SERVER_BASE_VAR))?;
    parse_base(&base)
}

fn parse_base(base_url: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(base_url).map_err(|source| ConfigError::InvalidBaseUrl {
        url: base_url.to_owned(),
        source,
    })?;
    normalize_base(url)
}

fn normalize_base(mut base_url: Url) -> Result<Url, ConfigError> {
    if base_url.cannot_be_a_base() {
        return Err(ConfigError::CannotBeABase(base_url.into()));
    }

    if !base_url.path().ends_with('/') {
        let path = format!("{}/", base_url.path());
        base_url.set_path(&path);
    }
    Ok(base_url)
}

/// Configuration for talking to the identity gateway
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    base_url: Url,
    refresh_strategy: RefreshStrategy,
    timeout: Duration,
    user_agent: String,
}

impl GatewayConfig {
    /// Constructs a new configuration for the gateway at `base_url`
    ///
    /// Uses the client-held refresh strategy and a 30 second request timeout.
    pub fn new(base_url: Url) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: normalize_base(base_url)?,
            refresh_strategy: RefreshStrategy::default(),
            timeout: Duration::from_secs(30),
            user_agent: concat!("latchkey/", env!("CARGO_PKG_VERSION")).to_owned(),
        })
    }

    /// Parses `base_url` and constructs a new configuration from it
    pub fn parse(base_url: &str) -> Result<Self, ConfigError> {
        Self::new(parse_base(base_url)?)
    }

    /// Reads the configuration from the process environment
    ///
    /// The base URL comes from `API_BASE`, falling back to the legacy
    /// `GATEWAY_BASE_URL`. `REFRESH_STRATEGY` optionally selects `client` or
    /// `server`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base = lookup(API_BASE_VAR)
            .filter(|v| !v.is_empty())
            .or_else(|| lookup(LEGACY_GATEWAY_BASE_VAR).filter(|v| !v.is_empty()))
            .ok_or(ConfigError::MissingVariable(API_BASE_VAR))?;

        let mut config = Self::parse(&base)?;
        if let Some(strategy) = lookup(REFRESH_STRATEGY_VAR).filter(|v| !v.is_empty()) {
            config.refresh_strategy = strategy.parse()?;
        }
        Ok(config)
    }

    /// Sets the refresh strategy
    pub fn with_refresh_strategy(mut self, refresh_strategy: RefreshStrategy) -> Self {
        self.refresh_strategy = refresh_strategy;
        self
    }

    /// Sets the transport timeout applied to every gateway request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the user agent sent to the gateway
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// The gateway base URL, always ending in `/`
    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The refresh strategy
    #[inline]
    pub fn refresh_strategy(&self) -> RefreshStrategy {
        self.refresh_strategy
    }

    /// The transport timeout
    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The user agent
    #[inline]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub(crate) fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!("{}{}", url.path(), path.trim_start_matches('/'));
        url.set_path(&joined);
        url
    }
}
