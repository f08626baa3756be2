use clap::Parser;
use latchkey_reqwest::{AuthenticatedClient, AuthenticatedRequest, LogExpiry, RequestFailed};
use latchkey_tokens::{
    app_server_base_from_env, Credentials, Gateway, GatewayConfig, HttpGateway, RefreshStrategy,
    SessionManager,
};
use reqwest::Url;

#[derive(Debug, Parser)]
struct Opts {
    /// The identity gateway's base URL
    #[arg(short, long, env = "API_BASE")]
    gateway_url: Url,

    /// The application server's base URL, read from `APP_SERVER_BASE_URL` when omitted
    #[arg(short, long)]
    app_server_url: Option<Url>,

    /// Where the refresh token is kept: `client` or `server`
    #[arg(short, long, env = "REFRESH_STRATEGY", default_value = "client")]
    refresh_strategy: RefreshStrategy,

    /// The account email address
    #[arg(short, long, env)]
    email: String,

    /// The account password
    #[arg(short, long, env, hide_env_values = true)]
    password: String,

    /// The protected path to fetch after signing in
    #[arg(long, default_value = "/me")]
    path: String,

    /// Create the account instead of signing in to an existing one
    #[arg(long)]
    register: bool,

    /// Check gateway health before signing in
    #[arg(long)]
    probe: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let app_server_url = match opts.app_server_url {
        Some(url) => url,
        None => app_server_base_from_env()?,
    };

    let config = GatewayConfig::new(opts.gateway_url)?.with_refresh_strategy(opts.refresh_strategy);
    let gateway = HttpGateway::new(config.clone())?;

    if opts.probe {
        let health = gateway.probe().await;
        tracing::info!(healthy = health.is_healthy(), "probed gateway");
    }

    let session = SessionManager::new(gateway);
    let credentials = Credentials::new(opts.email, opts.password);

    let signed_in = if opts.register {
        session.register(&credentials).await?
    } else {
        session.login(&credentials).await?
    };
    tracing::info!(
        phase = ?signed_in.phase(),
        token = format_args!("{:#?}", signed_in.access_token()),
        "signed in"
    );

    let client = AuthenticatedClient::new(
        reqwest::Client::builder()
            .user_agent(config.user_agent())
            .timeout(config.timeout())
            .build()?,
        app_server_url,
        session.clone(),
        LogExpiry,
    );

    match client.execute(&AuthenticatedRequest::get(opts.path)).await {
        Ok(response) => tracing::info!(
            status = response.status().as_u16(),
            data = ?response.data(),
            "fetched protected resource"
        ),
        Err(RequestFailed::SessionExpired(expired)) => {
            tracing::error!(reason = %expired.reason(), "{}", expired);
        }
        Err(error) => return Err(error.into()),
    }

    session.logout().await?;

    Ok(())
}
