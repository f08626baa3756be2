use std::sync::Arc;

use crate::{
    session::SessionState, AccessToken, Credentials, Gateway, GatewayError, Phase,
    RefreshCapability, RefreshCoordinator, RefreshStrategy, Session, SessionEpoch, SessionWatcher,
};

/// Owns the session and drives its transitions
///
/// Sign-in and sign-out are explicit actions taken through this manager;
/// renewals happen through its [`RefreshCoordinator`]. Clones share the same
/// session.
#[derive(Debug)]
pub struct SessionManager<G> {
    gateway: Arc<G>,
    state: SessionState,
    coordinator: RefreshCoordinator<G>,
}

impl<G> Clone for SessionManager<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            state: self.state.clone(),
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<G: Gateway + 'static> SessionManager<G> {
    /// Constructs a manager with an empty session
    ///
    /// When the gateway holds refresh tokens on its side, the session starts
    /// out with an implicit refresh capability so that
    /// [`ensure_access_token()`][Self::ensure_access_token()] can try to
    /// resume a session the gateway still recognizes.
    pub fn new(gateway: G) -> Self {
        Self::from_arc(Arc::new(gateway))
    }

    /// Constructs a manager over a shared gateway
    pub fn from_arc(gateway: Arc<G>) -> Self {
        let initial = match gateway.refresh_strategy() {
            RefreshStrategy::ServerHeld => Some(RefreshCapability::Implicit),
            RefreshStrategy::ClientHeld => None,
        };
        let state = SessionState::new(initial);
        let coordinator = RefreshCoordinator::new(Arc::clone(&gateway), state.clone());

        Self {
            gateway,
            state,
            coordinator,
        }
    }

    /// The gateway in use
    #[inline]
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// The coordinator renewing this session's access token
    #[inline]
    pub fn coordinator(&self) -> &RefreshCoordinator<G> {
        &self.coordinator
    }

    /// A snapshot of the current session
    #[inline]
    pub fn snapshot(&self) -> Arc<Session> {
        self.state.snapshot()
    }

    /// Subscribes to session changes
    pub fn subscribe(&self) -> SessionWatcher {
        self.state.subscribe()
    }

    /// Signs in with existing credentials
    pub async fn login(&self, credentials: &Credentials) -> Result<Arc<Session>, GatewayError> {
        let pair = self.gateway.login(credentials).await?;
        let session = self.state.sign_in(&pair, self.gateway.refresh_strategy());
        self.log_sign_in("login", &session);
        Ok(session)
    }

    /// Registers a new account and signs in to it
    pub async fn register(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<Session>, GatewayError> {
        let pair = self.gateway.register(credentials).await?;
        let session = self.state.sign_in(&pair, self.gateway.refresh_strategy());
        self.log_sign_in("register", &session);
        Ok(session)
    }

    fn log_sign_in(&self, operation: &'static str, session: &Session) {
        match session.refresh_capability() {
            Some(_) => tracing::info!(operation, epoch = session.epoch().0, "signed in"),
            None => tracing::warn!(
                operation,
                epoch = session.epoch().0,
                "signed in without a refresh token, session cannot be renewed"
            ),
        }
    }

    /// Signs out
    ///
    /// The gateway is asked to revoke the refresh capability if one is held.
    /// The local session is cleared whether or not the gateway succeeds.
    pub async fn logout(&self) -> Result<(), GatewayError> {
        let session = self.state.snapshot();
        let result = match session.refresh_capability() {
            Some(capability) => self.gateway.logout(capability).await,
            None => Ok(()),
        };

        self.state.clear(Phase::Unauthenticated);

        match &result {
            Ok(()) => tracing::info!("signed out"),
            Err(error) => tracing::warn!(
                error = (error as &dyn std::error::Error),
                "gateway sign-out failed, local session cleared anyway"
            ),
        }

        result
    }

    /// Returns a usable access token, hydrating the session if needed
    ///
    /// With no cached access token but a refresh capability, the session
    /// enters [`Phase::Hydrating`] and a renewal is attempted. Overlapping
    /// callers share that single renewal. Returns `None` if no token can be
    /// obtained.
    pub async fn ensure_access_token(&self) -> Option<AccessToken> {
        let session = self.state.snapshot();
        if let Some(token) = session.access_token() {
            return Some(token.to_owned());
        }
        session.refresh_capability()?;

        self.state.begin_hydration();

        match self.coordinator.renew_stale(None).await {
            Ok(token) => Some(token),
            Err(error) => {
                tracing::debug!(
                    error = (&error as &dyn std::error::Error),
                    "unable to hydrate session"
                );
                None
            }
        }
    }

    /// Terminates the session belonging to `epoch` after the gateway stopped
    /// accepting it
    ///
    /// Leaves a newer sign-in untouched. Returns whether the session changed.
    pub fn expire(&self, epoch: SessionEpoch) -> bool {
        let expired = self.state.expire(epoch);
        if expired {
            tracing::warn!(epoch = epoch.0, "session expired");
        }
        expired
    }
}
