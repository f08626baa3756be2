//! Single-flight renewal of the access token

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::{
    session::SessionState, AccessToken, AccessTokenRef, Gateway, RenewalFailed,
};

type Outcome = Result<AccessToken, RenewalFailed>;
type Slot = Option<watch::Receiver<Option<Outcome>>>;

/// Guarantees that at most one renewal is in flight at any time
///
/// Callers arriving while a renewal is outstanding attach to it and receive
/// the same outcome as every other caller. Renewals are spawned onto the
/// runtime, so they run to completion even if every caller goes away.
#[derive(Debug)]
pub struct RefreshCoordinator<G> {
    shared: Arc<Shared<G>>,
}

impl<G> Clone for RefreshCoordinator<G> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

#[derive(Debug)]
struct Shared<G> {
    gateway: Arc<G>,
    state: SessionState,
    in_flight: Mutex<Slot>,
}

impl<G> Shared<G> {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<G: Gateway + 'static> RefreshCoordinator<G> {
    pub(crate) fn new(gateway: Arc<G>, state: SessionState) -> Self {
        Self {
            shared: Arc::new(Shared {
                gateway,
                state,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Renews the access token, or joins the renewal already in flight
    pub async fn renew(&self) -> Result<AccessToken, RenewalFailed> {
        self.renew_or_reuse(|_| false).await
    }

    /// Renews the access token after `rejected` was refused
    ///
    /// If no renewal is in flight and the session already holds a different
    /// access token than `rejected`, that token was produced by a renewal that
    /// has just completed and is returned without contacting the gateway.
    /// With `rejected` set to `None`, the caller held no token, so any token
    /// the session holds now is returned.
    pub async fn renew_stale(
        &self,
        rejected: Option<&AccessTokenRef>,
    ) -> Result<AccessToken, RenewalFailed> {
        self.renew_or_reuse(|current| Some(current) != rejected)
            .await
    }

    async fn renew_or_reuse<F>(&self, reusable: F) -> Result<AccessToken, RenewalFailed>
    where
        F: FnOnce(&AccessTokenRef) -> bool,
    {
        let mut outcome = {
            let mut slot = self.shared.slot();
            match &*slot {
                Some(outstanding) => {
                    tracing::trace!("joining outstanding renewal");
                    outstanding.clone()
                }
                None => {
                    let session = self.shared.state.snapshot();
                    if let Some(current) = session.access_token() {
                        if reusable(current) {
                            tracing::debug!("access token already renewed, skipping renewal");
                            return Ok(current.to_owned());
                        }
                    }

                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx.clone());
                    tokio::spawn(run_renewal(Arc::clone(&self.shared), tx));
                    rx
                }
            }
        };

        let result = match outcome.wait_for(Option::is_some).await {
            Ok(published) => published.clone().unwrap_or(Err(RenewalFailed::Interrupted)),
            Err(_) => Err(RenewalFailed::Interrupted),
        };
        result
    }
}

/// Clears the in-flight slot and publishes the outcome when dropped
///
/// Publishing from `Drop` ensures the slot is released even if the gateway
/// call panics.
struct Publisher<G> {
    shared: Arc<Shared<G>>,
    tx: watch::Sender<Option<Outcome>>,
    outcome: Option<Outcome>,
}

impl<G> Drop for Publisher<G> {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or(Err(RenewalFailed::Interrupted));
        let mut slot = self.shared.slot();
        *slot = None;
        self.tx.send_replace(Some(outcome));
    }
}

async fn run_renewal<G: Gateway>(shared: Arc<Shared<G>>, tx: watch::Sender<Option<Outcome>>) {
    let mut publisher = Publisher {
        shared: Arc::clone(&shared),
        tx,
        outcome: None,
    };

    let session = shared.state.snapshot();
    let epoch = session.epoch();

    let outcome = match session.refresh_capability() {
        None => {
            tracing::debug!("no refresh capability held, cannot renew");
            shared.state.fail_renewal(epoch);
            Err(RenewalFailed::NoCapability)
        }
        Some(capability) => {
            tracing::debug!("requesting renewal from gateway");
            match shared.gateway.renew(capability).await {
                Ok(pair) => {
                    if shared.state.apply_renewal(epoch, &pair) {
                        tracing::info!(
                            rotated = pair.refresh_token.is_some(),
                            "access token renewed"
                        );
                        Ok(pair.access_token)
                    } else {
                        superseded(&shared.state)
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        error = (&error as &dyn std::error::Error),
                        response.status = error.status().map(|s| s.as_u16()),
                        "renewal failed, clearing session"
                    );
                    if shared.state.fail_renewal(epoch) {
                        Err(RenewalFailed::Gateway(Arc::new(error)))
                    } else {
                        superseded(&shared.state)
                    }
                }
            }
        }
    };

    publisher.outcome = Some(outcome);
}

fn superseded(state: &SessionState) -> Outcome {
    let session = state.snapshot();
    match session.access_token() {
        Some(current) => {
            tracing::debug!("session replaced during renewal, handing out its token");
            Ok(current.to_owned())
        }
        None => {
            tracing::debug!("session signed out during renewal");
            Err(RenewalFailed::Superseded)
        }
    }
}
