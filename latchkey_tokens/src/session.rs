//! In-process session state
//!
//! The session is published through a [`watch`] channel so that every reader
//! observes a complete snapshot. Writers go through [`SessionState`], whose
//! mutating operations are only reachable from within this crate.

use std::{ops, sync::Arc};

use tokio::sync::watch;

use crate::{AccessToken, AccessTokenRef, RefreshStrategy, RefreshToken, TokenPair};

/// Whatever the client presents to the gateway in order to renew its access token
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshCapability {
    /// A refresh token held by the client and sent explicitly
    Explicit(RefreshToken),
    /// The gateway associates the client with a refresh token through its own
    /// side channel, such as a secure cookie
    Implicit,
}

impl RefreshCapability {
    /// The explicit refresh token, if this capability carries one
    #[inline]
    pub fn refresh_token(&self) -> Option<&RefreshToken> {
        match self {
            Self::Explicit(token) => Some(token),
            Self::Implicit => None,
        }
    }
}

/// Coarse-grained lifecycle phase of the session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No usable access token is held
    Unauthenticated,
    /// A renewal is being attempted in order to obtain a first access token
    Hydrating,
    /// An access token is held
    Authenticated,
    /// The session was terminated after the gateway stopped accepting it
    Expired,
}

/// Generation counter distinguishing one sign-in from the next
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SessionEpoch(pub u64);

impl SessionEpoch {
    #[inline]
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// An immutable snapshot of the session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    access_token: Option<AccessToken>,
    refresh: Option<RefreshCapability>,
    phase: Phase,
    epoch: SessionEpoch,
}

impl Session {
    fn empty(refresh: Option<RefreshCapability>, epoch: SessionEpoch) -> Self {
        Self {
            access_token: None,
            refresh,
            phase: Phase::Unauthenticated,
            epoch,
        }
    }

    /// The current access token
    #[inline]
    pub fn access_token(&self) -> Option<&AccessTokenRef> {
        self.access_token.as_deref()
    }

    /// The current refresh capability
    #[inline]
    pub fn refresh_capability(&self) -> Option<&RefreshCapability> {
        self.refresh.as_ref()
    }

    /// The current lifecycle phase
    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The sign-in generation this snapshot belongs to
    #[inline]
    pub fn epoch(&self) -> SessionEpoch {
        self.epoch
    }

    /// Whether an access token is currently held
    #[inline]
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Determines the capability to hold after the gateway issued `pair`
///
/// A rotated refresh token always wins. Without one, a server-held strategy
/// keeps relying on the side channel while a client-held strategy has nothing
/// left to present.
pub(crate) fn capability_after_sign_in(
    pair: &TokenPair,
    strategy: RefreshStrategy,
) -> Option<RefreshCapability> {
    match (&pair.refresh_token, strategy) {
        (Some(token), _) => Some(RefreshCapability::Explicit(token.clone())),
        (None, RefreshStrategy::ServerHeld) => Some(RefreshCapability::Implicit),
        (None, RefreshStrategy::ClientHeld) => None,
    }
}

/// The single writer of session state
#[derive(Clone, Debug)]
pub(crate) struct SessionState {
    tx: Arc<watch::Sender<Arc<Session>>>,
}

impl SessionState {
    pub(crate) fn new(initial_capability: Option<RefreshCapability>) -> Self {
        let (tx, _) = watch::channel(Arc::new(Session::empty(
            initial_capability,
            SessionEpoch::default(),
        )));
        Self { tx: Arc::new(tx) }
    }

    pub(crate) fn snapshot(&self) -> Arc<Session> {
        Arc::clone(&self.tx.borrow())
    }

    pub(crate) fn subscribe(&self) -> SessionWatcher {
        SessionWatcher {
            watcher: self.tx.subscribe(),
        }
    }

    /// Replaces the session with a freshly issued token pair
    pub(crate) fn sign_in(&self, pair: &TokenPair, strategy: RefreshStrategy) -> Arc<Session> {
        let mut signed_in = None;
        self.tx.send_modify(|current| {
            let next = Arc::new(Session {
                access_token: Some(pair.access_token.clone()),
                refresh: capability_after_sign_in(pair, strategy),
                phase: Phase::Authenticated,
                epoch: current.epoch.next(),
            });
            signed_in = Some(Arc::clone(&next));
            *current = next;
        });
        signed_in.unwrap_or_else(|| self.snapshot())
    }

    /// Drops all tokens, landing in `phase`
    pub(crate) fn clear(&self, phase: Phase) {
        self.tx.send_modify(|current| {
            let mut next = Session::empty(None, current.epoch.next());
            next.phase = phase;
            *current = Arc::new(next);
        });
    }

    /// Marks the session as hydrating if it has no access token yet
    pub(crate) fn begin_hydration(&self) {
        self.tx.send_if_modified(|current| {
            if current.access_token.is_none()
                && current.refresh.is_some()
                && current.phase != Phase::Hydrating
            {
                let mut next = Session::clone(current);
                next.phase = Phase::Hydrating;
                *current = Arc::new(next);
                true
            } else {
                false
            }
        });
    }

    /// Applies a successful renewal that started at `epoch`
    ///
    /// Returns `false` without touching the session if a sign-in or sign-out
    /// has happened since.
    pub(crate) fn apply_renewal(&self, epoch: SessionEpoch, pair: &TokenPair) -> bool {
        self.tx.send_if_modified(|current| {
            if current.epoch != epoch {
                return false;
            }

            let refresh = match &pair.refresh_token {
                Some(rotated) => Some(RefreshCapability::Explicit(rotated.clone())),
                None => current.refresh.clone(),
            };

            *current = Arc::new(Session {
                access_token: Some(pair.access_token.clone()),
                refresh,
                phase: Phase::Authenticated,
                epoch,
            });
            true
        })
    }

    /// Clears the session after a renewal that started at `epoch` failed
    ///
    /// The epoch is kept, so the same session can still be expired by a
    /// request that was waiting on the renewal.
    pub(crate) fn fail_renewal(&self, epoch: SessionEpoch) -> bool {
        self.tx.send_if_modified(|current| {
            if current.epoch != epoch {
                return false;
            }

            *current = Arc::new(Session::empty(None, epoch));
            true
        })
    }

    /// Terminates the session belonging to `epoch`
    ///
    /// A sign-in or sign-out since `epoch` is left alone.
    pub(crate) fn expire(&self, epoch: SessionEpoch) -> bool {
        self.tx.send_if_modified(|current| {
            if current.epoch != epoch || current.phase == Phase::Expired {
                return false;
            }

            let mut next = Session::empty(None, current.epoch.next());
            next.phase = Phase::Expired;
            *current = Arc::new(next);
            true
        })
    }
}

/// A handle that observes session changes
#[derive(Clone, Debug)]
pub struct SessionWatcher {
    watcher: watch::Receiver<Arc<Session>>,
}

/// An outstanding borrow of the session
///
/// This borrow should be held for as brief a time as possible, as outstanding
/// borrows will block session updates.
#[derive(Debug)]
pub struct BorrowedSession<'a> {
    inner: watch::Ref<'a, Arc<Session>>,
}

impl<'a> ops::Deref for BorrowedSession<'a> {
    type Target = Session;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// The session manager that published the session has been dropped
#[derive(Debug, thiserror::Error)]
#[error("session publisher has quit")]
pub struct SessionPublisherQuit(#[from] watch::error::RecvError);

impl SessionWatcher {
    /// Borrows the current session
    pub fn session(&self) -> BorrowedSession<'_> {
        BorrowedSession {
            inner: self.watcher.borrow(),
        }
    }

    /// Waits until a new session snapshot is published
    ///
    /// If the publisher is ever dropped, returns an error indicating that no
    /// new snapshots will be published.
    pub async fn changed(&mut self) -> Result<Arc<Session>, SessionPublisherQuit> {
        self.watcher.changed().await?;
        Ok(Arc::clone(&self.watcher.borrow_and_update()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(access: &'static str, refresh: Option<&'static str>) -> TokenPair {
        TokenPair {
            access_token: AccessToken::from_static(access),
            refresh_token: refresh.map(RefreshToken::from_static),
        }
    }

    #[test]
    fn new_session_is_unauthenticated() {
        let state = SessionState::new(None);
        let session = state.snapshot();
        assert_eq!(session.phase(), Phase::Unauthenticated);
        assert!(session.access_token().is_none());
        assert!(session.refresh_capability().is_none());
    }

    mod when_signing_in {
        use super::*;

        #[test]
        fn explicit_refresh_token_is_held() {
            let state = SessionState::new(None);
            let session = state.sign_in(&pair("A1", Some("R1")), RefreshStrategy::ClientHeld);

            assert_eq!(session.phase(), Phase::Authenticated);
            assert_eq!(session.access_token().map(|t| t.as_str()), Some("A1"));
            assert_eq!(
                session.refresh_capability(),
                Some(&RefreshCapability::Explicit(RefreshToken::from_static("R1")))
            );
        }

        #[test]
        fn server_held_strategy_without_refresh_token_holds_implicit_capability() {
            let state = SessionState::new(None);
            let session = state.sign_in(&pair("A1", None), RefreshStrategy::ServerHeld);
            assert_eq!(
                session.refresh_capability(),
                Some(&RefreshCapability::Implicit)
            );
        }

        #[test]
        fn client_held_strategy_without_refresh_token_holds_nothing() {
            let state = SessionState::new(None);
            let session = state.sign_in(&pair("A1", None), RefreshStrategy::ClientHeld);
            assert!(session.refresh_capability().is_none());
        }

        #[test]
        fn each_sign_in_starts_a_new_epoch() {
            let state = SessionState::new(None);
            let first = state.sign_in(&pair("A1", Some("R1")), RefreshStrategy::ClientHeld);
            let second = state.sign_in(&pair("A2", Some("R2")), RefreshStrategy::ClientHeld);
            assert!(second.epoch() > first.epoch());
        }
    }

    mod when_renewal_completes {
        use super::*;

        #[test]
        fn missing_refresh_token_keeps_previous_capability() {
            let state = SessionState::new(None);
            let epoch = state
                .sign_in(&pair("A1", Some("R1")), RefreshStrategy::ClientHeld)
                .epoch();

            assert!(state.apply_renewal(epoch, &pair("A2", None)));

            let session = state.snapshot();
            assert_eq!(session.access_token().map(|t| t.as_str()), Some("A2"));
            assert_eq!(
                session.refresh_capability(),
                Some(&RefreshCapability::Explicit(RefreshToken::from_static("R1")))
            );
            assert_eq!(session.epoch(), epoch);
        }

        #[test]
        fn rotated_refresh_token_replaces_previous_capability() {
            let state = SessionState::new(None);
            let epoch = state
                .sign_in(&pair("A1", Some("R1")), RefreshStrategy::ClientHeld)
                .epoch();

            assert!(state.apply_renewal(epoch, &pair("A2", Some("R2"))));

            assert_eq!(
                state.snapshot().refresh_capability(),
                Some(&RefreshCapability::Explicit(RefreshToken::from_static("R2")))
            );
        }

        #[test]
        fn stale_epoch_is_ignored() {
            let state = SessionState::new(None);
            let epoch = state
                .sign_in(&pair("A1", Some("R1")), RefreshStrategy::ClientHeld)
                .epoch();
            state.clear(Phase::Unauthenticated);

            assert!(!state.apply_renewal(epoch, &pair("A2", None)));
            assert!(state.snapshot().access_token().is_none());
        }

        #[test]
        fn failure_clears_all_tokens() {
            let state = SessionState::new(None);
            let epoch = state
                .sign_in(&pair("A1", Some("R1")), RefreshStrategy::ClientHeld)
                .epoch();

            assert!(state.fail_renewal(epoch));

            let session = state.snapshot();
            assert_eq!(session.phase(), Phase::Unauthenticated);
            assert_eq!(session.epoch(), epoch);
            assert!(session.access_token().is_none());
            assert!(session.refresh_capability().is_none());
        }
    }

    mod when_expiring {
        use super::*;

        #[test]
        fn matching_epoch_is_expired() {
            let state = SessionState::new(None);
            let epoch = state
                .sign_in(&pair("A1", Some("R1")), RefreshStrategy::ClientHeld)
                .epoch();

            assert!(state.expire(epoch));
            assert_eq!(state.snapshot().phase(), Phase::Expired);
            assert!(state.snapshot().access_token().is_none());
        }

        #[test]
        fn newer_sign_in_is_left_alone() {
            let state = SessionState::new(None);
            let epoch = state
                .sign_in(&pair("A1", Some("R1")), RefreshStrategy::ClientHeld)
                .epoch();
            state.sign_in(&pair("B1", Some("S1")), RefreshStrategy::ClientHeld);

            assert!(!state.expire(epoch));
            assert_eq!(
                state.snapshot().access_token().map(|t| t.as_str()),
                Some("B1")
            );
        }

        #[test]
        fn already_cleared_session_is_marked_expired() {
            let state = SessionState::new(None);
            let epoch = state
                .sign_in(&pair("A1", Some("R1")), RefreshStrategy::ClientHeld)
                .epoch();
            state.fail_renewal(epoch);

            assert!(state.expire(epoch));
            assert_eq!(state.snapshot().phase(), Phase::Expired);
        }

        #[test]
        fn sign_out_since_epoch_is_left_alone() {
            let state = SessionState::new(None);
            let epoch = state
                .sign_in(&pair("A1", Some("R1")), RefreshStrategy::ClientHeld)
                .epoch();
            state.clear(Phase::Unauthenticated);

            assert!(!state.expire(epoch));
            assert_eq!(state.snapshot().phase(), Phase::Unauthenticated);
        }

        #[test]
        fn second_expiry_is_a_no_op() {
            let state = SessionState::new(None);
            let epoch = state
                .sign_in(&pair("A1", Some("R1")), RefreshStrategy::ClientHeld)
                .epoch();

            assert!(state.expire(epoch));
            assert!(!state.expire(epoch));
        }
    }

    #[test]
    fn hydration_requires_a_capability() {
        let state = SessionState::new(None);
        state.begin_hydration();
        assert_eq!(state.snapshot().phase(), Phase::Unauthenticated);

        let state = SessionState::new(Some(RefreshCapability::Implicit));
        state.begin_hydration();
        assert_eq!(state.snapshot().phase(), Phase::Hydrating);
    }

    #[tokio::test]
    async fn watcher_observes_sign_in() {
        let state = SessionState::new(None);
        let mut watcher = state.subscribe();

        state.sign_in(&pair("A1", Some("R1")), RefreshStrategy::ClientHeld);

        let session = watcher.changed().await.unwrap();
        assert_eq!(session.phase(), Phase::Authenticated);
        assert_eq!(watcher.session().phase(), Phase::Authenticated);
    }
}
