//! Notification of session expiry to the host application

use crate::SessionExpired;

/// Receives a notification each time a request ends in an expired session
///
/// The executor calls [`session_expired()`][Self::session_expired()] exactly
/// once for every [`SessionExpired`] it returns, after the session's tokens
/// have been cleared. Implementations typically send the user back to the
/// sign-in flow. Any `Fn(&SessionExpired)` closure can be used as an observer.
pub trait SessionExpiryObserver: Send + Sync {
    /// Called once per terminal session expiry
    fn session_expired(&self, event: &SessionExpired);
}

impl<F> SessionExpiryObserver for F
where
    F: Fn(&SessionExpired) + Send + Sync,
{
    #[inline]
    fn session_expired(&self, event: &SessionExpired) {
        self(event)
    }
}

/// An observer that only records the expiry in the log
#[derive(Clone, Copy, Debug, Default)]
pub struct LogExpiry;

impl SessionExpiryObserver for LogExpiry {
    fn session_expired(&self, event: &SessionExpired) {
        tracing::warn!(reason = %event.reason(), "session expired, sign-in required");
    }
}
