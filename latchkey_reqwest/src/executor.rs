use std::{fmt, sync::Arc};

use latchkey_tokens::{body, AccessTokenRef, Gateway, SessionEpoch, SessionManager};
use predicates::prelude::*;
use reqwest::{
    header::{self, HeaderValue},
    Request, StatusCode,
};
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use url::Url;

use crate::{
    attach::{self, HttpsOrLoopback},
    ApiResponse, AuthenticatedRequest, ExpiryReason, RequestFailed, SessionExpired,
    SessionExpiryObserver,
};

/// Sends requests on behalf of the signed-in user
///
/// Each request carries the session's current access token. When the server
/// answers `401 Unauthorized`, the token is renewed through the session's
/// coordinator and the request is sent once more. If that is not possible,
/// or the retry is also refused, the session is expired, the observer is
/// notified, and the caller gets [`SessionExpired`].
///
/// A `401` to a request that did not carry the session's token, because the
/// predicate kept it off or the caller supplied its own `Authorization`
/// header, says nothing about the session. It is returned as an ordinary
/// failure without renewing.
///
/// By default the access token is only sent over HTTPS or to a loopback host.
/// To change this behavior, provide a custom predicate with
/// [`with_predicate()`][Self::with_predicate()].
pub struct AuthenticatedClient<G, P = HttpsOrLoopback> {
    http: ClientWithMiddleware,
    base_url: Url,
    session: SessionManager<G>,
    observer: Arc<dyn SessionExpiryObserver>,
    predicate: P,
}

impl<G> AuthenticatedClient<G> {
    /// Constructs an executor for the API rooted at `base_url`
    pub fn new(
        http: impl Into<ClientWithMiddleware>,
        mut base_url: Url,
        session: SessionManager<G>,
        observer: impl SessionExpiryObserver + 'static,
    ) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Self {
            http: http.into(),
            base_url,
            session,
            observer: Arc::new(observer),
            predicate: HttpsOrLoopback,
        }
    }
}

impl<G, P> AuthenticatedClient<G, P> {
    /// Replaces the default attachment predicate with a custom predicate
    pub fn with_predicate<Q>(self, predicate: Q) -> AuthenticatedClient<G, Q> {
        AuthenticatedClient {
            http: self.http,
            base_url: self.base_url,
            session: self.session,
            observer: self.observer,
            predicate,
        }
    }

    /// The session whose access token is attached
    #[inline]
    pub fn session(&self) -> &SessionManager<G> {
        &self.session
    }

    /// The base URL request paths are resolved against
    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn resolve(&self, path: &str) -> Result<Url, RequestFailed> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|source| RequestFailed::InvalidPath {
                path: path.to_owned(),
                source,
            })
    }
}

impl<G, P> AuthenticatedClient<G, P>
where
    G: Gateway + 'static,
    P: Predicate<Request> + Send + Sync,
{
    /// Sends `request`, renewing the session and retrying once on `401`
    #[tracing::instrument(
        skip_all,
        fields(http.method = %request.method(), http.path = request.path()),
    )]
    pub async fn execute(
        &self,
        request: &AuthenticatedRequest,
    ) -> Result<ApiResponse, RequestFailed> {
        let url = self.resolve(request.path())?;
        let session = self.session.snapshot();
        let used = session.access_token();

        let (response, attached) = self.send(request, &url, used).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return response.into_result();
        }

        if used.is_some() && !attached {
            tracing::debug!("unauthorized, but the session's access token was not sent");
            return response.into_result();
        }

        tracing::debug!(has_access_token = used.is_some(), "authorization expired");

        if !request.retries_on_unauthorized() {
            return Err(self.session_expired(session.epoch(), ExpiryReason::RetryDisallowed));
        }

        if session.refresh_capability().is_none() {
            return Err(self.session_expired(session.epoch(), ExpiryReason::NoRefreshCapability));
        }

        let renewed = match self.session.coordinator().renew_stale(used).await {
            Ok(token) => token,
            Err(error) => {
                return Err(
                    self.session_expired(session.epoch(), ExpiryReason::RenewalFailed(error))
                );
            }
        };

        let (response, attached) = self.send(request, &url, Some(&*renewed)).await?;
        if response.status() == StatusCode::UNAUTHORIZED && attached {
            return Err(self.session_expired(session.epoch(), ExpiryReason::StillUnauthorized));
        }

        response.into_result()
    }

    /// Sends a `GET` request for `path`
    pub async fn get(&self, path: &str) -> Result<ApiResponse, RequestFailed> {
        self.execute(&AuthenticatedRequest::get(path)).await
    }

    /// Sends a `POST` request for `path` with a JSON body
    pub async fn post_json<T>(&self, path: &str, body: &T) -> Result<ApiResponse, RequestFailed>
    where
        T: Serialize + ?Sized,
    {
        let request = AuthenticatedRequest::post(path).json(body)?;
        self.execute(&request).await
    }

    async fn send(
        &self,
        request: &AuthenticatedRequest,
        url: &Url,
        token: Option<&AccessTokenRef>,
    ) -> Result<(ApiResponse, bool), RequestFailed> {
        let mut req = Request::new(request.method().clone(), url.clone());
        *req.headers_mut() = request.headers().clone();

        if let Some(body) = request.body() {
            req.headers_mut()
                .entry(header::CONTENT_TYPE)
                .or_insert(HeaderValue::from_static("application/json"));
            *req.body_mut() = Some(body.clone().into());
        }

        let mut attached = false;
        if let Some(token) = token {
            if self.predicate.eval(&req) {
                attached = attach::attach(&mut req, token).map_err(RequestFailed::InvalidToken)?;
            } else {
                tracing::debug!(
                    predicate = %self.predicate,
                    "request not eligible for access token, sending without it"
                );
            }
        }

        let response = self
            .http
            .execute(req)
            .await
            .map_err(RequestFailed::Network)?;
        let (status, data) = body::read_json(response)
            .await
            .map_err(|error| RequestFailed::Network(error.into()))?;

        tracing::debug!(response.status = status.as_u16(), "received response");

        Ok((ApiResponse::new(status, data), attached))
    }

    fn session_expired(&self, epoch: SessionEpoch, reason: ExpiryReason) -> RequestFailed {
        self.session.expire(epoch);

        let expired = SessionExpired::new(reason);
        tracing::warn!(
            reason = %expired.reason(),
            error = (&expired as &dyn std::error::Error),
            "request failed with expired session"
        );
        self.observer.session_expired(&expired);

        RequestFailed::SessionExpired(expired)
    }
}

impl<G, P: Clone> Clone for AuthenticatedClient<G, P> {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            session: self.session.clone(),
            observer: Arc::clone(&self.observer),
            predicate: self.predicate.clone(),
        }
    }
}

impl<G, P: fmt::Debug> fmt::Debug for AuthenticatedClient<G, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("base_url", &self.base_url.as_str())
            .field("predicate", &self.predicate)
            .finish_non_exhaustive()
    }
}
