//! Descriptions of outgoing requests and their decoded responses

use bytes::Bytes;
use latchkey_tokens::body;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::RequestFailed;

/// One outgoing call to be made on behalf of the signed-in user
#[derive(Clone, Debug)]
pub struct AuthenticatedRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<Bytes>,
    retry_on_unauthorized: bool,
}

impl AuthenticatedRequest {
    /// Constructs a request for `path`, relative to the executor's base URL
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            retry_on_unauthorized: true,
        }
    }

    /// Constructs a `GET` request
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Constructs a `POST` request
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Constructs a `PUT` request
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Constructs a `DELETE` request
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Sets a JSON body
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, serde_json::Error> {
        self.body = Some(Bytes::from(serde_json::to_vec(body)?));
        Ok(self)
    }

    /// Adds a header
    ///
    /// An `Authorization` header set here is sent as-is and is never replaced
    /// by the session's access token.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Fails with an expired session on `401` instead of renewing and retrying
    pub fn without_retry(mut self) -> Self {
        self.retry_on_unauthorized = false;
        self
    }

    /// The request method
    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The path relative to the executor's base URL
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Extra headers
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The serialized JSON body
    #[inline]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Whether a `401` may trigger a renewal and a single retry
    #[inline]
    pub fn retries_on_unauthorized(&self) -> bool {
        self.retry_on_unauthorized
    }
}

/// A decoded response
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    status: StatusCode,
    data: Option<Value>,
}

impl ApiResponse {
    /// Constructs a response from its status and decoded body
    pub fn new(status: StatusCode, data: Option<Value>) -> Self {
        Self { status, data }
    }

    /// The HTTP status
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The decoded JSON body, `None` if the body was absent or not JSON
    #[inline]
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Takes the decoded JSON body
    #[inline]
    pub fn into_data(self) -> Option<Value> {
        self.data
    }

    /// Deserializes the body, treating an absent body as `null`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(self.data.as_ref().unwrap_or(&Value::Null))
    }

    pub(crate) fn into_result(self) -> Result<Self, RequestFailed> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(RequestFailed::Business {
                status: self.status,
                message: body::failure_message(self.status, self.data.as_ref()),
                data: self.data,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Me {
        email: String,
    }

    #[test]
    fn requests_retry_by_default() {
        assert!(AuthenticatedRequest::get("/me").retries_on_unauthorized());
        assert!(!AuthenticatedRequest::get("/me")
            .without_retry()
            .retries_on_unauthorized());
    }

    #[test]
    fn json_body_is_serialized_once() {
        let req = AuthenticatedRequest::post("/notes")
            .json(&json!({ "text": "hi" }))
            .unwrap();
        assert_eq!(req.body().map(|b| &b[..]), Some(&br#"{"text":"hi"}"#[..]));
    }

    #[test]
    fn typed_body_is_decoded() {
        let resp = ApiResponse::new(StatusCode::OK, Some(json!({ "email": "a@b.com" })));
        assert_eq!(
            resp.json::<Me>().unwrap(),
            Me {
                email: "a@b.com".to_owned()
            }
        );
    }

    #[test]
    fn absent_body_is_null() {
        let resp = ApiResponse::new(StatusCode::NO_CONTENT, None);
        assert_eq!(resp.json::<Option<Me>>().unwrap(), None);
    }

    #[test]
    fn failure_status_becomes_business_error() {
        let resp = ApiResponse::new(
            StatusCode::FORBIDDEN,
            Some(json!({ "message": "not your note" })),
        );
        match resp.into_result() {
            Err(RequestFailed::Business {
                status, message, ..
            }) => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(message, "not your note");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
