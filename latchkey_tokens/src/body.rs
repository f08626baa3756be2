//! Decoding of JSON response bodies shared by the gateway client and the
//! request executor

use reqwest::{header, StatusCode};
use serde_json::Value;

/// Reads the response body, decoding it only if it is declared as JSON
///
/// A body that is absent, not JSON, or not decodable yields `None`.
pub async fn read_json(
    response: reqwest::Response,
) -> Result<(StatusCode, Option<Value>), reqwest::Error> {
    let status = response.status();
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.contains("application/json"));

    let bytes = response.bytes().await?;
    if !is_json || bytes.is_empty() {
        return Ok((status, None));
    }

    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok((status, Some(value))),
        Err(error) => {
            tracing::debug!(
                error = (&error as &dyn std::error::Error),
                response.status = status.as_u16(),
                "response declared JSON but could not be decoded"
            );
            Ok((status, None))
        }
    }
}

/// Produces the caller-facing message for a failed response
///
/// Uses the body's `message` field, then its `error` field, and otherwise a
/// generic description including the status code.
pub fn failure_message(status: StatusCode, data: Option<&Value>) -> String {
    data.and_then(|d| {
        ["message", "error"]
            .iter()
            .filter_map(|field| d.get(field).and_then(Value::as_str))
            .find(|m| !m.is_empty())
    })
    .map_or_else(
        || format!("Request failed ({})", status.as_u16()),
        ToOwned::to_owned,
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response(content_type: Option<&str>, body: &'static str) -> reqwest::Response {
        let mut builder = http::Response::builder().status(400);
        if let Some(ct) = content_type {
            builder = builder.header(header::CONTENT_TYPE, ct);
        }
        builder.body(body).unwrap().into()
    }

    #[test]
    fn message_field_takes_precedence() {
        let data = json!({ "message": "email taken", "error": "conflict" });
        assert_eq!(
            failure_message(StatusCode::CONFLICT, Some(&data)),
            "email taken"
        );
    }

    #[test]
    fn error_field_is_used_without_message() {
        let data = json!({ "error": "invalid credentials" });
        assert_eq!(
            failure_message(StatusCode::UNAUTHORIZED, Some(&data)),
            "invalid credentials"
        );
    }

    #[test]
    fn generic_message_includes_status() {
        assert_eq!(
            failure_message(StatusCode::BAD_GATEWAY, None),
            "Request failed (502)"
        );
        assert_eq!(
            failure_message(StatusCode::BAD_GATEWAY, Some(&json!({ "detail": 1 }))),
            "Request failed (502)"
        );
    }

    #[tokio::test]
    async fn json_body_is_decoded() {
        let (status, data) = read_json(response(
            Some("application/json; charset=utf-8"),
            r#"{"message":"nope"}"#,
        ))
        .await
        .unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(data, Some(json!({ "message": "nope" })));
    }

    #[tokio::test]
    async fn non_json_body_is_null() {
        let (_, data) = read_json(response(Some("text/html"), "<h1>oops</h1>"))
            .await
            .unwrap();
        assert_eq!(data, None);
    }

    #[tokio::test]
    async fn undecodable_json_is_null() {
        let (_, data) = read_json(response(Some("application/json"), "{not json"))
            .await
            .unwrap();
        assert_eq!(data, None);
    }

    #[tokio::test]
    async fn empty_body_is_null() {
        let (_, data) = read_json(response(None, "")).await.unwrap();
        assert_eq!(data, None);
    }
}
