//! DTOs for interacting with the identity gateway

use serde::{Deserialize, Serialize, Serializer};

use crate::{AccessToken, GatewayError, RefreshCapability, RefreshToken, TokenPair};

/// The body presented when renewing or signing out
///
/// An explicit capability is sent as `{"refreshToken": …}`; an implicit one
/// sends an empty object and lets the ambient channel identify the client.
#[derive(Debug)]
pub struct CapabilityBody<'a>(pub &'a RefreshCapability);

impl Serialize for CapabilityBody<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("CapabilityBody", 1)?;
        match self.0 {
            RefreshCapability::Explicit(token) => {
                ser.serialize_field("refreshToken", token)?;
            }
            RefreshCapability::Implicit => {
                ser.skip_field("refreshToken")?;
            }
        }
        ser.end()
    }
}

/// A token response as returned by the gateway
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    /// The access token, accepted under `accessToken` or `token`
    #[serde(default, alias = "token", skip_serializing_if = "Option::is_none")]
    pub access_token: Option<AccessToken>,
    /// The rotated refresh token, if the client holds it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<RefreshToken>,
}

impl TokenResponse {
    /// Converts into a token pair, failing if no access token was issued
    pub fn into_pair(self, operation: &'static str) -> Result<TokenPair, GatewayError> {
        let access_token = self
            .access_token
            .filter(|t| !t.as_str().is_empty())
            .ok_or(GatewayError::ProtocolViolation { operation })?;

        Ok(TokenPair {
            access_token,
            refresh_token: self.refresh_token.filter(|t| !t.as_str().is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn explicit_capability_is_sent_in_body() {
        let capability = RefreshCapability::Explicit(RefreshToken::from_static("R1"));
        assert_eq!(
            serde_json::to_value(CapabilityBody(&capability)).unwrap(),
            json!({ "refreshToken": "R1" })
        );
    }

    #[test]
    fn implicit_capability_sends_empty_object() {
        assert_eq!(
            serde_json::to_value(CapabilityBody(&RefreshCapability::Implicit)).unwrap(),
            json!({})
        );
    }

    #[test]
    fn token_alias_is_accepted() {
        let resp: TokenResponse = serde_json::from_value(json!({ "token": "A1" })).unwrap();
        let pair = resp.into_pair("login").unwrap();
        assert_eq!(pair.access_token.as_str(), "A1");
        assert!(pair.refresh_token.is_none());
    }

    #[test]
    fn missing_access_token_is_a_protocol_violation() {
        let resp: TokenResponse =
            serde_json::from_value(json!({ "refreshToken": "R1" })).unwrap();
        assert!(matches!(
            resp.into_pair("register"),
            Err(GatewayError::ProtocolViolation {
                operation: "register"
            })
        ));
    }

    #[test]
    fn empty_refresh_token_is_treated_as_absent() {
        let resp: TokenResponse =
            serde_json::from_value(json!({ "accessToken": "A1", "refreshToken": "" })).unwrap();
        assert!(resp.into_pair("refresh").unwrap().refresh_token.is_none());
    }
}
