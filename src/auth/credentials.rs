//! Credential pair and token newtypes

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Short, non-reversible tag for a secret so logs can tell tokens apart.
fn fingerprint(secret: &str) -> String {
    let hash = Sha256::digest(secret.as_bytes());
    URL_SAFE_NO_PAD.encode(&hash[..6])
}

/// Short-lived credential attached to protected API calls
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw access token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `Authorization` header value
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// Log-safe fingerprint of the token
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessToken({})", self.fingerprint())
    }
}

impl From<&str> for AccessToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AccessToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Longer-lived credential used only to mint a new access token
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefreshToken(String);

impl RefreshToken {
    /// Wrap a raw refresh token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RefreshToken({})", fingerprint(&self.0))
    }
}

impl From<&str> for RefreshToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RefreshToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Access/refresh token pair.
///
/// Both halves always travel together; there is no way to build or persist
/// one without the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Token for protected API calls
    pub access_token: AccessToken,
    /// Token for the refresh endpoint
    pub refresh_token: RefreshToken,
}

impl Credentials {
    /// Create a credential pair
    pub fn new(access_token: impl Into<AccessToken>, refresh_token: impl Into<RefreshToken>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// Token body returned by the login and refresh endpoints.
///
/// The backend answers either flat or wrapped in a `data` envelope, camelCase
/// or snake_case. Both fields are optional here; callers decide what a missing
/// field means.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenPayload {
    #[serde(default, alias = "access_token", alias = "token")]
    #[serde(rename = "accessToken")]
    pub access_token: Option<String>,
    #[serde(default, alias = "refresh_token")]
    #[serde(rename = "refreshToken")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenEnvelope {
    #[serde(flatten)]
    top: TokenPayload,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl TokenPayload {
    /// Parse a login/refresh response body.
    ///
    /// Top-level tokens win; `data` is only consulted when the top level
    /// carries no access token.
    pub(crate) fn parse(body: &str) -> serde_json::Result<Self> {
        let TokenEnvelope { top, data } = serde_json::from_str(body)?;
        if top.access_token().is_some() {
            return Ok(top);
        }
        let wrapped = data
            .and_then(|value| serde_json::from_value::<TokenPayload>(value).ok())
            .filter(|payload| payload.access_token().is_some());
        Ok(wrapped.unwrap_or(top))
    }

    /// New access token, ignoring empty strings
    pub(crate) fn access_token(&self) -> Option<AccessToken> {
        self.access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(AccessToken::from)
    }

    /// New refresh token, ignoring empty strings
    pub(crate) fn refresh_token(&self) -> Option<RefreshToken> {
        self.refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(RefreshToken::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_header() {
        let token = AccessToken::new("abc123");
        assert_eq!(token.bearer(), "Bearer abc123");
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let creds = Credentials::new("super-secret-access", "super-secret-refresh");
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("super-secret-access"));
        assert!(!rendered.contains("super-secret-refresh"));
        assert!(rendered.contains(&creds.access_token.fingerprint()));
    }

    #[test]
    fn test_credentials_json_shape() {
        let creds = Credentials::new("T1", "R1");
        let json = serde_json::to_value(&creds).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "accessToken": "T1", "refreshToken": "R1" })
        );
    }

    #[test]
    fn test_payload_flat_camel_case() {
        let payload = TokenPayload::parse(r#"{"accessToken":"T2","refreshToken":"R2"}"#).unwrap();
        assert_eq!(payload.access_token(), Some(AccessToken::new("T2")));
        assert_eq!(payload.refresh_token(), Some(RefreshToken::new("R2")));
    }

    #[test]
    fn test_payload_data_envelope() {
        let payload =
            TokenPayload::parse(r#"{"success":true,"data":{"access_token":"T2"}}"#).unwrap();
        assert_eq!(payload.access_token(), Some(AccessToken::new("T2")));
        assert_eq!(payload.refresh_token(), None);
    }

    #[test]
    fn test_payload_top_level_tokens_beat_unrelated_data() {
        let payload = TokenPayload::parse(
            r#"{"accessToken":"T2","refreshToken":"R2","data":{"user":{"id":7}}}"#,
        )
        .unwrap();
        assert_eq!(payload.access_token(), Some(AccessToken::new("T2")));
        assert_eq!(payload.refresh_token(), Some(RefreshToken::new("R2")));

        let payload = TokenPayload::parse(r#"{"accessToken":"T2","data":"welcome"}"#).unwrap();
        assert_eq!(payload.access_token(), Some(AccessToken::new("T2")));
    }

    #[test]
    fn test_payload_without_tokens() {
        let payload = TokenPayload::parse(r#"{"message":"ok"}"#).unwrap();
        assert!(payload.access_token().is_none());

        let payload = TokenPayload::parse(r#"{"accessToken":""}"#).unwrap();
        assert!(payload.access_token().is_none());

        let payload = TokenPayload::parse(r#"{"data":null}"#).unwrap();
        assert!(payload.access_token().is_none());
    }

    #[test]
    fn test_payload_rejects_non_object() {
        assert!(TokenPayload::parse("not json").is_err());
    }
}
