//! Credential data types.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::error::RenewalError;

/// Access-token lifetime assumed when the server omits `expires_in`.
const FALLBACK_ACCESS_TTL_SECS: i64 = 15 * 60;
/// Refresh-token lifetime assumed when the server omits `refresh_expires_in`.
const FALLBACK_REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Token payload returned by the login and refresh endpoints.
///
/// Every field is optional on the wire; [`Credential::from_token_response`]
/// decides what is acceptable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access-token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Refresh-token lifetime in seconds.
    #[serde(default)]
    pub refresh_expires_in: Option<i64>,
}

/// A complete access/refresh credential pair.
///
/// Always written and cleared as one unit.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

impl Credential {
    /// Build a credential from a token response received at `now`.
    pub fn from_token_response(
        response: TokenResponse,
        now: DateTime<Utc>,
    ) -> Result<Self, RenewalError> {
        let access_token = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(RenewalError::MissingToken("access_token"))?;
        let refresh_token = response
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(RenewalError::MissingToken("refresh_token"))?;

        let access_ttl = response.expires_in.unwrap_or(FALLBACK_ACCESS_TTL_SECS);
        let refresh_ttl = response
            .refresh_expires_in
            .unwrap_or(FALLBACK_REFRESH_TTL_SECS);

        Ok(Self {
            access_token,
            refresh_token,
            access_expires_at: expiry_after(now, access_ttl, "expires_in")?,
            refresh_expires_at: expiry_after(now, refresh_ttl, "refresh_expires_in")?,
        })
    }

    /// Time left before the access token expires (negative once expired).
    #[inline]
    pub fn access_remaining(&self, now: DateTime<Utc>) -> Duration {
        self.access_expires_at - now
    }

    /// Check if the access token expires within `window` of `now`.
    #[inline]
    pub fn access_expires_within(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.access_remaining(now) < window
    }

    /// Check if the refresh token has expired.
    #[inline]
    pub fn is_refresh_expired(&self, now: DateTime<Utc>) -> bool {
        self.refresh_expires_at <= now
    }

    /// `Authorization` header value for this credential.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// `now + ttl_secs`, rejecting lifetimes chrono cannot represent.
fn expiry_after(
    now: DateTime<Utc>,
    ttl_secs: i64,
    field: &'static str,
) -> Result<DateTime<Utc>, RenewalError> {
    Duration::try_seconds(ttl_secs.max(0))
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| RenewalError::InvalidResponse(format!("{field} out of range: {ttl_secs}")))
}

// Tokens stay out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(access: Option<&str>, refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: access.map(str::to_string),
            refresh_token: refresh.map(str::to_string),
            expires_in: Some(900),
            refresh_expires_in: Some(86400),
        }
    }

    #[test]
    fn test_from_token_response_computes_expiry() {
        let now = Utc::now();
        let credential =
            Credential::from_token_response(response(Some("a1"), Some("r1")), now).unwrap();

        assert_eq!(credential.access_token, "a1");
        assert_eq!(credential.refresh_token, "r1");
        assert_eq!(credential.access_expires_at, now + Duration::seconds(900));
        assert_eq!(credential.refresh_expires_at, now + Duration::seconds(86400));
        assert_eq!(credential.bearer(), "Bearer a1");
    }

    #[test]
    fn test_missing_tokens_are_rejected() {
        let now = Utc::now();
        assert_eq!(
            Credential::from_token_response(response(None, Some("r1")), now),
            Err(RenewalError::MissingToken("access_token"))
        );
        assert_eq!(
            Credential::from_token_response(response(Some("a1"), Some("")), now),
            Err(RenewalError::MissingToken("refresh_token"))
        );
    }

    #[test]
    fn test_missing_lifetimes_fall_back() {
        let now = Utc::now();
        let credential = Credential::from_token_response(
            TokenResponse {
                access_token: Some("a1".to_string()),
                refresh_token: Some("r1".to_string()),
                ..Default::default()
            },
            now,
        )
        .unwrap();

        assert!(!credential.access_expires_within(Duration::minutes(5), now));
        assert!(!credential.is_refresh_expired(now));
    }

    #[test]
    fn test_out_of_range_lifetimes_are_rejected() {
        let now = Utc::now();
        let mut huge = response(Some("a1"), Some("r1"));
        huge.expires_in = Some(i64::MAX);
        assert!(matches!(
            Credential::from_token_response(huge, now),
            Err(RenewalError::InvalidResponse(msg)) if msg.contains("expires_in")
        ));

        let mut huge = response(Some("a1"), Some("r1"));
        huge.refresh_expires_in = Some(9_000_000_000_000_000);
        assert!(matches!(
            Credential::from_token_response(huge, now),
            Err(RenewalError::InvalidResponse(msg)) if msg.contains("refresh_expires_in")
        ));

        // Negative lifetimes mean "already expired", not an error.
        let mut negative = response(Some("a1"), Some("r1"));
        negative.expires_in = Some(i64::MIN);
        let credential = Credential::from_token_response(negative, now).unwrap();
        assert_eq!(credential.access_expires_at, now);
    }

    #[test]
    fn test_expiry_window() {
        let now = Utc::now();
        let mut credential =
            Credential::from_token_response(response(Some("a1"), Some("r1")), now).unwrap();
        credential.access_expires_at = now + Duration::minutes(4);

        assert!(credential.access_expires_within(Duration::minutes(5), now));
        assert!(!credential.access_expires_within(Duration::minutes(3), now));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let credential =
            Credential::from_token_response(response(Some("secret-a"), Some("secret-r")), Utc::now())
                .unwrap();
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("secret-a"));
        assert!(!debug.contains("secret-r"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_token_response_tolerates_extra_and_missing_fields() {
        let parsed: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","token_type":"Bearer"}"#).unwrap();
        assert_eq!(parsed.access_token.as_deref(), Some("a"));
        assert!(parsed.refresh_token.is_none());
        assert!(parsed.expires_in.is_none());
    }
}
