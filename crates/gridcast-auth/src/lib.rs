//! Publisher authentication and SAS token signing.
//!
//! Inbound, a publisher presents one of three credentials: the plain shared
//! key (`aeg-sas-key`), a signed token (`aeg-sas-token`), or the same token
//! carried on `Authorization: SharedAccessSignature ...`. Outbound, the
//! Service-Bus sender signs a `SharedAccessSignature sr=...&sig=...` token
//! for every delivery.
//!
//! Both directions use HMAC-SHA256. The inbound token signature is
//! recomputed over the UN-escaped `r={resource}&e={expiry}` body; URL
//! escaping is applied only when a token is composed, never when the
//! signature input is rebuilt.

use base64::Engine as _;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the plain shared key.
pub const SAS_KEY_HEADER: &str = "aeg-sas-key";

/// Header carrying a signed SAS token.
pub const SAS_TOKEN_HEADER: &str = "aeg-sas-token";

/// `Authorization` scheme prefix for a signed SAS token.
pub const SAS_AUTHORIZATION_SCHEME: &str = "SharedAccessSignature ";

/// How long an outbound Service-Bus token stays valid.
const SERVICE_BUS_TOKEN_TTL_SECS: i64 = 60;

/// Authentication failures. All map to an unauthorized response.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No recognized credential header was supplied.
    #[error("no credential supplied")]
    MissingCredential,

    /// The shared key did not match the topic key.
    #[error("shared access key does not match")]
    KeyMismatch,

    /// The token did not have the `r=...&e=...&s=...` shape.
    #[error("malformed shared access signature token")]
    MalformedToken,

    /// The token expiry is in the past (or unparseable).
    #[error("shared access signature token has expired")]
    TokenExpired,

    /// The recomputed signature did not match the token's.
    #[error("shared access signature does not match")]
    SignatureMismatch,
}

/// A decoded inbound SAS token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasToken {
    pub resource: String,
    pub expiry: String,
    pub signature: String,
}

/// Checks a request's credentials against the topic key. The three forms
/// are tried in order: plain key, token header, `Authorization` scheme.
pub fn authenticate(
    topic_key: &str,
    sas_key: Option<&str>,
    sas_token: Option<&str>,
    authorization: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), AuthError> {
    let mut last_error = None;

    if let Some(provided) = sas_key {
        if shared_key_matches(provided, topic_key) {
            return Ok(());
        }
        last_error = Some(AuthError::KeyMismatch);
    }

    if let Some(token) = sas_token {
        match verify_sas_token(token, topic_key, now) {
            Ok(()) => return Ok(()),
            Err(e) => last_error = Some(e),
        }
    }

    if let Some(value) = authorization {
        if let Some(token) = value.strip_prefix(SAS_AUTHORIZATION_SCHEME) {
            match verify_sas_token(token.trim(), topic_key, now) {
                Ok(()) => return Ok(()),
                Err(e) => last_error = Some(e),
            }
        }
    }

    Err(last_error.unwrap_or(AuthError::MissingCredential))
}

/// Ordinal, case-insensitive shared-key comparison.
pub fn shared_key_matches(provided: &str, expected: &str) -> bool {
    provided.eq_ignore_ascii_case(expected)
}

/// Verifies a signed `r=...&e=...&s=...` token: the expiry must be in the
/// future and the signature must equal HMAC-SHA256 over the un-escaped
/// `r={resource}&e={expiry}` body.
pub fn verify_sas_token(token: &str, key: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
    let parsed = parse_sas_token(token).ok_or(AuthError::MalformedToken)?;

    let expiry = parse_expiry(&parsed.expiry).ok_or(AuthError::TokenExpired)?;
    if expiry <= now {
        return Err(AuthError::TokenExpired);
    }

    let expected = sign(key, &format!("r={}&e={}", parsed.resource, parsed.expiry));
    if expected != parsed.signature {
        return Err(AuthError::SignatureMismatch);
    }
    Ok(())
}

/// Splits a token into its URL-decoded components.
pub fn parse_sas_token(token: &str) -> Option<SasToken> {
    let mut resource = None;
    let mut expiry = None;
    let mut signature = None;

    for part in token.split('&') {
        let (name, value) = part.split_once('=')?;
        let decoded = urlencoding::decode(value).ok()?.into_owned();
        match name {
            "r" => resource = Some(decoded),
            "e" => expiry = Some(decoded),
            "s" => signature = Some(decoded),
            _ => return None,
        }
    }

    Some(SasToken {
        resource: resource?,
        expiry: expiry?,
        signature: signature?,
    })
}

/// Composes a signed token the way a real client would: components are
/// URL-escaped in the token, while the signature body uses the raw values.
pub fn compose_sas_token(resource: &str, expiry: &str, key: &str) -> String {
    let signature = sign(key, &format!("r={resource}&e={expiry}"));
    format!(
        "r={}&e={}&s={}",
        urlencoding::encode(resource),
        urlencoding::encode(expiry),
        urlencoding::encode(&signature)
    )
}

/// Signs an outbound Service-Bus token for `resource_uri`, valid for sixty
/// seconds from `now`:
/// `SharedAccessSignature sr=<urlenc uri>&sig=<urlenc base64 hmac>&se=<epoch>&skn=<key name>`.
/// The string-to-sign is `urlencode(uri) + "\n" + epoch`.
pub fn service_bus_sas(
    resource_uri: &str,
    key_name: &str,
    key: &str,
    now: DateTime<Utc>,
) -> String {
    let expiry = (now + Duration::seconds(SERVICE_BUS_TOKEN_TTL_SECS)).timestamp();
    let encoded_uri = urlencoding::encode(resource_uri).into_owned();
    let signature = sign(key, &format!("{encoded_uri}\n{expiry}"));
    format!(
        "SharedAccessSignature sr={encoded_uri}&sig={}&se={expiry}&skn={key_name}",
        urlencoding::encode(&signature)
    )
}

fn sign(key: &str, body: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("hmac accepts any key length");
    mac.update(body.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Parses a token expiry. Accepts RFC 3339 and the bare
/// `YYYY-MM-DD HH:MM:SS` form (interpreted as UTC).
fn parse_expiry(expiry: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(expiry) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(expiry, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "TopicKey1";

    fn future_expiry() -> String {
        (Utc::now() + Duration::hours(1)).to_rfc3339()
    }

    #[test]
    fn shared_key_comparison_is_case_insensitive() {
        assert!(shared_key_matches("topickey1", KEY));
        assert!(shared_key_matches(KEY, KEY));
        assert!(!shared_key_matches("other", KEY));
    }

    #[test]
    fn composed_token_round_trips() {
        let token = compose_sas_token("https://localhost:60101/api/events", &future_expiry(), KEY);
        assert!(verify_sas_token(&token, KEY, Utc::now()).is_ok());
    }

    #[test]
    fn escaped_components_decode_before_signature_recompute() {
        // The resource contains characters that must be escaped in the
        // token but signed raw.
        let resource = "https://localhost:60101/api/events?x=1&y=2";
        let token = compose_sas_token(resource, &future_expiry(), KEY);
        assert!(token.contains("%3A"));
        assert!(verify_sas_token(&token, KEY, Utc::now()).is_ok());
    }

    #[test]
    fn wrong_key_fails_signature_check() {
        let token = compose_sas_token("r1", &future_expiry(), KEY);
        assert!(matches!(
            verify_sas_token(&token, "WrongKey", Utc::now()),
            Err(AuthError::SignatureMismatch)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let expiry = (Utc::now() - Duration::hours(1)).to_rfc3339();
        let token = compose_sas_token("r1", &expiry, KEY);
        assert!(matches!(
            verify_sas_token(&token, KEY, Utc::now()),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let token = compose_sas_token("r1", &future_expiry(), KEY);
        let tampered = token.replace("r=r1", "r=r2");
        assert!(verify_sas_token(&tampered, KEY, Utc::now()).is_err());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for token in ["", "r=only", "r=a&e=b", "nonsense", "r=a&e=b&s=c&x=d"] {
            let result = verify_sas_token(token, KEY, Utc::now());
            assert!(result.is_err(), "token '{token}' should not verify");
        }
    }

    #[test]
    fn bare_datetime_expiry_is_accepted() {
        let expiry = (Utc::now() + Duration::hours(1))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let token = compose_sas_token("r1", &expiry, KEY);
        assert!(verify_sas_token(&token, KEY, Utc::now()).is_ok());
    }

    #[test]
    fn authenticate_tries_credentials_in_order() {
        let now = Utc::now();
        let token = compose_sas_token("r1", &future_expiry(), KEY);

        // Plain key wins.
        assert!(authenticate(KEY, Some(KEY), None, None, now).is_ok());
        // Token header.
        assert!(authenticate(KEY, None, Some(&token), None, now).is_ok());
        // Authorization scheme.
        let authorization = format!("{SAS_AUTHORIZATION_SCHEME}{token}");
        assert!(authenticate(KEY, None, None, Some(&authorization), now).is_ok());
        // Wrong plain key, valid token: the later form still authenticates.
        assert!(authenticate(KEY, Some("wrong"), Some(&token), None, now).is_ok());
    }

    #[test]
    fn authenticate_without_credentials_is_missing() {
        assert!(matches!(
            authenticate(KEY, None, None, None, Utc::now()),
            Err(AuthError::MissingCredential)
        ));
    }

    #[test]
    fn authenticate_with_wrong_key_is_mismatch() {
        assert!(matches!(
            authenticate(KEY, Some("wrong"), None, None, Utc::now()),
            Err(AuthError::KeyMismatch)
        ));
    }

    #[test]
    fn service_bus_token_has_the_expected_shape() {
        let now = Utc::now();
        let token = service_bus_sas(
            "https://my-namespace.servicebus.windows.net/orders-in",
            "RootManageSharedAccessKey",
            "c2VjcmV0",
            now,
        );
        assert!(token.starts_with("SharedAccessSignature sr=https%3A%2F%2F"));
        assert!(token.contains("&sig="));
        assert!(token.contains("&skn=RootManageSharedAccessKey"));

        let expiry: i64 = token
            .split("&se=")
            .nth(1)
            .unwrap()
            .split('&')
            .next()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(expiry, now.timestamp() + 60);
    }
}
