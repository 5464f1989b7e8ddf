use std::fmt;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::transport::{HttpRequest, Method};
use crate::utils::error::{BusError, Result};

type HmacSha256 = Hmac<Sha256>;

/// SAS start time is backdated by this much to absorb server clock skew.
pub const CLOCK_SKEW_SECS: i64 = 15 * 60;

/// Signed-version field appended to every SAS token.
pub const SAS_VERSION: &str = "2014-02-14";

/// A bearer credential and its lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    value: String,
    expires_at: DateTime<Utc>,
    renewal_margin: Duration,
}

impl Credential {
    /// Rejects an empty `value`; a held credential is never blank.
    pub fn new(
        value: impl Into<String>,
        expires_at: DateTime<Utc>,
        renewal_margin: Duration,
    ) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(BusError::Token("credential value is empty".to_string()));
        }
        Ok(Self {
            value,
            expires_at,
            renewal_margin,
        })
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn renewal_margin(&self) -> Duration {
        self.renewal_margin
    }

    /// Instant at which the credential should be replaced.
    pub fn renew_at(&self) -> DateTime<Utc> {
        let margin = TimeDelta::from_std(self.renewal_margin).unwrap_or(TimeDelta::MAX);
        self.expires_at
            .checked_sub_signed(margin)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn needs_renewal(&self, now: DateTime<Utc>) -> bool {
        now >= self.renew_at()
    }

    /// Zero once renewal is due.
    pub fn time_until_renewal(&self, now: DateTime<Utc>) -> Duration {
        (self.renew_at() - now).to_std().unwrap_or(Duration::ZERO)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("renewal_margin", &self.renewal_margin)
            .finish()
    }
}

/// Where credentials come from.
#[derive(Clone)]
pub enum CredentialSource {
    /// Shared access signature computed locally from a named key.
    SharedAccessSignature { key_name: String, key: String },
    /// Legacy token service (WRAP protocol); `endpoint` overrides the
    /// namespace's default issuer URL.
    AccessControl {
        identity: String,
        secret: String,
        endpoint: Option<String>,
    },
}

impl CredentialSource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SharedAccessSignature { .. } => "sas",
            Self::AccessControl { .. } => "acs",
        }
    }
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedAccessSignature { key_name, .. } => f
                .debug_struct("SharedAccessSignature")
                .field("key_name", key_name)
                .finish_non_exhaustive(),
            Self::AccessControl {
                identity, endpoint, ..
            } => f
                .debug_struct("AccessControl")
                .field("identity", identity)
                .field("endpoint", endpoint)
                .finish_non_exhaustive(),
        }
    }
}

pub(crate) fn to_delta(duration: Duration) -> Result<TimeDelta> {
    TimeDelta::from_std(duration)
        .map_err(|e| BusError::Token(format!("token lifetime out of range: {e}")))
}

/// Builds a shared access signature token valid for `ttl` from `now`.
///
/// Returns the token string and its expiry.
pub fn sign_shared_access(
    namespace: &str,
    key_name: &str,
    key: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<(String, DateTime<Utc>)> {
    let expires_at = now
        .checked_add_signed(to_delta(ttl)?)
        .ok_or_else(|| BusError::Token("token expiry overflows".to_string()))?;
    let expiry = expires_at.timestamp();
    let start = now.timestamp() - CLOCK_SKEW_SECS;

    let resource = urlencoding::encode(namespace);
    let string_to_sign = format!("{resource}\n{expiry}");

    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| BusError::Token(format!("failed to create HMAC: {e}")))?;
    mac.update(string_to_sign.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    let token = format!(
        "SharedAccessSignature sr={}&sig={}&st={}&se={}&skn={}&sv={}",
        resource,
        urlencoding::encode(&signature),
        start,
        expiry,
        key_name,
        SAS_VERSION
    );
    Ok((token, expires_at))
}

pub fn access_control_endpoint(namespace: &str) -> String {
    format!("https://{namespace}-sb.accesscontrol.windows.net/WRAPv0.9/")
}

pub fn access_control_scope(namespace: &str) -> String {
    format!("http://{namespace}.servicebus.windows.net/")
}

/// Form POST asking the token service for an access token.
pub fn access_control_request(
    namespace: &str,
    identity: &str,
    secret: &str,
    endpoint: Option<&str>,
) -> HttpRequest {
    let url = endpoint
        .map(str::to_string)
        .unwrap_or_else(|| access_control_endpoint(namespace));
    let form = format!(
        "wrap_name={}&wrap_password={}&wrap_scope={}",
        urlencoding::encode(identity),
        urlencoding::encode(secret),
        urlencoding::encode(&access_control_scope(namespace))
    );
    HttpRequest::new(Method::POST, url)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(form)
}

/// Extracts the access token (first pair of the form-encoded reply) and the
/// advertised lifetime in seconds, when present.
pub fn parse_access_control_reply(body: &str) -> Result<(String, Option<u64>)> {
    let mut pairs = body.trim().split('&');
    let token = pairs
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(_, value)| value)
        .ok_or_else(|| BusError::Token("token service reply has no token".to_string()))?;
    let token = urlencoding::decode(token)
        .map_err(|e| BusError::Token(format!("token is not valid UTF-8: {e}")))?
        .into_owned();
    if token.is_empty() {
        return Err(BusError::Token("token service returned an empty token".to_string()));
    }

    let expires_in = body
        .trim()
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == "wrap_access_token_expires_in")
        .and_then(|(_, value)| value.parse::<u64>().ok());

    Ok((token, expires_in))
}
