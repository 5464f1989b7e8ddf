use std::time::Duration;

use serde::Deserialize;

use crate::auth::CredentialSource;
use crate::retry::{ReceiveLoopSettings, RetryPolicy};
use crate::transport::session::DEFAULT_API_VERSION;
use crate::utils::error::{BusError, Result};

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bus: BusSettings,
    pub auth: AuthSettings,
    pub retry: RetrySettings,
    pub receiver: ReceiverSettings,
    pub log: LogSettings,
}

/// Which namespace to talk to and how.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BusSettings {
    pub namespace: String,
    /// Overrides `https://<namespace>.servicebus.windows.net`.
    pub base_url: Option<String>,
    pub api_version: String,
    pub accept_invalid_certs: bool,
}

/// Credential material. A SAS key wins over ACS credentials when both are set.
#[derive(Deserialize, Clone, PartialEq, Eq)]
pub struct AuthSettings {
    pub sas_key_name: String,
    pub sas_key: Option<String>,
    pub acs_identity: Option<String>,
    pub acs_key: Option<String>,
    pub token_endpoint: Option<String>,
    pub token_ttl_minutes: u64,
    pub renewal_margin_secs: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

/// Pacing of the subscriber's receive loop.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ReceiverSettings {
    pub request_timeout_secs: u64,
    pub receive_timeout_secs: u64,
    pub error_delay_ms: u64,
    pub throttle_after: u32,
    pub throttle_delay_secs: u64,
    pub abort_after: u32,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub bus: Option<PartialBusSettings>,
    pub auth: Option<PartialAuthSettings>,
    pub retry: Option<PartialRetrySettings>,
    pub receiver: Option<PartialReceiverSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBusSettings {
    pub namespace: Option<String>,
    pub base_url: Option<String>,
    pub api_version: Option<String>,
    pub accept_invalid_certs: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialAuthSettings {
    pub sas_key_name: Option<String>,
    pub sas_key: Option<String>,
    pub acs_identity: Option<String>,
    pub acs_key: Option<String>,
    pub token_endpoint: Option<String>,
    pub token_ttl_minutes: Option<u64>,
    pub renewal_margin_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialRetrySettings {
    pub max_attempts: Option<u32>,
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialReceiverSettings {
    pub request_timeout_secs: Option<u64>,
    pub receive_timeout_secs: Option<u64>,
    pub error_delay_ms: Option<u64>,
    pub throttle_after: Option<u32>,
    pub throttle_delay_secs: Option<u64>,
    pub abort_after: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bus: BusSettings {
                namespace: String::new(),
                base_url: None,
                api_version: DEFAULT_API_VERSION.to_string(),
                accept_invalid_certs: false,
            },
            auth: AuthSettings {
                sas_key_name: "RootManageSharedAccessKey".to_string(),
                sas_key: None,
                acs_identity: None,
                acs_key: None,
                token_endpoint: None,
                token_ttl_minutes: 10,
                renewal_margin_secs: 30,
            },
            retry: RetrySettings {
                max_attempts: 3,
                delay_ms: 1000,
            },
            receiver: ReceiverSettings {
                request_timeout_secs: 5,
                receive_timeout_secs: 60,
                error_delay_ms: 1000,
                throttle_after: 10,
                throttle_delay_secs: 60,
                abort_after: 100,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Fills every missing value from `defaults`.
    pub fn merge(self, defaults: Settings) -> Settings {
        let bus = self.bus.unwrap_or_default();
        let auth = self.auth.unwrap_or_default();
        let retry = self.retry.unwrap_or_default();
        let receiver = self.receiver.unwrap_or_default();
        let log = self.log.unwrap_or_default();

        Settings {
            bus: BusSettings {
                namespace: bus.namespace.unwrap_or(defaults.bus.namespace),
                base_url: bus.base_url.or(defaults.bus.base_url),
                api_version: bus.api_version.unwrap_or(defaults.bus.api_version),
                accept_invalid_certs: bus
                    .accept_invalid_certs
                    .unwrap_or(defaults.bus.accept_invalid_certs),
            },
            auth: AuthSettings {
                sas_key_name: auth.sas_key_name.unwrap_or(defaults.auth.sas_key_name),
                sas_key: auth.sas_key.or(defaults.auth.sas_key),
                acs_identity: auth.acs_identity.or(defaults.auth.acs_identity),
                acs_key: auth.acs_key.or(defaults.auth.acs_key),
                token_endpoint: auth.token_endpoint.or(defaults.auth.token_endpoint),
                token_ttl_minutes: auth
                    .token_ttl_minutes
                    .unwrap_or(defaults.auth.token_ttl_minutes),
                renewal_margin_secs: auth
                    .renewal_margin_secs
                    .unwrap_or(defaults.auth.renewal_margin_secs),
            },
            retry: RetrySettings {
                max_attempts: retry.max_attempts.unwrap_or(defaults.retry.max_attempts),
                delay_ms: retry.delay_ms.unwrap_or(defaults.retry.delay_ms),
            },
            receiver: ReceiverSettings {
                request_timeout_secs: receiver
                    .request_timeout_secs
                    .unwrap_or(defaults.receiver.request_timeout_secs),
                receive_timeout_secs: receiver
                    .receive_timeout_secs
                    .unwrap_or(defaults.receiver.receive_timeout_secs),
                error_delay_ms: receiver
                    .error_delay_ms
                    .unwrap_or(defaults.receiver.error_delay_ms),
                throttle_after: receiver
                    .throttle_after
                    .unwrap_or(defaults.receiver.throttle_after),
                throttle_delay_secs: receiver
                    .throttle_delay_secs
                    .unwrap_or(defaults.receiver.throttle_delay_secs),
                abort_after: receiver.abort_after.unwrap_or(defaults.receiver.abort_after),
            },
            log: LogSettings {
                level: log.level.unwrap_or(defaults.log.level),
            },
        }
    }
}

impl AuthSettings {
    /// Picks the credential source: SAS when a key is configured, otherwise
    /// ACS when both identity and key are present.
    pub fn credential_source(&self) -> Result<CredentialSource> {
        if let Some(key) = self.sas_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(CredentialSource::SharedAccessSignature {
                key_name: self.sas_key_name.clone(),
                key: key.clone(),
            });
        }
        match (&self.acs_identity, &self.acs_key) {
            (Some(identity), Some(secret)) if !identity.is_empty() && !secret.is_empty() => {
                Ok(CredentialSource::AccessControl {
                    identity: identity.clone(),
                    secret: secret.clone(),
                    endpoint: self.token_endpoint.clone(),
                })
            }
            _ => Err(BusError::Config(
                "no credentials configured: set auth.sas_key or auth.acs_identity and auth.acs_key"
                    .to_string(),
            )),
        }
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_minutes.saturating_mul(60))
    }

    pub fn renewal_margin(&self) -> Duration {
        Duration::from_secs(self.renewal_margin_secs)
    }
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("sas_key_name", &self.sas_key_name)
            .field("sas_key", &self.sas_key.as_ref().map(|_| "<redacted>"))
            .field("acs_identity", &self.acs_identity)
            .field("acs_key", &self.acs_key.as_ref().map(|_| "<redacted>"))
            .field("token_endpoint", &self.token_endpoint)
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .field("renewal_margin_secs", &self.renewal_margin_secs)
            .finish()
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.delay_ms))
    }
}

impl ReceiverSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn loop_settings(&self) -> ReceiveLoopSettings {
        ReceiveLoopSettings {
            receive_timeout: Duration::from_secs(self.receive_timeout_secs),
            request_timeout: self.request_timeout(),
            error_delay: Duration::from_millis(self.error_delay_ms),
            throttle_after: self.throttle_after,
            throttle_delay: Duration::from_secs(self.throttle_delay_secs),
            abort_after: self.abort_after,
        }
    }
}
