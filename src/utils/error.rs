//! The `error` module defines the error type shared by every `busrest` component.
//!
//! Status codes returned by the broker are mapped to variants once, at the
//! transport boundary (see [`crate::transport::check_status`]). Callers then
//! decide on policy by matching variants instead of re-reading status codes:
//!
//! | Variant | Origin | Retried by `RetryPolicy` |
//! |---------|--------|--------------------------|
//! | `Unauthorized` | HTTP 401 | yes, after the unauthorized hook |
//! | `NotFound` | HTTP 404 | no |
//! | `Conflict` | HTTP 409 | no |
//! | `Status` | any other non-2xx | yes |
//! | `Transport` | connection/IO failure | yes |
//! | `Token` | credential could not be produced | yes |
//! | `InvalidArgument` | caller bug | no |
//! | `Codec` | malformed envelope | no |
//! | `Config` | bad settings | no |
//! | `Unrecoverable` | failure ceiling reached | no |

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, BusError>;

#[derive(Debug, Error)]
pub enum BusError {
    /// The broker rejected the credential. Recoverable by renewing the token.
    #[error("unauthorized request to {address}")]
    Unauthorized { address: String },

    #[error("entity or message not found at {address}")]
    NotFound { address: String },

    #[error("entity already exists at {address}")]
    Conflict { address: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Any other non-success status. The response body is kept for diagnostics.
    #[error("request to {address} failed with status {status}: {body}")]
    Status {
        status: u16,
        address: String,
        body: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("token error: {0}")]
    Token(String),

    #[error("envelope codec error: {0}")]
    Codec(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Raised by long-running loops once the consecutive failure ceiling is hit.
    #[error("unrecoverable error after {failures} consecutive failures: {source}")]
    Unrecoverable {
        failures: u32,
        #[source]
        source: Box<BusError>,
    },
}

impl BusError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether another attempt of the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unauthorized { .. } => true,
            Self::Status { .. } => true,
            Self::Transport(_) => true,
            Self::Token(_) => true,
            Self::NotFound { .. } => false,
            Self::Conflict { .. } => false,
            Self::InvalidArgument(_) => false,
            Self::Codec(_) => false,
            Self::Config(_) => false,
            Self::Unrecoverable { .. } => false,
        }
    }

    /// HTTP status behind the error, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::NotFound { .. } => Some(404),
            Self::Conflict { .. } => Some(409),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BusError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<config::ConfigError> for BusError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}
