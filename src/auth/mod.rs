//! The `auth` module produces and maintains the credential attached to every
//! broker request.
//!
//! Two credential sources are supported: shared access signatures computed
//! locally with HMAC-SHA256, and tokens fetched from the legacy token service
//! over the WRAP protocol. [`TokenProvider`] holds the current credential and
//! renews it on a timer or on demand after an unauthorized response.

pub mod credential;
pub mod provider;

pub use credential::{Credential, CredentialSource};
pub use provider::TokenProvider;
