//! The `retry` module wraps broker operations with bounded retry and runs the
//! long-lived receive loop.
//!
//! Both recognize unauthorized failures and call an [`OnUnauthorized`] hook
//! (normally the token provider) before trying again.

pub mod policy;
pub mod receive_loop;

pub use policy::{OnUnauthorized, RetryPolicy};
pub use receive_loop::{ReceiveLoop, ReceiveLoopSettings};
