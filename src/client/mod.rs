//! The `client` module sends and consumes messages.
//!
//! It provides [`MessageClient`] with its two consumption modes
//! (peek-lock and receive-and-delete) and the lock lifecycle operations, plus
//! [`LockRef`] which addresses a locked message either by the location the
//! broker returned or by an identifier and lock token pair.

pub mod lock;
pub mod message_client;

pub use lock::{LockRef, MessageKey, ReceiveMode};
pub use message_client::{DEFAULT_RECEIVE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, MessageClient};
