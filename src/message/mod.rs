//! The `message` module defines what travels between the client and the
//! broker: the message itself, its broker-managed envelope, caller-defined
//! custom properties, and the codec that maps them onto HTTP headers.

pub mod codec;
pub mod envelope;
#[allow(clippy::module_inception)]
pub mod message;
pub mod properties;

pub use envelope::{MessageEnvelope, MessageState};
pub use message::Message;
pub use properties::CustomProperties;
