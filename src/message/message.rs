use bytes::Bytes;

use crate::client::{LockRef, MessageKey};
use crate::message::envelope::MessageEnvelope;
use crate::message::properties::CustomProperties;

/// A message as sent to or received from the broker.
///
/// A fresh `Message` is built for every receive. `location` and the
/// envelope's lock token are only meaningful until the lock expires or the
/// message is settled.
///
/// # Fields
///
/// - `body` - Opaque payload bytes.
/// - `location` - URI of the locked message, set only for peek-lock deliveries.
/// - `envelope` - Broker-managed fields.
/// - `properties` - Caller-defined attributes.
///
/// # Example
///
/// ```rust
/// use busrest::message::{Message, MessageEnvelope};
///
/// let mut msg = Message::new("This is message #1")
///     .with_envelope(MessageEnvelope::new().with_label("M1").with_message_id("1"));
/// msg.properties.insert("Priority", "High");
/// assert_eq!(msg.properties.get("priority"), Some("High"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub body: Bytes,
    pub location: Option<String>,
    pub envelope: MessageEnvelope,
    pub properties: CustomProperties,
}

impl Message {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_envelope(mut self, envelope: MessageEnvelope) -> Self {
        self.envelope = envelope;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key, value);
        self
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// How to address this message's lock on `address`.
    ///
    /// Prefers the delivered location; otherwise combines the lock token with
    /// the message id, falling back to the sequence number. `None` when the
    /// message was not delivered under a lock.
    pub fn lock_ref(&self, address: &str) -> Option<LockRef> {
        if let Some(location) = &self.location {
            return Some(LockRef::Location(location.clone()));
        }
        let lock_token = self.envelope.lock_token?;
        let key = match (&self.envelope.message_id, self.envelope.sequence_number) {
            (Some(id), _) => MessageKey::Id(id.clone()),
            (None, Some(sequence)) => MessageKey::Sequence(sequence),
            (None, None) => return None,
        };
        Some(LockRef::Token {
            address: address.to_string(),
            key,
            lock_token,
        })
    }
}
