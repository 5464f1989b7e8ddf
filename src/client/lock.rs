use std::fmt;

use uuid::Uuid;

/// Identifies a locked message together with its lock token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKey {
    Id(String),
    Sequence(i64),
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => f.write_str(&urlencoding::encode(id)),
            Self::Sequence(sequence) => write!(f, "{sequence}"),
        }
    }
}

/// Address of a peek-locked message for delete, unlock and renew.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockRef {
    /// The `Location` returned with the delivery.
    Location(String),
    /// Entity address plus message id or sequence number and lock token.
    Token {
        address: String,
        key: MessageKey,
        lock_token: Uuid,
    },
}

impl LockRef {
    pub fn location(uri: impl Into<String>) -> Self {
        Self::Location(uri.into())
    }

    pub fn token(address: impl Into<String>, key: MessageKey, lock_token: Uuid) -> Self {
        Self::Token {
            address: address.into(),
            key,
            lock_token,
        }
    }

    /// The message URI both forms resolve to.
    pub fn uri(&self) -> String {
        match self {
            Self::Location(uri) => uri.clone(),
            Self::Token {
                address,
                key,
                lock_token,
            } => format!(
                "{}/messages/{}/{}",
                address.trim_end_matches('/'),
                key,
                lock_token
            ),
        }
    }
}

/// How a receive treats the message at the head of the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveMode {
    /// Lock the message; it must be deleted or unlocked afterwards.
    PeekLock,
    /// Remove the message as part of the receive.
    ReceiveAndDelete,
}
