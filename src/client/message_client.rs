use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tracing::debug;
use uuid::Uuid;

use crate::client::lock::{LockRef, MessageKey, ReceiveMode};
use crate::message::Message;
use crate::message::codec::{decode_message, encode_headers};
use crate::transport::{BusSession, HttpRequest, Method, timeout_secs, with_query};
use crate::utils::error::{BusError, Result};

/// Server-side timeout for send and lock operations.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Server-side long-poll timeout for receives.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(60);

pub const MESSAGE_CONTENT_TYPE: &str = "application/atom+xml;type=entry;charset=utf-8";
pub const BATCH_CONTENT_TYPE: &str = "application/vnd.microsoft.servicebus.json";

/// Sends, receives and settles messages on queues and subscriptions.
#[derive(Clone)]
pub struct MessageClient {
    session: Arc<BusSession>,
}

impl MessageClient {
    pub fn new(session: Arc<BusSession>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<BusSession> {
        &self.session
    }

    pub async fn send(&self, address: &str, message: &Message, timeout: Duration) -> Result<()> {
        let endpoint = messages_endpoint(address);
        let mut request = HttpRequest::new(Method::POST, timeout_url(&endpoint, timeout))
            .header(CONTENT_TYPE.as_str(), MESSAGE_CONTENT_TYPE)
            .body(message.body.clone());
        for (name, value) in encode_headers(message)? {
            request = request.header(name, value);
        }

        self.session.execute(request, &endpoint).await?;
        debug!(address, message_id = ?message.envelope.message_id, "message sent");
        Ok(())
    }

    /// Posts `message.body` as a JSON batch of messages.
    ///
    /// The broker ignores per-message headers on a batch, so custom
    /// properties are refused before anything is sent.
    pub async fn send_batch(
        &self,
        address: &str,
        message: &Message,
        timeout: Duration,
    ) -> Result<()> {
        if !message.properties.is_empty() {
            return Err(BusError::InvalidArgument(
                "custom properties are not supported on a batch send".to_string(),
            ));
        }

        let endpoint = messages_endpoint(address);
        let request = HttpRequest::new(Method::POST, timeout_url(&endpoint, timeout))
            .header(CONTENT_TYPE.as_str(), BATCH_CONTENT_TYPE)
            .body(message.body.clone());

        self.session.execute(request, &endpoint).await?;
        debug!(address, bytes = message.body.len(), "batch sent");
        Ok(())
    }

    /// Locks and returns the message at the head of `address`, or `None`
    /// when nothing arrived before `timeout`.
    pub async fn receive_locked(&self, address: &str, timeout: Duration) -> Result<Option<Message>> {
        self.receive(address, ReceiveMode::PeekLock, timeout).await
    }

    /// Removes and returns the message at the head of `address`, or `None`
    /// when nothing arrived before `timeout`.
    pub async fn receive_and_delete(
        &self,
        address: &str,
        timeout: Duration,
    ) -> Result<Option<Message>> {
        self.receive(address, ReceiveMode::ReceiveAndDelete, timeout)
            .await
    }

    pub async fn receive(
        &self,
        address: &str,
        mode: ReceiveMode,
        timeout: Duration,
    ) -> Result<Option<Message>> {
        let endpoint = format!("{}/head", messages_endpoint(address));
        let url = timeout_url(&endpoint, timeout);
        let request = match mode {
            ReceiveMode::PeekLock => HttpRequest::new(Method::POST, url),
            ReceiveMode::ReceiveAndDelete => HttpRequest::new(Method::DELETE, url),
        };

        let response = self.session.execute(request, &endpoint).await?;
        let message = decode_message(&response, mode == ReceiveMode::PeekLock)?;
        if let Some(message) = &message {
            debug!(
                address,
                ?mode,
                message_id = ?message.envelope.message_id,
                sequence_number = ?message.envelope.sequence_number,
                "message received"
            );
        }
        Ok(message)
    }

    /// Completes a locked message. A missing message or lost lock is
    /// reported as [`BusError::NotFound`].
    pub async fn delete_message(&self, lock: &LockRef, timeout: Duration) -> Result<()> {
        let uri = lock.uri();
        let request = HttpRequest::new(Method::DELETE, timeout_url(&uri, timeout));
        self.session.execute(request, &uri).await?;
        debug!(uri = %uri, "locked message deleted");
        Ok(())
    }

    pub async fn delete_by_lock(
        &self,
        address: &str,
        key: MessageKey,
        lock_token: Uuid,
        timeout: Duration,
    ) -> Result<()> {
        self.delete_message(&LockRef::token(address, key, lock_token), timeout)
            .await
    }

    pub async fn delete_by_location(&self, location: &str, timeout: Duration) -> Result<()> {
        self.delete_message(&LockRef::location(location), timeout)
            .await
    }

    /// Releases the lock so the message can be delivered again right away.
    pub async fn unlock_message(&self, lock: &LockRef, timeout: Duration) -> Result<()> {
        let uri = lock.uri();
        let request = HttpRequest::new(Method::PUT, timeout_url(&uri, timeout));
        self.session.execute(request, &uri).await?;
        debug!(uri = %uri, "message unlocked");
        Ok(())
    }

    /// Extends the lock without redelivering the message.
    pub async fn renew_lock(&self, lock: &LockRef, timeout: Duration) -> Result<()> {
        let uri = lock.uri();
        let request = HttpRequest::new(Method::POST, timeout_url(&uri, timeout));
        self.session.execute(request, &uri).await?;
        debug!(uri = %uri, "message lock renewed");
        Ok(())
    }
}

fn messages_endpoint(address: &str) -> String {
    format!("{}/messages", address.trim_end_matches('/'))
}

fn timeout_url(url: &str, timeout: Duration) -> String {
    with_query(url, &[("timeout", timeout_secs(timeout).to_string())])
}
