//! In-memory transports for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::auth::{CredentialSource, TokenProvider};
use crate::message::MessageEnvelope;
use crate::message::codec::{
    BROKER_PROPERTIES_HEADER, LOCATION_HEADER, decode_envelope, encode_envelope,
    is_reserved_header,
};
use crate::transport::{BusSession, HttpRequest, HttpResponse, Method, Transport};
use crate::utils::error::{BusError, Result};

pub(crate) const TEST_NAMESPACE: &str = "testns";
pub(crate) const TEST_BASE: &str = "https://testns.servicebus.windows.net";

/// Replays scripted responses in order and records every request.
///
/// Once the script runs out, the `repeat` response (if any) is returned
/// forever; without one the transport fails.
#[derive(Default)]
pub(crate) struct MockTransport {
    script: Mutex<VecDeque<Result<HttpResponse>>>,
    repeat: Option<HttpResponse>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repeating(response: HttpResponse) -> Self {
        Self {
            repeat: Some(response),
            ..Self::default()
        }
    }

    pub fn respond(self, response: HttpResponse) -> Self {
        self.script.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn fail(self, err: BusError) -> Self {
        self.script.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        match &self.repeat {
            Some(response) => Ok(response.clone()),
            None => Err(BusError::Transport("mock script exhausted".to_string())),
        }
    }
}

struct Stored {
    sequence: i64,
    body: Bytes,
    envelope: MessageEnvelope,
    properties: Vec<(String, String)>,
    lock: Option<Uuid>,
}

#[derive(Default)]
struct BrokerState {
    messages: Vec<Stored>,
    next_sequence: i64,
}

/// A single-entity broker speaking the message endpoints of the REST dialect:
/// send, peek-lock and destructive receive, and lock delete/unlock/renew.
///
/// Locks never expire on their own. `reject_next(n)` makes the next `n`
/// requests fail with 401.
#[derive(Default)]
pub(crate) struct FakeBroker {
    state: Mutex<BrokerState>,
    unauthorized: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_next(&self, count: usize) {
        self.unauthorized.store(count, Ordering::SeqCst);
    }

    /// Messages still held by the broker, locked or not.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().messages.len()
    }

    pub fn locked(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.lock.is_some())
            .count()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        let path = request.url.split('?').next().unwrap_or_default();
        let Some((entity, rest)) = path.split_once("/messages") else {
            return HttpResponse::new(400);
        };
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

        let method = &request.method;
        match segments.as_slice() {
            [] if *method == Method::POST => self.enqueue(request),
            ["head"] if *method == Method::POST => self.deliver(entity, true),
            ["head"] if *method == Method::DELETE => self.deliver(entity, false),
            [key, lock] => self.settle(method, key, lock),
            _ => HttpResponse::new(400),
        }
    }

    fn enqueue(&self, request: &HttpRequest) -> HttpResponse {
        let envelope = match request.header_value(BROKER_PROPERTIES_HEADER) {
            Some(raw) => match decode_envelope(raw) {
                Ok(envelope) => envelope,
                Err(_) => return HttpResponse::new(400),
            },
            None => MessageEnvelope::new(),
        };
        let properties = request
            .headers
            .iter()
            .filter(|(name, _)| {
                !is_reserved_header(name) && !name.eq_ignore_ascii_case("authorization")
            })
            .cloned()
            .collect();

        let mut state = self.state.lock().unwrap();
        state.next_sequence += 1;
        let sequence = state.next_sequence;
        state.messages.push(Stored {
            sequence,
            body: request.body.clone(),
            envelope,
            properties,
            lock: None,
        });
        HttpResponse::new(201)
    }

    fn deliver(&self, entity: &str, lock: bool) -> HttpResponse {
        let mut state = self.state.lock().unwrap();
        let Some(index) = state.messages.iter().position(|m| m.lock.is_none()) else {
            return HttpResponse::new(204);
        };

        let (envelope, location) = {
            let stored = &mut state.messages[index];
            let mut envelope = stored.envelope.clone();
            envelope.sequence_number = Some(stored.sequence);
            envelope.delivery_count = Some(envelope.delivery_count.unwrap_or(0) + 1);
            stored.envelope.delivery_count = envelope.delivery_count;

            let location = if lock {
                let token = Uuid::new_v4();
                stored.lock = Some(token);
                envelope.lock_token = Some(token);
                envelope.locked_until =
                    Some(chrono::Utc::now() + chrono::TimeDelta::seconds(60));
                Some(format!("{entity}/messages/{}/{token}", stored.sequence))
            } else {
                None
            };
            (envelope, location)
        };

        if !lock {
            // Receive-and-delete: the message is gone once delivered.
            let removed = state.messages.remove(index);
            return respond_with(&removed, &envelope, None);
        }
        respond_with(&state.messages[index], &envelope, location)
    }

    fn settle(&self, method: &Method, key: &str, lock: &str) -> HttpResponse {
        let Ok(lock) = Uuid::parse_str(lock) else {
            return HttpResponse::new(400);
        };
        let key = urlencoding::decode(key)
            .map(|k| k.into_owned())
            .unwrap_or_else(|_| key.to_string());
        let mut state = self.state.lock().unwrap();
        let Some(index) = state.messages.iter().position(|m| {
            m.lock == Some(lock)
                && (m.sequence.to_string() == key
                    || m.envelope.message_id.as_deref() == Some(key.as_str()))
        }) else {
            return HttpResponse::new(404);
        };

        if *method == Method::DELETE {
            state.messages.remove(index);
            HttpResponse::new(200)
        } else if *method == Method::PUT {
            state.messages[index].lock = None;
            HttpResponse::new(200)
        } else if *method == Method::POST {
            HttpResponse::new(200)
        } else {
            HttpResponse::new(405)
        }
    }
}

fn respond_with(
    stored: &Stored,
    envelope: &MessageEnvelope,
    location: Option<String>,
) -> HttpResponse {
    let mut response = HttpResponse::new(if location.is_some() { 201 } else { 200 })
        .with_header("Content-Type", "application/atom+xml;type=entry;charset=utf-8")
        .with_header("Date", "Sun, 06 Nov 1994 08:49:37 GMT")
        .with_body(stored.body.clone());
    if let Ok(raw) = encode_envelope(envelope) {
        response = response.with_header(BROKER_PROPERTIES_HEADER, raw);
    }
    if let Some(location) = location {
        response = response.with_header(LOCATION_HEADER, location);
    }
    for (name, value) in &stored.properties {
        // The real broker quotes string property values.
        response = response.with_header(name.to_ascii_lowercase(), format!("\"{value}\""));
    }
    response
}

#[async_trait]
impl Transport for FakeBroker {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let rejected = self
            .unauthorized
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Ok(HttpResponse::new(401));
        }
        Ok(self.handle(&request))
    }
}

pub(crate) fn sas_source() -> CredentialSource {
    CredentialSource::SharedAccessSignature {
        key_name: "RootManageSharedAccessKey".to_string(),
        key: "c2VjcmV0LWtleQ==".to_string(),
    }
}

/// SAS provider; signing is local so `transport` is never called.
pub(crate) async fn sas_provider(transport: Arc<dyn Transport>) -> Arc<TokenProvider> {
    let provider = TokenProvider::acquire(
        TEST_NAMESPACE,
        sas_source(),
        Duration::from_secs(600),
        Duration::from_secs(30),
        transport,
    )
    .await
    .unwrap();
    Arc::new(provider)
}

pub(crate) async fn session(transport: Arc<dyn Transport>) -> Arc<BusSession> {
    let tokens = sas_provider(Arc::clone(&transport)).await;
    Arc::new(BusSession::new(transport, tokens))
}

pub(crate) fn queue_address() -> String {
    format!("{TEST_BASE}/orders")
}
