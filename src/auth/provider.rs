use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, Notify, RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::credential::{
    Credential, CredentialSource, access_control_request, parse_access_control_reply,
    sign_shared_access, to_delta,
};
use crate::retry::OnUnauthorized;
use crate::transport::{Transport, check_status};
use crate::utils::error::{BusError, Result};

/// The renewal task never ticks faster than this, whatever the settings say.
pub const MIN_RENEWAL_INTERVAL: Duration = Duration::from_secs(1);

/// Owns the credential shared by every request of a session.
///
/// The credential is swapped whole under a write lock, and renewals are
/// serialized, so readers only ever see a complete old or new value.
pub struct TokenProvider {
    namespace: String,
    source: CredentialSource,
    ttl: Duration,
    renewal_margin: Duration,
    transport: Arc<dyn Transport>,
    current: RwLock<Credential>,
    renew_gate: Mutex<()>,
    generation: AtomicU64,
    renewed: Notify,
}

impl TokenProvider {
    /// Obtains the first credential for `namespace`.
    pub async fn acquire(
        namespace: impl Into<String>,
        source: CredentialSource,
        ttl: Duration,
        renewal_margin: Duration,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let namespace = namespace.into();
        let credential = issue(
            &namespace,
            &source,
            ttl,
            renewal_margin,
            transport.as_ref(),
        )
        .await?;
        info!(
            namespace = %namespace,
            source = source.kind(),
            expires_at = %credential.expires_at(),
            "authorization token acquired"
        );

        Ok(Self {
            namespace,
            source,
            ttl,
            renewal_margin,
            transport,
            current: RwLock::new(credential),
            renew_gate: Mutex::new(()),
            generation: AtomicU64::new(0),
            renewed: Notify::new(),
        })
    }

    /// Issues a fresh credential and makes it the current one.
    pub async fn renew(&self) -> Result<Credential> {
        let _gate = self.renew_gate.lock().await;
        let credential = issue(
            &self.namespace,
            &self.source,
            self.ttl,
            self.renewal_margin,
            self.transport.as_ref(),
        )
        .await?;

        {
            let mut current = self.current.write().await;
            *current = credential.clone();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.renewed.notify_waiters();

        info!(
            namespace = %self.namespace,
            source = self.source.kind(),
            generation,
            expires_at = %credential.expires_at(),
            "authorization token renewed"
        );
        Ok(credential)
    }

    pub async fn credential(&self) -> Credential {
        self.current.read().await.clone()
    }

    /// Value for the `Authorization` header.
    pub async fn authorization(&self) -> String {
        self.current.read().await.value().to_string()
    }

    /// Number of completed renewals since acquisition.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Time left until the held credential is due for renewal
    /// (`expires_at - margin`), floored at [`MIN_RENEWAL_INTERVAL`].
    pub async fn next_renewal_in(&self) -> Duration {
        self.current
            .read()
            .await
            .time_until_renewal(Utc::now())
            .max(MIN_RENEWAL_INTERVAL)
    }

    /// Spawns the renewal task.
    ///
    /// Each round sleeps until the current credential is due, so a token
    /// service granting a shorter lifetime than configured is renewed in
    /// time. A forced renewal (see [`OnUnauthorized`]) restarts the timer.
    /// The task exits once `stop` turns true or its sender is dropped.
    pub fn spawn_renewal(self: &Arc<Self>, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let provider = Arc::clone(self);
        tokio::spawn(async move {
            debug!("token renewal task started");
            loop {
                if *stop.borrow() {
                    break;
                }
                let renewed = provider.renewed.notified();
                let delay = provider.next_renewal_in().await;
                debug!(?delay, "next token renewal scheduled");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        if let Err(e) = provider.renew().await {
                            warn!(error = %e, "scheduled token renewal failed");
                        }
                    }
                    _ = renewed => {
                        debug!("token renewed out of band, restarting renewal timer");
                    }
                    changed = stop.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("token renewal task stopped");
        })
    }
}

#[async_trait]
impl OnUnauthorized for TokenProvider {
    async fn on_unauthorized(&self) -> Result<()> {
        warn!(namespace = %self.namespace, "unauthorized response, forcing token renewal");
        self.renew().await.map(|_| ())
    }
}

async fn issue(
    namespace: &str,
    source: &CredentialSource,
    ttl: Duration,
    renewal_margin: Duration,
    transport: &dyn Transport,
) -> Result<Credential> {
    match source {
        CredentialSource::SharedAccessSignature { key_name, key } => {
            let (token, expires_at) = sign_shared_access(namespace, key_name, key, ttl, Utc::now())?;
            Credential::new(token, expires_at, renewal_margin)
        }
        CredentialSource::AccessControl {
            identity,
            secret,
            endpoint,
        } => {
            let request = access_control_request(namespace, identity, secret, endpoint.as_deref());
            let address = request.url.clone();
            let response = check_status(transport.execute(request).await?, &address)?;
            let (token, expires_in) = parse_access_control_reply(&response.body_text())?;

            let lifetime = expires_in.map(Duration::from_secs).unwrap_or(ttl);
            let expires_at = Utc::now()
                .checked_add_signed(to_delta(lifetime)?)
                .ok_or_else(|| BusError::Token("token expiry overflows".to_string()))?;
            Credential::new(
                format!("WRAP access_token=\"{token}\""),
                expires_at,
                renewal_margin,
            )
        }
    }
}
