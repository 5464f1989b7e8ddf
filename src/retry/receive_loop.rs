use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::client::{LockRef, MessageClient, ReceiveMode};
use crate::message::Message;
use crate::retry::policy::OnUnauthorized;
use crate::utils::error::{BusError, Result};

/// Pacing of a [`ReceiveLoop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveLoopSettings {
    /// Server-side long-poll timeout per receive.
    pub receive_timeout: Duration,
    /// Timeout for the settle (delete/unlock) calls.
    pub request_timeout: Duration,
    /// Pause after any failed iteration.
    pub error_delay: Duration,
    /// Consecutive failures after which each failure adds `throttle_delay`.
    pub throttle_after: u32,
    pub throttle_delay: Duration,
    /// Consecutive failures after which the loop gives up.
    pub abort_after: u32,
}

impl Default for ReceiveLoopSettings {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(5),
            error_delay: Duration::from_secs(1),
            throttle_after: 10,
            throttle_delay: Duration::from_secs(60),
            abort_after: 100,
        }
    }
}

/// Long-running consumer of one queue or subscription.
///
/// The stop signal is checked between iterations, never in the middle of a
/// receive; pauses are cut short by it. In peek-lock mode a message is
/// deleted once the handler succeeds and unlocked when it fails.
pub struct ReceiveLoop {
    client: MessageClient,
    address: String,
    mode: ReceiveMode,
    settings: ReceiveLoopSettings,
    on_unauthorized: Option<Arc<dyn OnUnauthorized>>,
}

impl ReceiveLoop {
    pub fn new(
        client: MessageClient,
        address: impl Into<String>,
        mode: ReceiveMode,
        settings: ReceiveLoopSettings,
    ) -> Self {
        Self {
            client,
            address: address.into(),
            mode,
            settings,
            on_unauthorized: None,
        }
    }

    pub fn on_unauthorized(mut self, hook: Arc<dyn OnUnauthorized>) -> Self {
        self.on_unauthorized = Some(hook);
        self
    }

    /// Runs until `stop` becomes true (returns `Ok`) or the consecutive
    /// failure ceiling is reached (returns [`BusError::Unrecoverable`]).
    pub async fn run<F, Fut>(&self, mut stop: watch::Receiver<bool>, mut handler: F) -> Result<()>
    where
        F: FnMut(Message) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut consecutive_failures: u32 = 0;
        info!(address = %self.address, mode = ?self.mode, "waiting for messages");

        loop {
            let stopped = *stop.borrow();
            if stopped {
                break;
            }

            let err = match self.poll_once(&mut handler).await {
                Ok(()) => {
                    consecutive_failures = 0;
                    continue;
                }
                Err(err) => err,
            };

            if err.is_unauthorized() {
                error!(address = %self.address, "unauthorized access error");
                if let Some(hook) = &self.on_unauthorized {
                    if let Err(hook_err) = hook.on_unauthorized().await {
                        warn!(error = %hook_err, "unauthorized hook failed");
                    }
                }
            } else {
                error!(address = %self.address, error = %err, "receive failed");
            }

            consecutive_failures += 1;
            if consecutive_failures >= self.settings.abort_after {
                error!(
                    failures = consecutive_failures,
                    "unrecoverable error, giving up"
                );
                return Err(BusError::Unrecoverable {
                    failures: consecutive_failures,
                    source: Box::new(err),
                });
            }

            if pause(&mut stop, self.settings.error_delay).await {
                break;
            }
            if consecutive_failures >= self.settings.throttle_after {
                warn!(
                    failures = consecutive_failures,
                    delay = ?self.settings.throttle_delay,
                    "repeated failures, throttling down"
                );
                if pause(&mut stop, self.settings.throttle_delay).await {
                    break;
                }
            }
        }

        info!(address = %self.address, "receive loop stopped");
        Ok(())
    }

    async fn poll_once<F, Fut>(&self, handler: &mut F) -> Result<()>
    where
        F: FnMut(Message) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let received = self
            .client
            .receive(&self.address, self.mode, self.settings.receive_timeout)
            .await?;
        let Some(message) = received else {
            return Ok(());
        };

        let lock: Option<LockRef> = match self.mode {
            ReceiveMode::PeekLock => message.lock_ref(&self.address),
            ReceiveMode::ReceiveAndDelete => None,
        };

        match handler(message).await {
            Ok(()) => {
                if let Some(lock) = &lock {
                    self.client
                        .delete_message(lock, self.settings.request_timeout)
                        .await?;
                }
                Ok(())
            }
            Err(err) => {
                if let Some(lock) = &lock {
                    if let Err(unlock_err) = self
                        .client
                        .unlock_message(lock, self.settings.request_timeout)
                        .await
                    {
                        warn!(error = %unlock_err, "failed to unlock message after handler error");
                    }
                }
                Err(err)
            }
        }
    }
}

/// Sleeps for `delay` unless stopped first. Returns whether stop was requested.
async fn pause(stop: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        changed = stop.changed() => {
            if changed.is_err() {
                // No one can signal anymore; sit out the delay.
                tokio::time::sleep(delay).await;
            }
        }
    }
    *stop.borrow()
}
