use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::utils::error::Result;

/// Called when an attempt fails with [`BusError::Unauthorized`], before the
/// next attempt runs. The usual implementation forces a token renewal.
///
/// [`BusError::Unauthorized`]: crate::utils::error::BusError::Unauthorized
#[async_trait]
pub trait OnUnauthorized: Send + Sync {
    async fn on_unauthorized(&self) -> Result<()>;
}

/// Bounded retry with a fixed delay between attempts.
///
/// Errors that cannot succeed on a second try (see
/// [`BusError::is_transient`]) are returned at once. Once `max_attempts`
/// is used up, the last error is returned unchanged.
///
/// [`BusError::is_transient`]: crate::utils::error::BusError::is_transient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    pub async fn run<T, F, Fut>(&self, action: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry(action, None).await
    }

    /// Like [`run`](Self::run), invoking `hook` after every unauthorized failure.
    pub async fn run_with_renewal<T, F, Fut>(&self, action: F, hook: &dyn OnUnauthorized) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry(action, Some(hook)).await
    }

    pub async fn retry<T, F, Fut>(
        &self,
        mut action: F,
        on_unauthorized: Option<&dyn OnUnauthorized>,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match action().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if err.is_unauthorized() {
                error!(attempt, "unauthorized access error");
                if let Some(hook) = on_unauthorized {
                    if let Err(hook_err) = hook.on_unauthorized().await {
                        warn!(error = %hook_err, "unauthorized hook failed");
                    }
                }
            } else {
                error!(attempt, error = %err, "attempt failed");
            }

            if !err.is_transient() || attempt >= attempts {
                return Err(err);
            }
            tokio::time::sleep(self.delay).await;
        }
    }
}
