//! Session state and the background credential refresh task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::api::{Credential, PixivApi};
use crate::error::Result;

/// Identity of the logged-in account and the token used to renew it.
#[derive(Debug)]
pub struct Session {
    user_id: AtomicU64,
    refresh_token: Mutex<String>,
}

impl Session {
    #[must_use]
    pub fn new(refresh_token: impl Into<String>) -> Self {
        Self {
            user_id: AtomicU64::new(0),
            refresh_token: Mutex::new(refresh_token.into()),
        }
    }

    /// Pixiv user id of the logged-in account, 0 before the first login.
    #[must_use]
    pub fn user_id(&self) -> u64 {
        self.user_id.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn refresh_token(&self) -> String {
        self.refresh_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make one login attempt bounded by `timeout` and record its result.
    ///
    /// # Errors
    ///
    /// Returns the login error, or a transient error on timeout.
    pub async fn login(&self, api: &dyn PixivApi, timeout: Duration) -> Result<Credential> {
        let token = self.refresh_token();
        let credential = tokio::time::timeout(timeout, api.login(&token)).await??;
        self.apply(&credential);
        Ok(credential)
    }

    fn apply(&self, credential: &Credential) {
        self.user_id.store(credential.user_id, Ordering::Relaxed);

        let mut token = self
            .refresh_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *token != credential.refresh_token {
            warn!(
                user_id = credential.user_id,
                "Refresh token rotated by server, update PIXIV_REFRESH_TOKEN"
            );
            *token = credential.refresh_token.clone();
        }
    }
}

/// Delay before the next refresh after a successful login.
#[must_use]
pub fn refresh_delay(expires_in: u64) -> Duration {
    Duration::from_millis(expires_in.saturating_mul(800))
}

/// Handle to the running refresh task.
#[derive(Debug)]
pub struct AuthDaemon {
    handle: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl AuthDaemon {
    /// Start refreshing credentials after `first_delay`.
    ///
    /// Each login is a single attempt bounded by `timeout`. On success the
    /// next refresh is scheduled at 80% of the token lifetime, on failure
    /// after `retry_delay`.
    #[must_use]
    pub fn spawn(
        api: Arc<dyn PixivApi>,
        session: Arc<Session>,
        first_delay: Duration,
        timeout: Duration,
        retry_delay: Duration,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let handle = tokio::spawn(async move {
            info!(
                first_refresh_secs = first_delay.as_secs(),
                "Starting credential refresh task"
            );
            let mut delay = first_delay;

            loop {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = token.cancelled() => break,
                }

                let result = tokio::select! {
                    result = session.login(api.as_ref(), timeout) => result,
                    () = token.cancelled() => break,
                };

                delay = match result {
                    Ok(credential) => {
                        debug!(
                            user_id = credential.user_id,
                            expires_in = credential.expires_in,
                            "Refreshed access token"
                        );
                        refresh_delay(credential.expires_in)
                    }
                    Err(e) => {
                        error!(
                            error = %e,
                            retry_in_secs = retry_delay.as_secs(),
                            "Failed to refresh access token"
                        );
                        retry_delay
                    }
                };
            }

            info!("Credential refresh task stopped");
        });

        Self { handle, shutdown }
    }

    /// Cancel the task and wait for it to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            error!(error = %e, "Credential refresh task panicked");
        }
    }
}
