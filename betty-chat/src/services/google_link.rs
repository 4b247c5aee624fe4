//! Waits for the backend to report a linked Google account after the user
//! was sent through the browser consent flow.

use backoff::future::retry;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use betty_core::config::GoogleLinkSettings;
use betty_core::error::GatewayError;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::wire::GoogleStatus;
use crate::services::gateway::ChatGateway;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Google account was not linked within {0:?}")]
    TimedOut(Duration),

    #[error("Google link check cancelled")]
    Cancelled,

    #[error("Google link check failed: {0}")]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Clone)]
pub struct LinkPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
}

impl LinkPolicy {
    fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            .with_max_elapsed_time(Some(self.max_elapsed))
            .build()
    }
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self::from(&GoogleLinkSettings::default())
    }
}

impl From<&GoogleLinkSettings> for LinkPolicy {
    fn from(settings: &GoogleLinkSettings) -> Self {
        Self {
            initial_interval: Duration::from_millis(settings.initial_interval_ms),
            max_interval: Duration::from_millis(settings.max_interval_ms),
            max_elapsed: Duration::from_secs(settings.max_elapsed_secs),
        }
    }
}

enum Poll {
    NotLinked,
    Failed(GatewayError),
}

/// Poll `google_status` until the account shows as connected.
pub async fn await_google_link(
    gateway: &dyn ChatGateway,
    policy: &LinkPolicy,
    cancel: &CancellationToken,
) -> Result<GoogleStatus, LinkError> {
    if cancel.is_cancelled() {
        return Err(LinkError::Cancelled);
    }

    let poll = retry(policy.to_backoff(), || async {
        match gateway.google_status().await {
            Ok(status) if status.connected => Ok(status),
            Ok(_) => {
                tracing::debug!("Google account not linked yet");
                Err(backoff::Error::transient(Poll::NotLinked))
            }
            Err(err) if err.is_retryable() => {
                tracing::warn!(error = %err, "Google status check failed, retrying");
                Err(backoff::Error::transient(Poll::Failed(err)))
            }
            Err(err) => Err(backoff::Error::permanent(Poll::Failed(err))),
        }
    });

    let result = tokio::select! {
        result = poll => result,
        _ = cancel.cancelled() => {
            tracing::info!("Google link check cancelled");
            return Err(LinkError::Cancelled);
        }
    };

    match result {
        Ok(status) => {
            tracing::info!(email = ?status.email, "Google account linked");
            Ok(status)
        }
        Err(Poll::Failed(err)) if !err.is_retryable() => {
            tracing::error!(kind = %err.kind(), error = %err, "Google link check failed");
            Err(LinkError::Gateway(err))
        }
        Err(_) => {
            tracing::warn!(budget = ?policy.max_elapsed, "Gave up waiting for Google link");
            Err(LinkError::TimedOut(policy.max_elapsed))
        }
    }
}
