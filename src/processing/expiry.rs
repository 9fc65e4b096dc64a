//! Periodic deletion of expired upload namespaces.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::service::RagService;

/// Run [`RagService::expire_namespaces`] every `period` until the runtime shuts down.
///
/// Returns `None` without spawning anything when `period` is zero. A failed sweep is logged and
/// retried on the next tick.
pub fn spawn_expiry_task(service: Arc<RagService>, period: Duration) -> Option<JoinHandle<()>> {
    if period.is_zero() || service.settings().vector_expiration_days == 0 {
        tracing::info!("Namespace expiry sweep disabled");
        return None;
    }

    tracing::info!(
        period_secs = period.as_secs(),
        days = service.settings().vector_expiration_days,
        "Starting namespace expiry sweep"
    );
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match service.expire_namespaces(false).await {
                Ok(expired) if expired.is_empty() => {
                    tracing::debug!("No namespaces expired");
                }
                Ok(expired) => {
                    tracing::info!(count = expired.len(), "Expired namespaces removed");
                }
                Err(error) => {
                    tracing::warn!(error = %error, "Namespace expiry sweep failed");
                }
            }
        }
    }))
}
