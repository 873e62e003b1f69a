//! Multicast resumption check after a roam.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::IterationError;
use crate::testbed::TrafficControl;
use crate::wait::CancelFlag;

/// Whether multicast reception came back once the stations roamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MulticastOutcome {
    ResumedImmediately,
    ResumedAfterRetry,
    NotResumed,
}

/// Every receiver reports a nonzero rate. No receivers counts as stalled.
#[must_use]
pub fn rates_resumed(rates: &[f64]) -> bool {
    !rates.is_empty() && rates.iter().all(|rate| *rate > 0.0)
}

/// Read receive rates; if any receiver is idle, restart multicast, wait
/// `retry_wait` and read once more.
pub async fn check_multicast<T: TrafficControl>(
    traffic: &T,
    endpoints: &[String],
    retry_wait: Duration,
    cancel: &CancelFlag,
) -> Result<MulticastOutcome, IterationError> {
    let rates = traffic
        .multicast_rx_rates(endpoints)
        .await
        .map_err(IterationError::testbed("multicast rx rates"))?;
    if rates_resumed(&rates) {
        info!(?rates, "multicast resumed after roam");
        return Ok(MulticastOutcome::ResumedImmediately);
    }

    warn!(?rates, "multicast idle after roam, restarting");
    traffic
        .start_multicast()
        .await
        .map_err(IterationError::testbed("start multicast"))?;
    if !cancel.sleep(retry_wait).await {
        return Err(IterationError::Cancelled);
    }
    traffic
        .start_multicast()
        .await
        .map_err(IterationError::testbed("start multicast"))?;

    let rates = traffic
        .multicast_rx_rates(endpoints)
        .await
        .map_err(IterationError::testbed("multicast rx rates"))?;
    if rates_resumed(&rates) {
        info!(?rates, "multicast resumed after retry");
        Ok(MulticastOutcome::ResumedAfterRetry)
    } else {
        warn!(?rates, "multicast did not resume");
        Ok(MulticastOutcome::NotResumed)
    }
}
