//! Deployment health prober.
//!
//! Polls the deployed artifact's health endpoint until it answers 200 or
//! the deploy bound elapses. Any single attempt that errors (connection
//! refused, reset, slow response) counts as "not yet ready": the artifact
//! is expected to be transiently unavailable while it starts.

use crate::error::{HarnessError, Result};
use std::time::{Duration, Instant};

/// Interval between probe attempts.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Bound on a single probe attempt, so one hung connection cannot stall
/// the loop past the deploy bound.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Probe `url` until it answers 200 or `deploy_duration` elapses.
pub async fn probe(url: &str, deploy_duration: Duration) -> Result<()> {
    let uri: hyper::Uri = url.parse().map_err(|e| {
        HarnessError::InvalidConfiguration(format!("invalid health URL {url}: {e}"))
    })?;
    let client = hyper::Client::new();

    let start = Instant::now();
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match tokio::time::timeout(ATTEMPT_TIMEOUT, client.get(uri.clone())).await {
            Ok(Ok(response)) if response.status() == hyper::StatusCode::OK => {
                tracing::info!(
                    url,
                    attempts,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Deployment answered health probe"
                );
                return Ok(());
            }
            Ok(Ok(response)) => {
                tracing::trace!(url, status = %response.status(), attempts, "Not ready yet");
            }
            Ok(Err(e)) => {
                tracing::trace!(url, error = %e, attempts, "Probe attempt failed, retrying...");
            }
            Err(_) => {
                tracing::trace!(url, attempts, "Probe attempt timed out, retrying...");
            }
        }

        if start.elapsed() >= deploy_duration {
            tracing::warn!(
                url,
                attempts,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Deployment never answered health probe"
            );
            return Err(HarnessError::DeploymentNotReady(deploy_duration));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
