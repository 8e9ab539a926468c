//! Leak verifier.
//!
//! After undeploy, the container holds no reference to the deployment's
//! loading context; if nothing else does either, a reclamation pass will
//! release it. The verifier hints the reclaimer, runs the pressure
//! generator concurrently to force a pass, and polls the weak observation
//! until it clears or the ceiling elapses. Exceeding the ceiling is the
//! harness's core positive result: the context was pinned.

use crate::error::{HarnessError, Result};
use crate::pressure::PressureGenerator;
use leaktest_container::{ContextObservation, MetadataRegion};
use std::time::{Duration, Instant};

/// Interval between observation polls.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poll `observation` until it reports reclaimed, bounded by `ceiling`.
pub async fn verify(observation: &ContextObservation, ceiling: Duration) -> Result<()> {
    // A hint, not a guarantee; pressure is what actually forces a pass.
    MetadataRegion::global().request_pass();

    let _generator = PressureGenerator::spawn(observation.clone());

    let start = Instant::now();
    loop {
        if observation.is_reclaimed() {
            tracing::info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Loading context reclaimed"
            );
            return Ok(());
        }
        if start.elapsed() >= ceiling {
            tracing::warn!(ceiling_secs = ceiling.as_secs(), "Loading context not reclaimed");
            return Err(HarnessError::LeakDetected(ceiling));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
