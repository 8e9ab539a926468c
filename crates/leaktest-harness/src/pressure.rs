//! Memory-pressure generator.
//!
//! A background task that keeps defining small throwaway types in a
//! scratch loading context, consuming metadata headroom so that the
//! reclaimer visits the region sooner than it would under idle conditions.
//! It never touches the observed context itself; the only state it shares
//! with the polling loop is the reclaimed condition, which it re-checks
//! every iteration and which therefore also serves as its exit signal.

use leaktest_container::{ContextObservation, LoadingContext, MetadataRegion};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Size of one throwaway type definition.
const THROWAWAY_TYPE_BYTES: usize = 64 * 1024;

/// Pause between definitions, so the generator does not monopolize a
/// worker thread.
const LOAD_INTERVAL: Duration = Duration::from_millis(10);

/// Handle to the running pressure task.
pub struct PressureGenerator {
    task: JoinHandle<()>,
}

impl PressureGenerator {
    /// Start generating pressure until `observation` reports reclaimed.
    pub fn spawn(observation: ContextObservation) -> Self {
        let task = tokio::spawn(generate(observation));
        Self { task }
    }
}

impl Drop for PressureGenerator {
    fn drop(&mut self) {
        // Normally the task has already exited through the shared
        // condition; a detected leak means it never will, so the polling
        // loop's ceiling also bounds the generator's lifetime.
        self.task.abort();
    }
}

async fn generate(observation: ContextObservation) {
    let region = MetadataRegion::global();
    let mut scratch = LoadingContext::new("throwaway-scratch");
    let mut seen_passes = region.passes();
    let mut generated = 0u64;

    while !observation.is_reclaimed() {
        // A pass reclaimed earlier throwaway definitions; start over with a
        // fresh scratch context so they do not accumulate.
        let passes = region.passes();
        if passes != seen_passes {
            seen_passes = passes;
            scratch = LoadingContext::new("throwaway-scratch");
        }

        let type_name = format!("throwaway.{}", Uuid::new_v4());
        if let Err(e) = scratch.define_type(region, &type_name, THROWAWAY_TYPE_BYTES) {
            tracing::warn!(error = %e, generated, "Pressure generator stopped on error");
            return;
        }
        generated += 1;
        tokio::time::sleep(LOAD_INTERVAL).await;
    }

    tracing::debug!(generated, "Pressure generator observed reclamation, exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use leaktest_container::ContextObservation;
    use std::time::Instant;

    /// Unit tests share one process-wide region; the first `global()` touch
    /// wins, so every test that spawns a generator must bound the region
    /// itself and verify the bound actually took.
    fn init_bounded_region() {
        MetadataRegion::init_with_limit(4 * 1024 * 1024);
        assert!(
            MetadataRegion::global().limit().is_some(),
            "process-wide region must be bounded"
        );
    }

    #[tokio::test]
    async fn test_generator_exits_when_condition_clears() {
        init_bounded_region();
        let context = LoadingContext::new("observed");
        let observation = ContextObservation::of(&context);
        let generator = PressureGenerator::spawn(observation.clone());

        drop(context);
        let start = Instant::now();
        while !generator.task.is_finished() {
            assert!(
                start.elapsed() < Duration::from_secs(5),
                "generator did not self-terminate"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_generator_builds_pressure_on_global_region() {
        init_bounded_region();
        let context = LoadingContext::new("pressured");
        let observation = ContextObservation::of(&context);
        let used_before = MetadataRegion::global().used();
        let passes_before = MetadataRegion::global().passes();
        let generator = PressureGenerator::spawn(observation);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let region = MetadataRegion::global();
        assert!(
            region.used() > used_before || region.passes() > passes_before,
            "no pressure observed"
        );
        drop(generator);
        drop(context);
    }
}
