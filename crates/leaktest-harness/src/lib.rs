//! # leaktest-harness
//!
//! Verifies that undeploying an artifact from the embedded host container
//! does not pin its isolated loading context in memory.
//!
//! The harness drives one deployment lifecycle end to end and turns the
//! asynchronous, non-deterministic reclamation of the deployment's loading
//! context into a pass/fail result:
//!
//! 1. `start()` — check the process environment, validate the
//!    configuration, provision an ephemeral container, deploy and start the
//!    artifact, capture a weak observation of its loading context, then
//!    poll the health endpoint until it answers.
//! 2. `stop()` — undeploy, hint the reclaimer, generate metadata pressure
//!    from a concurrent task, and poll the observation until it clears or
//!    the ceiling elapses. Teardown always runs afterwards.
//! 3. `run()` — both, with teardown guaranteed on every path.
//!
//! A context still reachable after the ceiling is reported as
//! [`HarnessError::LeakDetected`] — the harness's core positive result. It
//! is a best-effort forcing function with a timeout, not a proof, and it
//! does not diagnose *why* a context was pinned.
//!
//! ## Environment
//!
//! The process-wide metadata region must be bounded, or the forcing
//! strategy can never trigger a reclamation pass. Configure it through
//! `LEAKTEST_METADATA_LIMIT` or
//! [`MetadataRegion::init_with_limit`](leaktest_container::MetadataRegion::init_with_limit)
//! before the first run; an unbounded region fails every run fast with
//! [`HarnessError::MisconfiguredEnvironment`].
//!
//! ## Example
//!
//! ```ignore
//! use leaktest_harness::WebAppTest;
//!
//! # async fn example() -> leaktest_harness::Result<()> {
//! WebAppTest::new()
//!     .war_path("target/app.war")
//!     .ping_end_point("health")
//!     .deploy_duration(10)
//!     .run()
//!     .await
//! # }
//! ```

mod config;
mod coordinator;
mod error;
mod harness;
mod precondition;
mod pressure;
mod prober;
mod verifier;

pub use config::{RunConfiguration, DEFAULT_DEPLOY_DURATION, DEFAULT_LEAK_DURATION};
pub use coordinator::TerminationCoordinator;
pub use error::{HarnessError, Result};
pub use harness::WebAppTest;
pub use pressure::PressureGenerator;

// Re-exported so harness users can configure the runtime simulation
// without depending on the container crate directly.
pub use leaktest_container::{ContextObservation, MetadataRegion, METADATA_LIMIT_ENV};
