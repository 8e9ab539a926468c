//! Error taxonomy for the leak-test harness.
//!
//! Every operation carries exactly one tag from this enum, so callers
//! branch on the variant rather than on error source chains. Only
//! `start()`, `stop()` and `run()` raise these; configuration setters
//! never fail.

use leaktest_container::ContainerError;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Errors raised by the leak-test harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Bad run parameters; raised before any resource is touched
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The metadata region is unbounded; raised once per process
    #[error("misconfigured environment: {0}")]
    MisconfiguredEnvironment(String),

    /// Working directory or container instance could not be provisioned
    #[error("provisioning failed: {0}")]
    Provisioning(#[source] ContainerError),

    /// Artifact could not be registered with the container
    #[error("deployment failed: {0}")]
    Deployment(#[source] ContainerError),

    /// Container failed to start
    #[error("container startup failed: {0}")]
    Startup(#[source] ContainerError),

    /// Deployment state after start was not exactly "started"
    #[error("deployment state is not {expected} but {actual}")]
    Lifecycle { expected: String, actual: String },

    /// Health endpoint never answered successfully within the deploy bound
    #[error("web application not properly deployed within {0:?}")]
    DeploymentNotReady(Duration),

    /// The loading context was not reclaimed within the bound; this is the
    /// harness's core positive result
    #[error("loading context was not reclaimed within {0:?}")]
    LeakDetected(Duration),

    /// Shutdown wait exceeded or the container failed during teardown
    #[error("teardown did not complete: {0}")]
    Teardown(String),
}
