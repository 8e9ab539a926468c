//! The leak-test session.
//!
//! [`WebAppTest`] drives one provision → deploy → start → probe → undeploy
//! → verify → teardown cycle from a single orchestrating task. Teardown is
//! the single exit path for every route: `stop()` always performs it, and
//! `run()` guarantees it even when `start()` or `stop()` fails.

use crate::config::RunConfiguration;
use crate::coordinator::TerminationCoordinator;
use crate::error::{HarnessError, Result};
use crate::{precondition, prober, verifier};
use leaktest_container::{ContextObservation, DeploymentState, HostContainer, MOUNT_PATH};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Bound on waiting for both termination flags during teardown.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval between termination flag polls.
const TEARDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A single deploy/undeploy leak-test session.
///
/// Configure through the fluent setters, then call [`run`](Self::run) (or
/// [`start`](Self::start) and [`stop`](Self::stop) separately). A session
/// is not reusable across cycles: each `start()` provisions a fresh
/// container.
///
/// # Example
///
/// ```ignore
/// use leaktest_harness::WebAppTest;
///
/// # async fn example() -> leaktest_harness::Result<()> {
/// WebAppTest::new()
///     .war_path("target/app.war")
///     .ping_end_point("health")
///     .deploy_duration(10)
///     .run()
///     .await
/// # }
/// ```
pub struct WebAppTest {
    config: RunConfiguration,
    container: Option<HostContainer>,
    coordinator: Option<TerminationCoordinator>,
    observation: Option<ContextObservation>,
    base_dir: Option<PathBuf>,
    deployed: bool,
    port: u16,
}

impl Default for WebAppTest {
    fn default() -> Self {
        Self::new()
    }
}

impl WebAppTest {
    /// Create a session with default configuration.
    pub fn new() -> Self {
        Self {
            config: RunConfiguration::default(),
            container: None,
            coordinator: None,
            observation: None,
            base_dir: None,
            deployed: false,
            port: 0,
        }
    }

    /// Set the path of the artifact under test.
    pub fn war_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.war_path = Some(path.into());
        self
    }

    /// Set the health path probed under the mount point.
    pub fn ping_end_point(mut self, end_point: impl Into<String>) -> Self {
        self.config.ping_end_point = end_point.into();
        self
    }

    /// Set the bound, in seconds, on waiting for the health endpoint.
    pub fn deploy_duration(mut self, seconds: u64) -> Self {
        self.config.deploy_duration = Duration::from_secs(seconds);
        self
    }

    /// Set an optional descriptor override applied on top of the artifact.
    pub fn context_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.context_path = Some(path.into());
        self
    }

    /// Enable or disable the leak check during `stop()`.
    pub fn test_leak(mut self, enabled: bool) -> Self {
        self.config.test_leak = enabled;
        self
    }

    /// Set the ceiling, in seconds, on waiting for the loading context to
    /// be reclaimed. Defaults to two minutes.
    pub fn leak_duration(mut self, seconds: u64) -> Self {
        self.config.leak_duration = Duration::from_secs(seconds);
        self
    }

    /// The container's assigned port. Zero before `start()` has completed.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The ephemeral working directory of the current or last session.
    pub fn working_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Provision, deploy, start and probe.
    ///
    /// Container-layer failures tear the ephemeral container down before
    /// propagating; a probe timeout propagates as-is and leaves teardown to
    /// `stop()` or `run()`.
    pub async fn start(&mut self) -> Result<()> {
        precondition::check()?;
        self.config.validate()?;

        match self.start_inner().await {
            Err(
                e @ (HarnessError::Provisioning(_)
                | HarnessError::Deployment(_)
                | HarnessError::Startup(_)
                | HarnessError::Lifecycle { .. }),
            ) => {
                if let Err(teardown_error) = self.teardown().await {
                    tracing::error!(error = %teardown_error, "Teardown after failed start also failed");
                }
                Err(e)
            }
            other => other,
        }
    }

    async fn start_inner(&mut self) -> Result<()> {
        // Fully reset session state; a previous container is torn down
        // before the new one is provisioned.
        if self.container.is_some() {
            self.teardown().await?;
        }
        self.observation = None;
        self.deployed = false;
        self.port = 0;

        let mut container = HostContainer::provision()
            .await
            .map_err(HarnessError::Provisioning)?;
        self.base_dir = Some(container.base_dir().to_path_buf());

        let result = self.bring_up(&mut container).await;
        self.container = Some(container);
        result
    }

    async fn bring_up(&mut self, container: &mut HostContainer) -> Result<()> {
        let war_path = self.config.war_path.clone().ok_or_else(|| {
            HarnessError::InvalidConfiguration("war path is not set".to_string())
        })?;

        container
            .deploy(&war_path, self.config.context_path.as_deref())
            .await
            .map_err(HarnessError::Deployment)?;

        // Lifecycle listeners attach before the container starts so no
        // termination event can be missed.
        self.coordinator = Some(TerminationCoordinator::attach(container.subscribe()));

        container.start().await.map_err(HarnessError::Startup)?;

        match container.deployment_state() {
            Some(DeploymentState::Started) => {}
            other => {
                let actual = other
                    .map(|state| state.to_string())
                    .unwrap_or_else(|| "absent".to_string());
                return Err(HarnessError::Lifecycle {
                    expected: "started".to_string(),
                    actual,
                });
            }
        }

        // Captured before the probe, so an artifact that leaks during its
        // own startup is still observable.
        self.observation = container.observe_context();
        self.port = container.port();
        self.deployed = true;

        let url = format!(
            "http://localhost:{}{}/{}",
            self.port, MOUNT_PATH, self.config.ping_end_point
        );
        prober::probe(&url, self.config.deploy_duration).await
    }

    /// Undeploy, verify the loading context is reclaimed, and tear down.
    ///
    /// Teardown runs regardless of the verification outcome.
    pub async fn stop(&mut self) -> Result<()> {
        let result = self.stop_inner().await;
        let teardown = self.teardown().await;
        result.and(teardown)
    }

    async fn stop_inner(&mut self) -> Result<()> {
        if self.deployed {
            if let Some(container) = self.container.as_mut() {
                // Blocks until removal completes; no post-check is needed.
                container
                    .undeploy()
                    .await
                    .map_err(|e| HarnessError::Teardown(format!("undeploy failed: {e}")))?;
            }
            self.deployed = false;
        }
        self.verify_leak().await
    }

    async fn verify_leak(&mut self) -> Result<()> {
        if !self.config.test_leak {
            tracing::debug!("Leak check disabled");
            return Ok(());
        }
        let Some(observation) = self.observation.as_ref() else {
            tracing::debug!("No context observation captured; skipping leak check");
            return Ok(());
        };
        verifier::verify(observation, self.config.leak_duration).await
    }

    /// `start()` then `stop()`, with teardown guaranteed in all paths.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.run_inner().await;
        let teardown = self.teardown().await;
        result.and(teardown)
    }

    async fn run_inner(&mut self) -> Result<()> {
        self.start().await?;
        self.stop().await
    }

    /// Idempotent shutdown of the container and removal of the working
    /// directory.
    ///
    /// Directory removal is best-effort: failures are logged and never
    /// mask the run's outcome.
    pub async fn teardown(&mut self) -> Result<()> {
        let result = self.shutdown_container().await;

        if let Some(dir) = self.base_dir.as_deref() {
            if let Err(e) = tokio::fs::remove_dir_all(dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(dir = %dir.display(), error = %e, "Failed to remove working directory");
                }
            }
        }

        result
    }

    async fn shutdown_container(&mut self) -> Result<()> {
        let Some(mut container) = self.container.take() else {
            return Ok(());
        };
        let coordinator = self.coordinator.take();

        if coordinator
            .as_ref()
            .map(|c| c.terminated())
            .unwrap_or(false)
        {
            tracing::debug!("Container already terminated");
            return Ok(());
        }

        container
            .stop()
            .await
            .map_err(|e| HarnessError::Teardown(format!("stop failed: {e}")))?;
        container
            .destroy()
            .await
            .map_err(|e| HarnessError::Teardown(format!("destroy failed: {e}")))?;

        if let Some(coordinator) = coordinator {
            let start = Instant::now();
            while !coordinator.terminated() {
                if start.elapsed() >= TEARDOWN_TIMEOUT {
                    return Err(HarnessError::Teardown(format!(
                        "container did not terminate within {TEARDOWN_TIMEOUT:?}"
                    )));
                }
                tokio::time::sleep(TEARDOWN_POLL_INTERVAL).await;
            }
            tracing::debug!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Container terminated"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fluent_configuration() {
        let test = WebAppTest::new()
            .war_path("/tmp/app.war")
            .ping_end_point("health")
            .deploy_duration(5)
            .context_path("/tmp/context.json")
            .test_leak(false)
            .leak_duration(30);

        assert_eq!(test.config.war_path.as_deref(), Some(Path::new("/tmp/app.war")));
        assert_eq!(test.config.ping_end_point, "health");
        assert_eq!(test.config.deploy_duration, Duration::from_secs(5));
        assert_eq!(
            test.config.context_path.as_deref(),
            Some(Path::new("/tmp/context.json"))
        );
        assert!(!test.config.test_leak);
        assert_eq!(test.config.leak_duration, Duration::from_secs(30));
    }

    #[test]
    fn test_port_is_zero_before_start() {
        assert_eq!(WebAppTest::new().port(), 0);
    }

    #[tokio::test]
    async fn test_teardown_before_start_is_a_no_op() {
        let mut test = WebAppTest::new();
        test.teardown().await.expect("nothing to tear down");
        test.teardown().await.expect("still nothing");
    }
}
