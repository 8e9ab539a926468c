//! Run configuration.

use crate::error::{HarnessError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Default bound on waiting for the health endpoint.
pub const DEFAULT_DEPLOY_DURATION: Duration = Duration::from_secs(10);

/// Default ceiling on waiting for the loading context to be reclaimed.
pub const DEFAULT_LEAK_DURATION: Duration = Duration::from_secs(120);

/// Immutable parameters for one leak-test run.
///
/// Set through the fluent methods on
/// [`WebAppTest`](crate::harness::WebAppTest) before `start()`; no
/// validation happens at set time.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    /// Path to the artifact under test. Required.
    pub(crate) war_path: Option<PathBuf>,
    /// Health path under the mount point. Defaults to empty.
    pub(crate) ping_end_point: String,
    /// Bound on waiting for the health endpoint.
    pub(crate) deploy_duration: Duration,
    /// Optional descriptor override applied on top of the artifact's own.
    pub(crate) context_path: Option<PathBuf>,
    /// Whether the leak check runs during `stop()`.
    pub(crate) test_leak: bool,
    /// Ceiling on waiting for the loading context to clear.
    pub(crate) leak_duration: Duration,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            war_path: None,
            ping_end_point: String::new(),
            deploy_duration: DEFAULT_DEPLOY_DURATION,
            context_path: None,
            test_leak: true,
            leak_duration: DEFAULT_LEAK_DURATION,
        }
    }
}

impl RunConfiguration {
    /// Validate the configuration. Called at the start of every `start()`,
    /// before any resource is provisioned.
    pub fn validate(&self) -> Result<()> {
        let war_path = self
            .war_path
            .as_deref()
            .ok_or_else(|| HarnessError::InvalidConfiguration("war path is not set".to_string()))?;
        if !war_path.exists() {
            return Err(HarnessError::InvalidConfiguration(format!(
                "WAR file does not exist: {}",
                war_path.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfiguration::default();
        assert!(config.war_path.is_none());
        assert_eq!(config.ping_end_point, "");
        assert_eq!(config.deploy_duration, Duration::from_secs(10));
        assert!(config.context_path.is_none());
        assert!(config.test_leak);
        assert_eq!(config.leak_duration, Duration::from_secs(120));
    }

    #[test]
    fn test_validate_requires_war_path() {
        let config = RunConfiguration::default();
        assert!(matches!(
            config.validate(),
            Err(HarnessError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_requires_existing_war_file() {
        let config = RunConfiguration {
            war_path: Some(PathBuf::from("/nonexistent/app.war")),
            ..RunConfiguration::default()
        };
        let error = config.validate().expect_err("missing file must fail");
        assert!(error.to_string().contains("does not exist"));
    }

    #[test]
    fn test_validate_accepts_existing_file() {
        let path = std::env::temp_dir().join("leaktest-config-validate.war");
        std::fs::write(&path, "{}").expect("write scratch artifact");
        let config = RunConfiguration {
            war_path: Some(path.clone()),
            ..RunConfiguration::default()
        };
        assert!(config.validate().is_ok());
        let _ = std::fs::remove_file(path);
    }
}
