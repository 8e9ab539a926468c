//! Artifact descriptors.
//!
//! An artifact is a JSON descriptor file describing how the deployed
//! component behaves once loaded. The harness treats the file as opaque;
//! only the container parses it. A descriptor override (the deployment's
//! optional context configuration) is a second document whose present
//! fields replace the artifact's own.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Behavior of a deployable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactDescriptor {
    /// Display name, used for the loading context.
    pub name: String,
    /// Store a strong reference to the deployment's loading context in the
    /// process-wide pin registry during startup.
    pub leak_context: bool,
    /// Fail deployment initialization; the observable state becomes
    /// `Failed` rather than `Started`.
    pub fail_startup: bool,
    /// Milliseconds after start before the health endpoint answers
    /// successfully. The endpoint answers 503 until then.
    pub ready_delay_ms: u64,
    /// Status the health endpoint answers with once ready.
    pub health_status: u16,
    /// Spawn a background keep-alive task holding a context reference.
    pub keep_alive_task: bool,
}

impl Default for ArtifactDescriptor {
    fn default() -> Self {
        Self {
            name: "webapp".to_string(),
            leak_context: false,
            fail_startup: false,
            ready_delay_ms: 0,
            health_status: 200,
            keep_alive_task: false,
        }
    }
}

impl ArtifactDescriptor {
    /// Parse a descriptor from its JSON source.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Apply an override, replacing every field the override sets.
    pub fn apply(&mut self, overrides: &DescriptorOverride) {
        if let Some(name) = &overrides.name {
            self.name = name.clone();
        }
        if let Some(leak_context) = overrides.leak_context {
            self.leak_context = leak_context;
        }
        if let Some(fail_startup) = overrides.fail_startup {
            self.fail_startup = fail_startup;
        }
        if let Some(ready_delay_ms) = overrides.ready_delay_ms {
            self.ready_delay_ms = ready_delay_ms;
        }
        if let Some(health_status) = overrides.health_status {
            self.health_status = health_status;
        }
        if let Some(keep_alive_task) = overrides.keep_alive_task {
            self.keep_alive_task = keep_alive_task;
        }
    }
}

/// Partial descriptor applied on top of an artifact's own.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DescriptorOverride {
    pub name: Option<String>,
    pub leak_context: Option<bool>,
    pub fail_startup: Option<bool>,
    pub ready_delay_ms: Option<u64>,
    pub health_status: Option<u16>,
    pub keep_alive_task: Option<bool>,
}

impl DescriptorOverride {
    /// Parse an override from its JSON source.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_descriptor_uses_defaults() {
        let descriptor = ArtifactDescriptor::parse("{}").expect("empty object is valid");
        assert_eq!(descriptor, ArtifactDescriptor::default());
        assert_eq!(descriptor.health_status, 200);
        assert!(!descriptor.leak_context);
    }

    #[test]
    fn test_parse_full_descriptor() {
        let descriptor = ArtifactDescriptor::parse(
            r#"{
                "name": "leaky",
                "leak_context": true,
                "ready_delay_ms": 250,
                "health_status": 204
            }"#,
        )
        .expect("valid descriptor");
        assert_eq!(descriptor.name, "leaky");
        assert!(descriptor.leak_context);
        assert_eq!(descriptor.ready_delay_ms, 250);
        assert_eq!(descriptor.health_status, 204);
        assert!(!descriptor.fail_startup);
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        assert!(ArtifactDescriptor::parse("not json").is_err());
    }

    #[test]
    fn test_override_replaces_only_present_fields() {
        let mut descriptor = ArtifactDescriptor::parse(r#"{"name": "app", "health_status": 204}"#)
            .expect("valid descriptor");
        let overrides =
            DescriptorOverride::parse(r#"{"leak_context": true}"#).expect("valid override");
        descriptor.apply(&overrides);
        assert!(descriptor.leak_context);
        assert_eq!(descriptor.name, "app");
        assert_eq!(descriptor.health_status, 204);
    }
}
