//! # leaktest-container
//!
//! Embedded host container and simulated managed-runtime primitives for
//! undeploy leak tests.
//!
//! This crate provides the collaborator side of the leak-test harness: an
//! ephemeral [`HostContainer`] that stages one artifact under a fixed mount
//! path and serves its health endpoint over HTTP, plus the runtime
//! primitives the leak check is defined against:
//!
//! - [`LoadingContext`] / [`ContextObservation`] — the per-deployment
//!   isolated context and a weak observation of it whose only query is
//!   "has the referent been reclaimed?".
//! - [`MetadataRegion`] — a process-wide, bounded metadata accounting
//!   region with a pass-based reclaimer. Retired contexts are released only
//!   by a reclamation pass, so reclamation is pressure-driven rather than
//!   immediate, mirroring a collector that must be coaxed into visiting
//!   the metadata region.
//!
//! ## Lifecycle
//!
//! ```text
//! provision() ──▶ deploy() ──▶ start() ──▶ undeploy() ──▶ stop() ──▶ destroy()
//!                                  │                         │           │
//!                                  ▼                         ▼           ▼
//!                           health endpoint           ServerStopped  ContextDestroyed
//!                           on assigned port             (event)        (event)
//! ```

mod artifact;
mod container;
mod error;
mod events;
mod loading;
mod region;

pub use artifact::{ArtifactDescriptor, DescriptorOverride};
pub use container::{DeploymentSettings, DeploymentState, HostContainer, MOUNT_PATH};
pub use error::{ContainerError, Result};
pub use events::LifecycleEvent;
pub use loading::{pin_context, pinned_contexts, ContextObservation, LoadingContext};
pub use region::{MetadataRegion, METADATA_LIMIT_ENV};
