//! Embedded host container.
//!
//! `HostContainer` provisions an ephemeral working directory, registers one
//! artifact under a fixed mount path, and serves its health endpoint over
//! HTTP on an OS-assigned port. Lifecycle completion is published on a
//! broadcast channel, since neither `stop` nor `destroy` is synchronously
//! observable from the outside.

use crate::artifact::{ArtifactDescriptor, DescriptorOverride};
use crate::error::{ContainerError, Result};
use crate::events::{LifecycleEvent, EVENT_CHANNEL_CAPACITY};
use crate::loading::{self, ContextObservation, LoadingContext};
use crate::region::MetadataRegion;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Fixed mount path every deployment is registered under.
pub const MOUNT_PATH: &str = "/test";

/// Name the artifact file is staged under inside the app base.
const STAGED_ARTIFACT: &str = "test.json";

/// Bound on waiting for the HTTP server to drain during stop.
const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Container-level settings applied to a deployment.
///
/// The leak-test defaults disable resource caching (every request
/// round-trips to disk instead of reading cached bytes) and clear the
/// deployment's background tasks on undeploy so they cannot pin the
/// loading context.
#[derive(Debug, Clone)]
pub struct DeploymentSettings {
    /// Serve artifact bytes from an in-memory cache instead of disk.
    pub caching_allowed: bool,
    /// Abort the deployment's keep-alive task on undeploy.
    pub clear_keep_alive_task: bool,
    /// Abort any remaining deployment-spawned tasks on undeploy.
    pub clear_stop_tasks: bool,
    /// Abort deployment-spawned timer tasks on undeploy.
    pub clear_stop_timer_tasks: bool,
}

impl Default for DeploymentSettings {
    fn default() -> Self {
        Self {
            caching_allowed: true,
            clear_keep_alive_task: false,
            clear_stop_tasks: false,
            clear_stop_timer_tasks: false,
        }
    }
}

impl DeploymentSettings {
    /// Settings used when deploying for a leak test.
    pub fn leak_test_defaults() -> Self {
        Self {
            caching_allowed: false,
            clear_keep_alive_task: true,
            clear_stop_tasks: true,
            clear_stop_timer_tasks: true,
        }
    }
}

/// Observable state of the current deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentState {
    /// Deployment registered but not yet started.
    Starting,
    /// Deployment initialized and serving.
    Started,
    /// Deployment initialization failed.
    Failed(String),
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentState::Starting => write!(f, "starting"),
            DeploymentState::Started => write!(f, "started"),
            DeploymentState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// The currently registered deployment.
struct Deployment {
    descriptor: ArtifactDescriptor,
    settings: DeploymentSettings,
    staged_path: PathBuf,
    state: DeploymentState,
    context: Option<Arc<LoadingContext>>,
    keep_alive: Option<JoinHandle<()>>,
}

/// Handle to the running HTTP server task.
struct ServerHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

/// State shared with the HTTP handlers.
///
/// Deliberately holds no reference to the loading context, so the server
/// itself can never pin it.
struct AppState {
    descriptor: ArtifactDescriptor,
    staged_path: PathBuf,
    cached_bytes: Option<Vec<u8>>,
    ready_at: Instant,
}

/// An ephemeral, isolated host container instance.
pub struct HostContainer {
    id: Uuid,
    base_dir: PathBuf,
    app_base: PathBuf,
    provisioned_at: DateTime<Utc>,
    events: broadcast::Sender<LifecycleEvent>,
    deployment: Option<Deployment>,
    server: Option<ServerHandle>,
    port: u16,
}

impl HostContainer {
    /// Provision a new container instance with an ephemeral working
    /// directory under the system temp location.
    pub async fn provision() -> Result<Self> {
        let id = Uuid::new_v4();
        let base_dir = std::env::temp_dir().join(format!("leaktest-{id}"));
        let app_base = base_dir.join("webapps");

        tokio::fs::create_dir_all(&app_base).await.map_err(|e| {
            ContainerError::Provision(format!(
                "failed to create app base {}: {e}",
                app_base.display()
            ))
        })?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        tracing::info!(%id, base_dir = %base_dir.display(), "Container provisioned");
        Ok(Self {
            id,
            base_dir,
            app_base,
            provisioned_at: Utc::now(),
            events,
            deployment: None,
            server: None,
            port: 0,
        })
    }

    /// Get the unique ID of this container.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the ephemeral working directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Get the application base subdirectory.
    pub fn app_base(&self) -> &Path {
        &self.app_base
    }

    /// Get the provisioning timestamp.
    pub fn provisioned_at(&self) -> DateTime<Utc> {
        self.provisioned_at
    }

    /// Get the assigned port. Zero until the container has started.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Observable state of the current deployment, if any.
    pub fn deployment_state(&self) -> Option<&DeploymentState> {
        self.deployment.as_ref().map(|d| &d.state)
    }

    /// Capture a weak observation of the deployment's loading context.
    pub fn observe_context(&self) -> Option<ContextObservation> {
        self.deployment
            .as_ref()
            .and_then(|d| d.context.as_ref())
            .map(ContextObservation::of)
    }

    /// Register an artifact under the fixed mount path, applying the
    /// leak-test deployment settings.
    pub async fn deploy(
        &mut self,
        artifact: &Path,
        descriptor_override: Option<&Path>,
    ) -> Result<()> {
        self.deploy_with_settings(
            artifact,
            descriptor_override,
            DeploymentSettings::leak_test_defaults(),
        )
        .await
    }

    /// Register an artifact with explicit deployment settings.
    pub async fn deploy_with_settings(
        &mut self,
        artifact: &Path,
        descriptor_override: Option<&Path>,
        settings: DeploymentSettings,
    ) -> Result<()> {
        if self.deployment.is_some() {
            return Err(ContainerError::Deploy(
                "a deployment is already registered".to_string(),
            ));
        }

        let raw = tokio::fs::read_to_string(artifact).await?;
        let mut descriptor = ArtifactDescriptor::parse(&raw)
            .map_err(|e| ContainerError::Deploy(format!("invalid artifact descriptor: {e}")))?;

        if let Some(override_path) = descriptor_override {
            let raw = tokio::fs::read_to_string(override_path).await?;
            let overrides = DescriptorOverride::parse(&raw)
                .map_err(|e| ContainerError::Deploy(format!("invalid descriptor override: {e}")))?;
            descriptor.apply(&overrides);
        }

        // Stage the artifact bytes into the app base.
        let staged_path = self.app_base.join(STAGED_ARTIFACT);
        tokio::fs::copy(artifact, &staged_path).await.map_err(|e| {
            ContainerError::Deploy(format!(
                "failed to stage artifact into {}: {e}",
                staged_path.display()
            ))
        })?;

        tracing::info!(
            container = %self.id,
            artifact = %artifact.display(),
            name = %descriptor.name,
            mount = MOUNT_PATH,
            "Artifact deployed"
        );

        self.deployment = Some(Deployment {
            descriptor,
            settings,
            staged_path,
            state: DeploymentState::Starting,
            context: None,
            keep_alive: None,
        });
        Ok(())
    }

    /// Start the container: initialize the deployment and begin serving its
    /// health endpoint on an OS-assigned port.
    ///
    /// Deployment initialization failures are captured into the observable
    /// state rather than raised; query [`deployment_state`](Self::deployment_state)
    /// after start to distinguish them.
    pub async fn start(&mut self) -> Result<()> {
        // Pre-initialize leak-prone process-wide singletons at container
        // scope, before any deployment code runs.
        preinitialize_singletons();

        let deployment = self.deployment.as_mut().ok_or_else(|| {
            ContainerError::InvalidState {
                expected: "deployed".to_string(),
                actual: "no deployment registered".to_string(),
            }
        })?;

        let context = LoadingContext::new(deployment.descriptor.name.clone());

        if deployment.descriptor.fail_startup {
            deployment.state =
                DeploymentState::Failed("artifact startup failed".to_string());
            tracing::warn!(container = %self.id, "Deployment initialization failed");
        } else {
            if deployment.descriptor.leak_context {
                // The artifact stores a reference to its own loading context
                // in a process-wide singleton.
                loading::pin_context(context.clone());
            }
            if deployment.descriptor.keep_alive_task {
                let held = context.clone();
                deployment.keep_alive = Some(tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(Duration::from_secs(1));
                    loop {
                        ticker.tick().await;
                        tracing::trace!(context = %held.name(), "keep-alive tick");
                    }
                }));
            }
            deployment.state = DeploymentState::Started;
        }
        deployment.context = Some(context);

        let cached_bytes = if deployment.settings.caching_allowed {
            Some(
                tokio::fs::read(&deployment.staged_path)
                    .await
                    .map_err(|e| ContainerError::Startup(format!("failed to cache artifact: {e}")))?,
            )
        } else {
            None
        };

        let state = Arc::new(AppState {
            descriptor: deployment.descriptor.clone(),
            staged_path: deployment.staged_path.clone(),
            cached_bytes,
            ready_at: Instant::now() + Duration::from_millis(deployment.descriptor.ready_delay_ms),
        });

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| ContainerError::Startup(format!("failed to bind listener: {e}")))?;
        self.port = listener
            .local_addr()
            .map_err(|e| ContainerError::Startup(format!("failed to query local addr: {e}")))?
            .port();

        let router = Router::new()
            .fallback(serve_artifact)
            .with_state(state)
            .layer(TraceLayer::new_for_http());

        let shutdown = Arc::new(Notify::new());
        let shutdown_signal = shutdown.clone();
        let events = self.events.clone();
        let id = self.id;
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown_signal.notified().await })
                .await;
            if let Err(e) = result {
                tracing::error!(container = %id, error = %e, "HTTP server exited with error");
            }
            let _ = events.send(LifecycleEvent::ServerStopped);
        });
        self.server = Some(ServerHandle { shutdown, task });

        tracing::info!(container = %self.id, port = self.port, "Container started");
        Ok(())
    }

    /// Remove the deployment from the container.
    ///
    /// Blocks until removal completes: deployment tasks are stopped per the
    /// clearing-references settings and the container's context references
    /// are retired to the metadata region before this returns.
    pub async fn undeploy(&mut self) -> Result<()> {
        let Some(mut deployment) = self.deployment.take() else {
            return Ok(());
        };

        if let Some(keep_alive) = deployment.keep_alive.take() {
            if deployment.settings.clear_keep_alive_task || deployment.settings.clear_stop_tasks {
                keep_alive.abort();
                let _ = keep_alive.await;
                tracing::debug!(container = %self.id, "Keep-alive task cleared");
            } else {
                // Settings keep the task alive; its context reference will
                // pin the context past undeploy.
                tracing::warn!(container = %self.id, "Keep-alive task left running");
            }
        }

        if let Some(context) = deployment.context.take() {
            MetadataRegion::global().retire(context);
        }

        tracing::info!(container = %self.id, "Artifact undeployed");
        Ok(())
    }

    /// Stop serving HTTP.
    ///
    /// `ServerStopped` is published once the server task has drained; if the
    /// server never started, the event is published immediately so waiters
    /// still complete.
    pub async fn stop(&mut self) -> Result<()> {
        match self.server.take() {
            Some(mut server) => {
                tracing::info!(container = %self.id, "Stopping container");
                server.shutdown.notify_one();
                if tokio::time::timeout(GRACEFUL_STOP_TIMEOUT, &mut server.task)
                    .await
                    .is_err()
                {
                    tracing::warn!(container = %self.id, "Graceful stop timed out, aborting server task");
                    server.task.abort();
                    let _ = self.events.send(LifecycleEvent::ServerStopped);
                }
            }
            None => {
                let _ = self.events.send(LifecycleEvent::ServerStopped);
            }
        }
        Ok(())
    }

    /// Destroy the container, releasing every deployment reference.
    ///
    /// Consumes the container. Undeploys and stops first when still
    /// necessary, then publishes `ContextDestroyed`.
    pub async fn destroy(mut self) -> Result<()> {
        tracing::info!(container = %self.id, "Destroying container");
        if self.deployment.is_some() {
            self.undeploy().await?;
        }
        if self.server.is_some() {
            self.stop().await?;
        }
        let _ = self.events.send(LifecycleEvent::ContextDestroyed);
        Ok(())
    }
}

/// Eagerly initialize leak-prone process-wide singletons at container scope.
fn preinitialize_singletons() {
    loading::preinit_pin_registry();
    let _ = MetadataRegion::global();
}

/// Serve any request under the mount path with the deployment's configured
/// health behavior. Everything else is 404.
async fn serve_artifact(State(app): State<Arc<AppState>>, uri: Uri) -> Response {
    let path = uri.path();
    let under_mount = path
        .strip_prefix(MOUNT_PATH)
        .map(|rest| rest.is_empty() || rest.starts_with('/'))
        .unwrap_or(false);
    if !under_mount {
        return StatusCode::NOT_FOUND.into_response();
    }

    if Instant::now() < app.ready_at {
        tracing::trace!(path, "Deployment not yet ready");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    // With caching disabled every request re-reads the staged artifact.
    let artifact_len = match &app.cached_bytes {
        Some(bytes) => bytes.len(),
        None => match tokio::fs::read(&app.staged_path).await {
            Ok(bytes) => bytes.len(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read staged artifact");
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
        },
    };

    let status = StatusCode::from_u16(app.descriptor.health_status).unwrap_or(StatusCode::OK);
    tracing::trace!(path, status = %status, "Serving health request");
    (status, format!("{} ({artifact_len} bytes)\n", app.descriptor.name)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leak_test_defaults_disable_caching() {
        let settings = DeploymentSettings::leak_test_defaults();
        assert!(!settings.caching_allowed);
        assert!(settings.clear_keep_alive_task);
        assert!(settings.clear_stop_tasks);
        assert!(settings.clear_stop_timer_tasks);
    }

    #[test]
    fn test_default_settings_are_permissive() {
        let settings = DeploymentSettings::default();
        assert!(settings.caching_allowed);
        assert!(!settings.clear_keep_alive_task);
    }

    #[test]
    fn test_deployment_state_display() {
        assert_eq!(DeploymentState::Starting.to_string(), "starting");
        assert_eq!(DeploymentState::Started.to_string(), "started");
        assert_eq!(
            DeploymentState::Failed("boom".to_string()).to_string(),
            "failed: boom"
        );
    }

    #[tokio::test]
    async fn test_start_without_deployment_is_invalid_state() {
        let mut container = HostContainer::provision().await.expect("provision");
        let result = container.start().await;
        assert!(matches!(
            result,
            Err(ContainerError::InvalidState { .. })
        ));
        let _ = tokio::fs::remove_dir_all(container.base_dir()).await;
    }

    #[tokio::test]
    async fn test_deploy_missing_artifact_fails() {
        let mut container = HostContainer::provision().await.expect("provision");
        let result = container
            .deploy(Path::new("/nonexistent/artifact.json"), None)
            .await;
        assert!(matches!(result, Err(ContainerError::Deploy(_))));
        let _ = tokio::fs::remove_dir_all(container.base_dir()).await;
    }
}
