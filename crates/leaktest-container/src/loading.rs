//! Loading contexts and weak context observations.
//!
//! A [`LoadingContext`] stands in for the isolated class-loading scope a
//! managed host gives each deployment. The container shares it via `Arc`;
//! "reclaimed" means the last strong reference is gone, which `Arc`/`Weak`
//! semantics make monotonic and safe to query from any task.

use crate::error::Result;
use crate::region::MetadataRegion;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use uuid::Uuid;

/// An isolated loading context owned by a single deployment.
///
/// Type definitions loaded on behalf of the deployment are held here, so
/// they live exactly as long as the context itself.
pub struct LoadingContext {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    types: Mutex<Vec<TypeDefinition>>,
}

/// A loaded throwaway type definition, held for the memory it occupies.
#[allow(dead_code)]
struct TypeDefinition {
    name: String,
    bytes: Vec<u8>,
}

impl LoadingContext {
    /// Create a new, empty loading context.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        let id = Uuid::new_v4();
        tracing::debug!(%id, name = %name, "Creating loading context");
        Arc::new(Self {
            id,
            name,
            created_at: Utc::now(),
            types: Mutex::new(Vec::new()),
        })
    }

    /// Get the unique ID of this context.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the context name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the creation timestamp.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Number of type definitions currently loaded in this context.
    pub fn loaded_types(&self) -> usize {
        self.types.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Define a throwaway type of `size` bytes in this context.
    ///
    /// The definition is accounted against `region`, which may trigger a
    /// reclamation pass when usage crosses the region limit.
    pub fn define_type(&self, region: &MetadataRegion, name: &str, size: usize) -> Result<()> {
        region.load_type(size)?;
        let definition = TypeDefinition {
            name: name.to_string(),
            bytes: vec![0u8; size],
        };
        self.types
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(definition);
        tracing::trace!(context = %self.name, type_name = name, size, "Type defined");
        Ok(())
    }
}

impl std::fmt::Debug for LoadingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadingContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("loaded_types", &self.loaded_types())
            .finish()
    }
}

/// A weak, non-owning observation of a loading context.
///
/// The only valid query is [`is_reclaimed`](Self::is_reclaimed), which is
/// monotonic from `false` to `true` and never reverses.
#[derive(Debug, Clone)]
pub struct ContextObservation {
    inner: Weak<LoadingContext>,
}

impl ContextObservation {
    /// Capture a weak observation of `context`.
    pub fn of(context: &Arc<LoadingContext>) -> Self {
        Self {
            inner: Arc::downgrade(context),
        }
    }

    /// Has the observed context been reclaimed?
    pub fn is_reclaimed(&self) -> bool {
        self.inner.strong_count() == 0
    }
}

// Process-wide pin registry. A deliberately leaking artifact stores a strong
// clone of its own context here, which keeps the context alive across
// reclamation passes.
static GLOBAL_PINS: OnceLock<Mutex<Vec<Arc<LoadingContext>>>> = OnceLock::new();

fn pins() -> &'static Mutex<Vec<Arc<LoadingContext>>> {
    GLOBAL_PINS.get_or_init(|| Mutex::new(Vec::new()))
}

/// Store a strong reference to `context` in the process-wide pin registry.
pub fn pin_context(context: Arc<LoadingContext>) {
    tracing::warn!(context = %context.name(), "Pinning loading context in process-wide registry");
    pins().lock().unwrap_or_else(|e| e.into_inner()).push(context);
}

/// Number of contexts currently pinned process-wide.
pub fn pinned_contexts() -> usize {
    pins().lock().unwrap_or_else(|e| e.into_inner()).len()
}

/// Eagerly initialize the pin registry.
///
/// Called at container scope before any deployment code runs, so the
/// registry allocation is never attributed to a deployment context.
pub(crate) fn preinit_pin_registry() {
    let _ = pins();
}
