//! Bounded metadata region with a pass-based reclaimer.
//!
//! Stands in for the managed runtime's metadata memory (where type
//! definitions live) and its collector. Retired loading contexts are not
//! released the moment the container drops them; they sit in a retired set
//! until a reclamation pass runs. A pass is triggered by accounted usage
//! crossing the region limit, which is what makes the pressure generator a
//! meaningful forcing function: an idle process may never run one.
//!
//! The process-wide region is configured once, either explicitly through
//! [`MetadataRegion::init_with_limit`] or through the
//! [`METADATA_LIMIT_ENV`] environment variable. An absent or unparseable
//! limit means *unbounded*, which the harness's precondition check rejects.

use crate::error::{ContainerError, Result};
use crate::loading::LoadingContext;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Environment variable holding the region limit in bytes.
pub const METADATA_LIMIT_ENV: &str = "LEAKTEST_METADATA_LIMIT";

static GLOBAL: OnceLock<MetadataRegion> = OnceLock::new();

/// Process-wide metadata region with bounded-usage reclamation.
pub struct MetadataRegion {
    limit: Option<usize>,
    used: AtomicUsize,
    passes: AtomicU64,
    retired: Mutex<Vec<Arc<LoadingContext>>>,
}

impl MetadataRegion {
    /// Create a region with the given limit. `None` means unbounded.
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
            passes: AtomicU64::new(0),
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Get the process-wide region, initializing it from the environment on
    /// first use.
    pub fn global() -> &'static MetadataRegion {
        GLOBAL.get_or_init(Self::from_env)
    }

    /// Install a bounded process-wide region before first use.
    ///
    /// Returns `false` if the region was already initialized; the first
    /// configuration wins, matching once-per-process semantics.
    pub fn init_with_limit(bytes: usize) -> bool {
        GLOBAL.set(Self::new(Some(bytes))).is_ok()
    }

    fn from_env() -> Self {
        let limit = std::env::var(METADATA_LIMIT_ENV)
            .ok()
            .and_then(|raw| raw.trim().parse::<usize>().ok());
        match limit {
            Some(bytes) => tracing::info!(limit_bytes = bytes, "Metadata region limit configured"),
            None => tracing::warn!(
                "No metadata region limit configured ({METADATA_LIMIT_ENV} unset); region is unbounded"
            ),
        }
        Self::new(limit)
    }

    /// The configured limit in bytes, or `None` when unbounded.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Bytes currently accounted since the last pass.
    pub fn used(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }

    /// Number of reclamation passes that have run.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    /// Number of contexts waiting in the retired set.
    pub fn retired_len(&self) -> usize {
        self.retired.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Account `bytes` of type-definition metadata.
    ///
    /// Runs a reclamation pass when usage crosses the region limit.
    pub fn load_type(&self, bytes: usize) -> Result<()> {
        let previous = self.used.fetch_add(bytes, Ordering::SeqCst);
        let total = previous.checked_add(bytes).ok_or_else(|| {
            ContainerError::Context(format!(
                "metadata accounting overflow: {previous} + {bytes} bytes"
            ))
        })?;
        if let Some(limit) = self.limit {
            if total >= limit {
                tracing::debug!(total, limit, "Metadata usage crossed limit");
                self.run_pass();
            }
        }
        Ok(())
    }

    /// Move a context the container no longer references into the retired
    /// set, to be released by the next reclamation pass.
    pub fn retire(&self, context: Arc<LoadingContext>) {
        tracing::debug!(context = %context.name(), "Retiring loading context");
        self.retired
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(context);
    }

    /// Hint that a reclamation pass would be welcome.
    ///
    /// A hint alone does not force a pass: it runs one only when usage is
    /// already past half the limit. An unbounded region ignores hints
    /// entirely, which is why the harness refuses to run against one.
    pub fn request_pass(&self) {
        match self.limit {
            None => tracing::trace!("Reclamation hint ignored: region is unbounded"),
            Some(limit) => {
                let used = self.used();
                if used * 2 >= limit {
                    self.run_pass();
                } else {
                    tracing::debug!(used, limit, "Reclamation hint ignored: usage below threshold");
                }
            }
        }
    }

    /// Run a reclamation pass: release every retired context and reset the
    /// usage accounting. Contexts pinned elsewhere survive.
    pub fn run_pass(&self) {
        let released = {
            let mut retired = self.retired.lock().unwrap_or_else(|e| e.into_inner());
            let count = retired.len();
            retired.clear();
            count
        };
        self.used.store(0, Ordering::SeqCst);
        let pass = self.passes.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(pass, released, "Reclamation pass completed");
    }
}

impl std::fmt::Debug for MetadataRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataRegion")
            .field("limit", &self.limit)
            .field("used", &self.used())
            .field("passes", &self.passes())
            .field("retired", &self.retired_len())
            .finish()
    }
}
