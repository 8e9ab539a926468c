//! Process-wide environment precondition.
//!
//! The leak verifier's forcing strategy depends on memory pressure
//! eventually triggering a pass over the metadata region. An unbounded
//! region removes that pressure entirely and would silently turn every
//! leak into a false negative, so the harness refuses to run at all.
//!
//! The check runs once per process, lazily, before the first run session
//! touches any resource; the verdict is cached.

use crate::error::{HarnessError, Result};
use leaktest_container::{MetadataRegion, METADATA_LIMIT_ENV};
use std::sync::OnceLock;

static VERDICT: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Check the process environment, caching the verdict.
pub fn check() -> Result<()> {
    VERDICT
        .get_or_init(|| evaluate(MetadataRegion::global()))
        .clone()
        .map_err(HarnessError::MisconfiguredEnvironment)
}

fn evaluate(region: &MetadataRegion) -> std::result::Result<(), String> {
    match region.limit() {
        Some(limit) => {
            tracing::debug!(limit_bytes = limit, "Metadata region is bounded");
            Ok(())
        }
        None => Err(format!(
            "metadata region limit is undefined. Set {METADATA_LIMIT_ENV} or call \
             MetadataRegion::init_with_limit before the first run"
        )),
    }
}
