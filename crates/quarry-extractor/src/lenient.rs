//! Lenient secondary check for artifacts that fail strict validation
//!
//! A PDF with a truncated trailer or a missing `%%EOF` marker is often still
//! readable. Before such a file is quarantined, a configured engine gets one
//! chance to pull text out of it; enough text reclassifies it as valid.
//!
//! Every acceptance is logged on the `quarry::lenient` target at `warn` so
//! the rate of lenient acceptance can be audited separately.

use crate::engine::ExtractionEngine;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Log target for lenient acceptances
pub const LENIENT_TARGET: &str = "quarry::lenient";

/// Best-effort extraction used as a second opinion
#[derive(Clone)]
pub struct LenientProbe {
    engine: Arc<dyn ExtractionEngine>,
    min_chars: usize,
    timeout: Duration,
}

impl LenientProbe {
    /// Create a probe
    pub fn new(engine: Arc<dyn ExtractionEngine>, min_chars: usize, timeout: Duration) -> Self {
        Self {
            engine,
            min_chars,
            timeout,
        }
    }

    /// Minimum characters for acceptance
    pub fn min_chars(&self) -> usize {
        self.min_chars
    }

    /// Whether the artifact yields enough text to keep
    ///
    /// Engine failures and timeouts count as rejection.
    pub async fn accepts(&self, artifact: &Path, reason: &str) -> bool {
        let result = tokio::time::timeout(self.timeout, self.engine.extract(artifact)).await;
        let chars = match result {
            Ok(Ok(doc)) => doc.char_count(),
            Ok(Err(e)) => {
                debug!(path = %artifact.display(), error = %e, "lenient check failed");
                return false;
            }
            Err(_) => {
                debug!(path = %artifact.display(), "lenient check timed out");
                return false;
            }
        };

        if chars >= self.min_chars {
            warn!(
                target: LENIENT_TARGET,
                path = %artifact.display(),
                engine = self.engine.name(),
                chars,
                reason,
                "accepted artifact that failed strict validation"
            );
            true
        } else {
            debug!(path = %artifact.display(), chars, min = self.min_chars, "lenient check rejected");
            false
        }
    }
}

impl std::fmt::Debug for LenientProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LenientProbe")
            .field("engine", &self.engine.name())
            .field("min_chars", &self.min_chars)
            .finish()
    }
}
