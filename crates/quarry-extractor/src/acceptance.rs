//! Content thresholds and fidelity preference

use crate::config::ExtractorConfig;
use quarry_domain::{EngineProfile, ExtractedDocument};

/// Shortest title that counts toward acceptance with an abstract
pub const MIN_TITLE_CHARS: usize = 5;

/// Minimum-content rule for engine results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acceptance {
    /// Minimum total characters
    pub min_chars: usize,
    /// Minimum non-empty sections
    pub min_sections: usize,
}

impl Acceptance {
    /// Thresholds from configuration
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self {
            min_chars: config.min_chars,
            min_sections: config.min_sections,
        }
    }

    /// Check a document; `Err` carries the reason for rejection
    pub fn check(&self, doc: &ExtractedDocument) -> Result<(), String> {
        let sections = doc.non_empty_sections();
        let chars = doc.char_count();
        if sections >= self.min_sections && chars >= self.min_chars {
            return Ok(());
        }

        let titled = doc
            .title
            .as_deref()
            .is_some_and(|t| t.trim().chars().count() >= MIN_TITLE_CHARS);
        let has_abstract = doc
            .abstract_text
            .as_deref()
            .is_some_and(|a| !a.trim().is_empty());
        if titled && has_abstract {
            return Ok(());
        }

        Err(format!(
            "{} non-empty sections (need {}), {} chars (need {})",
            sections, self.min_sections, chars, self.min_chars
        ))
    }

    /// Whether a document clears the threshold
    pub fn accepts(&self, doc: &ExtractedDocument) -> bool {
        self.check(doc).is_ok()
    }
}

impl Default for Acceptance {
    fn default() -> Self {
        Self::from_config(&ExtractorConfig::default())
    }
}

/// Pick the highest-fidelity accepted result
///
/// Ties keep the earlier candidate, so configured engine order breaks them.
pub fn prefer_higher_fidelity<T>(candidates: Vec<(EngineProfile, T)>) -> Option<(EngineProfile, T)> {
    let mut best: Option<(EngineProfile, T)> = None;
    for candidate in candidates {
        let better = match &best {
            Some((current, _)) => candidate.0.fidelity > current.fidelity,
            None => true,
        };
        if better {
            best = Some(candidate);
        }
    }
    best
}
