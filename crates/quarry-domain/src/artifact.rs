//! Artifact module - deterministic `(item, producer) -> path` mapping

use crate::ItemId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Quarantine subdirectory for raw artifacts
pub const RAW_QUARANTINE_DIR: &str = "invalid_pdfs";

/// Quarantine subdirectory for engine results
pub const RESULT_QUARANTINE_DIR: &str = "invalid_jsons";

/// A configured extraction engine as far as artifacts are concerned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineProfile {
    /// Engine name used in the state store
    pub name: String,

    /// File-name suffix for result artifacts (`""`, `"_fast"`)
    #[serde(default)]
    pub suffix: String,

    /// Relative output quality; higher wins when several engines succeeded
    #[serde(default)]
    pub fidelity: u8,
}

impl EngineProfile {
    /// Create a profile
    pub fn new(name: impl Into<String>, suffix: impl Into<String>, fidelity: u8) -> Self {
        Self {
            name: name.into(),
            suffix: suffix.into(),
            fidelity,
        }
    }
}

/// Producer of an artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Raw acquired document
    Raw,
    /// Structured result written by the named engine
    Extracted(String),
}

/// Where artifacts live on disk
///
/// # Examples
///
/// ```
/// use quarry_domain::{ArtifactLayout, ArtifactKind, ItemId};
///
/// let layout = ArtifactLayout::new("papers", "output");
/// let id = ItemId::parse("10.1/abc").unwrap();
/// assert!(layout.raw_path(&id).ends_with("10.1_abc.pdf"));
/// let fast = layout.path(&id, &ArtifactKind::Extracted("fast".into())).unwrap();
/// assert!(fast.ends_with("10.1_abc_fast.json"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    raw_dir: PathBuf,
    output_dir: PathBuf,
    engines: Vec<EngineProfile>,
}

impl ArtifactLayout {
    /// Layout with the default engines (`grobid` and `fast`)
    pub fn new(raw_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self::with_engines(raw_dir, output_dir, Self::default_engines())
    }

    /// Layout with an explicit engine list
    pub fn with_engines(
        raw_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        engines: Vec<EngineProfile>,
    ) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            output_dir: output_dir.into(),
            engines,
        }
    }

    /// Default engines: high-fidelity `grobid`, fast `fast`
    pub fn default_engines() -> Vec<EngineProfile> {
        vec![
            EngineProfile::new("grobid", "", 2),
            EngineProfile::new("fast", "_fast", 1),
        ]
    }

    /// Directory holding raw artifacts
    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    /// Directory holding engine results
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Configured engines
    pub fn engines(&self) -> &[EngineProfile] {
        &self.engines
    }

    /// Look up an engine by name
    pub fn engine(&self, name: &str) -> Option<&EngineProfile> {
        self.engines.iter().find(|e| e.name == name)
    }

    /// Path of the raw artifact
    pub fn raw_path(&self, id: &ItemId) -> PathBuf {
        self.raw_dir.join(format!("{}.pdf", id.file_stem()))
    }

    /// Path of an engine's result, `None` for an unknown engine
    pub fn result_path(&self, id: &ItemId, engine: &str) -> Option<PathBuf> {
        self.engine(engine).map(|profile| {
            self.output_dir
                .join(format!("{}{}.json", id.file_stem(), profile.suffix))
        })
    }

    /// Path for any artifact kind
    pub fn path(&self, id: &ItemId, kind: &ArtifactKind) -> Option<PathBuf> {
        match kind {
            ArtifactKind::Raw => Some(self.raw_path(id)),
            ArtifactKind::Extracted(engine) => self.result_path(id, engine),
        }
    }

    /// Quarantine directory for an artifact kind
    pub fn quarantine_dir(&self, kind: &ArtifactKind) -> PathBuf {
        match kind {
            ArtifactKind::Raw => self.raw_dir.join(RAW_QUARANTINE_DIR),
            ArtifactKind::Extracted(_) => self.output_dir.join(RESULT_QUARANTINE_DIR),
        }
    }

    /// Split a raw artifact file name into its stem
    pub fn parse_raw_name<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        file_name.strip_suffix(".pdf").filter(|stem| !stem.is_empty())
    }

    /// Split a result file name into `(stem, engine)`
    ///
    /// The longest matching suffix wins, so `x_fast.json` maps to the
    /// `_fast` engine rather than the engine with an empty suffix.
    pub fn parse_result_name<'a>(&'a self, file_name: &'a str) -> Option<(&'a str, &'a EngineProfile)> {
        let base = file_name.strip_suffix(".json")?;
        let mut engines: Vec<&EngineProfile> = self.engines.iter().collect();
        engines.sort_by_key(|e| std::cmp::Reverse(e.suffix.len()));

        engines.into_iter().find_map(|profile| {
            base.strip_suffix(profile.suffix.as_str())
                .filter(|stem| !stem.is_empty())
                .map(|stem| (stem, profile))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = ArtifactLayout::new("/data/papers", "/data/output");
        let id = ItemId::parse("10.1038/nature12373").unwrap();

        assert_eq!(
            layout.raw_path(&id),
            PathBuf::from("/data/papers/10.1038_nature12373.pdf")
        );
        assert_eq!(
            layout.result_path(&id, "grobid").unwrap(),
            PathBuf::from("/data/output/10.1038_nature12373.json")
        );
        assert_eq!(
            layout.result_path(&id, "fast").unwrap(),
            PathBuf::from("/data/output/10.1038_nature12373_fast.json")
        );
        assert!(layout.result_path(&id, "nope").is_none());
    }

    #[test]
    fn test_parse_result_name_prefers_longest_suffix() {
        let layout = ArtifactLayout::new("p", "o");

        let (stem, engine) = layout.parse_result_name("10.1_abc_fast.json").unwrap();
        assert_eq!(stem, "10.1_abc");
        assert_eq!(engine.name, "fast");

        let (stem, engine) = layout.parse_result_name("10.1_abc.json").unwrap();
        assert_eq!(stem, "10.1_abc");
        assert_eq!(engine.name, "grobid");

        assert!(layout.parse_result_name("notes.txt").is_none());
    }

    #[test]
    fn test_quarantine_dirs() {
        let layout = ArtifactLayout::new("p", "o");
        assert_eq!(layout.quarantine_dir(&ArtifactKind::Raw), PathBuf::from("p/invalid_pdfs"));
        assert_eq!(
            layout.quarantine_dir(&ArtifactKind::Extracted("fast".into())),
            PathBuf::from("o/invalid_jsons")
        );
    }
}
