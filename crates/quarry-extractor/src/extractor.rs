//! Core Extractor implementation

use crate::acceptance::{prefer_higher_fidelity, Acceptance};
use crate::config::ExtractorConfig;
use crate::engine::{build_engines, ExtractionEngine};
use crate::error::ExtractorError;
use crate::lenient::LenientProbe;
use crate::parser::{parse_document, read_document};
use quarry_domain::{ArtifactLayout, EngineProfile, ExtractedDocument, ItemId};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Outcome of one successful engine run
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRun {
    /// Engine that produced the result
    pub engine: String,

    /// Accepted document
    pub document: ExtractedDocument,

    /// Result artifact path
    pub path: PathBuf,

    /// Whether an existing valid result was reused
    pub cache_hit: bool,
}

/// What is on disk for one engine's result artifact
#[derive(Debug, Clone, PartialEq)]
pub enum ResultCheck {
    /// No file
    Missing,
    /// File parses and clears the content threshold
    Valid(ExtractedDocument),
    /// File exists but is unusable; the reason is human-readable
    Invalid(String),
}

impl ResultCheck {
    /// Whether a valid result exists
    pub fn is_valid(&self) -> bool {
        matches!(self, ResultCheck::Valid(_))
    }
}

/// Runs extraction engines against raw artifacts and persists results
pub struct Extractor {
    engines: Vec<Arc<dyn ExtractionEngine>>,
    layout: ArtifactLayout,
    config: ExtractorConfig,
    acceptance: Acceptance,
}

impl Extractor {
    /// Create an Extractor from explicit engines
    ///
    /// Every engine must have a profile in `layout`.
    pub fn new(
        engines: Vec<Arc<dyn ExtractionEngine>>,
        layout: ArtifactLayout,
        config: ExtractorConfig,
    ) -> Result<Self, ExtractorError> {
        for engine in &engines {
            if layout.engine(engine.name()).is_none() {
                return Err(ExtractorError::Config(format!(
                    "engine {} has no artifact profile",
                    engine.name()
                )));
            }
        }
        Ok(Self {
            acceptance: Acceptance::from_config(&config),
            engines,
            layout,
            config,
        })
    }

    /// Create an Extractor with a command engine per configured entry
    pub fn from_config(
        config: ExtractorConfig,
        raw_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, ExtractorError> {
        config.validate().map_err(ExtractorError::Config)?;
        let layout = ArtifactLayout::with_engines(raw_dir, output_dir, config.profiles());
        let engines = build_engines(&config.engines)?;
        Self::new(engines, layout, config)
    }

    /// Artifact layout in use
    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Configuration in use
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Content threshold in use
    pub fn acceptance(&self) -> Acceptance {
        self.acceptance
    }

    /// Look up an engine by name
    pub fn engine(&self, name: &str) -> Option<Arc<dyn ExtractionEngine>> {
        self.engines.iter().find(|e| e.name() == name).cloned()
    }

    /// Lenient checker backed by the configured lenient engine
    ///
    /// `None` when lenient acceptance is disabled.
    pub fn lenient_probe(&self) -> Option<LenientProbe> {
        if self.config.lenient_engine.is_empty() {
            return None;
        }
        self.engine(&self.config.lenient_engine).map(|engine| {
            LenientProbe::new(
                engine,
                self.config.lenient_min_chars,
                self.config.extraction_timeout(),
            )
        })
    }

    /// Engines to try for an item: `requested`, then `fallbacks`
    ///
    /// Unknown names and duplicates are skipped.
    pub fn engine_chain(&self, requested: &str, fallbacks: &[String]) -> Vec<String> {
        let mut chain: Vec<String> = Vec::new();
        for name in std::iter::once(requested).chain(fallbacks.iter().map(String::as_str)) {
            if self.engine(name).is_some() && !chain.iter().any(|n| n == name) {
                chain.push(name.to_string());
            }
        }
        chain
    }

    /// Inspect an engine's result artifact
    pub fn check_result(&self, id: &ItemId, engine: &str) -> Result<ResultCheck, ExtractorError> {
        let path = self.result_path(id, engine)?;
        self.check_result_file(&path)
    }

    /// Inspect a result file at an explicit path
    pub fn check_result_file(&self, path: &Path) -> Result<ResultCheck, ExtractorError> {
        if !path.exists() {
            return Ok(ResultCheck::Missing);
        }
        self.judge(read_document(path))
    }

    /// [`Extractor::check_result_file`] without blocking the runtime
    async fn check_result_file_async(&self, path: &Path) -> Result<ResultCheck, ExtractorError> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ResultCheck::Missing),
            Err(e) => return Err(e.into()),
        };
        self.judge(parse_document(&raw))
    }

    fn judge(&self, parsed: Result<ExtractedDocument, ExtractorError>) -> Result<ResultCheck, ExtractorError> {
        match parsed {
            Ok(doc) => match self.acceptance.check(&doc) {
                Ok(()) => Ok(ResultCheck::Valid(doc)),
                Err(reason) => Ok(ResultCheck::Invalid(reason)),
            },
            Err(ExtractorError::Io(e)) => Err(ExtractorError::Io(e)),
            Err(e) => Ok(ResultCheck::Invalid(e.to_string())),
        }
    }

    /// Highest-fidelity valid result on disk for an item
    pub fn best_result(
        &self,
        id: &ItemId,
    ) -> Result<Option<(EngineProfile, ExtractedDocument)>, ExtractorError> {
        let mut candidates = Vec::new();
        for profile in self.layout.engines() {
            if let ResultCheck::Valid(doc) = self.check_result(id, &profile.name)? {
                candidates.push((profile.clone(), doc));
            }
        }
        Ok(prefer_higher_fidelity(candidates))
    }

    /// Run one engine for an item and persist its accepted result
    ///
    /// A valid existing result is reused without running the engine.
    pub async fn run(&self, id: &ItemId, engine_name: &str) -> Result<EngineRun, ExtractorError> {
        let engine = self
            .engine(engine_name)
            .ok_or_else(|| ExtractorError::Config(format!("unknown engine: {}", engine_name)))?;
        let path = self.result_path(id, engine_name)?;

        match self.check_result_file_async(&path).await? {
            ResultCheck::Valid(document) => {
                debug!(item = %id, engine = engine_name, "result cache hit");
                return Ok(EngineRun {
                    engine: engine_name.to_string(),
                    document,
                    path,
                    cache_hit: true,
                });
            }
            ResultCheck::Invalid(reason) => {
                warn!(item = %id, engine = engine_name, reason = %reason, "existing result invalid, re-extracting");
            }
            ResultCheck::Missing => {}
        }

        let raw = self.layout.raw_path(id);
        match has_pdf_magic(&raw).await {
            Ok(true) => {}
            Ok(false) => return Err(ExtractorError::NotPdf(raw.display().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ExtractorError::MissingArtifact(raw.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        }

        let document = timeout(self.config.extraction_timeout(), engine.extract(&raw))
            .await
            .map_err(|_| {
                ExtractorError::Timeout(engine_name.to_string(), self.config.extraction_timeout_secs)
            })??;

        self.acceptance
            .check(&document)
            .map_err(ExtractorError::BelowThreshold)?;

        let json = serde_json::to_vec_pretty(&document)?;
        write_atomic(&path, &json).await?;

        info!(
            item = %id,
            engine = engine_name,
            sections = document.non_empty_sections(),
            chars = document.char_count(),
            "extraction accepted"
        );

        Ok(EngineRun {
            engine: engine_name.to_string(),
            document,
            path,
            cache_hit: false,
        })
    }

    fn result_path(&self, id: &ItemId, engine: &str) -> Result<PathBuf, ExtractorError> {
        self.layout
            .result_path(id, engine)
            .ok_or_else(|| ExtractorError::Config(format!("unknown engine: {}", engine)))
    }
}

/// Whether the file starts with the `%PDF` magic number
async fn has_pdf_magic(path: &Path) -> io::Result<bool> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut head = [0u8; 4];
    let mut read = 0;
    while read < head.len() {
        let n = file.read(&mut head[read..]).await?;
        if n == 0 {
            break;
        }
        read += n;
    }
    Ok(&head[..read] == b"%PDF")
}

/// Write `bytes` to `path` via a `.part` sibling and a rename
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ExtractorError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    tokio::fs::write(&part, bytes).await?;
    if let Err(e) = tokio::fs::rename(&part, path).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(e.into());
    }
    Ok(())
}
