//! Extraction engines
//!
//! An engine turns a raw artifact into an [`ExtractedDocument`]. Engine
//! internals are out of scope; only the success/failure contract matters.

use crate::config::{EngineSpec, INPUT_PLACEHOLDER};
use crate::error::ExtractorError;
use crate::parser::parse_document;
use async_trait::async_trait;
use quarry_domain::ExtractedDocument;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// A pluggable content-extraction engine
#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    /// Engine name, as recorded in the state store
    fn name(&self) -> &str;

    /// Extract a structured document from a raw artifact
    async fn extract(&self, artifact: &Path) -> Result<ExtractedDocument, ExtractorError>;
}

/// Engine backed by an external program
///
/// The program receives the artifact path through the `{input}`
/// placeholder and prints a JSON document on stdout.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    name: String,
    program: String,
    args: Vec<String>,
}

impl CommandEngine {
    /// Build from a configured engine
    pub fn from_spec(spec: &EngineSpec) -> Result<Self, ExtractorError> {
        let (program, args) = spec
            .command
            .split_first()
            .ok_or_else(|| ExtractorError::Config(format!("engine {} has no command", spec.name)))?;
        Ok(Self {
            name: spec.name.clone(),
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn render_args(&self, artifact: &Path) -> Vec<String> {
        let input = artifact.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace(INPUT_PLACEHOLDER, &input))
            .collect()
    }
}

#[async_trait]
impl ExtractionEngine for CommandEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, artifact: &Path) -> Result<ExtractedDocument, ExtractorError> {
        let args = self.render_args(artifact);
        debug!(engine = %self.name, program = %self.program, "running extraction command");

        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ExtractorError::Engine {
                engine: self.name.clone(),
                message: format!("failed to start {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractorError::Engine {
                engine: self.name.clone(),
                message: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_document(&stdout)
    }
}

/// Build one engine per configured entry
pub fn build_engines(specs: &[EngineSpec]) -> Result<Vec<Arc<dyn ExtractionEngine>>, ExtractorError> {
    specs
        .iter()
        .map(|spec| CommandEngine::from_spec(spec).map(|e| Arc::new(e) as Arc<dyn ExtractionEngine>))
        .collect()
}

#[derive(Debug, Clone)]
enum MockBehavior {
    Succeed(ExtractedDocument),
    Fail(String),
    Panic,
}

/// Mock engine for deterministic testing
///
/// Returns a pre-configured outcome without touching the artifact.
///
/// # Examples
///
/// ```
/// use quarry_extractor::{ExtractionEngine, MockEngine};
/// use quarry_domain::{ExtractedDocument, Section};
///
/// # tokio_test::block_on(async {
/// let doc = ExtractedDocument {
///     sections: vec![Section::new("Intro", "text")],
///     ..Default::default()
/// };
/// let engine = MockEngine::new("grobid", doc.clone());
/// let result = engine.extract("paper.pdf".as_ref()).await.unwrap();
/// assert_eq!(result, doc);
/// assert_eq!(engine.call_count(), 1);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct MockEngine {
    name: String,
    behavior: MockBehavior,
    delay: Option<Duration>,
    call_count: Arc<AtomicUsize>,
}

impl MockEngine {
    /// Engine that always returns `doc`
    pub fn new(name: impl Into<String>, doc: ExtractedDocument) -> Self {
        Self::with_behavior(name, MockBehavior::Succeed(doc))
    }

    /// Engine that always fails with `message`
    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_behavior(name, MockBehavior::Fail(message.into()))
    }

    /// Engine that panics when called
    pub fn panicking(name: impl Into<String>) -> Self {
        Self::with_behavior(name, MockBehavior::Panic)
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get the number of times extract was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn with_behavior(name: impl Into<String>, behavior: MockBehavior) -> Self {
        Self {
            name: name.into(),
            behavior,
            delay: None,
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ExtractionEngine for MockEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self, _artifact: &Path) -> Result<ExtractedDocument, ExtractorError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.behavior {
            MockBehavior::Succeed(doc) => Ok(doc.clone()),
            MockBehavior::Fail(message) => Err(ExtractorError::Engine {
                engine: self.name.clone(),
                message: message.clone(),
            }),
            MockBehavior::Panic => panic!("mock engine {} panicked", self.name),
        }
    }
}
