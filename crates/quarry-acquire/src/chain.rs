//! Ordered multi-source acquisition

use crate::config::AcquireConfig;
use crate::source::{build_sources, Source};
use crate::storage::{persist_atomic, quarantine_off_thread};
use crate::validate::{check_pdf_bytes, check_pdf_file, sniff};
use crate::{AcquireError, HttpFetcher, RateLimiter};
use quarry_domain::traits::StateStore;
use quarry_domain::{ArtifactKind, ArtifactLayout, ItemId};
use quarry_extractor::LenientProbe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a successful acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquired {
    /// Raw artifact path
    pub path: PathBuf,

    /// Winning source; `None` for a cache hit
    pub source: Option<String>,

    /// Whether a valid artifact was already on disk
    pub cache_hit: bool,

    /// Whether the artifact was kept only by the lenient check
    pub lenient: bool,
}

/// Tries configured sources in fixed priority order until one yields a
/// valid raw artifact
///
/// Each source attempt is recorded in the state store before it starts and
/// its outcome after it ends. Sources after the winner are never touched.
pub struct SourceChain<S: StateStore> {
    sources: Vec<Arc<dyn Source>>,
    http: Arc<HttpFetcher>,
    store: Arc<S>,
    layout: ArtifactLayout,
    lenient: Option<LenientProbe>,
}

impl<S: StateStore> SourceChain<S> {
    /// Create a chain
    pub fn new(
        sources: Vec<Arc<dyn Source>>,
        http: Arc<HttpFetcher>,
        store: Arc<S>,
        layout: ArtifactLayout,
    ) -> Self {
        Self {
            sources,
            http,
            store,
            layout,
            lenient: None,
        }
    }

    /// Build the limiter, fetcher and sources described by `config`
    pub fn from_config(
        config: &AcquireConfig,
        store: Arc<S>,
        layout: ArtifactLayout,
    ) -> Result<Self, AcquireError> {
        config.validate().map_err(AcquireError::Config)?;
        let limiter = Arc::new(RateLimiter::new(config.rate, config.burst)?);
        let http = HttpFetcher::new(
            limiter,
            config.request_timeout(),
            &config.user_agent,
            config.transient_retries,
            config.backoff(),
        )?
        .with_max_body(config.max_body_bytes);
        Ok(Self::new(build_sources(&config.sources), Arc::new(http), store, layout))
    }

    /// Enable the lenient secondary check
    pub fn with_lenient(mut self, probe: Option<LenientProbe>) -> Self {
        self.lenient = probe;
        self
    }

    /// Source names in priority order
    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Shared HTTP fetcher
    pub fn http(&self) -> &Arc<HttpFetcher> {
        &self.http
    }

    /// Acquire the raw artifact for an item
    ///
    /// # Errors
    ///
    /// - [`AcquireError::Storage`] when the state store or artifact
    ///   directory fails; this aborts the item immediately
    /// - [`AcquireError::Exhausted`] when every source failed
    pub async fn acquire(&self, id: &ItemId) -> Result<Acquired, AcquireError> {
        let path = self.layout.raw_path(id);

        if let Some(acquired) = self.reuse_existing(id, &path).await? {
            return Ok(acquired);
        }

        let mut last = String::from("no sources configured");
        for source in &self.sources {
            let name = source.name();
            self.store
                .mark_source_attempted(id, name)
                .map_err(storage)?;

            match self.try_source(source.as_ref(), id, &path).await {
                Ok(lenient) => {
                    self.store
                        .mark_source_outcome(id, name, true)
                        .map_err(storage)?;
                    info!(item = %id, source = name, lenient, "acquired");
                    return Ok(Acquired {
                        path,
                        source: Some(name.to_string()),
                        cache_hit: false,
                        lenient,
                    });
                }
                Err(e) if e.is_storage() => return Err(e),
                Err(e) => {
                    debug!(item = %id, source = name, error = %e, "source failed");
                    self.store
                        .mark_source_outcome(id, name, false)
                        .map_err(storage)?;
                    last = format!("{}: {}", name, e);
                }
            }
        }

        warn!(item = %id, last = %last, "all sources exhausted");
        Err(AcquireError::Exhausted {
            attempted: self.sources.len(),
            last,
        })
    }

    async fn reuse_existing(&self, id: &ItemId, path: &Path) -> Result<Option<Acquired>, AcquireError> {
        if !path.exists() {
            return Ok(None);
        }

        let owned = path.to_path_buf();
        let verdict = tokio::task::spawn_blocking(move || check_pdf_file(&owned))
            .await
            .map_err(|e| io_storage(path, std::io::Error::other(e)))?
            .map_err(|e| io_storage(path, e))?;
        let lenient = match verdict {
            Ok(()) => false,
            Err(reason) => {
                if !self.lenient_accepts(path, &reason).await {
                    warn!(item = %id, reason = %reason, "existing raw artifact invalid");
                    self.quarantine_raw(path).await?;
                    return Ok(None);
                }
                true
            }
        };

        debug!(item = %id, lenient, "raw artifact cache hit");
        Ok(Some(Acquired {
            path: path.to_path_buf(),
            source: None,
            cache_hit: true,
            lenient,
        }))
    }

    /// Try every candidate of one source; `Ok(lenient)` on success
    async fn try_source(&self, source: &dyn Source, id: &ItemId, path: &Path) -> Result<bool, AcquireError> {
        let candidates = source.candidates(id, &self.http).await?;
        if candidates.is_empty() {
            return Err(AcquireError::Validation("no candidate URL".to_string()));
        }

        let mut last = None;
        for url in candidates {
            let fetched = match self.http.fetch(&url).await {
                Ok(f) => f,
                Err(e) => {
                    debug!(item = %id, url = %url, error = %e, "candidate fetch failed");
                    last = Some(e);
                    continue;
                }
            };

            if !sniff(fetched.content_type.as_deref(), &fetched.body) {
                debug!(
                    item = %id,
                    url = %fetched.final_url,
                    content_type = fetched.content_type.as_deref().unwrap_or("-"),
                    "candidate is not a PDF"
                );
                last = Some(AcquireError::Validation(format!("{} is not a PDF", url)));
                continue;
            }

            match check_pdf_bytes(&fetched.body) {
                Ok(()) => {
                    persist_atomic(path, &fetched.body).await?;
                    return Ok(false);
                }
                Err(reason) => {
                    // the lenient engine needs the bytes on disk
                    persist_atomic(path, &fetched.body).await?;
                    if self.lenient_accepts(path, &reason).await {
                        return Ok(true);
                    }
                    self.quarantine_raw(path).await?;
                    last = Some(AcquireError::Validation(format!("{}: {}", url, reason)));
                }
            }
        }

        Err(last.unwrap_or_else(|| AcquireError::Validation("no usable candidate".to_string())))
    }

    async fn lenient_accepts(&self, path: &Path, reason: &str) -> bool {
        match &self.lenient {
            Some(probe) => probe.accepts(path, reason).await,
            None => false,
        }
    }

    async fn quarantine_raw(&self, path: &Path) -> Result<(), AcquireError> {
        let dir = self.layout.quarantine_dir(&ArtifactKind::Raw);
        quarantine_off_thread(path, &dir)
            .await
            .map_err(|e| io_storage(path, e))?;
        Ok(())
    }
}

fn storage<E: std::fmt::Display>(e: E) -> AcquireError {
    AcquireError::Storage(e.to_string())
}

fn io_storage(path: &Path, e: std::io::Error) -> AcquireError {
    AcquireError::Storage(format!("{}: {}", path.display(), e))
}
