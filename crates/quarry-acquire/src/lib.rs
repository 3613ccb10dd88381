//! Quarry Acquisition Layer
//!
//! Fetches raw artifacts from multiple unreliable, rate-limited and
//! mutually-substitutable sources.
//!
//! # Architecture
//!
//! ```text
//! SourceChain ─┬─ Source (template / unpaywall / europepmc / semanticscholar) → URLs
//!              ├─ HttpFetcher → RateLimiter (one token per network attempt)
//!              ├─ validate (sniff, strict PDF check, lenient fallback)
//!              └─ storage (atomic persist, quarantine)
//! ```
//!
//! Sources are tried in a fixed, configured priority order. Within a
//! source, each candidate URL is tried before moving on. A valid artifact
//! already on disk is a cache hit and makes no network call.
//!
//! # Examples
//!
//! ```no_run
//! use quarry_acquire::{AcquireConfig, SourceChain};
//! use quarry_domain::{ArtifactLayout, ItemId};
//! use quarry_store::SqliteStateStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteStateStore::open("tracker.db")?);
//! let layout = ArtifactLayout::new("papers", "output");
//! let chain = SourceChain::from_config(&AcquireConfig::default(), store, layout)?;
//!
//! let acquired = chain.acquire(&ItemId::parse("10.1101/2020.01.01.000001")?).await?;
//! println!("{:?} via {:?}", acquired.path, acquired.source);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod chain;
mod config;
mod error;
mod http;
mod rate_limiter;
mod source;
mod storage;
pub mod validate;

pub use chain::{Acquired, SourceChain};
pub use config::{AcquireConfig, SourceSpec};
pub use error::AcquireError;
pub use http::{Fetched, HttpFetcher, DEFAULT_MAX_BODY_BYTES};
pub use rate_limiter::RateLimiter;
pub use source::{
    build_sources, EuropePmcSource, SemanticScholarSource, Source, TemplateSource, UnpaywallSource,
};
pub use storage::{persist_atomic, quarantine, quarantine_off_thread};
