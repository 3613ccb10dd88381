//! Quarry Extractor
//!
//! Runs pluggable extraction engines over raw artifacts and persists
//! normalized results.
//!
//! # Overview
//!
//! An engine turns a raw PDF into `{title?, abstract?, sections}`. The
//! engines themselves are external programs; this crate owns the contract
//! around them:
//!
//! ```text
//! raw PDF → Engine (timeout) → parse → acceptance threshold → atomic JSON write
//! ```
//!
//! # Key Features
//!
//! - **Engine Trait**: [`ExtractionEngine`], with [`CommandEngine`] for
//!   external programs and [`MockEngine`] for tests and dry runs
//! - **Layout Tolerance**: results in the normalized layout and in two
//!   legacy layouts are all readable
//! - **Acceptance Threshold**: minimum sections and characters, or a title
//!   with an abstract
//! - **Fidelity Preference**: when several engines succeeded, the highest
//!   configured fidelity wins
//! - **Lenient Check**: [`LenientProbe`] gives malformed PDFs a second
//!   chance, logged on the `quarry::lenient` target
//!
//! # Example Usage
//!
//! ```no_run
//! use quarry_extractor::{Extractor, ExtractorConfig};
//! use quarry_domain::ItemId;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let extractor = Extractor::from_config(ExtractorConfig::default(), "papers", "output")?;
//! let id = ItemId::parse("10.1234/abc")?;
//!
//! let run = extractor.run(&id, "grobid").await?;
//! println!("{} sections, cache hit: {}", run.document.sections.len(), run.cache_hit);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod acceptance;
mod config;
mod engine;
mod error;
mod extractor;
mod lenient;
mod parser;


pub use acceptance::{prefer_higher_fidelity, Acceptance, MIN_TITLE_CHARS};
pub use config::{EngineSpec, ExtractorConfig, INPUT_PLACEHOLDER};
pub use engine::{build_engines, CommandEngine, ExtractionEngine, MockEngine};
pub use error::ExtractorError;
pub use extractor::{write_atomic, EngineRun, Extractor, ResultCheck};
pub use lenient::{LenientProbe, LENIENT_TARGET};
pub use parser::{parse_document, read_document};
