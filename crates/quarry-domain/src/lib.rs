//! Quarry Domain Layer
//!
//! Core vocabulary for the acquisition pipeline: items, their tracked status,
//! the append-only event log, artifact locations and normalized extraction
//! results. Storage, network and extraction engines live in other crates and
//! plug in through the traits in [`traits`].
//!
//! ## Key Concepts
//!
//! - **Item**: the unit of work, keyed by a normalized identifier ([`ItemId`])
//! - **Snapshot**: the single current status row for an item ([`Snapshot`])
//! - **Event**: immutable audit record of a status change ([`Event`])
//! - **Artifact**: a file whose path is a pure function of item and producer
//!   ([`ArtifactLayout`])
//! - **Status**: tri-state `{Unknown, Success, Failure}` used for every
//!   per-source and per-engine flag ([`Status`])
//!
//! ## Architecture
//!
//! The artifact store is the system of record. The state store is a derived
//! index that the reconciler keeps convergent with it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod artifact;
pub mod document;
pub mod error;
pub mod event;
pub mod item;
pub mod snapshot;
pub mod status;
pub mod traits;

// Re-exports for convenience
pub use artifact::{ArtifactKind, ArtifactLayout, EngineProfile};
pub use document::{ExtractedDocument, Section};
pub use error::DomainError;
pub use event::{Event, EventKind};
pub use item::ItemId;
pub use snapshot::{EngineState, Snapshot, SnapshotUpdate, SourcePatch, SourceState};
pub use status::Status;
