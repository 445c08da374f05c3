//! # avalon
//!
//! Convert HEIC/HEIF photos to JPEG or PNG, one batch at a time.
//!
//! ## Why this crate?
//!
//! Phones save photos as HEIC, and much of the world still expects JPEG.
//! Decoding HEIF is libheif's job; what is left is bookkeeping that is easy
//! to get subtly wrong: which files are waiting, which failed and why, which
//! results are ready, and whether anything leaks when the user removes a file
//! halfway through a batch. This crate keeps that bookkeeping in an explicit
//! [`JobStore`] with a checked state machine, and drives it with a
//! [`BatchOrchestrator`] that converts strictly one file at a time.
//!
//! ## Pipeline Overview
//!
//! ```text
//! files
//!  │
//!  ├─ 1. Intake   resolve paths, filter by extension → Pending items
//!  ├─ 2. Decode   heif-dec in a temp dir, with timeout (one item at a time)
//!  ├─ 3. Encode   JPEG/PNG at the configured quality (spawn_blocking)
//!  ├─ 4. Store    Completed + artifact, or Failed + reason
//!  └─ 5. Output   save one file, or ZIP every completed artifact
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use avalon::{
//!     BatchOrchestrator, ConversionConfig, DirectorySaver, HeifCommandDecoder, JobStore,
//!     SourceFile, ZipArchiver,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::default();
//!     let store = JobStore::new().into_shared();
//!     avalon::store::lock(&store).add_items([SourceFile::from_path("IMG_0001.HEIC")]);
//!
//!     let orchestrator = BatchOrchestrator::new(
//!         store,
//!         Arc::new(HeifCommandDecoder::from_config(&config)),
//!         Arc::new(ZipArchiver::new()),
//!         Arc::new(DirectorySaver::new("out")),
//!         config,
//!     );
//!     let summary = orchestrator.convert_all_pending().await?;
//!     eprintln!("{} converted, {} failed", summary.completed, summary.failed);
//!     orchestrator.download_all_completed().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `avalon` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! avalon = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod handle;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, OutputFormat};
pub use error::{
    AvalonError, DecodeError, IntakeError, ItemErrorKind, ItemFailure, PackagingError,
    TransitionError,
};
pub use handle::{DownloadHandle, HandleRegistry};
pub use orchestrator::{BatchOrchestrator, BatchSummary, ItemOutcome};
pub use pipeline::archive::{ArchiveEntry, Archiver, ZipArchiver};
pub use pipeline::decode::{DecodeOptions, Decoder, HeifCommandDecoder};
pub use pipeline::intake::resolve_inputs;
pub use pipeline::naming::derive_name;
pub use pipeline::save::{DirectorySaver, Saver};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use store::{
    ConvertedArtifact, IntakeItem, ItemId, ItemStatus, JobStore, SharedStore, SourceFile,
    StoreCounts,
};
