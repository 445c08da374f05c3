//! Error types for the avalon library.
//!
//! Two families of errors reflect two distinct failure modes:
//!
//! * [`AvalonError`] (**batch-level**): the operation the caller invoked
//!   cannot complete (archive packaging failed, the output directory is not
//!   writable, an illegal state transition was attempted). Returned as
//!   `Err(AvalonError)` from the orchestrator and config builder.
//!
//! * [`ItemFailure`] (**per-item**): one source file could not be read or
//!   decoded. Stored on the failed [`crate::store::IntakeItem`] and reported
//!   through [`crate::progress::ConversionProgressCallback::on_item_error`];
//!   it never aborts the rest of a batch.

use crate::store::{ItemId, ItemStatus};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// All batch-level errors returned by the avalon library.
#[derive(Debug, Error)]
pub enum AvalonError {
    /// A source could not be accepted at all.
    #[error(transparent)]
    Intake(#[from] IntakeError),

    /// The archive collaborator failed while bundling completed artifacts.
    #[error(transparent)]
    Packaging(#[from] PackagingError),

    /// Orchestration code attempted a transition the state machine forbids.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Could not write a converted file or archive to its destination.
    #[error("Failed to save '{path}': {source}")]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A "convert all" pass is already running on this orchestrator.
    #[error("A batch conversion is already in progress")]
    BatchInProgress,

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A file could not be read at the host boundary.
#[derive(Debug, Clone, Error, Serialize)]
pub enum IntakeError {
    /// No file at the given path.
    #[error("File not found: '{path}'")]
    NotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The file's extension is not one of the accepted source extensions.
    #[error("Unsupported file '{name}': expected one of {expected}")]
    Unsupported { name: String, expected: String },

    /// Any other I/O failure while reading the source.
    #[error("Could not read '{name}': {detail}")]
    Io { name: String, detail: String },
}

impl IntakeError {
    /// Classify an `io::Error` raised while opening or reading `path`.
    pub fn from_io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => IntakeError::NotFound { path },
            std::io::ErrorKind::PermissionDenied => IntakeError::PermissionDenied { path },
            _ => IntakeError::Io {
                name: path.display().to_string(),
                detail: err.to_string(),
            },
        }
    }
}

/// The decode collaborator rejected or failed on a payload.
#[derive(Debug, Clone, Error, Serialize)]
pub enum DecodeError {
    /// Payload does not carry a HEIF `ftyp` brand.
    #[error("not a HEIC/HEIF image")]
    NotHeif,

    /// Payload ends before a complete header could be read.
    #[error("file is truncated ({len} bytes)")]
    Truncated { len: usize },

    /// The external decoder program could not be started.
    #[error("decoder '{program}' is not available: {detail}")]
    DecoderUnavailable { program: String, detail: String },

    /// The external decoder ran and reported failure.
    #[error("decoder exited with {status}: {stderr}")]
    DecoderFailed { status: String, stderr: String },

    /// The external decoder did not finish in time.
    #[error("decoder timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The decoder produced output that could not be used.
    #[error("decoder produced malformed output: {0}")]
    MalformedOutput(String),

    /// Re-encoding the decoded pixels failed.
    #[error("encoding failed: {0}")]
    Encode(String),

    /// Temp-file plumbing around the decoder failed.
    #[error("I/O error: {0}")]
    Io(String),
}

/// The archive collaborator failed while bundling artifacts.
#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("Failed to build archive: {0}")]
    Archive(String),

    #[error("Archive task failed: {0}")]
    Task(String),
}

/// An illegal Job Store mutation. Indicates a bug in orchestration code,
/// never a user-facing condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("No item with id {id}")]
    UnknownItem { id: ItemId },

    #[error("Illegal transition for item {id}: {from:?} -> {to:?}")]
    Illegal {
        id: ItemId,
        from: ItemStatus,
        to: ItemStatus,
    },

    /// A result was supplied with a non-Completed status, or omitted for Completed.
    #[error("Result does not match status {status:?} for item {id}")]
    ResultMismatch { id: ItemId, status: ItemStatus },
}

/// Why a single item failed.
#[derive(Debug, Clone, Error, Serialize)]
pub enum ItemErrorKind {
    #[error(transparent)]
    Read(#[from] IntakeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The conversion future was dropped before the item settled.
    #[error("conversion was cancelled")]
    Cancelled,
}

/// A non-fatal failure for one source file.
#[derive(Debug, Clone, Error, Serialize)]
#[error("Failed to convert {source_name}: {reason}")]
pub struct ItemFailure {
    pub source_name: String,
    pub reason: ItemErrorKind,
}

impl ItemFailure {
    pub fn new(source_name: impl Into<String>, reason: impl Into<ItemErrorKind>) -> Self {
        Self {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Whether the decode collaborator (rather than the source read) failed.
    pub fn is_decode(&self) -> bool {
        matches!(self.reason, ItemErrorKind::Decode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_failure_names_the_file() {
        let f = ItemFailure::new("b.heic", DecodeError::NotHeif);
        let msg = f.to_string();
        assert!(msg.contains("b.heic"), "got: {msg}");
        assert!(msg.contains("not a HEIC/HEIF image"), "got: {msg}");
        assert!(f.is_decode());
    }

    #[test]
    fn read_failure_is_not_decode() {
        let f = ItemFailure::new(
            "a.heic",
            IntakeError::NotFound {
                path: PathBuf::from("/tmp/a.heic"),
            },
        );
        assert!(!f.is_decode());
        assert!(f.to_string().contains("File not found"));
    }

    #[test]
    fn from_io_classifies_kinds() {
        let nf = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(
            IntakeError::from_io("x.heic", &nf),
            IntakeError::NotFound { .. }
        ));

        let pd = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
        assert!(matches!(
            IntakeError::from_io("x.heic", &pd),
            IntakeError::PermissionDenied { .. }
        ));

        let other = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        match IntakeError::from_io("x.heic", &other) {
            IntakeError::Io { detail, .. } => assert!(detail.contains("disk on fire")),
            e => panic!("unexpected: {e:?}"),
        }
    }

    #[test]
    fn cancelled_is_neither_read_nor_decode() {
        let f = ItemFailure::new("a.heic", ItemErrorKind::Cancelled);
        assert!(!f.is_decode());
        assert_eq!(f.to_string(), "Failed to convert a.heic: conversion was cancelled");
    }

    #[test]
    fn decoder_failed_display() {
        let e = DecodeError::DecoderFailed {
            status: "exit status: 1".into(),
            stderr: "Could not read HEIF/AVIF file".into(),
        };
        assert!(e.to_string().contains("exit status: 1"));
        assert!(e.to_string().contains("Could not read"));
    }

    #[test]
    fn save_failed_display() {
        let e = AvalonError::SaveFailed {
            path: PathBuf::from("/out/converted_images.zip"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(e.to_string().contains("converted_images.zip"));
    }
}
