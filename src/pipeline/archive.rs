//! The archive collaborator: named byte buffers → one ZIP archive.
//!
//! Entries are written in the order given. The archiver does not resolve
//! duplicate names; the orchestrator runs
//! [`crate::pipeline::naming::disambiguate`] first. Compression is CPU-bound,
//! so [`ZipArchiver`] does it in `spawn_blocking`.

use crate::error::PackagingError;
use futures::future::{BoxFuture, FutureExt};
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// One file to place in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Packs entries into a single archive buffer.
pub trait Archiver: Send + Sync {
    fn pack<'a>(
        &'a self,
        entries: Vec<ArchiveEntry>,
    ) -> BoxFuture<'a, Result<Vec<u8>, PackagingError>>;
}

/// Deflate-compressed ZIP archives.
#[derive(Debug, Clone, Default)]
pub struct ZipArchiver;

impl ZipArchiver {
    pub fn new() -> Self {
        Self
    }
}

impl Archiver for ZipArchiver {
    fn pack<'a>(
        &'a self,
        entries: Vec<ArchiveEntry>,
    ) -> BoxFuture<'a, Result<Vec<u8>, PackagingError>> {
        async move {
            tokio::task::spawn_blocking(move || pack_zip(&entries))
                .await
                .map_err(|e| PackagingError::Task(e.to_string()))?
        }
        .boxed()
    }
}

/// Blocking ZIP writer.
pub fn pack_zip(entries: &[ArchiveEntry]) -> Result<Vec<u8>, PackagingError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in entries {
        writer
            .start_file(entry.name.as_str(), options)
            .map_err(|e| PackagingError::Archive(format!("{}: {e}", entry.name)))?;
        writer
            .write_all(&entry.bytes)
            .map_err(|e| PackagingError::Archive(format!("{}: {e}", entry.name)))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| PackagingError::Archive(e.to_string()))?;
    let bytes = cursor.into_inner();
    debug!("Packed {} entries → {} bytes", entries.len(), bytes.len());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_back(bytes: Vec<u8>) -> Vec<(String, Vec<u8>)> {
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
        (0..zip.len())
            .map(|i| {
                let mut f = zip.by_index(i).unwrap();
                let mut buf = Vec::new();
                f.read_to_end(&mut buf).unwrap();
                (f.name().to_string(), buf)
            })
            .collect()
    }

    #[tokio::test]
    async fn entries_keep_order_and_content() {
        let entries = vec![
            ArchiveEntry::new("b.jpg", vec![2; 100]),
            ArchiveEntry::new("a.jpg", vec![1; 50]),
        ];
        let bytes = ZipArchiver::new().pack(entries).await.expect("pack");
        assert_eq!(&bytes[..2], b"PK");

        let files = read_back(bytes);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].0, "b.jpg");
        assert_eq!(files[0].1, vec![2; 100]);
        assert_eq!(files[1].0, "a.jpg");
    }

    #[test]
    fn empty_archive_is_valid() {
        let bytes = pack_zip(&[]).expect("pack");
        assert!(read_back(bytes).is_empty());
    }
}
