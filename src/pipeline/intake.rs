//! Input resolution: turn user-supplied paths into [`SourceFile`]s.
//!
//! ## Why resolve per file?
//!
//! A drop of ten files where one is unreadable should still yield nine
//! items. Each path therefore resolves to its own `Result`, and a rejected
//! file never blocks the others. Directories contribute their accepted files
//! (non-recursive, sorted by name) so `avalon ~/Photos/` behaves predictably.
//!
//! Only the extension is checked here. Whether the bytes really are HEIF is
//! the decoder's call; content is not read until conversion.

use crate::config::ConversionConfig;
use crate::error::IntakeError;
use crate::store::SourceFile;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Media type for a source extension.
pub fn media_type_for(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        "avif" => Some("image/avif"),
        _ => None,
    }
}

/// Resolve every input path, expanding directories.
///
/// Output order follows input order; a directory's entries appear in place,
/// sorted by file name. Non-matching files inside a directory are skipped
/// silently, while a non-matching file named explicitly is reported as
/// [`IntakeError::Unsupported`].
pub async fn resolve_inputs<P: AsRef<Path>>(
    inputs: &[P],
    config: &ConversionConfig,
) -> Vec<Result<SourceFile, IntakeError>> {
    let mut out = Vec::with_capacity(inputs.len());
    for input in inputs {
        let path = input.as_ref();
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => match list_dir(path, config).await {
                Ok(files) => out.extend(files),
                Err(e) => out.push(Err(e)),
            },
            Ok(meta) => out.push(accept_file(path, meta.len(), config)),
            Err(e) => out.push(Err(IntakeError::from_io(path, &e))),
        }
    }
    debug!(
        "Resolved {} inputs → {} entries",
        inputs.len(),
        out.len()
    );
    out
}

/// Resolve a single file path.
pub async fn resolve_file(
    path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<SourceFile, IntakeError> {
    let path = path.as_ref();
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| IntakeError::from_io(path, &e))?;
    accept_file(path, meta.len(), config)
}

fn accept_file(
    path: &Path,
    size: u64,
    config: &ConversionConfig,
) -> Result<SourceFile, IntakeError> {
    let ext = extension_of(path);
    if !ext.as_deref().is_some_and(|e| config.accepts_extension(e)) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        warn!("Rejected {}: unsupported extension", path.display());
        return Err(IntakeError::Unsupported {
            name,
            expected: expected_list(config),
        });
    }

    let mut file = SourceFile::from_path(path).with_size(size);
    if let Some(mime) = ext.as_deref().and_then(media_type_for) {
        file = file.with_media_type(mime);
    }
    debug!("Accepted {} ({} bytes)", path.display(), size);
    Ok(file)
}

async fn list_dir(
    dir: &Path,
    config: &ConversionConfig,
) -> Result<Vec<Result<SourceFile, IntakeError>>, IntakeError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| IntakeError::from_io(dir, &e))?;

    let mut paths: Vec<(PathBuf, u64)> = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => return Err(IntakeError::from_io(dir, &e)),
        };
        let path = entry.path();
        let accepted = extension_of(&path)
            .as_deref()
            .is_some_and(|e| config.accepts_extension(e));
        if !accepted {
            continue;
        }
        match entry.metadata().await {
            Ok(meta) if meta.is_file() => paths.push((path, meta.len())),
            Ok(_) => {}
            Err(e) => return Err(IntakeError::from_io(&path, &e)),
        }
    }
    paths.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));

    debug!("{}: {} accepted files", dir.display(), paths.len());
    Ok(paths
        .into_iter()
        .map(|(p, size)| accept_file(&p, size, config))
        .collect())
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_string())
}

fn expected_list(config: &ConversionConfig) -> String {
    config
        .accepted_extensions
        .iter()
        .map(|e| format!(".{e}"))
        .collect::<Vec<_>>()
        .join(", ")
}
