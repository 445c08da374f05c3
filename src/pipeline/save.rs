//! The host save mechanism: hand one named byte blob to the user.
//!
//! A browser would trigger a download; here [`DirectorySaver`] writes into an
//! output directory. Writes are atomic (temp file + rename) so an interrupted
//! run never leaves a half-written JPEG or archive under the final name.

use crate::error::AvalonError;
use futures::future::{BoxFuture, FutureExt};
use std::path::{Path, PathBuf};
use tracing::info;

/// Saves one named blob and returns where it went.
pub trait Saver: Send + Sync {
    fn save<'a>(
        &'a self,
        bytes: &'a [u8],
        suggested_name: &'a str,
    ) -> BoxFuture<'a, Result<PathBuf, AvalonError>>;
}

/// Writes files into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectorySaver {
    dir: PathBuf,
}

impl DirectorySaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write(&self, bytes: &[u8], suggested_name: &str) -> Result<PathBuf, AvalonError> {
        let path = self.dir.join(sanitize_file_name(suggested_name));
        let fail = |source: std::io::Error| AvalonError::SaveFailed {
            path: path.clone(),
            source,
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(fail)?;

        let tmp = tempfile::Builder::new()
            .prefix(".avalon-")
            .suffix(".part")
            .tempfile_in(&self.dir)
            .map_err(fail)?;
        tokio::fs::write(tmp.path(), bytes).await.map_err(fail)?;
        tmp.persist(&path).map_err(|e| fail(e.error))?;

        info!("Saved {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }
}

impl Saver for DirectorySaver {
    fn save<'a>(
        &'a self,
        bytes: &'a [u8],
        suggested_name: &'a str,
    ) -> BoxFuture<'a, Result<PathBuf, AvalonError>> {
        self.write(bytes, suggested_name).boxed()
    }
}

/// Keep only the final path component and replace characters that cannot
/// appear in a file name.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "unnamed".to_string(),
        s => s.to_string(),
    }
}
