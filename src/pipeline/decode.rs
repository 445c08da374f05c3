//! The decode collaborator: HEIC/HEIF bytes in, JPEG/PNG bytes out.
//!
//! The orchestrator only sees the [`Decoder`] trait. The default
//! implementation, [`HeifCommandDecoder`], hands the payload to libheif's
//! `heif-dec` tool (any program with the same `<input> <output.png>`
//! calling convention works) and re-encodes the PNG it produces with
//! [`crate::pipeline::encode`].
//!
//! ## Flow
//!
//! ```text
//! bytes ─▶ sniff ftyp ─▶ temp file ─▶ heif-dec ─▶ output.png ─▶ image ─▶ JPEG/PNG
//! ```
//!
//! The external process runs under a timeout with `kill_on_drop`, so a hung
//! decoder cannot stall a batch. Pixel decoding and re-encoding are CPU-bound
//! and run in `spawn_blocking`.

use crate::config::{ConversionConfig, OutputFormat};
use crate::error::DecodeError;
use crate::pipeline::encode::encode_image;
use futures::future::{BoxFuture, FutureExt};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Brands that identify a HEIF-family payload in the `ftyp` box.
const HEIF_BRANDS: [&[u8; 4]; 10] = [
    b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"mif1", b"msf1", b"avif", b"avis",
];

/// Target format and quality for one decode call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeOptions {
    pub format: OutputFormat,
    /// 0.0–1.0.
    pub quality: f32,
}

impl DecodeOptions {
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            format: config.format,
            quality: config.quality,
        }
    }

    fn quality_percent(&self) -> u8 {
        ((self.quality.clamp(0.0, 1.0) * 100.0).round() as u8).clamp(1, 100)
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpeg,
            quality: 0.9,
        }
    }
}

/// Converts one source payload into the target format.
///
/// Implementations must be `Send + Sync`; the orchestrator holds them as
/// `Arc<dyn Decoder>`.
pub trait Decoder: Send + Sync {
    fn decode<'a>(
        &'a self,
        bytes: Vec<u8>,
        options: DecodeOptions,
    ) -> BoxFuture<'a, Result<Vec<u8>, DecodeError>>;
}

/// Check that `bytes` starts with an ISO-BMFF `ftyp` box naming a HEIF brand.
pub fn sniff_heif(bytes: &[u8]) -> Result<(), DecodeError> {
    if bytes.len() < 12 {
        return Err(DecodeError::Truncated { len: bytes.len() });
    }
    if &bytes[4..8] != b"ftyp" {
        return Err(DecodeError::NotHeif);
    }

    let box_size = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    // A size of 0 means the box runs to the end of the file.
    let box_end = match box_size {
        0 => bytes.len(),
        n => n.clamp(12, bytes.len()),
    };

    // major_brand at 8..12, minor_version at 12..16, compatible brands after.
    let major = std::iter::once(&bytes[8..12]);
    let compatible = bytes
        .get(16..box_end)
        .unwrap_or(&[])
        .chunks_exact(4);
    if major
        .chain(compatible)
        .any(|brand| HEIF_BRANDS.iter().any(|b| &b[..] == brand))
    {
        Ok(())
    } else {
        Err(DecodeError::NotHeif)
    }
}

fn header_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take(16)
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ── External decoder ─────────────────────────────────────────────────────

/// Decoder backed by an external libheif command-line tool.
#[derive(Debug, Clone)]
pub struct HeifCommandDecoder {
    program: String,
    timeout: Duration,
}

impl HeifCommandDecoder {
    pub fn new(program: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    pub fn from_config(config: &ConversionConfig) -> Self {
        Self::new(config.decoder_program.clone(), config.decode_timeout_secs)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Whether the decoder program can be started at all.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .is_ok()
    }

    async fn run(&self, bytes: Vec<u8>, options: DecodeOptions) -> Result<Vec<u8>, DecodeError> {
        debug!("Source header: {}", header_hex(&bytes));
        sniff_heif(&bytes)?;

        let dir = tempfile::TempDir::new().map_err(|e| DecodeError::Io(e.to_string()))?;
        let input = dir.path().join("input.heic");
        let output = dir.path().join("output.png");
        tokio::fs::write(&input, &bytes)
            .await
            .map_err(|e| DecodeError::Io(e.to_string()))?;
        let source_len = bytes.len();
        drop(bytes);

        let mut cmd = Command::new(&self.program);
        cmd.arg(&input)
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!("Running {:?}", cmd.as_std());

        let out = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                return Err(DecodeError::Timeout {
                    secs: self.timeout.as_secs(),
                })
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DecodeError::DecoderUnavailable {
                    program: self.program.clone(),
                    detail: e.to_string(),
                })
            }
            Ok(Err(e)) => return Err(DecodeError::Io(e.to_string())),
            Ok(Ok(out)) => out,
        };

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let last_lines: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(DecodeError::DecoderFailed {
                status: out.status.to_string(),
                stderr: last_lines.into_iter().rev().collect::<Vec<_>>().join("\n"),
            });
        }

        let produced = find_output(dir.path(), &output).await?;
        let png = tokio::fs::read(&produced)
            .await
            .map_err(|e| DecodeError::MalformedOutput(e.to_string()))?;

        let quality = options.quality_percent();
        let encoded = tokio::task::spawn_blocking(move || {
            let img = image::load_from_memory_with_format(&png, image::ImageFormat::Png)
                .map_err(|e| DecodeError::MalformedOutput(e.to_string()))?;
            encode_image(&img, options.format, quality)
        })
        .await
        .map_err(|e| DecodeError::Io(format!("encode task panicked: {e}")))??;

        info!(
            "Decoded {} bytes → {} bytes {:?}",
            source_len,
            encoded.len(),
            options.format
        );
        Ok(encoded)
    }
}

impl Decoder for HeifCommandDecoder {
    fn decode<'a>(
        &'a self,
        bytes: Vec<u8>,
        options: DecodeOptions,
    ) -> BoxFuture<'a, Result<Vec<u8>, DecodeError>> {
        self.run(bytes, options).boxed()
    }
}

/// Locate the PNG the decoder wrote.
///
/// Files holding several top-level images make libheif tools write
/// `output-1.png`, `output-2.png`, … instead of the requested name; the first
/// of those is the primary image.
async fn find_output(dir: &Path, expected: &Path) -> Result<PathBuf, DecodeError> {
    if tokio::fs::try_exists(expected).await.unwrap_or(false) {
        return Ok(expected.to_path_buf());
    }

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| DecodeError::Io(e.to_string()))?;
    let mut pngs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| DecodeError::Io(e.to_string()))?
    {
        let path = entry.path();
        let is_png = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("png"));
        if is_png {
            pngs.push(path);
        }
    }
    pngs.sort();
    pngs.into_iter()
        .next()
        .ok_or_else(|| DecodeError::MalformedOutput("decoder wrote no image".into()))
}
