//! Configuration types for HEIC/HEIF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One struct holds every knob so the
//! same config can be shared by the orchestrator, the decoder adapter and the
//! CLI without threading individual parameters around.

use crate::error::AvalonError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for a conversion session.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use avalon::{ConversionConfig, OutputFormat};
///
/// let config = ConversionConfig::builder()
///     .format(OutputFormat::Jpeg)
///     .quality(0.85)
///     .build()
///     .unwrap();
/// assert_eq!(config.format.extension(), "jpg");
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Target image format. Default: [`OutputFormat::Jpeg`].
    pub format: OutputFormat,

    /// Encoder quality in `0.0..=1.0`. Default: 0.9.
    ///
    /// Only meaningful for JPEG; PNG is lossless and ignores it.
    pub quality: f32,

    /// External HEIF decoder program. Default: `heif-dec` (libheif).
    pub decoder_program: String,

    /// Per-file decoder timeout in seconds. Default: 120.
    pub decode_timeout_secs: u64,

    /// File name of the "download all" archive. Default: `converted_images.zip`.
    pub archive_name: String,

    /// Accepted source extensions, lowercase, without the dot.
    /// Default: `heic`, `heif`.
    pub accepted_extensions: Vec<String>,

    /// Receives per-item and per-batch notifications.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            quality: 0.9,
            decoder_program: "heif-dec".to_string(),
            decode_timeout_secs: 120,
            archive_name: "converted_images.zip".to_string(),
            accepted_extensions: vec!["heic".to_string(), "heif".to_string()],
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("format", &self.format)
            .field("quality", &self.quality)
            .field("decoder_program", &self.decoder_program)
            .field("decode_timeout_secs", &self.decode_timeout_secs)
            .field("archive_name", &self.archive_name)
            .field("accepted_extensions", &self.accepted_extensions)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether `ext` (without the dot, any case) is an accepted source extension.
    pub fn accepts_extension(&self, ext: &str) -> bool {
        self.accepted_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn quality(mut self, q: f32) -> Self {
        self.config.quality = if q.is_nan() { q } else { q.clamp(0.0, 1.0) };
        self
    }

    pub fn decoder_program(mut self, program: impl Into<String>) -> Self {
        self.config.decoder_program = program.into();
        self
    }

    pub fn decode_timeout_secs(mut self, secs: u64) -> Self {
        self.config.decode_timeout_secs = secs;
        self
    }

    pub fn archive_name(mut self, name: impl Into<String>) -> Self {
        self.config.archive_name = name.into();
        self
    }

    pub fn accepted_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.accepted_extensions = exts
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, AvalonError> {
        let c = &self.config;
        if c.quality.is_nan() {
            return Err(AvalonError::InvalidConfig(
                "Quality must be a number between 0 and 1".into(),
            ));
        }
        if c.decoder_program.trim().is_empty() {
            return Err(AvalonError::InvalidConfig(
                "Decoder program must not be empty".into(),
            ));
        }
        if c.decode_timeout_secs == 0 {
            return Err(AvalonError::InvalidConfig(
                "Decode timeout must be ≥ 1 second".into(),
            ));
        }
        if c.archive_name.trim().is_empty() || !c.archive_name.to_ascii_lowercase().ends_with(".zip")
        {
            return Err(AvalonError::InvalidConfig(format!(
                "Archive name must end in .zip, got '{}'",
                c.archive_name
            )));
        }
        if c.accepted_extensions.iter().all(|e| e.is_empty()) {
            return Err(AvalonError::InvalidConfig(
                "At least one accepted extension is required".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Output image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Baseline JPEG (default). Alpha is dropped.
    #[default]
    Jpeg,
    /// Lossless PNG.
    Png,
}

impl OutputFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }
}
