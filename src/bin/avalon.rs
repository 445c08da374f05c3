//! CLI binary for avalon.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, feeds the resolved files into a job store and saves
//! the results.

use anyhow::{bail, Context, Result};
use avalon::{
    resolve_inputs, store, BatchOrchestrator, BatchSummary, ConversionConfig,
    ConversionProgressCallback, DirectorySaver, HeifCommandDecoder, IntakeError, ItemFailure,
    JobStore, OutputFormat, ProgressCallback, ZipArchiver,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar at the bottom, one log line per file.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start of the item currently converting. Items run one at a time.
    started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total} files…"))
        ));
    }

    fn on_item_start(&self, _index: usize, _total: usize, source_name: &str) {
        *self.started.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        self.bar.set_message(source_name.to_string());
    }

    fn on_item_complete(
        &self,
        index: usize,
        total: usize,
        _source_name: &str,
        derived_name: &str,
        bytes: usize,
    ) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<32}  {}  {}",
            green("✓"),
            index,
            total,
            derived_name,
            dim(&format!("{:>8} KiB", bytes / 1024)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, index: usize, total: usize, failure: &ItemFailure) {
        let secs = self.elapsed_secs();
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = failure.to_string();
        let msg = if msg.chars().count() > 80 {
            format!("{}\u{2026}", msg.chars().take(79).collect::<String>())
        } else {
            msg
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, completed: usize) {
        let failed = total.saturating_sub(completed);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} files converted successfully",
                green("✔"),
                bold(&completed.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files converted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&completed.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert two photos into the current directory
  avalon IMG_0001.HEIC IMG_0002.HEIC

  # Convert a whole folder (non-recursive) into ./jpeg
  avalon ~/Photos/export -o jpeg

  # One ZIP instead of individual files
  avalon ~/Photos/export --zip --archive-name holiday.zip

  # Lossless PNG output
  avalon --format png scan.heif

  # Machine-readable summary
  avalon --json --no-progress *.heic > summary.json

DECODER:
  HEIC/HEIF decoding is done by libheif's command-line decoder, `heif-dec`
  (called `heif-convert` in older releases). Install it with:
    Debian/Ubuntu:  apt install libheif-examples
    macOS:          brew install libheif
  Point --decoder at another binary if yours is named differently.

ENVIRONMENT VARIABLES:
  AVALON_OUTPUT           Output directory
  AVALON_FORMAT           jpeg or png
  AVALON_QUALITY          JPEG quality, 0.0–1.0
  AVALON_DECODER          Decoder program
  AVALON_DECODE_TIMEOUT   Per-file decode timeout in seconds
  RUST_LOG                Override log filter (e.g. avalon=debug)
"#;

/// Convert HEIC/HEIF photos to JPEG or PNG.
#[derive(Parser, Debug)]
#[command(
    name = "avalon",
    version,
    about = "Convert HEIC/HEIF photos to JPEG or PNG",
    long_about = "Convert HEIC/HEIF photos (files or whole directories) to JPEG or PNG. \
Files are converted one at a time; a file that fails is reported and the rest carry on.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// HEIC/HEIF files or directories containing them.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory to write converted files (or the archive) into.
    #[arg(short, long, env = "AVALON_OUTPUT", default_value = ".")]
    output: PathBuf,

    /// Output format.
    #[arg(long, env = "AVALON_FORMAT", value_enum, default_value = "jpeg")]
    format: FormatArg,

    /// JPEG quality (0.0–1.0). Ignored for PNG.
    #[arg(long, env = "AVALON_QUALITY", default_value_t = 0.9)]
    quality: f32,

    /// Save one ZIP archive instead of individual files.
    #[arg(long, env = "AVALON_ZIP")]
    zip: bool,

    /// Archive file name used with --zip.
    #[arg(long, env = "AVALON_ARCHIVE_NAME", default_value = "converted_images.zip")]
    archive_name: String,

    /// External HEIF decoder program.
    #[arg(long, env = "AVALON_DECODER", default_value = "heif-dec")]
    decoder: String,

    /// Per-file decode timeout in seconds.
    #[arg(long, env = "AVALON_DECODE_TIMEOUT", default_value_t = 120)]
    decode_timeout: u64,

    /// Print a JSON summary to stdout.
    #[arg(long, env = "AVALON_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "AVALON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "AVALON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "AVALON_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Jpeg,
    Png,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Jpeg => OutputFormat::Jpeg,
            FormatArg::Png => OutputFormat::Png,
        }
    }
}

/// What `--json` prints.
#[derive(Serialize)]
struct Report<'a> {
    summary: &'a BatchSummary,
    rejected: &'a [IntakeError],
    /// Media type of every saved file, or of the archive's entries.
    mime_type: &'static str,
    saved: &'a [PathBuf],
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the per-file feedback; keep library INFO
    // logs out of its way unless asked for.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Intake ───────────────────────────────────────────────────────────
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for resolved in resolve_inputs(&cli.inputs, &config).await {
        match resolved {
            Ok(file) => accepted.push(file),
            Err(e) => {
                if !cli.quiet {
                    eprintln!("  {} {}", red("✗"), red(&e.to_string()));
                }
                rejected.push(e);
            }
        }
    }
    if accepted.is_empty() {
        bail!("No HEIC/HEIF files to convert");
    }

    let decoder = HeifCommandDecoder::from_config(&config);
    if !decoder.is_available().await {
        bail!(
            "Decoder '{}' not found. Install libheif's command-line tools \
             (e.g. `apt install libheif-examples` or `brew install libheif`) \
             or pass --decoder",
            decoder.program()
        );
    }

    let shared = JobStore::new().into_shared();
    store::lock(&shared).add_items(accepted);

    let orchestrator = BatchOrchestrator::new(
        shared.clone(),
        Arc::new(decoder),
        Arc::new(ZipArchiver::new()),
        Arc::new(DirectorySaver::new(&cli.output)),
        config,
    );

    // ── Convert ──────────────────────────────────────────────────────────
    let summary = orchestrator
        .convert_all_pending()
        .await
        .context("Conversion failed")?;

    if !cli.quiet && !show_progress && !cli.json {
        eprintln!(
            "Converted {}/{} files",
            summary.completed, summary.selected
        );
        for failure in &summary.failures {
            eprintln!("  {failure}");
        }
    }

    // ── Save ─────────────────────────────────────────────────────────────
    let saved: Vec<PathBuf> = if cli.zip {
        orchestrator
            .download_all_completed()
            .await
            .context("Failed to save archive")?
            .into_iter()
            .collect()
    } else {
        orchestrator
            .download_each_completed()
            .await
            .context("Failed to save converted files")?
    };

    if cli.json {
        let report = Report {
            summary: &summary,
            rejected: &rejected,
            mime_type: orchestrator.config().format.mime_type(),
            saved: &saved,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        for path in &saved {
            eprintln!("   →  {}", bold(&path.display().to_string()));
        }
    }

    if summary.completed == 0 {
        bail!("No files were converted");
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .format(cli.format.into())
        .quality(cli.quality)
        .decoder_program(cli.decoder.clone())
        .decode_timeout_secs(cli.decode_timeout)
        .archive_name(cli.archive_name.clone());

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
