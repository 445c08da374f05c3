//! Pipeline stages and collaborators for HEIC/HEIF conversion.
//!
//! Each submodule owns one step. The decode, archive and save steps sit
//! behind traits so the orchestrator can be driven by in-memory fakes in
//! tests and by real programs and directories in the CLI.
//!
//! ## Data Flow
//!
//! ```text
//! intake ──▶ decode ──▶ encode ──▶ naming ──▶ archive ──▶ save
//! (paths)   (heif-dec) (JPEG/PNG) (a.jpg)    (zip)       (dir)
//! ```
//!
//! 1. [`intake`]: resolve user paths to source files, filtering by extension
//! 2. [`decode`]: sniff the HEIF brand and run the external decoder with a
//!    timeout; the only stage that spawns a process
//! 3. [`encode`]: re-encode decoded pixels; runs in `spawn_blocking`
//! 4. [`naming`]: derived output names and archive collision resolution
//! 5. [`archive`]: bundle completed artifacts into one ZIP
//! 6. [`save`]: atomic write into the output directory

pub mod archive;
pub mod decode;
pub mod encode;
pub mod intake;
pub mod naming;
pub mod save;
