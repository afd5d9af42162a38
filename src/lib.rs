//! # edgequake-topdf
//!
//! Convert Word documents, images and spreadsheets to PDF.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input file + declared name
//!  │
//!  ├─ 1. Detect   extension → WordProcessing / Image / Tabular / Unsupported
//!  ├─ 2. Sniff    optional magic-byte check (verify_content)
//!  ├─ 3. Render   docx text · image page · spreadsheet grid or LibreOffice
//!  └─ 4. Verify   output exists and is a PDF; partial output removed on error
//! ```
//!
//! | Input | Result |
//! |-------|--------|
//! | `.docx` | body paragraphs as wrapped 10 pt text, A4 |
//! | `.png` `.jpg` `.jpeg` | one page, image scaled to 190 mm wide |
//! | `.xls` `.xlsx` | first worksheet as a bordered grid (or LibreOffice's own layout) |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_topdf::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::default();
//!     let output = convert("report.docx", "pdfs/report.pdf", "report.docx", &config).await?;
//!     eprintln!("{} page(s), {} bytes", output.stats.pages.unwrap_or(0), output.stats.output_bytes);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `topdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on      | HTTP upload service ([`server::router`], [`server::serve`]) |
//!
//! Disable both when using only the library:
//! ```toml
//! edgequake-topdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod detect;
pub mod error;
pub mod output;
pub mod pdf;
pub mod progress;
pub mod render;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, TabularBackend};
pub use convert::{
    batch_output_paths, convert, convert_batch, convert_file, convert_staged, convert_upload,
    download_name, output_path_for, secure_filename, stage_upload, stage_upload_in, StagedInput, UploadedFile,
};
pub use detect::{detect_format, sniff_content, FormatTag, SUPPORTED_EXTENSIONS};
pub use error::{FailureKind, ToPdfError};
pub use output::{ConversionOutput, ConversionStats, JobResult};
pub use pdf::PageLayout;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use render::{RenderSummary, Renderer};
