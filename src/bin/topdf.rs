//! CLI binary for edgequake-topdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_topdf::{
    convert_batch, detect_format, ConversionConfig, ConversionConfigBuilder,
    ConversionProgressCallback, JobResult, ProgressCallback, TabularBackend,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch and a log line per
/// file. Files finish out of order when converted concurrently.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new(total: usize) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total} file(s)…"))
        ));
    }

    fn on_file_start(&self, _index: usize, _total: usize, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn on_file_complete(&self, _index: usize, _total: usize, name: &str, output_bytes: u64) {
        self.bar.println(format!(
            "  {} {:<40}  {}",
            green("✓"),
            name,
            dim(&format!("{output_bytes:>8} bytes")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, _index: usize, _total: usize, name: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Keep one line per file.
        let first_line = error.lines().next().unwrap_or_default();
        let msg = if first_line.chars().count() > 80 {
            let cut: String = first_line.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            first_line.to_string()
        };

        self.bar
            .println(format!("  {} {:<40}  {}", red("✗"), name, red(&msg)));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        let failed = total.saturating_sub(succeeded);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} file(s) converted successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} file(s) converted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a document into ./pdfs
  topdf convert report.docx

  # Several files at once, into another directory
  topdf convert scan.png budget.xlsx notes.docx -o out/

  # Spreadsheets through LibreOffice instead of the built-in grid
  topdf --tabular-backend libreoffice convert budget.xlsx

  # Embed a Unicode font for non-Latin text
  topdf --font-dir /usr/share/fonts/truetype/dejavu convert letter.docx

  # Show how files would be handled
  topdf detect report.docx photo.jpeg notes.txt

  # Run the upload service
  topdf serve --bind 0.0.0.0:5000

SUPPORTED INPUTS:
  Extension          Handling
  ─────────────────  ───────────────────────────────────────────────
  .docx              body paragraphs as wrapped 10 pt text on A4
  .png .jpg .jpeg    one page, image scaled to the 190 mm text width
  .xls .xlsx         first worksheet as a bordered grid

ENVIRONMENT VARIABLES:
  TOPDF_OUTPUT_DIR        Output directory (default ./pdfs)
  TOPDF_FONT_DIR          Directory holding the TrueType text font
  TOPDF_FONT_FILE         Font file name (default DejaVuSans.ttf)
  TOPDF_TABULAR_BACKEND   in-process | libreoffice
  TOPDF_SOFFICE           LibreOffice executable (default soffice)
  RUST_LOG                Overrides the log filter
"#;

/// Convert Word documents, images and spreadsheets to PDF.
#[derive(Parser, Debug)]
#[command(
    name = "topdf",
    version,
    about = "Convert Word documents, images and spreadsheets to PDF",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    options: ConfigArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "TOPDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "TOPDF_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert local files. Inputs are never modified.
    Convert {
        /// Files to convert.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory.
        #[arg(short, long, env = "TOPDF_OUTPUT_DIR", default_value = "pdfs")]
        output_dir: PathBuf,

        /// Print results as JSON.
        #[arg(long, env = "TOPDF_JSON")]
        json: bool,

        /// Disable progress bar.
        #[arg(long, env = "TOPDF_NO_PROGRESS")]
        no_progress: bool,
    },

    /// Print the detected format of each file name.
    Detect {
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Run the HTTP upload service.
    #[cfg(feature = "server")]
    Serve {
        /// Address to listen on.
        #[arg(long, env = "TOPDF_BIND", default_value = "127.0.0.1:5000")]
        bind: std::net::SocketAddr,

        /// Directory generated PDFs are written to.
        #[arg(short, long, env = "TOPDF_OUTPUT_DIR", default_value = "pdfs")]
        output_dir: PathBuf,

        /// Keep generated PDFs after they have been sent.
        #[arg(long, env = "TOPDF_KEEP_OUTPUTS")]
        keep_outputs: bool,

        /// Directory uploads are staged in (default: system temp dir).
        #[arg(long, env = "TOPDF_STAGING_DIR")]
        staging_dir: Option<PathBuf>,

        /// Largest accepted upload in MiB.
        #[arg(long, env = "TOPDF_MAX_UPLOAD_MB", default_value_t = 32)]
        max_upload_mb: usize,
    },
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Directory holding the TrueType text font (default: built-in Helvetica).
    #[arg(long, global = true, env = "TOPDF_FONT_DIR")]
    font_dir: Option<PathBuf>,

    /// Font file name inside --font-dir.
    #[arg(long, global = true, env = "TOPDF_FONT_FILE", default_value = "DejaVuSans.ttf")]
    font_file: String,

    /// Spreadsheet strategy.
    #[arg(long, global = true, env = "TOPDF_TABULAR_BACKEND", value_enum, default_value = "in-process")]
    tabular_backend: BackendArg,

    /// LibreOffice executable for --tabular-backend libreoffice.
    #[arg(long, global = true, env = "TOPDF_SOFFICE", default_value = "soffice")]
    soffice: PathBuf,

    /// Seconds before a LibreOffice export is killed.
    #[arg(long, global = true, env = "TOPDF_EXTERNAL_TIMEOUT", default_value_t = 120)]
    external_timeout: u64,

    /// Reject files whose content does not match their extension.
    #[arg(long, global = true, env = "TOPDF_VERIFY_CONTENT")]
    verify_content: bool,

    /// Files converted at once.
    #[arg(short, long, global = true, env = "TOPDF_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum BackendArg {
    InProcess,
    Libreoffice,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = match &cli.command {
        Command::Convert {
            json, no_progress, ..
        } => !cli.quiet && !no_progress && !json,
        _ => false,
    };
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

    match cli.command {
        Command::Detect { ref files } => {
            for file in files {
                let tag = detect_format(file);
                let label = if tag.is_supported() {
                    green(tag.name())
                } else {
                    red(tag.name())
                };
                println!("{file}\t{label}");
            }
            Ok(())
        }

        Command::Convert {
            ref inputs,
            ref output_dir,
            json,
            ..
        } => {
            let progress: Option<ProgressCallback> = if show_progress {
                Some(CliProgressCallback::new(inputs.len()) as Arc<dyn ConversionProgressCallback>)
            } else {
                None
            };
            let config = build_config(&cli.options, progress, |b| b.output_dir(output_dir))?;
            run_convert(inputs, &config, json, cli.quiet, show_progress).await
        }

        #[cfg(feature = "server")]
        Command::Serve {
            bind,
            ref output_dir,
            keep_outputs,
            ref staging_dir,
            max_upload_mb,
        } => {
            let config = build_config(&cli.options, None, |b| {
                let b = b
                    .output_dir(output_dir)
                    .keep_outputs(keep_outputs)
                    .max_upload_bytes(max_upload_mb.saturating_mul(1024 * 1024));
                match staging_dir {
                    Some(dir) => b.staging_dir(dir),
                    None => b,
                }
            })?;
            edgequake_topdf::server::serve(bind, config)
                .await
                .context("Server failed")
        }
    }
}

async fn run_convert(
    inputs: &[PathBuf],
    config: &ConversionConfig,
    json: bool,
    quiet: bool,
    show_progress: bool,
) -> Result<()> {
    let started = Instant::now();
    let results = convert_batch(inputs, config).await;
    let failed = results.iter().filter(|r| !r.is_ok()).count();

    if json {
        let json =
            serde_json::to_string_pretty(&results).context("Failed to serialise results")?;
        println!("{json}");
    } else if !quiet && !show_progress {
        // The progress callback already printed per-file lines.
        print_results(&results);
    }

    if !quiet && !json {
        eprintln!(
            "   {}  →  {}",
            dim(&format!("{}ms total", started.elapsed().as_millis())),
            bold(&config.output_dir.display().to_string()),
        );
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} file(s) failed to convert", results.len());
    }
    Ok(())
}

fn print_results(results: &[JobResult]) {
    for r in results {
        match &r.output {
            Ok(out) => eprintln!(
                "{} {} → {}  {}",
                green("✓"),
                r.input.display(),
                out.output_path.display(),
                dim(&format!(
                    "{} page(s), {} bytes, {}ms",
                    out.stats
                        .pages
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "?".into()),
                    out.stats.output_bytes,
                    out.stats.duration_ms
                )),
            ),
            Err(e) => eprintln!("{} {}  {}", red("✗"), r.input.display(), red(e)),
        }
    }
}

/// Map shared CLI args plus subcommand settings to `ConversionConfig`.
fn build_config(
    args: &ConfigArgs,
    progress: Option<ProgressCallback>,
    subcommand: impl FnOnce(ConversionConfigBuilder) -> ConversionConfigBuilder,
) -> Result<ConversionConfig> {
    let backend = match args.tabular_backend {
        BackendArg::InProcess => TabularBackend::InProcess,
        BackendArg::Libreoffice => TabularBackend::libreoffice_at(
            &args.soffice,
            Duration::from_secs(args.external_timeout),
        ),
    };

    let mut builder = ConversionConfig::builder()
        .font_file(args.font_file.clone())
        .tabular_backend(backend)
        .verify_content(args.verify_content)
        .concurrency(args.concurrency);

    if let Some(ref dir) = args.font_dir {
        builder = builder.font_dir(dir.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    subcommand(builder)
        .build()
        .context("Invalid configuration")
}
