//! Conversion entry points.
//!
//! [`convert_file`] is the blocking core: detect the format, optionally
//! check the content, run the matching renderer and verify the result.
//! [`convert`] runs the same work on Tokio's blocking pool. The upload
//! helpers ([`stage_upload`], [`convert_upload`]) wrap it for callers that
//! hold a file in memory, such as the HTTP service, and [`convert_batch`]
//! converts many local files concurrently.

use crate::config::ConversionConfig;
use crate::detect::{detect_format, extension_of, sniff_content};
use crate::error::ToPdfError;
use crate::output::{ConversionOutput, ConversionStats, JobResult};
use crate::render::renderer_for;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempPath;
use tracing::{debug, info, warn};

/// Fallback name when a filename sanitises to nothing.
const FALLBACK_STEM: &str = "document";

/// Convert `input` to a PDF at `output`, blocking the current thread.
///
/// The strategy is chosen from `declared_filename` (the name the user gave
/// the file, which may differ from the on-disk temp name). Unsupported
/// names are rejected before the filesystem is touched.
///
/// # Errors
/// - [`ToPdfError::UnsupportedFormat`] for an unknown extension
/// - [`ToPdfError::ContentMismatch`] when `verify_content` is on and the
///   bytes disagree with the extension
/// - any renderer error; in every error case nothing is left at `output`
pub fn convert_file(
    input: &Path,
    output: &Path,
    declared_filename: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ToPdfError> {
    let started = Instant::now();

    // ── Step 1: Detect ───────────────────────────────────────────────────
    let format = detect_format(declared_filename);
    if !format.is_supported() {
        return Err(ToPdfError::UnsupportedFormat {
            filename: declared_filename.to_string(),
        });
    }
    info!(
        "Converting '{}' ({}) → {}",
        declared_filename,
        format,
        output.display()
    );

    if !input.is_file() {
        return Err(ToPdfError::FileNotFound {
            path: input.to_path_buf(),
        });
    }

    // ── Step 2: Optional content check ───────────────────────────────────
    if config.verify_content {
        sniff_content(input, format)?;
        debug!("Content of {} matches {}", input.display(), format);
    }

    // ── Step 3: Render ───────────────────────────────────────────────────
    let renderer = renderer_for(format, config)?;
    let guard = OutputGuard::new(output);
    let summary = match panic::catch_unwind(AssertUnwindSafe(|| renderer.render(input, output))) {
        Ok(result) => result?,
        Err(payload) => {
            return Err(ToPdfError::Internal(format!(
                "{} renderer panicked: {}",
                renderer.name(),
                panic_message(payload.as_ref())
            )))
        }
    };

    // ── Step 4: Verify ───────────────────────────────────────────────────
    let output_bytes = verify_pdf(output)?;
    guard.disarm();

    let duration_ms = started.elapsed().as_millis() as u64;
    info!(
        "Converted '{}' with {} renderer: {} bytes in {}ms",
        declared_filename,
        renderer.name(),
        output_bytes,
        duration_ms
    );

    Ok(ConversionOutput {
        output_path: output.to_path_buf(),
        format,
        renderer: renderer.name(),
        stats: ConversionStats {
            pages: summary.pages,
            blocks: summary.blocks,
            output_bytes,
            duration_ms,
        },
    })
}

/// Async wrapper around [`convert_file`], run on `spawn_blocking`.
pub async fn convert(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    declared_filename: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ToPdfError> {
    let input = input.as_ref().to_path_buf();
    let output = output.as_ref().to_path_buf();
    let name = declared_filename.to_string();
    let config = config.clone();

    tokio::task::spawn_blocking(move || convert_file(&input, &output, &name, &config))
        .await
        .map_err(|e| ToPdfError::Internal(format!("Conversion task failed: {e}")))?
}

// ── Uploads ──────────────────────────────────────────────────────────────

/// A file received from a client, held in memory.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name as declared by the client. Only its extension and stem are used.
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// An upload written to a private temp file. The file is deleted on drop.
#[derive(Debug)]
pub struct StagedInput {
    path: TempPath,
}

impl StagedInput {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write an upload to a unique temp file that keeps its extension.
pub fn stage_upload(upload: &UploadedFile) -> Result<StagedInput, ToPdfError> {
    stage_upload_in(upload, &std::env::temp_dir())
}

/// [`stage_upload`] into `dir`, which is created if missing.
pub fn stage_upload_in(upload: &UploadedFile, dir: &Path) -> Result<StagedInput, ToPdfError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| ToPdfError::Internal(format!("cannot create staging dir: {e}")))?;
    let suffix = extension_of(&upload.filename)
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    let mut file = tempfile::Builder::new()
        .prefix("topdf-upload-")
        .suffix(&suffix)
        .tempfile_in(dir)
        .map_err(|e| ToPdfError::Internal(format!("cannot stage upload: {e}")))?;
    file.write_all(&upload.bytes)
        .and_then(|_| file.flush())
        .map_err(|e| ToPdfError::Internal(format!("cannot stage upload: {e}")))?;
    let path = file.into_temp_path();
    debug!(
        "Staged '{}' ({} bytes) at {}",
        upload.filename,
        upload.bytes.len(),
        path.display()
    );
    Ok(StagedInput { path })
}

/// Collision-free output path for an upload: `<stem>-<uuid>.pdf` in `output_dir`.
pub fn output_path_for(filename: &str, config: &ConversionConfig) -> PathBuf {
    let stem = secure_stem(filename);
    config
        .output_dir
        .join(format!("{stem}-{}.pdf", uuid::Uuid::new_v4()))
}

/// Name to offer when sending the PDF back: `<stem>.pdf`.
pub fn download_name(filename: &str) -> String {
    format!("{}.pdf", secure_stem(filename))
}

/// Convert an already staged upload. The staged file is removed when this returns.
pub async fn convert_staged(
    staged: StagedInput,
    filename: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ToPdfError> {
    let output = output_path_for(filename, config);
    let name = filename.to_string();
    let config = config.clone();
    tokio::task::spawn_blocking(move || {
        let result = convert_file(staged.path(), &output, &name, &config);
        drop(staged);
        result
    })
    .await
    .map_err(|e| ToPdfError::Internal(format!("Conversion task failed: {e}")))?
}

/// Stage and convert an upload in one step.
///
/// Unsupported names are rejected without writing anything.
pub async fn convert_upload(
    upload: UploadedFile,
    config: &ConversionConfig,
) -> Result<ConversionOutput, ToPdfError> {
    if !detect_format(&upload.filename).is_supported() {
        return Err(ToPdfError::UnsupportedFormat {
            filename: upload.filename,
        });
    }
    let config = config.clone();
    tokio::task::spawn_blocking(move || {
        let staged = match &config.staging_dir {
            Some(dir) => stage_upload_in(&upload, dir)?,
            None => stage_upload(&upload)?,
        };
        let output = output_path_for(&upload.filename, &config);
        convert_file(staged.path(), &output, &upload.filename, &config)
    })
    .await
    .map_err(|e| ToPdfError::Internal(format!("Conversion task failed: {e}")))?
}

// ── Batches ──────────────────────────────────────────────────────────────

/// Output paths for a batch: `<stem>.pdf` in `output_dir`, with `-2`, `-3`…
/// appended when two inputs share a stem.
pub fn batch_output_paths(inputs: &[PathBuf], config: &ConversionConfig) -> Vec<PathBuf> {
    let mut taken = HashSet::new();
    inputs
        .iter()
        .map(|input| {
            let name = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let stem = secure_stem(&name);
            let mut candidate = format!("{stem}.pdf");
            let mut n = 2;
            while !taken.insert(candidate.clone()) {
                candidate = format!("{stem}-{n}.pdf");
                n += 1;
            }
            config.output_dir.join(candidate)
        })
        .collect()
}

/// Convert local files concurrently, at most `config.concurrency` at a time.
///
/// Each file succeeds or fails on its own; results come back in input
/// order. Inputs are never modified or deleted.
pub async fn convert_batch(inputs: &[PathBuf], config: &ConversionConfig) -> Vec<JobResult> {
    let total = inputs.len();
    let outputs = batch_output_paths(inputs, config);
    config.progress_callback.on_batch_start(total);

    let mut results: Vec<(usize, JobResult)> = stream::iter(
        inputs
            .iter()
            .cloned()
            .zip(outputs)
            .enumerate()
            .map(|(index, (input, output))| {
                let config = config.clone();
                async move {
                    let name = input
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| input.display().to_string());
                    let cb = &config.progress_callback;
                    cb.on_file_start(index, total, &name);

                    let result = convert(&input, &output, &name, &config).await;
                    match &result {
                        Ok(out) => cb.on_file_complete(index, total, &name, out.stats.output_bytes),
                        Err(e) => {
                            warn!("Failed to convert {}: {}", input.display(), e);
                            cb.on_file_error(index, total, &name, &e.to_string());
                        }
                    }
                    (
                        index,
                        JobResult {
                            input,
                            output: result.map_err(|e| e.to_string()),
                        },
                    )
                }
            }),
    )
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    results.sort_by_key(|(index, _)| *index);
    let results: Vec<JobResult> = results.into_iter().map(|(_, r)| r).collect();
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    info!("Batch complete: {}/{} converted", succeeded, total);
    config.progress_callback.on_batch_complete(total, succeeded);
    results
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Make a filename safe to use on disk.
///
/// Keeps ASCII letters, digits, `_`, `.` and `-`; runs of whitespace
/// become `_`; path separators are treated as whitespace; leading and
/// trailing dots and underscores are stripped. May return an empty string.
pub fn secure_filename(name: &str) -> String {
    let spaced: String = name
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Sanitised stem of the last path component of `filename`.
fn secure_stem(filename: &str) -> String {
    let base = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename);
    let stem = match extension_of(base) {
        Some(ext) => &base[..base.len() - ext.len() - 1],
        None => base,
    };
    let safe = secure_filename(stem);
    if safe.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        safe
    }
}

/// Removes a partial output unless disarmed.
struct OutputGuard<'a> {
    path: &'a Path,
    armed: bool,
}

impl<'a> OutputGuard<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for OutputGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(self.path) {
            Ok(()) => debug!("Removed incomplete output {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", self.path.display(), e),
        }
    }
}

/// Check that `path` holds a PDF and return its size.
fn verify_pdf(path: &Path) -> Result<u64, ToPdfError> {
    let mut head = [0u8; 5];
    let mut file = std::fs::File::open(path)
        .map_err(|e| ToPdfError::render(format!("no output at {}: {e}", path.display())))?;
    file.read_exact(&mut head)
        .map_err(|_| ToPdfError::render("output is truncated"))?;
    if &head != b"%PDF-" {
        return Err(ToPdfError::render("output is not a PDF file"));
    }
    let len = file
        .metadata()
        .map_err(|e| ToPdfError::render(format!("cannot stat output: {e}")))?
        .len();
    Ok(len)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
