//! Error types for the edgequake-topdf library.
//!
//! Every failure of a conversion is a [`ToPdfError`]. The variants carry the
//! path or process involved plus a detail string, so a log line alone is
//! enough to reproduce the problem.
//!
//! Callers that only need to tell the user *what kind* of thing went wrong
//! use [`ToPdfError::kind`], which collapses the variants into the three
//! user-facing categories of [`FailureKind`]: the file type is not
//! supported, the file could not be converted, or something broke inside
//! the service.

use crate::detect::FormatTag;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All errors returned by the edgequake-topdf library.
#[derive(Debug, Error)]
pub enum ToPdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The declared filename has no supported extension.
    #[error("Unsupported file type: '{filename}'\nSupported extensions: .docx, .png, .jpg, .jpeg, .xls, .xlsx")]
    UnsupportedFormat { filename: String },

    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Content sniffing disagreed with the extension.
    #[error("File '{path}' does not look like {expected} content: {detail}")]
    ContentMismatch {
        path: PathBuf,
        expected: FormatTag,
        detail: String,
    },

    /// The input is malformed for its claimed format.
    #[error("Failed to parse {format} input '{path}': {detail}")]
    ParseFailure {
        format: FormatTag,
        path: PathBuf,
        detail: String,
    },

    // ── Rendering errors ──────────────────────────────────────────────────
    /// Building the PDF itself failed.
    #[error("PDF rendering failed: {detail}")]
    RenderFailure { detail: String },

    /// The configured text font could not be loaded.
    #[error("Font '{path}' is unavailable: {detail}\nCheck --font-dir / TOPDF_FONT_DIR.")]
    FontUnavailable { path: PathBuf, detail: String },

    // ── External backend errors ───────────────────────────────────────────
    /// The external spreadsheet application failed to export.
    #[error("External converter '{program}' failed: {detail}")]
    ExternalProcessFailure { program: String, detail: String },

    /// The external spreadsheet application did not finish in time.
    #[error("External converter '{program}' timed out after {timeout:?} and was terminated")]
    ExternalProcessTimeout { program: String, timeout: Duration },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output PDF.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (panicked renderer, lost worker thread).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// User-facing failure category.
///
/// The HTTP layer maps each category to its own status code and message
/// instead of collapsing every failure into one generic reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The extension is not one we convert.
    UnsupportedFormat,
    /// The input was accepted but could not be turned into a PDF.
    ConversionFailed,
    /// A fault inside the converter itself.
    Internal,
}

impl FailureKind {
    /// Short message suitable for showing to an end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureKind::UnsupportedFormat => "Unsupported file type",
            FailureKind::ConversionFailed => "Conversion failed",
            FailureKind::Internal => "Internal error",
        }
    }
}

impl ToPdfError {
    /// Classify this error for the caller.
    pub fn kind(&self) -> FailureKind {
        match self {
            ToPdfError::UnsupportedFormat { .. } => FailureKind::UnsupportedFormat,
            ToPdfError::FileNotFound { .. }
            | ToPdfError::ContentMismatch { .. }
            | ToPdfError::ParseFailure { .. }
            | ToPdfError::RenderFailure { .. }
            | ToPdfError::FontUnavailable { .. }
            | ToPdfError::ExternalProcessFailure { .. }
            | ToPdfError::ExternalProcessTimeout { .. } => FailureKind::ConversionFailed,
            ToPdfError::OutputWriteFailed { .. }
            | ToPdfError::InvalidConfig(_)
            | ToPdfError::Internal(_) => FailureKind::Internal,
        }
    }

    /// What went wrong, without the local paths or process output held by
    /// the variant. Safe to hand to a remote client.
    pub fn public_detail(&self) -> String {
        match self {
            ToPdfError::UnsupportedFormat { .. } => self.kind().user_message().to_string(),
            ToPdfError::FileNotFound { .. } => "input file is missing".to_string(),
            ToPdfError::ContentMismatch { expected, .. } => {
                format!("content does not look like {expected}")
            }
            ToPdfError::ParseFailure { format, detail, .. } => {
                format!("invalid {format} input: {detail}")
            }
            ToPdfError::RenderFailure { detail } => format!("PDF rendering failed: {detail}"),
            ToPdfError::FontUnavailable { .. } => "text font is unavailable".to_string(),
            ToPdfError::ExternalProcessFailure { .. } => "external converter failed".to_string(),
            ToPdfError::ExternalProcessTimeout { timeout, .. } => {
                format!("external converter timed out after {timeout:?}")
            }
            ToPdfError::OutputWriteFailed { .. }
            | ToPdfError::InvalidConfig(_)
            | ToPdfError::Internal(_) => self.kind().user_message().to_string(),
        }
    }

    /// Shorthand for a [`ToPdfError::ParseFailure`].
    pub(crate) fn parse(
        format: FormatTag,
        path: impl Into<PathBuf>,
        detail: impl ToString,
    ) -> Self {
        ToPdfError::ParseFailure {
            format,
            path: path.into(),
            detail: detail.to_string(),
        }
    }

    /// Shorthand for a [`ToPdfError::RenderFailure`].
    pub(crate) fn render(detail: impl ToString) -> Self {
        ToPdfError::RenderFailure {
            detail: detail.to_string(),
        }
    }
}
