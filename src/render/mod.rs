//! Renderers: one per input format, each turning a file into a PDF.
//!
//! All renderers share the [`Renderer`] trait so the dispatcher can pick one
//! at runtime from the detected [`FormatTag`] and the configured tabular
//! backend.

pub mod docx;
pub mod external;
pub mod image;
pub mod table;

use crate::config::{ConversionConfig, TabularBackend};
use crate::detect::FormatTag;
use crate::error::ToPdfError;
use crate::pdf::Composer;
use std::io::Write;
use std::path::Path;

pub use self::docx::DocxRenderer;
pub use self::external::ExternalTabularRenderer;
pub use self::image::ImageRenderer;
pub use self::table::TableRenderer;

/// What a renderer reports about the PDF it wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSummary {
    /// Page count, when the renderer laid the pages out itself.
    pub pages: Option<usize>,
    /// Number of laid-out blocks.
    pub blocks: usize,
}

impl RenderSummary {
    pub(crate) fn of(composer: &Composer) -> Self {
        Self {
            pages: Some(composer.page_count().max(1)),
            blocks: composer.blocks().len(),
        }
    }
}

/// Converts one input file into a PDF at `output`.
///
/// Implementations are blocking; async callers run them on
/// `tokio::task::spawn_blocking`.
pub trait Renderer: Send + Sync {
    /// Short identifier used in logs and [`crate::ConversionOutput`].
    fn name(&self) -> &'static str;

    /// Render `input` to a PDF written at `output`.
    ///
    /// On error nothing is left at `output`.
    fn render(&self, input: &Path, output: &Path) -> Result<RenderSummary, ToPdfError>;
}

/// Pick the renderer for `format` under `config`.
pub fn renderer_for(
    format: FormatTag,
    config: &ConversionConfig,
) -> Result<Box<dyn Renderer>, ToPdfError> {
    let font_path = config.font_path();
    let layout = config.layout.clone();
    match format {
        FormatTag::WordProcessing => Ok(Box::new(DocxRenderer::new(font_path, layout))),
        FormatTag::Image => Ok(Box::new(ImageRenderer::new(layout))),
        FormatTag::Tabular => match &config.tabular_backend {
            TabularBackend::InProcess => Ok(Box::new(TableRenderer::new(font_path, layout))),
            TabularBackend::LibreOffice { program, timeout } => Ok(Box::new(
                ExternalTabularRenderer::new(program.clone(), *timeout),
            )),
        },
        FormatTag::Unsupported => Err(ToPdfError::Internal(
            "no renderer for unsupported input".into(),
        )),
    }
}

/// Write `bytes` to `output` via a temp file in the same directory + rename.
///
/// Readers never observe a half-written PDF, and a failure leaves nothing
/// behind.
pub(crate) fn write_atomic(output: &Path, bytes: &[u8]) -> Result<(), ToPdfError> {
    let fail = |source: std::io::Error| ToPdfError::OutputWriteFailed {
        path: output.to_path_buf(),
        source,
    };
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(fail)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".topdf-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(fail)?;
    tmp.write_all(bytes).map_err(fail)?;
    tmp.flush().map_err(fail)?;
    tmp.persist(output).map_err(|e| fail(e.error))?;
    Ok(())
}
