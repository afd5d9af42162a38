//! Configuration types for document-to-PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One config is shared by every job of
//! a batch and by every request of the HTTP service.

use crate::error::ToPdfError;
use crate::pdf::PageLayout;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default LibreOffice executable name, looked up on `PATH`.
pub const DEFAULT_SOFFICE: &str = "soffice";

/// Default limit for one external spreadsheet export.
pub const DEFAULT_EXTERNAL_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for a conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_topdf::{ConversionConfig, TabularBackend};
///
/// let config = ConversionConfig::builder()
///     .output_dir("out")
///     .concurrency(2)
///     .tabular_backend(TabularBackend::InProcess)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 2);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Directory generated PDFs are written to. Default: `./pdfs`.
    ///
    /// Created on first use.
    pub output_dir: PathBuf,

    /// Directory holding the TrueType text font. Default: None.
    ///
    /// With no font directory, text is set in the built-in Helvetica and
    /// characters outside Windows-1252 print as `?`.
    pub font_dir: Option<PathBuf>,

    /// File name of the text font inside `font_dir`. Default: `DejaVuSans.ttf`.
    pub font_file: String,

    /// How spreadsheets are turned into PDF. Default: [`TabularBackend::InProcess`].
    pub tabular_backend: TabularBackend,

    /// Check magic bytes against the extension before converting. Default: false.
    ///
    /// Off reproduces the upload form's trust-the-filename behaviour: a
    /// mislabelled file is only rejected once its parser fails.
    pub verify_content: bool,

    /// Maximum number of files converted at once by [`crate::convert_batch`]. Default: 4.
    pub concurrency: usize,

    /// Keep PDFs in `output_dir` after the HTTP service has sent them. Default: false.
    pub keep_outputs: bool,

    /// Directory uploads are staged in before conversion. Default: None,
    /// the system temp directory.
    pub staging_dir: Option<PathBuf>,

    /// Largest accepted upload body in bytes. Default: 32 MiB.
    pub max_upload_bytes: usize,

    /// Page geometry shared by all in-process renderers. Default: A4 portrait.
    pub layout: PageLayout,

    /// Optional batch progress callback. Default: no-op.
    pub progress_callback: ProgressCallback,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("pdfs"),
            font_dir: None,
            font_file: "DejaVuSans.ttf".to_string(),
            tabular_backend: TabularBackend::default(),
            verify_content: false,
            concurrency: 4,
            keep_outputs: false,
            staging_dir: None,
            max_upload_bytes: 32 * 1024 * 1024,
            layout: PageLayout::a4(),
            progress_callback: Arc::new(NoopProgressCallback),
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("output_dir", &self.output_dir)
            .field("font_dir", &self.font_dir)
            .field("font_file", &self.font_file)
            .field("tabular_backend", &self.tabular_backend)
            .field("verify_content", &self.verify_content)
            .field("concurrency", &self.concurrency)
            .field("keep_outputs", &self.keep_outputs)
            .field("staging_dir", &self.staging_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("layout", &self.layout)
            .field("progress_callback", &"<dyn ConversionProgressCallback>")
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

    /// Full path of the configured TrueType font, if any.
    pub fn font_path(&self) -> Option<PathBuf> {
        self.font_dir.as_ref().map(|dir| dir.join(&self.font_file))
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn font_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.font_dir = Some(dir.into());
        self
    }

    pub fn font_file(mut self, name: impl Into<String>) -> Self {
        self.config.font_file = name.into();
        self
    }

    pub fn tabular_backend(mut self, backend: TabularBackend) -> Self {
        self.config.tabular_backend = backend;
        self
    }

    pub fn verify_content(mut self, v: bool) -> Self {
        self.config.verify_content = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn keep_outputs(mut self, v: bool) -> Self {
        self.config.keep_outputs = v;
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = Some(dir.into());
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn layout(mut self, layout: PageLayout) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = cb;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ToPdfError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(ToPdfError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(ToPdfError::InvalidConfig(
                "Upload limit must be ≥ 1 byte".into(),
            ));
        }
        if c.font_dir.is_some() && c.font_file.trim().is_empty() {
            return Err(ToPdfError::InvalidConfig(
                "Font file name is empty".into(),
            ));
        }
        if let TabularBackend::LibreOffice { program, timeout } = &c.tabular_backend {
            if program.as_os_str().is_empty() {
                return Err(ToPdfError::InvalidConfig(
                    "LibreOffice program path is empty".into(),
                ));
            }
            if timeout.is_zero() {
                return Err(ToPdfError::InvalidConfig(
                    "External converter timeout must be > 0".into(),
                ));
            }
        }
        c.layout.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Strategy used for `.xls` / `.xlsx` inputs.
///
/// | Backend | Output |
/// |---------|--------|
/// | `InProcess` | first worksheet as a bordered grid, no formatting |
/// | `LibreOffice` | the spreadsheet application's own print layout |
///
/// One config always uses one backend; the two are never mixed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TabularBackend {
    /// Read cell values and draw a simple table (default).
    #[default]
    InProcess,
    /// Export through a headless LibreOffice process.
    LibreOffice {
        /// Executable to run, e.g. `soffice` or an absolute path.
        program: PathBuf,
        /// Kill the process if it has not finished after this long.
        timeout: Duration,
    },
}

impl TabularBackend {
    /// LibreOffice found on `PATH` with the default timeout.
    pub fn libreoffice() -> Self {
        TabularBackend::LibreOffice {
            program: PathBuf::from(DEFAULT_SOFFICE),
            timeout: DEFAULT_EXTERNAL_TIMEOUT,
        }
    }

    /// LibreOffice at `program` with `timeout`.
    pub fn libreoffice_at(program: impl AsRef<Path>, timeout: Duration) -> Self {
        TabularBackend::LibreOffice {
            program: program.as_ref().to_path_buf(),
            timeout,
        }
    }
}
