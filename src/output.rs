//! Output types returned by a conversion.

use crate::detect::FormatTag;
use serde::Serialize;
use std::path::PathBuf;

/// Result of a successful conversion.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    /// Where the PDF was written.
    pub output_path: PathBuf,
    /// Detected input format.
    pub format: FormatTag,
    /// Name of the renderer that produced the PDF.
    pub renderer: &'static str,
    /// Conversion statistics.
    pub stats: ConversionStats,
}

/// Statistics for one conversion.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionStats {
    /// Pages in the PDF. `None` when an external program produced it.
    pub pages: Option<usize>,
    /// Laid-out blocks: text paragraphs, table cells and images.
    pub blocks: usize,
    /// Size of the PDF file.
    pub output_bytes: u64,
    /// Wall-clock time of the conversion.
    pub duration_ms: u64,
}

/// Outcome of one file in a batch.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    /// The input as given to the batch.
    pub input: PathBuf,
    /// The conversion result, or the error rendered as text.
    pub output: Result<ConversionOutput, String>,
}

impl JobResult {
    pub fn is_ok(&self) -> bool {
        self.output.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_serialises_to_json() {
        let out = ConversionOutput {
            output_path: PathBuf::from("pdfs/a.pdf"),
            format: FormatTag::WordProcessing,
            renderer: "docx",
            stats: ConversionStats {
                pages: Some(1),
                blocks: 2,
                output_bytes: 1200,
                duration_ms: 3,
            },
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["format"], "WordProcessing");
        assert_eq!(json["renderer"], "docx");
        assert_eq!(json["stats"]["pages"], 1);
        assert_eq!(json["stats"]["blocks"], 2);
    }

    #[test]
    fn job_result_error_serialises() {
        let job = JobResult {
            input: PathBuf::from("notes.txt"),
            output: Err("Unsupported file type".into()),
        };
        assert!(!job.is_ok());
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["output"]["Err"], "Unsupported file type");
    }
}
