//! Format detection: map an uploaded file's name to a conversion strategy.
//!
//! Detection looks at the extension only, lower-cased, the same way the
//! upload form always has. An incorrectly named file therefore takes the
//! wrong path and fails later while parsing. [`sniff_content`] is the
//! opt-in stricter check (see `ConversionConfig::verify_content`) that
//! rejects such files up front by their magic bytes.

use crate::error::ToPdfError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Every extension the converter accepts, lower-case, without the dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["docx", "png", "jpg", "jpeg", "xls", "xlsx"];

/// ZIP local file header: PK\x03\x04
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// OLE2 compound file header used by legacy `.xls`.
const CFB_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";

const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";

/// Classification of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatTag {
    /// Word-processing document (`.docx`).
    WordProcessing,
    /// Raster image (`.png`, `.jpg`, `.jpeg`).
    Image,
    /// Spreadsheet (`.xls`, `.xlsx`).
    Tabular,
    /// Anything else.
    Unsupported,
}

impl FormatTag {
    /// Extensions (lower-case, no dot) that map to this tag.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            FormatTag::WordProcessing => &["docx"],
            FormatTag::Image => &["png", "jpg", "jpeg"],
            FormatTag::Tabular => &["xls", "xlsx"],
            FormatTag::Unsupported => &[],
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, FormatTag::Unsupported)
    }

    /// Human-readable name used in messages.
    pub fn name(&self) -> &'static str {
        match self {
            FormatTag::WordProcessing => "word-processing",
            FormatTag::Image => "image",
            FormatTag::Tabular => "spreadsheet",
            FormatTag::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Extension of `filename`, lower-cased, without the dot.
///
/// Only the final path component counts, and a name that *starts* with
/// its only dot (`.docx`) has no extension.
pub fn extension_of(filename: &str) -> Option<String> {
    let base = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename);
    let stem_len = base.trim_start_matches('.').len();
    let body = &base[base.len() - stem_len..];
    body.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Determine the conversion strategy for a declared filename.
pub fn detect_format(filename: &str) -> FormatTag {
    let Some(ext) = extension_of(filename) else {
        return FormatTag::Unsupported;
    };
    match ext.as_str() {
        "docx" => FormatTag::WordProcessing,
        "png" | "jpg" | "jpeg" => FormatTag::Image,
        "xls" | "xlsx" => FormatTag::Tabular,
        _ => FormatTag::Unsupported,
    }
}

/// Verify that the bytes at `path` plausibly match `expected`.
///
/// This is a structural sanity check, not a full parse: it reads the
/// signature and, for OOXML containers, `[Content_Types].xml`.
pub fn sniff_content(path: &Path, expected: FormatTag) -> Result<(), ToPdfError> {
    let mismatch = |detail: String| ToPdfError::ContentMismatch {
        path: path.to_path_buf(),
        expected,
        detail,
    };

    let mut file = File::open(path).map_err(|_| ToPdfError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    let mut head = [0u8; 8];
    let n = read_up_to(&mut file, &mut head).map_err(|e| mismatch(e.to_string()))?;
    let head = &head[..n];

    match expected {
        FormatTag::Image => match image::guess_format(head) {
            Ok(image::ImageFormat::Png) | Ok(image::ImageFormat::Jpeg) => Ok(()),
            Ok(other) => Err(mismatch(format!("found {other:?} image data"))),
            Err(_) => Err(mismatch(format!("unrecognised signature {head:02X?}"))),
        },
        FormatTag::WordProcessing => {
            let types = ooxml_content_types(path).map_err(mismatch)?;
            if types.contains(DOCX_CONTENT_TYPE) {
                Ok(())
            } else {
                Err(mismatch("container has no WordprocessingML main part".into()))
            }
        }
        FormatTag::Tabular => {
            if head.starts_with(&CFB_MAGIC) {
                return Ok(());
            }
            let types = ooxml_content_types(path).map_err(mismatch)?;
            if types.contains(XLSX_CONTENT_TYPE) {
                Ok(())
            } else {
                Err(mismatch("container has no SpreadsheetML main part".into()))
            }
        }
        FormatTag::Unsupported => Err(mismatch("no converter for this format".into())),
    }
}

fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Read `[Content_Types].xml` from an OOXML container.
fn ooxml_content_types(path: &Path) -> Result<String, String> {
    let mut file = File::open(path).map_err(|e| e.to_string())?;
    let mut magic = [0u8; 4];
    if read_up_to(&mut file, &mut magic).map_err(|e| e.to_string())? < 4 || magic != ZIP_MAGIC {
        return Err("not a ZIP container".into());
    }

    let file = File::open(path).map_err(|e| e.to_string())?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(|e| e.to_string())?;
    let mut entry = archive
        .by_name("[Content_Types].xml")
        .map_err(|_| "missing [Content_Types].xml".to_string())?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml).map_err(|e| e.to_string())?;
    Ok(xml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn detects_every_supported_extension() {
        assert_eq!(detect_format("report.docx"), FormatTag::WordProcessing);
        assert_eq!(detect_format("photo.png"), FormatTag::Image);
        assert_eq!(detect_format("photo.jpg"), FormatTag::Image);
        assert_eq!(detect_format("photo.jpeg"), FormatTag::Image);
        assert_eq!(detect_format("sheet.xls"), FormatTag::Tabular);
        assert_eq!(detect_format("sheet.xlsx"), FormatTag::Tabular);
    }

    #[test]
    fn detection_ignores_case() {
        assert_eq!(detect_format("REPORT.DOCX"), FormatTag::WordProcessing);
        assert_eq!(detect_format("Photo.JpEg"), FormatTag::Image);
        assert_eq!(detect_format("Budget.XLSX"), FormatTag::Tabular);
    }

    #[test]
    fn unknown_or_missing_extension_is_unsupported() {
        assert_eq!(detect_format("notes.txt"), FormatTag::Unsupported);
        assert_eq!(detect_format("legacy.doc"), FormatTag::Unsupported);
        assert_eq!(detect_format("README"), FormatTag::Unsupported);
        assert_eq!(detect_format(""), FormatTag::Unsupported);
        assert_eq!(detect_format("archive.docx.zip"), FormatTag::Unsupported);
    }

    #[test]
    fn dot_file_has_no_extension() {
        assert_eq!(extension_of(".docx"), None);
        assert_eq!(detect_format(".docx"), FormatTag::Unsupported);
        assert_eq!(extension_of(".hidden.png").as_deref(), Some("png"));
    }

    #[test]
    fn only_last_component_counts() {
        assert_eq!(detect_format("dir.xlsx/notes"), FormatTag::Unsupported);
        assert_eq!(detect_format("C:\\uploads\\scan.PNG"), FormatTag::Image);
    }

    #[test]
    fn supported_extensions_round_trip_through_tags() {
        for ext in SUPPORTED_EXTENSIONS {
            let tag = detect_format(&format!("file.{ext}"));
            assert!(tag.is_supported());
            assert!(tag.extensions().contains(ext));
        }
        assert!(!FormatTag::Unsupported.is_supported());
    }

    #[test]
    fn sniff_rejects_text_posing_as_png() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello, not an image").unwrap();
        let err = sniff_content(tmp.path(), FormatTag::Image).unwrap_err();
        assert!(matches!(err, ToPdfError::ContentMismatch { .. }));
    }

    #[test]
    fn sniff_accepts_png_signature() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"\x89PNG\r\n\x1a\n rest of file").unwrap();
        assert!(sniff_content(tmp.path(), FormatTag::Image).is_ok());
    }

    #[test]
    fn sniff_accepts_cfb_for_tabular() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&CFB_MAGIC).unwrap();
        tmp.write_all(&[0u8; 64]).unwrap();
        assert!(sniff_content(tmp.path(), FormatTag::Tabular).is_ok());
    }

    #[test]
    fn sniff_rejects_non_zip_docx() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"plain text").unwrap();
        let err = sniff_content(tmp.path(), FormatTag::WordProcessing).unwrap_err();
        assert!(err.to_string().contains("not a ZIP"), "got: {err}");
    }
}
