//! Word documents: body paragraphs as wrapped plain text.
//!
//! Only the text of top-level body paragraphs is kept. Styling, tables,
//! images, headers and footers are not reproduced.

use super::{write_atomic, RenderSummary, Renderer};
use crate::detect::FormatTag;
use crate::error::ToPdfError;
use crate::pdf::{Composer, Font, PageLayout};
use quick_xml::events::{BytesStart, Event};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DOCUMENT_PART: &str = "word/document.xml";

/// Body text size in points.
const FONT_SIZE: f32 = 10.0;
/// Height of one wrapped line in millimetres.
const LINE_HEIGHT: f32 = 10.0;
/// Extra space after each paragraph in millimetres.
const PARAGRAPH_GAP: f32 = 5.0;

/// Plain text of one body paragraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParagraphBlock {
    pub text: String,
}

/// Read the body paragraphs of a `.docx` in document order.
pub fn read_paragraphs(path: &Path) -> Result<Vec<ParagraphBlock>, ToPdfError> {
    let fail = |detail: String| ToPdfError::parse(FormatTag::WordProcessing, path, detail);

    let file = File::open(path).map_err(|_| ToPdfError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| fail(format!("not a valid OOXML container: {e}")))?;
    let mut part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|_| fail(format!("missing {DOCUMENT_PART}")))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| fail(format!("cannot read {DOCUMENT_PART}: {e}")))?;

    let paragraphs =
        parse_document_xml(&xml).map_err(|e| fail(format!("malformed {DOCUMENT_PART}: {e}")))?;
    debug!("{}: {} body paragraph(s)", path.display(), paragraphs.len());
    Ok(paragraphs)
}

/// True when the elements between the paragraph and the current node are
/// exactly a run, optionally wrapped in a hyperlink.
fn in_paragraph_run(between: &[Vec<u8>]) -> bool {
    match between {
        [r] => r.as_slice() == b"w:r",
        [h, r] => h.as_slice() == b"w:hyperlink" && r.as_slice() == b"w:r",
        _ => false,
    }
}

/// Page and column breaks contribute no text.
fn is_text_wrapping_break(e: &BytesStart<'_>) -> bool {
    match e.try_get_attribute("w:type") {
        Ok(Some(attr)) => attr.value.as_ref() == b"textWrapping",
        _ => true,
    }
}

/// Extract body-level paragraphs from the XML of `word/document.xml`.
pub(crate) fn parse_document_xml(xml: &str) -> Result<Vec<ParagraphBlock>, quick_xml::Error> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    // Stack index of the open body paragraph.
    let mut para_depth: Option<usize> = None;
    let mut current = String::new();
    let mut paragraphs = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => {
                let name = e.name().as_ref().to_vec();
                if name == b"w:p"
                    && para_depth.is_none()
                    && stack.last().map(Vec::as_slice) == Some(b"w:body".as_slice())
                {
                    para_depth = Some(stack.len());
                    current.clear();
                }
                stack.push(name);
            }
            Event::Empty(ref e) => {
                let name = e.name();
                match para_depth {
                    Some(depth) if in_paragraph_run(&stack[depth + 1..]) => {
                        match name.as_ref() {
                            b"w:tab" | b"w:ptab" => current.push('\t'),
                            b"w:br" if is_text_wrapping_break(e) => current.push('\n'),
                            b"w:cr" => current.push('\n'),
                            b"w:noBreakHyphen" => current.push('-'),
                            _ => {}
                        }
                    }
                    None if name.as_ref() == b"w:p"
                        && stack.last().map(Vec::as_slice) == Some(b"w:body".as_slice()) =>
                    {
                        paragraphs.push(ParagraphBlock {
                            text: String::new(),
                        });
                    }
                    _ => {}
                }
            }
            Event::Text(ref e) => {
                if let Some(depth) = para_depth {
                    let n = stack.len();
                    if n > depth + 1
                        && stack[n - 1].as_slice() == b"w:t"
                        && in_paragraph_run(&stack[depth + 1..n - 1])
                    {
                        current.push_str(&e.unescape()?);
                    }
                }
            }
            Event::End(_) => {
                stack.pop();
                if para_depth == Some(stack.len()) {
                    para_depth = None;
                    paragraphs.push(ParagraphBlock {
                        text: std::mem::take(&mut current),
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

/// Lay out paragraphs: one wrapped block per non-blank paragraph.
pub fn compose(paragraphs: &[ParagraphBlock], font: Font, layout: PageLayout) -> Composer {
    let mut pdf = Composer::new(layout, font);
    pdf.add_page();
    pdf.set_font_size(FONT_SIZE);
    let width = pdf.layout().usable_width();

    for paragraph in paragraphs.iter().filter(|p| !p.text.trim().is_empty()) {
        pdf.multi_cell(width, LINE_HEIGHT, &paragraph.text);
        pdf.ln(PARAGRAPH_GAP);
    }
    pdf
}

/// Renderer for `.docx` inputs.
#[derive(Debug, Clone)]
pub struct DocxRenderer {
    font_path: Option<PathBuf>,
    layout: PageLayout,
}

impl DocxRenderer {
    pub fn new(font_path: Option<PathBuf>, layout: PageLayout) -> Self {
        Self { font_path, layout }
    }
}

impl Renderer for DocxRenderer {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn render(&self, input: &Path, output: &Path) -> Result<RenderSummary, ToPdfError> {
        let paragraphs = read_paragraphs(input)?;
        let font = Font::resolve(self.font_path.as_deref())?;
        let pdf = compose(&paragraphs, font, self.layout.clone());
        let summary = RenderSummary::of(&pdf);
        let bytes = pdf.finish()?;
        write_atomic(output, &bytes)?;
        info!(
            "docx: {} paragraph(s) → {} block(s) on {} page(s)",
            paragraphs.len(),
            summary.blocks,
            summary.pages.unwrap_or(0)
        );
        Ok(summary)
    }
}
