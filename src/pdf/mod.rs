//! Page composer shared by the in-process renderers.
//!
//! [`Composer`] is a small cursor-based layout engine in millimetres, in the
//! style of the classic FPDF API: `cell`, `multi_cell`, `ln` and `image`
//! move a cursor down the page and break to a new page automatically.
//! Nothing is written until [`Composer::finish`], which serialises the
//! recorded drawing operations with `pdf-writer`.
//!
//! Output is deterministic: no creation date, no document ID, objects
//! numbered in emission order.

mod font;
mod raster;
mod writer;

pub use font::{Font, GlyphUsage, TrueTypeFont};
pub use raster::RasterImage;

use crate::error::ToPdfError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Points per millimetre.
pub const PT_PER_MM: f32 = 72.0 / 25.4;

/// Spaces a tab expands to.
const TAB_WIDTH: usize = 4;

/// Page geometry, all lengths in millimetres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    pub width: f32,
    pub height: f32,
    pub margin_left: f32,
    pub margin_top: f32,
    pub margin_right: f32,
    /// Distance from the bottom edge that triggers a page break.
    pub break_margin: f32,
    /// Horizontal padding inside a cell.
    pub cell_margin: f32,
    /// Stroke width of cell borders.
    pub line_width: f32,
}

impl PageLayout {
    /// A4 portrait with 10 mm margins and a 15 mm break margin.
    pub fn a4() -> Self {
        Self {
            width: 210.0,
            height: 297.0,
            margin_left: 10.0,
            margin_top: 10.0,
            margin_right: 10.0,
            break_margin: 15.0,
            cell_margin: 1.0,
            line_width: 0.2,
        }
    }

    /// Width between the left and right margins.
    pub fn usable_width(&self) -> f32 {
        self.width - self.margin_left - self.margin_right
    }

    /// Lowest y a cell may reach before the page breaks.
    pub fn page_break_trigger(&self) -> f32 {
        self.height - self.break_margin
    }

    pub(crate) fn validate(&self) -> Result<(), ToPdfError> {
        let ok = self.width > 0.0
            && self.height > 0.0
            && self.usable_width() > 2.0 * self.cell_margin
            && self.margin_top >= 0.0
            && self.page_break_trigger() > self.margin_top
            && self.line_width >= 0.0;
        if ok {
            Ok(())
        } else {
            Err(ToPdfError::InvalidConfig(format!(
                "page layout leaves no printable area: {self:?}"
            )))
        }
    }
}

impl Default for PageLayout {
    fn default() -> Self {
        Self::a4()
    }
}

/// Horizontal text alignment inside a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

/// What a recorded block is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockKind {
    /// A wrapped paragraph from `multi_cell`.
    Text,
    /// A single `cell`.
    Cell,
    /// A placed image.
    Image,
}

/// One laid-out unit, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub kind: BlockKind,
    /// 1-indexed page the block starts on.
    pub page: usize,
    pub text: String,
}

/// Rectangle in millimetres from the top-left page corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BoxMm {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

#[derive(Debug, Clone)]
pub(crate) enum DrawOp {
    Text {
        x: f32,
        baseline: f32,
        size: f32,
        encoded: Vec<u8>,
        clip: Option<BoxMm>,
    },
    Border(BoxMm),
    Image {
        index: usize,
        at: BoxMm,
    },
}

/// Cursor-based page builder.
#[derive(Debug)]
pub struct Composer {
    layout: PageLayout,
    font: Font,
    glyphs: GlyphUsage,
    font_size: f32,
    auto_page_break: bool,
    pages: Vec<Vec<DrawOp>>,
    images: Vec<RasterImage>,
    blocks: Vec<Block>,
    x: f32,
    y: f32,
}

impl Composer {
    /// Start an empty document. No page exists until the first
    /// [`add_page`](Self::add_page) or drawing call.
    pub fn new(layout: PageLayout, font: Font) -> Self {
        let (x, y) = (layout.margin_left, layout.margin_top);
        Self {
            layout,
            font,
            glyphs: GlyphUsage::default(),
            font_size: 10.0,
            auto_page_break: true,
            pages: Vec::new(),
            images: Vec::new(),
            blocks: Vec::new(),
            x,
            y,
        }
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    /// Font size in points for subsequent text.
    pub fn set_font_size(&mut self, size_pt: f32) {
        self.font_size = size_pt;
    }

    pub fn set_auto_page_break(&mut self, on: bool) {
        self.auto_page_break = on;
    }

    /// Begin a new page and move the cursor to its top-left margin.
    pub fn add_page(&mut self) {
        self.pages.push(Vec::new());
        self.x = self.layout.margin_left;
        self.y = self.layout.margin_top;
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Line break: back to the left margin and down by `h`.
    pub fn ln(&mut self, h: f32) {
        self.x = self.layout.margin_left;
        self.y += h;
    }

    /// Width of `text` in millimetres at the current font size.
    pub fn string_width(&self, text: &str) -> f32 {
        self.font.text_width(text) * self.font_size / 1000.0 / PT_PER_MM
    }

    /// Draw one cell of `w`×`h` at the cursor and advance the cursor right.
    ///
    /// A width of 0 extends the cell to the right margin. Text that does
    /// not fit is clipped to the cell box.
    pub fn cell(&mut self, w: f32, h: f32, text: &str, border: bool, align: Align) {
        self.place_cell(w, h, text, border, align, true);
        self.record(BlockKind::Cell, text);
    }

    /// Print `text` wrapped to width `w`, one line of height `h` per row.
    ///
    /// Leaves the cursor at the left margin below the last line.
    pub fn multi_cell(&mut self, w: f32, h: f32, text: &str) {
        let w = if w <= 0.0 {
            self.layout.width - self.layout.margin_right - self.x
        } else {
            w
        };
        self.ensure_page();

        let lines = self.wrap_lines(text, w - 2.0 * self.layout.cell_margin);
        let mut first_page = None;
        for line in &lines {
            self.place_cell(w, h, line, false, Align::Left, false);
            first_page.get_or_insert(self.pages.len());
            self.x = self.layout.margin_left;
            self.y += h;
        }
        self.blocks.push(Block {
            kind: BlockKind::Text,
            page: first_page.unwrap_or(self.pages.len()),
            text: text.to_string(),
        });
        debug!("multi_cell: {} line(s), cursor y={:.1}", lines.len(), self.y);
    }

    /// Place an image at (`x`, `y`) scaled to width `w`, keeping its aspect ratio.
    ///
    /// Images never trigger a page break and do not move the cursor.
    pub fn image(&mut self, image: RasterImage, x: f32, y: f32, w: f32) {
        self.ensure_page();
        let h = image.scaled_height(w);
        let index = self.images.len();
        self.images.push(image);
        let at = BoxMm { x, y, w, h };
        self.current_page().push(DrawOp::Image { index, at });
        self.record(BlockKind::Image, "");
    }

    /// Split `text` into lines no wider than `max_width` millimetres.
    ///
    /// Breaks at the last space that fits; a word longer than a whole line
    /// is split between characters. `\n` forces a break and tabs become
    /// four spaces.
    pub fn wrap_lines(&self, text: &str, max_width: f32) -> Vec<String> {
        let limit = max_width * PT_PER_MM * 1000.0 / self.font_size;
        let tab = " ".repeat(TAB_WIDTH);
        let mut lines = Vec::new();

        for hard in text.split('\n') {
            let chars: Vec<char> = hard.trim_end_matches('\r').replace('\t', &tab).chars().collect();
            let mut pushed = false;
            let mut start = 0;
            let mut space: Option<usize> = None;
            let mut width = 0.0;
            let mut i = 0;

            while i < chars.len() {
                let c = chars[i];
                if c == ' ' {
                    space = Some(i);
                }
                width += self.font.char_width(c);
                if width > limit {
                    match space {
                        Some(s) => {
                            lines.push(chars[start..s].iter().collect());
                            i = s + 1;
                        }
                        None => {
                            if i == start {
                                i += 1;
                            }
                            lines.push(chars[start..i].iter().collect());
                        }
                    }
                    pushed = true;
                    start = i;
                    space = None;
                    width = 0.0;
                    continue;
                }
                i += 1;
            }
            if start < chars.len() || !pushed {
                lines.push(chars[start..].iter().collect());
            }
        }
        lines
    }

    /// Serialise the document to PDF bytes.
    pub fn finish(mut self) -> Result<Vec<u8>, ToPdfError> {
        self.ensure_page();
        writer::write_document(
            &self.layout,
            &self.font,
            &self.glyphs,
            &self.pages,
            &self.images,
        )
    }

    fn ensure_page(&mut self) {
        if self.pages.is_empty() {
            self.add_page();
        }
    }

    fn current_page(&mut self) -> &mut Vec<DrawOp> {
        if self.pages.is_empty() {
            self.pages.push(Vec::new());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn record(&mut self, kind: BlockKind, text: &str) {
        let page = self.pages.len().max(1);
        self.blocks.push(Block {
            kind,
            page,
            text: text.to_string(),
        });
    }

    fn place_cell(&mut self, w: f32, h: f32, text: &str, border: bool, align: Align, clip: bool) {
        self.ensure_page();
        if self.auto_page_break && self.y + h > self.layout.page_break_trigger() {
            let x = self.x;
            self.add_page();
            self.x = x;
        }
        let w = if w <= 0.0 {
            self.layout.width - self.layout.margin_right - self.x
        } else {
            w
        };
        let cell = BoxMm {
            x: self.x,
            y: self.y,
            w,
            h,
        };

        if border {
            self.current_page().push(DrawOp::Border(cell));
        }
        if !text.is_empty() {
            let cm = self.layout.cell_margin;
            let text_w = self.string_width(text);
            let x = match align {
                Align::Left => cell.x + cm,
                Align::Center => cell.x + (w - text_w) / 2.0,
                Align::Right => cell.x + w - cm - text_w,
            };
            let baseline = cell.y + 0.5 * h + 0.3 * self.font_size / PT_PER_MM;
            let encoded = self.font.encode(text, &mut self.glyphs);
            let size = self.font_size;
            self.current_page().push(DrawOp::Text {
                x,
                baseline,
                size,
                encoded,
                clip: clip.then_some(cell),
            });
        }
        self.x += w;
    }
}
