//! Spreadsheets, in-process: the first worksheet as a bordered grid.
//!
//! Every column gets the same width and every cell is one 10 mm line, so
//! long values are clipped rather than wrapped. Formatting, merged cells,
//! charts and all but the first worksheet are ignored.

use super::{write_atomic, RenderSummary, Renderer};
use crate::detect::FormatTag;
use crate::error::ToPdfError;
use crate::pdf::{Align, Composer, Font, PageLayout};
use calamine::{Data, Reader};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FONT_SIZE: f32 = 10.0;
const ROW_HEIGHT: f32 = 10.0;

/// Cell text of the first worksheet. `header` is the first row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableGrid {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableGrid {
    pub fn columns(&self) -> usize {
        self.header.len()
    }
}

/// Display text of one cell.
pub fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_float(*f),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) => ndt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => format_float(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => e.to_string(),
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// Read the first worksheet of an `.xls` or `.xlsx` file.
pub fn read_first_sheet(path: &Path) -> Result<TableGrid, ToPdfError> {
    let fail = |detail: String| ToPdfError::parse(FormatTag::Tabular, path, detail);

    let bytes = std::fs::read(path).map_err(|_| ToPdfError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| fail(format!("cannot open workbook: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| fail("workbook has no worksheets".into()))?
        .map_err(|e| fail(format!("cannot read first worksheet: {e}")))?;

    let mut rows = range.rows().map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
    let header = rows
        .next()
        .ok_or_else(|| fail("first worksheet is empty".into()))?;
    let rows: Vec<Vec<String>> = rows.collect();
    debug!(
        "{}: {} column(s), {} data row(s)",
        path.display(),
        header.len(),
        rows.len()
    );
    Ok(TableGrid { header, rows })
}

/// Lay the grid out as bordered, centred cells across the usable width.
pub fn compose(grid: &TableGrid, font: Font, layout: PageLayout) -> Composer {
    let mut pdf = Composer::new(layout, font);
    pdf.add_page();
    pdf.set_font_size(FONT_SIZE);

    let columns = grid.columns().max(1);
    let col_width = pdf.layout().usable_width() / columns as f32;

    for row in std::iter::once(&grid.header).chain(&grid.rows) {
        for value in row {
            pdf.cell(col_width, ROW_HEIGHT, value, true, Align::Center);
        }
        pdf.ln(ROW_HEIGHT);
    }
    pdf
}

/// In-process renderer for `.xls` and `.xlsx` inputs.
#[derive(Debug, Clone)]
pub struct TableRenderer {
    font_path: Option<PathBuf>,
    layout: PageLayout,
}

impl TableRenderer {
    pub fn new(font_path: Option<PathBuf>, layout: PageLayout) -> Self {
        Self { font_path, layout }
    }
}

impl Renderer for TableRenderer {
    fn name(&self) -> &'static str {
        "table"
    }

    fn render(&self, input: &Path, output: &Path) -> Result<RenderSummary, ToPdfError> {
        let grid = read_first_sheet(input)?;
        let font = Font::resolve(self.font_path.as_deref())?;
        let pdf = compose(&grid, font, self.layout.clone());
        let summary = RenderSummary::of(&pdf);
        let bytes = pdf.finish()?;
        write_atomic(output, &bytes)?;
        info!(
            "table: {}x{} grid on {} page(s)",
            grid.rows.len() + 1,
            grid.columns(),
            summary.pages.unwrap_or(0)
        );
        Ok(summary)
    }
}
