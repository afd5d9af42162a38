//! Raster images: one page, image scaled to the usable width.

use super::{write_atomic, RenderSummary, Renderer};
use crate::detect::FormatTag;
use crate::error::ToPdfError;
use crate::pdf::{Composer, Font, PageLayout, RasterImage};
use std::path::Path;
use tracing::info;

/// Renderer for `.png`, `.jpg` and `.jpeg` inputs.
#[derive(Debug, Clone)]
pub struct ImageRenderer {
    layout: PageLayout,
}

impl ImageRenderer {
    pub fn new(layout: PageLayout) -> Self {
        Self { layout }
    }
}

impl Renderer for ImageRenderer {
    fn name(&self) -> &'static str {
        "image"
    }

    fn render(&self, input: &Path, output: &Path) -> Result<RenderSummary, ToPdfError> {
        if !input.exists() {
            return Err(ToPdfError::FileNotFound {
                path: input.to_path_buf(),
            });
        }
        let image = RasterImage::open(input)
            .map_err(|e| ToPdfError::parse(FormatTag::Image, input, e))?;
        let (px_w, px_h) = (image.width, image.height);

        // No text is drawn, so the built-in font is never embedded.
        let mut pdf = Composer::new(self.layout.clone(), Font::Helvetica);
        pdf.add_page();
        let (x, y) = (self.layout.margin_left, self.layout.margin_top);
        pdf.image(image, x, y, self.layout.usable_width());

        let summary = RenderSummary::of(&pdf);
        let bytes = pdf.finish()?;
        write_atomic(output, &bytes)?;
        info!("image: {}x{} px placed on 1 page", px_w, px_h);
        Ok(summary)
    }
}
