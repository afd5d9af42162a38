//! Serialise composed pages with `pdf-writer`.

use super::font::{Font, GlyphUsage, TrueTypeFont};
use super::raster::{ImageData, RasterImage};
use super::{BoxMm, DrawOp, PageLayout, PT_PER_MM};
use crate::error::ToPdfError;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use pdf_writer::types::{CidFontType, FontFlags, SystemInfo};
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref, Str, TextStr};
use std::io::Write;

const FONT_NAME: Name<'static> = Name(b"F1");

const IDENTITY_INFO: SystemInfo<'static> = SystemInfo {
    registry: Str(b"Adobe"),
    ordering: Str(b"Identity"),
    supplement: 0,
};

fn deflate(data: &[u8]) -> Result<Vec<u8>, ToPdfError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| ToPdfError::render(format!("compression failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| ToPdfError::render(format!("compression failed: {e}")))
}

fn image_name(index: usize) -> String {
    format!("Im{}", index + 1)
}

/// Write the whole document and return its bytes.
pub(crate) fn write_document(
    layout: &PageLayout,
    font: &Font,
    glyphs: &GlyphUsage,
    pages: &[Vec<DrawOp>],
    images: &[RasterImage],
) -> Result<Vec<u8>, ToPdfError> {
    let mut pdf = Pdf::new();
    let mut alloc = Ref::new(1);

    let catalog_id = alloc.bump();
    let tree_id = alloc.bump();
    let font_id = alloc.bump();
    let page_ids: Vec<Ref> = pages.iter().map(|_| alloc.bump()).collect();
    let content_ids: Vec<Ref> = pages.iter().map(|_| alloc.bump()).collect();
    let image_ids: Vec<Ref> = images.iter().map(|_| alloc.bump()).collect();

    pdf.catalog(catalog_id).pages(tree_id);
    pdf.pages(tree_id)
        .kids(page_ids.iter().copied())
        .count(page_ids.len() as i32);

    match font {
        Font::Helvetica => {
            pdf.type1_font(font_id)
                .base_font(Name(b"Helvetica"))
                .encoding_predefined(Name(b"WinAnsiEncoding"));
        }
        Font::TrueType(ttf) => write_truetype(&mut pdf, &mut alloc, font_id, ttf, glyphs)?,
    }

    for (index, (image, &id)) in images.iter().zip(&image_ids).enumerate() {
        write_image(&mut pdf, &mut alloc, id, image)
            .map_err(|e| ToPdfError::render(format!("image {}: {e}", index + 1)))?;
    }

    let media_box = Rect::new(0.0, 0.0, layout.width * PT_PER_MM, layout.height * PT_PER_MM);
    for (i, ops) in pages.iter().enumerate() {
        let content = page_content(layout, ops);
        let compressed = deflate(&content)?;
        pdf.stream(content_ids[i], &compressed)
            .filter(Filter::FlateDecode);

        let mut page = pdf.page(page_ids[i]);
        page.media_box(media_box)
            .parent(tree_id)
            .contents(content_ids[i]);
        let mut resources = page.resources();
        resources.fonts().pair(FONT_NAME, font_id);
        if !images.is_empty() {
            let mut xobjects = resources.x_objects();
            for (index, &id) in image_ids.iter().enumerate() {
                let name = image_name(index);
                xobjects.pair(Name(name.as_bytes()), id);
            }
        }
        resources.finish();
        page.finish();
    }

    pdf.document_info(alloc.bump())
        .producer(TextStr(concat!("edgequake-topdf ", env!("CARGO_PKG_VERSION"))));

    Ok(pdf.finish())
}

/// Convert a box from top-left millimetres to a PDF rectangle in points.
fn to_pdf_rect(layout: &PageLayout, b: BoxMm) -> (f32, f32, f32, f32) {
    (
        b.x * PT_PER_MM,
        (layout.height - b.y - b.h) * PT_PER_MM,
        b.w * PT_PER_MM,
        b.h * PT_PER_MM,
    )
}

fn page_content(layout: &PageLayout, ops: &[DrawOp]) -> Vec<u8> {
    let mut content = Content::new();
    content.set_line_width(layout.line_width * PT_PER_MM);

    for op in ops {
        match op {
            DrawOp::Border(b) => {
                let (x, y, w, h) = to_pdf_rect(layout, *b);
                content.rect(x, y, w, h);
                content.stroke();
            }
            DrawOp::Text {
                x,
                baseline,
                size,
                encoded,
                clip,
            } => {
                if let Some(b) = clip {
                    let (cx, cy, cw, ch) = to_pdf_rect(layout, *b);
                    content.save_state();
                    content.rect(cx, cy, cw, ch);
                    content.clip_nonzero();
                    content.end_path();
                }
                content.begin_text();
                content.set_font(FONT_NAME, *size);
                content.next_line(x * PT_PER_MM, (layout.height - baseline) * PT_PER_MM);
                content.show(Str(encoded.as_slice()));
                content.end_text();
                if clip.is_some() {
                    content.restore_state();
                }
            }
            DrawOp::Image { index, at } => {
                let (x, y, w, h) = to_pdf_rect(layout, *at);
                let name = image_name(*index);
                content.save_state();
                content.transform([w, 0.0, 0.0, h, x, y]);
                content.x_object(Name(name.as_bytes()));
                content.restore_state();
            }
        }
    }
    content.finish().to_vec()
}

fn write_image(
    pdf: &mut Pdf,
    alloc: &mut Ref,
    id: Ref,
    image: &RasterImage,
) -> Result<(), ToPdfError> {
    let width = image.width as i32;
    let height = image.height as i32;
    match &image.data {
        ImageData::Jpeg { bytes, gray } => {
            let mut xobject = pdf.image_xobject(id, bytes);
            xobject.filter(Filter::DctDecode);
            xobject.width(width);
            xobject.height(height);
            if *gray {
                xobject.color_space().device_gray();
            } else {
                xobject.color_space().device_rgb();
            }
            xobject.bits_per_component(8);
        }
        ImageData::Raw { rgb, alpha } => {
            let mask_id = match alpha {
                Some(plane) => {
                    let mask_id = alloc.bump();
                    let compressed = deflate(plane)?;
                    let mut mask = pdf.image_xobject(mask_id, &compressed);
                    mask.filter(Filter::FlateDecode);
                    mask.width(width);
                    mask.height(height);
                    mask.color_space().device_gray();
                    mask.bits_per_component(8);
                    Some(mask_id)
                }
                None => None,
            };

            let compressed = deflate(rgb)?;
            let mut xobject = pdf.image_xobject(id, &compressed);
            xobject.filter(Filter::FlateDecode);
            xobject.width(width);
            xobject.height(height);
            xobject.color_space().device_rgb();
            xobject.bits_per_component(8);
            if let Some(mask_id) = mask_id {
                xobject.s_mask(mask_id);
            }
        }
    }
    Ok(())
}

/// Embed a TrueType font as a Type0 font with a CIDFontType2 descendant.
fn write_truetype(
    pdf: &mut Pdf,
    alloc: &mut Ref,
    font_id: Ref,
    ttf: &TrueTypeFont,
    glyphs: &GlyphUsage,
) -> Result<(), ToPdfError> {
    let cid_id = alloc.bump();
    let descriptor_id = alloc.bump();
    let file_id = alloc.bump();
    let cmap_id = alloc.bump();
    let base_font = Name(ttf.name.as_bytes());

    pdf.type0_font(font_id)
        .base_font(base_font)
        .encoding_predefined(Name(b"Identity-H"))
        .descendant_font(cid_id)
        .to_unicode(cmap_id);

    let mut cid = pdf.cid_font(cid_id);
    cid.subtype(CidFontType::Type2)
        .base_font(base_font)
        .system_info(IDENTITY_INFO)
        .font_descriptor(descriptor_id)
        .default_width(ttf.notdef_width())
        .cid_to_gid_map_predefined(Name(b"Identity"));
    let mut widths = cid.widths();
    for (&gid, &(_, width)) in &glyphs.used {
        widths.consecutive(gid, [width]);
    }
    widths.finish();
    cid.finish();

    let [x_min, y_min, x_max, y_max] = ttf.bbox;
    pdf.font_descriptor(descriptor_id)
        .name(base_font)
        .flags(FontFlags::NON_SYMBOLIC)
        .bbox(Rect::new(x_min, y_min, x_max, y_max))
        .italic_angle(0.0)
        .ascent(ttf.ascent)
        .descent(ttf.descent)
        .cap_height(ttf.cap_height)
        .stem_v(80.0)
        .font_file2(file_id);

    let compressed = deflate(&ttf.data)?;
    let mut file = pdf.stream(file_id, &compressed);
    file.filter(Filter::FlateDecode);
    file.pair(Name(b"Length1"), ttf.data.len() as i32);
    file.finish();

    let mut cmap = pdf_writer::types::UnicodeCmap::new(Name(b"Custom"), IDENTITY_INFO);
    for (&gid, &(ch, _)) in &glyphs.used {
        cmap.pair(gid, ch);
    }
    pdf.cmap(cmap_id, &cmap.finish());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxes_flip_to_pdf_space() {
        let layout = PageLayout::a4();
        let (x, y, w, h) = to_pdf_rect(
            &layout,
            BoxMm {
                x: 10.0,
                y: 10.0,
                w: 190.0,
                h: 10.0,
            },
        );
        assert!((x - 28.3465).abs() < 0.01);
        assert!((y - 277.0 * PT_PER_MM).abs() < 0.01);
        assert!((w - 190.0 * PT_PER_MM).abs() < 0.01);
        assert!((h - 10.0 * PT_PER_MM).abs() < 0.01);
    }

    #[test]
    fn helvetica_document_names_font() {
        let bytes = write_document(
            &PageLayout::a4(),
            &Font::Helvetica,
            &GlyphUsage::default(),
            &[Vec::new()],
            &[],
        )
        .unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.starts_with("%PDF-"));
        assert!(text.contains("/Helvetica"));
        assert!(text.contains("/WinAnsiEncoding"));
        assert!(!text.contains("/CreationDate"));
    }
}
