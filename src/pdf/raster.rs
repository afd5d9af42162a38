//! Raster images prepared for embedding.

use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;

/// Pixel data in the form it will be written to the PDF.
#[derive(Debug, Clone)]
pub(crate) enum ImageData {
    /// Baseline JPEG copied verbatim and decoded by the viewer.
    Jpeg { bytes: Vec<u8>, gray: bool },
    /// 8-bit RGB samples, plus an 8-bit alpha plane when not opaque.
    Raw { rgb: Vec<u8>, alpha: Option<Vec<u8>> },
}

/// A decoded raster image.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub(crate) data: ImageData,
}

impl RasterImage {
    /// Read and decode an image file. The format is taken from the content.
    pub fn open(path: &Path) -> Result<Self, image::ImageError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, image::ImageError> {
        let reader = ImageReader::new(Cursor::new(&bytes)).with_guessed_format()?;
        let format = reader.format();
        let decoded = reader.decode()?;
        let (width, height) = (decoded.width(), decoded.height());

        // One- and three-component JPEGs embed as-is. The decoder turns CMYK
        // into RGB, so the count comes from the stream, not the decoded image.
        if format == Some(ImageFormat::Jpeg) {
            let gray = match jpeg_components(&bytes) {
                Some(1) => Some(true),
                Some(3) => Some(false),
                _ => None,
            };
            if let Some(gray) = gray {
                return Ok(Self {
                    width,
                    height,
                    data: ImageData::Jpeg { bytes, gray },
                });
            }
        }

        Ok(Self::from_dynamic(&decoded))
    }

    fn from_dynamic(img: &DynamicImage) -> Self {
        let (width, height) = (img.width(), img.height());
        if img.color().has_alpha() {
            let rgba = img.to_rgba8();
            let mut rgb = Vec::with_capacity((width * height * 3) as usize);
            let mut alpha = Vec::with_capacity((width * height) as usize);
            let mut opaque = true;
            for px in rgba.pixels() {
                rgb.extend_from_slice(&px.0[..3]);
                alpha.push(px.0[3]);
                opaque &= px.0[3] == u8::MAX;
            }
            Self {
                width,
                height,
                data: ImageData::Raw {
                    rgb,
                    alpha: (!opaque).then_some(alpha),
                },
            }
        } else {
            Self {
                width,
                height,
                data: ImageData::Raw {
                    rgb: img.to_rgb8().into_raw(),
                    alpha: None,
                },
            }
        }
    }

    /// Height in the same unit as `width_out`, keeping the aspect ratio.
    pub fn scaled_height(&self, width_out: f32) -> f32 {
        if self.width == 0 {
            return 0.0;
        }
        width_out * self.height as f32 / self.width as f32
    }
}

/// Component count declared by the first start-of-frame segment.
fn jpeg_components(bytes: &[u8]) -> Option<u8> {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        match marker {
            // Fill byte before a marker.
            0xFF => {
                pos += 1;
                continue;
            }
            // Standalone markers carry no length.
            0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            // Start of scan: no frame header before the data.
            0xDA | 0xD9 => return None,
            _ => {}
        }
        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        let is_frame = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame {
            // length(2) precision(1) height(2) width(2) components(1)
            return bytes.get(pos + 9).copied();
        }
        pos += 2 + len;
    }
    None
}
