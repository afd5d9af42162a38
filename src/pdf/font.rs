//! Text fonts: built-in Helvetica or an embedded TrueType file.
//!
//! Helvetica is one of the 14 standard PDF fonts, so nothing is embedded and
//! text is written in WinAnsiEncoding. Characters outside that code page
//! are replaced by `?`. For real glyph coverage (Cyrillic, Greek, CJK…)
//! point the converter at a TrueType font such as DejaVuSans; it is then
//! embedded as a CID font and text is written as 2-byte glyph ids.

use crate::error::ToPdfError;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Helvetica advance widths for U+0020..=U+007E, in 1/1000 em.
const HELVETICA_ASCII: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    278, 278, 584, 584, 584, 556, 1015, // :..@
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778,
    722, 667, 611, 722, 667, 944, 667, 667, 611, // A-Z
    278, 278, 278, 469, 556, 333, // [..`
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, 556,
    333, 500, 278, 556, 500, 722, 500, 500, 500, // a-z
    334, 260, 334, 584, // {..~
];

/// Helvetica advance widths for U+00A0..=U+00FF.
const HELVETICA_LATIN1: [u16; 96] = [
    278, 333, 556, 556, 556, 556, 260, 556, 333, 737, 370, 556, 584, 333, 737, 333, //
    400, 584, 333, 333, 333, 556, 537, 278, 333, 333, 365, 556, 834, 834, 834, 611, //
    667, 667, 667, 667, 667, 667, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278, //
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611, //
    556, 556, 556, 556, 556, 556, 889, 500, 556, 556, 556, 556, 278, 278, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 584, 611, 556, 556, 556, 556, 500, 556, 500, //
];

/// WinAnsi code points 0x80..=0x9F that differ from Latin-1, with widths.
const WINANSI_SPECIALS: [(char, u8, u16); 27] = [
    ('€', 0x80, 556),
    ('‚', 0x82, 222),
    ('ƒ', 0x83, 556),
    ('„', 0x84, 333),
    ('…', 0x85, 1000),
    ('†', 0x86, 556),
    ('‡', 0x87, 556),
    ('ˆ', 0x88, 333),
    ('‰', 0x89, 1000),
    ('Š', 0x8A, 667),
    ('‹', 0x8B, 333),
    ('Œ', 0x8C, 1000),
    ('Ž', 0x8E, 611),
    ('‘', 0x91, 222),
    ('’', 0x92, 222),
    ('“', 0x93, 333),
    ('”', 0x94, 333),
    ('•', 0x95, 350),
    ('–', 0x96, 556),
    ('—', 0x97, 1000),
    ('˜', 0x98, 333),
    ('™', 0x99, 1000),
    ('š', 0x9A, 500),
    ('›', 0x9B, 333),
    ('œ', 0x9C, 944),
    ('ž', 0x9E, 500),
    ('Ÿ', 0x9F, 667),
];

/// Map a character to its WinAnsiEncoding byte and Helvetica width.
fn winansi(ch: char) -> Option<(u8, u16)> {
    let cp = ch as u32;
    match cp {
        0x20..=0x7E => Some((cp as u8, HELVETICA_ASCII[(cp - 0x20) as usize])),
        0xA0..=0xFF => Some((cp as u8, HELVETICA_LATIN1[(cp - 0xA0) as usize])),
        _ => WINANSI_SPECIALS
            .iter()
            .find(|(c, _, _)| *c == ch)
            .map(|(_, byte, width)| (*byte, *width)),
    }
}

/// Fallback for characters Helvetica cannot encode.
const REPLACEMENT: (u8, u16) = (b'?', 556);

/// One glyph of an embedded font.
#[derive(Debug, Clone, Copy)]
struct Glyph {
    id: u16,
    /// Advance width in 1/1000 em.
    width: f32,
}

/// A TrueType font loaded from disk, ready to embed.
#[derive(Debug)]
pub struct TrueTypeFont {
    /// Sanitised PostScript-style name used as BaseFont.
    pub(crate) name: String,
    pub(crate) data: Vec<u8>,
    glyphs: HashMap<char, Glyph>,
    notdef_width: f32,
    /// Metrics in 1/1000 em.
    pub(crate) ascent: f32,
    pub(crate) descent: f32,
    pub(crate) cap_height: f32,
    pub(crate) bbox: [f32; 4],
}

impl TrueTypeFont {
    /// Load and index a `.ttf` file.
    pub fn load(path: &Path) -> Result<Self, ToPdfError> {
        let unavailable = |detail: String| ToPdfError::FontUnavailable {
            path: path.to_path_buf(),
            detail,
        };

        let data = std::fs::read(path).map_err(|e| unavailable(e.to_string()))?;
        let face = ttf_parser::Face::parse(&data, 0).map_err(|e| unavailable(e.to_string()))?;

        let scale = 1000.0 / f32::from(face.units_per_em());
        let mut glyphs = HashMap::new();
        if let Some(cmap) = face.tables().cmap {
            for subtable in cmap.subtables {
                if !subtable.is_unicode() {
                    continue;
                }
                subtable.codepoints(|cp| {
                    let (Some(ch), Some(gid)) = (char::from_u32(cp), subtable.glyph_index(cp))
                    else {
                        return;
                    };
                    let advance = face.glyph_hor_advance(gid).unwrap_or(0);
                    glyphs.entry(ch).or_insert(Glyph {
                        id: gid.0,
                        width: f32::from(advance) * scale,
                    });
                });
            }
        }
        if glyphs.is_empty() {
            return Err(unavailable("font has no Unicode character map".into()));
        }

        let notdef_width =
            f32::from(face.glyph_hor_advance(ttf_parser::GlyphId(0)).unwrap_or(0)) * scale;
        let bbox = face.global_bounding_box();
        let ascent = f32::from(face.ascender()) * scale;
        let descent = f32::from(face.descender()) * scale;
        let cap_height = face
            .capital_height()
            .map(|h| f32::from(h) * scale)
            .unwrap_or(ascent);

        let name = font_name_from_path(path);
        debug!("Loaded font {} ({} glyphs mapped)", name, glyphs.len());

        Ok(Self {
            name,
            glyphs,
            notdef_width,
            ascent,
            descent,
            cap_height,
            bbox: [
                f32::from(bbox.x_min) * scale,
                f32::from(bbox.y_min) * scale,
                f32::from(bbox.x_max) * scale,
                f32::from(bbox.y_max) * scale,
            ],
            data,
        })
    }

    fn glyph(&self, ch: char) -> Glyph {
        self.glyphs.get(&ch).copied().unwrap_or(Glyph {
            id: 0,
            width: self.notdef_width,
        })
    }

    pub(crate) fn notdef_width(&self) -> f32 {
        self.notdef_width
    }
}

/// BaseFont names must be plain ASCII without delimiters.
fn font_name_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if name.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        name
    }
}

/// Glyphs actually shown, needed for the width array and ToUnicode map.
#[derive(Debug, Default)]
pub struct GlyphUsage {
    pub(crate) used: BTreeMap<u16, (char, f32)>,
}

/// The font all text of one document is set in.
#[derive(Debug, Clone)]
pub enum Font {
    /// Standard Type 1 Helvetica, not embedded.
    Helvetica,
    /// Embedded TrueType font.
    TrueType(Arc<TrueTypeFont>),
}

impl Default for Font {
    fn default() -> Self {
        Font::Helvetica
    }
}

impl Font {
    /// Helvetica unless `path` is given, in which case that file must load.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ToPdfError> {
        match path {
            None => Ok(Font::Helvetica),
            Some(p) => Ok(Font::TrueType(Arc::new(TrueTypeFont::load(p)?))),
        }
    }

    /// Advance width of one character in 1/1000 em.
    pub fn char_width(&self, ch: char) -> f32 {
        match self {
            Font::Helvetica => f32::from(winansi(ch).unwrap_or(REPLACEMENT).1),
            Font::TrueType(ttf) => ttf.glyph(ch).width,
        }
    }

    /// Width of `text` in 1/1000 em.
    pub fn text_width(&self, text: &str) -> f32 {
        text.chars().map(|c| self.char_width(c)).sum()
    }

    /// Encode `text` for a `Tj` operator, recording glyph usage.
    pub fn encode(&self, text: &str, usage: &mut GlyphUsage) -> Vec<u8> {
        match self {
            Font::Helvetica => text
                .chars()
                .map(|c| winansi(c).unwrap_or(REPLACEMENT).0)
                .collect(),
            Font::TrueType(ttf) => {
                let mut out = Vec::with_capacity(text.len() * 2);
                for ch in text.chars() {
                    let glyph = ttf.glyph(ch);
                    usage.used.entry(glyph.id).or_insert((ch, glyph.width));
                    out.extend_from_slice(&glyph.id.to_be_bytes());
                }
                out
            }
        }
    }
}
