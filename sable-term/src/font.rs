//! Font resolution, glyph rasterisation and the raster cache.
//!
//! Fontconfig supplies, per style, a sorted list of font files; the first
//! match is the primary face and the remainder form the fallback chain. A
//! codepoint resolves to the first face in its style's chain whose charmap
//! knows it. Rasters are cached per (face, glyph index) and produced at most
//! once per size; changing the size flushes the cache and recomputes cell
//! metrics from the primary regular face.

use std::collections::{HashMap, HashSet};
use std::ffi::CStr;
use std::path::PathBuf;

use fontconfig::Fontconfig;
use fontdue::{Font, FontSettings};
use log::{debug, info, warn};
use thiserror::Error;

/// Faces loaded per fallback chain; fontconfig sorts the whole system font
/// set and the long tail is never useful.
const MAX_CHAIN_FACES: usize = 8;

/// Fontconfig weight/slant values (stable ABI constants).
const FC_WEIGHT_REGULAR: i32 = 80;
const FC_WEIGHT_BOLD: i32 = 200;
const FC_SLANT_ROMAN: i32 = 0;
const FC_SLANT_ITALIC: i32 = 100;

#[derive(Error, Debug)]
pub enum FontError {
    #[error("fontconfig initialisation failed")]
    Fontconfig,

    #[error("no usable face for family {0:?}")]
    NoRegularFace(String),

    #[error("failed to load font {path}: {reason}")]
    FaceLoad { path: PathBuf, reason: String },
}

/// Fixed cell geometry derived from the primary regular face.
#[derive(Debug, Clone, Copy)]
pub struct CellMetrics {
    pub cell_width: usize,
    pub cell_height: usize,
    /// Distance from the cell top to the text baseline.
    pub baseline: usize,
}

/// The pixel result of rasterising one glyph.
#[derive(Debug, Clone)]
pub struct GlyphRaster {
    /// Coverage bytes (`is_color` false) or BGRA pixels (`is_color` true),
    /// row-major, `width * height` entries.
    pub bitmap: Vec<u8>,
    pub width: usize,
    pub height: usize,
    /// Horizontal bearing from the pen position.
    pub left: i32,
    /// Vertical bearing: distance from the baseline up to the bitmap top.
    pub top: i32,
    pub advance: f32,
    /// The bitmap carries its own color (emoji) and must not be modulated.
    pub is_color: bool,
}

struct Face {
    font: Font,
    path: PathBuf,
}

pub struct FontCache {
    // Keeps the fontconfig library initialised for the cache's lifetime.
    _fc: Fontconfig,
    faces: Vec<Face>,
    /// Face indices per style: regular, bold, italic, bold italic.
    chains: [Vec<usize>; 4],
    px_size: f32,
    metrics: CellMetrics,
    rasters: HashMap<(usize, u16), GlyphRaster>,
    glyph_map: HashMap<(u8, char), Option<(usize, u16)>>,
    missing_logged: HashSet<char>,
}

impl FontCache {
    /// Resolve the four style chains for `family` and derive cell metrics.
    /// The regular chain must resolve; missing styled chains degrade to it.
    pub fn new(family: &str, px_size: f32) -> Result<Self, FontError> {
        let fc = Fontconfig::new().ok_or(FontError::Fontconfig)?;

        let mut faces: Vec<Face> = Vec::new();
        let mut by_path: HashMap<PathBuf, usize> = HashMap::new();
        let mut chains: [Vec<usize>; 4] = Default::default();

        for (style, (bold, italic)) in [(false, false), (true, false), (false, true), (true, true)]
            .iter()
            .enumerate()
        {
            let paths = sorted_font_paths(family, *bold, *italic);
            for path in paths.into_iter().take(MAX_CHAIN_FACES) {
                let index = match by_path.get(&path) {
                    Some(&index) => index,
                    None => match load_face(&path) {
                        Ok(font) => {
                            let index = faces.len();
                            faces.push(Face {
                                font,
                                path: path.clone(),
                            });
                            by_path.insert(path, index);
                            index
                        }
                        Err(e) => {
                            debug!("skipping unloadable font: {}", e);
                            continue;
                        }
                    },
                };
                chains[style].push(index);
            }
        }

        if chains[0].is_empty() {
            return Err(FontError::NoRegularFace(family.to_string()));
        }
        for style in 1..4 {
            if chains[style].is_empty() {
                warn!("no faces for style {}; falling back to regular", style);
                chains[style] = chains[0].clone();
            }
        }

        let metrics = derive_metrics(&faces[chains[0][0]].font, px_size);
        info!(
            "primary face {:?}, cell {}x{}, baseline {}",
            faces[chains[0][0]].path, metrics.cell_width, metrics.cell_height, metrics.baseline
        );

        Ok(FontCache {
            _fc: fc,
            faces,
            chains,
            px_size,
            metrics,
            rasters: HashMap::new(),
            glyph_map: HashMap::new(),
            missing_logged: HashSet::new(),
        })
    }

    pub fn metrics(&self) -> CellMetrics {
        self.metrics
    }

    pub fn px_size(&self) -> f32 {
        self.px_size
    }

    /// Change the pixel size: flushes every raster and recomputes metrics.
    pub fn set_size(&mut self, px_size: f32) {
        self.px_size = px_size.clamp(4.0, 256.0);
        self.metrics = derive_metrics(&self.faces[self.chains[0][0]].font, self.px_size);
        self.rasters.clear();
        self.glyph_map.clear();
    }

    /// Map (codepoint, style) to a face and glyph index by walking the
    /// style's fallback chain. Unmappable codepoints are logged once and
    /// substituted with U+FFFD; `None` means skip the cell.
    pub fn glyph_for(&mut self, ch: char, style_bits: u8) -> Option<(usize, u16)> {
        let key = (style_bits, ch);
        if let Some(&cached) = self.glyph_map.get(&key) {
            return cached;
        }
        let resolved = self
            .lookup(ch, style_bits)
            .or_else(|| {
                if self.missing_logged.insert(ch) {
                    warn!("no font in chain maps U+{:04X}", ch as u32);
                }
                self.lookup('\u{FFFD}', style_bits)
            });
        self.glyph_map.insert(key, resolved);
        resolved
    }

    fn lookup(&self, ch: char, style_bits: u8) -> Option<(usize, u16)> {
        let chain = &self.chains[style_bits.min(3) as usize];
        for &face in chain {
            let glyph = self.faces[face].font.lookup_glyph_index(ch);
            if glyph != 0 {
                return Some((face, glyph));
            }
        }
        None
    }

    /// The raster for a (face, glyph index) pair; rasterised at most once
    /// per key for the current size.
    pub fn raster(&mut self, face: usize, glyph: u16) -> &GlyphRaster {
        let px = self.px_size;
        let cell_height = self.metrics.cell_height;
        let font = &self.faces[face].font;
        self.rasters.entry((face, glyph)).or_insert_with(|| {
            let (metrics, bitmap) = font.rasterize_indexed(glyph, px);
            let raster = GlyphRaster {
                bitmap,
                width: metrics.width,
                height: metrics.height,
                left: metrics.xmin,
                top: metrics.height as i32 + metrics.ymin,
                advance: metrics.advance_width,
                is_color: false,
            };
            fit_to_cell(raster, cell_height)
        })
    }
}

fn load_face(path: &PathBuf) -> Result<Font, FontError> {
    let bytes = std::fs::read(path).map_err(|e| FontError::FaceLoad {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    Font::from_bytes(bytes, FontSettings::default()).map_err(|e| FontError::FaceLoad {
        path: path.clone(),
        reason: e.to_string(),
    })
}

fn derive_metrics(font: &Font, px_size: f32) -> CellMetrics {
    let advance = font.metrics('M', px_size).advance_width;
    let (height, ascent) = match font.horizontal_line_metrics(px_size) {
        Some(line) => (line.new_line_size, line.ascent),
        None => (px_size * 1.2, px_size),
    };
    CellMetrics {
        cell_width: advance.ceil().max(1.0) as usize,
        cell_height: height.ceil().max(1.0) as usize,
        baseline: ascent.ceil().max(1.0) as usize,
    }
}

/// Downscale an oversized raster by repeated 2x2 box averaging while a full
/// halving still fits; a residual fractional overshoot is accepted as-is.
/// Bearings and advance scale by the overall factor.
fn fit_to_cell(raster: GlyphRaster, cell_height: usize) -> GlyphRaster {
    let mut raster = raster;
    let mut halvings = 0u32;
    while raster.height > cell_height && raster.height / 2 >= cell_height {
        raster = halve(raster);
        halvings += 1;
    }
    if halvings > 0 {
        let factor = (1 << halvings) as f32;
        raster.left = (raster.left as f32 / factor).round() as i32;
        raster.top = (raster.top as f32 / factor).round() as i32;
        raster.advance /= factor;
    }
    raster
}

/// One 2x2 box-average halving. Odd edges clamp to the last row/column.
fn halve(raster: GlyphRaster) -> GlyphRaster {
    let channels = if raster.is_color { 4 } else { 1 };
    let width = (raster.width / 2).max(1);
    let height = (raster.height / 2).max(1);
    let mut bitmap = vec![0u8; width * height * channels];

    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let mut total: u32 = 0;
                for dy in 0..2 {
                    for dx in 0..2 {
                        let sy = (y * 2 + dy).min(raster.height - 1);
                        let sx = (x * 2 + dx).min(raster.width - 1);
                        total += raster.bitmap[(sy * raster.width + sx) * channels + c] as u32;
                    }
                }
                bitmap[(y * width + x) * channels + c] = (total / 4) as u8;
            }
        }
    }

    GlyphRaster {
        bitmap,
        width,
        height,
        ..raster
    }
}

/// Sorted font file paths for (family, weight, slant), best match first.
/// Grounded in fontconfig's FcFontSort; an empty result means the style is
/// unavailable and the caller degrades to the regular chain.
fn sorted_font_paths(family: &str, bold: bool, italic: bool) -> Vec<PathBuf> {
    use fontconfig_sys::*;
    use std::os::raw::c_int;

    let family_c = match std::ffi::CString::new(family) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let fc_family = CStr::from_bytes_with_nul(b"family\0").unwrap();
    let fc_weight = CStr::from_bytes_with_nul(b"weight\0").unwrap();
    let fc_slant = CStr::from_bytes_with_nul(b"slant\0").unwrap();
    let fc_file = CStr::from_bytes_with_nul(b"file\0").unwrap();

    let mut paths = Vec::new();

    // SAFETY: pattern and font set are created, queried and destroyed here;
    // fontconfig owns the strings returned by FcPatternGetString.
    unsafe {
        let pat = FcPatternCreate();
        if pat.is_null() {
            return paths;
        }

        FcPatternAddString(pat, fc_family.as_ptr(), family_c.as_ptr() as *const FcChar8);
        FcPatternAddInteger(
            pat,
            fc_weight.as_ptr(),
            if bold { FC_WEIGHT_BOLD } else { FC_WEIGHT_REGULAR } as c_int,
        );
        FcPatternAddInteger(
            pat,
            fc_slant.as_ptr(),
            if italic { FC_SLANT_ITALIC } else { FC_SLANT_ROMAN } as c_int,
        );

        FcConfigSubstitute(std::ptr::null_mut(), pat, FcMatchPattern);
        FcDefaultSubstitute(pat);

        let mut result = FcResultNoMatch;
        let set = FcFontSort(std::ptr::null_mut(), pat, 1, std::ptr::null_mut(), &mut result);

        if !set.is_null() && result == FcResultMatch {
            let nfont = (*set).nfont as usize;
            for i in 0..nfont {
                let font = *(*set).fonts.add(i);
                let mut file: *mut FcChar8 = std::ptr::null_mut();
                if FcPatternGetString(font, fc_file.as_ptr(), 0, &mut file) == FcResultMatch {
                    let path = CStr::from_ptr(file as *const _).to_string_lossy().into_owned();
                    paths.push(PathBuf::from(path));
                }
            }
        }
        if !set.is_null() {
            FcFontSetDestroy(set);
        }
        FcPatternDestroy(pat);
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coverage_raster(width: usize, height: usize, value: u8) -> GlyphRaster {
        GlyphRaster {
            bitmap: vec![value; width * height],
            width,
            height,
            left: 4,
            top: height as i32,
            advance: width as f32,
            is_color: false,
        }
    }

    #[test]
    fn test_fit_leaves_small_rasters_alone() {
        let raster = coverage_raster(8, 10, 200);
        let fitted = fit_to_cell(raster.clone(), 16);
        assert_eq!(fitted.width, 8);
        assert_eq!(fitted.height, 10);
        assert_eq!(fitted.bitmap, raster.bitmap);
    }

    #[test]
    fn test_fit_halves_oversized_raster() {
        // 64 tall into a 16-tall cell: two halvings to 16.
        let raster = coverage_raster(64, 64, 100);
        let fitted = fit_to_cell(raster, 16);
        assert_eq!(fitted.height, 16);
        assert_eq!(fitted.width, 16);
        // Uniform input stays uniform under box averaging.
        assert!(fitted.bitmap.iter().all(|&b| b == 100));
        assert_eq!(fitted.left, 1);
        assert_eq!(fitted.advance, 16.0);
    }

    #[test]
    fn test_fit_accepts_fractional_overshoot() {
        // 24 tall into a 16-tall cell: 24/2 = 12 < 16, so no halving fits
        // and the oversize raster is accepted.
        let raster = coverage_raster(24, 24, 10);
        let fitted = fit_to_cell(raster, 16);
        assert_eq!(fitted.height, 24);
    }

    #[test]
    fn test_halve_averages_blocks() {
        let mut raster = coverage_raster(2, 2, 0);
        raster.bitmap = vec![100, 200, 100, 200];
        let halved = halve(raster);
        assert_eq!(halved.width, 1);
        assert_eq!(halved.height, 1);
        assert_eq!(halved.bitmap, vec![150]);
    }

    #[test]
    fn test_halve_color_channels_independent() {
        let raster = GlyphRaster {
            bitmap: vec![
                // Two BGRA pixels per row, two rows.
                0, 100, 0, 255, 40, 100, 0, 255, //
                0, 100, 0, 255, 40, 100, 0, 255,
            ],
            width: 2,
            height: 2,
            left: 0,
            top: 2,
            advance: 2.0,
            is_color: true,
        };
        let halved = halve(raster);
        assert_eq!(halved.bitmap, vec![20, 100, 0, 255]);
        assert!(halved.is_color);
    }
}
