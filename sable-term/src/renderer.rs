//! CPU compositing of the grid into the window surface.
//!
//! Per frame: resolve every cell's colors (palette or RGB, inverse swap,
//! style inheritance for wide-glyph spacers), paint cell backgrounds over
//! the default background, alpha-blend glyph rasters at the baseline, then
//! paint the cursor. The grid is centred in the window with equal padding.

use std::num::NonZeroU32;
use std::rc::Rc;

use log::trace;
use sable_core::{xterm_palette, CellFlags, Color, CursorShape, Grid, PrivateMode, Rgb, Style,
    StyleFlags};
use softbuffer::{Context, SoftBufferError, Surface};
use winit::window::Window;

use crate::font::{FontCache, GlyphRaster};

/// Bar- and underline-cursor thickness in pixels.
const CURSOR_THICKNESS: usize = 2;

/// Resolved default colors plus the 256-color palette.
pub struct ColorScheme {
    pub foreground: Rgb,
    pub background: Rgb,
    pub cursor: Rgb,
    pub palette: [Rgb; 256],
}

impl Default for ColorScheme {
    fn default() -> Self {
        ColorScheme {
            foreground: Rgb::new(0xd8, 0xd8, 0xd8),
            background: Rgb::new(0x10, 0x10, 0x14),
            cursor: Rgb::new(0xd8, 0xd8, 0xd8),
            palette: xterm_palette(),
        }
    }
}

impl ColorScheme {
    fn resolve(&self, color: Color, is_fg: bool) -> Rgb {
        match color {
            Color::Default => {
                if is_fg {
                    self.foreground
                } else {
                    self.background
                }
            }
            Color::Indexed(index) => self.palette[index as usize],
            Color::Rgb(rgb) => rgb,
        }
    }
}

/// Resolve a style to (foreground, background), applying the inverse flag.
fn cell_colors(scheme: &ColorScheme, style: &Style) -> (Rgb, Rgb) {
    let fg = scheme.resolve(style.fg, true);
    let bg = scheme.resolve(style.bg, false);
    if style.flags.contains(StyleFlags::INVERSE) {
        (bg, fg)
    } else {
        (fg, bg)
    }
}

fn pack(rgb: Rgb) -> u32 {
    0xFF00_0000 | ((rgb.r as u32) << 16) | ((rgb.g as u32) << 8) | rgb.b as u32
}

fn fill_rect(buffer: &mut [u32], buf_w: usize, buf_h: usize, x: i32, y: i32, w: usize, h: usize,
    pixel: u32)
{
    for dy in 0..h as i32 {
        let py = y + dy;
        if py < 0 || py >= buf_h as i32 {
            continue;
        }
        for dx in 0..w as i32 {
            let px = x + dx;
            if px < 0 || px >= buf_w as i32 {
                continue;
            }
            buffer[py as usize * buf_w + px as usize] = pixel;
        }
    }
}

/// Alpha-blend a coverage raster modulated by `fg` over the buffer.
fn blend_coverage(buffer: &mut [u32], buf_w: usize, buf_h: usize, x: i32, y: i32,
    raster: &GlyphRaster, fg: Rgb)
{
    for dy in 0..raster.height {
        let py = y + dy as i32;
        if py < 0 || py >= buf_h as i32 {
            continue;
        }
        for dx in 0..raster.width {
            let px = x + dx as i32;
            if px < 0 || px >= buf_w as i32 {
                continue;
            }
            let alpha = raster.bitmap[dy * raster.width + dx] as u32;
            if alpha == 0 {
                continue;
            }
            let index = py as usize * buf_w + px as usize;
            if alpha == 255 {
                buffer[index] = pack(fg);
            } else {
                let existing = buffer[index];
                let er = (existing >> 16) & 0xFF;
                let eg = (existing >> 8) & 0xFF;
                let eb = existing & 0xFF;
                let ia = 255 - alpha;
                let r = (fg.r as u32 * alpha + er * ia) / 255;
                let g = (fg.g as u32 * alpha + eg * ia) / 255;
                let b = (fg.b as u32 * alpha + eb * ia) / 255;
                buffer[index] = 0xFF00_0000 | (r << 16) | (g << 8) | b;
            }
        }
    }
}

/// Composite a self-colored (BGRA) raster; no modulation by the cell color.
fn blit_color(buffer: &mut [u32], buf_w: usize, buf_h: usize, x: i32, y: i32,
    raster: &GlyphRaster)
{
    for dy in 0..raster.height {
        let py = y + dy as i32;
        if py < 0 || py >= buf_h as i32 {
            continue;
        }
        for dx in 0..raster.width {
            let px = x + dx as i32;
            if px < 0 || px >= buf_w as i32 {
                continue;
            }
            let src = (dy * raster.width + dx) * 4;
            let (b, g, r, a) = (
                raster.bitmap[src] as u32,
                raster.bitmap[src + 1] as u32,
                raster.bitmap[src + 2] as u32,
                raster.bitmap[src + 3] as u32,
            );
            if a == 0 {
                continue;
            }
            let index = py as usize * buf_w + px as usize;
            let existing = buffer[index];
            let er = (existing >> 16) & 0xFF;
            let eg = (existing >> 8) & 0xFF;
            let eb = existing & 0xFF;
            let ia = 255 - a;
            let nr = (r * a + er * ia) / 255;
            let ng = (g * a + eg * ia) / 255;
            let nb = (b * a + eb * ia) / 255;
            buffer[index] = 0xFF00_0000 | (nr << 16) | (ng << 8) | nb;
        }
    }
}

pub struct Renderer {
    #[allow(dead_code)]
    context: Context<Rc<Window>>,
    surface: Surface<Rc<Window>, Rc<Window>>,
    scheme: ColorScheme,
    width: u32,
    height: u32,
}

impl Renderer {
    pub fn new(window: Rc<Window>) -> Result<Self, SoftBufferError> {
        let context = Context::new(window.clone())?;
        let surface = Surface::new(&context, window.clone())?;
        let size = window.inner_size();
        Ok(Renderer {
            context,
            surface,
            scheme: ColorScheme::default(),
            width: size.width,
            height: size.height,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn render(&mut self, grid: &Grid, fonts: &mut FontCache) -> Result<(), SoftBufferError> {
        let (buf_w, buf_h) = (self.width as usize, self.height as usize);
        if buf_w == 0 || buf_h == 0 {
            return Ok(());
        }
        let (Some(w), Some(h)) = (NonZeroU32::new(self.width), NonZeroU32::new(self.height))
        else {
            return Ok(());
        };
        self.surface.resize(w, h)?;

        let metrics = fonts.metrics();
        let (cols, rows) = (grid.cols(), grid.rows());
        let cell_w = metrics.cell_width;
        let cell_h = metrics.cell_height;
        let pad_x = buf_w.saturating_sub(cols * cell_w) / 2;
        let pad_y = buf_h.saturating_sub(rows * cell_h) / 2;

        let cursor = grid.cursor;
        let cursor_visible = grid.mode(PrivateMode::CursorVisible);
        let cursor_col = cursor.col.min(cols - 1);
        let mut cursor_rect: Option<(i32, i32, usize, usize)> = None;

        let mut buffer = self.surface.buffer_mut()?;
        buffer.fill(pack(self.scheme.background));

        for row in 0..rows {
            let cells = grid.row(row as isize);
            let mut prev = (self.scheme.foreground, self.scheme.background);
            for col in 0..cols {
                let cell = cells[col];
                let (mut fg, mut bg) = if cell.flags.contains(CellFlags::INHERIT_STYLE) {
                    prev
                } else {
                    cell_colors(&self.scheme, &cell.style)
                };
                prev = (fg, bg);

                let x = (pad_x + col * cell_w) as i32;
                let y = (pad_y + row * cell_h) as i32;

                if cursor_visible && row == cursor.row && col == cursor_col {
                    match cursor.shape {
                        CursorShape::Block => std::mem::swap(&mut fg, &mut bg),
                        CursorShape::Underline => {
                            cursor_rect = Some((
                                x,
                                y + (cell_h - CURSOR_THICKNESS) as i32,
                                cell_w,
                                CURSOR_THICKNESS,
                            ))
                        }
                        CursorShape::Bar => {
                            cursor_rect = Some((x, y, CURSOR_THICKNESS, cell_h))
                        }
                    }
                }

                fill_rect(&mut buffer, buf_w, buf_h, x, y, cell_w, cell_h, pack(bg));

                if cell.ch != '\0' && cell.ch != ' ' {
                    if let Some((face, glyph)) =
                        fonts.glyph_for(cell.ch, cell.style.font_style_bits())
                    {
                        let raster = fonts.raster(face, glyph);
                        let gx = x + raster.left;
                        let gy = y + metrics.baseline as i32 - raster.top;
                        if raster.is_color {
                            blit_color(&mut buffer, buf_w, buf_h, gx, gy, raster);
                        } else {
                            blend_coverage(&mut buffer, buf_w, buf_h, gx, gy, raster, fg);
                        }
                    } else {
                        trace!("skipping unmapped cell U+{:04X}", cell.ch as u32);
                    }
                }

                if cell.style.flags.contains(StyleFlags::UNDERLINE) {
                    let uy = y + metrics.baseline as i32 + 1;
                    fill_rect(&mut buffer, buf_w, buf_h, x, uy, cell_w, 1, pack(fg));
                }
            }
        }

        if let Some((x, y, w, h)) = cursor_rect {
            fill_rect(&mut buffer, buf_w, buf_h, x, y, w, h, pack(self.scheme.cursor));
        }

        buffer.present()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_is_argb() {
        assert_eq!(pack(Rgb::new(0x12, 0x34, 0x56)), 0xFF12_3456);
    }

    #[test]
    fn test_resolve_default_and_palette() {
        let scheme = ColorScheme::default();
        assert_eq!(scheme.resolve(Color::Default, true), scheme.foreground);
        assert_eq!(scheme.resolve(Color::Default, false), scheme.background);
        assert_eq!(scheme.resolve(Color::Indexed(9), true), Rgb::new(255, 0, 0));
        let rgb = Rgb::new(1, 2, 3);
        assert_eq!(scheme.resolve(Color::Rgb(rgb), true), rgb);
    }

    #[test]
    fn test_inverse_swaps_colors() {
        let scheme = ColorScheme::default();
        let mut style = Style::default();
        let (fg, bg) = cell_colors(&scheme, &style);
        style.flags.set(StyleFlags::INVERSE, true);
        let (ifg, ibg) = cell_colors(&scheme, &style);
        assert_eq!((ifg, ibg), (bg, fg));
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut buffer = vec![0u32; 4 * 4];
        fill_rect(&mut buffer, 4, 4, -1, -1, 2, 2, 7);
        assert_eq!(buffer[0], 7);
        assert_eq!(buffer[1], 0);
        assert_eq!(buffer[4], 0);
        fill_rect(&mut buffer, 4, 4, 3, 3, 5, 5, 9);
        assert_eq!(buffer[15], 9);
    }

    #[test]
    fn test_blend_coverage_full_and_half() {
        let mut buffer = vec![pack(Rgb::new(0, 0, 0)); 4];
        let raster = GlyphRaster {
            bitmap: vec![255, 128, 0, 0],
            width: 2,
            height: 2,
            left: 0,
            top: 2,
            advance: 2.0,
            is_color: false,
        };
        blend_coverage(&mut buffer, 2, 2, 0, 0, &raster, Rgb::new(200, 100, 50));
        assert_eq!(buffer[0], pack(Rgb::new(200, 100, 50)));
        let half = buffer[1];
        assert_eq!((half >> 16) & 0xFF, 200 * 128 / 255);
        // Zero coverage leaves the background untouched.
        assert_eq!(buffer[2], pack(Rgb::new(0, 0, 0)));
    }

    #[test]
    fn test_blit_color_ignores_modulation() {
        let mut buffer = vec![pack(Rgb::new(0, 0, 0)); 1];
        let raster = GlyphRaster {
            bitmap: vec![10, 20, 30, 255],
            width: 1,
            height: 1,
            left: 0,
            top: 1,
            advance: 1.0,
            is_color: true,
        };
        blit_color(&mut buffer, 1, 1, 0, 0, &raster);
        // BGRA source: red channel is byte 2.
        assert_eq!(buffer[0], 0xFF00_0000 | (30 << 16) | (20 << 8) | 10);
    }
}
