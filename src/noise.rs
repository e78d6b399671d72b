//! Paper grain texture
//!
//! A small tileable image of faint random dots laid under the strokes.
//! Generation is comparatively expensive, so the tile is cached until the
//! theme changes.

use crate::Color;
use image::{Pixel, RgbaImage};
use rand::Rng;

/// Default tile edge length in pixels.
pub const NOISE_TILE_SIZE: u32 = 96;
pub const DOT_COUNT: usize = 250;
pub const DOT_SIZE: f64 = 1.2;
pub const DOT_ALPHA_MIN: f64 = 0.015;
pub const DOT_ALPHA_MAX: f64 = 0.05;
/// Opacity of the background wash under the dots.
pub const BASE_ALPHA: f64 = 0.02;

/// Generate a noise tile with the thread-local RNG.
pub fn generate(tile_size: u32, background: Color, dark_mode: bool) -> RgbaImage {
    generate_with_rng(tile_size, background, dark_mode, &mut rand::thread_rng())
}

/// Generate a noise tile from the given RNG.
///
/// Dots are white on dark themes and black on light ones.
pub fn generate_with_rng<R: Rng + ?Sized>(
    tile_size: u32,
    background: Color,
    dark_mode: bool,
    rng: &mut R,
) -> RgbaImage {
    let mut tile = RgbaImage::from_pixel(
        tile_size,
        tile_size,
        background.with_alpha(BASE_ALPHA).to_rgba8(),
    );
    if tile_size == 0 {
        return tile;
    }

    let dot = if dark_mode { Color::WHITE } else { Color::BLACK };
    let size = tile_size as f64;
    for _ in 0..DOT_COUNT {
        let x = rng.gen_range(0.0..size);
        let y = rng.gen_range(0.0..size);
        let alpha = rng.gen_range(DOT_ALPHA_MIN..=DOT_ALPHA_MAX);
        stamp_dot(&mut tile, x, y, dot.with_alpha(alpha));
    }
    tile
}

/// Blend a `DOT_SIZE` square at `(x, y)` with per-pixel area coverage.
fn stamp_dot(tile: &mut RgbaImage, x: f64, y: f64, color: Color) {
    let (width, height) = tile.dimensions();
    let (x1, y1) = (x + DOT_SIZE, y + DOT_SIZE);
    let mut py = y.floor();
    while py < y1 {
        let mut px = x.floor();
        while px < x1 {
            let coverage = (x1.min(px + 1.0) - x.max(px)) * (y1.min(py + 1.0) - y.max(py));
            // Dots that run off the edge are clipped, not wrapped.
            if coverage > 0.0 && px >= 0.0 && py >= 0.0 && (px as u32) < width && (py as u32) < height {
                let dot = color.with_alpha(color.alpha * coverage).to_rgba8();
                tile.get_pixel_mut(px as u32, py as u32).blend(&dot);
            }
            px += 1.0;
        }
        py += 1.0;
    }
}

/// Repeat `tile` over the `width` x `height` rect at `(origin_x, origin_y)`,
/// blending over whatever is already there. The rect is clipped to `target`.
pub fn fill_pattern(
    target: &mut RgbaImage,
    tile: &RgbaImage,
    (origin_x, origin_y): (u32, u32),
    (width, height): (u32, u32),
) {
    let (tile_w, tile_h) = tile.dimensions();
    if tile_w == 0 || tile_h == 0 {
        return;
    }
    let x_end = origin_x.saturating_add(width).min(target.width());
    let y_end = origin_y.saturating_add(height).min(target.height());
    for y in origin_y..y_end {
        for x in origin_x..x_end {
            let src = tile.get_pixel((x - origin_x) % tile_w, (y - origin_y) % tile_h);
            target.get_pixel_mut(x, y).blend(src);
        }
    }
}

/// Cached noise tile keyed by the theme it was generated for.
#[derive(Debug, Clone)]
pub struct NoiseCache {
    tile_size: u32,
    background: Color,
    dark_mode: bool,
    tile: Option<RgbaImage>,
    generations: usize,
}

impl NoiseCache {
    pub fn new(tile_size: u32, background: Color, dark_mode: bool) -> Self {
        Self {
            tile_size,
            background,
            dark_mode,
            tile: None,
            generations: 0,
        }
    }

    /// Update the theme; the tile is dropped only when something changed.
    pub fn set_theme(&mut self, background: Color, dark_mode: bool) {
        if self.background != background || self.dark_mode != dark_mode {
            self.background = background;
            self.dark_mode = dark_mode;
            self.invalidate();
        }
    }

    pub fn invalidate(&mut self) {
        if self.tile.take().is_some() {
            log::debug!("noise tile invalidated");
        }
    }

    pub fn is_cached(&self) -> bool {
        self.tile.is_some()
    }

    /// How many tiles have been generated so far.
    pub fn generations(&self) -> usize {
        self.generations
    }

    pub fn tile(&mut self) -> &RgbaImage {
        if self.tile.is_none() {
            self.generations += 1;
        }
        let (size, background, dark) = (self.tile_size, self.background, self.dark_mode);
        self.tile
            .get_or_insert_with(|| generate(size, background, dark))
    }
}

impl Default for NoiseCache {
    fn default() -> Self {
        Self::new(NOISE_TILE_SIZE, Color::WHITE, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn paper() -> Color {
        Color::rgba(248.0 / 255.0, 248.0 / 255.0, 248.0 / 255.0, 1.0)
    }

    #[test]
    fn test_tile_has_requested_size() {
        let tile = generate(NOISE_TILE_SIZE, paper(), false);
        assert_eq!(tile.dimensions(), (96, 96));
    }

    #[test]
    fn test_light_mode_dots_are_dark_and_faint() {
        let mut rng = StdRng::seed_from_u64(7);
        let tile = generate_with_rng(96, paper(), false, &mut rng);
        let base = paper().with_alpha(BASE_ALPHA).to_rgba8();

        let touched: Vec<&Rgba<u8>> = tile.pixels().filter(|p| **p != base).collect();
        // 250 dots over 9216 pixels: a few hundred pixels change at most.
        assert!(!touched.is_empty());
        assert!(touched.len() <= DOT_COUNT * 4);
        for pixel in touched {
            // Faint dots only nudge the wash, never make it opaque.
            assert!(pixel.0[3] < 40);
            assert!(pixel.0[0] <= base.0[0]);
        }
    }

    #[test]
    fn test_dark_mode_dots_are_light() {
        let mut rng = StdRng::seed_from_u64(11);
        let dark_bg = Color::rgba(0.1, 0.1, 0.1, 1.0);
        let tile = generate_with_rng(64, dark_bg, true, &mut rng);
        let base = dark_bg.with_alpha(BASE_ALPHA).to_rgba8();
        let brighter = tile
            .pixels()
            .filter(|p| **p != base)
            .all(|p| p.0[0] >= base.0[0]);
        assert!(brighter);
    }

    #[test]
    fn test_tiles_differ_between_generations() {
        let a = generate(48, paper(), false);
        let b = generate(48, paper(), false);
        // Statistically the same, practically never identical.
        assert_ne!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn test_zero_sized_tile() {
        assert_eq!(generate(0, paper(), false).dimensions(), (0, 0));
    }

    #[test]
    fn test_cache_regenerates_only_on_theme_change() {
        let mut cache = NoiseCache::new(32, paper(), false);
        assert!(!cache.is_cached());
        let first = cache.tile().clone();
        let again = cache.tile().clone();
        assert_eq!(first, again);
        assert_eq!(cache.generations(), 1);

        cache.set_theme(paper(), false);
        assert!(cache.is_cached());

        cache.set_theme(paper(), true);
        assert!(!cache.is_cached());
        cache.tile();
        assert_eq!(cache.generations(), 2);

        cache.invalidate();
        cache.tile();
        assert_eq!(cache.generations(), 3);
    }

    #[test]
    fn test_fill_pattern_tiles_target() {
        let mut tile = RgbaImage::new(2, 2);
        tile.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        let mut target = RgbaImage::from_pixel(5, 5, Rgba([255, 255, 255, 255]));
        fill_pattern(&mut target, &tile, (0, 0), (5, 5));

        assert_eq!(target.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(target.get_pixel(2, 2).0, [0, 0, 0, 255]);
        assert_eq!(target.get_pixel(1, 0).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_fill_pattern_respects_rect() {
        let tile = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255]));
        let mut target = RgbaImage::from_pixel(6, 6, Rgba([255, 255, 255, 255]));
        fill_pattern(&mut target, &tile, (1, 1), (4, 100));

        assert_eq!(target.get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(target.get_pixel(1, 1).0, [0, 0, 0, 255]);
        assert_eq!(target.get_pixel(4, 5).0, [0, 0, 0, 255]);
        assert_eq!(target.get_pixel(5, 3).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_fill_pattern_blends_translucent_tile() {
        let tile = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128]));
        let mut target = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255]));
        fill_pattern(&mut target, &tile, (0, 0), (2, 2));

        let [r, g, b, a] = target.get_pixel(1, 1).0;
        assert_eq!(a, 255);
        assert!((120..=135).contains(&r));
        assert_eq!((r, g), (g, b));
    }
}
