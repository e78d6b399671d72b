//! Stroke rendering module
//!
//! Draws strokes with smoothing, speed-based width and a tapered tail onto
//! any [`Surface`]. The raster surface renders into an `image` buffer.

use crate::smoothing::{segment_widths, smooth_points, SMOOTHING_PASSES};
use crate::{Color, Point, Stroke};
use image::RgbaImage;
use imageproc::drawing::{draw_filled_circle_mut, draw_polygon_mut, Blend};

/// Something strokes can be drawn onto.
///
/// Lines are expected to use round caps and joins.
pub trait Surface {
    fn stroke_line(&mut self, start: Point, end: Point, width: f64, color: Color);
}

/// How world points are mapped before drawing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordinateTransform {
    /// World-absolute drawing (export targets laid out in world space).
    World,
    /// Subtract the scroll offset: viewport-relative drawing.
    ViewRelative { offset: Point },
}

impl CoordinateTransform {
    pub fn apply(&self, point: Point) -> Point {
        match self {
            CoordinateTransform::World => point,
            CoordinateTransform::ViewRelative { offset } => point - *offset,
        }
    }
}

/// Renders strokes. Holds no state; every call is independent.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrokeRenderer;

impl StrokeRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Draw one stroke and return the number of line segments emitted.
    ///
    /// Strokes with fewer than two points draw nothing.
    pub fn render<S: Surface + ?Sized>(
        &self,
        stroke: &Stroke,
        surface: &mut S,
        transform: CoordinateTransform,
    ) -> usize {
        if stroke.is_degenerate() {
            return 0;
        }

        let smoothed: Vec<Point> = smooth_points(&stroke.points, SMOOTHING_PASSES)
            .into_iter()
            .map(|p| transform.apply(p))
            .collect();
        let widths = segment_widths(stroke);

        for (window, width) in smoothed.windows(2).zip(&widths) {
            surface.stroke_line(window[0], window[1], *width, stroke.color);
        }
        widths.len()
    }

    /// Draw a batch of strokes in order.
    pub fn render_all<'a, S, I>(
        &self,
        strokes: I,
        surface: &mut S,
        transform: CoordinateTransform,
    ) -> usize
    where
        S: Surface + ?Sized,
        I: IntoIterator<Item = &'a Stroke>,
    {
        strokes
            .into_iter()
            .map(|stroke| self.render(stroke, surface, transform))
            .sum()
    }
}

/// Raster target backed by an RGBA image.
///
/// `scale` is pixels per world unit; coordinates and widths are multiplied
/// by it. Drawing alpha-blends onto existing pixels.
pub struct RasterSurface {
    canvas: Blend<RgbaImage>,
    scale: f64,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32, background: Color) -> Self {
        Self::from_image(RgbaImage::from_pixel(width, height, background.to_rgba8()), 1.0)
    }

    pub fn from_image(image: RgbaImage, scale: f64) -> Self {
        Self {
            canvas: Blend(image),
            scale,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn image(&self) -> &RgbaImage {
        &self.canvas.0
    }

    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.canvas.0
    }

    pub fn into_image(self) -> RgbaImage {
        self.canvas.0
    }
}

impl std::fmt::Debug for RasterSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterSurface")
            .field("dimensions", &self.canvas.0.dimensions())
            .field("scale", &self.scale)
            .finish()
    }
}

impl Surface for RasterSurface {
    /// Draw a capsule: a quad along the segment plus round caps.
    fn stroke_line(&mut self, start: Point, end: Point, width: f64, color: Color) {
        let pixel = color.to_rgba8();
        let (x0, y0) = (start.x * self.scale, start.y * self.scale);
        let (x1, y1) = (end.x * self.scale, end.y * self.scale);
        let half = (width * self.scale / 2.0).max(0.5);
        let radius = half.round() as i32;

        draw_filled_circle_mut(&mut self.canvas, (x0.round() as i32, y0.round() as i32), radius, pixel);
        draw_filled_circle_mut(&mut self.canvas, (x1.round() as i32, y1.round() as i32), radius, pixel);

        let length = (x1 - x0).hypot(y1 - y0);
        if length < f64::EPSILON {
            return;
        }
        let (nx, ny) = (-(y1 - y0) / length * half, (x1 - x0) / length * half);
        let corner = |x: f64, y: f64| imageproc::point::Point::new(x.round() as i32, y.round() as i32);
        let quad = [
            corner(x0 + nx, y0 + ny),
            corner(x1 + nx, y1 + ny),
            corner(x1 - nx, y1 - ny),
            corner(x0 - nx, y0 - ny),
        ];
        // The polygon filler rejects closed rings; thin segments can round to one.
        if quad[0] != quad[3] && quad[1] != quad[2] {
            draw_polygon_mut(&mut self.canvas, &quad, pixel);
        }
    }
}
