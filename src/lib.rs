//! TapeCanvas - a horizontally infinite freehand drawing surface
//!
//! The canvas scrolls without bound along the x axis. Completed strokes are
//! bucketed into fixed-width segments and only the segments around the
//! viewport stay resident, so memory and per-frame cost follow the viewport
//! rather than the length of the drawing.

pub mod autosave;
pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod noise;
pub mod renderer;
pub mod segments;
pub mod session;
pub mod smoothing;
pub mod store;

use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

pub use config::{AutoScrollMode, AutosaveMode, CanvasConfig};
pub use controller::{
    CanvasController, DiscardShare, FrameTick, LogNotifier, NotificationSink, ShareSink, Telemetry,
    ToastKind,
};
pub use error::{CanvasError, ExportError, SessionError, StoreError};
pub use export::{ExportFormat, ExportOptions};
pub use renderer::{CoordinateTransform, RasterSurface, StrokeRenderer, Surface};
pub use segments::{Segment, SegmentId, SegmentManager};
pub use session::StoredSession;
pub use store::{FileStore, PersistenceStore};

/// A point in world coordinates.
///
/// `x` grows rightward along the infinite scroll axis and is never clipped.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Straight (non-premultiplied) RGBA color with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    #[serde(alias = "r")]
    pub red: f64,
    #[serde(alias = "g")]
    pub green: f64,
    #[serde(alias = "b")]
    pub blue: f64,
    #[serde(alias = "a")]
    pub alpha: f64,
}

impl Color {
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgba(red: f64, green: f64, blue: f64, alpha: f64) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    pub fn with_alpha(self, alpha: f64) -> Self {
        Self { alpha, ..self }
    }

    /// Quantize to 8-bit channels for raster targets.
    pub fn to_rgba8(self) -> image::Rgba<u8> {
        let q = |c: f64| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        image::Rgba([q(self.red), q(self.green), q(self.blue), q(self.alpha)])
    }

    /// `#rrggbb` form used by the vector export.
    pub fn to_hex(self) -> String {
        let [r, g, b, _] = self.to_rgba8().0;
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }
}

/// Stable in-memory identity of a stroke. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrokeId(uuid::Uuid);

impl StrokeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for StrokeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StrokeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A freehand stroke in world coordinates.
///
/// `points` and `times` are appended in pairs; color and width are fixed
/// when the stroke starts.
#[derive(Debug, Clone)]
pub struct Stroke {
    pub id: StrokeId,
    pub points: Vec<Point>,
    pub times: Vec<f64>,
    pub color: Color,
    pub line_width: f64,
}

impl Stroke {
    /// Start a stroke at `origin`, captured at `time` (seconds).
    pub fn begin(origin: Point, time: f64, color: Color, line_width: f64) -> Self {
        Self {
            id: StrokeId::new(),
            points: vec![origin],
            times: vec![time],
            color,
            line_width,
        }
    }

    pub fn push(&mut self, point: Point, time: f64) {
        self.points.push(point);
        self.times.push(time);
    }

    pub fn origin(&self) -> Option<Point> {
        self.points.first().copied()
    }

    /// Fewer than two points: nothing to draw or keep.
    pub fn is_degenerate(&self) -> bool {
        self.points.len() < 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_arithmetic() {
        let a = Point::new(3.0, 4.0);
        assert_eq!(a - Point::new(1.0, 1.0), Point::new(2.0, 3.0));
        assert_eq!(a + Point::ZERO, a);
        assert_eq!(Point::ZERO.distance(a), 5.0);
    }

    #[test]
    fn test_stroke_keeps_points_and_times_paired() {
        let mut stroke = Stroke::begin(Point::ZERO, 0.0, Color::BLACK, 2.0);
        assert!(stroke.is_degenerate());

        stroke.push(Point::new(1.0, 0.0), 0.1);
        stroke.push(Point::new(2.0, 0.0), 0.2);
        assert_eq!(stroke.points.len(), stroke.times.len());
        assert!(!stroke.is_degenerate());
        assert_eq!(stroke.origin(), Some(Point::ZERO));
    }

    #[test]
    fn test_color_quantization() {
        let color = Color::rgba(1.0, 0.5, 0.0, 1.0);
        assert_eq!(color.to_rgba8(), image::Rgba([255, 128, 0, 255]));
        assert_eq!(color.to_hex(), "#ff8000");
        assert_eq!(Color::rgba(2.0, -1.0, 0.0, 0.0).to_rgba8().0, [255, 0, 0, 0]);
    }

    #[test]
    fn test_stroke_ids_are_unique() {
        assert_ne!(StrokeId::new(), StrokeId::new());
    }
}
