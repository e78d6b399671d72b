//! Stroke geometry module
//!
//! Pure helpers used by the renderer: point smoothing, speed-based width
//! modulation and the tail taper that fades a stroke out at its end.

use crate::{Point, Stroke};

/// Smoothing passes applied before drawing.
pub const SMOOTHING_PASSES: usize = 2;
/// Speed (units/sec) at or below which a stroke is drawn at full thickness.
pub const MIN_SPEED: f64 = 30.0;
/// Speed (units/sec) at or above which a stroke is drawn at its thinnest.
pub const MAX_SPEED: f64 = 1200.0;
pub const THICK_SCALE: f64 = 1.15;
pub const THIN_SCALE: f64 = 0.6;
/// IIR coefficient for the width filter.
pub const WIDTH_SMOOTHING_ALPHA: f64 = 0.18;
/// Number of trailing segments that taper.
pub const TAIL_SEGMENTS: usize = 20;
pub const TAIL_MIN_SCALE: f64 = 0.15;
/// Thinnest line ever emitted.
pub const MIN_LINE_WIDTH: f64 = 0.4;

const MIN_DT: f64 = 0.0001;

/// Smooth points with a 3-tap `[0.25, 0.5, 0.25]` filter.
///
/// Endpoints are kept in place. Lists of two points or fewer come back
/// unchanged.
pub fn smooth_points(points: &[Point], passes: usize) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let mut current = points.to_vec();
    for _ in 0..passes {
        let mut next = current.clone();
        for (i, window) in current.windows(3).enumerate() {
            let (prev, curr, after) = (window[0], window[1], window[2]);
            next[i + 1] = Point::new(
                prev.x * 0.25 + curr.x * 0.5 + after.x * 0.25,
                prev.y * 0.25 + curr.y * 0.5 + after.y * 0.25,
            );
        }
        current = next;
    }
    current
}

/// Map a speed onto `[0, 1]` between [`MIN_SPEED`] and [`MAX_SPEED`].
pub fn normalized_speed(speed: f64) -> f64 {
    ((speed - MIN_SPEED) / (MAX_SPEED - MIN_SPEED)).clamp(0.0, 1.0)
}

/// Target width multiplier for the segment ending at `index`.
///
/// Speed is measured on the raw captured points and times. Strokes without
/// a time for `index` (older sessions) get a neutral `1.0`.
pub fn target_width_scale(stroke: &Stroke, index: usize) -> f64 {
    if index == 0 || stroke.times.len() <= index || stroke.points.len() <= index {
        return 1.0;
    }
    let dt = (stroke.times[index] - stroke.times[index - 1]).max(MIN_DT);
    let distance = stroke.points[index - 1].distance(stroke.points[index]);
    let speed = distance / dt;
    THICK_SCALE - (THICK_SCALE - THIN_SCALE) * normalized_speed(speed)
}

/// Taper multiplier for segment `index` of a polyline with `point_count`
/// points.
///
/// Only the last `min(20, point_count - 1)` segments taper. Within the tail
/// the scale follows a squared smoothstep of the distance from the end,
/// floored at [`TAIL_MIN_SCALE`].
pub fn tail_scale(index: usize, point_count: usize) -> f64 {
    let last = point_count.saturating_sub(1);
    let tail_count = TAIL_SEGMENTS.min(last);
    if tail_count == 0 {
        return 1.0;
    }
    let tail_start = last - tail_count;
    if index < tail_start {
        return 1.0;
    }
    let t = last.saturating_sub(index) as f64 / tail_count as f64;
    let eased = t * t * (3.0 - 2.0 * t);
    (eased * eased).max(TAIL_MIN_SCALE)
}

/// Width of each drawn segment, in stroke order.
///
/// Entry `i - 1` is the width of the segment from point `i - 1` to point `i`.
/// Empty for degenerate strokes.
pub fn segment_widths(stroke: &Stroke) -> Vec<f64> {
    let count = stroke.points.len();
    if count < 2 {
        return Vec::new();
    }

    let mut filtered_scale = 1.0;
    (1..count)
        .map(|i| {
            let target = target_width_scale(stroke, i);
            filtered_scale += (target - filtered_scale) * WIDTH_SMOOTHING_ALPHA;
            let width = stroke.line_width * filtered_scale * tail_scale(i, count);
            width.max(MIN_LINE_WIDTH)
        })
        .collect()
}

/// Filtered (speed) scale after each segment, without the taper applied.
pub fn filtered_scales(stroke: &Stroke) -> Vec<f64> {
    let mut filtered_scale = 1.0;
    (1..stroke.points.len())
        .map(|i| {
            filtered_scale +=
                (target_width_scale(stroke, i) - filtered_scale) * WIDTH_SMOOTHING_ALPHA;
            filtered_scale
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;

    fn stroke_from(points: &[(f64, f64)], times: &[f64], width: f64) -> Stroke {
        let mut stroke = Stroke::begin(
            Point::new(points[0].0, points[0].1),
            times[0],
            Color::BLACK,
            width,
        );
        for (p, t) in points.iter().zip(times).skip(1) {
            stroke.push(Point::new(p.0, p.1), *t);
        }
        stroke
    }

    #[test]
    fn test_smoothing_keeps_endpoints() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 10.0),
            Point::new(2.0, 0.0),
            Point::new(3.0, 10.0),
        ];
        let smoothed = smooth_points(&points, SMOOTHING_PASSES);
        assert_eq!(smoothed.len(), points.len());
        assert_eq!(smoothed[0], points[0]);
        assert_eq!(smoothed[3], points[3]);
        assert!(smoothed[1].y < 10.0 && smoothed[1].y > 0.0);
    }

    #[test]
    fn test_single_pass_is_quarter_half_quarter() {
        let points = vec![Point::new(0.0, 0.0), Point::new(4.0, 8.0), Point::new(8.0, 0.0)];
        let smoothed = smooth_points(&points, 1);
        assert_eq!(smoothed[1], Point::new(4.0, 4.0));
    }

    #[test]
    fn test_short_lists_are_untouched() {
        let points = vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0)];
        assert_eq!(smooth_points(&points, 5), points);
        assert!(smooth_points(&[], 2).is_empty());
    }

    #[test]
    fn test_slow_segment_targets_thickest_scale() {
        // 1 unit in 1 second is well under MIN_SPEED.
        let stroke = stroke_from(&[(0.0, 0.0), (1.0, 0.0)], &[0.0, 1.0], 2.0);
        assert!((target_width_scale(&stroke, 1) - THICK_SCALE).abs() < 1e-12);
    }

    #[test]
    fn test_fast_segment_targets_thinnest_scale() {
        let stroke = stroke_from(&[(0.0, 0.0), (1200.0, 0.0)], &[0.0, 1.0], 2.0);
        assert!((target_width_scale(&stroke, 1) - THIN_SCALE).abs() < 1e-12);

        let faster = stroke_from(&[(0.0, 0.0), (500.0, 0.0)], &[0.0, 0.01], 2.0);
        assert!((target_width_scale(&faster, 1) - THIN_SCALE).abs() < 1e-12);
    }

    #[test]
    fn test_zero_dt_is_clamped() {
        let stroke = stroke_from(&[(0.0, 0.0), (0.0, 0.0)], &[1.0, 1.0], 2.0);
        assert!(target_width_scale(&stroke, 1).is_finite());
    }

    #[test]
    fn test_missing_times_give_neutral_scale() {
        let mut stroke = stroke_from(&[(0.0, 0.0), (10.0, 0.0)], &[0.0, 0.1], 2.0);
        stroke.times.clear();
        assert_eq!(target_width_scale(&stroke, 1), 1.0);
    }

    #[test]
    fn test_tail_scale_profile() {
        // 30 points: 29 segments, the last 20 taper.
        assert_eq!(tail_scale(1, 30), 1.0);
        assert_eq!(tail_scale(8, 30), 1.0);
        assert_eq!(tail_scale(9, 30), 1.0);
        assert!(tail_scale(20, 30) < 1.0);
        assert_eq!(tail_scale(29, 30), TAIL_MIN_SCALE);

        let mut previous = f64::MAX;
        for i in 9..30 {
            let scale = tail_scale(i, 30);
            assert!(scale <= previous);
            previous = scale;
        }
    }

    #[test]
    fn test_short_stroke_tapers_over_its_whole_length() {
        assert_eq!(tail_scale(1, 2), TAIL_MIN_SCALE);
        assert_eq!(tail_scale(0, 1), 1.0);
    }

    #[test]
    fn test_final_segment_hits_taper_floor() {
        let points: Vec<(f64, f64)> = (0..24).map(|i| (i as f64 * 2.0, 0.0)).collect();
        let times: Vec<f64> = (0..24).map(|i| i as f64 * 0.05).collect();
        let stroke = stroke_from(&points, &times, 10.0);

        let widths = segment_widths(&stroke);
        let scales = filtered_scales(&stroke);
        assert_eq!(widths.len(), 23);
        let last = *widths.last().unwrap();
        let floor = TAIL_MIN_SCALE * 10.0 * scales.last().unwrap();
        assert!(last <= floor + 1e-9);
    }

    #[test]
    fn test_widths_never_drop_below_minimum() {
        let points: Vec<(f64, f64)> = (0..30).map(|i| (i as f64 * 100.0, 0.0)).collect();
        let times: Vec<f64> = (0..30).map(|i| i as f64 * 0.001).collect();
        let stroke = stroke_from(&points, &times, 0.5);
        assert!(segment_widths(&stroke).iter().all(|w| *w >= MIN_LINE_WIDTH));
    }

    #[test]
    fn test_filtered_scale_moves_gradually() {
        let points: Vec<(f64, f64)> = (0..5).map(|i| (i as f64, 0.0)).collect();
        let times: Vec<f64> = (0..5).map(|i| i as f64).collect();
        let stroke = stroke_from(&points, &times, 2.0);
        let scales = filtered_scales(&stroke);
        assert!((scales[0] - (1.0 + (THICK_SCALE - 1.0) * WIDTH_SMOOTHING_ALPHA)).abs() < 1e-12);
        assert!(scales.windows(2).all(|w| w[1] > w[0] && w[1] < THICK_SCALE));
    }
}
