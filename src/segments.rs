//! Spatial segmentation of the scroll axis
//!
//! World x is cut into fixed-width buckets. A completed stroke belongs to the
//! bucket holding its first point; only buckets around the viewport are kept
//! in memory.

use crate::{Stroke, StrokeId};
use std::collections::{BTreeMap, BTreeSet};

pub type SegmentId = i64;

/// Segment width as a multiple of the viewport width.
pub const SEGMENT_WIDTH_FACTOR: f64 = 1.5;
/// Floor for widths derived from a viewport.
pub const MIN_SEGMENT_WIDTH: f64 = 1.0;

fn width_for_viewport(viewport_width: f64) -> f64 {
    (viewport_width * SEGMENT_WIDTH_FACTOR).max(MIN_SEGMENT_WIDTH)
}

/// A bucket of completed strokes.
#[derive(Debug, Clone, Default)]
pub struct Segment {
    pub id: SegmentId,
    pub strokes: Vec<Stroke>,
}

impl Segment {
    pub fn new(id: SegmentId) -> Self {
        Self {
            id,
            strokes: Vec::new(),
        }
    }

    pub fn position_of(&self, stroke_id: StrokeId) -> Option<usize> {
        self.strokes.iter().position(|s| s.id == stroke_id)
    }

    pub fn remove_stroke(&mut self, stroke_id: StrokeId) -> Option<Stroke> {
        let index = self.position_of(stroke_id)?;
        Some(self.strokes.remove(index))
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }
}

/// Maps world x to segment ids and keeps the resident set bounded.
///
/// A width of zero or less (or NaN) collapses everything into segment 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentManager {
    segment_width: f64,
}

impl SegmentManager {
    pub fn new(segment_width: f64) -> Self {
        Self { segment_width }
    }

    /// Manager sized for a viewport of the given width.
    pub fn for_viewport(viewport_width: f64) -> Self {
        Self::new(width_for_viewport(viewport_width))
    }

    pub fn segment_width(&self) -> f64 {
        self.segment_width
    }

    /// Recompute the width after a viewport resize.
    ///
    /// Strokes already stored keep the id they were given at commit time.
    pub fn resize(&mut self, viewport_width: f64) {
        let width = width_for_viewport(viewport_width);
        if width != self.segment_width {
            log::debug!(
                "segment width {} -> {} (viewport {})",
                self.segment_width,
                width,
                viewport_width
            );
            self.segment_width = width;
        }
    }

    fn is_degenerate(&self) -> bool {
        !(self.segment_width > 0.0) || !self.segment_width.is_finite()
    }

    /// `floor(x / segment_width)`, or 0 when the width is degenerate.
    pub fn segment_id(&self, world_x: f64) -> SegmentId {
        if self.is_degenerate() || !world_x.is_finite() {
            return 0;
        }
        (world_x / self.segment_width).floor() as SegmentId
    }

    /// Ids covering the viewport plus one segment of margin on each side,
    /// in ascending order.
    pub fn visible_segment_ids(&self, viewport_width: f64, scroll_x: f64) -> Vec<SegmentId> {
        if self.is_degenerate() {
            return vec![0];
        }
        let start = self.segment_id(scroll_x).saturating_sub(1);
        let end = self
            .segment_id(scroll_x + viewport_width.max(0.0))
            .saturating_add(1);
        (start..=end).collect()
    }

    /// Create the visible segments that are missing and evict every resident
    /// segment outside the visible window and the scroll anchor's segment.
    ///
    /// Returns the evicted ids. Nothing changes while the viewport has no
    /// width, so a collapsed viewport never evicts the strokes around it.
    pub fn reconcile(
        &self,
        segments: &mut BTreeMap<SegmentId, Segment>,
        viewport_width: f64,
        scroll_x: f64,
    ) -> Vec<SegmentId> {
        if self.is_degenerate() || !(viewport_width > 0.0) {
            return Vec::new();
        }
        let visible = self.visible_segment_ids(viewport_width, scroll_x);
        for &id in &visible {
            segments.entry(id).or_insert_with(|| Segment::new(id));
        }

        let mut keep: BTreeSet<SegmentId> = visible.into_iter().collect();
        keep.insert(self.segment_id(scroll_x));

        let evicted: Vec<SegmentId> = segments
            .keys()
            .copied()
            .filter(|id| !keep.contains(id))
            .collect();
        for id in &evicted {
            if let Some(segment) = segments.remove(id) {
                log::debug!(
                    "evicted segment {} ({} strokes)",
                    id,
                    segment.strokes.len()
                );
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Color, Point};

    #[test]
    fn test_segment_id_is_floor_division() {
        let manager = SegmentManager::new(300.0);
        assert_eq!(manager.segment_id(0.0), 0);
        assert_eq!(manager.segment_id(299.9), 0);
        assert_eq!(manager.segment_id(300.0), 1);
        assert_eq!(manager.segment_id(-0.1), -1);
        assert_eq!(manager.segment_id(-300.0), -1);
        assert_eq!(manager.segment_id(-300.1), -2);
    }

    #[test]
    fn test_segment_id_is_monotonic() {
        let manager = SegmentManager::new(137.5);
        let mut previous = SegmentId::MIN;
        let mut x = -5000.0;
        while x < 5000.0 {
            let id = manager.segment_id(x);
            assert!(id >= previous);
            assert_eq!(id, (x / 137.5).floor() as SegmentId);
            previous = id;
            x += 17.25;
        }
    }

    #[test]
    fn test_degenerate_width_collapses_to_single_segment() {
        for width in [0.0, -10.0, f64::NAN] {
            let manager = SegmentManager::new(width);
            assert_eq!(manager.segment_id(12345.0), 0);
            assert_eq!(manager.visible_segment_ids(1000.0, 500.0), vec![0]);
        }
    }

    #[test]
    fn test_for_viewport_uses_one_and_a_half_widths() {
        let mut manager = SegmentManager::for_viewport(800.0);
        assert_eq!(manager.segment_width(), 1200.0);
        manager.resize(1000.0);
        assert_eq!(manager.segment_width(), 1500.0);
        manager.resize(0.0);
        assert_eq!(manager.segment_width(), MIN_SEGMENT_WIDTH);
        manager.resize(f64::NAN);
        assert_eq!(manager.segment_width(), MIN_SEGMENT_WIDTH);
    }

    #[test]
    fn test_visible_ids_saturate_at_extreme_scroll() {
        let manager = SegmentManager::new(1500.0);
        let far_right = manager.visible_segment_ids(1000.0, 1e300);
        assert_eq!(far_right.last(), Some(&SegmentId::MAX));
        assert!(far_right.contains(&manager.segment_id(1e300)));

        let far_left = manager.visible_segment_ids(1000.0, -1e300);
        assert_eq!(far_left.first(), Some(&SegmentId::MIN));
    }

    #[test]
    fn test_zero_width_viewport_keeps_residents() {
        let manager = SegmentManager::new(1500.0);
        let mut segments = BTreeMap::new();
        manager.reconcile(&mut segments, 1000.0, 5000.0);
        let before: Vec<SegmentId> = segments.keys().copied().collect();

        let collapsed = SegmentManager::for_viewport(0.0);
        assert!(collapsed.reconcile(&mut segments, 0.0, 5000.0).is_empty());
        assert_eq!(segments.keys().copied().collect::<Vec<_>>(), before);
    }

    #[test]
    fn test_visible_ids_include_anchor_and_margin() {
        let manager = SegmentManager::new(300.0);
        assert_eq!(manager.visible_segment_ids(1000.0, 0.0), vec![-1, 0, 1, 2, 3, 4]);
        assert_eq!(manager.visible_segment_ids(1000.0, 500.0), vec![0, 1, 2, 3, 4, 5, 6]);

        for scroll in [-1234.5, 0.0, 42.0, 99999.0] {
            let ids = manager.visible_segment_ids(0.0, scroll);
            assert!(ids.contains(&manager.segment_id(scroll)));
        }
    }

    #[test]
    fn test_reconcile_after_pan_evicts_out_of_range() {
        let manager = SegmentManager::new(300.0);
        let mut segments = BTreeMap::new();
        manager.reconcile(&mut segments, 1000.0, 0.0);
        assert_eq!(segments.keys().copied().collect::<Vec<_>>(), vec![-1, 0, 1, 2, 3, 4]);

        let evicted = manager.reconcile(&mut segments, 1000.0, 500.0);
        assert_eq!(evicted, vec![-1]);
        let resident: Vec<SegmentId> = segments.keys().copied().collect();
        assert_eq!(resident, vec![0, 1, 2, 3, 4, 5, 6]);
        assert!(resident.iter().all(|id| (0..=6).contains(id)));
    }

    #[test]
    fn test_reconcile_discards_strokes_of_evicted_segments() {
        let manager = SegmentManager::new(100.0);
        let mut segments = BTreeMap::new();
        let mut far = Segment::new(50);
        far.strokes.push(Stroke::begin(Point::new(5000.0, 0.0), 0.0, Color::BLACK, 2.0));
        segments.insert(50, far);

        let evicted = manager.reconcile(&mut segments, 200.0, 0.0);
        assert_eq!(evicted, vec![50]);
        assert!(!segments.contains_key(&50));
    }

    #[test]
    fn test_remove_stroke_by_id() {
        let mut segment = Segment::new(0);
        let a = Stroke::begin(Point::ZERO, 0.0, Color::BLACK, 2.0);
        let b = Stroke::begin(Point::new(1.0, 1.0), 0.0, Color::BLACK, 2.0);
        let b_id = b.id;
        segment.strokes.push(a);
        segment.strokes.push(b);

        assert_eq!(segment.position_of(b_id), Some(1));
        assert!(segment.remove_stroke(b_id).is_some());
        assert!(segment.remove_stroke(b_id).is_none());
        assert_eq!(segment.strokes.len(), 1);
    }
}
