//! Canvas controller
//!
//! Owns the canvas state and turns host events (pointer, pan, frame ticks,
//! lifecycle) into stroke capture, scrolling and persistence. All calls are
//! expected on one thread; only the background save leaves it.

use crate::autosave::AutosaveScheduler;
use crate::config::{self, AutoScrollMode, AutosaveMode, CanvasConfig};
use crate::error::{CanvasError, StoreError};
use crate::export::{self, ExportOptions, ExportView, ExportedFile};
use crate::noise::{NoiseCache, NOISE_TILE_SIZE};
use crate::renderer::{CoordinateTransform, StrokeRenderer, Surface};
use crate::segments::{Segment, SegmentId, SegmentManager};
use crate::session::{self, StoredSession};
use crate::store::PersistenceStore;
use crate::{Color, Point, Stroke, StrokeId};
use chrono::{DateTime, Local};
use image::RgbaImage;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Pan momentum decay per 1/60 s.
pub const DECELERATION_RATE: f64 = 0.92;
/// Momentum stops below this speed (units/sec).
pub const VELOCITY_STOP_THRESHOLD: f64 = 4.0;

/// One frame of the host's clock, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    pub now: f64,
    pub dt: f64,
}

impl FrameTick {
    pub const DEFAULT_DT: f64 = 1.0 / 60.0;

    pub fn new(now: f64, dt: f64) -> Self {
        Self { now, dt }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
    Warning,
    Info,
}

/// Transient user-facing messages.
pub trait NotificationSink {
    fn notify(&mut self, message: &str, kind: ToastKind);
}

/// Receives exported files for sharing or saving.
pub trait ShareSink {
    fn share(&mut self, file: ExportedFile);
}

/// Forwards notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&mut self, message: &str, kind: ToastKind) {
        match kind {
            ToastKind::Error => log::error!("{}", message),
            ToastKind::Warning => log::warn!("{}", message),
            ToastKind::Success | ToastKind::Info => log::info!("{}", message),
        }
    }
}

/// Drops exports.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardShare;

impl ShareSink for DiscardShare {
    fn share(&mut self, file: ExportedFile) {
        log::debug!("discarding export {}", file.file_name);
    }
}

/// Counters for the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Telemetry {
    pub stroke_count: usize,
    pub point_count: usize,
    pub pan_distance: f64,
}

impl Telemetry {
    fn record_stroke(&mut self, points: usize) {
        self.stroke_count += 1;
        self.point_count += points;
    }

    fn record_pan(&mut self, delta_x: f64) {
        self.pan_distance += delta_x.abs();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UndoEntry {
    segment_id: SegmentId,
    stroke_id: StrokeId,
}

#[derive(Debug)]
struct InProgress {
    stroke: Stroke,
    segment_id: SegmentId,
    /// Last touch in viewport coordinates; auto-scroll re-projects it.
    last_touch: Point,
}

pub struct CanvasController {
    config: CanvasConfig,
    manager: SegmentManager,
    segments: BTreeMap<SegmentId, Segment>,
    viewport: (f64, f64),
    content_offset: Point,
    current: Option<InProgress>,
    undo: Vec<UndoEntry>,
    menu_visible: bool,
    eraser: bool,
    pen_color: Color,
    line_width: f64,
    palette_index: usize,
    pro: bool,
    velocity: Option<f64>,
    autosave: AutosaveScheduler,
    noise: NoiseCache,
    dark_mode: bool,
    telemetry: Telemetry,
    renderer: StrokeRenderer,
    store: Arc<dyn PersistenceStore>,
    notifier: Box<dyn NotificationSink>,
    share: Box<dyn ShareSink>,
}

impl std::fmt::Debug for CanvasController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasController")
            .field("viewport", &self.viewport)
            .field("content_offset", &self.content_offset)
            .field("segments", &self.segments.len())
            .field("capturing", &self.current.is_some())
            .field("undo", &self.undo.len())
            .finish_non_exhaustive()
    }
}

impl CanvasController {
    pub fn new(
        config: CanvasConfig,
        store: Arc<dyn PersistenceStore>,
        notifier: Box<dyn NotificationSink>,
        share: Box<dyn ShareSink>,
    ) -> Self {
        let pen_color = config::PRIMARY_PALETTE
            .get(config.base_color_index)
            .copied()
            .unwrap_or(config::GRAPHITE);
        Self {
            manager: SegmentManager::new(0.0),
            segments: BTreeMap::new(),
            viewport: (0.0, 0.0),
            content_offset: Point::ZERO,
            current: None,
            undo: Vec::new(),
            menu_visible: false,
            eraser: false,
            pen_color,
            line_width: config.base_line_width,
            palette_index: 0,
            pro: false,
            velocity: None,
            autosave: AutosaveScheduler::new(config.autosave_mode),
            noise: NoiseCache::new(NOISE_TILE_SIZE, config.background_color, false),
            dark_mode: false,
            telemetry: Telemetry::default(),
            renderer: StrokeRenderer::new(),
            store,
            notifier,
            share,
            config,
        }
    }

    // ---- viewport & segments ----

    /// Resize the viewport. Segment width follows the new width.
    pub fn set_viewport(&mut self, width: f64, height: f64) {
        self.viewport = (width.max(0.0), height.max(0.0));
        self.manager.resize(self.viewport.0);
        self.reconcile();
    }

    pub fn viewport(&self) -> (f64, f64) {
        self.viewport
    }

    pub fn segment_manager(&self) -> &SegmentManager {
        &self.manager
    }

    pub fn segment_id(&self, world_x: f64) -> SegmentId {
        self.manager.segment_id(world_x)
    }

    pub fn visible_segment_ids(&self) -> Vec<SegmentId> {
        self.manager
            .visible_segment_ids(self.viewport.0, self.content_offset.x)
    }

    pub fn segments(&self) -> &BTreeMap<SegmentId, Segment> {
        &self.segments
    }

    pub fn resident_segment_ids(&self) -> Vec<SegmentId> {
        self.segments.keys().copied().collect()
    }

    pub fn stroke_count(&self) -> usize {
        self.segments.values().map(|s| s.strokes.len()).sum()
    }

    pub fn content_offset(&self) -> Point {
        self.content_offset
    }

    fn reconcile(&mut self) {
        let evicted =
            self.manager
                .reconcile(&mut self.segments, self.viewport.0, self.content_offset.x);
        if !evicted.is_empty() {
            let before = self.undo.len();
            self.undo.retain(|entry| !evicted.contains(&entry.segment_id));
            if self.undo.len() != before {
                log::debug!("dropped {} undo entries with evicted segments", before - self.undo.len());
            }
        }
    }

    // ---- stroke capture ----

    pub fn is_capturing(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_stroke(&self) -> Option<&Stroke> {
        self.current.as_ref().map(|c| &c.stroke)
    }

    /// Segment the in-progress stroke will be committed to.
    pub fn current_segment_id(&self) -> Option<SegmentId> {
        self.current.as_ref().map(|c| c.segment_id)
    }

    /// Start a stroke at a world point. Ignored while a stroke is already in
    /// progress or the menu is open.
    pub fn begin_stroke(&mut self, world_point: Point, time: f64, color: Color, width: f64) -> bool {
        if self.current.is_some() || self.menu_visible {
            return false;
        }
        self.stop_deceleration();
        let segment_id = self.manager.segment_id(world_point.x);
        self.current = Some(InProgress {
            stroke: Stroke::begin(world_point, time, color, width),
            segment_id,
            last_touch: world_point - self.content_offset,
        });
        true
    }

    pub fn extend_stroke(&mut self, world_point: Point, time: f64) {
        let offset = self.content_offset;
        if let Some(current) = self.current.as_mut() {
            current.stroke.push(world_point, time);
            current.last_touch = world_point - offset;
        }
    }

    /// Move the in-progress stroke into its segment and make it undoable.
    ///
    /// A stroke with fewer than two points is dropped instead.
    pub fn commit_stroke(&mut self) -> Option<StrokeId> {
        let InProgress {
            stroke, segment_id, ..
        } = self.current.take()?;
        if stroke.is_degenerate() {
            log::debug!("dropped degenerate stroke {}", stroke.id);
            return None;
        }

        let stroke_id = stroke.id;
        self.telemetry.record_stroke(stroke.points.len());
        log::debug!(
            "committed stroke {} ({} points) to segment {}",
            stroke_id,
            stroke.points.len(),
            segment_id
        );
        self.segments
            .entry(segment_id)
            .or_insert_with(|| Segment::new(segment_id))
            .strokes
            .push(stroke);
        self.undo.push(UndoEntry {
            segment_id,
            stroke_id,
        });
        self.autosave.mark_dirty();
        Some(stroke_id)
    }

    pub fn discard_stroke(&mut self) {
        if let Some(current) = self.current.take() {
            log::debug!("discarded stroke {}", current.stroke.id);
        }
    }

    /// Pen color and width a new stroke would get right now.
    pub fn current_pen(&self) -> (Color, f64) {
        let color = if self.eraser {
            self.config.background_color
        } else {
            self.pen_color
        };
        (color, self.line_width)
    }

    /// Pointer down at a viewport position.
    pub fn pointer_down(&mut self, view_point: Point, time: f64) -> bool {
        let (color, width) = self.current_pen();
        self.begin_stroke(view_point + self.content_offset, time, color, width)
    }

    pub fn pointer_move(&mut self, view_point: Point, time: f64) {
        self.extend_stroke(view_point + self.content_offset, time);
    }

    pub fn pointer_up(&mut self) -> Option<StrokeId> {
        self.commit_stroke()
    }

    pub fn pointer_cancel(&mut self) {
        self.discard_stroke();
    }

    // ---- scrolling ----

    /// Scroll by a pan translation; dragging right moves the content right.
    pub fn pan(&mut self, delta_x: f64) {
        if !delta_x.is_finite() {
            return;
        }
        self.content_offset.x -= delta_x;
        self.telemetry.record_pan(delta_x);
        self.reconcile();
    }

    /// A pan gesture started: any momentum stops.
    pub fn begin_pan(&mut self) {
        self.stop_deceleration();
    }

    /// A pan gesture ended with `velocity_x` (units/sec): momentum starts.
    pub fn end_pan(&mut self, velocity_x: f64) {
        if velocity_x.is_finite() {
            self.velocity = Some(velocity_x);
        }
    }

    pub fn is_decelerating(&self) -> bool {
        self.velocity.is_some()
    }

    pub fn velocity(&self) -> f64 {
        self.velocity.unwrap_or(0.0)
    }

    fn stop_deceleration(&mut self) {
        self.velocity = None;
    }

    /// Advance momentum scrolling by `dt` seconds. Returns whether momentum
    /// is still running.
    pub fn decelerate(&mut self, dt: f64) -> bool {
        let Some(velocity) = self.velocity else {
            return false;
        };
        if velocity.abs() < VELOCITY_STOP_THRESHOLD {
            self.stop_deceleration();
            return false;
        }
        self.content_offset.x -= velocity * dt;
        self.telemetry.record_pan(velocity * dt);
        self.velocity = Some(velocity * DECELERATION_RATE.powf(dt * 60.0));
        self.reconcile();
        true
    }

    /// Scroll under a stroke in progress and extend it at the last touch.
    /// Returns whether the canvas moved.
    pub fn auto_scroll(&mut self, tick: FrameTick) -> bool {
        let Some(current) = self.current.as_ref() else {
            return false;
        };
        let active = match self.config.auto_scroll {
            AutoScrollMode::Off => false,
            AutoScrollMode::Continuous => true,
            AutoScrollMode::Edge { zone } => current.last_touch.x >= self.viewport.0 - zone,
        };
        if !active {
            return false;
        }

        self.content_offset.x += self.config.auto_scroll_speed * tick.dt;
        let world = current.last_touch + self.content_offset;
        if let Some(current) = self.current.as_mut() {
            current.stroke.push(world, tick.now);
        }
        self.reconcile();
        true
    }

    /// Drive all frame-based behavior: momentum, auto-scroll and the
    /// periodic save.
    ///
    /// Returns whether a periodic save was written on this frame. A failed
    /// save comes back as the error; scrolling has already advanced.
    pub fn tick(&mut self, tick: FrameTick) -> Result<bool, CanvasError> {
        self.decelerate(tick.dt);
        self.auto_scroll(tick);
        if !self.autosave.poll(tick.now) {
            return Ok(false);
        }
        self.persist().map(|()| true)
    }

    // ---- editing ----

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    /// Remove the most recent stroke. Its segment goes too if it ends up
    /// empty. Returns false when there is nothing to undo.
    pub fn undo_last(&mut self) -> bool {
        let Some(entry) = self.undo.pop() else {
            return false;
        };
        let Some(segment) = self.segments.get_mut(&entry.segment_id) else {
            log::warn!("undo entry for missing segment {}", entry.segment_id);
            return false;
        };
        if segment.remove_stroke(entry.stroke_id).is_none() {
            log::warn!("undo entry for missing stroke {}", entry.stroke_id);
            return false;
        }
        if segment.is_empty() {
            self.segments.remove(&entry.segment_id);
        }
        log::debug!("undid stroke {} in segment {}", entry.stroke_id, entry.segment_id);
        self.autosave.mark_dirty();
        true
    }

    /// Drop every stroke and delete the saved session.
    pub fn clear_all(&mut self) -> Result<(), CanvasError> {
        self.segments.clear();
        self.undo.clear();
        self.current = None;
        self.reconcile();
        self.autosave.mark_clean();
        log::info!("canvas cleared");
        if let Err(err) = self.store.delete() {
            self.notifier.notify("Could not delete saved session", ToastKind::Error);
            return Err(err.into());
        }
        Ok(())
    }

    // ---- pen settings ----

    pub fn config(&self) -> &CanvasConfig {
        &self.config
    }

    pub fn set_menu_visible(&mut self, visible: bool) {
        self.menu_visible = visible;
    }

    pub fn is_menu_visible(&self) -> bool {
        self.menu_visible
    }

    pub fn set_eraser(&mut self, eraser: bool) {
        self.eraser = eraser;
    }

    pub fn is_eraser(&self) -> bool {
        self.eraser
    }

    pub fn line_width(&self) -> f64 {
        self.line_width
    }

    pub fn set_base_line_width(&mut self, width: f64) {
        if width.is_finite() && width > 0.0 {
            self.line_width = width;
            self.config.base_line_width = width;
        }
    }

    pub fn cycle_line_width(&mut self) -> f64 {
        self.line_width = config::next_line_width(self.line_width);
        self.line_width
    }

    pub fn pen_color(&self) -> Color {
        self.pen_color
    }

    pub fn set_pen_color(&mut self, color: Color) {
        self.pen_color = color;
    }

    /// Pick the pen color from the active palette.
    pub fn select_color(&mut self, index: usize) -> bool {
        match config::palette(self.palette_index).get(index) {
            Some(color) => {
                self.pen_color = *color;
                true
            }
            None => false,
        }
    }

    /// Host-reported "pro" capability; losing it falls back to the primary
    /// palette.
    pub fn set_pro(&mut self, pro: bool) {
        self.pro = pro;
        if !pro && self.palette_index != 0 {
            self.palette_index = 0;
        }
    }

    pub fn palette_index(&self) -> usize {
        self.palette_index
    }

    /// Switch palettes. Only the primary palette is available without pro.
    pub fn select_palette(&mut self, index: usize) -> bool {
        if index != 0 && !self.pro {
            return false;
        }
        if index != self.palette_index {
            let message = if index == 0 {
                "Original colors restored"
            } else {
                "New colors unlocked"
            };
            self.notifier.notify(message, ToastKind::Info);
        }
        self.palette_index = index;
        true
    }

    pub fn set_autosave_mode(&mut self, mode: AutosaveMode, now: f64) {
        self.config.autosave_mode = mode;
        self.autosave.set_mode(mode);
        self.autosave.resume(now);
    }

    pub fn set_autoload_on_launch(&mut self, autoload: bool) {
        self.config.autoload_on_launch = autoload;
    }

    pub fn set_auto_scroll(&mut self, mode: AutoScrollMode) {
        self.config.auto_scroll = mode;
    }

    pub fn set_export_options(&mut self, options: ExportOptions) {
        self.config.export = options;
    }

    pub fn telemetry(&self) -> Telemetry {
        self.telemetry
    }

    // ---- background texture ----

    pub fn set_theme(&mut self, background: Color, dark_mode: bool) {
        self.config.background_color = background;
        self.dark_mode = dark_mode;
        self.noise.set_theme(background, dark_mode);
    }

    pub fn is_dark_mode(&self) -> bool {
        self.dark_mode
    }

    pub fn invalidate_noise(&mut self) {
        self.noise.invalidate();
    }

    pub fn noise_tile(&mut self) -> &RgbaImage {
        self.noise.tile()
    }

    // ---- rendering ----

    /// Draw the visible segments and the stroke in progress in viewport
    /// coordinates. Returns the number of line segments drawn.
    pub fn render_viewport<S: Surface + ?Sized>(&self, surface: &mut S) -> usize {
        let transform = CoordinateTransform::ViewRelative {
            offset: self.content_offset,
        };
        let ids = self.visible_segment_ids();
        self.renderer
            .render_all(visible_strokes(&self.segments, &ids, self.current_stroke()), surface, transform)
    }

    /// Draw the same strokes in world coordinates.
    pub fn render_world<S: Surface + ?Sized>(&self, surface: &mut S) -> usize {
        let ids = self.visible_segment_ids();
        self.renderer.render_all(
            visible_strokes(&self.segments, &ids, self.current_stroke()),
            surface,
            CoordinateTransform::World,
        )
    }

    /// Export the visible window with the configured options and hand the
    /// file to the share sink.
    pub fn export(&mut self, now: DateTime<Local>) -> Result<(), CanvasError> {
        let options = self.config.export.clone();
        let view = ExportView {
            width: self.viewport.0,
            height: self.viewport.1,
            offset: self.content_offset,
        };
        let ids = self
            .manager
            .visible_segment_ids(self.viewport.0, self.content_offset.x);
        let current = self.current.as_ref().map(|c| &c.stroke);
        let tile = if options.include_noise {
            Some(self.noise.tile())
        } else {
            None
        };
        let result = export::export(
            visible_strokes(&self.segments, &ids, current),
            view,
            self.config.background_color,
            tile,
            &options,
            now,
        );

        match result {
            Ok(file) => {
                let message = format!("{} exported", file.format.label());
                self.share.share(file);
                self.notifier.notify(&message, ToastKind::Success);
                Ok(())
            }
            Err(err) => {
                log::error!("export failed: {}", err);
                self.notifier.notify("Export failed", ToastKind::Error);
                Err(err.into())
            }
        }
    }

    // ---- persistence ----

    /// Snapshot of the resident canvas as a storable session.
    pub fn snapshot(&self) -> StoredSession {
        StoredSession::capture(
            self.segments.values(),
            self.content_offset,
            session::now_timestamp(),
        )
    }

    /// Encode and write the session now.
    pub fn persist(&mut self) -> Result<(), CanvasError> {
        let revision = self.autosave.revision();
        let result = session::encode(&self.snapshot())
            .map_err(CanvasError::from)
            .and_then(|bytes| self.store.save(&bytes).map_err(CanvasError::from));
        match result {
            Ok(()) => {
                self.autosave.mark_saved(revision);
                Ok(())
            }
            Err(err) => {
                log::error!("session save failed: {}", err);
                self.notifier.notify("Could not save session", ToastKind::Error);
                Err(err)
            }
        }
    }

    /// Write only if something changed since the last successful save.
    pub fn persist_if_dirty(&mut self) -> Result<bool, CanvasError> {
        if !self.autosave.is_dirty() {
            return Ok(false);
        }
        self.persist().map(|()| true)
    }

    /// Encode now and write on tokio's blocking pool.
    ///
    /// Must be called from within a tokio runtime. The write result comes
    /// back through the handle and is not retried.
    pub fn persist_in_background(
        &mut self,
    ) -> Result<tokio::task::JoinHandle<Result<(), StoreError>>, CanvasError> {
        let bytes = session::encode(&self.snapshot())?;
        let store = Arc::clone(&self.store);
        Ok(tokio::task::spawn_blocking(move || store.save(&bytes)))
    }

    /// Replace the canvas with the saved session.
    ///
    /// Returns the number of strokes restored, or `None` when nothing was
    /// saved. On failure the current canvas is left untouched.
    pub fn restore(&mut self) -> Result<Option<usize>, CanvasError> {
        let bytes = match self.store.load() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(None),
            Err(err) => {
                log::warn!("session load failed: {}", err);
                return Err(err.into());
            }
        };
        let stored = match session::decode(&bytes) {
            Ok(stored) => stored,
            Err(err) => {
                log::warn!("ignoring unreadable session: {}", err);
                return Err(err.into());
            }
        };

        let count = stored.stroke_count();
        self.content_offset = stored.content_offset;
        self.segments = stored.into_segments();
        self.undo.clear();
        self.current = None;
        self.stop_deceleration();
        self.reconcile();
        self.autosave.mark_clean();
        log::info!("restored session with {} strokes", count);
        Ok(Some(count))
    }

    /// App start: restore if configured and arm the periodic timer.
    pub fn launch(&mut self, now: f64) {
        if self.config.autoload_on_launch {
            if let Err(err) = self.restore() {
                log::warn!("starting with an empty canvas: {}", err);
            }
        }
        self.autosave.resume(now);
    }

    /// App is leaving the foreground: save if needed and pause the timer.
    pub fn enter_background(&mut self) -> Result<bool, CanvasError> {
        if !self.autosave.on_background() {
            return Ok(false);
        }
        self.persist().map(|()| true)
    }

    pub fn enter_foreground(&mut self, now: f64) {
        self.autosave.resume(now);
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.autosave.is_dirty()
    }
}

/// Strokes of the given segments in id order, then the stroke in progress.
fn visible_strokes<'a>(
    segments: &'a BTreeMap<SegmentId, Segment>,
    ids: &[SegmentId],
    current: Option<&'a Stroke>,
) -> Vec<&'a Stroke> {
    ids.iter()
        .filter_map(|id| segments.get(id))
        .flat_map(|segment| segment.strokes.iter())
        .chain(current)
        .collect()
}
