//! Autosave scheduling
//!
//! Decides when the controller should write the session. Time comes from
//! the frame clock the host feeds in, never from a wall-clock timer, and
//! writes are skipped when nothing changed since the last successful save.

use crate::config::AutosaveMode;

/// Seconds between periodic saves.
pub const PERIODIC_SAVE_INTERVAL: f64 = 60.0;

#[derive(Debug, Clone)]
pub struct AutosaveScheduler {
    mode: AutosaveMode,
    interval: f64,
    /// Clock time the periodic timer was (re)armed; `None` while paused.
    armed_at: Option<f64>,
    revision: u64,
    saved_revision: u64,
}

impl AutosaveScheduler {
    pub fn new(mode: AutosaveMode) -> Self {
        Self {
            mode,
            interval: PERIODIC_SAVE_INTERVAL,
            armed_at: None,
            revision: 0,
            saved_revision: 0,
        }
    }

    pub fn mode(&self) -> AutosaveMode {
        self.mode
    }

    /// Switch modes. The periodic timer stops until the next [`Self::resume`].
    pub fn set_mode(&mut self, mode: AutosaveMode) {
        if self.mode != mode {
            self.mode = mode;
            self.armed_at = None;
        }
    }

    /// Record a change that a save should capture.
    pub fn mark_dirty(&mut self) {
        self.revision += 1;
    }

    pub fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }

    /// Revision a snapshot taken now would carry.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// A save of `revision` reached storage.
    pub fn mark_saved(&mut self, revision: u64) {
        self.saved_revision = self.saved_revision.max(revision);
    }

    /// Treat the current state as persisted (fresh restore, clear).
    pub fn mark_clean(&mut self) {
        self.saved_revision = self.revision;
    }

    /// Arm the periodic timer at `now` when in periodic mode.
    pub fn resume(&mut self, now: f64) {
        self.armed_at = match self.mode {
            AutosaveMode::Periodic => Some(now),
            AutosaveMode::OnBackground => None,
        };
    }

    pub fn pause(&mut self) {
        self.armed_at = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    /// Whether a periodic save is due at `now`. Re-arms the timer when it
    /// fires, even if the save is then skipped as clean.
    pub fn poll(&mut self, now: f64) -> bool {
        let Some(armed_at) = self.armed_at else {
            return false;
        };
        if now - armed_at < self.interval {
            return false;
        }
        self.armed_at = Some(now);
        self.is_dirty()
    }

    /// Whether going to the background should write.
    pub fn on_background(&mut self) -> bool {
        self.pause();
        self.is_dirty()
    }
}
