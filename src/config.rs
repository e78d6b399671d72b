//! Canvas configuration
//!
//! Host-persisted options handed to the controller at construction and
//! changed only through explicit setters.

use crate::export::ExportOptions;
use crate::Color;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// When the session is written to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutosaveMode {
    /// Only when the app goes to the background.
    #[default]
    OnBackground,
    /// Also every [`crate::autosave::PERIODIC_SAVE_INTERVAL`] seconds.
    Periodic,
}

/// When the canvas scrolls under a stroke in progress.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum AutoScrollMode {
    Off,
    /// Every frame while drawing.
    #[default]
    Continuous,
    /// Only while the last touch is within `zone` units of the right edge.
    Edge { zone: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub autosave_mode: AutosaveMode,
    pub autoload_on_launch: bool,
    pub base_line_width: f64,
    pub base_color_index: usize,
    pub auto_scroll: AutoScrollMode,
    /// Units per second.
    pub auto_scroll_speed: f64,
    pub background_color: Color,
    pub export: ExportOptions,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            autosave_mode: AutosaveMode::OnBackground,
            autoload_on_launch: true,
            base_line_width: DEFAULT_LINE_WIDTH,
            base_color_index: 0,
            auto_scroll: AutoScrollMode::Continuous,
            auto_scroll_speed: 90.0,
            background_color: PAPER,
            export: ExportOptions::default(),
        }
    }
}

impl CanvasConfig {
    /// Read a JSON config file; absent fields take their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read canvas config {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("deserialize canvas config {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self).context("serialize canvas config")?;
        std::fs::write(path, json)
            .with_context(|| format!("write canvas config {}", path.display()))
    }
}

pub const DEFAULT_LINE_WIDTH: f64 = 2.2;

/// Canvas background tone.
pub const PAPER: Color = Color::rgba(248.0 / 255.0, 248.0 / 255.0, 248.0 / 255.0, 1.0);

pub const GRAPHITE: Color = Color::rgba(0.18, 0.18, 0.18, 0.9);

pub const PRIMARY_PALETTE: [Color; 6] = [
    GRAPHITE,
    Color::rgba(0.12, 0.9, 0.98, 0.95),  // neon cyan
    Color::rgba(1.0, 0.35, 0.78, 0.95),  // neon pink
    Color::rgba(0.72, 0.45, 1.0, 0.95),  // neon violet
    Color::rgba(0.98, 0.42, 0.12, 0.95), // neon orange
    Color::rgba(0.22, 1.0, 0.85, 0.95),  // neon mint
];

/// Unlocked by the "pro" capability.
pub const PASTEL_PALETTE: [Color; 6] = [
    Color::rgba(0.65, 0.77, 0.95, 0.95), // pastel blue
    Color::rgba(0.96, 0.73, 0.82, 0.95), // pastel pink
    Color::rgba(0.96, 0.85, 0.66, 0.95), // pastel peach
    Color::rgba(0.73, 0.9, 0.77, 0.95),  // pastel mint
    Color::rgba(0.84, 0.78, 0.93, 0.95), // pastel lavender
    Color::rgba(0.88, 0.92, 0.98, 0.95), // pastel ice
];

/// Palette by index: 0 is primary, anything else the pastel set.
pub fn palette(index: usize) -> &'static [Color; 6] {
    if index == 0 {
        &PRIMARY_PALETTE
    } else {
        &PASTEL_PALETTE
    }
}

/// Next width in the 2.2 -> 4.2 -> 6.2 -> 2.2 cycle.
pub fn next_line_width(current: f64) -> f64 {
    if current < 3.0 {
        4.2
    } else if current < 5.0 {
        6.2
    } else {
        DEFAULT_LINE_WIDTH
    }
}
