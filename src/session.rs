//! Session codec
//!
//! The durable form of a canvas: resident segments, their strokes, the
//! scroll offset and a save timestamp, as a JSON document.

use crate::error::SessionError;
use crate::segments::{Segment, SegmentId};
use crate::{Color, Point, Stroke, StrokeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// File name of the single session slot.
pub const SESSION_FILE_NAME: &str = "session.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub segments: Vec<StoredSegment>,
    pub content_offset: Point,
    /// Seconds since the Unix epoch.
    pub saved_at: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSegment {
    #[serde(alias = "segmentId")]
    pub id: SegmentId,
    pub strokes: Vec<StoredStroke>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredStroke {
    pub points: Vec<Point>,
    /// Absent in sessions written before speed-based widths existed.
    #[serde(default)]
    pub times: Vec<f64>,
    pub color: Color,
    pub line_width: f64,
}

impl From<&Stroke> for StoredStroke {
    fn from(stroke: &Stroke) -> Self {
        Self {
            points: stroke.points.clone(),
            times: stroke.times.clone(),
            color: stroke.color,
            line_width: stroke.line_width,
        }
    }
}

impl From<StoredStroke> for Stroke {
    fn from(stored: StoredStroke) -> Self {
        Stroke {
            id: StrokeId::new(),
            points: stored.points,
            times: stored.times,
            color: stored.color,
            line_width: stored.line_width,
        }
    }
}

impl StoredSession {
    /// Snapshot resident segments. Degenerate strokes are left out.
    pub fn capture<'a, I>(segments: I, content_offset: Point, saved_at: f64) -> Self
    where
        I: IntoIterator<Item = &'a Segment>,
    {
        let segments = segments
            .into_iter()
            .map(|segment| StoredSegment {
                id: segment.id,
                strokes: segment
                    .strokes
                    .iter()
                    .filter(|stroke| !stroke.is_degenerate())
                    .map(StoredStroke::from)
                    .collect(),
            })
            .collect();
        Self {
            segments,
            content_offset,
            saved_at,
        }
    }

    /// Rebuild the in-memory segment map. Later duplicates of an id win.
    pub fn into_segments(self) -> BTreeMap<SegmentId, Segment> {
        self.segments
            .into_iter()
            .map(|stored| {
                let segment = Segment {
                    id: stored.id,
                    strokes: stored.strokes.into_iter().map(Stroke::from).collect(),
                };
                (stored.id, segment)
            })
            .collect()
    }

    pub fn stroke_count(&self) -> usize {
        self.segments.iter().map(|s| s.strokes.len()).sum()
    }

    fn validate(&self) -> Result<(), SessionError> {
        for segment in &self.segments {
            for (index, stroke) in segment.strokes.iter().enumerate() {
                if !stroke.times.is_empty() && stroke.times.len() != stroke.points.len() {
                    return Err(SessionError::Invalid(format!(
                        "segment {} stroke {}: {} points but {} times",
                        segment.id,
                        index,
                        stroke.points.len(),
                        stroke.times.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Serialize a session to JSON bytes.
pub fn encode(session: &StoredSession) -> Result<Vec<u8>, SessionError> {
    serde_json::to_vec(session).map_err(SessionError::Encode)
}

/// Parse JSON bytes into a session. Either the whole document is accepted
/// or an error is returned.
pub fn decode(bytes: &[u8]) -> Result<StoredSession, SessionError> {
    let session: StoredSession = serde_json::from_slice(bytes).map_err(SessionError::Decode)?;
    session.validate()?;
    Ok(session)
}

/// Current time as seconds since the Unix epoch.
pub fn now_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1e6
}
