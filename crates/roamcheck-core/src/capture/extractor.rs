//! Locating roam anchor frames in a capture and timing the transition.

use std::path::Path;

use serde::Serialize;
use tracing::debug;

use super::dot11::MgmtFrame;
use super::filter::{AnchorKind, FrameFilter, FrameFilterSet};
use super::pcap::{CaptureFile, read_capture};
use crate::error::CaptureError;

/// Outcome of looking for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameStatus {
    /// Found, and its status code (if any) is 0.
    Successful,
    /// Found, with a non-zero status code.
    Failed,
    /// No matching frame.
    Empty,
}

/// First frame matching a filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameQuery {
    pub present: bool,
    pub status: FrameStatus,
    /// Seconds since the first record of the capture.
    pub timestamp: Option<f64>,
}

impl FrameQuery {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            present: false,
            status: FrameStatus::Empty,
            timestamp: None,
        }
    }

    #[must_use]
    pub const fn found(status: FrameStatus, timestamp: f64) -> Self {
        Self {
            present: true,
            status,
            timestamp: Some(timestamp),
        }
    }
}

/// Both anchors of one station's roam.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoamFrames {
    /// Reassociation Response.
    pub end: FrameQuery,
    /// Authentication or FT Action, per [`Self::anchor_kind`].
    pub anchor: FrameQuery,
    #[serde(skip)]
    pub anchor_kind: AnchorKind,
}

impl RoamFrames {
    /// Elapsed time from anchor to reassociation, when both were seen.
    #[must_use]
    pub fn roam_time_ms(&self) -> Option<f64> {
        roam_time_ms(&self.anchor, &self.end)
    }
}

/// `(end - anchor) * 1000`, or `None` when either frame is missing.
#[must_use]
pub fn roam_time_ms(anchor: &FrameQuery, end: &FrameQuery) -> Option<f64> {
    Some((end.timestamp? - anchor.timestamp?) * 1000.0)
}

/// A capture loaded once and queried per station.
#[derive(Debug, Clone)]
pub struct CaptureIndex {
    capture: CaptureFile,
}

impl CaptureIndex {
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        Ok(Self {
            capture: read_capture(path)?,
        })
    }

    #[must_use]
    pub fn from_capture(capture: CaptureFile) -> Self {
        Self { capture }
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.capture.frames.len()
    }

    /// First frame matching `filter`, in capture order.
    #[must_use]
    pub fn find(&self, filter: &FrameFilter) -> FrameQuery {
        for captured in &self.capture.frames {
            let Some(frame) = MgmtFrame::parse(&captured.data) else {
                continue;
            };
            if !filter.matches(&frame) {
                continue;
            }
            let status = match frame.status_code() {
                Some(0) | None => FrameStatus::Successful,
                Some(_) => FrameStatus::Failed,
            };
            return FrameQuery::found(status, self.capture.relative_seconds(captured));
        }
        FrameQuery::empty()
    }

    #[must_use]
    pub fn roam_frames(&self, filters: &FrameFilterSet) -> RoamFrames {
        let frames = RoamFrames {
            end: self.find(&filters.end),
            anchor: self.find(&filters.anchor),
            anchor_kind: filters.anchor_kind,
        };
        debug!(
            end_filter = %filters.end.display_filter(),
            anchor_filter = %filters.anchor.display_filter(),
            end = ?frames.end.status,
            anchor = ?frames.anchor.status,
            "frame lookup"
        );
        frames
    }
}

/// Read `path` and return the first frame matching `filter`.
pub fn find_frame(path: &Path, filter: &FrameFilter) -> Result<FrameQuery, CaptureError> {
    Ok(CaptureIndex::open(path)?.find(filter))
}
