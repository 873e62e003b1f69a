//! Capture analysis: pcap/pcapng reading, 802.11 decoding, frame lookup.

pub mod dot11;
pub mod extractor;
pub mod filter;
pub mod pcap;

pub use extractor::{CaptureIndex, FrameQuery, FrameStatus, RoamFrames, find_frame, roam_time_ms};
pub use filter::{AddressMatch, AnchorKind, FrameFilter, FrameFilterSet};
pub use pcap::{CaptureFile, CapturedFrame, read_capture};

/// Capture file name for one roam iteration: `roam_{class}_{mode}_iteration_{n}_{stamp}.pcap`.
#[must_use]
pub fn iteration_capture_name(
    class: crate::model::StationCapabilityClass,
    mode: crate::model::RoamMode,
    iteration: u32,
    stamp: &str,
) -> String {
    format!(
        "roam_{}_{}_iteration_{iteration}_{stamp}.pcap",
        class.as_str().replace('-', "_"),
        mode.tag()
    )
}
