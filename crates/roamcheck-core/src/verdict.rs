//! PASS/FAIL scoring of one station's roam.
//!
//! Rules are checked in a fixed order and the first one that applies decides
//! the row:
//!
//! 1. herd not on one target AP, station stayed put, or landed on an unknown BSSID
//! 2. capture missing or unreadable
//! 3. an anchor frame absent (reassociation checked before auth/action)
//! 4. an anchor frame present with a failure status
//! 5. multicast runs: resumption decides
//! 6. reassociation earlier than the opening frame
//! 7. roam time against the threshold for the transition
//!
//! [`RoamVerdictEngine::evaluate`] is pure; the same observation always
//! yields the same row.

use std::path::PathBuf;

use crate::capture::{AnchorKind, FrameStatus, RoamFrames};
use crate::config::ThresholdConfig;
use crate::model::{
    Bssid, FtTransition, IterationResult, Remark, RoamTargets, StationEid, Verdict,
};
use crate::multicast::MulticastOutcome;

/// What the capture yielded for one station.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureEvidence {
    Frames(RoamFrames),
    /// The capture file was missing or could not be parsed.
    Unavailable,
}

/// Everything known about one station after one roam attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RoamObservation {
    pub iteration: u32,
    pub station: StationEid,
    pub before: Bssid,
    pub after: Bssid,
    /// Whether every station shared one of the two targets going into the
    /// iteration.
    pub herd_homogeneous: bool,
    pub transition: FtTransition,
    pub capture: CaptureEvidence,
    /// Set only on multicast runs.
    pub multicast: Option<MulticastOutcome>,
    pub capture_file: Option<PathBuf>,
    pub trace_file: Option<String>,
}

/// Scores observations against the run's two targets and timing thresholds.
#[derive(Debug, Clone)]
pub struct RoamVerdictEngine {
    targets: RoamTargets,
    thresholds: ThresholdConfig,
}

impl RoamVerdictEngine {
    #[must_use]
    pub const fn new(targets: RoamTargets, thresholds: ThresholdConfig) -> Self {
        Self {
            targets,
            thresholds,
        }
    }

    #[must_use]
    pub const fn threshold_for(&self, transition: FtTransition) -> Option<f64> {
        match transition {
            FtTransition::OverAir => self.thresholds.over_air_ms,
            FtTransition::OverDs => self.thresholds.over_ds_ms,
        }
    }

    /// Strictly below the threshold passes; no threshold always passes.
    #[must_use]
    pub fn evaluate_timing(&self, roam_time_ms: f64, transition: FtTransition) -> (Verdict, Remark) {
        match self.threshold_for(transition) {
            Some(limit) if roam_time_ms >= limit => (Verdict::Fail, Remark::RoamTimeExceeded),
            _ => (Verdict::Pass, Remark::PassedAllCriteria),
        }
    }

    #[must_use]
    pub fn evaluate(&self, obs: &RoamObservation) -> IterationResult {
        let (verdict, remark, roam_time_ms) = self.classify(obs);
        IterationResult {
            iteration_index: obs.iteration,
            station: obs.station.clone(),
            bssid_before: obs.before,
            bssid_after: obs.after,
            roam_time_ms,
            verdict,
            remark,
            capture_file: obs.capture_file.clone(),
            trace_file_ref: obs.trace_file.clone(),
        }
    }

    fn classify(&self, obs: &RoamObservation) -> (Verdict, Remark, Option<f64>) {
        let fail = |remark| (Verdict::Fail, remark, None);

        if !obs.herd_homogeneous || !self.targets.contains(&obs.before) {
            return fail(Remark::NotHomogeneous);
        }
        if obs.after == obs.before || !obs.after.is_associated() {
            return fail(Remark::StationDidNotRoam);
        }
        if !self.targets.contains(&obs.after) {
            return fail(Remark::BssidMismatch);
        }

        let frames = match obs.capture {
            CaptureEvidence::Frames(frames) => frames,
            CaptureEvidence::Unavailable => return fail(Remark::NoCaptureAvailable),
        };

        if frames.end.status == FrameStatus::Empty {
            return fail(Remark::NoReassociation);
        }
        if frames.anchor.status == FrameStatus::Empty {
            return fail(match frames.anchor_kind {
                AnchorKind::Authentication => Remark::NoAuthFrame,
                AnchorKind::Action => Remark::NoActionFrame,
            });
        }
        if frames.end.status == FrameStatus::Failed {
            return fail(Remark::ReassociationFailure);
        }
        if frames.anchor.status == FrameStatus::Failed {
            return fail(Remark::AuthFail);
        }

        if let Some(outcome) = obs.multicast {
            return match outcome {
                MulticastOutcome::ResumedImmediately => {
                    (Verdict::Pass, Remark::MulticastResumed, None)
                }
                MulticastOutcome::ResumedAfterRetry => {
                    (Verdict::Pass, Remark::MulticastResumedAfterRetry, None)
                }
                MulticastOutcome::NotResumed => fail(Remark::MulticastNotResumed),
            };
        }

        let Some(roam_time_ms) = frames.roam_time_ms() else {
            return fail(Remark::NoReassociation);
        };
        if roam_time_ms < 0.0 {
            return fail(Remark::FramesOutOfOrder);
        }
        let (verdict, remark) = self.evaluate_timing(roam_time_ms, obs.transition);
        (verdict, remark, Some(roam_time_ms))
    }
}

/// FAIL row for a station whose iteration could not be carried out.
#[must_use]
pub fn aborted_result(iteration: u32, station: StationEid, before: Bssid) -> IterationResult {
    IterationResult {
        iteration_index: iteration,
        station,
        bssid_before: before,
        bssid_after: Bssid::Unassociated,
        roam_time_ms: None,
        verdict: Verdict::Fail,
        remark: Remark::IterationAborted,
        capture_file: None,
        trace_file_ref: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FrameQuery;

    const A: &str = "68:7d:b4:5f:5c:3b";
    const B: &str = "14:16:9d:53:58:cb";

    fn frames_with_gap(anchor_kind: AnchorKind, start_s: f64, ms: f64) -> RoamFrames {
        RoamFrames {
            end: FrameQuery::found(FrameStatus::Successful, start_s + ms / 1000.0),
            anchor: FrameQuery::found(FrameStatus::Successful, start_s),
            anchor_kind,
        }
    }

    fn bssid(s: &str) -> Bssid {
        s.parse().unwrap()
    }

    fn engine() -> RoamVerdictEngine {
        RoamVerdictEngine::new(
            RoamTargets::new(A.parse().unwrap(), B.parse().unwrap()).unwrap(),
            ThresholdConfig::default(),
        )
    }

    fn observation(frames: RoamFrames) -> RoamObservation {
        RoamObservation {
            iteration: 1,
            station: StationEid::new(1, 1, "wlan0"),
            before: bssid(A),
            after: bssid(B),
            herd_homogeneous: true,
            transition: FtTransition::OverAir,
            capture: CaptureEvidence::Frames(frames),
            multicast: None,
            capture_file: Some(PathBuf::from("roam_normal_ota_iteration_1_x.pcap")),
            trace_file: None,
        }
    }

    #[test]
    fn scenario_a_forty_ms_passes() {
        let mut frames = frames_with_gap(AnchorKind::Authentication, 2.010, 40.0);
        frames.end.timestamp = Some(2.050);
        let row = engine().evaluate(&observation(frames));
        assert_eq!(row.verdict, Verdict::Pass);
        assert_eq!(row.remark, Remark::PassedAllCriteria);
        assert!((row.roam_time_ms.unwrap() - 40.0).abs() < 1e-6);
        assert_eq!(row.bssid_after, bssid(B));
    }

    #[test]
    fn threshold_boundary_is_exclusive() {
        let e = engine();
        assert_eq!(
            e.evaluate_timing(49.0, FtTransition::OverAir),
            (Verdict::Pass, Remark::PassedAllCriteria)
        );
        assert_eq!(
            e.evaluate_timing(50.0, FtTransition::OverAir),
            (Verdict::Fail, Remark::RoamTimeExceeded)
        );
        // over the DS has no threshold unless configured
        assert_eq!(e.evaluate_timing(900.0, FtTransition::OverDs).0, Verdict::Pass);
    }

    #[test]
    fn exceeded_rows_keep_the_roam_time() {
        let row = engine().evaluate(&observation(frames_with_gap(
            AnchorKind::Authentication,
            1.0,
            75.0,
        )));
        assert_eq!(row.remark, Remark::RoamTimeExceeded);
        assert!(row.roam_time_ms.is_some());
    }

    #[test]
    fn staying_put_dominates_frame_evidence() {
        let mut obs = observation(frames_with_gap(AnchorKind::Authentication, 1.0, 10.0));
        obs.after = obs.before;
        let row = engine().evaluate(&obs);
        assert_eq!(row.verdict, Verdict::Fail);
        assert_eq!(row.remark, Remark::StationDidNotRoam);
        assert_eq!(row.roam_time_ms, None);

        obs.after = Bssid::Unassociated;
        assert_eq!(engine().evaluate(&obs).remark, Remark::StationDidNotRoam);

        obs.herd_homogeneous = false;
        assert_eq!(engine().evaluate(&obs).remark, Remark::NotHomogeneous);
    }

    #[test]
    fn unassociated_start_is_not_a_roam() {
        let mut obs = observation(frames_with_gap(AnchorKind::Authentication, 1.0, 20.0));
        obs.before = Bssid::Unassociated;
        let row = engine().evaluate(&obs);
        assert_eq!(row.verdict, Verdict::Fail);
        assert_eq!(row.remark, Remark::NotHomogeneous);
        assert_eq!(row.roam_time_ms, None);
    }

    #[test]
    fn foreign_bssid_is_a_mismatch() {
        let mut obs = observation(frames_with_gap(AnchorKind::Authentication, 1.0, 10.0));
        obs.after = bssid("00:11:22:33:44:55");
        assert_eq!(engine().evaluate(&obs).remark, Remark::BssidMismatch);
    }

    #[test]
    fn missing_capture_is_reported() {
        let mut obs = observation(frames_with_gap(AnchorKind::Authentication, 1.0, 10.0));
        obs.capture = CaptureEvidence::Unavailable;
        assert_eq!(engine().evaluate(&obs).remark, Remark::NoCaptureAvailable);
    }

    #[test]
    fn empty_and_failed_frames_are_distinct() {
        let mut frames = frames_with_gap(AnchorKind::Authentication, 1.0, 10.0);
        frames.end = FrameQuery::empty();
        assert_eq!(engine().evaluate(&observation(frames)).remark, Remark::NoReassociation);

        let mut frames = frames_with_gap(AnchorKind::Authentication, 1.0, 10.0);
        frames.end.status = FrameStatus::Failed;
        assert_eq!(
            engine().evaluate(&observation(frames)).remark,
            Remark::ReassociationFailure
        );

        let mut frames = frames_with_gap(AnchorKind::Authentication, 1.0, 10.0);
        frames.anchor = FrameQuery::empty();
        assert_eq!(engine().evaluate(&observation(frames)).remark, Remark::NoAuthFrame);

        let mut frames = frames_with_gap(AnchorKind::Action, 1.0, 10.0);
        frames.anchor = FrameQuery::empty();
        assert_eq!(engine().evaluate(&observation(frames)).remark, Remark::NoActionFrame);

        let mut frames = frames_with_gap(AnchorKind::Authentication, 1.0, 10.0);
        frames.anchor.status = FrameStatus::Failed;
        assert_eq!(engine().evaluate(&observation(frames)).remark, Remark::AuthFail);
    }

    #[test]
    fn multicast_outcome_replaces_timing() {
        let mut obs = observation(frames_with_gap(AnchorKind::Authentication, 1.0, 400.0));
        obs.multicast = Some(MulticastOutcome::NotResumed);
        let row = engine().evaluate(&obs);
        assert_eq!(row.verdict, Verdict::Fail);
        assert_eq!(row.remark, Remark::MulticastNotResumed);

        obs.multicast = Some(MulticastOutcome::ResumedAfterRetry);
        let row = engine().evaluate(&obs);
        assert_eq!(row.verdict, Verdict::Pass);
        assert_eq!(row.remark, Remark::MulticastResumedAfterRetry);
        assert_eq!(row.roam_time_ms, None);
    }

    #[test]
    fn reassociation_before_anchor_is_out_of_order() {
        let frames = frames_with_gap(AnchorKind::Authentication, 3.0, -20.0);
        assert_eq!(engine().evaluate(&observation(frames)).remark, Remark::FramesOutOfOrder);
    }

    #[test]
    fn aborted_rows_fail_without_timing() {
        let row = aborted_result(3, StationEid::new(1, 1, "wlan1"), bssid(A));
        assert_eq!(row.verdict, Verdict::Fail);
        assert_eq!(row.remark, Remark::IterationAborted);
        assert_eq!(row.iteration_index, 3);
    }
}
