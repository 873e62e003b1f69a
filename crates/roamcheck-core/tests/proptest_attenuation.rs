//! Property-based tests for the two-phase attenuation sweep.

use std::cell::RefCell;
use std::time::Duration;

use proptest::prelude::*;

use roamcheck_core::attenuation::{
    AttenuationBounds, AttenuationState, AttenuationSweeper, BssidPoller, SweepOutcome,
};
use roamcheck_core::model::{Bssid, MacAddr};
use roamcheck_core::testbed::{AttenuatorControl, AttenuatorIndex, TestbedResult};
use roamcheck_core::wait::CancelFlag;

const FROM: MacAddr = MacAddr::new([0x68, 0x7d, 0xb4, 0x5f, 0x5c, 0x3b]);
const TO: MacAddr = MacAddr::new([0x14, 0x16, 0x9d, 0x53, 0x58, 0xcb]);

#[derive(Default)]
struct RecordingAttenuators {
    log: RefCell<Vec<(String, u16)>>,
}

impl AttenuatorControl for RecordingAttenuators {
    async fn list_attenuator_serials(&self) -> TestbedResult<(String, String)> {
        Ok(("away".into(), "toward".into()))
    }

    async fn set_attenuation(
        &self,
        serial: &str,
        _index: AttenuatorIndex,
        value: u16,
    ) -> TestbedResult<()> {
        self.log.borrow_mut().push((serial.to_string(), value));
        Ok(())
    }
}

/// Reports the old AP until poll number `roam_at` (1-based), then the new one.
struct RoamAtPoll {
    roam_at: Option<u32>,
    polls: u32,
}

impl BssidPoller for RoamAtPoll {
    async fn poll(&mut self) -> Vec<Bssid> {
        self.polls += 1;
        if self.roam_at.is_some_and(|n| self.polls >= n) {
            vec![Bssid::from(FROM), Bssid::from(TO)]
        } else {
            vec![Bssid::from(FROM), Bssid::Unassociated]
        }
    }
}

fn sweep(
    bounds: AttenuationBounds,
    step: u16,
    roam_at: Option<u32>,
) -> (SweepOutcome, Vec<(String, u16)>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();
    let sweeper = AttenuationSweeper::new(bounds, step, Duration::from_secs(4));
    let attenuators = RecordingAttenuators::default();
    let outcome = runtime.block_on(async {
        let mut away = AttenuationState::new("away", bounds.min);
        let mut toward = AttenuationState::new("toward", bounds.max);
        let mut poller = RoamAtPoll { roam_at, polls: 0 };
        sweeper
            .force_roam(
                &attenuators,
                &mut away,
                &mut toward,
                &mut poller,
                &Bssid::from(FROM),
                &CancelFlag::new(),
            )
            .await
            .unwrap()
    });
    (outcome, attenuators.log.into_inner())
}

// =============================================================================
// Strategies
// =============================================================================

fn arb_bounds() -> impl Strategy<Value = AttenuationBounds> {
    (0u16..200, 1u16..800).prop_map(|(min, span)| AttenuationBounds {
        min,
        max: min + span,
    })
}

fn arb_step() -> impl Strategy<Value = u16> {
    1u16..60
}

fn phase_len(bounds: AttenuationBounds, step: u16) -> u32 {
    u32::from((bounds.max - bounds.min).div_ceil(step)) + 1
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn every_value_stays_within_bounds(bounds in arb_bounds(), step in arb_step()) {
        let (_, log) = sweep(bounds, step, None);
        for (_, value) in &log {
            prop_assert!(*value >= bounds.min && *value <= bounds.max, "{} outside {:?}", value, bounds);
        }
    }

    #[test]
    fn exhausted_sweep_polls_both_full_phases(bounds in arb_bounds(), step in arb_step()) {
        let (outcome, log) = sweep(bounds, step, None);
        prop_assert!(!outcome.roamed);
        prop_assert_eq!(outcome.observed, None);
        prop_assert_eq!(outcome.polls, 2 * phase_len(bounds, step));

        // Phase 1 ends with the serving AP fully attenuated, phase 2 with the
        // target AP back at the minimum.
        let [away, toward] = &outcome.final_states;
        prop_assert_eq!(away.current_value(), bounds.max);
        prop_assert_eq!(toward.current_value(), bounds.min);
        prop_assert_eq!(&log[0], &("toward".to_string(), bounds.min));
    }

    #[test]
    fn sweep_stops_at_the_first_poll_that_sees_a_roam(
        bounds in arb_bounds(),
        step in arb_step(),
        at in 1u32..200,
    ) {
        let total = 2 * phase_len(bounds, step);
        let (outcome, _) = sweep(bounds, step, Some(at));
        if at <= total {
            prop_assert!(outcome.roamed);
            prop_assert_eq!(outcome.polls, at);
            prop_assert_eq!(outcome.observed, Some(Bssid::from(TO)));
        } else {
            prop_assert!(!outcome.roamed);
            prop_assert_eq!(outcome.polls, total);
        }
    }

    #[test]
    fn phase_one_only_moves_the_serving_attenuator(bounds in arb_bounds(), step in arb_step()) {
        let (_, log) = sweep(bounds, step, None);
        let phase1 = phase_len(bounds, step) as usize;
        prop_assert!(log[1..=phase1].iter().all(|(serial, _)| serial == "away"));
        let values: Vec<u16> = log[1..=phase1].iter().map(|(_, v)| *v).collect();
        prop_assert!(values.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn default_bounds_exhaust_after_142_polls() {
    let (outcome, _) = sweep(AttenuationBounds { min: 0, max: 700 }, 10, None);
    assert_eq!(outcome.polls, 142);
}
