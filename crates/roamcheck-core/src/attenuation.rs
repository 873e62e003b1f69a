//! Soft roaming by attenuation sweep.
//!
//! Phase 1 raises the attenuation in front of the serving AP while the
//! target AP stays unattenuated. If no station leaves, phase 2 pins the
//! serving AP at maximum and walks the target AP's attenuator down from
//! maximum to minimum. Every step is followed by a settle pause and a BSSID
//! poll of all stations; the sweep stops at the first station seen on a
//! different AP.

use std::time::Duration;

use tracing::{debug, info};

use crate::config::{AttenuationConfig, TimingConfig};
use crate::error::IterationError;
use crate::model::Bssid;
use crate::testbed::{AttenuatorControl, AttenuatorIndex};
use crate::wait::CancelFlag;

/// Inclusive attenuation range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttenuationBounds {
    pub min: u16,
    pub max: u16,
}

impl AttenuationBounds {
    #[must_use]
    pub fn clamp(&self, value: u16) -> u16 {
        value.clamp(self.min, self.max)
    }
}

/// Last value written to one attenuator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttenuationState {
    pub serial: String,
    current_value: u16,
}

impl AttenuationState {
    #[must_use]
    pub fn new(serial: impl Into<String>, value: u16) -> Self {
        Self {
            serial: serial.into(),
            current_value: value,
        }
    }

    #[must_use]
    pub const fn current_value(&self) -> u16 {
        self.current_value
    }
}

/// One BSSID reading per station, used to detect a roam mid-sweep.
#[allow(async_fn_in_trait)]
pub trait BssidPoller {
    /// Stations that cannot be read report [`Bssid::Unassociated`].
    async fn poll(&mut self) -> Vec<Bssid>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOutcome {
    pub roamed: bool,
    /// BSSID that ended the sweep, when it roamed.
    pub observed: Option<Bssid>,
    /// BSSID polls performed.
    pub polls: u32,
    /// `[away_from, toward]` as left by the sweep.
    pub final_states: [AttenuationState; 2],
}

#[derive(Debug, Clone)]
pub struct AttenuationSweeper {
    bounds: AttenuationBounds,
    step: u16,
    settle: Duration,
}

impl AttenuationSweeper {
    #[must_use]
    pub fn new(bounds: AttenuationBounds, step: u16, settle: Duration) -> Self {
        Self {
            bounds,
            step: step.max(1),
            settle,
        }
    }

    #[must_use]
    pub fn from_config(atten: &AttenuationConfig, timing: &TimingConfig) -> Self {
        Self::new(
            AttenuationBounds {
                min: atten.min,
                max: atten.max,
            },
            atten.step,
            timing.settle_interval(),
        )
    }

    #[must_use]
    pub const fn bounds(&self) -> AttenuationBounds {
        self.bounds
    }

    /// `min, min+step, ...` ending exactly on `max`.
    #[must_use]
    pub fn ascending_steps(&self) -> Vec<u16> {
        let mut steps = Vec::new();
        let mut value = self.bounds.min;
        loop {
            steps.push(value);
            if value >= self.bounds.max {
                break;
            }
            value = value.saturating_add(self.step).min(self.bounds.max);
        }
        steps
    }

    /// `max, max-step, ...` ending exactly on `min`.
    #[must_use]
    pub fn descending_steps(&self) -> Vec<u16> {
        let mut steps = Vec::new();
        let mut value = self.bounds.max;
        loop {
            steps.push(value);
            if value <= self.bounds.min {
                break;
            }
            value = value.saturating_sub(self.step).max(self.bounds.min);
        }
        steps
    }

    async fn apply<A: AttenuatorControl>(
        &self,
        attenuators: &A,
        state: &mut AttenuationState,
        value: u16,
    ) -> Result<(), IterationError> {
        let value = self.bounds.clamp(value);
        attenuators
            .set_attenuation(&state.serial, AttenuatorIndex::All, value)
            .await
            .map_err(IterationError::testbed("set attenuation"))?;
        state.current_value = value;
        Ok(())
    }

    /// Sweep until some station leaves `before`, or both phases run out.
    pub async fn force_roam<A, P>(
        &self,
        attenuators: &A,
        away_from: &mut AttenuationState,
        toward: &mut AttenuationState,
        poller: &mut P,
        before: &Bssid,
        cancel: &CancelFlag,
    ) -> Result<SweepOutcome, IterationError>
    where
        A: AttenuatorControl,
        P: BssidPoller,
    {
        let mut polls = 0u32;

        self.apply(attenuators, toward, self.bounds.min).await?;
        info!(
            away_from = %away_from.serial,
            toward = %toward.serial,
            "attenuation sweep phase 1"
        );
        for value in self.ascending_steps() {
            if let Some(observed) = self
                .step_and_poll(attenuators, away_from, value, poller, before, cancel, &mut polls)
                .await?
            {
                return Ok(SweepOutcome {
                    roamed: true,
                    observed: Some(observed),
                    polls,
                    final_states: [away_from.clone(), toward.clone()],
                });
            }
        }

        if away_from.current_value != self.bounds.max {
            self.apply(attenuators, away_from, self.bounds.max).await?;
        }
        info!(
            away_from = %away_from.serial,
            toward = %toward.serial,
            "attenuation sweep phase 2"
        );
        for value in self.descending_steps() {
            if let Some(observed) = self
                .step_and_poll(attenuators, toward, value, poller, before, cancel, &mut polls)
                .await?
            {
                return Ok(SweepOutcome {
                    roamed: true,
                    observed: Some(observed),
                    polls,
                    final_states: [away_from.clone(), toward.clone()],
                });
            }
        }

        info!(polls, "attenuation sweep exhausted without a roam");
        Ok(SweepOutcome {
            roamed: false,
            observed: None,
            polls,
            final_states: [away_from.clone(), toward.clone()],
        })
    }

    async fn step_and_poll<A, P>(
        &self,
        attenuators: &A,
        state: &mut AttenuationState,
        value: u16,
        poller: &mut P,
        before: &Bssid,
        cancel: &CancelFlag,
        polls: &mut u32,
    ) -> Result<Option<Bssid>, IterationError>
    where
        A: AttenuatorControl,
        P: BssidPoller,
    {
        if cancel.is_cancelled() {
            return Err(IterationError::Cancelled);
        }
        self.apply(attenuators, state, value).await?;
        if !cancel.sleep(self.settle).await {
            return Err(IterationError::Cancelled);
        }
        let bssids = poller.poll().await;
        *polls += 1;
        debug!(
            attenuator = %state.serial,
            attenuation = value,
            bssids = ?bssids.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "sweep step"
        );
        Ok(bssids
            .into_iter()
            .find(|bssid| bssid.is_associated() && bssid != before))
    }
}
