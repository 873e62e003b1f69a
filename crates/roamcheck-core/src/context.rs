//! State shared by every stage of a run.

use tracing::Span;

use crate::capture::FrameFilterSet;
use crate::config::RoamConfig;
use crate::error::{ConfigError, Result};
use crate::model::{MacAddr, RoamTargets, StationEid, StationRecord};
use crate::wait::CancelFlag;

/// Validated configuration, the station population and the cancel flag,
/// passed by reference through the orchestrator.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: RoamConfig,
    pub targets: RoamTargets,
    /// Empty until setup resolves the stations.
    pub stations: Vec<StationRecord>,
    pub cancel: CancelFlag,
    pub span: Span,
}

impl RunContext {
    pub fn new(config: RoamConfig, cancel: CancelFlag) -> Result<Self> {
        config.validate()?;
        let targets = config.roam_targets().ok_or_else(|| {
            ConfigError::ValidationError("roam targets must be two distinct BSSIDs".into())
        })?;
        let span = tracing::info_span!(
            "roam_run",
            mode = %config.run.mode,
            class = %config.run.station_class,
            ap1 = %config.targets.ap1_bssid,
            ap2 = %config.targets.ap2_bssid,
        );
        Ok(Self {
            config,
            targets,
            stations: Vec::new(),
            cancel,
            span,
        })
    }

    #[must_use]
    pub fn station_eids(&self) -> Vec<StationEid> {
        self.stations.iter().map(|s| s.eid.clone()).collect()
    }

    #[must_use]
    pub fn station_macs(&self) -> Vec<MacAddr> {
        self.stations.iter().map(|s| s.mac).collect()
    }

    /// Frame filters for one station under the configured mode.
    #[must_use]
    pub fn filters_for(&self, station: &StationRecord) -> FrameFilterSet {
        FrameFilterSet::for_station(
            station.mac,
            station.capability,
            self.config.run.mode.transition(),
        )
    }
}
