//! Ports to the physical testbed.
//!
//! The orchestrator only talks to the outside world through these traits.
//! [`crate::lanforge::LanforgeTestbed`] implements them over the LANforge
//! JSON API; tests implement them with scripted fakes.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::command::WifiCliCmd;
use crate::error::TestbedError;
use crate::model::{MacAddr, StationEid};

pub type TestbedResult<T> = std::result::Result<T, TestbedError>;

/// Parameters for one sniffer session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnifferRequest {
    pub radio: String,
    pub channel: String,
    pub monitor_name: String,
    /// File name (not path) the capture is written under.
    pub file_name: String,
    pub max_duration_secs: u64,
}

/// Opaque handle for a running sniffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureHandle {
    pub monitor_name: String,
    pub file_name: String,
}

/// Attenuator module selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttenuatorIndex {
    All,
    Module(u8),
}

impl fmt::Display for AttenuatorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Module(idx) => write!(f, "{idx}"),
        }
    }
}

/// Per-station attribute readable from the testbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StationField {
    /// BSSID the station is associated with.
    Ap,
    Mac,
    Ip,
}

impl StationField {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ap => "ap",
            Self::Mac => "mac",
            Self::Ip => "ip",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficKind {
    /// Layer-3 unicast cross-connects.
    Unicast,
    /// Multicast transmit/receive endpoints.
    Multicast,
}

#[allow(async_fn_in_trait)]
pub trait CaptureControl {
    async fn start_sniffer(&self, request: &SnifferRequest) -> TestbedResult<CaptureHandle>;

    /// Stop the sniffer and return the local path of the finished capture.
    async fn stop_sniffer(&self, handle: CaptureHandle) -> TestbedResult<PathBuf>;
}

#[allow(async_fn_in_trait)]
pub trait AttenuatorControl {
    /// Serial numbers of the two attenuators, in the order they are cabled.
    async fn list_attenuator_serials(&self) -> TestbedResult<(String, String)>;

    async fn set_attenuation(
        &self,
        serial: &str,
        index: AttenuatorIndex,
        value: u16,
    ) -> TestbedResult<()>;
}

#[allow(async_fn_in_trait)]
pub trait StationQuery {
    async fn station_list(&self) -> TestbedResult<Vec<StationEid>>;

    async fn station_field(&self, station: &StationEid, field: StationField)
    -> TestbedResult<String>;
}

#[allow(async_fn_in_trait)]
pub trait RoamCommander {
    async fn wifi_cli_cmd(&self, cmd: &WifiCliCmd) -> TestbedResult<()>;
}

#[allow(async_fn_in_trait)]
pub trait TrafficControl {
    async fn start_traffic(&self, kind: TrafficKind) -> TestbedResult<()>;

    async fn stop_traffic(&self, kind: TrafficKind) -> TestbedResult<()>;

    /// (Re)start multicast transmission without touching unicast traffic.
    async fn start_multicast(&self) -> TestbedResult<()>;

    async fn stop_multicast(&self) -> TestbedResult<()>;

    /// Last receive rate of each named multicast endpoint; all receivers when
    /// `endpoints` is empty.
    async fn multicast_rx_rates(&self, endpoints: &[String]) -> TestbedResult<Vec<f64>>;
}

/// Optional AP-side debugging hooks. Defaults do nothing.
#[allow(async_fn_in_trait)]
pub trait Diagnostics {
    async fn start_debug(&self, _stations: &[MacAddr]) -> TestbedResult<()> {
        Ok(())
    }

    async fn stop_debug(&self, _stations: &[MacAddr]) -> TestbedResult<()> {
        Ok(())
    }

    /// Trace file name per station, `None` where debugging is disabled.
    async fn trace_files(&self, stations: &[MacAddr]) -> TestbedResult<Vec<Option<String>>> {
        Ok(vec![None; stations.len()])
    }

    /// Collect kernel logs for the stations' host, returning the file name.
    async fn collect_kernel_log(&self, _tag: &str) -> TestbedResult<Option<String>> {
        Ok(None)
    }
}

/// Everything a roam run needs from the testbed.
pub trait Testbed:
    CaptureControl + AttenuatorControl + StationQuery + RoamCommander + TrafficControl + Diagnostics
{
}

impl<T> Testbed for T where
    T: CaptureControl
        + AttenuatorControl
        + StationQuery
        + RoamCommander
        + TrafficControl
        + Diagnostics
{
}
