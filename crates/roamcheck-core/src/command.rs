//! wpa_cli commands sent to stations through the LANforge `wifi_cli_cmd` call.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{MacAddr, StationEid};

/// What a station is told to do once its scan completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RoamDirective {
    /// `roam <bssid>`: reassociate over the air.
    Roam(MacAddr),
    /// `ft_ds <bssid>`: FT over the distribution system.
    FtDs(MacAddr),
}

impl RoamDirective {
    #[must_use]
    pub const fn target(&self) -> MacAddr {
        match self {
            Self::Roam(mac) | Self::FtDs(mac) => *mac,
        }
    }
}

impl fmt::Display for RoamDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Roam(mac) => write!(f, "roam {mac}"),
            Self::FtDs(mac) => write!(f, "ft_ds {mac}"),
        }
    }
}

/// A directed roam for one station: scan the listed channels, then roam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoamCommand {
    pub station: StationEid,
    pub scan_frequencies: Vec<u32>,
    pub directive: RoamDirective,
}

impl RoamCommand {
    #[must_use]
    pub fn new(station: StationEid, scan_frequencies: &[u32], directive: RoamDirective) -> Self {
        Self {
            station,
            scan_frequencies: scan_frequencies.to_vec(),
            directive,
        }
    }

    /// The two wpa_cli invocations, in the order they must be sent.
    #[must_use]
    pub fn wifi_cli_cmds(&self) -> [WifiCliCmd; 2] {
        let freqs = self
            .scan_frequencies
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        [
            WifiCliCmd::new(&self.station, format!("scan trigger freq {freqs}")),
            WifiCliCmd::new(&self.station, self.directive.to_string()),
        ]
    }
}

/// Body of `POST /cli-json/wifi_cli_cmd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiCliCmd {
    pub shelf: u16,
    pub resource: u16,
    pub port: String,
    pub wpa_cli_cmd: String,
}

impl WifiCliCmd {
    #[must_use]
    pub fn new(station: &StationEid, wpa_cli_cmd: impl Into<String>) -> Self {
        Self {
            shelf: station.shelf,
            resource: station.resource,
            port: station.port.clone(),
            wpa_cli_cmd: wpa_cli_cmd.into(),
        }
    }
}
