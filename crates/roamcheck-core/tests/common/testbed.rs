//! A scripted in-memory testbed.
//!
//! Stations follow `roam`/`ft_ds` commands unless told otherwise, and can be
//! made to drift to the other AP once an attenuator reaches a set value.
//! Captures written on `stop_sniffer` come from a per-iteration script.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use roamcheck_core::command::WifiCliCmd;
use roamcheck_core::error::TestbedError;
use roamcheck_core::model::{Bssid, MacAddr, StationEid};
use roamcheck_core::testbed::{
    AttenuatorControl, AttenuatorIndex, CaptureControl, CaptureHandle, Diagnostics,
    RoamCommander, SnifferRequest, StationField, StationQuery, TestbedResult, TrafficControl,
    TrafficKind,
};
use tempfile::TempDir;

/// Serial of the attenuator in front of ap1; `ap1_attenuator = 0` cabling.
pub const ATTEN_AP1: &str = "1001";
pub const ATTEN_AP2: &str = "1002";

#[derive(Debug, Clone)]
pub struct FakeStation {
    pub eid: StationEid,
    pub mac: MacAddr,
    pub ip: String,
    pub bssid: Bssid,
    pub follows_roams: bool,
}

#[derive(Debug, Default)]
struct State {
    stations: Vec<FakeStation>,
    attenuation: HashMap<String, u16>,
    attenuation_log: Vec<(String, u16)>,
    commands: Vec<WifiCliCmd>,
    sniffer_files: Vec<String>,
    captures: VecDeque<Option<Vec<u8>>>,
    rx_rates: VecDeque<Vec<f64>>,
    traffic_log: Vec<String>,
    multicast_starts: u32,
    soft_roam_at: Option<u16>,
    fail_attenuators: bool,
    fail_commands: bool,
}

pub struct FakeTestbed {
    ap1: MacAddr,
    ap2: MacAddr,
    capture_dir: TempDir,
    state: RefCell<State>,
}

impl FakeTestbed {
    pub fn new(ap1: MacAddr, ap2: MacAddr) -> Self {
        Self {
            ap1,
            ap2,
            capture_dir: TempDir::new().expect("create capture dir"),
            state: RefCell::new(State::default()),
        }
    }

    pub fn with_station(self, port: &str, mac: MacAddr, bssid: MacAddr) -> Self {
        self.state.borrow_mut().stations.push(FakeStation {
            eid: StationEid::new(1, 1, port),
            mac,
            ip: format!("192.168.1.{}", mac.octets()[5]),
            bssid: Bssid::from(bssid),
            follows_roams: true,
        });
        self
    }

    pub fn ignoring_roams(self, port: &str) -> Self {
        self.station_mut(port, |s| s.follows_roams = false);
        self
    }

    pub fn unassociated(self, port: &str) -> Self {
        self.station_mut(port, |s| s.bssid = Bssid::Unassociated);
        self
    }

    pub fn without_ip(self, port: &str) -> Self {
        self.station_mut(port, |s| s.ip = "0.0.0.0".to_string());
        self
    }

    /// Queue the capture written by the next iteration's sniffer; `None`
    /// leaves no file behind.
    pub fn with_capture(self, bytes: Option<Vec<u8>>) -> Self {
        self.state.borrow_mut().captures.push_back(bytes);
        self
    }

    /// Queue one `multicast_rx_rates` answer. The last one repeats.
    pub fn with_rx_rates(self, rates: Vec<f64>) -> Self {
        self.state.borrow_mut().rx_rates.push_back(rates);
        self
    }

    /// Stations leave an AP once its attenuator reaches `value`.
    pub fn soft_roam_at(self, value: u16) -> Self {
        self.state.borrow_mut().soft_roam_at = Some(value);
        self
    }

    pub fn failing_attenuators(self) -> Self {
        self.state.borrow_mut().fail_attenuators = true;
        self
    }

    pub fn failing_commands(self) -> Self {
        self.state.borrow_mut().fail_commands = true;
        self
    }

    pub fn capture_dir(&self) -> &Path {
        self.capture_dir.path()
    }

    pub fn commands(&self) -> Vec<WifiCliCmd> {
        self.state.borrow().commands.clone()
    }

    pub fn attenuation_log(&self) -> Vec<(String, u16)> {
        self.state.borrow().attenuation_log.clone()
    }

    pub fn traffic_log(&self) -> Vec<String> {
        self.state.borrow().traffic_log.clone()
    }

    pub fn multicast_starts(&self) -> u32 {
        self.state.borrow().multicast_starts
    }

    pub fn sniffer_files(&self) -> Vec<String> {
        self.state.borrow().sniffer_files.clone()
    }

    pub fn bssid_of(&self, port: &str) -> Bssid {
        self.state
            .borrow()
            .stations
            .iter()
            .find(|s| s.eid.port == port)
            .map_or(Bssid::Unassociated, |s| s.bssid)
    }

    fn station_mut(&self, port: &str, f: impl FnOnce(&mut FakeStation)) {
        let mut state = self.state.borrow_mut();
        let station = state
            .stations
            .iter_mut()
            .find(|s| s.eid.port == port)
            .expect("unknown station");
        f(station);
    }

    fn other_ap(&self, bssid: Bssid) -> Bssid {
        if bssid == Bssid::from(self.ap1) {
            Bssid::from(self.ap2)
        } else {
            Bssid::from(self.ap1)
        }
    }

    fn ap_behind(&self, serial: &str) -> Bssid {
        if serial == ATTEN_AP1 {
            Bssid::from(self.ap1)
        } else {
            Bssid::from(self.ap2)
        }
    }
}

impl CaptureControl for FakeTestbed {
    async fn start_sniffer(&self, request: &SnifferRequest) -> TestbedResult<CaptureHandle> {
        self.state
            .borrow_mut()
            .sniffer_files
            .push(request.file_name.clone());
        Ok(CaptureHandle {
            monitor_name: request.monitor_name.clone(),
            file_name: request.file_name.clone(),
        })
    }

    async fn stop_sniffer(&self, handle: CaptureHandle) -> TestbedResult<PathBuf> {
        let path = self.capture_dir.path().join(&handle.file_name);
        if handle.file_name.starts_with("roam_setup_") {
            return Ok(path);
        }
        if let Some(Some(bytes)) = self.state.borrow_mut().captures.pop_front() {
            std::fs::write(&path, bytes).expect("write capture");
        }
        Ok(path)
    }
}

impl AttenuatorControl for FakeTestbed {
    async fn list_attenuator_serials(&self) -> TestbedResult<(String, String)> {
        if self.state.borrow().fail_attenuators {
            return Err(TestbedError::MissingAttenuators { found: 0 });
        }
        Ok((ATTEN_AP1.to_string(), ATTEN_AP2.to_string()))
    }

    async fn set_attenuation(
        &self,
        serial: &str,
        _index: AttenuatorIndex,
        value: u16,
    ) -> TestbedResult<()> {
        let behind = self.ap_behind(serial);
        let mut state = self.state.borrow_mut();
        state.attenuation.insert(serial.to_string(), value);
        state.attenuation_log.push((serial.to_string(), value));
        if state.soft_roam_at.is_some_and(|limit| value >= limit) {
            let other = self.other_ap(behind);
            for station in state.stations.iter_mut().filter(|s| s.bssid == behind) {
                station.bssid = other;
            }
        }
        Ok(())
    }
}

impl StationQuery for FakeTestbed {
    async fn station_list(&self) -> TestbedResult<Vec<StationEid>> {
        Ok(self
            .state
            .borrow()
            .stations
            .iter()
            .map(|s| s.eid.clone())
            .collect())
    }

    async fn station_field(
        &self,
        station: &StationEid,
        field: StationField,
    ) -> TestbedResult<String> {
        let state = self.state.borrow();
        let found = state
            .stations
            .iter()
            .find(|s| &s.eid == station)
            .ok_or_else(|| TestbedError::StationNotFound(station.to_string()))?;
        Ok(match field {
            StationField::Ap => found.bssid.to_string(),
            StationField::Mac => found.mac.to_string(),
            StationField::Ip => found.ip.clone(),
        })
    }
}

impl RoamCommander for FakeTestbed {
    async fn wifi_cli_cmd(&self, cmd: &WifiCliCmd) -> TestbedResult<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_commands {
            return Err(TestbedError::Status {
                endpoint: "/cli-json/wifi_cli_cmd".into(),
                status: 500,
            });
        }
        state.commands.push(cmd.clone());
        let target = cmd
            .wpa_cli_cmd
            .strip_prefix("roam ")
            .or_else(|| cmd.wpa_cli_cmd.strip_prefix("ft_ds "))
            .and_then(|mac| mac.parse::<MacAddr>().ok());
        if let Some(target) = target {
            if let Some(station) = state
                .stations
                .iter_mut()
                .find(|s| s.eid.port == cmd.port && s.follows_roams)
            {
                station.bssid = Bssid::from(target);
            }
        }
        Ok(())
    }
}

impl TrafficControl for FakeTestbed {
    async fn start_traffic(&self, kind: TrafficKind) -> TestbedResult<()> {
        self.state
            .borrow_mut()
            .traffic_log
            .push(format!("start {kind:?}"));
        Ok(())
    }

    async fn stop_traffic(&self, kind: TrafficKind) -> TestbedResult<()> {
        self.state
            .borrow_mut()
            .traffic_log
            .push(format!("stop {kind:?}"));
        Ok(())
    }

    async fn start_multicast(&self) -> TestbedResult<()> {
        self.state.borrow_mut().multicast_starts += 1;
        Ok(())
    }

    async fn stop_multicast(&self) -> TestbedResult<()> {
        self.state
            .borrow_mut()
            .traffic_log
            .push("stop multicast".to_string());
        Ok(())
    }

    async fn multicast_rx_rates(&self, _endpoints: &[String]) -> TestbedResult<Vec<f64>> {
        let mut state = self.state.borrow_mut();
        if state.rx_rates.len() > 1 {
            Ok(state.rx_rates.pop_front().unwrap_or_default())
        } else {
            Ok(state.rx_rates.front().cloned().unwrap_or_default())
        }
    }
}

impl Diagnostics for FakeTestbed {
    async fn collect_kernel_log(&self, tag: &str) -> TestbedResult<Option<String>> {
        Ok(Some(format!("kernel_log_{tag}.txt")))
    }
}
