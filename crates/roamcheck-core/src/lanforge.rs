//! [`Testbed`](crate::testbed::Testbed) over the LANforge JSON API.
//!
//! Reads go through `GET /port`, `/atten/list` and `/endp` with retry;
//! commands are `POST /cli-json/<command>` and are sent once. Finished
//! captures are expected under the configured capture directory; copying
//! them off the LANforge host is left to the lab setup.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::command::WifiCliCmd;
use crate::error::TestbedError;
use crate::model::StationEid;
use crate::retry::{RetryPolicy, with_retry};
use crate::testbed::{
    AttenuatorControl, AttenuatorIndex, CaptureControl, CaptureHandle, Diagnostics,
    RoamCommander, SnifferRequest, StationField, StationQuery, TestbedResult, TrafficControl,
    TrafficKind,
};

/// `sniff_port` flag: capture with dumpcap.
const SNIFF_DUMPCAP: u32 = 0x2;
/// `set_port` interest bits: current flags + ifdown.
const SET_PORT_INTEREST_IFDOWN: u32 = 0x0080_0002;
const RX_RATE_FIELD: &str = "rx rate (last)";

// ── Configuration ────────────────────────────────────────────────────────

/// `[lanforge]` section: where the manager is and which entities to drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanforgeConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_one")]
    pub shelf: u16,

    #[serde(default = "default_one")]
    pub resource: u16,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Stations to roam (`wlan0` or `1.1.wlan0`); empty means every
    /// `WIFI-STA` port on the resource.
    #[serde(default)]
    pub stations: Vec<String>,

    /// Layer-3 cross-connects started for unicast traffic
    #[serde(default)]
    pub cx_names: Vec<String>,

    /// Multicast endpoints started and stopped as a group
    #[serde(default)]
    pub multicast_endpoints: Vec<String>,

    /// Transmitting multicast endpoint, excluded from receive-rate checks
    #[serde(default)]
    pub multicast_tx_endpoint: Option<String>,

    #[serde(default = "default_test_manager")]
    pub test_manager: String,
}

impl Default for LanforgeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shelf: default_one(),
            resource: default_one(),
            request_timeout_secs: default_request_timeout_secs(),
            stations: Vec::new(),
            cx_names: Vec::new(),
            multicast_endpoints: Vec::new(),
            multicast_tx_endpoint: None,
            test_manager: default_test_manager(),
        }
    }
}

fn default_host() -> String {
    "192.168.100.221".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_one() -> u16 {
    1
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_test_manager() -> String {
    "default_tm".to_string()
}

impl LanforgeConfig {
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

// ── Client ───────────────────────────────────────────────────────────────

pub struct LanforgeTestbed {
    client: Client,
    base_url: String,
    config: LanforgeConfig,
    capture_dir: PathBuf,
    read_retry: RetryPolicy,
}

impl LanforgeTestbed {
    pub fn new(config: &LanforgeConfig, capture_dir: PathBuf) -> TestbedResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TestbedError::Request {
                endpoint: config.base_url(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url(),
            config: config.clone(),
            capture_dir,
            read_retry: RetryPolicy::lanforge_read(),
        })
    }

    #[must_use]
    pub fn with_read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_error(&self, endpoint: &str, err: &reqwest::Error) -> TestbedError {
        if err.is_timeout() {
            TestbedError::Timeout(self.config.request_timeout_secs)
        } else {
            TestbedError::Request {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        }
    }

    async fn get_once(&self, path: &str) -> TestbedResult<Value> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.request_error(path, &e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TestbedError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| TestbedError::UnexpectedResponse {
                endpoint: path.to_string(),
                reason: e.to_string(),
            })
    }

    async fn get_json(&self, path: &str) -> TestbedResult<Value> {
        with_retry(&self.read_retry, || self.get_once(path)).await
    }

    async fn post<B: Serialize + ?Sized>(&self, command: &str, body: &B) -> TestbedResult<()> {
        let path = format!("/cli-json/{command}");
        let url = format!("{}{path}", self.base_url);
        debug!(command, "lanforge post");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.request_error(&path, &e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TestbedError::Status {
                endpoint: path,
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    async fn set_port_down(&self, port: &str, down: bool) -> TestbedResult<()> {
        self.post(
            "set_port",
            &json!({
                "shelf": self.config.shelf,
                "resource": self.config.resource,
                "port": port,
                "current_flags": u32::from(down),
                "interest": SET_PORT_INTEREST_IFDOWN,
            }),
        )
        .await
    }

    async fn set_endpoints(&self, names: &[String], running: bool) -> TestbedResult<()> {
        let command = if running { "start_endp" } else { "stop_endp" };
        for name in names {
            self.post(command, &json!({ "endp_name": name })).await?;
        }
        Ok(())
    }

    async fn set_cross_connects(&self, running: bool) -> TestbedResult<()> {
        let state = if running { "RUNNING" } else { "STOPPED" };
        for cx in &self.config.cx_names {
            self.post(
                "set_cx_state",
                &json!({
                    "test_mgr": self.config.test_manager,
                    "cx_name": cx,
                    "cx_state": state,
                }),
            )
            .await?;
        }
        Ok(())
    }

    /// `set_wifi_radio` body tuning the monitor radio to the capture channel.
    /// `NA` leaves mode and country as they are.
    fn radio_channel_body(&self, request: &SnifferRequest) -> Value {
        json!({
            "shelf": self.config.shelf,
            "resource": self.config.resource,
            "radio": request.radio,
            "mode": "NA",
            "channel": request.channel,
            "country": "NA",
        })
    }

    fn configured_station(&self, name: &str) -> StationEid {
        if name.contains('.') {
            name.parse()
                .unwrap_or_else(|_| StationEid::new(self.config.shelf, self.config.resource, name))
        } else {
            StationEid::new(self.config.shelf, self.config.resource, name)
        }
    }
}

// ── Response parsing ─────────────────────────────────────────────────────

/// LANforge lists entities as `[{ "<eid>": { ... } }, ...]`, or as a bare
/// object when there is exactly one. Yields `(key, record)` pairs.
fn records<'a>(value: &'a Value, plural: &str, singular: &str) -> Vec<(Option<&'a str>, &'a Value)> {
    if let Some(items) = value.get(plural).and_then(Value::as_array) {
        return items.iter().map(unwrap_keyed).collect();
    }
    value
        .get(singular)
        .map(|one| vec![unwrap_keyed(one)])
        .unwrap_or_default()
}

fn unwrap_keyed(item: &Value) -> (Option<&str>, &Value) {
    if let Some(map) = item.as_object() {
        if map.len() == 1 {
            if let Some((key, inner)) = map.iter().next() {
                if inner.is_object() {
                    return (Some(key.as_str()), inner);
                }
            }
        }
    }
    (None, item)
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn parse_attenuator_serials(value: &Value) -> TestbedResult<(String, String)> {
    let serials: Vec<String> = records(value, "attenuators", "attenuator")
        .into_iter()
        .filter_map(|(key, record)| {
            record
                .get("entity id")
                .and_then(value_to_string)
                .or_else(|| key.map(str::to_string))
        })
        .filter_map(|eid| eid.rsplit('.').next().map(str::to_string))
        .collect();
    match serials.as_slice() {
        [first, second, ..] => Ok((first.clone(), second.clone())),
        _ => Err(TestbedError::MissingAttenuators {
            found: serials.len(),
        }),
    }
}

pub(crate) fn parse_port_field(value: &Value, field: StationField) -> Option<String> {
    value
        .get("interface")
        .and_then(|iface| iface.get(field.as_str()))
        .and_then(value_to_string)
}

pub(crate) fn parse_station_list(value: &Value) -> Vec<StationEid> {
    records(value, "interfaces", "interface")
        .into_iter()
        .filter(|(_, record)| {
            record.get("port type").and_then(Value::as_str) == Some("WIFI-STA")
        })
        .filter_map(|(key, _)| key?.parse().ok())
        .collect()
}

pub(crate) fn parse_rx_rates(value: &Value, names: &[String], exclude: Option<&str>) -> Vec<f64> {
    records(value, "endpoint", "endpoint")
        .into_iter()
        .filter_map(|(key, record)| {
            let name = record
                .get("name")
                .and_then(Value::as_str)
                .or(key)?;
            let wanted = if names.is_empty() {
                exclude != Some(name)
            } else {
                names.iter().any(|n| n == name)
            };
            if !wanted {
                return None;
            }
            record.get(RX_RATE_FIELD).and_then(Value::as_f64).or(Some(0.0))
        })
        .collect()
}

// ── Trait impls ──────────────────────────────────────────────────────────

impl CaptureControl for LanforgeTestbed {
    async fn start_sniffer(&self, request: &SnifferRequest) -> TestbedResult<CaptureHandle> {
        self.post("set_wifi_radio", &self.radio_channel_body(request))
            .await?;
        self.post(
            "add_monitor",
            &json!({
                "shelf": self.config.shelf,
                "resource": self.config.resource,
                "radio": request.radio,
                "ap_name": request.monitor_name,
                "flags": 0,
                "flags_mask": 0,
            }),
        )
        .await?;
        self.set_port_down(&request.monitor_name, false).await?;
        self.post(
            "sniff_port",
            &json!({
                "shelf": self.config.shelf,
                "resource": self.config.resource,
                "port": request.monitor_name,
                "display": "NA",
                "flags": SNIFF_DUMPCAP,
                "outfile": request.file_name,
                "duration": request.max_duration_secs,
            }),
        )
        .await?;
        info!(
            monitor = %request.monitor_name,
            radio = %request.radio,
            channel = %request.channel,
            file = %request.file_name,
            "sniffer started"
        );
        Ok(CaptureHandle {
            monitor_name: request.monitor_name.clone(),
            file_name: request.file_name.clone(),
        })
    }

    async fn stop_sniffer(&self, handle: CaptureHandle) -> TestbedResult<PathBuf> {
        self.set_port_down(&handle.monitor_name, true).await?;
        self.post(
            "rm_vlan",
            &json!({
                "shelf": self.config.shelf,
                "resource": self.config.resource,
                "port": handle.monitor_name,
            }),
        )
        .await?;
        let path = self.capture_dir.join(&handle.file_name);
        info!(path = %path.display(), "sniffer stopped");
        Ok(path)
    }
}

impl AttenuatorControl for LanforgeTestbed {
    async fn list_attenuator_serials(&self) -> TestbedResult<(String, String)> {
        parse_attenuator_serials(&self.get_json("/atten/list").await?)
    }

    async fn set_attenuation(
        &self,
        serial: &str,
        index: AttenuatorIndex,
        value: u16,
    ) -> TestbedResult<()> {
        self.post(
            "set_attenuator",
            &json!({
                "shelf": self.config.shelf,
                "resource": self.config.resource,
                "serno": serial,
                "atten_idx": index.to_string(),
                "val": value,
            }),
        )
        .await
    }
}

impl StationQuery for LanforgeTestbed {
    async fn station_list(&self) -> TestbedResult<Vec<StationEid>> {
        if !self.config.stations.is_empty() {
            return Ok(self
                .config
                .stations
                .iter()
                .map(|name| self.configured_station(name))
                .collect());
        }
        let path = format!(
            "/port/{}/{}/list?fields=alias,port%20type",
            self.config.shelf, self.config.resource
        );
        Ok(parse_station_list(&self.get_json(&path).await?))
    }

    async fn station_field(
        &self,
        station: &StationEid,
        field: StationField,
    ) -> TestbedResult<String> {
        let path = format!(
            "/port/{}/{}/{}?fields={}",
            station.shelf,
            station.resource,
            station.port,
            field.as_str()
        );
        let body = self.get_json(&path).await?;
        if body.get("interface").is_none() {
            return Err(TestbedError::StationNotFound(station.to_string()));
        }
        parse_port_field(&body, field).ok_or_else(|| TestbedError::UnexpectedResponse {
            endpoint: path,
            reason: format!("missing field '{}'", field.as_str()),
        })
    }
}

impl RoamCommander for LanforgeTestbed {
    async fn wifi_cli_cmd(&self, cmd: &WifiCliCmd) -> TestbedResult<()> {
        debug!(port = %cmd.port, wpa_cli_cmd = %cmd.wpa_cli_cmd, "wifi_cli_cmd");
        self.post("wifi_cli_cmd", cmd).await
    }
}

impl TrafficControl for LanforgeTestbed {
    async fn start_traffic(&self, kind: TrafficKind) -> TestbedResult<()> {
        match kind {
            TrafficKind::Unicast => self.set_cross_connects(true).await,
            TrafficKind::Multicast => self.start_multicast().await,
        }
    }

    async fn stop_traffic(&self, kind: TrafficKind) -> TestbedResult<()> {
        match kind {
            TrafficKind::Unicast => self.set_cross_connects(false).await,
            TrafficKind::Multicast => self.stop_multicast().await,
        }
    }

    async fn start_multicast(&self) -> TestbedResult<()> {
        self.set_endpoints(&self.config.multicast_endpoints, true)
            .await
    }

    async fn stop_multicast(&self) -> TestbedResult<()> {
        self.set_endpoints(&self.config.multicast_endpoints, false)
            .await
    }

    async fn multicast_rx_rates(&self, endpoints: &[String]) -> TestbedResult<Vec<f64>> {
        let body = self
            .get_json("/endp?fields=name,rx%20rate%20(last)")
            .await?;
        Ok(parse_rx_rates(
            &body,
            endpoints,
            self.config.multicast_tx_endpoint.as_deref(),
        ))
    }
}

/// No AP controller is attached; trace files and kernel logs are not collected.
impl Diagnostics for LanforgeTestbed {}
