//! Configuration management for roamcheck
//!
//! A run is described by a single TOML file. Every field has a default so a
//! minimal file only needs the two BSSIDs and the LANforge host.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::lanforge::LanforgeConfig;
use crate::logging::LogConfig;
use crate::model::{ApSlot, MacAddr, RoamMode, RoamTargets, StationCapabilityClass};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoamConfig {
    #[serde(default)]
    pub targets: TargetsConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub thresholds: ThresholdConfig,

    #[serde(default)]
    pub attenuation: AttenuationConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub logging: LogConfig,

    #[serde(default)]
    pub lanforge: LanforgeConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "unknown log format: {s}. Expected one of: pretty, json"
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

// ── [targets] ────────────────────────────────────────────────────────────

/// The two access points stations are herded onto and roamed between
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetsConfig {
    #[serde(default = "default_ap1")]
    pub ap1_bssid: MacAddr,

    #[serde(default = "default_ap2")]
    pub ap2_bssid: MacAddr,

    /// Target that wins when stations are split evenly between the two APs
    #[serde(default = "default_tie_break")]
    pub tie_break: ApSlot,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            ap1_bssid: default_ap1(),
            ap2_bssid: default_ap2(),
            tie_break: default_tie_break(),
        }
    }
}

fn default_ap1() -> MacAddr {
    MacAddr::new([0x68, 0x7d, 0xb4, 0x5f, 0x5c, 0x3b])
}

fn default_ap2() -> MacAddr {
    MacAddr::new([0x14, 0x16, 0x9d, 0x53, 0x58, 0xcb])
}

fn default_tie_break() -> ApSlot {
    ApSlot::Ap1
}

// ── [run] ────────────────────────────────────────────────────────────────

/// What to run and for how long
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub mode: RoamMode,

    #[serde(default)]
    pub station_class: StationCapabilityClass,

    /// Number of roam iterations. Mutually exclusive with `duration_minutes`.
    #[serde(default)]
    pub iterations: Option<u32>,

    /// Wall-clock budget for the loop. Mutually exclusive with `iterations`.
    #[serde(default)]
    pub duration_minutes: Option<u64>,

    /// Judge roams by multicast resumption instead of frame timing
    #[serde(default)]
    pub multicast: bool,

    /// Receive endpoints checked for multicast resumption (empty = all)
    #[serde(default)]
    pub multicast_endpoints: Vec<String>,

    /// Frequencies (MHz) scanned before a directed roam
    #[serde(default = "default_scan_frequencies")]
    pub scan_frequencies: Vec<u32>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: RoamMode::default(),
            station_class: StationCapabilityClass::default(),
            iterations: None,
            duration_minutes: None,
            multicast: false,
            multicast_endpoints: Vec::new(),
            scan_frequencies: default_scan_frequencies(),
        }
    }
}

fn default_scan_frequencies() -> Vec<u32> {
    vec![5180, 5300]
}

/// How long the roam loop keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopBudget {
    Iterations(u32),
    Duration(Duration),
}

// ── [timing] ─────────────────────────────────────────────────────────────

/// Poll intervals and timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Pause after each attenuation step before polling
    #[serde(default = "default_settle_interval_ms")]
    pub settle_interval_ms: u64,

    /// Interval between station state polls while waiting
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long stations get to obtain an IP before the run starts
    #[serde(default = "default_ip_timeout_secs")]
    pub ip_timeout_secs: u64,

    /// How long stations get to regain an IP after a roam
    #[serde(default = "default_reacquire_timeout_secs")]
    pub reacquire_timeout_secs: u64,

    /// Pause after herding commands before re-reading BSSIDs
    #[serde(default = "default_correction_settle_secs")]
    pub correction_settle_secs: u64,

    /// Pause after a hard roam command before stopping the capture
    #[serde(default = "default_roam_settle_secs")]
    pub roam_settle_secs: u64,

    /// Extra wait before re-checking multicast receive rates
    #[serde(default = "default_multicast_retry_wait_secs")]
    pub multicast_retry_wait_secs: u64,

    /// Gap between multicast iterations
    #[serde(default = "default_multicast_iteration_gap_secs")]
    pub multicast_iteration_gap_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_interval_ms: default_settle_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            ip_timeout_secs: default_ip_timeout_secs(),
            reacquire_timeout_secs: default_reacquire_timeout_secs(),
            correction_settle_secs: default_correction_settle_secs(),
            roam_settle_secs: default_roam_settle_secs(),
            multicast_retry_wait_secs: default_multicast_retry_wait_secs(),
            multicast_iteration_gap_secs: default_multicast_iteration_gap_secs(),
        }
    }
}

impl TimingConfig {
    #[must_use]
    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn ip_timeout(&self) -> Duration {
        Duration::from_secs(self.ip_timeout_secs)
    }

    #[must_use]
    pub fn reacquire_timeout(&self) -> Duration {
        Duration::from_secs(self.reacquire_timeout_secs)
    }

    #[must_use]
    pub fn correction_settle(&self) -> Duration {
        Duration::from_secs(self.correction_settle_secs)
    }

    #[must_use]
    pub fn roam_settle(&self) -> Duration {
        Duration::from_secs(self.roam_settle_secs)
    }

    #[must_use]
    pub fn multicast_retry_wait(&self) -> Duration {
        Duration::from_secs(self.multicast_retry_wait_secs)
    }

    #[must_use]
    pub fn multicast_iteration_gap(&self) -> Duration {
        Duration::from_secs(self.multicast_iteration_gap_secs)
    }
}

fn default_settle_interval_ms() -> u64 {
    4000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_ip_timeout_secs() -> u64 {
    120
}

fn default_reacquire_timeout_secs() -> u64 {
    30
}

fn default_correction_settle_secs() -> u64 {
    10
}

fn default_roam_settle_secs() -> u64 {
    10
}

fn default_multicast_retry_wait_secs() -> u64 {
    60
}

fn default_multicast_iteration_gap_secs() -> u64 {
    120
}

// ── [thresholds] ─────────────────────────────────────────────────────────

/// Maximum roam time per transition kind; unset means timing is not judged
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_over_air_ms")]
    pub over_air_ms: Option<f64>,

    #[serde(default)]
    pub over_ds_ms: Option<f64>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            over_air_ms: default_over_air_ms(),
            over_ds_ms: None,
        }
    }
}

fn default_over_air_ms() -> Option<f64> {
    Some(50.0)
}

// ── [attenuation] ────────────────────────────────────────────────────────

/// Soft roam sweep bounds, in the attenuator's native units (ddB on LANforge)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttenuationConfig {
    #[serde(default)]
    pub min: u16,

    #[serde(default = "default_atten_max")]
    pub max: u16,

    #[serde(default = "default_atten_step")]
    pub step: u16,

    /// Which of the two reported attenuators (0 or 1) sits in front of ap1
    #[serde(default)]
    pub ap1_attenuator: usize,
}

impl Default for AttenuationConfig {
    fn default() -> Self {
        Self {
            min: 0,
            max: default_atten_max(),
            step: default_atten_step(),
            ap1_attenuator: 0,
        }
    }
}

fn default_atten_max() -> u16 {
    700
}

fn default_atten_step() -> u16 {
    10
}

// ── [capture] ────────────────────────────────────────────────────────────

/// Sniffer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Radio the monitor interface is created on
    #[serde(default = "default_radio")]
    pub radio: String,

    #[serde(default = "default_channel")]
    pub channel: String,

    #[serde(default = "default_monitor_name")]
    pub monitor_name: String,

    /// Local directory where finished captures appear
    #[serde(default = "default_capture_dir")]
    pub directory: PathBuf,

    /// Upper bound the sniffer runs for if never stopped
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            radio: default_radio(),
            channel: default_channel(),
            monitor_name: default_monitor_name(),
            directory: default_capture_dir(),
            max_duration_secs: default_max_duration_secs(),
        }
    }
}

fn default_radio() -> String {
    "wiphy2".to_string()
}

fn default_channel() -> String {
    "40".to_string()
}

fn default_monitor_name() -> String {
    "moni0".to_string()
}

fn default_capture_dir() -> PathBuf {
    PathBuf::from("captures")
}

fn default_max_duration_secs() -> u64 {
    3600
}

// ── Loading & validation ─────────────────────────────────────────────────

impl RoamConfig {
    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.display().to_string(), e.to_string()))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(raw).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeFailed(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

        if self.targets.ap1_bssid == self.targets.ap2_bssid {
            return invalid(format!(
                "targets.ap1_bssid and targets.ap2_bssid are both {}",
                self.targets.ap1_bssid
            ));
        }
        match (self.run.iterations, self.run.duration_minutes) {
            (Some(_), Some(_)) => {
                return invalid(
                    "run.iterations and run.duration_minutes are mutually exclusive".into(),
                );
            }
            (Some(0), None) => return invalid("run.iterations must be at least 1".into()),
            (None, Some(0)) => return invalid("run.duration_minutes must be at least 1".into()),
            _ => {}
        }
        let atten = &self.attenuation;
        if atten.step == 0 {
            return invalid("attenuation.step must be greater than 0".into());
        }
        if atten.min >= atten.max {
            return invalid(format!(
                "attenuation.min ({}) must be below attenuation.max ({})",
                atten.min, atten.max
            ));
        }
        if atten.ap1_attenuator > 1 {
            return invalid("attenuation.ap1_attenuator must be 0 or 1".into());
        }
        if self.timing.poll_interval_ms == 0 {
            return invalid("timing.poll_interval_ms must be greater than 0".into());
        }
        if self.timing.ip_timeout_secs == 0 {
            return invalid("timing.ip_timeout_secs must be greater than 0".into());
        }
        for (name, value) in [
            ("thresholds.over_air_ms", self.thresholds.over_air_ms),
            ("thresholds.over_ds_ms", self.thresholds.over_ds_ms),
        ] {
            if value.is_some_and(|v| !(v.is_finite() && v > 0.0)) {
                return invalid(format!("{name} must be a positive number"));
            }
        }
        if self.run.scan_frequencies.is_empty() {
            return invalid("run.scan_frequencies must list at least one frequency".into());
        }
        Ok(())
    }

    /// Iteration count or duration; a single iteration when neither is set.
    #[must_use]
    pub fn loop_budget(&self) -> LoopBudget {
        match (self.run.iterations, self.run.duration_minutes) {
            (_, Some(minutes)) => LoopBudget::Duration(Duration::from_secs(minutes * 60)),
            (Some(n), None) => LoopBudget::Iterations(n),
            (None, None) => LoopBudget::Iterations(1),
        }
    }

    #[must_use]
    pub fn roam_targets(&self) -> Option<RoamTargets> {
        RoamTargets::new(self.targets.ap1_bssid, self.targets.ap2_bssid)
    }
}
