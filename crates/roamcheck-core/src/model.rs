//! Domain types shared by every stage of a roam run.
//!
//! BSSIDs and MACs are normalized at the edge: anything read from the testbed
//! or a config file is parsed into [`MacAddr`] / [`Bssid`] once, so the rest of
//! the crate compares values instead of case-folded strings.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ── Addresses ────────────────────────────────────────────────────────────

/// A 48-bit IEEE MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr(pub [u8; 6]);

/// Error returned when a MAC/BSSID string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid MAC address: {0:?}")]
pub struct ParseMacError(pub String);

impl MacAddr {
    #[must_use]
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Read a MAC from the first six bytes of `bytes`.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let octets: [u8; 6] = bytes.get(..6)?.try_into().ok()?;
        Some(Self(octets))
    }
}

impl FromStr for MacAddr {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parts: Vec<&str> = trimmed.split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(ParseMacError(s.to_string()));
        }
        let mut octets = [0u8; 6];
        for (slot, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(ParseMacError(s.to_string()));
            }
            *slot = u8::from_str_radix(part, 16).map_err(|_| ParseMacError(s.to_string()))?;
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The AP a station is currently associated with, or the unassociated sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bssid {
    Associated(MacAddr),
    Unassociated,
}

/// Strings LANforge reports for a station that is not associated.
const UNASSOCIATED_SENTINELS: &[&str] = &["", "na", "n/a", "not-associated", "none"];

impl Bssid {
    #[must_use]
    pub const fn is_associated(&self) -> bool {
        matches!(self, Self::Associated(_))
    }

    #[must_use]
    pub const fn mac(&self) -> Option<MacAddr> {
        match self {
            Self::Associated(mac) => Some(*mac),
            Self::Unassociated => None,
        }
    }

    /// Lenient parse used for values read back from the testbed: anything that
    /// is neither a sentinel nor a MAC is treated as unassociated.
    #[must_use]
    pub fn from_reported(raw: &str) -> Self {
        raw.parse().unwrap_or(Self::Unassociated)
    }
}

impl From<MacAddr> for Bssid {
    fn from(mac: MacAddr) -> Self {
        Self::Associated(mac)
    }
}

impl FromStr for Bssid {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        if UNASSOCIATED_SENTINELS.contains(&lowered.as_str()) {
            return Ok(Self::Unassociated);
        }
        lowered.parse().map(Self::Associated)
    }
}

impl fmt::Display for Bssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Associated(mac) => mac.fmt(f),
            Self::Unassociated => f.write_str("na"),
        }
    }
}

impl Serialize for Bssid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Bssid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ── Roam targets ─────────────────────────────────────────────────────────

/// Which of the two configured access points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApSlot {
    Ap1,
    Ap2,
}

impl ApSlot {
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Ap1 => Self::Ap2,
            Self::Ap2 => Self::Ap1,
        }
    }
}

impl fmt::Display for ApSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ap1 => f.write_str("ap1"),
            Self::Ap2 => f.write_str("ap2"),
        }
    }
}

/// One BSSID a station may roam to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoamTarget {
    pub slot: ApSlot,
    pub bssid: MacAddr,
}

/// The two targets of a run. Fixed at construction; the two BSSIDs differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoamTargets {
    ap1: MacAddr,
    ap2: MacAddr,
}

impl RoamTargets {
    /// Returns `None` when both targets are the same BSSID.
    #[must_use]
    pub fn new(ap1: MacAddr, ap2: MacAddr) -> Option<Self> {
        (ap1 != ap2).then_some(Self { ap1, ap2 })
    }

    #[must_use]
    pub const fn get(&self, slot: ApSlot) -> RoamTarget {
        match slot {
            ApSlot::Ap1 => RoamTarget {
                slot,
                bssid: self.ap1,
            },
            ApSlot::Ap2 => RoamTarget {
                slot,
                bssid: self.ap2,
            },
        }
    }

    /// Which target, if any, a reported BSSID corresponds to.
    #[must_use]
    pub fn slot_of(&self, bssid: &Bssid) -> Option<ApSlot> {
        match bssid {
            Bssid::Associated(mac) if *mac == self.ap1 => Some(ApSlot::Ap1),
            Bssid::Associated(mac) if *mac == self.ap2 => Some(ApSlot::Ap2),
            _ => None,
        }
    }

    #[must_use]
    pub fn contains(&self, bssid: &Bssid) -> bool {
        self.slot_of(bssid).is_some()
    }
}

// ── Stations ─────────────────────────────────────────────────────────────

/// LANforge entity id of a station port, written `shelf.resource.port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationEid {
    pub shelf: u16,
    pub resource: u16,
    pub port: String,
}

impl StationEid {
    #[must_use]
    pub fn new(shelf: u16, resource: u16, port: impl Into<String>) -> Self {
        Self {
            shelf,
            resource,
            port: port.into(),
        }
    }
}

impl FromStr for StationEid {
    type Err = String;

    /// Accepts `1.1.wlan0` or a bare port name (shelf 1, resource 1).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty station name".to_string());
        }
        let mut parts = s.splitn(3, '.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(shelf), Some(resource), Some(port)) => {
                match (shelf.parse(), resource.parse()) {
                    (Ok(shelf), Ok(resource)) if !port.is_empty() => {
                        Ok(Self::new(shelf, resource, port))
                    }
                    _ => Ok(Self::new(1, 1, s)),
                }
            }
            _ => Ok(Self::new(1, 1, s)),
        }
    }
}

impl fmt::Display for StationEid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.shelf, self.resource, self.port)
    }
}

impl Serialize for StationEid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StationEid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Security/roaming capability of a station, which decides what frames mark
/// the start and end of its transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StationCapabilityClass {
    #[default]
    Plain,
    FtPsk,
    FtSae,
    FtEap,
}

impl StationCapabilityClass {
    /// Stations that perform 802.11r fast BSS transitions.
    #[must_use]
    pub const fn is_fast_transition(self) -> bool {
        !matches!(self, Self::Plain)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::FtPsk => "ft-psk",
            Self::FtSae => "ft-sae",
            Self::FtEap => "ft-eap",
        }
    }
}

impl fmt::Display for StationCapabilityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StationCapabilityClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "plain" | "normal" => Ok(Self::Plain),
            "ft-psk" => Ok(Self::FtPsk),
            "ft-sae" => Ok(Self::FtSae),
            "ft-eap" => Ok(Self::FtEap),
            other => Err(format!(
                "unknown station class: {other}. Expected one of: plain, ft-psk, ft-sae, ft-eap"
            )),
        }
    }
}

/// A station under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationRecord {
    pub eid: StationEid,
    /// Resolved once, after the station first associates.
    pub mac: MacAddr,
    /// Refreshed on every poll.
    pub connected_bssid: Bssid,
    pub capability: StationCapabilityClass,
}

// ── Roam mode ────────────────────────────────────────────────────────────

/// How a roam is provoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoamMode {
    /// `roam <bssid>` through wpa_cli, FT over the air.
    #[default]
    HardOverAir,
    /// `ft_ds <bssid>` through wpa_cli, FT over the distribution system.
    HardOverDs,
    /// Attenuation sweep until the station gives up its AP on its own.
    SoftAttenuation,
}

/// Which frame exchange opens an FT transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FtTransition {
    /// Authentication frames exchanged with the target AP.
    OverAir,
    /// FT Action frames relayed through the current AP.
    OverDs,
}

impl RoamMode {
    #[must_use]
    pub const fn transition(self) -> FtTransition {
        match self {
            Self::HardOverAir | Self::SoftAttenuation => FtTransition::OverAir,
            Self::HardOverDs => FtTransition::OverDs,
        }
    }

    #[must_use]
    pub const fn is_soft(self) -> bool {
        matches!(self, Self::SoftAttenuation)
    }

    /// Short tag used in capture file names.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::HardOverAir => "ota",
            Self::HardOverDs => "otds",
            Self::SoftAttenuation => "soft",
        }
    }
}

impl fmt::Display for RoamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::HardOverAir => "hard-over-air",
            Self::HardOverDs => "hard-over-ds",
            Self::SoftAttenuation => "soft-attenuation",
        })
    }
}

impl FromStr for RoamMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hard-over-air" | "ota" => Ok(Self::HardOverAir),
            "hard-over-ds" | "otds" => Ok(Self::HardOverDs),
            "soft-attenuation" | "soft" => Ok(Self::SoftAttenuation),
            other => Err(format!(
                "unknown roam mode: {other}. Expected one of: hard-over-air, hard-over-ds, soft-attenuation"
            )),
        }
    }
}

// ── Results ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        })
    }
}

/// Reason attached to every verdict. Each row carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Remark {
    PassedAllCriteria,
    NotHomogeneous,
    StationDidNotRoam,
    BssidMismatch,
    NoCaptureAvailable,
    NoReassociation,
    NoAuthFrame,
    NoActionFrame,
    ReassociationFailure,
    AuthFail,
    FramesOutOfOrder,
    RoamTimeExceeded,
    MulticastResumed,
    MulticastResumedAfterRetry,
    MulticastNotResumed,
    IterationAborted,
}

impl Remark {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PassedAllCriteria => "Passed all criteria",
            Self::NotHomogeneous => "no roam performed, all stations not on same AP",
            Self::StationDidNotRoam => "station did not roam",
            Self::BssidMismatch => "BSSID mismatch",
            Self::NoCaptureAvailable => "No capture available",
            Self::NoReassociation => "No Reassociation",
            Self::NoAuthFrame => "No Auth frame",
            Self::NoActionFrame => "No Action frame",
            Self::ReassociationFailure => "Reassociation failure",
            Self::AuthFail => "Auth Fail",
            Self::FramesOutOfOrder => "Reassociation precedes anchor frame",
            Self::RoamTimeExceeded => "Roam time exceeds threshold",
            Self::MulticastResumed => "multicast resumed after roam",
            Self::MulticastResumedAfterRetry => {
                "bssid switched and multicast resumed after few trials"
            }
            Self::MulticastNotResumed => "multicast did not resume after few trials",
            Self::IterationAborted => "iteration aborted",
        }
    }
}

impl fmt::Display for Remark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Remark {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One row of output: a single station in a single iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationResult {
    /// 1-based.
    pub iteration_index: u32,
    pub station: StationEid,
    pub bssid_before: Bssid,
    pub bssid_after: Bssid,
    pub roam_time_ms: Option<f64>,
    pub verdict: Verdict,
    pub remark: Remark,
    pub capture_file: Option<PathBuf>,
    pub trace_file_ref: Option<String>,
}

impl IterationResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}
