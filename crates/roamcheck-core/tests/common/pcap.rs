//! In-memory capture files for extractor and orchestrator tests.

use roamcheck_core::capture::dot11::{
    ACTION_CATEGORY_FAST_BSS_TRANSITION, AUTH_ALG_FAST_BSS_TRANSITION, AUTH_ALG_OPEN_SYSTEM,
    ELEMENT_FAST_BSS_TRANSITION,
};
use roamcheck_core::model::MacAddr;

const LINKTYPE_IEEE802_11: u32 = 105;
const LINKTYPE_IEEE802_11_RADIOTAP: u32 = 127;

/// Builds a classic little-endian pcap with microsecond timestamps.
#[derive(Debug, Default)]
pub struct PcapBuilder {
    radiotap: bool,
    records: Vec<(u64, Vec<u8>)>,
}

impl PcapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix every frame with a minimal 8-byte radiotap header.
    pub fn radiotap(mut self) -> Self {
        self.radiotap = true;
        self
    }

    /// Add a frame at `micros` since the epoch of the capture.
    pub fn frame(mut self, micros: u64, data: Vec<u8>) -> Self {
        self.records.push((micros, data));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let linktype = if self.radiotap {
            LINKTYPE_IEEE802_11_RADIOTAP
        } else {
            LINKTYPE_IEEE802_11
        };
        let mut out = Vec::new();
        out.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&65535u32.to_le_bytes());
        out.extend_from_slice(&linktype.to_le_bytes());
        for (micros, frame) in &self.records {
            let mut data = Vec::new();
            if self.radiotap {
                data.extend_from_slice(&[0, 0, 8, 0, 0, 0, 0, 0]);
            }
            data.extend_from_slice(frame);
            out.extend_from_slice(&((micros / 1_000_000) as u32).to_le_bytes());
            out.extend_from_slice(&((micros % 1_000_000) as u32).to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&data);
        }
        out
    }
}

fn mgmt(subtype: u8, da: MacAddr, sa: MacAddr, bssid: MacAddr, body: &[u8]) -> Vec<u8> {
    let mut frame = vec![subtype << 4, 0, 0, 0];
    frame.extend_from_slice(&da.octets());
    frame.extend_from_slice(&sa.octets());
    frame.extend_from_slice(&bssid.octets());
    frame.extend_from_slice(&[0, 0]);
    frame.extend_from_slice(body);
    frame
}

pub fn beacon(ap: MacAddr) -> Vec<u8> {
    mgmt(8, MacAddr::new([0xff; 6]), ap, ap, &[0; 12])
}

/// Authentication request from `sta` to `ap`, sequence 1.
pub fn auth(sta: MacAddr, ap: MacAddr, ft: bool, status: u16) -> Vec<u8> {
    let alg = if ft {
        AUTH_ALG_FAST_BSS_TRANSITION
    } else {
        AUTH_ALG_OPEN_SYSTEM
    };
    let mut body = Vec::new();
    body.extend_from_slice(&alg.to_le_bytes());
    body.extend_from_slice(&1u16.to_le_bytes());
    body.extend_from_slice(&status.to_le_bytes());
    mgmt(11, ap, sta, ap, &body)
}

/// Reassociation Response from `ap` to `sta`; FT responses carry an FTE.
pub fn reassoc_response(sta: MacAddr, ap: MacAddr, ft: bool, status: u16) -> Vec<u8> {
    let mut body = vec![0x11, 0x00];
    body.extend_from_slice(&status.to_le_bytes());
    body.extend_from_slice(&[0x01, 0xc0]);
    if ft {
        body.extend_from_slice(&[ELEMENT_FAST_BSS_TRANSITION, 2, 0, 0]);
    }
    mgmt(3, sta, ap, ap, &body)
}

/// FT Request action frame from `sta`, relayed through `current` toward `target`.
pub fn ft_action_request(sta: MacAddr, current: MacAddr, target: MacAddr) -> Vec<u8> {
    let mut body = vec![ACTION_CATEGORY_FAST_BSS_TRANSITION, 1];
    body.extend_from_slice(&sta.octets());
    body.extend_from_slice(&target.octets());
    mgmt(13, current, sta, current, &body)
}

/// A plain over-the-air roam: beacon at t=0, auth at `auth_us`, reassociation
/// at `reassoc_us`, for every station in `stations`.
pub fn ota_roam(stations: &[MacAddr], target: MacAddr, auth_us: u64, reassoc_us: u64) -> Vec<u8> {
    let mut builder = PcapBuilder::new().frame(0, beacon(target));
    for sta in stations {
        builder = builder
            .frame(auth_us, auth(*sta, target, false, 0))
            .frame(reassoc_us, reassoc_response(*sta, target, false, 0));
    }
    builder.build()
}
