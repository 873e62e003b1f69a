//! Minimal IEEE 802.11 management frame decoding.
//!
//! Only what roam scoring needs: addresses, the fixed fields of
//! authentication / (re)association response / FT action frames, and the
//! tagged element list.

use crate::model::MacAddr;

const MGMT_HEADER_LEN: usize = 24;
const HT_CONTROL_LEN: usize = 4;

const FC_TYPE_MGMT: u8 = 0;
const FC_FLAG_ORDER: u8 = 0x80;

const RADIOTAP_PRESENT_TSFT: u32 = 1 << 0;
const RADIOTAP_PRESENT_FLAGS: u32 = 1 << 1;
const RADIOTAP_PRESENT_EXT: u32 = 1 << 31;
const RADIOTAP_FLAG_FCS: u8 = 0x10;
const FCS_LEN: usize = 4;

/// Element id of the Fast BSS Transition element (FTE).
pub const ELEMENT_FAST_BSS_TRANSITION: u8 = 55;
/// Action frame category for Fast BSS Transition.
pub const ACTION_CATEGORY_FAST_BSS_TRANSITION: u8 = 6;

/// Authentication algorithm numbers.
pub const AUTH_ALG_OPEN_SYSTEM: u16 = 0;
pub const AUTH_ALG_FAST_BSS_TRANSITION: u16 = 2;

/// Management frame subtypes (frame control bits 4..8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MgmtSubtype {
    AssocRequest,
    AssocResponse,
    ReassocRequest,
    ReassocResponse,
    ProbeRequest,
    ProbeResponse,
    Beacon,
    Disassociation,
    Authentication,
    Deauthentication,
    Action,
    Other(u8),
}

impl MgmtSubtype {
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::AssocRequest,
            1 => Self::AssocResponse,
            2 => Self::ReassocRequest,
            3 => Self::ReassocResponse,
            4 => Self::ProbeRequest,
            5 => Self::ProbeResponse,
            8 => Self::Beacon,
            10 => Self::Disassociation,
            11 => Self::Authentication,
            12 => Self::Deauthentication,
            13 => Self::Action,
            other => Self::Other(other),
        }
    }

    /// Value of Wireshark's `wlan.fc.type_subtype` for this subtype.
    #[must_use]
    pub const fn type_subtype(self) -> u8 {
        match self {
            Self::AssocRequest => 0,
            Self::AssocResponse => 1,
            Self::ReassocRequest => 2,
            Self::ReassocResponse => 3,
            Self::ProbeRequest => 4,
            Self::ProbeResponse => 5,
            Self::Beacon => 8,
            Self::Disassociation => 10,
            Self::Authentication => 11,
            Self::Deauthentication => 12,
            Self::Action => 13,
            Self::Other(bits) => bits,
        }
    }
}

/// A decoded management frame borrowing the capture buffer.
#[derive(Debug, Clone, Copy)]
pub struct MgmtFrame<'a> {
    pub subtype: MgmtSubtype,
    /// addr1
    pub destination: MacAddr,
    /// addr2
    pub source: MacAddr,
    /// addr3
    pub bssid: MacAddr,
    pub protected: bool,
    body: &'a [u8],
}

impl<'a> MgmtFrame<'a> {
    /// Decode a raw 802.11 frame. Returns `None` for control/data frames and
    /// anything too short to carry a management header.
    #[must_use]
    pub fn parse(frame: &'a [u8]) -> Option<Self> {
        if frame.len() < MGMT_HEADER_LEN {
            return None;
        }
        let fc0 = frame[0];
        let fc1 = frame[1];
        if fc0 & 0x03 != 0 || (fc0 >> 2) & 0x03 != FC_TYPE_MGMT {
            return None;
        }
        let mut header_len = MGMT_HEADER_LEN;
        if fc1 & FC_FLAG_ORDER != 0 {
            header_len += HT_CONTROL_LEN;
        }
        Some(Self {
            subtype: MgmtSubtype::from_bits(fc0 >> 4),
            destination: MacAddr::from_slice(&frame[4..10])?,
            source: MacAddr::from_slice(&frame[10..16])?,
            bssid: MacAddr::from_slice(&frame[16..22])?,
            protected: fc1 & 0x40 != 0,
            body: frame.get(header_len..).unwrap_or_default(),
        })
    }

    #[must_use]
    pub const fn body(&self) -> &'a [u8] {
        self.body
    }

    fn u16_at(&self, offset: usize) -> Option<u16> {
        let bytes = self.body.get(offset..offset + 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    #[must_use]
    pub fn auth_algorithm(&self) -> Option<u16> {
        match self.subtype {
            MgmtSubtype::Authentication => self.u16_at(0),
            _ => None,
        }
    }

    #[must_use]
    pub fn auth_sequence(&self) -> Option<u16> {
        match self.subtype {
            MgmtSubtype::Authentication => self.u16_at(2),
            _ => None,
        }
    }

    #[must_use]
    pub fn action_category(&self) -> Option<u8> {
        match self.subtype {
            MgmtSubtype::Action => self.body.first().copied(),
            _ => None,
        }
    }

    /// The fixed status code field, for the frame kinds that carry one.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self.subtype {
            MgmtSubtype::Authentication => self.u16_at(4),
            MgmtSubtype::AssocResponse | MgmtSubtype::ReassocResponse => self.u16_at(2),
            // FT Response / FT Confirm: category, action, STA addr, target AP addr, status
            MgmtSubtype::Action
                if self.action_category() == Some(ACTION_CATEGORY_FAST_BSS_TRANSITION)
                    && matches!(self.body.get(1), Some(2 | 4)) =>
            {
                self.u16_at(14)
            }
            _ => None,
        }
    }

    fn elements_offset(&self) -> Option<usize> {
        match self.subtype {
            MgmtSubtype::Authentication
            | MgmtSubtype::AssocResponse
            | MgmtSubtype::ReassocResponse => Some(6),
            MgmtSubtype::AssocRequest => Some(4),
            MgmtSubtype::ReassocRequest => Some(10),
            MgmtSubtype::Beacon | MgmtSubtype::ProbeResponse => Some(12),
            MgmtSubtype::ProbeRequest => Some(0),
            MgmtSubtype::Action
                if self.action_category() == Some(ACTION_CATEGORY_FAST_BSS_TRANSITION) =>
            {
                match self.body.get(1) {
                    Some(1 | 3) => Some(14),
                    Some(2 | 4) => Some(16),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Tagged elements following the fixed fields.
    #[must_use]
    pub fn elements(&self) -> Elements<'a> {
        let data = self
            .elements_offset()
            .and_then(|offset| self.body.get(offset..))
            .unwrap_or_default();
        Elements { data }
    }

    #[must_use]
    pub fn has_element(&self, id: u8) -> bool {
        self.elements().any(|(eid, _)| eid == id)
    }
}

/// Iterator over `(element id, payload)` pairs. Stops at the first element
/// whose length runs past the end of the frame.
#[derive(Debug, Clone)]
pub struct Elements<'a> {
    data: &'a [u8],
}

impl<'a> Iterator for Elements<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let (&id, rest) = self.data.split_first()?;
        let (&len, rest) = rest.split_first()?;
        let len = usize::from(len);
        if rest.len() < len {
            self.data = &[];
            return None;
        }
        let (payload, rest) = rest.split_at(len);
        self.data = rest;
        Some((id, payload))
    }
}

/// Strip a radiotap header (and a trailing FCS, if radiotap says one is
/// present), returning the bare 802.11 frame.
#[must_use]
pub fn strip_radiotap(packet: &[u8]) -> Option<&[u8]> {
    if packet.len() < 8 || packet[0] != 0 {
        return None;
    }
    let header_len = usize::from(u16::from_le_bytes([packet[2], packet[3]]));
    if header_len < 8 || header_len > packet.len() {
        return None;
    }
    let header = &packet[..header_len];
    let mut frame = &packet[header_len..];
    if radiotap_flags(header).is_some_and(|flags| flags & RADIOTAP_FLAG_FCS != 0) {
        frame = &frame[..frame.len().saturating_sub(FCS_LEN)];
    }
    Some(frame)
}

fn radiotap_flags(header: &[u8]) -> Option<u8> {
    let read_word = |offset: usize| -> Option<u32> {
        let b = header.get(offset..offset + 4)?;
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    };
    let present = read_word(4)?;
    if present & RADIOTAP_PRESENT_FLAGS == 0 {
        return None;
    }
    // Skip extended presence bitmaps.
    let mut offset = 8;
    let mut word = present;
    while word & RADIOTAP_PRESENT_EXT != 0 {
        word = read_word(offset)?;
        offset += 4;
    }
    if present & RADIOTAP_PRESENT_TSFT != 0 {
        offset = offset.next_multiple_of(8) + 8;
    }
    header.get(offset).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STA: [u8; 6] = [0x02, 0, 0, 0, 0, 0x01];
    const AP: [u8; 6] = [0x14, 0x16, 0x9d, 0x53, 0x58, 0xcb];

    fn header(subtype: u8, da: [u8; 6], sa: [u8; 6]) -> Vec<u8> {
        let mut f = vec![subtype << 4, 0x00, 0x3a, 0x01];
        f.extend_from_slice(&da);
        f.extend_from_slice(&sa);
        f.extend_from_slice(&AP);
        f.extend_from_slice(&[0x10, 0x00]);
        f
    }

    #[test]
    fn parses_reassociation_response_status_and_elements() {
        let mut f = header(3, STA, AP);
        f.extend_from_slice(&[0x11, 0x00, 0x00, 0x00, 0x01, 0xc0]);
        f.extend_from_slice(&[0, 3, b'a', b'b', b'c']);
        f.extend_from_slice(&[55, 2, 0xaa, 0xbb]);
        let frame = MgmtFrame::parse(&f).unwrap();
        assert_eq!(frame.subtype, MgmtSubtype::ReassocResponse);
        assert_eq!(frame.destination, MacAddr::new(STA));
        assert_eq!(frame.status_code(), Some(0));
        assert!(frame.has_element(ELEMENT_FAST_BSS_TRANSITION));
        assert_eq!(frame.elements().count(), 2);
    }

    #[test]
    fn parses_authentication_fixed_fields() {
        let mut f = header(11, AP, STA);
        f.extend_from_slice(&[0x02, 0x00, 0x01, 0x00, 0x00, 0x00]);
        let frame = MgmtFrame::parse(&f).unwrap();
        assert_eq!(frame.auth_algorithm(), Some(AUTH_ALG_FAST_BSS_TRANSITION));
        assert_eq!(frame.auth_sequence(), Some(1));
        assert_eq!(frame.status_code(), Some(0));
        assert_eq!(frame.source, MacAddr::new(STA));
    }

    #[test]
    fn ft_action_request_has_category_but_no_status() {
        let mut f = header(13, AP, STA);
        f.extend_from_slice(&[6, 1]);
        f.extend_from_slice(&STA);
        f.extend_from_slice(&AP);
        let frame = MgmtFrame::parse(&f).unwrap();
        assert_eq!(frame.action_category(), Some(ACTION_CATEGORY_FAST_BSS_TRANSITION));
        assert_eq!(frame.status_code(), None);
    }

    #[test]
    fn rejects_data_frames_and_short_buffers() {
        let mut data = header(0, STA, AP);
        data[0] = 0x08; // type 2 (data)
        assert!(MgmtFrame::parse(&data).is_none());
        assert!(MgmtFrame::parse(&[0xb0, 0x00, 0x00]).is_none());
    }

    #[test]
    fn order_flag_skips_ht_control() {
        let mut f = header(3, STA, AP);
        f[1] = FC_FLAG_ORDER;
        f.extend_from_slice(&[0xff, 0xff, 0xff, 0xff]);
        f.extend_from_slice(&[0x11, 0x00, 0x25, 0x00, 0x01, 0xc0]);
        let frame = MgmtFrame::parse(&f).unwrap();
        assert_eq!(frame.status_code(), Some(0x25));
    }

    #[test]
    fn truncated_element_stops_iteration() {
        let mut f = header(3, STA, AP);
        f.extend_from_slice(&[0x11, 0x00, 0x00, 0x00, 0x01, 0xc0]);
        f.extend_from_slice(&[55, 9, 0xaa]);
        let frame = MgmtFrame::parse(&f).unwrap();
        assert!(!frame.has_element(ELEMENT_FAST_BSS_TRANSITION));
    }

    #[test]
    fn strips_minimal_radiotap() {
        let mut packet = vec![0, 0, 8, 0, 0, 0, 0, 0];
        packet.extend_from_slice(&[0xb0, 0x00]);
        assert_eq!(strip_radiotap(&packet), Some(&[0xb0, 0x00][..]));
    }

    #[test]
    fn strips_fcs_when_flagged() {
        // present = TSFT | FLAGS; TSFT at offset 8 (aligned), flags at 16
        let mut packet = vec![0, 0, 17, 0, 0x03, 0, 0, 0];
        packet.extend_from_slice(&[0; 8]);
        packet.push(RADIOTAP_FLAG_FCS);
        packet.extend_from_slice(&[0xb0, 0x00, 0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(strip_radiotap(&packet), Some(&[0xb0, 0x00][..]));
    }

    #[test]
    fn rejects_bad_radiotap_length() {
        assert!(strip_radiotap(&[0, 0, 64, 0, 0, 0, 0, 0]).is_none());
        assert!(strip_radiotap(&[1, 0, 8, 0, 0, 0, 0, 0]).is_none());
    }
}
