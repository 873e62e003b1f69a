//! Typed frame predicates and the per-station filter table.

use std::fmt::Write;

use super::dot11::{
    ACTION_CATEGORY_FAST_BSS_TRANSITION, AUTH_ALG_FAST_BSS_TRANSITION, AUTH_ALG_OPEN_SYSTEM,
    ELEMENT_FAST_BSS_TRANSITION, MgmtFrame, MgmtSubtype,
};
use crate::model::{FtTransition, MacAddr, StationCapabilityClass};

/// Which address of the frame must equal the station's MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMatch {
    /// Frame sent to the station (addr1).
    Destination(MacAddr),
    /// Frame sent by the station (addr2).
    Source(MacAddr),
}

/// Conjunction of constraints on a management frame. The status code is
/// read by the lookup, never filtered on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameFilter {
    pub subtype: MgmtSubtype,
    pub address: AddressMatch,
    pub auth_algorithm: Option<u16>,
    pub auth_sequence: Option<u16>,
    pub action_category: Option<u8>,
    pub required_element: Option<u8>,
}

impl FrameFilter {
    fn new(subtype: MgmtSubtype, address: AddressMatch) -> Self {
        Self {
            subtype,
            address,
            auth_algorithm: None,
            auth_sequence: None,
            action_category: None,
            required_element: None,
        }
    }

    #[must_use]
    pub fn matches(&self, frame: &MgmtFrame<'_>) -> bool {
        if frame.subtype != self.subtype {
            return false;
        }
        let address_ok = match self.address {
            AddressMatch::Destination(mac) => frame.destination == mac,
            AddressMatch::Source(mac) => frame.source == mac,
        };
        address_ok
            && self
                .auth_algorithm
                .is_none_or(|a| frame.auth_algorithm() == Some(a))
            && self
                .auth_sequence
                .is_none_or(|s| frame.auth_sequence() == Some(s))
            && self
                .action_category
                .is_none_or(|c| frame.action_category() == Some(c))
            && self.required_element.is_none_or(|e| frame.has_element(e))
    }

    /// The equivalent Wireshark display filter, for logs and manual replay.
    #[must_use]
    pub fn display_filter(&self) -> String {
        let mut out = format!("wlan.fc.type_subtype == {}", self.subtype.type_subtype());
        if let Some(alg) = self.auth_algorithm {
            let _ = write!(out, " && wlan.fixed.auth.alg == {alg}");
        }
        if let Some(seq) = self.auth_sequence {
            let _ = write!(out, " && wlan.fixed.auth_seq == 0x{seq:04x}");
        }
        if let Some(category) = self.action_category {
            let _ = write!(out, " && wlan.fixed.category_code == {category}");
        }
        if let Some(element) = self.required_element {
            let _ = write!(out, " && wlan.tag.number == {element}");
        }
        match self.address {
            AddressMatch::Destination(mac) => {
                let _ = write!(out, " && wlan.da == {mac}");
            }
            AddressMatch::Source(mac) => {
                let _ = write!(out, " && wlan.sa == {mac}");
            }
        }
        out
    }
}

/// Frame kind that opens a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorKind {
    Authentication,
    Action,
}

// No status constraint: a failed frame must still match so the lookup can
// report it as `Failed` rather than `Empty`.
struct ClassRule {
    reassoc_element: Option<u8>,
    auth_algorithm: u16,
    auth_sequence: Option<u16>,
}

const PLAIN_RULE: ClassRule = ClassRule {
    reassoc_element: None,
    auth_algorithm: AUTH_ALG_OPEN_SYSTEM,
    auth_sequence: None,
};

const FT_RULE: ClassRule = ClassRule {
    reassoc_element: Some(ELEMENT_FAST_BSS_TRANSITION),
    auth_algorithm: AUTH_ALG_FAST_BSS_TRANSITION,
    auth_sequence: Some(1),
};

const fn rule_for(class: StationCapabilityClass) -> &'static ClassRule {
    match class {
        StationCapabilityClass::Plain => &PLAIN_RULE,
        StationCapabilityClass::FtPsk
        | StationCapabilityClass::FtSae
        | StationCapabilityClass::FtEap => &FT_RULE,
    }
}

/// The start and end anchors used to time one station's roam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameFilterSet {
    /// Reassociation Response to the station.
    pub end: FrameFilter,
    /// Authentication (over the air) or FT Action (over the DS) from the station.
    pub anchor: FrameFilter,
    pub anchor_kind: AnchorKind,
}

impl FrameFilterSet {
    #[must_use]
    pub fn for_station(
        station: MacAddr,
        class: StationCapabilityClass,
        transition: FtTransition,
    ) -> Self {
        let rule = rule_for(class);

        let mut end = FrameFilter::new(
            MgmtSubtype::ReassocResponse,
            AddressMatch::Destination(station),
        );
        end.required_element = rule.reassoc_element;

        let (anchor, anchor_kind) = match transition {
            FtTransition::OverAir => {
                let mut auth =
                    FrameFilter::new(MgmtSubtype::Authentication, AddressMatch::Source(station));
                auth.auth_algorithm = Some(rule.auth_algorithm);
                auth.auth_sequence = rule.auth_sequence;
                (auth, AnchorKind::Authentication)
            }
            FtTransition::OverDs => {
                let mut action =
                    FrameFilter::new(MgmtSubtype::Action, AddressMatch::Source(station));
                action.action_category = Some(ACTION_CATEGORY_FAST_BSS_TRANSITION);
                (action, AnchorKind::Action)
            }
        };

        Self {
            end,
            anchor,
            anchor_kind,
        }
    }
}
