//! Per-station BSSID polling and the herd-to-one-AP correction.

use serde::Serialize;
use tracing::{debug, warn};

use crate::attenuation::BssidPoller;
use crate::command::{RoamCommand, RoamDirective};
use crate::model::{ApSlot, Bssid, RoamTarget, RoamTargets, StationEid};
use crate::testbed::{StationField, StationQuery};

/// BSSID of every station, in station order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BssidSnapshot {
    entries: Vec<(StationEid, Bssid)>,
}

impl BssidSnapshot {
    #[must_use]
    pub fn new(entries: Vec<(StationEid, Bssid)>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StationEid, &Bssid)> {
        self.entries.iter().map(|(eid, bssid)| (eid, bssid))
    }

    #[must_use]
    pub fn get(&self, station: &StationEid) -> Option<Bssid> {
        self.entries
            .iter()
            .find(|(eid, _)| eid == station)
            .map(|(_, bssid)| *bssid)
    }

    #[must_use]
    pub fn bssids(&self) -> Vec<Bssid> {
        self.entries.iter().map(|(_, bssid)| *bssid).collect()
    }

    /// BSSID of the first station, which a homogeneous herd shares.
    #[must_use]
    pub fn first(&self) -> Option<Bssid> {
        self.entries.first().map(|(_, bssid)| *bssid)
    }

    /// Stations grouped by BSSID, for logging.
    #[must_use]
    pub fn describe(&self) -> String {
        self.entries
            .iter()
            .map(|(eid, bssid)| format!("{eid}={bssid}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// True when every station reports the same BSSID as the first one.
#[must_use]
pub fn is_homogeneous(snapshot: &BssidSnapshot) -> bool {
    let mut bssids = snapshot.entries.iter().map(|(_, bssid)| bssid);
    match bssids.next() {
        Some(first) => bssids.all(|bssid| bssid == first),
        None => true,
    }
}

/// The target the whole herd is on, if any.
///
/// `None` when the stations are split, unassociated, or share a BSSID that is
/// neither target: there is no serving AP to roam away from.
#[must_use]
pub fn herd_target(snapshot: &BssidSnapshot, targets: &RoamTargets) -> Option<RoamTarget> {
    if !is_homogeneous(snapshot) {
        return None;
    }
    let slot = targets.slot_of(&snapshot.first()?)?;
    Some(targets.get(slot))
}

/// Roam commands that bring every station onto one AP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrectionPlan {
    pub majority: RoamTarget,
    pub commands: Vec<RoamCommand>,
}

impl CorrectionPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Pick the target holding the most stations (`primary` on a tie) and plan a
/// roam to it for every associated station that is elsewhere.
///
/// Unassociated stations get no command; `roam` needs a current association.
#[must_use]
pub fn plan_correction(
    snapshot: &BssidSnapshot,
    targets: &RoamTargets,
    primary: ApSlot,
    scan_frequencies: &[u32],
) -> CorrectionPlan {
    let count = |slot: ApSlot| {
        snapshot
            .iter()
            .filter(|(_, bssid)| targets.slot_of(bssid) == Some(slot))
            .count()
    };
    let (on_primary, on_other) = (count(primary), count(primary.other()));
    let majority = if on_other > on_primary {
        targets.get(primary.other())
    } else {
        targets.get(primary)
    };

    let commands = snapshot
        .iter()
        .filter(|(_, bssid)| bssid.is_associated() && **bssid != Bssid::from(majority.bssid))
        .map(|(eid, _)| {
            RoamCommand::new(
                eid.clone(),
                scan_frequencies,
                RoamDirective::Roam(majority.bssid),
            )
        })
        .collect();

    CorrectionPlan { majority, commands }
}

/// Reads the serving BSSID of a fixed station list.
#[derive(Debug)]
pub struct StationBssidTracker<'a, Q> {
    query: &'a Q,
    stations: Vec<StationEid>,
}

impl<'a, Q: StationQuery> StationBssidTracker<'a, Q> {
    #[must_use]
    pub fn new(query: &'a Q, stations: Vec<StationEid>) -> Self {
        Self { query, stations }
    }

    #[must_use]
    pub fn stations(&self) -> &[StationEid] {
        &self.stations
    }

    /// Current BSSID of every station. A station whose field cannot be read
    /// is recorded as unassociated.
    pub async fn snapshot(&self) -> BssidSnapshot {
        let mut entries = Vec::with_capacity(self.stations.len());
        for station in &self.stations {
            let bssid = match self.query.station_field(station, StationField::Ap).await {
                Ok(raw) => Bssid::from_reported(&raw),
                Err(err) => {
                    warn!(station = %station, error = %err, "could not read station BSSID");
                    Bssid::Unassociated
                }
            };
            entries.push((station.clone(), bssid));
        }
        let snapshot = BssidSnapshot::new(entries);
        debug!(stations = %snapshot.describe(), "bssid snapshot");
        snapshot
    }
}

impl<Q: StationQuery> BssidPoller for StationBssidTracker<'_, Q> {
    async fn poll(&mut self) -> Vec<Bssid> {
        self.snapshot().await.bssids()
    }
}
