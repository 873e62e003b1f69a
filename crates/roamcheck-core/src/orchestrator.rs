//! The roam run state machine.
//!
//! ```text
//! Init → HerdToSingleAp → TrafficRunning → (Roam → Capture → Evaluate)* → Done
//! ```
//!
//! Setup failures (stations without IP, attenuators or sniffer unreachable)
//! abort the run. Anything that fails inside an iteration is logged and
//! recorded as FAIL rows, and the loop moves on.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, warn};

use crate::attenuation::{AttenuationState, AttenuationSweeper};
use crate::capture::{CaptureIndex, iteration_capture_name};
use crate::command::{RoamCommand, RoamDirective};
use crate::config::LoopBudget;
use crate::context::RunContext;
use crate::error::{Error, IterationError, Result, TestbedError};
use crate::model::{
    ApSlot, Bssid, FtTransition, IterationResult, MacAddr, RoamTarget, StationEid, StationRecord,
};
use crate::multicast::check_multicast;
use crate::testbed::{AttenuatorIndex, SnifferRequest, StationField, Testbed, TrafficKind};
use crate::tracker::{BssidSnapshot, StationBssidTracker, herd_target, plan_correction};
use crate::verdict::{CaptureEvidence, RoamObservation, RoamVerdictEngine, aborted_result};
use crate::wait::{PollPolicy, WaitError, WaitFor, wait_for};

/// Where the run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "iteration")]
pub enum RunState {
    Init,
    HerdToSingleAp,
    TrafficRunning,
    Iterating(u32),
    Done,
}

/// Rows and artifacts of one completed iteration.
#[derive(Debug, Clone, Serialize)]
pub struct IterationOutcome {
    pub iteration: u32,
    pub results: Vec<IterationResult>,
    pub capture_file: Option<PathBuf>,
    pub kernel_log: Option<String>,
}

/// Every row for one station, in iteration order.
#[derive(Debug, Clone, Serialize)]
pub struct StationResults {
    pub station: StationEid,
    pub mac: MacAddr,
    pub results: Vec<IterationResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub stations: Vec<StationResults>,
    pub kernel_logs: Vec<String>,
    pub capture_files: Vec<PathBuf>,
    pub iterations: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl RunOutcome {
    /// All rows across stations, ordered by iteration then station.
    #[must_use]
    pub fn rows(&self) -> Vec<&IterationResult> {
        let mut rows: Vec<_> = self.stations.iter().flat_map(|s| &s.results).collect();
        rows.sort_by(|a, b| {
            a.iteration_index
                .cmp(&b.iteration_index)
                .then_with(|| a.station.cmp(&b.station))
        });
        rows
    }
}

/// Attenuator serials mapped to the AP they sit in front of.
#[derive(Debug, Clone)]
struct AttenuatorPair {
    ap1: AttenuationState,
    ap2: AttenuationState,
}

impl AttenuatorPair {
    /// `(away_from, toward)` for a roam off `serving`.
    fn split(&mut self, serving: ApSlot) -> (&mut AttenuationState, &mut AttenuationState) {
        match serving {
            ApSlot::Ap1 => (&mut self.ap1, &mut self.ap2),
            ApSlot::Ap2 => (&mut self.ap2, &mut self.ap1),
        }
    }
}

/// Drives a roam run against a [`Testbed`].
pub struct RoamOrchestrator<'t, T> {
    testbed: &'t T,
    ctx: RunContext,
    verdicts: RoamVerdictEngine,
    sweeper: AttenuationSweeper,
    attenuators: Option<AttenuatorPair>,
    state: RunState,
}

impl<'t, T: Testbed> RoamOrchestrator<'t, T> {
    #[must_use]
    pub fn new(testbed: &'t T, ctx: RunContext) -> Self {
        let verdicts = RoamVerdictEngine::new(ctx.targets, ctx.config.thresholds.clone());
        let sweeper = AttenuationSweeper::from_config(&ctx.config.attenuation, &ctx.config.timing);
        Self {
            testbed,
            ctx,
            verdicts,
            sweeper,
            attenuators: None,
            state: RunState::Init,
        }
    }

    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    #[must_use]
    pub const fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Run setup, the iteration loop and teardown.
    pub async fn run(mut self) -> Result<RunOutcome> {
        let span = self.ctx.span.clone();
        async move {
            let started_at = Utc::now();
            self.init().await?;
            self.herd_and_start_traffic().await?;

            let mut per_station: Vec<Vec<IterationResult>> =
                vec![Vec::new(); self.ctx.stations.len()];
            let mut kernel_logs = Vec::new();
            let mut capture_files = Vec::new();

            let budget = self.ctx.config.loop_budget();
            let loop_start = Instant::now();
            let mut iteration = 0u32;
            loop {
                match budget {
                    LoopBudget::Iterations(n) if iteration >= n => break,
                    LoopBudget::Duration(d) if loop_start.elapsed() >= d => {
                        info!(iterations = iteration, "duration budget exhausted");
                        break;
                    }
                    _ => {}
                }
                if self.ctx.cancel.is_cancelled() {
                    return self.cancelled("between iterations").await;
                }
                iteration += 1;
                self.state = RunState::Iterating(iteration);

                let results = match self.run_iteration(iteration).await {
                    Ok(outcome) => {
                        kernel_logs.extend(outcome.kernel_log);
                        capture_files.extend(outcome.capture_file);
                        outcome.results
                    }
                    Err(IterationError::Cancelled) => {
                        return self.cancelled("during an iteration").await;
                    }
                    Err(err) => {
                        error!(iteration, error = %err, "iteration aborted");
                        self.ctx
                            .stations
                            .iter()
                            .map(|s| aborted_result(iteration, s.eid.clone(), s.connected_bssid))
                            .collect()
                    }
                };
                for row in results {
                    if let Some(idx) = self.ctx.stations.iter().position(|s| s.eid == row.station)
                    {
                        per_station[idx].push(row);
                    }
                }
            }

            self.stop_traffic().await;
            self.state = RunState::Done;
            let stations = self
                .ctx
                .stations
                .iter()
                .zip(per_station)
                .map(|(s, results)| StationResults {
                    station: s.eid.clone(),
                    mac: s.mac,
                    results,
                })
                .collect();
            info!(iterations = iteration, "roam run complete");
            Ok(RunOutcome {
                stations,
                kernel_logs,
                capture_files,
                iterations: iteration,
                started_at,
                ended_at: Utc::now(),
            })
        }
        .instrument(span)
        .await
    }

    async fn cancelled(&mut self, stage: &str) -> Result<RunOutcome> {
        warn!(stage, "run cancelled");
        self.stop_traffic().await;
        self.state = RunState::Done;
        Err(Error::Cancelled(format!("roam run cancelled {stage}")))
    }

    // ── Init ────────────────────────────────────────────────────────────

    async fn init(&mut self) -> Result<()> {
        self.state = RunState::Init;
        let testbed = self.testbed;
        let atten_cfg = &self.ctx.config.attenuation;

        let (first, second) = testbed
            .list_attenuator_serials()
            .await
            .map_err(unreachable("attenuators"))?;
        let (ap1, ap2) = if atten_cfg.ap1_attenuator == 0 {
            (first, second)
        } else {
            (second, first)
        };
        for serial in [&ap1, &ap2] {
            testbed
                .set_attenuation(serial, AttenuatorIndex::All, atten_cfg.min)
                .await
                .map_err(unreachable("attenuators"))?;
        }
        info!(ap1 = %ap1, ap2 = %ap2, value = atten_cfg.min, "attenuators reset");
        self.attenuators = Some(AttenuatorPair {
            ap1: AttenuationState::new(ap1, atten_cfg.min),
            ap2: AttenuationState::new(ap2, atten_cfg.min),
        });

        let stamp = Utc::now().format("%Y-%m-%d-%H-%M-%S").to_string();
        let handle = testbed
            .start_sniffer(&self.sniffer_request(format!("roam_setup_{stamp}.pcap")))
            .await
            .map_err(unreachable("sniffer"))?;

        let eids = testbed
            .station_list()
            .await
            .map_err(unreachable("station query"))?;
        if eids.is_empty() {
            return Err(Error::Testbed(TestbedError::StationNotFound(
                "no stations on the resource".into(),
            )));
        }

        let policy = PollPolicy::new(
            self.ctx.config.timing.poll_interval(),
            self.ctx.config.timing.ip_timeout(),
        );
        match self.wait_for_ips(&eids, policy).await {
            Ok(()) => {}
            Err(WaitError::Cancelled { .. }) => {
                return Err(Error::Cancelled("waiting for station IPs".into()));
            }
            Err(err) => {
                let stations = err
                    .last_observed()
                    .map(|s| s.split(' ').map(str::to_string).collect())
                    .unwrap_or_default();
                return Err(Error::StationsWithoutIp {
                    stations,
                    waited_secs: self.ctx.config.timing.ip_timeout_secs,
                });
            }
        }

        let class = self.ctx.config.run.station_class;
        let mut stations = Vec::with_capacity(eids.len());
        for eid in eids {
            let raw_mac = testbed.station_field(&eid, StationField::Mac).await?;
            let mac = raw_mac
                .parse::<MacAddr>()
                .map_err(|e| TestbedError::UnexpectedResponse {
                    endpoint: format!("port {eid} mac"),
                    reason: e.to_string(),
                })?;
            let bssid = Bssid::from_reported(&testbed.station_field(&eid, StationField::Ap).await?);
            debug!(station = %eid, mac = %mac, bssid = %bssid, "station resolved");
            stations.push(StationRecord {
                eid,
                mac,
                connected_bssid: bssid,
                capability: class,
            });
        }
        self.ctx.stations = stations;

        testbed
            .stop_sniffer(handle)
            .await
            .map_err(unreachable("sniffer"))?;
        info!(stations = self.ctx.stations.len(), "setup complete");
        Ok(())
    }

    fn sniffer_request(&self, file_name: String) -> SnifferRequest {
        let capture = &self.ctx.config.capture;
        SnifferRequest {
            radio: capture.radio.clone(),
            channel: capture.channel.clone(),
            monitor_name: capture.monitor_name.clone(),
            file_name,
            max_duration_secs: capture.max_duration_secs,
        }
    }

    /// Poll until every station reports an IP. On timeout `last_observed`
    /// holds the space-separated stations still without one.
    async fn wait_for_ips(
        &self,
        stations: &[StationEid],
        policy: PollPolicy,
    ) -> std::result::Result<(), WaitError> {
        let testbed = self.testbed;
        wait_for("all stations have an IP", policy, &self.ctx.cancel, move || async move {
            let mut missing = Vec::new();
            for station in stations {
                let has_ip = testbed
                    .station_field(station, StationField::Ip)
                    .await
                    .is_ok_and(|ip| has_address(&ip));
                if !has_ip {
                    missing.push(station.to_string());
                }
            }
            if missing.is_empty() {
                WaitFor::Ready(())
            } else {
                WaitFor::not_ready(Some(missing.join(" ")))
            }
        })
        .await
    }

    // ── Herd & traffic ──────────────────────────────────────────────────

    async fn herd_and_start_traffic(&mut self) -> Result<()> {
        self.state = RunState::HerdToSingleAp;
        let snapshot = self.herd().await;
        self.apply_snapshot(&snapshot);

        let kind = self.traffic_kind();
        self.testbed
            .start_traffic(kind)
            .await
            .map_err(unreachable("traffic"))?;
        self.state = RunState::TrafficRunning;
        info!(traffic = ?kind, "traffic started");
        Ok(())
    }

    const fn traffic_kind(&self) -> TrafficKind {
        if self.ctx.config.run.multicast {
            TrafficKind::Multicast
        } else {
            TrafficKind::Unicast
        }
    }

    async fn stop_traffic(&self) {
        let kind = self.traffic_kind();
        if let Err(err) = self.testbed.stop_traffic(kind).await {
            warn!(error = %err, "failed to stop traffic");
        }
    }

    /// Snapshot the stations and, when they are split across APs, roam the
    /// minority onto the plurality AP. Returns the latest snapshot.
    async fn herd(&self) -> BssidSnapshot {
        let tracker = StationBssidTracker::new(self.testbed, self.ctx.station_eids());
        let snapshot = tracker.snapshot().await;
        if herd_target(&snapshot, &self.ctx.targets).is_some() {
            return snapshot;
        }

        let plan = plan_correction(
            &snapshot,
            &self.ctx.targets,
            self.ctx.config.targets.tie_break,
            &self.ctx.config.run.scan_frequencies,
        );
        warn!(
            stations = %snapshot.describe(),
            majority = %plan.majority.bssid,
            corrections = plan.commands.len(),
            "stations split across APs, herding"
        );
        if plan.is_empty() {
            return snapshot;
        }
        for command in &plan.commands {
            if let Err(err) = self.send(command).await {
                warn!(station = %command.station, error = %err, "correction roam failed");
            }
        }
        if !self
            .ctx
            .cancel
            .sleep(self.ctx.config.timing.correction_settle())
            .await
        {
            return snapshot;
        }
        tracker.snapshot().await
    }

    fn apply_snapshot(&mut self, snapshot: &BssidSnapshot) {
        for station in &mut self.ctx.stations {
            if let Some(bssid) = snapshot.get(&station.eid) {
                station.connected_bssid = bssid;
            }
        }
    }

    async fn send(&self, command: &RoamCommand) -> std::result::Result<(), TestbedError> {
        for cmd in command.wifi_cli_cmds() {
            self.testbed.wifi_cli_cmd(&cmd).await?;
        }
        Ok(())
    }

    // ── Iteration ───────────────────────────────────────────────────────

    /// One roam attempt for every station.
    pub async fn run_iteration(
        &mut self,
        iteration: u32,
    ) -> std::result::Result<IterationOutcome, IterationError> {
        let span = crate::iteration_span!(iteration, mode = %self.ctx.config.run.mode);
        self.iteration_body(iteration).instrument(span).await
    }

    async fn iteration_body(
        &mut self,
        iteration: u32,
    ) -> std::result::Result<IterationOutcome, IterationError> {
        let testbed = self.testbed;
        let timing = self.ctx.config.timing.clone();
        let run_cfg = self.ctx.config.run.clone();
        let cancel = self.ctx.cancel.clone();

        if run_cfg.multicast
            && iteration > 1
            && !cancel.sleep(timing.multicast_iteration_gap()).await
        {
            return Err(IterationError::Cancelled);
        }

        let eids = self.ctx.station_eids();
        self.wait_for_ips(&eids, PollPolicy::new(timing.poll_interval(), timing.ip_timeout()))
            .await
            .map_err(|err| match err {
                WaitError::Cancelled { .. } => IterationError::Cancelled,
                WaitError::Timeout { last_observed, .. } => IterationError::StationsWithoutIp(
                    last_observed
                        .map(|s| s.split(' ').map(str::to_string).collect())
                        .unwrap_or_default(),
                ),
            })?;

        let before = self.herd().await;
        self.apply_snapshot(&before);
        let serving = herd_target(&before, &self.ctx.targets);
        let herd_homogeneous = serving.is_some();

        let stamp = Utc::now().format("%Y-%m-%d-%H-%M-%S").to_string();
        let file_name =
            iteration_capture_name(run_cfg.station_class, run_cfg.mode, iteration, &stamp);
        let handle = testbed
            .start_sniffer(&self.sniffer_request(file_name))
            .await
            .map_err(IterationError::testbed("start sniffer"))?;

        let macs = self.ctx.station_macs();
        let trace_files = self.start_diagnostics(&macs).await;

        if let Some(serving) = serving {
            let herd_bssid = Bssid::from(serving.bssid);
            let target = self.ctx.targets.get(serving.slot.other());
            info!(from = %herd_bssid, to = %target.bssid, "roaming");
            if let Err(err) = self.roam(target, &herd_bssid, &eids).await {
                if let Err(stop_err) = testbed.stop_sniffer(handle).await {
                    warn!(error = %stop_err, "failed to stop sniffer after roam error");
                }
                return Err(err);
            }
        } else {
            warn!(stations = %before.describe(), "stations not on one target AP, skipping roam");
        }

        if !cancel.sleep(timing.roam_settle()).await {
            return Err(IterationError::Cancelled);
        }

        let kernel_log = match testbed.collect_kernel_log(&format!("iteration_{iteration}")).await
        {
            Ok(name) => name,
            Err(err) => {
                warn!(error = %err, "kernel log collection failed");
                None
            }
        };
        if let Err(err) = testbed.stop_debug(&macs).await {
            warn!(error = %err, "failed to stop controller debug");
        }

        let reacquire = PollPolicy::new(timing.poll_interval(), timing.reacquire_timeout());
        match self.wait_for_ips(&eids, reacquire).await {
            Ok(()) => {}
            Err(WaitError::Cancelled { .. }) => return Err(IterationError::Cancelled),
            Err(err) => warn!(error = %err, "stations did not reacquire IP after roam"),
        }

        let capture_file = match testbed.stop_sniffer(handle).await {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(error = %err, "failed to stop sniffer");
                None
            }
        };

        let after = StationBssidTracker::new(testbed, eids.clone()).snapshot().await;

        let multicast = if run_cfg.multicast && herd_homogeneous {
            Some(
                check_multicast(
                    testbed,
                    &run_cfg.multicast_endpoints,
                    timing.multicast_retry_wait(),
                    &cancel,
                )
                .await?,
            )
        } else {
            None
        };

        let index = capture_file.as_deref().and_then(|path| {
            CaptureIndex::open(path)
                .inspect_err(|err| warn!(path = %path.display(), error = %err, "capture unreadable"))
                .ok()
        });

        let mut results = Vec::with_capacity(self.ctx.stations.len());
        for (idx, station) in self.ctx.stations.iter().enumerate() {
            let capture = index.as_ref().map_or(CaptureEvidence::Unavailable, |index| {
                CaptureEvidence::Frames(index.roam_frames(&self.ctx.filters_for(station)))
            });
            let observation = RoamObservation {
                iteration,
                station: station.eid.clone(),
                before: before.get(&station.eid).unwrap_or(Bssid::Unassociated),
                after: after.get(&station.eid).unwrap_or(Bssid::Unassociated),
                herd_homogeneous,
                transition: run_cfg.mode.transition(),
                capture,
                multicast,
                capture_file: capture_file.clone(),
                trace_file: trace_files.get(idx).cloned().flatten(),
            };
            let row = self.verdicts.evaluate(&observation);
            info!(
                station = %row.station,
                from_bssid = %row.bssid_before,
                to_bssid = %row.bssid_after,
                roam_time_ms = ?row.roam_time_ms,
                verdict = %row.verdict,
                remark = %row.remark,
                "iteration result"
            );
            results.push(row);
        }
        self.apply_snapshot(&after);

        Ok(IterationOutcome {
            iteration,
            results,
            capture_file,
            kernel_log,
        })
    }

    /// Start AP-side debugging and fetch the per-station trace file names.
    /// Failures are logged; the roam goes ahead without traces.
    async fn start_diagnostics(&self, macs: &[MacAddr]) -> Vec<Option<String>> {
        if let Err(err) = self.testbed.start_debug(macs).await {
            warn!(error = %err, "failed to start controller debug");
        }
        match self.testbed.trace_files(macs).await {
            Ok(files) => files,
            Err(err) => {
                warn!(error = %err, "trace file lookup failed");
                vec![None; macs.len()]
            }
        }
    }

    async fn roam(
        &mut self,
        target: RoamTarget,
        herd_bssid: &Bssid,
        eids: &[StationEid],
    ) -> std::result::Result<(), IterationError> {
        let run_cfg = &self.ctx.config.run;
        if run_cfg.mode.is_soft() {
            let serving = self.ctx.targets.slot_of(herd_bssid).unwrap_or(target.slot.other());
            let Some(pair) = self.attenuators.as_mut() else {
                return Err(IterationError::Testbed {
                    stage: "attenuation sweep",
                    source: TestbedError::MissingAttenuators { found: 0 },
                });
            };
            let (away_from, toward) = pair.split(serving);
            let mut tracker = StationBssidTracker::new(self.testbed, eids.to_vec());
            let outcome = self
                .sweeper
                .force_roam(
                    self.testbed,
                    away_from,
                    toward,
                    &mut tracker,
                    herd_bssid,
                    &self.ctx.cancel,
                )
                .await?;
            info!(roamed = outcome.roamed, polls = outcome.polls, "attenuation sweep finished");
            return Ok(());
        }

        let directive = match run_cfg.mode.transition() {
            FtTransition::OverDs => RoamDirective::FtDs(target.bssid),
            FtTransition::OverAir => RoamDirective::Roam(target.bssid),
        };
        for eid in eids {
            let command = RoamCommand::new(eid.clone(), &run_cfg.scan_frequencies, directive);
            self.send(&command)
                .await
                .map_err(IterationError::testbed("roam command"))?;
        }
        Ok(())
    }
}

fn unreachable(subsystem: &'static str) -> impl FnOnce(TestbedError) -> Error {
    move |source| Error::SubsystemUnreachable { subsystem, source }
}

/// LANforge reports an unset address as empty, `NA` or `0.0.0.0`.
fn has_address(ip: &str) -> bool {
    let ip = ip.trim();
    !(ip.is_empty() || ip.eq_ignore_ascii_case("na") || ip == "0.0.0.0")
}
