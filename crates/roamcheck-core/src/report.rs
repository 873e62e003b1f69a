//! Run summary for the report collaborator.
//!
//! Per-station pass counts and pass rate, the ordered result rows and the
//! capture / kernel-log artifacts, serialized as JSON.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::model::{IterationResult, MacAddr, StationEid};
use crate::orchestrator::RunOutcome;

#[derive(Debug, Clone, Serialize)]
pub struct StationSummary {
    pub station: StationEid,
    pub mac: MacAddr,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Percentage of passing iterations, 0.0 when nothing ran.
    pub pass_rate: f64,
    /// Mean over rows that carry a roam time.
    pub mean_roam_time_ms: Option<f64>,
}

impl StationSummary {
    #[must_use]
    pub fn from_rows(station: StationEid, mac: MacAddr, rows: &[IterationResult]) -> Self {
        let total = rows.len();
        let passed = rows.iter().filter(|r| r.passed()).count();
        let times: Vec<f64> = rows.iter().filter_map(|r| r.roam_time_ms).collect();
        let mean_roam_time_ms =
            (!times.is_empty()).then(|| times.iter().sum::<f64>() / times.len() as f64);
        Self {
            station,
            mac,
            total,
            passed,
            failed: total - passed,
            pass_rate: if total == 0 {
                0.0
            } else {
                passed as f64 * 100.0 / total as f64
            },
            mean_roam_time_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub iterations: u32,
    pub summaries: Vec<StationSummary>,
    pub rows: Vec<IterationResult>,
    pub capture_files: Vec<PathBuf>,
    pub kernel_logs: Vec<String>,
}

impl RunReport {
    #[must_use]
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        Self {
            started_at: outcome.started_at,
            ended_at: outcome.ended_at,
            iterations: outcome.iterations,
            summaries: outcome
                .stations
                .iter()
                .map(|s| StationSummary::from_rows(s.station.clone(), s.mac, &s.results))
                .collect(),
            rows: outcome.rows().into_iter().cloned().collect(),
            capture_files: outcome.capture_files.clone(),
            kernel_logs: outcome.kernel_logs.clone(),
        }
    }

    #[must_use]
    pub fn total_passed(&self) -> usize {
        self.summaries.iter().map(|s| s.passed).sum()
    }

    #[must_use]
    pub fn total_failed(&self) -> usize {
        self.summaries.iter().map(|s| s.failed).sum()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// One line per station, for terminal output.
    #[must_use]
    pub fn render_summary(&self) -> String {
        let mut out = format!(
            "{} iteration(s), {} passed, {} failed\n",
            self.iterations,
            self.total_passed(),
            self.total_failed()
        );
        for s in &self.summaries {
            let mean = s
                .mean_roam_time_ms
                .map_or_else(|| "-".to_string(), |ms| format!("{ms:.1} ms"));
            out.push_str(&format!(
                "  {:<14} {}  {:>3}/{:<3} pass  {:>5.1}%  mean roam {}\n",
                s.station.to_string(),
                s.mac,
                s.passed,
                s.total,
                s.pass_rate,
                mean
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bssid, Remark, Verdict};
    use crate::orchestrator::StationResults;

    fn row(iteration: u32, port: &str, verdict: Verdict, ms: Option<f64>) -> IterationResult {
        IterationResult {
            iteration_index: iteration,
            station: StationEid::new(1, 1, port),
            bssid_before: "68:7d:b4:5f:5c:3b".parse().unwrap(),
            bssid_after: Bssid::Unassociated,
            roam_time_ms: ms,
            verdict,
            remark: if verdict == Verdict::Pass {
                Remark::PassedAllCriteria
            } else {
                Remark::StationDidNotRoam
            },
            capture_file: None,
            trace_file_ref: None,
        }
    }

    fn outcome() -> RunOutcome {
        let now = Utc::now();
        RunOutcome {
            stations: vec![
                StationResults {
                    station: StationEid::new(1, 1, "wlan0"),
                    mac: "02:00:00:00:00:01".parse().unwrap(),
                    results: vec![
                        row(1, "wlan0", Verdict::Pass, Some(30.0)),
                        row(2, "wlan0", Verdict::Pass, Some(40.0)),
                        row(3, "wlan0", Verdict::Fail, None),
                    ],
                },
                StationResults {
                    station: StationEid::new(1, 1, "wlan1"),
                    mac: "02:00:00:00:00:02".parse().unwrap(),
                    results: vec![],
                },
            ],
            kernel_logs: vec!["kernel_log_iteration_1.txt".into()],
            capture_files: vec![PathBuf::from("captures/roam_normal_ota_iteration_1_x.pcap")],
            iterations: 3,
            started_at: now,
            ended_at: now,
        }
    }

    #[test]
    fn summary_counts_and_rates() {
        let report = RunReport::from_outcome(&outcome());
        let s = &report.summaries[0];
        assert_eq!((s.total, s.passed, s.failed), (3, 2, 1));
        assert!((s.pass_rate - 66.666).abs() < 0.01);
        assert_eq!(s.mean_roam_time_ms, Some(35.0));
        assert_eq!(report.summaries[1].pass_rate, 0.0);
        assert_eq!(report.summaries[1].mean_roam_time_ms, None);
        assert_eq!(report.total_passed(), 2);
    }

    #[test]
    fn json_carries_remarks_verbatim() {
        let report = RunReport::from_outcome(&outcome());
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["rows"][2]["remark"], "station did not roam");
        assert_eq!(json["rows"][2]["verdict"], "FAIL");
        assert_eq!(json["rows"][0]["station"], "1.1.wlan0");
        assert_eq!(json["rows"][0]["bssid_after"], "na");
    }

    #[test]
    fn write_json_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        RunReport::from_outcome(&outcome()).write_json(&path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("\"iterations\": 3"));
    }

    #[test]
    fn summary_text_lists_each_station() {
        let text = RunReport::from_outcome(&outcome()).render_summary();
        assert!(text.starts_with("3 iteration(s), 2 passed, 1 failed"));
        assert!(text.contains("1.1.wlan1"));
    }
}
