//! Error types for roamcheck-core

use std::fmt::Write;
use std::path::PathBuf;

use thiserror::Error;

/// Remediation command for resolving an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemediationCommand {
    /// Short label describing the command purpose
    pub label: String,
    /// Command to run
    pub command: String,
}

/// Actionable remediation guidance for an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Remediation {
    /// One-line summary of how to fix the issue
    pub summary: String,
    /// Suggested commands to resolve or diagnose the issue
    pub commands: Vec<RemediationCommand>,
    /// Additional alternative guidance
    pub alternatives: Vec<String>,
}

impl Remediation {
    /// Create a new remediation with a summary
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    /// Add a command
    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.push(RemediationCommand {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    /// Add an alternative suggestion
    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Render remediation text for human-readable output
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.commands.is_empty() {
            let _ = writeln!(output, "  Commands:");
            for cmd in &self.commands {
                let _ = writeln!(output, "    - {}: {}", cmd.label, cmd.command);
            }
        }

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        output
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for roamcheck-core.
///
/// Only run-level failures surface here. Anything that goes wrong inside a
/// single iteration is reported through [`IterationError`] and scored as a
/// FAIL row instead of aborting the run.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Capture file errors
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Testbed (LANforge, attenuator, sniffer) errors
    #[error("Testbed error: {0}")]
    Testbed(#[from] TestbedError),

    /// A subsystem required to start the run did not respond
    #[error("{subsystem} unreachable during setup: {source}")]
    SubsystemUnreachable {
        subsystem: &'static str,
        #[source]
        source: TestbedError,
    },

    /// Stations never obtained an IP address before the run began
    #[error("stations without IP after {waited_secs}s: {}", .stations.join(", "))]
    StationsWithoutIp {
        stations: Vec<String>,
        waited_secs: u64,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was cancelled through its cancel flag
    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

impl Error {
    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Config(err) => Some(err.remediation()),
            Self::Capture(err) => Some(err.remediation()),
            Self::Testbed(err) | Self::SubsystemUnreachable { source: err, .. } => {
                Some(err.remediation())
            }
            Self::StationsWithoutIp { stations, .. } => Some(
                Remediation::new(format!(
                    "Stations did not associate or obtain DHCP leases: {}",
                    stations.join(", ")
                ))
                .command("Check SSID and security", "roamcheck validate-config roam.toml")
                .alternative("Verify both APs broadcast the test SSID and DHCP is reachable.")
                .alternative("Raise timing.ip_timeout_secs for slow DHCP servers."),
            ),
            Self::Io(_) => Some(
                Remediation::new("Check filesystem permissions and paths, then retry.")
                    .alternative("Verify the capture and report directories exist and are writable."),
            ),
            Self::Json(_) => Some(
                Remediation::new("Validate the JSON input and retry.")
                    .alternative("Check for trailing commas or invalid UTF-8."),
            ),
            Self::Cancelled(_) => Some(
                Remediation::new("Run was cancelled. Retry if the cancellation was unexpected.")
                    .alternative("Check whether a duration budget or Ctrl-C triggered the cancellation."),
            ),
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file {0}: {1}")]
    ReadFailed(String, String),

    #[error("Failed to parse config: {0}")]
    ParseFailed(String),

    #[error("Failed to serialize config: {0}")]
    SerializeFailed(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::FileNotFound(path) => Remediation::new(format!(
                "Config file not found: {path}. Verify the path and retry."
            ))
            .command("Check path", format!("ls -l \"{path}\""))
            .alternative("Pass --config with the correct path."),
            Self::ReadFailed(path, _) => Remediation::new(format!(
                "Failed to read config file: {path}. Check permissions."
            ))
            .command("Check permissions", format!("ls -l \"{path}\""))
            .alternative("Ensure the file is readable by the current user."),
            Self::ParseFailed(_) => Remediation::new("Config parse failed. Fix the syntax and retry.")
                .command("Validate", "roamcheck validate-config roam.toml")
                .alternative("Validate the TOML syntax and section names."),
            Self::SerializeFailed(_) => {
                Remediation::new("Failed to serialize configuration. Check config values.")
                    .alternative("Recreate the config from known-good defaults.")
            }
            Self::ValidationError(_) => {
                Remediation::new("Config validation failed. Fix the invalid fields and retry.")
                    .command("Validate", "roamcheck validate-config roam.toml")
                    .alternative("Review validation errors and adjust roam.toml.")
            }
        }
    }
}

/// Errors reading or decoding a capture file
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read capture {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("capture {} is not a readable pcap/pcapng file: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
}

impl CaptureError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::NotFound(path) => Remediation::new(format!(
                "Capture not found at {}. Check that the sniffer output is synced to capture.directory.",
                path.display()
            ))
            .command("List captures", format!("ls -l \"{}\"", parent_display(path)))
            .alternative("Verify the sniffer radio is free and the monitor port came up."),
            Self::Read { path, .. } => Remediation::new(format!(
                "Capture {} exists but could not be read. Check permissions.",
                path.display()
            ))
            .command("Check permissions", format!("ls -l \"{}\"", path.display())),
            Self::Corrupt { path, .. } => Remediation::new(
                "Capture file is truncated or not pcap/pcapng. Re-run the iteration.",
            )
            .command("Inspect", format!("roamcheck inspect-capture \"{}\" --mac <station-mac>", path.display()))
            .alternative("Confirm the sniffer was stopped before the file was copied."),
        }
    }
}

fn parent_display(path: &std::path::Path) -> String {
    path.parent()
        .map_or_else(|| ".".to_string(), |p| p.display().to_string())
}

/// Errors from testbed collaborators (LANforge manager, attenuators, sniffer)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TestbedError {
    /// The request never reached the manager
    #[error("request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    /// The manager answered with an error status
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    /// The manager answered with a body we could not interpret
    #[error("unexpected response from {endpoint}: {reason}")]
    UnexpectedResponse { endpoint: String, reason: String },

    /// The manager reported no attenuators, or fewer than two
    #[error("expected two attenuators, found {found}")]
    MissingAttenuators { found: usize },

    /// A station named in the run is not known to the manager
    #[error("station not found: {0}")]
    StationNotFound(String),

    /// Timeout waiting for the manager
    #[error("request timed out after {0} seconds")]
    Timeout(u64),
}

impl TestbedError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Request { endpoint, .. } => Remediation::new(format!(
                "LANforge manager did not answer {endpoint}. Check lanforge.host and lanforge.port."
            ))
            .command("Check manager", "curl -s http://<lanforge-host>:8080/")
            .alternative("Verify the GUI/manager process is running on the LANforge system."),
            Self::Timeout(secs) => Remediation::new(format!(
                "LANforge manager took longer than {secs}s. Retry when the system is idle."
            ))
            .command("Check manager", "curl -s http://<lanforge-host>:8080/")
            .alternative("Raise lanforge.request_timeout_secs."),
            Self::Status { endpoint, status } => Remediation::new(format!(
                "LANforge rejected {endpoint} with HTTP {status}. Check the entity names in roam.toml."
            ))
            .alternative("Confirm shelf/resource/port ids match the LANforge port manager."),
            Self::UnexpectedResponse { .. } => Remediation::new(
                "LANforge returned an unexpected body; verify the manager version.",
            )
            .alternative("Upgrade LANforge if the JSON API layout changed."),
            Self::MissingAttenuators { found } => Remediation::new(format!(
                "Soft roaming needs two attenuators; LANforge reports {found}."
            ))
            .command("List attenuators", "curl -s http://<lanforge-host>:8080/atten/list")
            .alternative("Use run.mode = \"hard-over-air\" when no attenuators are cabled."),
            Self::StationNotFound(name) => Remediation::new(format!(
                "Station {name} is not present on the LANforge resource."
            ))
            .alternative("Create the stations before starting the roam run."),
        }
    }

    /// Whether a retry of the same request can be expected to succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { .. } | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::UnexpectedResponse { .. }
            | Self::MissingAttenuators { .. }
            | Self::StationNotFound(_) => false,
        }
    }
}

/// Reasons a single iteration could not produce a scored roam.
///
/// The orchestrator catches these, logs them and records a FAIL row per
/// station before continuing with the next iteration.
#[derive(Error, Debug)]
pub enum IterationError {
    #[error("testbed call failed during {stage}: {source}")]
    Testbed {
        stage: &'static str,
        #[source]
        source: TestbedError,
    },

    #[error("stations lost their IP address: {}", .0.join(", "))]
    StationsWithoutIp(Vec<String>),

    #[error("iteration cancelled")]
    Cancelled,
}

impl IterationError {
    pub(crate) fn testbed(stage: &'static str) -> impl FnOnce(TestbedError) -> Self {
        move |source| Self::Testbed { stage, source }
    }
}

/// Format an error with remediation guidance for display.
#[must_use]
pub fn format_error_with_remediation(error: &Error) -> String {
    let mut output = format!("Error: {error}");
    if let Some(remediation) = error.remediation() {
        output.push('\n');
        output.push('\n');
        output.push_str(&remediation.render_plain());
    }
    output
}
