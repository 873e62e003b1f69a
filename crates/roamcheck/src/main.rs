//! roamcheck - Wi-Fi client roaming verification against a LANforge testbed.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use roamcheck_core::capture::{CaptureIndex, FrameFilterSet, RoamFrames};
use roamcheck_core::config::{LogFormat, RoamConfig};
use roamcheck_core::context::RunContext;
use roamcheck_core::error::format_error_with_remediation;
use roamcheck_core::lanforge::LanforgeTestbed;
use roamcheck_core::logging::init_logging;
use roamcheck_core::model::{FtTransition, MacAddr, RoamMode, StationCapabilityClass};
use roamcheck_core::orchestrator::RoamOrchestrator;
use roamcheck_core::report::RunReport;
use roamcheck_core::wait::CancelFlag;

#[derive(Parser)]
#[command(name = "roamcheck")]
#[command(version)]
#[command(about = "Force Wi-Fi stations to roam and score every transition", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run roam iterations against the configured testbed
    Run(RunArgs),

    /// Time one station's roam from an existing capture
    InspectCapture(InspectArgs),

    /// Parse and validate a config file, then print the effective config
    ValidateConfig {
        /// Path to the TOML config
        file: PathBuf,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Path to the TOML config
    #[arg(short, long, env = "ROAMCHECK_CONFIG", default_value = "roam.toml")]
    config: PathBuf,

    /// Number of roam iterations
    #[arg(long, conflicts_with = "duration_minutes")]
    iterations: Option<u32>,

    /// Run iterations for this many minutes instead of a fixed count
    #[arg(long)]
    duration_minutes: Option<u64>,

    /// Roam mode: hard-over-air, hard-over-ds or soft-attenuation
    #[arg(long)]
    mode: Option<RoamMode>,

    /// Where to write the JSON report (default: roam_report_<timestamp>.json)
    #[arg(long)]
    report: Option<PathBuf>,

    /// Log output format: pretty or json
    #[arg(long)]
    log_format: Option<LogFormat>,
}

#[derive(clap::Args)]
struct InspectArgs {
    /// pcap or pcapng capture file
    pcap: PathBuf,

    /// Station MAC address
    #[arg(long)]
    mac: MacAddr,

    /// Station capability class: plain, ft-psk, ft-sae or ft-eap
    #[arg(long, default_value = "plain")]
    class: StationCapabilityClass,

    /// Which exchange opens the transition
    #[arg(long, value_enum, default_value_t = TransitionArg::Ota)]
    transition: TransitionArg,
}

#[derive(Clone, Copy, ValueEnum)]
enum TransitionArg {
    /// Over the air (Authentication anchor)
    Ota,
    /// Over the distribution system (FT Action anchor)
    Otds,
}

impl From<TransitionArg> for FtTransition {
    fn from(arg: TransitionArg) -> Self {
        match arg {
            TransitionArg::Ota => Self::OverAir,
            TransitionArg::Otds => Self::OverDs,
        }
    }
}

#[derive(Serialize)]
struct InspectOutput<'a> {
    capture: &'a Path,
    station: MacAddr,
    class: StationCapabilityClass,
    transition: FtTransition,
    frames_total: usize,
    end_filter: String,
    anchor_filter: String,
    frames: RoamFrames,
    roam_time_ms: Option<f64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::InspectCapture(args) => inspect_capture(&args),
        Commands::ValidateConfig { file } => validate_config(&file),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<roamcheck_core::Error>() {
                Some(core) => eprintln!("{}", format_error_with_remediation(core)),
                None => eprintln!("Error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = RoamConfig::load_from(&args.config).map_err(roamcheck_core::Error::from)?;
    if let Some(n) = args.iterations {
        config.run.iterations = Some(n);
        config.run.duration_minutes = None;
    }
    if let Some(minutes) = args.duration_minutes {
        config.run.duration_minutes = Some(minutes);
        config.run.iterations = None;
    }
    if let Some(mode) = args.mode {
        config.run.mode = mode;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }
    init_logging(&config.logging).context("failed to initialize logging")?;

    let cancel = CancelFlag::new();
    let ctx = RunContext::new(config, cancel.clone())?;
    let testbed =
        LanforgeTestbed::new(&ctx.config.lanforge, ctx.config.capture.directory.clone())
            .map_err(roamcheck_core::Error::from)?;
    tracing::info!(
        lanforge = testbed.base_url(),
        mode = %ctx.config.run.mode,
        class = %ctx.config.run.station_class,
        "starting roam run"
    );

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after the current step");
                cancel.cancel();
            }
        }
    });

    let outcome = RoamOrchestrator::new(&testbed, ctx).run().await?;
    let report = RunReport::from_outcome(&outcome);
    let path = args.report.unwrap_or_else(|| {
        PathBuf::from(format!(
            "roam_report_{}.json",
            report.started_at.format("%Y-%m-%d-%H-%M-%S")
        ))
    });
    report.write_json(&path)?;
    print!("{}", report.render_summary());
    println!("report: {}", path.display());
    Ok(())
}

fn inspect_capture(args: &InspectArgs) -> anyhow::Result<()> {
    let index = CaptureIndex::open(&args.pcap).map_err(roamcheck_core::Error::from)?;
    let transition = FtTransition::from(args.transition);
    let filters = FrameFilterSet::for_station(args.mac, args.class, transition);
    let frames = index.roam_frames(&filters);
    let output = InspectOutput {
        capture: &args.pcap,
        station: args.mac,
        class: args.class,
        transition,
        frames_total: index.frame_count(),
        end_filter: filters.end.display_filter(),
        anchor_filter: filters.anchor.display_filter(),
        frames,
        roam_time_ms: frames.roam_time_ms(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn validate_config(file: &Path) -> anyhow::Result<()> {
    let config = RoamConfig::load_from(file).map_err(roamcheck_core::Error::from)?;
    print!("{}", config.to_toml_string().map_err(roamcheck_core::Error::from)?);
    Ok(())
}
