//! roamcheck-core: Core library for roamcheck
//!
//! Forces Wi-Fi stations to roam between two access points on a LANforge
//! testbed, captures the over-the-air frames of every transition and scores
//! each (iteration, station) pair PASS or FAIL.
//!
//! # Architecture
//!
//! ```text
//! RoamOrchestrator ── start capture ──→ roam (wpa_cli | attenuation sweep)
//!        │                                        ↓
//!        │                              stop capture, re-read BSSIDs
//!        ↓                                        ↓
//!   RunOutcome ←── RoamVerdictEngine ←── FrameTimeExtractor (pcap)
//! ```
//!
//! # Modules
//!
//! - `model`: MACs, BSSIDs, stations, modes, verdicts and result rows
//! - `capture`: pcap/pcapng reading, 802.11 decoding, anchor frame lookup
//! - `attenuation`: Soft roam by two-phase attenuation sweep
//! - `tracker`: Per-station BSSID snapshots and herd-to-one-AP correction
//! - `verdict`: PASS/FAIL scoring with a fixed rule priority
//! - `multicast`: Multicast resumption check
//! - `orchestrator`: The run state machine
//! - `context`: Run-scoped state passed through the orchestrator
//! - `testbed`: Async ports to sniffer, attenuators, stations and traffic
//! - `lanforge`: Testbed implementation over the LANforge JSON API
//! - `command`: wpa_cli roam commands
//! - `report`: Per-station summaries and JSON export
//! - `config`: TOML configuration
//! - `logging`: Structured logging setup
//! - `retry`: Backoff for idempotent testbed reads
//! - `wait`: Bounded polling and cooperative cancellation
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod attenuation;
pub mod capture;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod lanforge;
pub mod logging;
pub mod model;
pub mod multicast;
pub mod orchestrator;
pub mod report;
pub mod retry;
pub mod testbed;
pub mod tracker;
pub mod verdict;
pub mod wait;

pub use error::{Error, Result};

/// Version of the roamcheck-core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
