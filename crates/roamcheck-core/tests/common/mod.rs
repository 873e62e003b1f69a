//! Shared test infrastructure for roamcheck-core integration tests.
//!
//! Import from integration test files with:
//! ```ignore
//! mod common;
//! use common::testbed::FakeTestbed;
//! use common::pcap::PcapBuilder;
//! ```

#![allow(dead_code)]

pub mod pcap;
pub mod testbed;

use roamcheck_core::model::MacAddr;

pub const AP_A: MacAddr = MacAddr::new([0x68, 0x7d, 0xb4, 0x5f, 0x5c, 0x3b]);
pub const AP_B: MacAddr = MacAddr::new([0x14, 0x16, 0x9d, 0x53, 0x58, 0xcb]);

pub fn sta_mac(n: u8) -> MacAddr {
    MacAddr::new([0x02, 0, 0, 0, 0, n])
}
