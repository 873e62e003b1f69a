//! Reading 802.11 frames out of pcap / pcapng files.

use std::fs::File;
use std::path::Path;

use pcap_parser::pcapng::Block;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{PcapBlockOwned, PcapError};
use tracing::{debug, warn};

use super::dot11::strip_radiotap;
use crate::error::CaptureError;

const LINKTYPE_IEEE802_11: i32 = 105;
const LINKTYPE_IEEE802_11_RADIOTAP: i32 = 127;

const READER_CAPACITY: usize = 1 << 16;
const NANOS_PER_SEC: u128 = 1_000_000_000;

/// A captured 802.11 frame with link-layer headers removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    /// Absolute capture time in nanoseconds since the epoch.
    pub timestamp_ns: u64,
    pub data: Vec<u8>,
}

/// All 802.11 frames from one capture file, in file order.
#[derive(Debug, Clone, Default)]
pub struct CaptureFile {
    /// Timestamp of the first record in the file, of any link type.
    pub first_timestamp_ns: Option<u64>,
    pub frames: Vec<CapturedFrame>,
}

impl CaptureFile {
    /// Seconds between the start of the capture and `frame`.
    #[must_use]
    pub fn relative_seconds(&self, frame: &CapturedFrame) -> f64 {
        let base = self.first_timestamp_ns.unwrap_or(frame.timestamp_ns);
        frame.timestamp_ns.saturating_sub(base) as f64 / NANOS_PER_SEC as f64
    }
}

#[derive(Debug, Clone, Copy)]
struct LinkFormat {
    linktype: i32,
    ticks_per_sec: u128,
}

impl LinkFormat {
    fn to_nanos(self, ticks: u128) -> u64 {
        u64::try_from(ticks.saturating_mul(NANOS_PER_SEC) / self.ticks_per_sec.max(1))
            .unwrap_or(u64::MAX)
    }

    fn frame<'a>(self, packet: &'a [u8]) -> Option<&'a [u8]> {
        match self.linktype {
            LINKTYPE_IEEE802_11_RADIOTAP => strip_radiotap(packet),
            LINKTYPE_IEEE802_11 => Some(packet),
            _ => None,
        }
    }
}

/// pcapng `if_tsresol`: high bit set means a power of two, else a power of ten.
fn ticks_per_sec(tsresol: u8) -> u128 {
    let exp = u32::from(tsresol & 0x7f);
    if tsresol & 0x80 != 0 {
        1u128.checked_shl(exp).unwrap_or(u128::MAX)
    } else {
        10u128.checked_pow(exp).unwrap_or(u128::MAX)
    }
}

fn corrupt(path: &Path, reason: impl Into<String>) -> CaptureError {
    CaptureError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Read every 802.11 frame from a classic pcap or pcapng file.
///
/// Records on other link types are skipped. A truncated final record ends
/// the read without an error; everything before it is kept.
pub fn read_capture(path: &Path) -> Result<CaptureFile, CaptureError> {
    if !path.exists() {
        return Err(CaptureError::NotFound(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|source| CaptureError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = pcap_parser::create_reader(READER_CAPACITY, file)
        .map_err(|e| corrupt(path, format!("{e:?}")))?;

    let mut legacy: Option<LinkFormat> = None;
    let mut interfaces: Vec<LinkFormat> = Vec::new();
    let mut capture = CaptureFile::default();
    let mut skipped = 0usize;
    let mut stalled = false;

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                stalled = false;
                let record = match block {
                    PcapBlockOwned::LegacyHeader(header) => {
                        let nanos = matches!(header.magic_number, 0xa1b2_3c4d | 0x4d3c_b2a1);
                        legacy = Some(LinkFormat {
                            linktype: header.network.0,
                            ticks_per_sec: if nanos { NANOS_PER_SEC } else { 1_000_000 },
                        });
                        None
                    }
                    PcapBlockOwned::Legacy(packet) => legacy.map(|format| {
                        let ticks = u128::from(packet.ts_sec) * format.ticks_per_sec
                            + u128::from(packet.ts_usec);
                        (format, format.to_nanos(ticks), packet.data.to_vec())
                    }),
                    PcapBlockOwned::NG(Block::SectionHeader(_)) => {
                        interfaces.clear();
                        None
                    }
                    PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                        interfaces.push(LinkFormat {
                            linktype: idb.linktype.0,
                            ticks_per_sec: ticks_per_sec(idb.if_tsresol),
                        });
                        None
                    }
                    PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                        interfaces.get(epb.if_id as usize).copied().map(|format| {
                            let ticks = (u128::from(epb.ts_high) << 32) | u128::from(epb.ts_low);
                            let caplen = (epb.caplen as usize).min(epb.data.len());
                            (format, format.to_nanos(ticks), epb.data[..caplen].to_vec())
                        })
                    }
                    PcapBlockOwned::NG(_) => None,
                };
                reader.consume(offset);

                if let Some((format, timestamp_ns, packet)) = record {
                    capture.first_timestamp_ns.get_or_insert(timestamp_ns);
                    match format.frame(&packet) {
                        Some(frame) => capture.frames.push(CapturedFrame {
                            timestamp_ns,
                            data: frame.to_vec(),
                        }),
                        None => skipped += 1,
                    }
                }
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                if stalled {
                    warn!(path = %path.display(), "capture ends in a truncated record");
                    break;
                }
                stalled = true;
                reader
                    .refill()
                    .map_err(|e| corrupt(path, format!("{e:?}")))?;
            }
            Err(e) => return Err(corrupt(path, format!("{e:?}"))),
        }
    }

    debug!(
        path = %path.display(),
        frames = capture.frames.len(),
        skipped,
        "capture read"
    );
    Ok(capture)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn legacy_pcap(linktype: u32, records: &[(u32, u32, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&65535u32.to_le_bytes());
        out.extend_from_slice(&linktype.to_le_bytes());
        for (sec, usec, data) in records {
            out.extend_from_slice(&sec.to_le_bytes());
            out.extend_from_slice(&usec.to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(data);
        }
        out
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn ticks_per_sec_decodes_both_bases() {
        assert_eq!(ticks_per_sec(6), 1_000_000);
        assert_eq!(ticks_per_sec(9), 1_000_000_000);
        assert_eq!(ticks_per_sec(0x80 | 10), 1024);
    }

    #[test]
    fn reads_plain_80211_records_with_relative_time() {
        let frame = [0xb0u8; 30];
        let bytes = legacy_pcap(105, &[(100, 0, &frame), (100, 250_000, &frame)]);
        let file = write_temp(&bytes);
        let capture = read_capture(file.path()).unwrap();
        assert_eq!(capture.frames.len(), 2);
        assert_eq!(capture.relative_seconds(&capture.frames[1]), 0.25);
    }

    #[test]
    fn other_link_types_are_skipped() {
        let bytes = legacy_pcap(1, &[(1, 0, &[0u8; 40])]);
        let file = write_temp(&bytes);
        let capture = read_capture(file.path()).unwrap();
        assert!(capture.frames.is_empty());
        assert_eq!(capture.first_timestamp_ns, Some(1_000_000_000));
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = read_capture(Path::new("/nonexistent/roam.pcap")).unwrap_err();
        assert!(matches!(err, CaptureError::NotFound(_)));
    }

    #[test]
    fn garbage_file_is_corrupt() {
        let file = write_temp(b"definitely not a capture file, just some text");
        let err = read_capture(file.path()).unwrap_err();
        assert!(matches!(err, CaptureError::Corrupt { .. }));
    }

    #[test]
    fn truncated_tail_keeps_complete_records() {
        let frame = [0xb0u8; 30];
        let mut bytes = legacy_pcap(105, &[(5, 0, &frame), (5, 10, &frame)]);
        bytes.truncate(bytes.len() - 10);
        let file = write_temp(&bytes);
        let capture = read_capture(file.path()).unwrap();
        assert_eq!(capture.frames.len(), 1);
    }
}
