//! Generic PCAP/PCAPNG reader over any Read source.
//!
//! Wraps the `pcap_parser` streaming readers behind a single
//! `next_packet()` call and normalizes timestamps to microseconds.
//!
//! ## Usage
//!
//! ```ignore
//! use std::fs::File;
//!
//! let file = File::open("capture.pcap")?;
//! let mut reader = GenericPcapReader::with_format(file, PcapFormat::LegacyLeMicro)?;
//! while let Some(packet) = reader.next_packet()? {
//!     println!("{} bytes", packet.data.len());
//! }
//! ```

use std::io::{BufReader, Read};

use bytes::Bytes;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError as ParserError, PcapNGReader};
use tracing::{debug, warn};

use crate::error::{Error, PcapError};
use crate::io::RawPacket;

/// Buffer size for pcap_parser readers (256KB).
const BUFFER_SIZE: usize = 262144;

/// Default pcapng timestamp resolution (microseconds).
const DEFAULT_TSRESOL: u8 = 6;

/// Format of the PCAP file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PcapFormat {
    /// Classic PCAP (little-endian, microseconds)
    LegacyLeMicro,
    /// Classic PCAP (big-endian, microseconds)
    LegacyBeMicro,
    /// Classic PCAP (little-endian, nanoseconds)
    LegacyLeNano,
    /// Classic PCAP (big-endian, nanoseconds)
    LegacyBeNano,
    /// PCAPNG format
    PcapNg,
}

impl PcapFormat {
    /// Detect PCAP format from magic bytes.
    pub fn detect(data: &[u8]) -> Result<Self, Error> {
        if data.len() < 4 {
            return Err(Error::Pcap(PcapError::InvalidFormat {
                reason: "Data too small for PCAP magic".into(),
            }));
        }

        let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);

        match magic {
            0xa1b2c3d4 => Ok(PcapFormat::LegacyLeMicro),
            0xd4c3b2a1 => Ok(PcapFormat::LegacyBeMicro),
            0xa1b23c4d => Ok(PcapFormat::LegacyLeNano),
            0x4d3cb2a1 => Ok(PcapFormat::LegacyBeNano),
            0x0a0d0d0a => Ok(PcapFormat::PcapNg),
            _ => Err(Error::Pcap(PcapError::InvalidFormat {
                reason: format!("Unknown PCAP magic: 0x{:08x}", magic),
            })),
        }
    }

    pub fn is_pcapng(&self) -> bool {
        matches!(self, PcapFormat::PcapNg)
    }

    pub fn is_nanosecond(&self) -> bool {
        matches!(self, PcapFormat::LegacyLeNano | PcapFormat::LegacyBeNano)
    }
}

/// Link type and timestamp resolution of one pcapng interface.
#[derive(Clone, Copy, Debug)]
struct Interface {
    link_type: u16,
    tsresol: u8,
    tsoffset: i64,
}

/// Generic PCAP/PCAPNG reader over any Read source.
pub struct GenericPcapReader<R: Read> {
    inner: ReaderInner<R>,
    frame_number: u64,
    link_type: u16,
    nanosecond: bool,
    interfaces: Vec<Interface>,
}

enum ReaderInner<R: Read> {
    Legacy(LegacyPcapReader<BufReader<R>>),
    Ng(PcapNGReader<BufReader<R>>),
}

impl<R: Read> GenericPcapReader<R> {
    /// Create a reader with known format.
    ///
    /// Use `PcapFormat::detect()` to determine the format from magic bytes
    /// before calling this.
    pub fn with_format(source: R, format: PcapFormat) -> Result<Self, Error> {
        let buf_reader = BufReader::with_capacity(BUFFER_SIZE, source);

        let inner = if format.is_pcapng() {
            let reader = PcapNGReader::new(BUFFER_SIZE, buf_reader).map_err(|e| {
                Error::Pcap(PcapError::InvalidFormat {
                    reason: format!("Failed to parse PCAPNG: {}", e),
                })
            })?;
            ReaderInner::Ng(reader)
        } else {
            let reader = LegacyPcapReader::new(BUFFER_SIZE, buf_reader).map_err(|e| {
                Error::Pcap(PcapError::InvalidFormat {
                    reason: format!("Failed to parse legacy PCAP: {}", e),
                })
            })?;
            ReaderInner::Legacy(reader)
        };

        Ok(GenericPcapReader {
            inner,
            frame_number: 0,
            link_type: 1, // Ethernet until a header says otherwise
            nanosecond: format.is_nanosecond(),
            interfaces: Vec::new(),
        })
    }

    /// Read the next packet.
    ///
    /// Returns `Ok(None)` at end of file.
    pub fn next_packet(&mut self) -> Result<Option<RawPacket>, Error> {
        match &mut self.inner {
            ReaderInner::Legacy(reader) => read_legacy_packet(
                reader,
                &mut self.frame_number,
                &mut self.link_type,
                &mut self.nanosecond,
            ),
            ReaderInner::Ng(reader) => {
                read_pcapng_packet(reader, &mut self.frame_number, &mut self.interfaces)
            }
        }
    }

    /// Link type of the most recent header (e.g., 1 = Ethernet).
    pub fn link_type(&self) -> u16 {
        match self.interfaces.first() {
            Some(iface) => iface.link_type,
            None => self.link_type,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_number
    }
}

fn read_legacy_packet<S: Read>(
    reader: &mut LegacyPcapReader<S>,
    frame_number: &mut u64,
    link_type: &mut u16,
    nanosecond: &mut bool,
) -> Result<Option<RawPacket>, Error> {
    loop {
        match reader.next() {
            Ok((offset, block)) => match block {
                PcapBlockOwned::Legacy(packet) => {
                    *frame_number += 1;

                    let frac = if *nanosecond {
                        packet.ts_usec as i64 / 1_000
                    } else {
                        packet.ts_usec as i64
                    };
                    let timestamp_us = (packet.ts_sec as i64) * 1_000_000 + frac;

                    let raw = RawPacket {
                        frame_number: *frame_number,
                        timestamp_us,
                        link_type: *link_type,
                        data: Bytes::copy_from_slice(packet.data),
                    };

                    reader.consume(offset);
                    return Ok(Some(raw));
                }
                PcapBlockOwned::LegacyHeader(header) => {
                    *link_type = header.network.0 as u16;
                    *nanosecond = header.is_nanosecond_precision();
                    debug!(link_type = *link_type, nanosecond = *nanosecond, "pcap header");
                    reader.consume(offset);
                }
                _ => {
                    reader.consume(offset);
                }
            },
            Err(ParserError::Eof) => return Ok(None),
            Err(ParserError::Incomplete(_)) => {
                reader.refill().map_err(|e| {
                    Error::Pcap(PcapError::InvalidFormat {
                        reason: format!("Legacy PCAP refill error: {}", e),
                    })
                })?;
            }
            Err(e) => {
                return Err(Error::Pcap(PcapError::InvalidFormat {
                    reason: format!("Legacy PCAP parse error: {}", e),
                }));
            }
        }
    }
}

fn read_pcapng_packet<S: Read>(
    reader: &mut PcapNGReader<S>,
    frame_number: &mut u64,
    interfaces: &mut Vec<Interface>,
) -> Result<Option<RawPacket>, Error> {
    use pcap_parser::pcapng::Block;

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                let packet = match block {
                    PcapBlockOwned::NG(Block::SectionHeader(_)) => {
                        interfaces.clear();
                        None
                    }
                    PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                        interfaces.push(Interface {
                            link_type: idb.linktype.0 as u16,
                            tsresol: idb.if_tsresol,
                            tsoffset: idb.if_tsoffset,
                        });
                        None
                    }
                    PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                        *frame_number += 1;
                        match interfaces.get(epb.if_id as usize) {
                            Some(iface) => {
                                let ticks = ((epb.ts_high as u64) << 32) | (epb.ts_low as u64);
                                Some(RawPacket {
                                    frame_number: *frame_number,
                                    timestamp_us: ticks_to_micros(ticks, *iface),
                                    link_type: iface.link_type,
                                    data: Bytes::copy_from_slice(epb.data),
                                })
                            }
                            None => {
                                warn!(
                                    frame = *frame_number,
                                    if_id = epb.if_id,
                                    "packet references unknown interface"
                                );
                                None
                            }
                        }
                    }
                    PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                        *frame_number += 1;
                        interfaces.first().map(|iface| RawPacket {
                            frame_number: *frame_number,
                            timestamp_us: 0,
                            link_type: iface.link_type,
                            data: Bytes::copy_from_slice(spb.data),
                        })
                    }
                    _ => None,
                };

                reader.consume(offset);
                if let Some(packet) = packet {
                    return Ok(Some(packet));
                }
            }
            Err(ParserError::Eof) => return Ok(None),
            Err(ParserError::Incomplete(_)) => {
                reader.refill().map_err(|e| {
                    Error::Pcap(PcapError::InvalidFormat {
                        reason: format!("PCAPNG refill error: {}", e),
                    })
                })?;
            }
            Err(e) => {
                return Err(Error::Pcap(PcapError::InvalidFormat {
                    reason: format!("PCAPNG parse error: {}", e),
                }));
            }
        }
    }
}

/// Convert interface ticks to microseconds using `if_tsresol`.
///
/// High bit set means a power of two, otherwise a power of ten.
fn ticks_to_micros(ticks: u64, iface: Interface) -> i64 {
    let tsresol = if iface.tsresol == 0 {
        DEFAULT_TSRESOL
    } else {
        iface.tsresol
    };
    let exp = (tsresol & 0x7f) as u32;
    let units_per_sec: u128 = if tsresol & 0x80 != 0 {
        1u128.checked_shl(exp).unwrap_or(u128::MAX)
    } else {
        10u128.checked_pow(exp).unwrap_or(u128::MAX)
    };
    let micros = (ticks as u128 * 1_000_000) / units_per_sec;
    (micros as i64).saturating_add(iface.tsoffset.saturating_mul(1_000_000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_pcap_format_detect() {
        let le_micro = [0xd4, 0xc3, 0xb2, 0xa1];
        assert_eq!(
            PcapFormat::detect(&le_micro).unwrap(),
            PcapFormat::LegacyLeMicro
        );

        let be_micro = [0xa1, 0xb2, 0xc3, 0xd4];
        assert_eq!(
            PcapFormat::detect(&be_micro).unwrap(),
            PcapFormat::LegacyBeMicro
        );

        let le_nano = [0x4d, 0x3c, 0xb2, 0xa1];
        assert!(PcapFormat::detect(&le_nano).unwrap().is_nanosecond());

        let pcapng = [0x0a, 0x0d, 0x0d, 0x0a];
        assert_eq!(PcapFormat::detect(&pcapng).unwrap(), PcapFormat::PcapNg);

        let unknown = [0xDE, 0xAD, 0xBE, 0xEF];
        assert!(PcapFormat::detect(&unknown).is_err());
        assert!(PcapFormat::detect(&[0xd4]).is_err());
    }

    /// Legacy pcap with the given magic and one 14-byte frame.
    fn create_minimal_pcap(magic: [u8; 4], ts_frac: u32) -> Vec<u8> {
        let mut data = Vec::new();

        data.extend_from_slice(&magic);
        data.extend_from_slice(&[0x02, 0x00]); // Version major (2)
        data.extend_from_slice(&[0x04, 0x00]); // Version minor (4)
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // Thiszone
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // Sigfigs
        data.extend_from_slice(&[0xff, 0xff, 0x00, 0x00]); // Snaplen (65535)
        data.extend_from_slice(&[0x71, 0x00, 0x00, 0x00]); // Network (Linux SLL)

        let packet_data = [0u8; 14];
        data.extend_from_slice(&1_000_000_000u32.to_le_bytes());
        data.extend_from_slice(&ts_frac.to_le_bytes());
        data.extend_from_slice(&(packet_data.len() as u32).to_le_bytes());
        data.extend_from_slice(&(packet_data.len() as u32).to_le_bytes());
        data.extend_from_slice(&packet_data);

        data
    }

    #[test]
    fn test_read_legacy_micro() {
        let data = create_minimal_pcap([0xd4, 0xc3, 0xb2, 0xa1], 250_000);
        let format = PcapFormat::detect(&data).unwrap();
        let mut reader = GenericPcapReader::with_format(Cursor::new(data), format).unwrap();

        let packet = reader.next_packet().unwrap().unwrap();
        assert_eq!(packet.frame_number, 1);
        assert_eq!(packet.timestamp_us, 1_000_000_000_250_000);
        assert_eq!(packet.link_type, 113);
        assert_eq!(packet.data.len(), 14);
        assert!(reader.next_packet().unwrap().is_none());
        assert_eq!(reader.frame_count(), 1);
    }

    #[test]
    fn test_read_legacy_nano() {
        let data = create_minimal_pcap([0x4d, 0x3c, 0xb2, 0xa1], 250_000_000);
        let format = PcapFormat::detect(&data).unwrap();
        let mut reader = GenericPcapReader::with_format(Cursor::new(data), format).unwrap();

        let packet = reader.next_packet().unwrap().unwrap();
        assert_eq!(packet.timestamp_us, 1_000_000_000_250_000);
    }

    #[test]
    fn test_ticks_to_micros() {
        let micro = Interface {
            link_type: 1,
            tsresol: 6,
            tsoffset: 0,
        };
        assert_eq!(ticks_to_micros(1_500_000, micro), 1_500_000);

        let nano = Interface { tsresol: 9, ..micro };
        assert_eq!(ticks_to_micros(1_500_000_000, nano), 1_500_000);

        let binary = Interface {
            tsresol: 0x80 | 10,
            ..micro
        };
        assert_eq!(ticks_to_micros(1024, binary), 1_000_000);

        let offset = Interface { tsoffset: 2, ..micro };
        assert_eq!(ticks_to_micros(0, offset), 2_000_000);
    }
}
