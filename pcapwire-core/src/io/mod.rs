//! Capture file reading.
//!
//! - [`PcapReader`] - File-based reader with automatic gzip handling
//! - [`GenericPcapReader`] - PCAP/PCAPNG reader over any `Read` source
//! - [`RawPacket`] - One captured frame with its link type and timestamp

mod decompress;
mod pcap_stream;
mod reader;

use bytes::Bytes;

pub use decompress::{Compression, DecompressReader};
pub use pcap_stream::{GenericPcapReader, PcapFormat};
pub use reader::PcapReader;

/// A captured frame as stored in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    /// 1-based position in the capture.
    pub frame_number: u64,
    /// Capture time in microseconds since the Unix epoch.
    pub timestamp_us: i64,
    /// LINKTYPE_* of the interface the frame was captured on.
    pub link_type: u16,
    pub data: Bytes,
}
