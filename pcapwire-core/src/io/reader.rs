//! PCAP file reader with automatic compression handling.

use std::fs::File;
use std::io::{Chain, Cursor, Read};
use std::path::Path;

use tracing::debug;

use crate::error::{Error, PcapError};
use crate::io::{Compression, DecompressReader, GenericPcapReader, PcapFormat, RawPacket};

/// Decompressed file bytes with the already-consumed magic put back in front.
type FileSource = Chain<Cursor<[u8; 4]>, DecompressReader<File>>;

/// Reader for PCAP and PCAPNG files, with optional gzip decompression.
///
/// # Example
///
/// ```ignore
/// use pcapwire_core::io::PcapReader;
///
/// let mut reader = PcapReader::open("capture.pcap.gz")?;
/// while let Some(packet) = reader.next_packet()? {
///     println!("Frame {}: {} bytes", packet.frame_number, packet.data.len());
/// }
/// ```
pub struct PcapReader {
    inner: GenericPcapReader<FileSource>,
    compression: Compression,
    format: PcapFormat,
}

impl PcapReader {
    /// Open a capture file, detecting compression and format from magic bytes.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();

        let mut file = File::open(path).map_err(|_| {
            Error::Pcap(PcapError::FileNotFound {
                path: path.display().to_string(),
            })
        })?;

        let mut header = [0u8; 2];
        let compression = match file.read_exact(&mut header) {
            Ok(()) => Compression::detect(&header),
            Err(_) => {
                return Err(Error::Pcap(PcapError::InvalidFormat {
                    reason: "File too short".to_string(),
                }))
            }
        };

        // Reopen rather than seek so the decoder sees the stream from the start.
        let file = File::open(path)?;
        let mut decoder = DecompressReader::new(file, compression);

        let mut magic = [0u8; 4];
        decoder.read_exact(&mut magic).map_err(|_| {
            Error::Pcap(PcapError::InvalidFormat {
                reason: "File too short to read magic number".to_string(),
            })
        })?;
        let format = PcapFormat::detect(&magic)?;

        debug!(path = %path.display(), %compression, ?format, "opened capture");

        let source = Cursor::new(magic).chain(decoder);
        let inner = GenericPcapReader::with_format(source, format)?;

        Ok(Self {
            inner,
            compression,
            format,
        })
    }

    /// Read the next packet.
    ///
    /// Returns `Ok(None)` at end of file.
    #[inline]
    pub fn next_packet(&mut self) -> Result<Option<RawPacket>, Error> {
        self.inner.next_packet()
    }

    #[inline]
    pub fn link_type(&self) -> u16 {
        self.inner.link_type()
    }

    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.inner.frame_count()
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn format(&self) -> PcapFormat {
        self.format
    }
}

impl Iterator for PcapReader {
    type Item = Result<RawPacket, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression as GzCompression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Create a minimal valid PCAP file with one packet.
    fn create_minimal_pcap() -> Vec<u8> {
        let mut data = Vec::new();

        data.extend_from_slice(&[0xd4, 0xc3, 0xb2, 0xa1]); // Magic (little endian)
        data.extend_from_slice(&[0x02, 0x00]); // Version major (2)
        data.extend_from_slice(&[0x04, 0x00]); // Version minor (4)
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // Thiszone
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // Sigfigs
        data.extend_from_slice(&[0xff, 0xff, 0x00, 0x00]); // Snaplen (65535)
        data.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]); // Network (Ethernet)

        let packet_data = [
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, // Dst MAC
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, // Src MAC
            0x08, 0x00, // EtherType (IPv4)
        ];

        data.extend_from_slice(&1_000_000_000u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&(packet_data.len() as u32).to_le_bytes());
        data.extend_from_slice(&(packet_data.len() as u32).to_le_bytes());
        data.extend_from_slice(&packet_data);

        data
    }

    #[test]
    fn test_open_plain_pcap() {
        let mut temp = NamedTempFile::with_suffix(".pcap").unwrap();
        temp.write_all(&create_minimal_pcap()).unwrap();
        temp.flush().unwrap();

        let mut reader = PcapReader::open(temp.path()).unwrap();
        assert_eq!(reader.compression(), Compression::None);
        assert_eq!(reader.format(), PcapFormat::LegacyLeMicro);

        let packets: Vec<_> = reader.by_ref().collect::<Result<_, _>>().unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].timestamp_us, 1_000_000_000_000_000);
        assert_eq!(reader.link_type(), 1);
    }

    #[test]
    fn test_open_gzip_pcap() {
        let temp = NamedTempFile::with_suffix(".pcap.gz").unwrap();
        {
            let file = File::create(temp.path()).unwrap();
            let mut encoder = GzEncoder::new(file, GzCompression::default());
            encoder.write_all(&create_minimal_pcap()).unwrap();
            encoder.finish().unwrap();
        }

        let mut reader = PcapReader::open(temp.path()).unwrap();
        assert_eq!(reader.compression(), Compression::Gzip);
        assert!(reader.next_packet().unwrap().is_some());
        assert!(reader.next_packet().unwrap().is_none());
        assert_eq!(reader.frame_count(), 1);
    }

    #[test]
    fn test_missing_file() {
        let err = PcapReader::open("/nonexistent/capture.pcap").err().unwrap();
        assert!(matches!(err, Error::Pcap(PcapError::FileNotFound { .. })));
    }

    #[test]
    fn test_not_a_capture() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"this is not a capture file").unwrap();
        temp.flush().unwrap();

        let err = PcapReader::open(temp.path()).err().unwrap();
        assert!(matches!(err, Error::Pcap(PcapError::InvalidFormat { .. })));
    }
}
