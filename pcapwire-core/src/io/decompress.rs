//! Compression detection and decompression support.
//!
//! Capture files are often stored gzip-compressed. [`DecompressReader`]
//! wraps any `R: Read` and yields the decompressed bytes.

use std::io::{self, Read};

use flate2::read::GzDecoder;

/// Detected compression format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// No compression
    None,
    /// Gzip (.gz)
    Gzip,
}

impl Compression {
    /// Detect compression format from magic bytes.
    pub fn detect(data: &[u8]) -> Self {
        match data {
            [0x1f, 0x8b, ..] => Compression::Gzip,
            _ => Compression::None,
        }
    }

    pub fn is_compressed(&self) -> bool {
        !matches!(self, Compression::None)
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
        }
    }
}

/// A reader that transparently decompresses its source.
pub enum DecompressReader<R: Read> {
    /// No compression - pass-through
    None(R),

    /// Gzip decompression
    Gzip(GzDecoder<R>),
}

impl<R: Read> DecompressReader<R> {
    pub fn new(source: R, compression: Compression) -> Self {
        match compression {
            Compression::None => DecompressReader::None(source),
            Compression::Gzip => DecompressReader::Gzip(GzDecoder::new(source)),
        }
    }

    pub fn compression(&self) -> Compression {
        match self {
            DecompressReader::None(_) => Compression::None,
            DecompressReader::Gzip(_) => Compression::Gzip,
        }
    }
}

impl<R: Read> Read for DecompressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            DecompressReader::None(r) => r.read(buf),
            DecompressReader::Gzip(r) => r.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use std::io::{Cursor, Write};

    #[test]
    fn test_detect() {
        assert_eq!(Compression::detect(&[0x1f, 0x8b, 0x08, 0, 0, 0]), Compression::Gzip);
        assert_eq!(Compression::detect(&[0xd4, 0xc3, 0xb2, 0xa1]), Compression::None);
        assert_eq!(Compression::detect(&[]), Compression::None);
        assert!(Compression::Gzip.is_compressed());
    }

    #[test]
    fn test_gzip_roundtrip() {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"capture bytes").unwrap();
        let compressed = encoder.finish().unwrap();

        let compression = Compression::detect(&compressed);
        let mut reader = DecompressReader::new(Cursor::new(compressed), compression);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();

        assert_eq!(out, "capture bytes");
        assert_eq!(reader.compression(), Compression::Gzip);
    }
}
