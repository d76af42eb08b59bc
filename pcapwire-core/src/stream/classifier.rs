//! First-bytes classification of a flow direction.

use super::StreamRole;

/// Bytes needed before a direction can be classified.
pub const MIN_CLASSIFY_BYTES: usize = 3;

const RESPONSE_PREFIX: &[u8] = b"HTTP/";

/// Ports conventionally carrying TLS.
pub const TLS_PORTS: [u16; 2] = [443, 8443];

/// Whether either port is a TLS port.
pub fn is_tls_port(src_port: u16, dst_port: u16) -> bool {
    TLS_PORTS.contains(&src_port) || TLS_PORTS.contains(&dst_port)
}

/// Whether the bytes start with a TLS handshake record header.
pub fn looks_like_tls(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x16 && data[1] == 0x03
}

/// Decide what a direction carries from its first bytes.
///
/// Returns [`StreamRole::Unclassified`] while fewer than
/// [`MIN_CLASSIFY_BYTES`] are available, or while the bytes are still a
/// prefix of `HTTP/`. The handshake signature wins on any
/// port; anything that is neither TLS nor an `HTTP/` status line is treated
/// as a request stream.
pub fn classify(first_bytes: &[u8], src_port: u16, dst_port: u16) -> StreamRole {
    if first_bytes.len() < MIN_CLASSIFY_BYTES {
        return StreamRole::Unclassified;
    }

    if looks_like_tls(first_bytes) {
        if !is_tls_port(src_port, dst_port) {
            tracing::debug!(src_port, dst_port, "TLS handshake on non-TLS port");
        }
        return StreamRole::Opaque;
    }

    if first_bytes.len() < RESPONSE_PREFIX.len() && RESPONSE_PREFIX.starts_with(first_bytes) {
        return StreamRole::Unclassified;
    }

    if first_bytes.starts_with(RESPONSE_PREFIX) {
        StreamRole::HttpResponse
    } else {
        StreamRole::HttpRequest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_on_443() {
        assert_eq!(classify(&[0x16, 0x03, 0x01, 0x02, 0x00], 51000, 443), StreamRole::Opaque);
    }

    #[test]
    fn test_tls_on_any_port() {
        assert_eq!(classify(&[0x16, 0x03, 0x03], 51000, 8080), StreamRole::Opaque);
    }

    #[test]
    fn test_response() {
        assert_eq!(classify(b"HTTP/1.1 200 OK\r\n", 80, 51000), StreamRole::HttpResponse);
    }

    #[test]
    fn test_request_default() {
        assert_eq!(classify(b"GET / HTTP/1.1\r\n", 51000, 80), StreamRole::HttpRequest);
        // Anything unrecognised is still handed to the request parser
        assert_eq!(classify(b"\x00\x01\x02", 51000, 9000), StreamRole::HttpRequest);
    }

    #[test]
    fn test_insufficient_bytes() {
        assert_eq!(classify(b"", 51000, 80), StreamRole::Unclassified);
        assert_eq!(classify(b"HT", 51000, 80), StreamRole::Unclassified);
        assert_eq!(classify(&[0x16, 0x03], 51000, 443), StreamRole::Unclassified);
    }

    #[test]
    fn test_partial_status_line_defers() {
        assert_eq!(classify(b"HTT", 80, 51000), StreamRole::Unclassified);
        assert_eq!(classify(b"HTTP", 80, 51000), StreamRole::Unclassified);
        assert_eq!(classify(b"HTTX", 80, 51000), StreamRole::HttpRequest);
    }
}
